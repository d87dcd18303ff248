use chrono::{DateTime, Utc};

#[derive(Clone, Copy, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Shorten `s` to at most `max_chars` characters, ending in "..." when cut.
pub fn truncate_string(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_string_keeps_short_input() {
        assert_eq!(truncate_string("sky", 10), "sky");
    }

    #[test]
    fn test_truncate_string_cuts_on_char_boundary() {
        assert_eq!(truncate_string("Café au lait, très chaud", 8), "Café ...");
        assert_eq!(truncate_string("空は青い。猫は飛べる。", 6), "空は青...");
    }

    #[test]
    fn test_truncate_string_adds_ellipsis() {
        assert_eq!(truncate_string("The sky is blue.", 10), "The sky...");
    }
}
