use std::path::Path;

use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use strata::config::Config;

use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct ConfigCommand {
    #[clap(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Parser)]
pub enum ConfigSubcommand {
    #[clap(about = "Show current configuration")]
    Show,

    #[clap(about = "List the locations searched for a config file")]
    Paths,
}

impl ConfigCommand {
    pub async fn execute(&self, config_path: Option<&Path>, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            ConfigSubcommand::Show => Self::show(config_path, format),
            ConfigSubcommand::Paths => Self::paths(format),
        }
    }

    fn show(config_path: Option<&Path>, format: OutputFormat) -> CliResult<()> {
        let config = Config::load(config_path)?;

        match format {
            OutputFormat::Json => {
                let tiers: Vec<_> = config
                    .tiers
                    .iter()
                    .map(|tier| {
                        serde_json::json!({
                            "name": tier.name,
                            "capacity": tier.capacity,
                            "policy": tier.policy,
                            "admission": tier.admission,
                        })
                    })
                    .collect();
                let output = serde_json::json!({
                    "tiers": tiers,
                    "importance": {
                        "base": config.importance.base,
                        "ceiling": config.importance.ceiling,
                    },
                    "promotion": {
                        "access_threshold": config.promotion.access_threshold,
                        "boost": config.promotion.boost,
                        "importance_ceiling": config.promotion.importance_ceiling,
                    },
                    "redundancy": {
                        "threshold": config.redundancy.threshold,
                        "similar_threshold": config.redundancy.similar_threshold,
                    },
                    "compression": {
                        "strategy": config.compression.strategy,
                        "max_terms": config.compression.max_terms,
                        "min_word_length": config.compression.min_word_length,
                    },
                    "relationships": {
                        "very_close": config.relationships.very_close,
                        "related": config.relationships.related,
                    },
                    "embedding": {
                        "provider": config.embedding.provider,
                        "timeout_secs": config.embedding.timeout_secs,
                        "dimension": config.embedding.dimension,
                    },
                    "maintenance": {
                        "stale_after_days": config.maintenance.stale_after_days,
                    }
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                match config_path {
                    Some(path) => println!("Configuration from: {}", path.display()),
                    None => println!("Configuration: (default search paths)"),
                }
                println!("==============================\n");

                println!("[Tiers]");
                let mut tier_table = Table::new();
                tier_table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Name", "Capacity", "Policy", "Admission"]);

                for tier in &config.tiers {
                    tier_table.add_row([
                        tier.name.clone(),
                        tier.capacity
                            .map(|c| c.to_string())
                            .unwrap_or_else(|| "unbounded".to_string()),
                        tier.policy.to_string(),
                        tier.admission.to_string(),
                    ]);
                }

                println!("{tier_table}\n");

                println!("[Thresholds]");
                let mut settings = Table::new();
                settings
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Setting", "Value"]);

                settings.add_row(["importance.base", &config.importance.base.to_string()]);
                settings.add_row(["importance.ceiling", &config.importance.ceiling.to_string()]);
                settings.add_row([
                    "promotion.access_threshold",
                    &config.promotion.access_threshold.to_string(),
                ]);
                settings.add_row(["promotion.boost", &config.promotion.boost.to_string()]);
                settings.add_row([
                    "promotion.importance_ceiling",
                    &config.promotion.importance_ceiling.to_string(),
                ]);
                settings.add_row(["redundancy.threshold", &config.redundancy.threshold.to_string()]);
                settings.add_row([
                    "redundancy.similar_threshold",
                    &config.redundancy.similar_threshold.to_string(),
                ]);
                settings.add_row([
                    "relationships.very_close",
                    &config.relationships.very_close.to_string(),
                ]);
                settings.add_row(["relationships.related", &config.relationships.related.to_string()]);

                println!("{settings}\n");

                println!("[Engine]");
                let mut engine_table = Table::new();
                engine_table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Setting", "Value"]);

                engine_table.add_row([
                    "compression.strategy",
                    &format!("{:?}", config.compression.strategy),
                ]);
                engine_table.add_row([
                    "compression.max_terms",
                    &config.compression.max_terms.to_string(),
                ]);
                engine_table.add_row([
                    "compression.min_word_length",
                    &config.compression.min_word_length.to_string(),
                ]);
                engine_table.add_row(["embedding.provider", &format!("{:?}", config.embedding.provider)]);
                engine_table.add_row([
                    "embedding.timeout_secs",
                    &config.embedding.timeout_secs.to_string(),
                ]);
                engine_table.add_row(["embedding.dimension", &config.embedding.dimension.to_string()]);
                engine_table.add_row([
                    "maintenance.stale_after_days",
                    &config.maintenance.stale_after_days.to_string(),
                ]);

                println!("{engine_table}");
            }
        }

        Ok(())
    }

    fn paths(format: OutputFormat) -> CliResult<()> {
        let paths: Vec<(String, bool)> = Config::default_paths()
            .into_iter()
            .map(|p| (p.display().to_string(), p.exists()))
            .collect();

        match format {
            OutputFormat::Json => {
                let output: Vec<_> = paths
                    .iter()
                    .map(|(path, exists)| serde_json::json!({ "path": path, "exists": exists }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Path", "Exists"]);

                for (path, exists) in &paths {
                    table.add_row([path.as_str(), if *exists { "yes" } else { "no" }]);
                }

                println!("{table}");
            }
        }

        Ok(())
    }
}
