//! Canonical record arena
//!
//! The single owner of every live `Record`. Tiers, relationship edges and
//! the redundancy tracker refer to records by id and resolve them here; a
//! missing id is a lookup miss, never a fault.

use std::collections::HashMap;

use uuid::Uuid;

use crate::memory::types::Record;

#[derive(Debug, Default)]
pub struct RecordArena {
    records: HashMap<Uuid, Record>,
}

impl RecordArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, returning any record previously stored under its id.
    pub fn insert(&mut self, record: Record) -> Option<Record> {
        self.records.insert(record.id, record)
    }

    pub fn get(&self, id: &Uuid) -> Option<&Record> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &Uuid) -> Option<&mut Record> {
        self.records.get_mut(id)
    }

    pub fn remove(&mut self, id: &Uuid) -> Option<Record> {
        self.records.remove(id)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &Uuid> {
        self.records.keys()
    }

    /// Records ordered by `(created_at, id)`, oldest first.
    pub fn oldest_first(&self) -> Vec<&Record> {
        let mut records: Vec<&Record> = self.records.values().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::Classification;
    use crate::memory::weight::ImportanceConfig;
    use chrono::{Duration, Utc};

    fn create_test_record(content: &str, age_minutes: i64) -> Record {
        let mut record = Record::new(content, Classification::default(), &ImportanceConfig::default());
        record.created_at = Utc::now() - Duration::minutes(age_minutes);
        record
    }

    #[test]
    fn test_insert_get_remove() {
        let mut arena = RecordArena::new();
        let record = create_test_record("The sky is blue.", 0);
        let id = record.id;

        assert!(arena.insert(record).is_none());
        assert!(arena.contains(&id));
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.get(&id).unwrap().content, "The sky is blue.");

        assert!(arena.remove(&id).is_some());
        assert!(arena.remove(&id).is_none());
        assert!(arena.is_empty());
    }

    #[test]
    fn test_oldest_first_orders_by_creation() {
        let mut arena = RecordArena::new();
        let newest = create_test_record("newest", 1);
        let oldest = create_test_record("oldest", 30);
        let middle = create_test_record("middle", 10);
        arena.insert(newest);
        arena.insert(oldest);
        arena.insert(middle);

        let contents: Vec<&str> = arena
            .oldest_first()
            .into_iter()
            .map(|r| r.content.as_str())
            .collect();
        assert_eq!(contents, vec!["oldest", "middle", "newest"]);
    }

    #[test]
    fn test_get_mut_is_shared_by_all_lookups() {
        let mut arena = RecordArena::new();
        let record = create_test_record("Humans are mammals.", 0);
        let id = record.id;
        arena.insert(record);

        arena.get_mut(&id).unwrap().access_count = 4;
        assert_eq!(arena.get(&id).unwrap().access_count, 4);
    }
}
