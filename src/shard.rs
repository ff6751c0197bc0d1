//  Copyright 2026 the phonedb authors
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

use std::{
    collections::BTreeMap,
    io::{self, Write},
};

use parking_lot::RwLock;

use crate::{csv, phone::PhoneCodec, record::Record};

/// One slot of the shard arrays: a suffix-keyed record map behind its own
/// reader-writer lock.
///
/// Any number of concurrent readers share the shard; writers are exclusive.
/// The map is ordered so that print and save observe the shard in ascending
/// key order.
#[derive(Debug, Default)]
pub(crate) struct Shard {
    entries: RwLock<BTreeMap<u32, Record>>,
}

impl Shard {
    /// Look up a record by suffix, cloning it out of the shard.
    pub fn get(&self, suffix: u32) -> Option<Record> {
        self.entries.read().get(&suffix).cloned()
    }

    /// Store `record` under `suffix`. Returns `(true, 0)` when the key was
    /// absent, or `(false, old_bytes)` when an existing record was replaced
    /// in place.
    pub fn insert(&self, suffix: u32, record: Record) -> (bool, u64) {
        let mut entries = self.entries.write();
        match entries.insert(suffix, record) {
            None => (true, 0),
            Some(old) => (false, old.bytes()),
        }
    }

    /// Store `record` under `suffix` without reporting a replacement. Only
    /// used by paths that have already established the key is absent.
    pub fn insert_new(&self, suffix: u32, record: Record) {
        self.entries.write().insert(suffix, record);
    }

    /// Erase the record under `suffix`, returning its byte footprint, or
    /// `None` when the key was absent.
    pub fn remove(&self, suffix: u32) -> Option<u64> {
        self.entries.write().remove(&suffix).map(|old| old.bytes())
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Clone the shard contents in key order. The scan iterator calls this as
    /// it enters the shard, so walkers observe a per-shard consistent view
    /// while point writes proceed elsewhere.
    pub fn snapshot(&self) -> Vec<(u32, Record)> {
        self.entries
            .read()
            .iter()
            .map(|(suffix, record)| (*suffix, record.clone()))
            .collect()
    }

    /// Write every entry as one formatted line, in key order. Returns the
    /// number of lines written.
    pub fn write_csv(
        &self,
        sink: &mut impl Write,
        prefix: u32,
        active: bool,
        codec: &PhoneCodec,
    ) -> io::Result<u64> {
        let entries = self.entries.read();
        let mut count = 0;
        for (suffix, record) in entries.iter() {
            csv::write_line(sink, &codec.join(prefix, *suffix), record, active)?;
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tag: &str) -> Record {
        Record::new(format!("Last{tag}"), format!("First{tag}"), format!("Pat{tag}"))
    }

    #[test]
    fn insert_reports_replacement() {
        let shard = Shard::default();
        let first = record("A");
        let first_bytes = first.bytes();
        assert_eq!(shard.insert(7, first), (true, 0));
        assert_eq!(shard.insert(7, record("BB")), (false, first_bytes));
        assert_eq!(shard.len(), 1);
    }

    #[test]
    fn remove_returns_footprint() {
        let shard = Shard::default();
        let rec = record("A");
        let bytes = rec.bytes();
        shard.insert_new(3, rec);
        assert_eq!(shard.remove(3), Some(bytes));
        assert_eq!(shard.remove(3), None);
        assert!(shard.is_empty());
    }

    #[test]
    fn clear_empties_the_shard() {
        let shard = Shard::default();
        shard.insert_new(1, record("A"));
        shard.insert_new(2, record("B"));
        assert_eq!(shard.len(), 2);
        shard.clear();
        assert!(shard.is_empty());
    }

    #[test]
    fn writes_lines_in_key_order() {
        let codec = PhoneCodec::new(4, 6).unwrap();
        let shard = Shard::default();
        shard.insert_new(200, Record::new("B", "B", "B"));
        shard.insert_new(100, Record::new("A", "A", "A"));

        let mut buf = Vec::new();
        let count = shard.write_csv(&mut buf, 42, true, &codec).unwrap();
        assert_eq!(count, 2);
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "80042000100, A, A, A, 1\n80042000200, B, B, B, 1\n"
        );
    }

    #[test]
    fn snapshot_is_ordered() {
        let shard = Shard::default();
        shard.insert_new(5, record("A"));
        shard.insert_new(1, record("B"));
        let keys: Vec<u32> = shard.snapshot().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![1, 5]);
    }
}
