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

//! The sharded in-memory phonebook database.
//!
//! Entries live in two fixed-length shard arrays, one per activity flag; a
//! phone number's prefix selects the shard and its suffix keys the shard's
//! inner map, so a subscriber occupies exactly one slot across both arrays.
//! Point operations take the global gate shared and serialize against bulk
//! reads through the two-counter phase split; bulk operations own the gate
//! exclusively and partition the shard range across worker threads.

mod bulk;
mod scan;

pub use scan::{Scan, ScanEntry, ScanGuard};

use std::{
    io::Write,
    sync::atomic::{AtomicI64, AtomicU64, Ordering},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    gate::Gate,
    phone::PhoneCodec,
    record::Record,
    shard::Shard,
};

/// Construction parameters for [`Database`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Digits of the phone number selecting the shard. The shard arrays hold
    /// `10^first_digits` shards each.
    #[serde(default = "default::first_digits")]
    pub first_digits: u32,
    /// Digits keying the shard's inner map. Must complement `first_digits`
    /// to 10.
    #[serde(default = "default::second_digits")]
    pub second_digits: u32,
    /// Default bound, in milliseconds, for the gate waits of operations that
    /// do not supply their own.
    #[serde(default = "default::wait_time_ms")]
    pub wait_time_ms: u64,
}

mod default {
    pub fn first_digits() -> u32 {
        4
    }
    pub fn second_digits() -> u32 {
        6
    }
    pub fn wait_time_ms() -> u64 {
        1000
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            first_digits: default::first_digits(),
            second_digits: default::second_digits(),
            wait_time_ms: default::wait_time_ms(),
        }
    }
}

/// The concurrent phonebook store.
pub struct Database {
    codec: PhoneCodec,
    active: Vec<Shard>,
    inactive: Vec<Shard>,
    gate: Gate,
    records: AtomicU64,
    // Signed: the replace paths subtract old footprints, and transient
    // reorderings under concurrent mutation may dip below zero.
    bytes: AtomicI64,
    default_wait: Duration,
}

impl Database {
    /// Build an empty database with `10^first_digits` preallocated shards
    /// per activity array. Fails with [`Error::BadArg`] on an invalid digit
    /// split.
    pub fn new(config: DatabaseConfig) -> Result<Self> {
        let codec = PhoneCodec::new(config.first_digits, config.second_digits)?;
        let shards = codec.prefix_space() as usize;
        Ok(Self {
            active: (0..shards).map(|_| Shard::default()).collect(),
            inactive: (0..shards).map(|_| Shard::default()).collect(),
            codec,
            gate: Gate::new(),
            records: AtomicU64::new(0),
            bytes: AtomicI64::new(0),
            default_wait: Duration::from_millis(config.wait_time_ms),
        })
    }

    /// The phone-number codec this database was built with.
    pub fn codec(&self) -> &PhoneCodec {
        &self.codec
    }

    /// The configured default wait bound.
    pub fn default_wait(&self) -> Duration {
        self.default_wait
    }

    /// Live entries across both activity arrays.
    pub fn record_count(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }

    /// Summed byte footprint of all live records. Transient negative dips of
    /// the signed accumulator read as zero.
    pub fn byte_count(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed).max(0) as u64
    }

    /// Whether the database currently holds no entries.
    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }

    /// Insert `record` under `number` into the activity array selected by
    /// `active`.
    ///
    /// Returns `true` when a genuinely new entry was created, `false` when
    /// an existing entry was replaced in place or moved across activity.
    /// Runs in the parallel-writer phase: it waits out in-flight bulk and
    /// point reads up to `wait`, then failing with [`Error::Timeout`].
    pub fn insert(
        &self,
        number: &str,
        active: bool,
        record: Record,
        wait: Duration,
    ) -> Result<bool> {
        let (prefix, suffix) = self.codec.split(number)?;
        let guard = self.gate.shared();
        let _ticket = guard.begin_write(wait)?;
        Ok(self.insert_at(prefix, suffix, active, record))
    }

    /// Erase the entry under `number` from whichever activity array holds
    /// it. Returns `false` when the number was absent.
    pub fn remove(&self, number: &str, wait: Duration) -> Result<bool> {
        let (prefix, suffix) = self.codec.split(number)?;
        let guard = self.gate.shared();
        let _ticket = guard.begin_write(wait)?;
        Ok(self.remove_at(prefix, suffix))
    }

    /// Look up `number`, probing the active array first. The returned flag
    /// is the activity of the array that matched.
    ///
    /// Waits up to `wait` for the database to be non-empty (failing with
    /// [`Error::Sequence`]), then runs in the parallel-reader phase.
    pub fn find(&self, number: &str, wait: Duration) -> Result<Option<(bool, Record)>> {
        let (prefix, suffix) = self.codec.split(number)?;
        let guard = self.gate.shared();
        if !guard.wait_until(wait, || !self.is_empty()) {
            return Err(Error::Sequence("empty"));
        }
        let _ticket = guard.begin_read(wait)?;
        if let Some(record) = self.active[prefix as usize].get(suffix) {
            return Ok(Some((true, record)));
        }
        if let Some(record) = self.inactive[prefix as usize].get(suffix) {
            return Ok(Some((false, record)));
        }
        Ok(None)
    }

    /// Debug dump: write up to `limit` lines from the active partition and
    /// up to `limit` from the inactive partition, in scan order. Returns the
    /// number of lines written.
    pub fn print_first(
        &self,
        limit: u64,
        sink: &mut impl Write,
        wait: Duration,
    ) -> Result<u64> {
        let guard = self.gate.shared();
        if !guard.wait_until(wait, || !self.is_empty()) {
            return Err(Error::Sequence("empty"));
        }
        let _ticket = guard.begin_read(wait)?;

        let mut counts = [0u64; 2];
        for entry in Scan::new(self, false) {
            let count = &mut counts[entry.active as usize];
            if *count >= limit {
                if entry.active {
                    continue;
                }
                break;
            }
            crate::csv::write_line(
                sink,
                &self.codec.join(entry.prefix, entry.suffix),
                &entry.record,
                entry.active,
            )
            .map_err(|e| Error::FileWrite {
                file: "<sink>".to_owned(),
                source: e,
            })?;
            *count += 1;
        }
        Ok(counts[0] + counts[1])
    }

    /// Point-insert body shared by [`Database::insert`] and the bulk load
    /// path; the caller holds whatever gate side the operation requires.
    fn insert_at(&self, prefix: u32, suffix: u32, active: bool, record: Record) -> bool {
        let new_bytes = record.bytes() as i64;
        let (target, other) = if active {
            (&self.active, &self.inactive)
        } else {
            (&self.inactive, &self.active)
        };

        let (was_new, old_bytes) = target[prefix as usize].insert(suffix, record);
        if !was_new {
            // Replaced in place; by the single-array invariant the other
            // array holds nothing under this suffix.
            self.bytes
                .fetch_add(new_bytes - old_bytes as i64, Ordering::Relaxed);
            return false;
        }
        match other[prefix as usize].remove(suffix) {
            Some(old_bytes) => {
                // The entry moved across activity.
                self.bytes
                    .fetch_add(new_bytes - old_bytes as i64, Ordering::Relaxed);
                false
            }
            None => {
                self.bytes.fetch_add(new_bytes, Ordering::Relaxed);
                self.records.fetch_add(1, Ordering::Relaxed);
                true
            }
        }
    }

    fn remove_at(&self, prefix: u32, suffix: u32) -> bool {
        for array in [&self.active, &self.inactive] {
            if let Some(old_bytes) = array[prefix as usize].remove(suffix) {
                self.bytes.fetch_sub(old_bytes as i64, Ordering::Relaxed);
                self.records.fetch_sub(1, Ordering::Relaxed);
                return true;
            }
        }
        false
    }

    /// Per-entry counter bump used by the generate workers, which insert
    /// fresh keys directly into the shards.
    fn count_new_entry(&self, bytes: u64) {
        self.records.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as i64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::new(DatabaseConfig::default()).unwrap()
    }

    const WAIT: Duration = Duration::from_millis(200);

    #[test]
    fn rejects_bad_digit_splits() {
        for (first, second) in [(0, 10), (10, 0), (4, 5), (5, 6)] {
            let config = DatabaseConfig {
                first_digits: first,
                second_digits: second,
                ..DatabaseConfig::default()
            };
            assert!(matches!(Database::new(config), Err(Error::BadArg(_))));
        }
    }

    #[test]
    fn insert_then_find() {
        let db = db();
        let record = Record::new("Ivanov", "Ivan", "Ivanovich");
        assert!(db.insert("89991112233", true, record.clone(), WAIT).unwrap());
        assert_eq!(db.record_count(), 1);
        assert_eq!(db.byte_count(), 6 + 4 + 9);

        let (active, found) = db.find("89991112233", WAIT).unwrap().unwrap();
        assert!(active);
        assert_eq!(found, record);
    }

    #[test]
    fn malformed_number_leaves_state_unchanged() {
        let db = db();
        let record = Record::new("A", "B", "C");
        assert!(matches!(
            db.insert("not-a-number", true, record, WAIT),
            Err(Error::BadKey(_))
        ));
        assert_eq!(db.record_count(), 0);
        assert_eq!(db.byte_count(), 0);
    }

    #[test]
    fn reinsert_with_opposite_activity_moves_the_entry() {
        let db = db();
        db.insert("89991112233", true, Record::new("Ivanov", "Ivan", "Ivanovich"), WAIT)
            .unwrap();
        let before = db.byte_count();

        // One byte longer patronymic, now inactive.
        let moved = Record::new("Ivanov", "Ivan", "Ivanovichh");
        assert!(!db.insert("89991112233", false, moved.clone(), WAIT).unwrap());
        assert_eq!(db.record_count(), 1);
        assert_eq!(db.byte_count(), before + 1);

        let (active, found) = db.find("89991112233", WAIT).unwrap().unwrap();
        assert!(!active);
        assert_eq!(found, moved);
    }

    #[test]
    fn replace_in_place_keeps_the_count() {
        let db = db();
        db.insert("89991112233", true, Record::new("A", "B", "C"), WAIT)
            .unwrap();
        assert!(!db
            .insert("89991112233", true, Record::new("Aa", "Bb", "Cc"), WAIT)
            .unwrap());
        assert_eq!(db.record_count(), 1);
        assert_eq!(db.byte_count(), 6);
    }

    #[test]
    fn remove_twice() {
        let db = db();
        db.insert("89991112233", true, Record::new("A", "B", "C"), WAIT)
            .unwrap();
        assert!(db.remove("89991112233", WAIT).unwrap());
        assert_eq!(db.record_count(), 0);
        assert!(!db.remove("89991112233", WAIT).unwrap());
    }

    #[test]
    fn find_on_empty_database_is_out_of_sequence() {
        let db = db();
        assert!(matches!(
            db.find("89991112233", Duration::from_millis(20)),
            Err(Error::Sequence("empty"))
        ));
    }

    #[test]
    fn print_first_bounds_each_partition() {
        let db = db();
        db.insert("89991112201", true, Record::new("A", "A", "A"), WAIT)
            .unwrap();
        db.insert("89991112202", true, Record::new("B", "B", "B"), WAIT)
            .unwrap();
        db.insert("89991112203", false, Record::new("C", "C", "C"), WAIT)
            .unwrap();

        let mut buf = Vec::new();
        let count = db.print_first(1, &mut buf, WAIT).unwrap();
        assert_eq!(count, 2);
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("89991112201"));
        assert!(text.contains("89991112203"));
    }
}
