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

use std::io::Write;

use crate::{
    csv,
    error::{Error, Result},
    gate::SharedGuard,
    record::Record,
};

use super::{bulk::partition_blocks, Database};

/// One entry yielded by the full-scan iterator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    /// Shard index, i.e. the prefix half of the phone number.
    pub prefix: u32,
    /// Which activity partition the entry lives in.
    pub active: bool,
    /// Key within the shard, i.e. the suffix half of the phone number.
    pub suffix: u32,
    /// The stored record.
    pub record: Record,
}

/// A scoped shared hold of the gate under which full scans are stable.
///
/// The guard keeps bulk operations out for as long as it lives; point writes
/// may still proceed under the two-counter rule, which is why the iterator
/// re-locks each shard as it enters it. The caller must not invoke an
/// operation needing the gate exclusively while holding a scan guard.
pub struct ScanGuard<'a> {
    db: &'a Database,
    _gate: SharedGuard<'a>,
}

impl Database {
    /// Acquire the shared gate for an external scan.
    pub fn scan(&self) -> ScanGuard<'_> {
        ScanGuard {
            db: self,
            _gate: self.gate.shared(),
        }
    }
}

impl ScanGuard<'_> {
    /// Iterate every entry: non-empty active shards in ascending prefix
    /// order, each in key order, then the inactive shards likewise.
    pub fn iter(&self) -> Scan<'_> {
        Scan::new(self.db, false)
    }

    /// Iterate from the half position: the first inactive entry.
    pub fn iter_inactive(&self) -> Scan<'_> {
        Scan::new(self.db, true)
    }

    /// Streamed partitioned scan: write one §-format line for every entry of
    /// the chosen activity whose shard falls in this worker's block, and
    /// return the line count. The shard range is cut across `workers`
    /// exactly like the bulk operations cut it; workers left without a block
    /// write nothing.
    pub fn stream(
        &self,
        active: bool,
        workers: usize,
        worker_index: usize,
        sink: &mut impl Write,
    ) -> Result<u64> {
        if workers == 0 || worker_index >= workers {
            return Err(Error::BadArg(format!(
                "worker index {worker_index} out of range for {workers} workers"
            )));
        }
        let blocks = partition_blocks(self.db.codec.prefix_space(), workers);
        let Some(block) = blocks.get(worker_index).cloned() else {
            return Ok(0);
        };

        let entries = if active { self.iter() } else { self.iter_inactive() };
        let mut lines = 0;
        for entry in entries {
            if active && !entry.active {
                break;
            }
            if !block.contains(&entry.prefix) {
                continue;
            }
            csv::write_line(
                sink,
                &self.db.codec.join(entry.prefix, entry.suffix),
                &entry.record,
                entry.active,
            )
            .map_err(|e| Error::FileWrite {
                file: "<stream>".to_owned(),
                source: e,
            })?;
            lines += 1;
        }
        Ok(lines)
    }

}

/// Forward iterator over the shard arrays.
///
/// Walks fixed shard sequences, locking one shard at a time: on entering a
/// non-empty shard its read lock is taken just long enough to snapshot the
/// shard in key order. Only sound while the gate is held at least shared,
/// which [`ScanGuard`] guarantees for external callers.
pub struct Scan<'a> {
    db: &'a Database,
    in_active_array: bool,
    next_bucket: usize,
    bucket: u32,
    buffer: std::vec::IntoIter<(u32, Record)>,
}

impl<'a> Scan<'a> {
    pub(crate) fn new(db: &'a Database, from_half: bool) -> Self {
        Self {
            db,
            in_active_array: !from_half,
            next_bucket: 0,
            bucket: 0,
            buffer: Vec::new().into_iter(),
        }
    }

    /// Advance to the next non-empty shard, filling the buffer. Returns
    /// `false` when both arrays are exhausted.
    fn refill(&mut self) -> bool {
        loop {
            let shards = if self.in_active_array {
                &self.db.active
            } else {
                &self.db.inactive
            };
            while self.next_bucket < shards.len() {
                let index = self.next_bucket;
                self.next_bucket += 1;
                if shards[index].is_empty() {
                    continue;
                }
                let snapshot = shards[index].snapshot();
                if !snapshot.is_empty() {
                    self.bucket = index as u32;
                    self.buffer = snapshot.into_iter();
                    return true;
                }
            }
            if !self.in_active_array {
                return false;
            }
            self.in_active_array = false;
            self.next_bucket = 0;
        }
    }
}

impl Iterator for Scan<'_> {
    type Item = ScanEntry;

    fn next(&mut self) -> Option<ScanEntry> {
        loop {
            if let Some((suffix, record)) = self.buffer.next() {
                return Some(ScanEntry {
                    prefix: self.bucket,
                    active: self.in_active_array,
                    suffix,
                    record,
                });
            }
            if !self.refill() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use itertools::Itertools;

    use crate::{DatabaseConfig, Record};

    use super::*;

    const WAIT: Duration = Duration::from_millis(200);

    fn populated() -> Database {
        let db = Database::new(DatabaseConfig::default()).unwrap();
        for (number, active) in [
            ("89993000005", true),
            ("89991000001", true),
            ("89991000009", true),
            ("89992000007", false),
            ("89990000004", false),
        ] {
            db.insert(number, active, Record::new("L", "F", "P"), WAIT)
                .unwrap();
        }
        db
    }

    #[test]
    fn yields_active_ascending_then_inactive() {
        let db = populated();
        let guard = db.scan();
        let numbers = guard
            .iter()
            .map(|e| (e.active, db.codec().join(e.prefix, e.suffix)))
            .collect_vec();
        assert_eq!(
            numbers,
            vec![
                (true, "89991000001".to_owned()),
                (true, "89991000009".to_owned()),
                (true, "89993000005".to_owned()),
                (false, "89990000004".to_owned()),
                (false, "89992000007".to_owned()),
            ]
        );
    }

    #[test]
    fn half_position_skips_active_entries() {
        let db = populated();
        let guard = db.scan();
        let numbers = guard
            .iter_inactive()
            .map(|e| db.codec().join(e.prefix, e.suffix))
            .collect_vec();
        assert_eq!(numbers, vec!["89990000004".to_owned(), "89992000007".to_owned()]);
    }

    #[test]
    fn empty_database_yields_nothing() {
        let db = Database::new(DatabaseConfig::default()).unwrap();
        let guard = db.scan();
        assert_eq!(guard.iter().count(), 0);
    }

    #[test]
    fn partitioned_streams_are_disjoint_and_complete() {
        let db = populated();
        let guard = db.scan();

        let mut all = Vec::new();
        let mut per_worker = Vec::new();
        for worker in 0..4 {
            let mut buf = Vec::new();
            guard.stream(true, 4, worker, &mut buf).unwrap();
            per_worker.push(String::from_utf8(buf).unwrap());
        }
        for chunk in &per_worker {
            all.extend(chunk.lines().map(str::to_owned));
        }
        all.sort();

        let mut whole = Vec::new();
        guard.stream(true, 1, 0, &mut whole).unwrap();
        let mut whole = String::from_utf8(whole)
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect_vec();
        whole.sort();

        assert_eq!(all, whole);
    }

    #[test]
    fn stream_rejects_out_of_range_worker() {
        let db = populated();
        let guard = db.scan();
        let mut buf = Vec::new();
        assert!(guard.stream(true, 2, 2, &mut buf).is_err());
        assert!(guard.stream(true, 0, 0, &mut buf).is_err());
    }

    #[test]
    fn point_writes_proceed_during_a_scan() {
        let db = populated();
        let guard = db.scan();
        // A point insert under the shared gate must not deadlock against the
        // scan guard.
        db.insert("89994000001", true, Record::new("X", "Y", "Z"), WAIT)
            .unwrap();
        drop(guard);
        assert_eq!(db.record_count(), 6);
    }
}
