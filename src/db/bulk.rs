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

//! Bulk operations: generate, save, load, clear.
//!
//! Each one cuts the shard index range into roughly equal blocks, dispatches
//! all but the last to scoped worker threads, runs the last block on the
//! calling thread, and joins every worker before surfacing the first
//! failure.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    ops::Range,
    thread,
    time::Duration,
};

use ahash::AHashSet;
use itertools::Itertools;
use rand::{distributions::Uniform, thread_rng, Rng};
use tracing::info;

use crate::{
    corpus::{Corpus, CorpusFiles},
    csv,
    error::{Error, Result},
};

use super::Database;

/// Cut `[0, total)` into at most `workers` non-empty blocks; the last block
/// absorbs the remainder. Excess workers simply get no block.
pub(crate) fn partition_blocks(total: u32, workers: usize) -> Vec<Range<u32>> {
    let workers = workers.min(total as usize).max(1) as u32;
    let block = total / workers;
    (0..workers)
        .map(|i| {
            let begin = i * block;
            let end = if i + 1 == workers { total } else { begin + block };
            begin..end
        })
        .collect()
}

fn positive_workers(workers: usize) -> Result<usize> {
    if workers == 0 {
        return Err(Error::BadArg("worker count must be positive".to_owned()));
    }
    Ok(workers)
}

impl Database {
    /// Populate an empty database with `records` synthetic subscribers drawn
    /// from the name corpus, using `workers` parallel threads. Returns the
    /// resulting `(record_count, byte_count)`.
    ///
    /// Holds the gate exclusively throughout. Fails with [`Error::Sequence`]
    /// when the database stays populated for the whole wait, and with
    /// [`Error::BadCorpus`] when a corpus file is unusable.
    pub fn generate(
        &self,
        records: u64,
        workers: usize,
        corpus_files: &CorpusFiles,
        wait: Duration,
    ) -> Result<(u64, u64)> {
        let workers = positive_workers(workers)?;
        let capacity = self.codec.prefix_space() as u64 * self.codec.suffix_space() as u64;
        if records > capacity {
            return Err(Error::BadArg(format!(
                "{records} records exceed the {capacity}-entry key space"
            )));
        }

        let guard = self.gate.exclusive();
        if !guard.wait_until(wait, || self.is_empty()) {
            return Err(Error::Sequence("already populated"));
        }
        let corpus = Corpus::load(corpus_files)?;

        let blocks = partition_blocks(self.codec.prefix_space(), workers);
        let share = records / blocks.len() as u64;
        let remainder = records % blocks.len() as u64;
        let last = blocks.len() - 1;
        let jobs = blocks
            .into_iter()
            .enumerate()
            .map(|(i, block)| (block, if i == last { share + remainder } else { share }))
            .collect_vec();
        self.fan_out(jobs, |(block, share)| {
            self.generate_block(block, share, &corpus)
        })?;

        let (count, bytes) = (self.record_count(), self.byte_count());
        info!(records = count, bytes, "database generated");
        Ok((count, bytes))
    }

    /// Write the whole database to `workers` files derived from `base_name`
    /// (worker `i` gets `worker_file_name(base_name, i)`), each holding its
    /// shard block's active entries first, then the inactive ones. Returns
    /// the total line count.
    ///
    /// Runs in the parallel-reader phase, so concurrent saves and finds
    /// proceed while point writes wait.
    pub fn save(&self, workers: usize, base_name: &str, wait: Duration) -> Result<u64> {
        let workers = positive_workers(workers)?;
        let blocks = partition_blocks(self.codec.prefix_space(), workers);
        let jobs = blocks
            .into_iter()
            .enumerate()
            .map(|(i, block)| Ok((block, csv::worker_file_name(base_name, i)?)))
            .collect::<Result<Vec<_>>>()?;

        let guard = self.gate.shared();
        if !guard.wait_until(wait, || !self.is_empty()) {
            return Err(Error::Sequence("empty"));
        }
        let _ticket = guard.begin_read(wait)?;

        let counts = self.fan_out(jobs, |(block, file)| self.save_block(block, &file))?;
        let lines: u64 = counts.into_iter().sum();
        info!(lines, base = base_name, "database saved");
        Ok(lines)
    }

    /// Read the files a matching [`Database::save`] produced back into an
    /// empty database; worker `i` reads `worker_file_name(base_name, i)`.
    /// Returns the total row count. Duplicate rows fold through the usual
    /// insert-or-replace path.
    pub fn load(&self, workers: usize, base_name: &str, wait: Duration) -> Result<u64> {
        let workers = positive_workers(workers)?;
        let files = (0..workers)
            .map(|i| csv::worker_file_name(base_name, i))
            .collect::<Result<Vec<_>>>()?;

        let guard = self.gate.exclusive();
        if !guard.wait_until(wait, || self.is_empty()) {
            return Err(Error::Sequence("already populated"));
        }

        let counts = self.fan_out(files, |file| self.load_file(&file))?;
        let rows: u64 = counts.into_iter().sum();
        info!(rows, base = base_name, "database loaded");
        Ok(rows)
    }

    /// Drop every entry and reset the aggregate counters.
    pub fn clear(&self, workers: usize, wait: Duration) -> Result<()> {
        let workers = positive_workers(workers)?;
        let guard = self.gate.exclusive();
        if !guard.wait_until(wait, || !self.is_empty()) {
            return Err(Error::Sequence("empty"));
        }

        let blocks = partition_blocks(self.codec.prefix_space(), workers);
        self.fan_out(blocks, |block| {
            for prefix in block {
                self.active[prefix as usize].clear();
                self.inactive[prefix as usize].clear();
            }
            Ok(())
        })?;

        self.records.store(0, std::sync::atomic::Ordering::Relaxed);
        self.bytes.store(0, std::sync::atomic::Ordering::Relaxed);
        info!("database cleared");
        Ok(())
    }

    /// Run one job per element of `jobs`: all but the last on scoped worker
    /// threads, the last on the calling thread. Every worker is joined even
    /// on failure; the first non-success observed (workers in spawn order,
    /// then the caller) is propagated after the joins. A panicked worker
    /// surfaces [`Error::Unknown`].
    fn fan_out<W, T, F>(&self, mut jobs: Vec<W>, run: F) -> Result<Vec<T>>
    where
        W: Send,
        T: Send,
        F: Fn(W) -> Result<T> + Sync,
    {
        let Some(last) = jobs.pop() else {
            return Ok(Vec::new());
        };
        thread::scope(|scope| {
            let run = &run;
            let handles = jobs
                .into_iter()
                .map(|job| scope.spawn(move || run(job)))
                .collect_vec();

            let caller_result = run(last);

            let mut first_error = None;
            let mut results = Vec::with_capacity(handles.len() + 1);
            for handle in handles {
                match handle.join() {
                    Ok(Ok(value)) => results.push(value),
                    Ok(Err(e)) => {
                        first_error.get_or_insert(e);
                    }
                    Err(_) => {
                        first_error.get_or_insert(Error::Unknown);
                    }
                }
            }
            if let Some(e) = first_error {
                return Err(e);
            }
            results.push(caller_result?);
            Ok(results)
        })
    }

    /// Fill the shards of `block` with exactly `share` fresh entries.
    fn generate_block(&self, block: Range<u32>, share: u64, corpus: &Corpus) -> Result<()> {
        let width = block.end - block.start;
        if width == 0 || share == 0 {
            return Ok(());
        }
        let suffix_space = self.codec.suffix_space();
        let mut rng = thread_rng();
        let suffixes = Uniform::from(0..suffix_space);
        let mut taken: AHashSet<u32> = AHashSet::new();
        let mut picks: Vec<u32> = Vec::new();
        let mut remaining = share;

        for (done, prefix) in block.enumerate() {
            if remaining == 0 {
                break;
            }
            // Integer share for this shard plus a Bernoulli draw on the
            // fractional part; the final shard absorbs whatever is left so
            // the worker emits exactly `share` entries.
            let shards_left = width as u64 - done as u64;
            let per_shard = remaining as f64 / shards_left as f64;
            let whole = per_shard.trunc() as u64;
            let mut quota = whole;
            if shards_left == 1 {
                quota = remaining;
            } else if per_shard.fract() > 0.0 && rng.gen_bool(per_shard.fract()) {
                quota += 1;
            }
            let quota = quota.min(remaining).min(suffix_space as u64);
            if quota == 0 {
                continue;
            }
            let whole = whole.min(quota);

            // Distinct suffixes for the integer share, by rejection sampling
            // against the running set. The set spans both activity arrays,
            // so a suffix never lands in both.
            taken.clear();
            picks.clear();
            picks.try_reserve(whole as usize)?;
            while (picks.len() as u64) < whole {
                let suffix = rng.sample(suffixes);
                if taken.insert(suffix) {
                    picks.push(suffix);
                }
            }
            for &suffix in &picks {
                let record = corpus.sample(&mut rng);
                let active = rng.gen_bool(0.5);
                let bytes = record.bytes();
                let array = if active { &self.active } else { &self.inactive };
                array[prefix as usize].insert_new(suffix, record);
                self.count_new_entry(bytes);
            }

            // Entries beyond the integer share go through insert-or-replace,
            // redrawing the suffix on any collision.
            for _ in whole..quota {
                let record = corpus.sample(&mut rng);
                let active = rng.gen_bool(0.5);
                let bytes = record.bytes();
                let array = if active { &self.active } else { &self.inactive };
                let mut suffix = rng.sample(suffixes);
                while taken.contains(&suffix)
                    || !array[prefix as usize].insert(suffix, record.clone()).0
                {
                    suffix = rng.sample(suffixes);
                }
                taken.insert(suffix);
                self.count_new_entry(bytes);
            }

            remaining -= quota;
        }

        if remaining > 0 {
            return Err(Error::BadArg(
                "record share exceeds the block's key space".to_owned(),
            ));
        }
        Ok(())
    }

    fn save_block(&self, block: Range<u32>, file: &str) -> Result<u64> {
        let sink = File::create(file).map_err(|e| Error::FileOpen {
            file: file.to_owned(),
            source: e,
        })?;
        let write_err = |e| Error::FileWrite {
            file: file.to_owned(),
            source: e,
        };
        let mut sink = BufWriter::new(sink);
        let mut lines = 0;
        for prefix in block.clone() {
            lines += self.active[prefix as usize]
                .write_csv(&mut sink, prefix, true, &self.codec)
                .map_err(write_err)?;
        }
        for prefix in block {
            lines += self.inactive[prefix as usize]
                .write_csv(&mut sink, prefix, false, &self.codec)
                .map_err(write_err)?;
        }
        sink.flush().map_err(write_err)?;
        Ok(lines)
    }

    fn load_file(&self, file: &str) -> Result<u64> {
        let reader = File::open(file).map_err(|e| Error::FileOpen {
            file: file.to_owned(),
            source: e,
        })?;
        let mut rows = 0;
        for (index, line) in BufReader::new(reader).lines().enumerate() {
            let line = line.map_err(|e| Error::FileRead {
                file: file.to_owned(),
                source: e,
            })?;
            if line.is_empty() {
                continue;
            }
            let parse_err = || Error::FileParse {
                file: file.to_owned(),
                line: index + 1,
            };
            let (number, record, active) = csv::parse_line(&line).ok_or_else(parse_err)?;
            let (prefix, suffix) = self.codec.split(number).map_err(|_| parse_err())?;
            self.insert_at(prefix, suffix, active, record);
            rows += 1;
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_cover_the_range() {
        let blocks = partition_blocks(10, 4);
        assert_eq!(blocks, vec![0..2, 2..4, 4..6, 6..10]);

        let blocks = partition_blocks(10, 1);
        assert_eq!(blocks, vec![0..10]);

        // Excess workers are not spawned.
        let blocks = partition_blocks(10, 100);
        assert_eq!(blocks.len(), 10);
        assert!(blocks.iter().all(|b| b.len() == 1));
    }

    #[test]
    fn fan_out_joins_all_workers_before_failing() {
        let db = Database::new(crate::DatabaseConfig {
            first_digits: 1,
            second_digits: 9,
            ..Default::default()
        })
        .unwrap();
        let jobs = vec![1u32, 2, 3, 4];
        let result: Result<Vec<u32>> = db.fan_out(jobs, |job| {
            if job == 2 {
                Err(Error::Unknown)
            } else {
                Ok(job)
            }
        });
        assert!(matches!(result, Err(Error::Unknown)));
    }

    #[test]
    fn fan_out_collects_every_result() {
        let db = Database::new(crate::DatabaseConfig {
            first_digits: 1,
            second_digits: 9,
            ..Default::default()
        })
        .unwrap();
        let mut results = db.fan_out(vec![1u64, 2, 3], |job| Ok(job * 10)).unwrap();
        results.sort_unstable();
        assert_eq!(results, vec![10, 20, 30]);
    }
}
