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

//! An in-memory phonebook database served over HTTP.
//!
//! Subscribers are keyed by an 11-digit phone number and carry a name triple
//! plus an activity flag. The store is cut into two fixed arrays of
//! lock-guarded shards (one per activity), selected by the number's prefix
//! digits and keyed by its suffix digits. A global gate with a two-counter
//! phase split lets parallel point updates coexist with parallel bulk reads
//! while excluding the bulk writers (generate, load, clear), which partition
//! their work across worker threads.

mod budget;
mod corpus;
mod csv;
mod db;
mod error;
mod gate;
mod phone;
mod record;
mod shard;

pub mod server;

pub use budget::{BudgetSlot, WorkerBudget};
pub use corpus::{Corpus, CorpusFiles};
pub use db::{Database, DatabaseConfig, Scan, ScanEntry, ScanGuard};
pub use error::{Error, Result};
pub use phone::PhoneCodec;
pub use record::Record;
pub use server::AppState;
