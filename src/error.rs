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

use std::{collections::TryReserveError, io, time::Duration};

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure kinds surfaced by database operations.
///
/// Every public operation either completes fully or fails with one of these
/// kinds, leaving the database invariants intact. The boundary reports the
/// stable [`Error::kind`] tag plus the display message in the `ERROR` header.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed phone number.
    #[error("malformed phone number {0:?}: expected 11 decimal digits")]
    BadKey(String),

    /// An argument is out of its accepted range.
    #[error("bad argument: {0}")]
    BadArg(String),

    /// A precondition on the database population was not met within the wait
    /// time (e.g. generating into a non-empty database).
    #[error("operation out of sequence: the database is {0}")]
    Sequence(&'static str),

    /// A bounded wait on the gate elapsed.
    #[error("timed out after {0:?} waiting on the database gate")]
    Timeout(Duration),

    /// Reserving request workers would exceed the process-wide cap.
    #[error("worker budget exhausted: {requested} requested, {in_use} of {cap} in use")]
    ThreadLimit {
        /// Slots the request asked for.
        requested: u32,
        /// Slots held by in-flight requests at the time of the refusal.
        in_use: u32,
        /// The process-wide cap.
        cap: u32,
    },

    /// A data file could not be opened.
    #[error("cannot open {file}: {source}")]
    FileOpen {
        /// Offending file name.
        file: String,
        /// Underlying I/O fault.
        source: io::Error,
    },

    /// A data file could not be read.
    #[error("cannot read {file}: {source}")]
    FileRead {
        /// Offending file name.
        file: String,
        /// Underlying I/O fault.
        source: io::Error,
    },

    /// A data file or output stream could not be written.
    #[error("cannot write {file}: {source}")]
    FileWrite {
        /// Offending file name.
        file: String,
        /// Underlying I/O fault.
        source: io::Error,
    },

    /// A data file line did not match the expected five-field format.
    #[error("cannot parse {file}, line {line}")]
    FileParse {
        /// Offending file name.
        file: String,
        /// One-based line number.
        line: usize,
    },

    /// A corpus file is missing, unreadable, or holds no names.
    #[error("corpus file {file} unusable: {reason}")]
    BadCorpus {
        /// Offending file name.
        file: String,
        /// What went wrong with it.
        reason: String,
    },

    /// The allocator refused a reservation.
    #[error("out of memory")]
    OutOfMemory,

    /// Catch-all, notably a panicked worker thread.
    #[error("unknown error")]
    Unknown,
}

impl Error {
    /// Stable tag for the boundary `ERROR` header.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::BadKey(_) => "BadKey",
            Error::BadArg(_) => "BadArg",
            Error::Sequence(_) => "Sequence",
            Error::Timeout(_) => "Timeout",
            Error::ThreadLimit { .. } => "ThreadLimit",
            Error::FileOpen { .. } => "FileOpen",
            Error::FileRead { .. } => "FileRead",
            Error::FileWrite { .. } => "FileWrite",
            Error::FileParse { .. } => "FileParse",
            Error::BadCorpus { .. } => "BadCorpus",
            Error::OutOfMemory => "OutOfMemory",
            Error::Unknown => "Unknown",
        }
    }
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Error::OutOfMemory
    }
}
