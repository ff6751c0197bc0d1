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

//! The delimited text format used by save, load, and the streamed scan.
//!
//! One record per line, five fields separated by `", "`:
//!
//! ```text
//! 8PPPPSSSSSS, LAST, FIRST, PATRONYMIC, A
//! ```
//!
//! where `A` is `1` for an active subscriber and `0` for an inactive one.

use std::io::{self, Write};

use crate::{
    error::{Error, Result},
    record::Record,
};

const SEPARATOR: &str = ", ";

/// Write one record line, `\n`-terminated.
pub(crate) fn write_line(
    sink: &mut impl Write,
    number: &str,
    record: &Record,
    active: bool,
) -> io::Result<()> {
    writeln!(
        sink,
        "{number}{SEPARATOR}{last}{SEPARATOR}{first}{SEPARATOR}{patronymic}{SEPARATOR}{flag}",
        last = record.last_name,
        first = record.first_name,
        patronymic = record.patronymic,
        flag = if active { '1' } else { '0' },
    )
}

/// Parse one record line back into `(number, record, active)`.
///
/// Returns `None` when the line does not hold exactly five `", "`-separated
/// fields with a `0`/`1` activity flag; the caller turns that into a
/// [`Error::FileParse`] carrying the file position.
pub(crate) fn parse_line(line: &str) -> Option<(&str, Record, bool)> {
    let mut fields = line.splitn(5, SEPARATOR);
    let number = fields.next()?;
    let last_name = fields.next()?;
    let first_name = fields.next()?;
    let patronymic = fields.next()?;
    let active = match fields.next()? {
        "1" => true,
        "0" => false,
        _ => return None,
    };
    Some((number, Record::new(last_name, first_name, patronymic), active))
}

/// Derive the per-worker file name from a base name by inserting the worker
/// index immediately before the last four characters: `data.csv` becomes
/// `data0.csv` for worker 0. Callers must pick base names whose extension is
/// exactly four characters including the dot.
pub(crate) fn worker_file_name(base: &str, index: usize) -> Result<String> {
    let cut = base
        .len()
        .checked_sub(4)
        .filter(|cut| base.is_char_boundary(*cut))
        .ok_or_else(|| {
            Error::BadArg(format!(
                "file name {base:?} is too short for a four-character extension"
            ))
        })?;
    Ok(format!("{}{}{}", &base[..cut], index, &base[cut..]))
}
