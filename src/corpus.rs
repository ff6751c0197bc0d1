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

//! The random-name corpus backing synthetic generation: six single-column
//! name lists (last/first/patronymic, each split by sex), loaded into memory
//! once per generate call and shared by reference across the workers.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    record::Record,
};

/// Locations of the six corpus files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusFiles {
    /// Male family names, one per line.
    #[serde(default = "default::last_name_male")]
    pub last_name_male: PathBuf,
    /// Female family names.
    #[serde(default = "default::last_name_female")]
    pub last_name_female: PathBuf,
    /// Male given names.
    #[serde(default = "default::first_name_male")]
    pub first_name_male: PathBuf,
    /// Female given names.
    #[serde(default = "default::first_name_female")]
    pub first_name_female: PathBuf,
    /// Male patronymics.
    #[serde(default = "default::patronymic_male")]
    pub patronymic_male: PathBuf,
    /// Female patronymics.
    #[serde(default = "default::patronymic_female")]
    pub patronymic_female: PathBuf,
}

mod default {
    use std::path::PathBuf;

    pub fn last_name_male() -> PathBuf {
        "last_name_male.csv".into()
    }
    pub fn last_name_female() -> PathBuf {
        "last_name_female.csv".into()
    }
    pub fn first_name_male() -> PathBuf {
        "first_name_male.csv".into()
    }
    pub fn first_name_female() -> PathBuf {
        "first_name_female.csv".into()
    }
    pub fn patronymic_male() -> PathBuf {
        "patronymic_male.csv".into()
    }
    pub fn patronymic_female() -> PathBuf {
        "patronymic_female.csv".into()
    }
}

impl Default for CorpusFiles {
    fn default() -> Self {
        Self::in_dir(".")
    }
}

impl CorpusFiles {
    /// The conventional six file names resolved against `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            last_name_male: dir.join(default::last_name_male()),
            last_name_female: dir.join(default::last_name_female()),
            first_name_male: dir.join(default::first_name_male()),
            first_name_female: dir.join(default::first_name_female()),
            patronymic_male: dir.join(default::patronymic_male()),
            patronymic_female: dir.join(default::patronymic_female()),
        }
    }
}

#[derive(Debug)]
struct NamePool {
    male: Vec<String>,
    female: Vec<String>,
}

impl NamePool {
    fn pick<R: Rng>(&self, rng: &mut R, male: bool) -> &str {
        let pool = if male { &self.male } else { &self.female };
        &pool[rng.gen_range(0..pool.len())]
    }
}

/// The six name lists, immutable once loaded.
#[derive(Debug)]
pub struct Corpus {
    last: NamePool,
    first: NamePool,
    patronymic: NamePool,
}

impl Corpus {
    /// Read the six files into memory. Any missing, unreadable, or empty
    /// file fails with [`Error::BadCorpus`] naming it.
    pub fn load(files: &CorpusFiles) -> Result<Self> {
        Ok(Self {
            last: NamePool {
                male: read_names(&files.last_name_male)?,
                female: read_names(&files.last_name_female)?,
            },
            first: NamePool {
                male: read_names(&files.first_name_male)?,
                female: read_names(&files.first_name_female)?,
            },
            patronymic: NamePool {
                male: read_names(&files.patronymic_male)?,
                female: read_names(&files.patronymic_female)?,
            },
        })
    }

    /// Draw one subscriber: sex by fair coin, then one name from each
    /// matching list, uniformly and independently.
    pub(crate) fn sample<R: Rng>(&self, rng: &mut R) -> Record {
        let male = rng.gen_bool(0.5);
        Record::new(
            self.last.pick(rng, male),
            self.first.pick(rng, male),
            self.patronymic.pick(rng, male),
        )
    }
}

fn read_names(path: &Path) -> Result<Vec<String>> {
    let bad = |reason: String| Error::BadCorpus {
        file: path.display().to_string(),
        reason,
    };
    let file = File::open(path).map_err(|e| bad(e.to_string()))?;
    let mut names = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| bad(e.to_string()))?;
        let name = line.trim();
        if !name.is_empty() {
            names.push(name.to_owned());
        }
    }
    if names.is_empty() {
        return Err(bad("no names in file".to_owned()));
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf};

    use rand::thread_rng;
    use tempfile::TempDir;

    use super::*;

    pub(crate) fn write_corpus(dir: &Path) -> CorpusFiles {
        let files = CorpusFiles::in_dir(dir);
        fs::write(&files.last_name_male, "Ivanov\nPetrov\n").unwrap();
        fs::write(&files.last_name_female, "Ivanova\nPetrova\n").unwrap();
        fs::write(&files.first_name_male, "Ivan\nPetr\n").unwrap();
        fs::write(&files.first_name_female, "Anna\nOlga\n").unwrap();
        fs::write(&files.patronymic_male, "Ivanovich\nPetrovich\n").unwrap();
        fs::write(&files.patronymic_female, "Ivanovna\nPetrovna\n").unwrap();
        files
    }

    #[test]
    fn loads_and_samples() {
        let dir = TempDir::new().unwrap();
        let corpus = Corpus::load(&write_corpus(dir.path())).unwrap();
        let mut rng = thread_rng();
        for _ in 0..32 {
            let record = corpus.sample(&mut rng);
            assert!(!record.last_name.is_empty());
            assert!(!record.first_name.is_empty());
            assert!(!record.patronymic.is_empty());
            // Sex-consistent draws: a male family name never pairs with a
            // female patronymic.
            let male = record.patronymic.ends_with("ich");
            assert_eq!(record.last_name.ends_with('a'), !male);
        }
    }

    #[test]
    fn missing_file_is_bad_corpus() {
        let files = CorpusFiles::in_dir(PathBuf::from("/nonexistent"));
        match Corpus::load(&files) {
            Err(Error::BadCorpus { file, .. }) => assert!(file.contains("last_name_male")),
            other => panic!("expected BadCorpus, got {other:?}"),
        }
    }

    #[test]
    fn empty_file_is_bad_corpus() {
        let dir = TempDir::new().unwrap();
        let files = write_corpus(dir.path());
        fs::write(&files.patronymic_female, "\n\n").unwrap();
        match Corpus::load(&files) {
            Err(Error::BadCorpus { file, reason }) => {
                assert!(file.contains("patronymic_female"));
                assert!(reason.contains("no names"));
            }
            other => panic!("expected BadCorpus, got {other:?}"),
        }
    }
}
