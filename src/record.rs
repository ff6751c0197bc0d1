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

/// A subscriber entry: the name triple stored under a phone number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    /// Family name.
    pub last_name: String,
    /// Given name.
    pub first_name: String,
    /// Patronymic.
    pub patronymic: String,
}

impl Record {
    /// Create a record from the name triple.
    pub fn new(
        last_name: impl Into<String>,
        first_name: impl Into<String>,
        patronymic: impl Into<String>,
    ) -> Self {
        Self {
            last_name: last_name.into(),
            first_name: first_name.into(),
            patronymic: patronymic.into(),
        }
    }

    /// Byte footprint of the record: the summed lengths of the three names.
    pub fn bytes(&self) -> u64 {
        (self.last_name.len() + self.first_name.len() + self.patronymic.len()) as u64
    }
}
