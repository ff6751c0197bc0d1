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

use crate::error::{Error, Result};

/// Splits 11-digit phone numbers of shape `8DDDDDDDDDD` into a
/// `(prefix, suffix)` pair of shard coordinates and joins them back.
///
/// The leading `8` is fixed and excluded: the remaining ten digits are cut
/// into a prefix of `first_digits` digits selecting the shard and a suffix of
/// `second_digits` digits keying the shard's inner map. The mapping is
/// reversible: [`PhoneCodec::join`] is the exact inverse of
/// [`PhoneCodec::split`] for any in-range pair.
#[derive(Debug, Clone)]
pub struct PhoneCodec {
    first_digits: u32,
    second_digits: u32,
    prefix_space: u32,
    suffix_space: u32,
}

impl PhoneCodec {
    /// Create a codec cutting the ten hashed digits into `first_digits` +
    /// `second_digits`. Both lengths must lie in `1..=9` and sum to 10.
    pub fn new(first_digits: u32, second_digits: u32) -> Result<Self> {
        if !(1..=9).contains(&first_digits)
            || !(1..=9).contains(&second_digits)
            || first_digits + second_digits != 10
        {
            return Err(Error::BadArg(format!(
                "digit split ({first_digits}, {second_digits}) must be two lengths in 1..=9 summing to 10"
            )));
        }
        Ok(Self {
            first_digits,
            second_digits,
            prefix_space: 10u32.pow(first_digits),
            suffix_space: 10u32.pow(second_digits),
        })
    }

    /// Number of digits in the prefix half.
    pub fn first_digits(&self) -> u32 {
        self.first_digits
    }

    /// Number of digits in the suffix half.
    pub fn second_digits(&self) -> u32 {
        self.second_digits
    }

    /// Number of distinct prefixes, i.e. the shard-array length.
    pub fn prefix_space(&self) -> u32 {
        self.prefix_space
    }

    /// Number of distinct suffixes a single shard can hold.
    pub fn suffix_space(&self) -> u32 {
        self.suffix_space
    }

    /// Split a phone number into its `(prefix, suffix)` coordinates.
    ///
    /// Fails with [`Error::BadKey`] unless `number` is exactly 11 ASCII
    /// decimal digits.
    pub fn split(&self, number: &str) -> Result<(u32, u32)> {
        if number.len() != 11 || !number.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::BadKey(number.to_owned()));
        }
        let cut = 1 + self.first_digits as usize;
        let prefix = number[1..cut]
            .parse()
            .map_err(|_| Error::BadKey(number.to_owned()))?;
        let suffix = number[cut..]
            .parse()
            .map_err(|_| Error::BadKey(number.to_owned()))?;
        Ok((prefix, suffix))
    }

    /// Rebuild the phone number from its coordinates, zero-padding both
    /// halves to their digit counts. The result is always 11 characters.
    pub fn join(&self, prefix: u32, suffix: u32) -> String {
        debug_assert!(prefix < self.prefix_space && suffix < self.suffix_space);
        format!(
            "8{prefix:0fw$}{suffix:0sw$}",
            fw = self.first_digits as usize,
            sw = self.second_digits as usize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_splits() {
        assert!(PhoneCodec::new(0, 10).is_err());
        assert!(PhoneCodec::new(10, 0).is_err());
        assert!(PhoneCodec::new(4, 7).is_err());
        assert!(PhoneCodec::new(4, 6).is_ok());
        assert!(PhoneCodec::new(9, 1).is_ok());
    }

    #[test]
    fn splits_and_joins() {
        let codec = PhoneCodec::new(4, 6).unwrap();
        assert_eq!(codec.split("89991112233").unwrap(), (9991, 112233));
        assert_eq!(codec.join(9991, 112233), "89991112233");
        assert_eq!(codec.join(1, 2), "80001000002");
    }

    #[test]
    fn rejects_malformed_numbers() {
        let codec = PhoneCodec::new(4, 6).unwrap();
        assert!(matches!(codec.split(""), Err(Error::BadKey(_))));
        assert!(matches!(codec.split("8999111223"), Err(Error::BadKey(_))));
        assert!(matches!(codec.split("899911122334"), Err(Error::BadKey(_))));
        assert!(matches!(codec.split("8999111223x"), Err(Error::BadKey(_))));
        assert!(matches!(codec.split("8999111/233"), Err(Error::BadKey(_))));
    }

    #[test]
    fn round_trips() {
        let codec = PhoneCodec::new(4, 6).unwrap();
        for (prefix, suffix) in [(0, 0), (1, 999_999), (9999, 0), (1234, 567_890)] {
            assert_eq!(codec.split(&codec.join(prefix, suffix)).unwrap(), (prefix, suffix));
        }
        for number in ["80000000000", "89999999999", "81234567890"] {
            let (prefix, suffix) = codec.split(number).unwrap();
            assert_eq!(codec.join(prefix, suffix), number);
        }
    }
}
