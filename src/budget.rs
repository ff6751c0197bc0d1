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

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use crate::error::{Error, Result};

/// Process-wide cap on worker threads concurrently servicing database
/// requests.
///
/// Each request reserves as many slots as it will dispatch workers (one for
/// point operations) before touching the database; a reservation that would
/// exceed the cap fails with [`Error::ThreadLimit`] outright. Slots are
/// scoped to the request through [`BudgetSlot`].
#[derive(Debug)]
pub struct WorkerBudget {
    cap: u32,
    in_use: AtomicU32,
}

impl WorkerBudget {
    /// The conventional cap.
    pub const DEFAULT_CAP: u32 = 15;

    pub fn new(cap: u32) -> Self {
        Self {
            cap,
            in_use: AtomicU32::new(0),
        }
    }

    /// Reserve `workers` slots, or fail without side effects.
    pub fn reserve(self: &Arc<Self>, workers: u32) -> Result<BudgetSlot> {
        self.in_use
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |in_use| {
                in_use
                    .checked_add(workers)
                    .filter(|total| *total <= self.cap)
            })
            .map_err(|in_use| Error::ThreadLimit {
                requested: workers,
                in_use,
                cap: self.cap,
            })?;
        Ok(BudgetSlot {
            budget: Arc::clone(self),
            workers,
        })
    }

    /// Slots currently held by in-flight requests.
    pub fn in_use(&self) -> u32 {
        self.in_use.load(Ordering::SeqCst)
    }
}

impl Default for WorkerBudget {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAP)
    }
}

/// A scoped reservation; slots return to the budget on drop.
#[derive(Debug)]
pub struct BudgetSlot {
    budget: Arc<WorkerBudget>,
    workers: u32,
}

impl Drop for BudgetSlot {
    fn drop(&mut self) {
        self.budget.in_use.fetch_sub(self.workers, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserves_up_to_the_cap() {
        let budget = Arc::new(WorkerBudget::new(4));
        let a = budget.reserve(3).unwrap();
        let _b = budget.reserve(1).unwrap();
        assert!(matches!(
            budget.reserve(1),
            Err(Error::ThreadLimit {
                requested: 1,
                in_use: 4,
                cap: 4,
            })
        ));
        drop(a);
        assert_eq!(budget.in_use(), 1);
        let _c = budget.reserve(3).unwrap();
    }

    #[test]
    fn oversized_requests_fail_without_leaking() {
        let budget = Arc::new(WorkerBudget::new(2));
        assert!(budget.reserve(3).is_err());
        assert_eq!(budget.in_use(), 0);
    }
}
