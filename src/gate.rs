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

//! The global gate: a reader-writer lock with a two-counter phase split.
//!
//! Bulk operations (generate, load, clear) hold the gate exclusively. Point
//! operations and bulk reads hold it shared and are further serialized into
//! one of two phases by the `read_ops` / `write_ops` counters: a shared
//! holder that intends to read waits for in-flight writers to drain, and
//! vice versa. The net effect is a three-state serializer: one exclusive
//! bulk operation, or many parallel point writers, or many parallel readers.
//!
//! Acquiring a hold blocks unboundedly; every *predicate* wait is bounded by
//! the caller's wait time and releases the hold while asleep, reacquiring it
//! before returning, so complementary operations (say, a clear that would
//! make an empty-database wait succeed) can run in the meantime.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct GateState {
    exclusive: bool,
    shared: u32,
    read_ops: u32,
    write_ops: u32,
}

#[derive(Debug, Clone, Copy)]
enum Hold {
    Shared,
    Exclusive,
}

/// Which operation counter a ticket occupies.
#[derive(Debug, Clone, Copy)]
pub(crate) enum OpSide {
    /// Point or bulk read.
    Read,
    /// Point write.
    Write,
}

#[derive(Debug, Default)]
pub(crate) struct Gate {
    state: Mutex<GateState>,
    cond: Condvar,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the gate exclusively, waiting out every shared holder.
    pub fn exclusive(&self) -> ExclusiveGuard<'_> {
        let mut state = self.state.lock();
        self.acquire(&mut state, Hold::Exclusive);
        ExclusiveGuard { gate: self }
    }

    /// Acquire the gate shared, waiting out an exclusive holder.
    pub fn shared(&self) -> SharedGuard<'_> {
        let mut state = self.state.lock();
        self.acquire(&mut state, Hold::Shared);
        SharedGuard { gate: self }
    }

    fn acquire(&self, state: &mut MutexGuard<'_, GateState>, hold: Hold) {
        match hold {
            Hold::Shared => {
                while state.exclusive {
                    self.cond.wait(state);
                }
                state.shared += 1;
            }
            Hold::Exclusive => {
                while state.exclusive || state.shared > 0 {
                    self.cond.wait(state);
                }
                state.exclusive = true;
            }
        }
    }

    fn release(&self, state: &mut GateState, hold: Hold) {
        match hold {
            Hold::Shared => state.shared -= 1,
            Hold::Exclusive => state.exclusive = false,
        }
    }

    /// Wait until `ready` holds, releasing the caller's hold while asleep
    /// and reacquiring it before returning. Returns `false` when the
    /// deadline passes with the predicate still false; the hold is held
    /// again either way.
    fn wait_until(
        &self,
        hold: Hold,
        wait: Duration,
        ready: impl Fn(&GateState) -> bool,
    ) -> bool {
        let deadline = Instant::now() + wait;
        let mut state = self.state.lock();
        loop {
            if ready(&state) {
                return true;
            }
            self.release(&mut state, hold);
            self.cond.notify_all();
            let timed_out = self.cond.wait_until(&mut state, deadline).timed_out();
            self.acquire(&mut state, hold);
            if timed_out {
                return ready(&state);
            }
        }
    }

    fn drop_ticket(&self, side: OpSide) {
        let mut state = self.state.lock();
        match side {
            OpSide::Read => state.read_ops -= 1,
            OpSide::Write => state.write_ops -= 1,
        }
        drop(state);
        self.cond.notify_all();
    }
}

/// Scoped exclusive hold for bulk operations.
#[derive(Debug)]
pub(crate) struct ExclusiveGuard<'a> {
    gate: &'a Gate,
}

impl ExclusiveGuard<'_> {
    /// Bounded wait for a population precondition; see [`Gate::wait_until`].
    pub fn wait_until(&self, wait: Duration, ready: impl Fn() -> bool) -> bool {
        self.gate.wait_until(Hold::Exclusive, wait, |_| ready())
    }
}

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock();
        state.exclusive = false;
        drop(state);
        self.gate.cond.notify_all();
    }
}

/// Scoped shared hold for point operations, bulk reads, and external scans.
#[derive(Debug)]
pub(crate) struct SharedGuard<'a> {
    gate: &'a Gate,
}

impl<'a> SharedGuard<'a> {
    /// Bounded wait for a population precondition; see [`Gate::wait_until`].
    pub fn wait_until(&self, wait: Duration, ready: impl Fn() -> bool) -> bool {
        self.gate.wait_until(Hold::Shared, wait, |_| ready())
    }

    /// Enter the read phase: bump `read_ops`, then wait out in-flight
    /// writers. On timeout the bump is rolled back and the operation fails
    /// with [`Error::Timeout`].
    pub fn begin_read(&self, wait: Duration) -> Result<OpTicket<'a>> {
        self.begin(OpSide::Read, wait)
    }

    /// Enter the write phase: bump `write_ops`, then wait out in-flight
    /// readers. Rolls back on timeout like [`SharedGuard::begin_read`].
    pub fn begin_write(&self, wait: Duration) -> Result<OpTicket<'a>> {
        self.begin(OpSide::Write, wait)
    }

    fn begin(&self, side: OpSide, wait: Duration) -> Result<OpTicket<'a>> {
        let gate = self.gate;
        {
            let mut state = gate.state.lock();
            match side {
                OpSide::Read => state.read_ops += 1,
                OpSide::Write => state.write_ops += 1,
            }
        }
        let drained = gate.wait_until(Hold::Shared, wait, |state| match side {
            OpSide::Read => state.write_ops == 0,
            OpSide::Write => state.read_ops == 0,
        });
        if drained {
            Ok(OpTicket { gate, side })
        } else {
            gate.drop_ticket(side);
            Err(Error::Timeout(wait))
        }
    }
}

impl Drop for SharedGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock();
        state.shared -= 1;
        drop(state);
        self.gate.cond.notify_all();
    }
}

/// Occupancy of one operation counter, released on drop.
#[derive(Debug)]
pub(crate) struct OpTicket<'a> {
    gate: &'a Gate,
    side: OpSide,
}

impl Drop for OpTicket<'_> {
    fn drop(&mut self) {
        self.gate.drop_ticket(self.side);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicBool, AtomicU32, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    use super::*;

    const SHORT: Duration = Duration::from_millis(50);

    #[test]
    fn shared_holders_coexist() {
        let gate = Gate::new();
        let a = gate.shared();
        let b = gate.shared();
        drop(a);
        drop(b);
    }

    #[test]
    fn exclusive_excludes_shared() {
        let gate = Arc::new(Gate::new());
        let guard = gate.exclusive();
        let entered = Arc::new(AtomicBool::new(false));

        let handle = {
            let gate = Arc::clone(&gate);
            let entered = Arc::clone(&entered);
            thread::spawn(move || {
                let _shared = gate.shared();
                entered.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(SHORT);
        assert!(!entered.load(Ordering::SeqCst));
        drop(guard);
        handle.join().unwrap();
        assert!(entered.load(Ordering::SeqCst));
    }

    #[test]
    fn predicate_wait_times_out() {
        let gate = Gate::new();
        let guard = gate.shared();
        assert!(!guard.wait_until(SHORT, || false));
        assert!(guard.wait_until(SHORT, || true));
    }

    #[test]
    fn predicate_wait_releases_the_exclusive_hold() {
        let gate = Arc::new(Gate::new());
        let flag = Arc::new(AtomicBool::new(false));

        let handle = {
            let gate = Arc::clone(&gate);
            let flag = Arc::clone(&flag);
            thread::spawn(move || {
                // Enters only while the main thread's predicate wait has let
                // go of the exclusive hold.
                let _guard = gate.exclusive();
                flag.store(true, Ordering::SeqCst);
            })
        };

        let guard = gate.exclusive();
        let flag_check = Arc::clone(&flag);
        assert!(guard.wait_until(Duration::from_secs(5), move || {
            flag_check.load(Ordering::SeqCst)
        }));
        drop(guard);
        handle.join().unwrap();
    }

    #[test]
    fn writer_ticket_waits_for_readers() {
        let gate = Arc::new(Gate::new());
        let reader_guard = gate.shared();
        let reader = reader_guard.begin_read(SHORT).unwrap();

        let writer_guard = gate.shared();
        assert!(matches!(
            writer_guard.begin_write(SHORT),
            Err(Error::Timeout(_))
        ));

        drop(reader);
        let _writer = writer_guard.begin_write(SHORT).unwrap();
    }

    #[test]
    fn ticket_timeout_rolls_the_counter_back() {
        let gate = Arc::new(Gate::new());
        let reader_guard = gate.shared();
        let _reader = reader_guard.begin_read(SHORT).unwrap();

        let writer_guard = gate.shared();
        assert!(writer_guard.begin_write(SHORT).is_err());
        drop(writer_guard);

        // A second reader must not see a stale write_ops count.
        let other = gate.shared();
        let _second = other.begin_read(SHORT).unwrap();
    }

    #[test]
    fn parallel_writers_coexist() {
        let gate = Arc::new(Gate::new());
        let active = Arc::new(AtomicU32::new(0));
        let peak = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    let guard = gate.shared();
                    let _ticket = guard.begin_write(Duration::from_secs(5)).unwrap();
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(SHORT);
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) > 1);
    }
}
