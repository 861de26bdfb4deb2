//! Pool of per-thread writers handed out under exclusive locks.

use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};

use ahash::AHashMap;
use parking_lot::{Condvar, Mutex, RawMutex, lock_api::ArcMutexGuard};
use piggy_collections::ApproximatePriorityQueue;
use piggy_common::{Result, error::Error};

use crate::per_thread_writer::PerThreadWriter;

pub type WriterSlot = Arc<Mutex<PerThreadWriter>>;

/// Builds a new writer for the given writer number.
pub type WriterFactory = Box<dyn Fn(u64) -> Result<PerThreadWriter> + Send + Sync>;

/// Exclusive access to a pooled writer. Dropping the lease unlocks the writer
/// without returning it to the free list.
pub struct WriterLease {
    guard: ArcMutexGuard<RawMutex, PerThreadWriter>,
}

impl WriterLease {
    fn slot(&self) -> &WriterSlot {
        ArcMutexGuard::mutex(&self.guard)
    }
}

impl Deref for WriterLease {
    type Target = PerThreadWriter;

    fn deref(&self) -> &PerThreadWriter {
        &self.guard
    }
}

impl DerefMut for WriterLease {
    fn deref_mut(&mut self) -> &mut PerThreadWriter {
        &mut self.guard
    }
}

#[derive(Default)]
struct PoolState {
    registered: AHashMap<u64, WriterSlot>,
    free: ApproximatePriorityQueue<WriterSlot>,
    taken_writer_permits: usize,
    pending_creations: usize,
    next_writer_id: u64,
    closed: bool,
}

impl PoolState {
    fn is_registered(&self, id: u64, slot: &WriterSlot) -> bool {
        self.registered
            .get(&id)
            .is_some_and(|registered| Arc::ptr_eq(registered, slot))
    }
}

/// Registered writers plus a free list ordered by buffered bytes.
///
/// The internal lock only guards bookkeeping; writer construction (which creates
/// segment files) runs outside of it. While the new-writer gate is shut, leasing
/// falls back to waiting instead of constructing a writer.
pub struct WriterPool {
    state: Mutex<PoolState>,
    cond: Condvar,
    factory: WriterFactory,
}

impl WriterPool {
    pub fn new(factory: WriterFactory) -> WriterPool {
        WriterPool {
            state: Mutex::new(PoolState::default()),
            cond: Condvar::new(),
            factory,
        }
    }

    fn closed_error() -> Error {
        Error::concurrency_violation("writer pool is closed")
    }

    /// Leases the lightest free writer that can be locked without blocking, or
    /// constructs a new one.
    pub fn lease_writer(&self) -> Result<WriterLease> {
        let mut state = self.state.lock();
        let id = loop {
            if state.closed {
                return Err(Self::closed_error());
            }
            if let Some((_, guard)) = state.free.poll_map(|slot| slot.try_lock_arc()) {
                return Ok(WriterLease { guard });
            }
            if state.taken_writer_permits == 0 {
                let id = state.next_writer_id;
                state.next_writer_id += 1;
                state.pending_creations += 1;
                break id;
            }
            self.cond.wait(&mut state);
        };
        drop(state);

        let created = (self.factory)(id);

        let mut state = self.state.lock();
        state.pending_creations -= 1;
        if state.pending_creations == 0 {
            self.cond.notify_all();
        }
        let writer = created?;
        if state.closed {
            return Err(Self::closed_error());
        }
        let slot = Arc::new(Mutex::new(writer));
        let guard = slot.lock_arc();
        state.registered.insert(id, slot);
        Ok(WriterLease { guard })
    }

    /// Returns a leased writer to the free list and unlocks it.
    ///
    /// An aborted writer is checked out instead. Fails if the writer is not registered
    /// with this pool.
    pub fn release_writer(&self, lease: WriterLease) -> Result<()> {
        let id = lease.id();
        let mut state = self.state.lock();
        if !state.is_registered(id, lease.slot()) {
            return Err(Error::concurrency_violation(format!(
                "writer {id} is not registered with this pool"
            )));
        }
        if lease.is_aborted() {
            state.registered.remove(&id);
            self.cond.notify_all();
            return Ok(());
        }
        let weight = lease.ram_bytes_used();
        state.free.add(lease.slot().clone(), weight);
        drop(lease);
        Ok(())
    }

    /// Removes a writer from the pool for good. Returns `false` if it was not registered.
    pub fn checkout(&self, lease: &WriterLease) -> bool {
        let id = lease.id();
        let mut state = self.state.lock();
        if !state.is_registered(id, lease.slot()) {
            return false;
        }
        state.registered.remove(&id);
        state.free.remove(|slot| Arc::ptr_eq(slot, lease.slot()));
        self.cond.notify_all();
        true
    }

    /// Returns a writer bound to an outdated delete-queue generation and blocks until
    /// it has left the pool (a full flush checked it out) or the pool is closed.
    pub fn release_stale_writer(&self, lease: WriterLease) -> Result<()> {
        let id = lease.id();
        let slot = lease.slot().clone();
        self.release_writer(lease)?;
        let mut state = self.state.lock();
        while !state.closed && state.is_registered(id, &slot) {
            self.cond.wait(&mut state);
        }
        Ok(())
    }

    pub fn is_registered(&self, lease: &WriterLease) -> bool {
        self.state.lock().is_registered(lease.id(), lease.slot())
    }

    /// Locks every registered writer matching `predicate`, blocking on writers that are
    /// currently leased. Writers checked out while waiting are skipped.
    pub fn filter_and_lock(
        &self,
        mut predicate: impl FnMut(&PerThreadWriter) -> bool,
    ) -> Vec<WriterLease> {
        let mut candidates = self
            .state
            .lock()
            .registered
            .iter()
            .map(|(&id, slot)| (id, slot.clone()))
            .collect::<Vec<_>>();
        candidates.sort_unstable_by_key(|(id, _)| *id);

        let mut locked = Vec::new();
        for (id, slot) in candidates {
            let guard = slot.lock_arc();
            if predicate(&guard) && self.state.lock().is_registered(id, &slot) {
                locked.push(WriterLease { guard });
            }
        }
        locked
    }

    /// Shuts the new-writer gate and waits until no writer is being constructed.
    ///
    /// Gates nest: the gate opens again once every call is matched by
    /// [`WriterPool::ungate_new_writers`].
    pub fn gate_new_writers(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Self::closed_error());
        }
        state.taken_writer_permits += 1;
        while state.pending_creations > 0 {
            self.cond.wait(&mut state);
        }
        Ok(())
    }

    pub fn ungate_new_writers(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.taken_writer_permits == 0 {
            return Err(Error::invalid_operation("ungate without a matching gate"));
        }
        state.taken_writer_permits -= 1;
        if state.taken_writer_permits == 0 {
            self.cond.notify_all();
        }
        Ok(())
    }

    /// Closes the pool and locks every writer still registered with it.
    ///
    /// In-flight writer constructions finish first, and leases held by other threads
    /// are waited for, so every writer handed out before the pool closed is returned
    /// unless its holder took it out of the pool itself.
    pub fn close_and_lock_all(&self) -> Vec<WriterLease> {
        {
            let mut state = self.state.lock();
            state.taken_writer_permits += 1;
            while state.pending_creations > 0 {
                self.cond.wait(&mut state);
            }
            state.closed = true;
            self.cond.notify_all();
        }
        self.filter_and_lock(|_| true)
    }

    /// Number of registered writers.
    pub fn size(&self) -> usize {
        self.state.lock().registered.len()
    }

    pub fn free_count(&self) -> usize {
        self.state.lock().free.len()
    }

    /// Rejects further leases and wakes every thread waiting on the gate.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.cond.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
