//! Writer hand-out and RAM accounting for the documents writer.

use std::sync::Arc;

use parking_lot::Mutex;
use piggy_common::Result;

use crate::{
    config::IndexWriterConfig,
    delete_queue::{ActiveDeleteQueue, DeleteNode},
    writer_pool::{WriterLease, WriterPool},
};

/// Outcome of [`FlushControl::after_document`].
pub enum AfterDocument {
    /// The writer went back to the pool.
    Released,
    /// The writer crossed its RAM threshold and was taken out of the pool; the caller
    /// owns it and must flush it.
    FlushPending(WriterLease),
}

enum Leased {
    Current(WriterLease),
    /// Bound to an older delete-queue generation that a full flush is draining.
    Stale(WriterLease),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushStats {
    /// Bytes buffered by writers that are not flush-pending.
    pub active_bytes: u64,
    /// Bytes buffered by flush-pending writers.
    pub flush_bytes: u64,
    pub num_pending: usize,
    pub num_pending_deletes: u64,
}

pub struct FlushControl {
    pool: WriterPool,
    delete_queue: Arc<ActiveDeleteQueue>,
    config: Arc<IndexWriterConfig>,
    stats: Mutex<FlushStats>,
}

impl FlushControl {
    pub fn new(
        pool: WriterPool,
        delete_queue: Arc<ActiveDeleteQueue>,
        config: Arc<IndexWriterConfig>,
    ) -> FlushControl {
        FlushControl {
            pool,
            delete_queue,
            config,
            stats: Mutex::new(FlushStats::default()),
        }
    }

    pub fn pool(&self) -> &WriterPool {
        &self.pool
    }

    pub fn stats(&self) -> FlushStats {
        *self.stats.lock()
    }

    pub fn active_bytes(&self) -> u64 {
        self.stats.lock().active_bytes
    }

    pub fn flush_bytes(&self) -> u64 {
        self.stats.lock().flush_bytes
    }

    pub fn num_pending(&self) -> usize {
        self.stats.lock().num_pending
    }

    pub fn num_pending_deletes(&self) -> u64 {
        self.stats.lock().num_pending_deletes
    }

    /// Leases a writer bound to the active delete-queue generation.
    ///
    /// Documents added through the returned writer are never part of a full flush
    /// that was already under way when this returned.
    pub fn obtain_writer(&self) -> Result<WriterLease> {
        loop {
            match self.lease_checked()? {
                Leased::Current(lease) => return Ok(lease),
                Leased::Stale(lease) => self.pool.release_stale_writer(lease)?,
            }
        }
    }

    fn lease_checked(&self) -> Result<Leased> {
        let lease = self.pool.lease_writer()?;
        if self.delete_queue.is_current(lease.delete_queue()) {
            Ok(Leased::Current(lease))
        } else {
            Ok(Leased::Stale(lease))
        }
    }

    /// Updates RAM accounting after documents were added through `lease`.
    ///
    /// Once the writer's buffered bytes reach the per-writer threshold it is marked
    /// flush-pending, checked out of the pool and handed back to the caller.
    pub fn after_document(
        &self,
        mut lease: WriterLease,
        update: Option<&dyn DeleteNode>,
    ) -> Result<AfterDocument> {
        if let Some(node) = update {
            lease.delete_queue().record_update(node);
        }
        let bytes = lease.ram_bytes_used();
        {
            let mut stats = self.stats.lock();
            if update.is_some_and(|node| node.is_delete()) {
                stats.num_pending_deletes += 1;
            }
            if lease.is_flush_pending() {
                stats.flush_bytes = stats.flush_bytes - lease.accounted_bytes() + bytes;
                lease.set_accounted_bytes(bytes);
            } else {
                stats.active_bytes = stats.active_bytes - lease.accounted_bytes() + bytes;
                lease.set_accounted_bytes(bytes);
                if bytes >= self.config.ram_per_writer_flush_bytes {
                    lease.set_flush_pending();
                    stats.active_bytes -= bytes;
                    stats.flush_bytes += bytes;
                    stats.num_pending += 1;
                }
            }
        }
        if lease.is_flush_pending() {
            if self.pool.checkout(&lease) {
                tracing::debug!(
                    writer = lease.id(),
                    bytes,
                    "writer crossed its RAM threshold, flush pending"
                );
            }
            return Ok(AfterDocument::FlushPending(lease));
        }
        self.pool.release_writer(lease)?;
        Ok(AfterDocument::Released)
    }

    /// Drops an aborted writer from accounting and from the pool.
    pub fn abort_writer(&self, lease: WriterLease) {
        {
            let mut stats = self.stats.lock();
            if lease.is_flush_pending() {
                stats.flush_bytes -= lease.accounted_bytes();
                stats.num_pending -= 1;
            } else {
                stats.active_bytes -= lease.accounted_bytes();
            }
        }
        self.pool.checkout(&lease);
        tracing::debug!(writer = lease.id(), "aborted writer checked out");
    }

    /// Releases the bytes of a flush-pending writer once it has been flushed.
    pub fn after_flush(&self, bytes: u64) {
        let mut stats = self.stats.lock();
        stats.flush_bytes = stats.flush_bytes.saturating_sub(bytes);
        stats.num_pending = stats.num_pending.saturating_sub(1);
    }

    /// Takes every writer of the current delete-queue generation out of the pool for
    /// flushing and starts a new generation.
    ///
    /// New writers are held back while the generation is switched, so no writer of the
    /// old generation can appear after this returns.
    pub fn mark_for_full_flush(&self) -> Result<Vec<WriterLease>> {
        self.pool.gate_new_writers()?;
        let old = self.delete_queue.advance();
        let mut writers = self
            .pool
            .filter_and_lock(|w| w.delete_queue().generation() <= old.generation());
        self.take_for_flush(&mut writers);
        self.pool.ungate_new_writers()?;
        tracing::info!(
            generation = old.generation(),
            writers = writers.len(),
            "marked writers for full flush"
        );
        Ok(writers)
    }

    /// Closes the pool and takes every remaining writer, of any generation, out of it
    /// for flushing.
    ///
    /// Batches that were being added when this was called complete first; their
    /// writers are part of the result unless they already became flush-pending.
    pub fn mark_for_close(&self) -> Vec<WriterLease> {
        let mut writers = self.pool.close_and_lock_all();
        self.take_for_flush(&mut writers);
        tracing::info!(writers = writers.len(), "marked writers for final flush");
        writers
    }

    fn take_for_flush(&self, writers: &mut [WriterLease]) {
        let mut stats = self.stats.lock();
        for lease in writers.iter_mut() {
            self.pool.checkout(lease);
            if !lease.is_flush_pending() {
                lease.set_flush_pending();
                stats.active_bytes -= lease.accounted_bytes();
                stats.flush_bytes += lease.accounted_bytes();
                stats.num_pending += 1;
            }
        }
        stats.num_pending_deletes = 0;
    }
}
