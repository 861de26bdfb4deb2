//! Delete-queue generations.
//!
//! Every writer is bound to the delete queue that was active when it was created.
//! A full flush swaps in a new queue, which makes every older writer stale.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use parking_lot::RwLock;

/// A pending update operation attached to an added document.
pub trait DeleteNode: Send + Sync {
    /// Whether the node deletes documents, as opposed to updating doc values only.
    fn is_delete(&self) -> bool;
}

/// Deletes every document whose `field` holds `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteTerm {
    pub field: String,
    pub value: String,
}

impl DeleteTerm {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> DeleteTerm {
        DeleteTerm {
            field: field.into(),
            value: value.into(),
        }
    }
}

impl DeleteNode for DeleteTerm {
    fn is_delete(&self) -> bool {
        true
    }
}

/// One delete-queue generation.
#[derive(Debug, Default)]
pub struct DeleteQueue {
    generation: u64,
    num_updates: AtomicU64,
}

impl DeleteQueue {
    pub fn new(generation: u64) -> DeleteQueue {
        DeleteQueue {
            generation,
            num_updates: AtomicU64::new(0),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn record_update(&self, node: &dyn DeleteNode) {
        if node.is_delete() {
            self.num_updates.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Number of deleting updates recorded against this generation.
    pub fn num_updates(&self) -> u64 {
        self.num_updates.load(Ordering::Relaxed)
    }
}

/// Holder of the currently active delete queue.
#[derive(Debug, Default)]
pub struct ActiveDeleteQueue {
    current: RwLock<Arc<DeleteQueue>>,
}

impl ActiveDeleteQueue {
    pub fn new() -> ActiveDeleteQueue {
        Default::default()
    }

    pub fn current(&self) -> Arc<DeleteQueue> {
        self.current.read().clone()
    }

    /// Installs the next generation and returns the one it replaced.
    pub fn advance(&self) -> Arc<DeleteQueue> {
        let mut current = self.current.write();
        let next = Arc::new(DeleteQueue::new(current.generation + 1));
        std::mem::replace(&mut *current, next)
    }

    pub fn is_current(&self, queue: &DeleteQueue) -> bool {
        self.current.read().generation == queue.generation
    }
}
