//! Accounting for the intermediate buffers of fusion invocations.
//!
//! Every generation of intermediate pixels (warped copies, the fused frame,
//! the tone-mapped frame, the sharpened frame) is covered by a
//! [`BufferLease`]. The lease reserves bytes from a [`BufferAllocator`] when
//! created and returns them when dropped.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{FusionError, Result};

/// Source of buffer capacity, shared across pipeline instances.
pub trait BufferAllocator: Send + Sync {
    /// Claim `bytes`, failing with `OutOfMemory` if they cannot be provided.
    fn reserve(&self, bytes: usize) -> Result<()>;

    /// Return bytes claimed by an earlier successful `reserve`.
    fn release(&self, bytes: usize);
}

#[derive(Debug, Default)]
struct PoolState {
    in_use: usize,
    peak: usize,
}

/// Byte-counting allocator with an optional budget.
#[derive(Debug, Default)]
pub struct BufferPool {
    budget: Option<usize>,
    state: Mutex<PoolState>,
}

impl BufferPool {
    pub fn new(budget: Option<usize>) -> Self {
        Self {
            budget,
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn shared(budget: Option<usize>) -> Arc<Self> {
        Arc::new(Self::new(budget))
    }

    pub fn budget(&self) -> Option<usize> {
        self.budget
    }

    pub fn in_use(&self) -> usize {
        self.state.lock().in_use
    }

    /// Highest `in_use` seen since creation.
    pub fn peak(&self) -> usize {
        self.state.lock().peak
    }

    pub fn available(&self) -> Option<usize> {
        self.budget.map(|b| b.saturating_sub(self.in_use()))
    }
}

impl BufferAllocator for BufferPool {
    fn reserve(&self, bytes: usize) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(budget) = self.budget {
            let available = budget.saturating_sub(state.in_use);
            if bytes > available {
                return Err(FusionError::OutOfMemory {
                    requested: bytes,
                    available,
                });
            }
        }
        state.in_use += bytes;
        state.peak = state.peak.max(state.in_use);
        Ok(())
    }

    fn release(&self, bytes: usize) {
        let mut state = self.state.lock();
        state.in_use = state.in_use.saturating_sub(bytes);
    }
}

/// RAII reservation for one buffer generation.
pub struct BufferLease {
    allocator: Arc<dyn BufferAllocator>,
    bytes: usize,
}

impl BufferLease {
    pub fn acquire(allocator: &Arc<dyn BufferAllocator>, bytes: usize) -> Result<Self> {
        allocator.reserve(bytes)?;
        debug!(bytes, "Buffer generation reserved");
        Ok(Self {
            allocator: Arc::clone(allocator),
            bytes,
        })
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for BufferLease {
    fn drop(&mut self) {
        self.allocator.release(self.bytes);
    }
}

impl std::fmt::Debug for BufferLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferLease").field("bytes", &self.bytes).finish()
    }
}
