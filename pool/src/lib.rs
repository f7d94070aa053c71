//! Lock-free, fixed-capacity object pool for latency-sensitive workloads.
//!
//! This crate provides [`Pool`], a multi-producer multi-consumer pool that
//! hands out and reclaims pre-constructed objects at O(1) cost per operation,
//! without taking locks and without touching the general-purpose allocator on
//! the fast path. It is intended for workloads (market-data handling, event
//! pipelines) where allocator jitter is unacceptable and many threads acquire
//! and release short-lived values concurrently.
//!
//! # Design
//!
//! All objects live in one contiguous, default-constructed storage block.
//! Their addresses circulate through a bounded ring of free pointers,
//! coordinated by two cache-line-isolated cursors and a per-slot publication
//! word (see `ring.rs` for the protocol). If the ring is momentarily empty,
//! [`Pool::acquire`] falls back to a plain heap allocation; the pool
//! recognizes such an object when it comes back by its address falling
//! outside the storage block, and destroys it instead of pooling it.
//!
//! The pool is a pool, not a queue: there is no FIFO guarantee among released
//! objects and no fairness guarantee among contending threads. Each
//! pool-owned pointer is handed to at most one caller at a time.
//!
//! # Example
//!
//! ```
//! use corral_pool::Pool;
//! use prometheus_client::registry::Registry;
//!
//! #[derive(Default)]
//! struct Order {
//!     id: u64,
//!     price: f64,
//! }
//!
//! let mut registry = Registry::default();
//! let pool = Pool::<Order>::new(1024, &mut registry);
//!
//! let mut order = pool.acquire();
//! // SAFETY: the pointer came from `acquire` and is not aliased.
//! unsafe { order.as_mut().id = 42 };
//!
//! // SAFETY: the pointer came from this pool's `acquire` and is released once.
//! unsafe { pool.release(order) };
//! ```

mod metrics;
mod pool;
mod ring;

pub use pool::Pool;

use thiserror::Error;

/// Errors that can arise from free-ring operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// A reservation requested more positions than the ring holds. Cannot
    /// occur through the public API, which only ever reserves single
    /// positions.
    #[error("reservation of {requested} slots exceeds capacity {capacity}")]
    Oversized {
        /// Number of positions requested.
        requested: u32,
        /// Ring capacity in slots.
        capacity: u32,
    },
}
