//! Fixed-capacity object pool with heap overflow.
//!
//! The pool pre-constructs every element in one contiguous allocation and
//! recycles their addresses through the lock-free free ring. When the ring is
//! momentarily empty, [`Pool::acquire`] falls back to an untracked heap
//! allocation instead of failing; the fallback is recognized on release
//! because its address falls outside the storage block.

use crate::{metrics::PoolMetrics, ring::FreeRing};
use prometheus_client::registry::Registry;
use std::{cell::UnsafeCell, fmt, mem, ptr::NonNull};
use tracing::debug;

/// A lock-free, fixed-capacity pool of default-constructed `T`.
///
/// Any number of threads may call [`Self::acquire`] and [`Self::release`]
/// concurrently; both are lock-free and O(1). The pool never blocks and never
/// fails to produce an object: exhaustion is absorbed by the overflow path
/// and is observable only through allocation cost (and the overflow metrics).
///
/// The pool hands out raw, non-null pointers rather than guards. Callers own
/// the pointed-to object exclusively between `acquire` and `release` and are
/// responsible for returning it exactly once; there is no destructor-based
/// automatic return.
///
/// Pooled objects are constructed once, at pool construction, and are
/// *not* re-initialized between uses: an acquired object carries whatever
/// state its previous holder left in it.
pub struct Pool<T> {
    /// Free-object ring shared by all producers and consumers.
    ring: FreeRing<T>,
    /// Backing storage. One contiguous block, so pool ownership of a pointer
    /// is decidable by address comparison alone.
    storage: Box<[UnsafeCell<T>]>,
    /// Address of the first element of `storage`.
    lo: usize,
    /// Address of the last element of `storage`, inclusive.
    hi: usize,
    metrics: PoolMetrics,
}

// SAFETY: the pool hands out exclusive access to distinct elements; between
// acquire and release an element is reachable from exactly one holder, so
// moving the pool (or sharing it) across threads only requires the elements
// themselves to be sendable.
unsafe impl<T: Send> Send for Pool<T> {}
// SAFETY: shared-state coordination goes through atomics in the ring; the
// elements are never accessed through `&Pool` by the pool itself.
unsafe impl<T: Send> Sync for Pool<T> {}

impl<T: Default> Pool<T> {
    /// Creates a pool holding `capacity` default-constructed elements and
    /// registers its metrics.
    ///
    /// Construction threads every element's address through the full
    /// reservation-and-publish protocol, so the ring starts exactly full.
    ///
    /// # Panics
    ///
    /// - `capacity` is zero or not a power of two
    /// - `T` is zero-sized: zero-sized heap allocations do not have unique
    ///   addresses, which would break the address-range ownership test
    pub fn new(capacity: u32, registry: &mut Registry) -> Self {
        assert!(
            capacity > 0 && capacity.is_power_of_two(),
            "capacity must be a positive power of two"
        );
        assert!(
            mem::size_of::<T>() > 0,
            "zero-sized types cannot be pooled"
        );

        let storage: Box<[UnsafeCell<T>]> =
            (0..capacity).map(|_| UnsafeCell::new(T::default())).collect();
        let lo = storage.as_ptr() as usize;
        let hi = lo + (capacity as usize - 1) * mem::size_of::<T>();

        let mut ring = FreeRing::new(capacity);
        ring.reseed(storage.iter().map(|cell| cell.get()));

        let metrics = PoolMetrics::new(registry);
        metrics.available.set(capacity as i64);

        debug!(capacity, "object pool initialized");
        Self {
            ring,
            storage,
            lo,
            hi,
            metrics,
        }
    }

    /// Takes an object out of the pool.
    ///
    /// The returned pointer is never null and is valid for reads and writes
    /// until it is passed back to [`Self::release`]. If the ring is empty,
    /// the object is a fresh default-constructed heap allocation instead of
    /// a pooled one; callers cannot (and need not) tell the difference,
    /// except through [`Self::is_pooled`].
    pub fn acquire(&self) -> NonNull<T> {
        if let Some((ptr, width)) = self.ring.consume() {
            debug_assert_eq!(width, 1, "pool publications are single-slot");
            debug_assert!(self.is_pooled(ptr));
            self.metrics.acquisitions_total.inc();
            self.metrics.acquired.inc();
            self.metrics.available.dec();
            return ptr;
        }

        // Ring empty: overflow to the heap. The pointer is recognized on
        // release by falling outside the storage bounds.
        self.metrics.overflow_allocations_total.inc();
        NonNull::from(Box::leak(Box::new(T::default())))
    }
}

impl<T> Pool<T> {
    /// Returns the pool capacity.
    pub const fn capacity(&self) -> u32 {
        self.ring.capacity()
    }

    /// Returns whether `ptr` addresses an element of the pool's storage
    /// block, as opposed to an overflow allocation.
    pub fn is_pooled(&self, ptr: NonNull<T>) -> bool {
        let addr = ptr.as_ptr() as usize;
        self.lo <= addr && addr <= self.hi
    }

    /// Returns an object to the pool.
    ///
    /// Pool-owned pointers re-enter the free ring; overflow pointers are
    /// destroyed.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by a prior [`Self::acquire`] on this
    /// pool and must not have been released since. The caller must no longer
    /// access the object afterwards. Releasing an unrelated pointer is
    /// undefined behavior: one that lands outside the storage bounds is
    /// freed as if heap-allocated, and one that happens to land inside them
    /// is inserted into the ring and corrupts the pool.
    pub unsafe fn release(&self, ptr: NonNull<T>) {
        if self.is_pooled(ptr) {
            let index = self
                .ring
                .reserve(1)
                .expect("a single position always fits the ring");
            self.ring.publish(index, 1, ptr.as_ptr());
            self.metrics.releases_total.inc();
            self.metrics.acquired.dec();
            self.metrics.available.inc();
        } else {
            // SAFETY: per this function's contract, a pointer outside the
            // storage bounds was produced by the overflow path in `acquire`,
            // which leaked a `Box<T>`.
            drop(unsafe { Box::from_raw(ptr.as_ptr()) });
            self.metrics.overflow_frees_total.inc();
        }
    }

    /// Rewinds the pool to its freshly constructed state.
    ///
    /// Every element is made available again and all previously acquired
    /// pointers are invalidated. Intended for test rigs; the exclusive
    /// borrow is what rules out concurrent `acquire`/`release`. Outstanding
    /// overflow objects are not reclaimed and must still be released.
    pub fn reset(&mut self) {
        self.ring.reseed(self.storage.iter().map(|cell| cell.get()));
        self.metrics.acquired.set(0);
        self.metrics.available.set(self.capacity() as i64);
        debug!("object pool reset");
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("capacity", &self.capacity())
            .field("acquired", &self.metrics.acquired.get())
            .field("available", &self.metrics.available.get())
            .finish()
    }
}
