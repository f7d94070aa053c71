//! Lock-free ring of free-object pointers.
//!
//! The ring is the coordination core of the pool: a bounded, power-of-two
//! array of pointer slots shared by any number of producers (threads
//! returning objects) and consumers (threads taking objects).
//!
//! # Protocol
//!
//! Positions are identified by a monotonically increasing 64-bit *absolute
//! index*; the low `log2(capacity)` bits select a slot. Producers first
//! *reserve* a range of absolute indices by advancing the producer cursor
//! with a CAS, then *publish* by writing the pointer into the slot and
//! release-storing the slot's `data_index` to the absolute index. Consumers
//! acquire-load the slot addressed by the consumer cursor and claim it with a
//! CAS once a same-index publication is visible.
//!
//! Because a slot's `data_index` only ever holds absolute indices, it doubles
//! as a generation number: a record below the consumer cursor belongs to a
//! previous lap and reads as empty, without any ABA hazard on the slot
//! contents.
//!
//! # Wrap-skip
//!
//! A reservation wider than the space left before the end of the ring is not
//! allowed to straddle it (slot addressing must stay a pure bitmask). The
//! reserving producer instead advances the cursor past the end and records a
//! *skip* at the straddled slot: a publication whose `data_index` points at
//! the post-wrap index. Consumers parked on the hole fast-forward their
//! cursor to that index instead of waiting for a publication that will never
//! come.

use crate::Error;
use crossbeam_utils::CachePadded;
use std::{
    ptr::NonNull,
    sync::atomic::{AtomicPtr, AtomicU32, AtomicU64, Ordering},
};

/// Sentinel `data_index` meaning "no publication recorded in this slot".
const VACANT: u64 = u64::MAX;

/// Per-slot publication record.
///
/// `width` is synchronized by the release store to `data_index`: it is
/// written before the store on the producer side and read after the acquire
/// load on the consumer side, so relaxed accesses suffice.
struct Slot {
    /// Absolute index of the publication occupying this slot, or [`VACANT`].
    data_index: AtomicU64,
    /// Number of consecutive positions the publication covers.
    width: AtomicU32,
}

impl Slot {
    fn vacant() -> Self {
        Self {
            data_index: AtomicU64::new(VACANT),
            width: AtomicU32::new(1),
        }
    }
}

/// Bounded MPMC ring of free-object pointers.
///
/// The ring stores bare pointers and never dereferences them; ownership and
/// lifetime of the pointed-to objects are the caller's concern.
pub(crate) struct FreeRing<T> {
    /// Next absolute index to reserve. Isolated on its own cache line so
    /// producer traffic does not invalidate the consumer's line.
    producer: CachePadded<AtomicU64>,
    /// Next absolute index to consume.
    consumer: CachePadded<AtomicU64>,
    /// Publication records, one per slot.
    slots: Box<[Slot]>,
    /// Published pointers, one per slot. Ordered by the `data_index` edge,
    /// so relaxed accesses suffice.
    entries: Box<[AtomicPtr<T>]>,
    /// Ring capacity in slots. Power of two.
    capacity: u32,
    /// Bitmask selecting the slot for an absolute index.
    mask: u64,
}

impl<T> FreeRing<T> {
    /// Creates an empty ring with `capacity` slots.
    pub(crate) fn new(capacity: u32) -> Self {
        debug_assert!(capacity > 0 && capacity.is_power_of_two());
        Self {
            producer: CachePadded::new(AtomicU64::new(0)),
            consumer: CachePadded::new(AtomicU64::new(0)),
            slots: (0..capacity).map(|_| Slot::vacant()).collect(),
            entries: (0..capacity)
                .map(|_| AtomicPtr::new(std::ptr::null_mut()))
                .collect(),
            capacity,
            mask: capacity as u64 - 1,
        }
    }

    /// Returns the ring capacity in slots.
    pub(crate) const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Returns the slot index addressed by an absolute index.
    #[inline]
    const fn slot_of(&self, index: u64) -> usize {
        (index & self.mask) as usize
    }

    /// Reserves `width` consecutive positions and returns the first absolute
    /// index of the reservation.
    ///
    /// If the reservation would straddle the end of the ring, the cursor is
    /// advanced past the end and a skip record is published at the straddled
    /// slot so consumers can fast-forward (see the module docs).
    ///
    /// The reservation is not visible to consumers until [`Self::publish`]
    /// runs for the returned index. Multiple producers may hold disjoint
    /// reservations concurrently and publish them in any order.
    ///
    /// # Errors
    ///
    /// - [`Error::Oversized`]: `width` exceeds the ring capacity. The pool
    ///   only ever reserves single positions, so this guards batched callers.
    pub(crate) fn reserve(&self, width: u32) -> Result<u64, Error> {
        if width > self.capacity {
            return Err(Error::Oversized {
                requested: width,
                capacity: self.capacity,
            });
        }
        let width = width as u64;

        // The pre-load may be relaxed: writes to the reserved slot are
        // ordered by the publish step's release store, not by this CAS.
        let mut observed = self.producer.load(Ordering::Relaxed);
        loop {
            let offset = observed & self.mask;
            let (start, wrapped) = if offset + width > self.capacity as u64 {
                // Not enough room before the end of the ring: skip the
                // remaining positions and start the reservation at slot 0.
                (observed + (self.capacity as u64 - offset), true)
            } else {
                (observed, false)
            };

            match self.producer.compare_exchange_weak(
                observed,
                start + width,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    if wrapped {
                        // Advertise the hole: a record at the straddled slot
                        // whose index points past the skipped positions.
                        let slot = &self.slots[self.slot_of(observed)];
                        slot.width.store(width as u32, Ordering::Relaxed);
                        slot.data_index.store(start, Ordering::Release);
                    }
                    return Ok(start);
                }
                Err(current) => observed = current,
            }
        }
    }

    /// Publishes `ptr` at the reserved `index`, covering `width` positions.
    ///
    /// The release store to `data_index` is the only synchronization edge
    /// between producers and consumers; it transitively orders the pointer
    /// and width writes.
    pub(crate) fn publish(&self, index: u64, width: u32, ptr: *mut T) {
        let slot_index = self.slot_of(index);
        self.entries[slot_index].store(ptr, Ordering::Relaxed);
        let slot = &self.slots[slot_index];
        slot.width.store(width, Ordering::Relaxed);
        slot.data_index.store(index, Ordering::Release);
    }

    /// Claims and returns the next published pointer, with the width of its
    /// publication. Returns `None` if the ring is empty.
    ///
    /// # Panics
    ///
    /// Panics if a readable slot holds a null pointer, which would mean a
    /// producer published without writing its entry.
    pub(crate) fn consume(&self) -> Option<(NonNull<T>, u32)> {
        loop {
            // Acquire on the cursor: a winning claim by another consumer
            // release-stores it, and we must observe that slot's entry as
            // already taken rather than re-read a stale pointer.
            let current = self.consumer.load(Ordering::Acquire);
            let slot_index = self.slot_of(current);
            let slot = &self.slots[slot_index];
            let stored = slot.data_index.load(Ordering::Acquire);

            // A publication beyond the producer cursor can only be left over
            // from before a rewind of the ring; follow it back to the start.
            // The producer load may be relaxed since it only classifies the
            // observed record and transfers no data.
            if stored != VACANT && stored > self.producer.load(Ordering::Relaxed) {
                self.consumer.store(0, Ordering::Release);
                continue;
            }

            // Vacant, or a record from a previous lap that has already been
            // consumed: nothing to take at this position yet.
            if stored == VACANT || stored < current {
                return None;
            }

            // A record whose index maps to a different slot is a skip
            // advertisement for a wrapped reservation; jump the cursor to
            // the advertised index. Losing this CAS is fine, the retry
            // re-reads the ring state.
            if stored > current && self.slot_of(stored) != slot_index {
                let _ = self.consumer.compare_exchange_weak(
                    current,
                    stored,
                    Ordering::Release,
                    Ordering::Relaxed,
                );
                continue;
            }

            // Readable. Claim it by advancing the cursor past the
            // publication; the loser of the race retries on fresh state.
            let width = slot.width.load(Ordering::Relaxed);
            if self
                .consumer
                .compare_exchange_weak(
                    current,
                    stored + width as u64,
                    Ordering::Release,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                let ptr = self.entries[slot_index].load(Ordering::Relaxed);
                let ptr = NonNull::new(ptr).expect("readable slot holds a null pointer");
                return Some((ptr, width));
            }
        }
    }

    /// Rewinds the ring and refills it with `ptrs`, one position each.
    ///
    /// Used at construction and by the pool's test-only reset. The exclusive
    /// borrow is what makes the rewind sound; the consumer cursor is still
    /// zeroed last, after the refill, matching the order a concurrent
    /// rewind would require.
    pub(crate) fn reseed<I>(&mut self, ptrs: I)
    where
        I: Iterator<Item = *mut T>,
    {
        for slot in self.slots.iter_mut() {
            *slot.data_index.get_mut() = VACANT;
            *slot.width.get_mut() = 1;
        }
        *self.producer.get_mut() = 0;
        for ptr in ptrs {
            let index = self
                .reserve(1)
                .expect("a single position always fits the ring");
            self.publish(index, 1, ptr);
        }
        *self.consumer.get_mut() = 0;
    }
}
