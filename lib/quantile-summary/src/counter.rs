//! Packed saturating counters.

use snafu::ensure;

use crate::error::{CapacityExceeded, InvalidParameter, Result, SummaryError};

const SUB_SLOTS: usize = 4;
const COUNTER_BITS: u32 = 2;
const COUNTER_MASK: u8 = 0b11;

/// Size, in bytes, of the packed counters plus the tracked maximum value.
const COUNTER_MEMORY_BYTES: u32 = 5;

/// Index of one of the four counters in a [`SaturatingCounter`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SubSlot(u8);

impl SubSlot {
    /// Selects a sub-slot from a hash digest, using its lowest two bits.
    pub fn from_digest(digest: u32) -> Self {
        Self((digest % SUB_SLOTS as u32) as u8)
    }

    /// Returns the index of this sub-slot.
    pub fn index(&self) -> usize {
        usize::from(self.0)
    }

    fn shift(&self) -> u32 {
        u32::from(self.0) * COUNTER_BITS
    }
}

impl TryFrom<usize> for SubSlot {
    type Error = SummaryError;

    fn try_from(index: usize) -> Result<Self> {
        ensure!(
            index < SUB_SLOTS,
            InvalidParameter {
                name: "sub_slot",
                reason: format!("{} is not in 0..{}", index, SUB_SLOTS),
            }
        );
        Ok(Self(index as u8))
    }
}

/// Four independent 2-bit counters packed into a single byte, sharing one tracked maximum value.
///
/// Each counter saturates at [`SaturatingCounter::MAX_COUNT`]. This is the smallest unit of per-flow state, used to
/// count the first few values of a flow before any real summary is needed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SaturatingCounter {
    packed: u8,
    max_value: u32,
}

impl SaturatingCounter {
    /// Maximum value a single counter can hold.
    pub const MAX_COUNT: u32 = COUNTER_MASK as u32;

    /// Creates a new `SaturatingCounter` with all counters at zero.
    pub const fn new() -> Self {
        Self {
            packed: 0,
            max_value: 0,
        }
    }

    /// Returns the count held in the given sub-slot.
    pub fn count(&self, slot: SubSlot) -> u32 {
        u32::from((self.packed >> slot.shift()) & COUNTER_MASK)
    }

    /// Returns `true` if the given sub-slot has saturated.
    pub fn is_full(&self, slot: SubSlot) -> bool {
        self.count(slot) == Self::MAX_COUNT
    }

    /// Returns `true` if the given sub-slot has not counted anything.
    pub fn is_empty(&self, slot: SubSlot) -> bool {
        self.count(slot) == 0
    }

    /// Counts `value` in the given sub-slot.
    ///
    /// # Errors
    ///
    /// If the sub-slot has saturated, an error is returned.
    pub fn append(&mut self, value: u32, slot: SubSlot) -> Result<()> {
        ensure!(
            !self.is_full(slot),
            CapacityExceeded {
                summary: "SaturatingCounter"
            }
        );

        self.packed += 1 << slot.shift();
        self.max_value = self.max_value.max(value);
        Ok(())
    }

    /// Returns the largest value counted in any sub-slot.
    pub fn value(&self) -> u32 {
        self.max_value
    }

    /// Returns the nominal memory footprint of the counter, in bytes.
    pub fn memory_bytes(&self) -> u32 {
        COUNTER_MEMORY_BYTES
    }
}
