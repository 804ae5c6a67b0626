use core::{
    iter::Sum,
    ops::{Add, AddAssign},
};


/// Packets and bytes seen by a rule, the policy or the error path.
///
/// Generated programs bump these with atomic adds, one slot per counter
/// index. Both fields wrap around like the kernel counters they mirror.
#[repr(C)]
#[derive(Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "user",
    derive(Debug, Hash, serde::Serialize, serde::Deserialize)
)]
pub struct Counter {
    pub packets: u64,
    pub bytes: u64,
}

impl Counter {
    pub const fn new(packets: u64, bytes: u64) -> Self {
        Self { packets, bytes }
    }
}

impl Add for Counter {
    type Output = Counter;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            packets: self.packets.wrapping_add(rhs.packets),
            bytes: self.bytes.wrapping_add(rhs.bytes),
        }
    }
}

impl AddAssign for Counter {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for Counter {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Counter::default(), Add::add)
    }
}

/// Slot of the policy counter in a program generated for `rules` rules.
#[inline]
pub const fn policy_index(rules: u32) -> u32 {
    rules
}

/// Slot of the errors counter in a program generated for `rules` rules.
#[inline]
pub const fn errors_index(rules: u32) -> u32 {
    rules + 1
}

/// Number of slots in the counters map of a program generated for `rules` rules.
#[inline]
pub const fn counters_len(rules: u32) -> u32 {
    rules + 2
}

// Safety: Counter is repr(C) and only holds integers
#[cfg(feature = "user")]
unsafe impl aya::Pod for Counter {}
