use std::fmt;

use crate::error::{AllocError, Result};

/// A contiguous span of words `[base, base + length)`.
///
/// Two ranges are equal when both base and length match. Only the allocator
/// resizes a range in place, while splitting or merging free space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressRange {
  base: usize,
  length: usize,
}

impl AddressRange {
  /// Creates a range, rejecting empty spans and spans that overflow `usize`.
  pub fn new(
    base: usize,
    length: usize,
  ) -> Result<Self> {
    if length == 0 {
      return Err(AllocError::InvalidArgument("range length must be greater than zero"));
    }
    if base.checked_add(length).is_none() {
      return Err(AllocError::InvalidArgument("range end overflows the address space"));
    }
    Ok(Self { base, length })
  }

  pub fn base(&self) -> usize {
    self.base
  }

  pub fn length(&self) -> usize {
    self.length
  }

  /// One past the last address covered by this range.
  pub fn end(&self) -> usize {
    self.base + self.length
  }

  /// True when `next` starts exactly where `self` ends.
  pub fn is_adjacent_to(
    &self,
    next: &AddressRange,
  ) -> bool {
    self.end() == next.base
  }

  pub fn contains(
    &self,
    address: usize,
  ) -> bool {
    self.base <= address && address < self.end()
  }

  /// Consumes `length` words from the front. The caller guarantees
  /// `length < self.length`.
  pub(crate) fn shrink_front(
    &mut self,
    length: usize,
  ) {
    debug_assert!(length < self.length);
    self.base += length;
    self.length -= length;
  }

  /// Absorbs `length` words at the end, used when merging a neighbour.
  pub(crate) fn grow(
    &mut self,
    length: usize,
  ) {
    self.length += length;
  }
}

impl fmt::Display for AddressRange {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "({}, {})", self.base, self.length)
  }
}
