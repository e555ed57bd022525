use std::fmt;

use log::{debug, trace};

use crate::{
  error::{AllocError, Result},
  list::{EntryId, RangeList},
  range::AddressRange,
};

/// First-fit allocator over a simulated address space `[0, max_size)`.
///
/// Every address is covered by exactly one range, held either in the free
/// list or in the allocated list. Each public operation moves the pair of
/// lists from one valid partition to another.
pub struct FreeListAllocator {
  max_size: usize,
  free: RangeList,
  allocated: RangeList,
}

impl FreeListAllocator {
  /// Creates an allocator whose free list holds the single range
  /// `(0, max_size)`.
  pub fn new(max_size: usize) -> Result<Self> {
    if max_size == 0 {
      return Err(AllocError::InvalidArgument("max_size must be greater than zero"));
    }

    let mut free = RangeList::new();
    free.push_back(AddressRange::new(0, max_size)?);
    debug!("FreeListAllocator::new({max_size})");

    Ok(Self {
      max_size,
      free,
      allocated: RangeList::new(),
    })
  }

  /// Rebuilds an allocator from two lists, keeping their order.
  ///
  /// Fails with [`AllocError::InvalidPartition`] unless the lists together
  /// cover `[0, max_size)` exactly once.
  pub fn from_lists(
    max_size: usize,
    free: RangeList,
    allocated: RangeList,
  ) -> Result<Self> {
    if max_size == 0 {
      return Err(AllocError::InvalidArgument("max_size must be greater than zero"));
    }

    let allocator = Self {
      max_size,
      free,
      allocated,
    };
    allocator.check_partition()?;
    debug!(
      "FreeListAllocator::from_lists({max_size}): {} free, {} allocated",
      allocator.free.len(),
      allocator.allocated.len()
    );

    Ok(allocator)
  }

  /// Finds the first free range that holds `length` words, in free-list
  /// order, and carves the allocation off its front.
  ///
  /// Returns the base address of the new allocation. Never compacts on its
  /// own; see [`FreeListAllocator::allocate_or_compact`].
  pub fn allocate(
    &mut self,
    length: usize,
  ) -> Result<usize> {
    if length == 0 {
      return Err(AllocError::InvalidArgument("allocation length must be greater than zero"));
    }

    let Some((id, found)) = self.find_free_range(length) else {
      let largest_free = self.largest_free();
      debug!("allocate({length}): no fit, largest free range is {largest_free}");
      return Err(AllocError::AllocationFailure {
        requested: length,
        largest_free,
      });
    };

    let block = AddressRange::new(found.base(), length)?;

    if found.length() == length {
      self.free.remove_entry(id).map_err(|_| stale_handle())?;
      trace!("allocate({length}): took {found} whole");
    } else {
      let remainder = self.free.range_mut(id).ok_or_else(stale_handle)?;
      remainder.shrink_front(length);
      trace!("allocate({length}): split {found}, {remainder} stays free");
    }

    self.allocated.push_back(block);
    debug!("allocate({length}) -> {}", block.base());

    Ok(block.base())
  }

  /// Tries [`allocate`](Self::allocate) and, if no range fits, compacts the
  /// free list and tries once more.
  pub fn allocate_or_compact(
    &mut self,
    length: usize,
  ) -> Result<usize> {
    match self.allocate(length) {
      Err(AllocError::AllocationFailure { .. }) => {
        self.compact();
        self.allocate(length)
      }
      result => result,
    }
  }

  /// Returns the allocation starting at `address` to the back of the free
  /// list. Unknown addresses are ignored.
  pub fn release(
    &mut self,
    address: usize,
  ) {
    let Some(id) = self.allocated.iter().find(|entry| entry.range().base() == address).map(|entry| entry.id()) else {
      debug!("release({address}): no allocation at this address");
      return;
    };

    if let Ok(range) = self.allocated.remove_entry(id) {
      self.free.push_back(range);
      debug!("release({address}): {range} is free");
    }
  }

  /// Merges every pair of free ranges where one ends at the other's base,
  /// until no such pair remains.
  ///
  /// ```text
  ///   before:  [(20, 5), (0, 5), (5, 5), (10, 3)]
  ///   after:   [(20, 5), (0, 13)]
  /// ```
  ///
  /// Each pass holds one entry and scans the whole list for its successor
  /// in address order, restarting the scan after every merge. The list
  /// shrinks with each merge, so the work is bounded by `O(k^2)` for `k`
  /// free ranges.
  pub fn compact(&mut self) {
    let before = self.free.len();
    let mut cursor = self.free.first().map(|entry| entry.id());

    while let Some(current) = cursor {
      while let Some((partner, length)) = self.find_merge_partner(current) {
        if self.free.remove_entry(partner).is_err() {
          break;
        }
        if let Some(range) = self.free.range_mut(current) {
          range.grow(length);
          trace!("compact: absorbed {length} words into {range}");
        }
      }
      cursor = self.free.next_entry(current);
    }

    debug!("compact: {before} free ranges -> {}", self.free.len());
  }

  /// Verifies that the two lists partition `[0, max_size)`: no overlaps, no
  /// gaps and no words outside the space.
  pub fn check_partition(&self) -> Result<()> {
    let mut ranges: Vec<AddressRange> = self.free.iter().chain(self.allocated.iter()).map(|entry| *entry.range()).collect();
    ranges.sort_unstable_by_key(|range| range.base());

    let mut expected = 0;
    for range in &ranges {
      if range.base() < expected {
        return Err(AllocError::InvalidPartition(format!("{range} overlaps address {}", range.base())));
      }
      if range.base() > expected {
        return Err(AllocError::InvalidPartition(format!("gap at [{expected}, {})", range.base())));
      }
      expected = range.end();
    }

    if expected != self.max_size {
      return Err(AllocError::InvalidPartition(format!(
        "ranges cover [0, {expected}) but the space is [0, {})",
        self.max_size
      )));
    }

    Ok(())
  }

  pub fn max_size(&self) -> usize {
    self.max_size
  }

  pub fn free_list(&self) -> &RangeList {
    &self.free
  }

  pub fn allocated_list(&self) -> &RangeList {
    &self.allocated
  }

  pub fn free_words(&self) -> usize {
    self.free.total_length()
  }

  pub fn allocated_words(&self) -> usize {
    self.allocated.total_length()
  }

  /// Length of the largest free range, `0` when nothing is free.
  pub fn largest_free(&self) -> usize {
    self.free.iter().map(|entry| entry.range().length()).max().unwrap_or(0)
  }

  /// Free list on the first line, allocated list on the second.
  pub fn debug_dump(&self) -> String {
    self.to_string()
  }

  fn find_free_range(
    &self,
    length: usize,
  ) -> Option<(EntryId, AddressRange)> {
    self.free.iter().find(|entry| entry.range().length() >= length).map(|entry| (entry.id(), *entry.range()))
  }

  fn find_merge_partner(
    &self,
    current: EntryId,
  ) -> Option<(EntryId, usize)> {
    let range = self.free.range(current)?;
    self
      .free
      .iter()
      .find(|entry| entry.id() != current && range.is_adjacent_to(entry.range()))
      .map(|entry| (entry.id(), entry.range().length()))
  }
}

/// A handle taken from the free list during this same call went missing.
fn stale_handle() -> AllocError {
  AllocError::InvalidPartition("free list entry vanished during allocation".to_string())
}

impl fmt::Display for FreeListAllocator {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    writeln!(f, "free:      {}", self.free)?;
    write!(f, "allocated: {}", self.allocated)
  }
}

impl fmt::Debug for FreeListAllocator {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("FreeListAllocator")
      .field("max_size", &self.max_size)
      .field("free", &self.free)
      .field("allocated", &self.allocated)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use proptest::prelude::*;

  fn r(
    base: usize,
    length: usize,
  ) -> AddressRange {
    AddressRange::new(base, length).unwrap()
  }

  fn list_of(ranges: &[(usize, usize)]) -> RangeList {
    ranges.iter().map(|&(base, length)| r(base, length)).collect()
  }

  fn lengths(list: &RangeList) -> Vec<usize> {
    list.iter().map(|entry| entry.range().length()).collect()
  }

  fn sorted(list: &RangeList) -> Vec<AddressRange> {
    let mut ranges = list.to_vec();
    ranges.sort_unstable_by_key(|range| range.base());
    ranges
  }

  #[test]
  fn test_new_seeds_single_free_range() {
    let allocator = FreeListAllocator::new(100).unwrap();

    assert_eq!(allocator.free_list().to_vec(), vec![r(0, 100)]);
    assert!(allocator.allocated_list().is_empty());
    assert!(allocator.check_partition().is_ok());

    assert!(matches!(FreeListAllocator::new(0), Err(AllocError::InvalidArgument(_))));
  }

  #[test]
  fn test_allocate_splits_from_the_front() {
    let mut allocator = FreeListAllocator::new(100).unwrap();

    assert_eq!(allocator.allocate(17), Ok(0));
    assert_eq!(allocator.allocate(3), Ok(17));

    assert_eq!(allocator.free_list().to_vec(), vec![r(20, 80)]);
    assert_eq!(allocator.allocated_list().to_vec(), vec![r(0, 17), r(17, 3)]);
    assert!(allocator.check_partition().is_ok());
  }

  #[test]
  fn test_allocate_exact_fit_removes_free_range() {
    let mut allocator = FreeListAllocator::new(10).unwrap();

    assert_eq!(allocator.allocate(10), Ok(0));
    assert!(allocator.free_list().is_empty());
    assert_eq!(allocator.largest_free(), 0);

    assert_eq!(
      allocator.allocate(1),
      Err(AllocError::AllocationFailure {
        requested: 1,
        largest_free: 0
      })
    );
  }

  #[test]
  fn test_allocate_rejects_zero_length() {
    let mut allocator = FreeListAllocator::new(10).unwrap();

    assert!(matches!(allocator.allocate(0), Err(AllocError::InvalidArgument(_))));
    assert_eq!(allocator.free_list().to_vec(), vec![r(0, 10)]);
  }

  #[test]
  fn test_first_fit_follows_list_order() {
    // Free ranges of lengths [5, 10, 3], in that list order.
    let free = list_of(&[(0, 5), (10, 10), (25, 3)]);
    let allocated = list_of(&[(5, 5), (20, 5)]);
    let mut allocator = FreeListAllocator::from_lists(28, free, allocated).unwrap();

    assert_eq!(allocator.allocate(4), Ok(0));
    assert_eq!(lengths(allocator.free_list()), vec![1, 10, 3]);
    assert_eq!(allocator.free_list().to_vec()[0], r(4, 1));
    assert!(allocator.check_partition().is_ok());
  }

  #[test]
  fn test_first_fit_is_not_address_ordered() {
    let free = list_of(&[(10, 10), (0, 10)]);
    let mut allocator = FreeListAllocator::from_lists(20, free, RangeList::new()).unwrap();

    assert_eq!(allocator.allocate(2), Ok(10));
  }

  #[test]
  fn test_exhaustion_leaves_free_list_untouched() {
    let mut allocator = FreeListAllocator::new(10).unwrap();

    assert_eq!(
      allocator.allocate(11),
      Err(AllocError::AllocationFailure {
        requested: 11,
        largest_free: 10
      })
    );
    assert_eq!(allocator.free_list().to_vec(), vec![r(0, 10)]);
  }

  #[test]
  fn test_release_appends_without_merging() {
    let mut allocator = FreeListAllocator::new(100).unwrap();
    let a = allocator.allocate(10).unwrap();
    let b = allocator.allocate(20).unwrap();

    allocator.release(a);

    assert_eq!(allocator.free_list().to_vec(), vec![r(30, 70), r(0, 10)]);
    assert_eq!(allocator.allocated_list().to_vec(), vec![r(10, 20)]);

    allocator.release(b);
    assert_eq!(allocator.free_list().len(), 3);
    assert_eq!(allocator.free_words(), 100);
    assert_eq!(allocator.allocated_words(), 0);
    assert!(allocator.check_partition().is_ok());
  }

  #[test]
  fn test_release_unknown_address_is_noop() {
    let mut allocator = FreeListAllocator::new(100).unwrap();
    allocator.allocate(10).unwrap();
    let before = allocator.debug_dump();

    allocator.release(999);
    allocator.release(5);

    assert_eq!(allocator.debug_dump(), before);
  }

  #[test]
  fn test_release_twice_is_noop() {
    let mut allocator = FreeListAllocator::new(100).unwrap();
    let a = allocator.allocate(10).unwrap();

    allocator.release(a);
    allocator.release(a);

    assert_eq!(allocator.free_list().len(), 2);
    assert!(allocator.check_partition().is_ok());
  }

  #[test]
  fn test_release_with_whole_space_free_is_noop() {
    for max_size in [1, 100, 4096] {
      let mut allocator = FreeListAllocator::new(max_size).unwrap();
      allocator.release(0);
      assert_eq!(allocator.free_list().to_vec(), vec![r(0, max_size)]);
    }
  }

  #[test]
  fn test_compact_merges_adjacent_ranges() {
    let free = list_of(&[(0, 5), (5, 5), (20, 5)]);
    let allocated = list_of(&[(10, 10)]);
    let mut allocator = FreeListAllocator::from_lists(25, free, allocated).unwrap();

    allocator.compact();

    assert_eq!(sorted(allocator.free_list()), vec![r(0, 10), r(20, 5)]);
    assert!(allocator.check_partition().is_ok());
  }

  #[test]
  fn test_compact_merges_out_of_order_runs() {
    let free = list_of(&[(20, 5), (10, 3), (5, 5), (0, 5), (13, 2)]);
    let allocated = list_of(&[(15, 5)]);
    let mut allocator = FreeListAllocator::from_lists(25, free, allocated).unwrap();

    allocator.compact();

    assert_eq!(sorted(allocator.free_list()), vec![r(0, 15), r(20, 5)]);
  }

  #[test]
  fn test_compact_is_idempotent() {
    let mut allocator = FreeListAllocator::new(50).unwrap();
    let addresses: Vec<usize> = (0..5).map(|_| allocator.allocate(10).unwrap()).collect();
    for address in [addresses[3], addresses[1], addresses[0]] {
      allocator.release(address);
    }

    allocator.compact();
    let once = allocator.free_list().to_vec();
    allocator.compact();

    assert_eq!(allocator.free_list().to_vec(), once);
    assert_eq!(sorted(allocator.free_list()), vec![r(0, 20), r(30, 10)]);
  }

  #[test]
  fn test_compact_empty_and_single() {
    let mut allocator = FreeListAllocator::new(10).unwrap();
    allocator.compact();
    assert_eq!(allocator.free_list().to_vec(), vec![r(0, 10)]);

    allocator.allocate(10).unwrap();
    allocator.compact();
    assert!(allocator.free_list().is_empty());
  }

  #[test]
  fn test_allocate_or_compact_retries_after_merge() {
    let mut allocator = FreeListAllocator::new(20).unwrap();
    let a = allocator.allocate(10).unwrap();
    let b = allocator.allocate(10).unwrap();
    allocator.release(b);
    allocator.release(a);

    assert!(matches!(allocator.allocate(20), Err(AllocError::AllocationFailure { .. })));
    assert_eq!(allocator.free_list().len(), 2);

    assert_eq!(allocator.allocate_or_compact(20), Ok(0));
    assert!(allocator.free_list().is_empty());
  }

  #[test]
  fn test_from_lists_rejects_broken_partitions() {
    let overlap = FreeListAllocator::from_lists(10, list_of(&[(0, 6)]), list_of(&[(5, 5)]));
    assert!(matches!(overlap, Err(AllocError::InvalidPartition(_))));

    let gap = FreeListAllocator::from_lists(10, list_of(&[(0, 4)]), list_of(&[(5, 5)]));
    assert!(matches!(gap, Err(AllocError::InvalidPartition(_))));

    let short = FreeListAllocator::from_lists(10, list_of(&[(0, 5)]), RangeList::new());
    assert!(matches!(short, Err(AllocError::InvalidPartition(_))));

    let duplicate = FreeListAllocator::from_lists(5, list_of(&[(0, 5)]), list_of(&[(0, 5)]));
    assert!(matches!(duplicate, Err(AllocError::InvalidPartition(_))));
  }

  #[test]
  fn test_debug_dump() {
    let mut allocator = FreeListAllocator::new(10).unwrap();
    allocator.allocate(4).unwrap();

    assert_eq!(allocator.debug_dump(), "free:      [(4, 6)]\nallocated: [(0, 4)]");
  }

  #[derive(Debug, Clone)]
  enum Op {
    Allocate(usize),
    Release(usize),
    Compact,
  }

  fn ops() -> impl Strategy<Value = (usize, Vec<Op>)> {
    (1usize..=256).prop_flat_map(|max_size| {
      let op = prop_oneof![
        4 => (1..=max_size).prop_map(Op::Allocate),
        3 => any::<usize>().prop_map(Op::Release),
        1 => Just(Op::Compact),
      ];
      (Just(max_size), prop::collection::vec(op, 0..64))
    })
  }

  proptest! {
    /// Whatever sequence of operations runs, the two lists keep
    /// partitioning the space and compaction leaves no adjacent free pair.
    #[test]
    fn check_partition_holds((max_size, ops) in ops()) {
      let _ = env_logger::try_init();

      let mut allocator = FreeListAllocator::new(max_size).unwrap();
      let mut live: Vec<usize> = Vec::new();

      for op in ops {
        match op {
          Op::Allocate(length) => {
            let free_before = allocator.free_words();
            match allocator.allocate(length) {
              Ok(address) => {
                prop_assert!(!live.contains(&address));
                live.push(address);
                prop_assert_eq!(allocator.free_words(), free_before - length);
              }
              Err(AllocError::AllocationFailure { largest_free, .. }) => {
                prop_assert!(largest_free < length);
                prop_assert_eq!(allocator.free_words(), free_before);
              }
              Err(error) => prop_assert!(false, "unexpected error: {}", error),
            }
          }
          Op::Release(seed) => {
            // Mix releases of live addresses with arbitrary ones.
            let address = if !live.is_empty() && seed % 4 != 0 {
              live.swap_remove(seed % live.len())
            } else {
              let address = seed % (max_size + 1);
              live.retain(|&live_address| live_address != address);
              address
            };
            allocator.release(address);
          }
          Op::Compact => {
            allocator.compact();
            let free = allocator.free_list().to_vec();
            for a in &free {
              prop_assert!(!free.iter().any(|b| a.is_adjacent_to(b)));
            }
          }
        }

        prop_assert!(allocator.check_partition().is_ok());
        prop_assert_eq!(allocator.free_words() + allocator.allocated_words(), max_size);
      }

      allocator.compact();
      let once = allocator.free_list().to_vec();
      allocator.compact();
      prop_assert_eq!(allocator.free_list().to_vec(), once);
    }

    /// Allocating and immediately releasing restores the free total.
    #[test]
    fn check_allocate_release_round_trip(max_size in 1usize..=512, length in 1usize..=512) {
      let mut allocator = FreeListAllocator::new(max_size).unwrap();
      let before = allocator.free_words();

      if let Ok(address) = allocator.allocate(length) {
        allocator.release(address);
      }

      prop_assert_eq!(allocator.free_words(), before);
      prop_assert!(allocator.allocated_list().is_empty());
    }
  }
}
