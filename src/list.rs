use std::fmt;
use std::iter::FusedIterator;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{error::ListError, range::AddressRange};

/// Stamps are unique across every list in the process, so a handle can only
/// ever match the node it was issued for.
static NEXT_STAMP: AtomicU64 = AtomicU64::new(1);

/// Handle to one entry of a [`RangeList`].
///
/// Handles stay valid until their entry is removed. A handle issued by a
/// different list, or one whose entry was already removed, never matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId {
  slot: usize,
  stamp: u64,
}

struct Node {
  stamp: u64,
  range: AddressRange,
  next: Option<usize>,
}

/// A borrowed view of one list entry: its handle and its range.
#[derive(Debug, Clone, Copy)]
pub struct Entry<'a> {
  id: EntryId,
  range: &'a AddressRange,
}

impl<'a> Entry<'a> {
  pub fn id(&self) -> EntryId {
    self.id
  }

  pub fn range(&self) -> &'a AddressRange {
    self.range
  }
}

/// Ordered, singly linked sequence of [`AddressRange`] records.
///
/// ```text
///   slots:  [ n0 | n1 | -- | n3 ]      (-- = vacant, reused by the next insert)
///
///   head ──► n3 ──► n0 ──► n1 ──► ∅
///                          ▲
///                        tail
/// ```
///
/// Nodes live in a slot arena and link forward by slot index. Appending at
/// either end is O(1). Interior insertion and every removal walk forward from
/// the head, at most `len` steps.
///
/// The list never deduplicates. Equal ranges held by different entries are
/// distinct members, told apart by their [`EntryId`].
#[derive(Default)]
pub struct RangeList {
  slots: Vec<Option<Node>>,
  vacant: Vec<usize>,
  head: Option<usize>,
  tail: Option<usize>,
  len: usize,
}

impl RangeList {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  /// Returns the entry at `index`, which must satisfy `index < len`.
  pub fn get(
    &self,
    index: usize,
  ) -> Result<Entry<'_>, ListError> {
    if index >= self.len {
      return Err(ListError::OutOfRange { index, len: self.len });
    }
    self.iter().nth(index).ok_or(ListError::OutOfRange { index, len: self.len })
  }

  pub fn first(&self) -> Option<Entry<'_>> {
    self.entry_at_slot(self.head?)
  }

  pub fn last(&self) -> Option<Entry<'_>> {
    self.entry_at_slot(self.tail?)
  }

  /// Looks up the range behind a handle. `None` if the handle is stale or
  /// foreign.
  pub fn range(
    &self,
    id: EntryId,
  ) -> Option<&AddressRange> {
    self.member(id).map(|node| &node.range)
  }

  pub(crate) fn range_mut(
    &mut self,
    id: EntryId,
  ) -> Option<&mut AddressRange> {
    match self.slots.get_mut(id.slot) {
      Some(Some(node)) if node.stamp == id.stamp => Some(&mut node.range),
      _ => None,
    }
  }

  /// Handle of the entry that follows `id`, if any.
  pub fn next_entry(
    &self,
    id: EntryId,
  ) -> Option<EntryId> {
    let next = self.member(id)?.next?;
    self.entry_at_slot(next).map(|entry| entry.id)
  }

  /// Inserts `range` before position `index`, where `index <= len`.
  /// Inserting at `0` or at `len` is O(1).
  pub fn insert(
    &mut self,
    index: usize,
    range: AddressRange,
  ) -> Result<EntryId, ListError> {
    if index > self.len {
      return Err(ListError::OutOfRange { index, len: self.len });
    }
    if index == 0 {
      return Ok(self.push_front(range));
    }
    if index == self.len {
      return Ok(self.push_back(range));
    }

    let prev = self.slot_at(index - 1).ok_or(ListError::OutOfRange { index, len: self.len })?;
    let after = self.slots[prev].as_ref().and_then(|node| node.next);
    let id = self.alloc_node(range, after);
    if let Some(node) = self.slots[prev].as_mut() {
      node.next = Some(id.slot);
    }
    self.len += 1;

    Ok(id)
  }

  pub fn push_front(
    &mut self,
    range: AddressRange,
  ) -> EntryId {
    let id = self.alloc_node(range, self.head);
    self.head = Some(id.slot);
    if self.tail.is_none() {
      self.tail = Some(id.slot);
    }
    self.len += 1;
    id
  }

  pub fn push_back(
    &mut self,
    range: AddressRange,
  ) -> EntryId {
    let id = self.alloc_node(range, None);
    match self.tail.and_then(|tail| self.slots[tail].as_mut()) {
      Some(tail) => tail.next = Some(id.slot),
      None => self.head = Some(id.slot),
    }
    self.tail = Some(id.slot);
    self.len += 1;
    id
  }

  /// Position of the first entry equal to `range`.
  pub fn index_of(
    &self,
    range: &AddressRange,
  ) -> Option<usize> {
    self.iter().position(|entry| entry.range == range)
  }

  /// Removes the exact entry behind `id`, even when other entries hold an
  /// equal range.
  pub fn remove_entry(
    &mut self,
    id: EntryId,
  ) -> Result<AddressRange, ListError> {
    if self.member(id).is_none() {
      return Err(ListError::NotFound);
    }
    self.remove_first(|_, slot, node| slot == id.slot && node.stamp == id.stamp).ok_or(ListError::NotFound)
  }

  /// Removes the entry at `index`, which must satisfy `index < len`.
  pub fn remove_at(
    &mut self,
    index: usize,
  ) -> Result<AddressRange, ListError> {
    if index >= self.len {
      return Err(ListError::OutOfRange { index, len: self.len });
    }
    self.remove_first(|position, _, _| position == index).ok_or(ListError::OutOfRange { index, len: self.len })
  }

  /// Removes the first entry equal to `range`.
  pub fn remove(
    &mut self,
    range: &AddressRange,
  ) -> Result<AddressRange, ListError> {
    self.remove_first(|_, _, node| node.range == *range).ok_or(ListError::NotFound)
  }

  /// Iterates from head to tail. Every call starts over at the head.
  pub fn iter(&self) -> Iter<'_> {
    Iter {
      list: self,
      cursor: self.head,
      remaining: self.len,
    }
  }

  /// Sum of the lengths of all entries.
  pub fn total_length(&self) -> usize {
    self.iter().map(|entry| entry.range.length()).sum()
  }

  pub fn to_vec(&self) -> Vec<AddressRange> {
    self.iter().map(|entry| *entry.range).collect()
  }

  fn alloc_node(
    &mut self,
    range: AddressRange,
    next: Option<usize>,
  ) -> EntryId {
    let stamp = NEXT_STAMP.fetch_add(1, Ordering::Relaxed);
    let node = Some(Node { stamp, range, next });

    let slot = match self.vacant.pop() {
      Some(slot) => {
        self.slots[slot] = node;
        slot
      }
      None => {
        self.slots.push(node);
        self.slots.len() - 1
      }
    };

    EntryId { slot, stamp }
  }

  fn member(
    &self,
    id: EntryId,
  ) -> Option<&Node> {
    self.slots.get(id.slot)?.as_ref().filter(|node| node.stamp == id.stamp)
  }

  fn entry_at_slot(
    &self,
    slot: usize,
  ) -> Option<Entry<'_>> {
    let node = self.slots.get(slot)?.as_ref()?;
    Some(Entry {
      id: EntryId { slot, stamp: node.stamp },
      range: &node.range,
    })
  }

  fn slot_at(
    &self,
    index: usize,
  ) -> Option<usize> {
    self.iter().nth(index).map(|entry| entry.id.slot)
  }

  /// Unlinks the first node accepted by `matches(position, slot, node)`.
  /// The walk takes at most `len` steps and stops at the first match.
  fn remove_first<F>(
    &mut self,
    matches: F,
  ) -> Option<AddressRange>
  where
    F: Fn(usize, usize, &Node) -> bool,
  {
    let mut prev: Option<usize> = None;
    let mut cursor = self.head;

    for position in 0..self.len {
      let slot = cursor?;
      let node = self.slots[slot].as_ref()?;
      if matches(position, slot, node) {
        return self.unlink(prev, slot);
      }
      prev = Some(slot);
      cursor = node.next;
    }

    None
  }

  fn unlink(
    &mut self,
    prev: Option<usize>,
    slot: usize,
  ) -> Option<AddressRange> {
    let node = self.slots[slot].take()?;

    match prev.and_then(|prev| self.slots[prev].as_mut()) {
      Some(prev) => prev.next = node.next,
      None => self.head = node.next,
    }
    if self.tail == Some(slot) {
      self.tail = prev;
    }

    self.len -= 1;
    self.vacant.push(slot);

    Some(node.range)
  }
}

impl Clone for RangeList {
  /// Clones carry fresh handles. Handles of `self` never match the copy.
  fn clone(&self) -> Self {
    self.iter().map(|entry| *entry.range).collect()
  }
}

impl FromIterator<AddressRange> for RangeList {
  fn from_iter<I: IntoIterator<Item = AddressRange>>(iter: I) -> Self {
    let mut list = RangeList::new();
    list.extend(iter);
    list
  }
}

impl Extend<AddressRange> for RangeList {
  fn extend<I: IntoIterator<Item = AddressRange>>(
    &mut self,
    iter: I,
  ) {
    for range in iter {
      self.push_back(range);
    }
  }
}

impl<'a> IntoIterator for &'a RangeList {
  type Item = Entry<'a>;
  type IntoIter = Iter<'a>;

  fn into_iter(self) -> Self::IntoIter {
    self.iter()
  }
}

impl fmt::Debug for RangeList {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_list().entries(self.iter().map(|entry| entry.range)).finish()
  }
}

impl fmt::Display for RangeList {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "[")?;
    for (i, entry) in self.iter().enumerate() {
      if i > 0 {
        write!(f, ", ")?;
      }
      write!(f, "{}", entry.range)?;
    }
    write!(f, "]")
  }
}

/// Forward iterator over a [`RangeList`], see [`RangeList::iter`].
pub struct Iter<'a> {
  list: &'a RangeList,
  cursor: Option<usize>,
  remaining: usize,
}

impl<'a> Iterator for Iter<'a> {
  type Item = Entry<'a>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.remaining == 0 {
      return None;
    }
    let slot = self.cursor?;
    let node = self.list.slots.get(slot)?.as_ref()?;

    self.cursor = node.next;
    self.remaining -= 1;

    Some(Entry {
      id: EntryId { slot, stamp: node.stamp },
      range: &node.range,
    })
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    (self.remaining, Some(self.remaining))
  }
}

impl ExactSizeIterator for Iter<'_> {}

impl FusedIterator for Iter<'_> {}
