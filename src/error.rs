use thiserror::Error;

/// Errors reported by [`RangeList`](crate::RangeList) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListError {
  #[error("index {index} out of range for list of length {len}")]
  OutOfRange { index: usize, len: usize },

  #[error("entry is not a member of this list")]
  NotFound,
}

/// Errors reported by [`FreeListAllocator`](crate::FreeListAllocator) and
/// [`AddressRange`](crate::AddressRange) construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
  #[error("invalid argument: {0}")]
  InvalidArgument(&'static str),

  /// No free range is large enough. Not fatal: release or compact and retry.
  #[error("no free range can hold {requested} words (largest free range: {largest_free})")]
  AllocationFailure { requested: usize, largest_free: usize },

  #[error("free and allocated ranges do not partition the space: {0}")]
  InvalidPartition(String),
}

pub type Result<T, E = AllocError> = std::result::Result<T, E>;
