//! Core type definitions for the resource database.

use std::fmt;

/// Index of a field within a resource type's schema.
pub type FieldIndex = u32;

/// Stable handle to a resource storage slot.
///
/// RIDs are allocated sequentially starting at 1 and are never reused.
/// A RID decomposes into a page index and an in-page offset, so locating
/// its storage is two array lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rid(u64);

impl Rid {
    /// Number of storage slots in one page.
    pub const PAGE_SIZE: u64 = 4096;

    /// Creates a RID from its raw value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Index of the page holding this RID's storage.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn page(self) -> usize {
        (self.0 / Self::PAGE_SIZE) as usize
    }

    /// Offset of this RID's storage within its page.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn offset(self) -> usize {
        (self.0 % Self::PAGE_SIZE) as usize
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rid:{}", self.0)
    }
}

/// Identifier of a registered resource type.
///
/// Several schemas may be registered under one id; the latest wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceTypeId(pub u64);

impl ResourceTypeId {
    /// Creates a new type ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rid_decomposes_into_page_and_offset() {
        let rid = Rid::from_raw(Rid::PAGE_SIZE * 3 + 17);
        assert_eq!(rid.page(), 3);
        assert_eq!(rid.offset(), 17);

        let first = Rid::from_raw(1);
        assert_eq!(first.page(), 0);
        assert_eq!(first.offset(), 1);
    }

    #[test]
    fn rid_ordering() {
        assert!(Rid::from_raw(1) < Rid::from_raw(2));
    }

    #[test]
    fn display() {
        assert_eq!(format!("{}", Rid::from_raw(42)), "rid:42");
        assert_eq!(format!("{}", ResourceTypeId::new(7)), "type:7");
    }
}
