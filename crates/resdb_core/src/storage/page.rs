//! Lazily allocated storage pages.

use crate::error::{CoreError, CoreResult};
use crate::stats::DatabaseStats;
use crate::storage::ResourceStorage;
use crate::types::Rid;
use parking_lot::Mutex;
use std::sync::OnceLock;
use tracing::trace;

/// Fixed-capacity table of storage pages.
pub(crate) struct PageTable {
    pages: Box<[OnceLock<Box<[ResourceStorage]>>]>,
    grow: Mutex<()>,
}

impl PageTable {
    pub(crate) fn new(max_pages: usize) -> Self {
        Self {
            pages: (0..max_pages).map(|_| OnceLock::new()).collect(),
            grow: Mutex::new(()),
        }
    }

    /// Number of page entries.
    pub(crate) fn capacity(&self) -> usize {
        self.pages.len()
    }

    /// The storage for `rid`, if its page exists.
    pub(crate) fn get(&self, rid: Rid) -> Option<&ResourceStorage> {
        self.pages.get(rid.page())?.get()?.get(rid.offset())
    }

    /// The storage for `rid`, allocating its page if needed.
    ///
    /// Already-allocated pages are found without taking the lock.
    pub(crate) fn get_or_allocate(
        &self,
        rid: Rid,
        stats: &DatabaseStats,
    ) -> CoreResult<&ResourceStorage> {
        let page = rid.page();
        let cell = self.pages.get(page).ok_or(CoreError::CapacityExceeded {
            page,
            max_pages: self.capacity(),
        })?;
        if let Some(slots) = cell.get() {
            return Ok(&slots[rid.offset()]);
        }

        let _grow = self.grow.lock();
        let slots = cell.get_or_init(|| {
            trace!(page, "allocating storage page");
            stats.record_page();
            (0..Rid::PAGE_SIZE).map(|_| ResourceStorage::new()).collect()
        });
        Ok(&slots[rid.offset()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_are_allocated_once() {
        let stats = DatabaseStats::new();
        let pages = PageTable::new(2);
        let rid = Rid::from_raw(5);

        assert!(pages.get(rid).is_none());
        let first = pages.get_or_allocate(rid, &stats).unwrap() as *const ResourceStorage;
        let again = pages.get_or_allocate(rid, &stats).unwrap() as *const ResourceStorage;
        assert_eq!(first, again);
        assert!(pages.get(Rid::from_raw(6)).is_some());
        assert_eq!(stats.snapshot().pages_allocated, 1);
    }

    #[test]
    fn out_of_range_page_is_rejected() {
        let stats = DatabaseStats::new();
        let pages = PageTable::new(1);
        let rid = Rid::from_raw(Rid::PAGE_SIZE);

        let result = pages.get_or_allocate(rid, &stats);
        assert!(matches!(
            result,
            Err(CoreError::CapacityExceeded {
                page: 1,
                max_pages: 1
            })
        ));
        assert_eq!(pages.capacity(), 1);
    }
}
