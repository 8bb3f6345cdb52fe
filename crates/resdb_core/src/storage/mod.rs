//! RID allocation and per-resource storage.
//!
//! Storage slots live in fixed-size pages that are created on first use and
//! never freed or moved, so a `&ResourceStorage` stays valid for as long as
//! the database does. The UUID and path indices each sit behind their own
//! mutex, separate from the lock-free instance pointers.

mod page;
mod slot;
mod table;

pub(crate) use page::PageTable;
pub(crate) use slot::ResourceStorage;
pub(crate) use table::ResourceTable;
