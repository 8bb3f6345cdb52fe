//! Commits and undo/redo history.
//!
//! A commit publishes a writer's private copy with one compare-and-swap on
//! the storage's instance pointer. When the pointer moved since the copy was
//! taken, the commit fails with `CommitConflict` and nothing is published.
//! Every successful publish, including undo and redo, then runs the same
//! sequence:
//!
//! 1. retire the displaced snapshot to the garbage collector
//! 2. update parent links of children that entered or left owning fields
//! 3. bump the version of the resource and each of its ancestors
//! 4. notify resource listeners, then type listeners
//! 5. cascade structural changes to prototype instances
//!
//! Commits made with an [`UndoRedoScope`] are recorded there last.

mod commit;
mod scope;
mod undo;

pub use scope::{ChangeRecord, UndoRedoScope};
