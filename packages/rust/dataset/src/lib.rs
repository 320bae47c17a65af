//! Reading, diffing and rewriting the tax data module.
//!
//! The data module is a hand-maintained JavaScript file holding one object
//! literal of country records. This crate never round-trips the whole file
//! through a parser for writing:
//!
//! - [`scan`] and [`locator`] find balanced record blocks and their properties
//! - [`literal`] loads the records into a [`Dataset`](taxrates_shared::Dataset)
//! - [`changeset`] classifies keys between two datasets
//! - [`patcher`] splices record-level edits into the text
//! - [`serializer`] regenerates the full file when asked to

pub mod changeset;
pub mod literal;
pub mod locator;
pub mod patcher;
pub mod render;
pub mod scan;
pub mod serializer;

pub use changeset::{ChangeKind, ChangeSet, change_notes, deep_equal, diff};
pub use literal::parse_dataset;
pub use locator::{BlockSpan, duplicate_keys, locate, locate_container, locate_record};
pub use patcher::{DatasetPatcher, PatchOutcome};
pub use render::Field;
pub use serializer::regenerate;
