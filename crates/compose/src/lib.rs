//! Composition reconciliation: drift comparison, status writing, owner
//! reference resolution, and the phase state machine tying them together.

#![forbid(unsafe_code)]

pub mod compare;
pub mod reconcile;
pub mod reference;
pub mod source;
pub mod status;

pub use compare::{is_up_to_date, CompareOutcome, FieldDiff};
pub use reconcile::{Outcome, Phase, Reconciler};
pub use source::{DescriptorSource, DirectorySource};
