//! Konduct core: descriptor model, alt-field path grammar, untyped-tree
//! helpers, and the error taxonomy shared by every crate.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

pub mod alt;
pub mod descriptor;
pub mod tree;

/// Engine errors. Each variant is a machine-readable kind; the payload is
/// the human message. Transport failures are the only recoverable kind:
/// callers re-enqueue those and surface everything else.
#[derive(Debug, thiserror::Error, Serialize, Deserialize)]
pub enum Error {
    #[error("descriptor: {0}")]
    Descriptor(String),
    #[error("introspection: {0}")]
    Introspection(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("comparison: {0}")]
    Comparison(String),
    #[error("reference: {0}")]
    Reference(String),
    #[error("status write: {0}")]
    StatusWrite(String),
}

impl Error {
    /// Whether the caller should retry by re-enqueueing the reconcile.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod prelude {
    pub use super::descriptor::{Action, Gvk, ReferenceInfo, ResourceDescriptor, VerbDescriptor};
    pub use super::{Error, Result};
}
