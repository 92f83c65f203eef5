//! kunquat-core: shared time model and error kinds for the Kunquat render core.
//!
//! This crate sits at the bottom of the dependency graph (C1 in the design):
//! every other `kunquat-*` crate depends on it for [`Tstamp`] and the
//! [`ErrorKind`] taxonomy, but it depends on nothing else in the workspace.

mod error;
mod tstamp;

pub use error::{ErrorKind, FormatError, KindedError};
pub use tstamp::{cmp, Tstamp, BEAT};
