//! Error types, re-exported from cm-error

pub use cm_error::{CpldError, Result};
