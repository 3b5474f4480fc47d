//! The gateway reuses the core crate's `Error` type directly: HTTP handlers, the
//! scheduler, and the fan-out executor all report into the same variant set.

pub use prompt_eval_core::error::{Error, ResultExt};
