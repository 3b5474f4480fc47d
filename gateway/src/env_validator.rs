//! Thin re-export: the quoted-env-var startup diagnostic lives in the core crate so both
//! binaries run the same check.

pub use prompt_eval_core::config::validate_environment_variables;
