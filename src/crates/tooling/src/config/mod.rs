//! Configuration helpers
//!
//! Environment variable loading used by the layered configuration in the `booksmith`
//! crate. Each helper distinguishes an unset variable (`Ok(None)`) from one that is set
//! but unusable (`Err`).

pub mod env;

pub use env::{get_env, get_env_bool, get_env_parse, override_from_env};
