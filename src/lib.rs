//! macpol: a compiler for mandatory access control policy databases.
//!
//! A front end populates [`PolicyDb`] values through the construction API
//! in [`policydb::build`]. The [`Compiler`] links a base with its modules,
//! expands attributes into concrete rules, checks never-allow assertions and
//! the type/role/user hierarchy, optimizes and orders the result, validates
//! it and hands back a kernel policy that [`write_policy`] turns into the
//! versioned binary format read back by [`read_policy`].
//!
//! See `DESIGN.md` for the module map.

#![forbid(unsafe_code)]

pub mod error;
pub mod policydb;

pub mod link;
pub mod expand;

pub mod assertion;
pub mod hierarchy;

pub mod optimize;
pub mod sort;

pub mod sidtab;
pub mod validate;

pub mod binary;

pub mod compile;
pub mod config;
pub mod logging;

pub use binary::{read_policy, write_policy};
pub use compile::{CompileStats, CompiledPolicy, Compiler};
pub use config::CompilerConfig;
pub use error::PolicyError;
pub use policydb::{PolicyDb, PolicyKind};
