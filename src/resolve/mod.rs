//! Entry-point and run-command resolution.
//!
//! Both resolvers are data-driven: static, ordered tables define the policy
//! so each tier is independently testable and extensible without touching
//! control flow.

pub mod command;
pub mod entry;

pub use command::{RunCommand, command_for, supported_extensions};
pub use entry::{EntrySource, ResolvedEntryPoint, resolve};
