// Clippy allows for reasonable defaults
// These suppress warnings where the suggested change doesn't improve readability
#![allow(clippy::too_many_arguments)] // Engine constructors take every collaborator
#![allow(clippy::new_without_default)] // Default not always appropriate for stateful types
#![allow(clippy::derivable_impls)] // Explicit Default impls can be clearer
#![allow(clippy::unnecessary_map_or)] // map_or can be clearer than alternatives
#![allow(clippy::needless_borrow)] // Explicit borrows can clarify ownership
#![allow(clippy::collapsible_if)] // Separate ifs can be more readable
#![allow(clippy::redundant_closure)] // |x| f(x) can be clearer than f
#![allow(clippy::needless_borrows_for_generic_args)] // Explicit borrows clarify intent

// Module declarations
pub mod config;
pub mod error;
pub mod events;
pub mod file_storage;
pub mod gates;
pub mod git;
pub mod manifest;
pub mod merge;
pub mod models;
pub mod pipeline;
pub mod runner;
pub mod scheduler;
pub mod shutdown;
mod utils;

pub use config::{ConfigLoader, EngineConfig, PartialConfig};
pub use error::{EngineError, EngineResult};
pub use events::{EngineEvent, EventSink};
pub use models::*;
pub use pipeline::{ExecutionOutcome, Pipeline, PipelineBuilder, Plan, RunReport, RunStatus};
pub use shutdown::ShutdownState;
pub use utils::{state_dir, worktrees_dir};
