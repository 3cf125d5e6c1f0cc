//! Pipeline DSL — outcome algebra, context threading, stages, processes.
//!
//! The composable core: a [`Stage`] is the atomic unit, an [`Outcome`] its
//! three-valued result, the [`PipelineContext`] the metadata threaded
//! through every stage, and the [`process`] module the catalogue of stage
//! factories with reflection.

pub mod context;
pub mod outcome;
pub mod process;
pub mod stage;

pub use context::{PipelineContext, StageLog, StageStatus};
pub use outcome::Outcome;
pub use process::{MaxReflections, OnFailure};
pub use stage::Stage;
