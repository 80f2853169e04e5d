//! Ordered stage execution for one processing request.
//!
//! # Data Flow
//! ```text
//! POST /process
//!     → runner.rs (root span `process-data`, run id)
//!     → for each stage, strictly in order:
//!           stage span → broadcast started → StageWork::perform (await)
//!           → broadcast completed → end stage span
//!     → broadcast done | error → end root span
//! ```
//!
//! # Design Decisions
//! - Each run carries its own `TraceScope`; nothing about the active span is
//!   stored outside the run's own stack frames
//! - A stage failure ends the run; later stages are never started
//! - No retries and no cancellation

pub mod runner;
pub mod stage;

pub use runner::{PipelineError, PipelineRunner, ProcessRequest, RunOutcome};
pub use stage::{SimulatedWork, Stage, StageError, StageWork};
