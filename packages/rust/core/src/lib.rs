//! Generation pipeline for SiteGen.
//!
//! This crate ties the text source, the artifact parser and the content
//! store into one run: theme, then template parts, then pages with bounded
//! concurrency (see [`Orchestrator`]).

pub mod notify;
pub mod orchestrator;
pub mod prompts;
pub mod retry;
pub mod scheduler;
pub mod state;
pub mod step;
pub mod store;

pub use notify::{ChangeNotifier, PipelineObserver, SilentObserver};
pub use orchestrator::{Orchestrator, PipelineOptions};
pub use retry::{FatalityPolicy, RetryPolicy};
pub use scheduler::{TaskOutcome, run_bounded};
pub use state::{PipelineState, PipelineStatus, Section};
pub use step::{Step, StepKind, StepStatus};
pub use store::{ContentStore, MemoryStore};
