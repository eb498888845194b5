//! Pushing state snapshots to whoever is watching.

use std::sync::Arc;
use std::time::Duration;

use sitegen_artifacts::Artifact;

use crate::state::PipelineState;

/// Receives pipeline snapshots.
///
/// Calls happen after the orchestrator has released its state lock. Each
/// snapshot is a consistent copy, but snapshots from pages running side by
/// side may arrive out of write order. Implementations must return quickly.
pub trait PipelineObserver: Send + Sync {
    /// Called after every status change and every newly closed fence.
    fn state_changed(&self, snapshot: PipelineState);

    /// A failed attempt will be retried after `delay`.
    fn retry_scheduled(&self, _step_id: &str, _retry: u32, _delay: Duration) {}

    /// A fence artifact was applied for a step.
    fn artifact(&self, _step_id: &str, _artifact: &Artifact) {}
}

/// No-op observer for headless/test usage.
pub struct SilentObserver;

impl PipelineObserver for SilentObserver {
    fn state_changed(&self, _snapshot: PipelineState) {}
}

/// Hands observers independent copies of the live state.
#[derive(Clone)]
pub struct ChangeNotifier {
    observer: Arc<dyn PipelineObserver>,
}

impl ChangeNotifier {
    pub fn new(observer: Arc<dyn PipelineObserver>) -> Self {
        Self { observer }
    }

    pub fn silent() -> Self {
        Self::new(Arc::new(SilentObserver))
    }

    pub fn notify(&self, snapshot: PipelineState) {
        self.observer.state_changed(snapshot);
    }

    pub fn retry_scheduled(&self, step_id: &str, retry: u32, delay: Duration) {
        self.observer.retry_scheduled(step_id, retry, delay);
    }

    pub fn artifact(&self, step_id: &str, artifact: &Artifact) {
        self.observer.artifact(step_id, artifact);
    }
}
