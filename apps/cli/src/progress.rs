//! Terminal progress for pipeline runs.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use sitegen_core::{PipelineObserver, PipelineState, PipelineStatus, StepStatus};

/// Spinner fed by pipeline snapshots.
pub(crate) struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    pub(crate) fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    pub(crate) fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

/// One-line status for a snapshot.
fn status_line(state: &PipelineState) -> String {
    let active: Vec<&str> = state
        .steps
        .iter()
        .filter(|s| matches!(s.status, StepStatus::Generating | StepStatus::Retrying))
        .map(|s| s.label.as_str())
        .collect();

    let pages = state.page_steps().count();
    let pages_done = state
        .page_steps()
        .filter(|s| s.status.is_terminal())
        .count();

    let mut line = match state.status {
        PipelineStatus::Idle => "Waiting".to_string(),
        PipelineStatus::Running if active.is_empty() => "Working".to_string(),
        PipelineStatus::Running => format!("Generating {}", active.join(", ")),
        PipelineStatus::Complete => "Done".to_string(),
        PipelineStatus::Error => "Failed".to_string(),
    };
    if pages > 0 {
        line.push_str(&format!(" [pages {pages_done}/{pages}]"));
    }
    line
}

impl PipelineObserver for CliProgress {
    fn state_changed(&self, snapshot: PipelineState) {
        self.spinner.set_message(status_line(&snapshot));
    }

    fn retry_scheduled(&self, step_id: &str, retry: u32, delay: Duration) {
        self.spinner.println(format!(
            "  {step_id}: attempt {retry} failed, retrying in {:.1}s",
            delay.as_secs_f64()
        ));
    }
}
