//! Retry schedule and stage fatality.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use sitegen_shared::{PolicyConfig, Result, RetryConfig, SitegenError};

use crate::step::StepKind;

/// Fixed escalating backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay per retry index.
    pub delays: Vec<Duration>,
    /// Delay for indices past the end of `delays`.
    pub fallback: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            delays: config
                .backoff_ms
                .iter()
                .copied()
                .map(Duration::from_millis)
                .collect(),
            fallback: Duration::from_millis(config.fallback_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delays: Vec::new(),
            fallback: Duration::ZERO,
        }
    }

    pub fn delay_for(&self, index: usize) -> Duration {
        self.delays.get(index).copied().unwrap_or(self.fallback)
    }
}

/// Which stage failures end the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatalityPolicy {
    pub theme: bool,
    pub template_parts: bool,
    pub pages: bool,
}

impl Default for FatalityPolicy {
    fn default() -> Self {
        Self::from(&PolicyConfig::default())
    }
}

impl From<&PolicyConfig> for FatalityPolicy {
    fn from(config: &PolicyConfig) -> Self {
        Self {
            theme: config.theme_fatal,
            template_parts: config.template_parts_fatal,
            pages: config.pages_fatal,
        }
    }
}

impl FatalityPolicy {
    pub fn is_fatal(&self, kind: &StepKind) -> bool {
        match kind {
            StepKind::Theme => self.theme,
            StepKind::TemplateParts => self.template_parts,
            StepKind::Page { .. } => self.pages,
        }
    }
}

/// Sleep for `delay` unless `cancel` fires first.
pub async fn backoff(delay: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SitegenError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
