//! Per-unit-of-work state machine.
//!
//! ```text
//! pending → generating → complete
//!              │  ▲
//!              ▼  │
//!            retrying
//!              │
//!              ▼
//!            error
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sitegen_artifacts::Artifact;
use sitegen_shared::{PageSpec, Result, SitegenError};

/// What a step produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StepKind {
    Theme,
    TemplateParts,
    Page { slug: String },
}

impl StepKind {
    /// Stable id used in state and logs.
    pub fn step_id(&self) -> String {
        match self {
            Self::Theme => "theme".into(),
            Self::TemplateParts => "template-parts".into(),
            Self::Page { slug } => format!("page:{slug}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Generating,
    Retrying,
    Complete,
    Error,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Retrying => "retrying",
            Self::Complete => "complete",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// One unit of work: the theme, the template parts, or one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub label: String,
    pub kind: StepKind,
    pub status: StepStatus,
    /// Artifacts of the current (or last) attempt.
    pub artifacts: Vec<Artifact>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Step {
    pub fn new(kind: StepKind, label: impl Into<String>) -> Self {
        Self {
            id: kind.step_id(),
            label: label.into(),
            kind,
            status: StepStatus::Pending,
            artifacts: Vec::new(),
            error: None,
            retry_count: 0,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn theme() -> Self {
        Self::new(StepKind::Theme, "Theme")
    }

    pub fn template_parts() -> Self {
        Self::new(StepKind::TemplateParts, "Template parts")
    }

    pub fn page(page: &PageSpec) -> Self {
        Self::new(
            StepKind::Page {
                slug: page.slug.clone(),
            },
            format!("Page: {}", page.title),
        )
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn illegal(&self, action: &str) -> SitegenError {
        SitegenError::state(format!(
            "step '{}' cannot {action} while {}",
            self.id, self.status
        ))
    }

    /// Enter `generating` for a new attempt. Clears the previous attempt's
    /// artifacts and error.
    pub fn begin_attempt(&mut self) -> Result<()> {
        match self.status {
            StepStatus::Pending | StepStatus::Retrying => {
                self.status = StepStatus::Generating;
                self.artifacts.clear();
                self.error = None;
                self.started_at.get_or_insert_with(Utc::now);
                Ok(())
            }
            _ => Err(self.illegal("begin an attempt")),
        }
    }

    pub fn succeed(&mut self) -> Result<()> {
        if self.status != StepStatus::Generating {
            return Err(self.illegal("complete"));
        }
        self.status = StepStatus::Complete;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// Returns `Some(delay_index)` when another attempt is allowed (the index
    /// is the retry count before incrementing), `None` when the step is now
    /// in `error`.
    pub fn fail(&mut self, error: impl Into<String>, max_retries: u32) -> Result<Option<usize>> {
        if self.status != StepStatus::Generating {
            return Err(self.illegal("fail"));
        }
        self.error = Some(error.into());
        if self.retry_count < max_retries {
            let index = self.retry_count as usize;
            self.retry_count += 1;
            self.status = StepStatus::Retrying;
            Ok(Some(index))
        } else {
            self.status = StepStatus::Error;
            self.finished_at = Some(Utc::now());
            Ok(None)
        }
    }

    /// Move a non-terminal step to `error`. Returns `false` if it was already
    /// terminal.
    pub fn cancel(&mut self, reason: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = StepStatus::Error;
        self.error = Some(reason.into());
        self.finished_at = Some(Utc::now());
        true
    }

    /// Turn a `complete` step into `error` after a failed post-condition.
    pub fn force_error(&mut self, error: impl Into<String>) -> Result<()> {
        if self.status != StepStatus::Complete {
            return Err(self.illegal("be forced to error"));
        }
        self.status = StepStatus::Error;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let mut step = Step::theme();
        assert_eq!(step.status, StepStatus::Pending);
        step.begin_attempt().unwrap();
        assert_eq!(step.status, StepStatus::Generating);
        assert!(step.started_at.is_some());
        step.succeed().unwrap();
        assert_eq!(step.status, StepStatus::Complete);
        assert!(step.finished_at.is_some());
    }

    #[test]
    fn retries_until_exhausted() {
        let mut step = Step::template_parts();
        let mut indices = Vec::new();
        loop {
            step.begin_attempt().unwrap();
            match step.fail("boom", 2).unwrap() {
                Some(index) => {
                    assert_eq!(step.status, StepStatus::Retrying);
                    indices.push(index);
                }
                None => break,
            }
        }
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(step.retry_count, 2);
        assert_eq!(step.status, StepStatus::Error);
        assert_eq!(step.error.as_deref(), Some("boom"));
    }

    #[test]
    fn success_after_retries_keeps_count() {
        let mut step = Step::theme();
        step.begin_attempt().unwrap();
        step.fail("first", 2).unwrap();
        step.begin_attempt().unwrap();
        assert_eq!(step.error, None);
        step.succeed().unwrap();
        assert_eq!(step.status, StepStatus::Complete);
        assert_eq!(step.retry_count, 1);
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let mut step = Step::theme();
        assert!(step.succeed().is_err());
        assert!(step.fail("x", 2).is_err());
        assert!(step.force_error("x").is_err());

        step.begin_attempt().unwrap();
        assert!(step.begin_attempt().is_err());
        step.succeed().unwrap();
        assert!(step.begin_attempt().is_err());
        assert!(matches!(step.succeed(), Err(SitegenError::State { .. })));
    }

    #[test]
    fn cancel_only_touches_live_steps() {
        let mut pending = Step::page(&PageSpec::new("menu", "Menu", ""));
        assert!(pending.cancel("cancelled"));
        assert_eq!(pending.status, StepStatus::Error);
        assert!(!pending.cancel("again"));
        assert_eq!(pending.error.as_deref(), Some("cancelled"));
    }

    #[test]
    fn force_error_after_complete() {
        let mut step = Step::theme();
        step.begin_attempt().unwrap();
        step.succeed().unwrap();
        step.force_error("no theme produced").unwrap();
        assert_eq!(step.status, StepStatus::Error);
        assert_eq!(step.retry_count, 0);
    }

    #[test]
    fn page_step_ids() {
        let step = Step::page(&PageSpec::new("menu", "Menu", "What we serve"));
        assert_eq!(step.id, "page:menu");
        assert_eq!(step.label, "Page: Menu");
        assert_eq!(
            step.kind,
            StepKind::Page {
                slug: "menu".into()
            }
        );
    }
}
