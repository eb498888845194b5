//! Pipeline state: the aggregate every observer sees.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use sitegen_provider::Usage;
use sitegen_shared::{Brief, RunId};

use crate::step::{Step, StepKind, StepStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Idle,
    Running,
    Complete,
    Error,
}

impl PipelineStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated section placed on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// `{page_slug}-section-{n}`, `n` counting kept sections from 0.
    pub id: String,
    #[serde(rename = "type")]
    pub section_type: String,
    pub data: Value,
}

impl Section {
    pub fn new(slug: &str, ordinal: usize, section_type: impl Into<String>, data: Value) -> Self {
        Self {
            id: format!("{slug}-section-{ordinal}"),
            section_type: section_type.into(),
            data,
        }
    }
}

/// Everything known about one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub run_id: RunId,
    pub status: PipelineStatus,
    pub steps: Vec<Step>,
    pub brief: Brief,
    pub theme: Option<Value>,
    pub template_parts: BTreeMap<String, Value>,
    pub pages: BTreeMap<String, Vec<Section>>,
    pub error: Option<String>,
    pub usage: Usage,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineState {
    pub fn new(brief: Brief) -> Self {
        Self {
            run_id: RunId::new(),
            status: PipelineStatus::Idle,
            steps: Vec::new(),
            brief,
            theme: None,
            template_parts: BTreeMap::new(),
            pages: BTreeMap::new(),
            error: None,
            usage: Usage::default(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn step_mut(&mut self, id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    /// Page steps in creation order.
    pub fn page_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps
            .iter()
            .filter(|s| matches!(s.kind, StepKind::Page { .. }))
    }

    pub fn count_steps(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    /// Drop whatever the given stage wrote, before a fresh attempt or after
    /// the stage gave up.
    pub(crate) fn reset_stage(&mut self, kind: &StepKind) {
        match kind {
            StepKind::Theme => self.theme = None,
            StepKind::TemplateParts => self.template_parts.clear(),
            StepKind::Page { slug } => {
                self.pages.remove(slug);
            }
        }
    }
}
