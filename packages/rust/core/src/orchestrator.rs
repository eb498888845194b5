//! The generation pipeline: theme → template parts → pages.
//!
//! [`Orchestrator`] is the only writer of [`PipelineState`]. Each stage runs
//! one or more steps; a step streams a completion, feeds the text through an
//! [`IncrementalParser`] and applies every newly closed fence to the state as
//! it arrives. Failed attempts are retried on a fixed schedule; what a
//! final failure means for the run is decided by the [`FatalityPolicy`].

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use sitegen_artifacts::{Artifact, IncrementalParser};
use sitegen_provider::{StreamEvent, TextSource};
use sitegen_shared::{AppConfig, Brief, PageSpec, Result, SitegenError, default_pages_for};

use crate::notify::{ChangeNotifier, PipelineObserver};
use crate::prompts;
use crate::retry::{FatalityPolicy, RetryPolicy, backoff};
use crate::scheduler::{TaskOutcome, run_bounded};
use crate::state::{PipelineState, PipelineStatus, Section};
use crate::step::{Step, StepKind, StepStatus};
use crate::store::ContentStore;

/// Runtime knobs for one run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Key under which sections and the run are stored.
    pub project_id: String,
    /// Pages to generate. Empty means the default plan for the site type.
    pub pages: Vec<PageSpec>,
    pub page_concurrency: usize,
    pub retry: RetryPolicy,
    pub fatality: FatalityPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            project_id: "default".into(),
            pages: Vec::new(),
            page_concurrency: config.defaults.page_concurrency as usize,
            retry: RetryPolicy::from(&config.retry),
            fatality: FatalityPolicy::from(&config.policy),
        }
    }
}

/// How a step ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StepOutcome {
    Complete,
    Failed(String),
    Cancelled,
}

/// Drives one pipeline run. Cheap to clone; clones share the run.
///
/// Observers are called after the state lock is released, so they may read
/// the run through [`Orchestrator::try_snapshot`] or hand the snapshot to
/// another task.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    source: Arc<dyn TextSource>,
    store: Arc<dyn ContentStore>,
    notifier: ChangeNotifier,
    options: PipelineOptions,
    state: Mutex<PipelineState>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        brief: Brief,
        source: Arc<dyn TextSource>,
        store: Arc<dyn ContentStore>,
        observer: Arc<dyn PipelineObserver>,
        mut options: PipelineOptions,
    ) -> Self {
        if options.pages.is_empty() {
            options.pages = default_pages_for(&brief.site_type);
        }
        Self {
            inner: Arc::new(Inner {
                source,
                store,
                notifier: ChangeNotifier::new(observer),
                options,
                state: Mutex::new(PipelineState::new(brief)),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.inner.options
    }

    /// Token cancelled by [`Orchestrator::abort`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Ask the run to stop. Steps notice at their next check point.
    pub fn abort(&self) {
        info!("abort requested");
        self.inner.cancel.cancel();
    }

    pub async fn snapshot(&self) -> PipelineState {
        self.inner.state.lock().await.clone()
    }

    /// Current state without waiting. `None` while a write is in progress.
    pub fn try_snapshot(&self) -> Option<PipelineState> {
        self.inner.state.try_lock().ok().map(|state| state.clone())
    }

    /// Merge string and string-list fields into the brief's context.
    pub async fn update_context(&self, data: &Map<String, Value>) -> usize {
        self.update(|state| state.brief.merge_context(data)).await
    }

    /// Run the whole pipeline and return the final snapshot.
    ///
    /// Only an idle orchestrator starts; any other call returns the current
    /// snapshot untouched. Failures end up in the returned state, never as
    /// an error.
    #[instrument(skip_all, fields(project = %self.inner.options.project_id))]
    pub async fn start(&self) -> PipelineState {
        let started = {
            let mut state = self.inner.state.lock().await;
            if state.status != PipelineStatus::Idle {
                debug!(status = %state.status, "start ignored, run already started");
                return state.clone();
            }
            state.status = PipelineStatus::Running;
            state.started_at = Some(Utc::now());
            info!(
                run_id = %state.run_id,
                site = %state.brief.site_name,
                pages = self.inner.options.pages.len(),
                "pipeline started"
            );
            state.clone()
        };
        self.inner.notifier.notify(started);

        let halted = self.run_stages().await;
        self.finish(halted).await
    }

    /// Lock, mutate, unlock, notify.
    async fn update<R>(&self, f: impl FnOnce(&mut PipelineState) -> R) -> R {
        let (result, snapshot) = {
            let mut state = self.inner.state.lock().await;
            let result = f(&mut state);
            (result, state.clone())
        };
        self.inner.notifier.notify(snapshot);
        result
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    /// Returns the reason the run halted early, if it did.
    async fn run_stages(&self) -> Option<String> {
        let token = self.inner.cancel.clone();

        for kind in [StepKind::Theme, StepKind::TemplateParts] {
            match self.run_step(kind.clone(), &token).await {
                StepOutcome::Complete => {}
                StepOutcome::Cancelled => return Some("cancelled".into()),
                StepOutcome::Failed(reason) => {
                    if self.inner.options.fatality.is_fatal(&kind) {
                        error!(step = %kind.step_id(), %reason, "fatal step failure, halting");
                        return Some(format!("{} failed: {reason}", kind.step_id()));
                    }
                    warn!(step = %kind.step_id(), %reason, "step failed, continuing");
                }
            }
        }

        self.run_pages(&token).await
    }

    #[instrument(skip_all, fields(pages = self.inner.options.pages.len()))]
    async fn run_pages(&self, token: &CancellationToken) -> Option<String> {
        let pages = &self.inner.options.pages;
        let page_token = token.child_token();

        self.update(|state| {
            for page in pages {
                state.steps.push(Step::page(page));
            }
        })
        .await;

        let fatal = self.inner.options.fatality.pages;
        let tasks: Vec<_> = pages
            .iter()
            .map(|page| {
                let this = self.clone();
                let token = page_token.clone();
                let kind = StepKind::Page {
                    slug: page.slug.clone(),
                };
                async move {
                    let outcome = this.run_step(kind, &token).await;
                    if fatal && matches!(outcome, StepOutcome::Failed(_)) {
                        token.cancel();
                    }
                    outcome
                }
            })
            .collect();

        let outcomes = run_bounded(tasks, self.inner.options.page_concurrency, &page_token).await;

        let mut fatal_reason = None;
        for (page, outcome) in pages.iter().zip(outcomes) {
            let step_id = StepKind::Page {
                slug: page.slug.clone(),
            }
            .step_id();
            match outcome {
                TaskOutcome::Finished(StepOutcome::Failed(reason)) if fatal => {
                    fatal_reason.get_or_insert_with(|| format!("{step_id} failed: {reason}"));
                }
                TaskOutcome::Panicked(message) => {
                    let reason = format!("page task panicked: {message}");
                    self.update(|state| {
                        state.reset_stage(&StepKind::Page {
                            slug: page.slug.clone(),
                        });
                        if let Some(step) = state.step_mut(&step_id) {
                            step.cancel(reason.clone());
                        }
                    })
                    .await;
                    if fatal {
                        fatal_reason.get_or_insert(reason);
                    }
                }
                _ => {}
            }
        }

        if token.is_cancelled() {
            return Some("cancelled".into());
        }
        fatal_reason
    }

    async fn finish(&self, halted: Option<String>) -> PipelineState {
        let cancelled = self.inner.cancel.is_cancelled();
        let snapshot = self
            .update(|state| {
                let reason = if cancelled { "cancelled" } else { "skipped" };
                for step in state.steps.iter_mut() {
                    step.cancel(reason);
                }

                let failed: Vec<&str> = state
                    .steps
                    .iter()
                    .filter(|s| s.status == StepStatus::Error)
                    .map(|s| s.id.as_str())
                    .collect();

                let error = match halted {
                    Some(reason) => Some(reason),
                    None if !failed.is_empty() => Some(format!(
                        "{} of {} steps failed: {}",
                        failed.len(),
                        state.steps.len(),
                        failed.join(", ")
                    )),
                    None => None,
                };
                state.status = if error.is_some() {
                    PipelineStatus::Error
                } else {
                    PipelineStatus::Complete
                };
                state.error = error;
                state.finished_at = Some(Utc::now());
                state.clone()
            })
            .await;

        match serde_json::to_value(&snapshot) {
            Ok(value) => {
                if let Err(e) = self
                    .inner
                    .store
                    .save_run(
                        &self.inner.options.project_id,
                        &snapshot.run_id.to_string(),
                        snapshot.status.as_str(),
                        &value,
                    )
                    .await
                {
                    warn!(error = %e, "failed to save run snapshot");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode run snapshot"),
        }

        info!(
            status = %snapshot.status,
            complete = snapshot.count_steps(StepStatus::Complete),
            failed = snapshot.count_steps(StepStatus::Error),
            input_tokens = snapshot.usage.input_tokens,
            output_tokens = snapshot.usage.output_tokens,
            "pipeline finished"
        );
        snapshot
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    #[instrument(skip_all, fields(step = %kind.step_id()))]
    async fn run_step(&self, kind: StepKind, token: &CancellationToken) -> StepOutcome {
        let step_id = kind.step_id();
        let retry = &self.inner.options.retry;

        self.update(|state| {
            if state.step(&step_id).is_none() {
                let step = match &kind {
                    StepKind::Theme => Step::theme(),
                    StepKind::TemplateParts => Step::template_parts(),
                    StepKind::Page { .. } => Step::new(kind.clone(), step_id.clone()),
                };
                state.steps.push(step);
            }
        })
        .await;

        loop {
            if token.is_cancelled() {
                return self.cancel_step(&kind).await;
            }

            let begun = self
                .update(|state| {
                    state.reset_stage(&kind);
                    let step = state
                        .step_mut(&step_id)
                        .ok_or_else(|| SitegenError::state(format!("unknown step '{step_id}'")))?;
                    step.begin_attempt()?;
                    Ok::<u32, SitegenError>(step.retry_count + 1)
                })
                .await;
            let attempt = match begun {
                Ok(attempt) => attempt,
                Err(e) => {
                    error!(error = %e, "could not start attempt");
                    return StepOutcome::Failed(e.to_string());
                }
            };
            debug!(attempt, "attempt started");

            match self.attempt(&kind, &step_id, token).await {
                Ok(()) => {
                    let outcome = self.complete_step(&kind).await;
                    if outcome == StepOutcome::Complete {
                        self.store_sections(&kind).await;
                    }
                    return outcome;
                }
                Err(SitegenError::Cancelled) => return self.cancel_step(&kind).await,
                Err(e) => {
                    let reason = e.to_string();
                    let next = self
                        .update(|state| {
                            let next = state
                                .step_mut(&step_id)
                                .map(|step| step.fail(reason.clone(), retry.max_retries));
                            if !matches!(next, Some(Ok(Some(_)))) {
                                state.reset_stage(&kind);
                            }
                            next
                        })
                        .await;

                    match next {
                        Some(Ok(Some(index))) => {
                            let delay = retry.delay_for(index);
                            warn!(
                                attempt,
                                error = %reason,
                                delay_ms = delay.as_millis() as u64,
                                "attempt failed, retrying"
                            );
                            self.inner
                                .notifier
                                .retry_scheduled(&step_id, attempt, delay);
                            if backoff(delay, token).await.is_err() {
                                return self.cancel_step(&kind).await;
                            }
                        }
                        Some(Ok(None)) => {
                            warn!(attempts = attempt, error = %reason, "step failed");
                            return StepOutcome::Failed(reason);
                        }
                        Some(Err(e)) => return StepOutcome::Failed(e.to_string()),
                        None => return StepOutcome::Failed(format!("unknown step '{step_id}'")),
                    }
                }
            }
        }
    }

    async fn cancel_step(&self, kind: &StepKind) -> StepOutcome {
        let step_id = kind.step_id();
        self.update(|state| {
            state.reset_stage(kind);
            if let Some(step) = state.step_mut(&step_id) {
                step.cancel("cancelled");
            }
        })
        .await;
        debug!(step = %step_id, "step cancelled");
        StepOutcome::Cancelled
    }

    /// Mark the step complete, then check it actually produced its output.
    async fn complete_step(&self, kind: &StepKind) -> StepOutcome {
        let step_id = kind.step_id();
        let outcome = self
            .update(|state| {
                let missing = match kind {
                    StepKind::Theme => state.theme.is_none().then_some("no theme was produced"),
                    StepKind::TemplateParts => state
                        .template_parts
                        .is_empty()
                        .then_some("no template part was produced"),
                    StepKind::Page { .. } => state
                        .step(&step_id)
                        .is_none_or(|step| {
                            !step
                                .artifacts
                                .iter()
                                .any(|a| matches!(a, Artifact::Section { .. }))
                        })
                        .then_some("no section was produced"),
                };
                let step = state
                    .step_mut(&step_id)
                    .ok_or_else(|| SitegenError::state(format!("unknown step '{step_id}'")))?;
                step.succeed()?;
                match missing {
                    Some(reason) => {
                        step.force_error(reason)?;
                        state.reset_stage(kind);
                        Ok(StepOutcome::Failed(reason.to_string()))
                    }
                    None => Ok::<_, SitegenError>(StepOutcome::Complete),
                }
            })
            .await
            .unwrap_or_else(|e| StepOutcome::Failed(e.to_string()));

        match &outcome {
            StepOutcome::Complete => info!(step = %step_id, "step complete"),
            StepOutcome::Failed(reason) => {
                warn!(step = %step_id, %reason, "step output check failed")
            }
            StepOutcome::Cancelled => {}
        }
        outcome
    }

    fn build_request(
        &self,
        state: &PipelineState,
        kind: &StepKind,
    ) -> Result<sitegen_provider::CompletionRequest> {
        Ok(match kind {
            StepKind::Theme => prompts::theme_prompt(&state.brief),
            StepKind::TemplateParts => {
                prompts::template_parts_prompt(&state.brief, state.theme.as_ref())
            }
            StepKind::Page { slug } => {
                let page = self
                    .inner
                    .options
                    .pages
                    .iter()
                    .find(|p| &p.slug == slug)
                    .ok_or_else(|| SitegenError::state(format!("no page planned for '{slug}'")))?;
                prompts::page_prompt(
                    &state.brief,
                    state.theme.as_ref(),
                    &state.template_parts,
                    page,
                )
            }
        })
    }

    /// Persist a completed page's sections.
    async fn store_sections(&self, kind: &StepKind) {
        let StepKind::Page { slug } = kind else {
            return;
        };
        let sections = {
            let state = self.inner.state.lock().await;
            state.pages.get(slug).cloned().unwrap_or_default()
        };

        let project_id = &self.inner.options.project_id;
        for section in &sections {
            let content = match serde_json::to_value(section) {
                Ok(content) => content,
                Err(e) => {
                    warn!(section_id = %section.id, error = %e, "failed to encode section");
                    continue;
                }
            };
            if let Err(e) = self
                .inner
                .store
                .upsert_section(project_id, &section.id, &content)
                .await
            {
                warn!(section_id = %section.id, error = %e, "failed to store section");
            }
        }
        debug!(page = %slug, sections = sections.len(), "sections stored");
    }

    /// One attempt: prompt, stream, parse, apply.
    async fn attempt(
        &self,
        kind: &StepKind,
        step_id: &str,
        token: &CancellationToken,
    ) -> Result<()> {
        let request = {
            let state = self.inner.state.lock().await;
            self.build_request(&state, kind)?
        };

        let mut stream = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(SitegenError::Cancelled),
            opened = self.inner.source.stream(request) => opened?,
        };

        let mut parser = IncrementalParser::new();
        let mut applied = 0;
        loop {
            let event = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(SitegenError::Cancelled),
                event = stream.next() => event,
            };

            match event {
                Some(Ok(StreamEvent::Delta(text))) => {
                    if parser.push(&text) > 0 {
                        self.apply_new(kind, step_id, &parser, &mut applied).await;
                    }
                }
                Some(Ok(StreamEvent::Done(message))) => {
                    if parser.buffer().is_empty() {
                        parser.push(&message.text);
                    } else if parser.buffer() != message.text {
                        warn!(
                            streamed = parser.buffer().len(),
                            final_len = message.text.len(),
                            "final text differs from streamed text, keeping streamed"
                        );
                    }
                    self.inner.state.lock().await.usage += message.usage;
                    self.apply_new(kind, step_id, &parser, &mut applied).await;
                    debug!(
                        fences = parser.fence_count(),
                        stop_reason = message.stop_reason.as_deref().unwrap_or("none"),
                        "stream finished"
                    );
                    return Ok(());
                }
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(SitegenError::Stream(
                        "stream ended without a final message".into(),
                    ));
                }
            }
        }
    }

    /// Apply fence artifacts not seen yet and refresh the step's artifacts.
    async fn apply_new(
        &self,
        kind: &StepKind,
        step_id: &str,
        parser: &IncrementalParser,
        applied: &mut usize,
    ) {
        let artifacts = parser.artifacts();
        let fresh: Vec<Artifact> = artifacts
            .iter()
            .filter(|a| !matches!(a, Artifact::Text { .. }))
            .skip(*applied)
            .cloned()
            .collect();
        *applied += fresh.len();

        self.update(|state| {
            for artifact in &fresh {
                apply_artifact(state, kind, artifact);
            }
            if let Some(step) = state.step_mut(step_id) {
                step.artifacts = artifacts;
            }
        })
        .await;

        for artifact in &fresh {
            self.inner.notifier.artifact(step_id, artifact);
        }
    }
}

/// Route one artifact into the state.
fn apply_artifact(state: &mut PipelineState, kind: &StepKind, artifact: &Artifact) {
    match (kind, artifact) {
        (_, Artifact::Context { data }) => match data.as_object() {
            Some(map) => {
                let written = state.brief.merge_context(map);
                debug!(keys = written, "context merged");
            }
            None => warn!("context card is not a JSON object, ignoring"),
        },
        (StepKind::Theme, Artifact::Theme { theme }) => {
            state.theme = Some(theme.clone());
        }
        (StepKind::TemplateParts, Artifact::TemplatePart { part_type, data }) => {
            state.template_parts.insert(part_type.clone(), data.clone());
        }
        (
            StepKind::Page { slug },
            Artifact::Section {
                section_type,
                data,
                valid: true,
                ..
            },
        ) => {
            let sections = state.pages.entry(slug.clone()).or_default();
            let ordinal = sections.len();
            sections.push(Section::new(slug, ordinal, section_type.clone(), data.clone()));
        }
        (
            StepKind::Page { slug },
            Artifact::Section {
                section_type,
                validation_errors,
                valid: false,
                ..
            },
        ) => {
            warn!(
                page = %slug,
                %section_type,
                errors = ?validation_errors,
                "discarding invalid section"
            );
        }
        (_, Artifact::Error { fence_type, reason, .. }) => {
            warn!(%fence_type, %reason, "undecodable fence");
        }
        (_, other) => {
            debug!(artifact = other.kind(), "artifact not used by this stage");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> PipelineState {
        PipelineState::new(Brief::new("restaurant", "Cafe X"))
    }

    fn section(section_type: &str, valid: bool) -> Artifact {
        Artifact::Section {
            section_type: section_type.into(),
            data: json!({"heading": "x"}),
            valid,
            validation_errors: if valid { vec![] } else { vec!["bad".into()] },
        }
    }

    #[test]
    fn sections_numbered_by_kept_order() {
        let mut state = state();
        let page = StepKind::Page {
            slug: "menu".into(),
        };

        apply_artifact(&mut state, &page, &section("faq", true));
        apply_artifact(&mut state, &page, &section("faq", false));
        apply_artifact(&mut state, &page, &section("stats", true));

        let placed = &state.pages["menu"];
        assert_eq!(placed.len(), 2);
        assert_eq!(placed[0].id, "menu-section-0");
        assert_eq!(placed[1].id, "menu-section-1");
        assert_eq!(placed[1].section_type, "stats");
    }

    #[test]
    fn artifacts_outside_their_stage_are_ignored() {
        let mut state = state();
        apply_artifact(
            &mut state,
            &StepKind::TemplateParts,
            &Artifact::Theme {
                theme: json!({}),
            },
        );
        apply_artifact(&mut state, &StepKind::Theme, &section("faq", true));
        assert!(state.theme.is_none());
        assert!(state.pages.is_empty());
    }

    #[test]
    fn context_merges_in_any_stage() {
        let mut state = state();
        apply_artifact(
            &mut state,
            &StepKind::Theme,
            &Artifact::Context {
                data: json!({"hours": "7-15", "dishes": ["soup", "pie"], "seats": 20}),
            },
        );
        assert_eq!(state.brief.context.len(), 2);
        assert!(state.brief.context.contains_key("dishes"));
    }

    #[test]
    fn options_from_config() {
        let mut config = AppConfig::default();
        config.defaults.page_concurrency = 5;
        config.retry.max_retries = 4;
        config.policy.pages_fatal = true;

        let options = PipelineOptions::from(&config);
        assert_eq!(options.page_concurrency, 5);
        assert_eq!(options.retry.max_retries, 4);
        assert!(options.fatality.pages);
        assert!(options.pages.is_empty());
    }
}
