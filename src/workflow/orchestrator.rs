//! Staged reveal of one aggregated analysis result.
//!
//! The service computes all three agents in a single round trip. The
//! orchestrator replays that result as a paced sequence of stages:
//! identity, then billing, then discharge, then `Complete`.
//!
//! Every run is tagged with a monotonically increasing run id. Continuations
//! of a superseded run compare their captured id with the current one before
//! touching the state and silently stop on mismatch. The comparison and the
//! mutation happen under the state channel's lock, so `start()` can never
//! interleave between them.

use crate::error::GatewayError;
use crate::gateway::AnalysisGateway;
use crate::models::{AnalysisRequest, AnalysisResult, Section};
use crate::workflow::state::{Stage, WorkflowState};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

/// Default pause between staged reveals.
pub const DEFAULT_PACING_MS: u64 = 500;

/// Capacity of the transition broadcast; one run emits well under this.
const TRANSITION_CAPACITY: usize = 64;

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Pause before revealing billing and before revealing discharge.
    pub pacing: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            pacing: Duration::from_millis(DEFAULT_PACING_MS),
        }
    }
}

impl WorkflowConfig {
    /// No pacing, for non-interactive use.
    pub fn headless() -> Self {
        Self {
            pacing: Duration::ZERO,
        }
    }
}

struct Shared {
    gateway: Arc<dyn AnalysisGateway>,
    state: watch::Sender<WorkflowState>,
    transitions: broadcast::Sender<WorkflowState>,
    pacing: Duration,
}

impl Shared {
    /// Replace the state with a fresh run and return its id.
    fn begin(&self, patient_id: &str) -> u64 {
        let mut run_id = 0;
        self.state.send_modify(|state| {
            run_id = state.run_id + 1;
            *state = WorkflowState::begin(run_id, patient_id.trim());
            let _ = self.transitions.send(state.clone());
        });

        info!("Starting analysis run {} for patient '{}'", run_id, patient_id.trim());
        run_id
    }

    /// Apply `mutate` only if `run_id` is still the current run.
    fn apply(&self, run_id: u64, mutate: impl FnOnce(&mut WorkflowState)) -> bool {
        let applied = self.state.send_if_modified(|state| {
            if state.run_id != run_id {
                return false;
            }
            mutate(state);
            let _ = self.transitions.send(state.clone());
            true
        });

        if !applied {
            debug!("Discarding stale continuation of run {}", run_id);
        }
        applied
    }

    fn fail(&self, run_id: u64, error: &GatewayError) {
        warn!("Run {} failed ({}): {}", run_id, error.status(), error);
        self.apply(run_id, |state| {
            state.stage = Stage::Failed;
            state.error = Some(error.message().to_string());
            state.loading = false;
        });
    }

    /// Begin a run and validate its input. `None` means the run already failed.
    fn prepare(&self, patient_id: &str) -> Option<(u64, AnalysisRequest)> {
        let run_id = self.begin(patient_id);
        match AnalysisRequest::new(patient_id) {
            Ok(request) => Some((run_id, request)),
            Err(e) => {
                self.fail(run_id, &e);
                None
            }
        }
    }

    async fn drive(&self, run_id: u64, request: AnalysisRequest) {
        let result = match self.gateway.submit_analysis(&request.patient_id).await {
            Ok(result) => result,
            Err(e) => {
                self.fail(run_id, &e);
                return;
            }
        };

        if self.reveal(run_id, result).await {
            self.apply(run_id, |state| state.loading = false);
        }
    }

    /// Reveal the staged sections in order. Returns false once superseded.
    ///
    /// An absent billing or discharge section skips its pause and stage;
    /// without identity nothing is revealed at all.
    async fn reveal(&self, run_id: u64, result: AnalysisResult) -> bool {
        let AnalysisResult {
            identity,
            billing,
            discharge,
            mut final_summary,
        } = result;

        let Some(identity) = identity else {
            debug!("Run {}: no identity section, nothing to reveal", run_id);
            return true;
        };
        if !self.apply(run_id, |state| {
            state.revealed.insert(Section::Identity, identity);
        }) {
            return false;
        }
        debug!("Run {}: revealed identity", run_id);

        for (section, value) in [(Section::Billing, billing), (Section::Discharge, discharge)] {
            let Some(value) = value else {
                debug!("Run {}: no {} section, skipping its stage", run_id, section);
                continue;
            };

            if !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }

            let stage = Stage::revealing(section).unwrap_or(Stage::Complete);
            if !self.apply(run_id, |state| {
                state.stage = stage;
                state.revealed.insert(section, value);
            }) {
                return false;
            }
            debug!("Run {}: revealed {}", run_id, section);

            if section == Section::Discharge {
                let summary = final_summary.take();
                if !self.apply(run_id, |state| {
                    state.stage = Stage::Complete;
                    if let Some(summary) = summary {
                        state.revealed.insert(Section::Final, summary);
                    }
                }) {
                    return false;
                }
                info!("Run {} complete", run_id);
            }
        }

        if let Some(summary) = final_summary {
            return self.apply(run_id, |state| {
                state.revealed.insert(Section::Final, summary);
            });
        }

        true
    }
}

/// Owns the workflow state and drives runs against the gateway.
pub struct Orchestrator {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(gateway: Arc<dyn AnalysisGateway>, config: WorkflowConfig) -> Self {
        let (state, _) = watch::channel(WorkflowState::default());
        let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);

        Self {
            shared: Arc::new(Shared {
                gateway,
                state,
                transitions,
                pacing: config.pacing,
            }),
            task: Mutex::new(None),
        }
    }

    /// Current state.
    pub fn snapshot(&self) -> WorkflowState {
        self.shared.state.borrow().clone()
    }

    /// Latest-value subscription to the state.
    #[allow(dead_code)] // For embedders that only render the newest state
    pub fn watch(&self) -> watch::Receiver<WorkflowState> {
        self.shared.state.subscribe()
    }

    /// One snapshot per applied mutation, in order.
    pub fn transitions(&self) -> broadcast::Receiver<WorkflowState> {
        self.shared.transitions.subscribe()
    }

    /// Start a new run in the background, superseding any run in flight.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, patient_id: &str) {
        let Some((run_id, request)) = self.shared.prepare(patient_id) else {
            return;
        };

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            shared.drive(run_id, request).await;
        });

        // The previous task is left to run out; the run id neutralizes it.
        if let Ok(mut task) = self.task.lock() {
            *task = Some(handle);
        }
    }

    /// Wait for the task of the most recent `start()` to end.
    ///
    /// Returns `Ok` right away if no task is pending. An `Err` means the
    /// task panicked or was aborted, so its state may still read `loading`.
    pub async fn join(&self) -> Result<(), JoinError> {
        let handle = self.task.lock().ok().and_then(|mut task| task.take());
        match handle {
            Some(handle) => handle.await,
            None => Ok(()),
        }
    }

    /// Drive a run inline and return the state once its continuation ends.
    ///
    /// If another run superseded this one meanwhile, the newer state is returned.
    pub async fn run(&self, patient_id: &str) -> WorkflowState {
        if let Some((run_id, request)) = self.shared.prepare(patient_id) {
            self.shared.drive(run_id, request).await;
        }
        self.snapshot()
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GatewayResult, MISSING_PATIENT_MESSAGE};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;
    use tokio_test::assert_ok;

    /// Gateway answering from a fixed script, with per-patient latency.
    #[derive(Default)]
    struct ScriptedGateway {
        script: HashMap<String, (Duration, GatewayResult<AnalysisResult>)>,
        calls: AtomicUsize,
    }

    impl ScriptedGateway {
        fn with(mut self, patient_id: &str, latency_ms: u64, answer: GatewayResult<AnalysisResult>) -> Self {
            self.script.insert(
                patient_id.to_string(),
                (Duration::from_millis(latency_ms), answer),
            );
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AnalysisGateway for ScriptedGateway {
        async fn submit_analysis(&self, patient_id: &str) -> GatewayResult<AnalysisResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script.get(patient_id) {
                Some((latency, answer)) => {
                    tokio::time::sleep(*latency).await;
                    answer.clone()
                }
                None => Err(GatewayError::remote(404, "patient not found")),
            }
        }

        async fn list_sample_ids(&self) -> Vec<String> {
            self.script.keys().cloned().collect()
        }
    }

    /// Result whose sections are tagged with `tag`.
    fn tagged(tag: &str, sections: &[Section]) -> AnalysisResult {
        let value = |s: Section| -> Option<Value> {
            sections
                .contains(&s)
                .then(|| json!({"source": tag, "section": s.key()}))
        };
        AnalysisResult {
            identity: value(Section::Identity),
            billing: value(Section::Billing),
            discharge: value(Section::Discharge),
            final_summary: value(Section::Final),
        }
    }

    fn orchestrator(gateway: Arc<ScriptedGateway>) -> Orchestrator {
        Orchestrator::new(gateway, WorkflowConfig::default())
    }

    fn drain(rx: &mut broadcast::Receiver<WorkflowState>) -> Vec<WorkflowState> {
        let mut seen = Vec::new();
        while let Ok(state) = rx.try_recv() {
            seen.push(state);
        }
        seen
    }

    fn stage_sequence(states: &[WorkflowState]) -> Vec<Stage> {
        let mut stages: Vec<Stage> = states.iter().map(|s| s.stage).collect();
        stages.dedup();
        stages
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_result_reveals_in_order() {
        let gateway = Arc::new(ScriptedGateway::default().with("p-1", 0, Ok(tagged("p-1", &Section::ALL))));
        let orchestrator = orchestrator(gateway);
        let mut rx = orchestrator.transitions();

        let started = Instant::now();
        let state = orchestrator.run("p-1").await;
        let elapsed = started.elapsed();

        assert_eq!(state.stage, Stage::Complete);
        assert_eq!(state.revealed.keys(), Section::ALL.to_vec());
        assert!(state.error.is_none());
        assert!(!state.loading);

        // Two pacing delays; discharge completes immediately.
        assert!(elapsed >= Duration::from_millis(2 * DEFAULT_PACING_MS));
        assert!(elapsed < Duration::from_millis(3 * DEFAULT_PACING_MS));

        let transitions = drain(&mut rx);
        assert_eq!(
            stage_sequence(&transitions),
            vec![
                Stage::RevealingIdentity,
                Stage::RevealingBilling,
                Stage::RevealingDischarge,
                Stage::Complete,
            ]
        );

        let first_complete = transitions
            .iter()
            .find(|s| s.stage == Stage::Complete)
            .unwrap();
        assert!(first_complete.revealed.contains(Section::Final));
    }

    #[tokio::test(start_paused = true)]
    async fn test_identity_only_does_not_advance() {
        let gateway = Arc::new(
            ScriptedGateway::default().with("p-1", 0, Ok(tagged("p-1", &[Section::Identity]))),
        );
        let orchestrator = orchestrator(gateway);
        let mut rx = orchestrator.transitions();

        orchestrator.start("p-1");
        tokio::time::sleep(Duration::from_secs(5)).await;

        let state = orchestrator.snapshot();
        assert_eq!(state.stage, Stage::RevealingIdentity);
        assert_eq!(state.revealed.keys(), vec![Section::Identity]);
        assert!(state.error.is_none());
        assert!(state.is_incomplete());

        let transitions = drain(&mut rx);
        assert!(transitions.iter().all(|s| s.stage != Stage::RevealingBilling));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_identity_reveals_nothing() {
        let gateway = Arc::new(ScriptedGateway::default().with(
            "p-1",
            0,
            Ok(tagged("p-1", &[Section::Billing, Section::Discharge, Section::Final])),
        ));
        let state = orchestrator(gateway).run("p-1").await;

        assert_eq!(state.stage, Stage::RevealingIdentity);
        assert!(state.revealed.is_empty());
        assert!(state.error.is_none());
        assert!(!state.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_billing_still_reveals_discharge() {
        let gateway = Arc::new(ScriptedGateway::default().with(
            "p-1",
            0,
            Ok(tagged("p-1", &[Section::Identity, Section::Discharge, Section::Final])),
        ));
        let orchestrator = orchestrator(gateway);
        let mut rx = orchestrator.transitions();

        let started = Instant::now();
        let state = orchestrator.run("p-1").await;

        assert_eq!(state.stage, Stage::Complete);
        assert_eq!(
            state.revealed.keys(),
            vec![Section::Identity, Section::Discharge, Section::Final]
        );
        // Only the pause before discharge is taken.
        assert!(started.elapsed() < Duration::from_millis(2 * DEFAULT_PACING_MS));

        assert_eq!(
            stage_sequence(&drain(&mut rx)),
            vec![
                Stage::RevealingIdentity,
                Stage::RevealingDischarge,
                Stage::Complete,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_discharge_stops_at_billing() {
        let gateway = Arc::new(ScriptedGateway::default().with(
            "p-1",
            0,
            Ok(tagged("p-1", &[Section::Identity, Section::Billing, Section::Final])),
        ));
        let state = orchestrator(gateway).run("p-1").await;

        assert_eq!(state.stage, Stage::RevealingBilling);
        assert_eq!(
            state.revealed.keys(),
            vec![Section::Identity, Section::Billing, Section::Final]
        );
        assert!(state.is_incomplete());
    }

    #[tokio::test]
    async fn test_remote_error_fails_run() {
        let gateway = Arc::new(ScriptedGateway::default());
        let state = orchestrator(gateway.clone()).run("unknown").await;

        assert_eq!(state.stage, Stage::Failed);
        assert_eq!(state.error.as_deref(), Some("patient not found"));
        assert!(state.revealed.is_empty());
        assert!(!state.loading);
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_fails_run() {
        let gateway = Arc::new(ScriptedGateway::default().with(
            "p-1",
            0,
            Err(GatewayError::transport("Cannot connect to analysis service at http://localhost:8000")),
        ));
        let state = orchestrator(gateway).run("p-1").await;

        assert_eq!(state.stage, Stage::Failed);
        let error = state.error.unwrap();
        assert!(error.starts_with("Cannot connect"));
        assert_ne!(error, "patient not found");
    }

    #[tokio::test]
    async fn test_blank_patient_fails_without_calling_gateway() {
        let gateway = Arc::new(ScriptedGateway::default());
        let orchestrator = orchestrator(gateway.clone());

        for blank in ["", "   "] {
            orchestrator.start(blank);
            let state = orchestrator.snapshot();
            assert_eq!(state.stage, Stage::Failed);
            assert_eq!(state.error.as_deref(), Some(MISSING_PATIENT_MESSAGE));
        }

        let state = orchestrator.run("").await;
        assert_eq!(state.stage, Stage::Failed);
        assert_eq!(state.run_id, 3);
        assert_eq!(gateway.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_run_supersedes_paced_run() {
        let gateway = Arc::new(
            ScriptedGateway::default()
                .with("a", 0, Ok(tagged("a", &Section::ALL)))
                .with("b", 0, Ok(tagged("b", &Section::ALL))),
        );
        let orchestrator = orchestrator(gateway);
        let mut rx = orchestrator.transitions();

        orchestrator.start("a");
        // Run a is between its billing and discharge reveals.
        tokio::time::sleep(Duration::from_millis(DEFAULT_PACING_MS + 100)).await;
        assert_eq!(orchestrator.snapshot().stage, Stage::RevealingBilling);

        orchestrator.start("b");
        tokio::time::sleep(Duration::from_secs(5)).await;

        let state = orchestrator.snapshot();
        assert_eq!(state.run_id, 2);
        assert_eq!(state.stage, Stage::Complete);
        assert_eq!(state.revealed.keys(), Section::ALL.to_vec());
        for (_, value) in state.revealed.iter() {
            assert_eq!(value["source"], "b");
        }

        let transitions = drain(&mut rx);
        let b_begins = transitions.iter().position(|s| s.run_id == 2).unwrap();
        assert!(transitions[b_begins..].iter().all(|s| s.run_id == 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_response_from_old_run_is_discarded() {
        let gateway = Arc::new(
            ScriptedGateway::default()
                .with("a", 3_000, Ok(tagged("a", &Section::ALL)))
                .with("b", 0, Ok(tagged("b", &[Section::Identity]))),
        );
        let orchestrator = orchestrator(gateway.clone());

        orchestrator.start("a");
        tokio::task::yield_now().await;
        orchestrator.start("b");
        tokio::time::sleep(Duration::from_secs(10)).await;

        let state = orchestrator.snapshot();
        assert_eq!(state.run_id, 2);
        assert_eq!(state.patient_id.as_deref(), Some("b"));
        assert_eq!(state.stage, Stage::RevealingIdentity);
        assert_eq!(state.revealed.keys(), vec![Section::Identity]);
        assert_eq!(state.revealed.get(Section::Identity).unwrap()["source"], "b");
        assert_eq!(gateway.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_failure_from_old_run_is_discarded() {
        let gateway = Arc::new(
            ScriptedGateway::default()
                .with("a", 3_000, Err(GatewayError::remote(500, "model crashed")))
                .with("b", 0, Ok(tagged("b", &Section::ALL))),
        );
        let orchestrator = orchestrator(gateway.clone());
        let mut rx = orchestrator.transitions();

        orchestrator.start("a");
        tokio::task::yield_now().await;
        orchestrator.start("b");
        tokio::time::sleep(Duration::from_secs(10)).await;

        let state = orchestrator.snapshot();
        assert_eq!(state.run_id, 2);
        assert_eq!(state.stage, Stage::Complete);
        assert!(state.error.is_none());
        assert_eq!(gateway.calls(), 2);

        let transitions = drain(&mut rx);
        assert!(transitions.iter().all(|s| s.stage != Stage::Failed));
        assert!(transitions.iter().all(|s| s.error.is_none()));
    }

    /// Gateway whose analysis call panics.
    struct PanickingGateway;

    #[async_trait]
    impl AnalysisGateway for PanickingGateway {
        async fn submit_analysis(&self, _patient_id: &str) -> GatewayResult<AnalysisResult> {
            panic!("analysis backend exploded");
        }

        async fn list_sample_ids(&self) -> Vec<String> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn test_join_reports_panicked_run() {
        let orchestrator = Orchestrator::new(Arc::new(PanickingGateway), WorkflowConfig::headless());

        orchestrator.start("p-1");
        let joined = orchestrator.join().await;

        assert!(joined.unwrap_err().is_panic());
        let state = orchestrator.snapshot();
        assert!(state.loading);
        assert!(!state.stage.is_terminal());

        // Nothing left to wait for.
        assert_ok!(orchestrator.join().await);
    }

    #[tokio::test]
    async fn test_new_run_clears_previous_error() {
        let gateway = Arc::new(ScriptedGateway::default().with("p-1", 0, Ok(tagged("p-1", &Section::ALL))));
        let orchestrator = Orchestrator::new(gateway, WorkflowConfig::headless());

        let failed = orchestrator.run("unknown").await;
        assert_eq!(failed.stage, Stage::Failed);

        let state = orchestrator.run("p-1").await;
        assert_eq!(state.stage, Stage::Complete);
        assert!(state.error.is_none());
        assert_eq!(state.run_id, 2);
    }

    #[tokio::test]
    async fn test_snapshots_are_stable_between_transitions() {
        let gateway = Arc::new(ScriptedGateway::default().with("p-1", 0, Ok(tagged("p-1", &Section::ALL))));
        let orchestrator = Orchestrator::new(gateway, WorkflowConfig::headless());

        assert_eq!(orchestrator.snapshot(), WorkflowState::default());
        orchestrator.run("p-1").await;

        let first = orchestrator.snapshot();
        let second = orchestrator.snapshot();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_watch_sees_latest_state() {
        let gateway = Arc::new(ScriptedGateway::default().with("p-1", 0, Ok(tagged("p-1", &Section::ALL))));
        let orchestrator = Orchestrator::new(gateway, WorkflowConfig::headless());
        let mut watch = orchestrator.watch();

        orchestrator.start("p-1");
        let state = watch
            .wait_for(|s| !s.loading && s.run_id == 1)
            .await
            .unwrap()
            .clone();

        assert_eq!(state.stage, Stage::Complete);
        assert_eq!(state.patient_id.as_deref(), Some("p-1"));
    }
}
