use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink};
use crate::domain::parameters::ExtractionParameters;
use crate::domain::results::{ExtractionResult, SchemaResult, ValidationResult};
use crate::domain::session::SessionId;
use crate::domain::stage::{Stage, StageStatus};
use crate::errors::DomainError;
use crate::flows::{
    ExtractionWizardFlow, FlowAction, FlowContext, FlowEngine, TransitionOutcome, WorkflowEvent,
};
use crate::runner::{DeterministicStageRunner, StageFailure, StageRunner};
use crate::simulation::{
    ProgressProfile, ProgressRamp, RampStep, SimulationKind, SimulationProfiles,
};

pub const DEFAULT_COLLAPSE_DELAY: Duration = Duration::from_millis(1_000);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailableAction {
    StartSchemaDetection,
    StartValidation,
    StartExtraction,
    Reset,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    Busy,
}

/// Identifies one simulation run. Ticks carrying an older generation are stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimulationTicket {
    pub kind: SimulationKind,
    pub generation: u64,
    pub profile: ProgressProfile,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started(SimulationTicket),
    Ignored(IgnoreReason),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageCompletion {
    pub kind: SimulationKind,
    pub stage: Stage,
    pub collapse_configuration_after: Option<Duration>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Stale,
    Progressed { kind: SimulationKind, percent: u8 },
    Completed(StageCompletion),
    Failed(StageFailure),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResetOutcome {
    pub cancelled: Option<SimulationKind>,
    pub expand_configuration: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StageView {
    pub stage: Stage,
    pub label: &'static str,
    pub status: StageStatus,
}

/// Read-only copy of the controller state handed to observers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WorkflowSnapshot {
    pub session_id: SessionId,
    pub current_stage: Stage,
    pub is_busy: bool,
    pub progress_percent: u8,
    pub active_simulation: Option<SimulationKind>,
    pub available_action: Option<AvailableAction>,
    pub parameters: ExtractionParameters,
    pub stages: Vec<StageView>,
    pub schema_result: Option<SchemaResult>,
    pub validation_result: Option<ValidationResult>,
    pub extraction_result: Option<ExtractionResult>,
    pub last_failure: Option<StageFailure>,
}

impl WorkflowSnapshot {
    pub fn progress_label(&self) -> Option<String> {
        self.is_busy.then(|| progress_label(self.progress_percent))
    }
}

enum StageOutput {
    Schema(SchemaResult),
    Validation(ValidationResult),
    Extraction(ExtractionResult),
}

#[derive(Clone, Debug)]
struct ActiveSimulation {
    kind: SimulationKind,
    ramp: ProgressRamp,
    generation: u64,
}

pub struct WorkflowController {
    engine: FlowEngine<ExtractionWizardFlow>,
    runner: Arc<dyn StageRunner>,
    audit_sink: Arc<dyn AuditSink>,
    audit: AuditContext,
    session_id: SessionId,
    profiles: SimulationProfiles,
    collapse_delay: Duration,
    parameters: ExtractionParameters,
    stage: Stage,
    progress: u8,
    generation: u64,
    active: Option<ActiveSimulation>,
    schema_result: Option<SchemaResult>,
    validation_result: Option<ValidationResult>,
    extraction_result: Option<ExtractionResult>,
    last_failure: Option<StageFailure>,
}

impl Default for WorkflowController {
    fn default() -> Self {
        Self::new(Arc::new(DeterministicStageRunner))
    }
}

impl WorkflowController {
    pub fn new(runner: Arc<dyn StageRunner>) -> Self {
        let engine = FlowEngine::new(ExtractionWizardFlow);
        let session_id = SessionId::generate();
        let audit = AuditContext::new(
            Some(session_id.clone()),
            session_id.0.clone(),
            "workflow-controller",
        );
        Self {
            stage: engine.initial_stage(),
            engine,
            runner,
            audit_sink: Arc::new(NoopAuditSink),
            audit,
            session_id,
            profiles: SimulationProfiles::default(),
            collapse_delay: DEFAULT_COLLAPSE_DELAY,
            parameters: ExtractionParameters::default(),
            progress: 0,
            generation: 0,
            active: None,
            schema_result: None,
            validation_result: None,
            extraction_result: None,
            last_failure: None,
        }
    }

    pub fn with_profiles(mut self, profiles: SimulationProfiles) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn with_collapse_delay(mut self, delay: Duration) -> Self {
        self.collapse_delay = delay;
        self
    }

    pub fn with_parameters(mut self, parameters: ExtractionParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = sink;
        self
    }

    pub fn with_session(
        mut self,
        session_id: SessionId,
        correlation_id: impl Into<String>,
    ) -> Self {
        self.audit =
            AuditContext::new(Some(session_id.clone()), correlation_id, "workflow-controller");
        self.session_id = session_id;
        self
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress
    }

    pub fn parameters(&self) -> &ExtractionParameters {
        &self.parameters
    }

    pub fn profiles(&self) -> &SimulationProfiles {
        &self.profiles
    }

    pub fn schema_result(&self) -> Option<&SchemaResult> {
        self.schema_result.as_ref()
    }

    pub fn validation_result(&self) -> Option<&ValidationResult> {
        self.validation_result.as_ref()
    }

    pub fn extraction_result(&self) -> Option<&ExtractionResult> {
        self.extraction_result.as_ref()
    }

    pub fn last_failure(&self) -> Option<&StageFailure> {
        self.last_failure.as_ref()
    }

    pub fn require_schema(&self) -> Result<&SchemaResult, DomainError> {
        self.schema_result.as_ref().ok_or(DomainError::ResultUnavailable { result: "schema" })
    }

    pub fn require_validation(&self) -> Result<&ValidationResult, DomainError> {
        self.validation_result
            .as_ref()
            .ok_or(DomainError::ResultUnavailable { result: "validation" })
    }

    pub fn require_extraction(&self) -> Result<&ExtractionResult, DomainError> {
        self.extraction_result
            .as_ref()
            .ok_or(DomainError::ResultUnavailable { result: "extraction" })
    }

    pub fn stage_status(&self, stage: Stage) -> StageStatus {
        stage.status_relative_to(self.stage)
    }

    /// The one button the configuration panel offers in the current state.
    pub fn available_action(&self) -> Option<AvailableAction> {
        if self.is_busy() {
            return None;
        }
        match self.stage {
            Stage::Configure => Some(AvailableAction::StartSchemaDetection),
            Stage::Validate => Some(AvailableAction::StartValidation),
            Stage::Extract => Some(AvailableAction::StartExtraction),
            Stage::Complete => Some(AvailableAction::Reset),
            Stage::Schema => None,
        }
    }

    pub fn progress_label(&self) -> Option<String> {
        self.is_busy().then(|| progress_label(self.progress))
    }

    /// Generation of the running simulation, if any.
    pub fn active_generation(&self) -> Option<u64> {
        self.active.as_ref().map(|active| active.generation)
    }

    /// Replaces the display context. Ignored while a simulation runs.
    pub fn update_parameters(&mut self, parameters: ExtractionParameters) -> bool {
        if self.is_busy() {
            return false;
        }
        self.parameters = parameters;
        true
    }

    pub fn start_schema_detection(&mut self) -> Result<StartOutcome, DomainError> {
        self.start(SimulationKind::SchemaDetection)
    }

    pub fn start_validation(&mut self) -> Result<StartOutcome, DomainError> {
        self.start(SimulationKind::Validation)
    }

    pub fn start_extraction(&mut self) -> Result<StartOutcome, DomainError> {
        self.start(SimulationKind::Extraction)
    }

    pub fn start(&mut self, kind: SimulationKind) -> Result<StartOutcome, DomainError> {
        if let Some(active) = &self.active {
            debug!(
                event_name = "workflow.command_ignored",
                session_id = %self.session_id,
                requested = kind.as_str(),
                running = active.kind.as_str(),
                "start ignored while a simulation is running"
            );
            self.emit(
                AuditEvent::new(
                    &self.audit,
                    "workflow.command_ignored",
                    AuditCategory::Command,
                    AuditOutcome::Ignored,
                )
                .with_metadata("requested", kind.as_str())
                .with_metadata("running", active.kind.as_str()),
            );
            return Ok(StartOutcome::Ignored(IgnoreReason::Busy));
        }

        let context = FlowContext { missing_prerequisites: self.missing_prerequisites(kind) };
        let outcome = self
            .engine
            .apply_with_audit(
                self.stage,
                &requested_event(kind),
                &context,
                &self.audit_sink,
                &self.audit,
            )
            .map_err(|error| {
                warn!(
                    event_name = "workflow.transition_rejected",
                    session_id = %self.session_id,
                    stage = self.stage.as_str(),
                    requested = kind.as_str(),
                    error = %error,
                    "start rejected"
                );
                self.emit(
                    AuditEvent::new(
                        &self.audit,
                        "workflow.transition_rejected",
                        AuditCategory::Command,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("requested", kind.as_str())
                    .with_metadata("stage", self.stage.as_str()),
                );
                DomainError::from(error)
            })?;

        let profile = self.profiles.for_kind(kind);
        self.generation += 1;
        self.stage = outcome.to;
        self.progress = 0;
        self.last_failure = None;
        if outcome.actions.contains(&FlowAction::BeginProgressSimulation) {
            self.active = Some(ActiveSimulation {
                kind,
                ramp: ProgressRamp::new(profile.increment),
                generation: self.generation,
            });
        }

        info!(
            event_name = "workflow.stage_started",
            session_id = %self.session_id,
            kind = kind.as_str(),
            stage = self.stage.as_str(),
            increment = profile.increment,
            interval_ms = profile.interval_ms,
            "simulation started"
        );
        self.emit(
            AuditEvent::new(
                &self.audit,
                "workflow.stage_started",
                AuditCategory::Simulation,
                AuditOutcome::Success,
            )
            .with_metadata("kind", kind.as_str())
            .with_metadata("stage", self.stage.as_str())
            .with_metadata("generation", self.generation.to_string()),
        );

        Ok(StartOutcome::Started(SimulationTicket { kind, generation: self.generation, profile }))
    }

    /// Advances the running simulation by one increment.
    pub fn tick(&mut self) -> TickOutcome {
        let Some(generation) = self.active_generation() else {
            return TickOutcome::Idle;
        };
        self.tick_generation(generation)
    }

    /// Advances the simulation only if `generation` still identifies it.
    pub fn tick_generation(&mut self, generation: u64) -> TickOutcome {
        let Some(active) = self.active.as_mut() else {
            return TickOutcome::Stale;
        };
        if active.generation != generation {
            return TickOutcome::Stale;
        }

        let kind = active.kind;
        match active.ramp.advance() {
            RampStep::Advanced(percent) => {
                self.progress = percent;
                debug!(
                    event_name = "workflow.progress",
                    session_id = %self.session_id,
                    kind = kind.as_str(),
                    percent,
                    "simulation progressed"
                );
                TickOutcome::Progressed { kind, percent }
            }
            RampStep::Finished => {
                self.progress = active.ramp.percent();
                self.active = None;
                self.finish(kind)
            }
        }
    }

    /// Drives the running simulation to completion without waiting.
    pub fn run_to_completion(&mut self) -> TickOutcome {
        let mut last = TickOutcome::Idle;
        while self.is_busy() {
            last = self.tick();
        }
        last
    }

    pub fn reset(&mut self) -> ResetOutcome {
        let cancelled = self.active.take().map(|active| active.kind);
        let outcome = self.engine.reset_with_audit(self.stage, &self.audit_sink, &self.audit);

        self.generation += 1;
        self.stage = outcome.to;
        self.progress = 0;
        if outcome.actions.contains(&FlowAction::ClearResults) {
            self.schema_result = None;
            self.validation_result = None;
            self.extraction_result = None;
            self.last_failure = None;
        }
        let expand_configuration = outcome.actions.contains(&FlowAction::ExpandConfiguration);

        info!(
            event_name = "workflow.reset",
            session_id = %self.session_id,
            cancelled = cancelled.map(|kind| kind.as_str()).unwrap_or("none"),
            "workflow reset to configure"
        );
        self.emit(
            AuditEvent::new(
                &self.audit,
                "workflow.reset",
                AuditCategory::Command,
                AuditOutcome::Success,
            )
            .with_metadata("cancelled", cancelled.map(|kind| kind.as_str()).unwrap_or("none")),
        );

        ResetOutcome { cancelled, expand_configuration }
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            session_id: self.session_id.clone(),
            current_stage: self.stage,
            is_busy: self.is_busy(),
            progress_percent: self.progress,
            active_simulation: self.active.as_ref().map(|active| active.kind),
            available_action: self.available_action(),
            parameters: self.parameters.clone(),
            stages: Stage::ORDER
                .iter()
                .map(|stage| StageView {
                    stage: *stage,
                    label: stage.label(),
                    status: self.stage_status(*stage),
                })
                .collect(),
            schema_result: self.schema_result.clone(),
            validation_result: self.validation_result.clone(),
            extraction_result: self.extraction_result.clone(),
            last_failure: self.last_failure.clone(),
        }
    }

    fn finish(&mut self, kind: SimulationKind) -> TickOutcome {
        match self.run_stage(kind) {
            Ok(outcome) => {
                let collapse_configuration_after = outcome
                    .actions
                    .contains(&FlowAction::ScheduleConfigurationCollapse)
                    .then_some(self.collapse_delay);
                self.stage = outcome.to;

                info!(
                    event_name = "workflow.stage_completed",
                    session_id = %self.session_id,
                    kind = kind.as_str(),
                    stage = self.stage.as_str(),
                    "simulation completed"
                );
                self.emit(
                    AuditEvent::new(
                        &self.audit,
                        "workflow.stage_completed",
                        AuditCategory::Simulation,
                        AuditOutcome::Success,
                    )
                    .with_metadata("kind", kind.as_str())
                    .with_metadata("stage", self.stage.as_str()),
                );

                TickOutcome::Completed(StageCompletion {
                    kind,
                    stage: self.stage,
                    collapse_configuration_after,
                })
            }
            Err(failure) => {
                self.progress = 0;
                // A rejected failure transition is audited by the engine.
                if let Ok(outcome) = self.engine.apply_with_audit(
                    self.stage,
                    &WorkflowEvent::StageFailed,
                    &FlowContext::default(),
                    &self.audit_sink,
                    &self.audit,
                ) {
                    self.stage = outcome.to;
                    if outcome.actions.contains(&FlowAction::RecordFailure) {
                        self.last_failure = Some(failure.clone());
                    }
                }

                warn!(
                    event_name = "workflow.stage_failed",
                    session_id = %self.session_id,
                    kind = kind.as_str(),
                    stage = self.stage.as_str(),
                    error = %failure,
                    "simulation failed"
                );
                self.emit(
                    AuditEvent::new(
                        &self.audit,
                        "workflow.stage_failed",
                        AuditCategory::Simulation,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("kind", kind.as_str())
                    .with_metadata("error", failure.message.clone()),
                );

                TickOutcome::Failed(failure)
            }
        }
    }

    /// Runs the stage's capability, then applies the completion transition and
    /// stores the output as the transition directs.
    fn run_stage(&mut self, kind: SimulationKind) -> Result<TransitionOutcome, StageFailure> {
        let output = self.produce(kind)?;
        let outcome = self
            .engine
            .apply_with_audit(
                self.stage,
                &completed_event(kind),
                &FlowContext::default(),
                &self.audit_sink,
                &self.audit,
            )
            .map_err(|error| StageFailure::new(kind, error.to_string()))?;

        let actions = &outcome.actions;
        match output {
            StageOutput::Schema(schema) if actions.contains(&FlowAction::StoreSchemaResult) => {
                self.schema_result = Some(schema);
            }
            StageOutput::Validation(validation)
                if actions.contains(&FlowAction::StoreValidationResult) =>
            {
                self.validation_result = Some(validation);
            }
            StageOutput::Extraction(extraction)
                if actions.contains(&FlowAction::StoreExtractionResult) =>
            {
                self.extraction_result = Some(extraction);
            }
            _ => {}
        }

        Ok(outcome)
    }

    fn produce(&self, kind: SimulationKind) -> Result<StageOutput, StageFailure> {
        let unavailable = |error: DomainError| StageFailure::new(kind, error.to_string());
        match kind {
            SimulationKind::SchemaDetection => {
                self.runner.detect_schema(&self.parameters).map(StageOutput::Schema)
            }
            SimulationKind::Validation => {
                let schema = self.require_schema().map_err(unavailable)?;
                self.runner.validate(&self.parameters, schema).map(StageOutput::Validation)
            }
            SimulationKind::Extraction => {
                let schema = self.require_schema().map_err(unavailable)?;
                let validation = self.require_validation().map_err(unavailable)?;
                self.runner
                    .extract(&self.parameters, schema, validation)
                    .map(StageOutput::Extraction)
            }
        }
    }

    fn missing_prerequisites(&self, kind: SimulationKind) -> Vec<String> {
        let mut missing = Vec::new();
        if matches!(kind, SimulationKind::Validation | SimulationKind::Extraction)
            && self.schema_result.is_none()
        {
            missing.push("schema_result".to_string());
        }
        if kind == SimulationKind::Extraction && self.validation_result.is_none() {
            missing.push("validation_result".to_string());
        }
        missing
    }

    fn emit(&self, event: AuditEvent) {
        self.audit_sink.emit(event);
    }
}

pub fn progress_label(percent: u8) -> String {
    format!("BRAVA AI processing... {percent}%")
}

fn requested_event(kind: SimulationKind) -> WorkflowEvent {
    match kind {
        SimulationKind::SchemaDetection => WorkflowEvent::SchemaDetectionRequested,
        SimulationKind::Validation => WorkflowEvent::ValidationRequested,
        SimulationKind::Extraction => WorkflowEvent::ExtractionRequested,
    }
}

fn completed_event(kind: SimulationKind) -> WorkflowEvent {
    match kind {
        SimulationKind::SchemaDetection => WorkflowEvent::SchemaDetected,
        SimulationKind::Validation => WorkflowEvent::ValidationCompleted,
        SimulationKind::Extraction => WorkflowEvent::ExtractionCompleted,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use rust_decimal::Decimal;

    use crate::audit::InMemoryAuditSink;
    use crate::domain::parameters::{ExtractionParameters, Quarter, TickerSymbol};
    use crate::domain::results::{
        ExtractionResult, SchemaResult, ValidationResult, ValidationStatus,
    };
    use crate::domain::stage::{Stage, StageStatus};
    use crate::errors::DomainError;
    use crate::flows::FlowTransitionError;
    use crate::runner::{fixture_schema, DeterministicStageRunner, StageFailure, StageRunner};
    use crate::simulation::SimulationKind;
    use crate::workflow::controller::{
        AvailableAction, IgnoreReason, StartOutcome, TickOutcome, WorkflowController,
    };

    fn completed_controller() -> WorkflowController {
        let mut controller = WorkflowController::default();
        controller.start_schema_detection().expect("schema start");
        controller.run_to_completion();
        controller.start_validation().expect("validation start");
        controller.run_to_completion();
        controller.start_extraction().expect("extraction start");
        controller.run_to_completion();
        controller
    }

    #[test]
    fn starts_in_configure_and_idle() {
        let controller = WorkflowController::default();

        assert_eq!(controller.stage(), Stage::Configure);
        assert!(!controller.is_busy());
        assert_eq!(controller.progress_percent(), 0);
        assert_eq!(controller.available_action(), Some(AvailableAction::StartSchemaDetection));
        assert_eq!(controller.progress_label(), None);
        assert!(controller.schema_result().is_none());
    }

    #[test]
    fn stage_status_follows_current_stage_for_every_position() {
        let mut controller = WorkflowController::default();
        controller.start_schema_detection().expect("schema start");
        controller.run_to_completion();
        controller.start_validation().expect("validation start");
        controller.run_to_completion();
        assert_eq!(controller.stage(), Stage::Extract);

        for stage in Stage::ORDER {
            let expected = match stage.index().cmp(&Stage::Extract.index()) {
                std::cmp::Ordering::Less => StageStatus::Complete,
                std::cmp::Ordering::Equal => StageStatus::Active,
                std::cmp::Ordering::Greater => StageStatus::Pending,
            };
            assert_eq!(controller.stage_status(stage), expected, "status of {stage}");
        }
    }

    #[test]
    fn schema_detection_moves_through_schema_stage_to_validate() {
        let mut controller = WorkflowController::default();

        let outcome = controller.start_schema_detection().expect("schema start");
        let StartOutcome::Started(ticket) = outcome else {
            panic!("expected schema detection to start, got {outcome:?}");
        };
        assert_eq!(ticket.kind, SimulationKind::SchemaDetection);
        assert_eq!(controller.stage(), Stage::Schema);
        assert!(controller.is_busy());
        assert_eq!(controller.available_action(), None);

        assert_eq!(
            controller.tick(),
            TickOutcome::Progressed { kind: SimulationKind::SchemaDetection, percent: 10 }
        );
        assert_eq!(controller.progress_label().as_deref(), Some("BRAVA AI processing... 10%"));

        let last = controller.run_to_completion();
        assert!(matches!(last, TickOutcome::Completed(ref done) if done.stage == Stage::Validate));
        assert_eq!(controller.stage(), Stage::Validate);
        assert_eq!(controller.schema_result(), Some(&fixture_schema()));
        assert_eq!(controller.progress_percent(), 100);
        assert!(!controller.is_busy());
    }

    #[test]
    fn validation_completion_records_eight_of_nine_checks() {
        let mut controller = WorkflowController::default();
        controller.start_schema_detection().expect("schema start");
        controller.run_to_completion();

        controller.start_validation().expect("validation start");
        assert_eq!(controller.stage(), Stage::Validate);
        assert_eq!(controller.progress_percent(), 0);
        controller.run_to_completion();

        let validation = controller.validation_result().expect("validation result");
        assert_eq!(controller.stage(), Stage::Extract);
        assert_eq!(validation.checks_passed, 8);
        assert_eq!(validation.total_checks, 9);
        assert_eq!(validation.warnings.len(), 1);
        assert_eq!(validation.status, ValidationStatus::Valid);
    }

    #[test]
    fn extraction_completion_produces_five_lines_and_schedules_collapse() {
        let mut controller =
            WorkflowController::default().with_collapse_delay(Duration::from_millis(250));
        controller.start_schema_detection().expect("schema start");
        controller.run_to_completion();
        controller.start_validation().expect("validation start");
        controller.run_to_completion();
        controller.start_extraction().expect("extraction start");

        let last = controller.run_to_completion();
        let TickOutcome::Completed(completion) = last else {
            panic!("expected completion, got {last:?}");
        };
        assert_eq!(completion.collapse_configuration_after, Some(Duration::from_millis(250)));
        assert_eq!(controller.stage(), Stage::Complete);
        assert_eq!(controller.available_action(), Some(AvailableAction::Reset));

        let lines = &controller.extraction_result().expect("extraction").data.financial_data;
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0].concept, "Efectivo y equivalentes de efectivo");
        assert_eq!(lines[0].current_period, Decimal::from(341_756_400_i64));
        assert_eq!(lines[0].prior_period, Some(Decimal::from(110_446_800_i64)));
    }

    #[test]
    fn starts_while_busy_change_nothing() {
        let mut controller = WorkflowController::default();
        controller.start_schema_detection().expect("schema start");
        controller.tick();
        controller.tick();
        let before = controller.snapshot();

        let kinds = [
            SimulationKind::SchemaDetection,
            SimulationKind::Validation,
            SimulationKind::Extraction,
        ];
        for kind in kinds {
            let outcome = controller.start(kind).expect("busy start is not an error");
            assert_eq!(outcome, StartOutcome::Ignored(IgnoreReason::Busy));
        }

        assert_eq!(controller.snapshot(), before);
        assert_eq!(controller.progress_percent(), 20);
    }

    #[test]
    fn start_from_wrong_stage_is_rejected_without_state_change() {
        let sink = Arc::new(InMemoryAuditSink::default());
        let mut controller = WorkflowController::default().with_audit_sink(sink.clone());
        let before = controller.snapshot();

        let error = controller.start_extraction().expect_err("extract needs the extract stage");

        assert!(matches!(
            error,
            DomainError::FlowTransition(FlowTransitionError::InvalidTransition {
                stage: Stage::Configure,
                ..
            })
        ));
        assert_eq!(controller.snapshot(), before);
        assert!(sink.event_types().contains(&"workflow.transition_rejected".to_string()));
    }

    #[test]
    fn progress_never_exceeds_one_hundred_and_completion_fires_once() {
        let sink = Arc::new(InMemoryAuditSink::default());
        let mut controller = WorkflowController::default().with_audit_sink(sink.clone());
        controller.start_schema_detection().expect("schema start");
        controller.run_to_completion();
        controller.start_validation().expect("validation start");

        let mut completions = 0;
        for _ in 0..20 {
            match controller.tick() {
                TickOutcome::Completed(_) => completions += 1,
                TickOutcome::Progressed { percent, .. } => assert!(percent < 100),
                TickOutcome::Idle => {}
                other => panic!("unexpected tick outcome {other:?}"),
            }
            assert!(controller.progress_percent() <= 100);
        }

        assert_eq!(completions, 1);
        let completed = sink
            .event_types()
            .into_iter()
            .filter(|event_type| event_type == "workflow.stage_completed")
            .count();
        assert_eq!(completed, 2);
    }

    #[test]
    fn reset_from_complete_clears_everything() {
        let mut controller = completed_controller();

        let outcome = controller.reset();

        assert_eq!(outcome.cancelled, None);
        assert!(outcome.expand_configuration);
        assert_eq!(controller.stage(), Stage::Configure);
        assert!(controller.schema_result().is_none());
        assert!(controller.validation_result().is_none());
        assert!(controller.extraction_result().is_none());
        assert_eq!(controller.progress_percent(), 0);
        assert!(!controller.is_busy());
        assert!(matches!(
            controller.require_extraction(),
            Err(DomainError::ResultUnavailable { result: "extraction" })
        ));
    }

    #[test]
    fn reset_is_idempotent() {
        let mut controller = completed_controller();

        controller.reset();
        let once = controller.snapshot();
        controller.reset();

        assert_eq!(controller.snapshot(), once);
    }

    #[test]
    fn reset_cancels_running_simulation_and_stale_ticks_are_ignored() {
        let mut controller = WorkflowController::default();
        let StartOutcome::Started(ticket) =
            controller.start_schema_detection().expect("schema start")
        else {
            panic!("schema detection should start");
        };
        controller.tick();

        let outcome = controller.reset();
        assert_eq!(outcome.cancelled, Some(SimulationKind::SchemaDetection));
        assert_eq!(controller.tick_generation(ticket.generation), TickOutcome::Stale);
        assert_eq!(controller.tick(), TickOutcome::Idle);
        assert_eq!(controller.stage(), Stage::Configure);
        assert_eq!(controller.progress_percent(), 0);

        let StartOutcome::Started(next) =
            controller.start_schema_detection().expect("restart after reset")
        else {
            panic!("schema detection should restart");
        };
        assert!(next.generation > ticket.generation);
        assert_eq!(controller.tick_generation(ticket.generation), TickOutcome::Stale);
        assert_eq!(controller.progress_percent(), 0);
    }

    #[test]
    fn parameters_cannot_change_mid_run() {
        let mut controller = WorkflowController::default();
        let walmart = ExtractionParameters {
            ticker_symbol: TickerSymbol::Walmart,
            quarter: Quarter::new(2).expect("valid quarter"),
            year: "2024".to_string(),
        };

        controller.start_schema_detection().expect("schema start");
        assert!(!controller.update_parameters(walmart.clone()));
        controller.run_to_completion();
        assert!(controller.update_parameters(walmart.clone()));
        assert_eq!(controller.parameters(), &walmart);
    }

    #[test]
    fn snapshot_reports_stage_views_and_progress_label() {
        let mut controller = WorkflowController::default();
        controller.start_schema_detection().expect("schema start");
        controller.tick();

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.current_stage, Stage::Schema);
        assert_eq!(snapshot.active_simulation, Some(SimulationKind::SchemaDetection));
        assert_eq!(snapshot.progress_label().as_deref(), Some("BRAVA AI processing... 10%"));
        assert_eq!(snapshot.stages.len(), 5);
        assert_eq!(snapshot.stages[0].status, StageStatus::Complete);
        assert_eq!(snapshot.stages[1].status, StageStatus::Active);
        assert_eq!(snapshot.stages[1].label, "BRAVA AI Detection");
    }

    struct FailingValidationRunner;

    impl StageRunner for FailingValidationRunner {
        fn detect_schema(
            &self,
            params: &ExtractionParameters,
        ) -> Result<SchemaResult, StageFailure> {
            DeterministicStageRunner.detect_schema(params)
        }

        fn validate(
            &self,
            _params: &ExtractionParameters,
            _schema: &SchemaResult,
        ) -> Result<ValidationResult, StageFailure> {
            Err(StageFailure::new(SimulationKind::Validation, "rule engine offline"))
        }

        fn extract(
            &self,
            _params: &ExtractionParameters,
            _schema: &SchemaResult,
            _validation: &ValidationResult,
        ) -> Result<ExtractionResult, StageFailure> {
            Err(StageFailure::new(SimulationKind::Extraction, "unreachable in this test"))
        }
    }

    #[test]
    fn runner_failure_returns_to_start_stage_and_records_failure() {
        let sink = Arc::new(InMemoryAuditSink::default());
        let mut controller = WorkflowController::new(Arc::new(FailingValidationRunner))
            .with_audit_sink(sink.clone());
        controller.start_schema_detection().expect("schema start");
        controller.run_to_completion();
        controller.start_validation().expect("validation start");

        let last = controller.run_to_completion();

        assert!(matches!(
            last,
            TickOutcome::Failed(ref failure) if failure.message == "rule engine offline"
        ));
        assert_eq!(controller.stage(), Stage::Validate);
        assert!(!controller.is_busy());
        assert_eq!(controller.progress_percent(), 0);
        assert!(controller.validation_result().is_none());
        assert_eq!(controller.available_action(), Some(AvailableAction::StartValidation));
        assert!(controller.last_failure().is_some());
        assert!(sink.event_types().contains(&"workflow.stage_failed".to_string()));
        assert!(sink.events().iter().any(|event| {
            event.event_type == "flow.transition_applied"
                && event.metadata.get("event").map(String::as_str) == Some("StageFailed")
                && event.metadata.get("to").map(String::as_str) == Some("validate")
        }));
    }

    #[test]
    fn reset_after_failure_clears_failure_through_flow_transition() {
        let sink = Arc::new(InMemoryAuditSink::default());
        let mut controller = WorkflowController::new(Arc::new(FailingValidationRunner))
            .with_audit_sink(sink.clone());
        controller.start_schema_detection().expect("schema start");
        controller.run_to_completion();
        controller.start_validation().expect("validation start");
        controller.run_to_completion();
        assert!(controller.last_failure().is_some());

        let outcome = controller.reset();

        assert!(outcome.expand_configuration);
        assert_eq!(controller.stage(), Stage::Configure);
        assert!(controller.last_failure().is_none());
        assert!(controller.schema_result().is_none());
        let reset_transition = sink
            .events()
            .into_iter()
            .filter(|event| event.event_type == "flow.transition_applied")
            .last()
            .expect("reset transition audited");
        let metadata = |key: &str| reset_transition.metadata.get(key).cloned();
        assert_eq!(metadata("event").as_deref(), Some("ResetRequested"));
        assert_eq!(metadata("from").as_deref(), Some("validate"));
        assert_eq!(metadata("to").as_deref(), Some("configure"));
        assert_eq!(sink.event_types().last().map(String::as_str), Some("workflow.reset"));
    }
}
