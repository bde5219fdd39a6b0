use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::stage::Stage;
use crate::flows::states::{FlowAction, FlowContext, FlowType, TransitionOutcome, WorkflowEvent};

pub trait FlowDefinition {
    fn flow_type(&self) -> FlowType;
    fn initial_stage(&self) -> Stage;
    fn transition(
        &self,
        current: Stage,
        event: &WorkflowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
    /// Reset is accepted from every stage, so it cannot fail.
    fn reset(&self, current: Stage) -> TransitionOutcome;
}

#[derive(Clone, Debug, Default)]
pub struct ExtractionWizardFlow;

impl FlowDefinition for ExtractionWizardFlow {
    fn flow_type(&self) -> FlowType {
        FlowType::FinancialStatementExtraction
    }

    fn initial_stage(&self) -> Stage {
        Stage::Configure
    }

    fn transition(
        &self,
        current: Stage,
        event: &WorkflowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_extraction_wizard(current, event, context)
    }

    fn reset(&self, current: Stage) -> TransitionOutcome {
        reset_extraction_wizard(current)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow.flow_type()
    }

    pub fn initial_stage(&self) -> Stage {
        self.flow.initial_stage()
    }

    pub fn apply(
        &self,
        current: Stage,
        event: &WorkflowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: Stage,
        event: &WorkflowEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => emit_applied(sink, audit, outcome),
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }

    pub fn reset_with_audit<S>(
        &self,
        current: Stage,
        sink: &S,
        audit: &AuditContext,
    ) -> TransitionOutcome
    where
        S: AuditSink,
    {
        let outcome = self.flow.reset(current);
        emit_applied(sink, audit, &outcome);
        outcome
    }
}

fn emit_applied<S>(sink: &S, audit: &AuditContext, outcome: &TransitionOutcome)
where
    S: AuditSink,
{
    sink.emit(
        AuditEvent::new(
            audit,
            "flow.transition_applied",
            AuditCategory::Flow,
            AuditOutcome::Success,
        )
        .with_metadata("from", outcome.from.as_str())
        .with_metadata("to", outcome.to.as_str())
        .with_metadata("event", format!("{:?}", outcome.event)),
    );
}

impl Default for FlowEngine<ExtractionWizardFlow> {
    fn default() -> Self {
        Self::new(ExtractionWizardFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("missing prerequisites before transition from {stage}: {missing:?}")]
    MissingPrerequisites { stage: Stage, missing: Vec<String> },
    #[error("invalid transition from {stage} using event {event:?}")]
    InvalidTransition { stage: Stage, event: WorkflowEvent },
}

fn transition_extraction_wizard(
    current: Stage,
    event: &WorkflowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowAction::{
        BeginProgressSimulation, RecordFailure, ScheduleConfigurationCollapse,
        StoreExtractionResult, StoreSchemaResult, StoreValidationResult,
    };
    use Stage::{Complete, Configure, Extract, Schema, Validate};
    use WorkflowEvent::{
        ExtractionCompleted, ExtractionRequested, ResetRequested, SchemaDetected,
        SchemaDetectionRequested, StageFailed, ValidationCompleted, ValidationRequested,
    };

    let (to, actions) = match (current, event) {
        (Configure, SchemaDetectionRequested) => (Schema, vec![BeginProgressSimulation]),
        (Schema, SchemaDetected) => (Validate, vec![StoreSchemaResult]),
        (Validate, ValidationRequested) | (Extract, ExtractionRequested) => {
            if !context.missing_prerequisites.is_empty() {
                return Err(FlowTransitionError::MissingPrerequisites {
                    stage: current,
                    missing: context.missing_prerequisites.clone(),
                });
            }
            (current, vec![BeginProgressSimulation])
        }
        (Validate, ValidationCompleted) => (Extract, vec![StoreValidationResult]),
        (Extract, ExtractionCompleted) => {
            (Complete, vec![StoreExtractionResult, ScheduleConfigurationCollapse])
        }
        // Schema detection runs in its own stage; a failure drops back to configure.
        (Schema, StageFailed) => (Configure, vec![RecordFailure]),
        (Validate, StageFailed) | (Extract, StageFailed) => (current, vec![RecordFailure]),
        (_, ResetRequested) => return Ok(reset_extraction_wizard(current)),
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                stage: current,
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: current, to, event: event.clone(), actions })
}

fn reset_extraction_wizard(current: Stage) -> TransitionOutcome {
    TransitionOutcome {
        from: current,
        to: Stage::Configure,
        event: WorkflowEvent::ResetRequested,
        actions: vec![FlowAction::ClearResults, FlowAction::ExpandConfiguration],
    }
}
