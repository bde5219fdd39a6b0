use serde::{Deserialize, Serialize};

use crate::domain::stage::Stage;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowType {
    FinancialStatementExtraction,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowEvent {
    SchemaDetectionRequested,
    SchemaDetected,
    ValidationRequested,
    ValidationCompleted,
    ExtractionRequested,
    ExtractionCompleted,
    StageFailed,
    ResetRequested,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    pub missing_prerequisites: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    BeginProgressSimulation,
    StoreSchemaResult,
    StoreValidationResult,
    StoreExtractionResult,
    ScheduleConfigurationCollapse,
    ClearResults,
    ExpandConfiguration,
    RecordFailure,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: Stage,
    pub to: Stage,
    pub event: WorkflowEvent,
    pub actions: Vec<FlowAction>,
}
