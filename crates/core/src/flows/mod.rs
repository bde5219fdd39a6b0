pub mod engine;
pub mod states;

pub use engine::{ExtractionWizardFlow, FlowDefinition, FlowEngine, FlowTransitionError};
pub use states::{FlowAction, FlowContext, FlowType, TransitionOutcome, WorkflowEvent};
