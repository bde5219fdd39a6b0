pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod runner;
pub mod simulation;
pub mod workflow;

pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink, NoopAuditSink};
pub use domain::parameters::{ExtractionParameters, ParameterError, Quarter, TickerSymbol};
pub use domain::results::{
    ExtractionResult, FinancialLine, SchemaResult, ValidationResult, ValidationStatus,
};
pub use domain::session::SessionId;
pub use domain::stage::{Stage, StageStatus};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use runner::{DeterministicStageRunner, StageFailure, StageRunner};
pub use simulation::{ProgressProfile, SimulationKind, SimulationProfiles};
pub use workflow::{
    AvailableAction, PresentationSignal, StartOutcome, TickOutcome, WorkflowController,
    WorkflowSession, WorkflowSnapshot,
};
