pub mod controller;
pub mod session;

pub use controller::{
    progress_label, AvailableAction, IgnoreReason, ResetOutcome, SimulationTicket,
    StageCompletion, StageView, StartOutcome, TickOutcome, WorkflowController, WorkflowSnapshot,
    DEFAULT_COLLAPSE_DELAY,
};
pub use session::{PresentationSignal, WorkflowSession};
