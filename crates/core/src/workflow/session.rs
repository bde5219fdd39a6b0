//! Async driver for [`WorkflowController`].
//!
//! The controller lives inside a single tokio task. Commands arrive over an
//! mpsc channel, timer ticks over a second channel fed by the active
//! [`PeriodicTask`]. Every state change is published as a
//! [`WorkflowSnapshot`] on a watch channel; panel hints go out on a broadcast
//! channel.

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::domain::parameters::ExtractionParameters;
use crate::domain::session::SessionId;
use crate::errors::{ApplicationError, DomainError};
use crate::simulation::{DelayedTask, PeriodicTask, SimulationKind};
use crate::workflow::controller::{
    AvailableAction, ResetOutcome, StartOutcome, TickOutcome, WorkflowController,
    WorkflowSnapshot,
};

const COMMAND_BUFFER: usize = 32;
const SIGNAL_BUFFER: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentationSignal {
    CollapseConfiguration,
    ExpandConfiguration,
}

enum SessionCommand {
    Start { kind: SimulationKind, reply: oneshot::Sender<Result<StartOutcome, DomainError>> },
    Reset { reply: oneshot::Sender<ResetOutcome> },
    UpdateParameters { parameters: ExtractionParameters, reply: oneshot::Sender<bool> },
}

enum TimerMessage {
    Tick { generation: u64 },
    CollapseDue { epoch: u64 },
}

pub struct WorkflowSession {
    session_id: SessionId,
    commands: mpsc::Sender<SessionCommand>,
    state: watch::Receiver<WorkflowSnapshot>,
    signals: broadcast::Sender<PresentationSignal>,
    task: JoinHandle<()>,
}

impl WorkflowSession {
    /// Moves `controller` into a new task on the current tokio runtime.
    pub fn spawn(controller: WorkflowController) -> Self {
        let session_id = controller.session_id().clone();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(controller.snapshot());
        let (signal_tx, _) = broadcast::channel(SIGNAL_BUFFER);

        let actor = SessionActor {
            controller,
            ticks: None,
            collapse: None,
            collapse_epoch: 0,
            pending_collapse: None,
            timer_tx,
            state_tx,
            signal_tx: signal_tx.clone(),
        };
        let task = tokio::spawn(actor.run(command_rx, timer_rx));

        info!(
            event_name = "workflow.session.started",
            session_id = %session_id,
            "workflow session started"
        );

        Self { session_id, commands: command_tx, state: state_rx, signals: signal_tx, task }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkflowSnapshot> {
        self.state.clone()
    }

    pub fn signals(&self) -> broadcast::Receiver<PresentationSignal> {
        self.signals.subscribe()
    }

    pub async fn start_schema_detection(&self) -> Result<StartOutcome, ApplicationError> {
        self.start(SimulationKind::SchemaDetection).await
    }

    pub async fn start_validation(&self) -> Result<StartOutcome, ApplicationError> {
        self.start(SimulationKind::Validation).await
    }

    pub async fn start_extraction(&self) -> Result<StartOutcome, ApplicationError> {
        self.start(SimulationKind::Extraction).await
    }

    pub async fn start(&self, kind: SimulationKind) -> Result<StartOutcome, ApplicationError> {
        let (reply, response) = oneshot::channel();
        self.send(SessionCommand::Start { kind, reply }).await?;
        let outcome = response.await.map_err(|_| session_gone())?;
        Ok(outcome?)
    }

    pub async fn reset(&self) -> Result<ResetOutcome, ApplicationError> {
        let (reply, response) = oneshot::channel();
        self.send(SessionCommand::Reset { reply }).await?;
        response.await.map_err(|_| session_gone())
    }

    pub async fn update_parameters(
        &self,
        parameters: ExtractionParameters,
    ) -> Result<bool, ApplicationError> {
        let (reply, response) = oneshot::channel();
        self.send(SessionCommand::UpdateParameters { parameters, reply }).await?;
        response.await.map_err(|_| session_gone())
    }

    /// Resolves with the first published snapshot matching `predicate`,
    /// including the current one.
    pub async fn wait_until<F>(&self, predicate: F) -> Result<WorkflowSnapshot, ApplicationError>
    where
        F: FnMut(&WorkflowSnapshot) -> bool,
    {
        let mut state = self.state.clone();
        let snapshot = state.wait_for(predicate).await.map_err(|_| session_gone())?;
        Ok(WorkflowSnapshot::clone(&snapshot))
    }

    /// Performs whatever the panel currently offers and waits for the
    /// resulting simulation, if any, to settle.
    pub async fn advance(&self) -> Result<WorkflowSnapshot, ApplicationError> {
        match self.snapshot().available_action {
            Some(AvailableAction::StartSchemaDetection) => {
                self.start_schema_detection().await?;
            }
            Some(AvailableAction::StartValidation) => {
                self.start_validation().await?;
            }
            Some(AvailableAction::StartExtraction) => {
                self.start_extraction().await?;
            }
            Some(AvailableAction::Reset) => {
                self.reset().await?;
            }
            None => {}
        }
        self.wait_until(|snapshot| !snapshot.is_busy).await
    }

    pub async fn shutdown(self) {
        drop(self.commands);
        let _ = self.task.await;
        info!(
            event_name = "workflow.session.stopped",
            session_id = %self.session_id,
            "workflow session stopped"
        );
    }

    async fn send(&self, command: SessionCommand) -> Result<(), ApplicationError> {
        self.commands.send(command).await.map_err(|_| session_gone())
    }
}

fn session_gone() -> ApplicationError {
    ApplicationError::Session("workflow session is not running".to_string())
}

struct SessionActor {
    controller: WorkflowController,
    ticks: Option<PeriodicTask>,
    collapse: Option<DelayedTask>,
    collapse_epoch: u64,
    pending_collapse: Option<u64>,
    timer_tx: mpsc::UnboundedSender<TimerMessage>,
    state_tx: watch::Sender<WorkflowSnapshot>,
    signal_tx: broadcast::Sender<PresentationSignal>,
}

impl SessionActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut timers: mpsc::UnboundedReceiver<TimerMessage>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(message) = timers.recv() => self.handle_timer(message),
            }
        }

        self.ticks = None;
        self.collapse = None;
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Start { kind, reply } => {
                let result = self.controller.start(kind);
                if let Ok(StartOutcome::Started(ticket)) = &result {
                    let timer_tx = self.timer_tx.clone();
                    let generation = ticket.generation;
                    self.ticks = Some(PeriodicTask::spawn(ticket.profile.interval(), move || {
                        timer_tx.send(TimerMessage::Tick { generation }).is_ok()
                    }));
                }
                self.publish();
                let _ = reply.send(result);
            }
            SessionCommand::Reset { reply } => {
                let outcome = self.controller.reset();
                self.ticks = None;
                self.collapse = None;
                self.pending_collapse = None;
                self.publish();
                if outcome.expand_configuration {
                    self.signal(PresentationSignal::ExpandConfiguration);
                }
                let _ = reply.send(outcome);
            }
            SessionCommand::UpdateParameters { parameters, reply } => {
                let updated = self.controller.update_parameters(parameters);
                if updated {
                    self.publish();
                }
                let _ = reply.send(updated);
            }
        }
    }

    fn handle_timer(&mut self, message: TimerMessage) {
        match message {
            TimerMessage::Tick { generation } => match self.controller.tick_generation(generation) {
                TickOutcome::Progressed { .. } => self.publish(),
                TickOutcome::Completed(completion) => {
                    self.ticks = None;
                    if let Some(delay) = completion.collapse_configuration_after {
                        self.schedule_collapse(delay);
                    }
                    self.publish();
                }
                TickOutcome::Failed(_) => {
                    self.ticks = None;
                    self.publish();
                }
                TickOutcome::Stale | TickOutcome::Idle => {
                    debug!(
                        event_name = "workflow.session.stale_tick",
                        session_id = %self.controller.session_id(),
                        generation,
                        "discarded tick from a superseded simulation"
                    );
                }
            },
            TimerMessage::CollapseDue { epoch } => {
                if self.pending_collapse == Some(epoch) {
                    self.pending_collapse = None;
                    self.collapse = None;
                    self.signal(PresentationSignal::CollapseConfiguration);
                }
            }
        }
    }

    fn schedule_collapse(&mut self, delay: std::time::Duration) {
        self.collapse_epoch += 1;
        let epoch = self.collapse_epoch;
        let timer_tx = self.timer_tx.clone();
        self.pending_collapse = Some(epoch);
        self.collapse = Some(DelayedTask::spawn(delay, move || {
            let _ = timer_tx.send(TimerMessage::CollapseDue { epoch });
        }));
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.controller.snapshot());
    }

    fn signal(&self, signal: PresentationSignal) {
        debug!(
            event_name = "workflow.session.signal",
            session_id = %self.controller.session_id(),
            signal = ?signal,
            "presentation signal emitted"
        );
        let _ = self.signal_tx.send(signal);
    }
}
