use std::time::{Duration, Instant};

use anyhow::Context;
use brava_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use brava_core::domain::parameters::TickerSymbol;
use brava_core::domain::stage::Stage;
use brava_core::errors::{ApplicationError, DomainError};
use brava_core::workflow::{
    PresentationSignal, WorkflowController, WorkflowSession, WorkflowSnapshot,
};
use serde::Serialize;
use tokio::runtime::Runtime;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::commands::{
    workflow_controller, CommandResult, EXIT_CONFIG, EXIT_RUNTIME_INIT, EXIT_WORKFLOW,
};
use crate::logging::init_logging;

const COLLAPSE_GRACE: Duration = Duration::from_millis(250);

#[derive(Clone, Debug, Default)]
pub struct RunArgs {
    pub ticker: Option<String>,
    pub quarter: Option<u8>,
    pub year: Option<String>,
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct RunReport<'a> {
    command: &'static str,
    status: &'static str,
    elapsed_ms: u64,
    schema_summary: Option<String>,
    validation_summary: Option<String>,
    snapshot: &'a WorkflowSnapshot,
}

pub fn run(args: RunArgs) -> CommandResult {
    let ticker_symbol = match args.ticker.as_deref().map(str::parse::<TickerSymbol>).transpose() {
        Ok(ticker_symbol) => ticker_symbol,
        Err(error) => {
            return CommandResult::failure(
                "run",
                "invalid_parameters",
                DomainError::from(error).to_string(),
                EXIT_CONFIG,
            )
        }
    };

    let overrides = ConfigOverrides {
        ticker_symbol,
        quarter: args.quarter,
        year: args.year,
        ..ConfigOverrides::default()
    };
    let config = match AppConfig::load(LoadOptions { overrides, ..LoadOptions::default() }) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "run",
                "config_validation",
                error.to_string(),
                EXIT_CONFIG,
            )
        }
    };
    init_logging(&config.logging);

    let runtime = match build_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "run",
                "runtime_init",
                format!("{error:#}"),
                EXIT_RUNTIME_INIT,
            )
        }
    };

    let controller = workflow_controller(&config);
    runtime.block_on(execute(controller, config.collapse_delay(), args.json))
}

fn build_runtime() -> anyhow::Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to initialize async runtime")
}

async fn execute(
    controller: WorkflowController,
    collapse_delay: Duration,
    json: bool,
) -> CommandResult {
    let started = Instant::now();
    let correlation_id = controller.session_id().to_string();
    let parameters = controller.parameters().clone();
    let session = WorkflowSession::spawn(controller);
    let mut signals = session.signals();
    let printer = (!json).then(|| tokio::spawn(print_progress(session.subscribe())));

    info!(
        event_name = "cli.run.started",
        correlation_id = %correlation_id,
        ticker_symbol = %parameters.ticker_symbol,
        quarter = %parameters.quarter,
        year = %parameters.year,
        "extraction workflow run started"
    );

    let outcome = tokio::select! {
        result = drive(&session) => result.map(Some),
        Ok(()) = tokio::signal::ctrl_c() => {
            warn!(
                event_name = "cli.run.interrupted",
                correlation_id = %correlation_id,
                "interrupt received, resetting workflow"
            );
            session.reset().await.map(|_| None)
        }
    };

    let mut collapsed = false;
    if matches!(outcome, Ok(Some(_))) && !json {
        let wait = collapse_delay + COLLAPSE_GRACE;
        while let Ok(Ok(signal)) = tokio::time::timeout(wait, signals.recv()).await {
            if signal == PresentationSignal::CollapseConfiguration {
                collapsed = true;
                break;
            }
        }
    }

    session.shutdown().await;
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match outcome {
        Ok(Some(snapshot)) => {
            info!(
                event_name = "cli.run.completed",
                correlation_id = %correlation_id,
                elapsed_ms,
                "extraction workflow run completed"
            );
            if json {
                render_json(&snapshot, elapsed_ms)
            } else {
                render_human(&snapshot, collapsed)
            }
        }
        Ok(None) => CommandResult::failure(
            "run",
            "interrupted",
            "workflow was reset after an interrupt",
            EXIT_WORKFLOW,
        ),
        Err(error) => {
            let interface = error.into_interface(correlation_id);
            CommandResult::failure(
                "run",
                "workflow",
                format!("{} ({interface})", interface.user_message()),
                EXIT_WORKFLOW,
            )
        }
    }
}

/// Advances stage by stage until the workflow completes. A stage that settles
/// without moving forward has failed.
async fn drive(session: &WorkflowSession) -> Result<WorkflowSnapshot, ApplicationError> {
    let mut snapshot = session.snapshot();
    while snapshot.current_stage != Stage::Complete {
        let before = snapshot.current_stage;
        snapshot = session.advance().await?;
        if snapshot.current_stage == before {
            return Err(match snapshot.last_failure {
                Some(failure) => DomainError::StageFailed(failure).into(),
                None => ApplicationError::Session(format!("stage `{before}` did not advance")),
            });
        }
    }
    Ok(snapshot)
}

async fn print_progress(mut updates: watch::Receiver<WorkflowSnapshot>) {
    let mut last_stage = updates.borrow().current_stage;
    let mut last_percent = None;
    println!("stage: {}", last_stage.label());

    while updates.changed().await.is_ok() {
        let snapshot = updates.borrow_and_update().clone();
        if snapshot.current_stage != last_stage {
            println!("stage: {} -> {}", last_stage.label(), snapshot.current_stage.label());
            last_stage = snapshot.current_stage;
        }
        if let Some(label) = snapshot.progress_label() {
            if last_percent != Some(snapshot.progress_percent) {
                println!("{label}");
            }
        }
        last_percent = Some(snapshot.progress_percent);
    }
}

fn render_human(snapshot: &WorkflowSnapshot, collapsed: bool) -> CommandResult {
    let mut lines = Vec::new();
    if let Some(schema) = &snapshot.schema_result {
        lines.push(format!("schema: {}", schema.summary()));
    }
    if let Some(validation) = &snapshot.validation_result {
        lines.push(format!("validation: {}", validation.summary()));
        if let Some(warning) = validation.headline_warning() {
            lines.push(format!("warning: {warning}"));
        }
    }
    if collapsed {
        lines.push("configuration panel collapsed".to_string());
    }

    let Some(extraction) = &snapshot.extraction_result else {
        return CommandResult::failure(
            "run",
            "workflow",
            DomainError::ResultUnavailable { result: "extraction" }.to_string(),
            EXIT_WORKFLOW,
        );
    };
    match extraction.to_pretty_json() {
        Ok(pretty) => lines.push(pretty),
        Err(error) => {
            return CommandResult::failure("run", "serialization", error.to_string(), EXIT_WORKFLOW)
        }
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn render_json(snapshot: &WorkflowSnapshot, elapsed_ms: u64) -> CommandResult {
    let report = RunReport {
        command: "run",
        status: "ok",
        elapsed_ms,
        schema_summary: snapshot.schema_result.as_ref().map(|schema| schema.summary()),
        validation_summary: snapshot
            .validation_result
            .as_ref()
            .map(|validation| validation.summary()),
        snapshot,
    };

    match serde_json::to_string(&report) {
        Ok(output) => CommandResult { exit_code: 0, output },
        Err(error) => {
            CommandResult::failure("run", "serialization", error.to_string(), EXIT_WORKFLOW)
        }
    }
}
