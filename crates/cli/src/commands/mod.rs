pub mod config;
pub mod run;
pub mod smoke;

use std::sync::Arc;

use brava_core::config::AppConfig;
use brava_core::runner::DeterministicStageRunner;
use brava_core::workflow::WorkflowController;
use serde::Serialize;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME_INIT: u8 = 3;
pub const EXIT_WORKFLOW: u8 = 4;
pub const EXIT_SMOKE: u8 = 6;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Controller wired with the configured profiles, collapse delay and panel
/// defaults.
pub fn workflow_controller(config: &AppConfig) -> WorkflowController {
    WorkflowController::new(Arc::new(DeterministicStageRunner))
        .with_profiles(config.simulation_profiles())
        .with_collapse_delay(config.collapse_delay())
        .with_parameters(config.default_parameters())
}
