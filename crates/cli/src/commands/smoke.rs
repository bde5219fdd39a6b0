use std::time::Instant;

use brava_core::config::{AppConfig, LoadOptions};
use brava_core::domain::stage::Stage;
use brava_core::simulation::SimulationKind;
use brava_core::workflow::{StartOutcome, TickOutcome, WorkflowController};
use serde::Serialize;

use crate::commands::{workflow_controller, CommandResult, EXIT_SMOKE};

const STAGE_CHECKS: [(&str, SimulationKind, Stage); 3] = [
    ("schema_detection", SimulationKind::SchemaDetection, Stage::Validate),
    ("validation", SimulationKind::Validation, Stage::Extract),
    ("extraction", SimulationKind::Extraction, Stage::Complete),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(LoadOptions::default())) {
        Ok((elapsed_ms, config)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Pass,
                elapsed_ms,
                message: "configuration loaded and validated".to_string(),
            });
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Fail,
                elapsed_ms,
                message: error.to_string(),
            });
            checks.extend(STAGE_CHECKS.iter().map(|&(name, _, _)| skipped(name)));
            checks.push(skipped("result_integrity"));
            checks.push(skipped("reset"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let mut controller = workflow_controller(&config);
    for (index, &(name, kind, expected)) in STAGE_CHECKS.iter().enumerate() {
        match timed_check(|| run_stage(&mut controller, kind, expected)) {
            Ok((elapsed_ms, message)) => {
                checks.push(SmokeCheck { name, status: SmokeStatus::Pass, elapsed_ms, message })
            }
            Err((elapsed_ms, message)) => {
                checks.push(SmokeCheck { name, status: SmokeStatus::Fail, elapsed_ms, message });
                checks.extend(STAGE_CHECKS[index + 1..].iter().map(|&(name, _, _)| skipped(name)));
                checks.push(skipped("result_integrity"));
                checks.push(skipped("reset"));
                return finalize_report(checks, started.elapsed().as_millis() as u64);
            }
        }
    }

    let integrity = timed_check(|| check_results(&controller));
    checks.push(to_check("result_integrity", integrity));

    let reset = timed_check(|| {
        let outcome = controller.reset();
        let snapshot = controller.snapshot();
        let cleared = snapshot.current_stage == Stage::Configure
            && snapshot.progress_percent == 0
            && snapshot.schema_result.is_none()
            && snapshot.validation_result.is_none()
            && snapshot.extraction_result.is_none();
        if cleared && outcome.expand_configuration {
            Ok("workflow returned to configure with results cleared".to_string())
        } else {
            Err("reset left residual workflow state".to_string())
        }
    });
    checks.push(to_check("reset", reset));

    finalize_report(checks, started.elapsed().as_millis() as u64)
}

fn run_stage(
    controller: &mut WorkflowController,
    kind: SimulationKind,
    expected: Stage,
) -> Result<String, String> {
    match controller.start(kind) {
        Ok(StartOutcome::Started(_)) => {}
        Ok(StartOutcome::Ignored(reason)) => {
            return Err(format!("start was ignored: {reason:?}"));
        }
        Err(error) => return Err(error.to_string()),
    }

    match controller.run_to_completion() {
        TickOutcome::Completed(completion) if completion.stage == expected => {
            Ok(format!("{} reached `{}`", kind.as_str(), completion.stage))
        }
        TickOutcome::Completed(completion) => Err(format!(
            "{} reached `{}` instead of `{expected}`",
            kind.as_str(),
            completion.stage
        )),
        TickOutcome::Failed(failure) => Err(failure.to_string()),
        other => Err(format!("{} did not complete: {other:?}", kind.as_str())),
    }
}

fn check_results(controller: &WorkflowController) -> Result<String, String> {
    let validation = controller.require_validation().map_err(|error| error.to_string())?;
    let extraction = controller.require_extraction().map_err(|error| error.to_string())?;
    let lines = extraction.data.financial_data.len();

    if validation.checks_passed > validation.total_checks {
        return Err(format!(
            "validation reported {}/{} checks",
            validation.checks_passed, validation.total_checks
        ));
    }
    if lines == 0 {
        return Err("extraction produced no financial lines".to_string());
    }
    Ok(format!("{}; {lines} financial lines extracted", validation.summary()))
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((started.elapsed().as_millis() as u64, value)),
        Err(error) => Err((started.elapsed().as_millis() as u64, error)),
    }
}

fn to_check(name: &'static str, result: Result<(u64, String), (u64, String)>) -> SmokeCheck {
    match result {
        Ok((elapsed_ms, message)) => {
            SmokeCheck { name, status: SmokeStatus::Pass, elapsed_ms, message }
        }
        Err((elapsed_ms, message)) => {
            SmokeCheck { name, status: SmokeStatus::Fail, elapsed_ms, message }
        }
    }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult {
        exit_code: if failed { EXIT_SMOKE } else { 0 },
        output: format!("{human}\n{machine}"),
    }
}
