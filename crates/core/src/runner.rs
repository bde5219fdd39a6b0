use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::domain::parameters::ExtractionParameters;
use crate::domain::results::{
    ExtractedStatement, ExtractionAgentId, ExtractionResult, FinancialLine, RunId, SchemaResult,
    ValidationResult, ValidationStatus,
};
use crate::simulation::SimulationKind;

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize)]
#[error("{kind:?} run failed: {message}")]
pub struct StageFailure {
    pub kind: SimulationKind,
    pub message: String,
}

impl StageFailure {
    pub fn new(kind: SimulationKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

/// Produces the result object for each processing stage once its simulated
/// progress finishes.
pub trait StageRunner: Send + Sync {
    fn detect_schema(&self, params: &ExtractionParameters) -> Result<SchemaResult, StageFailure>;

    fn validate(
        &self,
        params: &ExtractionParameters,
        schema: &SchemaResult,
    ) -> Result<ValidationResult, StageFailure>;

    fn extract(
        &self,
        params: &ExtractionParameters,
        schema: &SchemaResult,
        validation: &ValidationResult,
    ) -> Result<ExtractionResult, StageFailure>;
}

/// Returns the same literal payloads on every run, regardless of input.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeterministicStageRunner;

pub const STATEMENT_TYPE: &str = "Estado de situación financiera";

impl StageRunner for DeterministicStageRunner {
    fn detect_schema(&self, _params: &ExtractionParameters) -> Result<SchemaResult, StageFailure> {
        Ok(fixture_schema())
    }

    fn validate(
        &self,
        _params: &ExtractionParameters,
        _schema: &SchemaResult,
    ) -> Result<ValidationResult, StageFailure> {
        Ok(fixture_validation())
    }

    fn extract(
        &self,
        _params: &ExtractionParameters,
        _schema: &SchemaResult,
        _validation: &ValidationResult,
    ) -> Result<ExtractionResult, StageFailure> {
        Ok(fixture_extraction())
    }
}

pub fn fixture_schema() -> SchemaResult {
    SchemaResult {
        detected_fields: [
            "company_name",
            "statement_type",
            "reporting_period",
            "ticker_symbol",
            "efectivo_y_equivalentes",
            "clientes_cuentas_cobrar",
            "impuestos_recuperar",
            "otros_activos_financieros",
            "inventarios",
        ]
        .into_iter()
        .map(str::to_string)
        .collect(),
        confidence_score: 0.94,
        document_type: STATEMENT_TYPE.to_string(),
    }
}

pub fn fixture_validation() -> ValidationResult {
    ValidationResult {
        status: ValidationStatus::Valid,
        checks_passed: 8,
        total_checks: 9,
        warnings: vec!["Missing prior period data for 'Inventarios'".to_string()],
        errors: Vec::new(),
    }
}

pub fn fixture_extraction() -> ExtractionResult {
    ExtractionResult {
        run_id: RunId("7c347d72-f68f-4ee8-8b8b-abc4d3ae5c8e".to_string()),
        extraction_agent_id: ExtractionAgentId("1c72a8a4-52fc-4f94-a94e-482cc6ee4d2".to_string()),
        data: ExtractedStatement {
            company_name: "GIGANTE".to_string(),
            statement_type: STATEMENT_TYPE.to_string(),
            reporting_period: "2025Q1".to_string(),
            ticker_symbol: "GIGANTE".to_string(),
            financial_data: vec![
                line("Efectivo y equivalentes de efectivo", 341_756_400, Some(110_446_800)),
                line("Clientes y otras cuentas por cobrar", 172_476_200, Some(178_582_400)),
                line("Impuestos por recuperar", 186_400_800, None),
                line("Otros activos financieros", 118_012_800, Some(148_118_400)),
                line("Inventarios", 631_957_000, None),
            ],
        },
    }
}

fn line(concept: &str, current_period: i64, prior_period: Option<i64>) -> FinancialLine {
    FinancialLine {
        concept: concept.to_string(),
        current_period: Decimal::from(current_period),
        prior_period: prior_period.map(Decimal::from),
    }
}
