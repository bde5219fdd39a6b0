use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemaResult {
    pub detected_fields: Vec<String>,
    pub confidence_score: f64,
    pub document_type: String,
}

impl SchemaResult {
    pub fn confidence_percent(&self) -> u32 {
        (self.confidence_score.clamp(0.0, 1.0) * 100.0).round() as u32
    }

    pub fn summary(&self) -> String {
        format!(
            "Identified {} financial fields with {}% confidence",
            self.detected_fields.len(),
            self.confidence_percent()
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Valid,
    Invalid,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    pub checks_passed: u32,
    pub total_checks: u32,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn summary(&self) -> String {
        format!("{}/{} quality checks passed", self.checks_passed, self.total_checks)
    }

    /// The warning surfaced on the validation card, if any.
    pub fn headline_warning(&self) -> Option<&str> {
        self.warnings.first().map(String::as_str)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractionAgentId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialLine {
    pub concept: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub current_period: Decimal,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub prior_period: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedStatement {
    pub company_name: String,
    pub statement_type: String,
    pub reporting_period: String,
    pub ticker_symbol: String,
    pub financial_data: Vec<FinancialLine>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub run_id: RunId,
    pub extraction_agent_id: ExtractionAgentId,
    pub data: ExtractedStatement,
}

impl ExtractionResult {
    /// Two-space indented JSON, as shown in the result viewer.
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
