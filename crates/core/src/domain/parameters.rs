use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TickerSymbol {
    Gigante,
    Walmart,
    Soriana,
}

impl TickerSymbol {
    pub const ALL: [TickerSymbol; 3] =
        [TickerSymbol::Gigante, TickerSymbol::Walmart, TickerSymbol::Soriana];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gigante => "GIGANTE",
            Self::Walmart => "WALMART",
            Self::Soriana => "SORIANA",
        }
    }
}

impl std::fmt::Display for TickerSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TickerSymbol {
    type Err = ParameterError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GIGANTE" => Ok(Self::Gigante),
            "WALMART" => Ok(Self::Walmart),
            "SORIANA" => Ok(Self::Soriana),
            other => Err(ParameterError::UnknownTicker(other.to_string())),
        }
    }
}

/// Fiscal quarter, always in `1..=4`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Quarter(u8);

impl Quarter {
    pub fn new(value: u8) -> Result<Self, ParameterError> {
        if (1..=4).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ParameterError::QuarterOutOfRange(value))
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Quarter {
    type Error = ParameterError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quarter> for u8 {
    fn from(value: Quarter) -> Self {
        value.0
    }
}

impl std::fmt::Display for Quarter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Q{}", self.0)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParameterError {
    #[error("unknown ticker symbol `{0}` (expected GIGANTE|WALMART|SORIANA)")]
    UnknownTicker(String),
    #[error("quarter must be in range 1..=4, got {0}")]
    QuarterOutOfRange(u8),
}

/// Display context chosen on the configuration panel. Runners may ignore it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionParameters {
    pub ticker_symbol: TickerSymbol,
    pub quarter: Quarter,
    pub year: String,
}

impl Default for ExtractionParameters {
    fn default() -> Self {
        Self { ticker_symbol: TickerSymbol::Gigante, quarter: Quarter(1), year: "2025".to_string() }
    }
}

impl ExtractionParameters {
    /// Reporting period label such as `2025Q1`.
    pub fn reporting_period(&self) -> String {
        format!("{}Q{}", self.year.trim(), self.quarter.get())
    }
}

#[cfg(test)]
mod tests {
    use super::{ExtractionParameters, ParameterError, Quarter, TickerSymbol};

    #[test]
    fn defaults_match_configuration_panel() {
        let params = ExtractionParameters::default();
        assert_eq!(params.ticker_symbol, TickerSymbol::Gigante);
        assert_eq!(params.quarter.get(), 1);
        assert_eq!(params.year, "2025");
        assert_eq!(params.reporting_period(), "2025Q1");
    }

    #[test]
    fn ticker_parsing_is_case_insensitive_and_rejects_unknown() {
        assert_eq!("walmart".parse::<TickerSymbol>(), Ok(TickerSymbol::Walmart));
        assert_eq!(
            "AAPL".parse::<TickerSymbol>(),
            Err(ParameterError::UnknownTicker("AAPL".to_string()))
        );
    }

    #[test]
    fn quarter_rejects_out_of_range_values() {
        assert!(Quarter::new(4).is_ok());
        assert_eq!(Quarter::new(0), Err(ParameterError::QuarterOutOfRange(0)));
        assert_eq!(Quarter::new(5), Err(ParameterError::QuarterOutOfRange(5)));
    }

    #[test]
    fn parameters_deserialize_with_select_constraints() {
        let parsed: ExtractionParameters =
            serde_json::from_str(r#"{"ticker_symbol":"SORIANA","quarter":3,"year":"2024"}"#)
                .expect("valid parameters");
        assert_eq!(parsed.ticker_symbol, TickerSymbol::Soriana);
        assert_eq!(parsed.reporting_period(), "2024Q3");

        let invalid = serde_json::from_str::<ExtractionParameters>(
            r#"{"ticker_symbol":"GIGANTE","quarter":7,"year":"2024"}"#,
        );
        assert!(invalid.is_err());
    }
}
