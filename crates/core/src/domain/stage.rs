use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Configure,
    Schema,
    Validate,
    Extract,
    Complete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Complete,
    Active,
    Pending,
}

impl Stage {
    pub const ORDER: [Stage; 5] =
        [Stage::Configure, Stage::Schema, Stage::Validate, Stage::Extract, Stage::Complete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configure => "configure",
            Self::Schema => "schema",
            Self::Validate => "validate",
            Self::Extract => "extract",
            Self::Complete => "complete",
        }
    }

    /// Position in the fixed workflow order.
    pub fn index(&self) -> usize {
        match self {
            Self::Configure => 0,
            Self::Schema => 1,
            Self::Validate => 2,
            Self::Extract => 3,
            Self::Complete => 4,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Configure => "Configure",
            Self::Schema => "BRAVA AI Detection",
            Self::Validate => "Smart Validation",
            Self::Extract => "BRAVA Extraction",
            Self::Complete => "Complete",
        }
    }

    /// Status of `self` as seen from the workflow's `current` stage.
    pub fn status_relative_to(&self, current: Stage) -> StageStatus {
        match self.index().cmp(&current.index()) {
            std::cmp::Ordering::Less => StageStatus::Complete,
            std::cmp::Ordering::Equal => StageStatus::Active,
            std::cmp::Ordering::Greater => StageStatus::Pending,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
