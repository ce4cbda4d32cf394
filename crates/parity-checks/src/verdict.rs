//! Check verdicts

use parity_core::Origin;
use serde::{Deserialize, Serialize};

/// Observed value recorded when a selector matched nothing
pub(crate) const ABSENT: &str = "<absent>";

/// Outcome of one check against one rendering (or one pair)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Passed {
        detail: String,
    },
    Failed {
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        observed: Option<String>,
    },
    Skipped {
        reason: String,
    },
}

impl Outcome {
    pub fn pass(detail: impl Into<String>) -> Self {
        Self::Passed {
            detail: detail.into(),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
            expected: None,
            observed: None,
        }
    }

    /// Failure carrying the expected and observed values
    pub fn mismatch(
        reason: impl Into<String>,
        expected: impl Into<String>,
        observed: impl Into<String>,
    ) -> Self {
        Self::Failed {
            reason: reason.into(),
            expected: Some(expected.into()),
            observed: Some(observed.into()),
        }
    }

    /// Failure for a selector that matched nothing
    pub fn element_not_found(selector: &str) -> Self {
        Self::Failed {
            reason: format!("element not found: {}", selector),
            expected: None,
            observed: Some(ABSENT.to_string()),
        }
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    /// Whether this failure is due to a missing element
    pub fn is_element_absent(&self) -> bool {
        matches!(self, Self::Failed { observed: Some(o), .. } if o == ABSENT)
    }

    /// Reason or detail text
    pub fn message(&self) -> &str {
        match self {
            Self::Passed { detail } => detail,
            Self::Failed { reason, .. } => reason,
            Self::Skipped { reason } => reason,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Passed { .. } => "PASS",
            Self::Failed { .. } => "FAIL",
            Self::Skipped { .. } => "SKIP",
        }
    }
}

/// Verdict of one named check in one cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckVerdict {
    /// Check name from the catalogue
    pub check: String,
    /// Rendering judged; `None` for comparative or skipped checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
    /// Whether a failure affects the exit status
    pub hard: bool,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl CheckVerdict {
    pub fn new(check: impl Into<String>, origin: Option<Origin>, hard: bool, outcome: Outcome) -> Self {
        Self {
            check: check.into(),
            origin,
            hard,
            outcome,
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome.is_passed()
    }

    pub fn failed(&self) -> bool {
        self.outcome.is_failed()
    }

    pub fn skipped(&self) -> bool {
        self.outcome.is_skipped()
    }

    /// A failure that should fail the run
    pub fn is_hard_failure(&self) -> bool {
        self.hard && self.failed()
    }
}

impl std::fmt::Display for CheckVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.outcome.label(), self.check)?;
        if let Some(origin) = self.origin {
            write!(f, " [{}]", origin)?;
        }
        if !self.hard {
            write!(f, " (soft)")?;
        }
        write!(f, ": {}", self.outcome.message())?;
        if let Outcome::Failed {
            expected: Some(expected),
            observed: Some(observed),
            ..
        } = &self.outcome
        {
            write!(f, " (expected {}, observed {})", expected, observed)?;
        }
        Ok(())
    }
}
