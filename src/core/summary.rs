// src/core/summary.rs

use crate::{
    constants::REDACTED_VALUE,
    models::{ResolutionStatus, SubstitutionResult, TokenCategory},
};
use std::fmt;

/// One line of the substitution audit. The display value is safe to log:
/// resolved environment values are redacted, everything else shows as-is.
#[derive(Debug, Clone)]
pub struct SummaryEntry {
    pub token: String,
    pub category: TokenCategory,
    pub status: ResolutionStatus,
    pub display_value: String,
}

/// A redaction-aware report over one resolution pass. Diagnostics only; the
/// values actually used for execution live in the `SubstitutionResult`.
#[derive(Debug, Clone, Default)]
pub struct SubstitutionSummary {
    pub entries: Vec<SummaryEntry>,
}

/// Converts resolution records into a loggable summary.
pub fn summarize(result: &SubstitutionResult) -> SubstitutionSummary {
    let entries = result
        .resolutions
        .iter()
        .map(|record| {
            let display_value = match record.status {
                ResolutionStatus::Resolved if record.token.category == TokenCategory::Env => {
                    REDACTED_VALUE.to_string()
                }
                ResolutionStatus::Resolved => {
                    record.resolved_value.clone().unwrap_or_default()
                }
                // Ignored tokens pass through verbatim, so the raw text is
                // the most useful thing to show.
                _ => record.token.raw.clone(),
            };
            SummaryEntry {
                token: record.token.raw.clone(),
                category: record.token.category,
                status: record.status,
                display_value,
            }
        })
        .collect();
    SubstitutionSummary { entries }
}

impl SubstitutionSummary {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Structured form for log payloads.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.entries
                .iter()
                .map(|e| {
                    serde_json::json!({
                        "token": e.token,
                        "category": e.category.to_string(),
                        "status": match e.status {
                            ResolutionStatus::Resolved => "resolved",
                            ResolutionStatus::Ignored => "ignored",
                            ResolutionStatus::Failed => "failed",
                        },
                        "value": e.display_value,
                    })
                })
                .collect(),
        )
    }
}

impl fmt::Display for SubstitutionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(
                f,
                "{} [{}] -> {}",
                entry.token, entry.category, entry.display_value
            )?;
        }
        Ok(())
    }
}

// MARK: --- UNIT TESTS ---
