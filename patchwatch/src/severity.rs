use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Marker terms checked in order, most severe first.
const MARKERS: &[(&str, Severity)] = &[
    ("critical", Severity::Critical),
    ("critique", Severity::Critical),
    ("high", Severity::High),
    ("importante", Severity::High),
    ("medium", Severity::Medium),
    ("modérée", Severity::Medium),
];

impl Severity {
    /// Infer a severity from free text such as an advisory title.
    ///
    /// Case-insensitive substring match against [`MARKERS`]; the first marker
    /// found wins and text without any marker is `Low`.
    pub fn classify(text: &str) -> Self {
        let lowered = text.to_lowercase();
        MARKERS
            .iter()
            .find(|(marker, _)| lowered.contains(marker))
            .map(|(_, severity)| *severity)
            .unwrap_or(Severity::Low)
    }

    /// Map a structured upstream severity label to a level.
    ///
    /// Returns `None` for labels we don't recognise so callers can fall back
    /// to [`Severity::classify`].
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "critical" => Some(Severity::Critical),
            "high" | "important" => Some(Severity::High),
            "medium" | "moderate" => Some(Severity::Medium),
            "low" => Some(Severity::Low),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => bail!("unknown severity: {other} (valid: low, medium, high, critical)"),
        }
    }
}
