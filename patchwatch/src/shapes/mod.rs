//! Shape adapters: per-upstream field mappings from a JSON payload to records.

use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::PatchRecord;
use crate::source::SourceDescriptor;

pub mod github;
pub mod msrc;
pub mod nvd;
pub mod osv;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiShape {
    /// GitHub security advisories REST API (global or per-repository).
    Github,
    /// NVD CVE API 2.0.
    Nvd,
    /// Microsoft Security Response Center CVRF updates.
    Msrc,
    /// OSV `/v1/query` responses.
    Osv,
}

impl ApiShape {
    /// Guess the upstream from the payload's top-level structure.
    pub fn detect(json: &Value) -> Option<Self> {
        match json {
            Value::Array(items) => {
                let looks_like_ghsa = items
                    .first()
                    .is_none_or(|item| item.get("ghsa_id").is_some());
                looks_like_ghsa.then_some(ApiShape::Github)
            }
            Value::Object(map) => {
                if map.get("vulnerabilities").is_some_and(Value::is_array) {
                    Some(ApiShape::Nvd)
                } else if map.get("value").is_some_and(Value::is_array) {
                    Some(ApiShape::Msrc)
                } else if map.get("vulns").is_some_and(Value::is_array) {
                    Some(ApiShape::Osv)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn adapt(self, json: Value, source: &SourceDescriptor) -> Result<Vec<PatchRecord>> {
        match self {
            ApiShape::Github => github::adapt(json, source),
            ApiShape::Nvd => nvd::adapt(json, source),
            ApiShape::Msrc => msrc::adapt(json, source),
            ApiShape::Osv => osv::adapt(json, source),
        }
    }
}

impl fmt::Display for ApiShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApiShape::Github => "github",
            ApiShape::Nvd => "nvd",
            ApiShape::Msrc => "msrc",
            ApiShape::Osv => "osv",
        };
        f.write_str(s)
    }
}
