//! Configuration fingerprinting
//!
//! A fingerprint is a SHA-256 digest over the normalized source text and the
//! canonical JSON encoding of the settings. It only ever gets compared for
//! equality, and is stable across process restarts.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::pipeline::PipelineConfig;

/// Hex-encoded SHA-256 identity of a pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, for log lines
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the fingerprint of a pipeline configuration
///
/// The pipeline id is not part of the digest: two pipelines with identical
/// definitions share a fingerprint.
pub fn fingerprint(config: &PipelineConfig) -> Fingerprint {
    let source = normalize_source(&config.source_text);
    let settings = canonical_json(&config.settings);

    let mut hasher = Sha256::new();
    hasher.update((source.len() as u64).to_be_bytes());
    hasher.update(source.as_bytes());
    hasher.update((settings.len() as u64).to_be_bytes());
    hasher.update(settings.as_bytes());
    Fingerprint(hex::encode(hasher.finalize()))
}

/// JSON text of `settings` with object keys sorted at every depth
///
/// Sorted explicitly so the digest does not depend on whether serde_json's
/// `preserve_order` feature is enabled anywhere in the build.
fn canonical_json(settings: &BTreeMap<String, Value>) -> String {
    let object = settings
        .iter()
        .map(|(key, value)| (key.clone(), canonicalize(value)))
        .collect::<Map<String, Value>>();
    Value::Object(object).to_string()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.clone(), canonicalize(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Unifies line endings, strips trailing whitespace on every line and
/// surrounding blank lines
fn normalize_source(source: &str) -> String {
    source
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
