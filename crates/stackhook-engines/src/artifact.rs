//! Engine artifacts and their content-addressed names.

use ring::digest::{digest, SHA256};
use serde::Serialize;
use stackhook_core::Result;
use std::collections::BTreeMap;

/// Rendered engine input: named files destined for one ConfigMap.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineArtifact {
    /// Name before the content hash is appended (the instance uid).
    pub base_name: String,
    pub namespace: String,
    pub files: BTreeMap<String, String>,
}

impl EngineArtifact {
    pub fn new(base_name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            base_name: base_name.into(),
            namespace: namespace.into(),
            files: BTreeMap::new(),
        }
    }

    pub fn with_file(mut self, key: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(key.into(), content.into());
        self
    }

    pub fn file(&self, key: &str) -> Option<&str> {
        self.files.get(key).map(String::as_str)
    }
}

#[derive(Serialize)]
struct HashInput<'a> {
    data: &'a BTreeMap<String, String>,
    kind: &'static str,
    name: &'a str,
}

/// Stable 10-character hash of a ConfigMap's name and data.
///
/// Same base name and same bytes always give the same hash; any byte
/// change gives a different one.
pub fn content_hash(base_name: &str, files: &BTreeMap<String, String>) -> Result<String> {
    let encoded = serde_json::to_vec(&HashInput {
        data: files,
        kind: "ConfigMap",
        name: base_name,
    })?;
    let sum = digest(&SHA256, &encoded);
    let hex: String = sum.as_ref().iter().map(|b| format!("{:02x}", b)).collect();
    Ok(encode_hash(&hex[..10]))
}

/// Swap characters that read ambiguously or could spell words in object names.
fn encode_hash(hex: &str) -> String {
    hex.chars()
        .map(|c| match c {
            '0' => 'g',
            '1' => 'h',
            '3' => 'k',
            'a' => 'm',
            'e' => 't',
            other => other,
        })
        .collect()
}

/// Final object name: `<base>-<hash>`.
pub fn distributed_name(base_name: &str, files: &BTreeMap<String, String>) -> Result<String> {
    Ok(format!("{}-{}", base_name, content_hash(base_name, files)?))
}
