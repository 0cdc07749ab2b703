use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// An image placeholder found in a repaired diagram
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placeholder {
    pub id: String,
    pub value: String,
    pub width: Option<String>,
    pub height: Option<String>,
}

/// Where the image for a placeholder should come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetSource {
    /// One of the images supplied with the paper
    Author,
    /// An SVG drawn by the generation service
    #[serde(rename = "svg", alias = "synthesized")]
    Synthesized,
    #[default]
    #[serde(other)]
    Unknown,
}

/// One planned substitution, as produced by the planning agent and
/// enriched with the placeholder's dimensions and label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementPlanEntry {
    #[serde(default)]
    pub source: AssetSource,
    #[serde(default)]
    pub description: String,
    #[serde(deserialize_with = "scalar_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Planner ids may come back as bare numbers since drawio ids are often digits
fn scalar_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(id) => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number id, found {}",
            other
        ))),
    }
}

/// A realized image ready to be substituted into a placeholder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub mime_type: String,
    #[serde(rename = "base64")]
    pub payload: String,
    pub source: AssetSource,
    #[serde(default)]
    pub value: String,
}

/// An author-supplied image available for author-sourced placeholders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateImage {
    pub name: String,
    pub mime_type: String,
    #[serde(rename = "base64")]
    pub payload: String,
}
