use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::replacement::ReplacementPlanEntry;

/// Markup language the diagram is generated in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramLanguage {
    Drawio,
    Mermaid,
    Tikz,
    Svg,
}

impl DiagramLanguage {
    /// Name of the language as presented to the generation service
    pub fn label(&self) -> &'static str {
        match self {
            DiagramLanguage::Drawio => "drawio mxGraph/xml",
            DiagramLanguage::Mermaid => "mermaid",
            DiagramLanguage::Tikz => "tikz/LaTeX",
            DiagramLanguage::Svg => "svg",
        }
    }

    /// Label expected after the opening fence of a code block
    pub fn format_label(&self) -> &'static str {
        match self {
            DiagramLanguage::Drawio => "xml",
            DiagramLanguage::Mermaid => "mermaid",
            DiagramLanguage::Tikz => "latex",
            DiagramLanguage::Svg => "svg",
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            DiagramLanguage::Drawio => ".drawio",
            DiagramLanguage::Mermaid => ".mmd",
            DiagramLanguage::Tikz => ".tex",
            DiagramLanguage::Svg => ".svg",
        }
    }

    /// Whether documents in this language are mxGraph trees that can be
    /// repaired and carry image placeholders
    pub fn is_mxgraph(&self) -> bool {
        matches!(self, DiagramLanguage::Drawio)
    }
}

impl fmt::Display for DiagramLanguage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            DiagramLanguage::Drawio => "drawio",
            DiagramLanguage::Mermaid => "mermaid",
            DiagramLanguage::Tikz => "tikz",
            DiagramLanguage::Svg => "svg",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for DiagramLanguage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drawio" => Ok(DiagramLanguage::Drawio),
            "mermaid" => Ok(DiagramLanguage::Mermaid),
            "tikz" => Ok(DiagramLanguage::Tikz),
            "svg" => Ok(DiagramLanguage::Svg),
            other => Err(format!(
                "Language '{}' not supported (expected drawio, mermaid, tikz or svg)",
                other
            )),
        }
    }
}

/// One figure to generate: the paper text it comes from and its caption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// File stem of the parsed paper, used to name outputs
    pub name: String,
    pub paper: String,
    pub caption: String,
}

/// Everything persisted for one processed sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub caption: String,
    pub description: String,
    pub initial_layout: String,
    pub final_layout: String,
    pub refinements: Vec<String>,
    pub verifications: Vec<String>,
    pub replacement_plan: Vec<ReplacementPlanEntry>,
    pub final_diagram: String,
    pub generated_at: String,
}
