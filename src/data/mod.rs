mod cache;
mod diagnostics;
mod document;
mod replacement;
mod sample;
mod transcript;

pub use cache::Cache;
pub use diagnostics::{Diagnostic, Diagnostics, LogDiagnostics, RecordingDiagnostics, Severity};
pub use document::{
    CELL_TAG, Cell, Document, DocumentError, GEOMETRY_TAG, GRAPH_MODEL_TAG, Geometry, NodeId, ROOT_TAG,
};
pub use replacement::{Asset, AssetSource, CandidateImage, Placeholder, ReplacementPlanEntry};
pub use sample::{DiagramLanguage, Sample, SampleRecord};
pub use transcript::{Message, Role, Transcript};
