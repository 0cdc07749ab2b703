use anyhow::{Context, Result, bail};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use figsmith::data::{CandidateImage, DiagramLanguage, Sample, SampleRecord};

/// Parsed papers with this stem are aggregate files, not samples
const AGGREGATE_STEM: &str = "final";
const IMAGE_EXTENSIONS: [&str; 2] = ["png", "jpg"];

#[derive(Debug, Default, Deserialize)]
struct ParsedPaper {
    #[serde(default)]
    title: Option<String>,
    #[serde(default, rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(default)]
    sections: Vec<ParsedSection>,
    #[serde(default)]
    caption: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ParsedSection {
    #[serde(default)]
    heading: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

/// Name used for outputs: everything before the first dot
fn stem_of(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    file_name.split('.').next().map(str::to_string)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Title, abstract, then every section heading and text, one per line
fn concatenate_paper_text(paper: &ParsedPaper) -> String {
    let mut text = String::new();
    if let Some(title) = non_empty(&paper.title) {
        text.push_str(&format!("Title: {}\n", title));
    }
    if let Some(abstract_text) = non_empty(&paper.abstract_text) {
        text.push_str(&format!("Abstract: {}\n", abstract_text));
    }
    for section in &paper.sections {
        if let Some(heading) = non_empty(&section.heading) {
            text.push_str(heading);
            text.push('\n');
        }
        if let Some(body) = non_empty(&section.text) {
            text.push_str(body);
            text.push('\n');
        }
    }
    text
}

/// Loads every parsed paper in `dir`, optionally keeping only `sample_id`
pub fn load_samples(dir: &Path, sample_id: Option<&str>) -> Result<Vec<Sample>> {
    if !dir.is_dir() {
        bail!("Parsed paper directory does not exist: {}", dir.display());
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .context(format!("Failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    paths.sort();

    let mut samples = Vec::new();
    for path in paths {
        let Some(name) = stem_of(&path) else {
            continue;
        };
        if name == AGGREGATE_STEM {
            continue;
        }
        if sample_id.is_some_and(|id| id != name) {
            continue;
        }

        let contents = fs::read_to_string(&path)
            .context(format!("Failed to read parsed paper {}", path.display()))?;
        let paper: ParsedPaper = serde_json::from_str(&contents)
            .context(format!("Failed to parse parsed paper {}", path.display()))?;

        let Some(caption) = non_empty(&paper.caption).map(str::to_string) else {
            bail!("Caption not found in parsed paper file {}", path.display());
        };

        samples.push(Sample {
            name,
            paper: concatenate_paper_text(&paper),
            caption,
        });
    }

    Ok(samples)
}

/// Loads the author's images from `<images_dir>/<sample_name>/`.
///
/// A missing folder means no candidates.
pub fn load_candidate_images(images_dir: &Path, sample_name: &str) -> Result<Vec<CandidateImage>> {
    let dir = images_dir.join(sample_name);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(&dir)
        .context(format!("Failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext))
        })
        .collect();
    paths.sort();

    let mut candidates = Vec::new();
    for path in paths {
        let (Some(name), Some(extension)) = (stem_of(&path), path.extension().and_then(|s| s.to_str())) else {
            continue;
        };
        let bytes = fs::read(&path).context(format!("Failed to read image {}", path.display()))?;
        candidates.push(CandidateImage {
            name,
            mime_type: format!("image/{}", extension),
            payload: BASE64.encode(bytes),
        });
    }

    Ok(candidates)
}

/// Writes `<save_dir>/<name>/<name>.json` and the raw final diagram beside it.
///
/// Returns the path of the diagram file.
pub fn write_outputs(
    save_dir: &Path,
    sample_name: &str,
    record: &SampleRecord,
    language: DiagramLanguage,
) -> Result<PathBuf> {
    let dir = save_dir.join(sample_name);
    fs::create_dir_all(&dir).context(format!("Failed to create {}", dir.display()))?;

    let mut document = BTreeMap::new();
    document.insert(sample_name, record);
    let json = serde_json::to_string_pretty(&document).context("Failed to serialize sample record")?;

    let record_path = dir.join(format!("{}.json", sample_name));
    fs::write(&record_path, json).context(format!("Failed to write {}", record_path.display()))?;

    let diagram_path = dir.join(format!("{}_final{}", sample_name, language.file_extension()));
    fs::write(&diagram_path, &record.final_diagram)
        .context(format!("Failed to write {}", diagram_path.display()))?;

    Ok(diagram_path)
}
