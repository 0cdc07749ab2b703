//! Pulls tagged spans and fenced code blocks out of generated text.
//!
//! Neither function fails: when nothing matches, the input is handed back
//! unchanged and the miss is reported through `Diagnostics`.

use regex::Regex;

use crate::data::Diagnostics;

const COMPONENT: &str = "content_extractor";

/// Marker of a reasoning block that must not be mistaken for the payload
const REASONING_MARKER: &str = "decision";

/// Returns the trimmed content of the first `<tag>...</tag>` span.
///
/// The span may cross lines. Without a match the whole `text` is returned.
pub fn extract_tagged(text: &str, tag: &str, diagnostics: &dyn Diagnostics) -> String {
    let pattern = format!(
        r"(?s)<{tag}>(.*?)</{tag}>",
        tag = regex::escape(tag)
    );

    if let Ok(re) = Regex::new(&pattern) {
        if let Some(content) = re.captures(text).and_then(|c| c.get(1)) {
            return content.as_str().trim().to_string();
        }
    }

    diagnostics.info(COMPONENT, &format!("No content found inside <{}> tags", tag));
    text.to_string()
}

/// Returns the payload of a fenced block opened with ```` ```label ````.
///
/// Blocks are scanned from the last one backward and the first whose
/// content lacks the reasoning marker wins; if every block carries it, the
/// last block is returned. A labelled search that finds nothing is retried
/// once without a label; an unlabelled miss returns `text`.
pub fn extract_fenced(text: &str, format_label: &str, diagnostics: &dyn Diagnostics) -> String {
    let attempts: &[&str] = if format_label.is_empty() {
        &[""]
    } else {
        &[format_label, ""]
    };

    for label in attempts {
        let blocks = fenced_blocks(text, label);
        if let Some(payload) = select_payload(&blocks) {
            return payload.to_string();
        }
        diagnostics.info(
            COMPONENT,
            &format!("No content found in '{}' fenced format", label),
        );
    }

    text.to_string()
}

fn fenced_blocks<'t>(text: &'t str, label: &str) -> Vec<&'t str> {
    let pattern = format!(r"(?s)```{}(.*?)```", regex::escape(label));
    match Regex::new(&pattern) {
        Ok(re) => re
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().trim())
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn select_payload<'b>(blocks: &[&'b str]) -> Option<&'b str> {
    blocks
        .iter()
        .rev()
        .find(|block| !block.contains(REASONING_MARKER))
        .or_else(|| blocks.last())
        .copied()
}
