//! Maps planned substitutions onto placeholders and applies realized
//! assets to the document.

use std::collections::HashMap;

use crate::data::{Asset, Diagnostics, Document, Placeholder, ReplacementPlanEntry};

const COMPONENT: &str = "replacement";

const IMAGE_STYLE: &str = "shape=image;imageAspect=0;aspect=fixed;verticalLabelPosition=bottom;";

/// Canonical style of a cell showing an embedded image
pub fn image_style(mime_type: &str, payload: &str) -> String {
    format!("{}image=data:{},{}", IMAGE_STYLE, mime_type, payload)
}

/// Drops plan entries that name no placeholder and copies width, height
/// and label from the placeholder onto the ones that do.
pub fn filter_plan(
    plan: Vec<ReplacementPlanEntry>,
    placeholders: &[Placeholder],
    diagnostics: &dyn Diagnostics,
) -> Vec<ReplacementPlanEntry> {
    let by_id: HashMap<&str, &Placeholder> =
        placeholders.iter().map(|p| (p.id.as_str(), p)).collect();

    plan.into_iter()
        .filter_map(|mut entry| match by_id.get(entry.id.as_str()) {
            Some(placeholder) => {
                entry.width = placeholder.width.clone();
                entry.height = placeholder.height.clone();
                entry.value = Some(placeholder.value.clone());
                Some(entry)
            }
            None => {
                diagnostics.info(
                    COMPONENT,
                    &format!("Dropping plan entry '{}': no such placeholder", entry.id),
                );
                None
            }
        })
        .collect()
}

/// Turns the placeholder cell named by `asset.id` into an image.
///
/// The style is overwritten wholesale and the label cleared, so applying
/// the same asset twice leaves the same document. Returns false when no
/// cell carries the id.
pub fn apply_asset(document: &mut Document, asset: &Asset, diagnostics: &dyn Diagnostics) -> bool {
    let Some(cell) = document.cell_by_id(&asset.id) else {
        diagnostics.warn(
            COMPONENT,
            &format!("Could not find a cell with id '{}'", asset.id),
        );
        return false;
    };

    document.set_attribute(cell, "style", &image_style(&asset.mime_type, &asset.payload));
    document.set_attribute(cell, "value", "");
    true
}

/// Applies every asset to `diagram` and serializes the result.
///
/// Assets without a matching cell are skipped; an unparseable diagram is
/// returned unchanged.
pub fn apply_assets(diagram: &str, assets: &[Asset], diagnostics: &dyn Diagnostics) -> String {
    if assets.is_empty() {
        return diagram.to_string();
    }

    let mut document = match Document::parse(diagram) {
        Ok(document) => document,
        Err(e) => {
            diagnostics.warn(COMPONENT, &format!("Error parsing diagram: {}", e));
            return diagram.to_string();
        }
    };

    let applied = assets
        .iter()
        .filter(|asset| apply_asset(&mut document, asset, diagnostics))
        .count();
    diagnostics.info(
        COMPONENT,
        &format!("Applied {} of {} asset(s)", applied, assets.len()),
    );

    document.serialize()
}
