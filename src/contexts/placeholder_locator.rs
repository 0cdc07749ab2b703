use crate::data::{Diagnostics, Document, Placeholder};

const COMPONENT: &str = "placeholder_locator";

/// Style fragment that marks a cell as an image placeholder
pub const IMAGE_MARKER: &str = "shape=image";

/// Lists every styled element marked as an image that owns a geometry.
///
/// Width and height are the geometry's declared strings, untouched.
pub fn find_placeholders(document: &Document) -> Vec<Placeholder> {
    document
        .descendants()
        .into_iter()
        .filter(|node| {
            document
                .attribute(*node, "style")
                .is_some_and(|style| style.contains(IMAGE_MARKER))
        })
        .filter_map(|node| {
            let geometry = document.geometry_of(node)?;
            Some(Placeholder {
                id: document.attribute(node, "id").unwrap_or_default().to_string(),
                value: document.attribute(node, "value").unwrap_or_default().to_string(),
                width: document.attribute(geometry, "width").map(str::to_string),
                height: document.attribute(geometry, "height").map(str::to_string),
            })
        })
        .collect()
}

/// Parses `diagram` and lists its placeholders; unparseable text has none
pub fn find_placeholders_in(diagram: &str, diagnostics: &dyn Diagnostics) -> Vec<Placeholder> {
    match Document::parse(diagram) {
        Ok(document) => find_placeholders(&document),
        Err(e) => {
            diagnostics.warn(COMPONENT, &format!("Error parsing diagram: {}", e));
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RecordingDiagnostics;

    #[test]
    fn test_placeholder_with_geometry_is_found() {
        let document = Document::parse(
            r#"<root>
                <mxCell id="icon1" value="Robot" style="shape=image;html=1;" vertex="1" parent="1">
                  <mxGeometry x="0" y="0" width="40" height="40" as="geometry"/>
                </mxCell>
                <mxCell id="icon2" style="shape=image;" vertex="1" parent="1"/>
                <mxCell id="box" style="rounded=1;" vertex="1" parent="1">
                  <mxGeometry width="10" height="10" as="geometry"/>
                </mxCell>
            </root>"#,
        )
        .unwrap();

        let placeholders = find_placeholders(&document);
        assert_eq!(
            placeholders,
            vec![Placeholder {
                id: "icon1".to_string(),
                value: "Robot".to_string(),
                width: Some("40".to_string()),
                height: Some("40".to_string()),
            }]
        );
    }

    #[test]
    fn test_dimensions_are_not_reinterpreted() {
        let document = Document::parse(
            r#"<root><mxCell id="a" style="shape=image;"><mxGeometry width="40.50" height="007" as="geometry"/></mxCell></root>"#,
        )
        .unwrap();
        let placeholders = find_placeholders(&document);
        assert_eq!(placeholders[0].width.as_deref(), Some("40.50"));
        assert_eq!(placeholders[0].height.as_deref(), Some("007"));
    }

    #[test]
    fn test_unparseable_diagram_has_no_placeholders() {
        let diagnostics = RecordingDiagnostics::new();
        assert!(find_placeholders_in("graph TD; A-->B", &diagnostics).is_empty());
        assert!(diagnostics.has_warning_from(COMPONENT));
    }
}
