//! Structural repair of generated mxGraph documents.
//!
//! Repair is best-effort: any failure hands back the caller's input
//! untouched. Cycles in `parent` references are not detected here.

use regex::{Captures, Regex};
use std::fmt;
use std::sync::OnceLock;

use crate::data::{CELL_TAG, Diagnostics, Document, GEOMETRY_TAG, GRAPH_MODEL_TAG, NodeId, ROOT_TAG};

const COMPONENT: &str = "diagram_repair";

const RECOGNIZED_ENTITIES: [&str; 5] = ["amp;", "lt;", "gt;", "quot;", "apos;"];

/// Structural rules, applied in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RepairRule {
    /// Cells "0" and "1" exist, "0" has no parent and "1" hangs off "0"
    SentinelCells,
    /// Every cell other than the sentinels carries a parent
    ParentLinks,
    /// Cells own at most one bare geometry and nothing else
    FlattenChildren,
}

impl RepairRule {
    pub const ALL: [RepairRule; 3] = [
        RepairRule::SentinelCells,
        RepairRule::ParentLinks,
        RepairRule::FlattenChildren,
    ];
}

#[derive(Debug)]
pub enum RepairError {
    MissingRoot,
}

impl fmt::Display for RepairError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RepairError::MissingRoot => write!(f, "mxGraphModel has no root element"),
        }
    }
}

impl std::error::Error for RepairError {}

/// Repairs `text` with every rule enabled
pub fn repair_diagram(text: &str, diagnostics: &dyn Diagnostics) -> String {
    DiagramRepair::new(&RepairRule::ALL).repair(text, diagnostics)
}

#[derive(Debug, Clone)]
pub struct DiagramRepair {
    rules: Vec<RepairRule>,
}

impl DiagramRepair {
    pub fn new(rules: &[RepairRule]) -> Self {
        let mut rules = rules.to_vec();
        // later rules rely on the sentinels and parents being in place
        rules.sort();
        rules.dedup();
        Self { rules }
    }

    /// Escapes, parses, applies the rules and serializes.
    ///
    /// Returns `text` unchanged when parsing or any rule fails.
    pub fn repair(&self, text: &str, diagnostics: &dyn Diagnostics) -> String {
        let escaped = escape_attribute_values(text);

        let mut document = match Document::parse(&escaped) {
            Ok(document) => document,
            Err(e) => {
                diagnostics.warn(COMPONENT, &format!("Error parsing diagram: {}", e));
                return text.to_string();
            }
        };

        if let Err(e) = self.apply(&mut document, diagnostics) {
            diagnostics.warn(COMPONENT, &format!("Error fixing diagram: {}", e));
            return text.to_string();
        }

        document.serialize()
    }

    /// Applies the configured rules to an already parsed document
    pub fn apply(&self, document: &mut Document, diagnostics: &dyn Diagnostics) -> Result<(), RepairError> {
        for rule in &self.rules {
            match rule {
                RepairRule::SentinelCells => repair_sentinel_cells(document, diagnostics)?,
                RepairRule::ParentLinks => reconstruct_parent_links(document),
                RepairRule::FlattenChildren => flatten_cell_children(document),
            }
        }
        Ok(())
    }
}

fn attribute_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(\w+)="(.*?)""#).expect("valid attribute regex"))
}

/// Escapes reserved characters inside every `name="value"` occurrence.
///
/// Bare `&` becomes `&amp;` unless it already starts a named or numeric
/// entity, then `<`, `>` and literal `\n` sequences are escaped.
pub fn escape_attribute_values(text: &str) -> String {
    attribute_re()
        .replace_all(text, |caps: &Captures| {
            let value = escape_ampersands(&caps[2])
                .replace('<', "&lt;")
                .replace('>', "&gt;")
                .replace("\\n", "&#xa;");
            format!("{}=\"{}\"", &caps[1], value)
        })
        .into_owned()
}

fn escape_ampersands(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for (i, ch) in value.char_indices() {
        if ch == '&' && !starts_entity(&value[i + 1..]) {
            escaped.push_str("&amp;");
        } else {
            escaped.push(ch);
        }
    }
    escaped
}

fn starts_entity(rest: &str) -> bool {
    if RECOGNIZED_ENTITIES.iter().any(|e| rest.starts_with(e)) {
        return true;
    }

    let Some(reference) = rest.strip_prefix('#') else {
        return false;
    };
    let (digits, hex) = match reference.strip_prefix('x').or_else(|| reference.strip_prefix('X')) {
        Some(hex_digits) => (hex_digits, true),
        None => (reference, false),
    };
    let Some(end) = digits.find(';') else {
        return false;
    };
    let digits = &digits[..end];
    !digits.is_empty()
        && digits.chars().all(|c| {
            if hex {
                c.is_ascii_hexdigit()
            } else {
                c.is_ascii_digit()
            }
        })
}

fn graph_model(document: &Document) -> Option<NodeId> {
    document.find_first(GRAPH_MODEL_TAG)
}

fn position_of_cell(document: &Document, parent: NodeId, id: &str) -> Option<usize> {
    document
        .children(parent)
        .iter()
        .position(|c| document.tag(*c) == CELL_TAG && document.attribute(*c, "id") == Some(id))
}

fn repair_sentinel_cells(document: &mut Document, diagnostics: &dyn Diagnostics) -> Result<(), RepairError> {
    let Some(model) = graph_model(document) else {
        diagnostics.warn(COMPONENT, "Invalid diagram: missing mxGraphModel element");
        return Ok(());
    };
    let root = document
        .first_child_tagged(model, ROOT_TAG)
        .ok_or(RepairError::MissingRoot)?;

    let cell0_index = match position_of_cell(document, root, "0") {
        Some(index) => {
            let cell0 = document.children(root)[index];
            if document.remove_attribute(cell0, "parent") {
                diagnostics.info(COMPONENT, "Removed parent from cell 0");
            }
            index
        }
        None => {
            let cell0 = document.create_element(CELL_TAG, &[("id", "0")]);
            document.insert_child(root, 0, cell0);
            diagnostics.info(COMPONENT, "Inserted missing cell 0");
            0
        }
    };

    match position_of_cell(document, root, "1") {
        None => {
            let cell1 = document.create_element(CELL_TAG, &[("id", "1"), ("parent", "0")]);
            document.insert_child(root, cell0_index + 1, cell1);
            diagnostics.info(COMPONENT, "Inserted missing cell 1");
        }
        Some(index) => {
            let cell1 = document.children(root)[index];
            if document.attribute(cell1, "parent") != Some("0") {
                document.set_attribute(cell1, "parent", "0");
            }
        }
    }

    Ok(())
}

fn reconstruct_parent_links(document: &mut Document) {
    let mut last_explicit_parent = "1".to_string();

    for cell in document.cell_nodes() {
        let id = document.attribute(cell, "id").unwrap_or_default().to_string();
        let parent = document
            .attribute(cell, "parent")
            .filter(|p| !p.trim().is_empty())
            .map(str::to_string);

        match (id.as_str(), parent) {
            ("1", None) => document.set_attribute(cell, "parent", "0"),
            ("0", _) | ("1", _) => {}
            (_, Some(parent)) => last_explicit_parent = parent,
            (_, None) => document.set_attribute(cell, "parent", &last_explicit_parent),
        }
    }
}

fn flatten_cell_children(document: &mut Document) {
    for cell in document.cell_nodes() {
        let geometry = document.geometry_of(cell);

        document.retain_children(cell, |child| Some(child) == geometry);

        if let Some(geometry) = geometry {
            document.set_attribute(geometry, "as", "geometry");
            document.retain_children(geometry, |_| false);
        }
    }
}
