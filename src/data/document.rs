//! Arena-backed diagram document.
//!
//! Elements live in a flat arena and refer to their children by `NodeId`;
//! ownership is the position in the tree, never the `parent` attribute.
//! Cells with an `id` are indexed for O(1) lookup. Structural edits go
//! through methods that keep the index in step with the tree.

use std::collections::HashMap;
use std::fmt;

pub const GRAPH_MODEL_TAG: &str = "mxGraphModel";
pub const ROOT_TAG: &str = "root";
pub const CELL_TAG: &str = "mxCell";
pub const GEOMETRY_TAG: &str = "mxGeometry";

/// Index of an element inside a `Document` arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct Element {
    tag: String,
    attributes: Vec<(String, String)>,
    children: Vec<NodeId>,
    text: Option<String>,
}

/// Errors raised while reading a serialized document
#[derive(Debug)]
pub enum DocumentError {
    Parse(String),
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DocumentError::Parse(details) => write!(f, "Document is not well-formed: {}", details),
        }
    }
}

impl std::error::Error for DocumentError {}

/// Positional data of a cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    pub x: Option<String>,
    pub y: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    /// Value of the `as` attribute, `"geometry"` once repaired
    pub discriminator: Option<String>,
}

/// Read-only projection of an `mxCell` element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub id: String,
    pub parent: Option<String>,
    pub style: Option<String>,
    pub value: Option<String>,
    pub geometry: Option<Geometry>,
    pub vertex: bool,
}

#[derive(Debug, Clone)]
pub struct Document {
    elements: Vec<Element>,
    root: NodeId,
    cells_by_id: HashMap<String, NodeId>,
}

impl Document {
    /// Parses markup text into an owned tree.
    ///
    /// Whitespace-only text between elements is dropped, so
    /// `parse(serialize(doc))` reproduces the same tree.
    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        let xml = roxmltree::Document::parse(text).map_err(|e| DocumentError::Parse(e.to_string()))?;

        let mut document = Document {
            elements: Vec::new(),
            root: NodeId(0),
            cells_by_id: HashMap::new(),
        };
        document.root = document.import(xml.root_element());
        document.reindex();
        Ok(document)
    }

    fn import(&mut self, node: roxmltree::Node) -> NodeId {
        let id = NodeId(self.elements.len());
        self.elements.push(Element {
            tag: node.tag_name().name().to_string(),
            attributes: node
                .attributes()
                .map(|a| (a.name().to_string(), a.value().to_string()))
                .collect(),
            children: Vec::new(),
            text: None,
        });

        let mut text = String::new();
        for child in node.children() {
            if child.is_element() {
                let child_id = self.import(child);
                self.elements[id.0].children.push(child_id);
            } else if child.is_text() {
                text.push_str(child.text().unwrap_or_default());
            }
        }
        let text = text.trim();
        if !text.is_empty() {
            self.elements[id.0].text = Some(text.to_string());
        }

        id
    }

    /// Rebuilds the id lookup table from the attached tree.
    ///
    /// The first cell carrying a given id wins, matching document-order search.
    pub fn reindex(&mut self) {
        let mut index = HashMap::new();
        for node in self.descendants() {
            if self.tag(node) != CELL_TAG {
                continue;
            }
            if let Some(id) = self.attribute(node, "id") {
                index.entry(id.to_string()).or_insert(node);
            }
        }
        self.cells_by_id = index;
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn tag(&self, node: NodeId) -> &str {
        &self.elements[node.0].tag
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.elements[node.0]
            .attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Sets an attribute in place, or appends it when absent
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        let attributes = &mut self.elements[node.0].attributes;
        match attributes.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value.to_string(),
            None => attributes.push((name.to_string(), value.to_string())),
        }
        if name == "id" {
            self.reindex();
        }
    }

    /// Returns whether the attribute was present
    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> bool {
        let attributes = &mut self.elements[node.0].attributes;
        let before = attributes.len();
        attributes.retain(|(n, _)| n != name);
        let removed = attributes.len() != before;
        if removed && name == "id" {
            self.reindex();
        }
        removed
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.elements[node.0].children
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        self.elements[node.0].text.as_deref()
    }

    /// Allocates a detached element; attach it with `insert_child`
    pub fn create_element(&mut self, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
        let id = NodeId(self.elements.len());
        self.elements.push(Element {
            tag: tag.to_string(),
            attributes: attributes
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
            children: Vec::new(),
            text: None,
        });
        id
    }

    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        let children = &mut self.elements[parent.0].children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.reindex();
    }

    /// Keeps only the children for which `keep` returns true.
    ///
    /// Detached elements stay in the arena but are no longer reachable.
    pub fn retain_children<F>(&mut self, parent: NodeId, mut keep: F)
    where
        F: FnMut(NodeId) -> bool,
    {
        let mut children = std::mem::take(&mut self.elements[parent.0].children);
        children.retain(|child| keep(*child));
        self.elements[parent.0].children = children;
        self.reindex();
    }

    /// Every attached element in document order, root first
    pub fn descendants(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(node) = stack.pop() {
            order.push(node);
            for child in self.elements[node.0].children.iter().rev() {
                stack.push(*child);
            }
        }
        order
    }

    /// First element (root included) carrying `tag`, in document order
    pub fn find_first(&self, tag: &str) -> Option<NodeId> {
        self.descendants().into_iter().find(|n| self.tag(*n) == tag)
    }

    pub fn first_child_tagged(&self, parent: NodeId, tag: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|c| self.tag(*c) == tag)
    }

    /// All `mxCell` elements in document order
    pub fn cell_nodes(&self) -> Vec<NodeId> {
        self.descendants()
            .into_iter()
            .filter(|n| self.tag(*n) == CELL_TAG)
            .collect()
    }

    pub fn cell_by_id(&self, id: &str) -> Option<NodeId> {
        self.cells_by_id.get(id).copied()
    }

    /// The element's first `mxGeometry` child
    pub fn geometry_of(&self, node: NodeId) -> Option<NodeId> {
        self.first_child_tagged(node, GEOMETRY_TAG)
    }

    pub fn cell(&self, id: &str) -> Option<Cell> {
        self.cell_by_id(id).map(|node| self.project_cell(node))
    }

    /// Projections of every cell, in document order
    pub fn cells(&self) -> Vec<Cell> {
        self.cell_nodes()
            .into_iter()
            .map(|node| self.project_cell(node))
            .collect()
    }

    fn project_cell(&self, node: NodeId) -> Cell {
        let owned = |name: &str| self.attribute(node, name).map(str::to_string);
        Cell {
            id: owned("id").unwrap_or_default(),
            parent: owned("parent"),
            style: owned("style"),
            value: owned("value"),
            geometry: self.geometry_of(node).map(|g| self.project_geometry(g)),
            vertex: self.attribute(node, "vertex") == Some("1"),
        }
    }

    fn project_geometry(&self, node: NodeId) -> Geometry {
        let owned = |name: &str| self.attribute(node, name).map(str::to_string);
        Geometry {
            x: owned("x"),
            y: owned("y"),
            width: owned("width"),
            height: owned("height"),
            discriminator: owned("as"),
        }
    }

    /// Serializes the attached tree with two-space indentation
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        self.write_element(self.root, 0, &mut out);
        out
    }

    fn write_element(&self, node: NodeId, depth: usize, out: &mut String) {
        let element = &self.elements[node.0];
        let indent = "  ".repeat(depth);

        out.push_str(&indent);
        out.push('<');
        out.push_str(&element.tag);
        for (name, value) in &element.attributes {
            out.push_str(&format!(" {}=\"{}\"", name, escape_attribute(value)));
        }

        if element.children.is_empty() && element.text.is_none() {
            out.push_str("/>");
            if depth > 0 {
                out.push('\n');
            }
            return;
        }

        out.push('>');
        if let Some(text) = &element.text {
            out.push_str(&escape_text(text));
        }
        if !element.children.is_empty() {
            out.push('\n');
            for child in &element.children {
                self.write_element(*child, depth + 1, out);
            }
            out.push_str(&indent);
        }
        out.push_str(&format!("</{}>", element.tag));
        if depth > 0 {
            out.push('\n');
        }
    }
}

fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\n' => escaped.push_str("&#xa;"),
            '\r' => escaped.push_str("&#xd;"),
            '\t' => escaped.push_str("&#x9;"),
            // a raw backslash before `n` would read as a newline on the next repair
            '\\' => escaped.push_str("&#92;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
