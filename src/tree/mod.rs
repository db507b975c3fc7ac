//! Section tree model
//!
//! A document is a forest of [`SectionNode`]s. Page ranges are 1-based and
//! inclusive. Root nodes tile the whole document and children tile their
//! parent: the first child starts where the parent starts, each sibling starts
//! on the page after the previous one ends, and the last child ends with the
//! parent.

use crate::error::{Error, IndexStage, Result};
use serde::{Deserialize, Serialize};

/// One section of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionNode {
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,

    pub start_index: usize,

    pub end_index: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<SectionNode>,
}

impl SectionNode {
    pub fn new(title: impl Into<String>, start_index: usize, end_index: usize) -> Self {
        Self {
            title: title.into(),
            node_id: None,
            start_index,
            end_index,
            summary: None,
            text: None,
            nodes: Vec::new(),
        }
    }

    pub fn with_children(mut self, nodes: Vec<SectionNode>) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn page_count(&self) -> usize {
        self.end_index + 1 - self.start_index
    }

    /// Page range label, e.g. `"4-7"`
    pub fn pages_label(&self) -> String {
        format!("{}-{}", self.start_index, self.end_index)
    }

    pub fn id(&self) -> &str {
        self.node_id.as_deref().unwrap_or("")
    }
}

/// An indexed document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTree {
    #[serde(default)]
    pub doc_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_description: Option<String>,

    #[serde(default)]
    pub page_count: usize,

    #[serde(default)]
    pub structure: Vec<SectionNode>,
}

impl DocumentTree {
    pub fn new(doc_name: impl Into<String>, page_count: usize, structure: Vec<SectionNode>) -> Self {
        Self {
            doc_name: doc_name.into(),
            doc_description: None,
            page_count,
            structure,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.structure.is_empty()
    }

    /// Depth-first preorder walk
    pub fn preorder(&self) -> Vec<&SectionNode> {
        fn visit<'a>(nodes: &'a [SectionNode], out: &mut Vec<&'a SectionNode>) {
            for node in nodes {
                out.push(node);
                visit(&node.nodes, out);
            }
        }
        let mut out = Vec::new();
        visit(&self.structure, &mut out);
        out
    }

    /// Preorder walk with mutable access
    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut SectionNode)) {
        fn visit(nodes: &mut [SectionNode], f: &mut impl FnMut(&mut SectionNode)) {
            for node in nodes {
                f(node);
                visit(&mut node.nodes, f);
            }
        }
        visit(&mut self.structure, &mut f);
    }

    pub fn node_count(&self) -> usize {
        self.preorder().len()
    }

    pub fn leaves(&self) -> Vec<&SectionNode> {
        self.preorder().into_iter().filter(|n| n.is_leaf()).collect()
    }

    pub fn find(&self, node_id: &str) -> Option<&SectionNode> {
        self.preorder()
            .into_iter()
            .find(|n| n.node_id.as_deref() == Some(node_id))
    }

    /// Maximum nesting depth (roots are depth 1)
    pub fn depth(&self) -> usize {
        fn depth_of(nodes: &[SectionNode]) -> usize {
            nodes
                .iter()
                .map(|n| 1 + depth_of(&n.nodes))
                .max()
                .unwrap_or(0)
        }
        depth_of(&self.structure)
    }

    /// `(depth, title, start, end)` of every node in preorder; ignores ids and
    /// annotations
    pub fn shape(&self) -> Vec<(usize, String, usize, usize)> {
        fn visit(nodes: &[SectionNode], depth: usize, out: &mut Vec<(usize, String, usize, usize)>) {
            for node in nodes {
                out.push((depth, node.title.clone(), node.start_index, node.end_index));
                visit(&node.nodes, depth + 1, out);
            }
        }
        let mut out = Vec::new();
        visit(&self.structure, 0, &mut out);
        out
    }

    /// Check the range invariants of the whole tree
    pub fn validate(&self) -> Result<()> {
        if self.structure.is_empty() {
            return Ok(());
        }

        let mut expected = 1;
        for root in &self.structure {
            if root.start_index != expected {
                return Err(structure_error(format!(
                    "root '{}' starts at page {} but page {} is uncovered",
                    root.title, root.start_index, expected
                )));
            }
            check_node(root)?;
            expected = root.end_index + 1;
        }

        if self.page_count > 0 && expected != self.page_count + 1 {
            return Err(structure_error(format!(
                "roots end at page {} but the document has {} pages",
                expected - 1,
                self.page_count
            )));
        }

        Ok(())
    }
}

fn check_node(node: &SectionNode) -> Result<()> {
    if node.start_index == 0 || node.start_index > node.end_index {
        return Err(structure_error(format!(
            "node '{}' has invalid range {}",
            node.title,
            node.pages_label()
        )));
    }

    let mut expected = node.start_index;
    for child in &node.nodes {
        if child.start_index != expected {
            let problem = if child.start_index < expected {
                "overlaps"
            } else {
                "leaves a gap before"
            };
            return Err(structure_error(format!(
                "child '{}' ({}) {} page {} of parent '{}' ({})",
                child.title,
                child.pages_label(),
                problem,
                expected,
                node.title,
                node.pages_label()
            )));
        }
        if child.end_index > node.end_index {
            return Err(structure_error(format!(
                "child '{}' ({}) escapes parent '{}' ({})",
                child.title,
                child.pages_label(),
                node.title,
                node.pages_label()
            )));
        }
        check_node(child)?;
        expected = child.end_index + 1;
    }

    if !node.nodes.is_empty() && expected != node.end_index + 1 {
        return Err(structure_error(format!(
            "children of '{}' ({}) end at page {}",
            node.title,
            node.pages_label(),
            expected - 1
        )));
    }

    Ok(())
}

fn structure_error(message: String) -> Error {
    Error::indexing(IndexStage::Structure, message)
}
