//! Text rendering for command output.

use crate::tree::Node;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde::Serialize;

/// One row of an `ls` listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingRow {
    pub key: String,
    pub value: Option<String>,
    pub children: usize,
    /// Container supplying the entry, for overlay listings.
    pub source: Option<String>,
}

/// One line of a diff between two trees.
#[derive(Debug, Clone, PartialEq)]
pub enum DiffLine {
    Added { path: String, value: String },
    Removed { path: String, value: String },
    Changed { path: String, old: String, new: String },
}

impl DiffLine {
    pub fn path(&self) -> &str {
        match self {
            DiffLine::Added { path, .. }
            | DiffLine::Removed { path, .. }
            | DiffLine::Changed { path, .. } => path,
        }
    }
}

/// Serializable snapshot of a subtree, children in collation order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeExport {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeExport>,
}

impl NodeExport {
    pub fn from_node(node: &dyn Node) -> Self {
        let children = node
            .keys()
            .iter()
            .filter_map(|key| node.get_child(key))
            .map(|child| NodeExport::from_node(child.as_ref()))
            .collect();
        Self {
            key: node.key(),
            value: node.value(),
            children,
        }
    }
}

/// Format a section heading with bold/underline.
pub fn format_section_heading(title: &str, color: bool) -> String {
    if color {
        format!("{}", title.bold().underline())
    } else {
        title.to_string()
    }
}

/// Table of child entries. The source column appears when any row has one.
pub fn format_listing(title: &str, rows: &[ListingRow], color: bool) -> String {
    let mut out = format!("{}\n\n", format_section_heading(title, color));
    if rows.is_empty() {
        out.push_str("No entries.\n");
        return out;
    }
    let with_source = rows.iter().any(|row| row.source.is_some());
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    let mut header = vec!["Key", "Value", "Children"];
    if with_source {
        header.push("Source");
    }
    table.set_header(header);
    for row in rows {
        let mut cells = vec![
            row.key.clone(),
            row.value.clone().unwrap_or_else(|| "-".to_string()),
            row.children.to_string(),
        ];
        if with_source {
            cells.push(row.source.clone().unwrap_or_default());
        }
        table.add_row(cells);
    }
    out.push_str(&format!("{}\n", table));
    out.push_str(&format!("Total: {} entries.\n", rows.len()));
    out
}

pub fn format_diff(lines: &[DiffLine], color: bool) -> String {
    if lines.is_empty() {
        return "No differences.\n".to_string();
    }
    let mut out = String::new();
    for line in lines {
        let text = match line {
            DiffLine::Added { path, value } => {
                let text = format!("+ {} = {}", path, value);
                if color {
                    text.green().to_string()
                } else {
                    text
                }
            }
            DiffLine::Removed { path, value } => {
                let text = format!("- {} = {}", path, value);
                if color {
                    text.red().to_string()
                } else {
                    text
                }
            }
            DiffLine::Changed { path, old, new } => {
                let text = format!("~ {}: {} -> {}", path, old, new);
                if color {
                    text.yellow().to_string()
                } else {
                    text
                }
            }
        };
        out.push_str(&text);
        out.push('\n');
    }
    out
}
