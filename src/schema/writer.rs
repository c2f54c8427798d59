//! Writer for the current dialect.

use crate::tree::Node;
use std::io::{self, Write};
use tracing::warn;

/// Whether `key` must be quoted to survive a read.
pub fn needs_quotes(key: &str) -> bool {
    key.is_empty()
        || key.contains(':')
        || key.starts_with('"')
        || key.starts_with(char::is_whitespace)
        || key.ends_with(char::is_whitespace)
}

pub fn quote_key(key: &str) -> String {
    if needs_quotes(key) {
        format!("\"{}\"", key.replace('"', "\"\""))
    } else {
        key.to_string()
    }
}

fn is_block(value: &str) -> bool {
    value.contains('\n') || value == "|"
}

pub(crate) fn write_children<W: Write>(out: &mut W, node: &dyn Node, depth: usize) -> io::Result<()> {
    for key in node.keys() {
        if let Some(child) = node.get_child(&key) {
            write_entry(out, &key, child.as_ref(), depth)?;
        }
    }
    Ok(())
}

pub(crate) fn write_entry<W: Write>(
    out: &mut W,
    key: &str,
    node: &dyn Node,
    depth: usize,
) -> io::Result<()> {
    let indent = " ".repeat(depth);
    let key = if key.contains('\n') {
        warn!(key, "Key contains a line break, writing it with spaces");
        quote_key(&key.replace('\n', " "))
    } else {
        quote_key(key)
    };

    match node.value() {
        None => writeln!(out, "{}{}", indent, key)?,
        Some(value) if value.is_empty() => writeln!(out, "{}{}:", indent, key)?,
        Some(value) if is_block(&value) => {
            if node.len() > 0 {
                warn!(
                    key = %key,
                    "Multi-line value on a node with children will not read back intact"
                );
            }
            writeln!(out, "{}{}: |", indent, key)?;
            for line in value.split('\n') {
                writeln!(out, "{} {}", indent, line)?;
            }
        }
        Some(value) => writeln!(out, "{}{}: {}", indent, key, value)?,
    }
    write_children(out, node, depth + 1)
}
