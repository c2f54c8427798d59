//! Line readers for both dialects.

use crate::error::{SchemaError, StorageError};
use crate::schema::Dialect;
use crate::tree::{Node, NodeRef};

/// One parsed line: key plus optional value. `block` is set when the value
/// is a literal block whose content follows on deeper lines.
#[derive(Debug, PartialEq, Eq)]
struct Entry {
    key: String,
    value: Option<String>,
    block: bool,
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Read body `lines` into `target`. `first_line` is the 0-based position of
/// `lines[0]` in the file, for error messages.
pub(crate) fn read_lines(
    dialect: Dialect,
    lines: &[&str],
    first_line: usize,
    target: &dyn Node,
) -> Result<(), StorageError> {
    let mut stack: Vec<(usize, NodeRef)> = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let line_no = first_line + i + 1;
        i += 1;
        if is_blank(line) {
            continue;
        }
        let indent = indent_of(line);
        let entry = match dialect {
            Dialect::Current => parse_current(&line[indent..], line_no)?,
            Dialect::Legacy => parse_legacy(&line[indent..]),
        };

        while stack.last().is_some_and(|(depth, _)| *depth >= indent) {
            stack.pop();
        }
        let node = match stack.last() {
            Some((_, parent)) => parent.create_child(&entry.key)?,
            None => target.create_child(&entry.key)?,
        };

        let value = if entry.block {
            let (text, consumed) = read_block(&lines[i..], indent + 1);
            i += consumed;
            Some(text)
        } else {
            entry.value
        };
        if value.is_some() {
            node.set_value(value.as_deref())?;
        }
        stack.push((indent, node));
    }
    Ok(())
}

/// Collect literal block lines indented at least `depth`. Blank lines whose
/// indentation was stripped belong to the block when a later line does.
fn read_block(lines: &[&str], depth: usize) -> (String, usize) {
    let mut content: Vec<&str> = Vec::new();
    let mut consumed = 0;
    while consumed < lines.len() {
        let line = lines[consumed];
        if indent_of(line) >= depth {
            content.push(&line[depth..]);
            consumed += 1;
            continue;
        }
        if !is_blank(line) {
            break;
        }
        let continues = lines[consumed..]
            .iter()
            .find(|l| !is_blank(l))
            .is_some_and(|l| indent_of(l) >= depth);
        if !continues {
            break;
        }
        content.push("");
        consumed += 1;
    }
    (content.join("\n"), consumed)
}

fn parse_current(text: &str, line_no: usize) -> Result<Entry, SchemaError> {
    let (key, rest) = if let Some(quoted) = text.strip_prefix('"') {
        split_quoted(quoted).ok_or_else(|| SchemaError::Parse {
            line: line_no,
            message: "unterminated quoted key".to_string(),
        })?
    } else {
        match text.find(':') {
            Some(pos) => (text[..pos].to_string(), &text[pos..]),
            None => (text.to_string(), ""),
        }
    };

    if rest.is_empty() {
        return Ok(Entry {
            key,
            value: None,
            block: false,
        });
    }
    let Some(value) = rest.strip_prefix(':') else {
        return Err(SchemaError::Parse {
            line: line_no,
            message: format!("expected ':' after key {:?}", key),
        });
    };
    let value = value.strip_prefix(' ').unwrap_or(value);
    Ok(Entry {
        key,
        block: value == "|",
        value: Some(value.to_string()),
    })
}

/// Split a quoted key (opening quote already removed) from the remainder of
/// the line. `""` inside the key stands for one quote.
fn split_quoted(text: &str) -> Option<(String, &str)> {
    let mut key = String::new();
    let mut chars = text.char_indices().peekable();
    while let Some((pos, c)) = chars.next() {
        if c != '"' {
            key.push(c);
            continue;
        }
        if let Some((_, '"')) = chars.peek() {
            key.push('"');
            chars.next();
            continue;
        }
        return Some((key, &text[pos + 1..]));
    }
    None
}

fn parse_legacy(text: &str) -> Entry {
    match text.split_once('=') {
        Some((key, value)) => Entry {
            key: key.to_string(),
            value: Some(value.to_string()),
            block: false,
        },
        None => Entry {
            key: text.to_string(),
            value: None,
            block: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{NodeExt, VolatileNode};

    fn read(dialect: Dialect, text: &str) -> std::sync::Arc<VolatileNode> {
        let root = VolatileNode::new();
        let lines: Vec<&str> = text.lines().collect();
        read_lines(dialect, &lines, 0, root.as_ref()).unwrap();
        root
    }

    #[test]
    fn test_parse_current_entries() {
        assert_eq!(
            parse_current("key: value", 1).unwrap(),
            Entry {
                key: "key".into(),
                value: Some("value".into()),
                block: false
            }
        );
        assert_eq!(parse_current("key:", 1).unwrap().value, Some(String::new()));
        assert_eq!(parse_current("key", 1).unwrap().value, None);
        assert_eq!(parse_current("k:  two", 1).unwrap().value, Some(" two".into()));
        assert!(parse_current("k: |", 1).unwrap().block);
    }

    #[test]
    fn test_quoted_keys() {
        let entry = parse_current("\"a:\"\"b\"\"\": 1", 1).unwrap();
        assert_eq!(entry.key, "a:\"b\"");
        assert_eq!(entry.value, Some("1".into()));
        assert_eq!(parse_current("\"\"", 1).unwrap().key, "");
        assert!(parse_current("\"open", 4).is_err());
        assert!(parse_current("\"k\"x", 4).is_err());
    }

    #[test]
    fn test_nesting_by_indentation() {
        let root = read(
            Dialect::Current,
            "a: 1\n b: 2\n  c: 3\n d: 4\ne\n f: 5\n",
        );
        assert_eq!(root.get(&["a", "b", "c"]), Some("3".into()));
        assert_eq!(root.get(&["a", "d"]), Some("4".into()));
        assert_eq!(root.get(&["e"]), None);
        assert_eq!(root.get(&["e", "f"]), Some("5".into()));
    }

    #[test]
    fn test_block_with_stripped_blank_line() {
        let root = read(Dialect::Current, "k: |\n one\n\n three\nnext: x\n");
        assert_eq!(root.get(&["k"]), Some("one\n\nthree".into()));
        assert_eq!(root.get(&["next"]), Some("x".into()));

        let root = read(Dialect::Current, "k: |\n  deeper\n\ntail: y\n");
        assert_eq!(root.get(&["k"]), Some(" deeper".into()));
        assert_eq!(root.get(&["tail"]), Some("y".into()));
    }

    #[test]
    fn test_legacy_dialect() {
        let root = read(Dialect::Legacy, "a=b: c\n x\n  y=\n");
        assert_eq!(root.get(&["a"]), Some("b: c".into()));
        assert_eq!(root.get(&["a", "x"]), None);
        assert_eq!(root.get(&["a", "x", "y"]), Some(String::new()));
    }
}
