//! Text Serialization
//!
//! A serialized tree is a header line followed by one line per node:
//!
//! ```text
//! STRATA.schema=2,model
//! name: amplifier
//! parts
//!  "a:b": 1
//!  notes: |
//!   first line
//!   second line
//! ```
//!
//! Leading spaces encode depth. The header selects the dialect used for the
//! rest of the file. Two dialects exist; writing always uses the current one.

pub mod reader;
pub mod writer;

use crate::error::{SchemaError, StorageError};
use crate::tree::Node;
use std::io::{Read, Write};
use tracing::warn;

/// Label written in front of `.schema=` in every header.
pub const LABEL: &str = "STRATA";

/// Version written by this crate.
pub const CURRENT_VERSION: u32 = 2;

/// Line syntax of a serialized tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Version 1: `key=value`, no quoting, no literal blocks.
    Legacy,
    /// Version 2: `key: value`, quoted keys, `|` literal blocks.
    Current,
}

impl Dialect {
    pub fn from_version(version: u32) -> Option<Self> {
        match version {
            1 => Some(Dialect::Legacy),
            2 => Some(Dialect::Current),
            _ => None,
        }
    }

    pub fn version(self) -> u32 {
        match self {
            Dialect::Legacy => 1,
            Dialect::Current => 2,
        }
    }
}

/// What to do with a header that cannot be trusted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HeaderPolicy {
    /// Log a warning and read with the best-guess dialect.
    #[default]
    Lenient,
    /// Reject the file.
    Strict,
}

/// Parsed header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    pub doc_type: Option<String>,
}

impl Header {
    pub fn current(doc_type: Option<&str>) -> Self {
        Header {
            version: CURRENT_VERSION,
            doc_type: doc_type.map(str::to_string),
        }
    }

    /// Whether `line` is shaped like a header at all.
    pub fn is_header_line(line: &str) -> bool {
        line.contains(".schema=")
    }

    /// Parse `<label>.schema=<version>[,<type>]`.
    pub fn parse(line: &str) -> Result<Self, SchemaError> {
        let line = line.trim();
        let (_, spec) = line
            .split_once(".schema=")
            .ok_or_else(|| SchemaError::MalformedHeader(line.to_string()))?;
        let (version, doc_type) = match spec.split_once(',') {
            Some((version, doc_type)) => (version, Some(doc_type.trim().to_string())),
            None => (spec, None),
        };
        let version = version
            .trim()
            .parse::<u32>()
            .map_err(|_| SchemaError::MalformedHeader(line.to_string()))?;
        Ok(Header {
            version,
            doc_type: doc_type.filter(|t| !t.is_empty()),
        })
    }

    pub fn to_line(&self) -> String {
        match &self.doc_type {
            Some(doc_type) => format!("{}.schema={},{}", LABEL, self.version, doc_type),
            None => format!("{}.schema={}", LABEL, self.version),
        }
    }
}

/// Reader/writer pair for the line format.
#[derive(Debug, Clone, Copy, Default)]
pub struct Schema {
    policy: HeaderPolicy,
}

impl Schema {
    pub fn new(policy: HeaderPolicy) -> Self {
        Self { policy }
    }

    pub fn strict() -> Self {
        Self::new(HeaderPolicy::Strict)
    }

    pub fn policy(&self) -> HeaderPolicy {
        self.policy
    }

    /// Decide the dialect for `text`. Returns the effective header and the
    /// number of leading lines it occupied (0 or 1).
    pub fn read_header(&self, text: &str) -> Result<(Header, usize), SchemaError> {
        let lines = split_lines(text);
        let Some(first) = lines.iter().copied().find(|l| !l.trim().is_empty()) else {
            return Ok((Header::current(None), 0));
        };
        let header_lines = lines
            .iter()
            .position(|l| !l.trim().is_empty())
            .map_or(0, |i| i + 1);

        if !Header::is_header_line(first) {
            if self.policy == HeaderPolicy::Strict {
                return Err(SchemaError::MalformedHeader(first.to_string()));
            }
            let dialect = sniff(first);
            warn!(
                line = first,
                version = dialect.version(),
                "Missing schema header, guessing dialect from content"
            );
            return Ok((
                Header {
                    version: dialect.version(),
                    doc_type: None,
                },
                0,
            ));
        }

        match Header::parse(first) {
            Ok(header) if Dialect::from_version(header.version).is_some() => {
                Ok((header, header_lines))
            }
            Ok(header) => match self.policy {
                HeaderPolicy::Strict => Err(SchemaError::UnsupportedVersion(header.version)),
                HeaderPolicy::Lenient => {
                    warn!(
                        version = header.version,
                        "Unknown schema version, reading as version {}", CURRENT_VERSION
                    );
                    Ok((
                        Header {
                            version: CURRENT_VERSION,
                            doc_type: header.doc_type,
                        },
                        header_lines,
                    ))
                }
            },
            Err(err) => match self.policy {
                HeaderPolicy::Strict => Err(err),
                HeaderPolicy::Lenient => {
                    warn!(
                        error = %err,
                        "Malformed schema header, reading as version {}", CURRENT_VERSION
                    );
                    Ok((Header::current(None), header_lines))
                }
            },
        }
    }

    /// Parse `text` into `target`. Nodes read before a parse error stay in
    /// `target`.
    pub fn read_str(&self, text: &str, target: &dyn Node) -> Result<Header, StorageError> {
        let (header, skip) = self.read_header(text)?;
        let dialect = Dialect::from_version(header.version).unwrap_or(Dialect::Current);
        let body: Vec<&str> = split_lines(text).into_iter().skip(skip).collect();
        reader::read_lines(dialect, &body, skip, target)?;
        Ok(header)
    }

    pub fn read_from<R: Read>(&self, mut input: R, target: &dyn Node) -> Result<Header, StorageError> {
        let mut text = String::new();
        input
            .read_to_string(&mut text)
            .map_err(SchemaError::from)?;
        self.read_str(&text, target)
    }

    /// Write a header and every child of `node`. The value of `node` itself
    /// is not part of the output.
    pub fn write_document<W: Write>(
        &self,
        out: &mut W,
        node: &dyn Node,
        doc_type: Option<&str>,
    ) -> std::io::Result<()> {
        writeln!(out, "{}", Header::current(doc_type).to_line())?;
        writer::write_children(out, node, 0)
    }

    /// Write `node` under its own key, followed by its subtree. No header.
    pub fn write_node<W: Write>(&self, out: &mut W, node: &dyn Node) -> std::io::Result<()> {
        writer::write_entry(out, &node.key(), node, 0)
    }

    pub fn document_to_string(&self, node: &dyn Node, doc_type: Option<&str>) -> String {
        let mut out = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_document(&mut out, node, doc_type);
        String::from_utf8_lossy(&out).into_owned()
    }
}

/// Split `text` at `\n`. A trailing `\r` is only taken as part of the line
/// ending when the first line ends with `\r\n`; otherwise it belongs to the
/// key or value on that line.
fn split_lines(text: &str) -> Vec<&str> {
    let crlf = text
        .find('\n')
        .is_some_and(|end| text[..end].ends_with('\r'));
    let mut lines: Vec<&str> = text.split('\n').collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }
    if crlf {
        for line in &mut lines {
            if let Some(stripped) = line.strip_suffix('\r') {
                *line = stripped;
            }
        }
    }
    lines
}

/// Guess the dialect from the first content line of a headerless file.
fn sniff(line: &str) -> Dialect {
    match (line.find(':'), line.find('=')) {
        (Some(colon), Some(equals)) if equals < colon => Dialect::Legacy,
        (None, Some(_)) => Dialect::Legacy,
        _ => Dialect::Current,
    }
}
