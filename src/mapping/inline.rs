//! Inline mapping programs loaded from `file://` URLs.
//!
//! An inline mapping is not executable code: it is a small declarative
//! transform language, one directive per line (`#` starts a comment):
//!
//! ```text
//! rename src_ip source_address
//! set environment lab
//! copy _id correlation_id
//! drop _ms
//! keep _id,_ts,source_address
//! drop-every 2
//! ```
//!
//! Directives apply in declared order. `set` values are parsed as JSON
//! when possible and fall back to plain strings. `drop-every <n>` drops
//! every n-th record the program sees, which makes the whole chain report
//! the record as dropped.

use std::fs;

use super::Mapping;
use crate::error::{Error, Result};
use crate::record::{Record, Value};

#[derive(Debug, Clone, PartialEq)]
enum Op {
    Rename { from: String, to: String },
    Set { field: String, value: Value },
    Copy { from: String, to: String },
    Drop { field: String },
    Keep { fields: Vec<String> },
    DropEvery { n: u64 },
}

/// A compiled inline transform program.
#[derive(Debug)]
pub struct InlineMapping {
    name: String,
    ops: Vec<Op>,
    seen: u64,
}

impl InlineMapping {
    /// Compile a program from source. `name` is used in diagnostics.
    pub fn parse(name: impl Into<String>, source: &str) -> Result<Self> {
        let name = name.into();
        let mut ops = Vec::new();

        for (line_no, raw_line) in source.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            ops.push(parse_directive(&name, line_no + 1, line)?);
        }

        if ops.is_empty() {
            return Err(Error::InlineMapping {
                url: name,
                reason: "program contains no directives".to_string(),
            });
        }

        Ok(Self {
            name,
            ops,
            seen: 0,
        })
    }
}

fn parse_directive(name: &str, line_no: usize, line: &str) -> Result<Op> {
    let bad = |reason: String| Error::InlineMapping {
        url: name.to_string(),
        reason: format!("line {line_no}: {reason}"),
    };

    let mut parts = line.splitn(2, char::is_whitespace);
    let directive = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or("").trim();

    match directive {
        "rename" | "copy" => {
            let mut fields = rest.split_whitespace();
            let (Some(from), Some(to), None) = (fields.next(), fields.next(), fields.next())
            else {
                return Err(bad(format!("{directive} takes exactly two field names")));
            };
            let (from, to) = (from.to_string(), to.to_string());
            Ok(if directive == "rename" {
                Op::Rename { from, to }
            } else {
                Op::Copy { from, to }
            })
        }
        "set" => {
            let mut fields = rest.splitn(2, char::is_whitespace);
            let (Some(field), Some(raw_value)) = (fields.next(), fields.next()) else {
                return Err(bad("set takes a field name and a value".to_string()));
            };
            let value = serde_json::from_str(raw_value)
                .unwrap_or_else(|_| Value::String(raw_value.trim().to_string()));
            Ok(Op::Set {
                field: field.to_string(),
                value,
            })
        }
        "drop" => {
            if rest.is_empty() || rest.contains(char::is_whitespace) {
                return Err(bad("drop takes exactly one field name".to_string()));
            }
            Ok(Op::Drop {
                field: rest.to_string(),
            })
        }
        "keep" => {
            let fields: Vec<String> = rest
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect();
            if fields.is_empty() {
                return Err(bad("keep takes a comma-separated field list".to_string()));
            }
            Ok(Op::Keep { fields })
        }
        "drop-every" => {
            let n: u64 = rest
                .parse()
                .map_err(|_| bad("drop-every takes a positive integer".to_string()))?;
            if n == 0 {
                return Err(bad("drop-every takes a positive integer".to_string()));
            }
            Ok(Op::DropEvery { n })
        }
        other => Err(bad(format!("unknown directive {other:?}"))),
    }
}

impl Mapping for InlineMapping {
    fn map(&mut self, mut record: Record) -> Result<Option<Record>> {
        self.seen += 1;

        for op in &self.ops {
            match op {
                Op::Rename { from, to } => {
                    if let Some(value) = record.remove(from) {
                        record.insert(to.clone(), value);
                    }
                }
                Op::Set { field, value } => {
                    record.insert(field.clone(), value.clone());
                }
                Op::Copy { from, to } => {
                    if let Some(value) = record.get(from).cloned() {
                        record.insert(to.clone(), value);
                    }
                }
                Op::Drop { field } => {
                    record.remove(field);
                }
                Op::Keep { fields } => {
                    record = fields
                        .iter()
                        .filter_map(|f| record.get(f).map(|v| (f.clone(), v.clone())))
                        .collect();
                }
                Op::DropEvery { n } => {
                    if self.seen % n == 0 {
                        return Ok(None);
                    }
                }
            }
        }

        Ok(Some(record))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Load a program from a `file://` URL.
pub fn load(url: &str) -> Result<InlineMapping> {
    let path = url
        .strip_prefix("file://")
        .ok_or_else(|| Error::InlineMapping {
            url: url.to_string(),
            reason: "only file:// URLs are supported".to_string(),
        })?;

    let source = fs::read_to_string(path).map_err(|e| Error::InlineMapping {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    InlineMapping::parse(url, &source)
}
