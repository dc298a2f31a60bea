//! The alt-field path mini-DSL: `segment(.segment|[])*`.
//!
//! A source path addresses a value inside a CR field. Dotted segments
//! descend through mappings; a `[]` suffix flattens a sequence by resolving
//! the remaining path against every element and joining the string leaves
//! with commas. Paths are parsed once at descriptor load so malformed
//! mappings fail there, not per projected field.

use serde_json::Value;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Descend into a mapping by key.
    Descend(String),
    /// The current value must be a sequence; resolve the rest against each
    /// element and join the string leaves with `,`.
    Flatten,
}

/// Parse a source path into segments. `a.b[].c` becomes
/// `[Descend(a), Descend(b), Flatten, Descend(c)]`.
pub fn parse(raw: &str) -> Result<Vec<PathSegment>> {
    let mut segments = Vec::new();
    for token in raw.split('.') {
        let mut name = token;
        let mut flattens = 0usize;
        while let Some(stripped) = name.strip_suffix("[]") {
            name = stripped;
            flattens += 1;
        }
        if name.is_empty() || name.contains("[]") || name.contains('[') || name.contains(']') {
            return Err(Error::Descriptor(format!(
                "malformed alt field path {:?}",
                raw
            )));
        }
        segments.push(PathSegment::Descend(name.to_string()));
        segments.extend(std::iter::repeat(PathSegment::Flatten).take(flattens));
    }
    Ok(segments)
}

/// Resolve segments against a value. `None` means the path failed to match
/// partway (a descent hit a non-mapping, or a flatten hit a non-sequence);
/// the caller leaves the original value untouched in that case.
pub fn resolve(segments: &[PathSegment], value: &Value) -> Option<Value> {
    match segments.split_first() {
        None => Some(value.clone()),
        Some((PathSegment::Descend(name), rest)) => {
            resolve(rest, value.as_object()?.get(name)?)
        }
        Some((PathSegment::Flatten, rest)) => {
            let elements = value.as_array()?;
            let mut parts: Vec<String> = Vec::new();
            for element in elements {
                // Non-string leaves are skipped, not stringified.
                if let Some(Value::String(s)) = resolve(rest, element) {
                    parts.push(s);
                }
            }
            Some(Value::String(parts.join(",")))
        }
    }
}
