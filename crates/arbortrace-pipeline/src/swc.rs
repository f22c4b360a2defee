//! SWC skeleton text parsing.
//!
//! SWC is the interchange format for traced neuron morphologies: one node
//! per line with seven whitespace-separated columns
//! (`id type x y z radius parent`), `#` comment lines, and `-1` as the
//! parent of a root node. The structure type and radius columns are
//! validated but not carried into [`NodeRow`] — the pipeline only needs
//! identifiers, positions, and parent links.
//!
//! This module parses from `&str` only; reading the file belongs to the
//! I/O layer.

use std::str::FromStr;

use crate::types::{ConfigError, NodeId, NodeRow};

/// Parse SWC text into skeleton rows.
///
/// Blank lines and `#` comments are skipped. Row order is preserved;
/// structural validation (duplicate ids, dangling parents) happens later in
/// [`Skeleton::from_rows`](crate::skeleton::Skeleton::from_rows).
///
/// # Errors
///
/// Returns [`ConfigError::MalformedRow`] with the 1-based line number for a
/// line with the wrong column count, a non-numeric field, or a negative
/// parent other than `-1`.
pub fn parse(text: &str) -> Result<Vec<NodeRow>, ConfigError> {
    let mut rows = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() != 7 {
            return Err(ConfigError::MalformedRow {
                line,
                reason: format!("expected 7 fields, got {}", fields.len()),
            });
        }

        let id = NodeId(field::<u64>(fields[0], line, "id")?);
        field::<i32>(fields[1], line, "structure type")?;
        let x = field::<f64>(fields[2], line, "x")?;
        let y = field::<f64>(fields[3], line, "y")?;
        let z = field::<f64>(fields[4], line, "z")?;
        field::<f64>(fields[5], line, "radius")?;
        let parent = parent_field(fields[6], line)?;

        rows.push(NodeRow::new(id, parent, x, y, z));
    }
    Ok(rows)
}

/// Parse one numeric field, naming it in the error.
fn field<T: FromStr>(value: &str, line: usize, name: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::MalformedRow {
        line,
        reason: format!("invalid {name} `{value}`"),
    })
}

/// Parse the parent column: `-1` means root, anything else must be a
/// non-negative id.
fn parent_field(value: &str, line: usize) -> Result<Option<NodeId>, ConfigError> {
    let parent = field::<i64>(value, line, "parent")?;
    if parent == -1 {
        return Ok(None);
    }
    u64::try_from(parent)
        .map(|id| Some(NodeId(id)))
        .map_err(|_| ConfigError::MalformedRow {
            line,
            reason: format!("invalid parent `{value}`"),
        })
}
