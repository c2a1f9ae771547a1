//! Plain-text and JSON output

use serde::Serialize;
use userdesk_core::context_error::{ResultExt, Result};

/// Render rows as a left-aligned, space-padded table
#[must_use]
pub fn render_table<H, R>(headers: &[H], rows: &[R]) -> String
where
    H: AsRef<str>,
    R: AsRef<[String]>,
{
    let mut widths: Vec<usize> = headers.iter().map(|h| h.as_ref().chars().count()).collect();
    for row in rows {
        for (i, cell) in row.as_ref().iter().enumerate() {
            let len = cell.chars().count();
            match widths.get_mut(i) {
                Some(width) => *width = (*width).max(len),
                None => widths.push(len),
            }
        }
    }

    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let mut out = Vec::with_capacity(rows.len() + 2);
    out.push(pad_line(headers.iter().map(|h| h.as_ref()), &widths));
    out.push(pad_line(rule.iter().map(String::as_str), &widths));
    for row in rows {
        out.push(pad_line(row.as_ref().iter().map(String::as_str), &widths));
    }
    out.join("\n")
}

fn pad_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect();
    padded.join("  ").trim_end().to_string()
}

/// Pretty JSON for `--json` output
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).with_context(|| "Failed to encode output as JSON")
}
