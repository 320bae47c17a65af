//! Targeted edits of the data module text.
//!
//! Every edit is a splice at offsets computed by the locator; text outside
//! the touched property is passed through untouched, comments included.
//! A missing anchor fails only the edit that needed it.

use tracing::{debug, warn};

use taxrates_shared::{CountryRecord, Result, TaxRatesError};

use crate::locator::{BlockSpan, Property, line_indent, locate_container, locate_record, properties};
use crate::render::{Field, INDENT_UNIT, render_record, render_value};

/// Result of patching one record.
#[derive(Debug, Clone, Default)]
pub struct PatchOutcome {
    /// The patched text.
    pub text: String,
    /// Edits performed, as `key.field` or `key` for appended records.
    pub applied: Vec<String>,
    /// Edits skipped because an anchor was missing.
    pub skipped: Vec<String>,
}

/// Applies record-level edits to a data module with a known container name.
#[derive(Debug, Clone)]
pub struct DatasetPatcher {
    container: String,
}

struct Layout {
    field_indent: String,
    unit: String,
}

fn splice(text: &str, start: usize, end: usize, replacement: &str) -> String {
    let mut out = String::with_capacity(text.len() + replacement.len());
    out.push_str(&text[..start]);
    out.push_str(replacement);
    out.push_str(&text[end..]);
    out
}

fn record_anchor(key: &str) -> String {
    format!("\"{key}\": {{")
}

/// Indentation used by the block's properties, derived from the text.
fn layout(text: &str, span: &BlockSpan, props: &[Property]) -> Layout {
    let close_indent = line_indent(text, span.close()).unwrap_or_default();
    let field_indent = props
        .first()
        .and_then(|p| line_indent(text, span.start + p.key_start))
        .map(str::to_string)
        .unwrap_or_else(|| format!("{close_indent}{INDENT_UNIT}"));
    let unit = field_indent
        .strip_prefix(close_indent)
        .filter(|u| !u.is_empty())
        .unwrap_or(INDENT_UNIT)
        .to_string();
    Layout { field_indent, unit }
}

impl DatasetPatcher {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
        }
    }

    fn record_span(&self, text: &str, key: &str) -> Result<BlockSpan> {
        locate_record(text, &self.container, key)
            .ok_or_else(|| TaxRatesError::anchor_not_found(record_anchor(key)))
    }

    /// Replace `field` in the record for `key`, inserting it when absent.
    ///
    /// When the record no longer carries the field it is removed instead.
    pub fn upsert_field(
        &self,
        text: &str,
        key: &str,
        field: Field,
        record: &CountryRecord,
    ) -> Result<String> {
        let span = self.record_span(text, key)?;
        let props = properties(&text[span.start..span.end]);
        let layout = layout(text, &span, &props);

        let Some(value) = render_value(field, record, &layout.field_indent, &layout.unit) else {
            return self.remove_field(text, key, field);
        };

        if let Some(existing) = props.iter().find(|p| p.name == field.key()) {
            return Ok(splice(
                text,
                span.start + existing.value_start,
                span.start + existing.value_end,
                &value,
            ));
        }

        let property = format!("{}: {value}", field.key());
        let anchor = if field == Field::Coordinates {
            let anchor = props
                .iter()
                .find(|p| p.name == Field::CountryCode.key())
                .or_else(|| props.iter().find(|p| p.name == Field::System.key()))
                .ok_or_else(|| {
                    TaxRatesError::anchor_not_found(format!("{key}: countryCode or system"))
                })?;
            Some(anchor)
        } else {
            props
                .iter()
                .rfind(|p| Field::from_key(&p.name).is_some_and(|f| f.rank() < field.rank()))
        };

        Ok(match anchor {
            Some(p) => insert_after(text, &span, p, &layout.field_indent, &property),
            None => insert_before_close(text, &span, &layout.field_indent, &property),
        })
    }

    /// Remove `field` from the record for `key`. Absent fields are a no-op.
    pub fn remove_field(&self, text: &str, key: &str, field: Field) -> Result<String> {
        let span = self.record_span(text, key)?;
        let props = properties(&text[span.start..span.end]);
        let Some(idx) = props.iter().position(|p| p.name == field.key()) else {
            return Ok(text.to_string());
        };
        let prop = &props[idx];

        let (start, end) = match prop.comma {
            Some(comma) => (removal_start(text, span.start + prop.key_start), span.start + comma + 1),
            None => match idx.checked_sub(1).and_then(|i| props[i].comma) {
                Some(prev_comma) => (span.start + prev_comma, span.start + prop.value_end),
                None => (
                    removal_start(text, span.start + prop.key_start),
                    span.start + prop.value_end,
                ),
            },
        };
        Ok(splice(text, start, end, ""))
    }

    /// Append a new record after the last record of the container.
    pub fn append_record(&self, text: &str, key: &str, record: &CountryRecord) -> Result<String> {
        let outer = locate_container(text, &self.container).ok_or_else(|| {
            TaxRatesError::anchor_not_found(format!("const {} = {{", self.container))
        })?;
        let entries = properties(&text[outer.start..outer.end]);
        let last = entries.last().ok_or_else(|| {
            TaxRatesError::anchor_not_found(format!("last record of {}", self.container))
        })?;

        let indent = line_indent(text, outer.start + last.key_start).unwrap_or(INDENT_UNIT);
        let unit = if indent.is_empty() { INDENT_UNIT } else { indent };
        let block = render_record(key, record, indent, unit);

        debug!(key, "appending new record");
        Ok(insert_after(text, &outer, last, indent, &block))
    }

    /// Bring the record for `key` in line with `record`.
    ///
    /// Existing records get one edit per field that differs from `previous`
    /// (every field when `previous` is unknown); unknown keys are appended.
    pub fn patch_record(
        &self,
        text: &str,
        key: &str,
        previous: Option<&CountryRecord>,
        record: &CountryRecord,
    ) -> PatchOutcome {
        let mut outcome = PatchOutcome {
            text: text.to_string(),
            ..Default::default()
        };

        if locate_record(text, &self.container, key).is_none() {
            match self.append_record(text, key, record) {
                Ok(patched) => {
                    outcome.text = patched;
                    outcome.applied.push(key.to_string());
                }
                Err(e) => {
                    warn!(key, error = %e, "append skipped");
                    outcome.skipped.push(key.to_string());
                }
            }
            return outcome;
        }

        for field in Field::ORDER {
            if previous.is_some_and(|prev| !field.differs(prev, record)) {
                continue;
            }
            let label = format!("{key}.{}", field.key());
            match self.upsert_field(&outcome.text, key, field, record) {
                Ok(patched) => {
                    outcome.text = patched;
                    outcome.applied.push(label);
                }
                Err(e) => {
                    warn!(key, field = field.key(), error = %e, "patch step skipped");
                    outcome.skipped.push(label);
                }
            }
        }
        outcome
    }
}

/// Insert a property after `anchor`, keeping the block's comma style.
///
/// With a comma, the property goes on a new line after the anchor's line,
/// so a trailing `//` comment stays with the anchor.
fn insert_after(text: &str, span: &BlockSpan, anchor: &Property, indent: &str, property: &str) -> String {
    match anchor.comma {
        Some(comma) => {
            let at = line_tail_end(text, span.start + comma + 1);
            splice(text, at, at, &format!("\n{indent}{property},"))
        }
        None => {
            let at = span.start + anchor.value_end;
            splice(text, at, at, &format!(",\n{indent}{property}"))
        }
    }
}

/// End of the line starting at `from` when the rest of it is blank or a
/// line comment; otherwise `from` itself.
fn line_tail_end(text: &str, from: usize) -> usize {
    let line_end = text[from..].find('\n').map_or(text.len(), |i| from + i);
    let tail = text[from..line_end].trim();
    if !tail.is_empty() && !tail.starts_with("//") {
        return from;
    }
    if text[..line_end].ends_with('\r') {
        line_end - 1
    } else {
        line_end
    }
}

/// Insert a property right before the block's closing `}`.
fn insert_before_close(text: &str, span: &BlockSpan, indent: &str, property: &str) -> String {
    let before = text[span.start..span.close()].trim_end();
    let at = span.start + before.len();
    let comma = if before.ends_with(',') || before.ends_with('{') {
        ""
    } else {
        ","
    };
    splice(text, at, at, &format!("{comma}\n{indent}{property}"))
}

/// Start of a property's line, swallowing its indentation and line break.
fn removal_start(text: &str, key_start: usize) -> usize {
    let bytes = text.as_bytes();
    let mut start = key_start;
    while start > 0 && matches!(bytes[start - 1], b' ' | b'\t') {
        start -= 1;
    }
    if start > 0 && bytes[start - 1] == b'\n' {
        start -= 1;
        if start > 0 && bytes[start - 1] == b'\r' {
            start -= 1;
        }
    }
    start
}
