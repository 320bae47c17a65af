//! Full regeneration of the data module.
//!
//! Unlike the patcher, every record is re-rendered. The text before the
//! container declaration (minus its leading comment block) and everything
//! after the container are carried over from the original file.

use chrono::{DateTime, Local};

use taxrates_shared::{Dataset, Result, TaxRatesError};

use crate::changeset::{ChangeKind, ChangeSet};
use crate::locator::locate_container;
use crate::render::{INDENT_UNIT, render_record};

fn key_list(keys: &[String]) -> String {
    if keys.is_empty() {
        "none".to_string()
    } else {
        keys.join(", ")
    }
}

/// The leading `//` comment block of the file, blank lines included.
fn leading_comment_len(prologue: &str) -> usize {
    let mut len = 0;
    for line in prologue.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            len += line.len();
        } else {
            break;
        }
    }
    len
}

fn header(changes: &ChangeSet, generated_at: &DateTime<Local>) -> String {
    let mut out = String::new();
    out.push_str("// Tax data for major countries - UPDATED VERSION\n");
    out.push_str(&format!(
        "// Generated by taxrates {} on {}\n",
        env!("CARGO_PKG_VERSION"),
        generated_at.format("%Y-%m-%d %H:%M:%S")
    ));
    out.push_str("//\n// CHANGES SUMMARY:\n");
    out.push_str(&format!(
        "// - Added: {} countries ({})\n",
        changes.added.len(),
        key_list(&changes.added)
    ));
    out.push_str(&format!(
        "// - Modified: {} countries ({})\n",
        changes.modified.len(),
        key_list(&changes.modified)
    ));
    out.push_str(&format!(
        "// - Removed: {} countries ({})\n",
        changes.removed.len(),
        key_list(&changes.removed)
    ));
    out.push_str(&format!("// - Unchanged: {} countries\n\n", changes.unchanged.len()));
    out
}

/// Render `updated` as a complete data module, using `source` for the
/// declaration line and the trailing content.
pub fn regenerate(
    source: &str,
    container: &str,
    updated: &Dataset,
    changes: &ChangeSet,
    generated_at: &DateTime<Local>,
) -> Result<String> {
    let span = locate_container(source, container).ok_or_else(|| {
        TaxRatesError::parse(format!("container `{container}` not found in data file"))
    })?;

    let line_start = source[..span.anchor_start].rfind('\n').map_or(0, |i| i + 1);
    let prologue = &source[..line_start];
    let prologue = &prologue[leading_comment_len(prologue)..];

    let mut out = header(changes, generated_at);
    out.push_str(prologue);
    out.push_str(&source[line_start..=span.start]);
    out.push('\n');

    for (key, record) in updated.iter() {
        match changes.kind_of(key) {
            Some(ChangeKind::Added) => {
                out.push_str(&format!(
                    "\n{INDENT_UNIT}// [ADDED] New country data from taxation analysis\n"
                ));
            }
            Some(ChangeKind::Modified) => {
                out.push_str(&format!("\n{INDENT_UNIT}// [MODIFIED] Updated from taxation analysis\n"));
                for note in changes.notes_for(key) {
                    out.push_str(&format!("{INDENT_UNIT}// - {note}\n"));
                }
            }
            _ => {
                out.push_str(&format!("\n{INDENT_UNIT}// [UNCHANGED] No changes from original data\n"));
            }
        }
        out.push_str(INDENT_UNIT);
        out.push_str(&render_record(key, record, INDENT_UNIT, INDENT_UNIT));
        out.push_str(",\n");
    }

    out.push('}');
    out.push_str(&source[span.end..]);
    Ok(out)
}
