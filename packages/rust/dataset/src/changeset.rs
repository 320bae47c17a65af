//! Classifying the difference between two datasets.

use std::collections::BTreeMap;

use serde_json::Value;

use taxrates_shared::{CountryRecord, Dataset};

use crate::render::format_rate;

/// How a key changed between the original and updated dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
    Unchanged,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Removed => "removed",
            ChangeKind::Unchanged => "unchanged",
        }
    }
}

/// Partition of the union of both key sets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: Vec<String>,
    /// Change notes per modified key.
    pub notes: BTreeMap<String, Vec<String>>,
}

impl ChangeSet {
    /// Whether the updated dataset differs from the original at all.
    pub fn has_changes(&self) -> bool {
        !(self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty())
    }

    pub fn kind_of(&self, key: &str) -> Option<ChangeKind> {
        let has = |keys: &[String]| keys.iter().any(|k| k == key);
        if has(&self.added) {
            Some(ChangeKind::Added)
        } else if has(&self.modified) {
            Some(ChangeKind::Modified)
        } else if has(&self.removed) {
            Some(ChangeKind::Removed)
        } else if has(&self.unchanged) {
            Some(ChangeKind::Unchanged)
        } else {
            None
        }
    }

    pub fn notes_for(&self, key: &str) -> &[String] {
        self.notes.get(key).map_or(&[], Vec::as_slice)
    }
}

/// Structural equality: same type, same mapping keys with equal values,
/// same-length sequences with equal elements, equal scalars.
///
/// Numbers compare by value, so `20` equals `20.0`.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| deep_equal(v, other)))
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(v, w)| deep_equal(v, w))
        }
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(p), Some(q)) => p == q,
            _ => x == y,
        },
        _ => a == b,
    }
}

fn records_equal(a: &CountryRecord, b: &CountryRecord) -> bool {
    match (serde_json::to_value(a), serde_json::to_value(b)) {
        (Ok(x), Ok(y)) => deep_equal(&x, &y),
        _ => a == b,
    }
}

fn rate_or_na(rate: Option<f64>) -> String {
    rate.map_or_else(|| "N/A".to_string(), format_rate)
}

/// Short notes on the sub-structures that differ between two records.
pub fn change_notes(original: &CountryRecord, updated: &CountryRecord) -> Vec<String> {
    let mut notes = Vec::new();

    if original.brackets != updated.brackets {
        notes.push(format!(
            "Tax brackets updated: {} -> {} brackets",
            original.brackets.len(),
            updated.brackets.len()
        ));
    }

    let before = original.vat.as_ref().and_then(|v| v.standard);
    let after = updated.vat.as_ref().and_then(|v| v.standard);
    if before != after {
        notes.push(format!(
            "VAT rate updated: {}% -> {}%",
            rate_or_na(before),
            rate_or_na(after)
        ));
    }

    if original.system != updated.system {
        notes.push(format!(
            "Tax system changed: {} -> {}",
            original.system, updated.system
        ));
    }

    notes
}

/// Classify every key of both datasets.
pub fn diff(original: &Dataset, updated: &Dataset) -> ChangeSet {
    let mut changes = ChangeSet::default();

    for (key, before) in original.iter() {
        match updated.get(key) {
            None => changes.removed.push(key.to_string()),
            Some(after) if records_equal(before, after) => changes.unchanged.push(key.to_string()),
            Some(after) => {
                changes.modified.push(key.to_string());
                changes
                    .notes
                    .insert(key.to_string(), change_notes(before, after));
            }
        }
    }

    for key in updated.keys() {
        if !original.contains_key(key) {
            changes.added.push(key.to_string());
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use serde_json::json;
    use taxrates_shared::{TaxBracket, TaxSystem, VatInfo};

    use super::*;

    fn record(name: &str, rate: f64) -> CountryRecord {
        CountryRecord {
            name: name.into(),
            currency: "EUR".into(),
            system: TaxSystem::Flat,
            country_code: "XX".into(),
            coordinates: [1.0, 2.0],
            brackets: vec![TaxBracket {
                min: 0.0,
                max: None,
                rate,
                description: None,
            }],
            special_taxes: None,
            vat: None,
            notes: None,
        }
    }

    #[test]
    fn deep_equality_rules() {
        assert!(deep_equal(&json!({"a": [1, {"b": 2}]}), &json!({"a": [1.0, {"b": 2}]})));
        assert!(!deep_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
        assert!(!deep_equal(&json!([1, 2]), &json!([2, 1])));
        assert!(!deep_equal(&json!("1"), &json!(1)));
        assert!(deep_equal(&json!(null), &json!(null)));
    }

    #[test]
    fn ukraine_vat_note() {
        let before = CountryRecord {
            name: "Ukraine".into(),
            ..record("Ukraine", 18.0)
        };
        let mut after = before.clone();
        after.vat = Some(VatInfo {
            has_vat: true,
            standard: Some(20.0),
            reduced: None,
            description: None,
            notes: None,
        });

        let original: Dataset = [("ukraine".to_string(), before)].into_iter().collect();
        let updated: Dataset = [("ukraine".to_string(), after)].into_iter().collect();
        let changes = diff(&original, &updated);

        assert_eq!(changes.modified, vec!["ukraine".to_string()]);
        assert_eq!(changes.notes_for("ukraine"), ["VAT rate updated: N/A% -> 20.0%".to_string()]);
        assert_eq!(changes.kind_of("ukraine"), Some(ChangeKind::Modified));
    }

    #[test]
    fn notes_cover_brackets_and_system() {
        let before = record("A", 10.0);
        let mut after = record("A", 12.0);
        after.brackets.push(TaxBracket {
            min: 1000.0,
            max: None,
            rate: 20.0,
            description: None,
        });
        after.system = TaxSystem::Progressive;

        assert_eq!(
            change_notes(&before, &after),
            vec![
                "Tax brackets updated: 1 -> 2 brackets".to_string(),
                "Tax system changed: flat -> progressive".to_string(),
            ]
        );
        assert!(change_notes(&before, &before).is_empty());
    }

    #[test]
    fn partitions_union_of_keys() {
        let original: Dataset = [
            ("a".to_string(), record("A", 10.0)),
            ("b".to_string(), record("B", 10.0)),
            ("c".to_string(), record("C", 10.0)),
        ]
        .into_iter()
        .collect();
        let updated: Dataset = [
            ("a".to_string(), record("A", 10.0)),
            ("b".to_string(), record("B", 15.0)),
            ("d".to_string(), record("D", 10.0)),
        ]
        .into_iter()
        .collect();

        let changes = diff(&original, &updated);
        assert_eq!(changes.unchanged, vec!["a"]);
        assert_eq!(changes.modified, vec!["b"]);
        assert_eq!(changes.removed, vec!["c"]);
        assert_eq!(changes.added, vec!["d"]);
        assert!(changes.has_changes());

        let all: Vec<&String> = changes
            .added
            .iter()
            .chain(&changes.modified)
            .chain(&changes.removed)
            .chain(&changes.unchanged)
            .collect();
        let distinct: BTreeSet<&String> = all.iter().copied().collect();
        assert_eq!(all.len(), distinct.len());
        let union: BTreeSet<String> = original
            .keys()
            .chain(updated.keys())
            .map(str::to_string)
            .collect();
        assert_eq!(distinct.into_iter().cloned().collect::<BTreeSet<_>>(), union);
    }

    #[test]
    fn identical_datasets_have_no_changes() {
        let data: Dataset = [("a".to_string(), record("A", 10.0))].into_iter().collect();
        let changes = diff(&data, &data.clone());
        assert!(!changes.has_changes());
        assert_eq!(changes.unchanged, vec!["a"]);
    }
}
