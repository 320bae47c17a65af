//! Record schema checks for LLM-produced candidates.
//!
//! Candidates arrive as untyped JSON. [`check`] walks the rules in a fixed
//! order and stops at the first violation; [`validate`] collapses that into a
//! plain boolean. A rejected candidate is never written: callers keep the
//! previous record instead.

use std::fmt;

use serde_json::Value;

use crate::error::{Result, TaxRatesError};
use crate::types::{CountryRecord, TaxSystem};

/// Top-level fields every record must carry.
pub const REQUIRED_FIELDS: [&str; 6] = [
    "name",
    "currency",
    "system",
    "countryCode",
    "coordinates",
    "brackets",
];

/// Fields every special-tax entry must carry.
const SPECIAL_TAX_FIELDS: [&str; 4] = ["type", "target", "rate", "description"];

/// The first rule a candidate broke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation(String);

impl SchemaViolation {
    fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether `candidate` satisfies every schema rule. Never panics.
pub fn validate(candidate: &Value) -> bool {
    check(candidate).is_ok()
}

/// Check `candidate`, reporting the first violated rule.
pub fn check(candidate: &Value) -> std::result::Result<(), SchemaViolation> {
    let obj = candidate
        .as_object()
        .ok_or_else(|| SchemaViolation::new("record is not an object"))?;

    for field in REQUIRED_FIELDS {
        if !obj.contains_key(field) {
            return Err(SchemaViolation::new(format!("missing required field '{field}'")));
        }
    }

    let system = obj["system"].as_str().unwrap_or_default();
    if TaxSystem::from_tag(system).is_none() {
        return Err(SchemaViolation::new(format!(
            "invalid system {}; expected one of progressive, flat, zero_personal",
            obj["system"]
        )));
    }

    match obj["coordinates"].as_array() {
        Some(pair) if pair.len() == 2 && pair.iter().all(Value::is_number) => {}
        _ => {
            return Err(SchemaViolation::new(
                "coordinates must be a [latitude, longitude] pair of numbers",
            ));
        }
    }

    let brackets = match obj["brackets"].as_array() {
        Some(list) if !list.is_empty() => list,
        _ => return Err(SchemaViolation::new("brackets must be a non-empty list")),
    };
    for (i, bracket) in brackets.iter().enumerate() {
        let Some(b) = bracket.as_object() else {
            return Err(SchemaViolation::new(format!("bracket {i} is not an object")));
        };
        if !b.get("min").is_some_and(Value::is_number) {
            return Err(SchemaViolation::new(format!("bracket {i} min must be a number")));
        }
        if !b.get("max").is_some_and(|m| m.is_number() || m.is_null()) {
            return Err(SchemaViolation::new(format!(
                "bracket {i} max must be a number or null"
            )));
        }
        if !b.get("rate").is_some_and(Value::is_number) {
            return Err(SchemaViolation::new(format!("bracket {i} rate must be a number")));
        }
    }

    // A null vat is treated as absent.
    if let Some(vat) = obj.get("vat").filter(|v| !v.is_null()) {
        let Some(vat) = vat.as_object() else {
            return Err(SchemaViolation::new("vat must be an object"));
        };
        if !vat.get("hasVAT").is_some_and(Value::is_boolean) {
            return Err(SchemaViolation::new("vat.hasVAT must be a boolean"));
        }
    }

    if let Some(specials) = obj.get("special_taxes").filter(|v| !v.is_null()) {
        let Some(list) = specials.as_array() else {
            return Err(SchemaViolation::new("special_taxes must be a list"));
        };
        for (i, tax) in list.iter().enumerate() {
            let Some(tax) = tax.as_object() else {
                return Err(SchemaViolation::new(format!("special tax {i} is not an object")));
            };
            if let Some(field) = SPECIAL_TAX_FIELDS.iter().find(|f| !tax.contains_key(**f)) {
                return Err(SchemaViolation::new(format!(
                    "special tax {i} missing '{field}'"
                )));
            }
        }
    }

    Ok(())
}

/// Validate and convert a candidate into a typed record.
pub fn into_record(candidate: Value) -> Result<CountryRecord> {
    check(&candidate).map_err(|v| TaxRatesError::validation(v.message()))?;
    serde_json::from_value(candidate).map_err(|e| TaxRatesError::validation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn valid() -> Value {
        json!({
            "name": "Ukraine",
            "currency": "UAH",
            "system": "flat",
            "countryCode": "UA",
            "coordinates": [50.4501, 30.5234],
            "brackets": [{"min": 0, "max": null, "rate": 18}],
            "special_taxes": [
                {"type": "military_levy", "target": "gross", "rate": 5, "description": "levy"}
            ],
            "vat": {"hasVAT": true, "standard": 20.0}
        })
    }

    #[test]
    fn accepts_complete_record() {
        assert!(validate(&valid()));
        let record = into_record(valid()).expect("convert");
        assert_eq!(record.country_code, "UA");
        assert_eq!(record.vat.and_then(|v| v.standard), Some(20.0));
    }

    #[test]
    fn rejects_missing_required_field() {
        let mut candidate = valid();
        candidate.as_object_mut().unwrap().remove("countryCode");
        let err = check(&candidate).unwrap_err();
        assert!(err.message().contains("countryCode"));
    }

    #[test]
    fn rejects_unknown_system() {
        let mut candidate = valid();
        candidate["system"] = json!("territorial");
        assert!(!validate(&candidate));
    }

    #[test]
    fn rejects_bad_coordinates() {
        let mut candidate = valid();
        candidate["coordinates"] = json!([50.4]);
        assert!(!validate(&candidate));
        candidate["coordinates"] = json!(["50.4", 30.5]);
        assert!(!validate(&candidate));
    }

    #[test]
    fn rejects_empty_or_malformed_brackets() {
        let mut candidate = valid();
        candidate["brackets"] = json!([]);
        assert!(!validate(&candidate));

        candidate["brackets"] = json!([{"min": 0, "rate": 10}]);
        assert!(!validate(&candidate));

        candidate["brackets"] = json!([{"min": 0, "max": "none", "rate": 10}]);
        assert!(!validate(&candidate));

        candidate["brackets"] = json!([{"min": 0, "max": 100, "rate": "10%"}]);
        assert!(!validate(&candidate));
    }

    #[test]
    fn vat_requires_boolean_flag() {
        let mut candidate = valid();
        candidate["vat"] = json!({"hasVAT": "yes"});
        assert!(!validate(&candidate));

        candidate["vat"] = json!(20);
        assert!(!validate(&candidate));

        candidate["vat"] = Value::Null;
        assert!(validate(&candidate));
    }

    #[test]
    fn special_taxes_need_all_fields() {
        let mut candidate = valid();
        candidate["special_taxes"] = json!([{"type": "x", "target": "gross", "rate": 1}]);
        let err = check(&candidate).unwrap_err();
        assert!(err.message().contains("description"));

        candidate["special_taxes"] = json!({"type": "x"});
        assert!(!validate(&candidate));
    }

    #[test]
    fn non_object_is_rejected_not_panicking() {
        assert!(!validate(&json!([1, 2, 3])));
        assert!(!validate(&json!("text")));
        assert!(!validate(&Value::Null));
    }

    #[test]
    fn into_record_reports_type_mismatches() {
        let mut candidate = valid();
        candidate["currency"] = json!(980);
        assert!(into_record(candidate).is_err());
    }
}
