//! Rendering records as data-module source text.
//!
//! Output follows the hand-written style of the data file: quoted record
//! keys, bare field names, one bracket per line, inline objects for VAT.

use taxrates_shared::{CountryRecord, SpecialTax, TaxBracket, VatInfo};

/// Default indentation unit.
pub const INDENT_UNIT: &str = "    ";

/// Record fields in canonical output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Currency,
    System,
    CountryCode,
    Coordinates,
    Brackets,
    SpecialTaxes,
    Vat,
    Notes,
}

impl Field {
    pub const ORDER: [Field; 9] = [
        Field::Name,
        Field::Currency,
        Field::System,
        Field::CountryCode,
        Field::Coordinates,
        Field::Brackets,
        Field::SpecialTaxes,
        Field::Vat,
        Field::Notes,
    ];

    /// Property name as written in the data file.
    pub fn key(&self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Currency => "currency",
            Field::System => "system",
            Field::CountryCode => "countryCode",
            Field::Coordinates => "coordinates",
            Field::Brackets => "brackets",
            Field::SpecialTaxes => "special_taxes",
            Field::Vat => "vat",
            Field::Notes => "notes",
        }
    }

    pub fn from_key(key: &str) -> Option<Field> {
        Self::ORDER.into_iter().find(|f| f.key() == key)
    }

    /// Position in [`Field::ORDER`].
    pub fn rank(&self) -> usize {
        Self::ORDER.iter().position(|f| f == self).unwrap_or(Self::ORDER.len())
    }

    /// Whether this field's value differs between two records.
    pub fn differs(&self, a: &CountryRecord, b: &CountryRecord) -> bool {
        match self {
            Field::Name => a.name != b.name,
            Field::Currency => a.currency != b.currency,
            Field::System => a.system != b.system,
            Field::CountryCode => a.country_code != b.country_code,
            Field::Coordinates => a.coordinates != b.coordinates,
            Field::Brackets => a.brackets != b.brackets,
            Field::SpecialTaxes => a.special_taxes != b.special_taxes,
            Field::Vat => a.vat != b.vat,
            Field::Notes => a.notes != b.notes,
        }
    }
}

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

/// Integral values without a fraction (`18`), others in shortest form (`14.5`).
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Rate as shown in change notes: at least one decimal (`20.0`).
pub fn format_rate(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

/// A double-quoted, escaped string literal.
pub fn quote(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("\"{}\"", text.escape_default()))
}

fn number_list(values: &[f64]) -> String {
    let items: Vec<String> = values.iter().copied().map(format_number).collect();
    format!("[{}]", items.join(", "))
}

fn bracket(b: &TaxBracket) -> String {
    let max = b.max.map_or_else(|| "null".to_string(), format_number);
    let mut out = format!(
        "{{min: {}, max: {max}, rate: {}",
        format_number(b.min),
        format_number(b.rate)
    );
    if let Some(desc) = &b.description {
        out.push_str(&format!(", description: {}", quote(desc)));
    }
    out.push('}');
    out
}

fn special_tax(t: &SpecialTax) -> String {
    format!(
        "{{type: {}, target: {}, rate: {}, description: {}}}",
        quote(&t.kind),
        quote(&t.target),
        format_number(t.rate),
        quote(&t.description)
    )
}

fn vat(v: &VatInfo) -> String {
    let mut parts = vec![format!("hasVAT: {}", v.has_vat)];
    if let Some(standard) = v.standard {
        parts.push(format!("standard: {}", format_number(standard)));
    }
    if let Some(reduced) = &v.reduced {
        parts.push(format!("reduced: {}", number_list(reduced)));
    }
    if let Some(desc) = &v.description {
        parts.push(format!("description: {}", quote(desc)));
    }
    if let Some(notes) = &v.notes {
        parts.push(format!("notes: {}", quote(notes)));
    }
    format!("{{{}}}", parts.join(", "))
}

/// Multi-line array: one item per line at `indent + unit`, closing at `indent`.
fn item_list(items: &[String], indent: &str, unit: &str) -> String {
    if items.is_empty() {
        return "[]".to_string();
    }
    let inner = format!("{indent}{unit}");
    let body: Vec<String> = items.iter().map(|item| format!("{inner}{item}")).collect();
    format!("[\n{}\n{indent}]", body.join(",\n"))
}

// ---------------------------------------------------------------------------
// Fields and records
// ---------------------------------------------------------------------------

/// Render the value of `field`, or `None` when the record does not carry it.
///
/// `indent` is the indentation of the property line itself.
pub fn render_value(field: Field, record: &CountryRecord, indent: &str, unit: &str) -> Option<String> {
    let value = match field {
        Field::Name => quote(&record.name),
        Field::Currency => quote(&record.currency),
        Field::System => quote(record.system.as_str()),
        Field::CountryCode => quote(&record.country_code),
        Field::Coordinates => number_list(&record.coordinates),
        Field::Brackets => {
            let items: Vec<String> = record.brackets.iter().map(bracket).collect();
            item_list(&items, indent, unit)
        }
        Field::SpecialTaxes => {
            let items: Vec<String> = record.special_taxes.as_ref()?.iter().map(special_tax).collect();
            item_list(&items, indent, unit)
        }
        Field::Vat => vat(record.vat.as_ref()?),
        Field::Notes => quote(record.notes.as_ref()?),
    };
    Some(value)
}

/// Render `key: value` for a field the record carries.
pub fn render_property(field: Field, record: &CountryRecord, indent: &str, unit: &str) -> Option<String> {
    render_value(field, record, indent, unit).map(|value| format!("{}: {value}", field.key()))
}

/// Render a whole `"key": {...}` entry whose first line starts at `indent`.
pub fn render_record(key: &str, record: &CountryRecord, indent: &str, unit: &str) -> String {
    let field_indent = format!("{indent}{unit}");
    let lines: Vec<String> = Field::ORDER
        .into_iter()
        .filter_map(|field| render_property(field, record, &field_indent, unit))
        .map(|prop| format!("{field_indent}{prop}"))
        .collect();
    format!("{}: {{\n{}\n{indent}}}", quote(key), lines.join(",\n"))
}
