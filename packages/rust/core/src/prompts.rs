//! Prompt templates for record extraction.
//!
//! Templates carry `{placeholder}` markers that the builder functions fill in.

use taxrates_shared::countries::{default_coordinates, display_name};
use taxrates_shared::CountryRecord;

/// Reply a chunk summary must give when its slice says nothing about tax.
pub const NO_TAX_INFO: &str = "No taxation information in this chunk.";

/// System prompt for every extraction call.
pub const SYSTEM_PROMPT: &str = "You are a meticulous tax analyst. \
    You read narrative descriptions of national tax systems and extract exact figures. \
    When asked for JSON you respond with one valid JSON object only, \
    without markdown code fences, explanations or apologies.";

const RECORD_SCHEMA: &str = r#"{
    "name": "Country Name",
    "currency": "CUR",
    "system": "progressive|flat|zero_personal",
    "countryCode": "XX",
    "coordinates": [lat, lng],
    "brackets": [
        {"min": 0, "max": 50000, "rate": 10, "description": "optional description"},
        {"min": 50001, "max": null, "rate": 25}
    ],
    "special_taxes": [
        {"type": "social_security", "target": "gross", "rate": 5, "description": "Social security contribution"}
    ],
    "vat": {"hasVAT": true, "standard": 20.0, "reduced": [5.0], "description": "Standard 20.0%", "notes": "optional notes"},
    "notes": "Any additional information that matters for tax calculation"
}"#;

const RECORD_RULES: &str = r#"Rules:
1. Use exactly these field names: name, currency, system, countryCode, coordinates, brackets, special_taxes, vat, notes.
2. "system" is "progressive" for several brackets, "flat" for a single rate, "zero_personal" when there is no personal income tax.
3. Every bracket has numeric "min", numeric "max" (null for the top bracket) and numeric "rate" in percent.
4. "vat" always carries a boolean "hasVAT".
5. Every special tax has "type", "target", "rate" and "description".
6. "coordinates" is [latitude, longitude]. Keep the current coordinates and countryCode.
7. Numbers are JSON numbers, never strings.
8. When the text does not settle a value, keep the current value."#;

const SINGLE_SHOT_TEMPLATE: &str = r#"Analyze the following taxation information for {name} and extract structured tax data.

Current data in the system:
{current}

Tax information:
{narrative}

Return one JSON object with this structure:
{schema}

{rules}"#;

const CHUNK_TEMPLATE: &str = r#"This is part {index} of {total} of a text about taxation in {name}.

Summarize only the taxation facts in this part: income tax brackets and rates, the tax system type, VAT or GST rates, social contributions and other special taxes. Keep every number exactly as written.
If this part contains no taxation information, reply with exactly: {sentinel}

Text:
{chunk}"#;

const AGGREGATE_TEMPLATE: &str = r#"Below are summaries of the taxation information for {name}, extracted part by part from a longer text.

Current data in the system:
{current}

Summaries:
{summaries}

Combine them into one JSON object with this structure:
{schema}

{rules}"#;

fn current_data(key: &str, prior: Option<&CountryRecord>) -> String {
    match prior {
        Some(record) => {
            let brackets = serde_json::to_string(&record.brackets).unwrap_or_default();
            let vat = record
                .vat
                .as_ref()
                .and_then(|v| serde_json::to_string(v).ok())
                .unwrap_or_else(|| "none".to_string());
            format!(
                "- Currency: {}\n- Tax system: {}\n- Country code: {}\n- Coordinates: [{}, {}]\n- Brackets: {brackets}\n- VAT: {vat}",
                record.currency,
                record.system,
                record.country_code,
                record.coordinates[0],
                record.coordinates[1],
            )
        }
        None => match default_coordinates(key) {
            Some([lat, lng]) => format!("- Coordinates: [{lat}, {lng}]\n- No other data on record"),
            None => "- No data on record".to_string(),
        },
    }
}

fn country_name(key: &str, prior: Option<&CountryRecord>) -> String {
    prior.map_or_else(|| display_name(key), |r| r.name.clone())
}

/// Prompt for narratives that fit into one request.
pub fn single_shot(key: &str, prior: Option<&CountryRecord>, narrative: &str) -> String {
    SINGLE_SHOT_TEMPLATE
        .replace("{name}", &country_name(key, prior))
        .replace("{current}", &current_data(key, prior))
        .replace("{schema}", RECORD_SCHEMA)
        .replace("{rules}", RECORD_RULES)
        .replace("{narrative}", narrative)
}

/// Prompt asking for the taxation summary of one chunk (1-based `index`).
pub fn chunk_summary(key: &str, prior: Option<&CountryRecord>, index: usize, total: usize, chunk: &str) -> String {
    CHUNK_TEMPLATE
        .replace("{index}", &index.to_string())
        .replace("{total}", &total.to_string())
        .replace("{name}", &country_name(key, prior))
        .replace("{sentinel}", NO_TAX_INFO)
        .replace("{chunk}", chunk)
}

/// Prompt combining chunk summaries into one record.
pub fn aggregate(key: &str, prior: Option<&CountryRecord>, summaries: &str) -> String {
    let summaries = if summaries.trim().is_empty() {
        "(no taxation information was found)"
    } else {
        summaries
    };
    AGGREGATE_TEMPLATE
        .replace("{name}", &country_name(key, prior))
        .replace("{current}", &current_data(key, prior))
        .replace("{schema}", RECORD_SCHEMA)
        .replace("{rules}", RECORD_RULES)
        .replace("{summaries}", summaries)
}

#[cfg(test)]
mod tests {
    use taxrates_shared::{TaxBracket, TaxSystem};

    use super::*;

    fn ukraine() -> CountryRecord {
        CountryRecord {
            name: "Ukraine".into(),
            currency: "UAH".into(),
            system: TaxSystem::Flat,
            country_code: "UA".into(),
            coordinates: [50.4501, 30.5234],
            brackets: vec![TaxBracket {
                min: 0.0,
                max: None,
                rate: 18.0,
                description: None,
            }],
            special_taxes: None,
            vat: None,
            notes: None,
        }
    }

    #[test]
    fn single_shot_seeds_prior_hints() {
        let prompt = single_shot("ukraine", Some(&ukraine()), "Ukraine levies 18% PIT.");
        assert!(prompt.contains("taxation information for Ukraine"));
        assert!(prompt.contains("- Currency: UAH"));
        assert!(prompt.contains("- Country code: UA"));
        assert!(prompt.contains("- Coordinates: [50.4501, 30.5234]"));
        assert!(prompt.contains("Ukraine levies 18% PIT."));
        assert!(prompt.contains("\"hasVAT\""));
        assert!(!prompt.contains("{narrative}"));
    }

    #[test]
    fn new_key_uses_table_coordinates() {
        let prompt = single_shot("estonia", None, "text");
        assert!(prompt.contains("taxation information for Estonia"));
        assert!(prompt.contains("- Coordinates: ["));
    }

    #[test]
    fn chunk_prompt_names_sentinel() {
        let prompt = chunk_summary("ukraine", None, 2, 3, "slice");
        assert!(prompt.starts_with("This is part 2 of 3"));
        assert!(prompt.contains(NO_TAX_INFO));
        assert!(prompt.ends_with("slice"));
    }

    #[test]
    fn aggregate_with_no_summaries() {
        let prompt = aggregate("ukraine", Some(&ukraine()), "");
        assert!(prompt.contains("(no taxation information was found)"));
    }
}
