//! Accent- and case-insensitive text matching.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use super::Analysis;

/// Decompose, drop combining diacritics (U+0300–U+036F) and lowercase.
pub fn normalize(input: &str) -> String {
    input
        .nfd()
        .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
        .collect::<String>()
        .to_lowercase()
}

/// The text a query is matched against for one record.
pub fn search_text(record: &Analysis) -> String {
    let fields = [
        record.name.as_str(),
        record.mnemonic.as_deref().unwrap_or(""),
        record.analyser.as_deref().unwrap_or(""),
        record.tube_name.as_deref().unwrap_or(""),
        record.id.as_str(),
    ];
    normalize(&fields.join(" "))
}

/// Ordering for favorite listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Name,
    Tube,
}

impl SortOrder {
    pub fn compare(self, a: &Analysis, b: &Analysis) -> Ordering {
        match self {
            SortOrder::Name => normalize(&a.name).cmp(&normalize(&b.name)),
            SortOrder::Tube => normalize(a.tube_name.as_deref().unwrap_or(""))
                .cmp(&normalize(b.tube_name.as_deref().unwrap_or(""))),
        }
    }
}

/// Human-readable count line for a result list.
pub fn result_summary(count: usize) -> String {
    match count {
        0 => "No result found.".to_string(),
        1 => "1 result found".to_string(),
        n => format!("{n} results found"),
    }
}
