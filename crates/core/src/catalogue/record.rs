//! Analysis records as they appear in the dataset JSON.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Keys that have carried the "sent to another lab" flag across dataset revisions.
const EXTERNAL_LAB_KEYS: &[&str] = &["Envoi_autre_labo", "Envoit_autre_labo", "envoi_autre_labo"];

/// One lab test and the tube it is collected in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(rename = "Analyse_id", deserialize_with = "text_or_number")]
    pub id: String,

    #[serde(rename = "Analyse_nom", default)]
    pub name: String,

    #[serde(rename = "Analyse_mnemonique", default, deserialize_with = "opt_text_or_number")]
    pub mnemonic: Option<String>,

    #[serde(rename = "Analyseur", default, deserialize_with = "opt_text_or_number")]
    pub analyser: Option<String>,

    #[serde(rename = "Code_analyse", default, deserialize_with = "opt_text_or_number")]
    pub code: Option<String>,

    #[serde(rename = "Tube_nom", default, deserialize_with = "opt_text_or_number")]
    pub tube_name: Option<String>,

    #[serde(rename = "Tube_couleur", default, deserialize_with = "opt_text_or_number")]
    pub tube_color: Option<String>,

    #[serde(rename = "Tube_ml", default, deserialize_with = "opt_text_or_number")]
    pub tube_volume_ml: Option<String>,

    #[serde(rename = "Tube_contenant", default, deserialize_with = "opt_text_or_number")]
    pub tube_container: Option<String>,

    #[serde(rename = "Remarques", default, deserialize_with = "opt_text_or_number")]
    pub remarks: Option<String>,

    /// Fields this crate doesn't interpret, kept so persisted copies stay lossless.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Analysis {
    /// Whether the sample is forwarded to an external laboratory.
    pub fn sends_to_external_lab(&self) -> bool {
        EXTERNAL_LAB_KEYS.iter().any(|key| match self.extra.get(*key) {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "vrai"),
            _ => false,
        })
    }

    /// e.g. "Dry tube — 5 ml (plastic)"
    pub fn tube_summary(&self) -> String {
        format!(
            "{} — {} ml ({})",
            self.tube_name.as_deref().unwrap_or(""),
            self.tube_volume_ml.as_deref().filter(|v| !v.is_empty()).unwrap_or("?"),
            self.tube_container.as_deref().filter(|v| !v.is_empty()).unwrap_or("unspecified"),
        )
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrNumber {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
}

impl From<TextOrNumber> for String {
    fn from(value: TextOrNumber) -> Self {
        match value {
            TextOrNumber::Text(s) => s,
            TextOrNumber::Number(n) => n.to_string(),
            TextOrNumber::Bool(b) => b.to_string(),
        }
    }
}

fn text_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    TextOrNumber::deserialize(deserializer).map(String::from)
}

fn opt_text_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<TextOrNumber>::deserialize(deserializer)?.map(String::from))
}
