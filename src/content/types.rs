//! Content record types
//!
//! A CMS block or page is kept exactly as the platform returned it. Comparable
//! fields are read out of the record through [`FieldValue`], a closed set of
//! value shapes, so diffs never carry arbitrary JSON.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field holding the store views a record is assigned to
pub const STORE_FIELD: &str = "store_id";

const BLOCK_FIELDS: &[&str] = &["title", "content", "is_active", STORE_FIELD];

const PAGE_FIELDS: &[&str] = &[
    "title",
    "content",
    "url_key",
    "content_heading",
    "is_active",
    STORE_FIELD,
    "page_layout",
    "meta_title",
    "meta_keywords",
    "meta_description",
];

/// Kind of CMS content being compared or synced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Blocks,
    Pages,
}

impl ContentType {
    /// Business key used to match records across instances
    pub fn natural_key(self) -> &'static str {
        match self {
            ContentType::Blocks => "identifier",
            ContentType::Pages => "url_key",
        }
    }

    /// Fields compared by the differ, in display order
    pub fn comparable_fields(self) -> &'static [&'static str] {
        match self {
            ContentType::Blocks => BLOCK_FIELDS,
            ContentType::Pages => PAGE_FIELDS,
        }
    }

    pub fn is_comparable(self, field: &str) -> bool {
        self.comparable_fields().contains(&field)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Blocks => "blocks",
            ContentType::Pages => "pages",
        }
    }

    /// Singular entity name, used as the envelope key in platform write bodies
    pub fn entity_name(self) -> &'static str {
        match self {
            ContentType::Blocks => "block",
            ContentType::Pages => "page",
        }
    }

    /// Fields owned by the platform that must never be written to another instance
    pub fn server_managed_fields(self) -> &'static [&'static str] {
        match self {
            ContentType::Blocks => &["id", "block_id", "creation_time", "update_time"],
            ContentType::Pages => &["id", "page_id", "creation_time", "update_time"],
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blocks" => Ok(ContentType::Blocks),
            "pages" => Ok(ContentType::Pages),
            other => Err(format!("Unknown content type: {}", other)),
        }
    }
}

/// Value of a comparable field
///
/// Absent and `null` both read as [`FieldValue::Null`], which is distinct
/// from an empty string or an empty list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Convert a raw JSON value into the closed value set
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => FieldValue::Number(n.clone()),
            Value::String(s) => FieldValue::Text(s.clone()),
            Value::Array(items) => FieldValue::List(items.iter().map(list_entry).collect()),
            // Nested objects are compared by their serialized form
            Value::Object(_) => FieldValue::Text(value.to_string()),
        }
    }

    /// Set comparison for list values, plain equality otherwise
    pub fn set_eq(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::List(a), FieldValue::List(b)) => {
                let mut a: Vec<&String> = a.iter().collect();
                let mut b: Vec<&String> = b.iter().collect();
                a.sort();
                a.dedup();
                b.sort();
                b.dedup();
                a == b
            }
            _ => self == other,
        }
    }
}

fn list_entry(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One CMS block or page snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentRecord(Map<String, Value>);

impl ContentRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Build a record from a JSON object; any other JSON shape is rejected
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Read a field as a [`FieldValue`]
    pub fn value(&self, field: &str) -> FieldValue {
        self.0
            .get(field)
            .map(FieldValue::from_json)
            .unwrap_or(FieldValue::Null)
    }

    /// Natural key of the record, if present and non-empty
    pub fn natural_key(&self, content_type: ContentType) -> Option<&str> {
        self.text(content_type.natural_key())
    }

    pub fn title(&self) -> Option<&str> {
        self.text("title")
    }

    /// Platform entity id (`id`, falling back to `block_id`/`page_id`)
    pub fn entity_id(&self, content_type: ContentType) -> Option<i64> {
        let fallback = match content_type {
            ContentType::Blocks => "block_id",
            ContentType::Pages => "page_id",
        };

        [self.0.get("id"), self.0.get(fallback)]
            .into_iter()
            .flatten()
            .find_map(|v| match v {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            })
    }

    fn text(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> ContentRecord {
        ContentRecord::from_json(value).unwrap()
    }

    #[test]
    fn test_natural_key_per_type() {
        let block = record(json!({"identifier": "footer", "url_key": "ignored"}));
        assert_eq!(block.natural_key(ContentType::Blocks), Some("footer"));
        assert_eq!(block.natural_key(ContentType::Pages), Some("ignored"));

        let empty = record(json!({"identifier": ""}));
        assert_eq!(empty.natural_key(ContentType::Blocks), None);
    }

    #[test]
    fn test_field_value_conversion() {
        let r = record(json!({
            "title": "Footer",
            "is_active": true,
            "sort": 3,
            "store_id": [1, "2"],
            "note": null
        }));

        assert_eq!(r.value("title"), FieldValue::Text("Footer".into()));
        assert_eq!(r.value("is_active"), FieldValue::Bool(true));
        assert_eq!(r.value("sort"), FieldValue::Number(3.into()));
        assert_eq!(
            r.value("store_id"),
            FieldValue::List(vec!["1".into(), "2".into()])
        );
        assert_eq!(r.value("note"), FieldValue::Null);
        assert_eq!(r.value("missing"), FieldValue::Null);
    }

    #[test]
    fn test_null_distinct_from_empty() {
        assert_ne!(FieldValue::Null, FieldValue::Text(String::new()));
        assert!(!FieldValue::Null.set_eq(&FieldValue::List(vec![])));
    }

    #[test]
    fn test_set_eq_ignores_order() {
        let a = FieldValue::List(vec!["1".into(), "2".into()]);
        let b = FieldValue::List(vec!["2".into(), "1".into()]);
        let c = FieldValue::List(vec!["1".into()]);

        assert!(a.set_eq(&b));
        assert!(!a.set_eq(&c));
    }

    #[test]
    fn test_entity_id_fallbacks() {
        assert_eq!(record(json!({"id": 7})).entity_id(ContentType::Blocks), Some(7));
        assert_eq!(
            record(json!({"page_id": "12"})).entity_id(ContentType::Pages),
            Some(12)
        );
        assert_eq!(record(json!({})).entity_id(ContentType::Blocks), None);
    }

    #[test]
    fn test_content_type_serialization() {
        assert_eq!(serde_json::to_string(&ContentType::Pages).unwrap(), "\"pages\"");
        assert_eq!("blocks".parse::<ContentType>().unwrap(), ContentType::Blocks);
        assert!("widgets".parse::<ContentType>().is_err());
    }

    #[test]
    fn test_field_value_serializes_untagged() {
        let json = serde_json::to_value(FieldValue::List(vec!["1".into()])).unwrap();
        assert_eq!(json, json!(["1"]));
        assert_eq!(serde_json::to_value(FieldValue::Null).unwrap(), Value::Null);
    }
}
