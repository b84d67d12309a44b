//! Source/destination comparison by natural key

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::differ::diff;
use crate::content::{ContentRecord, ContentType};
use crate::error::SyncError;

/// Side of a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Source,
    Destination,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => f.write_str("source"),
            Side::Destination => f.write_str("destination"),
        }
    }
}

/// Whether a side holds a record for a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Presence {
    Exists,
    Missing,
}

/// Category of a compared key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    MissingInDestination,
    MissingInSource,
    Different,
    Same,
}

/// One natural key of a comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonItem {
    pub key: String,
    pub title: String,
    pub source_status: Presence,
    pub destination_status: Presence,
    pub status: ItemStatus,
    /// Differing field names, present only when both sides exist
    #[serde(skip_serializing_if = "Option::is_none")]
    pub differences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ContentRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<ContentRecord>,
}

impl ComparisonItem {
    fn source_only(key: &str, record: &ContentRecord) -> Self {
        Self {
            key: key.to_string(),
            title: display_title(key, Some(record), None),
            source_status: Presence::Exists,
            destination_status: Presence::Missing,
            status: ItemStatus::MissingInDestination,
            differences: None,
            source: Some(record.clone()),
            destination: None,
        }
    }

    fn destination_only(key: &str, record: &ContentRecord) -> Self {
        Self {
            key: key.to_string(),
            title: display_title(key, None, Some(record)),
            source_status: Presence::Missing,
            destination_status: Presence::Exists,
            status: ItemStatus::MissingInSource,
            differences: None,
            source: None,
            destination: Some(record.clone()),
        }
    }

    fn matched(
        content_type: ContentType,
        key: &str,
        source: &ContentRecord,
        destination: &ContentRecord,
    ) -> Self {
        let differences = diff(content_type, source, destination).differing_fields();
        let status = if differences.is_empty() {
            ItemStatus::Same
        } else {
            ItemStatus::Different
        };

        Self {
            key: key.to_string(),
            title: display_title(key, Some(source), Some(destination)),
            source_status: Presence::Exists,
            destination_status: Presence::Exists,
            status,
            differences: Some(differences),
            source: Some(source.clone()),
            destination: Some(destination.clone()),
        }
    }
}

fn display_title(key: &str, source: Option<&ContentRecord>, destination: Option<&ContentRecord>) -> String {
    source
        .and_then(ContentRecord::title)
        .or_else(|| destination.and_then(ContentRecord::title))
        .unwrap_or(key)
        .to_string()
}

/// Aggregate counts of a comparison
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComparisonSummary {
    pub total_source: usize,
    pub total_destination: usize,
    pub missing_in_destination: usize,
    pub missing_in_source: usize,
    pub different: usize,
    pub same: usize,
}

impl ComparisonSummary {
    /// Derive the counts from the items alone
    pub fn from_items(items: &[ComparisonItem]) -> Self {
        let mut summary = Self::default();

        for item in items {
            if item.source_status == Presence::Exists {
                summary.total_source += 1;
            }
            if item.destination_status == Presence::Exists {
                summary.total_destination += 1;
            }
            match item.status {
                ItemStatus::MissingInDestination => summary.missing_in_destination += 1,
                ItemStatus::MissingInSource => summary.missing_in_source += 1,
                ItemStatus::Different => summary.different += 1,
                ItemStatus::Same => summary.same += 1,
            }
        }

        summary
    }

    /// Number of distinct natural keys
    pub fn total(&self) -> usize {
        self.missing_in_destination + self.missing_in_source + self.different + self.same
    }
}

/// Full comparison of one content type between two instances
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub content_type: ContentType,
    pub items: Vec<ComparisonItem>,
    pub summary: ComparisonSummary,
}

impl ComparisonResult {
    pub fn item(&self, key: &str) -> Option<&ComparisonItem> {
        self.items.iter().find(|item| item.key == key)
    }
}

/// Records of one side in input order, with a lookup by natural key
struct KeyIndex<'a> {
    ordered: Vec<(&'a str, &'a ContentRecord)>,
    by_key: HashMap<&'a str, &'a ContentRecord>,
}

impl<'a> KeyIndex<'a> {
    fn build(
        content_type: ContentType,
        side: Side,
        records: &'a [ContentRecord],
    ) -> Result<Self, SyncError> {
        let field = content_type.natural_key();
        let mut ordered = Vec::with_capacity(records.len());
        let mut by_key = HashMap::with_capacity(records.len());

        for (index, record) in records.iter().enumerate() {
            let key = record
                .natural_key(content_type)
                .ok_or(SyncError::MissingNaturalKey { side, field, index })?;

            if by_key.insert(key, record).is_some() {
                return Err(SyncError::DuplicateKey {
                    side,
                    field,
                    key: key.to_string(),
                });
            }
            ordered.push((key, record));
        }

        Ok(Self { ordered, by_key })
    }
}

/// Compare two snapshots of the same content type
///
/// Items follow source order, then destination-only keys in destination
/// order. Each natural key appears exactly once.
pub fn compare(
    source: &[ContentRecord],
    destination: &[ContentRecord],
    content_type: ContentType,
) -> Result<ComparisonResult, SyncError> {
    let source_index = KeyIndex::build(content_type, Side::Source, source)?;
    let destination_index = KeyIndex::build(content_type, Side::Destination, destination)?;

    let mut items = Vec::with_capacity(source_index.ordered.len());

    for &(key, record) in &source_index.ordered {
        let item = match destination_index.by_key.get(key) {
            Some(dest) => ComparisonItem::matched(content_type, key, record, dest),
            None => ComparisonItem::source_only(key, record),
        };
        items.push(item);
    }

    for &(key, record) in &destination_index.ordered {
        if !source_index.by_key.contains_key(key) {
            items.push(ComparisonItem::destination_only(key, record));
        }
    }

    let summary = ComparisonSummary::from_items(&items);

    Ok(ComparisonResult {
        content_type,
        items,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::collections::HashSet;

    fn records(values: Vec<Value>) -> Vec<ContentRecord> {
        values
            .into_iter()
            .map(|v| ContentRecord::from_json(v).unwrap())
            .collect()
    }

    fn block(identifier: &str, content: &str) -> Value {
        json!({
            "identifier": identifier,
            "title": identifier.to_uppercase(),
            "content": content,
            "is_active": true,
            "store_id": [0]
        })
    }

    fn fixtures() -> (Vec<ContentRecord>, Vec<ContentRecord>) {
        let source = records(vec![
            block("header", "<h1>Shop</h1>"),
            block("footer", "<p>A</p>"),
            block("promo", "<p>Sale</p>"),
        ]);
        let destination = records(vec![
            block("legacy", "<p>Old</p>"),
            block("footer", "<p>B</p>"),
            block("header", "<h1>Shop</h1>"),
        ]);
        (source, destination)
    }

    #[test]
    fn test_missing_footer_block() {
        let source = records(vec![block("footer", "<p>A</p>")]);
        let result = compare(&source, &[], ContentType::Blocks).unwrap();

        assert_eq!(result.items.len(), 1);
        let item = &result.items[0];
        assert_eq!(item.key, "footer");
        assert_eq!(item.source_status, Presence::Exists);
        assert_eq!(item.destination_status, Presence::Missing);
        assert_eq!(item.status, ItemStatus::MissingInDestination);
        assert!(item.differences.is_none());
        assert!(item.destination.is_none());
    }

    #[test]
    fn test_content_only_difference() {
        let source = records(vec![block("footer", "<p>A</p>")]);
        let destination = records(vec![block("footer", "<p>B</p>")]);

        let result = compare(&source, &destination, ContentType::Blocks).unwrap();
        let item = result.item("footer").unwrap();

        assert_eq!(item.status, ItemStatus::Different);
        assert_eq!(item.differences, Some(vec!["content".to_string()]));
    }

    #[test]
    fn test_iteration_order() {
        let (source, destination) = fixtures();
        let result = compare(&source, &destination, ContentType::Blocks).unwrap();

        let keys: Vec<_> = result.items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["header", "footer", "promo", "legacy"]);
    }

    #[test]
    fn test_partitions_union_of_keys() {
        let (source, destination) = fixtures();
        let result = compare(&source, &destination, ContentType::Blocks).unwrap();

        let keys: HashSet<_> = result.items.iter().map(|i| i.key.clone()).collect();
        assert_eq!(keys.len(), result.items.len());
        assert_eq!(keys.len(), 4);

        let summary = &result.summary;
        assert_eq!(summary.total(), 4);
        assert_eq!(summary.total_source, 3);
        assert_eq!(summary.total_destination, 3);
        assert_eq!(summary.missing_in_destination, 1);
        assert_eq!(summary.missing_in_source, 1);
        assert_eq!(summary.different, 1);
        assert_eq!(summary.same, 1);
    }

    #[test]
    fn test_status_matches_presence() {
        let (source, destination) = fixtures();
        let result = compare(&source, &destination, ContentType::Blocks).unwrap();

        for item in &result.items {
            assert_eq!(item.source_status == Presence::Exists, item.source.is_some());
            assert_eq!(
                item.destination_status == Presence::Exists,
                item.destination.is_some()
            );
            let both = item.source.is_some() && item.destination.is_some();
            assert_eq!(item.differences.is_some(), both);
            if item.status == ItemStatus::Different {
                assert!(both);
            }
        }
    }

    #[test]
    fn test_compare_mirrors_when_sides_swap() {
        let (source, destination) = fixtures();
        let forward = compare(&source, &destination, ContentType::Blocks).unwrap();
        let backward = compare(&destination, &source, ContentType::Blocks).unwrap();

        assert_eq!(forward.items.len(), backward.items.len());
        for item in &forward.items {
            let mirrored = backward.item(&item.key).unwrap();
            assert_eq!(item.source_status, mirrored.destination_status);
            assert_eq!(item.destination_status, mirrored.source_status);
            assert_eq!(item.differences, mirrored.differences);
        }

        assert_eq!(
            forward.summary.missing_in_destination,
            backward.summary.missing_in_source
        );
        assert_eq!(forward.summary.different, backward.summary.different);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let source = records(vec![block("footer", "a"), block("footer", "b")]);
        let err = compare(&source, &[], ContentType::Blocks).unwrap_err();

        assert_eq!(
            err,
            SyncError::DuplicateKey {
                side: Side::Source,
                field: "identifier",
                key: "footer".into(),
            }
        );
    }

    #[test]
    fn test_missing_natural_key_rejected() {
        let destination = records(vec![block("footer", "a"), json!({"title": "Orphan"})]);
        let err = compare(&[], &destination, ContentType::Blocks).unwrap_err();

        assert!(matches!(
            err,
            SyncError::MissingNaturalKey {
                side: Side::Destination,
                index: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_pages_match_on_url_key() {
        let source = records(vec![json!({"url_key": "about", "title": "About us"})]);
        let destination = records(vec![json!({"url_key": "about", "title": "About"})]);

        let result = compare(&source, &destination, ContentType::Pages).unwrap();
        let item = result.item("about").unwrap();
        assert_eq!(item.title, "About us");
        assert_eq!(item.differences, Some(vec!["title".to_string()]));
    }

    #[test]
    fn test_title_falls_back_to_key() {
        let destination = records(vec![json!({"identifier": "bare"})]);
        let result = compare(&[], &destination, ContentType::Blocks).unwrap();
        assert_eq!(result.items[0].title, "bare");
    }

    #[test]
    fn test_empty_inputs() {
        let result = compare(&[], &[], ContentType::Pages).unwrap();
        assert!(result.items.is_empty());
        assert_eq!(result.summary, ComparisonSummary::default());
    }
}
