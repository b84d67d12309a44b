//! Field-level diff of two content records

use serde::Serialize;

use crate::content::{ContentRecord, ContentType, FieldValue, STORE_FIELD};

/// One comparable field from both sides
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffField {
    pub field: &'static str,
    pub source_value: FieldValue,
    pub destination_value: FieldValue,
    pub is_different: bool,
}

/// Diff of a matched pair, in the content type's field order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordDiff {
    pub fields: Vec<DiffField>,
    pub has_differences: bool,
}

impl RecordDiff {
    /// Names of the fields that differ
    pub fn differing_fields(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.is_different)
            .map(|f| f.field.to_string())
            .collect()
    }
}

/// Compare the comparable fields of two records
///
/// `content` is compared as an exact string, so markup that only differs in
/// whitespace or attribute order is reported as different.
pub fn diff(
    content_type: ContentType,
    source: &ContentRecord,
    destination: &ContentRecord,
) -> RecordDiff {
    let fields: Vec<DiffField> = content_type
        .comparable_fields()
        .iter()
        .map(|&field| {
            let source_value = source.value(field);
            let destination_value = destination.value(field);
            let is_different = if field == STORE_FIELD {
                !source_value.set_eq(&destination_value)
            } else {
                source_value != destination_value
            };

            DiffField {
                field,
                source_value,
                destination_value,
                is_different,
            }
        })
        .collect();

    let has_differences = fields.iter().any(|f| f.is_different);

    RecordDiff {
        fields,
        has_differences,
    }
}
