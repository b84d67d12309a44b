//! Sync planning
//!
//! Turns the operator's selection over a comparison into the ordered list of
//! writes the executor will attempt. Preview and execute both go through
//! [`plan_sync`], so the previewed payloads are exactly what gets sent.

use std::collections::HashSet;

use serde_json::{Map, Value};

use super::types::{SelectedItem, StoreViewMapping, SyncAction, SyncItem};
use crate::compare::{ComparisonResult, ItemStatus};
use crate::content::{ContentRecord, ContentType, STORE_FIELD};
use crate::error::SyncError;

/// Plan the writes for the selected keys, in selection order
pub fn plan_sync(
    comparison: &ComparisonResult,
    selection: &[SelectedItem],
    mapping: &StoreViewMapping,
) -> Result<Vec<SyncItem>, SyncError> {
    if selection.is_empty() {
        return Err(SyncError::Validation("No items selected".into()));
    }

    let content_type = comparison.content_type;
    let mut seen = HashSet::with_capacity(selection.len());
    let mut plan = Vec::with_capacity(selection.len());

    for selected in selection {
        let key = selected.key.as_str();
        if !seen.insert(key) {
            return Err(SyncError::Validation(format!(
                "'{}' is selected more than once",
                key
            )));
        }

        let item = comparison.item(key).ok_or_else(|| {
            SyncError::Validation(format!("'{}' is not part of the comparison", key))
        })?;

        let planned = match item.status {
            ItemStatus::MissingInDestination => {
                if selected.fields.is_some() {
                    return Err(SyncError::Validation(format!(
                        "Field selection is not supported when creating '{}'",
                        key
                    )));
                }

                let source = item
                    .source
                    .as_ref()
                    .ok_or_else(|| SyncError::MissingSourceData(key.to_string()))?;
                check_creatable(content_type, key, source)?;

                SyncItem {
                    key: key.to_string(),
                    title: item.title.clone(),
                    action: SyncAction::Create,
                    fields: None,
                    payload: build_payload(content_type, SyncAction::Create, source, &[], mapping),
                }
            }
            ItemStatus::Different => {
                let differences = item.differences.as_deref().unwrap_or_default();
                if differences.is_empty() {
                    return Err(SyncError::Validation(format!(
                        "'{}' has no recorded differences",
                        key
                    )));
                }

                let fields = match &selected.fields {
                    Some(allowlist) => check_allowlist(content_type, key, allowlist)?,
                    None => differences.to_vec(),
                };

                let source = item
                    .source
                    .as_ref()
                    .ok_or_else(|| SyncError::MissingSourceData(key.to_string()))?;

                SyncItem {
                    key: key.to_string(),
                    title: item.title.clone(),
                    action: SyncAction::Update,
                    payload: build_payload(
                        content_type,
                        SyncAction::Update,
                        source,
                        &fields,
                        mapping,
                    ),
                    fields: Some(fields),
                }
            }
            ItemStatus::Same => {
                return Err(SyncError::Validation(format!(
                    "'{}' has no recorded differences",
                    key
                )))
            }
            ItemStatus::MissingInSource => {
                return Err(SyncError::Validation(format!(
                    "'{}' only exists in the destination",
                    key
                )))
            }
        };

        plan.push(planned);
    }

    Ok(plan)
}

fn check_creatable(
    content_type: ContentType,
    key: &str,
    source: &ContentRecord,
) -> Result<(), SyncError> {
    if source.natural_key(content_type).is_none() {
        return Err(SyncError::Validation(format!(
            "Source record for '{}' has no {}",
            key,
            content_type.natural_key()
        )));
    }
    if source.title().is_none() {
        return Err(SyncError::Validation(format!(
            "Source record for '{}' has no title",
            key
        )));
    }
    Ok(())
}

fn check_allowlist(
    content_type: ContentType,
    key: &str,
    allowlist: &[String],
) -> Result<Vec<String>, SyncError> {
    let mut fields: Vec<String> = Vec::with_capacity(allowlist.len());

    for field in allowlist {
        if !content_type.is_comparable(field) {
            return Err(SyncError::Validation(format!(
                "Unknown field '{}' selected for '{}'",
                field, key
            )));
        }
        if !fields.contains(field) {
            fields.push(field.clone());
        }
    }

    if fields.is_empty() {
        return Err(SyncError::Validation(format!(
            "No fields selected for '{}'",
            key
        )));
    }

    Ok(fields)
}

/// Body written to the destination for one item
///
/// A create copies the whole source record without the platform-owned
/// fields. An update carries the natural key plus the selected fields.
/// Store view ids are remapped in both cases; unmapped ids are kept.
pub fn build_payload(
    content_type: ContentType,
    action: SyncAction,
    source: &ContentRecord,
    fields: &[String],
    mapping: &StoreViewMapping,
) -> Map<String, Value> {
    let mut payload = match action {
        SyncAction::Create => {
            let mut payload = source.fields().clone();
            for field in content_type.server_managed_fields() {
                payload.remove(*field);
            }
            payload
        }
        SyncAction::Update => {
            let natural_key = content_type.natural_key();
            let mut payload = Map::new();
            if let Some(value) = source.get(natural_key) {
                payload.insert(natural_key.to_string(), value.clone());
            }
            for field in fields {
                let value = source.get(field).cloned().unwrap_or(Value::Null);
                payload.insert(field.clone(), value);
            }
            payload
        }
    };

    if let Some(stores) = payload.get_mut(STORE_FIELD) {
        remap_store_ids(stores, mapping);
    }

    payload
}

fn remap_store_ids(value: &mut Value, mapping: &StoreViewMapping) {
    match value {
        Value::Array(ids) => ids.iter_mut().for_each(|id| remap_store_ids(id, mapping)),
        _ => {
            let id = match value {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            };
            if let Some(mapped) = id.and_then(|id| mapping.get(&id)) {
                *value = Value::from(*mapped);
            }
        }
    }
}
