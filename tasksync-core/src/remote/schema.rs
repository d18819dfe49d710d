//! Document schema for records in the remote store.
//!
//! Every document written by this crate is schema version 2: camelCase field
//! names with the `is` prefix on flags (`isDeleted`, `isExpanded`,
//! `isCompleted`, `isChecked`) and a `schemaVersion` marker.
//!
//! Documents without `schemaVersion` were written by older clients, which
//! spelled flags both with and without the prefix (`deleted`, `expanded`,
//! `completed`, `checked`). They go through [`upgrade_legacy`] before being
//! decoded, and [`is_legacy`] lets a migration find and rewrite them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use super::{Document, Fields};
use crate::models::{Shop, ShoppingItem, SubTask, Task, TodoList};

pub const LISTS_COLLECTION: &str = "todolists";
pub const TASKS_COLLECTION: &str = "tasks";
pub const SHOPS_COLLECTION: &str = "shops";

pub const SCHEMA_VERSION: u64 = 2;
const SCHEMA_VERSION_FIELD: &str = "schemaVersion";

/// Flag spellings used before version 2, as `(legacy, canonical)`.
const LEGACY_FLAGS: &[(&str, &str)] = &[
    ("deleted", "isDeleted"),
    ("expanded", "isExpanded"),
    ("completed", "isCompleted"),
];
const LEGACY_SUBTASK_FLAGS: &[(&str, &str)] = &[("completed", "isCompleted")];
const LEGACY_ITEM_FLAGS: &[(&str, &str)] = &[("checked", "isChecked")];

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("document id '{0}' is not a UUID")]
    InvalidId(String),
    #[error("unsupported schema version {0}")]
    UnsupportedVersion(u64),
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("{0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDoc {
    name: String,
    owner: String,
    #[serde(default)]
    last_modified: Option<i64>,
    #[serde(default)]
    is_deleted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubTaskDoc {
    id: Uuid,
    title: String,
    #[serde(default)]
    is_completed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskDoc {
    list_id: Uuid,
    title: String,
    #[serde(default)]
    subtasks: Vec<SubTaskDoc>,
    #[serde(default)]
    is_expanded: bool,
    #[serde(default)]
    is_completed: bool,
    #[serde(default)]
    in_list_order: i64,
    #[serde(default)]
    last_modified: Option<i64>,
    #[serde(default)]
    is_deleted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemDoc {
    id: Uuid,
    name: String,
    #[serde(default)]
    is_checked: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShopDoc {
    name: String,
    #[serde(default)]
    items: Vec<ItemDoc>,
    #[serde(default)]
    is_expanded: bool,
    #[serde(default)]
    order: i64,
    #[serde(default)]
    last_modified: Option<i64>,
    owner: String,
    #[serde(default)]
    is_deleted: bool,
}

/// True when the document predates schema version 2.
pub fn is_legacy(fields: &Fields) -> bool {
    !fields.contains_key(SCHEMA_VERSION_FIELD)
}

/// Rewrites legacy flag spellings to their canonical names in place.
///
/// When both spellings are present the canonical one wins.
pub fn upgrade_legacy(fields: &mut Fields) {
    rename_flags(fields, LEGACY_FLAGS);
    upgrade_nested(fields, "subtasks", LEGACY_SUBTASK_FLAGS);
    upgrade_nested(fields, "items", LEGACY_ITEM_FLAGS);
}

fn rename_flags(fields: &mut Fields, aliases: &[(&str, &str)]) {
    for (legacy, canonical) in aliases {
        if let Some(value) = fields.remove(*legacy) {
            if !fields.contains_key(*canonical) {
                fields.insert((*canonical).to_string(), value);
            }
        }
    }
}

fn upgrade_nested(fields: &mut Fields, key: &str, aliases: &[(&str, &str)]) {
    if let Some(Value::Array(entries)) = fields.get_mut(key) {
        for entry in entries.iter_mut() {
            if let Value::Object(map) = entry {
                rename_flags(map, aliases);
            }
        }
    }
}

/// Canonical field map of a document, plus whether it was a legacy one.
fn readable(fields: &Fields) -> Result<(Fields, bool), SchemaError> {
    match fields.get(SCHEMA_VERSION_FIELD) {
        None => {
            let mut upgraded = fields.clone();
            upgrade_legacy(&mut upgraded);
            Ok((upgraded, true))
        }
        Some(value) => match value.as_u64() {
            Some(SCHEMA_VERSION) => Ok((fields.clone(), false)),
            Some(other) => Err(SchemaError::UnsupportedVersion(other)),
            None => Err(SchemaError::UnsupportedVersion(0)),
        },
    }
}

/// Legacy documents may lack a timestamp; they sort before any real edit.
fn last_modified(value: Option<i64>, legacy: bool) -> Result<i64, SchemaError> {
    match value {
        Some(ts) => Ok(ts),
        None if legacy => Ok(0),
        None => Err(SchemaError::MissingField("lastModified")),
    }
}

fn parse_doc_id(id: &str) -> Result<Uuid, SchemaError> {
    Uuid::parse_str(id).map_err(|_| SchemaError::InvalidId(id.to_string()))
}

fn to_document<T: Serialize>(id: Uuid, dto: &T) -> Result<Document, SchemaError> {
    let mut fields = match serde_json::to_value(dto)? {
        Value::Object(map) => map,
        _ => Fields::new(),
    };
    fields.insert("id".to_string(), Value::String(id.to_string()));
    fields.insert(SCHEMA_VERSION_FIELD.to_string(), Value::from(SCHEMA_VERSION));
    Ok(Document::new(id.to_string(), fields))
}

fn clamp_rank(value: i64) -> u32 {
    value.clamp(0, i64::from(u32::MAX)) as u32
}

pub fn encode_list(list: &TodoList) -> Result<Document, SchemaError> {
    to_document(
        list.id,
        &ListDoc {
            name: list.name.clone(),
            owner: list.owner.clone(),
            last_modified: Some(list.last_modified),
            is_deleted: list.is_deleted,
        },
    )
}

pub fn decode_list(doc: &Document) -> Result<TodoList, SchemaError> {
    let id = parse_doc_id(&doc.id)?;
    let (fields, legacy) = readable(&doc.fields)?;
    let dto: ListDoc = serde_json::from_value(Value::Object(fields))?;
    Ok(TodoList {
        id,
        name: dto.name,
        owner: dto.owner,
        last_modified: last_modified(dto.last_modified, legacy)?,
        is_deleted: dto.is_deleted,
    })
}

pub fn encode_task(task: &Task) -> Result<Document, SchemaError> {
    to_document(
        task.id,
        &TaskDoc {
            list_id: task.list_id,
            title: task.title.clone(),
            subtasks: task
                .subtasks
                .iter()
                .map(|s| SubTaskDoc {
                    id: s.id,
                    title: s.title.clone(),
                    is_completed: s.is_completed,
                })
                .collect(),
            is_expanded: task.is_expanded,
            is_completed: task.is_completed,
            in_list_order: i64::from(task.in_list_order),
            last_modified: Some(task.last_modified),
            is_deleted: task.is_deleted,
        },
    )
}

pub fn decode_task(doc: &Document) -> Result<Task, SchemaError> {
    let id = parse_doc_id(&doc.id)?;
    let (fields, legacy) = readable(&doc.fields)?;
    let dto: TaskDoc = serde_json::from_value(Value::Object(fields))?;
    Ok(Task {
        id,
        list_id: dto.list_id,
        title: dto.title,
        subtasks: dto
            .subtasks
            .into_iter()
            .map(|s| SubTask {
                id: s.id,
                title: s.title,
                is_completed: s.is_completed,
            })
            .collect(),
        is_expanded: dto.is_expanded,
        is_completed: dto.is_completed,
        in_list_order: clamp_rank(dto.in_list_order),
        last_modified: last_modified(dto.last_modified, legacy)?,
        is_deleted: dto.is_deleted,
    })
}

pub fn encode_shop(shop: &Shop) -> Result<Document, SchemaError> {
    to_document(
        shop.id,
        &ShopDoc {
            name: shop.name.clone(),
            items: shop
                .items
                .iter()
                .map(|i| ItemDoc {
                    id: i.id,
                    name: i.name.clone(),
                    is_checked: i.is_checked,
                })
                .collect(),
            is_expanded: shop.is_expanded,
            order: i64::from(shop.order),
            last_modified: Some(shop.last_modified),
            owner: shop.owner.clone(),
            is_deleted: shop.is_deleted,
        },
    )
}

pub fn decode_shop(doc: &Document) -> Result<Shop, SchemaError> {
    let id = parse_doc_id(&doc.id)?;
    let (fields, legacy) = readable(&doc.fields)?;
    let dto: ShopDoc = serde_json::from_value(Value::Object(fields))?;
    Ok(Shop {
        id,
        name: dto.name,
        items: dto
            .items
            .into_iter()
            .map(|i| ShoppingItem {
                id: i.id,
                name: i.name,
                is_checked: i.is_checked,
            })
            .collect(),
        is_expanded: dto.is_expanded,
        order: clamp_rank(dto.order),
        last_modified: last_modified(dto.last_modified, legacy)?,
        owner: dto.owner,
        is_deleted: dto.is_deleted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn legacy_doc(id: Uuid, value: Value) -> Document {
        Document::new(id.to_string(), value.as_object().cloned().unwrap())
    }

    #[test]
    fn test_encoded_documents_are_versioned_and_canonical() {
        let list = TodoList::new("Groceries", "alice").deleted();
        let doc = encode_list(&list).unwrap();

        assert_eq!(doc.id, list.id.to_string());
        assert_eq!(doc.fields["schemaVersion"], json!(2));
        assert_eq!(doc.fields["isDeleted"], json!(true));
        assert_eq!(doc.fields["id"], json!(list.id.to_string()));
        assert!(!doc.fields.contains_key("deleted"));
        assert!(!is_legacy(&doc.fields));
        assert_eq!(decode_list(&doc).unwrap(), list);
    }

    #[test]
    fn test_legacy_shop_aliases_are_read() {
        let id = Uuid::new_v4();
        let item_id = Uuid::new_v4();
        let doc = legacy_doc(
            id,
            json!({
                "name": "Market",
                "owner": "alice",
                "order": 3,
                "lastModified": 500,
                "expanded": true,
                "deleted": false,
                "items": [{"id": item_id.to_string(), "name": "apples", "checked": true}],
            }),
        );

        assert!(is_legacy(&doc.fields));
        let shop = decode_shop(&doc).unwrap();
        assert_eq!(shop.id, id);
        assert!(shop.is_expanded);
        assert_eq!(shop.order, 3);
        assert_eq!(shop.last_modified, 500);
        assert_eq!(shop.items.len(), 1);
        assert!(shop.items[0].is_checked);
    }

    #[test]
    fn test_legacy_task_without_timestamp_decodes_as_oldest() {
        let id = Uuid::new_v4();
        let list_id = Uuid::new_v4();
        let sub_id = Uuid::new_v4();
        let doc = legacy_doc(
            id,
            json!({
                "listId": list_id.to_string(),
                "title": "Laundry",
                "inListOrder": 1,
                "isDeleted": true,
                "subtasks": [{"id": sub_id.to_string(), "title": "whites", "completed": true}],
            }),
        );

        let task = decode_task(&doc).unwrap();
        assert_eq!(task.list_id, list_id);
        assert_eq!(task.last_modified, 0);
        assert!(task.is_deleted);
        assert!(task.subtasks[0].is_completed);
    }

    #[test]
    fn test_canonical_flag_wins_over_alias() {
        let mut fields = json!({"deleted": true, "isDeleted": false})
            .as_object()
            .cloned()
            .unwrap();
        upgrade_legacy(&mut fields);
        assert_eq!(fields.get("isDeleted"), Some(&json!(false)));
        assert!(!fields.contains_key("deleted"));
    }

    #[test]
    fn test_versioned_document_requires_timestamp() {
        let id = Uuid::new_v4();
        let doc = legacy_doc(
            id,
            json!({"name": "x", "owner": "alice", "schemaVersion": 2}),
        );
        assert!(matches!(
            decode_list(&doc),
            Err(SchemaError::MissingField("lastModified"))
        ));
    }

    #[test]
    fn test_unknown_version_and_bad_id_are_rejected() {
        let doc = legacy_doc(
            Uuid::new_v4(),
            json!({"name": "x", "owner": "alice", "lastModified": 1, "schemaVersion": 7}),
        );
        assert!(matches!(
            decode_list(&doc),
            Err(SchemaError::UnsupportedVersion(7))
        ));

        let bad = Document::new(
            "not-a-uuid",
            json!({"name": "x", "owner": "alice"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        assert!(matches!(decode_list(&bad), Err(SchemaError::InvalidId(_))));
    }
}
