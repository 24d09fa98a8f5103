// File: ./src/model/adapter.rs
// Handles document serialization/deserialization
use crate::model::item::{Item, ItemId};
use serde_json::{Map, Value, json};

impl Item {
    pub fn to_document(&self) -> Value {
        json!({
            "_id": self.id.to_string(),
            "owner_id": self.owner_id,
            "task": self.task,
            "checked": self.done,
        })
    }

    pub fn from_document(doc: &Value) -> Result<Self, String> {
        let obj: &Map<String, Value> = doc.as_object().ok_or("Document is not an object")?;

        let id = obj
            .get("_id")
            .and_then(Value::as_str)
            .ok_or("Missing _id")?
            .parse::<ItemId>()
            .map_err(|e| format!("Bad _id: {}", e))?;

        let owner_id = obj
            .get("owner_id")
            .and_then(Value::as_str)
            .ok_or("Missing owner_id")?
            .to_string();

        let task = obj
            .get("task")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        // Older documents were written before the flag existed
        let done = obj.get("checked").and_then(Value::as_bool).unwrap_or(false);

        Ok(Item {
            id,
            owner_id,
            task,
            done,
        })
    }
}

/// Decodes a batch of documents, skipping the ones that don't parse.
pub fn items_from_documents(docs: &[Value]) -> Vec<Item> {
    docs.iter()
        .filter_map(|d| match Item::from_document(d) {
            Ok(item) => Some(item),
            Err(e) => {
                log::warn!("Skipping malformed document: {}", e);
                None
            }
        })
        .collect()
}
