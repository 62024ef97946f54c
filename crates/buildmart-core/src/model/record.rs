// ── Stored entity ──
//
// Business fields are opaque: the store only reads `id`, the optimistic
// marker, and media lists (arrays of objects carrying an `id`).

use buildmart_api::Payload;
use buildmart_api::payload::to_json_object;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use super::entity_id::EntityId;
use super::media::MediaRecord;

/// One entity held by a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: EntityId,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Json>,
    /// Set while the record reflects a local change the server has not
    /// confirmed yet.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_optimistic: bool,
}

impl Record {
    pub fn new(id: EntityId, fields: serde_json::Map<String, Json>) -> Self {
        Self {
            id,
            fields,
            is_optimistic: false,
        }
    }

    /// Parse a record from a server payload.
    pub fn from_json(value: Json) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Optimistic stand-in for an entity being created from `payload`.
    pub fn placeholder(payload: &Payload) -> Self {
        let mut fields = to_json_object(payload);
        fields.remove("id");
        Self {
            id: EntityId::temporary(),
            fields,
            is_optimistic: true,
        }
    }

    /// Optimistic copy with `payload` laid over the current fields.
    pub fn merged(&self, payload: &Payload) -> Self {
        let mut fields = self.fields.clone();
        for (key, value) in to_json_object(payload) {
            if key != "id" {
                fields.insert(key, value);
            }
        }
        Self {
            id: self.id,
            fields,
            is_optimistic: true,
        }
    }

    pub fn field(&self, key: &str) -> Option<&Json> {
        self.fields.get(key)
    }

    /// `name` (or `title`) when present, otherwise the id.
    pub fn display_name(&self) -> String {
        ["name", "title"]
            .iter()
            .find_map(|key| self.fields.get(*key).and_then(Json::as_str))
            .map_or_else(|| self.id.to_string(), str::to_owned)
    }

    /// Media records of one collection, skipping entries that don't parse.
    pub fn media(&self, collection: &str) -> Vec<MediaRecord> {
        self.fields
            .get(collection)
            .and_then(Json::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Append uploaded media to their collections. Records without a
    /// collection name go to `default_collection`.
    pub fn append_media(&mut self, media: &[MediaRecord], default_collection: &str) {
        for record in media {
            let Ok(value) = serde_json::to_value(record) else {
                continue;
            };
            let collection = record.collection_or(default_collection).to_owned();
            let slot = self
                .fields
                .entry(collection)
                .or_insert_with(|| Json::Array(Vec::new()));
            if !slot.is_array() {
                *slot = Json::Array(Vec::new());
            }
            if let Json::Array(items) = slot {
                items.push(value);
            }
        }
    }

    /// Drop the media item with `media_id` from every media list.
    /// Returns whether anything was removed.
    pub fn remove_media(&mut self, media_id: u64) -> bool {
        let mut removed = false;
        for value in self.fields.values_mut() {
            let Json::Array(items) = value else {
                continue;
            };
            let before = items.len();
            items.retain(|item| media_id_of(item) != Some(media_id));
            removed |= items.len() != before;
        }
        removed
    }
}

fn media_id_of(item: &Json) -> Option<u64> {
    let id = item.as_object()?.get("id")?;
    id.as_u64()
        .or_else(|| id.as_str().and_then(|s| s.parse().ok()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use buildmart_api::{FileHandle, Value};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn product() -> Record {
        Record::from_json(json!({
            "id": 7,
            "name": "Portland cement",
            "price": 12.5,
            "images": [{ "id": 1, "file_name": "a.png" }, { "id": 2, "file_name": "b.png" }],
            "documents": [{ "id": 3, "file_name": "spec.pdf" }]
        }))
        .unwrap()
    }

    #[test]
    fn server_records_are_not_optimistic() {
        let record = product();
        assert_eq!(record.id, EntityId::Server(7));
        assert!(!record.is_optimistic);
        assert_eq!(record.display_name(), "Portland cement");
        assert!(!serde_json::to_value(&record).unwrap().as_object().unwrap().contains_key("is_optimistic"));
    }

    #[test]
    fn placeholder_gets_a_temporary_id_and_file_names() {
        let mut payload = Payload::new();
        payload.insert("name".into(), Value::from("Rebar"));
        payload.insert(
            "image".into(),
            Value::File(FileHandle::new("rebar.jpg", "image/jpeg", vec![1, 2, 3])),
        );

        let record = Record::placeholder(&payload);
        assert!(record.id.is_temporary());
        assert!(record.is_optimistic);
        assert_eq!(record.fields["image"], json!("rebar.jpg"));
    }

    #[test]
    fn merged_overlays_fields_and_keeps_the_id() {
        let mut payload = Payload::new();
        payload.insert("price".into(), Value::from(14_i64));
        payload.insert("id".into(), Value::from(99_i64));

        let merged = product().merged(&payload);
        assert_eq!(merged.id, EntityId::Server(7));
        assert!(merged.is_optimistic);
        assert_eq!(merged.fields["price"], json!(14));
        assert_eq!(merged.fields["name"], json!("Portland cement"));
    }

    #[test]
    fn append_media_routes_by_collection() {
        let mut record = product();
        let uploaded: Vec<MediaRecord> = serde_json::from_value(json!([
            { "id": 4, "file_name": "c.png" },
            { "id": 5, "collection_name": "documents", "file_name": "sds.pdf" }
        ]))
        .unwrap();

        record.append_media(&uploaded, "images");
        assert_eq!(record.media("images").len(), 3);
        assert_eq!(record.media("documents").len(), 2);
    }

    #[test]
    fn remove_media_searches_every_list() {
        let mut record = product();
        assert!(record.remove_media(3));
        assert!(record.media("documents").is_empty());
        assert!(!record.remove_media(42));
        assert_eq!(record.media("images").len(), 2);
    }
}
