// ── Media attachments ──

use serde::{Deserialize, Serialize};

/// A file attached to an entity, as returned by the upload endpoint.
///
/// Only the fields the store needs are typed; anything else the backend
/// sends is kept in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, alias = "original_url", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MediaRecord {
    /// Collection this record belongs to, or `fallback` when untagged.
    pub fn collection_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.collection_name.as_deref().unwrap_or(fallback)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn original_url_is_accepted_and_unknown_fields_survive() {
        let media: MediaRecord = serde_json::from_value(json!({
            "id": 9,
            "collection_name": "images",
            "file_name": "front.png",
            "original_url": "https://cdn.test/9/front.png",
            "mime_type": "image/png",
            "size": 2048,
            "order_column": 3
        }))
        .unwrap();

        assert_eq!(media.url.as_deref(), Some("https://cdn.test/9/front.png"));
        assert_eq!(media.extra["order_column"], json!(3));

        let back = serde_json::to_value(&media).unwrap();
        assert_eq!(back["order_column"], json!(3));
        assert_eq!(back["url"], json!("https://cdn.test/9/front.png"));
    }

    #[test]
    fn collection_falls_back_when_untagged() {
        let media: MediaRecord = serde_json::from_value(json!({ "id": 1 })).unwrap();
        assert_eq!(media.collection_or("images"), "images");
    }
}
