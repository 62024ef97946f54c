// ── Store state ──
//
// Plain data published through the store's watch channel. Every field
// is replaced or patched by store actions; consumers only read.

use buildmart_api::envelope::PageMeta;
use buildmart_api::{Payload, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::model::{EntityId, Record};

/// Query filters sent with every list request. Always carries `page`.
///
/// Equality ignores insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filters(IndexMap<String, Json>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Json>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Json>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Json> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Json> {
        self.0.shift_remove(key)
    }

    /// Overlay `other`; a `null` value removes the filter.
    pub fn merge(&mut self, other: Filters) {
        for (key, value) in other.0 {
            if value.is_null() {
                self.0.shift_remove(&key);
            } else {
                self.0.insert(key, value);
            }
        }
    }

    pub fn page(&self) -> u32 {
        self.0
            .get("page")
            .and_then(Json::as_u64)
            .and_then(|p| u32::try_from(p).ok())
            .unwrap_or(1)
    }

    pub fn set_page(&mut self, page: u32) {
        self.0.insert("page".into(), Json::from(page));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Json)> {
        self.0.iter()
    }

    /// Request payload for a list call.
    pub fn to_payload(&self) -> Payload {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.clone())))
            .collect()
    }

    /// `{page: 1}` plus `per_page` when configured.
    pub(crate) fn initial(per_page: Option<u32>) -> Self {
        let mut filters = Self::new();
        filters.set_page(1);
        if let Some(per_page) = per_page {
            filters.insert("per_page", per_page);
        }
        filters
    }
}

impl<K: Into<String>, V: Into<Json>> FromIterator<(K, V)> for Filters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Per-action activity flags. Each is scoped to its own kind of action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags {
    pub is_loading: bool,
    pub is_creating: bool,
    pub is_updating: bool,
    pub is_deleting: bool,
}

impl Flags {
    /// Any action still waiting on the server.
    pub fn is_busy(self) -> bool {
        self.is_loading || self.is_creating || self.is_updating || self.is_deleting
    }
}

/// Pagination derived from the last successful list response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_items: u64,
}

impl From<PageMeta> for Pagination {
    fn from(meta: PageMeta) -> Self {
        Self {
            current_page: meta.current_page,
            total_pages: meta.last_page,
            total_items: meta.total,
        }
    }
}

/// Everything a UI needs to render one entity type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreState {
    pub items: Vec<Record>,
    pub selected: Option<Record>,
    pub filters: Filters,
    pub flags: Flags,
    pub error: Option<String>,
    pub pagination: Pagination,
}

impl StoreState {
    pub(crate) fn initial(per_page: Option<u32>) -> Self {
        Self {
            filters: Filters::initial(per_page),
            ..Self::default()
        }
    }

    pub fn find(&self, id: EntityId) -> Option<&Record> {
        self.items.iter().find(|r| r.id == id)
    }

    pub(crate) fn position(&self, id: EntityId) -> Option<usize> {
        self.items.iter().position(|r| r.id == id)
    }

    /// Whether any optimistic placeholder is still in `items`.
    pub fn has_placeholders(&self) -> bool {
        self.items.iter().any(|r| r.id.is_temporary())
    }
}
