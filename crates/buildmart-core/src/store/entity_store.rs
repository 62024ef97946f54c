// ── Entity store ──
//
// List/detail state for one entity type, mediating every mutation through
// the gateway. Creates and updates are optimistic and guarded by version
// tokens; deletes and media changes wait for the server. No action ever
// returns an error: failures land in `StoreState::error`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use buildmart_api::{
    Envelope, FileHandle, Gateway, Method, PageMeta, Payload, RequestOptions, Value,
};
use serde_json::Value as Json;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::state::{Filters, Flags, Pagination, StoreState};
use super::versions::Versions;
use crate::config::StoreConfig;
use crate::endpoints::Endpoints;
use crate::error::CoreError;
use crate::model::{EntityId, MediaRecord, Record};
use crate::stream::StateStream;

/// Multipart key uploads are sent under.
const UPLOAD_FIELD: &str = "files";

#[derive(Debug, Clone, Copy)]
enum Activity {
    Loading,
    Creating,
    Updating,
    Deleting,
}

impl Activity {
    fn index(self) -> usize {
        match self {
            Self::Loading => 0,
            Self::Creating => 1,
            Self::Updating => 2,
            Self::Deleting => 3,
        }
    }

    fn set(self, flags: &mut Flags, on: bool) {
        match self {
            Self::Loading => flags.is_loading = on,
            Self::Creating => flags.is_creating = on,
            Self::Updating => flags.is_updating = on,
            Self::Deleting => flags.is_deleting = on,
        }
    }
}

/// Reactive store for one entity type.
///
/// Cheaply cloneable; clones share state, subscribers and the gateway.
#[derive(Clone)]
pub struct EntityStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    gateway: Gateway,
    endpoints: Endpoints,
    config: StoreConfig,
    state: watch::Sender<Arc<StoreState>>,
    versions: Versions,
    /// Outstanding actions per flag; the flag is on while its count is > 0.
    active: [AtomicUsize; 4],
    /// Bumped by `reset()`. Actions begun under an older generation neither
    /// touch the counters nor write their results.
    generation: AtomicU64,
}

impl EntityStore {
    pub fn new(gateway: Gateway, endpoints: Endpoints, config: StoreConfig) -> Self {
        let (state, _) = watch::channel(Arc::new(StoreState::initial(config.per_page)));
        Self {
            inner: Arc::new(StoreInner {
                gateway,
                endpoints,
                config,
                state,
                versions: Versions::default(),
                active: Default::default(),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Store over the product catalog.
    pub fn products(gateway: Gateway, config: StoreConfig) -> Self {
        Self::new(gateway, Endpoints::products(), config)
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.inner.endpoints
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> Arc<StoreState> {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> StateStream {
        StateStream::new(self.inner.state.subscribe())
    }

    pub fn find(&self, id: EntityId) -> Option<Record> {
        self.inner.state.borrow().find(id).cloned()
    }

    /// Put a record obtained elsewhere (e.g. from [`get`](Self::get)) into
    /// `items` so it can be updated. Replaces an item with the same id.
    pub fn insert(&self, record: Record) {
        self.modify(|state| match state.position(record.id) {
            Some(index) => state.items[index] = record,
            None => state.items.insert(0, record),
        });
    }

    // ── Fetching ─────────────────────────────────────────────────────

    /// Fetch a page of items, merging `filters` into the current filters.
    pub async fn list(&self, filters: Option<Filters>) {
        let query = self.modify(|state| {
            if let Some(filters) = filters {
                state.filters.merge(filters);
            }
            state.error = None;
            state.filters.to_payload()
        });
        let generation = self.begin(Activity::Loading);
        debug!(entity = %self.inner.endpoints.entity, "listing");

        let envelope = self
            .inner
            .gateway
            .get(&self.inner.endpoints.list_path(), Some(&query))
            .await;

        match parse_list(&envelope) {
            Ok((items, pagination)) => {
                debug!(count = items.len(), "list loaded");
                self.modify(|state| {
                    if !self.is_live(generation) {
                        return;
                    }
                    let pagination = pagination.unwrap_or(Pagination {
                        current_page: state.filters.page(),
                        total_pages: 1,
                        total_items: u64::try_from(items.len()).unwrap_or(u64::MAX),
                    });
                    state.items = items;
                    state.pagination = pagination;
                });
            }
            Err(err) => self.fail(generation, "list", &err),
        }
        self.end(Activity::Loading, generation);
    }

    /// Fetch one entity into `selected`. A failure leaves `selected` as it was.
    pub async fn get(&self, id: EntityId) -> Option<Record> {
        self.modify(|state| state.error = None);
        let generation = self.begin(Activity::Loading);
        debug!(%id, "fetching");

        let envelope = self
            .inner
            .gateway
            .get(&self.inner.endpoints.item_path(id), None)
            .await;

        let result = match parse_record(&envelope) {
            Ok(record) => {
                self.modify(|state| {
                    if self.is_live(generation) {
                        state.selected = Some(record.clone());
                    }
                });
                Some(record)
            }
            Err(err) => {
                self.fail(generation, "get", &err);
                None
            }
        };
        self.end(Activity::Loading, generation);
        result
    }

    // ── Optimistic mutations ─────────────────────────────────────────

    /// Create an entity. A placeholder is shown at the front of `items`
    /// until the server answers; it is then replaced or removed.
    pub async fn create(&self, data: Payload) -> Option<Record> {
        let placeholder = Record::placeholder(&data);
        let temp_id = placeholder.id;
        let token = self.modify(|state| {
            state.error = None;
            state.items.insert(0, placeholder);
            state.pagination.total_items += 1;
            self.inner.versions.begin(temp_id, None)
        });
        let generation = self.begin(Activity::Creating);
        debug!(%temp_id, "creating optimistically");

        let envelope = self
            .inner
            .gateway
            .send(
                Method::POST,
                &self.inner.endpoints.create_path(),
                Some(&data),
                &self.request_options(),
            )
            .await;
        let outcome = parse_record(&envelope);

        let result = self.modify(|state| {
            if !self.inner.versions.is_current(temp_id, token) {
                debug!(%temp_id, "create result is stale, discarding");
                return None;
            }
            self.inner.versions.finish(temp_id, token);
            state.items.retain(|r| r.id != temp_id);
            match outcome {
                Ok(record) => {
                    state.items.insert(0, record.clone());
                    Some(record)
                }
                Err(err) => {
                    warn!(%temp_id, error = %err, "create failed, rolling back");
                    state.pagination.total_items = state.pagination.total_items.saturating_sub(1);
                    state.error = Some(err.to_string());
                    None
                }
            }
        });
        self.end(Activity::Creating, generation);
        result
    }

    /// Update an entity in place. The merged copy is shown immediately and
    /// replaced by the server's version, or reverted on failure.
    ///
    /// A revert restores the last server-confirmed value, so overlapping
    /// updates that both fail leave no unconfirmed fields behind.
    pub async fn update(&self, id: EntityId, data: Payload) -> Option<Record> {
        let started = self.modify(|state| {
            let Some(index) = state.position(id).filter(|_| !id.is_temporary()) else {
                state.error = Some(self.not_found(id).to_string());
                return None;
            };
            state.error = None;
            let previous = state.items[index].clone();
            state.items[index] = previous.merged(&data);
            Some((self.inner.versions.begin(id, Some(&previous)), previous))
        });
        let Some((token, previous)) = started else {
            warn!(%id, "update target not in store");
            return None;
        };
        let generation = self.begin(Activity::Updating);
        debug!(%id, "updating optimistically");

        let envelope = self
            .inner
            .gateway
            .send(
                self.inner.endpoints.update_method.clone(),
                &self.inner.endpoints.update_path(id),
                Some(&data),
                &self.request_options(),
            )
            .await;
        let outcome = parse_record(&envelope).or_else(|err| match err {
            // Accepted without a body: the confirmed fields plus this change.
            CoreError::UnexpectedResponse { .. } if envelope.success => {
                let base = self.inner.versions.confirmed(id).unwrap_or_else(|| previous.clone());
                let mut confirmed = base.merged(&data);
                confirmed.is_optimistic = false;
                Ok(confirmed)
            }
            other => Err(other),
        });

        let result = self.modify(|state| {
            if !self.inner.versions.is_current(id, token) {
                debug!(%id, "update result is stale, discarding");
                if let Ok(record) = outcome {
                    self.inner.versions.confirm(id, record);
                }
                return None;
            }
            let confirmed = self.inner.versions.finish(id, token);
            let index = state.position(id);
            match outcome {
                Ok(record) => {
                    if let Some(index) = index {
                        state.items[index] = record.clone();
                    }
                    if state.selected.as_ref().is_some_and(|s| s.id == id) {
                        state.selected = Some(record.clone());
                    }
                    Some(record)
                }
                Err(err) => {
                    warn!(%id, error = %err, "update failed, rolling back");
                    if let Some(index) = index {
                        state.items[index] = confirmed.unwrap_or(previous);
                    }
                    state.error = Some(err.to_string());
                    None
                }
            }
        });
        self.end(Activity::Updating, generation);
        result
    }

    // ── Confirmed mutations ──────────────────────────────────────────

    /// Delete an entity. `items` only changes once the server confirms.
    pub async fn delete(&self, id: EntityId) -> bool {
        self.modify(|state| state.error = None);
        let generation = self.begin(Activity::Deleting);
        debug!(%id, "deleting");

        let envelope = self
            .inner
            .gateway
            .delete(&self.inner.endpoints.delete_path(id))
            .await;

        let deleted = match ensure_success(&envelope) {
            Ok(()) => {
                self.modify(|state| {
                    if !self.is_live(generation) {
                        return;
                    }
                    self.inner.versions.forget(id);
                    let before = state.items.len();
                    state.items.retain(|r| r.id != id);
                    if state.items.len() != before {
                        state.pagination.total_items =
                            state.pagination.total_items.saturating_sub(1);
                    }
                    if state.selected.as_ref().is_some_and(|s| s.id == id) {
                        state.selected = None;
                    }
                });
                true
            }
            Err(err) => {
                self.fail(generation, "delete", &err);
                false
            }
        };
        self.end(Activity::Deleting, generation);
        deleted
    }

    /// Upload files to an entity's media collection. The returned media
    /// are appended to `selected` when it is the same entity.
    pub async fn upload_files(
        &self,
        id: EntityId,
        files: Vec<FileHandle>,
        collection: Option<&str>,
    ) -> Option<Vec<MediaRecord>> {
        if files.is_empty() {
            warn!(%id, "upload without files");
            self.modify(|state| state.error = Some(CoreError::NoFiles.to_string()));
            return None;
        }
        let collection = collection
            .unwrap_or(&self.inner.config.default_media_collection)
            .to_owned();
        let mut payload = Payload::new();
        payload.insert(
            UPLOAD_FIELD.into(),
            Value::List(files.into_iter().map(Value::File).collect()),
        );
        payload.insert("collection".into(), Value::Text(collection.clone()));

        self.modify(|state| state.error = None);
        let generation = self.begin(Activity::Updating);
        debug!(%id, %collection, "uploading media");

        let envelope = self
            .inner
            .gateway
            .send(
                Method::POST,
                &self.inner.endpoints.upload_path(id),
                Some(&payload),
                &self.request_options(),
            )
            .await;

        let result = match parse_media(&envelope) {
            Ok(media) => {
                self.modify(|state| {
                    if !self.is_live(generation) {
                        return;
                    }
                    if let Some(selected) = state.selected.as_mut().filter(|s| s.id == id) {
                        selected.append_media(&media, &collection);
                    }
                });
                Some(media)
            }
            Err(err) => {
                self.fail(generation, "upload", &err);
                None
            }
        };
        self.end(Activity::Updating, generation);
        result
    }

    /// Remove one media item. `selected` is patched when it is the same entity.
    pub async fn delete_media(&self, id: EntityId, media_id: u64) -> bool {
        self.modify(|state| state.error = None);
        let generation = self.begin(Activity::Deleting);
        debug!(%id, media_id, "deleting media");

        let envelope = self
            .inner
            .gateway
            .delete(&self.inner.endpoints.media_path(id, media_id))
            .await;

        let deleted = match ensure_success(&envelope) {
            Ok(()) => {
                self.modify(|state| {
                    if !self.is_live(generation) {
                        return;
                    }
                    if let Some(selected) = state.selected.as_mut().filter(|s| s.id == id) {
                        selected.remove_media(media_id);
                    }
                });
                true
            }
            Err(err) => {
                self.fail(generation, "delete media", &err);
                false
            }
        };
        self.end(Activity::Deleting, generation);
        deleted
    }

    // ── Filters and local resets ─────────────────────────────────────

    /// Merge `filters`, go back to page 1 and reload.
    pub async fn set_filters(&self, filters: Filters) {
        self.modify(|state| {
            state.filters.merge(filters);
            state.filters.set_page(1);
        });
        self.list(None).await;
    }

    pub async fn set_page(&self, page: u32) {
        self.modify(|state| state.filters.set_page(page));
        self.list(None).await;
    }

    /// Back to `{page: 1}` (plus the configured `per_page`). No request.
    pub fn clear_filters(&self) {
        let per_page = self.inner.config.per_page;
        self.modify(|state| state.filters = Filters::initial(per_page));
    }

    pub fn clear_error(&self) {
        self.modify(|state| state.error = None);
    }

    /// Return to the initial empty state. Results of requests still in
    /// flight are discarded when they arrive.
    pub fn reset(&self) {
        let per_page = self.inner.config.per_page;
        self.modify(|state| {
            self.inner.versions.clear();
            self.inner.generation.fetch_add(1, Ordering::Relaxed);
            for count in &self.inner.active {
                count.store(0, Ordering::Relaxed);
            }
            *state = StoreState::initial(per_page);
        });
    }

    // ── Internals ────────────────────────────────────────────────────

    /// Apply `f` to the state and notify subscribers. Runs under the
    /// channel's write lock, so version checks inside `f` are atomic with
    /// the change they guard.
    fn modify<R: Default>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        let mut result = None;
        self.inner
            .state
            .send_modify(|state| result = Some(f(Arc::make_mut(state))));
        result.unwrap_or_default()
    }

    /// Raise `activity`'s flag and return the generation the action runs in.
    fn begin(&self, activity: Activity) -> u64 {
        self.modify(|state| {
            self.inner.active[activity.index()].fetch_add(1, Ordering::Relaxed);
            activity.set(&mut state.flags, true);
            self.inner.generation.load(Ordering::Relaxed)
        })
    }

    fn end(&self, activity: Activity, generation: u64) {
        self.modify(|state| {
            if !self.is_live(generation) {
                return;
            }
            let count = &self.inner.active[activity.index()];
            let remaining = count
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_sub(1)))
                .map_or(0, |prev| prev.saturating_sub(1));
            activity.set(&mut state.flags, remaining > 0);
        });
    }

    /// Only meaningful inside `modify`, where `reset()` cannot interleave.
    fn is_live(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::Relaxed) == generation
    }

    fn fail(&self, generation: u64, action: &str, err: &CoreError) {
        warn!(action, entity = %self.inner.endpoints.entity, error = %err, "store action failed");
        let message = err.to_string();
        self.modify(|state| {
            if self.is_live(generation) {
                state.error = Some(message);
            }
        });
    }

    fn not_found(&self, id: EntityId) -> CoreError {
        CoreError::NotFound {
            entity: self.inner.endpoints.entity.clone(),
            identifier: id.to_string(),
        }
    }

    fn request_options(&self) -> RequestOptions {
        RequestOptions::new().encoding(self.inner.config.encoding.clone())
    }
}

// ── Envelope parsing ─────────────────────────────────────────────────

fn ensure_success(envelope: &Envelope) -> Result<(), CoreError> {
    if envelope.success {
        Ok(())
    } else {
        Err(CoreError::Api {
            message: envelope
                .message_or(buildmart_api::error::FALLBACK_MESSAGE)
                .to_owned(),
        })
    }
}

fn unexpected(message: impl Into<String>) -> CoreError {
    CoreError::UnexpectedResponse {
        message: message.into(),
    }
}

fn parse_record(envelope: &Envelope) -> Result<Record, CoreError> {
    ensure_success(envelope)?;
    let data = envelope
        .data
        .clone()
        .ok_or_else(|| unexpected("response carried no record"))?;
    Record::from_json(data).map_err(|e| unexpected(e.to_string()))
}

/// Items plus pagination. Accepts a bare array or a paginator object
/// (`{data: [...], current_page, last_page, total}` or `{data, meta}`).
fn parse_list(envelope: &Envelope) -> Result<(Vec<Record>, Option<Pagination>), CoreError> {
    ensure_success(envelope)?;
    let mut pagination = envelope.meta.map(Pagination::from);
    let items = match envelope.data.clone() {
        None => Json::Array(Vec::new()),
        Some(Json::Object(mut page)) => {
            if pagination.is_none() {
                pagination = page
                    .get("meta")
                    .cloned()
                    .or_else(|| Some(Json::Object(page.clone())))
                    .and_then(|meta| serde_json::from_value::<PageMeta>(meta).ok())
                    .map(Pagination::from);
            }
            page.remove("data")
                .filter(Json::is_array)
                .ok_or_else(|| unexpected("list response has no item array"))?
        }
        Some(other) => other,
    };
    let items = serde_json::from_value(items).map_err(|e| unexpected(e.to_string()))?;
    Ok((items, pagination))
}

/// Uploaded media: a bare array, `{media: [...]}` or `{data: [...]}`.
fn parse_media(envelope: &Envelope) -> Result<Vec<MediaRecord>, CoreError> {
    ensure_success(envelope)?;
    let data = match envelope.data.clone() {
        None => return Ok(Vec::new()),
        Some(Json::Object(mut obj)) => ["media", "data", "files"]
            .iter()
            .find_map(|key| obj.remove(*key))
            .ok_or_else(|| unexpected("upload response has no media list"))?,
        Some(other) => other,
    };
    serde_json::from_value(data).map_err(|e| unexpected(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(body: Json) -> Envelope {
        Envelope::from_body(&body.to_string(), true).unwrap()
    }

    #[test]
    fn list_accepts_bare_arrays() {
        let env = envelope(json!({
            "success": true,
            "data": [{ "id": 1, "name": "a" }, { "id": 2, "name": "b" }],
            "meta": { "current_page": 1, "last_page": 3, "per_page": 2, "total": 6 }
        }));
        let (items, pagination) = parse_list(&env).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(pagination.unwrap().total_pages, 3);
    }

    #[test]
    fn list_accepts_paginator_objects() {
        let env = envelope(json!({
            "success": true,
            "data": {
                "data": [{ "id": 1 }],
                "current_page": 2, "last_page": 2, "per_page": 1, "total": 2
            }
        }));
        let (items, pagination) = parse_list(&env).unwrap();
        assert_eq!(items[0].id, EntityId::Server(1));
        assert_eq!(pagination.unwrap().current_page, 2);
    }

    #[test]
    fn list_failure_carries_the_server_message() {
        let env = envelope(json!({ "success": false, "message": "forbidden" }));
        assert_eq!(parse_list(&env).unwrap_err().to_string(), "forbidden");
    }

    #[test]
    fn record_without_data_is_unexpected() {
        let env = envelope(json!({ "success": true }));
        assert!(matches!(
            parse_record(&env),
            Err(CoreError::UnexpectedResponse { .. })
        ));
    }

    #[test]
    fn media_lists_in_several_shapes() {
        for body in [
            json!({ "success": true, "data": [{ "id": 1 }] }),
            json!({ "success": true, "data": { "media": [{ "id": 1 }] } }),
        ] {
            assert_eq!(parse_media(&envelope(body)).unwrap()[0].id, 1);
        }
    }
}
