//! Reactive data layer between `buildmart-api` and UI consumers (CLI, apps).
//!
//! - **[`EntityStore`]**: holds the list/detail view of one entity type and
//!   mediates create/update/delete through the [`Gateway`]. Creates and
//!   updates are applied optimistically and rolled back on failure; each
//!   optimistic mutation carries a version token so a late, stale response
//!   can never clobber a newer one. Deletes wait for the server.
//!
//! - **[`StateStream`]**: subscription handle over the store's
//!   `tokio::sync::watch` channel, with `current()` / `latest()` /
//!   `changed()` for reactive rendering.
//!
//! - **Domain model** ([`model`]): [`Record`] keeps business fields opaque;
//!   [`EntityId`] distinguishes server ids from optimistic placeholders.
//!
//! - **[`Endpoints`]**: the route table a store talks to.
//!   [`Endpoints::products()`] is the product catalog.

pub mod config;
pub mod endpoints;
pub mod error;
pub mod model;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use buildmart_api::{Envelope, FileHandle, FileRule, Gateway, Method, Payload, Value};
pub use config::{ClientConfig, StoreConfig, TlsVerification};
pub use endpoints::Endpoints;
pub use error::CoreError;
pub use model::{EntityId, MediaRecord, Record};
pub use store::{EntityStore, Filters, Flags, Pagination, StoreState};
pub use stream::StateStream;
