// ── Reactive entity store ──
//
// One store per entity type, state published through a `watch` channel.

mod entity_store;
mod state;
mod versions;

pub use entity_store::EntityStore;
pub use state::{Filters, Flags, Pagination, StoreState};
