// ── Domain model ──
//
// The store is generic over business fields, so the model is small:
// identity, an opaque record, and the media records uploads return.

pub mod entity_id;
pub mod media;
pub mod record;

pub use entity_id::{EntityId, ParseEntityIdError};
pub use media::MediaRecord;
pub use record::Record;
