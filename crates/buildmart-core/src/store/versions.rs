// ── Mutation version tokens ──
//
// Each optimistic create/update takes a token for its entity. Only the
// holder of the latest token may apply a success or a rollback; older
// holders find their token superseded and drop their result.
//
// Next to the token sits the last value the server has vouched for. A
// rollback restores that, never another mutation's unconfirmed copy.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::model::{EntityId, Record};

#[derive(Debug)]
struct Slot {
    token: u64,
    /// `None` for entities the server has never seen (optimistic creates).
    confirmed: Option<Record>,
}

#[derive(Debug, Default)]
pub(crate) struct Versions {
    next: AtomicU64,
    slots: DashMap<EntityId, Slot>,
}

impl Versions {
    /// Issue a new token for `id`, superseding any earlier one.
    ///
    /// `current` becomes the confirmed value only when no other mutation of
    /// `id` is outstanding; otherwise the value already held is kept.
    pub(crate) fn begin(&self, id: EntityId, current: Option<&Record>) -> u64 {
        let token = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        self.slots
            .entry(id)
            .and_modify(|slot| slot.token = token)
            .or_insert_with(|| Slot {
                token,
                confirmed: current.cloned(),
            });
        token
    }

    pub(crate) fn is_current(&self, id: EntityId, token: u64) -> bool {
        self.slots.get(&id).is_some_and(|slot| slot.token == token)
    }

    /// Last value the server confirmed for `id` while mutations are pending.
    pub(crate) fn confirmed(&self, id: EntityId) -> Option<Record> {
        self.slots.get(&id).and_then(|slot| slot.confirmed.clone())
    }

    /// Record a server answer that arrived for a superseded token. It is not
    /// shown, but a later rollback falls back to it.
    pub(crate) fn confirm(&self, id: EntityId, record: Record) {
        if let Some(mut slot) = self.slots.get_mut(&id) {
            slot.confirmed = Some(record);
        }
    }

    /// Release `token` if nothing newer was issued for `id`, handing back
    /// the confirmed value.
    pub(crate) fn finish(&self, id: EntityId, token: u64) -> Option<Record> {
        self.slots
            .remove_if(&id, |_, slot| slot.token == token)
            .and_then(|(_, slot)| slot.confirmed)
    }

    /// Invalidate every outstanding token for `id`.
    pub(crate) fn forget(&self, id: EntityId) {
        self.slots.remove(&id);
    }

    pub(crate) fn clear(&self) {
        self.slots.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}
