use std::collections::BTreeMap;

use crate::model::{
    normalize_category_id, Item, MasterList, PendingDeleteEntry, PendingMoveEntry, StoredPending,
    FALLBACK_CATEGORY_NAME,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ToggleOutcome {
    Staged,
    Cleared,
    /// The item already sits in the requested category and nothing was staged for it.
    AlreadyInCategory,
}

/// Staged moves and deletes keyed by item id.
///
/// The two maps are disjoint: staging one kind of change for an item clears the other.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PendingChangeStore {
    moves: BTreeMap<String, PendingMoveEntry>,
    deletes: BTreeMap<String, PendingDeleteEntry>,
}

fn target_name(master: &MasterList, target_id: &str, cached: Option<&str>) -> String {
    master
        .section_name(target_id)
        .or(cached.filter(|name| !name.is_empty()))
        .unwrap_or(FALLBACK_CATEGORY_NAME)
        .to_string()
}

impl PendingChangeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores persisted entries, resolving each against `master` before it becomes visible.
    pub fn from_stored(stored: StoredPending, master: &MasterList) -> Self {
        let mut store = Self::new();
        for entry in stored.moves {
            if entry.item_id.is_empty() {
                continue;
            }
            store.moves.insert(entry.item_id.clone(), entry);
        }
        for entry in stored.deletes {
            if entry.item_id.is_empty() {
                continue;
            }
            store.moves.remove(&entry.item_id);
            store.deletes.insert(entry.item_id.clone(), entry);
        }
        store.reconcile(master);
        store
    }

    pub fn to_stored(&self) -> StoredPending {
        StoredPending {
            moves: self.moves.values().cloned().collect(),
            deletes: self.deletes.values().cloned().collect(),
        }
    }

    pub fn toggle_move(
        &mut self,
        item: &Item,
        target_category_id: &str,
        master: &MasterList,
    ) -> ToggleOutcome {
        let target_id = normalize_category_id(Some(target_category_id));
        let staged = self.moves.get(&item.id);
        if staged.is_some_and(|entry| entry.target_category_id == target_id) {
            self.moves.remove(&item.id);
            return ToggleOutcome::Cleared;
        }
        if staged.is_none() && normalize_category_id(item.category_id.as_deref()) == target_id {
            return ToggleOutcome::AlreadyInCategory;
        }

        self.deletes.remove(&item.id);
        let entry = PendingMoveEntry {
            item_id: item.id.clone(),
            item_name: item.name.clone(),
            target_category_name: target_name(master, &target_id, None),
            target_category_id: target_id,
        };
        self.moves.insert(item.id.clone(), entry);
        ToggleOutcome::Staged
    }

    pub fn toggle_delete(&mut self, item: &Item) -> ToggleOutcome {
        self.moves.remove(&item.id);
        if self.deletes.remove(&item.id).is_some() {
            return ToggleOutcome::Cleared;
        }
        self.deletes.insert(
            item.id.clone(),
            PendingDeleteEntry {
                item_id: item.id.clone(),
                item_name: item.name.clone(),
            },
        );
        ToggleOutcome::Staged
    }

    /// Re-derives every entry from a fresh authoritative list.
    ///
    /// Entries whose item vanished are dropped; the rest pick up current item and target
    /// category names. Returns whether anything changed.
    pub fn reconcile(&mut self, master: &MasterList) -> bool {
        let mut moves = BTreeMap::new();
        for entry in self.moves.values() {
            let Some(item) = master.find_item(&entry.item_id) else {
                continue;
            };
            let target_id = normalize_category_id(Some(&entry.target_category_id));
            let rebuilt = PendingMoveEntry {
                item_id: item.id.clone(),
                item_name: item.name.clone(),
                target_category_name: target_name(
                    master,
                    &target_id,
                    Some(&entry.target_category_name),
                ),
                target_category_id: target_id,
            };
            moves.insert(rebuilt.item_id.clone(), rebuilt);
        }

        let mut deletes = BTreeMap::new();
        for entry in self.deletes.values() {
            let Some(item) = master.find_item(&entry.item_id) else {
                continue;
            };
            deletes.insert(
                entry.item_id.clone(),
                PendingDeleteEntry {
                    item_id: entry.item_id.clone(),
                    item_name: item.name.clone(),
                },
            );
        }

        let changed = moves != self.moves || deletes != self.deletes;
        self.moves = moves;
        self.deletes = deletes;
        changed
    }

    /// Unstages whatever is recorded for the item.
    pub fn remove(&mut self, item_id: &str) -> bool {
        let had_move = self.moves.remove(item_id).is_some();
        let had_delete = self.deletes.remove(item_id).is_some();
        had_move || had_delete
    }

    pub fn remove_move(&mut self, item_id: &str) -> bool {
        self.moves.remove(item_id).is_some()
    }

    pub fn remove_delete(&mut self, item_id: &str) -> bool {
        self.deletes.remove(item_id).is_some()
    }

    pub fn moves(&self) -> impl Iterator<Item = &PendingMoveEntry> {
        self.moves.values()
    }

    pub fn deletes(&self) -> impl Iterator<Item = &PendingDeleteEntry> {
        self.deletes.values()
    }

    pub fn staged_move(&self, item_id: &str) -> Option<&PendingMoveEntry> {
        self.moves.get(item_id)
    }

    pub fn is_staged_for_delete(&self, item_id: &str) -> bool {
        self.deletes.contains_key(item_id)
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.moves.contains_key(item_id) || self.deletes.contains_key(item_id)
    }

    pub fn len(&self) -> usize {
        self.moves.len() + self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty() && self.deletes.is_empty()
    }
}
