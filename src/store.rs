//! Slug-keyed entity collections shared between build jobs.
//!
//! Phase-1 jobs upsert into a store concurrently; the lock is held only for
//! the insert itself. A store remembers whether anything was written during
//! the current run, which is what Phase-2 aggregate jobs consult to decide
//! whether they have work to do.
//!
//! Reading the whole collection requires a [`PhaseReport`], so a snapshot
//! can only be taken once the phase that writes the store has finished.

use crate::scheduler::PhaseReport;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Something that lives in an [`EntityStore`].
pub trait Entity: Clone + Send {
    fn slug(&self) -> &str;
    /// Source file the entity was rendered from.
    fn source(&self) -> &Path;
}

/// How [`EntityStore::snapshot`] orders its result.
pub type SortFn<T> = fn(&T, &T) -> std::cmp::Ordering;

pub struct EntityStore<T: Entity> {
    items: Mutex<HashMap<String, T>>,
    changed: AtomicBool,
    order: SortFn<T>,
}

impl<T: Entity> EntityStore<T> {
    pub fn new(order: SortFn<T>) -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            changed: AtomicBool::new(false),
            order,
        }
    }

    /// Insert or replace by slug. Last write wins.
    pub fn upsert(&self, item: T) {
        let slug = item.slug().to_string();
        self.items.lock().insert(slug, item);
        self.changed.store(true, Ordering::SeqCst);
    }

    /// Whether anything was written (or pruned) since the last reset.
    pub fn changed(&self) -> bool {
        self.changed.load(Ordering::SeqCst)
    }

    pub fn reset_changed(&self) {
        self.changed.store(false, Ordering::SeqCst);
    }

    /// Drop entities whose source is not in `sources`. Returns the removed
    /// slugs; removing anything marks the store changed.
    pub fn retain_sources(&self, sources: &[impl AsRef<Path>]) -> Vec<String> {
        let mut items = self.items.lock();
        let mut removed: Vec<String> = items
            .iter()
            .filter(|(_, item)| !sources.iter().any(|s| s.as_ref() == item.source()))
            .map(|(slug, _)| slug.clone())
            .collect();
        for slug in &removed {
            items.remove(slug);
        }
        if !removed.is_empty() {
            self.changed.store(true, Ordering::SeqCst);
        }
        removed.sort();
        removed
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn get(&self, slug: &str) -> Option<T> {
        self.items.lock().get(slug).cloned()
    }

    /// The complete, ordered collection as of the end of `_phase`.
    pub fn snapshot(&self, _phase: &PhaseReport) -> Vec<T> {
        let mut items: Vec<T> = self.items.lock().values().cloned().collect();
        items.sort_by(self.order);
        items
    }
}
