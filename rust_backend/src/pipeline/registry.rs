//! In-memory registry of assembled collections.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::core::domain::Collection;
use crate::error::{SummaryError, SummaryResult};

/// Collections keyed by name. A name is registered once unless the caller
/// asks to overwrite.
#[derive(Default)]
pub struct CollectionRegistry {
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> SummaryError {
    SummaryError::Registry("registry lock poisoned".to_string())
}

impl CollectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail if `name` is taken and `overwrite` is false.
    pub fn ensure_vacant(&self, name: &str, overwrite: bool) -> SummaryResult<()> {
        if !overwrite && self.collections.read().map_err(poisoned)?.contains_key(name) {
            return Err(SummaryError::Registry(format!(
                "Not clobbering collection {}",
                name
            )));
        }
        Ok(())
    }

    /// Register `collection` under its name.
    ///
    /// The vacancy check and the insert happen under one write lock, so two
    /// concurrent reads of the same name cannot both succeed.
    pub fn insert(&self, collection: Collection, overwrite: bool) -> SummaryResult<Arc<Collection>> {
        self.swap_in(collection, overwrite).map(|(inserted, _)| inserted)
    }

    /// Like [`insert`](Self::insert), also handing back the entry it replaced
    /// so the caller can [`roll_back`](Self::roll_back).
    pub fn swap_in(
        &self,
        collection: Collection,
        overwrite: bool,
    ) -> SummaryResult<(Arc<Collection>, Option<Arc<Collection>>)> {
        let mut map = self.collections.write().map_err(poisoned)?;
        if !overwrite && map.contains_key(&collection.name) {
            return Err(SummaryError::Registry(format!(
                "Not clobbering collection {}",
                collection.name
            )));
        }
        let collection = Arc::new(collection);
        let previous = map.insert(collection.name.clone(), Arc::clone(&collection));
        Ok((collection, previous))
    }

    /// Undo a [`swap_in`](Self::swap_in) of `inserted`, putting `previous`
    /// back. Does nothing if another insert has replaced `inserted` since.
    pub fn roll_back(
        &self,
        inserted: &Arc<Collection>,
        previous: Option<Arc<Collection>>,
    ) -> SummaryResult<()> {
        let mut map = self.collections.write().map_err(poisoned)?;
        let current = map.get(&inserted.name);
        if !current.is_some_and(|c| Arc::ptr_eq(c, inserted)) {
            return Ok(());
        }
        match previous {
            Some(previous) => map.insert(inserted.name.clone(), previous),
            None => map.remove(&inserted.name),
        };
        Ok(())
    }

    pub fn get(&self, name: &str) -> SummaryResult<Option<Arc<Collection>>> {
        Ok(self.collections.read().map_err(poisoned)?.get(name).cloned())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> SummaryResult<Vec<String>> {
        let mut names: Vec<String> = self
            .collections
            .read()
            .map_err(poisoned)?
            .keys()
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn remove(&self, name: &str) -> SummaryResult<Option<Arc<Collection>>> {
        Ok(self.collections.write().map_err(poisoned)?.remove(name))
    }

    pub fn len(&self) -> usize {
        self.collections.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
