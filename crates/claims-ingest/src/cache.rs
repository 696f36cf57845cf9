use std::cell::RefCell;
use std::collections::BTreeMap;

use polars::prelude::DataFrame;
use tracing::debug;

use crate::error::Result;
use crate::loader::TableLoader;

/// Load-or-cache wrapper around another loader.
///
/// The first `load` of a name goes to the inner loader; later loads return
/// the cached frame. Failed loads are not cached.
#[derive(Debug)]
pub struct CachedLoader<L> {
    inner: L,
    cache: RefCell<BTreeMap<String, DataFrame>>,
}

impl<L: TableLoader> CachedLoader<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            cache: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.cache.borrow().contains_key(name)
    }

    pub fn cached_names(&self) -> Vec<String> {
        self.cache.borrow().keys().cloned().collect()
    }

    /// Drops every cached table.
    pub fn clear(&self) {
        self.cache.borrow_mut().clear();
    }

    pub fn into_inner(self) -> L {
        self.inner
    }
}

impl<L: TableLoader> TableLoader for CachedLoader<L> {
    fn load(&self, name: &str) -> Result<DataFrame> {
        if let Some(df) = self.cache.borrow().get(name) {
            debug!(table = name, "cache hit");
            return Ok(df.clone());
        }
        let df = self.inner.load(name)?;
        debug!(table = name, rows = df.height(), "cache miss; loaded");
        self.cache.borrow_mut().insert(name.to_string(), df.clone());
        Ok(df)
    }
}
