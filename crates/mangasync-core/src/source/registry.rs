//! Lookup of providers by source id at dispatch time.

use std::collections::HashMap;
use std::sync::Arc;

use super::{SourceId, SourceProvider};

#[derive(Clone, Default)]
pub struct SourceRegistry {
    providers: HashMap<SourceId, Arc<dyn SourceProvider>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the provider for `source`.
    pub fn register(&mut self, source: SourceId, provider: Arc<dyn SourceProvider>) {
        if self.providers.insert(source, provider).is_some() {
            tracing::debug!(source_id = %source, "replaced source provider");
        }
    }

    pub fn with(mut self, source: SourceId, provider: Arc<dyn SourceProvider>) -> Self {
        self.register(source, provider);
        self
    }

    pub fn get(&self, source: SourceId) -> Option<Arc<dyn SourceProvider>> {
        self.providers.get(&source).cloned()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.providers.keys().copied().collect();
        ids.sort();
        f.debug_struct("SourceRegistry").field("sources", &ids).finish()
    }
}
