//! Immutable, ordered set of payload variants served to users.

pub mod loader;

use serde_json::value::RawValue;

use crate::assignment::assign;
use crate::error::{PolyglotError, Result};

/// One named unit of payload content, kept as the exact JSON it was loaded as.
#[derive(Debug)]
pub struct PayloadVariant {
    name: String,
    content: Box<RawValue>,
}

impl PayloadVariant {
    pub fn new(name: impl Into<String>, content: Box<RawValue>) -> Self {
        Self {
            name: name.into(),
            content,
        }
    }

    /// Build a variant from a JSON string, validating it.
    pub fn from_json(name: impl Into<String>, json: impl Into<String>) -> Result<Self> {
        let content = RawValue::from_string(json.into())?;
        Ok(Self::new(name, content))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content(&self) -> &RawValue {
        &self.content
    }
}

/// Ordered payload variants. Index `i` refers to the same variant for the
/// life of the store, and the store is never empty.
#[derive(Debug)]
pub struct PayloadStore {
    variants: Vec<PayloadVariant>,
}

impl PayloadStore {
    /// Load every payload under `dir`. See [`loader::load_dir`].
    pub fn build(dir: impl AsRef<std::path::Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let variants = loader::load_dir(dir)?;
        if variants.is_empty() {
            return Err(PolyglotError::NoPayloads {
                path: dir.to_path_buf(),
            });
        }
        Ok(Self { variants })
    }

    /// Build a store from variants already in memory, keeping their order.
    pub fn from_variants(variants: Vec<PayloadVariant>) -> Result<Self> {
        if variants.is_empty() {
            return Err(PolyglotError::NoPayloads {
                path: "<memory>".into(),
            });
        }
        Ok(Self { variants })
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    /// Always false for a constructed store.
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PayloadVariant> {
        self.variants.get(index)
    }

    pub fn variants(&self) -> &[PayloadVariant] {
        &self.variants
    }

    /// The variant `key` is assigned to.
    pub fn select(&self, key: &str) -> &PayloadVariant {
        &self.variants[assign(key, self.variants.len())]
    }
}
