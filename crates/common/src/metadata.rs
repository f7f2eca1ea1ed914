//! Key/value annotations on nodes.
//!
//! The live scope belongs to the node and is mutable. Each version carries
//! its own copy taken when the version was appended; that copy lives on the
//! [`Version`](crate::version::Version) and is never written again.

use std::collections::{BTreeMap, HashMap};

use crate::error::EngineError;
use crate::uid::Uid;

pub type MetadataMap = BTreeMap<String, String>;

pub fn validate_key(key: &str) -> Result<(), EngineError> {
    if key.is_empty() {
        return Err(EngineError::InvalidArgument(
            "metadata key must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct MetadataStore {
    nodes: HashMap<Uid, MetadataMap>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key, returning the previous value
    pub fn set(&mut self, uid: Uid, key: String, value: String) -> Option<String> {
        self.nodes.entry(uid).or_default().insert(key, value)
    }

    pub fn get(&self, uid: &Uid, key: &str) -> Option<&String> {
        self.nodes.get(uid).and_then(|entries| entries.get(key))
    }

    /// Copy of the whole live scope (empty if nothing was ever set)
    pub fn all(&self, uid: &Uid) -> MetadataMap {
        self.nodes.get(uid).cloned().unwrap_or_default()
    }

    pub fn delete(&mut self, uid: &Uid, key: &str) -> Option<String> {
        let entries = self.nodes.get_mut(uid)?;
        let removed = entries.remove(key);
        if entries.is_empty() {
            self.nodes.remove(uid);
        }
        removed
    }

    /// Replace the whole live scope (copy and snapshot restore)
    pub fn replace(&mut self, uid: Uid, entries: MetadataMap) {
        if entries.is_empty() {
            self.nodes.remove(&uid);
        } else {
            self.nodes.insert(uid, entries);
        }
    }

    pub fn remove_node(&mut self, uid: &Uid) -> Option<MetadataMap> {
        self.nodes.remove(uid)
    }
}
