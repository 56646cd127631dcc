//! Configuration key store.
//!
//! An ordered list of named settings the central system can read with
//! GetConfiguration and write with ChangeConfiguration. Keys are fixed at
//! construction; only values change.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationKey {
    pub key: String,
    pub readonly: bool,
    pub value: String,
}

impl ConfigurationKey {
    pub fn new(key: impl Into<String>, readonly: bool, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            readonly,
            value: value.into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ConfigurationStore {
    entries: Vec<ConfigurationKey>,
}

impl ConfigurationStore {
    pub fn new(entries: Vec<ConfigurationKey>) -> Self {
        Self { entries }
    }

    /// All entries, in insertion order.
    pub fn entries(&self) -> &[ConfigurationKey] {
        &self.entries
    }

    /// Set the value of the first entry with a matching key. An unknown key
    /// is silently ignored; the protocol reply is Accepted either way.
    pub fn change(&mut self, key: &str, value: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.key == key) {
            entry.value = value.to_string();
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.value.as_str())
    }
}
