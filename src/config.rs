//! Flat key-value configuration with typed accessors.

use std::collections::HashMap;

use crate::error::{RegistrationError, Result};

/// Flat string-keyed option map with typed value lookup.
///
/// Looking up a key that is not present is a configuration error naming the
/// key; at the application level such errors are fatal. Values are stored as
/// strings and parsed on access by the distinct typed accessors.
#[derive(Debug, Clone, Default)]
pub struct ConfigMap {
    options: HashMap<String, String>,
}

impl ConfigMap {
    /// Creates an empty option map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the value stored for the given key.
    pub fn insert(&mut self, key: &str, value: &str) {
        self.options.insert(key.to_string(), value.to_string());
    }

    /// Whether a value is stored for the given key.
    pub fn contains(&self, key: &str) -> bool {
        self.options.contains_key(key)
    }

    /// Looks up a boolean option, stored as `true` or `false`.
    pub fn bool_value(&self, key: &str) -> Result<bool> {
        let value = self.raw_value(key)?;
        value
            .parse()
            .map_err(|_| invalid_value(key, value))
    }

    /// Looks up an integral option.
    pub fn integer_value(&self, key: &str) -> Result<i64> {
        let value = self.raw_value(key)?;
        value
            .parse()
            .map_err(|_| invalid_value(key, value))
    }

    /// Looks up a floating-point option.
    pub fn float_value(&self, key: &str) -> Result<f64> {
        let value = self.raw_value(key)?;
        value
            .parse()
            .map_err(|_| invalid_value(key, value))
    }

    /// Looks up a string option.
    pub fn str_value(&self, key: &str) -> Result<&str> {
        self.raw_value(key)
    }

    /// Verifies that every one of the given required keys is present,
    /// reporting the first missing one.
    pub fn validate_required(&self, required_keys: &[&str]) -> Result<()> {
        match required_keys.iter().find(|&&key| !self.contains(key)) {
            Some(&key) => Err(RegistrationError::Configuration(format!(
                "Required configuration option {:?} is not set",
                key
            ))),
            None => Ok(()),
        }
    }

    fn raw_value(&self, key: &str) -> Result<&str> {
        match self.options.get(key) {
            Some(value) => Ok(value),
            None => Err(RegistrationError::Configuration(format!(
                "Attempt to access non-existent configuration option {:?}",
                key
            ))),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConfigMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(entries: I) -> Self {
        Self {
            options: entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

fn invalid_value(key: &str, value: &str) -> RegistrationError {
    RegistrationError::Configuration(format!(
        "Invalid value {:?} for configuration option {:?}",
        value, key
    ))
}
