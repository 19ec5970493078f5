//! A small dual-source reader: look an entry up by environment variable
//! first, falling back to a dotted-path entry in a parsed TOML document.
//! Mirrors the teacher's `config::provider::Provider`, whose source file
//! the retrieval pack did not keep, but whose call sites (`config/log.rs`,
//! `config/network.rs`, `config/cookbook.rs`) show the exact shape used
//! here.

use std::str::FromStr;

use displaydoc::Display;
use thiserror::Error;
use toml::Value;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// neither env var {0:?} nor toml entry {1:?} was set
    Missing(String, String),
    /// value for {0:?} could not be parsed: {1}
    Parse(String, String),
}

pub struct Provider {
    document: Option<Value>,
}

impl Provider {
    pub fn from_env() -> Self {
        Provider { document: None }
    }

    pub fn from_env_and_toml(raw: &str) -> Result<Self, super::Error> {
        let document: Value = toml::from_str(raw)?;
        Ok(Provider {
            document: Some(document),
        })
    }

    /// Reads `var` from the environment, falling back to `entry` (a
    /// dotted path like `global.database_url`) in the TOML document.
    pub fn read<T>(&self, var: &str, entry: &str) -> Result<T, Error>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.raw(var, entry)
            .ok_or_else(|| Error::Missing(var.to_string(), entry.to_string()))?
            .parse()
            .map_err(|e: T::Err| Error::Parse(entry.to_string(), e.to_string()))
    }

    /// Like `read`, but returns `default` when neither source is set.
    pub fn read_or<T>(&self, var: &str, entry: &str, default: T) -> Result<T, Error>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.raw(var, entry) {
            Some(raw) => raw
                .parse()
                .map_err(|e: T::Err| Error::Parse(entry.to_string(), e.to_string())),
            None => Ok(default),
        }
    }

    fn raw(&self, var: &str, entry: &str) -> Option<String> {
        if let Ok(value) = std::env::var(var) {
            return Some(value);
        }
        let document = self.document.as_ref()?;
        let mut current = document;
        for segment in entry.split('.') {
            current = current.get(segment)?;
        }
        match current {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}
