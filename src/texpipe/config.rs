//! Typed `key=value` settings shared with scripted passes
//!
//! The store is filled once at startup, from `--config key=value` options and
//! from TOML files layered through the `config` crate, and only read after
//! that. Scripts see it as the `config` table.
//!
//! Values are typed by inference: an empty value or `true` is a boolean true,
//! `false` is false, anything that parses completely as a number is a number,
//! and everything else stays a string.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use config::{Config, File, FileFormat, Value, ValueKind};
use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config options must be key=value pairs with a non-empty key: {0:?}")]
    EmptyKey(String),
    #[error("failed to load config file {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },
}

/// A single typed setting
///
/// Scalars from a config file deserialize straight into this, keeping the
/// type TOML gave them: `"3"` stays a string there.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl ConfigValue {
    /// Type a raw option value
    pub fn infer(raw: &str) -> Self {
        match raw {
            "" | "true" => ConfigValue::Bool(true),
            "false" => ConfigValue::Bool(false),
            _ => raw
                .parse::<f64>()
                .map(ConfigValue::Number)
                .unwrap_or_else(|_| ConfigValue::String(raw.to_string())),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(b) => write!(f, "{b}"),
            ConfigValue::Number(n) => write!(f, "{n}"),
            ConfigValue::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        ConfigValue::Number(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

/// Insertion-ordered settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigStore {
    values: IndexMap<String, ConfigValue>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` from a raw string, inferring its type
    pub fn set(&mut self, key: impl Into<String>, raw: &str) {
        self.insert(key, ConfigValue::infer(raw));
    }

    /// Set an already typed value
    pub fn insert(&mut self, key: impl Into<String>, value: ConfigValue) {
        let key = key.into();
        tracing::debug!(%key, %value, "config value set");
        self.values.insert(key, value);
    }

    /// Parse a `key=value` option. A bare `key` is stored as true.
    pub fn set_option(&mut self, option: &str) -> Result<(), ConfigError> {
        let (key, raw) = option.split_once('=').unwrap_or((option, ""));
        if key.is_empty() {
            return Err(ConfigError::EmptyKey(option.to_string()));
        }
        self.set(key, raw);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Layer a TOML file over the current values.
    ///
    /// Nested tables flatten to dotted keys (`[output] dir = "x"` becomes
    /// `output.dir`) and arrays to indexed keys (`list.0`, `list.1`).
    pub fn merge_file(&mut self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let file_error = |source: config::ConfigError| ConfigError::File {
            path: path.to_path_buf(),
            source,
        };
        let loaded = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(true))
            .build()
            .map_err(file_error)?;
        let table = loaded
            .try_deserialize::<HashMap<String, Value>>()
            .map_err(file_error)?;

        let mut flat = Vec::new();
        for (key, value) in table {
            flatten(key, value, &mut flat).map_err(file_error)?;
        }
        // The `config` crate's tables are unordered.
        flat.sort_by(|a, b| a.0.cmp(&b.0));
        tracing::debug!(path = %path.display(), entries = flat.len(), "merged config file");
        for (key, value) in flat {
            self.insert(key, value);
        }
        Ok(())
    }
}

fn flatten(
    prefix: String,
    value: Value,
    out: &mut Vec<(String, ConfigValue)>,
) -> Result<(), config::ConfigError> {
    match value.kind {
        ValueKind::Nil => {}
        ValueKind::Table(table) => {
            for (key, value) in table {
                flatten(format!("{prefix}.{key}"), value, out)?;
            }
        }
        ValueKind::Array(items) => {
            for (index, value) in items.into_iter().enumerate() {
                flatten(format!("{prefix}.{index}"), value, out)?;
            }
        }
        _ => out.push((prefix, value.try_deserialize()?)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[rstest]
    #[case("3.5", ConfigValue::Number(3.5))]
    #[case("-2", ConfigValue::Number(-2.0))]
    #[case("1e3", ConfigValue::Number(1000.0))]
    #[case("true", ConfigValue::Bool(true))]
    #[case("", ConfigValue::Bool(true))]
    #[case("false", ConfigValue::Bool(false))]
    #[case("hello", ConfigValue::String("hello".into()))]
    #[case("3.5cm", ConfigValue::String("3.5cm".into()))]
    #[case("True", ConfigValue::String("True".into()))]
    fn infers_types(#[case] raw: &str, #[case] expected: ConfigValue) {
        assert_eq!(ConfigValue::infer(raw), expected);
    }

    #[test]
    fn options_split_on_first_equals() {
        let mut store = ConfigStore::new();
        store.set_option("x=3.5").unwrap();
        store.set_option("y=true").unwrap();
        store.set_option("z=hello").unwrap();
        store.set_option("w").unwrap();
        store.set_option("eq=a=b").unwrap();
        assert_eq!(store.get("x"), Some(&ConfigValue::Number(3.5)));
        assert_eq!(store.get("y"), Some(&ConfigValue::Bool(true)));
        assert_eq!(store.get("z"), Some(&ConfigValue::String("hello".into())));
        assert_eq!(store.get("w"), Some(&ConfigValue::Bool(true)));
        assert_eq!(store.get("eq").and_then(ConfigValue::as_str), Some("a=b"));
        let keys: Vec<_> = store.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["x", "y", "z", "w", "eq"]);
    }

    #[test]
    fn empty_key_is_rejected() {
        let mut store = ConfigStore::new();
        assert!(matches!(store.set_option("=1"), Err(ConfigError::EmptyKey(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn numbers_display_without_trailing_zeroes() {
        assert_eq!(ConfigValue::infer("2").to_string(), "2");
        assert_eq!(ConfigValue::infer("2.50").to_string(), "2.5");
        assert_eq!(ConfigValue::infer("").to_string(), "true");
    }

    #[test]
    fn merge_file_flattens_tables() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "title = \"Guide\"\ndraft = true\n[output]\nwidth = 80\nratio = 0.5\n"
        )
        .unwrap();
        let mut store = ConfigStore::new();
        store.merge_file(file.path()).unwrap();
        assert_eq!(store.get("title").and_then(ConfigValue::as_str), Some("Guide"));
        assert_eq!(store.get("draft").and_then(ConfigValue::as_bool), Some(true));
        assert_eq!(store.get("output.width").and_then(ConfigValue::as_f64), Some(80.0));
        assert_eq!(store.get("output.ratio").and_then(ConfigValue::as_f64), Some(0.5));
    }

    #[test]
    fn merge_file_keeps_toml_types() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "count = \"3\"\nflag = \"true\"\nsizes = [1, 2]").unwrap();
        let mut store = ConfigStore::new();
        store.merge_file(file.path()).unwrap();
        assert_eq!(store.get("count").and_then(ConfigValue::as_str), Some("3"));
        assert_eq!(store.get("flag").and_then(ConfigValue::as_str), Some("true"));
        assert_eq!(store.get("sizes.1").and_then(ConfigValue::as_f64), Some(2.0));
    }

    #[test]
    fn merge_file_missing_is_an_error() {
        let mut store = ConfigStore::new();
        let err = store.merge_file("/no/such/texpipe.toml").unwrap_err();
        assert!(matches!(err, ConfigError::File { .. }));
    }
}
