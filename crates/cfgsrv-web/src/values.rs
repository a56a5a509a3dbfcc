//! Read access to a mounted backing store.
//!
//! The directory holds one file per key; each file holds the JSON-encoded
//! value. Kubernetes ConfigMap volumes add hidden `..data` and
//! `..<timestamp>` entries and expose keys as symlinks, so hidden entries are
//! skipped and symlinks are followed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use jmespath::Expression;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Expression selecting the whole document.
pub const SELECT_ALL: &str = "*";

/// Failure to serve a value.
#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    /// No file exists for the key.
    #[error("Key '{0}' not found")]
    NotFound(String),

    /// The stored value does not parse as JSON.
    #[error("Failed to load values for key '{key}': not valid JSON ({reason})")]
    InvalidJson { key: String, reason: String },

    /// The query expression does not compile or cannot be evaluated.
    #[error("Invalid query '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },

    /// The directory or a file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The blocking scan did not complete.
    #[error("Query task failed: {0}")]
    Task(String),
}

/// Directory of mounted values.
#[derive(Debug, Clone)]
pub struct ValueDirectory {
    root: PathBuf,
}

impl ValueDirectory {
    /// Serve values from `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory the values are read from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Raw stored bytes of `key`, checked to be valid JSON.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no regular file exists for the key and
    /// `InvalidJson` when its contents do not parse.
    pub async fn read_raw(&self, key: &str) -> Result<Vec<u8>, ValueError> {
        let path = self.root.join(key);
        let bytes = match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => tokio::fs::read(&path)
                .await
                .map_err(|source| ValueError::Io { path, source })?,
            Ok(_) => return Err(ValueError::NotFound(key.to_string())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ValueError::NotFound(key.to_string()));
            }
            Err(source) => return Err(ValueError::Io { path, source }),
        };

        serde_json::from_slice::<Value>(&bytes).map_err(|err| ValueError::InvalidJson {
            key: key.to_string(),
            reason: err.to_string(),
        })?;
        Ok(bytes)
    }

    /// Evaluate `expression` against every stored value.
    ///
    /// The result maps each key to its match; keys without a match are left
    /// out. Values that do not parse are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns `InvalidExpression` when the expression does not compile and
    /// `Io` when the directory cannot be listed.
    pub async fn query(&self, expression: String) -> Result<Map<String, Value>, ValueError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || scan(&root, &expression))
            .await
            .map_err(|err| ValueError::Task(err.to_string()))?
    }

    /// Evaluate `expression` against the value of one key.
    ///
    /// # Errors
    ///
    /// Same as [`read_raw`](Self::read_raw), plus `InvalidExpression` when the
    /// expression does not compile or cannot be applied to the value.
    pub async fn query_key(
        &self,
        key: &str,
        expression: String,
    ) -> Result<Map<String, Value>, ValueError> {
        let bytes = self.read_raw(key).await?;
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let compiled = compile(&expression)?;
            let mut matches = Map::new();
            let document: Value =
                serde_json::from_slice(&bytes).map_err(|err| ValueError::InvalidJson {
                    key: key.clone(),
                    reason: err.to_string(),
                })?;
            if let Some(found) = evaluate(&compiled, &expression, document)? {
                matches.insert(key, found);
            }
            Ok(matches)
        })
        .await
        .map_err(|err| ValueError::Task(err.to_string()))?
    }
}

fn compile(expression: &str) -> Result<Expression<'static>, ValueError> {
    jmespath::compile(expression).map_err(|err| ValueError::InvalidExpression {
        expression: expression.to_string(),
        reason: err.to_string(),
    })
}

/// Match of `compiled` in `document`, or `None` when the match is empty.
fn evaluate(
    compiled: &Expression<'_>,
    expression: &str,
    document: Value,
) -> Result<Option<Value>, ValueError> {
    let invalid = |reason: String| ValueError::InvalidExpression {
        expression: expression.to_string(),
        reason,
    };
    let found = compiled.search(document).map_err(|err| invalid(err.to_string()))?;
    let found = serde_json::to_value(&*found).map_err(|err| invalid(err.to_string()))?;
    Ok((!is_empty_match(&found)).then_some(found))
}

fn is_empty_match(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        _ => false,
    }
}

/// Key and path of a directory entry that may hold a value.
///
/// Unreadable entries, hidden files and non UTF-8 names are skipped.
fn value_entry(root: &Path, entry: io::Result<fs::DirEntry>) -> Option<(String, PathBuf)> {
    let entry = match entry {
        Ok(entry) => entry,
        Err(err) => {
            warn!(directory = %root.display(), error = %err, "Skipping unreadable directory entry");
            return None;
        }
    };
    let key = entry.file_name().to_str()?.to_string();
    if key.starts_with('.') {
        return None;
    }
    Some((key, entry.path()))
}

fn scan(root: &Path, expression: &str) -> Result<Map<String, Value>, ValueError> {
    let compiled = compile(expression)?;
    let entries = fs::read_dir(root).map_err(|source| ValueError::Io {
        path: root.to_path_buf(),
        source,
    })?;

    let mut matches = Map::new();
    for entry in entries {
        let Some((key, path)) = value_entry(root, entry) else {
            continue;
        };
        if !fs::metadata(&path).is_ok_and(|meta| meta.is_file()) {
            continue;
        }

        let document = match fs::read(&path)
            .map_err(|err| err.to_string())
            .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).map_err(|err| err.to_string()))
        {
            Ok(document) => document,
            Err(reason) => {
                warn!(key, reason, "Skipping unreadable value");
                continue;
            }
        };

        match evaluate(&compiled, expression, document) {
            Ok(Some(found)) => {
                matches.insert(key, found);
            }
            Ok(None) => {}
            Err(err) => debug!(key, error = %err, "Query does not apply to value"),
        }
    }
    Ok(matches)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::indexing_slicing)]

    use super::*;
    use serde_json::json;

    fn directory(files: &[(&str, &str)]) -> (tempfile::TempDir, ValueDirectory) {
        let dir = tempfile::tempdir().unwrap();
        for (name, contents) in files {
            fs::write(dir.path().join(name), contents).unwrap();
        }
        let values = ValueDirectory::new(dir.path());
        (dir, values)
    }

    #[test]
    fn test_empty_matches() {
        assert!(is_empty_match(&json!(null)));
        assert!(is_empty_match(&json!([])));
        assert!(is_empty_match(&json!({})));
        assert!(!is_empty_match(&json!(false)));
        assert!(!is_empty_match(&json!(0)));
        assert!(!is_empty_match(&json!("")));
    }

    #[tokio::test]
    async fn test_read_raw_returns_stored_bytes() {
        let (_dir, values) = directory(&[("test", r#"{"foo": "bar"}"#)]);
        let bytes = values.read_raw("test").await.unwrap();
        assert_eq!(bytes, br#"{"foo": "bar"}"#);
    }

    #[tokio::test]
    async fn test_read_raw_errors() {
        let (dir, values) = directory(&[("broken", "something: not json")]);
        fs::create_dir(dir.path().join("nested")).unwrap();

        assert!(matches!(values.read_raw("missing").await, Err(ValueError::NotFound(_))));
        assert!(matches!(values.read_raw("nested").await, Err(ValueError::NotFound(_))));
        assert!(matches!(
            values.read_raw("broken").await,
            Err(ValueError::InvalidJson { .. })
        ));
    }

    #[tokio::test]
    async fn test_query_skips_hidden_and_broken_files() {
        let (dir, values) = directory(&[
            ("a", r#"{"foo": "bar"}"#),
            ("b", r#"{"other": 1}"#),
            ("broken", "not json"),
            ("..data", r#"{"foo": "hidden"}"#),
        ]);
        fs::create_dir(dir.path().join("..2024_01_01")).unwrap();

        let matches = values.query("foo".to_string()).await.unwrap();
        assert_eq!(Value::Object(matches), json!({"a": "bar"}));
    }

    #[test]
    fn test_unreadable_entries_are_skipped() {
        let (dir, _values) = directory(&[("a", "1"), (".hidden", "2")]);

        let failed = value_entry(dir.path(), Err(io::Error::other("stale handle")));
        assert!(failed.is_none());

        let mut keys: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| value_entry(dir.path(), entry))
            .map(|(key, _)| key)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_query_select_all() {
        let (_dir, values) = directory(&[("a", r#"{"foo": "bar"}"#), ("n", "null")]);
        let matches = values.query(SELECT_ALL.to_string()).await.unwrap();
        assert_eq!(Value::Object(matches), json!({"a": ["bar"]}));
    }

    #[tokio::test]
    async fn test_query_rejects_bad_expression() {
        let (_dir, values) = directory(&[("a", "{}")]);
        let err = values.query("foo[".to_string()).await.unwrap_err();
        assert!(matches!(err, ValueError::InvalidExpression { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_values_are_followed() {
        let (dir, values) = directory(&[("..target", r#"{"foo": "linked"}"#)]);
        std::os::unix::fs::symlink(dir.path().join("..target"), dir.path().join("linked"))
            .unwrap();

        let matches = values.query("foo".to_string()).await.unwrap();
        assert_eq!(Value::Object(matches), json!({"linked": "linked"}));
        assert!(values.read_raw("linked").await.is_ok());
    }

    #[tokio::test]
    async fn test_query_key() {
        let (_dir, values) = directory(&[("a", r#"{"foo": {"bar": [1, 2]}}"#)]);

        let matches = values.query_key("a", "foo.bar[0]".to_string()).await.unwrap();
        assert_eq!(Value::Object(matches), json!({"a": 1}));

        let matches = values.query_key("a", "nothing".to_string()).await.unwrap();
        assert!(matches.is_empty());

        assert!(matches!(
            values.query_key("missing", SELECT_ALL.to_string()).await,
            Err(ValueError::NotFound(_))
        ));
    }
}
