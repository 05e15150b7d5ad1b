//! Parsed-table cache persisted as JSON.

use std::fs;
use std::path::{Path, PathBuf};

use regmap_core::{ModelError, RegisterTable};

/// Failure reading or writing a table cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The cache file could not be read or written.
    #[error("{}: {source}", path.display())]
    Io {
        /// Cache path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The cache content is not a serialized table.
    #[error("{}: {source}", path.display())]
    Json {
        /// Cache path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// The cache decodes but its indices do not hold together.
    #[error("{}: {source}", path.display())]
    Invalid {
        /// Cache path.
        path: PathBuf,
        /// Broken index.
        #[source]
        source: ModelError,
    },
}

/// Writes `table` to `path`.
///
/// # Errors
///
/// Returns [`CacheError`] if serialization or the write fails.
pub fn save(table: &RegisterTable, path: &Path) -> Result<(), CacheError> {
    let text = serde_json::to_string(table).map_err(|source| CacheError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, text).map_err(|source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a table written by [`save`].
///
/// # Errors
///
/// Returns [`CacheError`] if the file cannot be read or decoded, or if
/// the decoded table fails [`RegisterTable::validate`].
pub fn load(path: &Path) -> Result<RegisterTable, CacheError> {
    let text = fs::read_to_string(path).map_err(|source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let table: RegisterTable = serde_json::from_str(&text).map_err(|source| CacheError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    table.validate().map_err(|source| CacheError::Invalid {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table_text::parse_table;

    #[test]
    fn round_trip_preserves_table() {
        let table = parse_table(
            "T: core\na 0x0 3 0 s y -2  \"first\"\n<br>\nlabel str d x\nI: 0x0\nH: a\n",
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.json");

        save(&table, &path).unwrap();
        assert_eq!(load(&path).unwrap(), table);
    }

    #[test]
    fn errors_name_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(load(&missing), Err(CacheError::Io { .. })));

        let garbage = dir.path().join("garbage.json");
        fs::write(&garbage, "{not json").unwrap();
        let err = load(&garbage).unwrap_err();
        assert!(matches!(err, CacheError::Json { .. }));
        assert!(err.to_string().contains("garbage.json"));
    }

    #[test]
    fn stale_indices_are_rejected() {
        let table = parse_table("a 0x0 0 0 u y 0\nb 0x4 0 0 u y 0\n").unwrap();
        let mut json: serde_json::Value = serde_json::to_value(&table).unwrap();
        json["slots"][1]["fields"][0] = serde_json::json!(42);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.json");
        fs::write(&path, json.to_string()).unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(
            err,
            CacheError::Invalid {
                source: ModelError::Inconsistent(_),
                ..
            }
        ));
        assert!(err.to_string().contains("stale.json"));
    }
}
