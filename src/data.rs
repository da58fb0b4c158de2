//! Data directory resolution for libpostal.
//!
//! libpostal loads its models from a data directory. The directory comes
//! from the `postal_data_dir` setting when the user applies one, otherwise
//! from [`DataConfig::from_env`] at first use.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Environment variable naming the initial data directory.
pub const DATA_DIR_ENV: &str = "LIBPOSTAL_DATA_DIR";

/// Files libpostal needs to set up the parser and the expander.
const REQUIRED_FILES: [&str; 8] = [
    "address_expansions/address_dictionary.dat",
    "numex/numex.dat",
    "transliteration/transliteration.dat",
    "address_parser/address_parser_crf.dat",
    "address_parser/address_parser_phrases.dat",
    "address_parser/address_parser_postal_codes.dat",
    "address_parser/address_parser_vocab.trie",
    "language_classifier/language_classifier.dat",
];

/// Validate a `postal_data_dir` value.
///
/// Relative paths are joined onto `working_dir`. The result must be an
/// existing directory; its contents are left for libpostal to judge.
///
/// # Errors
///
/// Returns `Error::Configuration` for an empty value or a path that is not
/// an existing directory.
///
/// # Example
///
/// ```rust
/// use duckdb_postal::data::resolve_data_dir;
///
/// let dir = std::env::temp_dir();
/// let resolved = resolve_data_dir(&dir.to_string_lossy(), std::path::Path::new("/"))?;
/// assert_eq!(resolved, dir);
/// # Ok::<(), duckdb_postal::Error>(())
/// ```
pub fn resolve_data_dir(value: &str, working_dir: &Path) -> Result<PathBuf> {
    if value.is_empty() {
        return Err(Error::configuration("postal_data_dir cannot be empty"));
    }

    let path = Path::new(value);
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    };

    if !path.is_dir() {
        return Err(Error::configuration(format!(
            "postal_data_dir does not exist: {}",
            path.display()
        )));
    }

    Ok(path)
}

/// [`resolve_data_dir`] against the process working directory.
pub fn resolve_from_current_dir(value: &str) -> Result<PathBuf> {
    let working_dir = std::env::current_dir()?;
    resolve_data_dir(value, &working_dir)
}

/// Required data files missing from `dir`.
///
/// Only used to explain setup failures.
pub fn missing_files(dir: &Path) -> Vec<&'static str> {
    REQUIRED_FILES
        .iter()
        .copied()
        .filter(|file| !dir.join(file).is_file())
        .collect()
}

/// Get the default data directory for libpostal.
///
/// Checked in order: [`DATA_DIR_ENV`], the directory populated while
/// building libpostal from source, then `<platform data dir>/libpostal`.
/// `None` leaves libpostal on its compiled-in default.
pub fn default_data_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        let path = PathBuf::from(dir);
        if path.is_dir() {
            return Some(path);
        }
        tracing::warn!(
            "{} points to a missing directory: {}",
            DATA_DIR_ENV,
            path.display()
        );
    }

    if let Some(built_data_dir) = option_env!("LIBPOSTAL_BUILT_DATA_DIR") {
        let path = PathBuf::from(built_data_dir);
        if path.is_dir() {
            return Some(path);
        }
    }

    dirs::data_dir()
        .map(|dir| dir.join("libpostal"))
        .filter(|dir| dir.is_dir())
}

/// Where libpostal loads its data from at first use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataConfig {
    /// Data directory, `None` for libpostal's compiled-in default
    pub data_dir: Option<PathBuf>,
}

impl DataConfig {
    /// Configuration from the environment, see [`default_data_dir`].
    pub fn from_env() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_empty_value_rejected() {
        let err = resolve_data_dir("", Path::new("/")).unwrap_err();
        assert_matches!(err, Error::Configuration { .. });
        assert_eq!(err.to_string(), "postal_data_dir cannot be empty");
    }

    #[test]
    fn test_relative_path_joined_onto_working_dir() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("postal")).unwrap();

        let resolved = resolve_data_dir("postal", root.path()).unwrap();
        assert_eq!(resolved, root.path().join("postal"));
        assert!(resolved.is_absolute());
    }

    #[test]
    fn test_absolute_path_kept() {
        let root = tempfile::tempdir().unwrap();
        let value = root.path().to_string_lossy().into_owned();

        let resolved = resolve_data_dir(&value, Path::new("/somewhere/else")).unwrap();
        assert_eq!(resolved, root.path());
    }

    #[test]
    fn test_missing_directory_rejected() {
        let root = tempfile::tempdir().unwrap();
        let err = resolve_data_dir("nope", root.path()).unwrap_err();

        assert_matches!(err, Error::Configuration { .. });
        assert_eq!(
            err.to_string(),
            format!(
                "postal_data_dir does not exist: {}",
                root.path().join("nope").display()
            )
        );
    }

    #[test]
    fn test_file_is_not_a_data_directory() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("file.dat"), b"x").unwrap();

        let err = resolve_data_dir("file.dat", root.path()).unwrap_err();
        assert_matches!(err, Error::Configuration { .. });
    }

    #[test]
    fn test_missing_files_reported() {
        let root = tempfile::tempdir().unwrap();
        assert_eq!(missing_files(root.path()).len(), REQUIRED_FILES.len());

        let numex = root.path().join("numex");
        std::fs::create_dir(&numex).unwrap();
        std::fs::write(numex.join("numex.dat"), b"x").unwrap();

        let missing = missing_files(root.path());
        assert_eq!(missing.len(), REQUIRED_FILES.len() - 1);
        assert!(!missing.contains(&"numex/numex.dat"));
    }

    #[test]
    fn test_data_config_reads_field() {
        let config = DataConfig {
            data_dir: Some(PathBuf::from("/data/libpostal")),
        };
        assert_eq!(config.data_dir(), Some(Path::new("/data/libpostal")));
        assert_eq!(DataConfig::default().data_dir(), None);
    }
}
