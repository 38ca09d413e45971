use std::path::PathBuf;
use std::time::Duration;

use image::ImageFormat;
use regex::Regex;

use crate::error::CoreError;
use crate::fs_guard::normalize;
use crate::image_probe::parse_output_format;

/// Default file-name filter: common generator output formats.
pub const DEFAULT_FILE_FILTER: &str = r"(?i)\.(png|jpe?g|webp)$";

/// Default quiet period before an ingestion cycle runs.
pub const DEFAULT_DEBOUNCE_MS: u64 = 1000;

/// Default number of files probed concurrently within one cycle.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Ingestion configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Directory watched for generated files (default: `./generated`).
    pub watch_dir: PathBuf,
    /// Regex matched against file names; non-matching files are ignored.
    pub file_filter: Regex,
    /// Quiet period after the last matching event (default: 1000 ms).
    pub debounce: Duration,
    /// Upper bound on concurrent per-file work in one cycle (default: 4).
    pub concurrency: usize,
    /// Stored representation; files in other formats are transcoded.
    pub canonical_format: Option<ImageFormat>,
    /// Longest edge allowed in the stored representation; larger images
    /// are downsized into the derived directory.
    pub canonical_max_edge: Option<u32>,
    /// Where transcoded copies are written (default: sibling `derived/`).
    /// Never the watched directory itself.
    pub derived_dir: PathBuf,
}

impl IngestConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var              | Default                       |
    /// |----------------------|-------------------------------|
    /// | `WATCH_DIR`          | `./generated`                 |
    /// | `WATCH_FILTER`       | `(?i)\.(png\|jpe?g\|webp)$`   |
    /// | `DEBOUNCE_MS`        | `1000`                        |
    /// | `INGEST_CONCURRENCY` | `4`                           |
    /// | `CANONICAL_FORMAT`   | unset                         |
    /// | `CANONICAL_MAX_EDGE` | unset                         |
    /// | `DERIVED_DIR`        | `<WATCH_DIR>/../derived`      |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let watch_dir = PathBuf::from(lookup("WATCH_DIR").unwrap_or_else(|| "./generated".into()));

        let pattern = lookup("WATCH_FILTER").unwrap_or_else(|| DEFAULT_FILE_FILTER.into());
        let file_filter = Regex::new(&pattern)
            .map_err(|e| CoreError::Validation(format!("WATCH_FILTER is not a valid regex: {e}")))?;

        let debounce_ms: u64 = parse_or(&lookup, "DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS)?;
        if debounce_ms == 0 {
            return Err(CoreError::Validation("DEBOUNCE_MS must be positive".into()));
        }

        let concurrency: usize = parse_or(&lookup, "INGEST_CONCURRENCY", DEFAULT_CONCURRENCY)?;
        if concurrency == 0 {
            return Err(CoreError::Validation(
                "INGEST_CONCURRENCY must be at least 1".into(),
            ));
        }

        let canonical_format = match lookup("CANONICAL_FORMAT").filter(|s| !s.trim().is_empty()) {
            Some(name) => Some(parse_output_format(&name).ok_or_else(|| {
                CoreError::Validation(format!(
                    "CANONICAL_FORMAT '{name}' is not one of: png, jpeg, webp"
                ))
            })?),
            None => None,
        };

        let canonical_max_edge = match lookup("CANONICAL_MAX_EDGE").filter(|s| !s.trim().is_empty()) {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(edge) if edge > 0 => Some(edge),
                _ => {
                    return Err(CoreError::Validation(format!(
                        "CANONICAL_MAX_EDGE must be a positive integer, got '{raw}'"
                    )))
                }
            },
            None => None,
        };

        let derived_dir = lookup("DERIVED_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| watch_dir.join("..").join("derived"));
        // Derived copies written into the watched directory would be picked
        // up again as new pictures.
        if let (Some(watch), Some(derived)) = (normalize(&watch_dir), normalize(&derived_dir)) {
            if watch == derived {
                return Err(CoreError::Validation(format!(
                    "DERIVED_DIR must differ from WATCH_DIR ({})",
                    watch.display()
                )));
            }
        }

        Ok(Self {
            watch_dir,
            file_filter,
            debounce: Duration::from_millis(debounce_ms),
            concurrency,
            canonical_format,
            canonical_max_edge,
            derived_dir,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, CoreError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CoreError::Validation(format!("{key} must be a non-negative integer, got '{raw}'"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<IngestConfig, CoreError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        IngestConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.watch_dir, PathBuf::from("./generated"));
        assert_eq!(config.debounce, Duration::from_millis(1000));
        assert_eq!(config.concurrency, 4);
        assert!(config.canonical_format.is_none());
        assert!(config.canonical_max_edge.is_none());
        assert!(config.file_filter.is_match("a.PNG"));
        assert!(config.file_filter.is_match("b.jpeg"));
        assert!(!config.file_filter.is_match("c.txt"));
        assert_eq!(config.derived_dir, PathBuf::from("./generated/../derived"));
    }

    #[test]
    fn overrides() {
        let config = config_from(&[
            ("WATCH_DIR", "/srv/out"),
            ("WATCH_FILTER", r"\.png$"),
            ("DEBOUNCE_MS", "250"),
            ("INGEST_CONCURRENCY", "8"),
            ("CANONICAL_FORMAT", "webp"),
            ("CANONICAL_MAX_EDGE", "2048"),
            ("DERIVED_DIR", "/srv/derived"),
        ])
        .unwrap();
        assert_eq!(config.watch_dir, PathBuf::from("/srv/out"));
        assert_eq!(config.debounce, Duration::from_millis(250));
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.canonical_format, Some(ImageFormat::WebP));
        assert_eq!(config.canonical_max_edge, Some(2048));
        assert_eq!(config.derived_dir, PathBuf::from("/srv/derived"));
        assert!(!config.file_filter.is_match("a.jpg"));
    }

    #[test]
    fn bad_regex_rejected() {
        assert_matches!(
            config_from(&[("WATCH_FILTER", "(")]),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn zero_concurrency_rejected() {
        assert_matches!(
            config_from(&[("INGEST_CONCURRENCY", "0")]),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn non_numeric_debounce_rejected() {
        assert_matches!(
            config_from(&[("DEBOUNCE_MS", "soon")]),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn unknown_canonical_format_rejected() {
        assert_matches!(
            config_from(&[("CANONICAL_FORMAT", "gif")]),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn blank_canonical_format_means_unset() {
        let config = config_from(&[("CANONICAL_FORMAT", "  ")]).unwrap();
        assert!(config.canonical_format.is_none());
    }

    #[test]
    fn zero_max_edge_rejected() {
        assert_matches!(
            config_from(&[("CANONICAL_MAX_EDGE", "0")]),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn derived_dir_equal_to_watch_dir_rejected() {
        assert_matches!(
            config_from(&[("WATCH_DIR", "/srv/out"), ("DERIVED_DIR", "/srv/out")]),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            config_from(&[("WATCH_DIR", "/srv/out"), ("DERIVED_DIR", "/srv/x/../out/.")]),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn derived_dir_below_watch_dir_allowed() {
        let config = config_from(&[("WATCH_DIR", "/srv/out"), ("DERIVED_DIR", "/srv/out/derived")])
            .unwrap();
        assert_eq!(config.derived_dir, PathBuf::from("/srv/out/derived"));
    }
}
