//! Recorder configuration
//!
//! Settings come from an optional JSON file; every section and field falls
//! back to its default when missing.

mod schema;

use std::path::Path;

use tracing::info;

pub use schema::*;

use crate::error::{AppError, Result};

/// Load and validate a configuration file
pub fn load(path: &Path) -> Result<RecorderConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        AppError::Config(format!("Failed to read config {}: {}", path.display(), e))
    })?;
    let config: RecorderConfig = serde_json::from_str(&contents)?;
    config.validate()?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recorder.json");

        let mut config = RecorderConfig::default();
        config.device.source = SourceKind::TestPattern;
        config.max_frames = Some(27);
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        assert_eq!(load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = load(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load(&path), Err(AppError::Serialization(_))));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odd.json");
        std::fs::write(&path, r#"{ "device": { "width": 33 } }"#).unwrap();
        assert!(matches!(load(&path), Err(AppError::Config(_))));
    }
}
