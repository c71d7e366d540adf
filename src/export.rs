//! Log bundle export
//!
//! The host's file-save capability sits behind [`ExportSink`]. A failed write
//! is reported back to the caller once and never retried.

use crate::error::VibeflowError;
use crate::history::LogBundle;
use std::fs;
use std::path::PathBuf;

/// Default file name offered to the save dialog
pub const DEFAULT_EXPORT_NAME: &str = "vibeflow-logs.json";

/// Destination for an exported bundle
pub trait ExportSink {
    /// Write `contents` and return where it went
    fn save(&mut self, suggested_name: &str, contents: &str) -> Result<String, VibeflowError>;
}

/// Writes the bundle to a fixed path
#[derive(Debug, Clone)]
pub struct FileExportSink {
    path: PathBuf,
}

impl FileExportSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ExportSink for FileExportSink {
    fn save(&mut self, _suggested_name: &str, contents: &str) -> Result<String, VibeflowError> {
        fs::write(&self.path, contents)
            .map_err(|e| VibeflowError::Export(format!("Failed to write {}: {}", self.path.display(), e)))?;
        Ok(self.path.display().to_string())
    }
}

/// Keeps the last export in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryExportSink {
    pub last: Option<(String, String)>,
}

impl ExportSink for MemoryExportSink {
    fn save(&mut self, suggested_name: &str, contents: &str) -> Result<String, VibeflowError> {
        self.last = Some((suggested_name.to_string(), contents.to_string()));
        Ok(format!("memory://{}", suggested_name))
    }
}

/// Render a bundle as the export document
pub fn render_bundle(bundle: &LogBundle) -> Result<String, VibeflowError> {
    serde_json::to_string_pretty(bundle).map_err(|e| VibeflowError::Export(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_bundle() -> LogBundle {
        LogBundle {
            history: vec![],
            moods: vec![],
            events: vec![],
        }
    }

    #[test]
    fn test_render_bundle_has_three_sections() {
        let rendered = render_bundle(&empty_bundle()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert!(value["history"].is_array());
        assert!(value["moods"].is_array());
        assert!(value["events"].is_array());
    }

    #[test]
    fn test_file_sink_writes_file() {
        let path = std::env::temp_dir().join(format!("vibeflow-export-{}.json", uuid::Uuid::new_v4()));
        let mut sink = FileExportSink::new(&path);
        let location = sink.save(DEFAULT_EXPORT_NAME, "{}").unwrap();

        assert_eq!(location, path.display().to_string());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_file_sink_reports_failure() {
        let path = std::env::temp_dir()
            .join(format!("vibeflow-missing-{}", uuid::Uuid::new_v4()))
            .join("out.json");
        let result = FileExportSink::new(path).save(DEFAULT_EXPORT_NAME, "{}");
        assert!(matches!(result, Err(VibeflowError::Export(_))));
    }
}
