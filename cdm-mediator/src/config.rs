//! Mediator runtime configuration.

use std::path::PathBuf;

use cdm_core::MessageStandard;

/// Mediator configuration.
#[derive(Debug, Clone)]
pub struct MediatorConfig {
    /// Standard every input message is read as.
    pub source_standard: MessageStandard,
    /// Semantic configuration document imported at startup.
    pub config_path: Option<PathBuf>,
    /// NDJSON input; stdin when absent.
    pub input_path: Option<PathBuf>,
    /// Where to export the semantic configuration after import.
    pub export_path: Option<PathBuf>,
    /// Run the golden-sample regression before processing.
    pub run_regression: bool,
    /// Max messages converted at once.
    pub max_concurrency: usize,
    /// Max input line size in bytes.
    pub max_line_size: usize,
}

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            source_standard: MessageStandard::MilStd6016,
            config_path: None,
            input_path: None,
            export_path: None,
            run_regression: false,
            max_concurrency: 16,
            max_line_size: 1024 * 1024, // 1MB
        }
    }
}

impl MediatorConfig {
    /// Config for input in `standard`.
    pub fn with_standard(standard: MessageStandard) -> Self {
        Self {
            source_standard: standard,
            ..Default::default()
        }
    }

    /// Import a semantic configuration at startup.
    pub fn with_config(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    /// Read input from a file instead of stdin.
    pub fn with_input(mut self, path: PathBuf) -> Self {
        self.input_path = Some(path);
        self
    }

    /// Export the semantic configuration.
    pub fn with_export(mut self, path: PathBuf) -> Self {
        self.export_path = Some(path);
        self
    }

    /// Enable the golden-sample regression.
    pub fn with_regression(mut self, enabled: bool) -> Self {
        self.run_regression = enabled;
        self
    }

    /// At least one conversion always runs.
    pub fn with_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Set the max input line size.
    pub fn with_max_line_size(mut self, bytes: usize) -> Self {
        self.max_line_size = bytes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = MediatorConfig::default();
        assert_eq!(config.source_standard, MessageStandard::MilStd6016);
        assert!(config.config_path.is_none());
        assert_eq!(config.max_concurrency, 16);
    }

    #[test]
    fn custom_config() {
        let config = MediatorConfig::with_standard(MessageStandard::MavLink)
            .with_config(PathBuf::from("semantic.yaml"))
            .with_concurrency(0)
            .with_regression(true);

        assert_eq!(config.source_standard, MessageStandard::MavLink);
        assert_eq!(config.config_path, Some(PathBuf::from("semantic.yaml")));
        assert_eq!(config.max_concurrency, 1);
        assert!(config.run_regression);
    }
}
