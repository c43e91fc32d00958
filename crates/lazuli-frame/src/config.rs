use std::path::Path;

use serde::Deserialize;

use crate::{DataFrameError, Result};

/// Tuning knobs for the bundled evaluator.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Rows handed to a file writer per call when sinking.
    pub sink_batch_size: usize,
    /// Record batch size used by Parquet scans.
    pub parquet_batch_size: usize,
    /// Rows sampled for CSV schema inference when a scan does not set it.
    pub csv_infer_schema_length: usize,
    /// Log the optimized plan (debug level) before every evaluation.
    pub log_plans: bool,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            sink_batch_size: 8_192,
            parquet_batch_size: 65_536,
            csv_infer_schema_length: 100,
            log_plans: false,
        }
    }
}

impl EvaluatorConfig {
    /// Load config from TOML and environment variables.
    ///
    /// Environment variables use the `LAZULI__` prefix with `__` separators,
    /// e.g. `LAZULI__SINK_BATCH_SIZE=1024`. Without a path, `lazuli.toml` in
    /// the working directory is read if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        } else {
            builder = builder.add_source(config::File::with_name("lazuli").required(false));
        }
        builder = builder.add_source(config::Environment::with_prefix("LAZULI").separator("__"));
        let config: EvaluatorConfig = builder
            .build()
            .map_err(|err| DataFrameError::configuration("evaluator", err.to_string()))?
            .try_deserialize()
            .map_err(|err| DataFrameError::configuration("evaluator", err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config invariants.
    pub fn validate(&self) -> Result<()> {
        if self.sink_batch_size == 0 {
            return Err(DataFrameError::configuration(
                "sink_batch_size",
                "must be greater than 0",
            ));
        }
        if self.parquet_batch_size == 0 {
            return Err(DataFrameError::configuration(
                "parquet_batch_size",
                "must be greater than 0",
            ));
        }
        if self.csv_infer_schema_length == 0 {
            return Err(DataFrameError::configuration(
                "csv_infer_schema_length",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::EvaluatorConfig;
    use crate::DataFrameError;

    #[test]
    fn loads_values_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lazuli.toml");
        std::fs::write(&path, "sink_batch_size = 128\nlog_plans = true\n").unwrap();

        let config = EvaluatorConfig::load(Some(&path)).unwrap();
        assert_eq!(config.sink_batch_size, 128);
        assert!(config.log_plans);
        assert_eq!(config.parquet_batch_size, 65_536);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EvaluatorConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, EvaluatorConfig::default());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lazuli.toml");
        std::fs::write(&path, "parquet_batch_size = 0\n").unwrap();

        let err = EvaluatorConfig::load(Some(&path)).unwrap_err();
        match err {
            DataFrameError::Configuration { option, .. } => {
                assert_eq!(option, "parquet_batch_size")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
