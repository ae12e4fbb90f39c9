// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration of a pipeline.
//!
//! [`PipelineConfig`] holds the bounds the core applies when waiting on the
//! native layer. It can be built in code or loaded from a JSON document;
//! missing fields take their default value.
//!
//! # Examples
//!
//! ```
//! use mmal::config::PipelineConfig;
//!
//! # fn main() -> Result<(), mmal::Error> {
//! let config = PipelineConfig::from_json(r#"{ "drain_timeout_ms": 250 }"#)?;
//! assert_eq!(config.drain_timeout().as_millis(), 250);
//! assert_eq!(config.force_stop_grace_ms, PipelineConfig::default().force_stop_grace_ms);
//! # Ok(())
//! # }
//! ```

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// How long a port waits for its buffers to return when disabled.
    pub drain_timeout_ms: u64,
    /// How long a cancelled capture waits for ports to observe the force
    /// stop before resolving them directly.
    pub force_stop_grace_ms: u64,
    /// How long feeding an input port waits for a free buffer.
    pub input_wait_ms: u64,
    /// Delay between enabling a capture and starting the source.
    pub warm_up_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            drain_timeout_ms: 5_000,
            force_stop_grace_ms: 2_000,
            input_wait_ms: 2_000,
            warm_up_ms: 0,
        }
    }
}

impl PipelineConfig {
    /// Parses a configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if the document is malformed.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::Io`] if the file cannot be read
    /// - [`crate::Error::Config`] if the document is malformed
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn force_stop_grace(&self) -> Duration {
        Duration::from_millis(self.force_stop_grace_ms)
    }

    pub fn input_wait(&self) -> Duration {
        Duration::from_millis(self.input_wait_ms)
    }

    pub fn warm_up(&self) -> Duration {
        Duration::from_millis(self.warm_up_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = PipelineConfig::from_json("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn malformed_documents_are_reported() {
        let err = PipelineConfig::from_json("{ \"drain_timeout_ms\": \"soon\" }").unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = PipelineConfig::from_path("/nonexistent/pipeline.json").unwrap_err();
        assert!(matches!(err, crate::Error::Io(_)));
    }

    #[test]
    fn json_round_trip() {
        let config = PipelineConfig {
            warm_up_ms: 100,
            ..PipelineConfig::default()
        };
        let text = config.to_json().unwrap();
        assert_eq!(PipelineConfig::from_json(&text).unwrap(), config);
    }
}
