// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Helpers shared by the capture examples.

use std::path::Path;

use mmal::config::PipelineConfig;
use tracing::info;

/// Logs to stdout at INFO unless `RUST_LOG` says otherwise.
pub fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();
}

/// Loads the pipeline configuration from `path`, or the defaults without one.
pub fn load_pipeline_config(path: Option<&Path>) -> mmal::Result<PipelineConfig> {
    match path {
        Some(path) => {
            info!("Loading pipeline configuration from {}.", path.display());
            PipelineConfig::from_path(path)
        }
        None => Ok(PipelineConfig::default()),
    }
}
