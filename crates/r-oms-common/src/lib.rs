//! ---
//! oms_section: "01-core-functionality"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Shared primitives and utilities for the pipeline runtime."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
//! Core shared primitives for the R-OMS pipeline workspace.
//! This crate exposes configuration loading, logging bootstrap, and
//! timestamp parsing utilities consumed across the workspace.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    AppConfig, ArchiveConfig, LoggingConfig, MetricsConfig, Mode, PipelineConfig, RetryConfig,
    SimulationConfig,
};
pub use logging::{init_tracing, LogFormat};
pub use time::{parse_timestamp, parse_timestamp_str};
