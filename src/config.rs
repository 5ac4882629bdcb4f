//! Application configuration.
//!
//! All tunables live in one [`AppConfig`] struct built via its
//! [`AppConfigBuilder`]. Keeping every knob in one place makes it trivial to
//! share the config across handlers (it sits in the server state behind an
//! `Arc`), log it at startup, and diff two runs to understand why their
//! outputs differ.

use crate::error::ReportError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the export/crop/combine service.
///
/// Built via [`AppConfig::builder()`] or [`AppConfig::default()`].
///
/// # Example
/// ```rust
/// use dashstitch::AppConfig;
///
/// let config = AppConfig::builder()
///     .dpi(150)
///     .upload_dir("uploads")
///     .cleanup_delay_secs(60)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory for exported PDFs and intermediate PNGs. Default: `uploads`.
    pub upload_dir: PathBuf,

    /// Directory for combined report artifacts. Default: `output`.
    pub output_dir: PathBuf,

    /// Rasterisation DPI for exported dashboard PDFs. Range: 72–400. Default: 200.
    ///
    /// Dashboard exports are a single page of mostly large text and charts;
    /// 200 DPI keeps small axis labels legible after cropping without
    /// producing multi-megapixel intermediates.
    pub dpi: u32,

    /// Fallback BI server URL when the login request does not name one.
    pub default_server_url: String,

    /// Per-request timeout for BI server calls, in seconds. Default: 30.
    ///
    /// The transport default would let a hung server call block the whole
    /// workflow step indefinitely; a bounded timeout surfaces it as a
    /// network error instead.
    pub http_timeout_secs: u64,

    /// Delay before intermediate files are removed after a combine, in
    /// seconds. Default: 30.
    ///
    /// Cleanup is deliberately deferred so an in-progress download of the
    /// final artifact can complete before the file disappears.
    pub cleanup_delay_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("output"),
            dpi: 200,
            default_server_url: "https://prod-in-a.online.tableau.com".to_string(),
            http_timeout_secs: 30,
            cleanup_delay_secs: 30,
        }
    }
}

impl AppConfig {
    /// Create a new builder for `AppConfig`.
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder {
            config: Self::default(),
        }
    }

    /// Create the working directories if they do not exist yet.
    pub fn ensure_dirs(&self) -> Result<(), ReportError> {
        for dir in [&self.upload_dir, &self.output_dir] {
            std::fs::create_dir_all(dir).map_err(|e| ReportError::io(dir.clone(), e))?;
        }
        Ok(())
    }
}

/// Builder for [`AppConfig`].
#[derive(Debug)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    pub fn upload_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.upload_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.output_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn default_server_url(mut self, url: impl Into<String>) -> Self {
        self.config.default_server_url = url.into();
        self
    }

    pub fn http_timeout_secs(mut self, secs: u64) -> Self {
        self.config.http_timeout_secs = secs.max(1);
        self
    }

    pub fn cleanup_delay_secs(mut self, secs: u64) -> Self {
        self.config.cleanup_delay_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AppConfig, ReportError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(ReportError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.upload_dir == c.output_dir {
            return Err(ReportError::InvalidConfig(
                "upload_dir and output_dir must differ (cleanup would race the artifact)".into(),
            ));
        }
        Ok(self.config)
    }
}
