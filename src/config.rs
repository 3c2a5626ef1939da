// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the settings file that epsword uses to simplify the
//! process of serialization and deserialization. Apart from
//! [`Settings::load`], file I/O is left to the caller to figure out.
//!
//! # General Layout
//!
//! ```toml
//! base_url = "https://epub-test.uni-regensburg.de"
//! live_url = "https://epub.uni-regensburg.de"
//! verify_tls = false
//! home_institution = "01eezs655"
//!
//! [staleness]
//! policy = "hour"
//! remote_offset_hours = 0
//! ```
//!
//! Every key is optional. Missing keys take their default value.

use crate::reconcile::stale::ComparisonPolicy;

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

/// Default server used for deposits.
pub const DEFAULT_BASE_URL: &str = "https://epub-test.uni-regensburg.de";

/// Server used when the live switch is on.
pub const DEFAULT_LIVE_URL: &str = "https://epub.uni-regensburg.de";

/// ROR identifier of the institution that counts as "created here".
pub const DEFAULT_HOME_INSTITUTION: &str = "01eezs655";

/// Settings layout.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Repository server to deposit into.
    pub base_url: String,

    /// Repository server to deposit into when the live switch is on.
    pub live_url: String,

    /// Verify TLS certificates of the server.
    pub verify_tls: bool,

    /// Institution identifier that marks an experiment as created here.
    pub home_institution: String,

    /// Timestamp comparison used by the staleness check.
    pub staleness: StalenessSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            live_url: DEFAULT_LIVE_URL.into(),
            verify_tls: false,
            home_institution: DEFAULT_HOME_INSTITUTION.into(),
            staleness: StalenessSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from target path.
    ///
    /// A missing settings file is not an error, default settings are used
    /// instead.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if settings file exists but cannot be
    ///   read.
    /// - Return [`ConfigError::Deserialize`] if settings file is malformed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("no settings at {:?}, using defaults", path.display());
            return Ok(Self::default());
        }

        debug!("load settings from {:?}", path.display());
        read_to_string(path)
            .map_err(|err| ConfigError::Read {
                source: err,
                path: path.to_path_buf(),
            })?
            .parse()
    }

    /// Switch to live server.
    ///
    /// Certificates of the live server are always verified.
    pub fn use_live_server(&mut self) {
        self.base_url = self.live_url.clone();
        self.verify_tls = true;
    }

    /// Base URL without trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Host part of base URL, used to look up netrc credentials.
    pub fn host(&self) -> &str {
        let url = self.base_url();
        let url = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .unwrap_or(url);
        url.split('/').next().unwrap_or(url)
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        toml::de::from_str(data).map_err(ConfigError::Deserialize)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Staleness check settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StalenessSettings {
    /// Granularity both timestamps are truncated to before comparing.
    pub policy: ComparisonPolicy,

    /// Offset in hours applied to remote timestamps that carry no zone.
    pub remote_offset_hours: i8,
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read settings file.
    #[error("failed to read settings at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize settings.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize settings.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
