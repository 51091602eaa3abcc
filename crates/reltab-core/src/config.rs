//! Engine configuration that downstream crates can serialize/deserialize.
//!
//! Operators take their options explicitly. When built without options they
//! snapshot [`EngineConfig::global`], which is the built-in default unless a
//! binary installed its own value once at startup.

use std::path::PathBuf;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::Value;

static GLOBAL: OnceCell<EngineConfig> = OnceCell::new();

/// Per-row error policy shared by all mapping operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailOnError {
    /// Replace the failed field with the configured error value (field
    /// mapping) or drop the failed row's output (row mapping), then continue.
    #[default]
    Substitute,
    /// Propagate the error, ending the iteration.
    Propagate,
    /// Emit the error itself as the field or row value and continue.
    Inline,
}

impl std::str::FromStr for FailOnError {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "false" | "substitute" => Ok(FailOnError::Substitute),
            "true" | "propagate" => Ok(FailOnError::Propagate),
            "inline" => Ok(FailOnError::Inline),
            other => Err(Error::Config(format!("unknown fail_on_error policy {other:?}"))),
        }
    }
}

/// Spill compression, mirrored by the mem crate's codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpillCodec {
    #[default]
    None,
    Zstd,
    Lz4,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Max rows held in memory per sort chunk before spilling.
    pub buffer_rows: usize,

    /// Optional byte budget per sort chunk; a chunk spills at whichever
    /// bound it hits first.
    pub buffer_bytes: Option<usize>,

    /// Directory for sort spill segments. `None` means the platform temp dir.
    pub temp_dir: Option<PathBuf>,

    /// Keep sorted segments across iterations of a sort and only re-merge.
    pub sort_cache: bool,

    /// Max segments merged at once; more segments trigger intermediate passes.
    pub merge_fan_in: usize,

    pub spill_codec: SpillCodec,

    pub fail_on_error: FailOnError,

    /// Value substituted for failed fields under [`FailOnError::Substitute`].
    pub error_value: Value,

    /// Value returned for fields beyond the end of a short row.
    pub missing: Value,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_rows: 100_000,
            buffer_bytes: None,
            temp_dir: None,
            sort_cache: true,
            merge_fan_in: 64,
            spill_codec: SpillCodec::None,
            fail_on_error: FailOnError::Substitute,
            error_value: Value::Missing,
            missing: Value::Missing,
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `RELTAB_BUFFER_ROWS`: rows per sort chunk
    /// - `RELTAB_BUFFER_BYTES`: byte budget per sort chunk
    /// - `RELTAB_TEMP_DIR`: spill directory
    /// - `RELTAB_SORT_CACHE`: `true`/`false`
    /// - `RELTAB_MERGE_FAN_IN`: max segments per merge pass
    /// - `RELTAB_FAIL_ON_ERROR`: `substitute`, `propagate` or `inline`
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("RELTAB_BUFFER_ROWS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.buffer_rows = v;
            }
        }

        if let Ok(s) = std::env::var("RELTAB_BUFFER_BYTES") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.buffer_bytes = Some(v);
            }
        }

        if let Ok(s) = std::env::var("RELTAB_TEMP_DIR") {
            cfg.temp_dir = Some(PathBuf::from(s));
        }

        if let Ok(s) = std::env::var("RELTAB_SORT_CACHE") {
            if let Ok(v) = s.parse::<bool>() {
                cfg.sort_cache = v;
            }
        }

        if let Ok(s) = std::env::var("RELTAB_MERGE_FAN_IN") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.merge_fan_in = v;
            }
        }

        if let Ok(s) = std::env::var("RELTAB_FAIL_ON_ERROR") {
            if let Ok(v) = s.parse::<FailOnError>() {
                cfg.fail_on_error = v;
            }
        }

        cfg
    }

    /// Reject settings no operator can work with.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_rows == 0 {
            return Err(Error::Config("buffer_rows must be at least 1".into()));
        }
        if self.merge_fan_in < 2 {
            return Err(Error::Config("merge_fan_in must be at least 2".into()));
        }
        if self.buffer_bytes == Some(0) {
            return Err(Error::Config("buffer_bytes must be positive".into()));
        }
        Ok(())
    }

    /// Install the process-wide default. Succeeds once; later calls fail.
    pub fn install_global(cfg: EngineConfig) -> Result<()> {
        cfg.validate()?;
        GLOBAL
            .set(cfg)
            .map_err(|_| Error::Config("global engine config already installed".into()))
    }

    /// The installed process-wide default, or the built-in default.
    pub fn global() -> &'static EngineConfig {
        GLOBAL.get_or_init(EngineConfig::default)
    }
}
