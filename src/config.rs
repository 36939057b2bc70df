//! Configuration for artifact generation and differential runs.
//!
//! Values are layered: built-in defaults, then an optional JSON file, then
//! `UMAC_*` environment variables, then whatever the caller (usually the CLI)
//! sets explicitly.  Each source is read into a [`ConfigLayer`]; later layers
//! win field by field.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use zeroize::Zeroizing;

/// Master key used when none is configured.
pub const DEFAULT_KEY: &[u8] = b"abcdefghijklmnop";
/// Nonce used when none is configured.
pub const DEFAULT_NONCE: &[u8] = b"bcdefghi";
/// Random pairs checked per differential run by default.
pub const DEFAULT_TRIALS: u64 = 100_000;
/// Per-response timeout for external candidates by default.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    /// The configuration file could not be read.
    Read {
        /// File that was requested.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode config {path}: {source}")]
    /// The configuration file is not valid JSON for [`ConfigLayer`].
    Parse {
        /// File that was requested.
        path: PathBuf,
        /// Decoder failure.
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for {field}: {reason}")]
    /// A value was present but unusable.
    Invalid {
        /// Setting name (JSON field or environment variable).
        field: String,
        /// What was wrong with it.
        reason: String,
    },
}

fn invalid(field: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// One source of optional settings.
///
/// Text and hex forms of the key (and of the nonce) are alternatives: a
/// layer that sets either one replaces both from lower layers.  Within a
/// single layer the hex form takes precedence.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    /// Master key as raw text.
    pub key: Option<String>,
    /// Master key as hex.
    pub key_hex: Option<String>,
    /// Nonce as raw text.
    pub nonce: Option<String>,
    /// Nonce as hex.
    pub nonce_hex: Option<String>,
    /// Directory generated artifacts are written to.
    pub out_dir: Option<PathBuf>,
    /// Random pairs per differential run.
    pub trials: Option<u64>,
    /// Seed of the random phase.
    pub seed: Option<u64>,
    /// Per-response timeout in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl fmt::Debug for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key_set = self.key.is_some() || self.key_hex.is_some();
        f.debug_struct("ConfigLayer")
            .field("key", &key_set.then_some("<redacted>"))
            .field("nonce", &self.nonce)
            .field("nonce_hex", &self.nonce_hex)
            .field("out_dir", &self.out_dir)
            .field("trials", &self.trials)
            .field("seed", &self.seed)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl ConfigLayer {
    /// Reads a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads the `UMAC_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`Self::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |name: &str| -> Result<Option<u64>, ConfigError> {
            lookup(name)
                .map(|v| v.trim().parse::<u64>().map_err(|err| invalid(name, err)))
                .transpose()
        };
        Ok(Self {
            key: lookup("UMAC_KEY"),
            key_hex: lookup("UMAC_KEY_HEX"),
            nonce: lookup("UMAC_NONCE"),
            nonce_hex: lookup("UMAC_NONCE_HEX"),
            out_dir: lookup("UMAC_OUT_DIR").map(PathBuf::from),
            trials: number("UMAC_MULMOD_TRIALS")?,
            seed: number("UMAC_MULMOD_SEED")?,
            timeout_ms: number("UMAC_MULMOD_TIMEOUT_MS")?,
        })
    }

    /// Overlays `over` on top of `self`.
    pub fn merge(mut self, over: ConfigLayer) -> Self {
        if over.key.is_some() || over.key_hex.is_some() {
            self.key = over.key;
            self.key_hex = over.key_hex;
        }
        if over.nonce.is_some() || over.nonce_hex.is_some() {
            self.nonce = over.nonce;
            self.nonce_hex = over.nonce_hex;
        }
        self.out_dir = over.out_dir.or(self.out_dir);
        self.trials = over.trials.or(self.trials);
        self.seed = over.seed.or(self.seed);
        self.timeout_ms = over.timeout_ms.or(self.timeout_ms);
        self
    }
}

fn bytes_from(
    field: &str,
    text: Option<&String>,
    hex_text: Option<&String>,
) -> Result<Option<Vec<u8>>, ConfigError> {
    match (hex_text, text) {
        (Some(h), _) => hex::decode(h.trim())
            .map(Some)
            .map_err(|err| invalid(&format!("{field}_hex"), err)),
        (None, Some(t)) => Ok(Some(t.as_bytes().to_vec())),
        (None, None) => Ok(None),
    }
}

/// Inputs for header and test-vector generation.
#[derive(Clone)]
pub struct GeneratorConfig {
    /// Master key.
    pub key: Zeroizing<Vec<u8>>,
    /// Nonce for the pads.
    pub nonce: Vec<u8>,
    /// Output directory.
    pub out_dir: PathBuf,
}

impl fmt::Debug for GeneratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorConfig")
            .field("key", &"<redacted>")
            .field("nonce", &hex::encode(&self.nonce))
            .field("out_dir", &self.out_dir)
            .finish()
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            key: Zeroizing::new(DEFAULT_KEY.to_vec()),
            nonce: DEFAULT_NONCE.to_vec(),
            out_dir: PathBuf::from("."),
        }
    }
}

impl GeneratorConfig {
    /// Applies `layer` over the defaults.
    ///
    /// Key and nonce lengths are checked later by the derivation functions.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for malformed hex.
    pub fn resolve(layer: &ConfigLayer) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(key) = bytes_from("key", layer.key.as_ref(), layer.key_hex.as_ref())? {
            config.key = Zeroizing::new(key);
        }
        if let Some(nonce) = bytes_from("nonce", layer.nonce.as_ref(), layer.nonce_hex.as_ref())? {
            config.nonce = nonce;
        }
        if let Some(dir) = &layer.out_dir {
            config.out_dir = dir.clone();
        }
        Ok(config)
    }
}

/// Settings for a differential `mulmod` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Random pairs checked after the boundary pairs.
    pub trials: u64,
    /// Seed of the random phase.
    pub seed: u64,
    /// How long to wait for each external response.
    pub response_timeout: Duration,
}

impl Default for HarnessConfig {
    /// Uses a fresh random seed.
    fn default() -> Self {
        Self {
            trials: DEFAULT_TRIALS,
            seed: rand::random(),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }
}

impl HarnessConfig {
    /// Applies `layer` over the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero timeout.
    pub fn resolve(layer: &ConfigLayer) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(trials) = layer.trials {
            config.trials = trials;
        }
        if let Some(seed) = layer.seed {
            config.seed = seed;
        }
        if let Some(ms) = layer.timeout_ms {
            if ms == 0 {
                return Err(invalid("timeout_ms", "must be positive"));
            }
            config.response_timeout = Duration::from_millis(ms);
        }
        Ok(config)
    }
}
