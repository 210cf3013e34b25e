//! Configuration loading for litgraph.
//! Reads the file given by `--config` / LITGRAPH_CONFIG, else litgraph.toml
//! from the current directory if present, else built-in defaults.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use litgraph_db::database::{DEFAULT_MAX_CONNECTIONS, DEFAULT_PASSWORD, DEFAULT_URI, DEFAULT_USER};
use litgraph_db::StoreConfig;
use litgraph_ingestion::export::{DEFAULT_PROGRESS_EVERY, DEFAULT_REFERENCES_PATH, DEFAULT_TEXT_PATH};
use litgraph_ingestion::{ExportJob, IngestionJob, DEFAULT_BATCH_SIZE};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "litgraph.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub ingestion: IngestionSection,
    #[serde(default)]
    pub export: ExportSection,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_uri")]
    pub uri: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_uri()             -> String { DEFAULT_URI.to_string() }
fn default_user()            -> String { DEFAULT_USER.to_string() }
fn default_password()        -> String { DEFAULT_PASSWORD.to_string() }
fn default_max_connections() -> usize  { DEFAULT_MAX_CONNECTIONS }

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user: default_user(),
            password: default_password(),
            max_connections: default_max_connections(),
        }
    }
}

impl fmt::Debug for StoreSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSection")
            .field("uri", &self.uri)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionSection {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_read_buffer")]
    pub read_buffer_bytes: usize,
}

fn default_batch_size()       -> usize { DEFAULT_BATCH_SIZE }
fn default_channel_capacity() -> usize { 4 }
fn default_read_buffer()      -> usize { 1 << 20 }

impl Default for IngestionSection {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            channel_capacity: default_channel_capacity(),
            read_buffer_bytes: default_read_buffer(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSection {
    #[serde(default = "default_text_path")]
    pub text_path: PathBuf,
    #[serde(default = "default_references_path")]
    pub references_path: PathBuf,
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,
}

fn default_text_path()       -> PathBuf { PathBuf::from(DEFAULT_TEXT_PATH) }
fn default_references_path() -> PathBuf { PathBuf::from(DEFAULT_REFERENCES_PATH) }
fn default_progress_every()  -> u64     { DEFAULT_PROGRESS_EVERY }

impl Default for ExportSection {
    fn default() -> Self {
        Self {
            text_path: default_text_path(),
            references_path: default_references_path(),
            progress_every: default_progress_every(),
        }
    }
}


impl Config {
    /// Load configuration.
    ///
    /// An explicitly named file must exist. Without one, litgraph.toml is
    /// read when present and the defaults are used otherwise.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let config = match explicit {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                Self::read(path)?
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::read(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ingestion.batch_size == 0 {
            anyhow::bail!("ingestion.batch_size must be at least 1");
        }
        if self.store.max_connections == 0 {
            anyhow::bail!("store.max_connections must be at least 1");
        }
        Ok(())
    }

    /// Store parameters with command-line values taking precedence.
    pub fn store_config(
        &self,
        uri: Option<String>,
        user: Option<String>,
        password: Option<String>,
    ) -> StoreConfig {
        StoreConfig {
            uri: uri.unwrap_or_else(|| self.store.uri.clone()),
            user: user.unwrap_or_else(|| self.store.user.clone()),
            password: SecretString::from(password.unwrap_or_else(|| self.store.password.clone())),
            max_connections: self.store.max_connections,
        }
    }

    pub fn ingestion_job(&self, batch_size: Option<usize>) -> IngestionJob {
        IngestionJob {
            batch_size: batch_size.unwrap_or(self.ingestion.batch_size),
            channel_capacity: self.ingestion.channel_capacity,
            read_buffer_bytes: self.ingestion.read_buffer_bytes,
        }
    }

    pub fn export_job(&self, text_out: Option<PathBuf>, references_out: Option<PathBuf>) -> ExportJob {
        ExportJob {
            text_path: text_out.unwrap_or_else(|| self.export.text_path.clone()),
            references_path: references_out.unwrap_or_else(|| self.export.references_path.clone()),
            progress_every: self.export.progress_every,
        }
    }
}
