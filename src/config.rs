//! Configuration types for remote-unpack

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::extraction::DEFAULT_TERMINATE_GRACE;
use crate::protocol::{DEFAULT_MAX_FRAME_LEN, DEFAULT_PROTOCOL_VERSION};

/// Smallest frame limit accepted; every message must be able to carry 64 KiB
pub const MIN_MAX_FRAME_LEN: u32 = 65_535;

/// Listening socket and connection handling
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host name or address to bind (default: "localhost")
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to bind (default: 1337)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Keep serving requests on a connection until the client closes it
    /// (default: true). When false the server closes after one request.
    #[serde(default = "default_true")]
    pub persistent_connections: bool,

    /// Largest accepted frame payload in bytes (default: 16 MiB)
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            persistent_connections: true,
            max_frame_len: default_max_frame_len(),
        }
    }
}

impl ServerConfig {
    /// `host:port` as passed to the socket layer
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// External tool paths
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to unrar executable (auto-detected if None)
    #[serde(default)]
    pub unrar_path: Option<PathBuf>,

    /// Whether to search PATH for unrar if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            unrar_path: None,
            search_path: true,
        }
    }
}

/// Extraction behaviour
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnpackConfig {
    /// Directory every archive is extracted into. When unset, each archive
    /// is extracted next to itself.
    #[serde(default)]
    pub destination: Option<PathBuf>,

    /// Seconds a cancelled extraction gets to exit before it is killed (default: 5)
    #[serde(default = "default_terminate_grace", with = "duration_serde")]
    pub terminate_grace: Duration,

    /// Minimum time between two progress replies, in milliseconds
    /// (None = relay every new percentage)
    #[serde(default, with = "optional_millis_serde")]
    pub progress_interval: Option<Duration>,
}

impl Default for UnpackConfig {
    fn default() -> Self {
        Self {
            destination: None,
            terminate_grace: default_terminate_grace(),
            progress_interval: None,
        }
    }
}

impl UnpackConfig {
    /// Directory an archive is extracted into
    pub fn destination_for(&self, archive: &Path) -> PathBuf {
        match &self.destination {
            Some(dir) => dir.clone(),
            None => archive
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

/// Main configuration
///
/// Every field has a default, so an empty JSON object is a valid
/// configuration file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Listening socket and connection handling
    #[serde(default)]
    pub server: ServerConfig,

    /// The one protocol version the server accepts (default: "RU/0.4")
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,

    /// External tool paths
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Extraction behaviour
    #[serde(default)]
    pub unpack: UnpackConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            protocol_version: default_protocol_version(),
            tools: ToolsConfig::default(),
            unpack: UnpackConfig::default(),
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file
    ///
    /// The result is validated before it is returned.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&contents).map_err(|e| Error::Config {
            message: format!("invalid configuration in {}: {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that serde cannot check on its own
    pub fn validate(&self) -> Result<()> {
        if self.protocol_version.trim().is_empty() {
            return Err(Error::config(
                "protocol_version",
                "protocol version must not be empty",
            ));
        }
        if self.server.host.trim().is_empty() {
            return Err(Error::config("server.host", "host must not be empty"));
        }
        if self.server.port == 0 {
            return Err(Error::config("server.port", "port must not be 0"));
        }
        if self.server.max_frame_len < MIN_MAX_FRAME_LEN {
            return Err(Error::config(
                "server.max_frame_len",
                format!(
                    "max_frame_len must be at least {} bytes, got {}",
                    MIN_MAX_FRAME_LEN, self.server.max_frame_len
                ),
            ));
        }
        Ok(())
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1337
}

fn default_true() -> bool {
    true
}

fn default_max_frame_len() -> u32 {
    DEFAULT_MAX_FRAME_LEN
}

fn default_protocol_version() -> String {
    DEFAULT_PROTOCOL_VERSION.to_string()
}

fn default_terminate_grace() -> Duration {
    DEFAULT_TERMINATE_GRACE
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper (milliseconds)
mod optional_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
