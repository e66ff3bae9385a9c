//! Configuration system for the `LedgerChat` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/ledgerchat/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::chat::ChatConfig;
use crate::session::{AuthMode, IdentityMode, SessionFile};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    chat: ChatFileConfig,
    identity: IdentityFileConfig,
    session: SessionFileConfig,
    ui: UiFileConfig,
}

/// `[chat]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ChatFileConfig {
    store_timeout_secs: Option<u64>,
    event_buffer: Option<usize>,
    max_message_size: Option<usize>,
    encrypt_by_default: Option<bool>,
}

/// `[identity]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct IdentityFileConfig {
    identity_mode: Option<IdentityMode>,
    auth_mode: Option<AuthMode>,
}

/// `[session]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    path: Option<PathBuf>,
}

/// `[ui]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct UiFileConfig {
    timestamp_format: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Identity --
    /// Local username to sign up or sign in as.
    pub username: Option<String>,
    /// Username of the peer to chat with.
    pub peer: Option<String>,
    /// One wallet per user, or several.
    pub identity_mode: IdentityMode,
    /// Username/email login or seed login.
    pub auth_mode: AuthMode,

    // -- Chat --
    /// Conversation view settings (store timeout, size limit, event buffer).
    pub chat: ChatConfig,
    /// Encrypt new messages unless told otherwise.
    pub encrypt_by_default: bool,

    // -- Session --
    /// Session file override; `None` uses the platform data directory.
    pub session_path: Option<PathBuf>,

    // -- UI --
    /// Timestamp display format string (chrono).
    pub timestamp_format: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            username: None,
            peer: None,
            identity_mode: IdentityMode::SingleWallet,
            auth_mode: AuthMode::PasswordLogin,
            chat: ChatConfig::default(),
            encrypt_by_default: false,
            session_path: None,
            timestamp_format: "%H:%M".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// CLI args and env vars are parsed via `clap`. If `--config` is given
    /// and the file does not exist, returns an error. If no `--config` is
    /// given, the default path (`~/.config/ledgerchat/config.toml`) is tried
    /// and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            username: cli.username.clone(),
            peer: cli.peer.clone(),
            identity_mode: file
                .identity
                .identity_mode
                .unwrap_or(defaults.identity_mode),
            auth_mode: file.identity.auth_mode.unwrap_or(defaults.auth_mode),
            chat: ChatConfig {
                store_timeout: file
                    .chat
                    .store_timeout_secs
                    .map_or(defaults.chat.store_timeout, Duration::from_secs),
                max_message_size: file
                    .chat
                    .max_message_size
                    .unwrap_or(defaults.chat.max_message_size),
                event_buffer: file
                    .chat
                    .event_buffer
                    .unwrap_or(defaults.chat.event_buffer),
            },
            encrypt_by_default: cli.encrypt
                || file
                    .chat
                    .encrypt_by_default
                    .unwrap_or(defaults.encrypt_by_default),
            session_path: file.session.path.clone(),
            timestamp_format: cli
                .timestamp_format
                .clone()
                .or_else(|| file.ui.timestamp_format.clone())
                .unwrap_or(defaults.timestamp_format),
        }
    }

    /// The session file to use, if any location is available.
    #[must_use]
    pub fn session_file(&self) -> Option<SessionFile> {
        self.session_path
            .clone()
            .or_else(SessionFile::default_path)
            .map(SessionFile::new)
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Wallet-addressed chat client (offline demo)")]
pub struct CliArgs {
    /// Path to config file (default: `~/.config/ledgerchat/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Username to sign up as.
    #[arg(long, env = "LEDGERCHAT_USERNAME")]
    pub username: Option<String>,

    /// Username of the peer to chat with.
    #[arg(long, env = "LEDGERCHAT_PEER")]
    pub peer: Option<String>,

    /// Encrypt outgoing messages.
    #[arg(long)]
    pub encrypt: bool,

    /// Timestamp display format (chrono format string).
    #[arg(long)]
    pub timestamp_format: Option<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "LEDGERCHAT_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/ledgerchat.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        // No config dir available, use defaults.
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("ledgerchat").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
