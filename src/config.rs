//! Typed server configuration: a `serde`+`toml` file overlaid with `clap`
//! CLI flags. CLI wins over file, file wins over built-in defaults, per
//! `SPEC_FULL.md` §4.8.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    2049
}

fn default_idle_timeout_secs() -> u64 {
    60
}

fn default_max_fragment_len() -> u32 {
    (1 << 20) + (4 << 10)
}

/// The on-disk (TOML) shape of the configuration. Every field is optional so
/// a file may override only what it cares about.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub listen_host: Option<String>,
    pub listen_port: Option<u16>,
    pub export_root: Option<PathBuf>,
    pub export_path: Option<String>,
    pub idle_timeout_secs: Option<u64>,
    pub max_fragment_len: Option<u32>,
    pub read_only: Option<bool>,
}

/// CLI overrides, parsed with `clap`'s derive API.
#[derive(Debug, Parser)]
#[command(name = "nfsd", about = "A user-space NFSv3/MOUNTv3 server")]
pub struct Cli {
    /// Path to an optional TOML configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub listen: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    /// Directory to export; required unless provided by the config file.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// The dirpath clients must pass to MNT; defaults to the export directory's
    /// absolute path string.
    #[arg(long)]
    pub export_path: Option<String>,

    #[arg(long)]
    pub read_only: bool,

    #[arg(long)]
    pub idle_timeout: Option<u64>,

    #[arg(long)]
    pub max_frame_len: Option<u32>,
}

/// The fully resolved configuration the server runs with.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_host: String,
    pub listen_port: u16,
    pub export_root: PathBuf,
    pub export_path: String,
    pub idle_timeout_secs: u64,
    pub max_fragment_len: u32,
    pub read_only: bool,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingExportRoot,
    ExportNotADirectory(PathBuf),
    ReadFile(std::io::Error),
    ParseToml(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingExportRoot => write!(f, "no export directory given (--export or config file)"),
            ConfigError::ExportNotADirectory(p) => write!(f, "export path is not a directory: {}", p.display()),
            ConfigError::ReadFile(e) => write!(f, "failed to read config file: {e}"),
            ConfigError::ParseToml(e) => write!(f, "failed to parse config file: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ServerConfig {
    pub fn load(cli: Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
                toml::from_str::<FileConfig>(&text).map_err(ConfigError::ParseToml)?
            }
            None => FileConfig::default(),
        };

        let export_root = cli
            .export
            .clone()
            .or(file.export_root)
            .ok_or(ConfigError::MissingExportRoot)?;
        if !export_root.is_dir() {
            return Err(ConfigError::ExportNotADirectory(export_root));
        }
        let export_path = cli
            .export_path
            .clone()
            .or(file.export_path)
            .unwrap_or_else(|| export_root.to_string_lossy().into_owned());

        Ok(ServerConfig {
            listen_host: cli.listen.or(file.listen_host).unwrap_or_else(default_listen_host),
            listen_port: cli.port.or(file.listen_port).unwrap_or_else(default_listen_port),
            export_root,
            export_path,
            idle_timeout_secs: cli
                .idle_timeout
                .or(file.idle_timeout_secs)
                .unwrap_or_else(default_idle_timeout_secs),
            max_fragment_len: cli
                .max_frame_len
                .or(file.max_fragment_len)
                .unwrap_or_else(default_max_fragment_len),
            read_only: cli.read_only || file.read_only.unwrap_or(false),
        })
    }
}
