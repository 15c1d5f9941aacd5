use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use seedbank_client::DEFAULT_API_BASE;
use seedbank_core::MemoryType;
use serde::Deserialize;
use std::{
    env, fs,
    fs::OpenOptions,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

pub const DEFAULT_QUERY: &str = "der";
const DEFAULT_SEARCH_LIMIT: u32 = 100;
const DEFAULT_SEED_POLL_SECS: u64 = 5;
const DEFAULT_CONTEXT_POLL_SECS: u64 = 8;

#[derive(Parser, Debug, Default)]
#[command(
    name = "seedbank-dashboard",
    version,
    about = "Live terminal dashboard for a seed store"
)]
pub struct Args {
    #[arg(long, env = "SEEDBANK_API_BASE")]
    pub api_base: Option<String>,
    #[arg(long, env = "SEEDBANK_CONFIG_PATH")]
    pub config: Option<PathBuf>,
    #[arg(long, env = "SEEDBANK_DEFAULT_QUERY")]
    pub default_query: Option<String>,
    #[arg(long, env = "SEEDBANK_SEARCH_LIMIT")]
    pub search_limit: Option<u32>,
    #[arg(long, env = "SEEDBANK_SEARCH_THRESHOLD")]
    pub search_threshold: Option<f64>,
    #[arg(long, env = "SEEDBANK_SEED_POLL_SECS")]
    pub seed_poll_secs: Option<u64>,
    #[arg(long, env = "SEEDBANK_CONTEXT_POLL_SECS")]
    pub context_poll_secs: Option<u64>,
    #[arg(long, env = "SEEDBANK_PREFS_BACKEND", value_enum)]
    pub prefs_backend: Option<PrefsBackendKind>,
    #[arg(long, env = "SEEDBANK_PREFS_PATH")]
    pub prefs_path: Option<PathBuf>,
    #[arg(long, env = "SEEDBANK_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
    #[arg(long, env = "SEEDBANK_CONNECT_TIMEOUT_SECS")]
    pub connect_timeout_secs: Option<u64>,
    #[arg(long, default_value_t = false)]
    pub debug: bool,
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// One-shot store calls; each prints JSON to stdout.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Exit non-zero unless the store reports healthy.
    Health,
    Stats,
    Search {
        query: String,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Reduced results via the query endpoint.
    Query {
        query: String,
        #[arg(long, default_value_t = 30)]
        limit: u32,
        #[arg(long, default_value_t = 0.0)]
        threshold: f64,
    },
    Get {
        id: i64,
    },
    Store {
        content: String,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        tag: Option<String>,
    },
    Contexts {
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        memory_type: Option<MemoryType>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefsBackendKind {
    #[default]
    File,
    Sqlite,
    Memory,
}

/// Shape of the optional TOML file. Every key may be omitted.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    pub api_base: Option<String>,
    pub default_query: Option<String>,
    pub search_limit: Option<u32>,
    pub search_threshold: Option<f64>,
    pub seed_poll_secs: Option<u64>,
    pub context_poll_secs: Option<u64>,
    pub prefs_backend: Option<PrefsBackendKind>,
    pub prefs_path: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_base: String,
    pub default_query: String,
    pub search_limit: u32,
    pub search_threshold: f64,
    pub seed_poll: Duration,
    pub context_poll: Duration,
    pub prefs_backend: PrefsBackendKind,
    pub prefs_path: PathBuf,
    pub log_dir: PathBuf,
    pub connect_timeout: Option<Duration>,
    pub debug: bool,
}

impl Config {
    pub fn load(args: &Args) -> Result<Self> {
        let path = args.config.clone().unwrap_or_else(config_path);
        let file = load_file_config(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Ok(Self::resolve(args, file))
    }

    /// Flags and environment win over the file, the file over defaults.
    pub fn resolve(args: &Args, file: FileConfig) -> Self {
        let prefs_backend = args
            .prefs_backend
            .or(file.prefs_backend)
            .unwrap_or_default();
        let prefs_path = args
            .prefs_path
            .clone()
            .or(file.prefs_path)
            .unwrap_or_else(|| default_prefs_path(prefs_backend));
        let default_query = args
            .default_query
            .clone()
            .or(file.default_query)
            .filter(|query| !query.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_QUERY.to_string());
        Self {
            api_base: args
                .api_base
                .clone()
                .or(file.api_base)
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            default_query,
            search_limit: args
                .search_limit
                .or(file.search_limit)
                .unwrap_or(DEFAULT_SEARCH_LIMIT),
            search_threshold: args
                .search_threshold
                .or(file.search_threshold)
                .unwrap_or(0.0),
            seed_poll: poll_period(
                args.seed_poll_secs.or(file.seed_poll_secs),
                DEFAULT_SEED_POLL_SECS,
            ),
            context_poll: poll_period(
                args.context_poll_secs.or(file.context_poll_secs),
                DEFAULT_CONTEXT_POLL_SECS,
            ),
            prefs_backend,
            prefs_path,
            log_dir: args
                .log_dir
                .clone()
                .or(file.log_dir)
                .unwrap_or_else(|| state_dir().join("seedbank")),
            connect_timeout: args
                .connect_timeout_secs
                .or(file.connect_timeout_secs)
                .map(Duration::from_secs),
            debug: args.debug,
        }
    }
}

fn poll_period(secs: Option<u64>, default: u64) -> Duration {
    Duration::from_secs(secs.filter(|secs| *secs > 0).unwrap_or(default))
}

pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let contents = fs::read_to_string(path)?;
    let config = toml::from_str(&contents)?;
    Ok(config)
}

fn default_prefs_path(backend: PrefsBackendKind) -> PathBuf {
    let name = match backend {
        PrefsBackendKind::Sqlite => "preferences.sqlite",
        PrefsBackendKind::File | PrefsBackendKind::Memory => "preferences.json",
    };
    state_dir().join("seedbank").join(name)
}

fn config_path() -> PathBuf {
    config_dir().join("seedbank/config.toml")
}

fn state_dir() -> PathBuf {
    if let Ok(path) = env::var("XDG_STATE_HOME") {
        return PathBuf::from(path);
    }
    home_dir().join(".local/state")
}

fn config_dir() -> PathBuf {
    if let Ok(path) = env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(path);
    }
    home_dir().join(".config")
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Where log lines go. The TUI owns stdout, so it logs to a file or nowhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    File,
    Stderr,
}

pub struct LogGuard {
    file: Option<Arc<Mutex<fs::File>>>,
}

impl LogGuard {
    pub fn has_file(&self) -> bool {
        self.file.is_some()
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

struct FileWriter {
    file: Option<Arc<Mutex<fs::File>>>,
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(buf);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
        Ok(())
    }
}

pub fn init_logging(config: &Config, target: LogTarget) -> Option<LogGuard> {
    let level = if config.debug {
        "debug".to_string()
    } else if let Ok(level) = env::var("SEEDBANK_LOG_LEVEL") {
        level
    } else {
        "info".to_string()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match target {
        LogTarget::Stderr => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .try_init();
            None
        }
        LogTarget::File => {
            let guard = match open_log_file(&config.log_dir) {
                Ok(guard) => guard,
                Err(_) => LogGuard { file: None },
            };
            let file = guard.file.clone();
            let make_writer = BoxMakeWriter::new(move || FileWriter { file: file.clone() });
            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(make_writer)
                .finish();
            if tracing::subscriber::set_global_default(subscriber).is_err() {
                return None;
            }
            Some(guard)
        }
    }
}

fn open_log_file(log_dir: &Path) -> io::Result<LogGuard> {
    if log_dir.as_os_str().is_empty() {
        return Ok(LogGuard { file: None });
    }
    fs::create_dir_all(log_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("seedbank-dashboard.log"))?;
    Ok(LogGuard {
        file: Some(Arc::new(Mutex::new(file))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_file_or_flags() {
        let config = Config::resolve(&Args::default(), FileConfig::default());
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.default_query, "der");
        assert_eq!(config.search_limit, 100);
        assert_eq!(config.search_threshold, 0.0);
        assert_eq!(config.seed_poll, Duration::from_secs(5));
        assert_eq!(config.context_poll, Duration::from_secs(8));
        assert_eq!(config.prefs_backend, PrefsBackendKind::File);
        assert!(config.prefs_path.ends_with("seedbank/preferences.json"));
        assert_eq!(config.connect_timeout, None);
    }

    #[test]
    fn flags_override_file_which_overrides_defaults() {
        let file: FileConfig = toml::from_str(
            r#"
api_base = "http://store:9000"
default_query = "katze"
seed_poll_secs = 12
prefs_backend = "sqlite"
"#,
        )
        .unwrap();
        let args = Args {
            api_base: Some("http://flag:1".to_string()),
            seed_poll_secs: Some(0),
            ..Args::default()
        };
        let config = Config::resolve(&args, file);
        assert_eq!(config.api_base, "http://flag:1");
        assert_eq!(config.default_query, "katze");
        assert_eq!(config.seed_poll, Duration::from_secs(5));
        assert_eq!(config.prefs_backend, PrefsBackendKind::Sqlite);
        assert!(config.prefs_path.ends_with("seedbank/preferences.sqlite"));
    }

    #[test]
    fn blank_default_query_falls_back() {
        let args = Args {
            default_query: Some("  ".to_string()),
            ..Args::default()
        };
        let config = Config::resolve(&args, FileConfig::default());
        assert_eq!(config.default_query, DEFAULT_QUERY);
    }

    #[test]
    fn missing_config_file_is_empty_and_bad_toml_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert_eq!(load_file_config(&missing).unwrap(), FileConfig::default());

        let bad = dir.path().join("bad.toml");
        fs::write(&bad, "search_limit = \"lots\"").unwrap();
        assert!(load_file_config(&bad).is_err());
    }

    #[test]
    fn subcommands_parse() {
        let args = Args::try_parse_from([
            "seedbank",
            "store",
            "hello",
            "--source",
            "cli",
        ])
        .unwrap();
        assert_eq!(
            args.command,
            Some(Command::Store {
                content: "hello".to_string(),
                source: Some("cli".to_string()),
                tag: None,
            })
        );

        let args =
            Args::try_parse_from(["seedbank", "contexts", "--memory-type", "working"]).unwrap();
        assert_eq!(
            args.command,
            Some(Command::Contexts {
                agent: None,
                memory_type: Some(MemoryType::Working),
            })
        );
    }
}
