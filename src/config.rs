use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

/// Process-wide configuration, read once from the environment.
pub static CONFIG: LazyLock<Config> = LazyLock::new(|| {
    Config::from_env().unwrap_or_else(|e| panic!("FATAL: invalid configuration: {e}"))
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub models_base_dir: PathBuf,
    /// Where multipart uploads are spooled before the store worker picks them up.
    pub upload_dir: Option<PathBuf>,
    pub listen_addr: String,
    pub loglevel: String,
    pub lock_timeout_secs: u64,
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://edaparts.sqlite".to_string(),
            models_base_dir: PathBuf::from("/var/lib/edaparts/library"),
            upload_dir: None,
            listen_addr: "0.0.0.0:8000".to_string(),
            loglevel: "info".to_string(),
            lock_timeout_secs: 30,
            max_upload_bytes: 32 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Defaults, overridden by the bare `DATABASE_URL` / `MODELS_BASE_DIR`
    /// variables, overridden in turn by any `EDAPARTS_*` variable.
    pub fn from_env() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Env::raw().only(&["DATABASE_URL", "MODELS_BASE_DIR"]))
            .merge(Env::prefixed("EDAPARTS_"))
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
