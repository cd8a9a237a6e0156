use std::path::{Path, PathBuf};

use clap::Parser;
use rand::Rng;

const SECRET_FILE: &str = "jwt_secret.key";
const SECRET_LEN: usize = 64;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Database path
    #[arg(short, long, env = "DATABASE_PATH", default_value = "agora.db")]
    pub db_path: String,

    /// Host name clients use to reach this server (checked against the Host header)
    #[arg(long, env = "EXTERNAL_HOST", default_value = "localhost")]
    pub external_host: String,

    /// JWT signing secret; generated and saved beside the database when unset
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Distinct reporters within the window that trigger an automatic ban
    #[arg(long, env = "AUTO_BAN_THRESHOLD", default_value_t = 5)]
    pub auto_ban_threshold: usize,

    /// Length of the report window in days
    #[arg(long, env = "AUTO_BAN_WINDOW_DAYS", default_value_t = 7)]
    pub auto_ban_window_days: i64,

    /// Seconds a cached role lookup stays valid
    #[arg(long, env = "ROLE_CACHE_TTL_SECS", default_value_t = 60)]
    pub role_cache_ttl_secs: u64,
}

impl Config {
    /// The configured secret, else the one saved beside the database.
    pub fn resolve_jwt_secret(&self) -> String {
        match self.jwt_secret.as_deref().map(str::trim) {
            Some(secret) if !secret.is_empty() => secret.to_string(),
            _ => load_or_create_secret(&self.secret_path()),
        }
    }

    fn secret_path(&self) -> PathBuf {
        Path::new(&self.db_path).with_file_name(SECRET_FILE)
    }

    pub fn policy(&self) -> ModerationPolicy {
        ModerationPolicy {
            threshold: self.auto_ban_threshold.max(1),
            window: chrono::Duration::days(self.auto_ban_window_days.max(1)),
        }
    }
}

/// Read the secret stored at `path`, or generate one and try to store it there.
/// A secret that cannot be saved still works until the next restart.
pub fn load_or_create_secret(path: &Path) -> String {
    if let Ok(saved) = std::fs::read_to_string(path) {
        let saved = saved.trim();
        if !saved.is_empty() {
            tracing::info!("Loaded JWT secret from {}", path.display());
            return saved.to_string();
        }
    }

    let secret: String = rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect();
    match std::fs::write(path, &secret) {
        Ok(()) => tracing::info!("Generated JWT secret and saved it to {}", path.display()),
        Err(e) => tracing::warn!(
            "Could not save JWT secret to {}: {e}; issued tokens end with this process",
            path.display()
        ),
    }
    secret
}

/// Auto-ban policy: `threshold` distinct reporters within `window`.
#[derive(Debug, Clone, Copy)]
pub struct ModerationPolicy {
    pub threshold: usize,
    pub window: chrono::Duration,
}

impl Default for ModerationPolicy {
    fn default() -> Self {
        Self {
            threshold: 5,
            window: chrono::Duration::days(7),
        }
    }
}
