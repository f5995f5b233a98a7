use crate::error::ConfigurationError;
use crate::util;
use chrono::Duration;
use std::env;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_ARCHIVE_BYTES: u64 = 50 * 1024 * 1024;
/// bcrypt accepts work factors in this range.
pub const PASSWORD_COSTS: std::ops::RangeInclusive<u32> = 4..=31;
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;

fn env_or<T: std::str::FromStr>(name: &str, fallback: T) -> T {
    env::var(name)
        .ok()
        .and_then(|it| it.parse().ok())
        .unwrap_or(fallback)
}

fn default_superadmin_emails() -> Vec<String> {
    env::var("SUPERADMIN_EMAILS")
        .map(|it| {
            it.split(',')
                .map(str::trim)
                .filter(|it| !it.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn default_password_cost() -> u32 {
    env_or("PASSWORD_COST", 12)
}

fn default_session_ttl_hours() -> i64 {
    env_or("SESSION_TTL_HOURS", 24 * 7)
}

fn default_max_archive_bytes() -> u64 {
    env_or("MAX_ARCHIVE_BYTES", DEFAULT_MAX_ARCHIVE_BYTES)
}

fn default_secure_cookies() -> bool {
    env_or("SECURE_COOKIES", true)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    file_path: PathBuf,

    /// Accounts registering with these emails may claim the `superadmin` role.
    #[serde(default = "default_superadmin_emails")]
    pub superadmin_emails: Vec<String>,

    /// bcrypt work factor for new password hashes.
    #[serde(default = "default_password_cost")]
    pub password_cost: u32,
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,

    #[serde(default = "default_max_archive_bytes")]
    pub max_archive_bytes: u64,

    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            file_path: config_dir().join("settings.yml"),
            superadmin_emails: default_superadmin_emails(),
            password_cost: default_password_cost(),
            session_ttl_hours: default_session_ttl_hours(),
            max_archive_bytes: default_max_archive_bytes(),
            secure_cookies: default_secure_cookies(),
        }
    }
}

#[inline]
fn config_dir() -> PathBuf {
    PathBuf::from(env::var("CONFIG_DIR").unwrap_or_else(|_| "./config".to_string()))
}

impl Config {
    pub fn load() -> Result<Config, ConfigurationError> {
        Self::load_from(config_dir())
    }

    pub fn load_from(dir: impl AsRef<Path>) -> Result<Config, ConfigurationError> {
        let dir = dir.as_ref();
        let config_file =
            util::find_first_subpath(dir, &["settings.yml", "settings.yaml"], Path::exists)
                .ok_or_else(|| ConfigurationError::NotFound(dir.to_path_buf()))?;

        let file = File::open(&config_file)?;
        let mut config: Config = serde_yaml::from_reader(BufReader::new(file))?;
        config.file_path = config_file;
        config.validate()?;

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigurationError> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.file_path)?;
        let mut out = BufWriter::new(file);
        serde_yaml::to_writer(&mut out, self)?;
        out.flush()?;
        Ok(())
    }

    /// Rejects values the password hasher or session clock can't work with.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !PASSWORD_COSTS.contains(&self.password_cost) {
            return Err(ConfigurationError::Invalid {
                field: "password_cost",
                reason: format!(
                    "{} is outside {}..={}",
                    self.password_cost,
                    PASSWORD_COSTS.start(),
                    PASSWORD_COSTS.end()
                ),
            });
        }
        if !(1..=MAX_SESSION_TTL_HOURS).contains(&self.session_ttl_hours) {
            return Err(ConfigurationError::Invalid {
                field: "session_ttl_hours",
                reason: format!(
                    "{} is outside 1..={}",
                    self.session_ttl_hours, MAX_SESSION_TTL_HOURS
                ),
            });
        }
        Ok(())
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::hours(self.session_ttl_hours)
    }

    pub fn is_superadmin_email(&self, email: &str) -> bool {
        self.superadmin_emails.iter().any(|it| it == email)
    }

    /// Cheap settings for tests: minimal bcrypt cost, plain cookies.
    #[cfg(test)]
    pub fn testing() -> Config {
        Config {
            file_path: env::temp_dir().join("settings.yml"),
            superadmin_emails: vec![String::from("root@example.com")],
            password_cost: 4,
            session_ttl_hours: 1,
            max_archive_bytes: DEFAULT_MAX_ARCHIVE_BYTES,
            secure_cookies: false,
        }
    }
}
