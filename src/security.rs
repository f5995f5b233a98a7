use std::path::{Path, PathBuf};
use std::{env, fs};

use crate::error::ConfigurationError;

const SESSION_SECRET: &str = "session.secret";
const SECRET_LENGTH: usize = 64;

/// Key material that has to survive restarts, so issued sessions stay valid.
#[derive(Clone)]
pub struct Security {
    pub session_secret: Vec<u8>,
}

impl std::fmt::Debug for Security {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Security {{ session_secret: <{} bytes> }}", self.session_secret.len())
    }
}

#[inline]
pub fn security_dir() -> PathBuf {
    PathBuf::from(env::var("SECURITY_DIR").unwrap_or_else(|_| "./security".to_string()))
}

fn random_secret() -> Vec<u8> {
    (0..SECRET_LENGTH).map(|_| rand::random::<u8>()).collect()
}

impl Security {
    pub fn load() -> Result<Security, ConfigurationError> {
        Self::load_from(security_dir())
    }

    pub fn load_from(dir: impl AsRef<Path>) -> Result<Security, ConfigurationError> {
        let dir = dir.as_ref();
        let secret_path = dir.join(SESSION_SECRET);

        tracing::info!("Loading session signing secret...");
        let session_secret = match fs::read(&secret_path) {
            Ok(secret) if secret.len() >= SECRET_LENGTH => {
                tracing::info!("Session secret found and loaded.");
                secret
            }
            _ => {
                tracing::info!("Session secret not found in '{}'.", secret_path.display());
                if !cfg!(feature = "generate-security") {
                    return Err(ConfigurationError::MissingSecret(secret_path));
                }

                tracing::info!("Generating a new session secret.");
                fs::create_dir_all(dir)?;
                let secret = random_secret();
                fs::write(&secret_path, &secret)?;
                secret
            }
        };

        Ok(Security { session_secret })
    }

    /// Secret that lives only as long as the process, sessions die with it.
    pub fn ephemeral() -> Security {
        Security {
            session_secret: random_secret(),
        }
    }
}
