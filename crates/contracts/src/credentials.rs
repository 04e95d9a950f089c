//! Credentials providers handed to sinks at construction time.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::{ContractError, CredentialsConfig};

pub const ACCESS_KEY_ENV: &str = "SHIPPER_ACCESS_KEY_ID";
pub const SECRET_KEY_ENV: &str = "SHIPPER_SECRET_ACCESS_KEY";

/// Access key pair
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }
}

// Secret never reaches logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .finish()
    }
}

/// Source of credentials
pub trait CredentialsProvider: Send + Sync {
    /// Provider name (used in errors)
    fn name(&self) -> &str;

    /// Resolve credentials
    ///
    /// # Errors
    /// `Credentials` when the source has nothing usable
    fn credentials(&self) -> Result<Credentials, ContractError>;

    /// Sinks may run unauthenticated under this provider
    fn is_anonymous(&self) -> bool {
        false
    }
}

/// Fixed key pair
#[derive(Debug, Clone)]
pub struct StaticCredentialsProvider {
    credentials: Credentials,
}

impl StaticCredentialsProvider {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl CredentialsProvider for StaticCredentialsProvider {
    fn name(&self) -> &str {
        "static"
    }

    fn credentials(&self) -> Result<Credentials, ContractError> {
        Ok(self.credentials.clone())
    }
}

/// Reads [`ACCESS_KEY_ENV`] and [`SECRET_KEY_ENV`]
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialsProvider;

impl CredentialsProvider for EnvCredentialsProvider {
    fn name(&self) -> &str {
        "env"
    }

    fn credentials(&self) -> Result<Credentials, ContractError> {
        let read = |key: &str| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ContractError::credentials(self.name(), format!("{key} is not set")))
        };
        Ok(Credentials::new(read(ACCESS_KEY_ENV)?, read(SECRET_KEY_ENV)?))
    }
}

/// Java-style properties file holding `accessKey` and `secretKey`
///
/// Only a subset of the properties format is read: one `key=value` or
/// `key:value` pair per line, and `#` or `!` comment lines. Backslash line
/// continuations and escapes such as `\uXXXX` are not interpreted, so keep
/// each key on a single unescaped line.
#[derive(Debug, Clone)]
pub struct PropertiesFileCredentialsProvider {
    path: PathBuf,
    label: String,
}

impl PropertiesFileCredentialsProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = format!("properties_file({})", path.display());
        Self { path, label }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(content: &str) -> HashMap<String, String> {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
            .filter_map(|line| {
                let split = line.find(&['=', ':'][..])?;
                let (key, value) = line.split_at(split);
                Some((key.trim().to_string(), value[1..].trim().to_string()))
            })
            .collect()
    }
}

impl CredentialsProvider for PropertiesFileCredentialsProvider {
    fn name(&self) -> &str {
        &self.label
    }

    fn credentials(&self) -> Result<Credentials, ContractError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            ContractError::credentials(self.name(), format!("unable to read file: {e}"))
        })?;
        let props = Self::parse(&content);

        let get = |key: &str| {
            props
                .get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| ContractError::credentials(self.name(), format!("missing '{key}'")))
        };
        Ok(Credentials::new(get("accessKey")?, get("secretKey")?))
    }
}

/// Tries each provider in order, returning the first success
pub struct ChainCredentialsProvider {
    providers: Vec<Box<dyn CredentialsProvider>>,
}

impl ChainCredentialsProvider {
    pub fn new(providers: Vec<Box<dyn CredentialsProvider>>) -> Self {
        Self { providers }
    }
}

impl CredentialsProvider for ChainCredentialsProvider {
    fn name(&self) -> &str {
        "chain"
    }

    fn credentials(&self) -> Result<Credentials, ContractError> {
        let mut failures = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            match provider.credentials() {
                Ok(credentials) => return Ok(credentials),
                Err(e) => failures.push(e.to_string()),
            }
        }
        Err(ContractError::credentials(
            self.name(),
            format!("no provider succeeded: [{}]", failures.join("; ")),
        ))
    }
}

/// Provider that never has credentials; for sinks that need none
#[derive(Debug, Clone, Default)]
pub struct NoCredentialsProvider;

impl CredentialsProvider for NoCredentialsProvider {
    fn name(&self) -> &str {
        "none"
    }

    fn credentials(&self) -> Result<Credentials, ContractError> {
        Err(ContractError::credentials(self.name(), "no credentials configured"))
    }

    fn is_anonymous(&self) -> bool {
        true
    }
}

/// Build the provider a configuration describes
pub fn provider_from_config(config: &CredentialsConfig) -> Box<dyn CredentialsProvider> {
    match config {
        CredentialsConfig::None => Box::new(NoCredentialsProvider),
        CredentialsConfig::Static {
            access_key_id,
            secret_access_key,
        } => Box::new(StaticCredentialsProvider::new(Credentials::new(
            access_key_id.clone(),
            secret_access_key.clone(),
        ))),
        CredentialsConfig::Env => Box::new(EnvCredentialsProvider),
        CredentialsConfig::PropertiesFile { path } => {
            Box::new(PropertiesFileCredentialsProvider::new(path.clone()))
        }
        CredentialsConfig::DefaultChain => Box::new(ChainCredentialsProvider::new(vec![
            Box::new(EnvCredentialsProvider),
            Box::new(PropertiesFileCredentialsProvider::new(
                crate::DEFAULT_CREDENTIALS_FILE,
            )),
        ])),
    }
}
