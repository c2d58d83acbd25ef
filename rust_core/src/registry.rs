//! Account Registry
//!
//! Holds the configured vendor accounts, one ordered list per vendor kind.
//! Accounts missing a required credential are dropped at construction and
//! the registry is read-only afterwards.

use crate::models::Provider;
use std::env;
use tracing::info;

pub const DEFAULT_SPIREON_BASE_URL: &str = "https://services.spireon.com/v0/rest";
pub const DEFAULT_SKYBITZ_BASE_URL: &str = "https://xml.skybitz.com:9443";

/// Spireon account: HTTP Basic credentials plus an application token.
#[derive(Clone)]
pub struct SpireonAccount {
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    pub username: String,
    pub password: String,
}

impl SpireonAccount {
    fn is_complete(&self) -> bool {
        !self.api_key.trim().is_empty()
            && !self.username.trim().is_empty()
            && !self.password.trim().is_empty()
    }
}

impl std::fmt::Debug for SpireonAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpireonAccount")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("has_credentials", &self.is_complete())
            .finish()
    }
}

/// SkyBitz account: customer id and password sent with each query.
#[derive(Clone)]
pub struct SkyBitzAccount {
    pub name: String,
    pub base_url: String,
    pub username: String,
    pub password: String,
}

impl SkyBitzAccount {
    fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.trim().is_empty()
    }
}

impl std::fmt::Debug for SkyBitzAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkyBitzAccount")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("has_credentials", &self.is_complete())
            .finish()
    }
}

/// Name and vendor of one configured account, in registry order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRef {
    pub name: String,
    pub provider: Provider,
}

/// Immutable set of configured accounts
#[derive(Debug, Clone, Default)]
pub struct AccountRegistry {
    spireon: Vec<SpireonAccount>,
    skybitz: Vec<SkyBitzAccount>,
}

impl AccountRegistry {
    /// Build a registry, silently excluding incompletely configured accounts.
    pub fn new(spireon: Vec<SpireonAccount>, skybitz: Vec<SkyBitzAccount>) -> Self {
        Self {
            spireon: spireon.into_iter().filter(|a| a.is_complete()).collect(),
            skybitz: skybitz.into_iter().filter(|a| a.is_complete()).collect(),
        }
    }

    /// Load accounts from the environment.
    ///
    /// `SPIREON_ACCOUNTS` / `SKYBITZ_ACCOUNTS` list comma-separated keys; each
    /// key `K` reads `SPIREON_K_*` / `SKYBITZ_K_*` variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);
        let spireon = vars
            .keys("SPIREON_ACCOUNTS")
            .iter()
            .map(|key| vars.spireon(key))
            .collect();
        let skybitz = vars
            .keys("SKYBITZ_ACCOUNTS")
            .iter()
            .map(|key| vars.skybitz(key))
            .collect();

        let registry = Self::new(spireon, skybitz);
        info!(
            "AccountRegistry loaded: {} Spireon, {} SkyBitz accounts",
            registry.spireon.len(),
            registry.skybitz.len()
        );
        registry
    }

    pub fn spireon(&self) -> &[SpireonAccount] {
        &self.spireon
    }

    pub fn skybitz(&self) -> &[SkyBitzAccount] {
        &self.skybitz
    }

    /// All accounts, Spireon first, each list in configured order
    pub fn accounts(&self) -> Vec<AccountRef> {
        self.spireon
            .iter()
            .map(|a| AccountRef {
                name: a.name.clone(),
                provider: Provider::Spireon,
            })
            .chain(self.skybitz.iter().map(|a| AccountRef {
                name: a.name.clone(),
                provider: Provider::SkyBitz,
            }))
            .collect()
    }

    pub fn count(&self, provider: Provider) -> usize {
        match provider {
            Provider::Spireon => self.spireon.len(),
            Provider::SkyBitz => self.skybitz.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.spireon.is_empty() && self.skybitz.is_empty()
    }
}

struct Vars<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Vars<'_> {
    fn opt(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn or_empty(&self, key: &str) -> String {
        self.opt(key).unwrap_or_default()
    }

    fn keys(&self, var: &str) -> Vec<String> {
        self.or_empty(var)
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    fn spireon(&self, key: &str) -> SpireonAccount {
        let prefix = format!("SPIREON_{key}");
        SpireonAccount {
            name: self.opt(&format!("{prefix}_NAME")).unwrap_or_else(|| key.to_string()),
            base_url: self
                .opt(&format!("{prefix}_BASE_URL"))
                .or_else(|| self.opt("SPIREON_BASE_URL"))
                .unwrap_or_else(|| DEFAULT_SPIREON_BASE_URL.to_string()),
            api_key: self.or_empty(&format!("{prefix}_API_KEY")),
            username: self.or_empty(&format!("{prefix}_USERNAME")),
            password: self.or_empty(&format!("{prefix}_PASSWORD")),
        }
    }

    fn skybitz(&self, key: &str) -> SkyBitzAccount {
        let prefix = format!("SKYBITZ_{key}");
        SkyBitzAccount {
            name: self.opt(&format!("{prefix}_NAME")).unwrap_or_else(|| key.to_string()),
            base_url: self
                .opt(&format!("{prefix}_BASE_URL"))
                .or_else(|| self.opt("SKYBITZ_BASE_URL"))
                .unwrap_or_else(|| DEFAULT_SKYBITZ_BASE_URL.to_string()),
            username: self.or_empty(&format!("{prefix}_USERNAME")),
            password: self.or_empty(&format!("{prefix}_PASSWORD")),
        }
    }
}
