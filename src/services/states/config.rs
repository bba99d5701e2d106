use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::Path;
use std::time::Duration;
use url::Url;

#[derive(Debug, Serialize, Deserialize)]
pub struct CommonConfig {
    pub host: Cow<'static, str>,
    pub port: usize,
    pub log_level: Cow<'static, str>,
    pub concurrency_limit: usize,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 18300,
            log_level: "info,brew=debug".into(),
            concurrency_limit: 128,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DataBaseConfig {
    pub db_url: Cow<'static, str>,
    pub sqlite_connection_nums: u32,
}

impl Default for DataBaseConfig {
    fn default() -> Self {
        Self {
            db_url: "sqlite://data/brew.db".into(),
            sqlite_connection_nums: 10,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PromoConfig {
    /// Client groups allowed to issue and list promo codes.
    pub team_group_ids: Vec<i64>,
    pub create_retry_limit: u32,
}

impl Default for PromoConfig {
    fn default() -> Self {
        Self {
            team_group_ids: Vec::new(),
            create_retry_limit: 5,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub base_url: Url,
    pub request_timeout_secs: u64,
    pub profile_cache_ttl_secs: u64,
    pub profile_cache_capacity: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("http://127.0.0.1:18301/")
                .expect("default identity url is valid"),
            request_timeout_secs: 5,
            profile_cache_ttl_secs: 60,
            profile_cache_capacity: 1024,
        }
    }
}

impl IdentityConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn profile_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.profile_cache_ttl_secs)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WalletConfig {
    pub base_url: Url,
    pub api_key: Option<Cow<'static, str>>,
    pub credit_timeout_secs: u64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("http://127.0.0.1:18302/").expect("default wallet url is valid"),
            api_key: None,
            credit_timeout_secs: 10,
        }
    }
}

impl WalletConfig {
    pub fn credit_timeout(&self) -> Duration {
        Duration::from_secs(self.credit_timeout_secs)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Analytics / notification collector. Events are only logged when unset.
    pub endpoint: Option<Url>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub common: CommonConfig,
    pub db: DataBaseConfig,
    pub promo: PromoConfig,
    pub identity: IdentityConfig,
    pub wallet: WalletConfig,
    pub events: EventsConfig,
}

impl AppConfig {
    pub fn load(cfg_path: &str) -> Result<Self, Box<figment::Error>> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Env::prefixed("BREW_").split("__").global());
        if Path::new(cfg_path).exists() {
            figment = figment.merge(Toml::file(cfg_path));
        }
        figment.extract().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "brew.toml",
                r#"
                    [promo]
                    team_group_ids = [3, 7]

                    [wallet]
                    base_url = "https://wallet.internal/"
                    credit_timeout_secs = 4
                "#,
            )?;
            let cfg = AppConfig::load("brew.toml").map_err(|e| *e)?;
            assert_eq!(cfg.promo.team_group_ids, vec![3, 7]);
            assert_eq!(cfg.promo.create_retry_limit, 5);
            assert_eq!(cfg.wallet.credit_timeout(), Duration::from_secs(4));
            assert_eq!(cfg.wallet.base_url.as_str(), "https://wallet.internal/");
            assert_eq!(cfg.common.port, 18300);
            assert!(cfg.events.endpoint.is_none());
            Ok(())
        });
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        figment::Jail::expect_with(|_| {
            let cfg = AppConfig::load("does-not-exist.toml").map_err(|e| *e)?;
            assert!(cfg.promo.team_group_ids.is_empty());
            assert_eq!(cfg.common.log_level, "info,brew=debug");
            Ok(())
        });
    }
}
