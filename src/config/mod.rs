// src/config/mod.rs
//! Filter configuration, loaded once at startup and threaded into the engine,
//! the audit log and every strategy at construction time.
//!
//! Lookup order:
//! 1) $SPAMFILTER_CONFIG_PATH
//! 2) config/spamfilter.toml
//! 3) built-in defaults
//!
//! API keys written as `"ENV"` are resolved from the environment
//! (`AKISMET_API_KEY`, `TYPEPAD_API_KEY`, `SPAMBUSTED_API_KEY`,
//! `SPAMWIPE_API_KEY`). Strategy karma is clamped to `0..=MAX_KARMA_POINTS`.

pub mod policy;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};

pub use policy::{Policy, PolicyPatch};

use crate::strategy::MAX_KARMA_POINTS;

pub const DEFAULT_CONFIG_PATH: &str = "config/spamfilter.toml";
pub const ENV_CONFIG_PATH: &str = "SPAMFILTER_CONFIG_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpamFilterConfig {
    #[serde(default)]
    pub policy: Policy,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub strategies: StrategiesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/spamfilter.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategiesConfig {
    #[serde(default)]
    pub regex: RegexConfig,
    #[serde(default)]
    pub extlinks: ExtLinksConfig,
    #[serde(default)]
    pub duplicate: DuplicateConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub bayes: BayesConfig,
    #[serde(default)]
    pub ip_blacklist: IpBlacklistConfig,
    #[serde(default = "RemoteServiceConfig::akismet")]
    pub akismet: RemoteServiceConfig,
    #[serde(default = "RemoteServiceConfig::typepad")]
    pub typepad: RemoteServiceConfig,
    #[serde(default)]
    pub spambusted: SpamBustedConfig,
    #[serde(default)]
    pub spamwipe: SpamWipeConfig,
}

impl Default for StrategiesConfig {
    fn default() -> Self {
        Self {
            regex: RegexConfig::default(),
            extlinks: ExtLinksConfig::default(),
            duplicate: DuplicateConfig::default(),
            throttle: ThrottleConfig::default(),
            bayes: BayesConfig::default(),
            ip_blacklist: IpBlacklistConfig::default(),
            akismet: RemoteServiceConfig::akismet(),
            typepad: RemoteServiceConfig::typepad(),
            spambusted: SpamBustedConfig::default(),
            spamwipe: SpamWipeConfig::default(),
        }
    }
}

impl StrategiesConfig {
    fn karma_mut(&mut self) -> [&mut i32; 10] {
        [
            &mut self.regex.karma,
            &mut self.extlinks.karma,
            &mut self.duplicate.karma,
            &mut self.throttle.karma,
            &mut self.bayes.karma,
            &mut self.ip_blacklist.karma,
            &mut self.akismet.karma,
            &mut self.typepad.karma,
            &mut self.spambusted.karma,
            &mut self.spamwipe.karma,
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegexConfig {
    pub enabled: bool,
    pub karma: i32,
    /// One pattern per line; hot-reloaded when the file changes.
    pub patterns_path: PathBuf,
}

impl Default for RegexConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            karma: 5,
            patterns_path: PathBuf::from("config/bad_content.txt"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtLinksConfig {
    pub enabled: bool,
    pub karma: i32,
    pub max_links: u32,
}

impl Default for ExtLinksConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            karma: 2,
            max_links: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateConfig {
    pub enabled: bool,
    pub karma: i32,
    /// Max number of remembered submissions.
    pub window_size: usize,
    /// Similarity in [0.0, 1.0] at or above which content counts as a near-duplicate.
    pub similarity_threshold: f32,
    pub time_window_secs: u64,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            karma: 3,
            window_size: 128,
            similarity_threshold: 0.90,
            time_window_secs: 10 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    pub enabled: bool,
    pub karma: i32,
    /// Submissions allowed from one IP within the window.
    pub max_posts: u32,
    pub window_secs: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            karma: 3,
            max_posts: 10,
            window_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BayesConfig {
    pub enabled: bool,
    /// Factor by which the spam probability affects the karma.
    pub karma: i32,
    /// Minimum spam and ham training events before the classifier scores.
    pub min_training: u64,
}

impl Default for BayesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            karma: 10,
            min_training: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpBlacklistConfig {
    pub enabled: bool,
    pub karma: i32,
    pub servers: Vec<String>,
}

impl Default for IpBlacklistConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            karma: 5,
            servers: vec!["bl.spamcop.net".to_string(), "zen.spamhaus.org".to_string()],
        }
    }
}

/// Akismet-protocol services (Akismet, TypePad AntiSpam).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteServiceConfig {
    pub enabled: bool,
    pub karma: i32,
    /// Empty key ⇒ the strategy abstains.
    #[serde(default)]
    pub api_key: String,
    /// Host and path, without scheme, e.g. `rest.akismet.com/1.1/`.
    pub api_url: String,
    /// Site URL reported to the service (`blog` parameter).
    #[serde(default)]
    pub blog_url: String,
}

impl RemoteServiceConfig {
    pub fn akismet() -> Self {
        Self {
            enabled: true,
            karma: 5,
            api_key: String::new(),
            api_url: "rest.akismet.com/1.1/".to_string(),
            blog_url: String::new(),
        }
    }

    pub fn typepad() -> Self {
        Self {
            enabled: true,
            karma: 5,
            api_key: String::new(),
            api_url: "api.antispam.typepad.com/1.1/".to_string(),
            blog_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpamBustedConfig {
    pub enabled: bool,
    pub karma: i32,
    /// Only needed for reporting spam.
    #[serde(default)]
    pub api_key: String,
    pub api_url: String,
}

impl Default for SpamBustedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            karma: 3,
            api_key: String::new(),
            api_url: "http://www.spambusted.com/api.php".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpamWipeConfig {
    pub enabled: bool,
    pub karma: i32,
    #[serde(default)]
    pub api_key: String,
    /// Base URL the `verify-key`, `classify` and `markas-*` methods hang off.
    pub api_url: String,
    /// Site URL reported to the service.
    #[serde(default)]
    pub site_url: String,
}

impl Default for SpamWipeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            karma: 5,
            api_key: String::new(),
            api_url: "http://api.spamwipe.com/1.0/comments/".to_string(),
            site_url: String::new(),
        }
    }
}

impl SpamFilterConfig {
    /// Load from an explicit TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading spam filter config from {}", path.display()))?;
        Self::from_toml_str(&data)
    }

    pub fn from_toml_str(data: &str) -> Result<Self> {
        let mut cfg: SpamFilterConfig = toml::from_str(data).context("parsing spam filter config")?;
        cfg.policy = cfg.policy.sanitized();

        let s = &mut cfg.strategies;
        s.akismet.api_key = resolve_key(&s.akismet.api_key, "AKISMET_API_KEY")?;
        s.typepad.api_key = resolve_key(&s.typepad.api_key, "TYPEPAD_API_KEY")?;
        s.spambusted.api_key = resolve_key(&s.spambusted.api_key, "SPAMBUSTED_API_KEY")?;
        s.spamwipe.api_key = resolve_key(&s.spamwipe.api_key, "SPAMWIPE_API_KEY")?;

        // Sanitize
        for karma in s.karma_mut() {
            *karma = karma.saturating_abs().min(MAX_KARMA_POINTS);
        }
        if s.extlinks.max_links == 0 {
            s.extlinks.max_links = ExtLinksConfig::default().max_links;
        }
        s.duplicate.similarity_threshold = s.duplicate.similarity_threshold.clamp(0.0, 1.0);
        if s.duplicate.window_size == 0 {
            s.duplicate.window_size = 1;
        }
        if s.throttle.window_secs == 0 {
            s.throttle.window_secs = ThrottleConfig::default().window_secs;
        }
        Ok(cfg)
    }

    /// Env var first, then `config/spamfilter.toml`, then defaults.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from_file(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        let p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if p.exists() {
            return Self::load_from_file(&p);
        }
        Ok(Self::default())
    }
}

fn resolve_key(raw: &str, var: &str) -> Result<String> {
    if raw.trim().eq_ignore_ascii_case("env") {
        return env::var(var).map_err(|_| anyhow!("Missing {var} env var"));
    }
    Ok(raw.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = SpamFilterConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.policy, Policy::default());
        assert_eq!(cfg.strategies.bayes.min_training, 25);
        assert_eq!(cfg.strategies.akismet.api_url, "rest.akismet.com/1.1/");
        assert_eq!(cfg.strategies.typepad.api_url, "api.antispam.typepad.com/1.1/");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = SpamFilterConfig::from_toml_str(
            r#"
            [policy]
            min_karma = 2
            purge_age_days = 0

            [strategies.extlinks]
            enabled = true
            karma = 4
            max_links = 0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.policy.min_karma, 2);
        assert_eq!(cfg.policy.purge_age_days, 7, "sanitized back to default");
        assert_eq!(cfg.strategies.extlinks.karma, 4);
        assert_eq!(cfg.strategies.extlinks.max_links, 4);
    }

    #[test]
    fn strategy_karma_is_clamped_at_load() {
        let cfg = SpamFilterConfig::from_toml_str(
            r#"
            [strategies.regex]
            enabled = true
            karma = 1000000
            patterns_path = "config/bad_content.txt"

            [strategies.bayes]
            enabled = true
            karma = -12
            min_training = 5

            [strategies.spamwipe]
            enabled = true
            karma = 2147483647
            api_url = "http://api.spamwipe.com/1.0/comments/"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.strategies.regex.karma, MAX_KARMA_POINTS);
        assert_eq!(cfg.strategies.bayes.karma, 12);
        assert_eq!(cfg.strategies.spamwipe.karma, MAX_KARMA_POINTS);
        assert_eq!(cfg.strategies.duplicate.karma, 3);
    }

    #[test]
    fn default_strategies_match_empty_file() {
        let d = StrategiesConfig::default();
        assert_eq!(d.akismet.api_url, "rest.akismet.com/1.1/");
        assert_eq!(d.typepad.api_url, "api.antispam.typepad.com/1.1/");
        assert!(!d.spamwipe.enabled);
        assert!(!d.ip_blacklist.enabled);
    }

    #[serial_test::serial]
    #[test]
    fn env_keys_are_resolved() {
        env::set_var("AKISMET_API_KEY", "abc123");
        let cfg = SpamFilterConfig::from_toml_str(
            r#"
            [strategies.akismet]
            enabled = true
            karma = 5
            api_key = "ENV"
            api_url = "rest.akismet.com/1.1/"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.strategies.akismet.api_key, "abc123");
        env::remove_var("AKISMET_API_KEY");
        assert!(SpamFilterConfig::from_toml_str(
            "[strategies.akismet]\nenabled = true\nkarma = 5\napi_key = \"env\"\napi_url = \"x/\"\n"
        )
        .is_err());
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_path() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("spamfilter.toml");
        let mut f = fs::File::create(&p).unwrap();
        writeln!(f, "[policy]\nmin_karma = -3").unwrap();
        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        let cfg = SpamFilterConfig::load_default().unwrap();
        assert_eq!(cfg.policy.min_karma, -3);

        env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml").display().to_string());
        assert!(SpamFilterConfig::load_default().is_err());
        env::remove_var(ENV_CONFIG_PATH);
    }
}
