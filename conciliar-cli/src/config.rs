use anyhow::{Context, Result, anyhow, bail};
use chrono_tz::Tz;
use conciliar_finance::{LabelRemoval, NarrationMatcher, PrefixMatcher, TokenSetMatcher};
use conciliar_ingest::{AmountColumn, ParserOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::state::{default_data_dir, ensure_conciliar_home};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralSection,
    pub storage: StorageSection,
    pub parser: ParserSection,
    pub matcher: MatcherSection,
    pub categories: CategoriesSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSection {
    /// IANA zone used for the merged statement's "Gerado em" stamp
    pub timezone: String,
    /// tracing filter used when RUST_LOG is unset
    pub log_level: String,
}

impl Default for GeneralSection {
    fn default() -> Self {
        Self {
            timezone: "America/Fortaleza".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub backend: Backend,
    /// Local backend root (default: ~/.conciliar/data)
    pub data_dir: Option<PathBuf>,
    /// Remote backend project URL, e.g. https://xyz.supabase.co
    pub remote_url: Option<String>,
    pub remote_key: Option<String>,
    pub bucket: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: Backend::Local,
            data_dir: None,
            remote_url: None,
            remote_key: None,
            bucket: "extratos".to_string(),
        }
    }
}

impl StorageSection {
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_data_dir(),
        }
    }

    /// URL and key for the remote backend; `CONCILIAR_REMOTE_KEY` overrides the file.
    pub fn remote_credentials(&self) -> Result<(String, String)> {
        let url = self
            .remote_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| anyhow!("storage.remote_url is not set"))?;
        let key = std::env::var("CONCILIAR_REMOTE_KEY")
            .ok()
            .or_else(|| self.remote_key.clone())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow!("storage.remote_key is not set (or export CONCILIAR_REMOTE_KEY)"))?;
        Ok((url.trim_end_matches('/').to_string(), key))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserSection {
    /// "last", or { from-end = n } when the last column is a running balance
    pub amount_column: AmountColumn,
}

impl ParserSection {
    pub fn options(&self) -> ParserOptions {
        ParserOptions { amount_column: self.amount_column }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NarrationStrategy {
    #[default]
    Prefix,
    TokenSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherSection {
    pub narration: NarrationStrategy,
    pub prefix_len: usize,
    pub token_threshold: f64,
}

impl Default for MatcherSection {
    fn default() -> Self {
        Self {
            narration: NarrationStrategy::Prefix,
            prefix_len: PrefixMatcher::default().prefix_len,
            token_threshold: TokenSetMatcher::default().threshold,
        }
    }
}

impl MatcherSection {
    pub fn narration_matcher(&self) -> Result<Box<dyn NarrationMatcher>> {
        match self.narration {
            NarrationStrategy::Prefix => {
                if self.prefix_len == 0 {
                    bail!("matcher.prefix_len must be greater than zero");
                }
                Ok(Box::new(PrefixMatcher { prefix_len: self.prefix_len }))
            }
            NarrationStrategy::TokenSet => {
                if !(0.0..=1.0).contains(&self.token_threshold) || self.token_threshold == 0.0 {
                    bail!("matcher.token_threshold must be in (0, 1]");
                }
                Ok(Box::new(TokenSetMatcher { threshold: self.token_threshold }))
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoriesSection {
    pub label_removal: LabelRemoval,
}

impl Config {
    pub fn timezone(&self) -> Result<Tz> {
        self.general
            .timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("invalid timezone {}: {e}", self.general.timezone))
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_conciliar_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

/// Defaults when the file does not exist.
pub fn load_config_from(p: &Path) -> Result<Config> {
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
    toml::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn save_config_to(cfg: &Config, p: &Path) -> Result<()> {
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config_to(&Config::default(), &p)?;
    println!("Wrote {}", p.display());
    Ok(())
}
