use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Full run configuration, assembled in this order (each layer overrides
/// the one before it): built-in defaults, `rustylang.toml`, environment
/// variables, then whatever flags the CLI layer applies on top.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub api_key: String,
    pub api_url: String,
    pub model_name: String,
    pub max_concurrent_requests: usize,
    pub rpm_limit: f64,
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_delay_secs: f64,
    pub glossary_dir: PathBuf,
    pub curated_db_path: PathBuf,
    pub discovery_db_path: PathBuf,
    pub enable_llm_discovery: bool,
    pub target_lang: String,
    pub temp_terms: f32,
    pub temp_literal: f32,
    pub temp_polish: f32,
    pub bilingual: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: "http://localhost:19183/v1/chat/completions".to_string(),
            model_name: "gpt-4o-mini".to_string(),
            max_concurrent_requests: 4,
            rpm_limit: 60.0,
            batch_size: 8,
            max_retries: 3,
            retry_delay_secs: 2.0,
            glossary_dir: PathBuf::from("glossaries"),
            curated_db_path: PathBuf::from("glossary_curated.db"),
            discovery_db_path: PathBuf::from("glossary_discovery.db"),
            enable_llm_discovery: true,
            target_lang: "zh".to_string(),
            temp_terms: 0.1,
            temp_literal: 0.3,
            temp_polish: 0.5,
            bilingual: true,
        }
    }
}

/// Load `rustylang.toml` from the current directory if present, then layer
/// the handful of environment variables the original tool also honored on
/// top. Missing file is not an error: defaults apply.
pub fn load_config() -> Result<RunConfig> {
    let path = PathBuf::from("rustylang.toml");
    let mut cfg = if path.exists() {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config file {:?}", path))?;
        toml::from_str(&contents).with_context(|| format!("parsing config file {:?}", path))?
    } else {
        RunConfig::default()
    };

    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

fn apply_env_overrides(cfg: &mut RunConfig) {
    if let Ok(v) = std::env::var("RUSTYLANG_API_KEY") {
        cfg.api_key = v;
    }
    if let Ok(v) = std::env::var("RUSTYLANG_API_URL") {
        cfg.api_url = v;
    }
    if let Ok(v) = std::env::var("RUSTYLANG_MODEL") {
        cfg.model_name = v;
    }
    if let Ok(v) = std::env::var("RUSTYLANG_TARGET_LANG") {
        cfg.target_lang = v;
    }
    if let Ok(v) = std::env::var("RUSTYLANG_MAX_CONCURRENT") {
        if let Ok(n) = v.parse() {
            cfg.max_concurrent_requests = n;
        }
    }
    if let Ok(v) = std::env::var("RUSTYLANG_RPM_LIMIT") {
        if let Ok(n) = v.parse() {
            cfg.rpm_limit = n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_baseline() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.batch_size, 8);
        assert_eq!(cfg.max_concurrent_requests, 4);
        assert_eq!(cfg.target_lang, "zh");
    }
}
