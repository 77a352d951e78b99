pub mod types;


pub use types::*;

use anyhow::Result;
use std::path::Path;

impl LimiterConfig {
    /// Load configuration from a file (if it exists) and apply environment
    /// variable overrides for infrastructure settings. When the file does
    /// not exist, built-in defaults are used — the service starts with zero
    /// configuration for local development.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: LimiterConfig = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match path.extension().and_then(|e| e.to_str()) {
                Some("toml") => toml::from_str(&content)?,
                Some("json") => serde_json::from_str(&content)?,
                Some(ext) => anyhow::bail!("unsupported config format: .{ext}, use .toml or .json"),
                None => anyhow::bail!("config file has no extension, use .toml or .json"),
            }
        } else {
            tracing::info!("config file not found at {}, using defaults", path.display());
            LimiterConfig::default()
        };

        config.apply_env_overrides();

        config.validate()?;
        tracing::info!("loaded limiter configuration");
        Ok(config)
    }

    /// Apply environment variable overrides for connection/engine settings.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("THEMIS_STORE_URL") {
            self.store.url = v;
        }
        if let Ok(v) = std::env::var("THEMIS_CACHE_TTL_SECONDS") {
            if let Ok(n) = v.parse::<u64>() {
                self.cache.ttl_seconds = n;
            }
        }
        if let Ok(v) = std::env::var("THEMIS_SLOW_START_ENABLED") {
            self.slow_start.enabled = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("THEMIS_SLOW_START_DURATION") {
            if let Ok(n) = v.parse::<u64>() {
                self.slow_start.duration_seconds = n;
            }
        }
        if let Ok(v) = std::env::var("THEMIS_AUDIT_ENABLED") {
            self.audit.enabled = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("THEMIS_AUDIT_MAX_EVENTS") {
            if let Ok(n) = v.parse::<usize>() {
                self.audit.max_events = n;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.slow_start.enabled {
            if self.slow_start.stages.is_empty() {
                anyhow::bail!("slow_start.stages cannot be empty when enabled");
            }
            if self.slow_start.duration_seconds == 0 {
                anyhow::bail!("slow_start.duration_seconds must be > 0 when enabled");
            }
            let mut prev = 0.0;
            for &s in &self.slow_start.stages {
                if s <= 0.0 || s > 1.0 {
                    anyhow::bail!("slow_start stage {} out of range (0, 1]", s);
                }
                if s < prev {
                    anyhow::bail!("slow_start.stages must be ascending");
                }
                prev = s;
            }
        }

        if self.audit.max_events == 0 {
            anyhow::bail!("audit.max_events must be > 0");
        }

        for entry in &self.policies {
            if entry.tier.eq_ignore_ascii_case("unlimited") {
                anyhow::bail!("tier 'unlimited' cannot carry policies");
            }
            if !["free", "premium", "enterprise"]
                .iter()
                .any(|t| entry.tier.eq_ignore_ascii_case(t))
            {
                anyhow::bail!("unknown tier '{}'", entry.tier);
            }
            let p = &entry.policy;
            if p.window_seconds == 0 {
                anyhow::bail!(
                    "policy {}/{}: window_seconds must be > 0",
                    entry.tier,
                    entry.endpoint
                );
            }
            if p.max == 0 || p.burst == 0 {
                anyhow::bail!(
                    "policy {}/{}: max and burst must be >= 1",
                    entry.tier,
                    entry.endpoint
                );
            }
        }

        for (region, mult) in &self.regions {
            if *mult <= 0.0 {
                anyhow::bail!("region {} multiplier must be positive", region);
            }
        }

        Ok(())
    }
}
