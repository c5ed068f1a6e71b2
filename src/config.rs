//! Compiler configuration.
//!
//! Loads settings from `./macpol.toml` (or `$MACPOL_CONFIG_PATH`).
//! Environment variables override file values; file values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::expand::DEFAULT_MAX_EXPANDED_RULES;
use crate::policydb::{HandleUnknown, TargetPlatform, KERNEL_VERSION_MAX};

// ── Top-level config ────────────────────────────────────────────

/// Top-level compiler configuration loaded from TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Output policy settings (`[policy]`).
    pub policy: PolicyConfig,
    /// Resource limits (`[limits]`).
    pub limits: LimitsConfig,
    /// Optional verification passes (`[checks]`).
    pub checks: ChecksConfig,
    /// Initial SID requirements (`[sids]`).
    pub sids: SidsConfig,
    /// Log settings (`[logging]`).
    pub logging: LoggingConfig,
}

impl CompilerConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// Config file path: `$MACPOL_CONFIG_PATH` or `./macpol.toml`.
    /// A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let path = Self::config_path_with(|key| std::env::var(key).ok());
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config file {}: {e}",
                path.display()
            )),
        }
    }

    /// Resolve the config path using a custom env resolver.
    pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        env("MACPOL_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("macpol.toml"))
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function so callers and tests need not touch the
    /// process environment. Unparseable values are logged and ignored.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("MACPOL_POLICY_VERSION") {
            match v.trim().parse() {
                Ok(n) => self.policy.version = n,
                Err(_) => tracing::warn!(
                    var = "MACPOL_POLICY_VERSION",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("MACPOL_MLS") {
            match parse_bool(&v) {
                Some(b) => self.policy.mls = b,
                None => tracing::warn!(
                    var = "MACPOL_MLS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("MACPOL_HANDLE_UNKNOWN") {
            match HandleUnknown::parse(&v) {
                Some(h) => self.policy.handle_unknown = Some(h),
                None => tracing::warn!(
                    var = "MACPOL_HANDLE_UNKNOWN",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("MACPOL_MAX_EXPANDED_RULES") {
            match v.trim().parse() {
                Ok(n) => self.limits.max_expanded_rules = n,
                Err(_) => tracing::warn!(
                    var = "MACPOL_MAX_EXPANDED_RULES",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
    }

    /// Parse a TOML string into config.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or has mistyped fields.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: CompilerConfig =
            toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }
}

/// Load a config file without env overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: &Path) -> Result<CompilerConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config at {}", path.display()))?;
    CompilerConfig::from_toml(&contents)
        .with_context(|| format!("failed to parse config at {}", path.display()))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ── Sections ────────────────────────────────────────────────────

/// Output policy settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Kernel format version to emit.
    pub version: u32,
    /// Whether the output is an MLS policy.
    pub mls: bool,
    /// Overrides the base policy's unknown-permission handling when set.
    pub handle_unknown: Option<HandleUnknown>,
    /// Platform new databases target.
    pub target: TargetPlatform,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            version: KERNEL_VERSION_MAX,
            mls: false,
            handle_unknown: None,
            target: TargetPlatform::Selinux,
        }
    }
}

/// Resource limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Expanded rules the expander may generate before giving up.
    pub max_expanded_rules: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_expanded_rules: DEFAULT_MAX_EXPANDED_RULES,
        }
    }
}

/// Optional verification passes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChecksConfig {
    /// Check neverallow assertions.
    pub assertions: bool,
    /// Check bounds, dominance and constraint structure.
    pub hierarchy: bool,
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            assertions: true,
            hierarchy: true,
        }
    }
}

/// Initial SID requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SidsConfig {
    /// SID names every compiled policy must define.
    pub required: Vec<String>,
}

/// Log settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.policy.version, 33);
        assert!(!config.policy.mls);
        assert!(config.policy.handle_unknown.is_none());
        assert_eq!(config.limits.max_expanded_rules, 10_000_000);
        assert!(config.checks.assertions);
        assert!(config.checks.hierarchy);
        assert!(config.sids.required.is_empty());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[policy]
version = 30
mls = true
handle_unknown = "reject"
target = "xen"

[limits]
max_expanded_rules = 5000

[checks]
assertions = false
hierarchy = true

[sids]
required = ["kernel", "unlabeled"]

[logging]
level = "debug"
"#;
        let config = CompilerConfig::from_toml(toml_str).expect("should parse");
        assert_eq!(config.policy.version, 30);
        assert!(config.policy.mls);
        assert_eq!(config.policy.handle_unknown, Some(HandleUnknown::Reject));
        assert_eq!(config.policy.target, TargetPlatform::Xen);
        assert_eq!(config.limits.max_expanded_rules, 5000);
        assert!(!config.checks.assertions);
        assert_eq!(config.sids.required, vec!["kernel", "unlabeled"]);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_parse_empty_toml_uses_defaults() {
        let config = CompilerConfig::from_toml("").expect("should parse empty");
        assert_eq!(config, CompilerConfig::default());
    }

    #[test]
    fn test_env_overrides_config_values() {
        let mut config = CompilerConfig::from_toml("[policy]\nversion = 30\n").expect("parse");
        config.apply_overrides(|key| match key {
            "MACPOL_POLICY_VERSION" => Some("31".to_owned()),
            "MACPOL_MLS" => Some("true".to_owned()),
            "MACPOL_HANDLE_UNKNOWN" => Some("allow".to_owned()),
            "MACPOL_MAX_EXPANDED_RULES" => Some("42".to_owned()),
            _ => None,
        });
        assert_eq!(config.policy.version, 31);
        assert!(config.policy.mls);
        assert_eq!(config.policy.handle_unknown, Some(HandleUnknown::Allow));
        assert_eq!(config.limits.max_expanded_rules, 42);
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let mut config = CompilerConfig::default();
        config.apply_overrides(|key| match key {
            "MACPOL_POLICY_VERSION" => Some("latest".to_owned()),
            "MACPOL_MLS" => Some("maybe".to_owned()),
            "MACPOL_HANDLE_UNKNOWN" => Some("ignore".to_owned()),
            _ => None,
        });
        assert_eq!(config, CompilerConfig::default());
    }

    #[test]
    fn test_config_path_uses_env_var() {
        let path = CompilerConfig::config_path_with(|key| match key {
            "MACPOL_CONFIG_PATH" => Some("/custom/macpol.toml".to_owned()),
            _ => None,
        });
        assert_eq!(path, PathBuf::from("/custom/macpol.toml"));
    }

    #[test]
    fn test_config_path_defaults_to_cwd() {
        assert_eq!(
            CompilerConfig::config_path_with(|_| None),
            PathBuf::from("macpol.toml")
        );
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        assert!(CompilerConfig::from_toml("this is {{ not valid toml").is_err());
        assert!(CompilerConfig::from_toml("[policy]\nversion = \"new\"\n").is_err());
    }
}
