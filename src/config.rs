use std::path::PathBuf;
use std::time::Duration;

use crate::logging::{log, obj, v_str, Domain, Level};
use crate::retry::RetryConfig;

/// Which backend response contract the client speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractVersion {
    /// Sun-path window in the parameters and an `ame_diagram` in every response.
    Extended,
    /// Deprecated: no sun-path window, no air-mass-effect chart.
    Legacy,
}

impl ContractVersion {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "extended" => Some(ContractVersion::Extended),
            "legacy" => Some(ContractVersion::Legacy),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractVersion::Extended => "extended",
            ContractVersion::Legacy => "legacy",
        }
    }
}

/// Where chart definitions and the locale are loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetMode {
    Embedded,
    Dir(PathBuf),
    Http,
}

impl AssetMode {
    /// `embedded`, `http` or `fs:<dir>`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "embedded" => Some(AssetMode::Embedded),
            "http" => Some(AssetMode::Http),
            v => match v.strip_prefix("fs:") {
                Some(dir) if !dir.is_empty() => Some(AssetMode::Dir(PathBuf::from(dir))),
                _ => None,
            },
        }
    }
}

/// `Ok(None)` when unset or empty; `Err` carries text `parse` rejected.
fn parse_setting<T>(raw: Option<&str>, parse: impl Fn(&str) -> Option<T>) -> Result<Option<T>, String> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => parse(v).map(Some).ok_or_else(|| v.to_string()),
    }
}

/// Read `var`, falling back to `default`. Unrecognized values are logged.
fn env_setting<T>(var: &str, parse: impl Fn(&str) -> Option<T>, default: T) -> T {
    let raw = std::env::var(var).ok();
    match parse_setting(raw.as_deref(), parse) {
        Ok(Some(v)) => v,
        Ok(None) => default,
        Err(value) => {
            log(
                Level::Warn,
                Domain::System,
                "config_default",
                obj(&[("var", v_str(var)), ("value", v_str(&value)), ("msg", v_str("unrecognized value, using default"))]),
            );
            default
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend_url: String,
    pub assets: AssetMode,
    pub out_dir: PathBuf,
    pub contract: ContractVersion,
    pub retries: u32,
    pub retry_base_ms: u64,
    pub timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            backend_url: std::env::var("PVGRID_BACKEND").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string()),
            assets: env_setting("PVGRID_ASSETS", AssetMode::parse, AssetMode::Embedded),
            out_dir: PathBuf::from(std::env::var("PVGRID_OUT_DIR").unwrap_or_else(|_| "out/charts".to_string())),
            contract: env_setting("PVGRID_CONTRACT", ContractVersion::from_name, ContractVersion::Extended),
            retries: env_setting("PVGRID_RETRIES", |v| v.parse().ok(), 2),
            retry_base_ms: env_setting("PVGRID_RETRY_BASE_MS", |v| v.parse().ok(), 200),
            timeout_secs: env_setting("PVGRID_TIMEOUT_SECS", |v| v.parse().ok(), 30),
        }
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.retries,
            base_delay_ms: self.retry_base_ms,
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_mode_parse() {
        assert_eq!(AssetMode::parse("embedded"), Some(AssetMode::Embedded));
        assert_eq!(AssetMode::parse("http"), Some(AssetMode::Http));
        assert_eq!(AssetMode::parse("fs:static"), Some(AssetMode::Dir(PathBuf::from("static"))));
        assert_eq!(AssetMode::parse("fs:"), None);
        assert_eq!(AssetMode::parse("htp"), None);
    }

    #[test]
    fn test_contract_names() {
        assert_eq!(ContractVersion::from_name("extended"), Some(ContractVersion::Extended));
        assert_eq!(ContractVersion::from_name("legacy"), Some(ContractVersion::Legacy));
        assert_eq!(ContractVersion::from_name("legcy"), None);
    }

    #[test]
    fn test_unset_setting_takes_default_quietly() {
        assert_eq!(parse_setting(None, ContractVersion::from_name), Ok(None));
        assert_eq!(parse_setting(Some(" "), ContractVersion::from_name), Ok(None));
        assert_eq!(parse_setting(Some("legacy"), ContractVersion::from_name), Ok(Some(ContractVersion::Legacy)));
    }

    #[test]
    fn test_unrecognized_setting_is_reported() {
        assert_eq!(parse_setting(Some("legcy"), ContractVersion::from_name), Err("legcy".to_string()));
        assert_eq!(parse_setting(Some("ftp"), AssetMode::parse), Err("ftp".to_string()));
        assert_eq!(parse_setting(Some("two"), |v| v.parse::<u32>().ok()), Err("two".to_string()));
    }

    #[test]
    fn test_unrecognized_env_value_falls_back() {
        std::env::set_var("PVGRID_TEST_ONLY_CONTRACT", "legcy");
        let contract = env_setting("PVGRID_TEST_ONLY_CONTRACT", ContractVersion::from_name, ContractVersion::Extended);
        assert_eq!(contract, ContractVersion::Extended);
        std::env::remove_var("PVGRID_TEST_ONLY_CONTRACT");
    }
}
