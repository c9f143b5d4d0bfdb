use serde::{Deserialize, Serialize};
use clap::{ArgAction, Parser, ValueEnum, ValueHint};
use dirs_next::home_dir;
use std::{fs, path::{Path, PathBuf}, time::Duration};
use thiserror::Error;

use crate::geocode::Placemark;

/// Launch argument that switches on the synthetic location provider
pub const TEST_MODE_ARG: &str = "testMode";

const DEFAULT_TIMEOUT_MS: u64 = 5000;
const DEFAULT_SETTLE_TIMEOUT_SECS: u64 = 30;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Top-level app configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub log_level: Option<String>,     // e.g., "info" | "debug"
    pub test_mode: Option<bool>,
    pub output: Option<OutputFormat>,
    pub location: Option<LocationConfig>,
    pub geocoder: Option<GeocoderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LocationConfig {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// starting permission state of the platform provider
    pub authorization: Option<AuthorizationSetting>,
    /// keep updating on this period instead of a single fix
    pub update_interval_secs: Option<u64>,
    /// one-shot runs give up if no address arrives within this
    pub settle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GeocoderConfig {
    pub kind: Option<GeocoderKind>,
    pub base_url: Option<String>,
    pub timeout_ms: Option<u64>,
    pub user_agent: Option<String>,
    /// answers for the fixed geocoder
    pub placemarks: Option<Vec<Placemark>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationSetting {
    #[default]
    Prompt,
    Granted,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GeocoderKind {
    #[default]
    Nominatim,
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Banners,
    Plain,
    Json,
}

impl Config {
    pub fn test_mode(&self) -> bool {
        self.test_mode.unwrap_or(false)
    }

    pub fn output(&self) -> OutputFormat {
        self.output.unwrap_or_default()
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    pub fn user_agent(&self) -> String {
        self.geocoder
            .as_ref()
            .and_then(|g| g.user_agent.clone())
            .unwrap_or_else(|| concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string())
    }

    pub fn geocoder_timeout(&self) -> Duration {
        Duration::from_millis(
            self.geocoder.as_ref().and_then(|g| g.timeout_ms).unwrap_or(DEFAULT_TIMEOUT_MS),
        )
    }

    pub fn update_interval(&self) -> Option<Duration> {
        self.location
            .as_ref()
            .and_then(|l| l.update_interval_secs)
            .map(Duration::from_secs)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_secs(
            self.location
                .as_ref()
                .and_then(|l| l.settle_timeout_secs)
                .unwrap_or(DEFAULT_SETTLE_TIMEOUT_SECS),
        )
    }
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone)]
#[command(name = "teeloc", version, about = "Show where you are as a stack of colour banners")]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub log_level: Option<String>,
    /// Enable debug log level
    #[arg(short = 'v', long, alias = "verbose", action = ArgAction::SetTrue)]
    pub debug: bool,
    /// Synthetic location: always authorized, fixed coordinate
    #[arg(long, action = ArgAction::SetTrue)]
    pub test_mode: bool,
    #[arg(long, value_enum)]
    pub output: Option<OutputFormat>,
    #[arg(long, allow_hyphen_values = true)]
    pub latitude: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    pub longitude: Option<f64>,
    #[arg(long, value_enum)]
    pub authorization: Option<AuthorizationSetting>,
    #[arg(long)]
    pub update_interval_secs: Option<u64>,
    #[arg(long)]
    pub settle_timeout_secs: Option<u64>,
    #[arg(long, value_enum)]
    pub geocoder: Option<GeocoderKind>,
    #[arg(long, value_hint = ValueHint::Url)]
    pub nominatim_url: Option<String>,
    #[arg(long)]
    pub timeout_ms: Option<u64>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
    /// Bare launch arguments; `testMode` enables test mode
    #[arg(hide = true)]
    pub launch_args: Vec<String>,
}

impl Cli {
    pub fn wants_test_mode(&self) -> bool {
        self.test_mode
            || self.launch_args.iter().any(|a| a.eq_ignore_ascii_case(TEST_MODE_ARG))
    }
}

/// Public entry point: parse CLI, read YAML, merge, validate.
pub fn load() -> Result<Config, ConfigError> {
    let cli = Cli::parse();
    let cfg = resolve(&cli)?;

    if cli.dump_config {
        // Pretty YAML of effective config (nice for debugging)
        let s = serde_yaml::to_string(&cfg)?;
        println!("{s}");
        std::process::exit(0);
    }

    Ok(cfg)
}

/// defaults -> YAML -> CLI, then validate
pub fn resolve(cli: &Cli) -> Result<Config, ConfigError> {
    // 1) defaults (from `Default` impl)
    let mut cfg = Config::default();

    // 2) YAML file (explicit path or search)
    if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            let y = read_yaml(p)?;
            merge(&mut cfg, y);
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
    } else if let Some(p) = find_config_file() {
        let y = read_yaml(&p)?;
        merge(&mut cfg, y);
    }

    // 3) CLI overrides (highest precedence)
    apply_cli_overrides(&mut cfg, cli);

    // 4) Validate
    validate(&cfg)?;

    Ok(cfg)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/teeloc/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/teeloc/config.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/teeloc.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["teeloc.yaml", "config.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&s)?;
    Ok(cfg)
}

/// Shallow merge `src` into `dst`, Option-by-Option.
fn merge(dst: &mut Config, src: Config) {
    if src.log_level.is_some()  { dst.log_level = src.log_level; }
    if src.test_mode.is_some()  { dst.test_mode = src.test_mode; }
    if src.output.is_some()     { dst.output = src.output; }
    match (&mut dst.location, src.location) {
        (None, Some(c)) => dst.location = Some(c),
        (Some(d), Some(s)) => merge_location(d, s),
        _ => {}
    }
    match (&mut dst.geocoder, src.geocoder) {
        (None, Some(c)) => dst.geocoder = Some(c),
        (Some(d), Some(s)) => merge_geocoder(d, s),
        _ => {}
    }
}

fn merge_location(dst: &mut LocationConfig, src: LocationConfig) {
    if src.latitude.is_some()             { dst.latitude = src.latitude; }
    if src.longitude.is_some()            { dst.longitude = src.longitude; }
    if src.authorization.is_some()        { dst.authorization = src.authorization; }
    if src.update_interval_secs.is_some() { dst.update_interval_secs = src.update_interval_secs; }
    if src.settle_timeout_secs.is_some()  { dst.settle_timeout_secs = src.settle_timeout_secs; }
}

fn merge_geocoder(dst: &mut GeocoderConfig, src: GeocoderConfig) {
    if src.kind.is_some()       { dst.kind = src.kind; }
    if src.base_url.is_some()   { dst.base_url = src.base_url; }
    if src.timeout_ms.is_some() { dst.timeout_ms = src.timeout_ms; }
    if src.user_agent.is_some() { dst.user_agent = src.user_agent; }
    if src.placemarks.is_some() { dst.placemarks = src.placemarks; }
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if cli.log_level.is_some() { cfg.log_level = cli.log_level.clone(); }
    if cli.debug               { cfg.log_level = Some("debug".to_string()); }
    if cli.wants_test_mode()   { cfg.test_mode = Some(true); }
    if cli.output.is_some()    { cfg.output = cli.output; }

    let any_location = cli.latitude.is_some()
        || cli.longitude.is_some()
        || cli.authorization.is_some()
        || cli.update_interval_secs.is_some()
        || cli.settle_timeout_secs.is_some();
    if any_location && cfg.location.is_none() {
        cfg.location = Some(LocationConfig::default());
    }
    if let Some(location) = cfg.location.as_mut() {
        if cli.latitude.is_some()             { location.latitude = cli.latitude; }
        if cli.longitude.is_some()            { location.longitude = cli.longitude; }
        if cli.authorization.is_some()        { location.authorization = cli.authorization; }
        if cli.update_interval_secs.is_some() { location.update_interval_secs = cli.update_interval_secs; }
        if cli.settle_timeout_secs.is_some()  { location.settle_timeout_secs = cli.settle_timeout_secs; }
    }

    let any_geocoder = cli.geocoder.is_some()
        || cli.nominatim_url.is_some()
        || cli.timeout_ms.is_some();
    if any_geocoder && cfg.geocoder.is_none() {
        cfg.geocoder = Some(GeocoderConfig::default());
    }
    if let Some(geocoder) = cfg.geocoder.as_mut() {
        if cli.geocoder.is_some()      { geocoder.kind = cli.geocoder; }
        if cli.nominatim_url.is_some() { geocoder.base_url = cli.nominatim_url.clone(); }
        if cli.timeout_ms.is_some()    { geocoder.timeout_ms = cli.timeout_ms; }
    }
}

/// Put any invariants here (required fields, ranges, etc.)
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if let Some(location) = cfg.location.as_ref() {
        match (location.latitude, location.longitude) {
            (Some(lat), Some(lng)) => {
                if !(-90.0..=90.0).contains(&lat) {
                    return Err(ConfigError::Validation("latitude must be within -90..=90".into()));
                }
                if !(-180.0..=180.0).contains(&lng) {
                    return Err(ConfigError::Validation("longitude must be within -180..=180".into()));
                }
            }
            (None, None) => {}
            _ => return Err(ConfigError::Validation("latitude and longitude must be given together".into())),
        }
        if location.update_interval_secs == Some(0) {
            return Err(ConfigError::Validation("location update_interval_secs must be > 0".into()));
        }
        if location.settle_timeout_secs == Some(0) {
            return Err(ConfigError::Validation("location settle_timeout_secs must be > 0".into()));
        }
    }
    if let Some(geocoder) = cfg.geocoder.as_ref() {
        if geocoder.timeout_ms == Some(0) {
            return Err(ConfigError::Validation("geocoder timeout_ms must be > 0".into()));
        }
        if let Some(url) = geocoder.base_url.as_deref() {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Validation(format!("geocoder base_url must be http(s): {url}")));
            }
        }
    }
    Ok(())
}
