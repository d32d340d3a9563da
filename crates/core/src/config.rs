use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub assets: AssetsConfig,
    pub branding: BrandingConfig,
    pub delivery: DeliveryConfig,
    pub archive: ArchiveConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AssetsConfig {
    pub logo_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct BrandingConfig {
    pub company_name: String,
}

/// Outbound email settings. Delivery is attempted only when `api_key` is set.
#[derive(Clone, Debug)]
pub struct DeliveryConfig {
    pub provider: DeliveryProvider,
    pub api_key: Option<SecretString>,
    pub from_address: String,
    pub to_addresses: Vec<String>,
    pub cc_addresses: Vec<String>,
    pub timeout_secs: u64,
    pub base_url: Option<String>,
}

/// Cloud archival settings. Archival is attempted only when `access_token` is set.
#[derive(Clone, Debug)]
pub struct ArchiveConfig {
    pub access_token: Option<SecretString>,
    pub select_user: Option<String>,
    pub root_namespace: Option<String>,
    pub folder: String,
    pub timeout_secs: u64,
    pub base_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryProvider {
    #[serde(rename = "sendgrid")]
    SendGrid,
    Resend,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub logo_path: Option<PathBuf>,
    pub delivery_provider: Option<DeliveryProvider>,
    pub delivery_api_key: Option<String>,
    pub delivery_base_url: Option<String>,
    pub archive_access_token: Option<String>,
    pub archive_select_user: Option<String>,
    pub archive_root_namespace: Option<String>,
    pub archive_base_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 3000,
                graceful_shutdown_secs: 15,
            },
            assets: AssetsConfig { logo_path: PathBuf::from("assets/logo.png") },
            branding: BrandingConfig { company_name: "Split Road Media".to_string() },
            delivery: DeliveryConfig {
                provider: DeliveryProvider::SendGrid,
                api_key: None,
                from_address: "hello@splitroadmedia.com".to_string(),
                to_addresses: vec!["accounting@splitroadmedia.com".to_string()],
                cc_addresses: vec!["dennis@splitroadmedia.com".to_string()],
                timeout_secs: 30,
                base_url: None,
            },
            archive: ArchiveConfig {
                access_token: None,
                select_user: None,
                root_namespace: None,
                folder: "/Quotes".to_string(),
                timeout_secs: 30,
                base_url: None,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl DeliveryProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendGrid => "sendgrid",
            Self::Resend => "resend",
        }
    }

    /// Variable name the provider's own tooling uses for its API key.
    fn native_key_var(&self) -> &'static str {
        match self {
            Self::SendGrid => "SENDGRID_API_KEY",
            Self::Resend => "RESEND_API_KEY",
        }
    }
}

impl std::fmt::Display for DeliveryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeliveryProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sendgrid" => Ok(Self::SendGrid),
            "resend" => Ok(Self::Resend),
            other => Err(ConfigError::Validation(format!(
                "unsupported delivery provider `{other}` (expected sendgrid|resend)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl DeliveryConfig {
    pub fn is_configured(&self) -> bool {
        has_secret(self.api_key.as_ref())
    }
}

impl ArchiveConfig {
    pub fn is_configured(&self) -> bool {
        has_secret(self.access_token.as_ref())
    }
}

fn has_secret(secret: Option<&SecretString>) -> bool {
    secret.map(|value| !value.expose_secret().trim().is_empty()).unwrap_or(false)
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("quotedesk.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        let explicit_key = options.overrides.delivery_api_key.is_some()
            || read_env("QUOTEDESK_DELIVERY_API_KEY").is_some();
        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        if !explicit_key {
            config.apply_native_key_alias();
        }
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(assets) = patch.assets {
            if let Some(logo_path) = assets.logo_path {
                self.assets.logo_path = logo_path;
            }
        }

        if let Some(branding) = patch.branding {
            if let Some(company_name) = branding.company_name {
                self.branding.company_name = company_name;
            }
        }

        if let Some(delivery) = patch.delivery {
            if let Some(provider) = delivery.provider {
                self.delivery.provider = provider;
            }
            if let Some(delivery_api_key_value) = delivery.api_key {
                self.delivery.api_key = Some(secret_value(delivery_api_key_value));
            }
            if let Some(from_address) = delivery.from_address {
                self.delivery.from_address = from_address;
            }
            if let Some(to_addresses) = delivery.to_addresses {
                self.delivery.to_addresses = to_addresses;
            }
            if let Some(cc_addresses) = delivery.cc_addresses {
                self.delivery.cc_addresses = cc_addresses;
            }
            if let Some(timeout_secs) = delivery.timeout_secs {
                self.delivery.timeout_secs = timeout_secs;
            }
            if let Some(base_url) = delivery.base_url {
                self.delivery.base_url = Some(base_url);
            }
        }

        if let Some(archive) = patch.archive {
            if let Some(archive_token_value) = archive.access_token {
                self.archive.access_token = Some(secret_value(archive_token_value));
            }
            if let Some(select_user) = archive.select_user {
                self.archive.select_user = Some(select_user);
            }
            if let Some(root_namespace) = archive.root_namespace {
                self.archive.root_namespace = Some(root_namespace);
            }
            if let Some(folder) = archive.folder {
                self.archive.folder = folder;
            }
            if let Some(timeout_secs) = archive.timeout_secs {
                self.archive.timeout_secs = timeout_secs;
            }
            if let Some(base_url) = archive.base_url {
                self.archive.base_url = Some(base_url);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("QUOTEDESK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("QUOTEDESK_SERVER_PORT") {
            self.server.port = parse_u16("QUOTEDESK_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("QUOTEDESK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("QUOTEDESK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("QUOTEDESK_ASSETS_LOGO_PATH") {
            self.assets.logo_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("QUOTEDESK_BRANDING_COMPANY_NAME") {
            self.branding.company_name = value;
        }

        if let Some(value) = read_env("QUOTEDESK_DELIVERY_PROVIDER") {
            self.delivery.provider = value.parse()?;
        }
        if let Some(value) = read_env("QUOTEDESK_DELIVERY_API_KEY") {
            self.delivery.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("QUOTEDESK_DELIVERY_FROM_ADDRESS") {
            self.delivery.from_address = value;
        }
        if let Some(value) = read_env("QUOTEDESK_DELIVERY_TO_ADDRESSES") {
            self.delivery.to_addresses = split_list(&value);
        }
        if let Some(value) = read_env("QUOTEDESK_DELIVERY_CC_ADDRESSES") {
            self.delivery.cc_addresses = split_list(&value);
        }
        if let Some(value) = read_env("QUOTEDESK_DELIVERY_TIMEOUT_SECS") {
            self.delivery.timeout_secs = parse_u64("QUOTEDESK_DELIVERY_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("QUOTEDESK_DELIVERY_BASE_URL") {
            self.delivery.base_url = Some(value);
        }

        let archive_token = read_env("QUOTEDESK_ARCHIVE_ACCESS_TOKEN")
            .or_else(|| read_env("DROPBOX_ACCESS_TOKEN"));
        if let Some(value) = archive_token {
            self.archive.access_token = Some(secret_value(value));
        }
        let select_user = read_env("QUOTEDESK_ARCHIVE_SELECT_USER")
            .or_else(|| read_env("DROPBOX_TEAM_MEMBER_ID"));
        if let Some(value) = select_user {
            self.archive.select_user = Some(value);
        }
        let root_namespace = read_env("QUOTEDESK_ARCHIVE_ROOT_NAMESPACE")
            .or_else(|| read_env("DROPBOX_ROOT_NAMESPACE"));
        if let Some(value) = root_namespace {
            self.archive.root_namespace = Some(value);
        }
        if let Some(value) = read_env("QUOTEDESK_ARCHIVE_FOLDER") {
            self.archive.folder = value;
        }
        if let Some(value) = read_env("QUOTEDESK_ARCHIVE_TIMEOUT_SECS") {
            self.archive.timeout_secs = parse_u64("QUOTEDESK_ARCHIVE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("QUOTEDESK_ARCHIVE_BASE_URL") {
            self.archive.base_url = Some(value);
        }

        let log_level =
            read_env("QUOTEDESK_LOGGING_LEVEL").or_else(|| read_env("QUOTEDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("QUOTEDESK_LOGGING_FORMAT").or_else(|| read_env("QUOTEDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    /// Reads the key from the final provider's own variable, so a provider chosen by override
    /// picks up its matching key.
    fn apply_native_key_alias(&mut self) {
        if let Some(value) = read_env(self.delivery.provider.native_key_var()) {
            self.delivery.api_key = Some(secret_value(value));
        }
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(logo_path) = overrides.logo_path {
            self.assets.logo_path = logo_path;
        }
        if let Some(provider) = overrides.delivery_provider {
            self.delivery.provider = provider;
        }
        if let Some(delivery_api_key) = overrides.delivery_api_key {
            self.delivery.api_key = Some(secret_value(delivery_api_key));
        }
        if let Some(base_url) = overrides.delivery_base_url {
            self.delivery.base_url = Some(base_url);
        }
        if let Some(access_token) = overrides.archive_access_token {
            self.archive.access_token = Some(secret_value(access_token));
        }
        if let Some(select_user) = overrides.archive_select_user {
            self.archive.select_user = Some(select_user);
        }
        if let Some(root_namespace) = overrides.archive_root_namespace {
            self.archive.root_namespace = Some(root_namespace);
        }
        if let Some(base_url) = overrides.archive_base_url {
            self.archive.base_url = Some(base_url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_server(&self.server)?;
        validate_delivery(&self.delivery)?;
        validate_archive(&self.archive)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("quotedesk.toml"), PathBuf::from("config/quotedesk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_delivery(delivery: &DeliveryConfig) -> Result<(), ConfigError> {
    if delivery.timeout_secs == 0 || delivery.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "delivery.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if let Some(base_url) = &delivery.base_url {
        validate_http_url("delivery.base_url", base_url)?;
    }

    if !delivery.is_configured() {
        return Ok(());
    }

    if !looks_like_address(&delivery.from_address) {
        return Err(ConfigError::Validation(format!(
            "delivery.from_address `{}` is not an email address",
            delivery.from_address
        )));
    }

    if delivery.to_addresses.iter().all(|address| address.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "delivery.to_addresses needs at least one internal recipient when delivery.api_key is set"
                .to_string(),
        ));
    }

    for address in delivery.to_addresses.iter().chain(&delivery.cc_addresses) {
        if !looks_like_address(address) {
            return Err(ConfigError::Validation(format!(
                "delivery recipient `{address}` is not an email address"
            )));
        }
    }

    Ok(())
}

fn validate_archive(archive: &ArchiveConfig) -> Result<(), ConfigError> {
    if archive.timeout_secs == 0 || archive.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "archive.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if !archive.folder.starts_with('/') {
        return Err(ConfigError::Validation(
            "archive.folder must be an absolute path starting with `/`".to_string(),
        ));
    }

    if let Some(base_url) = &archive.base_url {
        validate_http_url("archive.base_url", base_url)?;
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{key} must start with http:// or https://")))
    }
}

fn looks_like_address(value: &str) -> bool {
    crate::domain::quote::is_email_shaped(value.trim())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    server: Option<ServerPatch>,
    assets: Option<AssetsPatch>,
    branding: Option<BrandingPatch>,
    delivery: Option<DeliveryPatch>,
    archive: Option<ArchivePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AssetsPatch {
    logo_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct BrandingPatch {
    company_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DeliveryPatch {
    provider: Option<DeliveryProvider>,
    api_key: Option<String>,
    from_address: Option<String>,
    to_addresses: Option<Vec<String>>,
    cc_addresses: Option<Vec<String>>,
    timeout_secs: Option<u64>,
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ArchivePatch {
    access_token: Option<String>,
    select_user: Option<String>,
    root_namespace: Option<String>,
    folder: Option<String>,
    timeout_secs: Option<u64>,
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
