use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

use crate::geo::FeeSchedule;
use crate::ports::FlowSettings;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub telegram: TelegramConfig,
    pub payments: PaymentsConfig,
    pub storefront: StorefrontConfig,
    pub geocoder: GeocoderConfig,
    pub database: DatabaseConfig,
    pub menu: MenuConfig,
    pub delivery: DeliveryConfig,
    pub reminder: ReminderConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub api_base: String,
    pub poll_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PaymentsConfig {
    pub provider_token: SecretString,
    pub currency: String,
}

#[derive(Clone, Debug)]
pub struct StorefrontConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub token_ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub api_key: SecretString,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct MenuConfig {
    pub page_size: usize,
}

#[derive(Clone, Debug)]
pub struct DeliveryConfig {
    pub near_fee: Decimal,
    pub far_fee: Decimal,
}

#[derive(Clone, Debug)]
pub struct ReminderConfig {
    pub delay_secs: u64,
}

#[derive(Clone, Debug)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl FromStr for LogFormat {
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

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub bot_token: Option<String>,
    pub provider_token: Option<String>,
    pub storefront_client_id: Option<String>,
    pub storefront_client_secret: Option<String>,
    pub geocoder_api_key: Option<String>,
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
            telegram: TelegramConfig {
                bot_token: String::new().into(),
                api_base: "https://api.telegram.org".to_string(),
                poll_timeout_secs: 30,
            },
            payments: PaymentsConfig {
                provider_token: String::new().into(),
                currency: "RUB".to_string(),
            },
            storefront: StorefrontConfig {
                base_url: "https://api.moltin.com".to_string(),
                client_id: String::new(),
                client_secret: String::new().into(),
                token_ttl_secs: 3600,
            },
            geocoder: GeocoderConfig {
                base_url: "https://geocode-maps.yandex.ru/1.x".to_string(),
                api_key: String::new().into(),
            },
            database: DatabaseConfig {
                url: "sqlite://sliceline.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            menu: MenuConfig { page_size: 6 },
            delivery: DeliveryConfig {
                near_fee: Decimal::new(100, 0),
                far_fee: Decimal::new(300, 0),
            },
            reminder: ReminderConfig { delay_secs: 3600 },
            http: HttpConfig { timeout_secs: 10 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("sliceline.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Flow settings derived from the loaded config, handed to the
    /// dispatcher at wiring time.
    pub fn flow_settings(&self) -> FlowSettings {
        FlowSettings {
            page_size: self.menu.page_size,
            currency: self.payments.currency.clone(),
            fees: FeeSchedule { near: self.delivery.near_fee, far: self.delivery.far_fee },
        }
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(telegram) = patch.telegram {
            if let Some(bot_token_value) = telegram.bot_token {
                self.telegram.bot_token = bot_token_value.into();
            }
            if let Some(api_base) = telegram.api_base {
                self.telegram.api_base = api_base;
            }
            if let Some(poll_timeout_secs) = telegram.poll_timeout_secs {
                self.telegram.poll_timeout_secs = poll_timeout_secs;
            }
        }

        if let Some(payments) = patch.payments {
            if let Some(provider_token_value) = payments.provider_token {
                self.payments.provider_token = provider_token_value.into();
            }
            if let Some(currency) = payments.currency {
                self.payments.currency = currency;
            }
        }

        if let Some(storefront) = patch.storefront {
            if let Some(base_url) = storefront.base_url {
                self.storefront.base_url = base_url;
            }
            if let Some(client_id) = storefront.client_id {
                self.storefront.client_id = client_id;
            }
            if let Some(client_secret_value) = storefront.client_secret {
                self.storefront.client_secret = client_secret_value.into();
            }
            if let Some(token_ttl_secs) = storefront.token_ttl_secs {
                self.storefront.token_ttl_secs = token_ttl_secs;
            }
        }

        if let Some(geocoder) = patch.geocoder {
            if let Some(base_url) = geocoder.base_url {
                self.geocoder.base_url = base_url;
            }
            if let Some(api_key_value) = geocoder.api_key {
                self.geocoder.api_key = api_key_value.into();
            }
        }

        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(menu) = patch.menu {
            if let Some(page_size) = menu.page_size {
                self.menu.page_size = page_size;
            }
        }

        if let Some(delivery) = patch.delivery {
            if let Some(near_fee) = delivery.near_fee {
                self.delivery.near_fee = near_fee;
            }
            if let Some(far_fee) = delivery.far_fee {
                self.delivery.far_fee = far_fee;
            }
        }

        if let Some(reminder) = patch.reminder {
            if let Some(delay_secs) = reminder.delay_secs {
                self.reminder.delay_secs = delay_secs;
            }
        }

        if let Some(http) = patch.http {
            if let Some(timeout_secs) = http.timeout_secs {
                self.http.timeout_secs = timeout_secs;
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
        if let Some(value) = read_env("SLICELINE_TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = value.into();
        }
        if let Some(value) = read_env("SLICELINE_TELEGRAM_API_BASE") {
            self.telegram.api_base = value;
        }
        if let Some(value) = read_env("SLICELINE_TELEGRAM_POLL_TIMEOUT_SECS") {
            self.telegram.poll_timeout_secs =
                parse_u64("SLICELINE_TELEGRAM_POLL_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SLICELINE_PAYMENTS_PROVIDER_TOKEN") {
            self.payments.provider_token = value.into();
        }
        if let Some(value) = read_env("SLICELINE_PAYMENTS_CURRENCY") {
            self.payments.currency = value;
        }

        if let Some(value) = read_env("SLICELINE_STOREFRONT_BASE_URL") {
            self.storefront.base_url = value;
        }
        if let Some(value) = read_env("SLICELINE_STOREFRONT_CLIENT_ID") {
            self.storefront.client_id = value;
        }
        if let Some(value) = read_env("SLICELINE_STOREFRONT_CLIENT_SECRET") {
            self.storefront.client_secret = value.into();
        }
        if let Some(value) = read_env("SLICELINE_STOREFRONT_TOKEN_TTL_SECS") {
            self.storefront.token_ttl_secs =
                parse_u64("SLICELINE_STOREFRONT_TOKEN_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("SLICELINE_GEOCODER_BASE_URL") {
            self.geocoder.base_url = value;
        }
        if let Some(value) = read_env("SLICELINE_GEOCODER_API_KEY") {
            self.geocoder.api_key = value.into();
        }

        if let Some(value) = read_env("SLICELINE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("SLICELINE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("SLICELINE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SLICELINE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("SLICELINE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SLICELINE_MENU_PAGE_SIZE") {
            self.menu.page_size = parse_usize("SLICELINE_MENU_PAGE_SIZE", &value)?;
        }

        if let Some(value) = read_env("SLICELINE_DELIVERY_NEAR_FEE") {
            self.delivery.near_fee = parse_decimal("SLICELINE_DELIVERY_NEAR_FEE", &value)?;
        }
        if let Some(value) = read_env("SLICELINE_DELIVERY_FAR_FEE") {
            self.delivery.far_fee = parse_decimal("SLICELINE_DELIVERY_FAR_FEE", &value)?;
        }

        if let Some(value) = read_env("SLICELINE_REMINDER_DELAY_SECS") {
            self.reminder.delay_secs = parse_u64("SLICELINE_REMINDER_DELAY_SECS", &value)?;
        }

        if let Some(value) = read_env("SLICELINE_HTTP_TIMEOUT_SECS") {
            self.http.timeout_secs = parse_u64("SLICELINE_HTTP_TIMEOUT_SECS", &value)?;
        }

        let log_level =
            read_env("SLICELINE_LOGGING_LEVEL").or_else(|| read_env("SLICELINE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SLICELINE_LOGGING_FORMAT").or_else(|| read_env("SLICELINE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bot_token) = overrides.bot_token {
            self.telegram.bot_token = bot_token.into();
        }
        if let Some(provider_token) = overrides.provider_token {
            self.payments.provider_token = provider_token.into();
        }
        if let Some(client_id) = overrides.storefront_client_id {
            self.storefront.client_id = client_id;
        }
        if let Some(client_secret) = overrides.storefront_client_secret {
            self.storefront.client_secret = client_secret.into();
        }
        if let Some(api_key) = overrides.geocoder_api_key {
            self.geocoder.api_key = api_key.into();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram.bot_token.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "telegram.bot_token is required (token issued by @BotFather)".to_string(),
            ));
        }
        if self.telegram.poll_timeout_secs == 0 || self.telegram.poll_timeout_secs > 60 {
            return Err(ConfigError::Validation(
                "telegram.poll_timeout_secs must be in range 1..=60".to_string(),
            ));
        }

        if self.payments.provider_token.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "payments.provider_token is required for card checkout".to_string(),
            ));
        }
        if self.payments.currency.trim().len() != 3 {
            return Err(ConfigError::Validation(
                "payments.currency must be a three-letter currency code".to_string(),
            ));
        }

        if self.storefront.client_id.trim().is_empty()
            || self.storefront.client_secret.expose_secret().trim().is_empty()
        {
            return Err(ConfigError::Validation(
                "storefront.client_id and storefront.client_secret are required".to_string(),
            ));
        }
        if self.storefront.token_ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "storefront.token_ttl_secs must be greater than zero".to_string(),
            ));
        }

        if self.geocoder.api_key.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "geocoder.api_key is required to resolve free-text addresses".to_string(),
            ));
        }

        let url = self.database.url.trim();
        let sqlite_url =
            url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
        if !sqlite_url {
            return Err(ConfigError::Validation(
                "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                    .to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be greater than zero".to_string(),
            ));
        }
        if self.database.timeout_secs == 0 || self.database.timeout_secs > 300 {
            return Err(ConfigError::Validation(
                "database.timeout_secs must be in range 1..=300".to_string(),
            ));
        }

        if self.menu.page_size == 0 {
            return Err(ConfigError::Validation(
                "menu.page_size must be greater than zero".to_string(),
            ));
        }

        if self.delivery.near_fee.is_sign_negative() || self.delivery.far_fee.is_sign_negative() {
            return Err(ConfigError::Validation(
                "delivery fees must not be negative".to_string(),
            ));
        }

        if self.reminder.delay_secs == 0 {
            return Err(ConfigError::Validation(
                "reminder.delay_secs must be greater than zero".to_string(),
            ));
        }

        if self.http.timeout_secs == 0 || self.http.timeout_secs > 120 {
            return Err(ConfigError::Validation(
                "http.timeout_secs must be in range 1..=120".to_string(),
            ));
        }

        let level = self.logging.level.trim().to_ascii_lowercase();
        match level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            _ => Err(ConfigError::Validation(
                "logging.level must be one of trace|debug|info|warn|error".to_string(),
            )),
        }
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("sliceline.toml"), PathBuf::from("config/sliceline.toml")]
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

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
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

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str(value).map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    telegram: Option<TelegramPatch>,
    payments: Option<PaymentsPatch>,
    storefront: Option<StorefrontPatch>,
    geocoder: Option<GeocoderPatch>,
    database: Option<DatabasePatch>,
    menu: Option<MenuPatch>,
    delivery: Option<DeliveryPatch>,
    reminder: Option<ReminderPatch>,
    http: Option<HttpPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramPatch {
    bot_token: Option<String>,
    api_base: Option<String>,
    poll_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PaymentsPatch {
    provider_token: Option<String>,
    currency: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StorefrontPatch {
    base_url: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    token_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct GeocoderPatch {
    base_url: Option<String>,
    api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct MenuPatch {
    page_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct DeliveryPatch {
    near_fee: Option<Decimal>,
    far_fee: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct ReminderPatch {
    delay_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct HttpPatch {
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
