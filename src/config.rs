use config::{Config, ConfigError, Environment, File};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::env as std_env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_TAX_RATE_PCT: f64 = 20.0;
const DEFAULT_QUOTE_NUMBER_PREFIX: &str = "Q";
const DEFAULT_CATALOG_IMPORT_CHUNK_SIZE: usize = 200;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default = "default_false_bool")]
    pub cors_allow_any_origin: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Per-request timeout for the HTTP surface (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Default tax rate as a percentage (20 means 20%)
    #[serde(default = "default_tax_rate")]
    #[validate(custom = "validate_percentage")]
    pub default_tax_rate: f64,

    /// Prefix used by the quote number generator
    #[serde(default = "default_quote_number_prefix")]
    #[validate(length(min = 1, max = 8))]
    pub quote_number_prefix: String,

    /// Rows written per transaction when importing catalog entries
    #[serde(default = "default_catalog_import_chunk_size")]
    #[validate(range(min = 1, max = 5000))]
    pub catalog_import_chunk_size: usize,

    /// Loyalty preset: discount percentage on part lines
    #[serde(default = "default_loyalty_parts_pct")]
    #[validate(custom = "validate_percentage")]
    pub loyalty_parts_discount_pct: f64,

    /// Loyalty preset: discount percentage on labor lines
    #[serde(default = "default_loyalty_labor_pct")]
    #[validate(custom = "validate_percentage")]
    pub loyalty_labor_discount_pct: f64,

    /// Warranty-lapsed preset: discount percentage on part lines
    #[serde(default = "default_warranty_lapsed_parts_pct")]
    #[validate(custom = "validate_percentage")]
    pub warranty_lapsed_parts_discount_pct: f64,

    /// Warranty-lapsed preset: discount percentage on labor lines
    #[serde(default = "default_warranty_lapsed_labor_pct")]
    #[validate(custom = "validate_percentage")]
    pub warranty_lapsed_labor_discount_pct: f64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl AppConfig {
    /// Creates a new configuration with defaults for every tunable
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            default_tax_rate: default_tax_rate(),
            quote_number_prefix: default_quote_number_prefix(),
            catalog_import_chunk_size: default_catalog_import_chunk_size(),
            loyalty_parts_discount_pct: default_loyalty_parts_pct(),
            loyalty_labor_discount_pct: default_loyalty_labor_pct(),
            warranty_lapsed_parts_discount_pct: default_warranty_lapsed_parts_pct(),
            warranty_lapsed_labor_discount_pct: default_warranty_lapsed_labor_pct(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Default tax rate as an exact decimal percentage
    pub fn default_tax_rate_pct(&self) -> Decimal {
        pct_to_decimal(self.default_tax_rate)
    }

    /// Fallback (parts, labor) percentages for a named discount preset
    pub fn preset_percentages(&self, preset: crate::services::DiscountPreset) -> (Decimal, Decimal) {
        use crate::services::DiscountPreset;

        match preset {
            DiscountPreset::Loyalty => (
                pct_to_decimal(self.loyalty_parts_discount_pct),
                pct_to_decimal(self.loyalty_labor_discount_pct),
            ),
            DiscountPreset::WarrantyLapsed => (
                pct_to_decimal(self.warranty_lapsed_parts_discount_pct),
                pct_to_decimal(self.warranty_lapsed_labor_discount_pct),
            ),
        }
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if self.db_min_connections > self.db_max_connections {
            let mut err = ValidationError::new("db_min_connections");
            err.message = Some("db_min_connections must not exceed db_max_connections".into());
            errors.add("db_min_connections", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn pct_to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value)
        .map(|d| d.normalize())
        .unwrap_or(Decimal::ZERO)
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_false_bool() -> bool {
    false
}

fn default_tax_rate() -> f64 {
    DEFAULT_TAX_RATE_PCT
}

fn default_quote_number_prefix() -> String {
    DEFAULT_QUOTE_NUMBER_PREFIX.to_string()
}

fn default_catalog_import_chunk_size() -> usize {
    DEFAULT_CATALOG_IMPORT_CHUNK_SIZE
}

fn default_loyalty_parts_pct() -> f64 {
    10.0
}

fn default_loyalty_labor_pct() -> f64 {
    10.0
}

fn default_warranty_lapsed_parts_pct() -> f64 {
    15.0
}

fn default_warranty_lapsed_labor_pct() -> f64 {
    20.0
}

fn default_event_channel_capacity() -> usize {
    1024
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_percentage(rate: f64) -> Result<(), ValidationError> {
    if !rate.is_finite() || !(0.0..=100.0).contains(&rate) {
        let mut err = ValidationError::new("percentage");
        err.message = Some("percentage must be a finite value between 0 and 100".into());
        return Err(err);
    }
    Ok(())
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!(
        "maintenance_pricing={},tower_http=debug,sea_orm=warn",
        level
    );
    let filter_directive = std_env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive.clone());

    // Optional OpenTelemetry initialization via env (APP__OTEL_ENABLED or OTEL_EXPORTER_OTLP_ENDPOINT)
    let otel_enabled = std_env::var("APP__OTEL_ENABLED")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
        || std_env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok();

    if otel_enabled {
        use opentelemetry::KeyValue;
        use opentelemetry_otlp::WithExportConfig;
        use opentelemetry_sdk::{trace as sdktrace, Resource};

        let endpoint = std_env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .unwrap_or_else(|_| "http://localhost:4317".to_string());
        let service_name = std_env::var("OTEL_SERVICE_NAME")
            .unwrap_or_else(|_| "maintenance-pricing".to_string());

        let resource = Resource::new(vec![KeyValue::new("service.name", service_name)]);
        let tracer = match opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(
                opentelemetry_otlp::new_exporter()
                    .tonic()
                    .with_endpoint(endpoint),
            )
            .with_trace_config(sdktrace::config().with_resource(resource))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
        {
            Ok(tracer) => tracer,
            Err(err) => {
                error!("Failed to install OTLP pipeline: {}", err);
                if json {
                    let _ = fmt().with_env_filter(filter_directive).json().try_init();
                } else {
                    let _ = fmt().with_env_filter(filter_directive).try_init();
                }
                return;
            }
        };

        let base = tracing_subscriber::registry()
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .with(EnvFilter::new(filter_directive.clone()));

        if json {
            let _ = base.with(fmt::layer().json()).try_init();
        } else {
            let _ = base.with(fmt::layer()).try_init();
        }
    } else if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://maintenance_pricing.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::DiscountPreset;
    use rust_decimal_macros::dec;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            8080,
            "production".into(),
        )
    }

    #[test]
    fn non_dev_requires_cors_origins() {
        let cfg = base_config();
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn non_dev_allows_override_flag() {
        let mut cfg = base_config();
        cfg.cors_allow_any_origin = true;
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn non_dev_with_origins_passes() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some("https://workshop.example.com".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn default_tax_rate_is_twenty_percent() {
        let cfg = base_config();
        assert_eq!(cfg.default_tax_rate_pct(), dec!(20));
    }

    #[test]
    fn tax_rate_above_hundred_fails_validation() {
        let mut cfg = base_config();
        cfg.default_tax_rate = 120.0;
        let errors = cfg.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("default_tax_rate"));
    }

    #[test]
    fn custom_validators_check_numeric_fields() {
        let mut cfg = base_config();
        cfg.loyalty_labor_discount_pct = f64::NAN;
        cfg.event_channel_capacity = 0;
        let errors = cfg.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("loyalty_labor_discount_pct"));
        assert!(fields.contains_key("event_channel_capacity"));

        assert!(validate_percentage(100.0).is_ok());
        assert!(validate_percentage(-0.5).is_err());
        assert!(validate_event_channel_capacity(1).is_ok());
    }

    #[test]
    fn zero_chunk_size_fails_validation() {
        let mut cfg = base_config();
        cfg.catalog_import_chunk_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn preset_percentages_come_from_config() {
        let mut cfg = base_config();
        cfg.warranty_lapsed_parts_discount_pct = 12.5;
        assert_eq!(
            cfg.preset_percentages(DiscountPreset::WarrantyLapsed),
            (dec!(12.5), dec!(20))
        );
        assert_eq!(
            cfg.preset_percentages(DiscountPreset::Loyalty),
            (dec!(10), dec!(10))
        );
    }
}
