use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub marketplace: MarketplaceConfig,
    pub notifications: NotificationConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let marketplace = MarketplaceConfig {
            default_page_size: page_size_var(
                "ORDERS_DEFAULT_PAGE_SIZE",
                MarketplaceConfig::DEFAULT_PAGE_SIZE,
            )?,
            max_page_size: page_size_var("ORDERS_MAX_PAGE_SIZE", MarketplaceConfig::MAX_PAGE_SIZE)?,
        };
        if marketplace.default_page_size > marketplace.max_page_size {
            return Err(ConfigError::PageSizeRange {
                default: marketplace.default_page_size,
                max: marketplace.max_page_size,
            });
        }

        let from_address = env::var("NOTIFY_FROM_ADDRESS")
            .unwrap_or_else(|_| NotificationConfig::DEFAULT_FROM_ADDRESS.to_string());
        if !from_address.contains('@') {
            return Err(ConfigError::InvalidFromAddress(from_address));
        }
        let dashboard_url = env::var("DASHBOARD_URL")
            .ok()
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            marketplace,
            notifications: NotificationConfig {
                from_address,
                dashboard_url,
            },
        })
    }
}

fn page_size_var(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.trim().parse::<u32>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(ConfigError::InvalidPageSize { name, value: raw }),
        },
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Pagination limits for order listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketplaceConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl MarketplaceConfig {
    pub const DEFAULT_PAGE_SIZE: u32 = 10;
    pub const MAX_PAGE_SIZE: u32 = 100;
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            default_page_size: Self::DEFAULT_PAGE_SIZE,
            max_page_size: Self::MAX_PAGE_SIZE,
        }
    }
}

/// Sender identity and links embedded in outgoing notices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    pub from_address: String,
    pub dashboard_url: Option<String>,
}

impl NotificationConfig {
    pub const DEFAULT_FROM_ADDRESS: &'static str = "orders@order-desk.local";
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            from_address: Self::DEFAULT_FROM_ADDRESS.to_string(),
            dashboard_url: None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidPageSize { name: &'static str, value: String },
    PageSizeRange { default: u32, max: u32 },
    InvalidFromAddress(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidPageSize { name, value } => {
                write!(f, "{name} must be a positive integer, got '{value}'")
            }
            ConfigError::PageSizeRange { default, max } => write!(
                f,
                "ORDERS_DEFAULT_PAGE_SIZE ({default}) exceeds ORDERS_MAX_PAGE_SIZE ({max})"
            ),
            ConfigError::InvalidFromAddress(value) => {
                write!(f, "NOTIFY_FROM_ADDRESS must be an email address, got '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
