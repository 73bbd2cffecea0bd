use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub plans: PlansConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Bearer token accepted on operator routes.
    pub operator_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default)]
    pub enabled: bool,
    pub base_url: String,
    pub access_token: Option<String>,
    /// When set, inbound webhooks must carry a valid `x-signature` header.
    pub webhook_secret: Option<String>,
    pub timeout_secs: u64,
    pub checkout_success_url: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://api.mercadopago.com".to_string(),
            access_token: None,
            webhook_secret: None,
            timeout_secs: 10,
            checkout_success_url: "http://localhost:8080/pagamento/sucesso".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlansConfig {
    /// Plan professors fall back to when a grace period lapses or a plan charge is refunded.
    pub baseline_plan: String,
    pub default_grace_days: i64,
}

impl Default for PlansConfig {
    fn default() -> Self {
        Self {
            baseline_plan: "free".to_string(),
            default_grace_days: 7,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    pub grace_sweep_interval_secs: u64,
    pub lease_ttl_secs: i64,
    /// Lease holder name; defaults to a random id per process.
    pub instance_id: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            grace_sweep_interval_secs: 300,
            lease_ttl_secs: 600,
            instance_id: None,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.max_connections", 10)?
            .set_default("gateway.enabled", false)?
            .set_default("gateway.base_url", "https://api.mercadopago.com")?
            .set_default("gateway.timeout_secs", 10)?
            .set_default("gateway.checkout_success_url", "http://localhost:8080/pagamento/sucesso")?
            .set_default("plans.baseline_plan", "free")?
            .set_default("plans.default_grace_days", 7)?
            .set_default("scheduler.grace_sweep_interval_secs", 300)?
            .set_default("scheduler.lease_ttl_secs", 600)?

            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))

            // Add environment variables (with STUDIOLEDGER__ prefix, double underscore separates levels)
            .add_source(Environment::with_prefix("STUDIOLEDGER").separator("__"))

            .build()?;

        config.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite://studioledger.db?mode=rwc".to_string(),
                max_connections: 10,
            },
            auth: AuthConfig {
                operator_token: "change-me-in-production".to_string(),
            },
            gateway: GatewayConfig::default(),
            plans: PlansConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}
