use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};

use crate::clients::ClientCredentials;

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_USER_SERVICE_URL: &str = "http://localhost:8081";
const DEFAULT_AUTH_VALIDATE_URL: &str = "http://localhost:4001/api/v1/auth/validate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BusKind {
    Memory,
    Kafka,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "order-service", about = "Order management service", version)]
pub struct CliArgs {
    #[arg(long, env = "ORDER_SERVICE_BIND", value_name = "ADDR", default_value = DEFAULT_BIND)]
    pub bind: SocketAddr,

    #[arg(long, env = "ORDER_SERVICE_STORE", value_enum, default_value_t = StoreKind::Postgres)]
    pub store: StoreKind,

    #[arg(long, env = "DATABASE_URL", value_name = "URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "ORDER_SERVICE_DB_MAX_CONNECTIONS", value_name = "N", default_value_t = 10)]
    pub db_max_connections: u32,

    #[arg(
        long,
        env = "ORDER_SERVICE_USER_SERVICE_URL",
        value_name = "URL",
        default_value = DEFAULT_USER_SERVICE_URL
    )]
    pub user_service_url: String,

    #[arg(
        long,
        env = "ORDER_SERVICE_HTTP_TIMEOUT_MS",
        value_name = "MS",
        default_value_t = 5000,
        help = "Timeout for calls to the user and auth services"
    )]
    pub http_timeout_ms: u64,

    #[arg(long, env = "ORDER_SERVICE_OAUTH_TOKEN_URL", value_name = "URL")]
    pub oauth_token_url: Option<String>,

    #[arg(long, env = "ORDER_SERVICE_OAUTH_CLIENT_ID")]
    pub oauth_client_id: Option<String>,

    #[arg(long, env = "ORDER_SERVICE_OAUTH_CLIENT_SECRET", hide_env_values = true)]
    pub oauth_client_secret: Option<String>,

    #[arg(
        long,
        env = "ORDER_SERVICE_AUTH_VALIDATE_URL",
        value_name = "URL",
        default_value = DEFAULT_AUTH_VALIDATE_URL
    )]
    pub auth_validate_url: String,

    #[arg(long, env = "ORDER_SERVICE_BUS", value_enum, default_value_t = BusKind::Memory)]
    pub bus: BusKind,

    #[arg(
        long,
        env = "ORDER_SERVICE_KAFKA_BROKERS",
        value_name = "HOSTS",
        help = "Comma-separated bootstrap servers"
    )]
    pub kafka_brokers: Option<String>,

    #[arg(long, env = "ORDER_SERVICE_KAFKA_GROUP_ID", default_value = "order-service")]
    pub kafka_group_id: String,

    #[arg(long, env = "ORDER_SERVICE_ORDER_TOPIC", default_value = "create-order")]
    pub order_topic: String,

    #[arg(long, env = "ORDER_SERVICE_PAYMENT_TOPIC", default_value = "create-payment")]
    pub payment_topic: String,

    #[arg(
        long,
        env = "ORDER_SERVICE_MAILBOX_SIZE",
        value_name = "N",
        default_value_t = 100,
        help = "Capacity of each actor's request channel"
    )]
    pub mailbox_size: usize,

    #[arg(long, env = "ORDER_SERVICE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreConfig {
    Memory,
    Postgres { url: String, max_connections: u32 },
}

impl StoreConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreConfig::Memory => "memory",
            StoreConfig::Postgres { .. } => "postgres",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BusConfig {
    Memory,
    Kafka { brokers: String, group_id: String },
}

/// Checked service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind: SocketAddr,
    pub store: StoreConfig,
    pub user_service_url: String,
    pub credentials: Option<ClientCredentials>,
    pub auth_validate_url: String,
    pub http_timeout: Duration,
    pub bus: BusConfig,
    pub order_topic: String,
    pub payment_topic: String,
    pub mailbox_size: usize,
    pub log_format: LogFormat,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ServiceConfig {
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let store = match args.store {
            StoreKind::Memory => StoreConfig::Memory,
            StoreKind::Postgres => {
                let url = non_blank(args.database_url)
                    .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for the postgres store"))?;
                anyhow::ensure!(args.db_max_connections > 0, "database pool needs at least one connection");
                StoreConfig::Postgres {
                    url,
                    max_connections: args.db_max_connections,
                }
            }
        };

        let bus = match args.bus {
            BusKind::Memory => BusConfig::Memory,
            BusKind::Kafka => {
                anyhow::ensure!(
                    cfg!(feature = "kafka"),
                    "the kafka bus needs a build with the `kafka` feature"
                );
                let brokers = non_blank(args.kafka_brokers)
                    .ok_or_else(|| anyhow::anyhow!("kafka brokers are required for the kafka bus"))?;
                BusConfig::Kafka {
                    brokers,
                    group_id: args.kafka_group_id,
                }
            }
        };

        let credentials = match (
            non_blank(args.oauth_token_url),
            non_blank(args.oauth_client_id),
            non_blank(args.oauth_client_secret),
        ) {
            (None, None, None) => None,
            (Some(token_url), Some(client_id), Some(client_secret)) => Some(ClientCredentials {
                token_url,
                client_id,
                client_secret,
            }),
            _ => anyhow::bail!("OAuth2 token url, client id and client secret must be set together"),
        };

        anyhow::ensure!(args.mailbox_size > 0, "mailbox size must be positive");
        anyhow::ensure!(args.http_timeout_ms > 0, "http timeout must be positive");
        anyhow::ensure!(
            !args.order_topic.trim().is_empty() && !args.payment_topic.trim().is_empty(),
            "topic names must not be blank"
        );

        Ok(Self {
            bind: args.bind,
            store,
            user_service_url: args.user_service_url,
            credentials,
            auth_validate_url: args.auth_validate_url,
            http_timeout: Duration::from_millis(args.http_timeout_ms),
            bus,
            order_topic: args.order_topic,
            payment_topic: args.payment_topic,
            mailbox_size: args.mailbox_size,
            log_format: args.log_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<ServiceConfig> {
        let argv = std::iter::once("order-service").chain(extra.iter().copied());
        ServiceConfig::from_args(CliArgs::try_parse_from(argv)?)
    }

    #[test]
    fn memory_setup_needs_no_database() {
        let config = parse(&["--store", "memory"]).unwrap();
        assert_eq!(config.store, StoreConfig::Memory);
        assert_eq!(config.bus, BusConfig::Memory);
        assert_eq!(config.order_topic, "create-order");
        assert_eq!(config.payment_topic, "create-payment");
        assert!(config.credentials.is_none());
    }

    #[test]
    fn postgres_requires_a_database_url() {
        let config = parse(&[
            "--store",
            "postgres",
            "--database-url",
            "postgres://orders@localhost/orders",
            "--db-max-connections",
            "4",
        ])
        .unwrap();
        assert_eq!(
            config.store,
            StoreConfig::Postgres {
                url: "postgres://orders@localhost/orders".to_string(),
                max_connections: 4,
            }
        );

        // only meaningful when DATABASE_URL is not exported in the test environment
        if std::env::var_os("DATABASE_URL").is_none() {
            assert!(parse(&["--store", "postgres"]).is_err());
        }
    }

    #[test]
    fn oauth_settings_come_as_a_set() {
        let config = parse(&[
            "--store",
            "memory",
            "--oauth-token-url",
            "http://auth/token",
            "--oauth-client-id",
            "orders",
            "--oauth-client-secret",
            "s3cret",
        ])
        .unwrap();
        let credentials = config.credentials.unwrap();
        assert_eq!(credentials.client_id, "orders");

        assert!(parse(&["--store", "memory", "--oauth-client-id", "orders"]).is_err());
    }

    #[test]
    fn rejects_zero_mailbox_and_unknown_kinds() {
        assert!(parse(&["--store", "memory", "--mailbox-size", "0"]).is_err());
        assert!(parse(&["--store", "sqlite"]).is_err());
        assert!(parse(&["--store", "memory", "--log-format", "yaml"]).is_err());
    }

    #[cfg(not(feature = "kafka"))]
    #[test]
    fn kafka_bus_needs_the_feature() {
        let err = parse(&["--store", "memory", "--bus", "kafka", "--kafka-brokers", "localhost:9092"])
            .unwrap_err();
        assert!(err.to_string().contains("kafka"));
    }
}
