//! Server configuration and CLI argument parsing
//!
//! Settings come from command-line arguments or environment variables with
//! the `VALVE_` prefix. CLI arguments take precedence over environment
//! variables, which take precedence over defaults.
//!
//! # Example Usage
//!
//! ```bash
//! # Using CLI arguments
//! valve --http --http-port 9090 --policy example:111:5:60
//!
//! # Using environment variables
//! export VALVE_HTTP=true
//! export VALVE_HTTP_PORT=8080
//! export VALVE_POLICIES=example:111:5:60,billing:1:100:3600
//! valve
//! ```

use anyhow::{Result, anyhow};
use clap::Parser;
use serde::Deserialize;
use std::collections::HashSet;

/// Main configuration structure for the server
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub transports: TransportConfig,
    pub store: StoreConfig,
    /// Channel buffer size for actor communication
    pub buffer_size: usize,
    /// Logging level (error, warn, info, debug, trace)
    pub log_level: String,
    /// Policies created at startup
    pub policies: Vec<PolicySpec>,
    /// Service id of the built-in example target, if enabled
    pub example_target: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    pub http: Option<HttpConfig>,
}

/// HTTP transport configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Expected number of buckets
    pub capacity: usize,
}

/// Policy given on the command line as `target:endpoint:max_requests:window_seconds`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PolicySpec {
    pub target_service_id: String,
    pub endpoint_id: u32,
    pub max_requests: u32,
    pub window_seconds: u32,
}

impl std::str::FromStr for PolicySpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        // The target id may itself contain colons; the numbers are the last three fields
        let mut parts = s.rsplitn(4, ':');
        let window = parts.next();
        let max = parts.next();
        let endpoint = parts.next();
        let target = parts.next();

        let (Some(target), Some(endpoint), Some(max), Some(window)) =
            (target, endpoint, max, window)
        else {
            return Err(anyhow!(
                "Invalid policy: {s}. Expected target:endpoint:max_requests:window_seconds"
            ));
        };
        if target.is_empty() {
            return Err(anyhow!("Invalid policy: {s}. Target id must not be empty"));
        }

        let number = |field: &str, value: &str| {
            value
                .parse::<u32>()
                .map_err(|e| anyhow!("Invalid policy: {s}. Bad {field} '{value}': {e}"))
        };

        Ok(PolicySpec {
            target_service_id: target.to_string(),
            endpoint_id: number("endpoint", endpoint)?,
            max_requests: number("max_requests", max)?,
            window_seconds: number("window_seconds", window)?,
        })
    }
}

/// Command-line arguments for the server
///
/// All arguments can also be set via environment variables with the
/// VALVE_ prefix.
#[derive(Parser, Debug)]
#[command(
    name = "valve",
    about = "Admission-control gateway",
    long_about = "Per-caller fixed-window admission control in front of target services.\n\nThe HTTP transport must be enabled.\n\nEnvironment variables with VALVE_ prefix are supported. CLI arguments take precedence over environment variables."
)]
pub struct Args {
    // HTTP Transport
    #[arg(long, help = "Enable HTTP transport", env = "VALVE_HTTP")]
    pub http: bool,
    #[arg(
        long,
        value_name = "HOST",
        help = "HTTP host",
        default_value = "127.0.0.1",
        env = "VALVE_HTTP_HOST"
    )]
    pub http_host: String,
    #[arg(
        long,
        value_name = "PORT",
        help = "HTTP port",
        default_value_t = 8080,
        env = "VALVE_HTTP_PORT"
    )]
    pub http_port: u16,

    // Store Configuration
    #[arg(
        long,
        value_name = "SIZE",
        help = "Initial store capacity (buckets)",
        default_value_t = 100_000,
        env = "VALVE_STORE_CAPACITY"
    )]
    pub store_capacity: usize,

    // Gateway Configuration
    #[arg(
        long = "policy",
        value_name = "TARGET:ENDPOINT:MAX:WINDOW",
        help = "Create a policy at startup (repeatable)",
        env = "VALVE_POLICIES",
        value_delimiter = ','
    )]
    pub policies: Vec<PolicySpec>,
    #[arg(
        long,
        help = "Register the built-in example target",
        env = "VALVE_EXAMPLE_TARGET"
    )]
    pub example_target: bool,
    #[arg(
        long,
        value_name = "ID",
        help = "Service id of the example target",
        default_value = "example",
        env = "VALVE_EXAMPLE_TARGET_ID"
    )]
    pub example_target_id: String,

    // General options
    #[arg(
        long,
        value_name = "SIZE",
        help = "Channel buffer size",
        default_value_t = 10_000,
        env = "VALVE_BUFFER_SIZE"
    )]
    pub buffer_size: usize,
    #[arg(
        long,
        value_name = "LEVEL",
        help = "Log level: error, warn, info, debug, trace",
        default_value = "info",
        env = "VALVE_LOG_LEVEL"
    )]
    pub log_level: String,

    // Utility options
    #[arg(
        long,
        help = "List all environment variables and exit",
        action = clap::ArgAction::SetTrue
    )]
    pub list_env_vars: bool,
}

impl Config {
    /// Build configuration from environment variables and CLI arguments
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP transport is not enabled or a value is
    /// out of range.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();

        if args.list_env_vars {
            Self::print_env_vars();
            std::process::exit(0);
        }

        let config = Self::from_args(args);
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from already parsed arguments
    pub fn from_args(args: Args) -> Self {
        let http = args.http.then(|| HttpConfig {
            host: args.http_host,
            port: args.http_port,
        });

        Config {
            transports: TransportConfig { http },
            store: StoreConfig {
                capacity: args.store_capacity,
            },
            buffer_size: args.buffer_size,
            log_level: args.log_level,
            policies: args.policies,
            example_target: args.example_target.then_some(args.example_target_id),
        }
    }

    pub fn has_any_transport(&self) -> bool {
        self.transports.http.is_some()
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if !self.has_any_transport() {
            return Err(anyhow!(
                "The HTTP transport must be enabled.\n\n\
                Example:\n  \
                valve --http --http-port 7070\n\n\
                For more information, try '--help'"
            ));
        }

        if self.buffer_size == 0 {
            return Err(anyhow!("Buffer size must be greater than zero"));
        }

        let mut seen = HashSet::new();
        for policy in &self.policies {
            if policy.max_requests == 0 || policy.window_seconds == 0 {
                return Err(anyhow!(
                    "Policy {}:{} needs max_requests and window_seconds of at least 1",
                    policy.target_service_id,
                    policy.endpoint_id
                ));
            }
            if !seen.insert((&policy.target_service_id, policy.endpoint_id)) {
                return Err(anyhow!(
                    "Policy {}:{} is given more than once",
                    policy.target_service_id,
                    policy.endpoint_id
                ));
            }
        }

        if matches!(&self.example_target, Some(id) if id.is_empty()) {
            return Err(anyhow!("Example target id must not be empty"));
        }

        Ok(())
    }

    fn print_env_vars() {
        println!("Valve Environment Variables");
        println!("===========================");
        println!();
        println!("All environment variables use the VALVE_ prefix.");
        println!("CLI arguments take precedence over environment variables.");
        println!();

        println!("Transport Configuration:");
        println!("  VALVE_HTTP=true|false              Enable HTTP transport");
        println!("  VALVE_HTTP_HOST=<host>             HTTP host [default: 127.0.0.1]");
        println!("  VALVE_HTTP_PORT=<port>             HTTP port [default: 8080]");
        println!();

        println!("Store Configuration:");
        println!("  VALVE_STORE_CAPACITY=<size>        Initial store capacity [default: 100000]");
        println!();

        println!("Gateway Configuration:");
        println!(
            "  VALVE_POLICIES=<list>              Comma-separated target:endpoint:max:window policies"
        );
        println!("  VALVE_EXAMPLE_TARGET=true|false    Register the example target");
        println!("  VALVE_EXAMPLE_TARGET_ID=<id>       Example target id [default: example]");
        println!();

        println!("General Configuration:");
        println!("  VALVE_BUFFER_SIZE=<size>           Channel buffer size [default: 10000]");
        println!(
            "  VALVE_LOG_LEVEL=<level>            Log level: error, warn, info, debug, trace [default: info]"
        );
        println!();

        println!("Examples:");
        println!("  # Serve the example target with 5 calls per minute per caller");
        println!("  export VALVE_HTTP=true");
        println!("  export VALVE_EXAMPLE_TARGET=true");
        println!("  export VALVE_POLICIES=example:111:5:60");
        println!();
        println!("  # Run server (CLI args override env vars)");
        println!("  valve --http-port 9090  # Will use port 9090, not 8080");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn config() -> Config {
        Config {
            transports: TransportConfig {
                http: Some(HttpConfig {
                    host: "127.0.0.1".to_string(),
                    port: 8080,
                }),
            },
            store: StoreConfig { capacity: 1_000 },
            buffer_size: 100,
            log_level: "info".to_string(),
            policies: vec![],
            example_target: None,
        }
    }

    #[test]
    fn test_policy_spec_from_str() {
        assert_eq!(
            PolicySpec::from_str("svc-a:111:5:60").unwrap(),
            PolicySpec {
                target_service_id: "svc-a".to_string(),
                endpoint_id: 111,
                max_requests: 5,
                window_seconds: 60,
            }
        );

        let spec = PolicySpec::from_str("urn:svc:a:7:10:1").unwrap();
        assert_eq!(spec.target_service_id, "urn:svc:a");
        assert_eq!(spec.endpoint_id, 7);

        assert!(PolicySpec::from_str("svc-a:111:5").is_err());
        assert!(PolicySpec::from_str(":111:5:60").is_err());
        assert!(PolicySpec::from_str("svc-a:x:5:60").is_err());
        assert!(PolicySpec::from_str("svc-a:111:-5:60").is_err());
    }

    #[test]
    fn test_args_parsing() {
        let args = Args::try_parse_from([
            "valve",
            "--http",
            "--http-port",
            "9090",
            "--policy",
            "svc-a:111:5:60",
            "--policy",
            "svc-b:1:10:1,svc-b:2:10:1",
            "--example-target",
        ])
        .unwrap();

        let config = Config::from_args(args);
        assert!(config.validate().is_ok());
        assert_eq!(config.transports.http.as_ref().map(|h| h.port), Some(9090));
        assert_eq!(config.policies.len(), 3);
        assert_eq!(config.example_target.as_deref(), Some("example"));
    }

    #[test]
    fn test_config_validation_no_transport() {
        let mut config = config();
        config.transports.http = None;

        assert!(config.validate().is_err());
        assert!(!config.has_any_transport());
    }

    #[test]
    fn test_config_validation_with_transport() {
        let config = config();
        assert!(config.validate().is_ok());
        assert!(config.has_any_transport());
    }

    #[test]
    fn test_config_rejects_bad_policies() {
        let policy = PolicySpec::from_str("svc-a:111:5:60").unwrap();

        let mut duplicated = config();
        duplicated.policies = vec![policy.clone(), policy.clone()];
        assert!(duplicated.validate().is_err());

        let mut empty_window = config();
        empty_window.policies = vec![PolicySpec {
            window_seconds: 0,
            ..policy
        }];
        assert!(empty_window.validate().is_err());
    }

    #[test]
    fn test_config_rejects_zero_buffer() {
        let mut config = config();
        config.buffer_size = 0;
        assert!(config.validate().is_err());
    }
}
