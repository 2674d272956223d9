//! Command-line arguments

use std::path::PathBuf;

use clap::Parser;
use ess_modbus::RegisterBank;

use crate::config::BridgeConfig;

#[derive(Parser, Debug, Default)]
#[command(name = "essbridge", version, about = "Modbus TCP to HTTP JSON bridge for ESS meters")]
pub struct Args {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long, env = "ESSBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Modbus device host
    #[arg(long)]
    pub device_host: Option<String>,

    /// Modbus device port
    #[arg(long)]
    pub device_port: Option<u16>,

    /// Modbus unit id
    #[arg(long)]
    pub unit_id: Option<u8>,

    /// Register bank to poll: holding or input
    #[arg(long, value_parser = parse_bank)]
    pub bank: Option<RegisterBank>,

    /// Register address to poll
    #[arg(long)]
    pub address: Option<u16>,

    /// Poll interval in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// API bind address, host:port
    #[arg(short, long, value_parser = parse_bind_address)]
    pub bind_address: Option<BindAddress>,

    /// Log level (overridden by RUST_LOG)
    #[arg(short, long)]
    pub log_level: Option<String>,
}

impl Args {
    /// Apply explicit flags on top of file and environment settings
    pub fn apply(&self, config: &mut BridgeConfig) {
        if let Some(host) = &self.device_host {
            config.device.host.clone_from(host);
        }
        if let Some(port) = self.device_port {
            config.device.port = port;
        }
        if let Some(unit_id) = self.unit_id {
            config.device.unit_id = unit_id;
        }
        if let Some(bank) = self.bank {
            config.device.bank = bank;
        }
        if let Some(address) = self.address {
            config.device.address = address;
        }
        if let Some(interval_ms) = self.interval_ms {
            config.poll.interval_ms = interval_ms;
        }
        if let Some(bind) = &self.bind_address {
            config.api.host.clone_from(&bind.host);
            config.api.port = bind.port;
        }
        if let Some(level) = &self.log_level {
            config.logging.level.clone_from(level);
        }
    }
}

/// `host:port` given with `--bind-address`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindAddress {
    pub host: String,
    pub port: u16,
}

fn parse_bind_address(value: &str) -> Result<BindAddress, String> {
    let (host, port) = value
        .rsplit_once(':')
        .ok_or_else(|| format!("'{}' must look like host:port", value))?;
    if host.is_empty() {
        return Err(format!("'{}' is missing a host", value));
    }
    let port = port
        .parse()
        .map_err(|e| format!("invalid port '{}': {}", port, e))?;
    Ok(BindAddress {
        host: host.to_string(),
        port,
    })
}

fn parse_bank(value: &str) -> Result<RegisterBank, String> {
    match value.to_ascii_lowercase().as_str() {
        "holding" | "hr" => Ok(RegisterBank::Holding),
        "input" | "ir" => Ok(RegisterBank::Input),
        other => Err(format!("unknown register bank '{}'", other)),
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::try_parse_from([
            "essbridge",
            "--device-host",
            "192.168.1.50",
            "--unit-id",
            "3",
            "--bank",
            "hr",
            "--bind-address",
            "127.0.0.1:9000",
        ])
        .unwrap();

        let mut config = BridgeConfig::default();
        args.apply(&mut config);

        assert_eq!(config.device.host, "192.168.1.50");
        assert_eq!(config.device.unit_id, 3);
        assert_eq!(config.device.bank, RegisterBank::Holding);
        assert_eq!(config.bind_address(), "127.0.0.1:9000");
        assert_eq!(config.poll.interval_ms, 1000);
    }

    #[test]
    fn test_no_flags_leaves_config_untouched() {
        let args = Args::try_parse_from(["essbridge"]).unwrap();
        let mut config = BridgeConfig::default();
        args.apply(&mut config);
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_bad_bank_rejected() {
        assert!(Args::try_parse_from(["essbridge", "--bank", "coils"]).is_err());
    }

    #[test]
    fn test_malformed_bind_address_rejected() {
        for bad in ["127.0.0.1:notaport", "127.0.0.1", ":8081", "127.0.0.1:70000"] {
            assert!(
                Args::try_parse_from(["essbridge", "--bind-address", bad]).is_err(),
                "{}",
                bad
            );
        }
    }
}
