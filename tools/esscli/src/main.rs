//! esscli - command-line client for ESS devices speaking Modbus TCP
//!
//! ```text
//! esscli --host 127.0.0.1 --port 1502 read --bank ir --addr 0 --decode power
//! esscli write --addr 0 --value 123.0 --quantity power
//! esscli simulate --bind 0.0.0.0:1502 --input 0=1230 --input 10=87
//! ```

mod commands;

use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use ess_modbus::{DecodeMode, Quantity, RegisterBank};

#[derive(Parser)]
#[command(name = "esscli")]
#[command(about = "Read, write and simulate ESS registers over Modbus TCP")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Device host
    #[arg(long, global = true, default_value = "127.0.0.1")]
    host: String,

    /// Device port
    #[arg(long, global = true, default_value_t = 1502)]
    port: u16,

    /// Modbus unit id
    #[arg(long, global = true, default_value_t = 10)]
    unit: u8,

    /// Connect and response timeout in milliseconds
    #[arg(long, global = true, default_value_t = 2000)]
    timeout_ms: u64,

    /// Verbose logging (frame-level detail)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Read one or more registers
    Read {
        #[arg(long, value_enum, default_value_t = BankArg::Ir)]
        bank: BankArg,

        #[arg(long, default_value_t = 0)]
        addr: u16,

        #[arg(long, default_value_t = 1)]
        count: u16,

        /// How to present each register
        #[arg(long, value_enum, default_value_t = DecodeArg::Power)]
        decode: DecodeArg,
    },
    /// Write a single holding register (FC06)
    Write {
        #[arg(long, default_value_t = 0)]
        addr: u16,

        /// Engineering value, or the raw register when --quantity is omitted
        #[arg(long, allow_negative_numbers = true)]
        value: f64,

        #[arg(long, value_enum)]
        quantity: Option<QuantityArg>,
    },
    /// Run an in-memory device until Ctrl+C
    Simulate {
        #[arg(long, default_value = "127.0.0.1:1502")]
        bind: String,

        /// Seed a holding register, ADDR=VALUE (repeatable)
        #[arg(long = "holding", value_name = "ADDR=VALUE")]
        holding: Vec<String>,

        /// Seed an input register, ADDR=VALUE (repeatable)
        #[arg(long = "input", value_name = "ADDR=VALUE")]
        input: Vec<String>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BankArg {
    #[value(alias = "holding")]
    Hr,
    #[value(alias = "input")]
    Ir,
}

impl From<BankArg> for RegisterBank {
    fn from(arg: BankArg) -> Self {
        match arg {
            BankArg::Hr => RegisterBank::Holding,
            BankArg::Ir => RegisterBank::Input,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DecodeArg {
    Power,
    Soc,
    Soh,
    Capacity,
    Raw,
}

impl From<DecodeArg> for DecodeMode {
    fn from(arg: DecodeArg) -> Self {
        match arg {
            DecodeArg::Power => DecodeMode::Power,
            DecodeArg::Soc => DecodeMode::Soc,
            DecodeArg::Soh => DecodeMode::Soh,
            DecodeArg::Capacity => DecodeMode::Capacity,
            DecodeArg::Raw => DecodeMode::Raw,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum QuantityArg {
    Power,
    Soc,
    Soh,
    Capacity,
}

impl From<QuantityArg> for Quantity {
    fn from(arg: QuantityArg) -> Self {
        match arg {
            QuantityArg::Power => Quantity::Power,
            QuantityArg::Soc => Quantity::Soc,
            QuantityArg::Soh => Quantity::Soh,
            QuantityArg::Capacity => Quantity::Capacity,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .init();

    let target = commands::Target {
        address: format!("{}:{}", cli.host, cli.port),
        unit_id: cli.unit,
        timeout: Duration::from_millis(cli.timeout_ms),
    };

    match cli.command {
        Commands::Read {
            bank,
            addr,
            count,
            decode,
        } => {
            let bank = RegisterBank::from(bank);
            let decode = DecodeMode::from(decode);
            let values = commands::read(&target, bank, addr, count).await?;
            for (offset, raw) in (0u16..).zip(values) {
                println!(
                    "{}{} = {}  {}",
                    bank.label().bright_cyan(),
                    addr.wrapping_add(offset),
                    decode.format(raw).bold(),
                    format!("(0x{:04X})", raw).dimmed()
                );
            }
        },
        Commands::Write {
            addr,
            value,
            quantity,
        } => {
            let raw = commands::encode_value(value, quantity.map(Quantity::from))?;
            commands::write(&target, addr, raw).await?;
            println!(
                "{} HR{} <- {} (0x{:04X})",
                "OK".bright_green(),
                addr,
                raw,
                raw
            );
        },
        Commands::Simulate {
            bind,
            holding,
            input,
        } => {
            let seeds = commands::parse_seeds(&holding, &input)?;
            commands::simulate(&bind, &seeds).await?;
        },
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_read_defaults_to_input_registers() {
        let cli = Cli::try_parse_from(["esscli", "read"]).unwrap();
        match cli.command {
            Commands::Read {
                bank, addr, count, ..
            } => {
                assert_eq!(RegisterBank::from(bank), RegisterBank::Input);
                assert_eq!((addr, count), (0, 1));
            },
            _ => panic!("expected read"),
        }
        assert_eq!(cli.port, 1502);
    }

    #[test]
    fn test_read_bank_accepts_long_names() {
        let cli = Cli::try_parse_from(["esscli", "read", "--bank", "holding"]).unwrap();
        match cli.command {
            Commands::Read { bank, .. } => {
                assert_eq!(RegisterBank::from(bank), RegisterBank::Holding)
            },
            _ => panic!("expected read"),
        }
    }
}
