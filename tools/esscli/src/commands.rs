//! Subcommand implementations

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use ess_modbus::{ModbusExchange, ModbusSimulator, Quantity, RegisterBank};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Device reached by `read` and `write`
pub struct Target {
    pub address: String,
    pub unit_id: u8,
    pub timeout: Duration,
}

pub async fn read(target: &Target, bank: RegisterBank, addr: u16, count: u16) -> Result<Vec<u16>> {
    let mut exchange = ModbusExchange::connect(target.address.as_str(), target.timeout)
        .await
        .with_context(|| format!("Failed to connect to {}", target.address))?;
    let values = exchange
        .read_registers(target.unit_id, bank, addr, count)
        .await?;
    exchange.close().await?;
    Ok(values)
}

pub async fn write(target: &Target, addr: u16, raw: u16) -> Result<()> {
    let mut exchange = ModbusExchange::connect(target.address.as_str(), target.timeout)
        .await
        .with_context(|| format!("Failed to connect to {}", target.address))?;
    exchange
        .write_single_register(target.unit_id, addr, raw)
        .await?;
    exchange.close().await?;
    Ok(())
}

/// Engineering value to register, or a plain `0..=65535` integer without a quantity
pub fn encode_value(value: f64, quantity: Option<Quantity>) -> Result<u16> {
    match quantity {
        Some(quantity) => Ok(quantity.encode(value)?),
        None => {
            if value.fract() != 0.0 || !(0.0..=f64::from(u16::MAX)).contains(&value) {
                bail!("raw value {} is not an integer in 0..=65535", value);
            }
            Ok(value as u16)
        },
    }
}

/// Parse `--holding`/`--input` seeds of the form `ADDR=VALUE`
pub fn parse_seeds(holding: &[String], input: &[String]) -> Result<Vec<(RegisterBank, u16, u16)>> {
    let holding = holding.iter().map(|s| (RegisterBank::Holding, s));
    let input = input.iter().map(|s| (RegisterBank::Input, s));

    holding
        .chain(input)
        .map(|(bank, seed)| {
            let (addr, value) = seed
                .split_once('=')
                .ok_or_else(|| anyhow!("seed '{}' must look like ADDR=VALUE", seed))?;
            let addr = addr
                .trim()
                .parse()
                .with_context(|| format!("bad address in seed '{}'", seed))?;
            let value = value
                .trim()
                .parse()
                .with_context(|| format!("bad value in seed '{}'", seed))?;
            Ok((bank, addr, value))
        })
        .collect()
}

pub async fn simulate(bind: &str, seeds: &[(RegisterBank, u16, u16)]) -> Result<()> {
    let simulator = ModbusSimulator::new();
    for &(bank, addr, value) in seeds {
        simulator.set_register(bank, addr, value).await;
    }

    let token = CancellationToken::new();
    let (local_addr, handle) = simulator.start(bind, token.clone()).await?;
    info!(
        "Simulating device on {} with {} seeded register(s); Ctrl+C to stop",
        local_addr,
        seeds.len()
    );

    tokio::signal::ctrl_c().await?;
    token.cancel();
    handle.await?;
    Ok(())
}
