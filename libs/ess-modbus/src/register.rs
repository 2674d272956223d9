//! Engineering-unit register codec
//!
//! Maps physical quantities to and from 16-bit register words using a fixed
//! scale per LSB. The signed path is used for control setpoints and fails on
//! overflow; the unsigned path is used for bounded measurements and clamps.

use serde::{Deserialize, Serialize};

use crate::error::{ModbusError, Result};

/// Active power: 0.1 kW per LSB, signed
pub const POWER_SCALE_KW: f64 = 0.1;

/// State of charge / state of health: 1 % per LSB, unsigned
pub const PERCENT_SCALE: f64 = 1.0;
pub const PERCENT_MIN: f64 = 0.0;
pub const PERCENT_MAX: f64 = 100.0;

/// Capacity: 0.1 kWh per LSB, unsigned
pub const CAPACITY_SCALE_KWH: f64 = 0.1;
pub const CAPACITY_MIN_KWH: f64 = 0.0;
pub const CAPACITY_MAX_KWH: f64 = 6553.5;

/// Encode a signed quantity as a two's-complement register word.
///
/// `raw = round(value / scale)`, ties to even. Fails with
/// [`ModbusError::RangeError`] when `raw` does not fit an `i16`.
pub fn encode_signed_scaled(value: f64, scale: f64) -> Result<u16> {
    let raw = (value / scale).round_ties_even();
    if !raw.is_finite() || raw < f64::from(i16::MIN) || raw > f64::from(i16::MAX) {
        return Err(ModbusError::range(format!(
            "{} at scale {} is outside the signed 16-bit register range",
            value, scale
        )));
    }
    Ok(raw as i16 as u16)
}

/// Interpret `reg` as `i16` and multiply by `scale`
#[inline]
pub fn decode_signed_scaled(reg: u16, scale: f64) -> f64 {
    f64::from(reg as i16) * scale
}

/// Encode an unsigned quantity, clamping into `[min, max]` first.
///
/// Never fails: NaN clamps to `min`, the rounded raw value is masked to 16 bits.
pub fn encode_unsigned_scaled(value: f64, scale: f64, min: f64, max: f64) -> u16 {
    let clamped = if value.is_nan() { min } else { value.clamp(min, max) };
    let raw = (clamped / scale).round_ties_even() as i64;
    (raw & 0xFFFF) as u16
}

#[inline]
pub fn decode_unsigned_scaled(reg: u16, scale: f64) -> f64 {
    f64::from(reg) * scale
}

pub fn encode_power_kw(kw: f64) -> Result<u16> {
    encode_signed_scaled(kw, POWER_SCALE_KW)
}

pub fn decode_power_kw(reg: u16) -> f64 {
    decode_signed_scaled(reg, POWER_SCALE_KW)
}

pub fn encode_soc(percent: f64) -> u16 {
    encode_unsigned_scaled(percent, PERCENT_SCALE, PERCENT_MIN, PERCENT_MAX)
}

pub fn decode_soc(reg: u16) -> f64 {
    decode_unsigned_scaled(reg, PERCENT_SCALE)
}

pub fn encode_soh(percent: f64) -> u16 {
    encode_unsigned_scaled(percent, PERCENT_SCALE, PERCENT_MIN, PERCENT_MAX)
}

pub fn decode_soh(reg: u16) -> f64 {
    decode_unsigned_scaled(reg, PERCENT_SCALE)
}

pub fn encode_capacity_kwh(kwh: f64) -> u16 {
    encode_unsigned_scaled(kwh, CAPACITY_SCALE_KWH, CAPACITY_MIN_KWH, CAPACITY_MAX_KWH)
}

pub fn decode_capacity_kwh(reg: u16) -> f64 {
    decode_unsigned_scaled(reg, CAPACITY_SCALE_KWH)
}

/// Physical quantity stored in a single register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quantity {
    /// Active power in kW (signed, 0.1 kW/LSB)
    Power,
    /// State of charge in % (unsigned, clamped 0..=100)
    Soc,
    /// State of health in % (unsigned, clamped 0..=100)
    Soh,
    /// Capacity in kWh (unsigned, 0.1 kWh/LSB, clamped 0..=6553.5)
    Capacity,
}

impl Quantity {
    pub fn encode(self, value: f64) -> Result<u16> {
        match self {
            Quantity::Power => encode_power_kw(value),
            Quantity::Soc => Ok(encode_soc(value)),
            Quantity::Soh => Ok(encode_soh(value)),
            Quantity::Capacity => Ok(encode_capacity_kwh(value)),
        }
    }

    pub fn decode(self, reg: u16) -> f64 {
        match self {
            Quantity::Power => decode_power_kw(reg),
            Quantity::Soc => decode_soc(reg),
            Quantity::Soh => decode_soh(reg),
            Quantity::Capacity => decode_capacity_kwh(reg),
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Quantity::Power => "kW",
            Quantity::Soc | Quantity::Soh => "%",
            Quantity::Capacity => "kWh",
        }
    }

    /// Decimal places that represent one LSB
    pub fn precision(self) -> usize {
        match self {
            Quantity::Power | Quantity::Capacity => 1,
            Quantity::Soc | Quantity::Soh => 0,
        }
    }
}

/// How a raw register should be presented to a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeMode {
    Power,
    Soc,
    Soh,
    Capacity,
    Raw,
}

impl DecodeMode {
    pub fn quantity(self) -> Option<Quantity> {
        match self {
            DecodeMode::Power => Some(Quantity::Power),
            DecodeMode::Soc => Some(Quantity::Soc),
            DecodeMode::Soh => Some(Quantity::Soh),
            DecodeMode::Capacity => Some(Quantity::Capacity),
            DecodeMode::Raw => None,
        }
    }

    /// Render a register, e.g. `12.3 kW` or `1230` for raw mode
    pub fn format(self, reg: u16) -> String {
        match self.quantity() {
            Some(q) => format!("{:.*} {}", q.precision(), q.decode(reg), q.unit()),
            None => reg.to_string(),
        }
    }
}
