//! # ess-modbus
//!
//! Modbus TCP access to energy-storage device registers: power setpoints and
//! measurements, state of charge, state of health and capacity.
//!
//! ## Layers
//!
//! | Module | Role |
//! |--------|------|
//! | [`register`] | Engineering units ⇄ 16-bit register words |
//! | [`pdu`] | MBAP/PDU request building and response parsing |
//! | [`frame`] | Stream reassembly of MBAP frames, `tokio_util` codec |
//! | [`exchange`] | One request, one verified response, over any async stream |
//! | [`simulator`] | In-memory device for tests and bench work |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use ess_modbus::{register, ModbusExchange, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut exchange =
//!         ModbusExchange::connect("127.0.0.1:1502", Duration::from_secs(5)).await?;
//!
//!     exchange
//!         .write_single_register(1, 0, register::encode_power_kw(123.0)?)
//!         .await?;
//!     let regs = exchange.read_holding_registers(1, 0, 1).await?;
//!     println!("{:.1} kW", register::decode_power_kw(regs[0]));
//!
//!     exchange.close().await
//! }
//! ```
//!
//! Only FC03, FC04 and FC06 are supported; broadcast, coils and
//! multi-register writes are out of scope.

pub mod constants;
pub mod error;
pub mod exchange;
pub mod frame;
pub mod pdu;
pub mod register;
pub mod simulator;

pub use error::{ModbusError, Result};
pub use exchange::ModbusExchange;
pub use frame::{try_extract_frame, MbapCodec};
pub use pdu::{
    build_mbap, build_read_request, build_write_request, parse_request, parse_response,
    RegisterBank, Request, RequestPdu, Response, ResponsePayload,
};
pub use register::{DecodeMode, Quantity};
pub use simulator::ModbusSimulator;
