//! Modbus TCP device simulator
//!
//! A small in-memory energy-storage device for integration tests and bench
//! work. Serves FC03/FC04/FC06; a write to a holding register is mirrored to
//! the input register at the same address, so a power setpoint shows up as
//! the measured power.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::constants::{
    EXCEPTION_ILLEGAL_DATA_ADDRESS, EXCEPTION_ILLEGAL_DATA_VALUE, EXCEPTION_ILLEGAL_FUNCTION,
    MAX_READ_REGISTERS,
};
use crate::error::{ModbusError, Result};
use crate::frame::MbapCodec;
use crate::pdu::{
    build_exception_response, build_read_response, build_write_response, parse_request,
    RegisterBank, Request, RequestPdu,
};

type RegisterMap = Arc<RwLock<HashMap<u16, u16>>>;

/// Simple Modbus TCP simulator; clones share the same register maps
#[derive(Debug, Clone, Default)]
pub struct ModbusSimulator {
    holding_registers: RegisterMap,
    input_registers: RegisterMap,
}

impl ModbusSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    fn bank(&self, bank: RegisterBank) -> &RegisterMap {
        match bank {
            RegisterBank::Holding => &self.holding_registers,
            RegisterBank::Input => &self.input_registers,
        }
    }

    pub async fn set_register(&self, bank: RegisterBank, address: u16, value: u16) {
        self.bank(bank).write().await.insert(address, value);
    }

    pub async fn register(&self, bank: RegisterBank, address: u16) -> Option<u16> {
        self.bank(bank).read().await.get(&address).copied()
    }

    /// Answer one request; always produces a response frame
    pub async fn handle_request(&self, request: &Request) -> Bytes {
        let tid = request.transaction_id;
        let unit = request.unit_id;
        let fc = request.function_code();

        match request.pdu {
            RequestPdu::ReadHoldingRegisters { address, count }
            | RequestPdu::ReadInputRegisters { address, count } => {
                if count == 0 || count > MAX_READ_REGISTERS {
                    return build_exception_response(tid, unit, fc, EXCEPTION_ILLEGAL_DATA_VALUE);
                }
                let bank = if fc == RegisterBank::Holding.read_function_code() {
                    RegisterBank::Holding
                } else {
                    RegisterBank::Input
                };

                let map = self.bank(bank).read().await;
                let values: Option<Vec<u16>> = (0..count)
                    .map(|offset| {
                        address
                            .checked_add(offset)
                            .and_then(|addr| map.get(&addr).copied())
                    })
                    .collect();
                drop(map);

                match values {
                    Some(values) => {
                        debug!(
                            "{}{} x{} -> {:?}",
                            bank.label(),
                            address,
                            count,
                            values
                        );
                        build_read_response(tid, unit, fc, &values)
                    },
                    None => build_exception_response(tid, unit, fc, EXCEPTION_ILLEGAL_DATA_ADDRESS),
                }
            },
            RequestPdu::WriteSingleRegister { address, value } => {
                self.set_register(RegisterBank::Holding, address, value)
                    .await;
                self.set_register(RegisterBank::Input, address, value).await;
                debug!("HR{} <- {}", address, value);
                build_write_response(tid, unit, address, value)
            },
        }
    }

    /// Bind and serve until `token` is cancelled.
    ///
    /// Returns the bound address (useful with port 0) and the accept-loop handle.
    pub async fn start<A: ToSocketAddrs>(
        &self,
        addr: A,
        token: CancellationToken,
    ) -> Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Modbus simulator listening on {}", local_addr);

        let sim = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            debug!("New connection from {}", peer);
                            let sim = sim.clone();
                            let token = token.clone();
                            tokio::spawn(async move {
                                if let Err(e) = sim.handle_connection(stream, token).await {
                                    debug!("Connection {} closed: {}", peer, e);
                                }
                            });
                        },
                        Err(e) => {
                            error!("Accept error: {}", e);
                            break;
                        },
                    },
                    () = token.cancelled() => {
                        info!("Modbus simulator on {} shutting down", local_addr);
                        break;
                    }
                }
            }
        });

        Ok((local_addr, handle))
    }

    async fn handle_connection(&self, stream: TcpStream, token: CancellationToken) -> Result<()> {
        let mut framed = Framed::new(stream, MbapCodec);

        loop {
            let frame = tokio::select! {
                next = framed.next() => match next {
                    Some(frame) => frame?,
                    None => return Ok(()),
                },
                () = token.cancelled() => return Ok(()),
            };

            let response = match parse_request(&frame) {
                Ok(request) => self.handle_request(&request).await,
                Err(ModbusError::Unsupported(fc)) => {
                    let tid = u16::from_be_bytes([frame[0], frame[1]]);
                    build_exception_response(tid, frame[6], fc, EXCEPTION_ILLEGAL_FUNCTION)
                },
                Err(e) => {
                    warn!("Dropping malformed request: {}", e);
                    continue;
                },
            };

            framed.send(response).await?;
        }
    }
}
