//! Request/response exchange over a byte stream
//!
//! One request is in flight per connection: send, wait for exactly one
//! frame, parse it and verify it answers the request. The stream itself is
//! supplied by the caller (a `TcpStream` in production, an in-memory duplex
//! in tests).

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;
use tracing::debug;

use crate::constants::MAX_READ_REGISTERS;
use crate::error::{ModbusError, Result};
use crate::frame::MbapCodec;
use crate::pdu::{parse_response, RegisterBank, Request, RequestPdu, Response, ResponsePayload};

/// Modbus TCP client half bound to one stream
pub struct ModbusExchange<T> {
    framed: Framed<T, MbapCodec>,
    next_transaction_id: u16,
    timeout: Duration,
}

impl ModbusExchange<TcpStream> {
    /// Open a TCP connection; the connect attempt is bounded by `timeout`
    pub async fn connect<A: ToSocketAddrs>(addr: A, timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                ModbusError::transport(format!("connect timed out after {:?}", timeout))
            })?
            .map_err(|e| ModbusError::transport(format!("connect failed: {}", e)))?;
        stream.set_nodelay(true)?;
        debug!("Connected to {:?}", stream.peer_addr().ok());
        Ok(Self::new(stream, timeout))
    }
}

impl<T> ModbusExchange<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: T, timeout: Duration) -> Self {
        Self {
            framed: Framed::new(io, MbapCodec),
            next_transaction_id: 1,
            timeout,
        }
    }

    /// Next transaction id; wraps from 0xFFFF to 0x0000
    pub fn next_transaction_id(&mut self) -> u16 {
        let id = self.next_transaction_id;
        self.next_transaction_id = self.next_transaction_id.wrapping_add(1);
        id
    }

    /// Send one request and return the matching response.
    ///
    /// Exception responses are returned as data; the typed helpers below turn
    /// them into [`ModbusError::Exception`].
    pub async fn call(&mut self, unit_id: u8, pdu: RequestPdu) -> Result<Response> {
        let request = Request {
            transaction_id: self.next_transaction_id(),
            unit_id,
            pdu,
        };
        let timeout = self.timeout;

        let frame = tokio::time::timeout(timeout, self.send_and_receive(request))
            .await
            .map_err(|_| {
                ModbusError::transport(format!(
                    "no response to transaction {:04X} within {:?}",
                    request.transaction_id, timeout
                ))
            })??;

        let response = parse_response(&frame)?;
        response.verify_for(&request)?;
        Ok(response)
    }

    async fn send_and_receive(&mut self, request: Request) -> Result<bytes::BytesMut> {
        self.framed.send(request).await?;
        match self.framed.next().await {
            Some(frame) => frame,
            None => Err(ModbusError::transport("connection closed by peer")),
        }
    }

    pub async fn read_registers(
        &mut self,
        unit_id: u8,
        bank: RegisterBank,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>> {
        if count == 0 || count > MAX_READ_REGISTERS {
            return Err(ModbusError::range(format!(
                "register count {} outside 1..={}",
                count, MAX_READ_REGISTERS
            )));
        }

        let response = self
            .call(unit_id, RequestPdu::read(bank, address, count))
            .await?;
        match response.payload {
            ResponsePayload::Registers(registers) => {
                if registers.len() != count as usize {
                    return Err(ModbusError::format(format!(
                        "expected {} registers, got {}",
                        count,
                        registers.len()
                    )));
                }
                Ok(registers)
            },
            ResponsePayload::Exception(code) => Err(ModbusError::Exception {
                function_code: response.function_code,
                code,
            }),
            other => Err(ModbusError::format(format!(
                "unexpected payload for read: {:?}",
                other
            ))),
        }
    }

    pub async fn read_holding_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>> {
        self.read_registers(unit_id, RegisterBank::Holding, address, count)
            .await
    }

    pub async fn read_input_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>> {
        self.read_registers(unit_id, RegisterBank::Input, address, count)
            .await
    }

    /// FC06; the echo has already been checked by [`Response::verify_for`]
    pub async fn write_single_register(
        &mut self,
        unit_id: u8,
        address: u16,
        value: u16,
    ) -> Result<()> {
        let response = self
            .call(unit_id, RequestPdu::WriteSingleRegister { address, value })
            .await?;
        match response.payload {
            ResponsePayload::WriteAck { .. } => Ok(()),
            ResponsePayload::Exception(code) => Err(ModbusError::Exception {
                function_code: response.function_code,
                code,
            }),
            other => Err(ModbusError::format(format!(
                "unexpected payload for write: {:?}",
                other
            ))),
        }
    }

    /// Shut down the write half; `call` has already flushed every request
    pub async fn close(mut self) -> Result<()> {
        self.framed.get_mut().shutdown().await?;
        Ok(())
    }
}
