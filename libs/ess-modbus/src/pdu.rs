//! MBAP/PDU codec
//!
//! Builds request frames and parses response frames for the three function
//! codes this crate speaks: FC03, FC04 and FC06. The server-side half
//! (request parsing, response building) backs the device simulator.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{
    EXCEPTION_BIT, FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS, FC_WRITE_SINGLE_REGISTER,
    mbap_frame_size, MBAP_HEADER_LEN, MIN_FRAME_LEN, PROTOCOL_ID,
};
use crate::error::{ModbusError, Result};

/// Register bank addressed by a read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterBank {
    /// Read/write registers, FC03
    Holding,
    /// Read-only registers, FC04
    Input,
}

impl RegisterBank {
    #[inline]
    pub fn read_function_code(self) -> u8 {
        match self {
            RegisterBank::Holding => FC_READ_HOLDING_REGISTERS,
            RegisterBank::Input => FC_READ_INPUT_REGISTERS,
        }
    }

    /// Short label used in logs and CLI output (`HR` / `IR`)
    pub fn label(self) -> &'static str {
        match self {
            RegisterBank::Holding => "HR",
            RegisterBank::Input => "IR",
        }
    }
}

/// Function-specific part of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPdu {
    ReadHoldingRegisters { address: u16, count: u16 },
    ReadInputRegisters { address: u16, count: u16 },
    WriteSingleRegister { address: u16, value: u16 },
}

impl RequestPdu {
    pub fn read(bank: RegisterBank, address: u16, count: u16) -> Self {
        match bank {
            RegisterBank::Holding => RequestPdu::ReadHoldingRegisters { address, count },
            RegisterBank::Input => RequestPdu::ReadInputRegisters { address, count },
        }
    }

    pub fn function_code(&self) -> u8 {
        match self {
            RequestPdu::ReadHoldingRegisters { .. } => FC_READ_HOLDING_REGISTERS,
            RequestPdu::ReadInputRegisters { .. } => FC_READ_INPUT_REGISTERS,
            RequestPdu::WriteSingleRegister { .. } => FC_WRITE_SINGLE_REGISTER,
        }
    }

    /// Function code followed by two big-endian words
    pub fn encode(&self, dst: &mut BytesMut) {
        let (first, second) = match *self {
            RequestPdu::ReadHoldingRegisters { address, count }
            | RequestPdu::ReadInputRegisters { address, count } => (address, count),
            RequestPdu::WriteSingleRegister { address, value } => (address, value),
        };
        dst.reserve(5);
        dst.put_u8(self.function_code());
        dst.put_u16(first);
        dst.put_u16(second);
    }
}

/// A complete request: MBAP addressing plus PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub transaction_id: u16,
    pub unit_id: u8,
    pub pdu: RequestPdu,
}

impl Request {
    pub fn function_code(&self) -> u8 {
        self.pdu.function_code()
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut pdu = BytesMut::with_capacity(5);
        self.pdu.encode(&mut pdu);
        build_mbap(self.transaction_id, self.unit_id, &pdu)
    }
}

/// Decoded response payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePayload {
    /// FC03/FC04 register values in address order
    Registers(Vec<u16>),
    /// FC06 acknowledgment; the device echoes the written address and value
    WriteAck { address: u16, value: u16 },
    /// Exception code from a response whose function code has the high bit set
    Exception(u8),
    /// Function code this crate does not interpret
    Empty,
}

/// A parsed response frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub transaction_id: u16,
    pub unit_id: u8,
    pub function_code: u8,
    pub payload: ResponsePayload,
}

impl Response {
    pub fn is_exception(&self) -> bool {
        self.function_code & EXCEPTION_BIT != 0
    }

    /// Check that this response answers `request` before its payload is trusted.
    ///
    /// Transaction id and function code (exception bit masked) must match.
    /// For FC06 the echoed address/value must equal what was written.
    pub fn verify_for(&self, request: &Request) -> Result<()> {
        if self.transaction_id != request.transaction_id {
            return Err(ModbusError::format(format!(
                "transaction id mismatch: expected {:04X}, got {:04X}",
                request.transaction_id, self.transaction_id
            )));
        }

        let response_fc = self.function_code & !EXCEPTION_BIT;
        if response_fc != request.function_code() {
            return Err(ModbusError::format(format!(
                "function code mismatch: expected {:02X}, got {:02X}",
                request.function_code(),
                self.function_code
            )));
        }

        if let (
            RequestPdu::WriteSingleRegister { address, value },
            ResponsePayload::WriteAck {
                address: echoed_address,
                value: echoed_value,
            },
        ) = (&request.pdu, &self.payload)
        {
            if address != echoed_address || value != echoed_value {
                return Err(ModbusError::format(format!(
                    "write echo mismatch: wrote {}={}, device echoed {}={}",
                    address, value, echoed_address, echoed_value
                )));
            }
        }

        Ok(())
    }
}

/// Wrap `pdu` in an MBAP header: transaction id, protocol id 0,
/// length = 1 + len(pdu), unit id.
pub fn build_mbap(transaction_id: u16, unit_id: u8, pdu: &[u8]) -> Bytes {
    let length = (pdu.len() + 1) as u16;
    let mut frame = BytesMut::with_capacity(mbap_frame_size(pdu.len()));
    frame.put_u16(transaction_id);
    frame.put_u16(PROTOCOL_ID);
    frame.put_u16(length);
    frame.put_u8(unit_id);
    frame.put_slice(pdu);

    debug!(
        "Building TCP frame: trans_id={:04X}, unit_id={}, FC={:02X}, PDU_len={}",
        transaction_id,
        unit_id,
        pdu.first().copied().unwrap_or(0),
        pdu.len()
    );

    frame.freeze()
}

/// FC03/FC04 request frame
pub fn build_read_request(
    transaction_id: u16,
    unit_id: u8,
    bank: RegisterBank,
    address: u16,
    count: u16,
) -> Bytes {
    Request {
        transaction_id,
        unit_id,
        pdu: RequestPdu::read(bank, address, count),
    }
    .to_bytes()
}

/// FC06 request frame
pub fn build_write_request(transaction_id: u16, unit_id: u8, address: u16, value: u16) -> Bytes {
    Request {
        transaction_id,
        unit_id,
        pdu: RequestPdu::WriteSingleRegister { address, value },
    }
    .to_bytes()
}

/// Split a frame into (transaction id, unit id, PDU) after header checks
fn split_frame(frame: &[u8]) -> Result<(u16, u8, &[u8])> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(ModbusError::format(format!(
            "frame too short: {} bytes (min {})",
            frame.len(),
            MIN_FRAME_LEN
        )));
    }

    let transaction_id = u16::from_be_bytes([frame[0], frame[1]]);
    let protocol_id = u16::from_be_bytes([frame[2], frame[3]]);
    let length = u16::from_be_bytes([frame[4], frame[5]]);
    let unit_id = frame[6];

    debug!(
        "MBAP header: trans_id={:04X}, protocol_id={:04X}, length={}, unit_id={}",
        transaction_id, protocol_id, length, unit_id
    );

    if protocol_id != PROTOCOL_ID {
        return Err(ModbusError::format(format!(
            "invalid protocol id: expected 0, got {}",
            protocol_id
        )));
    }

    Ok((transaction_id, unit_id, &frame[MBAP_HEADER_LEN + 1..]))
}

/// Parse one complete response frame.
///
/// The transaction id is reported but not checked here; callers holding the
/// request use [`Response::verify_for`].
pub fn parse_response(frame: &[u8]) -> Result<Response> {
    let (transaction_id, unit_id, pdu) = split_frame(frame)?;
    let function_code = pdu[0];
    let data = &pdu[1..];

    let payload = if function_code & EXCEPTION_BIT != 0 {
        let code = *data
            .first()
            .ok_or_else(|| ModbusError::format("exception response without exception code"))?;
        debug!(
            "Exception response: FC={:02X}, exception_code={:02X}",
            function_code, code
        );
        ResponsePayload::Exception(code)
    } else {
        match function_code {
            FC_READ_HOLDING_REGISTERS | FC_READ_INPUT_REGISTERS => {
                let byte_count = *data
                    .first()
                    .ok_or_else(|| ModbusError::format("read response without byte count"))?
                    as usize;
                if byte_count % 2 != 0 {
                    return Err(ModbusError::format(format!(
                        "odd register byte count: {}",
                        byte_count
                    )));
                }
                let bytes = data.get(1..1 + byte_count).ok_or_else(|| {
                    ModbusError::format(format!(
                        "read response truncated: byte count {}, {} data bytes",
                        byte_count,
                        data.len() - 1
                    ))
                })?;
                ResponsePayload::Registers(
                    bytes
                        .chunks_exact(2)
                        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                        .collect(),
                )
            },
            FC_WRITE_SINGLE_REGISTER => {
                if data.len() < 4 {
                    return Err(ModbusError::format(format!(
                        "write response too short: {} bytes",
                        data.len()
                    )));
                }
                ResponsePayload::WriteAck {
                    address: u16::from_be_bytes([data[0], data[1]]),
                    value: u16::from_be_bytes([data[2], data[3]]),
                }
            },
            _ => ResponsePayload::Empty,
        }
    };

    Ok(Response {
        transaction_id,
        unit_id,
        function_code,
        payload,
    })
}

// ============================================================================
// Server side
// ============================================================================

/// Parse one complete request frame.
///
/// Function codes other than 3/4/6 yield [`ModbusError::Unsupported`] so a
/// server can answer with an ILLEGAL FUNCTION exception.
pub fn parse_request(frame: &[u8]) -> Result<Request> {
    let (transaction_id, unit_id, pdu) = split_frame(frame)?;
    let function_code = pdu[0];

    if !matches!(
        function_code,
        FC_READ_HOLDING_REGISTERS | FC_READ_INPUT_REGISTERS | FC_WRITE_SINGLE_REGISTER
    ) {
        return Err(ModbusError::Unsupported(function_code));
    }

    if pdu.len() < 5 {
        return Err(ModbusError::format(format!(
            "request PDU too short: {} bytes",
            pdu.len()
        )));
    }
    let first = u16::from_be_bytes([pdu[1], pdu[2]]);
    let second = u16::from_be_bytes([pdu[3], pdu[4]]);

    let pdu = match function_code {
        FC_READ_HOLDING_REGISTERS => RequestPdu::ReadHoldingRegisters {
            address: first,
            count: second,
        },
        FC_READ_INPUT_REGISTERS => RequestPdu::ReadInputRegisters {
            address: first,
            count: second,
        },
        _ => RequestPdu::WriteSingleRegister {
            address: first,
            value: second,
        },
    };

    Ok(Request {
        transaction_id,
        unit_id,
        pdu,
    })
}

/// FC03/FC04 response frame carrying `registers`
pub fn build_read_response(
    transaction_id: u16,
    unit_id: u8,
    function_code: u8,
    registers: &[u16],
) -> Bytes {
    let mut pdu = BytesMut::with_capacity(2 + registers.len() * 2);
    pdu.put_u8(function_code);
    pdu.put_u8((registers.len() * 2) as u8);
    for &reg in registers {
        pdu.put_u16(reg);
    }
    build_mbap(transaction_id, unit_id, &pdu)
}

/// FC06 response frame; echoes the request
pub fn build_write_response(transaction_id: u16, unit_id: u8, address: u16, value: u16) -> Bytes {
    build_write_request(transaction_id, unit_id, address, value)
}

/// Exception response: function code with the high bit set, then the code
pub fn build_exception_response(
    transaction_id: u16,
    unit_id: u8,
    function_code: u8,
    exception_code: u8,
) -> Bytes {
    build_mbap(
        transaction_id,
        unit_id,
        &[function_code | EXCEPTION_BIT, exception_code],
    )
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_build_mbap_header() {
        let frame = build_mbap(0x0102, 0x11, &[0x03, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(
            frame.as_ref(),
            &[0x01, 0x02, 0x00, 0x00, 0x00, 0x06, 0x11, 0x03, 0x00, 0x00, 0x00, 0x01]
        );
    }

    #[test]
    fn test_build_read_request_holding() {
        let frame = build_read_request(1, 1, RegisterBank::Holding, 0, 1);
        assert_eq!(
            frame.as_ref(),
            &[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01]
        );
    }

    #[test]
    fn test_build_read_request_input() {
        let frame = build_read_request(7, 10, RegisterBank::Input, 0x0100, 0x000A);
        assert_eq!(frame[7], FC_READ_INPUT_REGISTERS);
        assert_eq!(&frame[8..], &[0x01, 0x00, 0x00, 0x0A]);
    }

    #[test]
    fn test_build_write_request() {
        let frame = build_write_request(2, 1, 0, 1230);
        assert_eq!(
            frame.as_ref(),
            &[0x00, 0x02, 0x00, 0x00, 0x00, 0x06, 0x01, 0x06, 0x00, 0x00, 0x04, 0xCE]
        );
    }

    #[test]
    fn test_length_field_counts_unit_id_and_pdu() {
        let frame = build_write_request(9, 1, 0xFFFF, 0xFFFF);
        let length = u16::from_be_bytes([frame[4], frame[5]]) as usize;
        assert_eq!(frame.len(), MBAP_HEADER_LEN + length);
        assert_eq!(frame.len(), mbap_frame_size(5));
    }

    #[test]
    fn test_parse_read_response() {
        let frame = build_read_response(5, 1, FC_READ_HOLDING_REGISTERS, &[1230, 0xFFFF]);
        let response = parse_response(&frame).unwrap();
        assert_eq!(response.transaction_id, 5);
        assert_eq!(response.unit_id, 1);
        assert_eq!(response.function_code, 0x03);
        assert_eq!(
            response.payload,
            ResponsePayload::Registers(vec![1230, 0xFFFF])
        );
    }

    #[test]
    fn test_parse_exception_response() {
        let frame = [0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 0x01, 0x83, 0x02];
        let response = parse_response(&frame).unwrap();
        assert!(response.is_exception());
        assert_eq!(response.payload, ResponsePayload::Exception(0x02));
    }

    #[test]
    fn test_parse_write_ack() {
        let frame = build_write_response(3, 1, 0, 1230);
        let response = parse_response(&frame).unwrap();
        assert_eq!(
            response.payload,
            ResponsePayload::WriteAck {
                address: 0,
                value: 1230
            }
        );
    }

    #[test]
    fn test_parse_unknown_function_is_empty() {
        let frame = build_mbap(1, 1, &[0x2B, 0x0E]);
        let response = parse_response(&frame).unwrap();
        assert_eq!(response.function_code, 0x2B);
        assert_eq!(response.payload, ResponsePayload::Empty);
    }

    #[test]
    fn test_parse_frame_too_short() {
        let result = parse_response(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x01]);
        assert!(matches!(result, Err(ModbusError::FormatError(_))));
    }

    #[test]
    fn test_parse_invalid_protocol_id() {
        let mut frame = build_read_response(1, 1, 0x03, &[1]).to_vec();
        frame[3] = 0x01;
        let err = parse_response(&frame).unwrap_err();
        assert!(err.to_string().contains("protocol id"));
    }

    #[test]
    fn test_parse_odd_byte_count() {
        let frame = build_mbap(1, 1, &[0x03, 0x03, 0x00, 0x01, 0x02]);
        assert!(matches!(
            parse_response(&frame),
            Err(ModbusError::FormatError(_))
        ));
    }

    #[test]
    fn test_parse_truncated_register_data() {
        let frame = build_mbap(1, 1, &[0x04, 0x04, 0x00, 0x01]);
        let err = parse_response(&frame).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_verify_transaction_id_mismatch() {
        let request = Request {
            transaction_id: 1,
            unit_id: 1,
            pdu: RequestPdu::read(RegisterBank::Holding, 0, 1),
        };
        let response = parse_response(&build_read_response(2, 1, 0x03, &[1])).unwrap();
        let err = response.verify_for(&request).unwrap_err();
        assert!(err.to_string().contains("transaction id mismatch"));
    }

    #[test]
    fn test_verify_accepts_matching_exception() {
        let request = Request {
            transaction_id: 4,
            unit_id: 1,
            pdu: RequestPdu::read(RegisterBank::Input, 0, 1),
        };
        let response = parse_response(&build_exception_response(4, 1, 0x04, 0x02)).unwrap();
        assert!(response.verify_for(&request).is_ok());
    }

    #[test]
    fn test_verify_function_code_mismatch() {
        let request = Request {
            transaction_id: 4,
            unit_id: 1,
            pdu: RequestPdu::read(RegisterBank::Input, 0, 1),
        };
        let response = parse_response(&build_read_response(4, 1, 0x03, &[1])).unwrap();
        assert!(response.verify_for(&request).is_err());
    }

    #[test]
    fn test_verify_write_echo_mismatch() {
        let request = Request {
            transaction_id: 8,
            unit_id: 1,
            pdu: RequestPdu::WriteSingleRegister {
                address: 0,
                value: 1230,
            },
        };
        let response = parse_response(&build_write_response(8, 1, 0, 1229)).unwrap();
        let err = response.verify_for(&request).unwrap_err();
        assert!(err.to_string().contains("echo mismatch"));
    }

    #[test]
    fn test_parse_request_roundtrip_fields() {
        let request = parse_request(&build_read_request(11, 3, RegisterBank::Input, 40, 2)).unwrap();
        assert_eq!(request.transaction_id, 11);
        assert_eq!(request.unit_id, 3);
        assert_eq!(
            request.pdu,
            RequestPdu::ReadInputRegisters {
                address: 40,
                count: 2
            }
        );
    }

    #[test]
    fn test_parse_request_unsupported_function() {
        let frame = build_mbap(1, 1, &[0x10, 0x00, 0x00, 0x00, 0x01, 0x02, 0x00, 0x01]);
        assert_eq!(parse_request(&frame), Err(ModbusError::Unsupported(0x10)));
    }
}
