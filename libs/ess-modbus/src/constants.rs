//! Modbus TCP protocol constants
//!
//! Frame limits follow the Modbus application protocol:
//! - Maximum PDU size: 253 bytes (inherited from the RS485 ADU limit of 256 bytes)
//! - Register limits are derived from what fits in one PDU

// ============================================================================
// Frame Size Constants
// ============================================================================

/// Bytes of the MBAP header that precede the length-counted region
/// Format: Transaction ID(2) + Protocol ID(2) + Length(2)
/// Note: the Unit ID byte is counted by the length field, not here
pub const MBAP_HEADER_LEN: usize = 6;

/// Smallest frame that carries a unit id and a function code
pub const MIN_FRAME_LEN: usize = MBAP_HEADER_LEN + 2;

/// Maximum PDU size (function code + data)
pub const MAX_PDU_SIZE: usize = 253;

/// Maximum MBAP length field value (Unit ID + PDU)
pub const MAX_MBAP_LENGTH: usize = 1 + MAX_PDU_SIZE;

/// Protocol identifier carried by every Modbus TCP frame
pub const PROTOCOL_ID: u16 = 0;

// ============================================================================
// Function Codes
// ============================================================================

/// FC03 Read Holding Registers
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// FC04 Read Input Registers
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;

/// FC06 Write Single Register
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;

/// High bit set on the function code of an exception response
pub const EXCEPTION_BIT: u8 = 0x80;

// ============================================================================
// Exception Codes (only those the simulator emits)
// ============================================================================

pub const EXCEPTION_ILLEGAL_FUNCTION: u8 = 0x01;
pub const EXCEPTION_ILLEGAL_DATA_ADDRESS: u8 = 0x02;
pub const EXCEPTION_ILLEGAL_DATA_VALUE: u8 = 0x03;

// ============================================================================
// Register Operation Limits
// ============================================================================

/// Maximum number of registers for FC03/FC04
///
/// Response PDU: Function Code(1) + Byte Count(1) + N × 2 ≤ 253
/// Therefore: N ≤ (253 - 2) / 2 = 125
pub const MAX_READ_REGISTERS: u16 = 125;

/// Total Modbus TCP frame size for a PDU of `pdu_len` bytes
///
/// ```
/// use ess_modbus::constants::mbap_frame_size;
/// assert_eq!(mbap_frame_size(5), 12); // 6-byte header + unit id + 5-byte PDU
/// ```
#[inline]
pub const fn mbap_frame_size(pdu_len: usize) -> usize {
    MBAP_HEADER_LEN + 1 + pdu_len
}
