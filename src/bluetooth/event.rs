//! Command Complete event decoding.
//!
//! The bring-up sequence only reacts to Command Complete; every other event
//! is left to the host stack and decodes to `None` here.

use super::cmd::Opcode;

/// Event code of HCI Command Complete.
pub const COMMAND_COMPLETE: u8 = 0x0E;

/// Event header length (event code + parameter length).
const EVENT_HEADER_LEN: usize = 2;

/// A decoded Command Complete event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandComplete<'a> {
    /// Outstanding command credit reported by the controller.
    pub num_hci_cmd_pkts: u8,
    /// Opcode of the completed command.
    pub opcode: Opcode,
    /// Command status (0x00 = success).
    pub status: u8,
    /// Command-specific return parameters, after the status byte.
    pub return_params: &'a [u8],
}

/// Decode a raw HCI event packet as Command Complete.
///
/// Returns `None` for other event codes and for packets too short to carry
/// the credit/opcode/status prefix.
pub fn parse_command_complete(packet: &[u8]) -> Option<CommandComplete<'_>> {
    if packet.len() < EVENT_HEADER_LEN || packet[0] != COMMAND_COMPLETE {
        return None;
    }

    let param_len = packet[1] as usize;
    let params = packet.get(EVENT_HEADER_LEN..EVENT_HEADER_LEN + param_len)?;
    // num_hci_cmd_pkts, opcode (LE), status
    if params.len() < 4 {
        return None;
    }

    Some(CommandComplete {
        num_hci_cmd_pkts: params[0],
        opcode: Opcode(u16::from_le_bytes([params[1], params[2]])),
        status: params[3],
        return_params: &params[4..],
    })
}

/// Read a little-endian `u16` out of return parameters.
pub(crate) fn read_u16(params: &[u8], at: usize) -> Option<u16> {
    let bytes = params.get(at..at + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Read a little-endian `u64` out of return parameters.
pub(crate) fn read_u64(params: &[u8], at: usize) -> Option<u64> {
    let bytes = params.get(at..at + 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Some(u64::from_le_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::cmd::opcode;

    #[test]
    fn parses_a_reset_complete() {
        let packet = [0x0E, 0x04, 0x01, 0x03, 0x0C, 0x00];
        let cc = parse_command_complete(&packet).unwrap();
        assert_eq!(cc.num_hci_cmd_pkts, 1);
        assert_eq!(cc.opcode, opcode::RESET);
        assert_eq!(cc.status, 0x00);
        assert!(cc.return_params.is_empty());
    }

    #[test]
    fn exposes_return_params_after_status() {
        // LE Read White List Size complete, size = 8
        let packet = [0x0E, 0x05, 0x01, 0x0F, 0x20, 0x00, 0x08];
        let cc = parse_command_complete(&packet).unwrap();
        assert_eq!(cc.opcode, opcode::LE_READ_WHITE_LIST_SIZE);
        assert_eq!(cc.return_params, &[0x08]);
    }

    #[test]
    fn rejects_other_event_codes() {
        // Command Status event
        let packet = [0x0F, 0x04, 0x00, 0x01, 0x03, 0x0C];
        assert!(parse_command_complete(&packet).is_none());
    }

    #[test]
    fn rejects_truncated_packets() {
        assert!(parse_command_complete(&[]).is_none());
        assert!(parse_command_complete(&[0x0E]).is_none());
        assert!(parse_command_complete(&[0x0E, 0x04, 0x01, 0x03]).is_none());
        // param_len larger than the buffer
        assert!(parse_command_complete(&[0x0E, 0x0A, 0x01, 0x03, 0x0C, 0x00]).is_none());
    }

    #[test]
    fn little_endian_readers_check_bounds() {
        let params = [0x34, 0x12, 0xAA];
        assert_eq!(read_u16(&params, 0), Some(0x1234));
        assert_eq!(read_u16(&params, 2), None);
        assert_eq!(read_u64(&params, 0), None);
    }
}
