//! HCI command opcodes and builders used by the bring-up sequence.
//!
//! Commands are framed as `[opcode LE u16, parameter length u8, parameters]`
//! behind the H4 command indicator and handed to a [`CommandSink`]. Only the
//! fixed set of commands the bring-up chain issues is provided here; the
//! host stack above owns the rest of the HCI command surface.

use super::error::TransportError;

/// A 16-bit HCI command opcode (OGF << 10 | OCF).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Opcode(pub u16);

/// Opcodes touched by the bring-up sequence.
pub mod opcode {
    use super::Opcode;

    pub const SET_EVENT_MASK: Opcode = Opcode(0x0C01);
    pub const RESET: Opcode = Opcode(0x0C03);
    pub const READ_BD_ADDR: Opcode = Opcode(0x1009);
    pub const LE_SET_EVENT_MASK: Opcode = Opcode(0x2001);
    pub const LE_READ_BUFFER_SIZE: Opcode = Opcode(0x2002);
    pub const LE_READ_LOCAL_SUPPORTED_FEATURES: Opcode = Opcode(0x2003);
    pub const LE_READ_WHITE_LIST_SIZE: Opcode = Opcode(0x200F);
    pub const LE_RAND: Opcode = Opcode(0x2018);
    pub const LE_READ_SUPPORTED_STATES: Opcode = Opcode(0x201C);
    pub const LE_WRITE_DEFAULT_DATA_LENGTH: Opcode = Opcode(0x2024);
    pub const LE_READ_RESOLVING_LIST_SIZE: Opcode = Opcode(0x202A);
    pub const LE_READ_MAX_DATA_LENGTH: Opcode = Opcode(0x202F);
    pub const LE_READ_MAX_ADV_DATA_LENGTH: Opcode = Opcode(0x203A);
    pub const LE_READ_NUM_SUPPORTED_ADV_SETS: Opcode = Opcode(0x203B);
    pub const LE_READ_PERIODIC_ADV_LIST_SIZE: Opcode = Opcode(0x204A);
}

/// H4 packet indicators carried as the first serial unit of each frame.
pub mod packet_kind {
    pub const COMMAND: u8 = 0x01;
    pub const ACL_DATA: u8 = 0x02;
    pub const EVENT: u8 = 0x04;
}

/// Event mask bits for Set Event Mask (Core spec Vol 4 Part E 7.3.1).
pub mod event_mask {
    pub const DISCONNECTION_COMPLETE: u64 = 1 << 4;
    pub const ENCRYPTION_CHANGE: u64 = 1 << 7;
    pub const READ_REMOTE_VERSION_COMPLETE: u64 = 1 << 11;
    pub const HARDWARE_ERROR: u64 = 1 << 15;
    pub const DATA_BUFFER_OVERFLOW: u64 = 1 << 25;
    pub const ENCRYPTION_KEY_REFRESH_COMPLETE: u64 = 1 << 47;
    pub const LE_META: u64 = 1 << 61;

    /// Events a LE-only host cares about.
    pub const DEFAULT: u64 = DISCONNECTION_COMPLETE
        | ENCRYPTION_CHANGE
        | READ_REMOTE_VERSION_COMPLETE
        | HARDWARE_ERROR
        | DATA_BUFFER_OVERFLOW
        | ENCRYPTION_KEY_REFRESH_COMPLETE
        | LE_META;
}

/// LE event mask bits for LE Set Event Mask (7.8.1).
pub mod le_event_mask {
    pub const CONNECTION_COMPLETE: u64 = 1 << 0;
    pub const ADVERTISING_REPORT: u64 = 1 << 1;
    pub const CONNECTION_UPDATE_COMPLETE: u64 = 1 << 2;
    pub const READ_REMOTE_FEATURES_COMPLETE: u64 = 1 << 3;
    pub const LONG_TERM_KEY_REQUEST: u64 = 1 << 4;
    pub const REMOTE_CONNECTION_PARAMETER_REQUEST: u64 = 1 << 5;
    pub const DATA_LENGTH_CHANGE: u64 = 1 << 6;

    pub const DEFAULT: u64 = CONNECTION_COMPLETE
        | ADVERTISING_REPORT
        | CONNECTION_UPDATE_COMPLETE
        | READ_REMOTE_FEATURES_COMPLETE
        | LONG_TERM_KEY_REQUEST
        | REMOTE_CONNECTION_PARAMETER_REQUEST
        | DATA_LENGTH_CHANGE;
}

/// HCI limits a command parameter block to one length octet.
const MAX_PARAMS: usize = 255;

/// Scratch size for a framed command: opcode, length octet, parameters.
pub(crate) const MAX_COMMAND_LEN: usize = 3 + MAX_PARAMS;

/// Outbound command seam between the bring-up sequence and the transport.
///
/// Implemented by [`SpiTransport`](super::SpiTransport); tests and vendor
/// extension hooks get a `&mut dyn CommandSink` so they can issue commands of
/// their own.
pub trait CommandSink {
    /// Serialize and transmit one HCI command.
    fn send_command(&mut self, opcode: Opcode, params: &[u8]) -> Result<(), TransportError>;
}

pub(crate) fn reset(sink: &mut dyn CommandSink) -> Result<(), TransportError> {
    sink.send_command(opcode::RESET, &[])
}

pub(crate) fn set_event_mask(sink: &mut dyn CommandSink, mask: u64) -> Result<(), TransportError> {
    sink.send_command(opcode::SET_EVENT_MASK, &mask.to_le_bytes())
}

pub(crate) fn le_set_event_mask(
    sink: &mut dyn CommandSink,
    mask: u64,
) -> Result<(), TransportError> {
    sink.send_command(opcode::LE_SET_EVENT_MASK, &mask.to_le_bytes())
}

pub(crate) fn read_bd_addr(sink: &mut dyn CommandSink) -> Result<(), TransportError> {
    sink.send_command(opcode::READ_BD_ADDR, &[])
}

pub(crate) fn le_read_buffer_size(sink: &mut dyn CommandSink) -> Result<(), TransportError> {
    sink.send_command(opcode::LE_READ_BUFFER_SIZE, &[])
}

pub(crate) fn le_read_supported_states(sink: &mut dyn CommandSink) -> Result<(), TransportError> {
    sink.send_command(opcode::LE_READ_SUPPORTED_STATES, &[])
}

pub(crate) fn le_read_white_list_size(sink: &mut dyn CommandSink) -> Result<(), TransportError> {
    sink.send_command(opcode::LE_READ_WHITE_LIST_SIZE, &[])
}

pub(crate) fn le_read_local_supported_features(
    sink: &mut dyn CommandSink,
) -> Result<(), TransportError> {
    sink.send_command(opcode::LE_READ_LOCAL_SUPPORTED_FEATURES, &[])
}

pub(crate) fn le_read_resolving_list_size(
    sink: &mut dyn CommandSink,
) -> Result<(), TransportError> {
    sink.send_command(opcode::LE_READ_RESOLVING_LIST_SIZE, &[])
}

pub(crate) fn le_read_max_data_length(sink: &mut dyn CommandSink) -> Result<(), TransportError> {
    sink.send_command(opcode::LE_READ_MAX_DATA_LENGTH, &[])
}

pub(crate) fn le_write_default_data_length(
    sink: &mut dyn CommandSink,
    tx_octets: u16,
    tx_time: u16,
) -> Result<(), TransportError> {
    let mut params = [0u8; 4];
    params[..2].copy_from_slice(&tx_octets.to_le_bytes());
    params[2..].copy_from_slice(&tx_time.to_le_bytes());
    sink.send_command(opcode::LE_WRITE_DEFAULT_DATA_LENGTH, &params)
}

pub(crate) fn le_rand(sink: &mut dyn CommandSink) -> Result<(), TransportError> {
    sink.send_command(opcode::LE_RAND, &[])
}

/// Frame a command packet into `buf`, returning the used prefix.
///
/// Layout after the H4 indicator byte: opcode (LE), parameter length, then
/// the parameters. `buf` must hold `3 + params.len()` bytes.
pub(crate) fn frame_command<'a>(buf: &'a mut [u8], opcode: Opcode, params: &[u8]) -> &'a [u8] {
    let total = 3 + params.len();
    buf[..2].copy_from_slice(&opcode.0.to_le_bytes());
    buf[2] = params.len() as u8;
    buf[3..total].copy_from_slice(params);
    &buf[..total]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_command_lays_out_header_and_params() {
        let mut buf = [0u8; MAX_COMMAND_LEN];
        let frame = frame_command(
            &mut buf,
            opcode::LE_WRITE_DEFAULT_DATA_LENGTH,
            &[0xFB, 0x00, 0x48, 0x08],
        );
        assert_eq!(frame, &[0x24, 0x20, 0x04, 0xFB, 0x00, 0x48, 0x08]);
    }

    #[test]
    fn frame_command_without_params_is_header_only() {
        let mut buf = [0u8; MAX_COMMAND_LEN];
        let frame = frame_command(&mut buf, opcode::RESET, &[]);
        assert_eq!(frame, &[0x03, 0x0C, 0x00]);
    }

    #[test]
    fn default_masks_cover_the_le_host_events() {
        assert_eq!(event_mask::DEFAULT & event_mask::LE_META, event_mask::LE_META);
        assert_eq!(
            le_event_mask::DEFAULT,
            0b111_1111,
            "all seven LE subevents of the default mask"
        );
    }
}
