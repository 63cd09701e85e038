//! Post-reset controller bring-up sequence.
//!
//! Drives the EM9301 through the fixed chain of configuration commands that
//! follows HCI Reset: event masks, capability discovery, optional privacy and
//! data-length branches, then four LE Rand round trips to seed the
//! controller's randomness pool. Each Command Complete event advances an
//! explicit step cursor; events that do not match the awaited step are
//! ignored, so a missing response stalls the sequence rather than derailing
//! it.
//!
//! The completed [`Capabilities`] record is published exactly once through an
//! `embassy-sync` [`Signal`], so the rest of the stack never observes a
//! partially populated record.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;

use super::cmd::{self, opcode, CommandSink};
use super::config::SequenceConfig;
use super::error::{BringUpError, TransportError};
use super::event::{self, parse_command_complete, CommandComplete};

/// LE Rand completions required before the sequence finishes.
const RAND_ROUNDS: u8 = 4;

/// LE feature mask bits (Core spec Vol 6 Part B 4.6).
mod feature {
    pub const DATA_LENGTH_EXTENSION: u64 = 1 << 5;
    pub const LL_PRIVACY: u64 = 1 << 6;
}

/// Controller capabilities discovered during bring-up.
///
/// Fields are written once per boot, each by its producing step. The record
/// is observable only after the sequence completes, via
/// [`BringUpSequence::capabilities`] or the completion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Capabilities {
    /// Public Bluetooth device address.
    pub bd_addr: [u8; 6],
    /// Maximum LE ACL data packet length accepted by the controller.
    pub acl_packet_len: u16,
    /// Number of LE ACL data packets the controller can buffer.
    pub acl_packet_count: u8,
    /// Outbound ACL credit counter, initialized to `acl_packet_count`.
    pub available_packets: u8,
    /// Supported LE states bitmap.
    pub le_states: u64,
    /// White list capacity.
    pub white_list_size: u8,
    /// LE feature mask.
    pub le_features: u64,
    /// Resolving list capacity (0 when LL Privacy is unsupported or disabled).
    pub resolving_list_size: u8,
    /// Controller maximum supported payload octets for transmission.
    pub max_tx_octets: u16,
    /// Controller maximum supported packet transmission time, in us.
    pub max_tx_time: u16,
    /// Maximum advertising data length (0 without a vendor extension).
    pub max_adv_data_len: u16,
    /// Number of supported advertising sets (0 without a vendor extension).
    pub num_supported_adv_sets: u8,
    /// Periodic advertiser list capacity (0 without a vendor extension).
    pub periodic_adv_list_size: u8,
}

/// Vendor extension of the bring-up chain.
///
/// When installed, the hook takes over after LE Write Suggested Default Data
/// Length completes: it receives that completion and every extended
/// advertising read completion, may issue its own commands through the sink
/// and record results in the capability record, and rejoins the standard
/// chain by issuing LE Rand.
pub trait VendorSequence {
    /// Handle one completion and issue the next vendor command.
    fn continue_sequence(
        &mut self,
        event: &CommandComplete<'_>,
        caps: &mut Capabilities,
        sink: &mut dyn CommandSink,
    ) -> Result<(), TransportError>;
}

/// The completion the sequence is currently waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum Step {
    Idle,
    Reset,
    SetEventMask,
    LeSetEventMask,
    ReadBdAddr,
    LeReadBufferSize,
    LeReadSupportedStates,
    LeReadWhiteListSize,
    LeReadLocalSupportedFeatures,
    LeReadResolvingListSize,
    LeReadMaxDataLength,
    LeWriteDefaultDataLength,
    /// A vendor hook owns sequencing until it issues LE Rand.
    Vendor,
    LeRand,
    Complete,
}

/// Bring-up sequence state machine.
///
/// Owned by [`Em9301Driver`](super::Em9301Driver); can also be driven
/// directly by a host stack that does its own event dispatch.
pub struct BringUpSequence<'d, M: RawMutex> {
    config: SequenceConfig,
    step: Step,
    rand_rounds: u8,
    caps: Capabilities,
    hook: Option<&'d mut dyn VendorSequence>,
    done: &'d Signal<M, Capabilities>,
}

impl<'d, M: RawMutex> BringUpSequence<'d, M> {
    /// Create an idle sequence. `done` fires once, with the completed
    /// capability record, when bring-up finishes.
    pub fn new(config: SequenceConfig, done: &'d Signal<M, Capabilities>) -> Self {
        Self {
            config,
            step: Step::Idle,
            rand_rounds: 0,
            caps: Capabilities::default(),
            hook: None,
            done,
        }
    }

    /// Install a vendor extension hook.
    pub fn with_vendor_hook(mut self, hook: &'d mut dyn VendorSequence) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Begin (or restart) the sequence by issuing HCI Reset.
    pub fn start(&mut self, sink: &mut dyn CommandSink) -> Result<(), BringUpError> {
        self.step = Step::Reset;
        self.rand_rounds = 0;
        self.caps = Capabilities::default();
        debug!("bring-up: issuing HCI Reset");
        cmd::reset(sink)?;
        Ok(())
    }

    /// True once the completion signal has fired.
    pub fn is_complete(&self) -> bool {
        self.step == Step::Complete
    }

    /// The discovered capability record, available after completion.
    pub fn capabilities(&self) -> Option<&Capabilities> {
        (self.step == Step::Complete).then_some(&self.caps)
    }

    /// Feed one inbound HCI event packet to the sequence.
    ///
    /// Non-Command-Complete events and completions that do not match the
    /// awaited step are ignored.
    pub fn on_event(
        &mut self,
        sink: &mut dyn CommandSink,
        packet: &[u8],
    ) -> Result<(), BringUpError> {
        let Some(cc) = parse_command_complete(packet) else {
            return Ok(());
        };
        if cc.status != 0 {
            warn!(
                "bring-up: command 0x{:04X} completed with status 0x{:02X}",
                cc.opcode.0, cc.status
            );
        }

        match cc.opcode {
            opcode::RESET if self.step == Step::Reset => {
                self.rand_rounds = 0;
                cmd::set_event_mask(sink, self.config.event_mask)?;
                self.step = Step::SetEventMask;
            }

            opcode::SET_EVENT_MASK if self.step == Step::SetEventMask => {
                cmd::le_set_event_mask(sink, self.config.le_event_mask)?;
                self.step = Step::LeSetEventMask;
            }

            opcode::LE_SET_EVENT_MASK if self.step == Step::LeSetEventMask => {
                cmd::read_bd_addr(sink)?;
                self.step = Step::ReadBdAddr;
            }

            opcode::READ_BD_ADDR if self.step == Step::ReadBdAddr => {
                match cc.return_params.get(..6) {
                    Some(addr) => self.caps.bd_addr.copy_from_slice(addr),
                    None => warn!("bring-up: short BD_ADDR return parameters"),
                }
                cmd::le_read_buffer_size(sink)?;
                self.step = Step::LeReadBufferSize;
            }

            opcode::LE_READ_BUFFER_SIZE if self.step == Step::LeReadBufferSize => {
                match (
                    event::read_u16(cc.return_params, 0),
                    cc.return_params.get(2).copied(),
                ) {
                    (Some(len), Some(count)) => {
                        self.caps.acl_packet_len = len;
                        self.caps.acl_packet_count = count;
                        self.caps.available_packets = count;
                    }
                    _ => warn!("bring-up: short LE buffer size return parameters"),
                }
                cmd::le_read_supported_states(sink)?;
                self.step = Step::LeReadSupportedStates;
            }

            opcode::LE_READ_SUPPORTED_STATES if self.step == Step::LeReadSupportedStates => {
                match event::read_u64(cc.return_params, 0) {
                    Some(states) => self.caps.le_states = states,
                    None => warn!("bring-up: short LE states return parameters"),
                }
                cmd::le_read_white_list_size(sink)?;
                self.step = Step::LeReadWhiteListSize;
            }

            opcode::LE_READ_WHITE_LIST_SIZE if self.step == Step::LeReadWhiteListSize => {
                match cc.return_params.first().copied() {
                    Some(size) => self.caps.white_list_size = size,
                    None => warn!("bring-up: short white list size return parameters"),
                }
                cmd::le_read_local_supported_features(sink)?;
                self.step = Step::LeReadLocalSupportedFeatures;
            }

            opcode::LE_READ_LOCAL_SUPPORTED_FEATURES
                if self.step == Step::LeReadLocalSupportedFeatures =>
            {
                match event::read_u64(cc.return_params, 0) {
                    Some(features) => self.caps.le_features = features,
                    None => warn!("bring-up: short LE features return parameters"),
                }
                self.read_resolving_list_size(sink)?;
            }

            opcode::LE_READ_RESOLVING_LIST_SIZE if self.step == Step::LeReadResolvingListSize => {
                match cc.return_params.first().copied() {
                    Some(size) => self.caps.resolving_list_size = size,
                    None => warn!("bring-up: short resolving list size return parameters"),
                }
                self.read_max_data_length(sink)?;
            }

            opcode::LE_READ_MAX_DATA_LENGTH if self.step == Step::LeReadMaxDataLength => {
                // The next command needs these values, so a short return
                // stalls here instead of advancing with garbage.
                match (
                    event::read_u16(cc.return_params, 0),
                    event::read_u16(cc.return_params, 2),
                ) {
                    (Some(octets), Some(time)) => {
                        self.caps.max_tx_octets = octets;
                        self.caps.max_tx_time = time;
                        cmd::le_write_default_data_length(sink, octets, time)?;
                        self.step = Step::LeWriteDefaultDataLength;
                    }
                    _ => warn!("bring-up: short max data length return parameters"),
                }
            }

            opcode::LE_WRITE_DEFAULT_DATA_LENGTH
                if self.step == Step::LeWriteDefaultDataLength =>
            {
                if self.hook.is_some() {
                    self.step = Step::Vendor;
                    self.forward_to_hook(&cc, sink)?;
                } else {
                    self.caps.max_adv_data_len = 0;
                    self.caps.num_supported_adv_sets = 0;
                    self.caps.periodic_adv_list_size = 0;
                    self.issue_rand(sink)?;
                }
            }

            opcode::LE_READ_MAX_ADV_DATA_LENGTH
            | opcode::LE_READ_NUM_SUPPORTED_ADV_SETS
            | opcode::LE_READ_PERIODIC_ADV_LIST_SIZE
                if self.step == Step::Vendor =>
            {
                self.forward_to_hook(&cc, sink)?;
            }

            opcode::LE_RAND if matches!(self.step, Step::LeRand | Step::Vendor) => {
                if self.rand_rounds < RAND_ROUNDS - 1 {
                    self.rand_rounds += 1;
                    self.issue_rand(sink)?;
                } else {
                    self.step = Step::Complete;
                    info!("bring-up complete");
                    self.done.signal(self.caps);
                }
            }

            _ => {
                trace!(
                    "bring-up: ignoring completion of 0x{:04X}",
                    cc.opcode.0
                );
            }
        }

        Ok(())
    }

    /// Branch (a): read the resolving list size only when LL Privacy is both
    /// supported by the controller and enabled in the configuration.
    fn read_resolving_list_size(
        &mut self,
        sink: &mut dyn CommandSink,
    ) -> Result<(), TransportError> {
        if self.caps.le_features & feature::LL_PRIVACY != 0 && self.config.privacy {
            cmd::le_read_resolving_list_size(sink)?;
            self.step = Step::LeReadResolvingListSize;
        } else {
            self.caps.resolving_list_size = 0;
            self.read_max_data_length(sink)?;
        }
        Ok(())
    }

    /// Branch (b): negotiate data length only when the extension is both
    /// supported and enabled; otherwise go straight to the random phase.
    fn read_max_data_length(&mut self, sink: &mut dyn CommandSink) -> Result<(), TransportError> {
        if self.caps.le_features & feature::DATA_LENGTH_EXTENSION != 0
            && self.config.data_length_extension
        {
            cmd::le_read_max_data_length(sink)?;
            self.step = Step::LeReadMaxDataLength;
        } else {
            self.issue_rand(sink)?;
        }
        Ok(())
    }

    fn issue_rand(&mut self, sink: &mut dyn CommandSink) -> Result<(), TransportError> {
        cmd::le_rand(sink)?;
        self.step = Step::LeRand;
        Ok(())
    }

    fn forward_to_hook(
        &mut self,
        cc: &CommandComplete<'_>,
        sink: &mut dyn CommandSink,
    ) -> Result<(), TransportError> {
        if let Some(hook) = self.hook.as_mut() {
            hook.continue_sequence(cc, &mut self.caps, sink)?;
        }
        Ok(())
    }
}
