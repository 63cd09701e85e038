//! Driver configuration types.
//!
//! User-facing configuration via [`TransportConfig`] and [`SequenceConfig`]
//! builder patterns. The defaults reproduce the EM9301 reference timing and
//! the standard Cordio-style bring-up behavior.

use super::cmd::{event_mask, le_event_mask};

/// SPI transport poll limits.
///
/// The raw wire protocol paces every outbound byte on two controller-driven
/// signals (the ready line and the 0xFF status echo). These limits bound the
/// corresponding busy-waits so a wedged controller produces a
/// [`TransportError`](super::TransportError) instead of hanging the caller.
#[derive(Debug, Clone, Copy)]
pub struct TransportConfig {
    /// Maximum ready-line polls before giving up on an outbound byte.
    pub max_ready_polls: u32,
    /// Maximum transmissions of a single byte that the controller may
    /// reject before the write fails.
    pub max_accept_retries: u32,
    /// Maximum bytes drained per data-ready service call. A controller that
    /// never drops its data-ready line is reported instead of looping the
    /// interrupt handler forever.
    pub max_burst_bytes: usize,
}

impl TransportConfig {
    pub const fn new() -> Self {
        Self {
            max_ready_polls: 1_000_000,
            max_accept_retries: 1_000_000,
            max_burst_bytes: 1024,
        }
    }

    /// Set the ready-line poll limit.
    pub const fn max_ready_polls(mut self, polls: u32) -> Self {
        self.max_ready_polls = polls;
        self
    }

    /// Set the per-byte accept retry limit.
    pub const fn max_accept_retries(mut self, retries: u32) -> Self {
        self.max_accept_retries = retries;
        self
    }

    /// Set the per-service receive burst limit.
    pub const fn max_burst_bytes(mut self, bytes: usize) -> Self {
        self.max_burst_bytes = bytes;
        self
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Bring-up sequence configuration.
///
/// The two capability gates mirror the controller-stack build options of the
/// reference firmware: a branch of the sequence runs only when the feature is
/// both reported by the controller and enabled here. Build-time defaults come
/// from the `privacy` and `data-length-extension` cargo features.
#[derive(Debug, Clone, Copy)]
pub struct SequenceConfig {
    /// Use LL Privacy if the controller supports it.
    pub(crate) privacy: bool,
    /// Use LE Data Packet Length Extension if the controller supports it.
    pub(crate) data_length_extension: bool,
    /// Event mask written by Set Event Mask.
    pub(crate) event_mask: u64,
    /// Event mask written by LE Set Event Mask.
    pub(crate) le_event_mask: u64,
}

impl SequenceConfig {
    pub const fn new() -> Self {
        Self {
            privacy: cfg!(feature = "privacy"),
            data_length_extension: cfg!(feature = "data-length-extension"),
            event_mask: event_mask::DEFAULT,
            le_event_mask: le_event_mask::DEFAULT,
        }
    }

    /// Enable or disable the LL Privacy branch.
    pub const fn privacy(mut self, enable: bool) -> Self {
        self.privacy = enable;
        self
    }

    /// Enable or disable the data length extension branch.
    pub const fn data_length_extension(mut self, enable: bool) -> Self {
        self.data_length_extension = enable;
        self
    }

    /// Override the event mask sent during bring-up.
    pub const fn event_mask(mut self, mask: u64) -> Self {
        self.event_mask = mask;
        self
    }

    /// Override the LE event mask sent during bring-up.
    pub const fn le_event_mask(mut self, mask: u64) -> Self {
        self.le_event_mask = mask;
        self
    }
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self::new()
    }
}
