//! Transport and bring-up error types.

/// Error returned by the SPI transport.
///
/// Both variants replace unbounded busy-waits of the raw protocol with a
/// detectable failure; the limits live in
/// [`TransportConfig`](super::TransportConfig).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// The controller never raised its ready line for the next outbound byte.
    ReadyTimeout,
    /// The controller kept rejecting an outbound byte (status echo != 0xFF).
    AcceptTimeout,
}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TransportError::ReadyTimeout => write!(f, "peer ready line timeout"),
            TransportError::AcceptTimeout => write!(f, "peer byte accept timeout"),
        }
    }
}

/// Error returned during controller bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BringUpError {
    /// A command could not be delivered to the controller.
    Transport(TransportError),
}

impl core::fmt::Display for BringUpError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BringUpError::Transport(e) => write!(f, "transport error: {}", e),
        }
    }
}

impl From<TransportError> for BringUpError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}
