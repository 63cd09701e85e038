//! EM9301 Bluetooth subsystem.
//!
//! Two halves make up the driver: the bit-banged SPI [`SpiTransport`] that
//! moves HCI packets over the wire, and the [`BringUpSequence`] that walks
//! the controller through its post-reset configuration chain. The host
//! stack's event loop sits between them: it assembles the bytes delivered by
//! [`SpiTransport::service`] into HCI event packets and feeds them back to
//! [`Em9301Driver::on_event`].

pub(crate) mod bringup;
pub mod cmd;
pub(crate) mod config;
pub mod error;
pub mod event;
pub mod transport;

pub use bringup::{BringUpSequence, Capabilities, VendorSequence};
pub use cmd::{CommandSink, Opcode};
pub use config::{SequenceConfig, TransportConfig};
pub use error::{BringUpError, TransportError};
pub use event::{parse_command_complete, CommandComplete};
pub use transport::{DataReady, SpiTransport};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

/// Width of the reset pulse applied to the active-low reset line, in us.
const RESET_PULSE_US: u32 = 100;
/// Conservative time for the controller to boot after reset release, in ms.
const RESET_BOOT_MS: u32 = 5;

/// EM9301 driver: transport, reset line and bring-up sequence in one place.
///
/// Generic over [`CommandSink`] rather than the transport directly so the
/// sequencing logic stays testable; in production `T` is the
/// [`SpiTransport`] for the board's pins.
///
/// # Example
///
/// ```ignore
/// use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
/// use embassy_sync::signal::Signal;
/// use em9301_radio::bluetooth::{
///     BringUpSequence, Capabilities, Em9301Driver, SequenceConfig, SpiTransport, TransportConfig,
/// };
///
/// static READY: Signal<CriticalSectionRawMutex, Capabilities> = Signal::new();
///
/// let transport = SpiTransport::new(sck, mosi, miso, cs, irq, delay, TransportConfig::default());
/// let sequence = BringUpSequence::new(SequenceConfig::default(), &READY);
/// let mut driver = Em9301Driver::new(transport, reset, sequence);
/// driver.start(&mut delay)?;
/// // ... event loop feeds driver.on_event(...); READY.wait() yields the record.
/// ```
pub struct Em9301Driver<'d, T, RST, M>
where
    T: CommandSink,
    RST: OutputPin,
    M: RawMutex,
{
    transport: T,
    reset: RST,
    sequence: BringUpSequence<'d, M>,
}

impl<'d, T, RST, M> Em9301Driver<'d, T, RST, M>
where
    T: CommandSink,
    RST: OutputPin,
    M: RawMutex,
{
    /// Wrap the transport and reset line. The controller is taken out of
    /// reset immediately; the bring-up chain does not run until
    /// [`start`](Self::start).
    pub fn new(transport: T, mut reset: RST, sequence: BringUpSequence<'d, M>) -> Self {
        let _ = reset.set_high();
        Self {
            transport,
            reset,
            sequence,
        }
    }

    /// Pulse the hardware reset line, give the controller time to boot,
    /// then kick off the bring-up sequence with HCI Reset.
    pub fn start(&mut self, delay: &mut impl DelayNs) -> Result<(), BringUpError> {
        debug!("em9301: hardware reset");
        let _ = self.reset.set_low();
        delay.delay_us(RESET_PULSE_US);
        let _ = self.reset.set_high();
        delay.delay_ms(RESET_BOOT_MS);

        self.sequence.start(&mut self.transport)
    }

    /// Route one assembled HCI event packet to the bring-up sequence.
    pub fn on_event(&mut self, packet: &[u8]) -> Result<(), BringUpError> {
        self.sequence.on_event(&mut self.transport, packet)
    }

    /// True once the bring-up sequence has completed.
    pub fn is_ready(&self) -> bool {
        self.sequence.is_complete()
    }

    /// The discovered capability record, available once ready.
    pub fn capabilities(&self) -> Option<&Capabilities> {
        self.sequence.capabilities()
    }

    /// Access the transport, e.g. to service the data-ready interrupt.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
