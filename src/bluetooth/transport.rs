//! Bit-banged SPI HCI transport.
//!
//! The EM9301 hangs off four GPIO-driven signals (clock, data out, data in,
//! chip select) plus a data-ready line, with no hardware SPI engine behind
//! them: every byte is shifted by toggling the clock pin in software, MSB
//! first, sampling data-in on each rising edge.
//!
//! Outbound frames are paced entirely by the controller. Before each serial
//! unit the data-in line must read high (the readiness gate), and the byte
//! shifted back during the unit is a status echo: anything other than `0xFF`
//! means the controller rejected the byte and it must be sent again. Inbound
//! traffic is signalled on the data-ready line; [`SpiTransport::service`]
//! drains it from the rising-edge interrupt handler, clocking out zeroes and
//! handing every received byte upward one at a time.
//!
//! The data-ready interrupt is masked for the whole duration of an outbound
//! write. That is the only synchronization in the driver: it guarantees at
//! most one transaction owns the shared lines at any time.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use super::cmd::{self, CommandSink, Opcode};
use super::config::TransportConfig;
use super::error::TransportError;

/// Settle time after driving data-out or chip-select, in ns.
const SETTLE_NS: u32 = 100;
/// Data-out setup time before the clock rising edge, in ns.
const BIT_SETUP_NS: u32 = 100;
/// Delay between the rising edge and the data-in sample, in ns.
const SAMPLE_DELAY_NS: u32 = 1;
/// Hold time after sampling, before the next bit, in ns.
const BIT_HOLD_NS: u32 = 100;

/// Status echo value meaning the controller accepted the byte.
const ACCEPTED: u8 = 0xFF;

/// The controller's data-ready line.
///
/// `embedded-hal` has no trait for an input pin with a maskable interrupt,
/// so the board layer provides one: it must configure the line to interrupt
/// on the rising edge only (no falling-edge handler) and call
/// [`SpiTransport::service`] from that handler. The mask methods gate the
/// interrupt around outbound writes.
pub trait DataReady {
    /// Current level of the line. The controller holds it high for as long
    /// as it has bytes to deliver.
    fn is_asserted(&mut self) -> bool;
    /// Mask the rising-edge interrupt.
    fn disable_interrupt(&mut self);
    /// Unmask the rising-edge interrupt.
    fn enable_interrupt(&mut self);
}

/// Software SPI link to the EM9301.
pub struct SpiTransport<SCK, MOSI, MISO, CS, IRQ, D> {
    sck: SCK,
    mosi: MOSI,
    miso: MISO,
    cs: CS,
    irq: IRQ,
    delay: D,
    config: TransportConfig,
}

impl<SCK, MOSI, MISO, CS, IRQ, D> SpiTransport<SCK, MOSI, MISO, CS, IRQ, D>
where
    SCK: OutputPin,
    MOSI: OutputPin,
    MISO: InputPin,
    CS: OutputPin,
    IRQ: DataReady,
    D: DelayNs,
{
    /// Take ownership of the link pins and drive them to their idle levels
    /// (data-out high, clock low, chip-select low), then unmask the
    /// data-ready interrupt.
    pub fn new(
        mut sck: SCK,
        mut mosi: MOSI,
        miso: MISO,
        mut cs: CS,
        mut irq: IRQ,
        delay: D,
        config: TransportConfig,
    ) -> Self {
        let _ = mosi.set_high();
        let _ = sck.set_low();
        let _ = cs.set_low();
        irq.enable_interrupt();
        Self {
            sck,
            mosi,
            miso,
            cs,
            irq,
            delay,
            config,
        }
    }

    /// Send one HCI frame: the packet indicator followed by the payload.
    ///
    /// The data-ready interrupt is masked and chip-select released again on
    /// every exit path. Returns the payload length on success.
    pub fn write(&mut self, kind: u8, payload: &[u8]) -> Result<u16, TransportError> {
        self.irq.disable_interrupt();
        let result = self.write_frame(kind, payload);
        let _ = self.cs.set_high();
        self.irq.enable_interrupt();
        result?;
        Ok(payload.len() as u16)
    }

    fn write_frame(&mut self, kind: u8, payload: &[u8]) -> Result<(), TransportError> {
        let _ = self.mosi.set_high();
        self.delay.delay_ns(SETTLE_NS);
        let _ = self.cs.set_low();
        self.delay.delay_ns(SETTLE_NS);

        let mut index = 0;
        let mut attempts: u32 = 0;
        while index < payload.len() + 1 {
            self.wait_peer_ready()?;
            let unit = if index == 0 { kind } else { payload[index - 1] };
            let status = self.exchange_byte(unit);
            if status == ACCEPTED {
                index += 1;
                attempts = 0;
            } else {
                attempts += 1;
                if attempts >= self.config.max_accept_retries {
                    warn!(
                        "tx unit {} never accepted, last status 0x{:02X}",
                        index, status
                    );
                    return Err(TransportError::AcceptTimeout);
                }
            }
        }
        Ok(())
    }

    /// Drain the controller while its data-ready line is held high.
    ///
    /// Call from the data-ready rising-edge interrupt handler. Every
    /// received byte is handed to `on_byte` immediately; returns the number
    /// of bytes delivered. The burst is capped by
    /// [`TransportConfig::max_burst_bytes`] so a stuck line cannot pin the
    /// handler forever.
    pub fn service<F: FnMut(u8)>(&mut self, mut on_byte: F) -> usize {
        let _ = self.mosi.set_low();
        self.delay.delay_ns(SETTLE_NS);
        let _ = self.cs.set_low();
        self.delay.delay_ns(SETTLE_NS);

        let mut count = 0;
        while self.irq.is_asserted() {
            if count >= self.config.max_burst_bytes {
                warn!("data-ready still high after {} bytes, releasing chip select", count);
                break;
            }
            let byte = self.exchange_byte(0);
            on_byte(byte);
            count += 1;
        }

        let _ = self.cs.set_high();
        count
    }

    /// Shift one byte out and one byte in, MSB first, clock idling low.
    fn exchange_byte(&mut self, out: u8) -> u8 {
        let mut incoming = 0u8;
        for bit in (0..8).rev() {
            let _ = self.sck.set_low();
            if (out >> bit) & 1 == 1 {
                let _ = self.mosi.set_high();
            } else {
                let _ = self.mosi.set_low();
            }
            self.delay.delay_ns(BIT_SETUP_NS);

            let _ = self.sck.set_high();
            self.delay.delay_ns(SAMPLE_DELAY_NS);
            if self.miso.is_high().unwrap_or(false) {
                incoming |= 1 << bit;
            }
            self.delay.delay_ns(BIT_HOLD_NS);
        }
        let _ = self.sck.set_low();
        incoming
    }

    /// Poll the readiness gate: the controller raises data-in when it can
    /// accept the next serial unit.
    fn wait_peer_ready(&mut self) -> Result<(), TransportError> {
        let mut polls: u32 = 0;
        while !self.miso.is_high().unwrap_or(false) {
            polls += 1;
            if polls >= self.config.max_ready_polls {
                return Err(TransportError::ReadyTimeout);
            }
        }
        Ok(())
    }
}

impl<SCK, MOSI, MISO, CS, IRQ, D> CommandSink for SpiTransport<SCK, MOSI, MISO, CS, IRQ, D>
where
    SCK: OutputPin,
    MOSI: OutputPin,
    MISO: InputPin,
    CS: OutputPin,
    IRQ: DataReady,
    D: DelayNs,
{
    fn send_command(&mut self, opcode: Opcode, params: &[u8]) -> Result<(), TransportError> {
        debug!("tx cmd(0x{:04X}) {} param bytes", opcode.0, params.len());
        let mut buf = [0u8; cmd::MAX_COMMAND_LEN];
        let frame = cmd::frame_command(&mut buf, opcode, params);
        self.write(cmd::packet_kind::COMMAND, frame)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::convert::Infallible;
    use std::rc::Rc;

    /// Shared wire state for the pin mocks.
    ///
    /// The controller side is scripted: `rx_bits` are presented on data-in
    /// one per clock rising edge, and `ready` is the level data-in shows
    /// while the clock is idle (the readiness gate). Data-out is captured at
    /// every rising edge, which is when the real controller samples it.
    struct Wire {
        sck: bool,
        mosi: bool,
        cs: bool,
        ready: bool,
        miso: bool,
        rx_bits: VecDeque<bool>,
        tx_bits: Vec<bool>,
        cs_edges: Vec<(bool, usize)>,
        irq_disables: usize,
        irq_enabled: bool,
    }

    impl Wire {
        fn new(ready: bool) -> Rc<RefCell<Wire>> {
            Rc::new(RefCell::new(Wire {
                sck: false,
                mosi: true,
                cs: true,
                ready,
                miso: ready,
                rx_bits: VecDeque::new(),
                tx_bits: Vec::new(),
                cs_edges: Vec::new(),
                irq_disables: 0,
                irq_enabled: false,
            }))
        }

        fn script_byte(&mut self, byte: u8) {
            for bit in (0..8).rev() {
                self.rx_bits.push_back((byte >> bit) & 1 == 1);
            }
        }

        fn on_sck_rising(&mut self) {
            self.tx_bits.push(self.mosi);
            self.miso = self.rx_bits.pop_front().unwrap_or(self.ready);
        }

        fn tx_bytes(&self) -> Vec<u8> {
            self.tx_bits
                .chunks(8)
                .map(|bits| {
                    bits.iter()
                        .fold(0u8, |byte, &bit| (byte << 1) | bit as u8)
                })
                .collect()
        }
    }

    struct SckPin(Rc<RefCell<Wire>>);
    struct MosiPin(Rc<RefCell<Wire>>);
    struct MisoPin(Rc<RefCell<Wire>>);
    struct CsPin(Rc<RefCell<Wire>>);
    struct IrqLine(Rc<RefCell<Wire>>);
    struct NoDelay;

    impl embedded_hal::digital::ErrorType for SckPin {
        type Error = Infallible;
    }

    impl OutputPin for SckPin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.borrow_mut().sck = false;
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Infallible> {
            let mut w = self.0.borrow_mut();
            if !w.sck {
                w.sck = true;
                w.on_sck_rising();
            }
            Ok(())
        }
    }

    impl embedded_hal::digital::ErrorType for MosiPin {
        type Error = Infallible;
    }

    impl OutputPin for MosiPin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.borrow_mut().mosi = false;
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.borrow_mut().mosi = true;
            Ok(())
        }
    }

    impl embedded_hal::digital::ErrorType for MisoPin {
        type Error = Infallible;
    }

    impl InputPin for MisoPin {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            let w = self.0.borrow();
            // Mid-transfer the scripted bit is visible; between transfers
            // the line shows the readiness level.
            Ok(if w.sck { w.miso } else { w.ready })
        }
        fn is_low(&mut self) -> Result<bool, Infallible> {
            self.is_high().map(|level| !level)
        }
    }

    impl embedded_hal::digital::ErrorType for CsPin {
        type Error = Infallible;
    }

    impl OutputPin for CsPin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            let mut w = self.0.borrow_mut();
            if w.cs {
                w.cs = false;
                let at = w.tx_bits.len();
                w.cs_edges.push((false, at));
            }
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Infallible> {
            let mut w = self.0.borrow_mut();
            if !w.cs {
                w.cs = true;
                let at = w.tx_bits.len();
                w.cs_edges.push((true, at));
            }
            Ok(())
        }
    }

    impl DataReady for IrqLine {
        fn is_asserted(&mut self) -> bool {
            !self.0.borrow().rx_bits.is_empty()
        }
        fn disable_interrupt(&mut self) {
            let mut w = self.0.borrow_mut();
            w.irq_enabled = false;
            w.irq_disables += 1;
        }
        fn enable_interrupt(&mut self) {
            self.0.borrow_mut().irq_enabled = true;
        }
    }

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    type TestTransport = SpiTransport<SckPin, MosiPin, MisoPin, CsPin, IrqLine, NoDelay>;

    fn transport(wire: &Rc<RefCell<Wire>>, config: TransportConfig) -> TestTransport {
        SpiTransport::new(
            SckPin(wire.clone()),
            MosiPin(wire.clone()),
            MisoPin(wire.clone()),
            CsPin(wire.clone()),
            IrqLine(wire.clone()),
            NoDelay,
            config,
        )
    }

    #[test]
    fn write_sends_indicator_then_payload_msb_first() {
        let wire = Wire::new(true);
        let mut t = transport(&wire, TransportConfig::default());

        assert_eq!(t.write(0x01, &[0xA5, 0x3C]), Ok(2));

        let w = wire.borrow();
        assert_eq!(w.tx_bytes(), vec![0x01, 0xA5, 0x3C]);
        // Interrupt masked once for the call, restored afterwards.
        assert_eq!(w.irq_disables, 1);
        assert!(w.irq_enabled);
        // Chip select released after the last bit.
        assert_eq!(w.cs_edges.last(), Some(&(true, 24)));
        assert!(!w.sck);
    }

    #[test]
    fn empty_payload_is_exactly_one_unit() {
        let wire = Wire::new(true);
        let mut t = transport(&wire, TransportConfig::default());

        assert_eq!(t.write(0x01, &[]), Ok(0));

        let w = wire.borrow();
        assert_eq!(w.tx_bits.len(), 8);
        assert_eq!(w.tx_bytes(), vec![0x01]);
        // Chip select covered exactly that one transfer.
        assert_eq!(w.cs_edges.last(), Some(&(true, 8)));
    }

    #[test]
    fn identical_frames_produce_identical_bit_sequences() {
        let wire = Wire::new(true);
        let mut t = transport(&wire, TransportConfig::default());

        t.write(0x01, &[0x0F, 0xF0]).unwrap();
        t.write(0x01, &[0x0F, 0xF0]).unwrap();

        let w = wire.borrow();
        let (first, second) = w.tx_bits.split_at(w.tx_bits.len() / 2);
        assert_eq!(first, second);
    }

    #[test]
    fn rejected_byte_is_retransmitted() {
        let wire = Wire::new(true);
        // First status echo reads 0x00: the controller rejects the unit.
        wire.borrow_mut().script_byte(0x00);
        let mut t = transport(&wire, TransportConfig::default());

        assert_eq!(t.write(0x01, &[]), Ok(0));
        assert_eq!(wire.borrow().tx_bytes(), vec![0x01, 0x01]);
    }

    #[test]
    fn persistent_rejection_times_out() {
        let wire = Wire::new(true);
        {
            let mut w = wire.borrow_mut();
            w.script_byte(0x00);
            w.script_byte(0x00);
        }
        let config = TransportConfig::default().max_accept_retries(2);
        let mut t = transport(&wire, config);

        assert_eq!(t.write(0x01, &[]), Err(TransportError::AcceptTimeout));

        let w = wire.borrow();
        // Cleanup ran on the error path.
        assert!(w.cs);
        assert!(w.irq_enabled);
    }

    #[test]
    fn missing_readiness_gate_times_out() {
        let wire = Wire::new(false);
        let config = TransportConfig::default().max_ready_polls(16);
        let mut t = transport(&wire, config);

        assert_eq!(t.write(0x01, &[0xAA]), Err(TransportError::ReadyTimeout));
        let w = wire.borrow();
        assert!(w.tx_bits.is_empty());
        assert!(w.cs);
        assert!(w.irq_enabled);
    }

    #[test]
    fn service_delivers_bytes_in_order_and_clocks_out_zeroes() {
        let wire = Wire::new(true);
        {
            let mut w = wire.borrow_mut();
            w.script_byte(0x0E);
            w.script_byte(0x04);
            w.script_byte(0x01);
        }
        let mut t = transport(&wire, TransportConfig::default());

        let mut received = Vec::new();
        let count = t.service(|byte| received.push(byte));

        assert_eq!(count, 3);
        assert_eq!(received, vec![0x0E, 0x04, 0x01]);

        let w = wire.borrow();
        // All-zero outbound filler during the burst, data-out left low.
        assert_eq!(w.tx_bytes(), vec![0x00, 0x00, 0x00]);
        assert!(!w.mosi);
        // Chip select released when the line dropped.
        assert!(w.cs);
    }

    #[test]
    fn service_bounds_a_stuck_data_ready_line() {
        let wire = Wire::new(true);
        {
            let mut w = wire.borrow_mut();
            for _ in 0..4 {
                w.script_byte(0x55);
            }
        }
        let config = TransportConfig::default().max_burst_bytes(2);
        let mut t = transport(&wire, config);

        let count = t.service(|_| {});

        assert_eq!(count, 2);
        assert!(wire.borrow().cs);
    }

    #[test]
    fn send_command_frames_the_packet() {
        let wire = Wire::new(true);
        let mut t = transport(&wire, TransportConfig::default());

        t.send_command(cmd::opcode::RESET, &[]).unwrap();

        // H4 command indicator, opcode LE, zero parameter length.
        assert_eq!(wire.borrow().tx_bytes(), vec![0x01, 0x03, 0x0C, 0x00]);
    }
}
