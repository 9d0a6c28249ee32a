//! The collaborators the driver talks through: an SPI transport with manual
//! chip-select control, and a millisecond tick source.

use embedded_hal::{digital::OutputPin, spi::SpiBus};

/// An SPI link to an SD card where the caller decides when chip-select is
/// released.
///
/// The `_continue` methods leave chip-select asserted when they return, so
/// one command exchange can be split across several calls. The plain
/// methods release chip-select once the transfer is done.
pub trait SdTransport {
    /// The errors the transport can return. Must be debug formattable.
    type Error: core::fmt::Debug;

    /// Send bytes with chip-select asserted, and keep it asserted.
    fn write_continue(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Fill the buffer with chip-select asserted, and keep it asserted.
    fn read_continue(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error>;

    /// Send bytes, then deassert chip-select.
    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Fill the buffer, then deassert chip-select.
    fn read(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error>;

    /// Force the data-out line to a fixed level while reading.
    ///
    /// SD cards sample MOSI even while they are the ones talking, and some
    /// misbehave if it floats low.
    fn hold_mosi(&mut self, high: bool) -> Result<(), Self::Error>;

    /// Stop forcing the data-out line.
    fn release_mosi(&mut self) -> Result<(), Self::Error>;

    /// Change the bus clock, in Hz.
    fn set_clock(&mut self, hz: u32) -> Result<(), Self::Error>;

    /// Clock out `n_bytes` bytes of `0xFF` with chip-select deasserted.
    fn toggle(&mut self, n_bytes: usize) -> Result<(), Self::Error>;
}

impl<T> SdTransport for &mut T
where
    T: SdTransport + ?Sized,
{
    type Error = T::Error;

    fn write_continue(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        T::write_continue(self, bytes)
    }

    fn read_continue(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error> {
        T::read_continue(self, buffer)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        T::write(self, bytes)
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error> {
        T::read(self, buffer)
    }

    fn hold_mosi(&mut self, high: bool) -> Result<(), Self::Error> {
        T::hold_mosi(self, high)
    }

    fn release_mosi(&mut self) -> Result<(), Self::Error> {
        T::release_mosi(self)
    }

    fn set_clock(&mut self, hz: u32) -> Result<(), Self::Error> {
        T::set_clock(self, hz)
    }

    fn toggle(&mut self, n_bytes: usize) -> Result<(), Self::Error> {
        T::toggle(self, n_bytes)
    }
}

/// A monotonic millisecond counter.
pub trait TickSource {
    /// Milliseconds since some fixed point. Allowed to wrap.
    fn now_ms(&self) -> u32;

    /// Is the counter actually advancing? Waiting on a stopped counter
    /// would never time out.
    fn is_running(&self) -> bool {
        true
    }
}

impl<T> TickSource for &T
where
    T: TickSource + ?Sized,
{
    fn now_ms(&self) -> u32 {
        T::now_ms(self)
    }

    fn is_running(&self) -> bool {
        T::is_running(self)
    }
}

/// Errors that can occur when using the [`SpiBusTransport`].
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[non_exhaustive]
pub enum SpiBusTransportError {
    /// An operation on the inner SPI bus failed.
    Spi,
    /// Setting the value of the Chip Select (CS) pin failed.
    Cs,
}

/// The clock hook used by [`SpiBusTransport::new`] when the bus clock is
/// managed elsewhere.
pub type FixedClock<BUS> = fn(&mut BUS, u32);

/// An [`SdTransport`] built from an [`SpiBus`], a chip-select
/// [`OutputPin`], and a closure that re-clocks the bus.
///
/// `embedded-hal` has no trait for changing the SPI clock, so the closure
/// gets the bus and the requested rate in Hz and does whatever the HAL
/// needs.
pub struct SpiBusTransport<BUS, CS, F = FixedClock<BUS>> {
    bus: BUS,
    cs: CS,
    set_clock: F,
    fill: u8,
}

impl<BUS, CS> SpiBusTransport<BUS, CS, FixedClock<BUS>>
where
    BUS: SpiBus,
    CS: OutputPin,
{
    /// Create a transport that never changes the bus clock.
    ///
    /// Configure the bus for 400 kHz or less before handing it over.
    pub fn new(bus: BUS, cs: CS) -> Self {
        fn ignore<BUS>(_bus: &mut BUS, _hz: u32) {}
        Self::with_clock_control(bus, cs, ignore::<BUS>)
    }
}

impl<BUS, CS, F> SpiBusTransport<BUS, CS, F>
where
    BUS: SpiBus,
    CS: OutputPin,
    F: FnMut(&mut BUS, u32),
{
    /// Create a transport that calls `set_clock` when the driver changes
    /// the bus rate.
    pub fn with_clock_control(bus: BUS, cs: CS, set_clock: F) -> Self {
        SpiBusTransport {
            bus,
            cs,
            set_clock,
            fill: 0xFF,
        }
    }

    /// Get the bus and chip-select pin back.
    pub fn free(self) -> (BUS, CS) {
        (self.bus, self.cs)
    }

    fn select(&mut self) -> Result<(), SpiBusTransportError> {
        self.cs.set_low().map_err(|_| SpiBusTransportError::Cs)
    }

    /// Flush and release chip-select, even if the transfer failed.
    fn finish(
        &mut self,
        op_res: Result<(), BUS::Error>,
        release: bool,
    ) -> Result<(), SpiBusTransportError> {
        let flush_res = self.bus.flush();
        let cs_res = if release {
            self.cs.set_high()
        } else {
            Ok(())
        };
        op_res.map_err(|_| SpiBusTransportError::Spi)?;
        flush_res.map_err(|_| SpiBusTransportError::Spi)?;
        cs_res.map_err(|_| SpiBusTransportError::Cs)?;
        Ok(())
    }

    fn do_read(&mut self, buffer: &mut [u8], release: bool) -> Result<(), SpiBusTransportError> {
        self.select()?;
        buffer.fill(self.fill);
        let op_res = self.bus.transfer_in_place(buffer);
        self.finish(op_res, release)
    }

    fn do_write(&mut self, bytes: &[u8], release: bool) -> Result<(), SpiBusTransportError> {
        self.select()?;
        let op_res = self.bus.write(bytes);
        self.finish(op_res, release)
    }
}

impl<BUS, CS, F> SdTransport for SpiBusTransport<BUS, CS, F>
where
    BUS: SpiBus,
    CS: OutputPin,
    F: FnMut(&mut BUS, u32),
{
    type Error = SpiBusTransportError;

    fn write_continue(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.do_write(bytes, false)
    }

    fn read_continue(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.do_read(buffer, false)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.do_write(bytes, true)
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.do_read(buffer, true)
    }

    fn hold_mosi(&mut self, high: bool) -> Result<(), Self::Error> {
        // A full-duplex bus drives MOSI with whatever we clock out.
        self.fill = if high { 0xFF } else { 0x00 };
        Ok(())
    }

    fn release_mosi(&mut self) -> Result<(), Self::Error> {
        self.fill = 0xFF;
        Ok(())
    }

    fn set_clock(&mut self, hz: u32) -> Result<(), Self::Error> {
        self.bus.flush().map_err(|_| SpiBusTransportError::Spi)?;
        (self.set_clock)(&mut self.bus, hz);
        Ok(())
    }

    fn toggle(&mut self, n_bytes: usize) -> Result<(), Self::Error> {
        self.cs.set_high().map_err(|_| SpiBusTransportError::Cs)?;
        let ones = [0xFFu8; 16];
        let mut remaining = n_bytes;
        let mut send_res = Ok(());
        while remaining > 0 && send_res.is_ok() {
            let chunk = remaining.min(ones.len());
            send_res = self.bus.write(&ones[..chunk]);
            remaining -= chunk;
        }
        // On failure, it's important to still flush.
        let flush_res = self.bus.flush();
        send_res.map_err(|_| SpiBusTransportError::Spi)?;
        flush_res.map_err(|_| SpiBusTransportError::Spi)?;
        Ok(())
    }
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
