//! The SD card protocol, spoken over SPI.
//!
//! Implements the SPI-mode subset of the SD protocol on top of an
//! [`SdTransport`]: card identification and voltage negotiation, capacity
//! detection, and single or multiple block transfers with CRC checking.
//!
//! This is currently optimised for readability and debugability, not
//! performance.

pub mod crc;
pub mod proto;
pub mod transport;

mod acquire;
mod blocks;
mod transaction;

pub use transport::{FixedClock, SdTransport, SpiBusTransport, SpiBusTransportError, TickSource};

use crate::blockdevice::{Block, BlockCount, BlockDevice, BlockIdx};
use crate::debug;

// ****************************************************************************
// Constants
// ****************************************************************************

/// Status byte for "no valid response" and other structural violations.
pub const STATUS_INVALID: u8 = 0xFF;

/// Status byte for a block request outside the card. Bit 7 is set, so it
/// can never be mistaken for an R1 the card sent.
pub const STATUS_OUT_OF_RANGE: u8 = 0xC0;

// ****************************************************************************
// Types and Implementations
// ****************************************************************************

/// Driver for an SD Card on an SPI bus.
///
/// Built from an [`SdTransport`], which must already be configured for SPI
/// mode 0, and a [`TickSource`]. Both can be passed by reference (`&mut`
/// and `&` respectively) if you want them back without calling
/// [`SdCard::free`].
///
/// Call [`SdCard::init`] once before anything else. All the APIs take
/// `&mut self`; there is no internal locking, so share it yourself if you
/// must.
pub struct SdCard<T, C>
where
    T: SdTransport,
    C: TickSource,
{
    transport: T,
    ticks: C,
    card_type: Option<CardType>,
    blocks: u32,
    options: AcquireOpts,
}

impl<T, C> SdCard<T, C>
where
    T: SdTransport,
    C: TickSource,
{
    /// Create a new SD Card driver.
    ///
    /// The card is not touched until [`SdCard::init`] is called.
    ///
    /// Uses the default options.
    pub fn new(transport: T, ticks: C) -> SdCard<T, C> {
        Self::new_with_options(transport, ticks, AcquireOpts::default())
    }

    /// Create a new SD Card driver with the given options.
    pub fn new_with_options(transport: T, ticks: C, options: AcquireOpts) -> SdCard<T, C> {
        SdCard {
            transport,
            ticks,
            card_type: None,
            blocks: 0,
            options,
        }
    }

    /// Get a temporary borrow on the underlying transport.
    ///
    /// The given closure will be called exactly once, and will be passed a
    /// mutable reference to the transport.
    pub fn transport<R, F>(&mut self, func: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        func(&mut self.transport)
    }

    /// Give back the transport and the tick source.
    pub fn free(self) -> (T, C) {
        (self.transport, self.ticks)
    }

    /// Has [`SdCard::init`] completed successfully?
    pub fn is_initialised(&self) -> bool {
        self.card_type.is_some()
    }

    /// The card type found by the last successful [`SdCard::init`].
    pub fn card_type(&self) -> Option<CardType> {
        self.card_type
    }

    /// The number of 512-byte blocks on the card.
    ///
    /// Zero means unknown: either the card is not initialised, or it is a
    /// version 1 card, whose capacity is not read during initialisation.
    pub fn blocks(&self) -> u32 {
        self.blocks
    }

    /// The usable size of the card in bytes, or zero if unknown.
    pub fn num_bytes(&self) -> u64 {
        u64::from(self.blocks) * u64::from(Block::LEN_U32)
    }

    /// Mark the card as requiring a reset.
    ///
    /// Every block operation fails with [`Error::NotInitialised`] until
    /// [`SdCard::init`] succeeds again.
    pub fn mark_card_uninit(&mut self) {
        self.card_type = None;
        self.blocks = 0;
    }

    /// Tell the driver the card has been initialised.
    ///
    /// This is here in case a previous instance of this object initialised
    /// the card, and you know for certain the card stayed powered and
    /// selected at the operating clock since.
    ///
    /// # Safety
    ///
    /// Only do this if the SD Card has actually been initialised and is of
    /// the indicated type and size. Failure to uphold this will cause data
    /// corruption.
    pub unsafe fn mark_card_as_init(&mut self, card_type: CardType, blocks: u32) {
        self.card_type = Some(card_type);
        self.blocks = blocks;
    }
}

impl<T, C> BlockDevice for SdCard<T, C>
where
    T: SdTransport,
    C: TickSource,
{
    type Error = Error;

    /// Read one or more blocks, starting at the given block index.
    fn read(&mut self, blocks: &mut [Block], start_block_idx: BlockIdx) -> Result<(), Self::Error> {
        self.read_blocks(start_block_idx, blocks)
    }

    /// Write one or more blocks, starting at the given block index.
    fn write(&mut self, blocks: &[Block], start_block_idx: BlockIdx) -> Result<(), Self::Error> {
        self.write_blocks(start_block_idx, blocks)
    }

    /// Determine how many blocks this device can hold.
    ///
    /// Version 1 cards do not have their size read during initialisation,
    /// so for those this asks the card for its CSD register.
    fn num_blocks(&mut self) -> Result<BlockCount, Self::Error> {
        if self.card_type.is_none() {
            return Err(Error::NotInitialised);
        }
        if self.blocks != 0 {
            return Ok(BlockCount(self.blocks));
        }
        let csd = self.read_csd()?;
        debug!("CSD: {:?}", csd);
        Ok(BlockCount(csd.card_capacity_blocks()))
    }
}

/// Options for acquiring the card.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Clone)]
pub struct AcquireOpts {
    /// Bus clock during identification, in Hz. Must be 400 kHz or less.
    pub identification_hz: u32,

    /// Bus clock once the card is ready, in Hz.
    pub operating_hz: u32,

    /// How many `0xFF` bytes to clock with chip-select high at power-on.
    /// The card needs at least 74 clocks, and ten bytes gives 80.
    pub power_on_clock_bytes: usize,

    /// How many times to send ACMD41 while the card reports it is still
    /// idle, before giving up with [`Error::OperationCondTimeout`].
    pub op_cond_retries: u32,

    /// How long to wait for the start token of each data block, in ms.
    ///
    /// See `Part1_Physical_Layer_Simplified_Specification_Ver9.00-1.pdf` Section 4.6.2.1
    pub read_token_timeout_ms: u32,

    /// How long the card may stay busy after a block is written, in ms.
    ///
    /// See `Part1_Physical_Layer_Simplified_Specification_Ver9.00-1.pdf` Section 4.6.2.2
    pub write_busy_timeout_ms: u32,
}

impl Default for AcquireOpts {
    fn default() -> Self {
        AcquireOpts {
            identification_hz: 100_000,
            operating_hz: 25_000_000,
            power_on_clock_bytes: 10,
            op_cond_retries: 1000,
            read_token_timeout_ms: 100,
            write_busy_timeout_ms: 500,
        }
    }
}

/// The possible errors this crate can generate.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// We got an error from the SPI transport
    Transport,
    /// The tick source isn't running, so no timeout could ever expire
    TickSourceStopped,
    /// The card never cleared the busy bit within N_CR. Holds the last byte
    /// seen, which still has bit 7 set.
    NoResponse {
        /// The command we sent
        command: u8,
        /// The last byte the card sent back
        last: u8,
    },
    /// The card answered a command with an R1 we did not want
    Rejected {
        /// The command we sent
        command: u8,
        /// The R1 the card sent back
        r1: u8,
    },
    /// SEND_IF_COND came back without our check pattern or voltage
    InterfaceMismatch,
    /// The card can't run across the 2.7-3.6V range we supply
    VoltageRejected,
    /// The card finished initialising but says it hasn't powered up
    NotPoweredUp,
    /// The card stayed idle through every ACMD41 we were allowed to send
    OperationCondTimeout,
    /// A data block never started. Holds the last byte seen.
    MissingStartToken(u8),
    /// The card sent a data error token instead of a data block
    ReadErrorToken(u8),
    /// We got a CRC mismatch (card gave us, we calculated)
    CrcMismatch {
        /// The CRC the card sent
        received: u16,
        /// The CRC of the data we got
        calculated: u16,
    },
    /// A data response token after a write was not framed correctly
    MalformedDataResponse(u8),
    /// The card refused a block we wrote (CRC or write error)
    WriteRejected(u8),
    /// The card stayed busy for too long after a write
    TimeoutWaitNotBusy,
    /// The request runs past the end of the card
    OutOfRange,
    /// The card has not been (successfully) initialised
    NotInitialised,
}

impl Error {
    /// The one-byte status code for this error.
    ///
    /// Card rejections give back the raw R1, timeouts give back the last
    /// byte seen, range errors give [`STATUS_OUT_OF_RANGE`] and everything
    /// else gives [`STATUS_INVALID`]. The result is never zero, because
    /// zero means success.
    pub fn status(&self) -> u8 {
        let status = match *self {
            Error::NoResponse { last, .. } => last,
            Error::Rejected { r1, .. } => r1,
            Error::MissingStartToken(token) | Error::ReadErrorToken(token) => token,
            Error::OperationCondTimeout => proto::R1_IDLE_STATE,
            Error::OutOfRange | Error::NotInitialised => STATUS_OUT_OF_RANGE,
            Error::Transport
            | Error::TickSourceStopped
            | Error::InterfaceMismatch
            | Error::VoltageRejected
            | Error::NotPoweredUp
            | Error::CrcMismatch { .. }
            | Error::MalformedDataResponse(_)
            | Error::WriteRejected(_)
            | Error::TimeoutWaitNotBusy => STATUS_INVALID,
        };
        if status == 0 {
            STATUS_INVALID
        } else {
            status
        }
    }
}

/// The different types of card we support.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CardType {
    /// An standard-capacity SD Card supporting v1.x of the standard.
    ///
    /// Uses byte-addressing internally, so limited to 2GiB in size.
    SD1,
    /// An standard-capacity SD Card supporting v2.x of the standard.
    ///
    /// Uses byte-addressing internally, so limited to 2GiB in size.
    SD2,
    /// An high-capacity 'SDHC' Card.
    ///
    /// Uses block-addressing internally to support capacities above 2GiB.
    SDHC,
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
