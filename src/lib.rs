//! # embedded-sdspi
//!
//! > An SD card block driver written in Embedded Rust
//!
//! This crate drives an SD memory card over its native SPI-mode protocol. It
//! takes the card from power-on through identification and voltage
//! negotiation, works out how many 512-byte blocks the card holds, and then
//! lets you read and write those blocks. It is `#![no_std]`, does not use
//! `alloc`, and is fully blocking.
//!
//! The driver does not own the SPI peripheral in any interesting way. You
//! give it something that implements [`SdTransport`] (an SPI device where
//! you control when chip-select is released) and something that implements
//! [`TickSource`] (a millisecond counter). If you have an
//! [`embedded_hal::spi::SpiBus`] and an [`embedded_hal::digital::OutputPin`]
//! for chip-select, [`SpiBusTransport`] does the job.
//!
//! ## Using the crate
//!
//! ```rust
//! use embedded_sdspi::{Block, BlockIdx, Error, SdCard, SdTransport, TickSource};
//!
//! fn example<S, T>(spi: S, ticks: T) -> Result<(), Error>
//! where
//!     S: SdTransport,
//!     T: TickSource,
//! {
//!     let mut sdcard = SdCard::new(spi, ticks);
//!     let card_type = sdcard.init()?;
//!     println!("Card is {:?} with {} blocks", card_type, sdcard.blocks());
//!     let mut blocks = [Block::new(), Block::new()];
//!     sdcard.read_blocks(BlockIdx(0), &mut blocks)?;
//!     println!("MBR signature: {:02x?}", &blocks[0].contents[510..]);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! * `log`: Enabled by default. Generates log messages using the `log` crate.
//! * `defmt-log`: By turning off the default features and enabling the
//!   `defmt-log` feature you can configure this crate to log messages over defmt
//!   instead.
//!
//! You cannot enable both the `log` feature and the `defmt-log` feature.

#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

#[cfg(test)]
#[macro_use]
extern crate hex_literal;

#[macro_use]
mod structure;

pub mod blockdevice;
pub mod sdcard;

pub use crate::blockdevice::{Block, BlockCount, BlockDevice, BlockIdx};

#[doc(inline)]
pub use crate::sdcard::{
    AcquireOpts, CardType, Error, SdCard, SdTransport, SpiBusTransport, TickSource,
    STATUS_INVALID, STATUS_OUT_OF_RANGE,
};

#[cfg(all(feature = "defmt-log", feature = "log"))]
compile_error!("Cannot enable both log and defmt-log");

#[cfg(feature = "log")]
use log::{debug, trace, warn};

#[cfg(feature = "defmt-log")]
use defmt::{debug, trace, warn};

#[cfg(all(not(feature = "defmt-log"), not(feature = "log")))]
#[macro_export]
/// Like log::debug! but does nothing at all
macro_rules! debug {
    ($($arg:tt)+) => {};
}

#[cfg(all(not(feature = "defmt-log"), not(feature = "log")))]
#[macro_export]
/// Like log::trace! but does nothing at all
macro_rules! trace {
    ($($arg:tt)+) => {};
}

#[cfg(all(not(feature = "defmt-log"), not(feature = "log")))]
#[macro_export]
/// Like log::warn! but does nothing at all
macro_rules! warn {
    ($($arg:tt)+) => {};
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
