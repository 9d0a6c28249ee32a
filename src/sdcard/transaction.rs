//! Command framing and response collection.
//!
//! Every exchange here ends by clocking one byte with chip-select high.
//! That both releases the card and gives it the eight clocks it needs
//! between commands.

use super::crc::crc7;
use super::proto::*;
use super::{Error, SdCard, SdTransport, TickSource};
use crate::trace;

/// Build the six bytes of a command frame.
///
/// `01` + 6-bit index, the argument most significant byte first, and the
/// CRC7 in the top seven bits of the last byte with the stop bit below it.
pub fn command_frame(command: u8, arg: u32) -> [u8; 6] {
    let mut buf = [0u8; 6];
    buf[0] = CMD_PREFIX | (command & 0x3F);
    buf[1..5].copy_from_slice(&arg.to_be_bytes());
    buf[5] = (crc7(&buf[0..5]) << 1) | 1;
    buf
}

impl<T, C> SdCard<T, C>
where
    T: SdTransport,
    C: TickSource,
{
    /// Send one command and return its R1.
    ///
    /// An R1 the card did send comes back as `Ok`, whatever its value; it is
    /// up to the caller to decide what is acceptable. If the card never
    /// answers within N_CR you get [`Error::NoResponse`].
    pub fn send_command(&mut self, command: u8, arg: u32) -> Result<u8, Error> {
        self.send_command_with_result(command, arg, &mut [])
    }

    /// Send one command, return its R1 and fill `response` with whatever
    /// follows it.
    ///
    /// CMD9 and CMD10 wrap their register in a data block, so for those two
    /// `response[0]` gets the start token (or the last byte seen while
    /// looking for it) and the rest of the buffer gets the bytes after it.
    pub fn send_command_with_result(
        &mut self,
        command: u8,
        arg: u32,
        response: &mut [u8],
    ) -> Result<u8, Error> {
        let result = self.command_exchange(command, arg, response);
        let end = self.end_transaction();
        let r1 = result?;
        end?;
        Ok(r1)
    }

    fn command_exchange(
        &mut self,
        command: u8,
        arg: u32,
        response: &mut [u8],
    ) -> Result<u8, Error> {
        self.begin_transaction(command, arg)?;
        let r1 = self.get_r1(command)?;
        if response.is_empty() {
            return Ok(r1);
        }
        if command == CMD9 || command == CMD10 {
            response[0] = self.find_register_token()?;
            if response.len() > 1 {
                self.read_bytes_last(&mut response[1..])?;
            }
        } else {
            self.read_bytes_last(response)?;
        }
        Ok(r1)
    }

    /// Send a command frame and leave chip-select asserted.
    pub(crate) fn begin_transaction(&mut self, command: u8, arg: u32) -> Result<(), Error> {
        let frame = command_frame(command, arg);
        trace!("CMD{} arg=0x{:x}", command, arg);
        self.transport
            .write_continue(&frame)
            .map_err(|_e| Error::Transport)
    }

    /// Clock one byte with chip-select high.
    pub(crate) fn end_transaction(&mut self) -> Result<(), Error> {
        self.transport.toggle(1).map_err(|_e| Error::Transport)
    }

    /// Poll for the R1, for at most N_CR byte slots.
    pub(crate) fn get_r1(&mut self, command: u8) -> Result<u8, Error> {
        // skip stuff byte for stop read
        if command == CMD12 {
            let _stuff = self.read_byte()?;
        }
        let mut last = STATUS_BUSY;
        for _ in 0..N_CR_BYTES {
            last = self.read_byte()?;
            if (last & R1_NOT_READY) == 0 {
                trace!("CMD{} R1=0x{:x}", command, last);
                return Ok(last);
            }
        }
        Err(Error::NoResponse { command, last })
    }

    /// Look for the start token of a CSD or CID block, for at most N_CX
    /// byte slots. Returns the last byte seen either way.
    fn find_register_token(&mut self) -> Result<u8, Error> {
        let mut token = STATUS_BUSY;
        for _ in 0..N_CX_BYTES {
            token = self.read_byte()?;
            if token == DATA_START_BLOCK {
                break;
            }
        }
        Ok(token)
    }

    /// Receive a byte from the card with MOSI held high.
    pub(crate) fn read_byte(&mut self) -> Result<u8, Error> {
        let mut buf = [0xFF];
        self.read_bytes(&mut buf)?;
        Ok(buf[0])
    }

    /// Receive bytes from the card with MOSI held high, keeping chip-select
    /// asserted.
    pub(crate) fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<(), Error> {
        self.with_mosi_high(|t| t.read_continue(buffer))
    }

    /// Receive bytes from the card with MOSI held high, then release
    /// chip-select.
    fn read_bytes_last(&mut self, buffer: &mut [u8]) -> Result<(), Error> {
        self.with_mosi_high(|t| t.read(buffer))
    }

    /// Clock out `count` bytes of nothing, as required between some phases
    /// of a data transfer.
    pub(crate) fn padding(&mut self, count: usize) -> Result<(), Error> {
        for _ in 0..count {
            self.read_byte()?;
        }
        Ok(())
    }

    /// Send bytes with chip-select held asserted.
    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.transport
            .write_continue(bytes)
            .map_err(|_e| Error::Transport)
    }

    /// Run a transport read with MOSI forced high, releasing MOSI even if
    /// the read fails.
    fn with_mosi_high<F>(&mut self, func: F) -> Result<(), Error>
    where
        F: FnOnce(&mut T) -> Result<(), T::Error>,
    {
        self.transport
            .hold_mosi(true)
            .map_err(|_e| Error::Transport)?;
        let op_res = func(&mut self.transport);
        let release_res = self.transport.release_mosi();
        op_res.map_err(|_e| Error::Transport)?;
        release_res.map_err(|_e| Error::Transport)?;
        Ok(())
    }
}

/// What an idle bus reads as.
const STATUS_BUSY: u8 = 0xFF;


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
