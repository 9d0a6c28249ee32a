//! Reading and writing 512-byte data blocks.

use super::crc::crc16;
use super::proto::*;
use super::{CardType, Error, SdCard, SdTransport, TickSource};
use crate::blockdevice::{Block, BlockIdx};
use crate::{debug, warn};

impl<T, C> SdCard<T, C>
where
    T: SdTransport,
    C: TickSource,
{
    /// Read one or more blocks, starting at the given block index.
    ///
    /// Uses READ_SINGLE_BLOCK for one block and READ_MULTIPLE_BLOCK followed
    /// by STOP_TRANSMISSION for more. Every block has its CRC checked. The
    /// request is range checked before anything is sent to the card.
    ///
    /// On error the contents of `blocks` are unspecified.
    pub fn read_blocks(
        &mut self,
        start_block_idx: BlockIdx,
        blocks: &mut [Block],
    ) -> Result<(), Error> {
        if blocks.is_empty() {
            return Ok(());
        }
        let address = self.data_address(start_block_idx, blocks.len())?;
        debug!("Read {} blocks @ {}", blocks.len(), start_block_idx.0);

        let command = if blocks.len() == 1 { CMD17 } else { CMD18 };
        let result = self.read_exchange(command, address, blocks);
        if result.is_ok() && command == CMD18 {
            // STOP_TRANSMISSION ends the transaction itself
            return match self.send_command(CMD12, 0)? {
                R1_READY_STATE => Ok(()),
                r1 => Err(Error::Rejected { command: CMD12, r1 }),
            };
        }
        let end = self.end_transaction();
        result?;
        end
    }

    fn read_exchange(
        &mut self,
        command: u8,
        address: u32,
        blocks: &mut [Block],
    ) -> Result<(), Error> {
        self.begin_transaction(command, address)?;
        let r1 = self.get_r1(command)?;
        if r1 != R1_READY_STATE {
            return Err(Error::Rejected { command, r1 });
        }
        for block in blocks.iter_mut() {
            self.read_data(&mut block.contents)?;
        }
        Ok(())
    }

    /// Receive one data block: wait for its start token, then take the
    /// payload and check it against the CRC16 that follows.
    fn read_data(&mut self, buffer: &mut [u8]) -> Result<(), Error> {
        let deadline = Deadline::new(&self.ticks, self.options.read_token_timeout_ms);
        loop {
            let token = self.read_byte()?;
            if token == DATA_START_BLOCK {
                break;
            }
            if is_data_error_token(token) {
                warn!("Data error token {:x}", token);
                return Err(Error::ReadErrorToken(token));
            }
            if deadline.expired(&self.ticks) {
                warn!("Timed out waiting for data, last saw {:x}", token);
                return Err(Error::MissingStartToken(token));
            }
        }

        buffer.fill(0xFF);
        self.read_bytes(buffer)?;

        let mut crc_bytes = [0xFF; 2];
        self.read_bytes(&mut crc_bytes)?;
        let received = u16::from_be_bytes(crc_bytes);
        let calculated = crc16(buffer);
        if received != calculated {
            warn!("Block CRC: card sent {:x}, expected {:x}", received, calculated);
            return Err(Error::CrcMismatch {
                received,
                calculated,
            });
        }
        Ok(())
    }

    /// Write one or more blocks, starting at the given block index.
    ///
    /// Uses WRITE_BLOCK for one block and WRITE_MULTIPLE_BLOCK for more,
    /// waiting out the card's busy period after each block.
    pub fn write_blocks(
        &mut self,
        start_block_idx: BlockIdx,
        blocks: &[Block],
    ) -> Result<(), Error> {
        if blocks.is_empty() {
            return Ok(());
        }
        let address = self.data_address(start_block_idx, blocks.len())?;
        debug!("Writing {} blocks @ {}", blocks.len(), start_block_idx.0);

        let result = self.write_exchange(address, blocks);
        let end = self.end_transaction();
        result?;
        end
    }

    fn write_exchange(&mut self, address: u32, blocks: &[Block]) -> Result<(), Error> {
        let multiple = blocks.len() > 1;
        let (command, token) = if multiple {
            (CMD25, WRITE_MULTIPLE_TOKEN)
        } else {
            (CMD24, DATA_START_BLOCK)
        };
        self.begin_transaction(command, address)?;
        let r1 = self.get_r1(command)?;
        if r1 != R1_READY_STATE {
            return Err(Error::Rejected { command, r1 });
        }
        for block in blocks.iter() {
            match self.write_data(token, &block.contents) {
                Err(Error::WriteRejected(status)) if multiple => {
                    self.send_stop_token()?;
                    return Err(Error::WriteRejected(status));
                }
                result => result?,
            }
        }
        if multiple {
            self.send_stop_token()?;
        }
        Ok(())
    }

    /// Send one data block and wait for the card to finish programming it.
    fn write_data(&mut self, token: u8, buffer: &[u8]) -> Result<(), Error> {
        // N_WR
        self.padding(1)?;
        self.write_bytes(&[token])?;
        self.write_bytes(buffer)?;
        self.write_bytes(&crc16(buffer).to_be_bytes())?;

        let status = self.read_byte()?;
        if (status & DATA_RES_FRAME_MASK) != DATA_RES_FRAME {
            return Err(Error::MalformedDataResponse(status));
        }
        if (status & DATA_RES_STATUS_MASK) != DATA_RES_ACCEPTED {
            warn!("Write rejected: {:x}", status);
            return Err(Error::WriteRejected(status));
        }
        self.wait_not_busy()
    }

    /// End a multiple block write.
    fn send_stop_token(&mut self) -> Result<(), Error> {
        self.padding(1)?;
        self.write_bytes(&[STOP_TRAN_TOKEN])?;
        // N_BR
        self.padding(1)?;
        self.wait_not_busy()
    }

    /// Spin until the card stops holding the line low.
    fn wait_not_busy(&mut self) -> Result<(), Error> {
        let deadline = Deadline::new(&self.ticks, self.options.write_busy_timeout_ms);
        loop {
            if self.read_byte()? != BUSY_LEVEL {
                return Ok(());
            }
            if deadline.expired(&self.ticks) {
                warn!("Card still busy after {} ms", self.options.write_busy_timeout_ms);
                return Err(Error::TimeoutWaitNotBusy);
            }
        }
    }

    /// Range check a request and turn its first block into the argument
    /// the card expects.
    fn data_address(&self, start_block_idx: BlockIdx, count: usize) -> Result<u32, Error> {
        let card_type = self.card_type.ok_or(Error::NotInitialised)?;
        // Zero means the capacity was never read, so there is nothing to
        // check against.
        if self.blocks != 0 {
            // Block index `blocks` is already past the end of the card.
            let end = u64::from(start_block_idx.0) + count as u64;
            if end > u64::from(self.blocks) {
                return Err(Error::OutOfRange);
            }
        }
        match card_type {
            CardType::SDHC => Ok(start_block_idx.0),
            CardType::SD1 | CardType::SD2 => {
                u32::try_from(start_block_idx.into_bytes()).map_err(|_e| Error::OutOfRange)
            }
        }
    }
}

/// Is this one of the tokens a card sends in place of a data block when
/// the read failed?
fn is_data_error_token(token: u8) -> bool {
    (token & 0xF0) == 0 && token != 0
}

/// A wall-clock limit on a polling loop.
///
/// Uses wrapping arithmetic, so it survives the tick counter overflowing.
struct Deadline {
    start: u32,
    limit_ms: u32,
}

impl Deadline {
    fn new<C: TickSource>(ticks: &C, limit_ms: u32) -> Deadline {
        Deadline {
            start: ticks.now_ms(),
            limit_ms,
        }
    }

    fn expired<C: TickSource>(&self, ticks: &C) -> bool {
        ticks.now_ms().wrapping_sub(self.start) >= self.limit_ms
    }
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
