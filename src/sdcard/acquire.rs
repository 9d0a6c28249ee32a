//! Bringing a card from power-on to the ready state.

use super::crc::crc16;
use super::proto::*;
use super::{CardType, Error, SdCard, SdTransport, TickSource};
use crate::{debug, trace, warn};

/// Which version of the physical layer the card answered SEND_IF_COND with.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Version {
    /// CMD8 was an illegal command
    V1,
    /// CMD8 echoed our check pattern
    V2,
}

impl<T, C> SdCard<T, C>
where
    T: SdTransport,
    C: TickSource,
{
    /// Initializes the card into a known state (or at least tries to).
    ///
    /// Any previous session state is dropped before the card is touched, so
    /// a failure here leaves the driver uninitialised. On success the bus
    /// has been moved to the operating clock and the card type is returned.
    ///
    /// Version 2 cards also have their capacity read here. Version 1 cards
    /// do not, so [`SdCard::blocks`] stays at zero for them.
    pub fn init(&mut self) -> Result<CardType, Error> {
        debug!("acquiring card with opts: {:?}", self.options);
        if !self.ticks.is_running() {
            return Err(Error::TickSourceStopped);
        }
        self.mark_card_uninit();

        let (card_type, blocks) = self.acquire()?;

        debug!("Card version: {:?}, {} blocks", card_type, blocks);
        self.transport
            .set_clock(self.options.operating_hz)
            .map_err(|_e| Error::Transport)?;
        self.card_type = Some(card_type);
        self.blocks = blocks;
        Ok(card_type)
    }

    fn acquire(&mut self) -> Result<(CardType, u32), Error> {
        trace!("Reset card..");
        self.transport
            .set_clock(self.options.identification_hz)
            .map_err(|_e| Error::Transport)?;
        self.transport
            .toggle(self.options.power_on_clock_bytes)
            .map_err(|_e| Error::Transport)?;

        let r1 = self.send_command(CMD0, 0)?;
        if r1 != R1_IDLE_STATE {
            warn!("GO_IDLE_STATE got response: {:x}", r1);
            return Err(Error::Rejected { command: CMD0, r1 });
        }

        match self.check_interface()? {
            Version::V1 => {
                self.check_voltage()?;
                self.wait_ready()?;
                Ok((CardType::SD1, 0))
            }
            Version::V2 => {
                self.check_voltage()?;
                self.wait_ready()?;
                let card_type = self.check_capacity()?;
                // Some cards get the timing of the first CSD read after
                // power-up wrong.
                match self.read_register(CMD9) {
                    Err(Error::Transport) => return Err(Error::Transport),
                    Err(_e) => {
                        trace!("Discarded first CSD read: {:?}", _e);
                    }
                    Ok(_) => {}
                }
                // Version 2 cards size themselves with the high capacity
                // C_SIZE field whatever the CSD_STRUCTURE bits say.
                let csd = CsdV2 {
                    data: self.read_register(CMD9)?,
                };
                debug!("CSD: {:?}", csd);
                Ok((card_type, csd.card_capacity_blocks()))
            }
        }
    }

    /// Send SEND_IF_COND and work out which branch of the init sequence
    /// the card needs.
    fn check_interface(&mut self) -> Result<Version, Error> {
        let mut r7 = [0xFF; 4];
        let r1 = self.send_command_with_result(CMD8, IF_COND_ARG, &mut r7)?;
        trace!("SEND_IF_COND: {:x} {:?}", r1, r7);
        match r1 {
            r1 if r1 == (R1_ILLEGAL_COMMAND | R1_IDLE_STATE) => Ok(Version::V1),
            R1_IDLE_STATE => {
                let voltage = r7[2] & 0x0F;
                if voltage != IF_COND_VOLTAGE_ACCEPTED || r7[3] != IF_COND_CHECK_PATTERN {
                    warn!("SEND_IF_COND echoed {:?}", r7);
                    return Err(Error::InterfaceMismatch);
                }
                Ok(Version::V2)
            }
            r1 => Err(Error::Rejected { command: CMD8, r1 }),
        }
    }

    /// Check the card can live with the supply voltage, while it is still
    /// idle.
    fn check_voltage(&mut self) -> Result<(), Error> {
        let (r1, ocr) = self.read_ocr()?;
        if r1 != R1_IDLE_STATE {
            return Err(Error::Rejected { command: CMD58, r1 });
        }
        if !ocr.supports_host_voltage() {
            warn!("Card voltage window is {:x}", ocr.voltage_window());
            return Err(Error::VoltageRejected);
        }
        Ok(())
    }

    /// Send ACMD41 until the card leaves the idle state.
    fn wait_ready(&mut self) -> Result<(), Error> {
        for _attempts in 0..self.options.op_cond_retries {
            match self.card_acmd(ACMD41, ACMD41_HCS)? {
                R1_READY_STATE => return Ok(()),
                R1_IDLE_STATE => {}
                r1 => return Err(Error::Rejected { command: ACMD41, r1 }),
            }
        }
        warn!("Card still idle after {} attempts", self.options.op_cond_retries);
        Err(Error::OperationCondTimeout)
    }

    /// Read the OCR again once the card is ready, to learn its capacity
    /// class.
    fn check_capacity(&mut self) -> Result<CardType, Error> {
        let (r1, ocr) = self.read_ocr()?;
        if r1 != R1_READY_STATE {
            return Err(Error::Rejected { command: CMD58, r1 });
        }
        if !ocr.power_up_complete() {
            return Err(Error::NotPoweredUp);
        }
        if ocr.card_capacity_status() {
            Ok(CardType::SDHC)
        } else {
            Ok(CardType::SD2)
        }
    }

    fn read_ocr(&mut self) -> Result<(u8, Ocr), Error> {
        let mut ocr = Ocr::default();
        let r1 = self.send_command_with_result(CMD58, 0, &mut ocr.data)?;
        trace!("OCR: {:?}", ocr);
        Ok((r1, ocr))
    }

    /// Perform an application-specific command.
    ///
    /// The R1 of the APP_CMD prefix tells us nothing the ACMD won't, so it
    /// is not checked.
    fn card_acmd(&mut self, command: u8, arg: u32) -> Result<u8, Error> {
        self.send_command(CMD55, 0)?;
        self.send_command(command, arg)
    }

    /// Read the CSD or CID register and check its CRC.
    fn read_register(&mut self, command: u8) -> Result<[u8; 16], Error> {
        let mut frame = [0xFF; REGISTER_FRAME_LEN];
        let r1 = self.send_command_with_result(command, 0, &mut frame)?;
        if r1 != R1_READY_STATE {
            return Err(Error::Rejected { command, r1 });
        }
        if frame[0] != DATA_START_BLOCK {
            return Err(Error::MissingStartToken(frame[0]));
        }
        let mut data = [0u8; 16];
        data.copy_from_slice(&frame[1..17]);
        let received = u16::from_be_bytes([frame[17], frame[18]]);
        let calculated = crc16(&data);
        if received != calculated {
            warn!(
                "CMD{} register CRC: card sent {:x}, expected {:x}",
                command, received, calculated
            );
            return Err(Error::CrcMismatch {
                received,
                calculated,
            });
        }
        Ok(data)
    }

    /// Read the 'card specific data' block.
    pub fn read_csd(&mut self) -> Result<Csd, Error> {
        self.check_init()?;
        Ok(Csd::from_bytes(self.read_register(CMD9)?))
    }

    /// Read the 'card identification' block.
    pub fn read_cid(&mut self) -> Result<Cid, Error> {
        self.check_init()?;
        Ok(Cid {
            data: self.read_register(CMD10)?,
        })
    }

    /// Can this card erase single blocks?
    pub fn erase_single_block_enabled(&mut self) -> Result<bool, Error> {
        Ok(self.read_csd()?.erase_single_block_enabled())
    }

    /// Check the card is initialised.
    pub(crate) fn check_init(&self) -> Result<(), Error> {
        if self.card_type.is_none() {
            Err(Error::NotInitialised)
        } else {
            Ok(())
        }
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
