//! Constants and register layouts from the SD Specifications.
//!
//! Command indices, response bits and data tokens for the SPI-mode subset
//! of the protocol, plus read-only views over the OCR, CSD and CID
//! registers.

use byteorder::{BigEndian, ByteOrder};

use crate::blockdevice::Block;

//==============================================================================

// SD Card Commands

/// GO_IDLE_STATE - init card in spi mode if CS low
pub const CMD0: u8 = 0x00;
/// SEND_IF_COND - verify SD Memory Card interface operating condition.
pub const CMD8: u8 = 0x08;
/// SEND_CSD - read the Card Specific Data (CSD register)
pub const CMD9: u8 = 0x09;
/// SEND_CID - read the Card Identification (CID register)
pub const CMD10: u8 = 0x0A;
/// STOP_TRANSMISSION - end multiple block read sequence
pub const CMD12: u8 = 0x0C;
/// READ_SINGLE_BLOCK - read a single data block from the card
pub const CMD17: u8 = 0x11;
/// READ_MULTIPLE_BLOCK - read a multiple data blocks from the card
pub const CMD18: u8 = 0x12;
/// WRITE_BLOCK - write a single data block to the card
pub const CMD24: u8 = 0x18;
/// WRITE_MULTIPLE_BLOCK - write blocks of data until a STOP_TRANSMISSION
pub const CMD25: u8 = 0x19;
/// APP_CMD - escape for application specific command
pub const CMD55: u8 = 0x37;
/// READ_OCR - read the OCR register of a card
pub const CMD58: u8 = 0x3A;
/// SD_SEND_OP_COMD - Sends host capacity support information and activates
/// the card's initialization process
pub const ACMD41: u8 = 0x29;

/// Start bit (0) and transmission bit (1) that prefix every command index.
pub const CMD_PREFIX: u8 = 0x40;

//==============================================================================

// Command arguments

/// SEND_IF_COND argument: 2.7-3.6V supply, check pattern 0xAA.
pub const IF_COND_ARG: u32 = 0x0000_01AA;
/// The check pattern the card echoes back in its R7 response.
pub const IF_COND_CHECK_PATTERN: u8 = 0xAA;
/// The R7 "voltage accepted" value for 2.7-3.6V.
pub const IF_COND_VOLTAGE_ACCEPTED: u8 = 0x01;
/// ACMD41 argument with the Host Capacity Support bit set.
pub const ACMD41_HCS: u32 = 0x4000_0000;

//==============================================================================

// R1 status bits

/// status for card in the ready state
pub const R1_READY_STATE: u8 = 0x00;
/// status for card in the idle state
pub const R1_IDLE_STATE: u8 = 0x01;
/// status bit for an erase sequence cleared before executing
pub const R1_ERASE_RESET: u8 = 0x02;
/// status bit for illegal command
pub const R1_ILLEGAL_COMMAND: u8 = 0x04;
/// status bit for a command frame that failed its CRC check
pub const R1_COM_CRC_ERROR: u8 = 0x08;
/// status bit for an error in the sequence of erase commands
pub const R1_ERASE_SEQUENCE_ERROR: u8 = 0x10;
/// status bit for a misaligned address
pub const R1_ADDRESS_ERROR: u8 = 0x20;
/// status bit for an argument outside the allowed range
pub const R1_PARAMETER_ERROR: u8 = 0x40;
/// Always clear in a real R1. Set means the card has not answered yet.
pub const R1_NOT_READY: u8 = 0x80;

//==============================================================================

// Data tokens

/// start data token for read or write single block
pub const DATA_START_BLOCK: u8 = 0xFE;
/// stop token for write multiple blocks
pub const STOP_TRAN_TOKEN: u8 = 0xFD;
/// start data token for write multiple blocks
pub const WRITE_MULTIPLE_TOKEN: u8 = 0xFC;
/// mask for the framing bits of a data response token
pub const DATA_RES_FRAME_MASK: u8 = 0x11;
/// framing bits of a well-formed data response token
pub const DATA_RES_FRAME: u8 = 0x01;
/// mask for the status bits of a data response token
pub const DATA_RES_STATUS_MASK: u8 = 0x0E;
/// status bits for write data accepted
pub const DATA_RES_ACCEPTED: u8 = 0x04;
/// the line level a card holds while it is busy programming
pub const BUSY_LEVEL: u8 = 0x00;

//==============================================================================

// Timing

/// N_CR, the maximum number of byte slots between a command and its R1.
///
/// See `Part1_Physical_Layer_Simplified_Specification_Ver3.01` Section 7.5.4
pub const N_CR_BYTES: usize = 8;

/// N_CX, the maximum number of byte slots between the R1 of CMD9/CMD10 and
/// the start of the register data block.
pub const N_CX_BYTES: usize = 8;

/// A CSD or CID register arrives as a start token, 16 bytes and a CRC16.
pub const REGISTER_FRAME_LEN: usize = 1 + 16 + 2;

//==============================================================================

/// Operating Conditions Register, as returned after the R1 of CMD58.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub struct Ocr {
    /// The 4 bytes of the register, most significant first
    pub data: [u8; 4],
}

impl Ocr {
    /// Wrap the four OCR bytes.
    pub fn new(data: [u8; 4]) -> Ocr {
        Ocr { data }
    }

    define_field!(value, u32, 0);
    define_field!(power_up_complete, bool, 0, 7);
    define_field!(card_capacity_status, bool, 0, 6);
    define_field!(voltage_window, u16, [(1, 0, 8), (2, 7, 1)]);

    /// Does the card accept the whole 2.7-3.6V range we supply?
    pub fn supports_host_voltage(&self) -> bool {
        self.voltage_window() == 0x1FF
    }
}

/// Card Specific Data, version 1
#[derive(Default, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub struct CsdV1 {
    /// The 16-bytes of data in this Card Specific Data block
    pub data: [u8; 16],
}

/// Card Specific Data, version 2
#[derive(Default, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub struct CsdV2 {
    /// The 16-bytes of data in this Card Specific Data block
    pub data: [u8; 16],
}

/// Card Specific Data
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum Csd {
    /// A version 1 CSD
    V1(CsdV1),
    /// A version 2 CSD
    V2(CsdV2),
}

impl Csd {
    /// Pick the layout from the CSD_STRUCTURE field in the top two bits.
    pub fn from_bytes(data: [u8; 16]) -> Csd {
        match data[0] >> 6 {
            0 => Csd::V1(CsdV1 { data }),
            _ => Csd::V2(CsdV2 { data }),
        }
    }

    /// Returns the card capacity in 512-byte blocks
    pub fn card_capacity_blocks(&self) -> u32 {
        match self {
            Csd::V1(contents) => contents.card_capacity_blocks(),
            Csd::V2(contents) => contents.card_capacity_blocks(),
        }
    }

    /// Returns the card capacity in bytes
    pub fn card_capacity_bytes(&self) -> u64 {
        match self {
            Csd::V1(contents) => contents.card_capacity_bytes(),
            Csd::V2(contents) => contents.card_capacity_bytes(),
        }
    }

    /// Can this card erase single blocks?
    pub fn erase_single_block_enabled(&self) -> bool {
        match self {
            Csd::V1(contents) => contents.erase_single_block_enabled(),
            Csd::V2(contents) => contents.erase_single_block_enabled(),
        }
    }
}

impl CsdV1 {
    /// Create a new, empty, CSD
    pub fn new() -> CsdV1 {
        CsdV1::default()
    }

    define_field!(csd_ver, u8, 0, 6, 2);
    define_field!(data_read_access_time1, u8, 1, 0, 8);
    define_field!(max_data_transfer_rate, u8, 3, 0, 8);
    define_field!(card_command_classes, u16, [(4, 0, 8), (5, 4, 4)]);
    define_field!(read_block_length, u8, 5, 0, 4);
    define_field!(device_size, u32, [(6, 0, 2), (7, 0, 8), (8, 6, 2)]);
    define_field!(device_size_multiplier, u8, [(9, 0, 2), (10, 7, 1)]);
    define_field!(erase_single_block_enabled, bool, 10, 6);
    define_field!(crc, u8, 15, 0, 8);

    /// Returns the card capacity in bytes
    pub fn card_capacity_bytes(&self) -> u64 {
        let multiplier = self.device_size_multiplier() + self.read_block_length() + 2;
        (u64::from(self.device_size()) + 1) << multiplier
    }

    /// Returns the card capacity in 512-byte blocks, rounded down and
    /// capped at `u32::MAX`.
    pub fn card_capacity_blocks(&self) -> u32 {
        let blocks = self.card_capacity_bytes() / u64::from(Block::LEN_U32);
        u32::try_from(blocks).unwrap_or(u32::MAX)
    }
}

impl CsdV2 {
    /// Create a new, empty, CSD
    pub fn new() -> CsdV2 {
        CsdV2::default()
    }

    define_field!(csd_ver, u8, 0, 6, 2);
    define_field!(data_read_access_time1, u8, 1, 0, 8);
    define_field!(max_data_transfer_rate, u8, 3, 0, 8);
    define_field!(card_command_classes, u16, [(4, 0, 8), (5, 4, 4)]);
    define_field!(read_block_length, u8, 5, 0, 4);
    define_field!(device_size, u32, [(7, 0, 6), (8, 0, 8), (9, 0, 8)]);
    define_field!(erase_single_block_enabled, bool, 10, 6);
    define_field!(crc, u8, 15, 0, 8);

    /// Returns the card capacity in bytes
    pub fn card_capacity_bytes(&self) -> u64 {
        (u64::from(self.device_size()) + 1) * 512 * 1024
    }

    /// Returns the card capacity in 512-byte blocks.
    ///
    /// C_SIZE counts 512 KiB units, and there are 1024 blocks in each. The
    /// largest C_SIZE gives 2^32 blocks, which is capped at `u32::MAX`.
    pub fn card_capacity_blocks(&self) -> u32 {
        (self.device_size() + 1).saturating_mul(1024)
    }
}

/// Card Identification register
#[derive(Default, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub struct Cid {
    /// The 16-bytes of data in this Card Identification block
    pub data: [u8; 16],
}

impl Cid {
    define_field!(manufacturer_id, u8, 0);
    define_field!(oem_id, [u8; 2], 1);
    define_field!(product_name_bytes, [u8; 5], 3);
    define_field!(product_revision, u8, 8);
    define_field!(serial_number, u32, 9);
    define_field!(manufacturing_year_offset, u8, [(13, 0, 4), (14, 4, 4)]);
    define_field!(manufacturing_month, u8, 14, 0, 4);
    define_field!(crc, u8, 15, 0, 8);

    /// The product name, with anything that isn't printable ASCII dropped.
    pub fn product_name(&self) -> heapless::String<5> {
        let mut name = heapless::String::new();
        for b in self.product_name_bytes() {
            if b.is_ascii_graphic() || b == b' ' {
                // Five bytes in, at most five bytes out.
                let _ = name.push(char::from(b));
            }
        }
        name
    }

    /// The calendar year the card was made.
    pub fn manufacturing_year(&self) -> u16 {
        2000 + u16::from(self.manufacturing_year_offset())
    }
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
