//! The two checksums the SD protocol uses.
//!
//! Command frames carry a CRC7 (polynomial x^7 + x^3 + 1) and data blocks
//! carry a CRC16 (CCITT polynomial 0x1021, MSB first, initial value zero).
//! Both are table driven, and the tables are built at compile time.

/// CRC7 lookup table. Entries hold the 7-bit remainder in the upper seven
/// bits of the byte, so a table step needs no shifting.
const CRC7_TABLE: [u8; 256] = make_crc7_table();

/// CRC16 lookup table for polynomial 0x1021.
const CRC16_TABLE: [u16; 256] = make_crc16_table();

const fn make_crc7_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if (crc & 0x80) != 0 {
                (crc << 1) ^ (0x09 << 1)
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const fn make_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if (crc & 0x8000) != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Continue a CRC7 calculation.
///
/// `crc` is the 7-bit result of a previous call (use zero to start) and the
/// return value is the 7-bit CRC covering everything seen so far. To build a
/// command frame, shift the result left by one and set the stop bit.
pub fn crc7_update(crc: u8, data: &[u8]) -> u8 {
    let mut acc = crc << 1;
    for &byte in data {
        acc = CRC7_TABLE[usize::from(byte ^ acc)];
    }
    acc >> 1
}

/// Perform the 7-bit CRC used on SD command frames.
pub fn crc7(data: &[u8]) -> u8 {
    crc7_update(0, data)
}

/// Continue a CRC16 calculation from a previous residual (zero to start).
pub fn crc16_update(crc: u16, data: &[u8]) -> u16 {
    data.iter().fold(crc, |crc, &byte| {
        CRC16_TABLE[usize::from((crc >> 8) as u8 ^ byte)] ^ (crc << 8)
    })
}

/// Perform the CRC16 calculation used for data blocks and registers.
pub fn crc16(data: &[u8]) -> u16 {
    crc16_update(0, data)
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
