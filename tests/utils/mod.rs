//! Useful library code for tests

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::VecDeque;

use embedded_sdspi::sdcard::crc::{crc16, crc7};
use embedded_sdspi::sdcard::proto::*;
use embedded_sdspi::{SdTransport, TickSource};

/// Something the driver did to the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A six byte command frame went out
    Command { index: u8, arg: u32 },
    /// Any other bytes went out
    Write(Vec<u8>),
    /// Bytes were clocked in; `release` means chip-select went high after
    Read { len: usize, release: bool },
    /// Dummy bytes clocked with chip-select high
    Toggle(usize),
    /// The bus clock was changed
    SetClock(u32),
}

/// The error our simulated transport gives when told to fail.
#[derive(Debug)]
pub struct BusFault;

/// A pretend SD card on the end of an SPI bus.
///
/// It doesn't know the protocol. Each command frame it sees must match the
/// next entry in its script, and the bytes in that entry are what the card
/// then sends back, one per byte read, after a single `0xFF` gap. Once the
/// scripted bytes run out the card reads as `0xFF`.
#[derive(Default)]
pub struct SimCard {
    script: VecDeque<(u8, Vec<u8>)>,
    pending: VecDeque<u8>,
    mosi_held: bool,
    events: Vec<Event>,
    /// Fail every read from now on
    pub fail_reads: bool,
}

impl SimCard {
    pub fn new() -> SimCard {
        SimCard::default()
    }

    /// Add a command we expect, and what the card says back.
    pub fn expect(&mut self, command: u8, response: &[u8]) {
        self.script.push_back((command, response.to_vec()));
    }

    /// Everything the driver has done so far.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Forget what the driver has done so far.
    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Just the command indices, in order.
    pub fn commands(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Command { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }

    /// The argument of the first time we saw this command.
    pub fn argument_of(&self, command: u8) -> Option<u32> {
        self.events.iter().find_map(|e| match e {
            Event::Command { index, arg } if *index == command => Some(*arg),
            _ => None,
        })
    }

    /// How many times we saw this command.
    pub fn count(&self, command: u8) -> usize {
        self.commands().iter().filter(|c| **c == command).count()
    }

    /// Every non-command write, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Write(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    /// Has every scripted command been sent?
    pub fn is_finished(&self) -> bool {
        self.script.is_empty()
    }

    fn command(&mut self, frame: &[u8]) {
        assert_eq!(frame[0] & 0xC0, CMD_PREFIX, "bad start bits in {:02x?}", frame);
        assert_eq!(frame[5] & 1, 1, "missing stop bit in {:02x?}", frame);
        assert_eq!(frame[5] >> 1, crc7(&frame[0..5]), "bad CRC7 in {:02x?}", frame);
        let index = frame[0] & 0x3F;
        let arg = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]);
        self.events.push(Event::Command { index, arg });
        let Some((expected, response)) = self.script.pop_front() else {
            panic!("unexpected CMD{} with nothing left in the script", index);
        };
        assert_eq!(index, expected, "card expected CMD{} but got CMD{}", expected, index);
        self.pending.clear();
        self.pending.push_back(0xFF);
        self.pending.extend(response);
    }

    fn transfer_in(&mut self, buffer: &mut [u8], release: bool) -> Result<(), BusFault> {
        assert!(self.mosi_held, "reading with MOSI floating");
        self.events.push(Event::Read {
            len: buffer.len(),
            release,
        });
        if self.fail_reads {
            return Err(BusFault);
        }
        for b in buffer.iter_mut() {
            *b = self.pending.pop_front().unwrap_or(0xFF);
        }
        Ok(())
    }

    fn transfer_out(&mut self, bytes: &[u8]) -> Result<(), BusFault> {
        if bytes.len() == 6 && (bytes[0] & 0xC0) == CMD_PREFIX {
            self.command(bytes);
        } else {
            self.events.push(Event::Write(bytes.to_vec()));
        }
        Ok(())
    }
}

impl SdTransport for SimCard {
    type Error = BusFault;

    fn write_continue(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.transfer_out(bytes)
    }

    fn read_continue(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.transfer_in(buffer, false)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.transfer_out(bytes)
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.transfer_in(buffer, true)
    }

    fn hold_mosi(&mut self, high: bool) -> Result<(), Self::Error> {
        assert!(high, "MOSI must idle high");
        self.mosi_held = true;
        Ok(())
    }

    fn release_mosi(&mut self) -> Result<(), Self::Error> {
        self.mosi_held = false;
        Ok(())
    }

    fn set_clock(&mut self, hz: u32) -> Result<(), Self::Error> {
        self.events.push(Event::SetClock(hz));
        Ok(())
    }

    fn toggle(&mut self, n_bytes: usize) -> Result<(), Self::Error> {
        // A deselected card stops talking
        self.pending.clear();
        self.events.push(Event::Toggle(n_bytes));
        Ok(())
    }
}

/// A millisecond counter that moves on by one every time it is read.
pub struct StepTicks {
    now: Cell<u32>,
    pub running: bool,
}

impl StepTicks {
    pub fn new() -> StepTicks {
        StepTicks::starting_at(0)
    }

    pub fn starting_at(now: u32) -> StepTicks {
        StepTicks {
            now: Cell::new(now),
            running: true,
        }
    }

    pub fn stopped() -> StepTicks {
        StepTicks {
            now: Cell::new(0),
            running: false,
        }
    }
}

impl TickSource for StepTicks {
    fn now_ms(&self) -> u32 {
        let now = self.now.get();
        self.now.set(now.wrapping_add(1));
        now
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

/// C_SIZE for a card of 7,744,512 blocks (about 3.7 GiB).
pub const C_SIZE_4G: u32 = 0x1D8A;

/// Blocks on a card with [`C_SIZE_4G`].
pub const BLOCKS_4G: u32 = 7_744_512;

/// Make a version 2 CSD with the given C_SIZE.
pub fn make_csd(c_size: u32) -> [u8; 16] {
    let mut data = [0u8; 16];
    data[0] = 0x40;
    data[1] = 0x0E;
    data[3] = 0x32;
    data[4] = 0x5B;
    data[5] = 0x59;
    data[7] = ((c_size >> 16) & 0x3F) as u8;
    data[8] = (c_size >> 8) as u8;
    data[9] = c_size as u8;
    data[10] = 0x7F;
    data[11] = 0x80;
    data[12] = 0x0A;
    data[13] = 0x40;
    data[15] = (crc7(&data[0..15]) << 1) | 1;
    data
}

/// What a card sends after CMD9 or CMD10: R1, a gap, the start token, the
/// register and its CRC16.
pub fn register_response(data: &[u8; 16]) -> Vec<u8> {
    let mut response = vec![R1_READY_STATE, 0xFF, DATA_START_BLOCK];
    response.extend_from_slice(data);
    response.extend_from_slice(&crc16(data).to_be_bytes());
    response
}

/// A data block as it appears on the wire, after a short gap.
pub fn data_block(contents: &[u8; 512]) -> Vec<u8> {
    let mut response = vec![0xFF, 0xFF, DATA_START_BLOCK];
    response.extend_from_slice(contents);
    response.extend_from_slice(&crc16(contents).to_be_bytes());
    response
}

/// A block full of something recognisable.
pub fn pattern_block(seed: u8) -> [u8; 512] {
    let mut contents = [0u8; 512];
    for (i, b) in contents.iter_mut().enumerate() {
        *b = (i as u8).wrapping_mul(7).wrapping_add(seed);
    }
    contents
}

/// Script the power-on reset and interface check of a version 2 card.
pub fn script_v2_prefix(sim: &mut SimCard) {
    sim.expect(CMD0, &[R1_IDLE_STATE]);
    sim.expect(CMD8, &[R1_IDLE_STATE, 0x00, 0x00, 0x01, 0xAA]);
}

/// Script a complete, successful version 2 initialisation.
///
/// The card stays idle for `idle_rounds` ACMD41s before it is ready.
pub fn script_v2_init(sim: &mut SimCard, idle_rounds: usize, high_capacity: bool, csd: &[u8; 16]) {
    script_v2_prefix(sim);
    sim.expect(CMD58, &[R1_IDLE_STATE, 0x00, 0xFF, 0x80, 0x00]);
    for _ in 0..idle_rounds {
        sim.expect(CMD55, &[R1_IDLE_STATE]);
        sim.expect(ACMD41, &[R1_IDLE_STATE]);
    }
    sim.expect(CMD55, &[R1_IDLE_STATE]);
    sim.expect(ACMD41, &[R1_READY_STATE]);
    let ocr0 = if high_capacity { 0xC0 } else { 0x80 };
    sim.expect(CMD58, &[R1_READY_STATE, ocr0, 0xFF, 0x80, 0x00]);
    sim.expect(CMD9, &register_response(csd));
    sim.expect(CMD9, &register_response(csd));
}

/// A simulated 4 GB SDHC card, ready to be initialised.
pub fn sdhc_card() -> SimCard {
    let mut sim = SimCard::new();
    script_v2_init(&mut sim, 2, true, &make_csd(C_SIZE_4G));
    sim
}

/// Turn on logging, if RUST_LOG asks for it.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
