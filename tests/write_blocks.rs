//! Block write tests

mod utils;

use embedded_sdspi::sdcard::crc::crc16;
use embedded_sdspi::sdcard::proto::*;
use embedded_sdspi::{AcquireOpts, Block, BlockDevice, BlockIdx, Error, SdCard};
use utils::{Event, SimCard, StepTicks};

/// A data response token saying the block was accepted.
const ACCEPTED: u8 = 0x05;
/// A data response token saying the block failed its CRC.
const CRC_REJECTED: u8 = 0x0B;

fn block_of(contents: [u8; 512]) -> Block {
    Block { contents }
}

#[test]
fn write_one_block() {
    utils::init_logging();
    let contents = utils::pattern_block(3);
    let mut sim = utils::sdhc_card();
    // R1, N_WR gap, data response, then two bytes of busy
    sim.expect(CMD24, &[R1_READY_STATE, 0xFF, ACCEPTED, 0x00, 0x00, 0xFF]);
    let ticks = StepTicks::new();
    let mut card = SdCard::new(&mut sim, &ticks);
    card.init().expect("init");
    card.transport(|t| t.clear_events());

    card.write_blocks(BlockIdx(42), &[block_of(contents)]).expect("write");
    drop(card);

    assert!(sim.is_finished());
    assert_eq!(sim.argument_of(CMD24), Some(42));
    let writes = sim.writes();
    assert_eq!(writes.len(), 3);
    assert_eq!(writes[0], [DATA_START_BLOCK]);
    assert_eq!(writes[1], contents);
    assert_eq!(writes[2], crc16(&contents).to_be_bytes());
    assert_eq!(sim.events().last(), Some(&Event::Toggle(1)));
}

#[test]
fn write_many_blocks() {
    let first = utils::pattern_block(1);
    let second = utils::pattern_block(2);
    let mut sim = utils::sdhc_card();
    sim.expect(
        CMD25,
        &[
            R1_READY_STATE,
            // first block
            0xFF,
            ACCEPTED,
            0x00,
            0xFF,
            // second block
            0xFF,
            ACCEPTED,
            0xFF,
            // stop token, N_BR and busy
            0xFF,
            0xFF,
            0x00,
            0xFF,
        ],
    );
    let ticks = StepTicks::new();
    let mut card = SdCard::new(&mut sim, &ticks);
    card.init().expect("init");
    card.transport(|t| t.clear_events());

    card.write(&[block_of(first), block_of(second)], BlockIdx(9)).expect("write");
    drop(card);

    assert!(sim.is_finished());
    assert_eq!(sim.commands(), [CMD25]);
    let writes = sim.writes();
    assert_eq!(writes.len(), 7);
    assert_eq!(writes[0], [WRITE_MULTIPLE_TOKEN]);
    assert_eq!(writes[1], first);
    assert_eq!(writes[3], [WRITE_MULTIPLE_TOKEN]);
    assert_eq!(writes[4], second);
    assert_eq!(writes[5], crc16(&second).to_be_bytes());
    assert_eq!(writes[6], [STOP_TRAN_TOKEN]);
    assert_eq!(sim.events().last(), Some(&Event::Toggle(1)));
}

#[test]
fn rejected_block() {
    let mut sim = utils::sdhc_card();
    sim.expect(CMD24, &[R1_READY_STATE, 0xFF, CRC_REJECTED]);
    let ticks = StepTicks::new();
    let mut card = SdCard::new(&mut sim, &ticks);
    card.init().expect("init");

    let err = card.write_blocks(BlockIdx(0), &[Block::new()]).unwrap_err();
    assert_eq!(err, Error::WriteRejected(CRC_REJECTED));
    assert_eq!(err.status(), 0xFF);
    drop(card);
    assert_eq!(sim.events().last(), Some(&Event::Toggle(1)));
}

#[test]
fn rejected_block_stops_multiple_write() {
    let mut sim = utils::sdhc_card();
    sim.expect(CMD25, &[R1_READY_STATE, 0xFF, CRC_REJECTED]);
    let ticks = StepTicks::new();
    let mut card = SdCard::new(&mut sim, &ticks);
    card.init().expect("init");
    card.transport(|t| t.clear_events());

    let blocks = [Block::new(), Block::new(), Block::new()];
    assert_eq!(
        card.write_blocks(BlockIdx(0), &blocks),
        Err(Error::WriteRejected(CRC_REJECTED))
    );
    drop(card);

    let writes = sim.writes();
    // one block went out, then the stop token
    assert_eq!(writes.len(), 4);
    assert_eq!(writes[3], [STOP_TRAN_TOKEN]);
}

#[test]
fn garbled_data_response() {
    let mut sim = utils::sdhc_card();
    sim.expect(CMD24, &[R1_READY_STATE]);
    let ticks = StepTicks::new();
    let mut card = SdCard::new(&mut sim, &ticks);
    card.init().expect("init");

    assert_eq!(
        card.write_blocks(BlockIdx(0), &[Block::new()]),
        Err(Error::MalformedDataResponse(0xFF))
    );
}

#[test]
fn card_stuck_busy() {
    let mut sim = utils::sdhc_card();
    let mut busy = vec![R1_READY_STATE, 0xFF, ACCEPTED];
    busy.extend([0x00; 64]);
    sim.expect(CMD24, &busy);
    let ticks = StepTicks::new();
    let opts = AcquireOpts {
        write_busy_timeout_ms: 20,
        ..Default::default()
    };
    let mut card = SdCard::new_with_options(&mut sim, &ticks, opts);
    card.init().expect("init");

    assert_eq!(
        card.write_blocks(BlockIdx(0), &[Block::new()]),
        Err(Error::TimeoutWaitNotBusy)
    );
    drop(card);
    assert_eq!(sim.events().last(), Some(&Event::Toggle(1)));
}

#[test]
fn write_command_rejected() {
    let mut sim = utils::sdhc_card();
    sim.expect(CMD24, &[R1_ADDRESS_ERROR]);
    let ticks = StepTicks::new();
    let mut card = SdCard::new(&mut sim, &ticks);
    card.init().expect("init");
    card.transport(|t| t.clear_events());

    assert_eq!(
        card.write_blocks(BlockIdx(0), &[Block::new()]),
        Err(Error::Rejected {
            command: CMD24,
            r1: R1_ADDRESS_ERROR
        })
    );
    drop(card);
    assert!(sim.writes().is_empty());
}

#[test]
fn write_out_of_range_touches_nothing() {
    let mut sim = utils::sdhc_card();
    let ticks = StepTicks::new();
    let mut card = SdCard::new(&mut sim, &ticks);
    card.init().expect("init");
    card.transport(|t| t.clear_events());

    assert_eq!(
        card.write_blocks(BlockIdx(utils::BLOCKS_4G), &[Block::new()]),
        Err(Error::OutOfRange)
    );
    drop(card);
    assert!(sim.events().is_empty());
}

#[test]
fn write_needs_init() {
    let mut sim = SimCard::new();
    let ticks = StepTicks::new();
    let mut card = SdCard::new(&mut sim, &ticks);
    assert_eq!(
        card.write_blocks(BlockIdx(0), &[Block::new()]),
        Err(Error::NotInitialised)
    );
    drop(card);
    assert!(sim.events().is_empty());
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
