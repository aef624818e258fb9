mod common;

use std::sync::{Arc, Mutex, atomic::Ordering::Relaxed};

use slotlink::{
    Backplane, Config, Error, Result, SlotId,
    clock::StepClock,
    registers::{MemoryRegisters, RegisterSpace},
    serdes::{SerdesHeader, PacketKind, fifo::*},
    };
use common::*;


const BASE: u32 = 0x1000;

fn slot(id: u8) -> SlotId {SlotId::new(id).unwrap()}

/// motherboard with one module in slot 1, whose register memory is returned too
fn test<T>(test: T)
where T: FnOnce(&Board, &Arc<Sim>, &Arc<Mutex<Module<Bare>>>)
{
    logs();
    let (sim, board) = motherboard(Config::default());
    let module = plug(&sim, 1, BASE, MemoryRegisters::new(0x2000), Bare);
    test(&board, &sim, &module);
    assert!(module.lock().unwrap().errors.is_empty());
}


#[test]
fn idempotent_read() {
    test(|board, _, module| {
        module.lock().unwrap().registers.write32(0x40, 0xCAFE_F00D).unwrap();
        let first = board.read_reg32_by_slot(slot(1), 0x40).unwrap();
        let second = board.read_reg32_by_slot(slot(1), 0x40).unwrap();
        assert_eq!(first, 0xCAFE_F00D);
        assert_eq!(first, second);
    });
}

#[test]
fn write_then_read() {
    test(|board, _, module| {
        board.write_reg32_by_slot(slot(1), 0x100, 0x1234_5678).unwrap();
        assert_eq!(module.lock().unwrap().registers.read32(0x100), Ok(0x1234_5678));
        assert_eq!(board.read_reg32_by_slot(slot(1), 0x100), Ok(0x1234_5678));
    });
}

#[test]
fn half_words_select_their_lane() {
    test(|board, _, module| {
        board.write_reg32_by_slot(slot(1), 0x20, 0xFFFF_FFFF).unwrap();
        board.write_reg16_by_slot(slot(1), 0x22, 0xABCD).unwrap();
        assert_eq!(module.lock().unwrap().registers.read32(0x20), Ok(0xABCD_FFFF));
        board.write_reg16_by_slot(slot(1), 0x20, 0x0102).unwrap();
        assert_eq!(board.read_reg32_by_slot(slot(1), 0x20), Ok(0xABCD_0102));
        assert_eq!(board.read_reg16_by_slot(slot(1), 0x22), Ok(0xABCD));
        assert_eq!(board.read_reg16_by_slot(slot(1), 0x20), Ok(0x0102));
    });
}

#[test]
fn chunk_boundary() {
    test(|board, sim, _| {
        let values: Vec<u32> = (0 .. 251).map(|i| 0x5500_0000 | i).collect();

        let before = sim.requests.load(Relaxed);
        board.write_block32_by_slot(slot(1), 0x400, &values, 4).unwrap();
        assert_eq!(sim.requests.load(Relaxed) - before, 2);

        let before = sim.requests.load(Relaxed);
        let read = board.read_block32_by_slot(slot(1), 0x400, 251, 4).unwrap();
        assert_eq!(sim.requests.load(Relaxed) - before, 2);
        assert_eq!(read, values);
    });
}

#[test]
fn strided_blocks() {
    test(|board, _, module| {
        board.write_block32_by_slot(slot(1), 0x800, &[1, 2, 3], 8).unwrap();
        {
            let module = &mut *module.lock().unwrap();
            assert_eq!(module.registers.read32(0x800), Ok(1));
            assert_eq!(module.registers.read32(0x804), Ok(0));
            assert_eq!(module.registers.read32(0x808), Ok(2));
            assert_eq!(module.registers.read32(0x810), Ok(3));
        }
        board.write_block16_by_slot(slot(1), 0x902, &[0x11, 0x22, 0x33, 0x44], 4).unwrap();
        assert_eq!(board.read_block16_by_slot(slot(1), 0x902, 4, 4), Ok(vec![0x11, 0x22, 0x33, 0x44]));
        assert_eq!(board.read_block32_by_slot(slot(1), 0x900, 2, 4), Ok(vec![0x0011_0000, 0x0022_0000]));
        // stride 0 hits the same register again and again
        assert_eq!(board.read_block32_by_slot(slot(1), 0x800, 3, 0), Ok(vec![1, 1, 1]));
    });
}

#[test]
fn alignment_rejection() {
    test(|board, sim, _| {
        let before = sim.accesses.load(Relaxed);
        assert_eq!(board.read_reg16_by_slot(slot(1), 1), Err(Error::MisalignedByteEnable));
        assert_eq!(board.read_reg16_by_slot(slot(1), 3), Err(Error::MisalignedByteEnable));
        assert_eq!(board.read_reg32_by_slot(slot(1), 2), Err(Error::MisalignedAddress));
        assert_eq!(board.write_block32_by_slot(slot(1), 0, &[1, 2], 6), Err(Error::StrideCausesMisalignment));
        assert_eq!(board.read_block16_by_slot(slot(1), 0, 2, 2), Err(Error::StrideCausesMisalignment));
        assert_eq!(sim.accesses.load(Relaxed), before, "rejected accesses must not touch the fifo");
    });
}

#[test]
fn completer_errors_travel_back() {
    test(|board, _, module| {
        // past the end of the module memory
        assert_eq!(board.read_reg32_by_slot(slot(1), 0x4000), Err(Error::RegisterOutOfRange(0)));
        // partial effect of a failing block write
        assert_eq!(board.write_block32_by_slot(slot(1), 0x1FF8, &[7, 8, 9], 4), Err(Error::RegisterOutOfRange(0)));
        assert_eq!(module.lock().unwrap().registers.read32(0x1FFC), Ok(8));
    });
}

#[test]
fn flat_addresses() {
    logs();
    let (sim, board) = motherboard(Config::default());
    let one = plug(&sim, 1, 0x1000, MemoryRegisters::new(0x2000), Bare);
    let three = plug(&sim, 3, 0x3000, MemoryRegisters::new(0x1000), Bare);
    board.detect_modules().unwrap();

    board.write_reg32(0x1010, 0x1111).unwrap();
    board.write_reg32(0x3010, 0x3333).unwrap();
    board.write_reg16(0x2502, 0x2525).unwrap();
    assert_eq!(one.lock().unwrap().registers.read32(0x10), Ok(0x1111));
    // between two populated bases, the lower slot answers
    assert_eq!(one.lock().unwrap().registers.read32(0x1500), Ok(0x2525_0000));
    assert_eq!(three.lock().unwrap().registers.read32(0x10), Ok(0x3333));
    assert_eq!(board.read_reg32(0x3010), Ok(0x3333));
    assert_eq!(board.read_block32(0x1010, 1, 4), Ok(vec![0x1111]));
    assert_eq!(board.read_reg16(0x2502), Ok(0x2525));
    assert_eq!(board.read_reg32(0x0010), Err(Error::ModuleNotFound(0x0010)));
}


/// fifo hardware whose receive side never signals a packet
struct Silent {
    tx_empty: bool,
}
impl FifoIo for Silent {
    fn read_u32(&self, address: u32) -> Result<u32> {
        match address % 0x20 {
            STATUS => Ok(if self.tx_empty {TX_EMPTY} else {0}),
            _ => Ok(0),
        }
    }
    fn write_u32(&self, _address: u32, _value: u32) -> Result<()> {
        Ok(())
    }
}

fn silent(tx_empty: bool) -> Backplane<Silent, StepClock> {
    Backplane::new(Silent {tx_empty}, StepClock::new(1), FifoLayout::default(), Config::default(), SlotId::MOTHERBOARD)
}

#[test]
fn rx_timeout() {
    let board = silent(true);
    let start = board.clock().peek();
    assert_eq!(board.read_reg32_by_slot(slot(2), 0), Err(Error::RxFifoPktNotReadyTimeout));
    let spent = board.clock().peek() - start;
    assert!(spent >= 1000, "gave up after {spent} ms");
    assert!(spent < 1100, "gave up after {spent} ms");
}

#[test]
fn tx_timeout() {
    let board = silent(false);
    let start = board.clock().peek();
    assert_eq!(board.write_reg32_by_slot(slot(2), 0, 1), Err(Error::TxFifoNotEmptyTimeout));
    let spent = board.clock().peek() - start;
    assert!(spent >= 100, "gave up after {spent} ms");
    assert!(spent < 200, "gave up after {spent} ms");
}

/// peer that always has a packet ready, but never the awaited answer
struct Chatty {
    /// words of the packet it keeps sending
    packet: Vec<u32>,
    /// position in `packet` of the next word read
    next: Mutex<usize>,
    /// packets released by the requester
    popped: Mutex<usize>,
}
impl FifoIo for Chatty {
    fn read_u32(&self, address: u32) -> Result<u32> {
        match address % 0x20 {
            STATUS => Ok(TX_EMPTY | RX_PACKET_READY),
            RX_DATA => {
                let mut next = self.next.lock().unwrap();
                let word = self.packet[*next % self.packet.len()];
                *next += 1;
                Ok(word)
            },
            _ => Ok(0),
        }
    }
    fn write_u32(&self, address: u32, value: u32) -> Result<()> {
        if address % 0x20 == CONTROL && value & RX_PACKET_DONE != 0
            {*self.popped.lock().unwrap() += 1}
        Ok(())
    }
}

#[test]
fn chatty_peer_cannot_extend_the_wait() {
    logs();
    // late acknowledge of a write, while a read is awaited
    let stray = SerdesHeader::request(PacketKind::Write32, SlotId::MOTHERBOARD, slot(2)).response(0);
    let chatty = Chatty {
        packet: stray.to_words().to_vec(),
        next: Mutex::new(0),
        popped: Mutex::new(0),
    };
    let board = Backplane::new(chatty, StepClock::new(1), FifoLayout::default(), Config::default(), SlotId::MOTHERBOARD);
    let start = board.clock().peek();
    assert_eq!(board.read_reg32_by_slot(slot(2), 0), Err(Error::RxFifoPktNotReadyTimeout));
    let spent = board.clock().peek() - start;
    assert!(spent >= 1000, "gave up after {spent} ms");
    assert!(spent < 1100, "gave up after {spent} ms");
    // every stray packet was taken out of the way
    assert!(*board.io().popped.lock().unwrap() > 1);
}
