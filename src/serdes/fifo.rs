/*!
    memory mapped fifo registers, one set per peer slot

    the fifo hardware itself is external, this only names its registers and handshake bits. Every word written to [TX_DATA] is queued until [TX_PACKET_READY] hands the whole packet to the peer, every word read from [RX_DATA] pops the packet currently signaled by [RX_PACKET_READY] until [RX_PACKET_DONE] releases it.
*/

use std::sync::Arc;
use log::*;

use crate::{
    address::SlotId,
    error::Result,
    };


/// write only, pushes a word of the packet being sent
pub const TX_DATA: u32 = 0x00;
/// read only, pops a word of the packet being received
pub const RX_DATA: u32 = 0x04;
/// read only, see [TX_EMPTY] and [RX_PACKET_READY]
pub const STATUS: u32 = 0x08;
/// write only, see [TX_PACKET_READY] and [RX_PACKET_DONE]
pub const CONTROL: u32 = 0x0C;
/// base address reported by the module in this slot, 0 until it reports
pub const HANDSHAKE: u32 = 0x10;

/// status bit: the previous packet left the transmit fifo
pub const TX_EMPTY: u32 = 1 << 0;
/// status bit: a complete packet waits in the receive fifo
pub const RX_PACKET_READY: u32 = 1 << 1;
/// control bit: the words pushed so far form a packet
pub const TX_PACKET_READY: u32 = 1 << 0;
/// control bit: the received packet is consumed
pub const RX_PACKET_DONE: u32 = 1 << 1;


/// raw 32 bit register access on the bus holding the fifos
pub trait FifoIo {
    fn read_u32(&self, address: u32) -> Result<u32>;
    fn write_u32(&self, address: u32, value: u32) -> Result<()>;
}
impl<F: FifoIo + ?Sized> FifoIo for &F {
    fn read_u32(&self, address: u32) -> Result<u32> {(**self).read_u32(address)}
    fn write_u32(&self, address: u32, value: u32) -> Result<()> {(**self).write_u32(address, value)}
}
impl<F: FifoIo + ?Sized> FifoIo for Arc<F> {
    fn read_u32(&self, address: u32) -> Result<u32> {(**self).read_u32(address)}
    fn write_u32(&self, address: u32, value: u32) -> Result<()> {(**self).write_u32(address, value)}
}


/// where the register set of each peer slot lives
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FifoLayout {
    /// address of the register set of slot 0
    pub base: u32,
    /// distance between the register sets of consecutive slots
    pub slot_stride: u32,
}
impl Default for FifoLayout {
    fn default() -> Self {
        Self {base: 0, slot_stride: 0x20}
    }
}
impl FifoLayout {
    /// address of `register` in the set talking to `peer`
    pub fn register(&self, peer: SlotId, register: u32) -> u32 {
        self.base
            .wrapping_add(self.slot_stride.wrapping_mul(u32::from(peer.id())))
            .wrapping_add(register)
    }
}


/// fifo register set talking to one peer slot
pub struct Fifo<'b, I> {
    io: &'b I,
    layout: FifoLayout,
    peer: SlotId,
}

impl<'b, I: FifoIo> Fifo<'b, I> {
    pub fn new(io: &'b I, layout: FifoLayout, peer: SlotId) -> Self {
        Self {io, layout, peer}
    }
    pub fn peer(&self) -> SlotId {self.peer}

    fn address(&self, register: u32) -> u32 {
        self.layout.register(self.peer, register)
    }

    pub fn status(&self) -> Result<u32> {
        self.io.read_u32(self.address(STATUS))
    }
    pub fn tx_empty(&self) -> Result<bool> {
        Ok(self.status()? & TX_EMPTY != 0)
    }
    pub fn rx_ready(&self) -> Result<bool> {
        Ok(self.status()? & RX_PACKET_READY != 0)
    }
    pub fn push(&self, word: u32) -> Result<()> {
        trace!("fifo {} tx {word:#010x}", self.peer);
        self.io.write_u32(self.address(TX_DATA), word)
    }
    pub fn pop(&self) -> Result<u32> {
        let word = self.io.read_u32(self.address(RX_DATA))?;
        trace!("fifo {} rx {word:#010x}", self.peer);
        Ok(word)
    }
    pub fn packet_ready(&self) -> Result<()> {
        self.io.write_u32(self.address(CONTROL), TX_PACKET_READY)
    }
    pub fn packet_done(&self) -> Result<()> {
        self.io.write_u32(self.address(CONTROL), RX_PACKET_DONE)
    }
    pub fn handshake(&self) -> Result<u32> {
        self.io.read_u32(self.address(HANDSHAKE))
    }
    pub fn announce(&self, base: u32) -> Result<()> {
        self.io.write_u32(self.address(HANDSHAKE), base)
    }
}
