use log::*;

use crate::{
    address::{SlotId, Target},
    backplane::Backplane,
    clock::{Clock, poll_until},
    error::{Error, Result},
    registers::Width,
    };
use super::{
    fifo::FifoIo,
    header::{SerdesHeader, PacketKind, MAX_PAYLOAD_WORDS},
    };


/// validated register access, before it is cut in chunks
#[derive(Copy, Clone, Debug)]
struct Access {
    width: Width,
    block: bool,
    /// word aligned byte offset in the completer
    offset: u32,
    /// byte lane of 16 bit values inside their word
    lane: u32,
    byte_enable: u8,
    stride: u32,
}

impl Access {
    /**
        check alignment of an access before anything reaches the fifo

        32 bit accesses need a word aligned offset, 16 bit accesses select the low or high half of the word holding them. Strides must keep every access word aligned.
    */
    fn new(width: Width, block: bool, offset: u32, stride: u32) -> Result<Self> {
        let byte_enable = width.byte_enable(offset)?;
        if stride % 4 != 0
            {return Err(Error::StrideCausesMisalignment)}
        Ok(Self {
            width,
            block,
            offset: offset & !3,
            lane: 8 * (offset % 4),
            byte_enable,
            stride,
        })
    }

    fn header(&self, write: bool, requester: SlotId, completer: SlotId) -> Result<SerdesHeader> {
        let mut header = SerdesHeader::request(PacketKind::register(self.width, write, self.block)?, requester, completer);
        header.byte_enable = self.byte_enable;
        header.stride = self.stride;
        Ok(header)
    }

    /// byte offset of the first access of the `index`-th chunk
    fn chunk_offset(&self, index: usize) -> Result<u32> {
        (index * MAX_PAYLOAD_WORDS)
            .checked_mul(self.stride as usize)
            .and_then(|distance| u32::try_from(distance).ok())
            .and_then(|distance| self.offset.checked_add(distance))
            .ok_or(Error::InvalidParameter("block access runs past the end of the address space"))
    }

    fn to_word(&self, value: u32) -> u32 {value << self.lane}
    fn from_word(&self, word: u32) -> u32 {(word >> self.lane) & self.width.max()}
}


/// register protocol on the fifo fabric, from the requester side
impl<I: FifoIo, C: Clock> Backplane<I, C> {
    pub fn read_reg32(&self, address: u32) -> Result<u32> {
        let (slot, offset) = self.resolve(Target::Flat(address))?;
        self.read_reg32_by_slot(slot, offset)
    }
    pub fn read_reg32_by_slot(&self, slot: SlotId, offset: u32) -> Result<u32> {
        let access = Access::new(Width::U32, false, offset, 0)?;
        Ok(self.read_access(slot, access, 1)?[0])
    }
    pub fn write_reg32(&self, address: u32, value: u32) -> Result<()> {
        let (slot, offset) = self.resolve(Target::Flat(address))?;
        self.write_reg32_by_slot(slot, offset, value)
    }
    pub fn write_reg32_by_slot(&self, slot: SlotId, offset: u32, value: u32) -> Result<()> {
        let access = Access::new(Width::U32, false, offset, 0)?;
        self.write_access(slot, access, &[value])
    }

    pub fn read_reg16(&self, address: u32) -> Result<u16> {
        let (slot, offset) = self.resolve(Target::Flat(address))?;
        self.read_reg16_by_slot(slot, offset)
    }
    pub fn read_reg16_by_slot(&self, slot: SlotId, offset: u32) -> Result<u16> {
        let access = Access::new(Width::U16, false, offset, 0)?;
        Ok(self.read_access(slot, access, 1)?[0] as u16)
    }
    pub fn write_reg16(&self, address: u32, value: u16) -> Result<()> {
        let (slot, offset) = self.resolve(Target::Flat(address))?;
        self.write_reg16_by_slot(slot, offset, value)
    }
    pub fn write_reg16_by_slot(&self, slot: SlotId, offset: u32, value: u16) -> Result<()> {
        let access = Access::new(Width::U16, false, offset, 0)?;
        self.write_access(slot, access, &[u32::from(value)])
    }

    /// read `count` words at `offset`, `offset + stride`, ...
    pub fn read_block32(&self, address: u32, count: usize, stride: u32) -> Result<Vec<u32>> {
        let (slot, offset) = self.resolve(Target::Flat(address))?;
        self.read_block32_by_slot(slot, offset, count, stride)
    }
    pub fn read_block32_by_slot(&self, slot: SlotId, offset: u32, count: usize, stride: u32) -> Result<Vec<u32>> {
        let access = Access::new(Width::U32, true, offset, stride)?;
        self.read_access(slot, access, count)
    }
    /// write `values` at `offset`, `offset + stride`, ...
    pub fn write_block32(&self, address: u32, values: &[u32], stride: u32) -> Result<()> {
        let (slot, offset) = self.resolve(Target::Flat(address))?;
        self.write_block32_by_slot(slot, offset, values, stride)
    }
    pub fn write_block32_by_slot(&self, slot: SlotId, offset: u32, values: &[u32], stride: u32) -> Result<()> {
        let access = Access::new(Width::U32, true, offset, stride)?;
        self.write_access(slot, access, values)
    }

    /// read `count` 16 bit values at `offset`, `offset + stride`, ...
    pub fn read_block16(&self, address: u32, count: usize, stride: u32) -> Result<Vec<u16>> {
        let (slot, offset) = self.resolve(Target::Flat(address))?;
        self.read_block16_by_slot(slot, offset, count, stride)
    }
    pub fn read_block16_by_slot(&self, slot: SlotId, offset: u32, count: usize, stride: u32) -> Result<Vec<u16>> {
        let access = Access::new(Width::U16, true, offset, stride)?;
        Ok(self.read_access(slot, access, count)?
            .into_iter()
            .map(|value| value as u16)
            .collect())
    }
    /// write 16 bit `values` at `offset`, `offset + stride`, ...
    pub fn write_block16(&self, address: u32, values: &[u16], stride: u32) -> Result<()> {
        let (slot, offset) = self.resolve(Target::Flat(address))?;
        self.write_block16_by_slot(slot, offset, values, stride)
    }
    pub fn write_block16_by_slot(&self, slot: SlotId, offset: u32, values: &[u16], stride: u32) -> Result<()> {
        let access = Access::new(Width::U16, true, offset, stride)?;
        let values: Vec<u32> = values.iter().copied().map(u32::from).collect();
        self.write_access(slot, access, &values)
    }


    /// read in chunks of at most [MAX_PAYLOAD_WORDS], holding the slot for the whole operation
    fn read_access(&self, slot: SlotId, access: Access, count: usize) -> Result<Vec<u32>> {
        if count == 0
            {return Err(Error::InvalidParameter("access count must not be zero"))}
        let _guard = self.lock_slot(slot)?;
        let mut values = Vec::with_capacity(count);
        let chunks = count.div_ceil(MAX_PAYLOAD_WORDS);
        for index in 0 .. chunks {
            let length = (count - index * MAX_PAYLOAD_WORDS).min(MAX_PAYLOAD_WORDS);
            let mut header = access.header(false, self.local(), slot)?.with_sequence(index);
            header.address = u64::from(access.chunk_offset(index)?);
            header.payload_length = length as u8;
            let words = self.register_exchange(slot, &header, &[])?;
            values.extend(words.into_iter().map(|word| access.from_word(word)));
        }
        Ok(values)
    }

    /**
        write in chunks of at most [MAX_PAYLOAD_WORDS], holding the slot for the whole operation

        the first failing chunk ends the operation, chunks already written stay written
    */
    fn write_access(&self, slot: SlotId, access: Access, values: &[u32]) -> Result<()> {
        if values.is_empty()
            {return Err(Error::InvalidParameter("access count must not be zero"))}
        if values.iter().any(|&value| value > access.width.max())
            {return Err(Error::InvalidParameter("value does not fit in access width"))}
        let _guard = self.lock_slot(slot)?;
        for (index, chunk) in values.chunks(MAX_PAYLOAD_WORDS).enumerate() {
            let mut header = access.header(true, self.local(), slot)?.with_sequence(index);
            header.address = u64::from(access.chunk_offset(index)?);
            header.payload_length = chunk.len() as u8;
            let words: Vec<u32> = chunk.iter().map(|&value| access.to_word(value)).collect();
            self.register_exchange(slot, &header, &words)?;
        }
        Ok(())
    }

    /**
        one request/response round with a completer

        packets from `slot` that do not answer the request are dropped and logged, message packets included. The whole wait is bounded by a single `rx_ready_timeout`. The answer must echo the request and carry exactly the expected number of words.
    */
    fn register_exchange(&self, slot: SlotId, request: &SerdesHeader, payload: &[u32]) -> Result<Vec<u32>> {
        self.transmit_packet(slot, request, payload)?;
        let response = poll_until(self.clock(), self.config().rx_ready_timeout, Error::RxFifoPktNotReadyTimeout, || {
            let Some(packet) = self.try_receive_packet(slot)?
                else {return Ok(None)};
            let header = &packet.header;
            if header.ack
            && header.kind == request.kind
            && header.requester == request.requester
            && header.completer == request.completer
                {return Ok(Some(packet))}
            warn!("{slot} dropping unexpected {:?} packet while waiting for {:?} response", header.kind, request.kind);
            Ok(None)
        })
            .inspect_err(|error| debug!("{slot} no {:?} response: {error}", request.kind))?;
        if let Some(error) = Error::from_code(response.header.status) {
            debug!("{slot} refused {:?}: {error}", request.kind);
            return Err(error);
        }
        if response.header.payload_length != request.payload_length {
            return Err(Error::UnexpectedPayloadCount {
                expected: request.payload_length.into(),
                actual: response.header.payload_length.into(),
                });
        }
        Ok(response.payload)
    }
}
