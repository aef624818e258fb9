/*!
    register memory served by a completer

    both the uart slave responder and the fifo completer answer accesses against a [RegisterSpace]. Accesses narrower than a word select byte lanes inside the aligned 32 bit word holding them, lanes are little endian: byte 0 of the word is the lowest address.
*/

use crate::error::{Error, Result};


/// width of one register access
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Width {
    U8 = 1,
    U16 = 2,
    U32 = 4,
}
impl Width {
    /// number of bytes in one access
    pub const fn bytes(self) -> usize {self as usize}
    /// largest value an access of this width can carry
    pub const fn max(self) -> u32 {
        match self {
            Self::U8 => 0xFF,
            Self::U16 => 0xFFFF,
            Self::U32 => u32::MAX,
        }
    }
    /// byte enables of an access at `address`, rejecting accesses crossing their natural alignment
    pub fn byte_enable(self, address: u32) -> Result<u8> {
        let lane = address % 4;
        match self {
            Self::U32 if lane == 0 => Ok(0b1111),
            Self::U32 => Err(Error::MisalignedAddress),
            Self::U16 => match lane {
                0 => Ok(0b0011),
                2 => Ok(0b1100),
                _ => Err(Error::MisalignedByteEnable),
            },
            Self::U8 => Ok(1 << lane),
        }
    }

    /// place values in consecutive little endian lanes of `width` bytes
    pub fn pack(self, values: &[u32]) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(values.len() * self.bytes());
        for &value in values {
            if value > self.max()
                {return Err(Error::InvalidParameter("value does not fit in access width"))}
            bytes.extend_from_slice(&value.to_le_bytes()[.. self.bytes()]);
        }
        Ok(bytes)
    }
    /// read consecutive little endian lanes of `width` bytes
    pub fn unpack(self, bytes: &[u8]) -> Result<Vec<u32>> {
        if bytes.len() % self.bytes() != 0
            {return Err(Error::InvalidParameter("byte count is not a multiple of access width"))}
        Ok(bytes.chunks(self.bytes())
            .map(|lane| {
                let mut word = [0u8; 4];
                word[.. lane.len()].copy_from_slice(lane);
                u32::from_le_bytes(word)
            })
            .collect())
    }
}
impl TryFrom<u8> for Width {
    type Error = Error;
    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::U8),
            2 => Ok(Self::U16),
            4 => Ok(Self::U32),
            _ => Err(Error::InvalidParameter("access width must be 1, 2 or 4 bytes")),
        }
    }
}

/// mask covering the bytes selected by a 4 bit byte enable
pub fn lane_mask(byte_enable: u8) -> u32 {
    (0 .. 4)
        .filter(|lane| byte_enable & (1 << lane) != 0)
        .fold(0, |mask, lane| mask | (0xFF << (8 * lane)))
}


/// memory answering word accesses at byte offsets
pub trait RegisterSpace {
    /// read the word at a 4 byte aligned offset
    fn read32(&mut self, offset: u32) -> Result<u32>;
    /// write the word at a 4 byte aligned offset
    fn write32(&mut self, offset: u32, value: u32) -> Result<()>;

    /// write only the bytes selected by `byte_enable`, leaving the others untouched
    fn write_masked(&mut self, offset: u32, byte_enable: u8, value: u32) -> Result<()> {
        let mask = lane_mask(byte_enable);
        if mask == u32::MAX
            {return self.write32(offset, value)}
        let current = self.read32(offset)?;
        self.write32(offset, (current & !mask) | (value & mask))
    }
    /// read a naturally aligned value of the given width
    fn read(&mut self, address: u32, width: Width) -> Result<u32> {
        let enable = width.byte_enable(address)?;
        let word = self.read32(address & !3)?;
        Ok((word & lane_mask(enable)) >> (8 * (address % 4)))
    }
    /// write a naturally aligned value of the given width
    fn write(&mut self, address: u32, width: Width, value: u32) -> Result<()> {
        let enable = width.byte_enable(address)?;
        if value > width.max()
            {return Err(Error::InvalidParameter("value does not fit in access width"))}
        self.write_masked(address & !3, enable, value << (8 * (address % 4)))
    }
}

impl<R: RegisterSpace + ?Sized> RegisterSpace for &mut R {
    fn read32(&mut self, offset: u32) -> Result<u32> {(**self).read32(offset)}
    fn write32(&mut self, offset: u32, value: u32) -> Result<()> {(**self).write32(offset, value)}
}


/**
    plain byte array register space

    the simplest completer memory: every offset inside the buffer is readable and writable
*/
#[derive(Clone, Debug)]
pub struct MemoryRegisters {
    buffer: Vec<u8>,
}
impl MemoryRegisters {
    pub fn new(size: usize) -> Self {
        Self {buffer: vec![0; size.next_multiple_of(4)]}
    }
    pub fn len(&self) -> usize {self.buffer.len()}
    pub fn is_empty(&self) -> bool {self.buffer.is_empty()}
    pub fn as_bytes(&self) -> &[u8] {&self.buffer}

    fn word(&self, offset: u32) -> Result<usize> {
        if offset % 4 != 0
            {return Err(Error::MisalignedAddress)}
        let start = usize::try_from(offset).map_err(|_| Error::RegisterOutOfRange(offset))?;
        if start + 4 > self.buffer.len()
            {return Err(Error::RegisterOutOfRange(offset))}
        Ok(start)
    }
}
impl RegisterSpace for MemoryRegisters {
    fn read32(&mut self, offset: u32) -> Result<u32> {
        let start = self.word(offset)?;
        let mut word = [0; 4];
        word.copy_from_slice(&self.buffer[start ..][.. 4]);
        Ok(u32::from_le_bytes(word))
    }
    fn write32(&mut self, offset: u32, value: u32) -> Result<()> {
        let start = self.word(offset)?;
        self.buffer[start ..][.. 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }
}
