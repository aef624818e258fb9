/*!
    commands exchanged between master and slave cpus inside uart frames

    every command is a fixed header followed by a payload whose layout depends on the opcode. Values are packed in little endian lanes of the access width.
*/

use packbytes::{FromBytes, ToBytes, ByteArray};

use crate::error::{Error, Result};
use crate::frame::MAX_PAYLOAD;
use crate::registers::Width;


/// command header
#[derive(Copy, Clone, FromBytes, ToBytes, Debug, Default, PartialEq)]
pub struct Header {
    /// type of command, see [Opcode]
    pub opcode: u8,
    /// opcode of the request this command answers, equal to `opcode` for requests
    pub answers: u8,
    /// access width in bytes
    pub width: u8,
    _spare: u8,
    /// number of values accessed
    pub count: u16,
    /// number of payload bytes following this header
    pub length: u16,
    /// first register accessed on the slave
    pub address: u32,
}

/// size of [Header] on the wire
pub const HEADER: usize = <<Header as FromBytes>::Bytes as ByteArray>::SIZE;
/// largest payload following a header
pub const MAX_DATA: usize = MAX_PAYLOAD - HEADER;

/// type of command
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Echo = 1,
    Read = 2,
    Write = 3,
    SetClear = 4,
    ReadResponse = 5,
    Ack = 6,
}
impl TryFrom<u8> for Opcode {
    type Error = Error;
    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            1 => Self::Echo,
            2 => Self::Read,
            3 => Self::Write,
            4 => Self::SetClear,
            5 => Self::ReadResponse,
            6 => Self::Ack,
            _ => return Err(Error::InvalidParameter("unknown uart opcode")),
        })
    }
}

/// decoded command with its payload
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// bytes the slave must send back unchanged
    Echo(Vec<u8>),
    Read {address: u32, width: Width, count: u16},
    Write {address: u32, width: Width, values: Vec<u32>},
    /// clear the bits of `mask` then set those of `value & mask`
    SetClear {address: u32, width: Width, mask: u32, value: u32},
    ReadResponse {address: u32, width: Width, values: Vec<u32>},
    /// acknowledge a write or set/clear
    Ack {answers: Opcode, address: u32, width: Width, count: u16},
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Echo(_) => Opcode::Echo,
            Self::Read {..} => Opcode::Read,
            Self::Write {..} => Opcode::Write,
            Self::SetClear {..} => Opcode::SetClear,
            Self::ReadResponse {..} => Opcode::ReadResponse,
            Self::Ack {..} => Opcode::Ack,
        }
    }

    /// serialize to a frame payload
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut header = Header {
            opcode: self.opcode() as u8,
            answers: self.opcode() as u8,
            width: 1,
            ..Default::default()
        };
        let data = match self {
            Self::Echo(data) => {
                header.count = count(data.len())?;
                data.clone()
            },
            Self::Read {address, width, count} => {
                check_span(*width, usize::from(*count))?;
                header.address = *address;
                header.width = *width as u8;
                header.count = *count;
                Vec::new()
            },
            Self::Write {address, width, values}
            | Self::ReadResponse {address, width, values} => {
                check_span(*width, values.len())?;
                header.address = *address;
                header.width = *width as u8;
                header.count = count(values.len())?;
                if matches!(self, Self::ReadResponse {..})
                    {header.answers = Opcode::Read as u8;}
                width.pack(values)?
            },
            Self::SetClear {address, width, mask, value} => {
                header.address = *address;
                header.width = *width as u8;
                header.count = 1;
                width.pack(&[*mask, *value])?
            },
            Self::Ack {answers, address, width, count} => {
                header.answers = *answers as u8;
                header.address = *address;
                header.width = *width as u8;
                header.count = *count;
                Vec::new()
            },
        };
        if data.len() > MAX_DATA
            {return Err(Error::PayloadTooLarge)}
        header.length = count(data.len())?;

        let mut payload = Vec::with_capacity(HEADER + data.len());
        payload.extend_from_slice(header.to_le_bytes().as_ref());
        payload.extend_from_slice(&data);
        Ok(payload)
    }

    /// parse a frame payload
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < HEADER
            {return Err(Error::FrameLength)}
        let mut bytes = <Header as FromBytes>::Bytes::zeroed();
        bytes.as_mut().copy_from_slice(&payload[.. HEADER]);
        let header = Header::from_le_bytes(bytes);
        let data = &payload[HEADER ..];
        if data.len() != usize::from(header.length)
            {return Err(Error::FrameLength)}

        let opcode = Opcode::try_from(header.opcode)?;
        let width = Width::try_from(header.width)?;
        let address = header.address;
        Ok(match opcode {
            Opcode::Echo => Self::Echo(data.to_vec()),
            Opcode::Read => Self::Read {address, width, count: header.count},
            Opcode::Write | Opcode::ReadResponse => {
                let values = width.unpack(data)?;
                if values.len() != usize::from(header.count)
                    {return Err(Error::UnexpectedPayloadCount {expected: header.count.into(), actual: values.len()})}
                if opcode == Opcode::Write
                    {Self::Write {address, width, values}}
                else
                    {Self::ReadResponse {address, width, values}}
            },
            Opcode::SetClear => {
                let values = width.unpack(data)?;
                let &[mask, value] = values.as_slice()
                    else {return Err(Error::UnexpectedPayloadCount {expected: 2, actual: values.len()})};
                Self::SetClear {address, width, mask, value}
            },
            Opcode::Ack => Self::Ack {
                answers: Opcode::try_from(header.answers)?,
                address,
                width,
                count: header.count,
            },
        })
    }

    /// whether `self` is a well formed answer to `request`: operation, address, width and count must echo it
    pub fn answers(&self, request: &Command) -> bool {
        match (request, self) {
            (Self::Echo(sent), Self::Echo(received)) => sent == received,
            (Self::Read {address, width, count}, Self::ReadResponse {address: a, width: w, values}) =>
                address == a && width == w && usize::from(*count) == values.len(),
            (Self::Write {address, width, values}, Self::Ack {answers: Opcode::Write, address: a, width: w, count}) =>
                address == a && width == w && values.len() == usize::from(*count),
            (Self::SetClear {address, width, ..}, Self::Ack {answers: Opcode::SetClear, address: a, width: w, count}) =>
                address == a && width == w && *count == 1,
            _ => false,
        }
    }
}

fn count(len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| Error::PayloadTooLarge)
}

/// a read or write of `count` values must fit in one frame
fn check_span(width: Width, count: usize) -> Result<()> {
    if count == 0
        {return Err(Error::InvalidParameter("access count must not be zero"))}
    if count * width.bytes() > MAX_DATA
        {return Err(Error::PayloadTooLarge)}
    Ok(())
}
