use bilge::prelude::*;

use crate::{
    address::SlotId,
    error::{Error, Result},
    registers::Width,
    };


/// number of words in a [SerdesHeader]
pub const HEADER_WORDS: usize = 6;
/// most payload words following one header
pub const MAX_PAYLOAD_WORDS: usize = 250;

/// first header word: what the packet is and how much follows
#[bitsize(32)]
#[derive(Copy, Clone, FromBits, DebugBits, PartialEq, Default)]
pub struct ControlWord {
    /// words requested, carried or acknowledged, see [SerdesHeader::wire_words]
    pub payload_length: u8,
    /// valid byte lanes of every payload word
    pub byte_enable: u4,
    /// packet travels toward the motherboard cpu
    pub to_hps: bool,
    /// low bits of the chunk index or packet sequence number
    pub sequence: u2,
    /// set on responses
    pub ack: bool,
    /// see [PacketKind]
    pub kind: u8,
    _spare: u8,
}

/// second header word: the requester and completer of the exchange
#[bitsize(32)]
#[derive(Copy, Clone, FromBits, DebugBits, PartialEq, Default)]
pub struct RouteWord {
    pub requester: u4,
    pub completer: u4,
    _spare: u24,
}

impl RouteWord {
    pub fn between(requester: SlotId, completer: SlotId) -> Self {
        let mut word = Self::from(0u32);
        word.set_requester(u4::new(requester.id() & 0xF));
        word.set_completer(u4::new(completer.id() & 0xF));
        word
    }
}


/// type of a packet on the fifo fabric
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    Read16 = 1,
    Read32 = 2,
    Write16 = 3,
    Write32 = 4,
    BlockRead16 = 5,
    BlockRead32 = 6,
    BlockWrite16 = 7,
    BlockWrite32 = 8,
    /// one packet of a [crate::message::Message]
    Message = 9,
}
impl PacketKind {
    pub fn is_message(self) -> bool {self == Self::Message}
    pub fn is_read(self) -> bool {
        matches!(self, Self::Read16 | Self::Read32 | Self::BlockRead16 | Self::BlockRead32)
    }
    pub fn is_write(self) -> bool {
        matches!(self, Self::Write16 | Self::Write32 | Self::BlockWrite16 | Self::BlockWrite32)
    }
    pub fn is_block(self) -> bool {
        matches!(self, Self::BlockRead16 | Self::BlockRead32 | Self::BlockWrite16 | Self::BlockWrite32)
    }
    /// register access width, `None` for messages
    pub fn width(self) -> Option<Width> {
        match self {
            Self::Read16 | Self::Write16 | Self::BlockRead16 | Self::BlockWrite16 => Some(Width::U16),
            Self::Read32 | Self::Write32 | Self::BlockRead32 | Self::BlockWrite32 => Some(Width::U32),
            Self::Message => None,
        }
    }
    /// register access kind for the given width, operation and count
    pub fn register(width: Width, write: bool, block: bool) -> Result<Self> {
        Ok(match (width, write, block) {
            (Width::U16, false, false) => Self::Read16,
            (Width::U32, false, false) => Self::Read32,
            (Width::U16, true, false) => Self::Write16,
            (Width::U32, true, false) => Self::Write32,
            (Width::U16, false, true) => Self::BlockRead16,
            (Width::U32, false, true) => Self::BlockRead32,
            (Width::U16, true, true) => Self::BlockWrite16,
            (Width::U32, true, true) => Self::BlockWrite32,
            (Width::U8, ..) => return Err(Error::InvalidParameter("fifo fabric has no 8 bit access")),
        })
    }
}
impl TryFrom<u8> for PacketKind {
    type Error = Error;
    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            1 => Self::Read16,
            2 => Self::Read32,
            3 => Self::Write16,
            4 => Self::Write32,
            5 => Self::BlockRead16,
            6 => Self::BlockRead32,
            7 => Self::BlockWrite16,
            8 => Self::BlockWrite32,
            9 => Self::Message,
            other => return Err(Error::UnknownPacketKind(other)),
        })
    }
}


/**
    header leading every packet on the fifo fabric

    six little endian words:

    - control word, see [ControlWord]
    - route word, see [RouteWord]
    - address low and high words, a byte offset inside the completer
    - stride between consecutive block accesses, in bytes
    - status, 0 or the negative code of the [Error] the completer met
*/
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SerdesHeader {
    pub kind: PacketKind,
    pub payload_length: u8,
    pub byte_enable: u8,
    pub to_hps: bool,
    pub sequence: u8,
    pub ack: bool,
    pub requester: SlotId,
    pub completer: SlotId,
    pub address: u64,
    pub stride: u32,
    pub status: i32,
}

impl SerdesHeader {
    /// request from `requester` to `completer`, without address nor payload yet
    pub fn request(kind: PacketKind, requester: SlotId, completer: SlotId) -> Self {
        Self {
            kind,
            payload_length: 0,
            byte_enable: 0b1111,
            to_hps: completer == SlotId::MOTHERBOARD,
            sequence: 0,
            ack: false,
            requester,
            completer,
            address: 0,
            stride: 0,
            status: 0,
        }
    }

    /// header answering this request, with the given status
    pub fn response(&self, status: i32) -> Self {
        Self {
            ack: true,
            to_hps: self.requester == SlotId::MOTHERBOARD,
            status,
            ..*self
        }
    }

    /// sequence bits of the `index`-th chunk or packet
    pub fn with_sequence(mut self, index: usize) -> Self {
        self.sequence = (index & 0b11) as u8;
        self
    }

    /**
        number of words following this header on the fifo

        reads carry their payload in the response only, writes in the request only. A response reporting an error never carries payload. Message packets always carry `payload_length` words.
    */
    pub fn wire_words(&self) -> usize {
        let length = usize::from(self.payload_length);
        if self.kind.is_message()
            {return length}
        if self.ack && self.status != 0
            {return 0}
        if self.kind.is_read() == self.ack
            {length}
        else
            {0}
    }

    /// byte offset as a 32 bit address, refusing offsets above 4GB
    pub fn offset(&self) -> Result<u32> {
        u32::try_from(self.address).map_err(|_| Error::RegisterOutOfRange(u32::MAX))
    }

    pub fn to_words(&self) -> [u32; HEADER_WORDS] {
        let mut control = ControlWord::from(0u32);
        control.set_payload_length(self.payload_length);
        control.set_byte_enable(u4::new(self.byte_enable & 0xF));
        control.set_to_hps(self.to_hps);
        control.set_sequence(u2::new(self.sequence & 0b11));
        control.set_ack(self.ack);
        control.set_kind(self.kind as u8);
        [
            u32::from(control),
            u32::from(RouteWord::between(self.requester, self.completer)),
            self.address as u32,
            (self.address >> 32) as u32,
            self.stride,
            self.status as u32,
        ]
    }

    pub fn from_words(words: &[u32; HEADER_WORDS]) -> Result<Self> {
        let control = ControlWord::from(words[0]);
        let route = RouteWord::from(words[1]);
        Ok(Self {
            kind: PacketKind::try_from(control.kind())?,
            payload_length: control.payload_length(),
            byte_enable: control.byte_enable().value(),
            to_hps: control.to_hps(),
            sequence: control.sequence().value(),
            ack: control.ack(),
            requester: SlotId::new(route.requester().value())?,
            completer: SlotId::new(route.completer().value())?,
            address: u64::from(words[2]) | (u64::from(words[3]) << 32),
            stride: words[4],
            status: words[5] as i32,
        })
    }
}


/// header with the words following it on the fifo
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SerdesPacket {
    pub header: SerdesHeader,
    pub payload: Vec<u32>,
}


#[cfg(test)]
mod tests {
    use super::*;

    fn slot(id: u8) -> SlotId {SlotId::new(id).unwrap()}

    #[test]
    fn control_word_layout() {
        let mut header = SerdesHeader::request(PacketKind::BlockWrite16, SlotId::MOTHERBOARD, slot(3));
        header.payload_length = 250;
        header.byte_enable = 0b1100;
        header.address = 0x1_0000_0040;
        header.stride = 8;
        let header = header.with_sequence(5);
        let words = header.to_words();
        assert_eq!(words[0], 250 | 0b1100 << 8 | 0b01 << 13 | 7 << 16);
        assert_eq!(words[1], 0x30);
        assert_eq!(&words[2 ..], &[0x40, 1, 8, 0]);
        assert_eq!(SerdesHeader::from_words(&words).unwrap(), header);
    }

    #[test]
    fn response_flags() {
        let request = SerdesHeader::request(PacketKind::Read32, SlotId::MOTHERBOARD, slot(2));
        assert!(!request.to_hps);
        let response = request.response(Error::MisalignedAddress.code());
        let words = response.to_words();
        assert_eq!(words[0] >> 12 & 1, 1, "to_hps");
        assert_eq!(words[0] >> 15 & 1, 1, "ack");
        assert_eq!(words[5], (-10i32) as u32);
        assert_eq!(SerdesHeader::from_words(&words).unwrap().status, -10);
    }

    #[test]
    fn words_on_the_wire() {
        let mut read = SerdesHeader::request(PacketKind::BlockRead32, SlotId::MOTHERBOARD, slot(1));
        read.payload_length = 12;
        assert_eq!(read.wire_words(), 0);
        assert_eq!(read.response(0).wire_words(), 12);
        assert_eq!(read.response(-19).wire_words(), 0);

        let mut write = SerdesHeader::request(PacketKind::Write16, SlotId::MOTHERBOARD, slot(1));
        write.payload_length = 1;
        assert_eq!(write.wire_words(), 1);
        assert_eq!(write.response(0).wire_words(), 0);

        let mut message = SerdesHeader::request(PacketKind::Message, slot(1), SlotId::MOTHERBOARD);
        message.payload_length = 20;
        assert_eq!(message.wire_words(), 20);
        assert_eq!(message.response(0).wire_words(), 20);
    }

    #[test]
    fn unknown_kind() {
        let mut words = SerdesHeader::request(PacketKind::Read32, SlotId::MOTHERBOARD, slot(1)).to_words();
        words[0] = (words[0] & !0x00FF_0000) | 0x42 << 16;
        assert_eq!(SerdesHeader::from_words(&words), Err(Error::UnknownPacketKind(0x42)));
    }

    #[test]
    fn register_kinds() {
        assert_eq!(PacketKind::register(Width::U16, true, true), Ok(PacketKind::BlockWrite16));
        assert!(PacketKind::register(Width::U8, false, false).is_err());
        assert_eq!(PacketKind::BlockRead32.width(), Some(Width::U32));
        assert!(PacketKind::Message.width().is_none());
    }
}
