use bilge::prelude::*;

use crate::{
    error::{Error, Result},
    serdes::{SerdesHeader, SerdesPacket, MAX_PAYLOAD_WORDS},
    };


/// words of [TransportHeader] at the start of a message packet payload
pub const TRANSPORT_WORDS: usize = 6;
/// words of [CommandHeader] following the transport header
pub const COMMAND_WORDS: usize = 8;
/// most message payload words carried by one packet
pub const PACKET_CAPACITY: usize = MAX_PAYLOAD_WORDS - TRANSPORT_WORDS - COMMAND_WORDS;

#[bitsize(32)]
#[derive(Copy, Clone, FromBits, DebugBits, PartialEq, Default)]
struct TransactionWord {
    transaction_id: u16,
    response: bool,
    requires_finished: bool,
    _spare: u14,
}

#[bitsize(32)]
#[derive(Copy, Clone, FromBits, DebugBits, PartialEq, Default)]
struct SequenceWord {
    sequence_num: u16,
    expected_count: u16,
}


/// what links a packet to its message
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TransportHeader {
    /// shared by all packets of a message
    pub transaction_id: u16,
    /// the message answers a request with the same transaction id
    pub response: bool,
    /// the receiver will send a `REQUEST_FINISHED` message once the command is executed
    pub requires_finished: bool,
    /// rank of the packet in its message, from 1
    pub sequence_num: u16,
    /// number of packets in the message
    pub expected_count: u16,
    /// payload words of the whole message
    pub total_words: u32,
    /// payload bytes of the whole message
    pub total_bytes: u32,
    /// crc-32 of the whole message, see [crate::message::Message::computed_crc]
    pub crc: u32,
    /// 0 or the negative code of the error a response reports
    pub status: i32,
}

impl TransportHeader {
    pub fn to_words(&self) -> [u32; TRANSPORT_WORDS] {
        let mut transaction = TransactionWord::from(0u32);
        transaction.set_transaction_id(self.transaction_id);
        transaction.set_response(self.response);
        transaction.set_requires_finished(self.requires_finished);
        [
            u32::from(transaction),
            u32::from(SequenceWord::new(self.sequence_num, self.expected_count)),
            self.total_words,
            self.total_bytes,
            self.crc,
            self.status as u32,
        ]
    }
    pub fn from_words(words: &[u32; TRANSPORT_WORDS]) -> Self {
        let transaction = TransactionWord::from(words[0]);
        let sequence = SequenceWord::from(words[1]);
        Self {
            transaction_id: transaction.transaction_id(),
            response: transaction.response(),
            requires_finished: transaction.requires_finished(),
            sequence_num: sequence.sequence_num(),
            expected_count: sequence.expected_count(),
            total_words: words[2],
            total_bytes: words[3],
            crc: words[4],
            status: words[5] as i32,
        }
    }
}


/// what the receiver must do with a message
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandHeader {
    /// command code, see [crate::dispatch::CommandType]
    pub command: u32,
    /// eeprom chip, flash device or microcontroller channel
    pub device: u32,
    /// byte offset in the device
    pub address: u32,
    /// number of bytes to read, or written
    pub length: u32,
    /// command specific, the transaction id being completed for `REQUEST_FINISHED`
    pub argument: u32,
    /// command completed by a `REQUEST_FINISHED` message
    pub finished_command: u32,
    /// status of the completed command
    pub finished_status: i32,
}

impl CommandHeader {
    pub fn new(command: u32) -> Self {
        Self {command, ..Default::default()}
    }
    pub fn to_words(&self) -> [u32; COMMAND_WORDS] {
        [
            self.command,
            self.device,
            self.address,
            self.length,
            self.argument,
            self.finished_command,
            self.finished_status as u32,
            0,
        ]
    }
    pub fn from_words(words: &[u32; COMMAND_WORDS]) -> Self {
        Self {
            command: words[0],
            device: words[1],
            address: words[2],
            length: words[3],
            argument: words[4],
            finished_command: words[5],
            finished_status: words[6] as i32,
        }
    }
}


/// one packet of a message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub serdes: SerdesHeader,
    pub transport: TransportHeader,
    pub command: CommandHeader,
    /// at most [PACKET_CAPACITY] words of the message payload
    pub payload: Vec<u32>,
}

impl Packet {
    /// words following the serdes header on the fifo
    pub fn to_words(&self) -> Vec<u32> {
        let mut words = Vec::with_capacity(TRANSPORT_WORDS + COMMAND_WORDS + self.payload.len());
        words.extend_from_slice(&self.transport.to_words());
        words.extend_from_slice(&self.command.to_words());
        words.extend_from_slice(&self.payload);
        words
    }

    /// parse a packet received on the fifo
    pub fn from_serdes(packet: SerdesPacket) -> Result<Self> {
        if !packet.header.kind.is_message()
            {return Err(Error::UnknownPacketKind(packet.header.kind as u8))}
        let words = packet.payload;
        if words.len() < TRANSPORT_WORDS + COMMAND_WORDS
            {return Err(Error::UnexpectedPayloadCount {expected: TRANSPORT_WORDS + COMMAND_WORDS, actual: words.len()})}
        let mut transport = [0; TRANSPORT_WORDS];
        transport.copy_from_slice(&words[.. TRANSPORT_WORDS]);
        let mut command = [0; COMMAND_WORDS];
        command.copy_from_slice(&words[TRANSPORT_WORDS ..][.. COMMAND_WORDS]);
        Ok(Self {
            serdes: packet.header,
            transport: TransportHeader::from_words(&transport),
            command: CommandHeader::from_words(&command),
            payload: words[TRANSPORT_WORDS + COMMAND_WORDS ..].to_vec(),
        })
    }
}
