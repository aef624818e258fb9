/*!
    messages: commands with payloads too large for one packet

    a [Message] is cut in packets of at most [PACKET_CAPACITY] payload words. Every packet repeats the transport and command headers, so the receiver can start a message from its first packet and reassemble interleaved messages by transaction id, see [MessageSet].

    The crc-32 of a message is computed once when it is built and copied in all its packets. It covers

    - the requester id of the route word, the completer being masked
    - the command header
    - the payload bytes

    sequence and ack bits, the direction flag and per packet lengths are left out.
*/

/// packet layout
mod packet;
/// reassembly of interleaved messages
mod set;
/// sending and receiving messages on the fifo fabric
mod transport;

pub use packet::*;
pub use set::MessageSet;


use log::*;

use crate::{
    address::SlotId,
    error::{Error, Result, status_to_result},
    serdes::{SerdesHeader, PacketKind, RouteWord},
    utils::{bytes_to_words, words_to_bytes, words_for, crc32},
    };


/// a command with its payload, as a sequence of packets
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// in sequence order, at least one
    packets: Vec<Packet>,
    /// payload words not received yet
    words_left: usize,
}

impl Message {
    /**
        build a request from `sender` to `receiver`

        `command.length` is left to the caller: it is the requested size for reads and the payload size for writes
    */
    pub fn request(sender: SlotId, receiver: SlotId, transaction_id: u16, command: CommandHeader, payload: &[u8]) -> Result<Self> {
        Self::build(sender, receiver, TransportHeader {transaction_id, ..Default::default()}, command, payload)
    }

    /// build the response to a request, reporting `status` along the data
    pub fn response_to(request: &Message, status: i32, payload: &[u8]) -> Result<Self> {
        let command = CommandHeader {
            length: u32::try_from(payload.len()).map_err(|_| Error::PayloadTooLarge)?,
            ..*request.command()
        };
        let transport = TransportHeader {
            transaction_id: request.transaction_id(),
            response: true,
            status,
            ..Default::default()
        };
        Self::build(request.receiver(), request.sender(), transport, command, payload)
    }

    fn build(sender: SlotId, receiver: SlotId, transport: TransportHeader, command: CommandHeader, payload: &[u8]) -> Result<Self> {
        let words = bytes_to_words(payload);
        let expected = words.len().div_ceil(PACKET_CAPACITY).max(1);
        let expected_count = u16::try_from(expected).map_err(|_| Error::PayloadTooLarge)?;
        let total_words = u32::try_from(words.len()).map_err(|_| Error::PayloadTooLarge)?;
        let total_bytes = u32::try_from(payload.len()).map_err(|_| Error::PayloadTooLarge)?;
        let serdes = SerdesHeader::request(PacketKind::Message, sender, receiver);
        let crc = message_crc(&serdes, &command, payload);

        // an empty message still takes one packet
        let chunks: Vec<&[u32]> = if words.is_empty()
            {vec![&words[..]]}
        else
            {words.chunks(PACKET_CAPACITY).collect()};

        let mut packets = Vec::with_capacity(expected);
        for (index, chunk) in chunks.into_iter().enumerate() {
            let mut serdes = serdes.with_sequence(index + 1);
            serdes.payload_length = (TRANSPORT_WORDS + COMMAND_WORDS + chunk.len()) as u8;
            packets.push(Packet {
                serdes,
                transport: TransportHeader {
                    sequence_num: index as u16 + 1,
                    expected_count,
                    total_words,
                    total_bytes,
                    crc,
                    ..transport
                },
                command,
                payload: chunk.to_vec(),
            });
        }
        Ok(Self {packets, words_left: 0})
    }

    /// start reassembling a message from its first packet
    pub fn start(packet: Packet) -> Result<Self> {
        if packet.transport.sequence_num != 1 || packet.transport.expected_count == 0
            {return Err(Error::SequenceMismatch)}
        let words_left = usize::try_from(packet.transport.total_words)
            .map_err(|_| Error::PayloadTooLarge)?
            .saturating_sub(packet.payload.len());
        Ok(Self {packets: vec![packet], words_left})
    }

    /**
        append the next packet of a message being reassembled

        the packet must follow the last one and agree with it on everything the message shares
    */
    pub fn push(&mut self, packet: Packet) -> Result<()> {
        let last = self.last();
        let consistent = packet.transport.sequence_num == last.transport.sequence_num.wrapping_add(1)
            && packet.transport.sequence_num <= last.transport.expected_count
            && packet.transport.transaction_id == last.transport.transaction_id
            && packet.transport.expected_count == last.transport.expected_count
            && packet.transport.total_words == last.transport.total_words
            && packet.transport.total_bytes == last.transport.total_bytes
            && packet.transport.crc == last.transport.crc;
        if !consistent {
            warn!("packet {} of message {} does not follow packet {}",
                packet.transport.sequence_num, last.transport.transaction_id, last.transport.sequence_num);
            return Err(Error::SequenceMismatch);
        }
        self.words_left = self.words_left.saturating_sub(packet.payload.len());
        self.packets.push(packet);
        Ok(())
    }

    fn first(&self) -> &Packet {&self.packets[0]}
    fn last(&self) -> &Packet {&self.packets[self.packets.len() - 1]}

    pub fn packets(&self) -> &[Packet] {&self.packets}
    pub fn words_left(&self) -> usize {self.words_left}
    pub fn is_complete(&self) -> bool {self.words_left == 0}
    pub fn transaction_id(&self) -> u16 {self.first().transport.transaction_id}
    pub fn command(&self) -> &CommandHeader {&self.first().command}
    pub fn is_response(&self) -> bool {self.first().transport.response}
    pub fn requires_finished(&self) -> bool {self.first().transport.requires_finished}
    pub fn status(&self) -> i32 {self.first().transport.status}
    /// status of a response as a result
    pub fn result(&self) -> Result<()> {status_to_result(self.status())}
    pub fn expected_sequence_count(&self) -> u16 {self.first().transport.expected_count}
    pub fn sender(&self) -> SlotId {self.first().serdes.requester}
    pub fn receiver(&self) -> SlotId {self.first().serdes.completer}
    /// crc carried by the packets
    pub fn crc(&self) -> u32 {self.first().transport.crc}

    /// announce that the receiver will send a `REQUEST_FINISHED` message once done
    pub fn set_requires_finished(&mut self, requires: bool) {
        for packet in &mut self.packets {
            packet.transport.requires_finished = requires;
        }
    }

    /// payload words received so far
    pub fn payload_words(&self) -> impl Iterator<Item=u32> + '_ {
        self.packets.iter().flat_map(|packet| packet.payload.iter().copied())
    }
    /// payload bytes received so far, at most the announced size
    pub fn payload(&self) -> Vec<u8> {
        let words: Vec<u32> = self.payload_words().collect();
        let length = usize::try_from(self.first().transport.total_bytes).unwrap_or(usize::MAX);
        words_to_bytes(&words, length.min(4 * words.len()))
    }

    /// crc of the received content, to compare with [Self::crc]
    pub fn computed_crc(&self) -> u32 {
        message_crc(&self.first().serdes, self.command(), &self.payload())
    }
    /// check the received content against the crc its packets carry
    pub fn verify_crc(&self) -> Result<()> {
        let (carried, computed) = (self.crc(), self.computed_crc());
        if carried != computed {
            warn!("message {} from {} is corrupted", self.transaction_id(), self.sender());
            return Err(Error::MessageCrcMismatch {carried, computed});
        }
        Ok(())
    }
}

fn message_crc(serdes: &SerdesHeader, command: &CommandHeader, payload: &[u8]) -> u32 {
    let route = u32::from(RouteWord::between(serdes.requester, SlotId::MOTHERBOARD)).to_le_bytes();
    let command: Vec<u8> = command.to_words().iter().flat_map(|word| word.to_le_bytes()).collect();
    crc32([route.as_slice(), command.as_slice(), payload])
}

/// number of packets a payload of `bytes` is cut into
pub fn expected_sequence_count(bytes: usize) -> usize {
    words_for(bytes).div_ceil(PACKET_CAPACITY).max(1)
}
