use core::time::Duration;
use log::*;

use crate::{
    address::SlotId,
    backplane::Backplane,
    clock::{Clock, poll_until},
    error::{Error, Result},
    serdes::{SerdesPacket, fifo::FifoIo},
    };
use super::{Message, MessageSet, Packet};


/// sending and receiving messages, on both sides of the fabric
impl<I: FifoIo, C: Clock> Backplane<I, C> {
    /**
        send all packets of a message to its receiver, in sequence order

        packets are sent back to back, nothing is awaited besides the transmit fifo draining before each one
    */
    pub fn send_msg(&self, message: &Message) -> Result<()> {
        let _guard = self.lock_slot(message.receiver())?;
        self.send_packets(message)
    }

    /// [Self::send_msg] for callers already holding the slot lock
    pub(crate) fn send_packets(&self, message: &Message) -> Result<()> {
        debug!("{} <- message {} command {} in {} packets",
            message.receiver(), message.transaction_id(), message.command().command, message.packets().len());
        for packet in message.packets() {
            self.transmit_packet(message.receiver(), &packet.serdes, &packet.to_words())?;
        }
        Ok(())
    }

    /**
        wait for the next packet from `peer` and add it to its message

        returns the message it completed, if any. Register packets arriving here are dropped.
    */
    pub fn receive_msg_packet(&self, peer: SlotId, set: &mut MessageSet) -> Result<Option<Message>> {
        let packet = self.receive_packet(peer)?;
        self.accept_packet(packet, set)
    }

    /// wait for packets from `peer` until one completes a message
    pub fn receive_msg(&self, peer: SlotId, set: &mut MessageSet) -> Result<Message> {
        loop {
            if let Some(message) = self.receive_msg_packet(peer, set)?
                {return Ok(message)}
        }
    }

    /**
        poll `peer` until a message satisfying `wanted` completes, or `bound` expires with `timeout`

        other messages completing in the meantime are dropped. So are packets that cannot join any message, a leftover of an earlier exchange for instance: only a crc failure of the wanted message itself ends the wait early.
    */
    pub fn await_msg(
        &self,
        peer: SlotId,
        set: &mut MessageSet,
        bound: Duration,
        timeout: Error,
        mut wanted: impl FnMut(&Message) -> bool,
    ) -> Result<Message> {
        poll_until(self.clock(), bound, timeout, || {
            let Some(packet) = self.try_receive_packet(peer)?
                else {return Ok(None)};
            let message = match self.reassemble(packet, set) {
                Ok(Some(message)) => message,
                Ok(None) => return Ok(None),
                Err(error) => {
                    warn!("{peer} dropping packet while awaiting a message: {error}");
                    return Ok(None);
                },
            };
            if !wanted(&message) {
                warn!("{peer} ignoring message {} command {}", message.transaction_id(), message.command().command);
                return Ok(None);
            }
            self.check_crc(&message)?;
            Ok(Some(message))
        })
    }

    /// add a packet to its message, checking the crc of completed messages when configured
    pub(crate) fn accept_packet(&self, packet: SerdesPacket, set: &mut MessageSet) -> Result<Option<Message>> {
        let Some(message) = self.reassemble(packet, set)?
            else {return Ok(None)};
        self.check_crc(&message)?;
        Ok(Some(message))
    }

    /// add a packet to its message, returning the message once complete
    fn reassemble(&self, packet: SerdesPacket, set: &mut MessageSet) -> Result<Option<Message>> {
        if !packet.header.kind.is_message() {
            warn!("{} unexpected {:?} packet among messages", packet.header.requester, packet.header.kind);
            return Ok(None);
        }
        let Some(message) = set.accept(Packet::from_serdes(packet)?)?
            else {return Ok(None)};
        debug!("{} -> message {} command {} complete",
            message.sender(), message.transaction_id(), message.command().command);
        Ok(Some(message))
    }

    fn check_crc(&self, message: &Message) -> Result<()> {
        if self.config().verify_message_crc
            {message.verify_crc()?;}
        Ok(())
    }
}
