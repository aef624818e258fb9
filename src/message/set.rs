use std::collections::HashMap;
use log::*;

use crate::error::{Error, Result};
use super::{Message, Packet};


/**
    messages being reassembled, by transaction id

    packets of different messages may interleave on the same fifo, each one goes to the message of its transaction id. A message leaves the set as soon as its last word arrived.
*/
#[derive(Debug)]
pub struct MessageSet {
    messages: HashMap<u16, Message>,
    limit: usize,
}

impl MessageSet {
    /// set holding at most `limit` incomplete messages
    pub fn new(limit: usize) -> Self {
        Self {messages: HashMap::new(), limit: limit.max(1)}
    }
    pub fn len(&self) -> usize {self.messages.len()}
    pub fn is_empty(&self) -> bool {self.messages.is_empty()}
    /// incomplete message with the given transaction id
    pub fn get(&self, transaction_id: u16) -> Option<&Message> {
        self.messages.get(&transaction_id)
    }

    /**
        add a received packet to its message

        returns the message if this packet completed it. A packet breaking the sequence of its message discards the whole message.
    */
    pub fn accept(&mut self, packet: Packet) -> Result<Option<Message>> {
        let id = packet.transport.transaction_id;
        let message = match self.messages.remove(&id) {
            Some(mut message) => {
                message.push(packet)?;
                message
            },
            None => {
                if self.messages.len() >= self.limit {
                    warn!("dropping packet of message {id}, {} messages already in flight", self.messages.len());
                    return Err(Error::TooManyMessages);
                }
                Message::start(packet)?
            },
        };
        trace!("message {id}: {} packets, {} words left", message.packets().len(), message.words_left());
        if message.is_complete()
            {return Ok(Some(message))}
        self.messages.insert(id, message);
        Ok(None)
    }

    /// forget all incomplete messages
    pub fn clear(&mut self) {
        if !self.messages.is_empty()
            {debug!("dropping {} incomplete messages", self.messages.len());}
        self.messages.clear();
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{address::SlotId, message::CommandHeader};

    fn message(id: u16, size: usize) -> Message {
        let payload: Vec<u8> = (0 .. size).map(|i| (i as u8) ^ (id as u8)).collect();
        Message::request(SlotId::new(3).unwrap(), SlotId::MOTHERBOARD, id, CommandHeader::new(4), &payload).unwrap()
    }

    #[test]
    fn interleaved_messages() {
        let one = message(1, 1200);
        let two = message(2, 1000);
        let mut set = MessageSet::new(4);
        assert_eq!(set.accept(one.packets()[0].clone()), Ok(None));
        assert_eq!(set.accept(two.packets()[0].clone()), Ok(None));
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(1).unwrap().words_left(), 64);

        let done = set.accept(two.packets()[1].clone()).unwrap().unwrap();
        assert_eq!(done.payload(), two.payload());
        let done = set.accept(one.packets()[1].clone()).unwrap().unwrap();
        assert_eq!(done.words_left(), 0);
        assert_eq!(done.packets().len(), 2);
        assert_eq!(done.payload(), one.payload());
        assert!(set.is_empty());
    }

    #[test]
    fn single_packet_completes_at_once() {
        let mut set = MessageSet::new(1);
        let small = message(9, 10);
        assert_eq!(set.accept(small.packets()[0].clone()), Ok(Some(small)));
        assert!(set.is_empty());
    }

    #[test]
    fn limit() {
        let mut set = MessageSet::new(1);
        set.accept(message(1, 1200).packets()[0].clone()).unwrap();
        assert_eq!(set.accept(message(2, 1200).packets()[0].clone()), Err(Error::TooManyMessages));
        set.clear();
        assert!(set.accept(message(2, 1200).packets()[0].clone()).is_ok());
    }

    #[test]
    fn broken_sequence_drops_the_message() {
        let mut set = MessageSet::new(2);
        let long = message(5, 2000);
        set.accept(long.packets()[0].clone()).unwrap();
        assert_eq!(set.accept(long.packets()[2].clone()), Err(Error::SequenceMismatch));
        assert!(set.get(5).is_none());
    }
}
