use log::*;

use crate::{
    address::SlotId,
    backplane::Backplane,
    clock::{Clock, poll_until},
    error::{Error, Result},
    };
use super::{
    fifo::{Fifo, FifoIo},
    header::{SerdesHeader, SerdesPacket, ControlWord, HEADER_WORDS, MAX_PAYLOAD_WORDS},
    };


impl<I: FifoIo, C: Clock> Backplane<I, C> {
    /**
        send one packet to `peer`

        waits for the transmit fifo to drain (bounded by `tx_empty_timeout`), pushes the header and payload words, then hands the packet to the hardware. Does not wait for any answer.
    */
    pub fn transmit_packet(&self, peer: SlotId, header: &SerdesHeader, payload: &[u32]) -> Result<()> {
        if payload.len() > MAX_PAYLOAD_WORDS
            {return Err(Error::PayloadTooLarge)}
        if payload.len() != header.wire_words()
            {return Err(Error::UnexpectedPayloadCount {expected: header.wire_words(), actual: payload.len()})}
        let fifo = self.fifo(peer);
        poll_until(self.clock(), self.config().tx_empty_timeout, Error::TxFifoNotEmptyTimeout, ||
            Ok(fifo.tx_empty()?.then_some(())))
            .inspect_err(|_| warn!("{peer} transmit fifo stays busy"))?;
        debug!("{peer} <- {:?} {} words", header.kind, payload.len());
        for word in header.to_words() {
            fifo.push(word)?;
        }
        for &word in payload {
            fifo.push(word)?;
        }
        fifo.packet_ready()
    }

    /// wait up to `rx_ready_timeout` for the next packet from `peer`
    pub fn receive_packet(&self, peer: SlotId) -> Result<SerdesPacket> {
        let fifo = self.fifo(peer);
        poll_until(self.clock(), self.config().rx_ready_timeout, Error::RxFifoPktNotReadyTimeout, ||
            Ok(fifo.rx_ready()?.then_some(())))
            .inspect_err(|_| debug!("{peer} sent nothing"))?;
        pop_packet(&fifo)
    }

    /// take the next packet from `peer` if one is already waiting
    pub fn try_receive_packet(&self, peer: SlotId) -> Result<Option<SerdesPacket>> {
        let fifo = self.fifo(peer);
        if !fifo.rx_ready()?
            {return Ok(None)}
        pop_packet(&fifo).map(Some)
    }
}

/**
    read the packet signaled ready: header first, then exactly as many words as it announces

    the packet is released even when its header cannot be parsed, so that the next one can come
*/
fn pop_packet<I: FifoIo>(fifo: &Fifo<'_, I>) -> Result<SerdesPacket> {
    let mut words = [0; HEADER_WORDS];
    for word in words.iter_mut() {
        *word = fifo.pop()?;
    }
    let header = match SerdesHeader::from_words(&words) {
        Ok(header) => header,
        Err(error) => {
            let length = ControlWord::from(words[0]).payload_length();
            warn!("{} dropping malformed packet: {error}", fifo.peer());
            for _ in 0 .. length {
                fifo.pop()?;
            }
            fifo.packet_done()?;
            return Err(error);
        },
    };
    let payload = (0 .. header.wire_words())
        .map(|_| fifo.pop())
        .collect::<Result<Vec<_>>>()?;
    fifo.packet_done()?;
    debug!("{} -> {:?} {} words", fifo.peer(), header.kind, payload.len());
    Ok(SerdesPacket {header, payload})
}
