/*!
    motherboard side requests to module services

    each request is one or several messages to the module in a slot. Transfers larger than `max_message_bytes` are split in consecutive messages, each awaited before the next is sent: the first failure ends the transfer and leaves the chunks already done in place.
*/

use log::*;

use crate::{
    address::SlotId,
    backplane::Backplane,
    clock::Clock,
    dispatch::CommandType,
    error::{Error, Result, status_to_result},
    message::{Message, MessageSet, CommandHeader},
    serdes::fifo::FifoIo,
    };


impl<I: FifoIo, C: Clock> Backplane<I, C> {
    pub fn read_module_eeprom_request(&self, slot: SlotId, chip: u32, offset: u32, length: usize) -> Result<Vec<u8>> {
        self.read_chunks(slot, CommandType::ReadEeprom, chip, offset, length)
    }
    pub fn write_module_eeprom_request(&self, slot: SlotId, chip: u32, offset: u32, data: &[u8]) -> Result<()> {
        self.write_chunks(slot, CommandType::WriteEeprom, chip, offset, data)
    }

    pub fn read_module_flash_request(&self, slot: SlotId, device: u32, offset: u32, length: usize) -> Result<Vec<u8>> {
        self.read_chunks(slot, CommandType::ReadFlash, device, offset, length)
    }
    /// program flash, erasing it beforehand is up to the caller
    pub fn write_module_flash_request(&self, slot: SlotId, device: u32, offset: u32, data: &[u8]) -> Result<()> {
        self.write_chunks(slot, CommandType::WriteFlash, device, offset, data)
    }
    pub fn erase_module_flash_request(&self, slot: SlotId, device: u32, offset: u32, length: u32) -> Result<()> {
        let command = CommandHeader {
            command: CommandType::EraseFlash.code(),
            device,
            address: offset,
            length,
            ..Default::default()
        };
        self.request_finished(slot, command, &[])
    }

    /// load a microcontroller channel with firmware or configuration data
    pub fn config_micro_request(&self, slot: SlotId, channel: u32, offset: u32, data: &[u8]) -> Result<()> {
        self.write_chunks(slot, CommandType::ConfigMicro, channel, offset, data)
    }
    pub fn get_micro_request(&self, slot: SlotId, channel: u32, offset: u32, length: usize) -> Result<Vec<u8>> {
        self.read_chunks(slot, CommandType::GetMicro, channel, offset, length)
    }
    pub fn erase_micro_request(&self, slot: SlotId, channel: u32) -> Result<()> {
        let command = CommandHeader {
            command: CommandType::EraseMicro.code(),
            device: channel,
            ..Default::default()
        };
        self.request_finished(slot, command, &[])
    }

    /// give the module in `slot` its logical slot number
    pub fn assign_slot_number_request(&self, slot: SlotId, number: SlotId) -> Result<()> {
        let command = CommandHeader {
            command: CommandType::AssignSlot.code(),
            argument: u32::from(number.id()),
            ..Default::default()
        };
        self.request_reply(slot, command, &[])?;
        Ok(())
    }
    /// logical slot number the module in `slot` believes it has
    pub fn retrieve_slot_number_request(&self, slot: SlotId) -> Result<SlotId> {
        let reply = self.request_reply(slot, CommandHeader::new(CommandType::RetrieveSlot.code()), &[])?;
        let bytes: [u8; 4] = reply.as_slice().try_into()
            .map_err(|_| Error::UnexpectedPayloadCount {expected: 4, actual: reply.len()})?;
        SlotId::try_from(u32::from_le_bytes(bytes))
    }
    pub fn exit_config_mode_request(&self, slot: SlotId) -> Result<()> {
        self.request_reply(slot, CommandHeader::new(CommandType::ExitConfigMode.code()), &[])?;
        Ok(())
    }
    pub fn reset_module_request(&self, slot: SlotId) -> Result<()> {
        self.request_reply(slot, CommandHeader::new(CommandType::ResetModule.code()), &[])?;
        Ok(())
    }
    /// send bytes to the module debug handler, and get its answer
    pub fn debug_request(&self, slot: SlotId, data: &[u8]) -> Result<Vec<u8>> {
        let command = CommandHeader {
            command: CommandType::Debug.code(),
            length: u32::try_from(data.len()).map_err(|_| Error::PayloadTooLarge)?,
            ..Default::default()
        };
        self.request_reply(slot, command, data)
    }


    fn read_chunks(&self, slot: SlotId, command: CommandType, device: u32, offset: u32, length: usize) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(length);
        while data.len() < length {
            let size = (length - data.len()).min(self.config().max_message_bytes.max(1));
            let header = CommandHeader {
                command: command.code(),
                device,
                address: chunk_address(offset, data.len())?,
                length: size as u32,
                ..Default::default()
            };
            let chunk = self.request_reply(slot, header, &[])?;
            if chunk.len() != size {
                warn!("{slot} answered {} bytes out of {size}", chunk.len());
                return Err(Error::UnexpectedPayloadCount {expected: size, actual: chunk.len()});
            }
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }

    fn write_chunks(&self, slot: SlotId, command: CommandType, device: u32, offset: u32, data: &[u8]) -> Result<()> {
        let mut done = 0;
        for chunk in data.chunks(self.config().max_message_bytes.max(1)) {
            let header = CommandHeader {
                command: command.code(),
                device,
                address: chunk_address(offset, done)?,
                length: chunk.len() as u32,
                ..Default::default()
            };
            self.request_finished(slot, header, chunk)
                .inspect_err(|error| error!("{command} to {slot} failed after {done} bytes: {error}"))?;
            done += chunk.len();
        }
        Ok(())
    }

    /// send a read style request and wait for its response data
    fn request_reply(&self, slot: SlotId, command: CommandHeader, payload: &[u8]) -> Result<Vec<u8>> {
        let _guard = self.lock_slot(slot)?;
        let request = Message::request(self.local(), slot, self.next_transaction_id(), command, payload)?;
        self.send_packets(&request)?;
        let mut set = MessageSet::new(self.config().max_messages_in_flight);
        let response = self.await_msg(slot, &mut set, self.config().rx_ready_timeout, Error::RxFifoPktNotReadyTimeout,
            |message| message.is_response() && message.transaction_id() == request.transaction_id())?;
        response.result()?;
        Ok(response.payload())
    }

    /// send a request executed in the background and wait for its `REQUEST_FINISHED` message
    fn request_finished(&self, slot: SlotId, command: CommandHeader, payload: &[u8]) -> Result<()> {
        let _guard = self.lock_slot(slot)?;
        let mut request = Message::request(self.local(), slot, self.next_transaction_id(), command, payload)?;
        request.set_requires_finished(true);
        self.send_packets(&request)?;
        let mut set = MessageSet::new(self.config().max_messages_in_flight);
        let finished = self.await_msg(slot, &mut set, self.config().completion_timeout, Error::CompletionTimeout,
            |message| message.command().command == CommandType::RequestFinished.code()
                && message.command().argument == u32::from(request.transaction_id()))?;
        debug!("{slot} finished command {} with status {}", finished.command().finished_command, finished.command().finished_status);
        status_to_result(finished.command().finished_status)
    }
}

/// device offset of the chunk starting `done` bytes into a transfer
fn chunk_address(offset: u32, done: usize) -> Result<u32> {
    u32::try_from(done).ok()
        .and_then(|done| offset.checked_add(done))
        .ok_or(Error::InvalidParameter("transfer runs past the end of the device"))
}
