/*!
    execution of received messages

    the receiver of a message looks its command code up and runs the matching [ModuleServices] operation. Two answering styles exist:

    - read style commands answer at once with a response message carrying the data, or the error status
    - commands marked by [CommandType::requires_finished] run their side effect, then report its status in a separate `REQUEST_FINISHED` message
*/

use core::fmt;
use log::*;

use crate::{
    address::SlotId,
    backplane::Backplane,
    clock::Clock,
    error::{Error, Result, result_to_status},
    message::{Message, MessageSet, CommandHeader},
    registers::RegisterSpace,
    serdes::{fifo::FifoIo, serve_register},
    };


/// command code of a message
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CommandType {
    ReadEeprom = 1,
    WriteEeprom = 2,
    EraseFlash = 3,
    ReadFlash = 4,
    WriteFlash = 5,
    AssignSlot = 6,
    RetrieveSlot = 7,
    ExitConfigMode = 8,
    ResetModule = 9,
    RequestFinished = 10,
    ConfigMicro = 11,
    GetMicro = 12,
    EraseMicro = 13,
    Debug = 14,
}
impl CommandType {
    /// whether the receiver answers with a `REQUEST_FINISHED` message instead of a response
    pub fn requires_finished(self) -> bool {
        matches!(self,
            Self::WriteEeprom
            | Self::EraseFlash
            | Self::WriteFlash
            | Self::ConfigMicro
            | Self::EraseMicro)
    }
    pub fn code(self) -> u32 {self as u32}
}
impl TryFrom<u32> for CommandType {
    type Error = Error;
    fn try_from(code: u32) -> Result<Self> {
        Ok(match code {
            1 => Self::ReadEeprom,
            2 => Self::WriteEeprom,
            3 => Self::EraseFlash,
            4 => Self::ReadFlash,
            5 => Self::WriteFlash,
            6 => Self::AssignSlot,
            7 => Self::RetrieveSlot,
            8 => Self::ExitConfigMode,
            9 => Self::ResetModule,
            10 => Self::RequestFinished,
            11 => Self::ConfigMicro,
            12 => Self::GetMicro,
            13 => Self::EraseMicro,
            14 => Self::Debug,
            other => return Err(Error::CommandNotRecognized(other)),
        })
    }
}
impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}


/// size and erase/program granularity of a flash device
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FlashGeometry {
    pub size: u32,
    pub page_size: u32,
    pub sector_size: u32,
}

/**
    local operations a module offers to the motherboard

    drivers of the eeprom, flash and microcontroller channels are external, this trait is where they plug in. Every operation defaults to [Error::CommandNotRecognized], a module only implements what it has.
*/
#[allow(unused_variables)]
pub trait ModuleServices {
    fn read_eeprom(&mut self, chip: u32, offset: u32, buffer: &mut [u8]) -> Result<()> {
        Err(Error::CommandNotRecognized(CommandType::ReadEeprom.code()))
    }
    fn write_eeprom(&mut self, chip: u32, offset: u32, data: &[u8]) -> Result<()> {
        Err(Error::CommandNotRecognized(CommandType::WriteEeprom.code()))
    }
    fn probe_flash(&mut self, device: u32) -> Result<FlashGeometry> {
        Err(Error::FlashProbe)
    }
    fn erase_flash(&mut self, device: u32, offset: u32, length: u32) -> Result<()> {
        Err(Error::CommandNotRecognized(CommandType::EraseFlash.code()))
    }
    /// program data that never crosses a page boundary
    fn write_flash(&mut self, device: u32, offset: u32, data: &[u8]) -> Result<()> {
        Err(Error::CommandNotRecognized(CommandType::WriteFlash.code()))
    }
    fn read_flash(&mut self, device: u32, offset: u32, buffer: &mut [u8]) -> Result<()> {
        Err(Error::CommandNotRecognized(CommandType::ReadFlash.code()))
    }
    /// load data in the ram block of a microcontroller channel
    fn configure_micro(&mut self, channel: u32, offset: u32, data: &[u8]) -> Result<()> {
        Err(Error::CommandNotRecognized(CommandType::ConfigMicro.code()))
    }
    fn read_micro(&mut self, channel: u32, offset: u32, buffer: &mut [u8]) -> Result<()> {
        Err(Error::CommandNotRecognized(CommandType::GetMicro.code()))
    }
    fn erase_micro(&mut self, channel: u32) -> Result<()> {
        Err(Error::CommandNotRecognized(CommandType::EraseMicro.code()))
    }
    fn assign_slot(&mut self, slot: SlotId) -> Result<()> {
        Err(Error::CommandNotRecognized(CommandType::AssignSlot.code()))
    }
    fn slot(&mut self) -> Result<SlotId> {
        Err(Error::CommandNotRecognized(CommandType::RetrieveSlot.code()))
    }
    fn exit_config_mode(&mut self) -> Result<()> {
        Err(Error::CommandNotRecognized(CommandType::ExitConfigMode.code()))
    }
    fn reset_module(&mut self) -> Result<()> {
        Err(Error::CommandNotRecognized(CommandType::ResetModule.code()))
    }
    /// answer a debug message, echo by default
    fn debug(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}


/// what executing a message produced
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// data or failure to send back in a response
    Reply(Result<Vec<u8>>),
    /// status to report in a `REQUEST_FINISHED` message
    Finished(Result<()>),
    /// a `REQUEST_FINISHED` message was received
    Completion {
        /// transaction id of the completed request
        transaction_id: u16,
        command: u32,
        status: i32,
    },
}

/**
    run the command of a message against local services

    fails only for unknown commands, which deserve no answer at all. Reads larger than `max_bytes` are refused with [Error::PayloadTooLarge].
*/
pub fn dispatch<S: ModuleServices + ?Sized>(message: &Message, services: &mut S, max_bytes: usize) -> Result<Outcome> {
    let header = message.command();
    let command = CommandType::try_from(header.command)
        .inspect_err(|_| warn!("{} sent unknown command {}", message.sender(), header.command))?;
    debug!("{} command {command} device {} address {:#x} length {}",
        message.sender(), header.device, header.address, header.length);
    let read_buffer = || -> Result<Vec<u8>> {
        let length = usize::try_from(header.length).map_err(|_| Error::PayloadTooLarge)?;
        if length > max_bytes
            {return Err(Error::PayloadTooLarge)}
        Ok(vec![0; length])
    };

    Ok(match command {
        CommandType::ReadEeprom => Outcome::Reply(read_buffer().and_then(|mut buffer| {
            services.read_eeprom(header.device, header.address, &mut buffer)?;
            Ok(buffer)
        })),
        CommandType::WriteEeprom => Outcome::Finished(
            services.write_eeprom(header.device, header.address, &message.payload())),
        CommandType::ReadFlash => Outcome::Reply(read_buffer().and_then(|mut buffer| {
            let geometry = probe_flash(services, header.device)?;
            check_bounds(&geometry, header.address, buffer.len())?;
            services.read_flash(header.device, header.address, &mut buffer)?;
            Ok(buffer)
        })),
        CommandType::WriteFlash => Outcome::Finished(
            write_flash(services, header.device, header.address, &message.payload())),
        CommandType::EraseFlash => Outcome::Finished(probe_flash(services, header.device)
            .and_then(|geometry| check_bounds(&geometry, header.address, header.length as usize))
            .and_then(|_| services.erase_flash(header.device, header.address, header.length))),
        CommandType::ConfigMicro => Outcome::Finished(
            services.configure_micro(header.device, header.address, &message.payload())),
        CommandType::GetMicro => Outcome::Reply(read_buffer().and_then(|mut buffer| {
            services.read_micro(header.device, header.address, &mut buffer)?;
            Ok(buffer)
        })),
        CommandType::EraseMicro => Outcome::Finished(services.erase_micro(header.device)),
        CommandType::AssignSlot => Outcome::Reply(u8::try_from(header.argument)
            .map_err(|_| Error::InvalidSlot(u8::MAX))
            .and_then(SlotId::new)
            .and_then(|slot| services.assign_slot(slot))
            .map(|_| Vec::new())),
        CommandType::RetrieveSlot => Outcome::Reply(services.slot()
            .map(|slot| u32::from(slot.id()).to_le_bytes().to_vec())),
        CommandType::ExitConfigMode => Outcome::Reply(services.exit_config_mode().map(|_| Vec::new())),
        CommandType::ResetModule => Outcome::Reply(services.reset_module().map(|_| Vec::new())),
        CommandType::Debug => Outcome::Reply(services.debug(&message.payload())),
        CommandType::RequestFinished => Outcome::Completion {
            transaction_id: header.argument as u16,
            command: header.finished_command,
            status: header.finished_status,
        },
    })
}

fn probe_flash<S: ModuleServices + ?Sized>(services: &mut S, device: u32) -> Result<FlashGeometry> {
    let geometry = services.probe_flash(device)
        .inspect_err(|error| error!("probing flash {device} failed: {error}"))
        .map_err(|_| Error::FlashProbe)?;
    if geometry.page_size == 0
        {return Err(Error::FlashProbe)}
    Ok(geometry)
}

fn check_bounds(geometry: &FlashGeometry, offset: u32, length: usize) -> Result<()> {
    let end = u64::from(offset) + length as u64;
    if end > u64::from(geometry.size)
        {return Err(Error::InvalidParameter("access runs past the end of the flash"))}
    Ok(())
}

/**
    program a whole received payload, one page at a time

    the flash is not erased here, the requester erases beforehand when needed. The first failing page ends the write, pages already written stay written.
*/
fn write_flash<S: ModuleServices + ?Sized>(services: &mut S, device: u32, offset: u32, data: &[u8]) -> Result<()> {
    let geometry = probe_flash(services, device)?;
    check_bounds(&geometry, offset, data.len())?;
    let page = geometry.page_size as usize;
    let mut written = 0;
    while written < data.len() {
        let address = offset as usize + written;
        let length = (page - address % page).min(data.len() - written);
        services.write_flash(device, address as u32, &data[written ..][.. length])
            .inspect_err(|error| error!("writing flash {device} at {address:#x} failed: {error}"))?;
        written += length;
    }
    Ok(())
}

/// `REQUEST_FINISHED` message reporting the status of `request`
pub fn finished_message(request: &Message, transaction_id: u16, status: i32) -> Result<Message> {
    let command = CommandHeader {
        command: CommandType::RequestFinished.code(),
        device: request.command().device,
        address: request.command().address,
        argument: u32::from(request.transaction_id()),
        finished_command: request.command().command,
        finished_status: status,
        ..Default::default()
    };
    Message::request(request.receiver(), request.sender(), transaction_id, command, &[])
}


/// module side of the message protocol
impl<I: FifoIo, C: Clock> Backplane<I, C> {
    /**
        execute a complete message received from `peer` and send what it calls for

        - a response carrying data or the failure status for read style commands
        - a `REQUEST_FINISHED` message for commands requiring one
        - nothing for a received `REQUEST_FINISHED`, its content is returned

        unknown commands fail with [Error::CommandNotRecognized] and cause no transmission
    */
    pub fn deal_with_msg<S: ModuleServices + ?Sized>(&self, peer: SlotId, message: &Message, services: &mut S) -> Result<Outcome> {
        if message.is_response() {
            warn!("{peer} unsolicited response to message {}", message.transaction_id());
            return Err(Error::ResponseMismatch);
        }
        let outcome = dispatch(message, services, self.config().max_message_bytes)?;
        match &outcome {
            Outcome::Reply(result) => {
                let payload = result.as_deref().unwrap_or_default();
                self.send_msg(&Message::response_to(message, result_to_status(result), payload)?)?;
            },
            Outcome::Finished(result) => {
                if let Err(error) = result
                    {warn!("command {} from {peer} failed: {error}", message.command().command);}
                let finished = finished_message(message, self.next_transaction_id(), result_to_status(result))?;
                self.send_msg(&finished)?;
            },
            Outcome::Completion {..} => {},
        }
        Ok(outcome)
    }

    /**
        serve at most one packet waiting from `peer`

        register requests are answered against `space`, message packets are reassembled in `set` and every message they complete is dealt with. Returns whether a packet was waiting.
    */
    pub fn service_once<R, S>(&self, peer: SlotId, set: &mut MessageSet, space: &mut R, services: &mut S) -> Result<bool>
    where
        R: RegisterSpace,
        S: ModuleServices + ?Sized,
    {
        let Some(packet) = self.try_receive_packet(peer)?
            else {return Ok(false)};
        if !packet.header.kind.is_message() {
            let response = serve_register(&packet, space);
            self.transmit_packet(peer, &response.header, &response.payload)?;
            return Ok(true);
        }
        if let Some(message) = self.accept_packet(packet, set)? {
            match self.deal_with_msg(peer, &message, services) {
                Ok(_) => {},
                // no answer for commands not understood
                Err(Error::CommandNotRecognized(code)) => debug!("{peer} command {code} left unanswered"),
                Err(error) => return Err(error),
            }
        }
        Ok(true)
    }
}
