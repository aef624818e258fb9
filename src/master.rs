/*!
    master side of the uart link to the slave cpu

    exchanges are strictly one at a time: frame and send a command, then wait up to the response bound for a frame answering it. Frames failing to decode and answers not echoing the request are all reported as [Error::NoResponse] or [Error::ResponseMismatch], never retried here.
*/

use core::time::Duration;
use embedded_io::{Read, Write, ReadReady};
use log::*;

use crate::{
    clock::Clock,
    command::Command,
    config::Config,
    error::{Error, Result},
    frame,
    registers::Width,
    uart::UartLink,
    };


/// master end of the link to the slave cpu
pub struct SlaveLink<P, C> {
    link: UartLink<P, C>,
    timeout: Duration,
}

impl<P, C> SlaveLink<P, C>
where
    P: Read + Write + ReadReady,
    C: Clock,
{
    pub fn new(port: P, clock: C, config: &Config) -> Self {
        Self {
            link: UartLink::new(port, clock, config.uart_idle_timeout),
            timeout: config.slave_response_timeout,
        }
    }
    pub fn link(&mut self) -> &mut UartLink<P, C> {&mut self.link}

    /// check the slave is alive: it must send `data` back unchanged
    pub fn echo(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        match self.request(&Command::Echo(data.to_vec()))? {
            Command::Echo(data) => Ok(data),
            _ => Err(Error::ResponseMismatch),
        }
    }
    /// read `count` consecutive registers of `width` bytes starting at `address`
    pub fn read(&mut self, address: u32, width: Width, count: u16) -> Result<Vec<u32>> {
        match self.request(&Command::Read {address, width, count})? {
            Command::ReadResponse {values, ..} => Ok(values),
            _ => Err(Error::ResponseMismatch),
        }
    }
    /// write consecutive registers of `width` bytes starting at `address`
    pub fn write(&mut self, address: u32, width: Width, values: &[u32]) -> Result<()> {
        self.request(&Command::Write {address, width, values: values.to_vec()})?;
        Ok(())
    }
    /// clear the bits of `mask` in a register, then set those of `value & mask`
    pub fn set_clear(&mut self, address: u32, width: Width, mask: u32, value: u32) -> Result<()> {
        self.request(&Command::SetClear {address, width, mask, value})?;
        Ok(())
    }

    /// frame and send a command without waiting for anything
    pub fn transmit(&mut self, command: &Command) -> Result<()> {
        let frame = frame::encode(&command.encode()?)?;
        self.link.transmit(&frame)
    }
    /**
        wait for the next command from the slave

        any frame failing to arrive whole or to decode counts as no frame at all
    */
    pub fn receive(&mut self) -> Result<Command> {
        let raw = self.link.receive_frame(self.timeout)
            .map_err(|error| match error {
                Error::Io | Error::NoResponse => error,
                other => {
                    warn!("dropping frame from slave: {other}");
                    Error::NoResponse
                },
            })?;
        let payload = frame::decode(&raw)
            .inspect_err(|error| warn!("dropping frame from slave: {error}"))
            .map_err(|_| Error::NoResponse)?;
        Command::decode(&payload)
            .inspect_err(|error| warn!("dropping command from slave: {error}"))
            .map_err(|_| Error::NoResponse)
    }

    fn request(&mut self, command: &Command) -> Result<Command> {
        // forget leftovers of a previous exchange that timed out
        self.link.drain()?;
        debug!("slave request {:?}", command.opcode());
        self.transmit(command)?;
        let response = self.receive()?;
        if !response.answers(command) {
            warn!("slave response {:?} does not answer {:?}", response.opcode(), command.opcode());
            return Err(Error::ResponseMismatch);
        }
        Ok(response)
    }
}
