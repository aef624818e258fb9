/*!
    slave side of the uart link

    the slave cpu answers master commands against its own register memory. Frames that fail to decode and commands that cannot be executed get no answer: the master then runs into its response timeout.
*/

use core::time::Duration;
use embedded_io::{Read, Write, ReadReady};
use log::*;

use crate::{
    clock::Clock,
    command::{Command, Opcode},
    error::{Error, Result},
    frame::{self, FrameBuffer},
    registers::{RegisterSpace, Width},
    uart::UartLink,
    };


/// executes master commands against a register space
pub struct SlaveResponder<R> {
    registers: R,
    /// commands answered since creation
    served: u32,
}

impl<R: RegisterSpace> SlaveResponder<R> {
    pub fn new(registers: R) -> Self {
        Self {registers, served: 0}
    }
    pub fn registers(&mut self) -> &mut R {&mut self.registers}
    pub fn into_registers(self) -> R {self.registers}
    pub fn served(&self) -> u32 {self.served}

    /// answer one received frame, `None` if it deserves no answer
    pub fn respond(&mut self, raw: &[u8]) -> Option<FrameBuffer> {
        let command = match frame::decode(raw).and_then(|payload| Command::decode(&payload)) {
            Ok(command) => command,
            Err(error) => {
                debug!("ignoring frame from master: {error}");
                return None;
            },
        };
        let response = match self.execute(&command) {
            Ok(response) => response,
            Err(error) => {
                warn!("cannot execute {:?}: {error}", command.opcode());
                return None;
            },
        };
        match response.encode().and_then(|payload| frame::encode(&payload)) {
            Ok(frame) => {
                self.served = self.served.wrapping_add(1);
                Some(frame)
            },
            Err(error) => {
                warn!("cannot encode response to {:?}: {error}", command.opcode());
                None
            },
        }
    }

    /// run one command, producing its answer
    pub fn execute(&mut self, command: &Command) -> Result<Command> {
        match command {
            Command::Echo(data) => Ok(Command::Echo(data.clone())),
            &Command::Read {address, width, count} => {
                let values = (0 .. u32::from(count))
                    .map(|i| self.registers.read(lane(address, width, i)?, width))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Command::ReadResponse {address, width, values})
            },
            Command::Write {address, width, values} => {
                for (i, &value) in (0 ..).zip(values) {
                    self.registers.write(lane(*address, *width, i)?, *width, value)?;
                }
                Ok(Command::Ack {
                    answers: Opcode::Write,
                    address: *address,
                    width: *width,
                    count: u16::try_from(values.len()).map_err(|_| Error::PayloadTooLarge)?,
                    })
            },
            &Command::SetClear {address, width, mask, value} => {
                let current = self.registers.read(address, width)?;
                self.registers.write(address, width, (current & !mask) | (value & mask))?;
                Ok(Command::Ack {answers: Opcode::SetClear, address, width, count: 1})
            },
            Command::ReadResponse {..} | Command::Ack {..} =>
                Err(Error::InvalidParameter("slave does not accept responses")),
        }
    }

    /**
        receive one frame from the master within `bound` and answer it

        returns whether an answer was sent
    */
    pub fn serve<P, C>(&mut self, link: &mut UartLink<P, C>, bound: Duration) -> Result<bool>
    where
        P: Read + Write + ReadReady,
        C: Clock,
    {
        let raw = link.receive_frame(bound)?;
        match self.respond(&raw) {
            Some(frame) => {
                link.transmit(&frame)?;
                Ok(true)
            },
            None => Ok(false),
        }
    }
}

/// address of the `index`-th value of a consecutive access
fn lane(address: u32, width: Width, index: u32) -> Result<u32> {
    index.checked_mul(width.bytes() as u32)
        .and_then(|offset| address.checked_add(offset))
        .ok_or(Error::InvalidParameter("access runs past the end of the address space"))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::MemoryRegisters;

    fn responder() -> SlaveResponder<MemoryRegisters> {
        SlaveResponder::new(MemoryRegisters::new(0x100))
    }

    fn exchange(responder: &mut SlaveResponder<MemoryRegisters>, command: Command) -> Option<Command> {
        let frame = frame::encode(&command.encode().unwrap()).unwrap();
        responder.respond(&frame)
            .map(|raw| Command::decode(&frame::decode(&raw).unwrap()).unwrap())
    }

    #[test]
    fn write_then_read() {
        let mut responder = responder();
        let write = Command::Write {address: 0x10, width: Width::U16, values: vec![0x1111, 0x2222, 0x3333]};
        let ack = exchange(&mut responder, write.clone()).unwrap();
        assert!(ack.answers(&write));
        assert_eq!(responder.registers().read32(0x10).unwrap(), 0x2222_1111);

        let read = Command::Read {address: 0x12, width: Width::U16, count: 2};
        let response = exchange(&mut responder, read.clone()).unwrap();
        assert!(response.answers(&read));
        assert_eq!(response, Command::ReadResponse {address: 0x12, width: Width::U16, values: vec![0x2222, 0x3333]});
        assert_eq!(responder.served(), 2);
    }

    #[test]
    fn set_clear_masks() {
        let mut responder = responder();
        responder.registers().write32(0x20, 0xFFFF_00FF).unwrap();
        exchange(&mut responder, Command::SetClear {address: 0x20, width: Width::U32, mask: 0x0000_FFF0, value: 0x1234_5670}).unwrap();
        assert_eq!(responder.registers().read32(0x20).unwrap(), 0xFFFF_567F);
    }

    #[test]
    fn failures_are_silent() {
        let mut responder = responder();
        // out of range
        assert!(exchange(&mut responder, Command::Read {address: 0x1000, width: Width::U32, count: 1}).is_none());
        // corrupted frame
        let mut frame = frame::encode(&Command::Echo(vec![1, 2, 3]).encode().unwrap()).unwrap();
        frame[3] ^= 0x40;
        assert!(responder.respond(&frame).is_none());
        assert_eq!(responder.served(), 0);
    }
}
