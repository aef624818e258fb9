/*!
    raw byte link between master and slave cpus

    the uart driver itself is external, anything implementing the blocking [embedded_io] traits will do. This layer only delimits frames: it waits for a start delimiter within the overall bound, then collects bytes until the end delimiter or until the line stays idle longer than the inter-byte timeout.
*/

use core::time::Duration;
use embedded_io::{Read, Write, ReadReady};
use log::*;

use crate::{
    clock::{Clock, millis},
    error::{Error, Result},
    frame::{FrameBuffer, SOF, EOF},
    };


/// byte transport to the other cpu, with frame delimitation on reception
pub struct UartLink<P, C> {
    port: P,
    clock: C,
    idle: Duration,
}

impl<P, C> UartLink<P, C>
where
    P: Read + Write + ReadReady,
    C: Clock,
{
    /// `idle` is the silence ending a frame whose end delimiter was lost
    pub fn new(port: P, clock: C, idle: Duration) -> Self {
        Self {port, clock, idle}
    }
    pub fn port(&mut self) -> &mut P {&mut self.port}
    pub fn clock(&self) -> &C {&self.clock}
    pub fn into_inner(self) -> P {self.port}

    /// send bytes as is
    pub fn transmit(&mut self, bytes: &[u8]) -> Result<()> {
        trace!("uart transmit {} bytes", bytes.len());
        self.port.write_all(bytes).map_err(io_error)?;
        self.port.flush().map_err(io_error)
    }

    /// discard whatever is waiting in the receiver
    pub fn drain(&mut self) -> Result<usize> {
        let mut dropped = 0;
        let mut byte = [0];
        while self.port.read_ready().map_err(io_error)? {
            dropped += self.port.read(&mut byte).map_err(io_error)?;
        }
        if dropped != 0
            {debug!("drained {dropped} stale bytes");}
        Ok(dropped)
    }

    /**
        receive one raw frame, delimiters included

        fails with [Error::NoResponse] if no start delimiter arrives within `bound`. Bytes preceding the start delimiter are dropped. The returned frame is not checked, see [crate::frame::decode]
    */
    pub fn receive_frame(&mut self, bound: Duration) -> Result<FrameBuffer> {
        let bound = millis(bound);
        let idle = millis(self.idle);
        let start = self.clock.now_ms();
        let mut frame = FrameBuffer::new();

        // catch up start of frame
        loop {
            if let Some(byte) = self.read_byte()? {
                if byte == SOF {
                    frame.push(byte).map_err(|_| Error::FrameLength)?;
                    break
                }
                trace!("dropping byte {byte:#04x} outside of frame");
            }
            else if self.clock.elapsed_ms(start) >= bound {
                return Err(Error::NoResponse);
            }
            else {
                self.clock.relax();
            }
        }

        // collect until end of frame or idle line
        let mut last = self.clock.now_ms();
        loop {
            if let Some(byte) = self.read_byte()? {
                last = self.clock.now_ms();
                if byte == EOF && frame.len() == 1 {
                    // back to back delimiters, the second one opens the frame
                    continue
                }
                frame.push(byte).map_err(|_| Error::FrameLength)?;
                if byte == EOF
                    {break}
            }
            else if self.clock.elapsed_ms(last) >= idle {
                debug!("uart line idle after {} bytes without end of frame", frame.len());
                break
            }
            else {
                self.clock.relax();
            }
        }
        Ok(frame)
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        if !self.port.read_ready().map_err(io_error)?
            {return Ok(None)}
        let mut byte = [0];
        match self.port.read(&mut byte).map_err(io_error)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }
}

fn io_error<E: embedded_io::Error>(error: E) -> Error {
    warn!("uart error: {:?}", error.kind());
    Error::Io
}
