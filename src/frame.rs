/*!
    HDLC style framing of the master/slave uart link

    ```text
    [SOF] stuffed(payload ++ crc16) [EOF]
    ```

    SOF and EOF are both `0x7E`. Any `0x7E` or `0x7D` inside the frame is sent as `0x7D` followed by the byte xored with `0x20`. The CRC-16/CCITT covers the payload before stuffing and is sent most significant byte first.
*/

use log::*;

use crate::error::{Error, Result};
use crate::utils::crc16_ccitt;


/// start of frame delimiter
pub const SOF: u8 = 0x7E;
/// end of frame delimiter, same value as [SOF]
pub const EOF: u8 = 0x7E;
/// escape marker
pub const ESC: u8 = 0x7D;
/// value xored with an escaped byte
pub const ESC_XOR: u8 = 0x20;

/// largest payload carried by one frame
pub const MAX_PAYLOAD: usize = 512;
const CRC_LEN: usize = 2;
/// largest frame on the wire: delimiters plus every byte escaped
pub const MAX_FRAME: usize = 2 + 2 * (MAX_PAYLOAD + CRC_LEN);
/// smallest frame on the wire: delimiters, one payload byte and the crc
pub const MIN_FRAME: usize = 2 + 1 + CRC_LEN;

/// buffer holding one encoded frame
pub type FrameBuffer = heapless::Vec<u8, MAX_FRAME>;
/// buffer holding one decoded payload
pub type PayloadBuffer = heapless::Vec<u8, MAX_PAYLOAD>;


/// frame `payload` for the wire
pub fn encode(payload: &[u8]) -> Result<FrameBuffer> {
    if payload.is_empty() || payload.len() > MAX_PAYLOAD
        {return Err(Error::FrameLength)}

    let crc = crc16_ccitt(payload).to_be_bytes();
    let mut frame = FrameBuffer::new();
    push(&mut frame, SOF)?;
    for &byte in payload.iter().chain(crc.iter()) {
        if byte == SOF || byte == ESC {
            push(&mut frame, ESC)?;
            push(&mut frame, byte ^ ESC_XOR)?;
        }
        else {
            push(&mut frame, byte)?;
        }
    }
    push(&mut frame, EOF)?;
    Ok(frame)
}

/**
    recover the payload of a frame received from the wire

    callers of the link never see the cause: a frame failing here is handled as no response at all
*/
pub fn decode(frame: &[u8]) -> Result<PayloadBuffer> {
    if frame.len() < MIN_FRAME || frame.len() > MAX_FRAME
        {return Err(Error::FrameLength)}
    if frame[0] != SOF || frame[frame.len()-1] != EOF
        {return Err(Error::MissingDelimiter)}

    // unstuff payload and crc together
    let mut content = heapless::Vec::<u8, {MAX_PAYLOAD + CRC_LEN}>::new();
    let mut escaped = false;
    for &byte in &frame[1 .. frame.len()-1] {
        let byte = if escaped {
            escaped = false;
            byte ^ ESC_XOR
        }
        else if byte == ESC {
            escaped = true;
            continue
        }
        else if byte == SOF {
            // a delimiter can only appear escaped inside a frame
            return Err(Error::MissingDelimiter);
        }
        else {byte};
        content.push(byte).map_err(|_| Error::FrameLength)?;
    }
    if escaped
        {return Err(Error::DanglingEscape)}
    if content.len() <= CRC_LEN
        {return Err(Error::FrameLength)}

    let (payload, crc) = content.split_at(content.len() - CRC_LEN);
    let carried = u16::from_be_bytes([crc[0], crc[1]]);
    let computed = crc16_ccitt(payload);
    if carried != computed {
        debug!("frame crc mismatch: carried {carried:#06x}, computed {computed:#06x}");
        return Err(Error::FrameCrc);
    }
    PayloadBuffer::from_slice(payload).map_err(|_| Error::FrameLength)
}

fn push(frame: &mut FrameBuffer, byte: u8) -> Result<()> {
    frame.push(byte).map_err(|_| Error::FrameLength)
}
