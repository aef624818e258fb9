use log::*;

use crate::{
    error::{Error, Result, result_to_status},
    registers::{RegisterSpace, Width, lane_mask},
    };
use super::header::{SerdesHeader, SerdesPacket, MAX_PAYLOAD_WORDS};


/**
    answer a register request against a register space

    the request is checked the same way the requester checks it, so a misbehaving requester gets an error status instead of a corrupted register. The response carries the status word: 0, or the code of the first error met. Block writes failing midway leave the words already written in place.
*/
pub fn serve_register<R: RegisterSpace>(request: &SerdesPacket, space: &mut R) -> SerdesPacket {
    let mut values = Vec::new();
    let result = execute(request, space, &mut values);
    if let Err(error) = result {
        warn!("refusing {:?} at {:#x} from {}: {error}", request.header.kind, request.header.address, request.header.requester);
        values.clear();
    }
    SerdesPacket {
        header: request.header.response(result_to_status(&result)),
        payload: values,
    }
}

fn execute<R: RegisterSpace>(request: &SerdesPacket, space: &mut R, values: &mut Vec<u32>) -> Result<()> {
    let header = &request.header;
    let width = header.kind.width().ok_or(Error::UnknownPacketKind(header.kind as u8))?;
    if header.ack
        {return Err(Error::InvalidParameter("completer does not accept responses"))}
    let offset = header.offset()?;
    if offset % 4 != 0
        {return Err(Error::MisalignedAddress)}
    match (width, header.byte_enable) {
        (Width::U32, 0b1111) | (Width::U16, 0b0011 | 0b1100) => {},
        (Width::U16, _) => return Err(Error::MisalignedByteEnable),
        _ => return Err(Error::MisalignedAddress),
    }
    if header.stride % 4 != 0
        {return Err(Error::StrideCausesMisalignment)}
    let count = usize::from(header.payload_length);
    if count == 0 || count > MAX_PAYLOAD_WORDS
        {return Err(Error::PayloadTooLarge)}
    if header.kind.is_write() && request.payload.len() != count
        {return Err(Error::UnexpectedPayloadCount {expected: count, actual: request.payload.len()})}

    let mask = lane_mask(header.byte_enable);
    for index in 0 .. count {
        let address = u32::try_from(index)
            .ok()
            .and_then(|index| index.checked_mul(header.stride))
            .and_then(|distance| offset.checked_add(distance))
            .ok_or(Error::RegisterOutOfRange(offset))?;
        if header.kind.is_write()
            {space.write_masked(address, header.byte_enable, request.payload[index])?;}
        else
            {values.push(space.read32(address)? & mask);}
    }
    Ok(())
}
