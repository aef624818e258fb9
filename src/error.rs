/*!
    error taxonomy shared by every layer of the fabric

    each variant maps to a stable negative status code, so that a failure detected on one CPU can travel in a packet header or a `REQUEST_FINISHED` message and be rebuilt on the other side
*/

use thiserror::Error;


/// error regarding slotlink communication
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // transport timeouts, never retried here
    #[error("transmit fifo did not drain in time")]
    TxFifoNotEmptyTimeout,
    #[error("receive fifo packet not ready in time")]
    RxFifoPktNotReadyTimeout,
    #[error("modules did not report their base address in time")]
    DetectModulesTimeout,
    #[error("no completion message arrived in time")]
    CompletionTimeout,
    #[error("no valid response from slave cpu")]
    NoResponse,

    // validation
    #[error("address is not aligned on a 32 bit word")]
    MisalignedAddress,
    #[error("address does not select a valid 16 bit byte lane")]
    MisalignedByteEnable,
    #[error("stride is not a multiple of 4 bytes")]
    StrideCausesMisalignment,
    #[error("slot id {0} is invalid")]
    InvalidSlot(u8),
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
    #[error("expected {expected} payload words but got {actual}")]
    UnexpectedPayloadCount { expected: usize, actual: usize },
    #[error("payload exceeds what a single exchange can carry")]
    PayloadTooLarge,
    #[error("response does not match the request")]
    ResponseMismatch,
    #[error("unknown packet kind {0}")]
    UnknownPacketKind(u8),
    #[error("register offset {0:#x} is out of range")]
    RegisterOutOfRange(u32),

    // framing and integrity
    #[error("frame length out of bounds")]
    FrameLength,
    #[error("frame is missing its start or end delimiter")]
    MissingDelimiter,
    #[error("frame ends inside an escape sequence")]
    DanglingEscape,
    #[error("frame checksum mismatch")]
    FrameCrc,
    #[error("message crc mismatch: carried {carried:#010x}, computed {computed:#010x}")]
    MessageCrcMismatch { carried: u32, computed: u32 },
    #[error("packet sequence is inconsistent with its message")]
    SequenceMismatch,

    // resources
    #[error("slot {0} lock not acquired in time")]
    LockTimeout(u8),
    #[error("too many messages in flight")]
    TooManyMessages,
    #[error("input/output failure on the underlying bus")]
    Io,
    #[error("slot address table already installed")]
    AddressTableInstalled,

    // application
    #[error("no module at address {0:#010x}")]
    ModuleNotFound(u32),
    #[error("command {0} is not recognized")]
    CommandNotRecognized(u32),
    #[error("eeprom access failed")]
    Eeprom,
    #[error("flash probe failed")]
    FlashProbe,
    #[error("flash access failed")]
    Flash,
    #[error("microcontroller channel failed")]
    Micro,
    #[error("remote side reported status {0}")]
    Remote(i32),
}

/// type to represent the result of a slotlink operation
pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// negative status code carried on the wire for this error
    pub fn code(&self) -> i32 {
        match self {
            Self::TxFifoNotEmptyTimeout => -1,
            Self::RxFifoPktNotReadyTimeout => -2,
            Self::DetectModulesTimeout => -3,
            Self::CompletionTimeout => -4,
            Self::NoResponse => -5,

            Self::MisalignedAddress => -10,
            Self::MisalignedByteEnable => -11,
            Self::StrideCausesMisalignment => -12,
            Self::InvalidSlot(_) => -13,
            Self::InvalidParameter(_) => -14,
            Self::UnexpectedPayloadCount {..} => -15,
            Self::PayloadTooLarge => -16,
            Self::ResponseMismatch => -17,
            Self::UnknownPacketKind(_) => -18,
            Self::RegisterOutOfRange(_) => -19,

            Self::FrameLength => -20,
            Self::MissingDelimiter => -21,
            Self::DanglingEscape => -22,
            Self::FrameCrc => -23,
            Self::MessageCrcMismatch {..} => -24,
            Self::SequenceMismatch => -25,

            Self::LockTimeout(_) => -30,
            Self::TooManyMessages => -31,
            Self::Io => -32,
            Self::AddressTableInstalled => -33,

            Self::ModuleNotFound(_) => -40,
            Self::CommandNotRecognized(_) => -41,
            Self::Eeprom => -42,
            Self::FlashProbe => -43,
            Self::Flash => -44,
            Self::Micro => -45,
            Self::Remote(code) => *code,
        }
    }

    /**
        rebuild an error from a status code received from the other side

        variants carrying data come back without it, the data never travels. Returns `None` for status 0 (success) and positive values.
    */
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            c if c >= 0 => return None,
            -1 => Self::TxFifoNotEmptyTimeout,
            -2 => Self::RxFifoPktNotReadyTimeout,
            -3 => Self::DetectModulesTimeout,
            -4 => Self::CompletionTimeout,
            -5 => Self::NoResponse,

            -10 => Self::MisalignedAddress,
            -11 => Self::MisalignedByteEnable,
            -12 => Self::StrideCausesMisalignment,
            -13 => Self::InvalidSlot(u8::MAX),
            -14 => Self::InvalidParameter("rejected by remote side"),
            -15 => Self::UnexpectedPayloadCount {expected: 0, actual: 0},
            -16 => Self::PayloadTooLarge,
            -17 => Self::ResponseMismatch,
            -18 => Self::UnknownPacketKind(0),
            -19 => Self::RegisterOutOfRange(0),

            -20 => Self::FrameLength,
            -21 => Self::MissingDelimiter,
            -22 => Self::DanglingEscape,
            -23 => Self::FrameCrc,
            -24 => Self::MessageCrcMismatch {carried: 0, computed: 0},
            -25 => Self::SequenceMismatch,

            -30 => Self::LockTimeout(u8::MAX),
            -31 => Self::TooManyMessages,
            -32 => Self::Io,
            -33 => Self::AddressTableInstalled,

            -40 => Self::ModuleNotFound(0),
            -41 => Self::CommandNotRecognized(0),
            -42 => Self::Eeprom,
            -43 => Self::FlashProbe,
            -44 => Self::Flash,
            -45 => Self::Micro,
            other => Self::Remote(other),
        })
    }

    /// whether this error is one of the transport timeouts
    pub fn is_timeout(&self) -> bool {
        matches!(self,
            Self::TxFifoNotEmptyTimeout
            | Self::RxFifoPktNotReadyTimeout
            | Self::DetectModulesTimeout
            | Self::CompletionTimeout
            | Self::NoResponse
            | Self::LockTimeout(_))
    }
}

/// convert a status word into a result, 0 is success
pub fn status_to_result(status: i32) -> Result<()> {
    match Error::from_code(status) {
        None => Ok(()),
        Some(error) => Err(error),
    }
}

/// convert a result into the status word sent to the other side
pub fn result_to_status<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(error) => error.code(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_survive_the_wire() {
        for error in [
            Error::RxFifoPktNotReadyTimeout,
            Error::MisalignedByteEnable,
            Error::StrideCausesMisalignment,
            Error::FrameCrc,
            Error::CommandNotRecognized(0),
            Error::FlashProbe,
            ] {
            assert_eq!(Error::from_code(error.code()), Some(error));
        }
        assert_eq!(Error::from_code(0), None);
        assert_eq!(Error::from_code(-1234), Some(Error::Remote(-1234)));
        assert_eq!(Error::Remote(-1234).code(), -1234);
    }

    #[test]
    fn data_is_dropped_on_the_wire() {
        let code = Error::ModuleNotFound(0x2500).code();
        assert_eq!(Error::from_code(code), Some(Error::ModuleNotFound(0)));
    }

    #[test]
    fn status_words() {
        assert_eq!(status_to_result(0), Ok(()));
        assert_eq!(status_to_result(-2), Err(Error::RxFifoPktNotReadyTimeout));
        assert_eq!(result_to_status(&Ok::<(), Error>(())), 0);
        assert_eq!(result_to_status::<()>(&Err(Error::Flash)), -44);
    }
}
