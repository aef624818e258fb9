use std::collections::VecDeque;

use embedded_io::{ErrorType, Read, Write, ReadReady};
use slotlink::{
    Config, Error,
    clock::StepClock,
    master::SlaveLink,
    registers::{MemoryRegisters, RegisterSpace, Width},
    slave::SlaveResponder,
    };


/// uart whose far end is a slave cpu answering every flushed frame at once
struct Loopback {
    slave: SlaveResponder<MemoryRegisters>,
    /// bytes written since the last flush
    sent: Vec<u8>,
    /// bytes waiting for the master
    rx: VecDeque<u8>,
    /// garbage preceding every answer
    noise: Vec<u8>,
    /// flip a bit in every answer
    corrupt: bool,
    /// slave never answers
    mute: bool,
    /// answer with an endless frame instead
    flood: bool,
}
impl Loopback {
    fn new() -> Self {
        Self {
            slave: SlaveResponder::new(MemoryRegisters::new(0x100)),
            sent: Vec::new(),
            rx: VecDeque::new(),
            noise: Vec::new(),
            corrupt: false,
            mute: false,
            flood: false,
        }
    }
}
impl ErrorType for Loopback {
    type Error = core::convert::Infallible;
}
impl Read for Loopback {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut count = 0;
        while count < buf.len() {
            let Some(byte) = self.rx.pop_front() else {break};
            buf[count] = byte;
            count += 1;
        }
        Ok(count)
    }
}
impl ReadReady for Loopback {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.rx.is_empty())
    }
}
impl Write for Loopback {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.sent.extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> Result<(), Self::Error> {
        let sent = core::mem::take(&mut self.sent);
        if self.mute
            {return Ok(())}
        if self.flood {
            self.rx.push_back(0x7E);
            self.rx.extend(core::iter::repeat_n(0x11, 1100));
            return Ok(())
        }
        if let Some(answer) = self.slave.respond(&sent) {
            let mut answer = answer.to_vec();
            if self.corrupt {
                // last byte before the end delimiter
                let last = answer.len() - 2;
                answer[last] ^= 0x01;
            }
            self.rx.extend(self.noise.iter().copied());
            self.rx.extend(answer);
        }
        Ok(())
    }
}

fn logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}


#[test]
fn echo() {
    logs();
    let clock = StepClock::new(1);
    let mut master = SlaveLink::new(Loopback::new(), &clock, &Config::default());
    assert_eq!(master.echo(b"are you there"), Ok(b"are you there".to_vec()));
    // bytes needing escape survive the trip
    let tricky = [0x7E, 0x7D, 0x5E, 0x5D, 0x00, 0x7E];
    assert_eq!(master.echo(&tricky), Ok(tricky.to_vec()));
    assert_eq!(master.link().port().slave.served(), 2);
}

#[test]
fn registers() {
    logs();
    let clock = StepClock::new(1);
    let mut master = SlaveLink::new(Loopback::new(), &clock, &Config::default());

    master.write(0x10, Width::U32, &[1, 2, 0xDEAD_BEEF]).unwrap();
    assert_eq!(master.read(0x10, Width::U32, 3), Ok(vec![1, 2, 0xDEAD_BEEF]));

    master.write(0x40, Width::U16, &[0xBEEF, 0x1234]).unwrap();
    assert_eq!(master.read(0x42, Width::U16, 1), Ok(vec![0x1234]));
    assert_eq!(master.read(0x40, Width::U32, 1), Ok(vec![0x1234_BEEF]));

    let slave = master.link().port().slave.registers();
    assert_eq!(slave.read(0x18, Width::U32), Ok(0xDEAD_BEEF));
}

#[test]
fn set_clear() {
    logs();
    let clock = StepClock::new(1);
    let mut master = SlaveLink::new(Loopback::new(), &clock, &Config::default());
    master.write(0x20, Width::U32, &[0x1234_5678]).unwrap();
    master.set_clear(0x20, Width::U32, 0xFF00, 0xABCD).unwrap();
    assert_eq!(master.read(0x20, Width::U32, 1), Ok(vec![0x1234_AB78]));
}

#[test]
fn slave_failures_mean_no_response() {
    logs();
    let clock = StepClock::new(1);
    let mut master = SlaveLink::new(Loopback::new(), &clock, &Config::default());
    // out of the slave memory, the slave stays silent
    let start = clock.peek();
    assert_eq!(master.read(0x1000, Width::U32, 1), Err(Error::NoResponse));
    assert!(clock.peek() - start >= 3000);
    // still alive afterwards
    assert_eq!(master.echo(b"x"), Ok(b"x".to_vec()));
}

#[test]
fn silent_slave() {
    logs();
    let clock = StepClock::new(1);
    let config = Config::default().with_slave_response_timeout(core::time::Duration::from_millis(500));
    let mut port = Loopback::new();
    port.mute = true;
    let mut master = SlaveLink::new(port, &clock, &config);
    let start = clock.peek();
    assert_eq!(master.echo(b"hello"), Err(Error::NoResponse));
    let spent = clock.peek() - start;
    assert!(spent >= 500, "gave up after {spent} ms");
    assert!(spent < 600, "gave up after {spent} ms");
}

#[test]
fn noise_before_the_answer() {
    logs();
    let clock = StepClock::new(1);
    let mut port = Loopback::new();
    port.noise = vec![0x00, 0xFF, 0x13];
    let mut master = SlaveLink::new(port, &clock, &Config::default());
    assert_eq!(master.echo(b"through the noise"), Ok(b"through the noise".to_vec()));
}

#[test]
fn corrupted_answer() {
    logs();
    let clock = StepClock::new(1);
    let mut port = Loopback::new();
    port.corrupt = true;
    let mut master = SlaveLink::new(port, &clock, &Config::default());
    assert_eq!(master.echo(b"abc"), Err(Error::NoResponse));
}

#[test]
fn stale_bytes_are_drained() {
    logs();
    let clock = StepClock::new(1);
    let mut port = Loopback::new();
    // answer of an exchange that timed out earlier
    port.rx.extend([0x7E, 0x01, 0x02, 0x03, 0x7E]);
    let mut master = SlaveLink::new(port, &clock, &Config::default());
    assert_eq!(master.echo(b"fresh"), Ok(b"fresh".to_vec()));
    assert!(master.link().port().rx.is_empty());
}

#[test]
fn oversized_frame_means_no_response() {
    logs();
    let clock = StepClock::new(1);
    let mut port = Loopback::new();
    port.flood = true;
    let mut master = SlaveLink::new(port, &clock, &Config::default());
    assert_eq!(master.echo(b"abc"), Err(Error::NoResponse));
    // the link recovers once the line is sane again
    master.link().port().flood = false;
    assert_eq!(master.echo(b"abc"), Ok(b"abc".to_vec()));
}
