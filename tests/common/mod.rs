//! in-process fifo fabric: the motherboard and its modules run in the same thread, module sides are served whenever the motherboard polls an empty receive fifo

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering::*},
        },
    };

use slotlink::{
    Backplane, Config, Error, Result, SlotId,
    address::UNPOPULATED,
    clock::StepClock,
    dispatch::ModuleServices,
    message::{MessageSet, Packet},
    registers::MemoryRegisters,
    serdes::fifo::*,
    };


pub type Clock = Arc<StepClock>;
pub type Board = Backplane<Endpoint, Clock>;

const SLOTS: usize = 16;
const STRIDE: u32 = 0x20;


/// one direction of the fifo between the motherboard and a slot
#[derive(Default)]
struct Pipe {
    /// words pushed but not flagged ready yet
    staged: Vec<u32>,
    /// complete packets, the front one is being read
    packets: VecDeque<VecDeque<u32>>,
}

#[derive(Default)]
struct State {
    /// motherboard to module
    down: [Pipe; SLOTS],
    /// module to motherboard
    up: [Pipe; SLOTS],
    handshakes: [u32; SLOTS],
}

pub struct Sim {
    state: Mutex<State>,
    /// run the module sides, called when the motherboard finds nothing to receive
    hooks: Mutex<Vec<Box<dyn FnMut() + Send>>>,
    /// register accesses made by the motherboard
    pub accesses: AtomicUsize,
    /// packets sent by the motherboard
    pub requests: AtomicUsize,
}

impl Sim {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
            hooks: Mutex::new(Vec::new()),
            accesses: AtomicUsize::new(0),
            requests: AtomicUsize::new(0),
        })
    }
    pub fn set_handshake(&self, slot: usize, value: u32) {
        self.state.lock().unwrap().handshakes[slot] = value;
    }
    /// packets waiting in the motherboard to module direction
    pub fn pending_down(&self, slot: usize) -> usize {
        self.state.lock().unwrap().down[slot].packets.len()
    }
    /// queue a message packet from the module in `slot`, as if its cpu had sent it
    pub fn send_up(&self, slot: usize, packet: &Packet) {
        let mut words: VecDeque<u32> = packet.serdes.to_words().into_iter().collect();
        words.extend(packet.to_words());
        self.state.lock().unwrap().up[slot].packets.push_back(words);
    }
    fn serve_modules(&self) {
        // module sides never poll the motherboard, so no reentrance is possible
        if let Ok(mut hooks) = self.hooks.try_lock() {
            for hook in hooks.iter_mut() {
                hook();
            }
        }
    }
}


#[derive(Copy, Clone, Debug, PartialEq)]
enum Side {
    Motherboard,
    Module(usize),
}

/// register access of one cpu on the simulated fabric
#[derive(Clone)]
pub struct Endpoint {
    sim: Arc<Sim>,
    side: Side,
}

impl Endpoint {
    fn decode(&self, address: u32) -> Result<(usize, u32)> {
        let peer = (address / STRIDE) as usize;
        if peer >= SLOTS
            {return Err(Error::Io)}
        Ok((peer, address % STRIDE))
    }
}

impl FifoIo for Endpoint {
    fn read_u32(&self, address: u32) -> Result<u32> {
        let (peer, register) = self.decode(address)?;
        let slot = match self.side {
            Side::Motherboard => {
                self.sim.accesses.fetch_add(1, Relaxed);
                peer
            },
            Side::Module(slot) => slot,
        };
        if self.side == Side::Motherboard && register == STATUS {
            let idle = self.sim.state.lock().unwrap().up[slot].packets.is_empty();
            if idle
                {self.sim.serve_modules();}
        }
        let mut state = self.sim.state.lock().unwrap();
        let state = &mut *state;
        let rx = match self.side {
            Side::Motherboard => &mut state.up[slot],
            Side::Module(_) => &mut state.down[slot],
        };
        match register {
            STATUS => Ok(TX_EMPTY | if rx.packets.is_empty() {0} else {RX_PACKET_READY}),
            RX_DATA => rx.packets.front_mut()
                .and_then(|packet| packet.pop_front())
                .ok_or(Error::Io),
            HANDSHAKE => Ok(state.handshakes[slot]),
            _ => Err(Error::Io),
        }
    }

    fn write_u32(&self, address: u32, value: u32) -> Result<()> {
        let (peer, register) = self.decode(address)?;
        let slot = match self.side {
            Side::Motherboard => {
                self.sim.accesses.fetch_add(1, Relaxed);
                peer
            },
            Side::Module(slot) => slot,
        };
        let mut state = self.sim.state.lock().unwrap();
        let state = &mut *state;
        let (tx, rx) = match self.side {
            Side::Motherboard => (&mut state.down[slot], &mut state.up[slot]),
            Side::Module(_) => (&mut state.up[slot], &mut state.down[slot]),
        };
        match register {
            TX_DATA => tx.staged.push(value),
            CONTROL if value & TX_PACKET_READY != 0 => {
                let packet = core::mem::take(&mut tx.staged);
                tx.packets.push_back(packet.into());
                if self.side == Side::Motherboard
                    {self.sim.requests.fetch_add(1, Relaxed);}
            },
            CONTROL if value & RX_PACKET_DONE != 0 => {
                rx.packets.pop_front();
            },
            HANDSHAKE => state.handshakes[slot] = value,
            _ => return Err(Error::Io),
        }
        Ok(())
    }
}


/// module cpu attached to the simulated fabric
pub struct Module<S> {
    pub backplane: Board,
    pub registers: MemoryRegisters,
    pub services: S,
    pub set: MessageSet,
    /// packets served so far
    pub served: usize,
    /// failures of the service loop
    pub errors: Vec<Error>,
}

impl<S: ModuleServices> Module<S> {
    fn poll(&mut self) {
        match self.backplane.service_once(SlotId::MOTHERBOARD, &mut self.set, &mut self.registers, &mut self.services) {
            Ok(true) => self.served += 1,
            Ok(false) => {},
            Err(error) => self.errors.push(error),
        }
    }
}

/// motherboard endpoint on a fresh fabric
pub fn motherboard(config: Config) -> (Arc<Sim>, Board) {
    let sim = Sim::new();
    for slot in 1 .. SLOTS {
        sim.set_handshake(slot, UNPOPULATED);
    }
    let board = Backplane::new(
        Endpoint {sim: sim.clone(), side: Side::Motherboard},
        Arc::new(StepClock::new(1)),
        FifoLayout {base: 0, slot_stride: STRIDE},
        config,
        SlotId::MOTHERBOARD,
        );
    (sim, board)
}

/// plug a module in `slot`, announcing `base` and serving `registers` and `services`
pub fn plug<S>(sim: &Arc<Sim>, slot: u8, base: u32, registers: MemoryRegisters, services: S) -> Arc<Mutex<Module<S>>>
where S: ModuleServices + Send + 'static
{
    let backplane = Backplane::new(
        Endpoint {sim: sim.clone(), side: Side::Module(usize::from(slot))},
        Arc::new(StepClock::new(1)),
        FifoLayout {base: 0, slot_stride: STRIDE},
        Config::default(),
        SlotId::new(slot).unwrap(),
        );
    backplane.announce_base(base).unwrap();
    let module = Arc::new(Mutex::new(Module {
        backplane,
        registers,
        services,
        set: MessageSet::new(4),
        served: 0,
        errors: Vec::new(),
    }));
    let served = module.clone();
    sim.hooks.lock().unwrap().push(Box::new(move || served.lock().unwrap().poll()));
    module
}

/// module with no message service
pub struct Bare;
impl ModuleServices for Bare {}

/// install env_logger once for the whole test binary
pub fn logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}
