/*!
    context shared by every operation on the fifo fabric

    one [Backplane] exists per cpu attached to the fabric: the motherboard or a module. It owns the register access, the clock, the settings, the slot address table once discovered, and one lock per peer slot. All protocol operations borrow it, so it can be shared between threads as long as its [FifoIo] and [Clock] can.
*/

use std::sync::{
    OnceLock,
    atomic::{AtomicU16, Ordering::*},
    };
use log::*;

use crate::{
    address::{SlotId, SlotAddressTable, Target, MODULE_SLOTS, UNPOPULATED},
    clock::{Clock, poll_until},
    config::Config,
    error::{Error, Result},
    mutex::{BusyMutex, BusyMutexGuard},
    serdes::fifo::{Fifo, FifoIo, FifoLayout},
    };


/// one cpu endpoint on the fifo fabric
pub struct Backplane<I, C> {
    io: I,
    clock: C,
    layout: FifoLayout,
    config: Config,
    /// slot of this cpu
    local: SlotId,
    /// written once by module detection
    table: OnceLock<SlotAddressTable>,
    /// serialize exchanges with the same peer slot
    locks: [BusyMutex<()>; SlotId::MAX as usize + 1],
    /// last transaction id given to a message
    transactions: AtomicU16,
}

impl<I: FifoIo, C: Clock> Backplane<I, C> {
    pub fn new(io: I, clock: C, layout: FifoLayout, config: Config, local: SlotId) -> Self {
        Self {
            io,
            clock,
            layout,
            config,
            local,
            table: OnceLock::new(),
            locks: core::array::from_fn(|_| BusyMutex::new(())),
            // start at a random point, so that ids do not repeat across restarts
            transactions: AtomicU16::new(rand::random()),
        }
    }
    pub fn io(&self) -> &I {&self.io}
    pub fn clock(&self) -> &C {&self.clock}
    pub fn config(&self) -> &Config {&self.config}
    pub fn layout(&self) -> FifoLayout {self.layout}
    pub fn local(&self) -> SlotId {self.local}

    /// fifo register set talking to `peer`
    pub fn fifo(&self, peer: SlotId) -> Fifo<'_, I> {
        Fifo::new(&self.io, self.layout, peer)
    }

    /// install the slot address table, it cannot change afterward
    pub fn install_address_table(&self, table: SlotAddressTable) -> Result<()> {
        self.table.set(table).map_err(|_| Error::AddressTableInstalled)
    }
    /// the slot address table, if already installed
    pub fn address_table(&self) -> Option<&SlotAddressTable> {
        self.table.get()
    }
    /// find the slot and offset an access goes to
    pub fn resolve(&self, target: Target) -> Result<(SlotId, u32)> {
        match target {
            Target::Slot(slot, offset) => Ok((slot, offset)),
            Target::Flat(address) => self.table.get()
                .ok_or(Error::ModuleNotFound(address))?
                .resolve(address),
        }
    }

    /**
        wait for every module slot to report its base address, then install the address table

        a slot reports by setting its handshake register to its base address, or to [UNPOPULATED] when no module sits there. Fails with [Error::DetectModulesTimeout] if any slot is still silent when the bound expires.
    */
    pub fn detect_modules(&self) -> Result<&SlotAddressTable> {
        let mut table = SlotAddressTable::new();
        let mut reported = [false; MODULE_SLOTS];
        poll_until(&self.clock, self.config.detect_modules_timeout, Error::DetectModulesTimeout, || {
            for index in 0 .. MODULE_SLOTS {
                if reported[index]
                    {continue}
                let slot = SlotId::module(index)?;
                let base = self.fifo(slot).handshake()?;
                if base == 0
                    {continue}
                if base == UNPOPULATED
                    {debug!("{slot} is empty");}
                else
                    {info!("{slot} module at {base:#010x}");}
                table.set(slot, base)?;
                reported[index] = true;
            }
            Ok(reported.iter().all(|&done| done).then_some(()))
        })
        .inspect_err(|_| warn!("slots {:?} never reported their base",
            (0 .. MODULE_SLOTS).filter(|&i| !reported[i]).map(|i| i + 1).collect::<Vec<_>>()))?;
        self.install_address_table(table)?;
        self.address_table().ok_or(Error::AddressTableInstalled)
    }

    /// module side of detection: report this module's base address to the motherboard
    pub fn announce_base(&self, base: u32) -> Result<()> {
        self.fifo(SlotId::MOTHERBOARD).announce(base)
    }

    /// fresh transaction id for a message, never 0
    pub fn next_transaction_id(&self) -> u16 {
        loop {
            let id = self.transactions.fetch_add(1, Relaxed).wrapping_add(1);
            if id != 0
                {break id}
        }
    }

    /// take the lock of a peer slot within the configured bound, `None` when locks are disabled
    pub fn lock_slot(&self, slot: SlotId) -> Result<Option<BusyMutexGuard<'_, ()>>> {
        if !self.config.use_slot_locks
            {return Ok(None)}
        self.locks[slot.index()]
            .lock_within(&self.clock, self.config.slot_lock_timeout, Error::LockTimeout(slot.id()))
            .inspect_err(|_| warn!("{slot} is busy"))
            .map(Some)
    }
}
