/*!
    slot identifiers and flat address resolution

    every module reports the base of its register window at startup. A flat address is resolved by scanning the populated slots in ascending order: the address belongs to the last slot whose base is not above it.
*/

use core::fmt;

use crate::error::{Error, Result};


/// base address of a slot with no module
pub const UNPOPULATED: u32 = 0xFFFF_FFFF;
/// number of logical module slots, numbered from 1
pub const MODULE_SLOTS: usize = 10;


/// logical endpoint on the fabric, 4 bits on the wire
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u8);

impl SlotId {
    /// the motherboard cpu
    pub const MOTHERBOARD: Self = Self(0);
    /// largest id a packet header can carry
    pub const MAX: u8 = 0xF;

    pub const fn new(id: u8) -> Result<Self> {
        if id > Self::MAX
            {Err(Error::InvalidSlot(id))}
        else
            {Ok(Self(id))}
    }
    /// id of the `index`-th module slot, starting from 0
    pub fn module(index: usize) -> Result<Self> {
        if index >= MODULE_SLOTS
            {return Err(Error::InvalidSlot(u8::try_from(index + 1).unwrap_or(u8::MAX)))}
        Self::new(index as u8 + 1)
    }
    pub const fn id(self) -> u8 {self.0}
    pub const fn index(self) -> usize {self.0 as usize}
    /// whether this id designates one of the module slots
    pub const fn is_module(self) -> bool {
        self.0 >= 1 && self.0 as usize <= MODULE_SLOTS
    }
}
impl TryFrom<u8> for SlotId {
    type Error = Error;
    fn try_from(id: u8) -> Result<Self> {Self::new(id)}
}
impl TryFrom<u32> for SlotId {
    type Error = Error;
    fn try_from(id: u32) -> Result<Self> {
        Self::new(u8::try_from(id).map_err(|_| Error::InvalidSlot(u8::MAX))?)
    }
}
impl From<SlotId> for u8 {
    fn from(slot: SlotId) -> u8 {slot.0}
}
impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", self.0)
    }
}


/// where a register access goes
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// flat address, resolved through the slot address table
    Flat(u32),
    /// hard coded slot, the address is an offset inside the module
    Slot(SlotId, u32),
}
impl From<u32> for Target {
    fn from(address: u32) -> Self {Self::Flat(address)}
}
impl From<(SlotId, u32)> for Target {
    fn from((slot, offset): (SlotId, u32)) -> Self {Self::Slot(slot, offset)}
}


/// base address of each module slot, [UNPOPULATED] if empty
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotAddressTable {
    bases: [u32; MODULE_SLOTS],
}

impl Default for SlotAddressTable {
    fn default() -> Self {
        Self {bases: [UNPOPULATED; MODULE_SLOTS]}
    }
}

impl SlotAddressTable {
    /// table with every slot empty
    pub fn new() -> Self {Self::default()}

    /// table from the bases of slots 1, 2, ... in order, missing slots are empty
    pub fn from_bases(bases: &[u32]) -> Result<Self> {
        if bases.len() > MODULE_SLOTS
            {return Err(Error::InvalidParameter("more bases than module slots"))}
        let mut table = Self::default();
        table.bases[.. bases.len()].copy_from_slice(bases);
        Ok(table)
    }

    pub fn set(&mut self, slot: SlotId, base: u32) -> Result<()> {
        if !slot.is_module()
            {return Err(Error::InvalidSlot(slot.id()))}
        self.bases[slot.index() - 1] = base;
        Ok(())
    }

    /// base address of a slot, `None` if unpopulated
    pub fn base(&self, slot: SlotId) -> Option<u32> {
        if !slot.is_module()
            {return None}
        Some(self.bases[slot.index() - 1]).filter(|&base| base != UNPOPULATED)
    }

    /// populated slots with their base, in ascending slot order
    pub fn populated(&self) -> impl Iterator<Item=(SlotId, u32)> + '_ {
        self.bases.iter()
            .enumerate()
            .filter(|&(_, &base)| base != UNPOPULATED)
            .map(|(index, &base)| (SlotId(index as u8 + 1), base))
    }

    /**
        find the module holding a flat address, and the offset inside it

        - an address equal to a base belongs to that slot at offset 0
        - an address between two consecutive populated bases belongs to the lower one
        - an address beyond the last populated base belongs to that last slot
    */
    pub fn resolve(&self, address: u32) -> Result<(SlotId, u32)> {
        let mut slots = self.populated().peekable();
        while let Some((slot, base)) = slots.next() {
            if address == base
                {return Ok((slot, 0))}
            match slots.peek() {
                Some(&(_, next)) => if base < address && address < next
                    {return Ok((slot, address - base))},
                None => if address > base
                    {return Ok((slot, address - base))},
            }
        }
        Err(Error::ModuleNotFound(address))
    }

    /// resolve a target, a hard coded slot bypasses the table
    pub fn locate(&self, target: Target) -> Result<(SlotId, u32)> {
        match target {
            Target::Flat(address) => self.resolve(address),
            Target::Slot(slot, offset) => Ok((slot, offset)),
        }
    }
}
