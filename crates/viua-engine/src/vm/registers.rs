//! Fixed-capacity register sets
//!
//! A register set is an array of optional value cells with a per-slot
//! flag mask. Flags direct the engine's ownership decisions: `REFERENCE`
//! marks a slot that aliases another slot's cell, `KEEP` marks contents
//! that must survive frame teardown (in-flight exceptions), `BOUND`
//! marks registers staged for capture by the next `closure`.

use crate::vm::value::{cell, Value, ValueCell};
use crate::vm::{RuntimeException, VmResult};

/// Slot aliases another slot's value; overwriting must not free it
pub const REFERENCE: u8 = 1 << 0;
/// Slot contents survive frame teardown
pub const KEEP: u8 = 1 << 1;
/// Slot is staged for capture by the next `closure` instruction
pub const BOUND: u8 = 1 << 2;

/// Fixed-capacity array of optional values with per-slot flags
#[derive(Debug, Default)]
pub struct RegisterSet {
    slots: Vec<Option<ValueCell>>,
    masks: Vec<u8>,
}

impl RegisterSet {
    /// Create a register set with `size` empty slots
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![None; size],
            masks: vec![0; size],
        }
    }

    /// Number of slots
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    fn check(&self, index: usize) -> VmResult<()> {
        if index >= self.slots.len() {
            return Err(RuntimeException::out_of_range(format!(
                "register index out of bounds: {}",
                index
            )));
        }
        Ok(())
    }

    /// Store a cell into a slot, clearing its flags
    ///
    /// The previous occupant is released; if the slot was a `REFERENCE`
    /// the aliased value lives on through its other holders.
    pub fn set(&mut self, index: usize, value: ValueCell) -> VmResult<()> {
        self.check(index)?;
        self.slots[index] = Some(value);
        self.masks[index] = 0;
        Ok(())
    }

    /// Store a freshly owned value into a slot
    pub fn put(&mut self, index: usize, value: Value) -> VmResult<()> {
        self.set(index, cell(value))
    }

    /// Fetch the cell in a slot; empty slots are an error
    pub fn get(&self, index: usize) -> VmResult<ValueCell> {
        self.check(index)?;
        self.slots[index].clone().ok_or_else(|| {
            RuntimeException::null_deref(format!("(get) read from null register: {}", index))
        })
    }

    /// Peek at a slot without treating emptiness as an error
    pub fn at(&self, index: usize) -> VmResult<Option<&ValueCell>> {
        self.check(index)?;
        Ok(self.slots[index].as_ref())
    }

    /// Move a slot's contents and flags into another slot
    pub fn move_value(&mut self, from: usize, to: usize) -> VmResult<()> {
        self.check(from)?;
        self.check(to)?;
        self.slots[to] = self.slots[from].take();
        self.masks[to] = self.masks[from];
        self.masks[from] = 0;
        Ok(())
    }

    /// Swap two slots, values and flags
    pub fn swap(&mut self, a: usize, b: usize) -> VmResult<()> {
        self.check(a)?;
        self.check(b)?;
        self.slots.swap(a, b);
        self.masks.swap(a, b);
        Ok(())
    }

    /// Free a slot's contents; freeing an empty slot is an error
    pub fn free(&mut self, index: usize) -> VmResult<()> {
        self.check(index)?;
        if self.slots[index].is_none() {
            return Err(RuntimeException::null_deref(format!(
                "invalid free of null register: {}",
                index
            )));
        }
        self.slots[index] = None;
        self.masks[index] = 0;
        Ok(())
    }

    /// Release a slot without freeing its contents
    ///
    /// The cell keeps existing through any other holder; only this
    /// slot's handle is dropped.
    pub fn empty(&mut self, index: usize) -> VmResult<()> {
        self.check(index)?;
        self.slots[index] = None;
        self.masks[index] = 0;
        Ok(())
    }

    /// Release every slot without freeing contents
    ///
    /// Used on frame argument sets at teardown: arguments passed by
    /// reference are owned by the caller's frame.
    pub fn drop_all(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        for mask in &mut self.masks {
            *mask = 0;
        }
    }

    /// Set a flag bit on a slot
    pub fn flag(&mut self, index: usize, flag: u8) -> VmResult<()> {
        self.check(index)?;
        self.masks[index] |= flag;
        Ok(())
    }

    /// Clear a flag bit on a slot
    pub fn unflag(&mut self, index: usize, flag: u8) -> VmResult<()> {
        self.check(index)?;
        self.masks[index] &= !flag;
        Ok(())
    }

    /// Check a flag bit on a slot
    pub fn isflagged(&self, index: usize, flag: u8) -> VmResult<bool> {
        self.check(index)?;
        Ok(self.masks[index] & flag != 0)
    }

    /// Replace a slot's whole mask
    pub fn setmask(&mut self, index: usize, mask: u8) -> VmResult<()> {
        self.check(index)?;
        self.masks[index] = mask;
        Ok(())
    }

    /// Read a slot's whole mask
    pub fn getmask(&self, index: usize) -> VmResult<u8> {
        self.check(index)?;
        Ok(self.masks[index])
    }

    /// Deep-clone the set: occupied slots get fresh cells with deep
    /// copies of their values, masks are preserved
    pub fn deep_copy(&self) -> RegisterSet {
        let mut copied = RegisterSet::new(self.size());
        for (index, slot) in self.slots.iter().enumerate() {
            if let Some(value) = slot {
                copied.slots[index] = Some(cell(value.borrow().deep_copy()));
                copied.masks[index] = self.masks[index];
            }
        }
        copied
    }

    /// Indices of occupied slots
    pub fn occupied(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|_| index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get() {
        let mut regs = RegisterSet::new(4);
        regs.put(1, Value::Integer(42)).unwrap();
        assert_eq!(regs.get(1).unwrap().borrow().as_integer(), Some(42));
    }

    #[test]
    fn test_get_null_register() {
        let regs = RegisterSet::new(4);
        let err = regs.get(1).unwrap_err();
        assert_eq!(err.kind, "NullDeref");
        assert_eq!(err.message, "(get) read from null register: 1");
    }

    #[test]
    fn test_out_of_bounds() {
        let mut regs = RegisterSet::new(2);
        assert_eq!(regs.put(5, Value::Integer(1)).unwrap_err().kind, "OutOfRange");
        assert_eq!(regs.get(5).unwrap_err().kind, "OutOfRange");
        assert_eq!(regs.getmask(5).unwrap_err().kind, "OutOfRange");
    }

    #[test]
    fn test_move_transfers_ownership() {
        let mut regs = RegisterSet::new(4);
        regs.put(0, Value::Integer(7)).unwrap();
        regs.flag(0, KEEP).unwrap();
        regs.move_value(0, 3).unwrap();

        assert!(regs.at(0).unwrap().is_none());
        assert_eq!(regs.getmask(0).unwrap(), 0);
        assert_eq!(regs.get(3).unwrap().borrow().as_integer(), Some(7));
        assert!(regs.isflagged(3, KEEP).unwrap());
    }

    #[test]
    fn test_swap_values_and_flags() {
        let mut regs = RegisterSet::new(4);
        regs.put(0, Value::Integer(1)).unwrap();
        regs.put(1, Value::Integer(2)).unwrap();
        regs.flag(0, REFERENCE).unwrap();
        regs.swap(0, 1).unwrap();

        assert_eq!(regs.get(0).unwrap().borrow().as_integer(), Some(2));
        assert_eq!(regs.get(1).unwrap().borrow().as_integer(), Some(1));
        assert!(regs.isflagged(1, REFERENCE).unwrap());
        assert!(!regs.isflagged(0, REFERENCE).unwrap());
    }

    #[test]
    fn test_free_empty_slot_fails() {
        let mut regs = RegisterSet::new(4);
        assert_eq!(regs.free(0).unwrap_err().kind, "NullDeref");
    }

    #[test]
    fn test_empty_releases_but_shared_cell_survives() {
        let mut regs = RegisterSet::new(4);
        regs.put(0, Value::Integer(5)).unwrap();
        let held = regs.get(0).unwrap();
        regs.empty(0).unwrap();

        assert!(regs.at(0).unwrap().is_none());
        assert_eq!(held.borrow().as_integer(), Some(5));
    }

    #[test]
    fn test_drop_all() {
        let mut regs = RegisterSet::new(4);
        regs.put(0, Value::Integer(1)).unwrap();
        regs.put(2, Value::Integer(2)).unwrap();
        regs.drop_all();
        assert!(regs.at(0).unwrap().is_none());
        assert!(regs.at(2).unwrap().is_none());
    }

    #[test]
    fn test_deep_copy_detaches() {
        let mut regs = RegisterSet::new(2);
        regs.put(0, Value::Integer(1)).unwrap();
        let copied = regs.deep_copy();

        *regs.get(0).unwrap().borrow_mut() = Value::Integer(9);
        assert_eq!(copied.get(0).unwrap().borrow().as_integer(), Some(1));
    }

    #[test]
    fn test_occupied() {
        let mut regs = RegisterSet::new(4);
        regs.put(1, Value::Integer(1)).unwrap();
        regs.put(3, Value::Integer(3)).unwrap();
        let occupied: Vec<usize> = regs.occupied().collect();
        assert_eq!(occupied, vec![1, 3]);
    }
}
