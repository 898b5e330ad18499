//! Relocation entries: which bytes in the image carry half of an
//! image-internal address, so the emitter can print `<label`/`>label`
//! instead of a literal byte (§3, §4.E).

use std::collections::BTreeMap;

/// Which half of a 16-bit address a relocated byte carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Half {
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocationEntry {
    pub target_address: u16,
    pub half: Half,
}

/// Sparse by nature — only a handful of image bytes are ever relocation
/// targets — so a `BTreeMap` fits better here than the fixed-size arrays
/// used for the per-address provenance/access tracking in [`crate::memory`].
#[derive(Debug, Default)]
pub struct RelocationTable {
    entries: BTreeMap<u16, RelocationEntry>,
}

impl RelocationTable {
    pub fn new() -> RelocationTable {
        RelocationTable::default()
    }

    pub fn add_entry(&mut self, addr: u16, target_address: u16, half: Half) {
        self.entries.insert(addr, RelocationEntry { target_address, half });
    }

    pub fn has_entry(&self, addr: u16) -> bool {
        self.entries.contains_key(&addr)
    }

    pub fn get_entry(&self, addr: u16) -> Option<&RelocationEntry> {
        self.entries.get(&addr)
    }

    pub fn all_entries(&self) -> impl Iterator<Item = (&u16, &RelocationEntry)> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
