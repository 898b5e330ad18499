use bitflags::bitflags;

bitflags! {
    /// Per-address access flags. Monotonic within a run: a run never clears a
    /// bit it has already set, so the map is safe to consult from any pass
    /// started after the emulation has begun.
    #[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
    pub struct AccessFlags: u8 {
        const EXECUTE     = 1 << 0;
        const OPCODE      = 1 << 1;
        const READ        = 1 << 2;
        const WRITE       = 1 << 3;
        const JUMP_TARGET = 1 << 4;
    }
}

/// Where a register's current value came from, last update wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProvenanceKind {
    #[default]
    Unknown,
    Immediate,
    Memory,
}

/// Provenance record for a register, or for a byte landed in memory by a
/// store instruction (copied from the source register's record at the time
/// of the store).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Provenance {
    pub kind: ProvenanceKind,
    pub source_address: u16,
    pub last_value: u8,
    pub index_used: u8,
}

impl Provenance {
    pub const fn unknown() -> Provenance {
        Provenance {
            kind: ProvenanceKind::Unknown,
            source_address: 0,
            last_value: 0,
            index_used: 0,
        }
    }

    pub const fn immediate(value: u8) -> Provenance {
        Provenance {
            kind: ProvenanceKind::Immediate,
            source_address: 0,
            last_value: value,
            index_used: 0,
        }
    }

    /// An immediate value, remembering the address of the operand byte it
    /// came from (the code site of the `#imm`, not a memory operand read).
    /// Lets a later store's write-source-info be traced back to the literal
    /// byte in code that supplied it, so the emitter can relocate that byte
    /// too (§4.E).
    pub const fn immediate_at(source_address: u16, value: u8) -> Provenance {
        Provenance {
            kind: ProvenanceKind::Immediate,
            source_address,
            last_value: value,
            index_used: 0,
        }
    }

    pub const fn memory(address: u16, value: u8, index_used: u8) -> Provenance {
        Provenance {
            kind: ProvenanceKind::Memory,
            source_address: address,
            last_value: value,
            index_used,
        }
    }
}

/// Tracks the observed min/max index offset used by an indexed addressing
/// mode at a given PC. Empty until the first `update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    min: Option<u8>,
    max: Option<u8>,
}

impl Default for IndexRange {
    fn default() -> Self {
        IndexRange { min: None, max: None }
    }
}

impl IndexRange {
    pub fn update(&mut self, index: u8) {
        self.min = Some(self.min.map_or(index, |m| m.min(index)));
        self.max = Some(self.max.map_or(index, |m| m.max(index)));
    }

    /// `(0, 0)` if never observed, matching the source behavior of an
    /// empty range collapsing to zero rather than reporting "no data".
    pub fn range(&self) -> (u8, u8) {
        match (self.min, self.max) {
            (Some(min), Some(max)) => (min, max),
            _ => (0, 0),
        }
    }
}

/// One observed `(zp,X)` / `(zp),Y` dereference: the PC that performed it,
/// the zero-page pointer address involved, and the effective address it
/// resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndirectAccess {
    pub pc: u16,
    pub zp_pointer: u16,
    pub effective: u16,
}

/// The 64 KiB byte store plus its access map and provenance records.
///
/// Owned exclusively by one run session (§3): the analyzer and emitter only
/// ever borrow it read-only once emulation has finished.
pub struct Memory {
    bytes: Box<[u8; 65536]>,
    access: Box<[AccessFlags; 65536]>,
    /// Provenance of the value last written to each address, by the store
    /// that wrote it.
    write_source: Box<[Provenance; 65536]>,
    /// PC of the instruction that last wrote each address.
    last_writer_pc: Box<[u16; 65536]>,
    snapshot: Option<Box<[u8; 65536]>>,
    indexed_ranges: std::collections::HashMap<u16, IndexRange>,
    indirect_log: Vec<IndirectAccess>,
}

impl Memory {
    pub fn new() -> Memory {
        Memory {
            bytes: Box::new([0u8; 65536]),
            access: Box::new([AccessFlags::empty(); 65536]),
            write_source: Box::new([Provenance::unknown(); 65536]),
            last_writer_pc: Box::new([0u16; 65536]),
            snapshot: None,
            indexed_ranges: std::collections::HashMap::new(),
            indirect_log: Vec::new(),
        }
    }

    #[inline]
    pub fn read(&mut self, addr: u16) -> u8 {
        self.access[addr as usize] |= AccessFlags::READ;
        self.bytes[addr as usize]
    }

    /// Reads without updating the access map. Used internally to peek at
    /// bytes (e.g. operand bytes for logging) without pretending the CPU
    /// accessed them.
    #[inline]
    pub fn peek(&self, addr: u16) -> u8 {
        self.bytes[addr as usize]
    }

    pub fn write(&mut self, addr: u16, value: u8, writer_pc: u16, provenance: Provenance) {
        self.access[addr as usize] |= AccessFlags::WRITE;
        self.bytes[addr as usize] = value;
        self.last_writer_pc[addr as usize] = writer_pc;
        self.write_source[addr as usize] = provenance;
    }

    /// Bulk load path: places program bytes into the image without
    /// disturbing the access map (§4.A).
    pub fn poke(&mut self, addr: u16, value: u8) {
        self.bytes[addr as usize] = value;
    }

    pub fn poke_slice(&mut self, base: u16, data: &[u8]) {
        for (i, &b) in data.iter().enumerate() {
            self.poke(base.wrapping_add(i as u16), b);
        }
    }

    #[inline]
    pub fn fetch_opcode(&mut self, addr: u16) -> u8 {
        self.access[addr as usize] |= AccessFlags::EXECUTE | AccessFlags::OPCODE;
        self.bytes[addr as usize]
    }

    #[inline]
    pub fn fetch_operand(&mut self, addr: u16) -> u8 {
        self.access[addr as usize] |= AccessFlags::EXECUTE;
        self.bytes[addr as usize]
    }

    pub fn mark(&mut self, addr: u16, flag: AccessFlags) {
        self.access[addr as usize] |= flag;
    }

    pub fn access_at(&self, addr: u16) -> AccessFlags {
        self.access[addr as usize]
    }

    pub fn write_source_at(&self, addr: u16) -> Provenance {
        self.write_source[addr as usize]
    }

    pub fn last_writer_pc_at(&self, addr: u16) -> u16 {
        self.last_writer_pc[addr as usize]
    }

    pub fn record_index(&mut self, pc: u16, index: u8) {
        self.indexed_ranges.entry(pc).or_default().update(index);
    }

    pub fn index_range_at(&self, pc: u16) -> (u8, u8) {
        self.indexed_ranges.get(&pc).copied().unwrap_or_default().range()
    }

    pub fn record_indirect_access(&mut self, pc: u16, zp_pointer: u16, effective: u16) {
        self.indirect_log.push(IndirectAccess { pc, zp_pointer, effective });
    }

    pub fn indirect_log(&self) -> &[IndirectAccess] {
        &self.indirect_log
    }

    /// Copies the byte store aside. Does not snapshot the access map: the
    /// analyzer needs to see every access the run performed, including ones
    /// touching bytes the program itself rewrote.
    pub fn snapshot(&mut self) {
        self.snapshot = Some(self.bytes.clone());
    }

    /// Restores the byte store from the most recent snapshot. A no-op if
    /// nothing was ever snapshotted.
    pub fn restore(&mut self) {
        if let Some(saved) = self.snapshot.take() {
            self.bytes = saved;
        }
    }
}

impl Default for Memory {
    fn default() -> Self {
        Memory::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn opcode_fetch_implies_execute() {
        let mut mem = Memory::new();
        mem.poke(0x1000, 0xEA);
        let _ = mem.fetch_opcode(0x1000);
        let flags = mem.access_at(0x1000);
        assert!(flags.contains(AccessFlags::OPCODE));
        assert!(flags.contains(AccessFlags::EXECUTE));
    }

    #[test]
    fn flags_are_monotonic() {
        let mut mem = Memory::new();
        mem.mark(0x2000, AccessFlags::READ);
        mem.mark(0x2000, AccessFlags::WRITE);
        let flags = mem.access_at(0x2000);
        assert!(flags.contains(AccessFlags::READ));
        assert!(flags.contains(AccessFlags::WRITE));
    }

    #[test]
    fn snapshot_restore_round_trip() {
        let mut mem = Memory::new();
        mem.poke(0x1000, 0xAA);
        mem.snapshot();
        mem.write(0x1000, 0xBB, 0x1234, Provenance::immediate(0xBB));
        assert_eq!(mem.peek(0x1000), 0xBB);
        mem.restore();
        assert_eq!(mem.peek(0x1000), 0xAA);
    }

    #[test]
    fn index_range_tracks_min_max() {
        let mut mem = Memory::new();
        mem.record_index(0x1234, 4);
        mem.record_index(0x1234, 2);
        mem.record_index(0x1234, 7);
        assert_eq!(mem.index_range_at(0x1234), (2, 7));
    }
}
