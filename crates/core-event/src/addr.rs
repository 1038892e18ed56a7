use std::fmt;
use std::ops::Add;

/// Storage duration of an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageDuration {
    Static,
    Automatic,
    Heap,
}

/// Whether an allocation belongs to the user program or to an internal
/// lowering (mutex state, barrier counters, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressSpace {
    User,
    Internal,
}

/// Whether a location survives crashes (persistency modeling).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageType {
    Volatile,
    Durable,
}

/// A structured address: storage class, address space, allocating thread and
/// offset packed into one word so that aliasing stays decidable and ordering
/// within an allocation class is plain integer comparison.
///
/// Layout (most significant first): 2 bits storage class, 1 bit address
/// space, 29 bits thread, 32 bits offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SAddr(u64);

const OFFSET_BITS: u32 = 32;
const THREAD_BITS: u32 = 29;
const OFFSET_MASK: u64 = (1 << OFFSET_BITS) - 1;
const THREAD_MASK: u64 = ((1 << THREAD_BITS) - 1) << OFFSET_BITS;
const INTERNAL_BIT: u64 = 1 << (OFFSET_BITS + THREAD_BITS);
const CLASS_SHIFT: u32 = OFFSET_BITS + THREAD_BITS + 1;
const CLASS_STATIC: u64 = 0;
const CLASS_AUTOMATIC: u64 = 1;
const CLASS_HEAP: u64 = 2;

impl SAddr {
    pub fn new(sd: StorageDuration, space: AddressSpace, thread: u32, offset: u64) -> Self {
        debug_assert!(offset <= OFFSET_MASK, "address offset out of range");
        debug_assert!(u64::from(thread) < (1 << THREAD_BITS), "thread id out of range");
        let class = match sd {
            StorageDuration::Static => CLASS_STATIC,
            StorageDuration::Automatic => CLASS_AUTOMATIC,
            StorageDuration::Heap => CLASS_HEAP,
        };
        let internal = match space {
            AddressSpace::User => 0,
            AddressSpace::Internal => INTERNAL_BIT,
        };
        Self((class << CLASS_SHIFT) | internal | (u64::from(thread) << OFFSET_BITS) | offset)
    }

    pub fn static_addr(offset: u64) -> Self {
        Self::new(StorageDuration::Static, AddressSpace::User, 0, offset)
    }

    pub fn storage(self) -> StorageDuration {
        match self.0 >> CLASS_SHIFT {
            CLASS_STATIC => StorageDuration::Static,
            CLASS_AUTOMATIC => StorageDuration::Automatic,
            CLASS_HEAP => StorageDuration::Heap,
            _ => unreachable!("corrupt storage class bits"),
        }
    }

    pub fn is_static(self) -> bool {
        self.storage() == StorageDuration::Static
    }

    pub fn is_automatic(self) -> bool {
        self.storage() == StorageDuration::Automatic
    }

    pub fn is_heap(self) -> bool {
        self.storage() == StorageDuration::Heap
    }

    pub fn is_internal(self) -> bool {
        self.0 & INTERNAL_BIT != 0
    }

    pub fn thread(self) -> u32 {
        ((self.0 & THREAD_MASK) >> OFFSET_BITS) as u32
    }

    pub fn offset(self) -> u64 {
        self.0 & OFFSET_MASK
    }

    /// Same storage class, space and allocating thread: offsets comparable.
    pub fn same_storage_as(self, other: SAddr) -> bool {
        (self.0 & !OFFSET_MASK) == (other.0 & !OFFSET_MASK)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// Reconstruct an address from its packed form (pointers travel through
    /// scalar registers).
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl Add<u64> for SAddr {
    type Output = SAddr;

    fn add(self, rhs: u64) -> SAddr {
        debug_assert!(self.offset() + rhs <= OFFSET_MASK, "address overflow");
        SAddr(self.0 + rhs)
    }
}

impl fmt::Display for SAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let class = match self.storage() {
            StorageDuration::Static => "G",
            StorageDuration::Automatic => "S",
            StorageDuration::Heap => "H",
        };
        let internal = if self.is_internal() { "I" } else { "" };
        write!(f, "{}{}#({}, {})", class, internal, self.thread(), self.offset())
    }
}

/// Size of an access in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ASize(u32);

impl ASize {
    pub const fn new(bytes: u32) -> Self {
        Self(bytes)
    }

    pub const fn bytes(self) -> u32 {
        self.0
    }

    pub const fn bits(self) -> u32 {
        self.0 * 8
    }
}

impl fmt::Display for ASize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the accessed bytes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AType {
    Pointer,
    Signed,
    Unsigned,
}

/// An access: address, size and interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AAccess {
    pub addr: SAddr,
    pub size: ASize,
    pub kind: AType,
}

impl AAccess {
    pub fn new(addr: SAddr, size: ASize, kind: AType) -> Self {
        Self { addr, size, kind }
    }

    pub fn is_pointer(&self) -> bool {
        self.kind == AType::Pointer
    }

    /// Whether the access covers the given address.
    pub fn contains(&self, addr: SAddr) -> bool {
        if !self.addr.same_storage_as(addr) {
            return false;
        }
        self.addr <= addr && addr < self.addr + u64::from(self.size.bytes())
    }

    /// Whether two accesses touch at least one common byte.
    pub fn overlaps(&self, other: &AAccess) -> bool {
        if !self.addr.same_storage_as(other.addr) {
            return false;
        }
        self.addr + u64::from(self.size.bytes()) > other.addr
            && self.addr < other.addr + u64::from(other.size.bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing_round_trips() {
        let a = SAddr::new(StorageDuration::Heap, AddressSpace::Internal, 7, 1024);
        assert!(a.is_heap());
        assert!(a.is_internal());
        assert_eq!(a.thread(), 7);
        assert_eq!(a.offset(), 1024);
        assert_eq!(a.to_string(), "HI#(7, 1024)");
    }

    #[test]
    fn distinct_storage_classes_never_alias() {
        let g = SAddr::static_addr(0);
        let h = SAddr::new(StorageDuration::Heap, AddressSpace::User, 0, 0);
        assert!(!g.same_storage_as(h));
        let acc = AAccess::new(g, ASize::new(8), AType::Unsigned);
        assert!(!acc.contains(h));
    }

    #[test]
    fn access_overlap_is_byte_precise() {
        let base = SAddr::static_addr(16);
        let a = AAccess::new(base, ASize::new(4), AType::Unsigned);
        let b = AAccess::new(base + 4, ASize::new(4), AType::Unsigned);
        let c = AAccess::new(base + 2, ASize::new(4), AType::Unsigned);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(b.overlaps(&c));
        assert!(a.contains(base + 3));
        assert!(!a.contains(base + 4));
    }
}
