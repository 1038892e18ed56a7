use ahash::AHashMap;
use core_event::{AddressSpace, SAddr, StorageDuration};

/// Address arena for the simulated program: dispenses structured addresses
/// for heap and stack allocations and tracks live regions so frees can be
/// validated and restriction can release regions allocated past a cut.
///
/// Only addresses live here; the values stored at them are read off the
/// execution graph.
#[derive(Debug, Clone, Default)]
pub struct Arena {
    /// Next free offset per (thread, duration) allocation class.
    next_heap: u64,
    next_auto: AHashMap<u32, u64>,
    /// Live regions: base address -> size.
    regions: AHashMap<SAddr, u64>,
    /// Next file descriptor for the persistency stubs.
    next_fd: u64,
}

impl Arena {
    pub fn new() -> Self {
        // Offset 0 is reserved so no allocation aliases a null pointer.
        Self { next_heap: 8, next_auto: AHashMap::new(), regions: AHashMap::new(), next_fd: 3 }
    }

    pub fn alloc(
        &mut self,
        thread: u32,
        size: u64,
        align: u64,
        duration: StorageDuration,
        space: AddressSpace,
    ) -> SAddr {
        let align = align.max(1);
        let bump = |next: &mut u64| {
            *next = (*next + align - 1) / align * align;
            let at = *next;
            *next += size.max(1);
            at
        };
        let addr = match duration {
            StorageDuration::Heap => SAddr::new(duration, space, 0, bump(&mut self.next_heap)),
            StorageDuration::Automatic => {
                let next = self.next_auto.entry(thread).or_insert(8);
                SAddr::new(duration, space, thread, bump(next))
            }
            StorageDuration::Static => {
                unreachable!("statics are laid out by the module, not the arena")
            }
        };
        self.regions.insert(addr, size);
        addr
    }

    /// Whether `addr` is the base of a live region.
    pub fn is_live_base(&self, addr: SAddr) -> bool {
        self.regions.contains_key(&addr)
    }

    /// Release a region; false when `addr` is not a live base (double or
    /// wild free).
    pub fn free(&mut self, addr: SAddr) -> bool {
        self.regions.remove(&addr).is_some()
    }

    /// Live heap regions, for leak reporting.
    pub fn live_heap_regions(&self) -> Vec<(SAddr, u64)> {
        let mut v: Vec<_> = self
            .regions
            .iter()
            .filter(|(a, _)| a.is_heap())
            .map(|(a, s)| (*a, *s))
            .collect();
        v.sort_unstable();
        v
    }

    pub fn fresh_fd(&mut self) -> u64 {
        let fd = self.next_fd;
        self.next_fd += 1;
        fd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_do_not_overlap() {
        let mut a = Arena::new();
        let p = a.alloc(0, 16, 8, StorageDuration::Heap, AddressSpace::User);
        let q = a.alloc(0, 16, 8, StorageDuration::Heap, AddressSpace::User);
        assert!(p.same_storage_as(q));
        assert!(q.offset() >= p.offset() + 16);
    }

    #[test]
    fn double_free_is_caught() {
        let mut a = Arena::new();
        let p = a.alloc(0, 8, 8, StorageDuration::Heap, AddressSpace::User);
        assert!(a.free(p));
        assert!(!a.free(p));
    }

    #[test]
    fn stack_allocations_are_per_thread() {
        let mut a = Arena::new();
        let p = a.alloc(1, 8, 8, StorageDuration::Automatic, AddressSpace::User);
        let q = a.alloc(2, 8, 8, StorageDuration::Automatic, AddressSpace::User);
        assert!(!p.same_storage_as(q));
        assert_eq!(p.thread(), 1);
    }

    #[test]
    fn leak_report_lists_live_heap_only() {
        let mut a = Arena::new();
        let p = a.alloc(0, 8, 8, StorageDuration::Heap, AddressSpace::User);
        let _s = a.alloc(0, 8, 8, StorageDuration::Automatic, AddressSpace::User);
        let q = a.alloc(0, 4, 4, StorageDuration::Heap, AddressSpace::Internal);
        a.free(q);
        assert_eq!(a.live_heap_regions(), vec![(p, 8)]);
    }
}
