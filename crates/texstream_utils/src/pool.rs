use std::num::NonZeroU32;

/// Untyped handle for a [`HandlePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    pub index: u32,
    pub generation: NonZeroU32,
}

/// Generational storage used by device backends to hand out resource IDs. Values of type `T` are
/// accessed via handles carrying a 32-bit index and a generation count, the latter being used
/// as a simple use-after-free test.
///
/// Unlike typical pools, accessors never panic on stale handles. Backends forward bad handles
/// coming from user code, so they're reported as [`None`] and turned into proper errors upstream.
///
/// ## Example
/// ```
/// # use texstream_utils::HandlePool;
/// let mut pool: HandlePool<u32> = HandlePool::new();
///
/// let handle = pool.allocate(10);
/// assert_eq!(pool.get(handle), Some(&10));
///
/// // Released handles become invalid
/// assert_eq!(pool.release(handle), Some(10));
/// assert!(pool.get(handle).is_none());
/// ```
#[derive(Debug, Clone)]
pub struct HandlePool<T> {
    top_generation: NonZeroU32,
    free_indices: Vec<u32>,
    slots: Vec<Option<(NonZeroU32, T)>>,
}

impl<T> HandlePool<T> {
    pub fn new() -> Self {
        Self {
            top_generation: NonZeroU32::MIN,
            free_indices: vec![],
            slots: vec![],
        }
    }

    /// Stores `value` and returns its handle.
    ///
    /// ## Panics
    ///  * On 32-bit index overflow
    ///  * On 32-bit generation overflow (after allocating over 4 294 967 294 entries total)
    pub fn allocate(&mut self, value: T) -> PoolHandle {
        let generation = self.top_generation;
        self.top_generation = generation.checked_add(1).expect("pool generation overflow");

        let index = match self.free_indices.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(self.slots.len()).expect("pool index overflow");
                self.slots.push(None);
                index
            }
        };

        self.slots[index as usize] = Some((generation, value));
        PoolHandle { index, generation }
    }

    /// Removes an entry, giving the value back. Stale handles return [`None`].
    pub fn release(&mut self, handle: PoolHandle) -> Option<T> {
        if !self.is_valid(handle) {
            return None;
        }
        self.free_indices.push(handle.index);
        self.slots[handle.index as usize]
            .take()
            .map(|(_, value)| value)
    }

    pub fn get(&self, handle: PoolHandle) -> Option<&T> {
        match self.slots.get(handle.index as usize) {
            Some(Some((generation, value))) if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut T> {
        match self.slots.get_mut(handle.index as usize) {
            Some(Some((generation, value))) if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn is_valid(&self, handle: PoolHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Counts how many entries are occupied. Linear scan.
    pub fn count_allocated(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

impl<T> Default for HandlePool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::HandlePool;

    #[test]
    pub fn released_slots_are_reused_with_new_generations() {
        let mut pool = HandlePool::new();
        let a = pool.allocate("staging");
        let b = pool.allocate("texture");

        assert_eq!(pool.count_allocated(), 2);
        assert_eq!(pool.release(a), Some("staging"));
        assert_eq!(pool.release(a), None);

        let c = pool.allocate("fence");
        assert_eq!(c.index, a.index);
        assert_ne!(c.generation, a.generation);

        assert!(pool.get(a).is_none());
        assert_eq!(pool.get(b), Some(&"texture"));
        assert_eq!(pool.get(c), Some(&"fence"));
        assert_eq!(pool.count_allocated(), 2);
    }

    #[test]
    pub fn mutation_goes_through_valid_handles_only() {
        let mut pool = HandlePool::new();
        let a = pool.allocate(vec![0u8; 4]);
        pool.get_mut(a).unwrap()[2] = 9;
        assert_eq!(pool.get(a).unwrap(), &[0, 0, 9, 0]);

        pool.release(a);
        assert!(pool.get_mut(a).is_none());
    }
}
