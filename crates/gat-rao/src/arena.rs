//! Scratch allocation for tap rounding.
//!
//! Rounding builds a handful of short-lived maps per call; they are
//! allocated from a bumpalo arena that the optimiser resets between calls.

use bumpalo::Bump;

/// Reusable arena, owned by one optimisation run and reset before every
/// rounding pass.
///
/// # Example
///
/// ```
/// use gat_rao::arena::ScratchArena;
///
/// let mut arena = ScratchArena::new();
/// {
///     let mut margins = arena.alloc_hashmap::<i32, f64>();
///     margins.insert(3, 120.0);
/// }
/// arena.reset();
/// ```
pub struct ScratchArena {
    bump: Bump,
}

impl ScratchArena {
    pub fn new() -> Self {
        Self { bump: Bump::new() }
    }

    /// Frees every allocation at once. Arena-allocated values hold plain
    /// data and have no destructor side effects.
    pub fn reset(&mut self) {
        self.bump.reset();
    }

    pub fn alloc_vec<T>(&self) -> bumpalo::collections::Vec<'_, T> {
        bumpalo::collections::Vec::new_in(&self.bump)
    }

    pub fn alloc_hashmap<K: Eq + std::hash::Hash, V>(
        &self,
    ) -> hashbrown::HashMap<K, V, hashbrown::DefaultHashBuilder, &Bump> {
        hashbrown::HashMap::new_in(&self.bump)
    }
}

impl Default for ScratchArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_maps() {
        let arena = ScratchArena::new();
        let mut map = arena.alloc_hashmap::<i32, f64>();
        map.insert(1, 10.0);
        map.insert(1, 5.0);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&1), Some(&5.0));

        let mut vec = arena.alloc_vec::<i32>();
        vec.extend([3, 1, 2]);
        vec.sort();
        assert_eq!(vec.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_reset_allows_reuse() {
        let mut arena = ScratchArena::new();
        {
            let mut vec = arena.alloc_vec::<u64>();
            vec.extend(0..1000);
        }
        arena.reset();
        let mut vec = arena.alloc_vec::<u64>();
        vec.push(42);
        assert_eq!(vec[0], 42);
    }
}
