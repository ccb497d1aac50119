// Bindless texture table
//
// Maps backend texture handles to slots of the shader-visible texture
// array. The table only grows by emptying itself: `optimize` doubles the
// capacity (up to the ceiling), drops every registration and starts a new
// epoch, so IDs handed out before it are stale and must be re-registered.

use crate::error::{Result, ShellError};
use std::collections::HashMap;
use std::hash::Hash;

/// Upper bound on any table, independent of device limits.
pub const TEXTURE_TABLE_HARD_LIMIT: u32 = 1 << 18;

/// Slot in the texture array, tagged with the epoch it was issued in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VirtualTextureId {
    index: u32,
    epoch: u32,
}

impl VirtualTextureId {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn epoch(self) -> u32 {
        self.epoch
    }

    /// Value written into `texture_index` fields.
    pub(crate) fn shader_index(self) -> i32 {
        self.index as i32
    }
}

pub struct VirtualTextureTable<T> {
    textures: Vec<T>,
    ids: HashMap<T, u32>,
    capacity: u32,
    ceiling: u32,
    epoch: u32,
    dirty: bool,
}

impl<T: Clone + Eq + Hash> VirtualTextureTable<T> {
    /// `ceiling` is the size of the texture array in the binding layout.
    pub fn new(initial_capacity: u32, ceiling: u32) -> Self {
        let ceiling = ceiling.clamp(1, TEXTURE_TABLE_HARD_LIMIT);
        let capacity = initial_capacity.clamp(1, ceiling);
        Self {
            textures: Vec::with_capacity(capacity as usize),
            ids: HashMap::with_capacity(capacity as usize),
            capacity,
            ceiling,
            epoch: 0,
            dirty: true,
        }
    }

    /// ID for `texture`, registering it if needed.
    pub fn register(&mut self, texture: &T) -> Result<VirtualTextureId> {
        if let Some(&index) = self.ids.get(texture) {
            return Ok(self.id(index));
        }
        if self.textures.len() as u32 >= self.capacity {
            return Err(ShellError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        let index = self.textures.len() as u32;
        self.textures.push(texture.clone());
        self.ids.insert(texture.clone(), index);
        self.dirty = true;
        Ok(self.id(index))
    }

    pub fn lookup(&self, texture: &T) -> Option<VirtualTextureId> {
        self.ids.get(texture).map(|&index| self.id(index))
    }

    /// Whether `id` was issued since the last reset and is still mapped.
    pub fn is_current(&self, id: VirtualTextureId) -> bool {
        id.epoch == self.epoch && (id.index as usize) < self.textures.len()
    }

    /// Three quarters full or more. An empty table never is.
    pub fn is_suboptimal(&self) -> bool {
        let len = self.textures.len() as u64;
        len > 0 && len * 4 >= self.capacity as u64 * 3
    }

    /// Grow (bounded by the ceiling) and reset.
    pub fn optimize(&mut self) {
        let grown = self.capacity.saturating_mul(2).min(self.ceiling);
        if grown != self.capacity {
            log::debug!("texture table grows {} -> {}", self.capacity, grown);
        }
        self.capacity = grown;
        self.reset();
    }

    /// Drop every registration and start a new epoch.
    pub fn reset(&mut self) {
        self.textures.clear();
        self.ids.clear();
        self.epoch = self.epoch.wrapping_add(1);
        self.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Registered textures by slot.
    pub fn textures(&self) -> &[T] {
        &self.textures
    }

    /// Contents changed since the last `mark_clean`.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    fn id(&self, index: u32) -> VirtualTextureId {
        VirtualTextureId {
            index,
            epoch: self.epoch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_handle_same_id() {
        let mut table = VirtualTextureTable::new(4, 16);
        let a = table.register(&"a").unwrap();
        let b = table.register(&"b").unwrap();
        assert_ne!(a, b);
        assert_eq!(table.register(&"a").unwrap(), a);
        assert_eq!(table.lookup(&"b"), Some(b));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn full_table_rejects_new_handles() {
        let mut table = VirtualTextureTable::new(2, 16);
        table.register(&1).unwrap();
        table.register(&2).unwrap();
        assert!(matches!(
            table.register(&3),
            Err(ShellError::CapacityExceeded { capacity: 2 })
        ));
        // existing handles still resolve
        assert!(table.register(&1).is_ok());
    }

    #[test]
    fn suboptimal_at_three_quarters() {
        let mut table = VirtualTextureTable::new(4, 16);
        for i in 0..2 {
            table.register(&i).unwrap();
        }
        assert!(!table.is_suboptimal());
        table.register(&2).unwrap();
        assert!(table.is_suboptimal());
    }

    #[test]
    fn empty_single_slot_table_is_not_suboptimal() {
        let mut table = VirtualTextureTable::new(1, 1);
        assert!(!table.is_suboptimal());
        table.register(&0).unwrap();
        assert!(table.is_suboptimal());
    }

    #[test]
    fn optimize_doubles_up_to_the_ceiling_and_invalidates_ids() {
        let mut table = VirtualTextureTable::new(4, 6);
        let old = table.register(&"tex").unwrap();

        table.optimize();
        assert_eq!(table.capacity(), 6);
        assert!(table.is_empty());
        assert_eq!(table.epoch(), 1);
        assert!(!table.is_current(old));

        let fresh = table.register(&"tex").unwrap();
        assert!(table.is_current(fresh));
        assert_eq!(fresh.index(), old.index());
        assert_ne!(fresh, old);

        table.optimize();
        assert_eq!(table.capacity(), 6);
    }

    #[test]
    fn ceiling_is_clamped() {
        let table = VirtualTextureTable::<u32>::new(1 << 20, u32::MAX);
        assert_eq!(table.ceiling(), TEXTURE_TABLE_HARD_LIMIT);
        assert_eq!(table.capacity(), TEXTURE_TABLE_HARD_LIMIT);
    }

    #[test]
    fn dirty_tracks_changes() {
        let mut table = VirtualTextureTable::new(4, 4);
        table.mark_clean();
        table.register(&0).unwrap();
        assert!(table.is_dirty());
        table.mark_clean();
        table.register(&0).unwrap();
        assert!(!table.is_dirty());
    }
}
