// Chunk recording
//
// A batch is split into fixed-capacity chunks at end of frame. Chunk
// allocations are handed back afterwards and reused in the same positional
// order the next frame, so steady-state recording does not allocate.

use super::records::{ClipRegion, NO_CLIP};
use std::collections::HashMap;

/// CPU-side contents of one chunk.
pub trait Chunk: Default {
    /// Empty the chunk, keeping its allocations.
    fn clear(&mut self);
    fn is_empty(&self) -> bool;
}

/// Pool of chunk allocations for one primitive kind.
pub struct ChunkArena<C> {
    cached: Vec<C>,
}

impl<C: Chunk> Default for ChunkArena<C> {
    fn default() -> Self {
        Self { cached: Vec::new() }
    }
}

impl<C: Chunk> ChunkArena<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunks parked in the arena waiting for the next recording.
    pub fn cached_len(&self) -> usize {
        self.cached.len()
    }

    pub fn begin(&mut self) -> ChunkRecorder<C> {
        ChunkRecorder::new(std::mem::take(&mut self.cached))
    }

    /// Return recorded chunks (and any spares) for reuse.
    pub fn give_back(&mut self, recorded: RecordedChunks<C>) {
        let RecordedChunks { mut chunks, spare } = recorded;
        chunks.extend(spare);
        for chunk in &mut chunks {
            chunk.clear();
        }
        self.cached = chunks;
    }
}

pub struct ChunkRecorder<C> {
    finished: Vec<C>,
    current: C,
    recycled: std::vec::IntoIter<C>,
}

impl<C: Chunk> ChunkRecorder<C> {
    fn new(cached: Vec<C>) -> Self {
        let mut recycled = cached.into_iter();
        let current = recycled.next().unwrap_or_default();
        Self {
            finished: Vec::new(),
            current,
            recycled,
        }
    }

    pub fn current(&mut self) -> &mut C {
        &mut self.current
    }

    /// Close the current chunk and start the next one. An empty chunk is
    /// kept open instead.
    pub fn finalize_current(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let next = self.recycled.next().unwrap_or_default();
        self.finished.push(std::mem::replace(&mut self.current, next));
    }

    pub fn finish(mut self) -> RecordedChunks<C> {
        let mut spare = Vec::with_capacity(self.recycled.len() + 1);
        if self.current.is_empty() {
            spare.push(self.current);
        } else {
            self.finished.push(self.current);
        }
        spare.extend(self.recycled);
        RecordedChunks {
            chunks: self.finished,
            spare,
        }
    }
}

/// Non-empty chunks of one frame, in draw order.
pub struct RecordedChunks<C> {
    chunks: Vec<C>,
    spare: Vec<C>,
}

impl<C> RecordedChunks<C> {
    pub fn chunks(&self) -> &[C] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Per-chunk clip list; identical regions share one slot.
#[derive(Debug, Default)]
pub struct ClipTable {
    regions: Vec<ClipRegion>,
    lookup: HashMap<[u32; 4], i32>,
}

impl ClipTable {
    /// Index to store in a record, or `NO_CLIP`.
    pub fn index_of(&mut self, clip: Option<&ClipRegion>) -> i32 {
        let Some(clip) = clip else {
            return NO_CLIP;
        };
        let regions = &mut self.regions;
        *self.lookup.entry(clip.key()).or_insert_with(|| {
            regions.push(*clip);
            (regions.len() - 1) as i32
        })
    }

    pub fn regions(&self) -> &[ClipRegion] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn clear(&mut self) {
        self.regions.clear();
        self.lookup.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    #[derive(Default)]
    struct Numbers(Vec<u32>);

    impl Chunk for Numbers {
        fn clear(&mut self) {
            self.0.clear();
        }
        fn is_empty(&self) -> bool {
            self.0.is_empty()
        }
    }

    fn record(arena: &mut ChunkArena<Numbers>, values: &[u32], capacity: usize) -> RecordedChunks<Numbers> {
        let mut recorder = arena.begin();
        for &v in values {
            if recorder.current().0.len() + 1 > capacity {
                recorder.finalize_current();
            }
            recorder.current().0.push(v);
        }
        recorder.finish()
    }

    #[test]
    fn splits_at_capacity() {
        let mut arena = ChunkArena::new();
        let recorded = record(&mut arena, &[1, 2, 3, 4, 5], 2);
        let sizes: Vec<_> = recorded.chunks().iter().map(|c| c.0.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn chunks_are_reused_after_give_back() {
        let mut arena = ChunkArena::new();
        let recorded = record(&mut arena, &[1, 2, 3, 4, 5, 6], 2);
        let first_capacity = recorded.chunks()[0].0.capacity();
        arena.give_back(recorded);
        assert_eq!(arena.cached_len(), 3);

        // a smaller frame keeps the surplus as spares
        let recorded = record(&mut arena, &[7], 2);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded.chunks()[0].0, vec![7]);
        assert!(recorded.chunks()[0].0.capacity() >= first_capacity);
        arena.give_back(recorded);
        assert_eq!(arena.cached_len(), 3);
    }

    #[test]
    fn empty_recording_yields_no_chunks() {
        let mut arena: ChunkArena<Numbers> = ChunkArena::new();
        let recorded = record(&mut arena, &[], 4);
        assert!(recorded.is_empty());
        arena.give_back(recorded);
        assert_eq!(arena.cached_len(), 1);
    }

    #[test]
    fn identical_clips_share_an_index() {
        let mut clips = ClipTable::default();
        let a = ClipRegion::new(Vec2::ZERO, Vec2::splat(10.0));
        let b = ClipRegion::new(Vec2::ZERO, Vec2::splat(20.0));

        assert_eq!(clips.index_of(None), NO_CLIP);
        assert_eq!(clips.index_of(Some(&a)), 0);
        assert_eq!(clips.index_of(Some(&b)), 1);
        assert_eq!(clips.index_of(Some(&a)), 0);
        assert_eq!(clips.len(), 2);

        clips.clear();
        assert_eq!(clips.index_of(Some(&b)), 0);
    }
}
