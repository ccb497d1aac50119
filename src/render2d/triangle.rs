// Triangle and quad batching
//
// Records are sorted by (depth, texture index) before chunking; the sort is
// stable so equal keys keep submission order.

use super::chunk::{Chunk, ChunkArena, ClipTable, RecordedChunks};
use super::records::{ClipRegion, TriangleInstance, TriangleVertex};
use glam::Vec2;

/// One queued triangle or quad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleRecord {
    pub positions: [Vec2; 4],
    pub tex_coords: [Vec2; 4],
    pub is_quad: bool,
    pub texture_index: i32,
    pub tint: u32,
    pub depth: i32,
    pub clip: Option<ClipRegion>,
}

impl TriangleRecord {
    fn sort_key(&self) -> (i32, i32) {
        (self.depth, self.texture_index)
    }
}

#[derive(Debug, Default)]
pub struct TriangleChunk {
    pub vertices: Vec<TriangleVertex>,
    pub indices: Vec<u32>,
    pub instances: Vec<TriangleInstance>,
    pub clips: ClipTable,
}

impl TriangleChunk {
    fn push(&mut self, record: &TriangleRecord) {
        let instance_index = self.instances.len() as u32;
        let clip_index = self.clips.index_of(record.clip.as_ref());
        self.instances.push(TriangleInstance {
            tint: record.tint,
            texture_index: record.texture_index,
            clip_index,
        });

        let base = self.vertices.len() as u32;
        let corners = if record.is_quad { 4 } else { 3 };
        for i in 0..corners {
            self.vertices.push(TriangleVertex {
                position: record.positions[i].to_array(),
                tex_coords: record.tex_coords[i].to_array(),
                instance_index,
            });
        }

        if record.is_quad {
            // TL, TR, BR, BL
            self.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        } else {
            self.indices.extend_from_slice(&[base, base + 1, base + 2]);
        }
    }
}

impl Chunk for TriangleChunk {
    fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.instances.clear();
        self.clips.clear();
    }

    fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[derive(Default)]
pub struct TriangleBatch {
    records: Vec<TriangleRecord>,
    arena: ChunkArena<TriangleChunk>,
}

impl TriangleBatch {
    pub fn push(&mut self, record: TriangleRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Sort and split into chunks of at most `capacity` primitives.
    pub fn record_chunks(&mut self, capacity: usize) -> RecordedChunks<TriangleChunk> {
        let capacity = capacity.max(1);
        self.records.sort_by_key(TriangleRecord::sort_key);

        let mut recorder = self.arena.begin();
        for record in &self.records {
            if recorder.current().instances.len() + 1 > capacity {
                recorder.finalize_current();
            }
            recorder.current().push(record);
        }
        recorder.finish()
    }

    pub fn give_back(&mut self, recorded: RecordedChunks<TriangleChunk>) {
        self.arena.give_back(recorded);
    }
}
