// Line batching. Lines keep submission order and never split a vertex pair.

use super::chunk::{Chunk, ChunkArena, RecordedChunks};
use super::records::LineVertex;
use glam::Vec2;

#[derive(Debug, Default)]
pub struct LineChunk {
    pub vertices: Vec<LineVertex>,
}

impl Chunk for LineChunk {
    fn clear(&mut self) {
        self.vertices.clear();
    }

    fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

#[derive(Default)]
pub struct LineBatch {
    vertices: Vec<LineVertex>,
    arena: ChunkArena<LineChunk>,
}

impl LineBatch {
    pub fn push(&mut self, p0: Vec2, color0: u32, p1: Vec2, color1: u32) {
        self.vertices.push(LineVertex {
            position: p0.to_array(),
            color: color0,
        });
        self.vertices.push(LineVertex {
            position: p1.to_array(),
            color: color1,
        });
    }

    /// Queued lines.
    pub fn len(&self) -> usize {
        self.vertices.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
    }

    /// Split into chunks of at most `vertex_capacity` vertices, rounded down
    /// to whole lines.
    pub fn record_chunks(&mut self, vertex_capacity: usize) -> RecordedChunks<LineChunk> {
        let line_capacity = (vertex_capacity / 2).max(1);

        let mut recorder = self.arena.begin();
        for pair in self.vertices.chunks_exact(2) {
            if recorder.current().vertices.len() / 2 + 1 > line_capacity {
                recorder.finalize_current();
            }
            recorder.current().vertices.extend_from_slice(pair);
        }
        recorder.finish()
    }

    pub fn give_back(&mut self, recorded: RecordedChunks<LineChunk>) {
        self.arena.give_back(recorded);
    }
}
