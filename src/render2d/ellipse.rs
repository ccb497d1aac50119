// Ellipse batching
//
// Shapes carry no vertex data; each chunk is one structured buffer of
// `EllipseShape` records drawn as 6 vertices per shape.

use super::chunk::{Chunk, ChunkArena, ClipTable, RecordedChunks};
use super::records::{ClipRegion, EllipseShape, NO_CLIP};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EllipseRecord {
    /// `clip_index` is filled in when the record lands in a chunk.
    pub shape: EllipseShape,
    pub depth: i32,
    pub clip: Option<ClipRegion>,
}

#[derive(Debug, Default)]
pub struct EllipseChunk {
    pub shapes: Vec<EllipseShape>,
    pub clips: ClipTable,
}

impl Chunk for EllipseChunk {
    fn clear(&mut self) {
        self.shapes.clear();
        self.clips.clear();
    }

    fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

#[derive(Default)]
pub struct EllipseBatch {
    records: Vec<EllipseRecord>,
    arena: ChunkArena<EllipseChunk>,
}

impl EllipseBatch {
    pub fn push(&mut self, record: EllipseRecord) {
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

    pub fn record_chunks(&mut self, capacity: usize) -> RecordedChunks<EllipseChunk> {
        let capacity = capacity.max(1);
        self.records
            .sort_by_key(|r| (r.depth, r.shape.texture_index));

        let mut recorder = self.arena.begin();
        for record in &self.records {
            if recorder.current().shapes.len() + 1 > capacity {
                recorder.finalize_current();
            }
            let chunk = recorder.current();
            let mut shape = record.shape;
            shape.clip_index = chunk.clips.index_of(record.clip.as_ref());
            chunk.shapes.push(shape);
        }
        recorder.finish()
    }

    pub fn give_back(&mut self, recorded: RecordedChunks<EllipseChunk>) {
        self.arena.give_back(recorded);
    }
}

pub(crate) fn unclipped_shape() -> EllipseShape {
    EllipseShape {
        clip_index: NO_CLIP,
        ..bytemuck::Zeroable::zeroed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    fn record(depth: i32, texture_index: i32, clip: Option<ClipRegion>) -> EllipseRecord {
        EllipseRecord {
            shape: EllipseShape {
                texture_index,
                tint: depth as u32,
                ..unclipped_shape()
            },
            depth,
            clip,
        }
    }

    #[test]
    fn clip_indices_are_per_chunk() {
        let clip = ClipRegion::new(Vec2::ZERO, Vec2::ONE);
        let mut batch = EllipseBatch::default();
        batch.push(record(0, -1, Some(clip)));
        batch.push(record(0, -1, Some(clip)));
        batch.push(record(0, -1, None));
        batch.push(record(0, -1, Some(clip)));

        let recorded = batch.record_chunks(3);
        let first = &recorded.chunks()[0];
        let indices: Vec<_> = first.shapes.iter().map(|s| s.clip_index).collect();
        assert_eq!(indices, vec![0, 0, NO_CLIP]);
        assert_eq!(first.clips.len(), 1);

        let second = &recorded.chunks()[1];
        assert_eq!(second.shapes[0].clip_index, 0);
        assert_eq!(second.clips.regions(), &[clip]);
    }

    #[test]
    fn deeper_shapes_draw_later() {
        let mut batch = EllipseBatch::default();
        batch.push(record(3, -1, None));
        batch.push(record(-2, -1, None));
        batch.push(record(0, 1, None));
        batch.push(record(0, -1, None));

        let recorded = batch.record_chunks(8);
        let order: Vec<_> = recorded.chunks()[0]
            .shapes
            .iter()
            .map(|s| (s.tint as i32, s.texture_index))
            .collect();
        assert_eq!(order, vec![(-2, -1), (0, -1), (0, 1), (3, -1)]);
    }
}
