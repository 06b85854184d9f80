use std::sync::{Arc, Mutex};

use crate::simulation::chunk::Chunk;

/// Expansions always grow the map by at least this many chunks per side.
pub const MIN_EXPAND_AMOUNT: i32 = 2;
/// Radius of chunks allocated around an accessed chunk.
pub const EDGE_CHUNKS: i32 = 2;
/// Radius of chunks populated around an accessed chunk.
pub const POPULATED_EDGE_CHUNKS: i32 = 1;

pub const BATCH_COUNT: usize = 9;

struct MapInner {
    chunks: Vec<Option<Arc<Chunk>>>,
    offset_x: i32,
    offset_y: i32,
    size_x: i32,
    size_y: i32,
    /// Chunks colored by (x mod 3, y mod 3) so no batch contains two
    /// neighboring chunks.
    batches: [Vec<Arc<Chunk>>; BATCH_COUNT],
}

/// Dense, grow-only array of lazily allocated chunks, addressed by signed
/// chunk coordinates via an offset. Allocation around an accessed chunk is
/// eager (radius [`EDGE_CHUNKS`]) so neighbor lookups during a tick always
/// find a chunk.
pub struct ChunkMap {
    inner: Mutex<MapInner>,
}

impl ChunkMap {
    pub fn new(initial_size: i32) -> Self {
        Self {
            inner: Mutex::new(MapInner {
                chunks: vec![None; (initial_size * initial_size) as usize],
                offset_x: -initial_size / 2,
                offset_y: -initial_size / 2,
                size_x: initial_size,
                size_y: initial_size,
                batches: Default::default(),
            }),
        }
    }

    /// Get the chunk at the given coordinates, allocating it and its
    /// neighborhood when missing. The flag reports whether the caller still
    /// needs to populate the surrounding group.
    pub fn ensure(&self, chunk_x: i32, chunk_y: i32) -> (Arc<Chunk>, bool) {
        let mut inner = self.inner.lock().expect("chunk map poisoned");
        inner.expand_to(chunk_x + EDGE_CHUNKS, chunk_y + EDGE_CHUNKS);
        inner.expand_to(chunk_x - EDGE_CHUNKS, chunk_y - EDGE_CHUNKS);

        let center = match inner.get(chunk_x, chunk_y) {
            Some(chunk) => chunk,
            None => inner.allocate_group(chunk_x, chunk_y),
        };
        let needs_population = !center.has_complete_neighbors();
        if needs_population {
            // The group may be partially allocated from a neighboring access.
            inner.allocate_group(chunk_x, chunk_y);
        }
        (center, needs_population)
    }

    pub fn get_or_null(&self, chunk_x: i32, chunk_y: i32) -> Option<Arc<Chunk>> {
        self.inner
            .lock()
            .expect("chunk map poisoned")
            .get(chunk_x, chunk_y)
    }

    /// The population group around a chunk. All members must already be
    /// allocated.
    pub fn population_group(&self, chunk_x: i32, chunk_y: i32) -> Vec<Arc<Chunk>> {
        let inner = self.inner.lock().expect("chunk map poisoned");
        let mut group = Vec::new();
        for dy in -POPULATED_EDGE_CHUNKS..=POPULATED_EDGE_CHUNKS {
            for dx in -POPULATED_EDGE_CHUNKS..=POPULATED_EDGE_CHUNKS {
                let chunk = inner
                    .get(chunk_x + dx, chunk_y + dy)
                    .expect("population group member not allocated");
                group.push(chunk);
            }
        }
        group
    }

    /// Snapshot of the batch lists for one tick.
    pub fn batches(&self) -> [Vec<Arc<Chunk>>; BATCH_COUNT] {
        self.inner.lock().expect("chunk map poisoned").batches.clone()
    }

    /// Snapshot of every allocated chunk.
    pub fn snapshot(&self) -> Vec<Arc<Chunk>> {
        let inner = self.inner.lock().expect("chunk map poisoned");
        inner.chunks.iter().flatten().cloned().collect()
    }
}

impl MapInner {
    fn index(&self, chunk_x: i32, chunk_y: i32) -> usize {
        let ix = chunk_x - self.offset_x;
        let iy = chunk_y - self.offset_y;
        (ix + iy * self.size_x) as usize
    }

    fn is_inside(&self, chunk_x: i32, chunk_y: i32) -> bool {
        chunk_x >= self.offset_x
            && chunk_y >= self.offset_y
            && chunk_x < self.offset_x + self.size_x
            && chunk_y < self.offset_y + self.size_y
    }

    fn get(&self, chunk_x: i32, chunk_y: i32) -> Option<Arc<Chunk>> {
        if !self.is_inside(chunk_x, chunk_y) {
            return None;
        }
        self.chunks[self.index(chunk_x, chunk_y)].clone()
    }

    /// Allocate the group of chunks around the center, returning the center.
    fn allocate_group(&mut self, chunk_x: i32, chunk_y: i32) -> Arc<Chunk> {
        let mut center = None;
        for dy in -EDGE_CHUNKS..=EDGE_CHUNKS {
            for dx in -EDGE_CHUNKS..=EDGE_CHUNKS {
                let (x, y) = (chunk_x + dx, chunk_y + dy);
                let index = self.index(x, y);
                let chunk = match &self.chunks[index] {
                    Some(chunk) => Arc::clone(chunk),
                    None => {
                        let chunk = Arc::new(Chunk::new(x, y));
                        self.chunks[index] = Some(Arc::clone(&chunk));
                        self.batches[batch_of(x, y)].push(Arc::clone(&chunk));
                        chunk
                    }
                };
                if dx == 0 && dy == 0 {
                    center = Some(chunk);
                }
            }
        }
        center.expect("center chunk not allocated")
    }

    fn expand_to(&mut self, chunk_x: i32, chunk_y: i32) {
        let dx = chunk_x - self.offset_x;
        let dy = chunk_y - self.offset_y;

        let mut ex = 0;
        let mut ey = 0;
        if dx < 0 {
            ex = dx;
        } else if dx >= self.size_x {
            ex = dx - self.size_x + 1;
        }
        if dy < 0 {
            ey = dy;
        } else if dy >= self.size_y {
            ey = dy - self.size_y + 1;
        }
        self.expand(ex, ey);
    }

    fn expand(&mut self, ex: i32, ey: i32) {
        if ex == 0 && ey == 0 {
            return;
        }
        let ex = ex.signum() * ex.abs().max(MIN_EXPAND_AMOUNT);
        let ey = ey.signum() * ey.abs().max(MIN_EXPAND_AMOUNT);

        let new_size_x = self.size_x + ex.abs();
        let new_size_y = self.size_y + ey.abs();
        let new_offset_x = self.offset_x + ex.min(0);
        let new_offset_y = self.offset_y + ey.min(0);

        let mut new_chunks = vec![None; (new_size_x * new_size_y) as usize];
        for new_iy in 0..new_size_y {
            for new_ix in 0..new_size_x {
                let x = new_ix + new_offset_x;
                let y = new_iy + new_offset_y;
                let old_ix = x - self.offset_x;
                let old_iy = y - self.offset_y;
                if old_ix >= 0 && old_iy >= 0 && old_ix < self.size_x && old_iy < self.size_y {
                    let old_index = (old_ix + old_iy * self.size_x) as usize;
                    new_chunks[(new_ix + new_iy * new_size_x) as usize] =
                        self.chunks[old_index].take();
                }
            }
        }

        self.size_x = new_size_x;
        self.size_y = new_size_y;
        self.offset_x = new_offset_x;
        self.offset_y = new_offset_y;
        self.chunks = new_chunks;
    }
}

/// Batch color of a chunk; neighbors never share one.
fn batch_of(chunk_x: i32, chunk_y: i32) -> usize {
    (chunk_x.rem_euclid(3) + chunk_y.rem_euclid(3) * 3) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_is_idempotent_and_returns_the_same_chunk() {
        let map = ChunkMap::new(7);
        let (first, needs) = map.ensure(0, 0);
        assert!(needs);
        let (second, _) = map.ensure(0, 0);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(
            &first,
            &map.get_or_null(0, 0).expect("chunk allocated")
        ));
    }

    #[test]
    fn neighborhood_is_allocated_eagerly() {
        let map = ChunkMap::new(7);
        map.ensure(0, 0);
        for dy in -EDGE_CHUNKS..=EDGE_CHUNKS {
            for dx in -EDGE_CHUNKS..=EDGE_CHUNKS {
                assert!(map.get_or_null(dx, dy).is_some(), "missing {dx},{dy}");
            }
        }
        assert!(map.get_or_null(EDGE_CHUNKS + 1, 0).is_none());
    }

    #[test]
    fn expansion_preserves_existing_chunks() {
        let map = ChunkMap::new(7);
        let (origin, _) = map.ensure(0, 0);
        let (far, _) = map.ensure(-40, 23);
        assert!(!Arc::ptr_eq(&origin, &far));
        assert!(Arc::ptr_eq(
            &origin,
            &map.get_or_null(0, 0).expect("chunk survived expansion")
        ));
        assert_eq!(far.chunk_x(), -40);
        assert_eq!(far.chunk_y(), 23);
    }

    #[test]
    fn neighboring_chunks_never_share_a_batch() {
        let map = ChunkMap::new(7);
        for x in -4..4 {
            for y in -4..4 {
                map.ensure(x, y);
            }
        }
        let batches = map.batches();
        let total: usize = batches.iter().map(Vec::len).sum();
        assert_eq!(total, map.snapshot().len());

        for batch in &batches {
            for a in batch {
                for b in batch {
                    if Arc::ptr_eq(a, b) {
                        continue;
                    }
                    let dx = (a.chunk_x() - b.chunk_x()).abs();
                    let dy = (a.chunk_y() - b.chunk_y()).abs();
                    assert!(dx > 1 || dy > 1, "adjacent chunks share a batch");
                }
            }
        }
    }

    #[test]
    fn population_flag_clears_after_marking_complete() {
        let map = ChunkMap::new(7);
        let (chunk, needs) = map.ensure(2, 2);
        assert!(needs);
        chunk.set_has_complete_neighbors(true);
        let (_, needs) = map.ensure(2, 2);
        assert!(!needs);
    }
}
