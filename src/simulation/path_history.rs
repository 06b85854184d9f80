use crate::direction::{Direction, Vector};

/// A run of steps in one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub direction: Direction,
    pub distance: i32,
}

/// A segment of the reconstructed path together with the displacement from
/// the walk's origin reached after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegratedSegment {
    pub direction: Direction,
    pub distance: i32,
    pub position: Vector,
}

/// Lossy multi-resolution record of a walk. Level 0 holds single steps in a
/// ring of `partition_size` slots; whenever a level wraps, its two oldest
/// segments are merged into one coarser segment and carried to the next
/// level. Old history thereby loses detail but roughly keeps its
/// displacement, storing on the order of `2^levels * partition_size` steps
/// in bounded memory.
#[derive(Debug, Clone)]
pub struct PathHistory {
    partition_size: usize,
    heads: Vec<usize>,
    levels: Vec<Vec<Option<Segment>>>,
}

impl PathHistory {
    pub fn new(partition_size: usize, levels: usize) -> Self {
        assert!(partition_size >= 2, "partition size must hold at least two segments");
        assert!(levels >= 1, "need at least one detail level");
        Self {
            partition_size,
            heads: vec![0; levels],
            levels: vec![vec![None; partition_size]; levels],
        }
    }

    pub fn push(&mut self, step: Direction) {
        self.push_carry(
            Segment {
                direction: step,
                distance: 1,
            },
            0,
        );
    }

    pub fn reset(&mut self) {
        for head in &mut self.heads {
            *head = 0;
        }
        for level in &mut self.levels {
            level.fill(None);
        }
    }

    /// Reconstruct the recorded walk, newest segment first. Each entry's
    /// `position` is the displacement from the walk's origin accumulated up
    /// to and including that segment, so the first entry carries the walk's
    /// total displacement.
    pub fn integrate_path(&self) -> Vec<IntegratedSegment> {
        let mut path = Vec::with_capacity(self.partition_size * self.levels.len());
        let mut pos = Vector::ZERO;
        for lod in (0..self.levels.len()).rev() {
            let level = &self.levels[lod];
            for offset in 0..level.len() {
                // Start at the oldest slot.
                let index = (self.heads[lod] + offset) % self.partition_size;
                let Some(segment) = level[index] else { continue };
                pos += Vector::new(
                    segment.direction.dx() * segment.distance,
                    segment.direction.dy() * segment.distance,
                );
                path.push(IntegratedSegment {
                    direction: segment.direction,
                    distance: segment.distance,
                    position: pos,
                });
            }
        }
        path.reverse();
        path
    }

    fn push_carry(&mut self, carry: Segment, lod: usize) {
        if lod >= self.levels.len() {
            return;
        }

        let head = self.heads[lod];
        let next = (head + 1) % self.partition_size;
        let level = &mut self.levels[lod];
        let oldest = level[head];

        level[head] = Some(carry);
        self.heads[lod] = next;

        // The last level can't carry over, its oldest just gets overwritten.
        if let Some(oldest) = oldest
            && lod < self.levels.len() - 1
        {
            let next_oldest = self.levels[lod][next].take();
            if let Some(carry) = merge(oldest, next_oldest) {
                self.push_carry(carry, lod + 1);
            }
        }
    }
}

/// Merge two runs into one coarser segment pointing at their combined
/// displacement. Returns `None` when the runs cancel out exactly.
fn merge(a: Segment, b: Option<Segment>) -> Option<Segment> {
    let mut dx = a.direction.dx() * a.distance;
    let mut dy = a.direction.dy() * a.distance;
    if let Some(b) = b {
        dx += b.direction.dx() * b.distance;
        dy += b.direction.dy() * b.distance;
    }
    let direction = Direction::from_delta(dx, dy)?;
    Some(Segment {
        direction,
        distance: dx.abs().max(dy.abs()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn displacement(path: &[IntegratedSegment]) -> Vector {
        let mut pos = Vector::ZERO;
        for segment in path {
            pos += Vector::new(
                segment.direction.dx() * segment.distance,
                segment.direction.dy() * segment.distance,
            );
        }
        pos
    }

    #[test]
    fn short_walk_is_reproduced_exactly() {
        let mut history = PathHistory::new(8, 3);
        for _ in 0..3 {
            history.push(Direction::East);
        }
        history.push(Direction::South);

        let path = history.integrate_path();
        assert_eq!(path.len(), 4);
        // Newest first, oldest last.
        assert_eq!(path[0].direction, Direction::South);
        assert_eq!(path[3].direction, Direction::East);
        // The newest entry carries the total displacement, the oldest only
        // its own first step.
        assert_eq!(path[0].position, Vector::new(3, 1));
        assert_eq!(path[3].position, Vector::new(1, 0));
        assert_eq!(displacement(&path), Vector::new(3, 1));
    }

    #[test]
    fn overflow_carries_into_coarser_levels() {
        let mut history = PathHistory::new(4, 4);
        for _ in 0..40 {
            history.push(Direction::East);
        }
        let path = history.integrate_path();
        // Detail is lost but the total displacement survives in coarser runs.
        assert!(path.len() < 40);
        assert_eq!(displacement(&path), Vector::new(40, 0));
        assert!(path.iter().all(|s| s.direction == Direction::East));
    }

    #[test]
    fn opposite_runs_cancel_in_the_carry() {
        let mut history = PathHistory::new(2, 3);
        history.push(Direction::North);
        history.push(Direction::South);
        // Both fit into level 0; force a carry of the cancelled pair.
        history.push(Direction::East);
        history.push(Direction::West);
        history.push(Direction::East);

        assert_eq!(displacement(&history.integrate_path()), Vector::new(1, 0));
    }

    #[test]
    fn reset_clears_everything() {
        let mut history = PathHistory::new(4, 2);
        for _ in 0..10 {
            history.push(Direction::SouthWest);
        }
        history.reset();
        assert!(history.integrate_path().is_empty());
    }

    #[test]
    fn alternating_walk_within_capacity_keeps_its_displacement() {
        // 8 slots over 7 levels store on the order of a thousand steps.
        let mut history = PathHistory::new(8, 7);
        for i in 0..500 {
            history.push(if i % 2 == 0 {
                Direction::East
            } else {
                Direction::South
            });
        }
        // Adjacent east/south steps merge into exact diagonal runs, so no
        // displacement is lost to quantization.
        let got = displacement(&history.integrate_path());
        assert_eq!(got, Vector::new(250, 250));
    }

    #[test]
    fn overflowing_the_top_level_drops_the_oldest_steps() {
        // 8 * (1 + 2 + 4 + 8 + 16) slots hold roughly 248 steps.
        let mut history = PathHistory::new(8, 5);
        for _ in 0..500 {
            history.push(Direction::East);
        }
        let path = history.integrate_path();
        assert!(path.iter().all(|s| s.direction == Direction::East));
        let got = displacement(&path);
        assert_eq!(got.y, 0);
        assert!(got.x < 500, "old history was not dropped: {got:?}");
        assert!(got.x >= 200, "recent history was dropped too: {got:?}");
    }
}
