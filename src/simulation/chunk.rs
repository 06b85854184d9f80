use std::collections::HashSet;
use std::sync::{Condvar, Mutex};

use crate::config::WorldParameters;
use crate::direction::Vector;
use crate::simulation::cell::Cell;
use crate::simulation::entity::EntityRef;
use crate::simulation::generator::WorldGenerator;
use crate::simulation::sync::WorkerId;

pub const CHUNK_SIZE_SHIFT: i32 = 5;
pub const CHUNK_SIZE: i32 = 1 << CHUNK_SIZE_SHIFT;

/// Converts a cell x-coordinate to a chunk x-coordinate.
#[inline(always)]
pub fn to_chunk_x(cell_x: i32) -> i32 {
    cell_x >> CHUNK_SIZE_SHIFT
}

/// Converts a cell y-coordinate to a chunk y-coordinate.
#[inline(always)]
pub fn to_chunk_y(cell_y: i32) -> i32 {
    cell_y >> CHUNK_SIZE_SHIFT
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendState {
    Awake,
    Suspended,
}

/// The cell payload of a chunk, guarded by a single mutex so a probe or
/// write touches the grid only for the duration of the access.
#[derive(Debug)]
struct CellGrid {
    cells: Vec<Cell>,
    states: Vec<SuspendState>,
    state: SuspendState,
    populated: bool,
    has_complete_neighbors: bool,
}

/// A square of 32x32 cells. Carries the entity tracking set for the tick
/// scheduler and the ownership slot the synchronizer hands to workers.
#[derive(Debug)]
pub struct Chunk {
    chunk_x: i32,
    chunk_y: i32,
    origin: Vector,
    limit: Vector,
    grid: Mutex<CellGrid>,
    tracked: Mutex<HashSet<EntityRef>>,
    /// Worker currently owning this chunk. Managed by the `Synchronizer`.
    pub(crate) owner: Mutex<Option<WorkerId>>,
    /// Signalled whenever the owner slot frees up.
    pub(crate) freed: Condvar,
}

impl Chunk {
    pub fn new(chunk_x: i32, chunk_y: i32) -> Self {
        let origin = Vector::new(chunk_x << CHUNK_SIZE_SHIFT, chunk_y << CHUNK_SIZE_SHIFT);
        let area = (CHUNK_SIZE * CHUNK_SIZE) as usize;
        let mut cells = Vec::with_capacity(area);
        for dy in 0..CHUNK_SIZE {
            for dx in 0..CHUNK_SIZE {
                cells.push(Cell::new(origin + Vector::new(dx, dy)));
            }
        }
        Self {
            chunk_x,
            chunk_y,
            origin,
            limit: origin + Vector::new(CHUNK_SIZE, CHUNK_SIZE),
            grid: Mutex::new(CellGrid {
                cells,
                states: vec![SuspendState::Awake; area],
                state: SuspendState::Awake,
                populated: false,
                has_complete_neighbors: false,
            }),
            tracked: Mutex::new(HashSet::new()),
            owner: Mutex::new(None),
            freed: Condvar::new(),
        }
    }

    pub fn chunk_x(&self) -> i32 {
        self.chunk_x
    }

    pub fn chunk_y(&self) -> i32 {
        self.chunk_y
    }

    pub fn origin(&self) -> Vector {
        self.origin
    }

    pub fn size(&self) -> Vector {
        Vector::new(CHUNK_SIZE, CHUNK_SIZE)
    }

    pub fn contains(&self, pos: Vector) -> bool {
        pos.x >= self.origin.x && pos.y >= self.origin.y && pos.x < self.limit.x && pos.y < self.limit.y
    }

    fn index(&self, pos: Vector) -> usize {
        assert!(
            self.contains(pos),
            "position {},{} is not inside chunk {},{}",
            pos.x,
            pos.y,
            self.chunk_x,
            self.chunk_y
        );
        let dx = pos.x - self.origin.x;
        let dy = pos.y - self.origin.y;
        (dx + dy * CHUNK_SIZE) as usize
    }

    /// Access a cell under the grid lock.
    pub fn with_cell<R>(&self, pos: Vector, f: impl FnOnce(&mut Cell) -> R) -> R {
        let index = self.index(pos);
        let mut grid = self.grid.lock().expect("chunk grid poisoned");
        f(&mut grid.cells[index])
    }

    /// Access a cell and wake it, marking the whole chunk awake as well.
    /// Used for writes that must be seen by the next decay pass.
    pub fn with_cell_waking<R>(&self, pos: Vector, f: impl FnOnce(&mut Cell) -> R) -> R {
        let index = self.index(pos);
        let mut grid = self.grid.lock().expect("chunk grid poisoned");
        grid.states[index] = SuspendState::Awake;
        grid.state = SuspendState::Awake;
        f(&mut grid.cells[index])
    }

    pub fn suspend_state(&self) -> SuspendState {
        self.grid.lock().expect("chunk grid poisoned").state
    }

    pub fn populated(&self) -> bool {
        self.grid.lock().expect("chunk grid poisoned").populated
    }

    pub fn has_complete_neighbors(&self) -> bool {
        self.grid
            .lock()
            .expect("chunk grid poisoned")
            .has_complete_neighbors
    }

    pub fn set_has_complete_neighbors(&self, value: bool) {
        self.grid
            .lock()
            .expect("chunk grid poisoned")
            .has_complete_neighbors = value;
    }

    /// Run the generator over every cell. Food placement is deferred to the
    /// caller since scattering food touches neighboring chunks. Returns the
    /// seed positions and amounts the generator requested. A no-op when a
    /// concurrent populate got here first.
    pub fn populate(&self, generator: &mut dyn WorldGenerator) -> Vec<(Vector, f32)> {
        let mut grid = self.grid.lock().expect("chunk grid poisoned");
        if grid.populated {
            return Vec::new();
        }
        grid.populated = true;

        let mut food_seeds = Vec::new();
        for cell in &mut grid.cells {
            if let Some(amount) = generator.generate(cell) {
                food_seeds.push((cell.position, amount));
            }
        }
        food_seeds
    }

    /// Per-tick decay pass over all awake cells. A cell that has gone empty
    /// is suspended; a pass that finds every cell already suspended puts the
    /// whole chunk to sleep.
    pub fn update_cells(&self, parameters: &WorldParameters) {
        let mut grid = self.grid.lock().expect("chunk grid poisoned");
        if grid.state == SuspendState::Suspended {
            return;
        }
        let mut no_updates = true;
        for index in 0..grid.cells.len() {
            if grid.states[index] == SuspendState::Suspended {
                continue;
            }
            no_updates = false;
            if grid.cells[index].update(parameters) {
                grid.states[index] = SuspendState::Suspended;
            }
        }
        if no_updates {
            grid.state = SuspendState::Suspended;
        }
    }

    pub fn track(&self, entity: EntityRef) {
        self.tracked
            .lock()
            .expect("chunk tracking poisoned")
            .insert(entity);
    }

    pub fn untrack(&self, entity: EntityRef) {
        self.tracked
            .lock()
            .expect("chunk tracking poisoned")
            .remove(&entity);
    }

    pub fn is_tracking(&self, entity: EntityRef) -> bool {
        self.tracked
            .lock()
            .expect("chunk tracking poisoned")
            .contains(&entity)
    }

    pub fn tracked_snapshot(&self) -> Vec<EntityRef> {
        self.tracked
            .lock()
            .expect("chunk tracking poisoned")
            .iter()
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::entity::ColonyId;

    #[test]
    fn coordinate_mapping_rounds_towards_negative_infinity() {
        assert_eq!(to_chunk_x(0), 0);
        assert_eq!(to_chunk_x(31), 0);
        assert_eq!(to_chunk_x(32), 1);
        assert_eq!(to_chunk_x(-1), -1);
        assert_eq!(to_chunk_x(-32), -1);
        assert_eq!(to_chunk_x(-33), -2);
    }

    #[test]
    fn cells_carry_their_world_position() {
        let chunk = Chunk::new(-1, 2);
        assert_eq!(chunk.origin(), Vector::new(-32, 64));
        chunk.with_cell(Vector::new(-32, 64), |cell| {
            assert_eq!(cell.position, Vector::new(-32, 64));
        });
        chunk.with_cell(Vector::new(-1, 95), |cell| {
            assert_eq!(cell.position, Vector::new(-1, 95));
        });
        assert!(!chunk.contains(Vector::new(0, 64)));
    }

    #[test]
    #[should_panic(expected = "not inside chunk")]
    fn out_of_bounds_access_is_fatal() {
        let chunk = Chunk::new(0, 0);
        chunk.with_cell(Vector::new(32, 0), |_| ());
    }

    #[test]
    fn empty_chunk_suspends_after_one_idle_pass() {
        let parameters = WorldParameters::default();
        let chunk = Chunk::new(0, 0);
        let colony = ColonyId(0);
        let pos = Vector::new(3, 4);
        chunk.with_cell_waking(pos, |cell| cell.scent_mut(colony).colony = 5.0);

        // The scented cell keeps the chunk awake.
        chunk.update_cells(&parameters);
        assert_eq!(chunk.suspend_state(), SuspendState::Awake);

        // All the other cells are empty and suspend on the first pass, so
        // repeated passes eventually leave nothing awake.
        for _ in 0..3 {
            chunk.with_cell(pos, |cell| {
                cell.scent_mut(colony).colony = 0.0;
            });
            chunk.update_cells(&parameters);
        }
        assert_eq!(chunk.suspend_state(), SuspendState::Suspended);

        // A scent write wakes the chunk back up.
        chunk.with_cell_waking(pos, |cell| cell.scent_mut(colony).food = 1.0);
        assert_eq!(chunk.suspend_state(), SuspendState::Awake);
    }

    #[test]
    fn tracking_set_round_trip() {
        let chunk = Chunk::new(0, 0);
        let entity = EntityRef::Food(Vector::new(1, 1));
        assert!(!chunk.is_tracking(entity));
        chunk.track(entity);
        assert!(chunk.is_tracking(entity));
        assert_eq!(chunk.tracked_snapshot(), vec![entity]);
        chunk.untrack(entity);
        assert!(!chunk.is_tracking(entity));
    }
}
