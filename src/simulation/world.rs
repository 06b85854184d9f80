use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::time::Duration;

use anyhow::Context;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

use crate::config::{AntParameters, ColonyParameters, WorldParameters};
use crate::direction::{Direction, Vector};
use crate::simulation::cell::{AntMark, Cell, CellProbe, FoodSource};
use crate::simulation::chunk::{Chunk, SuspendState, to_chunk_x, to_chunk_y};
use crate::simulation::chunk_map::ChunkMap;
use crate::simulation::entity::{AntRef, Colony, ColonyId, EntityRef};
use crate::simulation::generator::WorldGenerator;
use crate::simulation::sync::{Synchronizer, WorkerContext};

const INITIAL_MAP_SIZE: i32 = 7;

/// Where and how a freshly bred ant enters the world.
#[derive(Debug, Clone, Copy)]
pub struct AntSpawn {
    pub offset: Vector,
    pub direction: Direction,
    pub seed: u64,
}

/// Exclusive-access gate for the world as a whole. Held by the tick loop for
/// the duration of a tick and by external callers that pause the simulation.
#[derive(Debug, Default)]
struct FrameLock {
    locked: Mutex<bool>,
    freed: Condvar,
}

impl FrameLock {
    fn lock_blocking(&self) {
        let mut locked = self.locked.lock().expect("frame lock poisoned");
        while *locked {
            locked = self.freed.wait(locked).expect("frame lock poisoned");
        }
        *locked = true;
    }

    fn try_lock_timeout(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut locked = self.locked.lock().expect("frame lock poisoned");
        while *locked {
            let Some(remaining) = deadline.checked_duration_since(std::time::Instant::now())
            else {
                return false;
            };
            let (guard, result) = self
                .freed
                .wait_timeout(locked, remaining)
                .expect("frame lock poisoned");
            locked = guard;
            if result.timed_out() && *locked {
                return false;
            }
        }
        *locked = true;
        true
    }

    fn unlock(&self) {
        let mut locked = self.locked.lock().expect("frame lock poisoned");
        assert!(*locked, "frame lock is not held");
        *locked = false;
        self.freed.notify_all();
    }
}

/// Named random streams, split so map layout and ant decisions stay
/// reproducible independently of each other.
#[derive(Debug)]
struct RngStreams {
    places: SmallRng,
    ants: SmallRng,
}

/// A dynamically growing 2D grid of cells, chunked for parallel ticking.
///
/// All mutation goes through an [`Accessor`], which transparently allocates
/// and populates chunks on first touch and enforces the chunk ownership
/// protocol during a tick.
pub struct World {
    chunks: ChunkMap,
    generator: Mutex<Box<dyn WorldGenerator>>,
    /// While set, chunk accesses do not populate. Prevents the post-tick
    /// generator pass from recursing into itself.
    generator_locked: AtomicBool,
    colonies: RwLock<Vec<Arc<Colony>>>,
    pool: rayon::ThreadPool,
    synchronizer: Synchronizer,
    frame: FrameLock,
    parameters: WorldParameters,
    rng: Mutex<RngStreams>,
    time: AtomicU64,
    closed: AtomicBool,
}

impl World {
    pub fn new(
        generator: Box<dyn WorldGenerator>,
        parameters: WorldParameters,
        seed: u64,
    ) -> anyhow::Result<Self> {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let threads = cores.saturating_sub(2).max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("world-worker-{i}"))
            .build()
            .context("failed to build the worker pool")?;
        debug!(threads, "worker pool ready");

        Ok(Self {
            chunks: ChunkMap::new(INITIAL_MAP_SIZE),
            generator: Mutex::new(generator),
            generator_locked: AtomicBool::new(false),
            colonies: RwLock::new(Vec::new()),
            pool,
            synchronizer: Synchronizer::new(),
            frame: FrameLock::default(),
            parameters,
            rng: Mutex::new(RngStreams {
                places: SmallRng::seed_from_u64(seed),
                ants: SmallRng::seed_from_u64(seed ^ 0x9E37_79B9_7F4A_7C15),
            }),
            time: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Run one tick: update every tracked entity chunk batch by chunk batch,
    /// decay awake cells, re-home entities that crossed a chunk border, then
    /// give the generator its periodic pass.
    pub fn update(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let moved: Mutex<Vec<(EntityRef, Arc<Chunk>, Vector)>> = Mutex::new(Vec::new());

        self.frame.lock_blocking();
        self.synchronizer.begin();
        for batch in self.chunks.batches() {
            // A close during the tick abandons the remaining batches.
            if self.closed.load(Ordering::Acquire) {
                break;
            }
            self.pool.install(|| {
                batch.par_iter().for_each(|chunk| {
                    let ctx = self.synchronizer.context();
                    let mut acc = Accessor::worker(self, ctx);
                    acc.claim_first(chunk);
                    self.update_chunk(&mut acc, chunk, &moved);
                    acc.release();
                });
            });
        }
        self.synchronizer.end();
        self.frame.unlock();

        // Entities that left their chunk get tracked by their new one. The
        // target chunk always exists since touching a cell allocates its
        // neighborhood.
        for (entity, old_chunk, pos) in moved.into_inner().expect("move log poisoned") {
            old_chunk.untrack(entity);
            let next = self
                .chunks
                .get_or_null(to_chunk_x(pos.x), to_chunk_y(pos.y))
                .expect("entity moved into an unallocated chunk");
            next.track(entity);
        }

        let time = self.time.load(Ordering::Acquire);
        self.generator_locked.store(true, Ordering::Release);
        {
            let mut generator = self.generator.lock().expect("generator poisoned");
            let mut drops = Vec::new();
            for chunk in self.chunks.snapshot() {
                if chunk.populated() {
                    drops.extend(generator.update(&chunk, time));
                }
            }
            drop(generator);
            let mut acc = self.accessor();
            for drop in drops {
                acc.add_food(drop.position, drop.amount, drop.expire_timer);
            }
        }
        self.generator_locked.store(false, Ordering::Release);

        self.time.store(time + 1, Ordering::Release);
    }

    fn update_chunk(
        &self,
        acc: &mut Accessor<'_>,
        chunk: &Arc<Chunk>,
        moved: &Mutex<Vec<(EntityRef, Arc<Chunk>, Vector)>>,
    ) {
        for entity in chunk.tracked_snapshot() {
            match entity {
                EntityRef::Ant(ant_ref) => {
                    let colony = self.colony(ant_ref.colony);
                    // Skipped when the ant died earlier this tick.
                    let Some(mut ant) = colony.checkout(ant_ref.key) else {
                        continue;
                    };
                    let before = ant.position();
                    let died = ant.update(acc);
                    let after = ant.position();
                    if died {
                        colony.remove_ant(ant_ref.key);
                        chunk.untrack(entity);
                        continue;
                    }
                    colony.checkin(ant_ref.key, ant);
                    let crossed = to_chunk_x(before.x) != to_chunk_x(after.x)
                        || to_chunk_y(before.y) != to_chunk_y(after.y);
                    if crossed && chunk.is_tracking(entity) {
                        moved
                            .lock()
                            .expect("move log poisoned")
                            .push((entity, Arc::clone(chunk), after));
                    }
                }
                EntityRef::Colony(id) => {
                    self.colony(id).update(acc);
                }
                EntityRef::Food(pos) => {
                    let exhausted = acc.with_cell(pos, |cell| match &mut cell.food {
                        Some(food) => {
                            let exhausted = food.update();
                            if exhausted {
                                cell.food = None;
                            }
                            exhausted
                        }
                        None => true,
                    });
                    if exhausted {
                        chunk.untrack(entity);
                    }
                }
            }
        }

        if chunk.suspend_state() == SuspendState::Awake {
            chunk.update_cells(&self.parameters);
        }
    }

    /// Stop ticking. Safe to call from any thread; a tick in flight finishes
    /// first.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.synchronizer.wait_until_done(None);
    }

    /// Pause the world for exclusive outside access. Returns false when a
    /// tick does not finish within the timeout. The budget is shared: the
    /// frame lock only gets whatever the tick latch left of it.
    pub fn lock(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        if !self.synchronizer.wait_until_done(Some(timeout)) {
            return false;
        }
        let remaining = deadline.saturating_duration_since(std::time::Instant::now());
        self.frame.try_lock_timeout(remaining)
    }

    pub fn unlock(&self) {
        self.frame.unlock();
    }

    /// Accessor for use outside the tick loop. Blocks on chunk access while
    /// a tick is running.
    pub fn accessor(&self) -> Accessor<'_> {
        Accessor {
            world: self,
            ctx: None,
            populating: false,
        }
    }

    pub fn time(&self) -> u64 {
        self.time.load(Ordering::Acquire)
    }

    pub fn is_day(&self) -> bool {
        let cycle = self.parameters.day_night_cycle_time;
        let time_of_day = (self.time() % cycle) as f32 / cycle as f32;
        time_of_day <= self.parameters.day_percentage
    }

    pub fn is_night(&self) -> bool {
        !self.is_day()
    }

    pub fn parameters(&self) -> &WorldParameters {
        &self.parameters
    }

    /// Times a worker went past a detected wait cycle without ownership.
    pub fn unsafe_proceeds(&self) -> u64 {
        self.synchronizer.unsafe_proceeds()
    }

    pub fn colony(&self, id: ColonyId) -> Arc<Colony> {
        let colonies = self.colonies.read().expect("colony arena poisoned");
        Arc::clone(colonies.get(id.0 as usize).expect("unknown colony"))
    }

    pub fn colonies(&self) -> Vec<Arc<Colony>> {
        self.colonies.read().expect("colony arena poisoned").clone()
    }

    pub fn total_colony_food(&self) -> f32 {
        self.colonies().iter().map(|colony| colony.food()).sum()
    }

    pub fn total_ants(&self) -> usize {
        self.colonies().iter().map(|colony| colony.ant_count()).sum()
    }

    fn register_colony(
        &self,
        position: Vector,
        parameters: ColonyParameters,
        ant_parameters: AntParameters,
    ) -> Arc<Colony> {
        let mut colonies = self.colonies.write().expect("colony arena poisoned");
        let id = ColonyId(colonies.len() as u32);
        let colony = Arc::new(Colony::new(id, position, parameters, ant_parameters));
        colonies.push(Arc::clone(&colony));
        colony
    }

    /// Sample an entry point for a new ant within the given radius band.
    pub fn sample_ant_spawn(&self, min_radius: i32, max_radius: i32) -> AntSpawn {
        let mut streams = self.rng.lock().expect("rng streams poisoned");
        let rng = &mut streams.ants;
        let angle = rng.random::<f32>() * std::f32::consts::TAU;
        let mut radius = min_radius as f32;
        if min_radius != max_radius {
            radius += rng.random_range(0.0..(max_radius - min_radius) as f32);
        }
        let offset = Vector::new(
            (angle.cos() * radius).round() as i32,
            (angle.sin() * radius).round() as i32,
        );
        AntSpawn {
            offset,
            direction: Direction::ALL[rng.random_range(0..Direction::ALL.len())],
            seed: rng.random::<u64>(),
        }
    }
}

/// Handle through which all cell and entity access goes. Worker accessors
/// carry the chunk ownership context of one unit of tick work; foreign
/// accessors wait for the running tick instead.
pub struct Accessor<'w> {
    world: &'w World,
    ctx: Option<WorkerContext>,
    /// Guards against population recursing while scattered food lands on
    /// not-yet-populated neighbor chunks.
    populating: bool,
}

impl<'w> Accessor<'w> {
    fn worker(world: &'w World, ctx: WorkerContext) -> Self {
        Self {
            world,
            ctx: Some(ctx),
            populating: false,
        }
    }

    pub fn world(&self) -> &'w World {
        self.world
    }

    /// Take ownership of the chunk this unit of work starts with.
    fn claim_first(&mut self, chunk: &Arc<Chunk>) {
        let ctx = self.ctx.as_mut().expect("not a worker accessor");
        self.world.synchronizer.lock_first(ctx, chunk);
    }

    fn claim(&mut self, chunk: &Arc<Chunk>) {
        match &mut self.ctx {
            Some(ctx) => {
                // The outcome does not matter here: either we own the chunk
                // now or we proceed unowned past a wait cycle.
                let _ = self.world.synchronizer.lock(ctx, chunk);
            }
            None => {
                self.world.synchronizer.wait_until_done(None);
            }
        }
    }

    /// Release every chunk this worker owns. Ends the unit of work.
    fn release(&mut self) {
        if let Some(ctx) = &mut self.ctx {
            self.world.synchronizer.release_all(ctx);
        }
    }

    /// The chunk holding `pos`, allocated, populated and claimed.
    fn chunk_for(&mut self, pos: Vector) -> Arc<Chunk> {
        self.ensure_chunk(to_chunk_x(pos.x), to_chunk_y(pos.y))
    }

    fn ensure_chunk(&mut self, chunk_x: i32, chunk_y: i32) -> Arc<Chunk> {
        let (chunk, needs_population) = self.world.chunks.ensure(chunk_x, chunk_y);
        self.claim(&chunk);
        if needs_population
            && !self.populating
            && !self.world.generator_locked.load(Ordering::Acquire)
        {
            self.populate_group(chunk_x, chunk_y);
            chunk.set_has_complete_neighbors(true);
        }
        chunk
    }

    /// Run the generator over every unpopulated chunk around the center,
    /// then place the food it scattered. Chunk ownership is taken before the
    /// generator lock and the lock is dropped again before any food lands,
    /// so a thread holding the generator never waits on a chunk.
    fn populate_group(&mut self, chunk_x: i32, chunk_y: i32) {
        debug!(chunk_x, chunk_y, "populating chunk group");
        self.populating = true;
        let mut pending = Vec::new();
        for chunk in self.world.chunks.population_group(chunk_x, chunk_y) {
            if chunk.populated() {
                continue;
            }
            self.claim(&chunk);
            pending.push(chunk);
        }
        let mut drops = Vec::new();
        {
            let mut generator = self.world.generator.lock().expect("generator poisoned");
            for chunk in &pending {
                for (position, amount) in chunk.populate(generator.as_mut()) {
                    drops.extend(generator.scatter_food(position, amount));
                }
            }
        }
        for drop in drops {
            self.add_food(drop.position, drop.amount, drop.expire_timer);
        }
        self.populating = false;
    }

    pub fn with_cell<R>(&mut self, pos: Vector, f: impl FnOnce(&mut Cell) -> R) -> R {
        self.chunk_for(pos).with_cell(pos, f)
    }

    /// Like [`Self::with_cell`] but wakes the cell for the next decay pass.
    pub fn with_cell_waking<R>(&mut self, pos: Vector, f: impl FnOnce(&mut Cell) -> R) -> R {
        self.chunk_for(pos).with_cell_waking(pos, f)
    }

    pub fn probe(&mut self, pos: Vector, colony: ColonyId, me: Option<AntRef>) -> CellProbe {
        self.with_cell(pos, |cell| cell.probe(colony, me))
    }

    pub fn add_colony_scent(&mut self, pos: Vector, colony: ColonyId, amount: f32) {
        self.with_cell_waking(pos, |cell| cell.scent_mut(colony).colony += amount);
    }

    pub fn add_food_scent(&mut self, pos: Vector, colony: ColonyId, amount: f32) {
        self.with_cell_waking(pos, |cell| cell.scent_mut(colony).food += amount);
    }

    /// Withdraw up to `max` from the food on a cell; the pile stays tracked
    /// until the per-tick pass sees it exhausted.
    pub fn take_food(&mut self, pos: Vector, max: f32) -> f32 {
        self.with_cell_waking(pos, |cell| {
            cell.food.as_mut().map_or(0.0, |food| food.take(max))
        })
    }

    /// Drop food onto a cell, merging with whatever pile is already there.
    pub fn add_food(&mut self, pos: Vector, amount: f32, expire_timer: i32) {
        let chunk = self.chunk_for(pos);
        let placed = chunk.with_cell_waking(pos, |cell| match &mut cell.food {
            Some(food) => {
                food.increase(amount);
                false
            }
            None => {
                cell.food = Some(FoodSource::new(amount, expire_timer));
                true
            }
        });
        if placed {
            chunk.track(EntityRef::Food(pos));
        }
    }

    pub fn move_ant(&mut self, ant: AntRef, from: Vector, to: Vector, carrying: bool) {
        if from == to {
            return;
        }
        self.with_cell_waking(from, |cell| cell.remove_ant(ant));
        self.with_cell_waking(to, |cell| cell.add_ant(AntMark { ant, carrying }));
    }

    pub fn set_mark_carrying(&mut self, ant: AntRef, pos: Vector, carrying: bool) {
        self.with_cell_waking(pos, |cell| cell.set_ant_carrying(ant, carrying));
    }

    pub fn track(&mut self, entity: EntityRef, pos: Vector) {
        self.chunk_for(pos).track(entity);
    }

    pub fn time(&self) -> u64 {
        self.world.time()
    }

    pub fn is_day(&self) -> bool {
        self.world.is_day()
    }

    pub fn is_night(&self) -> bool {
        self.world.is_night()
    }

    /// Found a new colony: claim its center cell, spread colony ground
    /// around it and start tracking it for per-tick updates.
    pub fn create_colony(
        &mut self,
        position: Vector,
        parameters: ColonyParameters,
        ant_parameters: AntParameters,
    ) -> ColonyId {
        let spread_cells = parameters.spread_cells;
        let colony = self.world.register_colony(position, parameters, ant_parameters);
        let id = colony.id();

        let occupied = self.with_cell_waking(position, |cell| {
            if cell.colony.is_some() {
                return true;
            }
            cell.colony = Some(id);
            false
        });
        assert!(!occupied, "cell already belongs to a colony");

        // Grow the colony ground one random meandering walk per cell: head
        // out in a random direction until the first unclaimed cell.
        for _ in 0..spread_cells {
            let mut dir = {
                let mut streams = self.world.rng.lock().expect("rng streams poisoned");
                Direction::ALL[streams.places.random_range(0..Direction::ALL.len())]
            };
            let mut pos = position;
            while self.with_cell(pos, |cell| cell.colony.is_some()) {
                pos += dir.vector();
                let drift = {
                    let mut streams = self.world.rng.lock().expect("rng streams poisoned");
                    streams.places.random_range(0..3) - 1
                };
                dir = dir.left(drift);
            }
            self.with_cell_waking(pos, |cell| cell.colony = Some(id));
        }

        self.track(EntityRef::Colony(id), position);
        id
    }
}
