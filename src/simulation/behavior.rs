use crate::config::BehaviorParameters;
use crate::direction::{Direction, Vector};
use crate::simulation::ant::Ant;
use crate::simulation::cell::CellProbe;
use crate::simulation::gaussian;
use crate::simulation::path_history::IntegratedSegment;
use crate::simulation::world::Accessor;
use rand::Rng;

/// Colony scent weaker than this no longer counts as a trail worth
/// following home.
const TRAIL_SCENT_FLOOR: f32 = 0.01;

/// A neighboring cell an ant considers stepping to.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub direction: Direction,
    pub bias: f32,
    pub probe: CellProbe,
}

/// How promising a candidate cell is. Candidates compete within the highest
/// populated segment only; the value breaks ties inside it.
#[derive(Debug, Clone, Copy)]
struct Score {
    segment: i32,
    value: f32,
}

impl Score {
    fn of(value: f32) -> Self {
        Self { segment: 0, value }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorKind {
    ExploreInit,
    Explore,
    FollowScentToFood,
    FollowScentToColony,
    ReturnToColony,
}

/// The ant's state machine. Each variant carries the state that resets when
/// the behavior is entered; longer-lived flags live on the ant itself.
#[derive(Debug)]
pub enum Behavior {
    /// Walk out along an existing trail before starting to explore.
    ExploreInit { steps: i32 },
    /// Wander, biased away from already-covered ground, towards food.
    Explore,
    /// Chase a food scent trail.
    FollowScentToFood { bad_scent_since: Option<u64> },
    /// Carry food home along the colony scent trail.
    FollowScentToColony { no_scent_steps: u32 },
    /// No trail to follow: retrace the remembered path, or hunker down for
    /// the night.
    ReturnToColony {
        replay: PathReplay,
        target_delta: Vector,
    },
}

impl Behavior {
    pub fn kind(&self) -> BehaviorKind {
        match self {
            Behavior::ExploreInit { .. } => BehaviorKind::ExploreInit,
            Behavior::Explore => BehaviorKind::Explore,
            Behavior::FollowScentToFood { .. } => BehaviorKind::FollowScentToFood,
            Behavior::FollowScentToColony { .. } => BehaviorKind::FollowScentToColony,
            Behavior::ReturnToColony { .. } => BehaviorKind::ReturnToColony,
        }
    }

    /// Build the entered behavior's fresh state.
    pub fn enter(kind: BehaviorKind, ant: &mut Ant) -> Behavior {
        ant.no_return_timer = 0;
        match kind {
            BehaviorKind::ExploreInit => {
                let p = ant.parameters.behavior.clone();
                let steps = gaussian(
                    &mut ant.rng,
                    p.explore_init_steps_mean,
                    p.explore_init_steps_deviation,
                ) as i32;
                Behavior::ExploreInit { steps }
            }
            BehaviorKind::Explore => Behavior::Explore,
            BehaviorKind::FollowScentToFood => Behavior::FollowScentToFood {
                bad_scent_since: None,
            },
            BehaviorKind::FollowScentToColony => Behavior::FollowScentToColony {
                no_scent_steps: 0,
            },
            BehaviorKind::ReturnToColony => {
                let path = ant.path_history.integrate_path();
                let mut replay = PathReplay::new(path);
                replay.set_mark();
                ant.path_history.reset();
                ant.record_path = false;
                Behavior::ReturnToColony {
                    replay,
                    target_delta: Vector::ZERO,
                }
            }
        }
    }

    pub fn end(&mut self, ant: &mut Ant) {
        if let Behavior::ReturnToColony { .. } = self {
            ant.record_path = true;
        }
    }

    pub fn act(&mut self, ant: &mut Ant, acc: &mut Accessor<'_>) {
        if ant.no_return_timer > 0 {
            ant.no_return_timer -= 1;
        }
        match self {
            Behavior::ExploreInit { steps } => act_explore_init(steps, ant, acc),
            Behavior::Explore => act_explore(ant, acc),
            Behavior::FollowScentToFood { bad_scent_since } => {
                act_follow_scent_to_food(bad_scent_since, ant, acc)
            }
            Behavior::FollowScentToColony { no_scent_steps } => {
                act_follow_scent_to_colony(no_scent_steps, ant, acc)
            }
            Behavior::ReturnToColony {
                replay,
                target_delta,
            } => act_return_to_colony(replay, target_delta, ant, acc),
        }
    }
}

fn act_explore_init(steps: &mut i32, ant: &mut Ant, acc: &mut Accessor<'_>) {
    let p = ant.parameters.behavior.clone();
    let here = acc.probe(ant.pos, ant.ant_ref.colony, Some(ant.ant_ref));
    let candidates = ant.candidates(acc);

    let scent_below = here.scent.colony;
    let on_high_scent = scent_below >= p.high_scent_threshold;
    let on_very_high_scent = scent_below >= p.high_scent_threshold * 2.0;

    let scores = candidates.map(|c| Score::of(mix_scents(&p, 0.0, 2.0 * c.probe.scent.colony)));
    let best = &candidates[choose_direction(ant, &candidates, &scores)];
    ant.next_direction = best.direction;
    let next_high_scent = best.probe.scent.colony >= p.high_scent_threshold;

    // Walking a strong trail refreshes it.
    if on_very_high_scent {
        ant.emit_colony_scent(acc);
    }

    let mut end_of_trail = !on_high_scent && !next_high_scent;
    if here.colony == Some(ant.ant_ref.colony) {
        end_of_trail = false;
    }

    if *steps <= 0 || end_of_trail {
        ant.set_next_behavior(BehaviorKind::Explore);
        return;
    }
    *steps -= 1;
}

fn act_explore(ant: &mut Ant, acc: &mut Accessor<'_>) {
    let p = ant.parameters.behavior.clone();
    let here = acc.probe(ant.pos, ant.ant_ref.colony, Some(ant.ant_ref));
    let candidates = ant.candidates(acc);

    let on_high_scent = here.scent.colony >= p.high_scent_threshold;

    let scores = candidates.map(|c| {
        if c.probe.scent.food >= p.high_scent_threshold {
            return Score {
                segment: 1,
                value: mix_scents(&p, 0.0, c.probe.scent.food),
            };
        }
        // Prefer flat ground that no scent has covered yet.
        let climb = (c.probe.height - here.height).max(0.0) * p.weight_height;
        let max_scent = c.probe.scent.colony.max(c.probe.scent.food);
        Score::of(mix_scents(&p, c.probe.scent.avoid + climb, -max_scent))
    });
    let best = candidates[choose_direction(ant, &candidates, &scores)];
    ant.next_direction = best.direction;

    if here.food > 0.0 {
        take_food_and_return(ant, acc);
    } else if near_high_food_scent(&p, &candidates) {
        ant.set_next_behavior(BehaviorKind::FollowScentToFood);
    }

    // Exploration stops at nightfall.
    if acc.is_night() {
        ant.set_next_behavior(BehaviorKind::ReturnToColony);
    }

    let high_scent_nearby = candidates
        .iter()
        .any(|c| c.probe.scent.colony >= p.high_scent_threshold)
        || ant.was_on_high_scent;
    if !on_high_scent && !high_scent_nearby {
        ant.emit_colony_scent(acc);
    }
    ant.was_on_high_scent = on_high_scent;
    ant.emit_avoid_scent(acc);
}

fn act_follow_scent_to_food(
    bad_scent_since: &mut Option<u64>,
    ant: &mut Ant,
    acc: &mut Accessor<'_>,
) {
    let p = ant.parameters.behavior.clone();
    let here = acc.probe(ant.pos, ant.ant_ref.colony, Some(ant.ant_ref));
    let candidates = ant.candidates(acc);

    let scores = candidates.map(|c| {
        if c.probe.food > 0.0 {
            return Score {
                segment: 1,
                value: sigmoid(c.probe.food),
            };
        }
        Score::of(mix_scents(&p, c.probe.scent.avoid, c.probe.scent.food))
    });
    let best = candidates[choose_direction(ant, &candidates, &scores)];
    ant.next_direction = best.direction;

    let mut following_bad_scent = !candidates
        .iter()
        .any(|c| c.probe.scent.food >= p.high_scent_threshold);

    if here.food > 0.0 {
        take_food_and_return(ant, acc);
        following_bad_scent = false;
    }

    if here.colony == Some(ant.ant_ref.colony) {
        turn_around(ant);
    }

    if following_bad_scent {
        let since = *bad_scent_since.get_or_insert(acc.time());
        if acc.time() - since >= p.bad_scent_follow_time {
            ant.set_next_behavior(BehaviorKind::ExploreInit);
        }
    } else {
        *bad_scent_since = None;
    }

    ant.emit_colony_scent(acc);
    ant.emit_avoid_scent(acc);
}

fn act_follow_scent_to_colony(no_scent_steps: &mut u32, ant: &mut Ant, acc: &mut Accessor<'_>) {
    let p = ant.parameters.behavior.clone();
    let here = acc.probe(ant.pos, ant.ant_ref.colony, Some(ant.ant_ref));
    let candidates = ant.candidates(acc);

    let scores = candidates.map(|c| {
        if c.probe.colony == Some(ant.ant_ref.colony) {
            return Score {
                segment: 1,
                value: 0.0,
            };
        }
        Score::of(mix_scents(&p, c.probe.scent.avoid, c.probe.scent.colony))
    });
    let best = candidates[choose_direction(ant, &candidates, &scores)];
    ant.next_direction = best.direction;
    if best.probe.scent.colony < TRAIL_SCENT_FLOOR {
        *no_scent_steps += 1;
    } else {
        *no_scent_steps = 0;
    }

    if here.colony == Some(ant.ant_ref.colony) {
        ant.deposit_all_food(acc);
        turn_around(ant);
        ant.set_next_behavior(BehaviorKind::FollowScentToFood);
    } else if here.food > 0.0 {
        take_food_and_return(ant, acc);
    }

    let lost = *no_scent_steps > p.lost_scent_steps;
    if acc.is_night() && lost {
        ant.set_next_behavior(BehaviorKind::ReturnToColony);
    }

    ant.emit_food_scent(acc);
    ant.emit_avoid_scent(acc);
}

fn act_return_to_colony(
    replay: &mut PathReplay,
    target_delta: &mut Vector,
    ant: &mut Ant,
    acc: &mut Accessor<'_>,
) {
    let p = ant.parameters.behavior.clone();
    let here = acc.probe(ant.pos, ant.ant_ref.colony, Some(ant.ant_ref));

    if here.colony == Some(ant.ant_ref.colony) {
        if acc.is_day() {
            if ant.is_carrying() {
                ant.deposit_all_food(acc);
                turn_around(ant);
                ant.set_next_behavior(BehaviorKind::FollowScentToFood);
            } else {
                ant.set_next_behavior(BehaviorKind::ExploreInit);
            }
        } else {
            ant.sleep = 1;
        }
        return;
    }

    let candidates = ant.candidates(acc);

    // Home in sight.
    if let Some(home) = candidates
        .iter()
        .find(|c| c.probe.colony == Some(ant.ant_ref.colony))
    {
        let direction = home.direction;
        ant.emit_colony_scent(acc);
        ant.next_direction = direction;
        return;
    }

    // A strong trail beats the remembered path.
    let scores = candidates.map(|c| Score::of(mix_scents(&p, 0.0, c.probe.scent.colony)));
    let best = candidates[choose_direction(ant, &candidates, &scores)];
    if best.probe.scent.colony >= p.high_scent_threshold {
        *target_delta -= best.direction.vector();
        ant.next_direction = best.direction;
        return;
    }

    // Walk the remembered path backwards, target by target.
    if target_delta.is_zero() {
        if replay.finished() {
            // Completely lost; wander in loose circles.
            if ant.rng.random::<f32>() > 0.01 {
                ant.next_direction = if ant.rng.random::<bool>() {
                    ant.direction.left(1)
                } else {
                    ant.direction.right(1)
                };
            }
            return;
        }

        // Skip replay steps that do not get us any closer to the start.
        while !replay.finished() && !replay.has_improved() {
            replay.step();
        }
        *target_delta = replay.position().unwrap_or(Vector::ZERO)
            - replay.mark().unwrap_or(Vector::ZERO);
        replay.set_mark();
    }

    if !target_delta.is_zero()
        && let Some(direction) = Direction::from_vector(*target_delta)
    {
        ant.next_direction = direction;
        *target_delta -= direction.vector();
    }
}

/// Pick up everything under our feet, turn back, and start following the
/// colony trail home.
fn take_food_and_return(ant: &mut Ant, acc: &mut Accessor<'_>) {
    ant.take_all_food(acc);
    turn_around(ant);
    ant.set_next_behavior(BehaviorKind::FollowScentToColony);
}

/// Head back the way we came, unless a recent turn-around still cools down.
/// Repeated calls stretch the cooldown so the ant cannot ping-pong.
fn turn_around(ant: &mut Ant) {
    if ant.no_return_timer <= 0 {
        ant.next_direction = ant.return_direction;
    }
    ant.no_return_timer += 2;
}

fn near_high_food_scent(p: &BehaviorParameters, candidates: &[Candidate; 5]) -> bool {
    candidates
        .iter()
        .any(|c| c.probe.scent.food >= p.high_scent_threshold || c.probe.carrying_nestmate)
}

fn mix_scents(p: &BehaviorParameters, avoid_scent: f32, pursue_scent: f32) -> f32 {
    sigmoid(avoid_scent * p.weight_avoid + pursue_scent * p.weight_pursue + p.bias_mix)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Weigh the scored candidates against each other and return the index of
/// the winner. Only candidates in the highest present segment compete; a
/// gaussian jitter, damped when the deterministic part is decisive, keeps
/// trails from crystallizing.
fn choose_direction(ant: &mut Ant, candidates: &[Candidate; 5], scores: &[Score; 5]) -> usize {
    let p = ant.parameters.behavior.clone();
    let mut best = 0;
    let mut best_weight = None;
    let mut best_segment = None;
    for (index, (candidate, score)) in candidates.iter().zip(scores).enumerate() {
        match best_segment {
            None => best_segment = Some(score.segment),
            Some(segment) if score.segment > segment => {
                best_segment = Some(score.segment);
                best_weight = None;
            }
            Some(segment) if score.segment < segment => continue,
            Some(_) => {}
        }

        let sum = score.value * p.weight_score + candidate.bias * p.weight_straight + p.bias_choose;
        let mut weight = sigmoid(sum);
        let damping = p.arg_random * sum * sum;
        let jitter = gaussian(&mut ant.rng, 0.0, 1.0)
            * p.weight_random
            * (1.0 - damping / (damping + 1.0));
        weight += jitter;

        if best_weight.is_none_or(|w| weight > w) {
            best = index;
            best_weight = Some(weight);
        }
    }
    best
}

/// Replays a recorded walk backwards. Segment coarsening means the replay
/// teleports between segment anchors; followers only consume the deltas
/// between marks, so the real ant still walks a connected path.
#[derive(Debug)]
pub struct PathReplay {
    path: Vec<IntegratedSegment>,
    index: usize,
    pos: Option<Vector>,
    mark: Option<Vector>,
    direction: Direction,
    remaining: i32,
    finished: bool,
}

impl PathReplay {
    pub fn new(path: Vec<IntegratedSegment>) -> Self {
        let mut replay = Self {
            path,
            index: 0,
            pos: None,
            mark: None,
            direction: Direction::North,
            remaining: 0,
            finished: false,
        };
        replay.finished = !replay.next_segment();
        replay
    }

    fn next_segment(&mut self) -> bool {
        let Some(segment) = self.path.get(self.index) else {
            return false;
        };
        self.index += 1;
        self.direction = segment.direction.opposite();
        self.remaining = segment.distance;
        self.pos = Some(segment.position);
        true
    }

    pub fn step(&mut self) {
        if self.finished {
            return;
        }
        if self.remaining <= 0 && !self.next_segment() {
            self.finished = true;
            return;
        }
        if let Some(pos) = &mut self.pos {
            *pos += self.direction.vector();
        }
        self.remaining -= 1;
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    pub fn position(&self) -> Option<Vector> {
        self.pos
    }

    pub fn mark(&self) -> Option<Vector> {
        self.mark
    }

    pub fn set_mark(&mut self) {
        self.mark = self.pos;
    }

    /// Whether the replay has moved closer to the walk's origin than the
    /// last mark.
    pub fn has_improved(&self) -> bool {
        match (self.mark, self.pos) {
            (None, _) => true,
            (_, None) => false,
            (Some(mark), Some(pos)) => pos.length() < mark.length(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AntParameters, WorldParameters};
    use crate::simulation::cell::Cell;
    use crate::simulation::chunk::Chunk;
    use crate::simulation::entity::{AntKey, AntRef, ColonyId};
    use crate::simulation::generator::{FoodDrop, WorldGenerator};
    use crate::simulation::path_history::PathHistory;
    use crate::simulation::world::World;

    struct BareGenerator;

    impl WorldGenerator for BareGenerator {
        fn set_seed(&mut self, _seed: u64) {}

        fn generate(&mut self, cell: &mut Cell) -> Option<f32> {
            cell.height = 0.5;
            None
        }

        fn scatter_food(&mut self, _center: Vector, _amount: f32) -> Vec<FoodDrop> {
            Vec::new()
        }

        fn update(&mut self, _chunk: &Chunk, _time: u64) -> Vec<FoodDrop> {
            Vec::new()
        }
    }

    fn test_ant() -> Ant {
        let ant_ref = AntRef {
            colony: ColonyId(0),
            key: AntKey::default(),
        };
        Ant::new(
            ant_ref,
            Vector::ZERO,
            Direction::East,
            AntParameters::default(),
            1,
        )
    }

    #[test]
    fn standing_on_food_sends_the_explorer_home() {
        let world = World::new(Box::new(BareGenerator), WorldParameters::default(), 5)
            .expect("world construction failed");
        let mut acc = world.accessor();
        acc.add_food(Vector::ZERO, 2.0, 1000);

        let mut ant = test_ant();
        act_explore(&mut ant, &mut acc);

        assert_eq!(ant.next_behavior, Some(BehaviorKind::FollowScentToColony));
        assert_eq!(ant.carrying, 1.0);
    }

    #[test]
    fn nightfall_turns_exploration_into_returning() {
        let parameters = WorldParameters {
            day_night_cycle_time: 2,
            day_percentage: 0.0,
            ..WorldParameters::default()
        };
        let world = World::new(Box::new(BareGenerator), parameters, 5)
            .expect("world construction failed");
        // Tick once past the zero-length day.
        world.update();
        assert!(world.is_night());

        let mut acc = world.accessor();
        let mut ant = test_ant();
        act_explore(&mut ant, &mut acc);

        assert_eq!(ant.next_behavior, Some(BehaviorKind::ReturnToColony));
    }

    #[test]
    fn sigmoid_is_centered_and_bounded() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }

    #[test]
    fn replay_walks_a_straight_path_back_to_the_origin() {
        let mut history = PathHistory::new(8, 3);
        for _ in 0..5 {
            history.push(Direction::East);
        }
        let mut replay = PathReplay::new(history.integrate_path());
        replay.set_mark();

        // The newest segment anchors at the walk's endpoint.
        assert_eq!(replay.position(), Some(Vector::new(5, 0)));
        let mut last = f32::INFINITY;
        while !replay.finished() {
            while !replay.finished() && !replay.has_improved() {
                replay.step();
            }
            if let Some(pos) = replay.position() {
                assert!(pos.length() <= last);
                last = pos.length();
            }
            replay.set_mark();
            replay.step();
        }
    }

    #[test]
    fn empty_replay_is_finished_immediately() {
        let replay = PathReplay::new(Vec::new());
        assert!(replay.finished());
        assert!(replay.position().is_none());
    }

    #[test]
    fn replay_of_an_out_and_back_walk_stays_near_the_origin() {
        let mut history = PathHistory::new(8, 3);
        for _ in 0..4 {
            history.push(Direction::North);
        }
        for _ in 0..4 {
            history.push(Direction::South);
        }
        let mut replay = PathReplay::new(history.integrate_path());
        replay.set_mark();
        for _ in 0..20 {
            replay.step();
        }
        assert!(replay.finished());
    }
}
