use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::config::AntParameters;
use crate::direction::{Direction, Vector};
use crate::simulation::MAX_WALKABLE_HEIGHT;
use crate::simulation::behavior::{Behavior, BehaviorKind, Candidate};
use crate::simulation::entity::AntRef;
use crate::simulation::path_history::PathHistory;
use crate::simulation::world::Accessor;

/// A single ant. Owned by its colony's slot map and checked out for the
/// duration of each update, so all methods take plain `&mut self` and reach
/// the world through the accessor.
#[derive(Debug)]
pub struct Ant {
    pub(crate) ant_ref: AntRef,
    pub(crate) pos: Vector,
    pub(crate) direction: Direction,
    pub(crate) next_direction: Direction,
    pub(crate) return_direction: Direction,
    pub(crate) carrying: f32,
    pub(crate) colony_scent_strength: f32,
    pub(crate) food_scent_strength: f32,
    pub(crate) parameters: AntParameters,
    pub(crate) sleep: i32,
    pub(crate) energy: i32,
    pub(crate) record_path: bool,
    /// Ticks left before another turn-around is allowed. Reset whenever the
    /// behavior changes.
    pub(crate) no_return_timer: i32,
    /// Whether the previous explore step stood on a strong colony trail.
    pub(crate) was_on_high_scent: bool,
    pub(crate) path_history: PathHistory,
    behavior: Behavior,
    pub(crate) next_behavior: Option<BehaviorKind>,
    pub(crate) rng: SmallRng,
}

impl Ant {
    pub fn new(
        ant_ref: AntRef,
        pos: Vector,
        direction: Direction,
        parameters: AntParameters,
        seed: u64,
    ) -> Self {
        let path_history = PathHistory::new(parameters.path_partition_size, parameters.path_levels);
        let energy = parameters.energy_gain;
        let mut ant = Self {
            ant_ref,
            pos,
            direction,
            next_direction: direction,
            return_direction: direction,
            carrying: 0.0,
            colony_scent_strength: 0.0,
            food_scent_strength: 0.0,
            parameters,
            sleep: 0,
            energy,
            record_path: true,
            no_return_timer: 0,
            was_on_high_scent: false,
            path_history,
            behavior: Behavior::Explore,
            next_behavior: None,
            rng: SmallRng::seed_from_u64(seed),
        };
        ant.behavior = Behavior::enter(BehaviorKind::ExploreInit, &mut ant);
        ant
    }

    pub fn ant_ref(&self) -> AntRef {
        self.ant_ref
    }

    pub fn position(&self) -> Vector {
        self.pos
    }

    pub fn carrying(&self) -> f32 {
        self.carrying
    }

    pub fn is_carrying(&self) -> bool {
        self.carrying > 0.0
    }

    pub fn sleeping(&self) -> bool {
        self.sleep > 0
    }

    pub(crate) fn behavior_kind(&self) -> BehaviorKind {
        self.behavior.kind()
    }

    /// One tick of ant life. Returns true when the ant starved; the caller
    /// removes it from its colony and chunk, the cell mark is already gone.
    pub fn update(&mut self, acc: &mut Accessor<'_>) -> bool {
        let here = acc.probe(self.pos, self.ant_ref.colony, Some(self.ant_ref));
        self.replenish_scents(here.colony.is_some_and(|c| c == self.ant_ref.colony), here.food > 0.0);

        // Resting at home refills energy from the colony's stock.
        if here.colony == Some(self.ant_ref.colony) {
            self.path_history.reset();
            let missing = self.parameters.energy_gain - self.energy;
            if missing > 1 {
                let colony = acc.world().colony(self.ant_ref.colony);
                let taken =
                    colony.consume_up_to(missing as f32 / self.parameters.energy_food_factor);
                self.energy += (taken * self.parameters.energy_food_factor).ceil() as i32;
            }
        }

        let mut behavior = std::mem::replace(&mut self.behavior, Behavior::Explore);
        behavior.act(self, acc);
        if let Some(kind) = self.next_behavior.take()
            && kind != behavior.kind()
        {
            behavior.end(self);
            behavior = Behavior::enter(kind, self);
        }
        self.behavior = behavior;

        // Refuse to climb unwalkable terrain; back off the way we came, or
        // hold the line when already stranded above the limit.
        let ahead = acc.probe(
            self.pos + self.next_direction.vector(),
            self.ant_ref.colony,
            Some(self.ant_ref),
        );
        if ahead.height > MAX_WALKABLE_HEIGHT {
            if here.height > MAX_WALKABLE_HEIGHT {
                self.next_direction = self.direction;
            } else {
                self.next_direction = self.return_direction;
            }
        }
        self.return_direction = self.next_direction.opposite();
        self.direction = self.next_direction;

        if self.sleeping() {
            self.sleep -= 1;
        } else {
            let to = self.pos + self.direction.vector();
            acc.move_ant(self.ant_ref, self.pos, to, self.is_carrying());
            self.pos = to;
            if self.record_path {
                self.path_history.push(self.direction);
            }
            self.energy -= 1;
        }

        // A starving ant eats what it carries before giving up.
        if self.energy <= 0 {
            self.energy += (self.carrying * self.parameters.energy_food_factor).ceil() as i32;
            self.set_carrying(acc, 0.0);
        }
        if self.energy <= 0 {
            acc.with_cell(self.pos, |cell| cell.remove_ant(self.ant_ref));
            return true;
        }
        false
    }

    /// The five cells an ant can step to: straight ahead (with its straight
    /// bias) plus one and two steps of turn to either side.
    pub(crate) fn candidates(&self, acc: &mut Accessor<'_>) -> [Candidate; 5] {
        let bias = self.parameters.straight_bias;
        [
            self.candidate(acc, self.direction, bias),
            self.candidate(acc, self.direction.left(1), 0.0),
            self.candidate(acc, self.direction.right(1), 0.0),
            self.candidate(acc, self.direction.left(2), 0.0),
            self.candidate(acc, self.direction.right(2), 0.0),
        ]
    }

    fn candidate(&self, acc: &mut Accessor<'_>, direction: Direction, bias: f32) -> Candidate {
        Candidate {
            direction,
            bias,
            probe: acc.probe(
                self.pos + direction.vector(),
                self.ant_ref.colony,
                Some(self.ant_ref),
            ),
        }
    }

    fn replenish_scents(&mut self, at_home: bool, on_food: bool) {
        if at_home {
            self.colony_scent_strength = self.parameters.colony_scent_gain;
        }
        if on_food {
            self.food_scent_strength = self.parameters.food_scent_gain;
        }
    }

    pub(crate) fn emit_colony_scent(&mut self, acc: &mut Accessor<'_>) {
        if self.sleeping() {
            return;
        }
        let amount = self.parameters.colony_scent_addend.min(self.colony_scent_strength);
        acc.add_colony_scent(self.pos, self.ant_ref.colony, amount);
        self.colony_scent_strength *= self.parameters.colony_scent_emission_decay;
    }

    /// Food scent lands twice, once before and once after weakening the
    /// reserve, so trails taper off instead of cutting out.
    pub(crate) fn emit_food_scent(&mut self, acc: &mut Accessor<'_>) {
        if self.sleeping() {
            return;
        }
        let amount = self.parameters.food_scent_addend.min(self.food_scent_strength);
        acc.add_food_scent(self.pos, self.ant_ref.colony, amount);
        self.food_scent_strength *= self.parameters.food_scent_emission_decay;
        let amount = self.parameters.food_scent_addend.min(self.food_scent_strength);
        acc.add_food_scent(self.pos, self.ant_ref.colony, amount);
    }

    /// Avoid scent reinforces itself: the more is already there, the more
    /// gets added on top.
    pub(crate) fn emit_avoid_scent(&mut self, acc: &mut Accessor<'_>) {
        if self.sleeping() {
            return;
        }
        let base = self.parameters.avoid_scent_added;
        let factor = self.parameters.avoid_scent_factor;
        let colony = self.ant_ref.colony;
        acc.with_cell_waking(self.pos, |cell| {
            let scent = cell.scent_mut(colony);
            scent.avoid += base + scent.avoid * factor;
        });
    }

    pub(crate) fn available_carrying_capacity(&self) -> f32 {
        (self.parameters.carrying_capacity - self.carrying).max(0.0)
    }

    /// Grab as much of the food under our feet as we can carry.
    pub(crate) fn take_all_food(&mut self, acc: &mut Accessor<'_>) {
        let taken = acc.take_food(self.pos, self.available_carrying_capacity());
        self.set_carrying(acc, self.carrying + taken);
    }

    pub(crate) fn deposit_all_food(&mut self, acc: &mut Accessor<'_>) {
        acc.world()
            .colony(self.ant_ref.colony)
            .increase_food(self.carrying);
        self.set_carrying(acc, 0.0);
    }

    /// Update the carried amount and keep the cell mark other ants read in
    /// sync with it.
    fn set_carrying(&mut self, acc: &mut Accessor<'_>, amount: f32) {
        let was_carrying = self.is_carrying();
        self.carrying = amount;
        if was_carrying != self.is_carrying() {
            acc.set_mark_carrying(self.ant_ref, self.pos, self.is_carrying());
        }
    }

    pub(crate) fn set_next_behavior(&mut self, kind: BehaviorKind) {
        self.next_behavior = Some(kind);
    }
}
