use std::sync::Mutex;

use slotmap::SlotMap;

use crate::config::{AntParameters, ColonyParameters};
use crate::direction::Vector;
use crate::simulation::SimError;
use crate::simulation::ant::Ant;
use crate::simulation::cell::AntMark;
use crate::simulation::world::Accessor;

slotmap::new_key_type! {
    pub struct AntKey;
}

/// Index of a colony in the world's colony arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColonyId(pub u32);

/// Stable handle to an ant: its colony plus its key in that colony's slotmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AntRef {
    pub colony: ColonyId,
    pub key: AntKey,
}

/// Reference to an entity tracked by a chunk for per-tick updates. Food is
/// identified by the cell holding it since it never moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Ant(AntRef),
    Colony(ColonyId),
    Food(Vector),
}

/// Slot in the colony's ant map. The boxed ant is checked out for the
/// duration of its update so workers never hold the colony's map lock while
/// running behavior code; the key stays valid throughout.
#[derive(Debug, Default)]
pub struct AntSlot {
    ant: Option<Box<Ant>>,
}

#[derive(Debug)]
struct ColonyState {
    // always >= 0
    food: f32,
    parameters: ColonyParameters,
    ant_parameters: AntParameters,
}

/// A colony of ants. Lives in the world's arena behind an `Arc`; interior
/// mutability keeps its food stock and ant map usable from worker threads.
#[derive(Debug)]
pub struct Colony {
    id: ColonyId,
    position: Vector,
    state: Mutex<ColonyState>,
    ants: Mutex<SlotMap<AntKey, AntSlot>>,
}

impl Colony {
    pub fn new(
        id: ColonyId,
        position: Vector,
        parameters: ColonyParameters,
        ant_parameters: AntParameters,
    ) -> Self {
        Self {
            id,
            position,
            state: Mutex::new(ColonyState {
                food: 0.0,
                parameters,
                ant_parameters,
            }),
            ants: Mutex::new(SlotMap::with_key()),
        }
    }

    pub fn id(&self) -> ColonyId {
        self.id
    }

    pub fn position(&self) -> Vector {
        self.position
    }

    pub fn food(&self) -> f32 {
        self.state.lock().expect("colony state poisoned").food
    }

    pub fn ant_parameters(&self) -> AntParameters {
        self.state
            .lock()
            .expect("colony state poisoned")
            .ant_parameters
            .clone()
    }

    /// Add food to the stock. `amount` must not be negative.
    pub fn increase_food(&self, amount: f32) {
        assert!(amount >= 0.0, "food amount must not be negative");
        self.state.lock().expect("colony state poisoned").food += amount;
    }

    /// Withdraw an exact amount, failing when the stock cannot cover it.
    pub fn decrease_food(&self, amount: f32) -> Result<(), SimError> {
        assert!(amount >= 0.0, "food amount must not be negative");
        let mut state = self.state.lock().expect("colony state poisoned");
        if amount > state.food {
            return Err(SimError::InsufficientFood {
                requested: amount,
                available: state.food,
            });
        }
        state.food -= amount;
        Ok(())
    }

    /// Withdraw up to `amount`, returning how much was actually taken.
    pub fn consume_up_to(&self, amount: f32) -> f32 {
        let mut state = self.state.lock().expect("colony state poisoned");
        let taken = amount.max(0.0).min(state.food);
        state.food -= taken;
        taken
    }

    /// Pay for a new ant if the stock exceeds the spawn threshold by at
    /// least the spawn cost. Check and payment happen atomically.
    fn take_spawn_budget(&self) -> bool {
        let mut state = self.state.lock().expect("colony state poisoned");
        let cost = state.parameters.ant_spawn_food_cost;
        if state.food >= state.parameters.ant_spawn_food_threshold + cost {
            state.food -= cost;
            true
        } else {
            false
        }
    }

    pub fn ant_count(&self) -> usize {
        self.ants.lock().expect("colony ants poisoned").len()
    }

    /// Take an ant out of its slot for updating. Returns `None` when the ant
    /// died earlier this tick or is currently checked out.
    pub fn checkout(&self, key: AntKey) -> Option<Box<Ant>> {
        let mut ants = self.ants.lock().expect("colony ants poisoned");
        ants.get_mut(key).and_then(|slot| slot.ant.take())
    }

    /// Put an updated ant back into its slot.
    pub fn checkin(&self, key: AntKey, ant: Box<Ant>) {
        let mut ants = self.ants.lock().expect("colony ants poisoned");
        if let Some(slot) = ants.get_mut(key) {
            slot.ant = Some(ant);
        }
    }

    /// Drop an ant from the colony entirely.
    pub fn remove_ant(&self, key: AntKey) {
        self.ants.lock().expect("colony ants poisoned").remove(key);
    }

    /// Position of a checked-in ant.
    pub fn ant_position(&self, key: AntKey) -> Option<Vector> {
        let ants = self.ants.lock().expect("colony ants poisoned");
        ants.get(key)
            .and_then(|slot| slot.ant.as_ref())
            .map(|ant| ant.position())
    }

    /// Per-tick colony update: breed a new ant when the stock allows it.
    pub fn update(&self, acc: &mut Accessor<'_>) {
        if self.take_spawn_budget() {
            self.spawn_ant(acc, 0, 0);
        }
    }

    /// Spawn an ant at a random offset within the given radius band around
    /// the colony center.
    pub fn spawn_ant(&self, acc: &mut Accessor<'_>, min_radius: i32, max_radius: i32) -> AntRef {
        let spawn = acc.world().sample_ant_spawn(min_radius, max_radius);
        let pos = self.position + spawn.offset;
        let parameters = self.ant_parameters();

        let key = self
            .ants
            .lock()
            .expect("colony ants poisoned")
            .insert(AntSlot::default());
        let ant_ref = AntRef {
            colony: self.id,
            key,
        };
        let ant = Box::new(Ant::new(ant_ref, pos, spawn.direction, parameters, spawn.seed));

        acc.with_cell(pos, |cell| {
            cell.add_ant(AntMark {
                ant: ant_ref,
                carrying: false,
            })
        });
        acc.track(EntityRef::Ant(ant_ref), pos);

        self.ants.lock().expect("colony ants poisoned")[key].ant = Some(ant);
        ant_ref
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colony() -> Colony {
        Colony::new(
            ColonyId(0),
            Vector::ZERO,
            ColonyParameters::default(),
            AntParameters::default(),
        )
    }

    #[test]
    fn over_withdrawal_is_rejected_and_leaves_stock_untouched() {
        let colony = colony();
        colony.increase_food(10.0);
        let err = colony.decrease_food(10.5).unwrap_err();
        assert!(matches!(err, SimError::InsufficientFood { .. }));
        assert_eq!(colony.food(), 10.0);
        colony.decrease_food(10.0).unwrap();
        assert_eq!(colony.food(), 0.0);
    }

    #[test]
    fn consume_up_to_is_clamped() {
        let colony = colony();
        colony.increase_food(3.0);
        assert_eq!(colony.consume_up_to(5.0), 3.0);
        assert_eq!(colony.consume_up_to(5.0), 0.0);
        assert_eq!(colony.food(), 0.0);
    }

    #[test]
    fn spawn_budget_needs_threshold_plus_cost() {
        // Defaults: threshold 75, cost 25.
        let colony = colony();
        colony.increase_food(99.0);
        assert!(!colony.take_spawn_budget());
        colony.increase_food(1.0);
        assert!(colony.take_spawn_budget());
        assert_eq!(colony.food(), 75.0);
        assert!(!colony.take_spawn_budget());
    }
}
