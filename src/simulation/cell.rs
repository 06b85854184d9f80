use crate::config::WorldParameters;
use crate::direction::Vector;
use crate::simulation::NO_SCENT_THRESHOLD;
use crate::simulation::entity::{AntRef, ColonyId};

/// One colony's scent markers on a single cell.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Scent {
    pub food: f32,
    pub colony: f32,
    pub avoid: f32,
}

impl Scent {
    /// All axes have faded below the threshold where the marker still matters.
    pub fn is_empty(&self) -> bool {
        self.food < NO_SCENT_THRESHOLD
            && self.colony < NO_SCENT_THRESHOLD
            && self.avoid < NO_SCENT_THRESHOLD
    }

    pub fn decay(&mut self, parameters: &WorldParameters) {
        self.food *= parameters.food_scent_decay;
        self.colony *= parameters.colony_scent_decay;
        self.avoid *= parameters.avoid_scent_decay;
    }
}

/// A pile of food lying on a cell. Expires after a sampled number of ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoodSource {
    pub amount: f32,
    pub expire_timer: i32,
}

impl FoodSource {
    pub fn new(amount: f32, expire_timer: i32) -> Self {
        Self {
            amount,
            expire_timer,
        }
    }

    pub fn increase(&mut self, amount: f32) {
        self.amount += amount;
    }

    /// Withdraw up to `max`, returning how much was actually taken.
    pub fn take(&mut self, max: f32) -> f32 {
        let taken = max.min(self.amount);
        self.amount -= taken;
        taken
    }

    /// Tick the expiry timer. Returns true once the source is exhausted,
    /// either emptied by ants or timed out.
    pub fn update(&mut self) -> bool {
        if self.expire_timer <= 0 {
            self.amount = 0.0;
        } else {
            self.expire_timer -= 1;
        }
        self.amount <= 0.0
    }
}

/// An ant standing on a cell, as seen by other ants passing by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AntMark {
    pub ant: AntRef,
    pub carrying: bool,
}

/// Read-only snapshot of a cell from one colony's point of view, taken while
/// the cell lock is held so behavior code can work on it lock-free.
#[derive(Debug, Clone, Copy)]
pub struct CellProbe {
    pub position: Vector,
    pub height: f32,
    pub colony: Option<ColonyId>,
    pub food: f32,
    pub scent: Scent,
    /// Whether a nestmate carrying food stands here.
    pub carrying_nestmate: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Cell {
    pub position: Vector,
    pub height: f32,
    pub food: Option<FoodSource>,
    pub colony: Option<ColonyId>,
    ants: Vec<AntMark>,
    scents: Vec<(ColonyId, Scent)>,
}

impl Cell {
    pub fn new(position: Vector) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn has_food(&self) -> bool {
        self.food.is_some_and(|f| f.amount > 0.0)
    }

    pub fn food_amount(&self) -> f32 {
        self.food.map_or(0.0, |f| f.amount)
    }

    pub fn scent(&self, colony: ColonyId) -> Scent {
        self.scents
            .iter()
            .find(|(id, _)| *id == colony)
            .map(|(_, s)| *s)
            .unwrap_or_default()
    }

    pub fn scent_mut(&mut self, colony: ColonyId) -> &mut Scent {
        if let Some(index) = self.scents.iter().position(|(id, _)| *id == colony) {
            return &mut self.scents[index].1;
        }
        self.scents.push((colony, Scent::default()));
        &mut self.scents.last_mut().unwrap().1
    }

    pub fn add_ant(&mut self, mark: AntMark) {
        self.ants.push(mark);
    }

    pub fn remove_ant(&mut self, ant: AntRef) -> bool {
        match self.ants.iter().position(|mark| mark.ant == ant) {
            Some(index) => {
                self.ants.swap_remove(index);
                true
            }
            None => false,
        }
    }

    pub fn set_ant_carrying(&mut self, ant: AntRef, carrying: bool) {
        if let Some(mark) = self.ants.iter_mut().find(|mark| mark.ant == ant) {
            mark.carrying = carrying;
        }
    }

    pub fn ants(&self) -> &[AntMark] {
        &self.ants
    }

    fn carrying_nestmate_of(&self, colony: ColonyId, exclude: Option<AntRef>) -> bool {
        self.ants.iter().any(|mark| {
            mark.carrying && mark.ant.colony == colony && Some(mark.ant) != exclude
        })
    }

    pub fn probe(&self, colony: ColonyId, me: Option<AntRef>) -> CellProbe {
        CellProbe {
            position: self.position,
            height: self.height,
            colony: self.colony,
            food: self.food_amount(),
            scent: self.scent(colony),
            carrying_nestmate: self.carrying_nestmate_of(colony, me),
        }
    }

    /// Nothing left on this cell that a per-tick pass would change or an ant
    /// would care about.
    pub fn is_empty(&self) -> bool {
        self.scents.is_empty() && self.ants.is_empty() && self.colony.is_none() && self.food.is_none()
    }

    /// Per-tick decay pass. Returns true when the cell has gone empty and can
    /// be suspended.
    pub fn update(&mut self, parameters: &WorldParameters) -> bool {
        for (_, scent) in &mut self.scents {
            scent.decay(parameters);
        }
        self.scents.retain(|(_, scent)| !scent.is_empty());
        self.is_empty()
    }
}
