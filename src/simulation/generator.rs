use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::config::WorldParameters;
use crate::direction::Vector;
use crate::simulation::cell::Cell;
use crate::simulation::chunk::{Chunk, CHUNK_SIZE};
use crate::simulation::gaussian;

/// A pile of food the generator wants placed on the map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoodDrop {
    pub position: Vector,
    pub amount: f32,
    pub expire_timer: i32,
}

/// Produces the terrain and resources of the world. Cell generation runs
/// under the chunk's grid lock and must stay local to the cell; food that
/// spills onto neighboring cells is returned as [`FoodDrop`]s and placed by
/// the caller, so the generator never reaches back into the chunk grid.
pub trait WorldGenerator: Send {
    fn set_seed(&mut self, seed: u64);

    /// Fill in a freshly allocated cell. Returns the amount of food to
    /// scatter around it, if any; the caller feeds that into
    /// [`Self::scatter_food`] once the chunk's grid lock is released.
    fn generate(&mut self, cell: &mut Cell) -> Option<f32>;

    /// Break `amount` food into piles spread around `center`.
    fn scatter_food(&mut self, center: Vector, amount: f32) -> Vec<FoodDrop>;

    /// Periodic per-chunk hook, called once per tick for every populated
    /// chunk.
    fn update(&mut self, chunk: &Chunk, time: u64) -> Vec<FoodDrop>;
}

/// Default generator: Perlin-noise terrain with sparse hash-placed food
/// piles that respawn at a slow, expiry-matched rate.
pub struct SimpleFoodWorldGenerator {
    seed: u64,
    parameters: WorldParameters,
    rng: SmallRng,
}

const FOOD_CELL_CHANCE: f32 = 0.0001;
const FOOD_PILE_AMOUNT: f32 = 25.0;

impl SimpleFoodWorldGenerator {
    pub fn new(seed: u64, parameters: WorldParameters) -> Self {
        Self {
            seed,
            parameters,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Jenkins one-at-a-time over the seed and the given values.
    fn hash(&self, values: &[i32]) -> i32 {
        let mut hash = self.seed as i32;
        hash = hash.wrapping_add(hash << 10);
        hash ^= hash >> 6;
        for &value in values {
            hash = hash.wrapping_add(value);
            hash = hash.wrapping_add(hash << 10);
            hash ^= hash >> 6;
        }
        hash = hash.wrapping_add(hash << 3);
        hash ^= hash >> 11;
        hash = hash.wrapping_add(hash << 15);
        hash
    }

    /// Hash to a uniform float in [0, 1) by stuffing the hash bits into the
    /// mantissa of an IEEE float in [1, 2).
    fn hash_to_float(&self, values: &[i32]) -> f32 {
        const IEEE_MANTISSA: i32 = 0x007F_FFFF;
        const IEEE_ONE: i32 = 0x3F80_0000;
        let bits = (self.hash(values) & IEEE_MANTISSA) | IEEE_ONE;
        f32::from_bits(bits as u32) - 1.0
    }

    /// Six octaves of Perlin noise, clamped so no terrain sits below the
    /// walkable band around sea level.
    fn generate_height(&self, x: i32, y: i32) -> f32 {
        let persistence = 0.5f32;
        let lacunarity = 2.0f32;
        let mut amplitude = 1.0f32;
        let mut frequency = 1.0 / 64.0f32;
        let mut noise = 0.0f32;
        let mut max_value = 0.0f32;
        for _ in 0..6 {
            noise += perlin_noise(x as f32 * frequency, y as f32 * frequency) * amplitude;
            max_value += amplitude;
            amplitude *= persistence;
            frequency *= lacunarity;
        }
        let noise = (noise / max_value) * 0.5 + 0.5;
        noise.max(0.49)
    }

    fn next_food_expire_time(&mut self) -> i32 {
        let time = gaussian(
            &mut self.rng,
            self.parameters.food_expire_time_mean,
            self.parameters.food_expire_time_deviation,
        );
        time.max(self.parameters.food_expire_time_min) as i32
    }
}

impl WorldGenerator for SimpleFoodWorldGenerator {
    fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = SmallRng::seed_from_u64(seed);
    }

    fn generate(&mut self, cell: &mut Cell) -> Option<f32> {
        cell.height = self.generate_height(cell.position.x, cell.position.y);
        (self.hash_to_float(&[cell.position.x, cell.position.y]) < FOOD_CELL_CHANCE)
            .then_some(FOOD_PILE_AMOUNT)
    }

    fn scatter_food(&mut self, center: Vector, amount: f32) -> Vec<FoodDrop> {
        let samples = amount.floor() as i32;
        if samples <= 0 {
            return Vec::new();
        }
        let sigma = (amount / FOOD_PILE_AMOUNT).sqrt().max(1.0);
        let per_sample = amount / samples as f32;
        (0..samples)
            .map(|_| {
                let dx = gaussian(&mut self.rng, 0.0, sigma).round() as i32;
                let dy = gaussian(&mut self.rng, 0.0, sigma).round() as i32;
                FoodDrop {
                    position: center + Vector::new(dx, dy),
                    amount: per_sample,
                    expire_timer: self.next_food_expire_time(),
                }
            })
            .collect()
    }

    fn update(&mut self, chunk: &Chunk, time: u64) -> Vec<FoodDrop> {
        let spawn_chance = 1.0 / self.parameters.food_expire_time_mean;
        let key = [chunk.chunk_x(), chunk.chunk_y(), time as i32];
        if self.hash_to_float(&key) >= spawn_chance {
            return Vec::new();
        }
        let offset = Vector::new(
            self.rng.random_range(0..CHUNK_SIZE),
            self.rng.random_range(0..CHUNK_SIZE),
        );
        self.scatter_food(chunk.origin() + offset, FOOD_PILE_AMOUNT)
    }
}

/// Classic permutation-table Perlin noise over a 256-cell gradient lattice.
fn perlin_noise(x: f32, y: f32) -> f32 {
    let xi = (x.floor() as i32 & 255) as usize;
    let yi = (y.floor() as i32 & 255) as usize;
    let top_left = P[P[xi] + yi];
    let top_right = P[P[xi + 1] + yi];
    let bottom_left = P[P[xi] + yi + 1];
    let bottom_right = P[P[xi + 1] + yi + 1];

    let xf = x - x.floor();
    let yf = y - y.floor();

    let d1 = gradient_dot(top_left, xf, yf);
    let d2 = gradient_dot(top_right, xf - 1.0, yf);
    let d3 = gradient_dot(bottom_left, xf, yf - 1.0);
    let d4 = gradient_dot(bottom_right, xf - 1.0, yf - 1.0);

    let u = fade(xf);
    let v = fade(yf);

    lerp(v, lerp(u, d1, d2), lerp(u, d3, d4))
}

fn gradient_dot(hash: usize, x: f32, y: f32) -> f32 {
    match hash & 3 {
        0 => x + y,
        1 => -x + y,
        2 => x - y,
        _ => -x - y,
    }
}

fn fade(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

fn lerp(amount: f32, left: f32, right: f32) -> f32 {
    (right - left) * amount + left
}

const PERMUTATION: [usize; 256] = [
    151, 160, 137, 91, 90, 15, 131, 13, 201, 95, 96, 53, 194, 233, 7, 225, 140, 36, 103, 30, 69,
    142, 8, 99, 37, 240, 21, 10, 23, 190, 6, 148, 247, 120, 234, 75, 0, 26, 197, 62, 94, 252, 219,
    203, 117, 35, 11, 32, 57, 177, 33, 88, 237, 149, 56, 87, 174, 20, 125, 136, 171, 168, 68, 175,
    74, 165, 71, 134, 139, 48, 27, 166, 77, 146, 158, 231, 83, 111, 229, 122, 60, 211, 133, 230,
    220, 105, 92, 41, 55, 46, 245, 40, 244, 102, 143, 54, 65, 25, 63, 161, 1, 216, 80, 73, 209, 76,
    132, 187, 208, 89, 18, 169, 200, 196, 135, 130, 116, 188, 159, 86, 164, 100, 109, 198, 173,
    186, 3, 64, 52, 217, 226, 250, 124, 123, 5, 202, 38, 147, 118, 126, 255, 82, 85, 212, 207, 206,
    59, 227, 47, 16, 58, 17, 182, 189, 28, 42, 223, 183, 170, 213, 119, 248, 152, 2, 44, 154, 163,
    70, 221, 153, 101, 155, 167, 43, 172, 9, 129, 22, 39, 253, 19, 98, 108, 110, 79, 113, 224, 232,
    178, 185, 112, 104, 218, 246, 97, 228, 251, 34, 242, 193, 238, 210, 144, 12, 191, 179, 162,
    241, 81, 51, 145, 235, 249, 14, 239, 107, 49, 192, 214, 31, 181, 199, 106, 157, 184, 84, 204,
    176, 115, 121, 50, 45, 127, 4, 150, 254, 138, 236, 205, 93, 222, 114, 67, 29, 24, 72, 243, 141,
    128, 195, 78, 66, 215, 61, 156, 180,
];

const P: [usize; 512] = {
    let mut p = [0usize; 512];
    let mut i = 0;
    while i < 256 {
        p[i] = PERMUTATION[i];
        p[256 + i] = PERMUTATION[i];
        i += 1;
    }
    p
};

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> SimpleFoodWorldGenerator {
        SimpleFoodWorldGenerator::new(1337, WorldParameters::default())
    }

    #[test]
    fn hash_to_float_is_deterministic_and_in_range() {
        let generator = generator();
        for x in -50..50 {
            for y in -50..50 {
                let value = generator.hash_to_float(&[x, y]);
                assert!((0.0..1.0).contains(&value), "{value} out of range");
                assert_eq!(value, generator.hash_to_float(&[x, y]));
            }
        }
        // The hash must depend on argument order.
        assert_ne!(
            generator.hash_to_float(&[1, 2]),
            generator.hash_to_float(&[2, 1])
        );
    }

    #[test]
    fn different_seeds_place_food_differently() {
        let a = SimpleFoodWorldGenerator::new(1, WorldParameters::default());
        let b = SimpleFoodWorldGenerator::new(2, WorldParameters::default());
        let differs = (0..1000).any(|x| a.hash_to_float(&[x, 0]) != b.hash_to_float(&[x, 0]));
        assert!(differs);
    }

    #[test]
    fn heights_stay_inside_the_walkable_band() {
        let generator = generator();
        for x in (-500..500).step_by(7) {
            for y in (-500..500).step_by(7) {
                let height = generator.generate_height(x, y);
                assert!((0.49..=1.0).contains(&height), "height {height} at {x},{y}");
            }
        }
    }

    #[test]
    fn terrain_varies_across_the_map() {
        let generator = generator();
        let mut heights: Vec<f32> = Vec::new();
        for x in (-500..500).step_by(31) {
            heights.push(generator.generate_height(x, x / 2));
        }
        let min = heights.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = heights.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        assert!(max - min > 0.05, "terrain is flat: {min}..{max}");
    }

    #[test]
    fn generated_cells_get_heights_and_rare_food() {
        let mut generator = generator();
        let mut food_cells = 0;
        for x in 0..200 {
            for y in 0..200 {
                let mut cell = Cell::new(Vector::new(x, y));
                if generator.generate(&mut cell).is_some() {
                    food_cells += 1;
                }
                assert!(cell.height >= 0.49);
            }
        }
        // 40_000 cells at one in ten thousand.
        assert!(food_cells < 40, "too many food cells: {food_cells}");
    }

    #[test]
    fn scattered_piles_conserve_the_total_amount() {
        let mut generator = generator();
        let center = Vector::new(10, -3);
        let drops = generator.scatter_food(center, 25.0);
        assert_eq!(drops.len(), 25);
        let total: f32 = drops.iter().map(|d| d.amount).sum();
        assert!((total - 25.0).abs() < 1e-3);
        for drop in &drops {
            assert!((drop.position - center).chebyshev() < 20, "stray drop {drop:?}");
            assert!(drop.expire_timer >= 1000);
        }
    }

    #[test]
    fn food_expiry_respects_the_minimum() {
        let mut generator = generator();
        for _ in 0..100 {
            let expire = generator.next_food_expire_time();
            assert!(expire >= WorldParameters::default().food_expire_time_min as i32);
        }
    }
}
