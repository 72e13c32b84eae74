//! Perlin and fractal noise generators.

use glam::{DVec2, DVec3};

use super::SeedRandom;


/// Common interface of coherent noise samplers, generators are written against this
/// trait so they can be driven by any deterministic noise source.
pub trait NoiseSampler: Send + Sync {

    /// Single point of 1D noise, approximately in `-1.0..=1.0`.
    fn noise_1d(&self, x: f64) -> f64;

    /// Single point of 2D noise, approximately in `-1.0..=1.0`.
    fn noise_2d(&self, x: f64, y: f64) -> f64;

    /// Single point of 3D noise, approximately in `-1.0..=1.0`.
    fn noise_3d(&self, x: f64, y: f64, z: f64) -> f64;

    /// Sum of the given number of 1D octaves, normalized by the amplitudes sum.
    fn fractal_1d(&self, octaves: usize, x: f64) -> f64;

    /// Sum of the given number of 2D octaves, normalized by the amplitudes sum.
    fn fractal_2d(&self, octaves: usize, x: f64, y: f64) -> f64;

}


/// A 3D Perlin noise generator, lower dimensions are slices of the 3D field.
#[derive(Debug, Clone)]
pub struct PerlinNoise {
    /// All permutations used by Perlin noise algorithm.
    permutations: Box<[u16; 512]>,
    /// Offset applied to all position given to the generator, this avoids integer
    /// coordinates landing on lattice points where the noise is always zero.
    offset: DVec3,
}

impl PerlinNoise {

    /// Create a new perlin noise initialized with the given RNG.
    pub fn new(rand: &mut SeedRandom) -> Self {

        let offset = rand.next_dvec3() * 256.0;
        let mut permutations = Box::new(std::array::from_fn::<u16, 512, _>(|i| {
            if i < 256 { i as u16 } else { 0 }
        }));

        for index in 0usize..256 {
            let permutation_index = rand.next_int_bounded(256 - index as i32) as usize + index;
            permutations.swap(index, permutation_index);
            permutations[index + 256] = permutations[index];
        }

        Self {
            permutations,
            offset,
        }

    }

    /// Get the noise value at given 3D coordinates.
    pub fn sample_3d(&self, pos: DVec3) -> f64 {

        let mut pos = pos + self.offset;
        let pos_floor = pos.floor();
        pos -= pos_floor;
        let factor = pos * pos * pos * (pos * (pos * 6.0 - 15.0) + 10.0);

        let x_index = (pos_floor.x as i64 & 255) as usize;
        let y_index = (pos_floor.y as i64 & 255) as usize;
        let z_index = (pos_floor.z as i64 & 255) as usize;

        let perm = &self.permutations;
        let a = perm[x_index] as usize + y_index;
        let a0 = perm[a] as usize + z_index;
        let a1 = perm[a + 1] as usize + z_index;
        let b = perm[x_index + 1] as usize + y_index;
        let b0 = perm[b] as usize + z_index;
        let b1 = perm[b + 1] as usize + z_index;

        lerp(factor.z,
            lerp(factor.y,
                lerp(factor.x,
                    grad(perm[a0], pos),
                    grad(perm[b0], pos - DVec3::new(1.0, 0.0, 0.0))),
                lerp(factor.x,
                    grad(perm[a1], pos - DVec3::new(0.0, 1.0, 0.0)),
                    grad(perm[b1], pos - DVec3::new(1.0, 1.0, 0.0)))),
            lerp(factor.y,
                lerp(factor.x,
                    grad(perm[a0 + 1], pos - DVec3::new(0.0, 0.0, 1.0)),
                    grad(perm[b0 + 1], pos - DVec3::new(1.0, 0.0, 1.0))),
                lerp(factor.x,
                    grad(perm[a1 + 1], pos - DVec3::new(0.0, 1.0, 1.0)),
                    grad(perm[b1 + 1], pos - DVec3::new(1.0, 1.0, 1.0)))))

    }

    /// Get the noise value at given 2D coordinates.
    #[inline]
    pub fn sample_2d(&self, pos: DVec2) -> f64 {
        self.sample_3d(pos.extend(0.0))
    }

    /// Get the noise value at given 1D coordinate.
    #[inline]
    pub fn sample_1d(&self, x: f64) -> f64 {
        self.sample_3d(DVec3::new(x, 0.0, 0.0))
    }

}

#[inline]
fn lerp(factor: f64, from: f64, to: f64) -> f64 {
    from + factor * (to - from)
}

#[inline]
fn grad(value: u16, pos: DVec3) -> f64 {
    let value = value & 15;
    let a = if value < 8 { pos.x } else { pos.y };
    let b = if value < 4 { pos.y } else if value != 12 && value != 14 { pos.z } else { pos.x };
    (if value & 1 == 0 { a } else { -a }) + (if value & 2 == 0 { b } else { -b })
}


/// Parameters of a fractal sum, each octave multiplies the frequency by the
/// lacunarity and the amplitude by the persistence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FractalParams {
    pub frequency: f64,
    pub amplitude: f64,
    pub lacunarity: f64,
    pub persistence: f64,
}

impl Default for FractalParams {
    fn default() -> Self {
        Self {
            frequency: 1.0,
            amplitude: 1.0,
            lacunarity: 2.0,
            persistence: 0.5,
        }
    }
}


/// A seeded noise generator with fractal sums, this is the sampler used by the
/// terrain generators.
#[derive(Debug, Clone)]
pub struct NoiseGenerator {
    perlin: PerlinNoise,
    params: FractalParams,
}

impl NoiseGenerator {

    pub fn new(seed: i64, params: FractalParams) -> Self {
        Self {
            perlin: PerlinNoise::new(&mut SeedRandom::new(seed)),
            params,
        }
    }

    #[inline]
    pub fn params(&self) -> &FractalParams {
        &self.params
    }

    fn fractal(&self, octaves: usize, mut sample: impl FnMut(f64) -> f64) -> f64 {

        let mut output = 0.0;
        let mut denom = 0.0;
        let mut frequency = self.params.frequency;
        let mut amplitude = self.params.amplitude;

        for _ in 0..octaves {
            output += amplitude * sample(frequency);
            denom += amplitude;
            frequency *= self.params.lacunarity;
            amplitude *= self.params.persistence;
        }

        if denom == 0.0 {
            0.0
        } else {
            output / denom
        }

    }

}

impl NoiseSampler for NoiseGenerator {

    #[inline]
    fn noise_1d(&self, x: f64) -> f64 {
        self.perlin.sample_1d(x)
    }

    #[inline]
    fn noise_2d(&self, x: f64, y: f64) -> f64 {
        self.perlin.sample_2d(DVec2::new(x, y))
    }

    #[inline]
    fn noise_3d(&self, x: f64, y: f64, z: f64) -> f64 {
        self.perlin.sample_3d(DVec3::new(x, y, z))
    }

    fn fractal_1d(&self, octaves: usize, x: f64) -> f64 {
        self.fractal(octaves, |freq| self.perlin.sample_1d(x * freq))
    }

    fn fractal_2d(&self, octaves: usize, x: f64, y: f64) -> f64 {
        self.fractal(octaves, |freq| self.perlin.sample_2d(DVec2::new(x, y) * freq))
    }

}


/// A sampler returning the same value everywhere.
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConstNoise(pub f64);

#[cfg(test)]
impl NoiseSampler for ConstNoise {
    fn noise_1d(&self, _x: f64) -> f64 { self.0 }
    fn noise_2d(&self, _x: f64, _y: f64) -> f64 { self.0 }
    fn noise_3d(&self, _x: f64, _y: f64, _z: f64) -> f64 { self.0 }
    fn fractal_1d(&self, _octaves: usize, _x: f64) -> f64 { self.0 }
    fn fractal_2d(&self, _octaves: usize, _x: f64, _y: f64) -> f64 { self.0 }
}
