use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use rand::Rng;
use rand_distr::{Distribution, Normal};

/// A 4-channel value, the unit every value, weight and error is made of.
///
/// Arithmetic is always componentwise. The layout matches a WGSL `vec4<f32>`
/// so grids of `Rgba` can be copied to GPU buffers as-is.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const ZERO: Rgba = Rgba::splat(0.0);
    pub const ONE: Rgba = Rgba::splat(1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Rgba { r, g, b, a }
    }

    pub const fn splat(v: f32) -> Self {
        Rgba { r: v, g: v, b: v, a: v }
    }

    pub const fn from_array(values: [f32; 4]) -> Self {
        Rgba::new(values[0], values[1], values[2], values[3])
    }

    pub const fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Applies `f` to each channel.
    pub fn map(self, f: impl Fn(f32) -> f32) -> Self {
        Rgba::new(f(self.r), f(self.g), f(self.b), f(self.a))
    }

    /// Combines two values channel by channel.
    pub fn zip_map(self, other: Rgba, f: impl Fn(f32, f32) -> f32) -> Self {
        Rgba::new(
            f(self.r, other.r),
            f(self.g, other.g),
            f(self.b, other.b),
            f(self.a, other.a),
        )
    }

    pub fn clamp(self, min: f32, max: f32) -> Self {
        self.map(|v| v.clamp(min, max))
    }

    /// Channel power. Negative channels with a fractional exponent yield NaN.
    pub fn powf(self, n: f32) -> Self {
        self.map(|v| v.powf(n))
    }

    pub fn sum(self) -> f32 {
        self.r + self.g + self.b + self.a
    }

    pub fn is_out_of_range(self, min: f32, max: f32) -> bool {
        self.to_array().iter().any(|v| *v < min || *v > max)
    }

    pub fn is_finite(self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }

    /// Draws each channel from `N(mean, std_dev)` and clamps it to `[min, max]`.
    pub fn random_normal<R: Rng + ?Sized>(
        rng: &mut R,
        mean: f32,
        std_dev: f32,
        min: f32,
        max: f32,
    ) -> Self {
        match Normal::new(mean, std_dev) {
            Ok(dist) => Rgba::new(
                dist.sample(rng).clamp(min, max),
                dist.sample(rng).clamp(min, max),
                dist.sample(rng).clamp(min, max),
                dist.sample(rng).clamp(min, max),
            ),
            // only reachable with a non-finite std_dev
            Err(_) => Rgba::splat(mean.clamp(min, max)),
        }
    }

    /// Xavier style draw with `std_dev = sqrt(2 / fan_in_fan_out)`, clamped to `[0, 1]`.
    pub fn random_xavier<R: Rng + ?Sized>(rng: &mut R, fan_in_fan_out: f32) -> Self {
        Rgba::random_normal(rng, 0.0, (2.0 / fan_in_fan_out).sqrt(), 0.0, 1.0)
    }
}

impl From<[f32; 4]> for Rgba {
    fn from(values: [f32; 4]) -> Self {
        Rgba::from_array(values)
    }
}

impl From<Rgba> for [f32; 4] {
    fn from(value: Rgba) -> Self {
        value.to_array()
    }
}

impl Add for Rgba {
    type Output = Rgba;

    fn add(self, rhs: Rgba) -> Rgba {
        self.zip_map(rhs, |a, b| a + b)
    }
}

impl Sub for Rgba {
    type Output = Rgba;

    fn sub(self, rhs: Rgba) -> Rgba {
        self.zip_map(rhs, |a, b| a - b)
    }
}

impl Mul for Rgba {
    type Output = Rgba;

    fn mul(self, rhs: Rgba) -> Rgba {
        self.zip_map(rhs, |a, b| a * b)
    }
}

impl Mul<f32> for Rgba {
    type Output = Rgba;

    fn mul(self, rhs: f32) -> Rgba {
        self.map(|v| v * rhs)
    }
}

impl Mul<Rgba> for f32 {
    type Output = Rgba;

    fn mul(self, rhs: Rgba) -> Rgba {
        rhs.map(|v| self * v)
    }
}

impl Neg for Rgba {
    type Output = Rgba;

    fn neg(self) -> Rgba {
        self.map(|v| -v)
    }
}

impl AddAssign for Rgba {
    fn add_assign(&mut self, rhs: Rgba) {
        *self = *self + rhs;
    }
}

impl SubAssign for Rgba {
    fn sub_assign(&mut self, rhs: Rgba) {
        *self = *self - rhs;
    }
}

impl MulAssign for Rgba {
    fn mul_assign(&mut self, rhs: Rgba) {
        *self = *self * rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_additive_inverse_and_identity() {
        let samples = [
            Rgba::new(0.1, 0.2, 0.3, 0.4),
            Rgba::new(-3.5, 12.0, 0.0, 1e-3),
            Rgba::new(f32::MAX / 4.0, -1.0, 0.5, 0.25),
        ];
        for v in samples {
            assert_eq!(v + (-1.0) * v, Rgba::ZERO);
            assert_eq!(v * 1.0, v);
            assert_eq!(v - v, Rgba::ZERO);
        }
    }

    #[test]
    fn test_componentwise_ops() {
        let a = Rgba::new(1.0, 2.0, 3.0, 4.0);
        let b = Rgba::new(2.0, 0.5, -1.0, 0.0);
        assert_eq!(a * b, Rgba::new(2.0, 1.0, -3.0, 0.0));
        assert_eq!(a + b, Rgba::new(3.0, 2.5, 2.0, 4.0));
        assert_eq!(a.clamp(1.5, 3.5), Rgba::new(1.5, 2.0, 3.0, 3.5));
        assert_eq!(a.powf(2.0), Rgba::new(1.0, 4.0, 9.0, 16.0));
        assert_eq!(a.sum(), 10.0);
        assert!(a.is_out_of_range(0.0, 1.0));
        assert!(!Rgba::splat(0.5).is_out_of_range(0.0, 1.0));

        let mut c = a;
        c -= b;
        c *= Rgba::splat(2.0);
        c += Rgba::ONE;
        assert_eq!(c, Rgba::new(-1.0, 4.0, 9.0, 9.0));
    }

    #[test]
    fn test_random_is_clamped() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let v = Rgba::random_xavier(&mut rng, 8.0);
            assert!(!v.is_out_of_range(0.0, 1.0));
            let w = Rgba::random_normal(&mut rng, 0.1, 0.01, 0.0, 0.1);
            assert!(!w.is_out_of_range(0.0, 0.1));
        }
    }
}
