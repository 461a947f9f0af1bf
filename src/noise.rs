//! Stateless hashing and coherent noise shared by the CPU and GPU paths.
//!
//! Every stochastic term inside a simulation step is drawn from these
//! functions, keyed by agent index and tick, so the sequential, parallel and
//! GPU executions see the same numbers. [`NOISE_WGSL`] is the WGSL twin of
//! the Rust functions below and must be kept in lockstep with them.
//!
//! # Available Functions
//!
//! - `hash(n: u32) -> u32` - integer avalanche hash
//! - `hash2(a: u32, b: u32) -> u32` - hash of a pair
//! - `rand01(seed: u32) -> f32` - uniform float in [0, 1]
//! - `noise2(p: vec2<f32>) -> f32` - 2D gradient noise in [-1, 1]

use glam::Vec2;

/// Hash a u32 to a pseudo-random u32.
#[inline]
pub fn hash(n: u32) -> u32 {
    let mut x = n;
    x ^= x >> 17;
    x = x.wrapping_mul(0xed5a_d4bb);
    x ^= x >> 11;
    x = x.wrapping_mul(0xac4c_1b51);
    x ^= x >> 15;
    x = x.wrapping_mul(0x3184_8bab);
    x ^= x >> 14;
    x
}

/// Hash a pair of u32s.
#[inline]
pub fn hash2(a: u32, b: u32) -> u32 {
    hash(a.wrapping_add(hash(b)))
}

/// Uniform float in [0, 1].
#[inline]
pub fn rand01(seed: u32) -> f32 {
    hash(seed) as f32 / 4_294_967_295.0
}

/// Seed for the `stream`-th random draw of agent `index` at `tick`.
#[inline]
pub fn agent_seed(index: u32, tick: u32, stream: u32) -> u32 {
    hash2(index.wrapping_mul(0x9e37_79b9) ^ stream, tick)
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[inline]
fn gradient(ix: i32, iy: i32) -> Vec2 {
    let h = hash2(ix as u32, iy as u32);
    Vec2::new(
        (h & 0xffff) as f32 / 32767.5 - 1.0,
        (h >> 16) as f32 / 32767.5 - 1.0,
    )
}

/// 2D gradient noise in [-1, 1], continuous with continuous derivative.
pub fn noise2(p: Vec2) -> f32 {
    let cell = p.floor();
    let f = p - cell;
    let ix = cell.x as i32;
    let iy = cell.y as i32;
    let u = f * f * f * (f * (f * 6.0 - 15.0) + 10.0);

    let n00 = gradient(ix, iy).dot(f);
    let n10 = gradient(ix + 1, iy).dot(f - Vec2::new(1.0, 0.0));
    let n01 = gradient(ix, iy + 1).dot(f - Vec2::new(0.0, 1.0));
    let n11 = gradient(ix + 1, iy + 1).dot(f - Vec2::new(1.0, 1.0));

    let nx0 = lerp(n00, n10, u.x);
    let nx1 = lerp(n01, n11, u.x);
    (lerp(nx0, nx1, u.y) * 1.4142).clamp(-1.0, 1.0)
}

/// WGSL code for the hash and noise functions above.
pub const NOISE_WGSL: &str = r#"
fn hash(n: u32) -> u32 {
    var x = n;
    x = x ^ (x >> 17u);
    x = x * 0xed5ad4bbu;
    x = x ^ (x >> 11u);
    x = x * 0xac4c1b51u;
    x = x ^ (x >> 15u);
    x = x * 0x31848babu;
    x = x ^ (x >> 14u);
    return x;
}

fn hash2(a: u32, b: u32) -> u32 {
    return hash(a + hash(b));
}

fn rand01(seed: u32) -> f32 {
    return f32(hash(seed)) / 4294967295.0;
}

fn agent_seed(index: u32, tick: u32, stream: u32) -> u32 {
    return hash2((index * 0x9e3779b9u) ^ stream, tick);
}

fn lerp1(a: f32, b: f32, t: f32) -> f32 {
    return a + (b - a) * t;
}

fn gradient(ix: i32, iy: i32) -> vec2<f32> {
    let h = hash2(bitcast<u32>(ix), bitcast<u32>(iy));
    return vec2<f32>(
        f32(h & 0xffffu) / 32767.5 - 1.0,
        f32(h >> 16u) / 32767.5 - 1.0
    );
}

fn noise2(p: vec2<f32>) -> f32 {
    let lattice = floor(p);
    let f = p - lattice;
    let ix = i32(lattice.x);
    let iy = i32(lattice.y);
    let u = f * f * f * (f * (f * 6.0 - 15.0) + 10.0);

    let n00 = dot(gradient(ix, iy), f);
    let n10 = dot(gradient(ix + 1, iy), f - vec2<f32>(1.0, 0.0));
    let n01 = dot(gradient(ix, iy + 1), f - vec2<f32>(0.0, 1.0));
    let n11 = dot(gradient(ix + 1, iy + 1), f - vec2<f32>(1.0, 1.0));

    let nx0 = lerp1(n00, n10, u.x);
    let nx1 = lerp1(n01, n11, u.x);
    return clamp(lerp1(nx0, nx1, u.y) * 1.4142, -1.0, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic_and_mixes() {
        assert_eq!(hash(12345), hash(12345));
        assert_ne!(hash(1), hash(2));
        assert_ne!(hash2(1, 2), hash2(2, 1));
    }

    #[test]
    fn test_rand01_range() {
        for seed in 0..10_000u32 {
            let r = rand01(seed);
            assert!((0.0..=1.0).contains(&r));
        }
    }

    #[test]
    fn test_rand01_is_roughly_uniform() {
        let n = 20_000u32;
        let mean: f32 = (0..n).map(rand01).sum::<f32>() / n as f32;
        assert!((mean - 0.5).abs() < 0.02, "mean was {mean}");
    }

    #[test]
    fn test_noise_range_and_lattice_zero() {
        for i in 0..2000 {
            let p = Vec2::new(i as f32 * 0.173 - 150.0, i as f32 * 0.091 + 7.0);
            let n = noise2(p);
            assert!((-1.0..=1.0).contains(&n));
        }
        // Gradient noise vanishes on lattice points.
        assert!(noise2(Vec2::new(3.0, -4.0)).abs() < 1e-6);
    }

    #[test]
    fn test_noise_is_continuous() {
        let p = Vec2::new(10.37, -2.81);
        let a = noise2(p);
        let b = noise2(p + Vec2::splat(1e-3));
        assert!((a - b).abs() < 0.01);
    }

    #[test]
    fn test_noise_wgsl_is_valid() {
        let module = naga::front::wgsl::parse_str(NOISE_WGSL).expect("noise WGSL should parse");
        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        validator.validate(&module).expect("noise WGSL should validate");
    }
}
