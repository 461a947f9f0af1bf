//! WGSL source for the flock compute kernel.
//!
//! The kernel is the GPU twin of [`StepContext::step`](crate::step::StepContext::step):
//! one invocation per agent, reading `agents_in` and writing `agents_out`, so
//! the two-phase barrier holds on the device too. Neighbours are found by a
//! brute-force scan with the same distance filter the grid consumers apply,
//! which yields the same neighbour set as the CPU path.
//!
//! Constants are spliced in from the Rust definitions so both sides share one
//! source of truth.

use std::f32::consts::{FRAC_PI_2, PI, TAU};

use crate::config::{PANIC_FLOOR, PANIC_SPEED_BOOST, WIND_FORCE_SCALE};
use crate::forces::{
    DENSITY_SATURATION, MIN_DENSITY_FACTOR, MIN_DISTANCE, STREAM_JITTER, WALL_JITTER_ZONE,
    WIND_MAGNITUDE_OFFSET, WIND_NOISE_RATE, WIND_NOISE_SCALE,
};
use crate::noise::NOISE_WGSL;
use crate::step::{EDGE_PADDING, FORCE_SCALE, HEADING_MIN_SPEED, WALL_FRICTION, WALL_RESTITUTION};

/// Invocations per workgroup.
pub const WORKGROUP_SIZE: u32 = 64;

const BINDINGS_WGSL: &str = r#"
struct Params {
    world: vec2<f32>,
    count: u32,
    tick: u32,
    dt: f32,
    time: f32,
    max_speed: f32,
    max_force: f32,
    perception_radius: f32,
    separation_radius: f32,
    alignment_weight: f32,
    cohesion_weight: f32,
    separation_weight: f32,
    fov_cos: f32,
    boundary_margin: f32,
    boundary_force: f32,
    boundary_curve: f32,
    boundary_lookahead: f32,
    wall_damping_factor: f32,
    noise_strength: f32,
    wander_strength: f32,
    wander_scale: f32,
    wander_rate: f32,
    flee_weight: f32,
    sim_speed: f32,
    energy_enabled: u32,
    min_energy_speed: f32,
    energy_decay_rate: f32,
    min_escape_speed: f32,
    panic_decay: f32,
    wind_enabled: u32,
    wind_speed: f32,
    wind_direction: f32,
    wind_turbulence: f32,
    threat_count: u32,
    attractor_count: u32,
}

struct Agent {
    position: vec2<f32>,
    velocity: vec2<f32>,
    heading: f32,
    panic: f32,
    energy: f32,
    density: f32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> agents_in: array<Agent>;
@group(0) @binding(2) var<storage, read_write> agents_out: array<Agent>;
// xy = position, z = effective panic radius
@group(0) @binding(3) var<storage, read> threats: array<vec4<f32>>;
// xy = position, z = signed strength, w = radius
@group(0) @binding(4) var<storage, read> attractors: array<vec4<f32>>;
"#;

const STEERING_WGSL: &str = r#"
fn limit(v: vec2<f32>, max_len: f32) -> vec2<f32> {
    let m = max(max_len, 0.0);
    let len_sq = dot(v, v);
    if len_sq > m * m {
        return m * (v / sqrt(len_sq));
    }
    return v;
}

fn normalize_or_zero(v: vec2<f32>) -> vec2<f32> {
    let len = length(v);
    if len > 0.0 {
        return v * (1.0 / len);
    }
    return vec2<f32>(0.0);
}

fn from_angle(a: f32) -> vec2<f32> {
    return vec2<f32>(cos(a), sin(a));
}

fn steer_towards(direction: vec2<f32>, velocity: vec2<f32>, speed: f32, max_force: f32) -> vec2<f32> {
    let dir = normalize_or_zero(direction);
    if dir.x == 0.0 && dir.y == 0.0 {
        return vec2<f32>(0.0);
    }
    return limit(dir * speed - velocity, max_force);
}

fn smoothstep01(t: f32) -> f32 {
    let c = clamp(t, 0.0, 1.0);
    return c * c * (3.0 - 2.0 * c);
}

fn edge_factor(dist: f32, margin: f32, curve: f32) -> f32 {
    if dist <= 0.0 {
        return 1.0;
    }
    if dist < margin {
        let s = smoothstep01(1.0 - dist / margin);
        if s <= 0.0 {
            return 0.0;
        }
        return pow(s, curve);
    }
    return 0.0;
}

fn boundary(position: vec2<f32>, velocity: vec2<f32>) -> vec2<f32> {
    let margin = params.boundary_margin;
    if margin <= 0.0 {
        return vec2<f32>(0.0);
    }
    let ahead = position + velocity * params.boundary_lookahead;
    let curve = params.boundary_curve;
    let w = params.world;

    let left = edge_factor(min(position.x, ahead.x), margin, curve);
    let right = edge_factor(min(w.x - position.x, w.x - ahead.x), margin, curve);
    let top = edge_factor(min(position.y, ahead.y), margin, curve);
    let bottom = edge_factor(min(w.y - position.y, w.y - ahead.y), margin, curve);

    let depth = max(max(left, right), max(top, bottom));
    if depth <= 0.0 {
        return vec2<f32>(0.0);
    }
    let push = vec2<f32>(left - right, top - bottom);
    return steer_towards(push, velocity, params.max_speed * depth, params.max_force) * params.boundary_force;
}

fn wall_damping(wall_distance: f32) -> f32 {
    let margin = params.boundary_margin;
    if margin <= 0.0 || wall_distance >= margin {
        return 1.0;
    }
    let t = clamp(wall_distance / margin, 0.0, 1.0);
    return params.wall_damping_factor + (1.0 - params.wall_damping_factor) * t;
}

fn wind(position: vec2<f32>) -> vec2<f32> {
    if params.wind_enabled == 0u || params.wind_speed <= 0.0 {
        return vec2<f32>(0.0);
    }
    var angle = params.wind_direction;
    var magnitude = params.wind_speed * WIND_FORCE_SCALE;
    if params.wind_turbulence > 0.0 {
        let sample = position * WIND_NOISE_SCALE + vec2<f32>(params.time * WIND_NOISE_RATE);
        angle += noise2(sample) * params.wind_turbulence * FRAC_PI_2;
        magnitude *= 1.0 + noise2(sample + WIND_MAGNITUDE_OFFSET) * params.wind_turbulence * 0.5;
    }
    return from_angle(angle) * magnitude;
}
"#;

const MAIN_WGSL: &str = r#"
@compute @workgroup_size(WORKGROUP_SIZE_VALUE)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if i >= params.count {
        return;
    }
    let me = agents_in[i];
    let position = me.position;
    let velocity = me.velocity;
    let heading = me.heading;
    let forward = from_angle(heading);

    // Neighbourhood
    var count = 0u;
    var align_sum = vec2<f32>(0.0);
    var align_weight = 0.0;
    var mass_sum = vec2<f32>(0.0);
    var mass_weight = 0.0;
    var separation_sum = vec2<f32>(0.0);
    var separation_count = 0u;
    for (var j = 0u; j < params.count; j++) {
        if j == i {
            continue;
        }
        let other = agents_in[j];
        let offset = other.position - position;
        let d = length(offset);
        if d <= MIN_DISTANCE || d >= params.perception_radius {
            continue;
        }
        count += 1u;
        let weight = 1.0 - d / params.perception_radius;
        mass_sum += other.position * weight;
        mass_weight += weight;
        if dot(forward, offset / d) >= params.fov_cos {
            align_sum += other.velocity * weight;
            align_weight += weight;
        }
        if d < params.separation_radius {
            separation_sum += (-offset / d) / (d * d);
            separation_count += 1u;
        }
    }

    // Flocking
    var alignment = vec2<f32>(0.0);
    if align_weight > 0.0 {
        alignment = steer_towards(align_sum / align_weight, velocity, params.max_speed, params.max_force);
    }
    var cohesion = vec2<f32>(0.0);
    if mass_weight > 0.0 {
        let center_of_mass = mass_sum / mass_weight;
        let factor = max(1.0 - f32(count) / DENSITY_SATURATION, MIN_DENSITY_FACTOR);
        cohesion = steer_towards(center_of_mass - position, velocity, params.max_speed, params.max_force) * factor;
    }
    var separation = vec2<f32>(0.0);
    if separation_count > 0u {
        separation = steer_towards(separation_sum / f32(separation_count), velocity, params.max_speed, params.max_force);
    }
    let flocking = alignment * params.alignment_weight
        + cohesion * params.cohesion_weight
        + separation * params.separation_weight;

    // Environment
    let wall_distance = min(min(min(position.x, params.world.x - position.x), position.y), params.world.y - position.y);

    var jitter = vec2<f32>(0.0);
    if params.boundary_margin > 0.0 && wall_distance < WALL_JITTER_ZONE * params.boundary_margin {
        let angle = rand01(agent_seed(i, params.tick, STREAM_JITTER)) * TAU;
        jitter = from_angle(angle) * params.max_force * params.noise_strength;
    }

    var wander = vec2<f32>(0.0);
    if params.wander_strength > 0.0 {
        let sample = position * params.wander_scale + vec2<f32>(params.time * params.wander_rate);
        wander = from_angle(heading + noise2(sample) * PI) * params.wander_strength;
    }

    var flee = vec2<f32>(0.0);
    for (var k = 0u; k < params.threat_count; k++) {
        let threat = threats[k];
        let d = distance(position, threat.xy);
        if d <= MIN_DISTANCE || d >= threat.z {
            continue;
        }
        let proximity = 1.0 - d / threat.z;
        flee += steer_towards(position - threat.xy, velocity, params.max_speed, params.max_force)
            * params.flee_weight * proximity;
    }

    var pull = vec2<f32>(0.0);
    for (var k = 0u; k < params.attractor_count; k++) {
        let a = attractors[k];
        let offset = a.xy - position;
        let d = length(offset);
        if d <= MIN_DISTANCE || d >= a.w {
            continue;
        }
        pull += offset / d * a.z * (1.0 - d / a.w);
    }

    let force = flocking * wall_damping(wall_distance)
        + boundary(position, velocity)
        + jitter
        + wind(position)
        + wander
        + flee
        + pull;

    // Decay
    let prior_speed = length(velocity);
    var panic = clamp(me.panic * params.panic_decay, 0.0, 1.0);
    if panic < PANIC_FLOOR {
        panic = 0.0;
    }
    var energy = me.energy;
    var energy_factor = 1.0;
    if params.energy_enabled != 0u {
        var effort = 0.0;
        if params.max_speed > 0.0 {
            effort = min(prior_speed / params.max_speed, 1.0);
        }
        energy = clamp(energy - params.energy_decay_rate * (0.5 + 0.5 * effort) * params.dt, 0.0, 1.0);
        energy_factor = params.min_energy_speed + (1.0 - params.min_energy_speed) * energy;
    }

    // Integrate
    let max_speed = params.max_speed * (1.0 + panic * PANIC_SPEED_BOOST) * energy_factor;
    var vel = limit(velocity + force * params.dt * FORCE_SCALE, max_speed);
    var pos = position + vel * params.dt * params.sim_speed;

    let lo = vec2<f32>(EDGE_PADDING);
    let hi = max(params.world - lo, lo);
    var hit = false;
    if pos.x < lo.x || pos.x > hi.x {
        var outward = 1.0;
        if pos.x < lo.x {
            outward = -1.0;
        }
        pos.x = clamp(pos.x, lo.x, hi.x);
        if vel.x * outward > 0.0 {
            vel.x = -vel.x * WALL_RESTITUTION;
        }
        vel.y = vel.y * WALL_FRICTION;
        hit = true;
    }
    if pos.y < lo.y || pos.y > hi.y {
        var outward = 1.0;
        if pos.y < lo.y {
            outward = -1.0;
        }
        pos.y = clamp(pos.y, lo.y, hi.y);
        if vel.y * outward > 0.0 {
            vel.y = -vel.y * WALL_RESTITUTION;
        }
        vel.x = vel.x * WALL_FRICTION;
        hit = true;
    }
    if hit {
        let escape = min(params.min_escape_speed, max_speed);
        let s = length(vel);
        if s < escape {
            if s > MIN_DISTANCE {
                vel = vel / s * escape;
            } else {
                vel = normalize_or_zero(params.world * 0.5 - pos) * escape;
            }
        }
    }

    var new_heading = heading;
    if length(vel) > HEADING_MIN_SPEED {
        new_heading = atan2(vel.y, vel.x);
    }
    let density = min(f32(count) / DENSITY_SATURATION, 1.0);

    agents_out[i] = Agent(pos, vel, new_heading, panic, energy, density);
}
"#;

fn constants_wgsl() -> String {
    let f = |name: &str, value: f32| format!("const {name}: f32 = {value:?};\n");
    let mut out = String::new();
    out.push_str(&f("PI", PI));
    out.push_str(&f("TAU", TAU));
    out.push_str(&f("FRAC_PI_2", FRAC_PI_2));
    out.push_str(&f("FORCE_SCALE", FORCE_SCALE));
    out.push_str(&f("MIN_DISTANCE", MIN_DISTANCE));
    out.push_str(&f("DENSITY_SATURATION", DENSITY_SATURATION));
    out.push_str(&f("MIN_DENSITY_FACTOR", MIN_DENSITY_FACTOR));
    out.push_str(&f("WALL_JITTER_ZONE", WALL_JITTER_ZONE));
    out.push_str(&f("WIND_FORCE_SCALE", WIND_FORCE_SCALE));
    out.push_str(&f("WIND_NOISE_SCALE", WIND_NOISE_SCALE));
    out.push_str(&f("WIND_NOISE_RATE", WIND_NOISE_RATE));
    out.push_str(&f("PANIC_SPEED_BOOST", PANIC_SPEED_BOOST));
    out.push_str(&f("PANIC_FLOOR", PANIC_FLOOR));
    out.push_str(&f("HEADING_MIN_SPEED", HEADING_MIN_SPEED));
    out.push_str(&f("WALL_RESTITUTION", WALL_RESTITUTION));
    out.push_str(&f("WALL_FRICTION", WALL_FRICTION));
    out.push_str(&f("EDGE_PADDING", EDGE_PADDING));
    out.push_str(&format!(
        "const WIND_MAGNITUDE_OFFSET: vec2<f32> = vec2<f32>({:?}, {:?});\n",
        WIND_MAGNITUDE_OFFSET.x, WIND_MAGNITUDE_OFFSET.y
    ));
    out.push_str(&format!("const STREAM_JITTER: u32 = {STREAM_JITTER}u;\n"));
    out
}

/// Complete WGSL module for the flock kernel.
pub fn flock_kernel_wgsl() -> String {
    let mut src = String::new();
    src.push_str(&constants_wgsl());
    src.push_str(BINDINGS_WGSL);
    src.push_str(NOISE_WGSL);
    src.push_str(STEERING_WGSL);
    src.push_str(&MAIN_WGSL.replace("WORKGROUP_SIZE_VALUE", &WORKGROUP_SIZE.to_string()));
    src
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flock_kernel_is_valid_wgsl() {
        let code = flock_kernel_wgsl();
        let module = match naga::front::wgsl::parse_str(&code) {
            Ok(m) => m,
            Err(e) => panic!("flock kernel failed to parse:\n{}", e.emit_to_string(&code)),
        };
        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        if let Err(e) = validator.validate(&module) {
            panic!("flock kernel failed validation:\n{}", e.emit_to_string(&code));
        }
    }

    #[test]
    fn test_constants_are_float_literals() {
        let consts = constants_wgsl();
        assert!(consts.contains("const FORCE_SCALE: f32 = 60.0;"));
        assert!(consts.contains("const EDGE_PADDING: f32 = 2.0;"));
        assert!(consts.contains("const STREAM_JITTER: u32 = 1u;"));
    }

    #[test]
    fn test_workgroup_size_spliced() {
        let code = flock_kernel_wgsl();
        assert!(code.contains("@workgroup_size(64)"));
        assert!(!code.contains("WORKGROUP_SIZE_VALUE"));
    }
}
