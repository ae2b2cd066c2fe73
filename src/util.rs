// PopContext
// copyright zipxing@hotmail.com 2022～2025

//! Utilities: the seeded RNG (rand.rs) and the small vector / quaternion
//! helpers used by the per-particle rules.

mod rand;
pub use rand::*;

pub type Vec3 = [f32; 3];
/// Quaternion stored as (x, y, z, w).
pub type Quat = [f32; 4];

pub fn v3_add_scaled(a: Vec3, b: Vec3, s: f32) -> Vec3 {
    [a[0] + b[0] * s, a[1] + b[1] * s, a[2] + b[2] * s]
}

pub fn v3_scale(a: Vec3, s: f32) -> Vec3 {
    [a[0] * s, a[1] * s, a[2] * s]
}

pub fn v3_length(a: Vec3) -> f32 {
    (a[0] * a[0] + a[1] * a[1] + a[2] * a[2]).sqrt()
}

/// Advances `q` by angular velocity `w` (radians/sec) over `dt`,
/// q' = normalize(q + 0.5 * (w, 0) * q * dt).
pub fn quat_integrate(q: Quat, w: Vec3, dt: f32) -> Quat {
    let [qx, qy, qz, qw] = q;
    let h = 0.5 * dt;
    let dx = h * (w[0] * qw + w[1] * qz - w[2] * qy);
    let dy = h * (w[1] * qw + w[2] * qx - w[0] * qz);
    let dz = h * (w[2] * qw + w[0] * qy - w[1] * qx);
    let dw = h * (-w[0] * qx - w[1] * qy - w[2] * qz);
    quat_normalize([qx + dx, qy + dy, qz + dz, qw + dw])
}

pub fn quat_normalize(q: Quat) -> Quat {
    let len = (q[0] * q[0] + q[1] * q[1] + q[2] * q[2] + q[3] * q[3]).sqrt();
    if len <= f32::EPSILON {
        return [0.0, 0.0, 0.0, 1.0];
    }
    [q[0] / len, q[1] / len, q[2] / len, q[3] / len]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quat_integrate_stays_unit() {
        let mut q = [0.0, 0.0, 0.0, 1.0];
        for _ in 0..100 {
            q = quat_integrate(q, [0.0, 3.0, 0.5], 0.04);
        }
        let len = (q.iter().map(|c| c * c).sum::<f32>()).sqrt();
        assert!((len - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_quat_zero_velocity_is_identity_step() {
        let q = quat_integrate([0.0, 0.0, 0.0, 1.0], [0.0; 3], 1.0);
        assert_eq!(q, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_v3_helpers() {
        assert_eq!(v3_add_scaled([1.0, 2.0, 3.0], [1.0, 1.0, 1.0], 2.0), [3.0, 4.0, 5.0]);
        assert_eq!(v3_scale([1.0, -2.0, 0.5], 2.0), [2.0, -4.0, 1.0]);
        assert_eq!(v3_length([3.0, 4.0, 0.0]), 5.0);
    }
}
