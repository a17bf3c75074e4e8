//! Constant-deceleration kinematics.

/// Deceleration needed to go from `v_now` to `v_target` over `distance`.
///
/// Uses `v² = v₀² + 2·a·d`, so the result is negative when slowing down
/// and carries the units of speed² per distance unit of the inputs.
///
/// Returns None when there is no distance left or the target speed is
/// already met.
pub fn solve(v_now: f64, v_target: f64, distance: f64) -> Option<f64> {
    if distance <= 0.0 || v_now <= v_target {
        return None;
    }
    Some((v_target * v_target - v_now * v_now) / (2.0 * distance))
}
