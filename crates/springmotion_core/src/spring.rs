//! Implicit spring-damper integrators.
//!
//! Every integrator solves its spring exactly over a step of `dt`
//! seconds, so arbitrarily large steps settle on the goal instead of
//! overshooting or exploding. Negative steps are treated as zero.

use core::f64::consts::LN_2;

/// Added to every half-life so that a zero half-life stays finite.
pub const HALF_LIFE_EPSILON: f64 = 1e-5;

/// How many half-lives the timed and velocity springs look ahead
/// when placing their intermediate goal.
const APPREHENSION: f64 = 2.0;

/// The integrator used by a motion.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpringType {
    /// Exponential decay towards the target, halving the remaining
    /// distance every half-life.
    Simple,
    /// Drags an intermediate goal linearly towards the target so
    /// that it arrives after the configured target time.
    Timed,
    /// Drags an intermediate goal towards the target at the
    /// configured target velocity.
    Velocity,
    /// A critically damped spring chasing another critically damped
    /// spring. Produces smooth ease-in-out curves.
    #[default]
    Double,
}

/// Integrator state carried between steps.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SpringState {
    /// Velocity of the motion value.
    pub velocity: f64,
    /// Intermediate goal position.
    pub xi: f64,
    /// Intermediate goal velocity.
    pub vi: f64,
}

impl SpringState {
    /// State of a motion resting at `position`.
    pub fn at_rest(position: f64) -> Self {
        Self {
            velocity: 0.0,
            xi: position,
            vi: 0.0,
        }
    }
}

/// Goal of a single integration step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpringGoal {
    pub target: f64,
    pub half_life: f64,
    /// Time left until a [`SpringType::Timed`] motion should arrive.
    pub time_remaining: f64,
    /// Speed of the intermediate goal of a
    /// [`SpringType::Velocity`] motion.
    pub target_velocity: f64,
}

impl SpringType {
    /// Advances `x` by `dt` seconds and returns its new position.
    pub fn advance(
        self,
        x: f64,
        state: &mut SpringState,
        goal: &SpringGoal,
        dt: f64,
    ) -> f64 {
        let dt = dt.max(0.0);
        let SpringState { velocity, xi, vi } = state;

        match self {
            SpringType::Simple => simple_spring_damper_implicit(
                x,
                velocity,
                goal.target,
                goal.half_life,
                dt,
            ),
            SpringType::Timed => timed_spring_damper_implicit(
                x,
                velocity,
                xi,
                goal.target,
                goal.time_remaining,
                goal.half_life,
                dt,
            ),
            SpringType::Velocity => velocity_spring_damper_implicit(
                x,
                velocity,
                xi,
                goal.target,
                goal.target_velocity,
                goal.half_life,
                dt,
            ),
            SpringType::Double => double_spring_damper_implicit(
                x,
                velocity,
                xi,
                vi,
                goal.target,
                goal.half_life,
                dt,
            ),
        }
    }
}

/// Returns `true` when `a` and `b` are at most `epsilon` apart.
#[inline]
pub fn approximately(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() <= epsilon
}

/// Converts a half-life into the damping of a critically damped
/// spring.
#[inline]
pub fn half_life_to_damping(half_life: f64) -> f64 {
    (4.0 * LN_2) / (half_life + HALF_LIFE_EPSILON)
}

pub fn simple_spring_damper_implicit(
    x: f64,
    v: &mut f64,
    x_goal: f64,
    half_life: f64,
    dt: f64,
) -> f64 {
    let decay = (-dt / (half_life + HALF_LIFE_EPSILON)).exp2();
    let next = x_goal + (x - x_goal) * decay;

    if dt > 0.0 {
        *v = (next - x) / dt;
    }

    next
}

pub fn critical_spring_damper_implicit(
    x: f64,
    v: &mut f64,
    x_goal: f64,
    half_life: f64,
    dt: f64,
) -> f64 {
    let y = half_life_to_damping(half_life) / 2.0;
    let j0 = x - x_goal;
    let j1 = *v + j0 * y;
    let eydt = (-y * dt).exp();

    *v = eydt * (*v - j1 * y * dt);
    eydt * (j0 + j1 * dt) + x_goal
}

pub fn timed_spring_damper_implicit(
    x: f64,
    v: &mut f64,
    xi: &mut f64,
    x_goal: f64,
    t_goal: f64,
    half_life: f64,
    dt: f64,
) -> f64 {
    let min_time = t_goal.max(dt);

    // Already late with nothing left to integrate.
    if min_time <= 0.0 {
        *xi = x_goal;
        return critical_spring_damper_implicit(
            x, v, x_goal, half_life, dt,
        );
    }

    let v_goal = (x_goal - *xi) / min_time;
    let t_goal_future = dt + APPREHENSION * half_life;
    let x_goal_future = if t_goal_future < t_goal {
        *xi + v_goal * t_goal_future
    } else {
        x_goal
    };

    let next = critical_spring_damper_implicit(
        x,
        v,
        x_goal_future,
        half_life,
        dt,
    );
    *xi += v_goal * dt;

    next
}

pub fn velocity_spring_damper_implicit(
    x: f64,
    v: &mut f64,
    xi: &mut f64,
    x_goal: f64,
    v_goal: f64,
    half_life: f64,
    dt: f64,
) -> f64 {
    let v_goal = v_goal.abs();
    let distance = x_goal - *xi;
    let x_diff = if distance > 0.0 { v_goal } else { -v_goal };

    let t_goal_future = dt + APPREHENSION * half_life;
    let x_goal_future = if distance.abs() > t_goal_future * v_goal {
        *xi + x_diff * t_goal_future
    } else {
        x_goal
    };

    let next = critical_spring_damper_implicit(
        x,
        v,
        x_goal_future,
        half_life,
        dt,
    );

    *xi = if distance.abs() > dt * v_goal {
        *xi + x_diff * dt
    } else {
        x_goal
    };

    next
}

pub fn double_spring_damper_implicit(
    x: f64,
    v: &mut f64,
    xi: &mut f64,
    vi: &mut f64,
    x_goal: f64,
    half_life: f64,
    dt: f64,
) -> f64 {
    *xi = critical_spring_damper_implicit(
        *xi,
        vi,
        x_goal,
        0.5 * half_life,
        dt,
    );
    critical_spring_damper_implicit(x, v, *xi, 0.5 * half_life, dt)
}
