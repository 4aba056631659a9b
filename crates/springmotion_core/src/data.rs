use crate::adapter::FLOAT_EPSILON;
use crate::spring::{SpringState, SpringType};

/// Half-life used by motions that never configure one.
pub const DEFAULT_HALF_LIFE: f64 = 0.333;

/// Lifecycle state of a motion.
///
/// ```text
/// None -> Scheduled -> Playing -> Completed -> Delayed -> (retired)
///            |            |
///            +------------+-----> Canceled -> Disposed -> (retired)
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DamperStatus {
    /// Unused slot.
    #[default]
    None,
    /// Created, not yet advanced.
    Scheduled,
    /// Converged and waiting one tick before retirement.
    Delayed,
    Playing,
    /// Converged during the current tick.
    Completed,
    Canceled,
    /// Retired during the current tick.
    Disposed,
}

impl DamperStatus {
    /// Whether a motion in this state still participates in
    /// updates.
    #[inline]
    pub fn is_active(self) -> bool {
        matches!(
            self,
            DamperStatus::Scheduled
                | DamperStatus::Delayed
                | DamperStatus::Playing
        )
    }
}

/// The time source whose deltas advance a motion.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotionTimeKind {
    /// Scaled game time.
    #[default]
    Time,
    /// Game time ignoring the time scale.
    UnscaledTime,
    /// Wall clock time.
    Realtime,
}

/// Per-motion spring state stored densely inside a storage.
///
/// Values are kept in the `f64` lane space; adapters convert them
/// from and to the user facing value type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamperCore {
    pub status: DamperStatus,
    pub playback_speed: f32,
    pub time_kind: MotionTimeKind,
    pub spring_type: SpringType,
    pub half_life: f64,
    /// Convergence threshold in lane space.
    pub epsilon: f64,
    pub current_value: f64,
    pub target_value: f64,
    /// Accumulated scaled time since the motion started.
    pub motion_time: f64,
    pub spring: SpringState,
}

impl DamperCore {
    /// Creates a scheduled core resting at `current_value`.
    pub fn scheduled(current_value: f64, target_value: f64) -> Self {
        Self {
            status: DamperStatus::Scheduled,
            current_value,
            target_value,
            spring: SpringState::at_rest(current_value),
            ..Default::default()
        }
    }

    /// Snaps the motion onto its target and stops it.
    pub fn settle(&mut self) {
        self.current_value = self.target_value;
        self.spring = SpringState::at_rest(self.target_value);
    }
}

impl Default for DamperCore {
    fn default() -> Self {
        Self {
            status: DamperStatus::None,
            playback_speed: 1.0,
            time_kind: MotionTimeKind::default(),
            spring_type: SpringType::default(),
            half_life: DEFAULT_HALF_LIFE,
            epsilon: FLOAT_EPSILON,
            current_value: 0.0,
            target_value: 0.0,
            motion_time: 0.0,
            spring: SpringState::default(),
        }
    }
}
