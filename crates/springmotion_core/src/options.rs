use crate::ThreadSafe;

/// Per-motion parameters consumed by the integrators and adapters.
///
/// Options that do not care about a parameter fall back to the
/// default provided here.
pub trait DamperOptions: Copy + Default + ThreadSafe {
    /// Time (in seconds) a [`Timed`](crate::spring::SpringType::Timed)
    /// motion should take to arrive.
    #[inline]
    fn target_time(&self) -> f64 {
        TimeDamperOptions::DEFAULT_TARGET_TIME
    }

    /// Speed of the intermediate goal of a
    /// [`Velocity`](crate::spring::SpringType::Velocity) motion.
    #[inline]
    fn target_velocity(&self) -> f64 {
        VelocityDamperOptions::DEFAULT_TARGET_VELOCITY
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoOptions;

impl DamperOptions for NoOptions {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeDamperOptions {
    pub target_time: f64,
}

impl TimeDamperOptions {
    pub const DEFAULT_TARGET_TIME: f64 = 0.9;
}

impl Default for TimeDamperOptions {
    fn default() -> Self {
        Self {
            target_time: Self::DEFAULT_TARGET_TIME,
        }
    }
}

impl DamperOptions for TimeDamperOptions {
    #[inline]
    fn target_time(&self) -> f64 {
        self.target_time
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityDamperOptions {
    pub target_velocity: f64,
}

impl VelocityDamperOptions {
    pub const DEFAULT_TARGET_VELOCITY: f64 = 1.0;
}

impl Default for VelocityDamperOptions {
    fn default() -> Self {
        Self {
            target_velocity: Self::DEFAULT_TARGET_VELOCITY,
        }
    }
}

impl DamperOptions for VelocityDamperOptions {
    #[inline]
    fn target_velocity(&self) -> f64 {
        self.target_velocity
    }
}

/// How integer motions round their lane value.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoundingMode {
    /// Round half to even.
    #[default]
    ToEven,
    /// Ceil positive values, floor negative ones.
    AwayFromZero,
    ToZero,
    ToPositiveInfinity,
    ToNegativeInfinity,
}

impl RoundingMode {
    pub fn round(self, value: f64) -> f64 {
        match self {
            RoundingMode::ToEven => value.round_ties_even(),
            RoundingMode::AwayFromZero => {
                if value >= 0.0 {
                    value.ceil()
                } else {
                    value.floor()
                }
            }
            RoundingMode::ToZero => value.trunc(),
            RoundingMode::ToPositiveInfinity => value.ceil(),
            RoundingMode::ToNegativeInfinity => value.floor(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntegerOptions {
    pub rounding_mode: RoundingMode,
}

impl IntegerOptions {
    pub fn with_rounding_mode(mut self, mode: RoundingMode) -> Self {
        self.rounding_mode = mode;
        self
    }
}

impl DamperOptions for IntegerOptions {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_modes() {
        use RoundingMode::*;

        assert_eq!(ToEven.round(2.5), 2.0);
        assert_eq!(ToEven.round(3.5), 4.0);
        assert_eq!(AwayFromZero.round(2.1), 3.0);
        assert_eq!(AwayFromZero.round(-2.1), -3.0);
        assert_eq!(ToZero.round(-2.9), -2.0);
        assert_eq!(ToPositiveInfinity.round(-2.9), -2.0);
        assert_eq!(ToNegativeInfinity.round(2.9), 2.0);
    }

    #[test]
    fn options_fall_back_to_defaults() {
        assert_eq!(NoOptions.target_time(), 0.9);
        assert_eq!(IntegerOptions::default().target_velocity(), 1.0);

        let timed = TimeDamperOptions { target_time: 2.0 };
        assert_eq!(timed.target_time(), 2.0);
        assert_eq!(timed.target_velocity(), 1.0);

        let velocity = VelocityDamperOptions {
            target_velocity: 4.0,
        };
        assert_eq!(velocity.target_velocity(), 4.0);
        assert_eq!(velocity.target_time(), 0.9);
    }
}
