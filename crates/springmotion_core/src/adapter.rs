//! Conversions between user facing values and the `f64` lane space
//! the integrators operate in.

use crate::options::{DamperOptions, IntegerOptions};
use crate::ThreadSafe;

/// Default convergence threshold of floating point motions.
pub const FLOAT_EPSILON: f64 = 0.01;
/// Default convergence threshold of integer motions.
pub const INTEGER_EPSILON: f64 = 0.5;

/// Maps a value of type `V` in and out of lane space.
///
/// Adapters are never instantiated, they only select behavior at
/// the type level.
pub trait DamperAdapter<V, O>: ThreadSafe {
    /// Convergence threshold used when a motion does not configure
    /// its own.
    const EPSILON: f64 = FLOAT_EPSILON;

    fn to_lane(value: &V) -> f64;

    fn from_lane(lane: f64, options: &O) -> V;
}

pub struct FloatAdapter;

impl<O: DamperOptions> DamperAdapter<f32, O> for FloatAdapter {
    #[inline]
    fn to_lane(value: &f32) -> f64 {
        f64::from(*value)
    }

    #[inline]
    fn from_lane(lane: f64, _: &O) -> f32 {
        lane as f32
    }
}

pub struct DoubleAdapter;

impl<O: DamperOptions> DamperAdapter<f64, O> for DoubleAdapter {
    #[inline]
    fn to_lane(value: &f64) -> f64 {
        *value
    }

    #[inline]
    fn from_lane(lane: f64, _: &O) -> f64 {
        lane
    }
}

pub struct IntAdapter;

impl DamperAdapter<i32, IntegerOptions> for IntAdapter {
    const EPSILON: f64 = INTEGER_EPSILON;

    #[inline]
    fn to_lane(value: &i32) -> f64 {
        f64::from(*value)
    }

    #[inline]
    fn from_lane(lane: f64, options: &IntegerOptions) -> i32 {
        // Saturating cast.
        options.rounding_mode.round(lane) as i32
    }
}

pub struct LongAdapter;

impl DamperAdapter<i64, IntegerOptions> for LongAdapter {
    const EPSILON: f64 = INTEGER_EPSILON;

    #[inline]
    fn to_lane(value: &i64) -> f64 {
        *value as f64
    }

    #[inline]
    fn from_lane(lane: f64, options: &IntegerOptions) -> i64 {
        options.rounding_mode.round(lane) as i64
    }
}

/// Value types with a default options and adapter pairing.
pub trait DamperValue: Copy + ThreadSafe {
    type Options: DamperOptions;
    type Adapter: DamperAdapter<Self, Self::Options>;
}

impl DamperValue for f32 {
    type Options = crate::options::NoOptions;
    type Adapter = FloatAdapter;
}

impl DamperValue for f64 {
    type Options = crate::options::NoOptions;
    type Adapter = DoubleAdapter;
}

impl DamperValue for i32 {
    type Options = IntegerOptions;
    type Adapter = IntAdapter;
}

impl DamperValue for i64 {
    type Options = IntegerOptions;
    type Adapter = LongAdapter;
}
