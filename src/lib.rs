//! [Bevy]: https://bevyengine.org/
//! [`MotionDispatcher`]: springmotion_core::dispatcher::MotionDispatcher
//! [`DamperHandle`]: springmotion_core::handle::DamperHandle
//! [`SpringType`]: springmotion_core::spring::SpringType
//!
//! SpringMotion advances thousands of independently configured
//! spring-damper motions every frame, batches their evaluation and
//! dispatches the results to user callbacks.
//!
//! The core of this crate is made up of the [`MotionDispatcher`] and
//! the [`DamperHandle`]s it hands out.
//!
//! # Dispatcher
//! The [`MotionDispatcher`] owns one dense storage per value, options
//! and adapter combination. Every tick it integrates the springs of
//! all live motions, invokes their callbacks in slot order and
//! compacts the storages.
//!
//! # Springs
//! Four implicit [`SpringType`]s are available: simple, timed,
//! velocity and double. All of them stay stable for arbitrarily large
//! time steps.
//!
//! Enable the `bevy` feature (on by default) to drive the dispatcher
//! from a [Bevy] `App`.

pub use springmotion_core;

#[cfg(feature = "bevy")]
pub use bevy_springmotion;

pub mod prelude {
    pub use springmotion_core::prelude::*;

    #[cfg(feature = "bevy")]
    pub use bevy_springmotion::prelude::*;
}
