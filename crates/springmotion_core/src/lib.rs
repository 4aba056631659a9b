//! [`MotionDispatcher`]: dispatcher::MotionDispatcher
//! [`DamperBuilder`]: builder::DamperBuilder
//! [`DamperHandle`]: handle::DamperHandle
//! [`DamperStorage`]: storage::DamperStorage
//! [`SpringType`]: spring::SpringType
//! [`DamperAdapter`]: adapter::DamperAdapter
//! [`DamperOptions`]: options::DamperOptions
//!
//! # SpringMotion Core
//!
//! Batched spring-damper motions. A motion smoothly drives a single
//! value towards a target using one of the implicit springs in
//! [`SpringType`], and reports every intermediate value to a user
//! provided setter.
//!
//! ## Core Concepts
//!
//! - **[`MotionDispatcher`]**: Owns one [`DamperStorage`] per value,
//!   options and adapter combination and advances all of them on
//!   every update.
//!
//! - **[`DamperStorage`]**: A dense structure-of-arrays storage with
//!   a generational slot allocator. Retired motions are swap-removed
//!   so integration always walks packed columns.
//!
//! - **[`DamperHandle`]**: A generational reference to a motion,
//!   used to cancel, complete or inspect it.
//!
//! - **[`DamperAdapter`]** and **[`DamperOptions`]**: Map values in
//!   and out of the `f64` lane the springs operate in, and carry
//!   per-motion parameters.
//!
//! ## Using SpringMotion
//!
//! ```
//! use std::sync::{Arc, Mutex};
//!
//! use springmotion_core::prelude::*;
//!
//! let dispatcher = MotionDispatcher::new();
//! let opacity = Arc::new(Mutex::new(0.0_f32));
//!
//! let handle = dispatcher
//!     .damper(
//!         {
//!             let opacity = opacity.clone();
//!             move || *opacity.lock().unwrap()
//!         },
//!         {
//!             let opacity = opacity.clone();
//!             move |x| *opacity.lock().unwrap() = x
//!         },
//!         || 1.0,
//!     )
//!     .with_spring(SpringType::Simple)
//!     .with_half_life(0.1)
//!     .schedule()
//!     .unwrap();
//!
//! // Drive the dispatcher with a fixed time step.
//! while handle.is_active(&dispatcher) {
//!     dispatcher.step(1.0 / 60.0).unwrap();
//! }
//!
//! assert_eq!(*opacity.lock().unwrap(), 1.0);
//! ```

pub mod adapter;
pub mod builder;
pub mod callback;
pub mod data;
pub mod dispatcher;
pub mod entry;
pub mod error;
pub mod handle;
pub mod options;
pub mod registry;
pub mod runner;
pub mod spring;
pub mod storage;

pub mod prelude {
    pub use crate::adapter::{
        DamperAdapter, DamperValue, DoubleAdapter, FloatAdapter,
        IntAdapter, LongAdapter,
    };
    pub use crate::builder::DamperBuilder;
    pub use crate::data::{DamperStatus, MotionTimeKind};
    pub use crate::dispatcher::{DispatcherSettings, MotionDispatcher};
    pub use crate::error::DamperError;
    pub use crate::handle::{
        CancelOnDrop, CompositeDamperHandle, DamperHandle,
    };
    pub use crate::options::{
        DamperOptions, IntegerOptions, NoOptions, RoundingMode,
        TimeDamperOptions, VelocityDamperOptions,
    };
    pub use crate::spring::SpringType;
    pub use crate::ThreadSafe;
}

/// Auto trait for types that implements [`Send`] + [`Sync`] +
/// `'static`.
pub trait ThreadSafe: Send + Sync + 'static {}

impl<T> ThreadSafe for T where T: Send + Sync + 'static {}
