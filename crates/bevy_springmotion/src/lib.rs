//! [Bevy]: https://bevyengine.org/
//! [SpringMotion]: springmotion_core
//!
//! A [Bevy] integration of [SpringMotion].
//!
//! Add [`SpringMotionPlugin`] next to Bevy's `TimePlugin` and
//! schedule motions through the [`MotionDispatcher`] resource. The
//! dispatcher is updated once per frame in [`PostUpdate`].

use bevy_app::prelude::*;
use bevy_ecs::prelude::*;
use bevy_platform::time::Instant;
use bevy_time::prelude::*;
use springmotion_core::dispatcher::{
    DispatcherSettings, MotionDispatcher,
};

pub mod link;

pub mod prelude {
    pub use crate::link::{DamperLinks, LinkBehaviour};
    pub use crate::{SpringMotionPlugin, SpringMotionSet};
}

#[derive(Default)]
pub struct SpringMotionPlugin {
    pub settings: DispatcherSettings,
}

impl SpringMotionPlugin {
    pub fn with_settings(mut self, settings: DispatcherSettings) -> Self {
        self.settings = settings;
        self
    }
}

impl Plugin for SpringMotionPlugin {
    fn build(&self, app: &mut App) {
        app.configure_sets(PostUpdate, SpringMotionSet::Update);

        app.insert_resource(MotionDispatcher::with_settings(self.settings))
            .insert_resource(RealtimeOrigin::now());

        app.add_systems(
            PostUpdate,
            update_dampers.in_set(SpringMotionSet::Update),
        );
    }
}

#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum SpringMotionSet {
    /// Advance every motion and dispatch its callbacks.
    Update,
}

/// Wall clock reference for
/// [`MotionTimeKind::Realtime`](springmotion_core::data::MotionTimeKind::Realtime)
/// motions.
#[derive(Resource, Debug, Clone, Copy)]
pub struct RealtimeOrigin(Instant);

impl RealtimeOrigin {
    pub fn now() -> Self {
        Self(Instant::now())
    }

    /// Seconds elapsed since the origin was taken.
    pub fn elapsed_secs_f64(&self) -> f64 {
        self.0.elapsed().as_secs_f64()
    }
}

fn update_dampers(
    dispatcher: Res<MotionDispatcher>,
    virtual_time: Res<Time<Virtual>>,
    real_time: Res<Time<Real>>,
    origin: Res<RealtimeOrigin>,
) {
    dispatcher.update(
        virtual_time.elapsed_secs_f64(),
        real_time.elapsed_secs_f64(),
        origin.elapsed_secs_f64(),
    );
}
