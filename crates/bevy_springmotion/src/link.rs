use bevy_ecs::component::HookContext;
use bevy_ecs::prelude::*;
use bevy_ecs::world::DeferredWorld;
use smallvec::SmallVec;
use springmotion_core::dispatcher::MotionDispatcher;
use springmotion_core::handle::DamperHandle;

/// What happens to a linked motion when its entity goes away.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkBehaviour {
    #[default]
    CancelOnDespawn,
    CompleteOnDespawn,
}

/// Ties the lifetime of motions to an entity.
///
/// Once the component is removed (including on despawn) every linked
/// motion that is still running gets canceled or completed.
#[derive(Component, Debug, Default, Clone)]
#[component(on_remove = on_remove_damper_links)]
pub struct DamperLinks {
    links: SmallVec<[(DamperHandle, LinkBehaviour); 2]>,
}

impl DamperLinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method for linking a motion.
    pub fn with(
        mut self,
        handle: DamperHandle,
        behaviour: LinkBehaviour,
    ) -> Self {
        self.links.push((handle, behaviour));
        self
    }

    /// Setter method for linking a motion.
    pub fn link(
        &mut self,
        handle: DamperHandle,
        behaviour: LinkBehaviour,
    ) -> &mut Self {
        self.links.push((handle, behaviour));
        self
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = &(DamperHandle, LinkBehaviour)> {
        self.links.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

fn on_remove_damper_links(world: DeferredWorld<'_>, ctx: HookContext) {
    let Some(links) = world.get::<DamperLinks>(ctx.entity) else {
        return;
    };
    let Some(dispatcher) = world.get_resource::<MotionDispatcher>()
    else {
        return;
    };

    for (handle, behaviour) in links.iter() {
        if !dispatcher.is_active(handle) {
            continue;
        }

        let result = match behaviour {
            LinkBehaviour::CancelOnDespawn => dispatcher.cancel(handle),
            LinkBehaviour::CompleteOnDespawn => {
                dispatcher.complete(handle)
            }
        };
        if let Err(err) = result {
            tracing::warn!(
                entity = ?ctx.entity,
                "Failed to release linked motion: {err}"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use springmotion_core::prelude::*;

    use super::*;

    #[derive(Default, Clone)]
    struct Counters {
        completes: Arc<AtomicUsize>,
        cancels: Arc<AtomicUsize>,
    }

    fn schedule(
        dispatcher: &MotionDispatcher,
        counters: &Counters,
    ) -> DamperHandle {
        let completes = counters.completes.clone();
        let cancels = counters.cancels.clone();

        dispatcher
            .damper(|| 0.0_f32, |_| {}, || 1.0)
            .with_on_complete(move || {
                completes.fetch_add(1, Ordering::SeqCst);
            })
            .with_on_cancel(move || {
                cancels.fetch_add(1, Ordering::SeqCst);
            })
            .schedule()
            .unwrap()
    }

    #[test]
    fn despawn_releases_linked_motions() {
        let mut world = World::new();
        let dispatcher = MotionDispatcher::new();
        world.insert_resource(dispatcher.clone());

        let counters = Counters::default();
        let canceled = schedule(&dispatcher, &counters);
        let completed = schedule(&dispatcher, &counters);
        let untouched = schedule(&dispatcher, &counters);

        let entity = world
            .spawn(
                DamperLinks::new()
                    .with(canceled, LinkBehaviour::CancelOnDespawn)
                    .with(completed, LinkBehaviour::CompleteOnDespawn),
            )
            .id();
        world.despawn(entity);

        assert!(!dispatcher.is_active(&canceled));
        assert!(!dispatcher.is_active(&completed));
        assert!(dispatcher.is_active(&untouched));
        assert_eq!(counters.cancels.load(Ordering::SeqCst), 1);
        assert_eq!(counters.completes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn finished_motions_are_skipped() {
        let mut world = World::new();
        let dispatcher = MotionDispatcher::new();
        world.insert_resource(dispatcher.clone());

        let counters = Counters::default();
        let handle = schedule(&dispatcher, &counters);
        dispatcher.cancel(&handle).unwrap();

        let mut links = DamperLinks::new();
        links.link(handle, LinkBehaviour::CancelOnDespawn);
        let entity = world.spawn(links).id();
        world.entity_mut(entity).remove::<DamperLinks>();

        assert_eq!(counters.cancels.load(Ordering::SeqCst), 1);
    }
}
