use crate::data::DamperStatus;
use crate::dispatcher::MotionDispatcher;
use crate::error::DamperError;

/// Generational reference to a motion.
///
/// A handle stays valid until its motion is retired. After that,
/// every operation through it fails with
/// [`DamperError::InvalidHandle`], even once the underlying slot is
/// reused by another motion.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct DamperHandle {
    pub storage_id: u32,
    pub index: u32,
    pub version: u32,
}

impl DamperHandle {
    /// A handle that never refers to a motion.
    pub const PLACEHOLDER: Self = Self {
        storage_id: 0,
        index: 0,
        version: 0,
    };

    pub fn is_active(&self, dispatcher: &MotionDispatcher) -> bool {
        dispatcher.is_active(self)
    }

    pub fn cancel(
        &self,
        dispatcher: &MotionDispatcher,
    ) -> Result<(), DamperError> {
        dispatcher.cancel(self)
    }

    pub fn complete(
        &self,
        dispatcher: &MotionDispatcher,
    ) -> Result<(), DamperError> {
        dispatcher.complete(self)
    }

    pub fn status(
        &self,
        dispatcher: &MotionDispatcher,
    ) -> Result<DamperStatus, DamperError> {
        dispatcher.status(self)
    }

    pub fn playback_speed(
        &self,
        dispatcher: &MotionDispatcher,
    ) -> Result<f32, DamperError> {
        dispatcher.playback_speed(self)
    }

    pub fn set_playback_speed(
        &self,
        dispatcher: &MotionDispatcher,
        speed: f32,
    ) -> Result<(), DamperError> {
        dispatcher.set_playback_speed(self, speed)
    }

    /// Wraps the handle so the motion is canceled once the guard is
    /// dropped.
    pub fn cancel_on_drop(
        self,
        dispatcher: &MotionDispatcher,
    ) -> CancelOnDrop {
        CancelOnDrop {
            handle: self,
            dispatcher: Some(dispatcher.clone()),
        }
    }
}

/// Cancels its motion when dropped, unless the motion already
/// finished.
pub struct CancelOnDrop {
    handle: DamperHandle,
    dispatcher: Option<MotionDispatcher>,
}

impl CancelOnDrop {
    #[inline]
    pub fn handle(&self) -> DamperHandle {
        self.handle
    }

    /// Releases the motion without canceling it.
    pub fn disarm(mut self) -> DamperHandle {
        self.dispatcher = None;
        self.handle
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        let Some(dispatcher) = self.dispatcher.take() else {
            return;
        };

        if dispatcher.is_active(&self.handle) {
            // Can only fail if the motion finished in between.
            let _ = dispatcher.cancel(&self.handle);
        }
    }
}

/// A group of motions driven together.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompositeDamperHandle {
    handles: Vec<DamperHandle>,
}

impl CompositeDamperHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, handle: DamperHandle) -> &mut Self {
        self.handles.push(handle);
        self
    }

    pub fn with(mut self, handle: DamperHandle) -> Self {
        self.handles.push(handle);
        self
    }

    pub fn remove(&mut self, handle: &DamperHandle) -> bool {
        let len = self.handles.len();
        self.handles.retain(|h| h != handle);
        self.handles.len() != len
    }

    pub fn contains(&self, handle: &DamperHandle) -> bool {
        self.handles.contains(handle)
    }

    pub fn clear(&mut self) {
        self.handles.clear();
    }

    /// Whether any of the motions is still running.
    pub fn is_active(&self, dispatcher: &MotionDispatcher) -> bool {
        self.handles.iter().any(|h| dispatcher.is_active(h))
    }

    /// Cancels every motion that is still running and forgets all
    /// handles.
    pub fn cancel(&mut self, dispatcher: &MotionDispatcher) {
        for handle in self.handles.drain(..) {
            if dispatcher.is_active(&handle) {
                let _ = dispatcher.cancel(&handle);
            }
        }
    }

    /// Completes every motion that is still running and forgets all
    /// handles.
    pub fn complete(&mut self, dispatcher: &MotionDispatcher) {
        for handle in self.handles.drain(..) {
            if dispatcher.is_active(&handle) {
                let _ = dispatcher.complete(&handle);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &DamperHandle> {
        self.handles.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Extend<DamperHandle> for CompositeDamperHandle {
    fn extend<T: IntoIterator<Item = DamperHandle>>(&mut self, iter: T) {
        self.handles.extend(iter);
    }
}

impl FromIterator<DamperHandle> for CompositeDamperHandle {
    fn from_iter<T: IntoIterator<Item = DamperHandle>>(iter: T) -> Self {
        Self {
            handles: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    fn schedule(
        dispatcher: &MotionDispatcher,
        cancels: &Arc<AtomicUsize>,
    ) -> DamperHandle {
        let cancels = cancels.clone();
        dispatcher
            .damper(|| 0.0_f32, |_| {}, || 1.0)
            .with_on_cancel(move || {
                cancels.fetch_add(1, Ordering::SeqCst);
            })
            .schedule()
            .unwrap()
    }

    #[test]
    fn placeholder_is_never_active() {
        let dispatcher = MotionDispatcher::new();
        let cancels = Arc::new(AtomicUsize::new(0));
        schedule(&dispatcher, &cancels);

        assert_eq!(DamperHandle::PLACEHOLDER, DamperHandle::default());
        assert!(!DamperHandle::PLACEHOLDER.is_active(&dispatcher));
        assert_eq!(
            DamperHandle::PLACEHOLDER.cancel(&dispatcher),
            Err(DamperError::InvalidHandle(DamperHandle::PLACEHOLDER))
        );
    }

    #[test]
    fn handle_methods_route_through_dispatcher() {
        let dispatcher = MotionDispatcher::new();
        let cancels = Arc::new(AtomicUsize::new(0));
        let handle = schedule(&dispatcher, &cancels);

        assert!(handle.is_active(&dispatcher));
        assert_eq!(handle.set_playback_speed(&dispatcher, 0.5), Ok(()));
        assert_eq!(handle.playback_speed(&dispatcher), Ok(0.5));
        assert_eq!(
            handle.status(&dispatcher),
            Ok(DamperStatus::Scheduled)
        );
        assert_eq!(handle.complete(&dispatcher), Ok(()));
        assert_eq!(
            handle.cancel(&dispatcher),
            Err(DamperError::InvalidHandle(handle))
        );
        assert_eq!(cancels.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn guard_cancels_on_drop() {
        let dispatcher = MotionDispatcher::new();
        let cancels = Arc::new(AtomicUsize::new(0));

        let guard = schedule(&dispatcher, &cancels)
            .cancel_on_drop(&dispatcher);
        let handle = guard.handle();
        drop(guard);

        assert!(!dispatcher.is_active(&handle));
        assert_eq!(cancels.load(Ordering::SeqCst), 1);

        let kept = schedule(&dispatcher, &cancels)
            .cancel_on_drop(&dispatcher)
            .disarm();
        assert!(dispatcher.is_active(&kept));
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn composite_cancels_running_motions() {
        let dispatcher = MotionDispatcher::new();
        let cancels = Arc::new(AtomicUsize::new(0));

        let mut group = (0..4)
            .map(|_| schedule(&dispatcher, &cancels))
            .collect::<CompositeDamperHandle>();
        let first = *group.iter().next().unwrap();
        dispatcher.complete(&first).unwrap();

        assert!(group.contains(&first));
        assert!(group.is_active(&dispatcher));

        group.cancel(&dispatcher);

        assert!(group.is_empty());
        assert_eq!(cancels.load(Ordering::SeqCst), 3);
        assert_eq!(dispatcher.step(0.1), Ok(()));
        assert_eq!(dispatcher.motion_count(), 0);
    }
}
