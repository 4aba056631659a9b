use core::any::Any;

use bevy_ecs::prelude::Resource;
use bevy_platform::collections::HashMap;
use bevy_platform::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard,
    RwLockWriteGuard, TryLockError,
};

use crate::adapter::{DamperAdapter, DamperValue};
use crate::builder::DamperBuilder;
use crate::callback::DamperCallbacks;
use crate::data::{DamperCore, DamperStatus};
use crate::error::{default_error_handler, DamperError, ErrorHandler};
use crate::handle::DamperHandle;
use crate::options::DamperOptions;
use crate::registry::{StorageKey, StorageRegistry};
use crate::runner::{TimeSnapshot, UpdateRunner};
use crate::storage::{lock, MotionStorage, SharedStorage};
use crate::ThreadSafe;

/// Tuning knobs of a [`MotionDispatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherSettings {
    /// Slots reserved by every newly created storage.
    pub initial_capacity: usize,
    /// Minimum number of motions integrated per parallel work item.
    pub parallel_min_len: usize,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            initial_capacity: 8,
            parallel_min_len: 16,
        }
    }
}

impl DispatcherSettings {
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    pub fn with_parallel_min_len(mut self, min_len: usize) -> Self {
        self.parallel_min_len = min_len;
        self
    }
}

/// Owns every motion storage and drives them forward.
///
/// The dispatcher is a cheap to clone, shared handle. All clones
/// see the same storages, so it can be captured by motion callbacks
/// to schedule, cancel or complete other motions.
///
/// One storage is created lazily for every distinct combination of
/// value, options and adapter type.
#[derive(Resource, Clone, Default)]
pub struct MotionDispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    settings: DispatcherSettings,
    registry: RwLock<StorageRegistry>,
    /// Typed access to the storages inside the registry.
    storages: RwLock<HashMap<StorageKey, Arc<dyn Any + Send + Sync>>>,
    /// Readings of the last update.
    clock: Mutex<TimeSnapshot>,
    /// Accumulated time of [`MotionDispatcher::step`].
    manual_time: Mutex<f64>,
    /// Held for the duration of an update.
    updating: Mutex<()>,
    error_handler: RwLock<Option<ErrorHandler>>,
}

impl MotionDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: DispatcherSettings) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                settings,
                ..Default::default()
            }),
        }
    }

    /// Starts building a motion for a [`DamperValue`] using its
    /// default options and adapter.
    pub fn create<V: DamperValue>(
        &self,
    ) -> DamperBuilder<'_, V, V::Options, V::Adapter> {
        DamperBuilder::new(self)
    }

    /// Starts building a motion with explicit options and adapter.
    pub fn create_with<V, O, A>(&self) -> DamperBuilder<'_, V, O, A>
    where
        V: Copy + ThreadSafe,
        O: DamperOptions,
        A: DamperAdapter<V, O>,
    {
        DamperBuilder::new(self)
    }

    /// Starts building a motion with all three accessors bound.
    pub fn damper<V: DamperValue>(
        &self,
        get_value: impl Fn() -> V + Send + Sync + 'static,
        set_value: impl Fn(V) + Send + Sync + 'static,
        get_target: impl Fn() -> V + Send + Sync + 'static,
    ) -> DamperBuilder<'_, V, V::Options, V::Adapter> {
        self.create::<V>()
            .with_getter(get_value)
            .with_setter(set_value)
            .with_target(get_target)
    }

    /// Appends a fully described motion to its storage.
    pub(crate) fn schedule<V, O, A>(
        &self,
        core: DamperCore,
        options: O,
        callbacks: DamperCallbacks<V>,
    ) -> DamperHandle
    where
        V: Copy + ThreadSafe,
        O: DamperOptions,
        A: DamperAdapter<V, O>,
    {
        self.storage::<V, O, A>().append(core, options, callbacks)
    }

    /// Reserves room for `capacity` motions in the storage of the
    /// given types, creating the storage if needed.
    pub fn ensure_storage_capacity<V, O, A>(&self, capacity: usize)
    where
        V: Copy + ThreadSafe,
        O: DamperOptions,
        A: DamperAdapter<V, O>,
    {
        self.storage::<V, O, A>().ensure_capacity(capacity);
    }

    /// Returns the storage of the given types, registering it on
    /// first use.
    pub fn storage<V, O, A>(&self) -> Arc<SharedStorage<V, O, A>>
    where
        V: Copy + ThreadSafe,
        O: DamperOptions,
        A: DamperAdapter<V, O>,
    {
        let key = StorageKey::new::<V, O, A>();

        if let Some(storage) = self.typed_storage::<V, O, A>(&key) {
            return storage;
        }

        let mut storages = write(&self.inner.storages);
        // Another thread may have won the race.
        if let Some(storage) = storages
            .get(&key)
            .and_then(|any| any.clone().downcast().ok())
        {
            return storage;
        }

        let mut registry = write(&self.inner.registry);
        let storage_id = registry.next_id();
        let storage = Arc::new(SharedStorage::<V, O, A>::new(
            storage_id,
            self.inner.settings.initial_capacity,
            UpdateRunner::new(
                *lock(&self.inner.clock),
                self.inner.settings.parallel_min_len,
            ),
        ));

        registry.register(storage.clone());
        storages.insert(key, storage.clone());

        tracing::debug!(
            storage_id,
            value = core::any::type_name::<V>(),
            options = core::any::type_name::<O>(),
            "Registered motion storage."
        );

        storage
    }

    fn typed_storage<V, O, A>(
        &self,
        key: &StorageKey,
    ) -> Option<Arc<SharedStorage<V, O, A>>>
    where
        V: Copy + ThreadSafe,
        O: DamperOptions,
        A: DamperAdapter<V, O>,
    {
        read(&self.inner.storages)
            .get(key)
            .and_then(|any| any.clone().downcast().ok())
    }

    fn route(
        &self,
        handle: &DamperHandle,
    ) -> Result<Arc<dyn MotionStorage>, DamperError> {
        read(&self.inner.registry).route(handle)
    }

    /// Advances every motion using the given clock readings.
    pub fn update(&self, time: f64, unscaled_time: f64, realtime: f64) {
        self.update_with(TimeSnapshot::new(time, unscaled_time, realtime));
    }

    /// Same as [`Self::update`], taking a [`TimeSnapshot`].
    ///
    /// Does nothing, apart from logging a warning, when called while
    /// another update is running (e.g. from a motion callback).
    pub fn update_with(&self, now: TimeSnapshot) {
        let Some(_updating) = self.begin_update() else {
            return;
        };
        self.run_update(now);
    }

    fn begin_update(&self) -> Option<MutexGuard<'_, ()>> {
        match self.inner.updating.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => {
                Some(poisoned.into_inner())
            }
            Err(TryLockError::WouldBlock) => {
                tracing::warn!(
                    "Skipping an update issued while another update is \
                    running."
                );
                None
            }
        }
    }

    fn run_update(&self, now: TimeSnapshot) {
        *lock(&self.inner.clock) = now;

        // Callbacks may register new storages while we iterate.
        let storages = read(&self.inner.registry).snapshot();
        let handler = self.unhandled_error_handler();

        for storage in storages {
            storage.update(now, &handler);
        }
    }

    /// Advances the internal clock by `delta` seconds and updates
    /// every motion with it.
    pub fn step(&self, delta: f64) -> Result<(), DamperError> {
        if !delta.is_finite() || delta < 0.0 {
            return Err(DamperError::InvalidArgument {
                name: "delta",
                reason: "must be finite and non-negative",
            });
        }

        let Some(_updating) = self.begin_update() else {
            return Ok(());
        };

        let time = {
            let mut manual_time = lock(&self.inner.manual_time);
            *manual_time += delta;
            *manual_time
        };
        self.run_update(TimeSnapshot::uniform(time));

        Ok(())
    }

    /// Time accumulated by [`Self::step`].
    pub fn time(&self) -> f64 {
        *lock(&self.inner.manual_time)
    }

    /// Drops every motion of every storage and restarts all clocks
    /// at zero.
    ///
    /// All outstanding handles become invalid. Storages stay
    /// registered.
    pub fn reset(&self) {
        self.reset_at(TimeSnapshot::default());
    }

    /// Same as [`Self::reset`], restarting the clocks at `now`.
    ///
    /// Use this when updates are driven by clocks that keep running
    /// across the reset.
    pub fn reset_at(&self, now: TimeSnapshot) {
        let storages = read(&self.inner.registry).snapshot();
        for storage in storages {
            storage.reset(now);
        }
        *lock(&self.inner.clock) = now;
        *lock(&self.inner.manual_time) = now.time;

        tracing::debug!(
            storages = self.storage_count(),
            "Reset motion dispatcher"
        );
    }

    pub fn set_unhandled_error_handler(
        &self,
        handler: impl Fn(&DamperError) + Send + Sync + 'static,
    ) {
        let handler: ErrorHandler = Arc::new(handler);
        *write(&self.inner.error_handler) = Some(handler);
    }

    /// The handler receiving every callback error.
    pub fn unhandled_error_handler(&self) -> ErrorHandler {
        read(&self.inner.error_handler)
            .clone()
            .unwrap_or_else(default_error_handler)
    }

    pub fn is_active(&self, handle: &DamperHandle) -> bool {
        self.route(handle)
            .is_ok_and(|storage| storage.is_active(handle))
    }

    /// Cancels a motion, firing its cancel callback.
    pub fn cancel(&self, handle: &DamperHandle) -> Result<(), DamperError> {
        let handler = self.unhandled_error_handler();
        self.route(handle)?.cancel(handle, &handler)
    }

    /// Jumps a motion onto its target, firing its setter and
    /// completion callbacks.
    pub fn complete(
        &self,
        handle: &DamperHandle,
    ) -> Result<(), DamperError> {
        let handler = self.unhandled_error_handler();
        self.route(handle)?.complete(handle, &handler)
    }

    pub fn status(
        &self,
        handle: &DamperHandle,
    ) -> Result<DamperStatus, DamperError> {
        self.route(handle)?.status(handle)
    }

    pub fn playback_speed(
        &self,
        handle: &DamperHandle,
    ) -> Result<f32, DamperError> {
        self.route(handle)?.playback_speed(handle)
    }

    pub fn set_playback_speed(
        &self,
        handle: &DamperHandle,
        speed: f32,
    ) -> Result<(), DamperError> {
        if !speed.is_finite() || speed < 0.0 {
            return Err(DamperError::InvalidArgument {
                name: "speed",
                reason: "must be a finite, non-negative number",
            });
        }

        self.route(handle)?.set_playback_speed(handle, speed)
    }

    /// Scaled time the motion has been running for.
    pub fn motion_time(
        &self,
        handle: &DamperHandle,
    ) -> Result<f64, DamperError> {
        self.route(handle)?.motion_time(handle)
    }

    /// Redirects an active motion towards `target`.
    ///
    /// The target is converted by the adapter the motion was
    /// created with.
    pub fn set_target_value<V: Copy + ThreadSafe>(
        &self,
        handle: &DamperHandle,
        target: V,
    ) -> Result<(), DamperError> {
        self.route(handle)?.set_target(handle, &target)
    }

    /// Number of registered storages.
    pub fn storage_count(&self) -> usize {
        read(&self.inner.registry).len()
    }

    /// Number of motions across all storages, including those
    /// waiting to be retired.
    pub fn motion_count(&self) -> usize {
        let storages = read(&self.inner.registry).snapshot();
        storages.iter().map(|storage| storage.len()).sum()
    }

    #[inline]
    pub fn settings(&self) -> &DispatcherSettings {
        &self.inner.settings
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
