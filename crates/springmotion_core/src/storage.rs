//! Dense structure-of-arrays storage of motions sharing one value,
//! options and adapter type.
//!
//! Motions live in parallel columns indexed by a dense index. The
//! [`StorageEntryList`] maps stable handle indices onto those dense
//! indices, and removal swaps the last motion into the hole so the
//! columns stay packed.

use core::any::Any;
use core::marker::PhantomData;

use bevy_platform::sync::{
    Mutex, MutexGuard, PoisonError, TryLockError,
};

use crate::adapter::DamperAdapter;
use crate::callback::{
    invoke_guarded, ActionFn, DamperCallbacks, GetterFn, SetterFn,
};
use crate::data::{DamperCore, DamperStatus};
use crate::entry::StorageEntryList;
use crate::error::{DamperError, ErrorHandler};
use crate::handle::DamperHandle;
use crate::options::DamperOptions;
use crate::registry::StorageKey;
use crate::runner::{TimeSnapshot, UpdateRunner};
use crate::ThreadSafe;

pub struct DamperStorage<V, O, A> {
    storage_id: u32,
    entries: StorageEntryList,
    /// Dense index to entry index.
    to_entry: Vec<u32>,
    cores: Vec<DamperCore>,
    options: Vec<O>,
    callbacks: Vec<DamperCallbacks<V>>,
    /// Bumped on every reset.
    epoch: u64,
    /// Clock readings the storage was last reset at.
    restarted_at: TimeSnapshot,
    _marker: PhantomData<fn() -> A>,
}

impl<V, O, A> DamperStorage<V, O, A>
where
    V: Copy + ThreadSafe,
    O: DamperOptions,
    A: DamperAdapter<V, O>,
{
    pub fn new(storage_id: u32, initial_capacity: usize) -> Self {
        Self {
            storage_id,
            entries: StorageEntryList::new(initial_capacity),
            to_entry: Vec::with_capacity(initial_capacity),
            cores: Vec::with_capacity(initial_capacity),
            options: Vec::with_capacity(initial_capacity),
            callbacks: Vec::with_capacity(initial_capacity),
            epoch: 0,
            restarted_at: TimeSnapshot::default(),
            _marker: PhantomData,
        }
    }

    /// Appends a motion at the end of the dense columns.
    pub fn append(
        &mut self,
        core: DamperCore,
        options: O,
        callbacks: DamperCallbacks<V>,
    ) -> DamperHandle {
        let dense_index = self.cores.len() as u32;
        let (index, version) = self.entries.alloc(dense_index);

        self.to_entry.push(index);
        self.cores.push(core);
        self.options.push(options);
        self.callbacks.push(callbacks);

        DamperHandle {
            storage_id: self.storage_id,
            index,
            version,
        }
    }

    /// Dense index of the motion behind `handle`.
    pub fn resolve(
        &self,
        handle: &DamperHandle,
    ) -> Result<usize, DamperError> {
        if handle.storage_id != self.storage_id {
            return Err(DamperError::InvalidHandle(*handle));
        }

        self.entries
            .resolve(handle.index, handle.version)
            .map(|dense| dense as usize)
            .filter(|&dense| {
                self.cores.get(dense).is_some_and(|core| {
                    core.status != DamperStatus::None
                })
            })
            .ok_or(DamperError::InvalidHandle(*handle))
    }

    pub fn core(
        &self,
        handle: &DamperHandle,
    ) -> Result<&DamperCore, DamperError> {
        let dense = self.resolve(handle)?;
        Ok(&self.cores[dense])
    }

    pub fn core_mut(
        &mut self,
        handle: &DamperHandle,
    ) -> Result<&mut DamperCore, DamperError> {
        let dense = self.resolve(handle)?;
        Ok(&mut self.cores[dense])
    }

    pub fn options(&self, handle: &DamperHandle) -> Result<&O, DamperError> {
        let dense = self.resolve(handle)?;
        Ok(&self.options[dense])
    }

    pub fn callbacks(
        &self,
        handle: &DamperHandle,
    ) -> Result<&DamperCallbacks<V>, DamperError> {
        let dense = self.resolve(handle)?;
        Ok(&self.callbacks[dense])
    }

    pub fn is_active(&self, handle: &DamperHandle) -> bool {
        self.core(handle).is_ok_and(|core| core.status.is_active())
    }

    /// Marks an active motion as canceled and returns its cancel
    /// callback.
    pub(crate) fn begin_cancel(
        &mut self,
        handle: &DamperHandle,
    ) -> Result<Option<ActionFn>, DamperError> {
        let dense = self.resolve(handle)?;
        let core = &mut self.cores[dense];
        if !core.status.is_active() {
            return Err(DamperError::InvalidHandle(*handle));
        }

        core.status = DamperStatus::Canceled;
        Ok(self.callbacks[dense].on_cancel.clone())
    }

    /// Marks an active motion as finished by force and raises its
    /// recursion guard.
    pub(crate) fn begin_complete(
        &mut self,
        handle: &DamperHandle,
    ) -> Result<CompleteCall<V>, DamperError> {
        let dense = self.resolve(handle)?;
        let callbacks = &mut self.callbacks[dense];
        if callbacks.is_callback_running {
            return Err(DamperError::RecursiveComplete);
        }

        let core = &mut self.cores[dense];
        if !core.status.is_active() {
            return Err(DamperError::InvalidHandle(*handle));
        }

        // The motion is already finished, the next update only
        // needs to retire it.
        core.status = DamperStatus::Canceled;
        callbacks.is_callback_running = true;

        Ok(CompleteCall {
            get_target: callbacks.get_target.clone(),
            set_value: callbacks.set_value.clone(),
            on_complete: callbacks.on_complete.clone(),
        })
    }

    /// Lowers the recursion guard raised by
    /// [`Self::begin_complete`].
    pub(crate) fn end_complete(&mut self, handle: &DamperHandle) {
        if let Ok(dense) = self.resolve(handle) {
            self.callbacks[dense].is_callback_running = false;
        }
    }

    /// Collects the callbacks the update loop has to run for the
    /// motion at `dense`, given the value staged for it.
    pub(crate) fn prepare_dispatch(
        &mut self,
        dense: usize,
        staged: f64,
    ) -> SlotDispatch<V> {
        let value = A::from_lane(staged, &self.options[dense]);
        let callbacks = &mut self.callbacks[dense];

        match self.cores[dense].status {
            DamperStatus::Playing => SlotDispatch::Update {
                value,
                set_value: callbacks.set_value.clone(),
                on_cancel: callbacks.on_cancel.clone(),
                cancel_on_error: callbacks.cancel_on_error,
            },
            DamperStatus::Delayed
                if !callbacks.skip_values_during_delay =>
            {
                SlotDispatch::Update {
                    value,
                    set_value: callbacks.set_value.clone(),
                    on_cancel: callbacks.on_cancel.clone(),
                    cancel_on_error: callbacks.cancel_on_error,
                }
            }
            DamperStatus::Completed => {
                callbacks.is_callback_running = true;
                SlotDispatch::Complete {
                    value,
                    set_value: callbacks.set_value.clone(),
                    on_complete: callbacks.on_complete.clone(),
                    on_cancel: callbacks.on_cancel.clone(),
                    cancel_on_error: callbacks.cancel_on_error,
                }
            }
            _ => SlotDispatch::Skip,
        }
    }

    /// Cancels the motion at `dense` after one of its callbacks
    /// faulted.
    pub(crate) fn cancel_at(&mut self, dense: usize) {
        if let Some(core) = self.cores.get_mut(dense) {
            core.status = DamperStatus::Canceled;
        }
    }

    pub(crate) fn end_dispatch(&mut self, dense: usize) {
        if let Some(callbacks) = self.callbacks.get_mut(dense) {
            callbacks.is_callback_running = false;
        }
    }

    /// Removes the motion at `dense` by swapping the last motion into
    /// its place.
    fn remove_at(&mut self, dense: usize) {
        let last = self.cores.len() - 1;

        let freed = self.to_entry.swap_remove(dense);
        self.cores.swap_remove(dense);
        self.options.swap_remove(dense);
        self.callbacks.swap_remove(dense);

        if dense != last {
            let moved = self.to_entry[dense];
            self.entries.set_dense_index(moved, dense as u32);
        }
        self.entries.free(freed);
    }

    /// Removes every motion at the given dense indices.
    ///
    /// Indices refer to the layout before the call, duplicates and
    /// out of range indices are ignored.
    pub fn remove_all(&mut self, dense_indices: &[usize]) {
        // Entry indices survive the swaps, dense indices do not.
        let doomed = dense_indices
            .iter()
            .filter_map(|&dense| self.to_entry.get(dense).copied())
            .collect::<Vec<_>>();

        for entry in doomed {
            if let Some(dense) = self.entries.dense_index(entry) {
                self.remove_at(dense as usize);
            }
        }
    }

    /// Drops every motion and invalidates all outstanding handles.
    ///
    /// The next update measures its deltas from `now`.
    pub fn reset(&mut self, now: TimeSnapshot) {
        self.to_entry.clear();
        self.cores.clear();
        self.options.clear();
        self.callbacks.clear();
        self.entries.reset();
        self.epoch = self.epoch.wrapping_add(1);
        self.restarted_at = now;
    }

    pub fn ensure_capacity(&mut self, capacity: usize) {
        let additional = capacity.saturating_sub(self.cores.len());
        self.to_entry.reserve(additional);
        self.cores.reserve(additional);
        self.options.reserve(additional);
        self.callbacks.reserve(additional);
        self.entries.ensure_capacity(capacity);
    }

    /// Mutable cores alongside their options, for batch integration.
    pub(crate) fn columns_mut(&mut self) -> (&mut [DamperCore], &[O]) {
        (&mut self.cores, &self.options)
    }
}

// Getter methods.
impl<V, O, A> DamperStorage<V, O, A> {
    #[inline]
    pub fn storage_id(&self) -> u32 {
        self.storage_id
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cores.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
    }

    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[inline]
    pub fn restarted_at(&self) -> TimeSnapshot {
        self.restarted_at
    }

    #[inline]
    pub fn cores(&self) -> &[DamperCore] {
        &self.cores
    }

    #[inline]
    pub fn entries(&self) -> &StorageEntryList {
        &self.entries
    }
}

/// Callbacks of a motion being completed by force.
pub(crate) struct CompleteCall<V> {
    pub get_target: GetterFn<V>,
    pub set_value: SetterFn<V>,
    pub on_complete: Option<ActionFn>,
}

/// Work the update loop has to perform for one slot.
pub(crate) enum SlotDispatch<V> {
    Skip,
    Update {
        value: V,
        set_value: SetterFn<V>,
        on_cancel: Option<ActionFn>,
        cancel_on_error: bool,
    },
    Complete {
        value: V,
        set_value: SetterFn<V>,
        on_complete: Option<ActionFn>,
        on_cancel: Option<ActionFn>,
        cancel_on_error: bool,
    },
}

/// Locks `mutex`, recovering the data of a poisoned lock.
#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Type erased view over a storage and its update runner.
pub trait MotionStorage: ThreadSafe {
    fn storage_id(&self) -> u32;

    fn key(&self) -> StorageKey;

    /// Number of live motions.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_active(&self, handle: &DamperHandle) -> bool;

    fn cancel(
        &self,
        handle: &DamperHandle,
        handler: &ErrorHandler,
    ) -> Result<(), DamperError>;

    fn complete(
        &self,
        handle: &DamperHandle,
        handler: &ErrorHandler,
    ) -> Result<(), DamperError>;

    fn status(
        &self,
        handle: &DamperHandle,
    ) -> Result<DamperStatus, DamperError>;

    fn playback_speed(
        &self,
        handle: &DamperHandle,
    ) -> Result<f32, DamperError>;

    fn set_playback_speed(
        &self,
        handle: &DamperHandle,
        speed: f32,
    ) -> Result<(), DamperError>;

    fn motion_time(
        &self,
        handle: &DamperHandle,
    ) -> Result<f64, DamperError>;

    /// Replaces the target of an active motion.
    ///
    /// Fails with [`DamperError::InvalidArgument`] when `target` is
    /// not of the storage's value type.
    fn set_target(
        &self,
        handle: &DamperHandle,
        target: &dyn Any,
    ) -> Result<(), DamperError>;

    /// Advances every motion to `now` and dispatches callbacks.
    fn update(&self, now: TimeSnapshot, handler: &ErrorHandler);

    /// Drops every motion, restarting the clocks at `now`.
    fn reset(&self, now: TimeSnapshot);

    fn ensure_capacity(&self, capacity: usize);
}

/// A [`DamperStorage`] shared between the dispatcher and the
/// handles, paired with the runner that updates it.
///
/// No lock is held while user callbacks run, so callbacks may
/// freely call back into the dispatcher.
pub struct SharedStorage<V, O, A> {
    storage: Mutex<DamperStorage<V, O, A>>,
    runner: Mutex<UpdateRunner>,
}

impl<V, O, A> SharedStorage<V, O, A>
where
    V: Copy + ThreadSafe,
    O: DamperOptions,
    A: DamperAdapter<V, O>,
{
    pub fn new(
        storage_id: u32,
        initial_capacity: usize,
        runner: UpdateRunner,
    ) -> Self {
        Self {
            storage: Mutex::new(DamperStorage::new(
                storage_id,
                initial_capacity,
            )),
            runner: Mutex::new(runner),
        }
    }

    pub fn append(
        &self,
        core: DamperCore,
        options: O,
        callbacks: DamperCallbacks<V>,
    ) -> DamperHandle {
        lock(&self.storage).append(core, options, callbacks)
    }

    /// Runs `f` with the storage locked.
    ///
    /// Calling back into the dispatcher from `f` deadlocks.
    pub fn with_storage<R>(
        &self,
        f: impl FnOnce(&mut DamperStorage<V, O, A>) -> R,
    ) -> R {
        f(&mut lock(&self.storage))
    }
}

impl<V, O, A> MotionStorage for SharedStorage<V, O, A>
where
    V: Copy + ThreadSafe,
    O: DamperOptions,
    A: DamperAdapter<V, O>,
{
    fn storage_id(&self) -> u32 {
        lock(&self.storage).storage_id()
    }

    fn key(&self) -> StorageKey {
        StorageKey::new::<V, O, A>()
    }

    fn len(&self) -> usize {
        lock(&self.storage).len()
    }

    fn is_active(&self, handle: &DamperHandle) -> bool {
        lock(&self.storage).is_active(handle)
    }

    fn cancel(
        &self,
        handle: &DamperHandle,
        handler: &ErrorHandler,
    ) -> Result<(), DamperError> {
        let on_cancel = lock(&self.storage).begin_cancel(handle)?;

        if let Some(on_cancel) = on_cancel {
            invoke_guarded(handler, || on_cancel());
        }
        Ok(())
    }

    fn complete(
        &self,
        handle: &DamperHandle,
        handler: &ErrorHandler,
    ) -> Result<(), DamperError> {
        let CompleteCall {
            get_target,
            set_value,
            on_complete,
        } = lock(&self.storage).begin_complete(handle)?;

        if let Some(target) = invoke_guarded(handler, || get_target()) {
            if let Ok(core) = lock(&self.storage).core_mut(handle) {
                core.target_value = A::to_lane(&target);
                core.settle();
            }
            invoke_guarded(handler, || set_value(target));
        }
        if let Some(on_complete) = on_complete {
            invoke_guarded(handler, || on_complete());
        }

        lock(&self.storage).end_complete(handle);
        Ok(())
    }

    fn status(
        &self,
        handle: &DamperHandle,
    ) -> Result<DamperStatus, DamperError> {
        lock(&self.storage).core(handle).map(|core| core.status)
    }

    fn playback_speed(
        &self,
        handle: &DamperHandle,
    ) -> Result<f32, DamperError> {
        lock(&self.storage)
            .core(handle)
            .map(|core| core.playback_speed)
    }

    fn set_playback_speed(
        &self,
        handle: &DamperHandle,
        speed: f32,
    ) -> Result<(), DamperError> {
        lock(&self.storage).core_mut(handle)?.playback_speed = speed;
        Ok(())
    }

    fn motion_time(
        &self,
        handle: &DamperHandle,
    ) -> Result<f64, DamperError> {
        lock(&self.storage).core(handle).map(|core| core.motion_time)
    }

    fn set_target(
        &self,
        handle: &DamperHandle,
        target: &dyn Any,
    ) -> Result<(), DamperError> {
        let Some(target) = target.downcast_ref::<V>() else {
            return Err(DamperError::InvalidArgument {
                name: "target",
                reason: "value type does not match the motion",
            });
        };

        let mut storage = lock(&self.storage);
        let core = storage.core_mut(handle)?;
        if !core.status.is_active() {
            return Err(DamperError::InvalidHandle(*handle));
        }

        core.target_value = A::to_lane(target);
        Ok(())
    }

    fn update(&self, now: TimeSnapshot, handler: &ErrorHandler) {
        let mut runner = match self.runner.try_lock() {
            Ok(runner) => runner,
            Err(TryLockError::Poisoned(poisoned)) => {
                poisoned.into_inner()
            }
            Err(TryLockError::WouldBlock) => {
                tracing::warn!(
                    "Skipping a re-entrant update of motion storage."
                );
                return;
            }
        };

        runner.update(&self.storage, now, handler);
    }

    fn reset(&self, now: TimeSnapshot) {
        lock(&self.storage).reset(now);
    }

    fn ensure_capacity(&self, capacity: usize) {
        lock(&self.storage).ensure_capacity(capacity);
    }

}

#[cfg(test)]
mod tests {
    use bevy_platform::sync::Arc;

    use super::*;
    use crate::adapter::DoubleAdapter;
    use crate::options::NoOptions;

    type TestStorage = DamperStorage<f64, NoOptions, DoubleAdapter>;

    fn callbacks() -> DamperCallbacks<f64> {
        DamperCallbacks::new(
            Arc::new(|| 0.0),
            Arc::new(|_| {}),
            Arc::new(|| 1.0),
        )
    }

    fn append(storage: &mut TestStorage, value: f64) -> DamperHandle {
        storage.append(
            DamperCore::scheduled(value, 100.0),
            NoOptions,
            callbacks(),
        )
    }

    /// Every live entry must point at a dense slot that points back.
    fn assert_consistent(storage: &TestStorage) {
        assert_eq!(storage.entries().occupied(), storage.len());
        for (dense, &entry) in storage.to_entry.iter().enumerate() {
            assert_eq!(
                storage.entries().dense_index(entry),
                Some(dense as u32)
            );
        }
    }

    #[test]
    fn append_then_resolve() {
        let mut storage = TestStorage::new(3, 2);
        let a = append(&mut storage, 1.0);
        let b = append(&mut storage, 2.0);

        assert_eq!(a.storage_id, 3);
        assert_eq!(storage.resolve(&a), Ok(0));
        assert_eq!(storage.core(&b).unwrap().current_value, 2.0);
        assert!(storage.is_active(&b));
    }

    #[test]
    fn resolve_rejects_foreign_and_stale_handles() {
        let mut storage = TestStorage::new(0, 2);
        let a = append(&mut storage, 1.0);

        let foreign = DamperHandle {
            storage_id: 1,
            ..a
        };
        assert_eq!(
            storage.resolve(&foreign),
            Err(DamperError::InvalidHandle(foreign))
        );
        assert!(storage.resolve(&DamperHandle::default()).is_err());

        storage.remove_all(&[0]);
        assert!(storage.resolve(&a).is_err());

        let b = append(&mut storage, 2.0);
        assert_eq!(b.index, a.index);
        assert_ne!(b.version, a.version);
        assert!(storage.resolve(&a).is_err());
        assert_eq!(storage.resolve(&b), Ok(0));
    }

    #[test]
    fn remove_all_keeps_columns_consistent() {
        let mut storage = TestStorage::new(0, 4);
        let handles = (0..10)
            .map(|i| append(&mut storage, i as f64))
            .collect::<Vec<_>>();

        // Unordered, duplicated and out of range.
        storage.remove_all(&[9, 0, 4, 4, 7, 42]);

        assert_eq!(storage.len(), 6);
        assert_consistent(&storage);

        for (i, handle) in handles.iter().enumerate() {
            let removed = [0, 4, 7, 9].contains(&i);
            assert_eq!(storage.resolve(handle).is_err(), removed);
            if !removed {
                let core = storage.core(handle).unwrap();
                assert_eq!(core.current_value, i as f64);
            }
        }
    }

    #[test]
    fn reset_invalidates_every_handle() {
        let mut storage = TestStorage::new(0, 4);
        let a = append(&mut storage, 1.0);
        let epoch = storage.epoch();

        storage.reset(TimeSnapshot::uniform(2.0));

        assert!(storage.is_empty());
        assert_ne!(storage.epoch(), epoch);
        assert_eq!(storage.restarted_at(), TimeSnapshot::uniform(2.0));
        assert!(storage.resolve(&a).is_err());

        let b = append(&mut storage, 2.0);
        assert!(storage.resolve(&a).is_err());
        assert!(storage.is_active(&b));
    }

    #[test]
    fn cancel_requires_an_active_motion() {
        let mut storage = TestStorage::new(0, 4);
        let a = append(&mut storage, 1.0);

        assert!(storage.begin_cancel(&a).is_ok());
        assert_eq!(storage.core(&a).unwrap().status, DamperStatus::Canceled);
        assert_eq!(
            storage.begin_cancel(&a).err(),
            Some(DamperError::InvalidHandle(a))
        );
    }

    #[test]
    fn complete_guard_detects_recursion() {
        let mut storage = TestStorage::new(0, 4);
        let a = append(&mut storage, 1.0);

        assert!(storage.begin_complete(&a).is_ok());
        assert_eq!(
            storage.begin_complete(&a).err(),
            Some(DamperError::RecursiveComplete)
        );

        storage.end_complete(&a);
        assert_eq!(
            storage.begin_complete(&a).err(),
            Some(DamperError::InvalidHandle(a))
        );
    }
}
