use core::any::TypeId;

use bevy_platform::sync::Arc;

use crate::error::DamperError;
use crate::handle::DamperHandle;
use crate::storage::MotionStorage;

/// Identifies a storage by its value, options and adapter types.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct StorageKey {
    /// The [`TypeId`] of the value type.
    value_id: TypeId,
    /// The [`TypeId`] of the options type.
    options_id: TypeId,
    /// The [`TypeId`] of the adapter type.
    adapter_id: TypeId,
}

impl StorageKey {
    pub fn new<V: 'static, O: 'static, A: 'static>() -> Self {
        Self {
            value_id: TypeId::of::<V>(),
            options_id: TypeId::of::<O>(),
            adapter_id: TypeId::of::<A>(),
        }
    }

    #[inline]
    pub fn value_id(&self) -> TypeId {
        self.value_id
    }

    #[inline]
    pub fn options_id(&self) -> TypeId {
        self.options_id
    }

    #[inline]
    pub fn adapter_id(&self) -> TypeId {
        self.adapter_id
    }
}

/// Append-only list of storages, indexed by storage id.
///
/// Storages are never unregistered, so an id stays valid for the
/// whole lifetime of the registry.
#[derive(Default)]
pub struct StorageRegistry {
    storages: Vec<Arc<dyn MotionStorage>>,
}

impl StorageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id the next registered storage receives.
    #[inline]
    pub fn next_id(&self) -> u32 {
        self.storages.len() as u32
    }

    /// Registers a storage created with [`Self::next_id`].
    pub fn register(&mut self, storage: Arc<dyn MotionStorage>) -> u32 {
        let storage_id = self.next_id();
        debug_assert_eq!(storage.storage_id(), storage_id);

        self.storages.push(storage);
        storage_id
    }

    pub fn get(&self, storage_id: u32) -> Option<&Arc<dyn MotionStorage>> {
        self.storages.get(storage_id as usize)
    }

    /// The storage that owns the motion behind `handle`.
    pub fn route(
        &self,
        handle: &DamperHandle,
    ) -> Result<Arc<dyn MotionStorage>, DamperError> {
        self.get(handle.storage_id)
            .cloned()
            .ok_or(DamperError::InvalidHandle(*handle))
    }

    /// Owned copies of every storage, in registration order.
    pub fn snapshot(&self) -> Vec<Arc<dyn MotionStorage>> {
        self.storages.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn MotionStorage>> {
        self.storages.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.storages.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.storages.is_empty()
    }
}
