use core::marker::PhantomData;

use bevy_platform::sync::Arc;

use crate::adapter::DamperAdapter;
use crate::callback::{ActionFn, DamperCallbacks, GetterFn, SetterFn};
use crate::data::{DamperCore, MotionTimeKind, DEFAULT_HALF_LIFE};
use crate::dispatcher::MotionDispatcher;
use crate::error::DamperError;
use crate::handle::DamperHandle;
use crate::options::DamperOptions;
use crate::spring::SpringType;
use crate::ThreadSafe;

/// Configures a motion before it is scheduled on a
/// [`MotionDispatcher`].
///
/// A getter, a setter and a target getter are required. Everything
/// else falls back to a sensible default: a [`SpringType::Double`]
/// spring with a half-life of `0.333` seconds, following
/// [`MotionTimeKind::Time`] at normal speed.
pub struct DamperBuilder<'d, V, O, A> {
    dispatcher: &'d MotionDispatcher,
    get_value: Option<GetterFn<V>>,
    set_value: Option<SetterFn<V>>,
    get_target: Option<GetterFn<V>>,
    initial_value: Option<V>,
    on_complete: Option<ActionFn>,
    on_cancel: Option<ActionFn>,
    options: O,
    spring_type: SpringType,
    half_life: f64,
    playback_speed: f32,
    time_kind: MotionTimeKind,
    epsilon: Option<f64>,
    cancel_on_error: bool,
    skip_values_during_delay: bool,
    _marker: PhantomData<fn() -> A>,
}

impl<'d, V, O, A> DamperBuilder<'d, V, O, A>
where
    V: Copy + ThreadSafe,
    O: DamperOptions,
    A: DamperAdapter<V, O>,
{
    pub fn new(dispatcher: &'d MotionDispatcher) -> Self {
        Self {
            dispatcher,
            get_value: None,
            set_value: None,
            get_target: None,
            initial_value: None,
            on_complete: None,
            on_cancel: None,
            options: O::default(),
            spring_type: SpringType::default(),
            half_life: DEFAULT_HALF_LIFE,
            playback_speed: 1.0,
            time_kind: MotionTimeKind::default(),
            epsilon: None,
            cancel_on_error: false,
            skip_values_during_delay: true,
            _marker: PhantomData,
        }
    }

    /// Reads the current value of the animated property.
    pub fn with_getter(
        mut self,
        get_value: impl Fn() -> V + Send + Sync + 'static,
    ) -> Self {
        self.get_value = Some(Arc::new(get_value));
        self
    }

    /// Receives every value the motion produces.
    pub fn with_setter(
        mut self,
        set_value: impl Fn(V) + Send + Sync + 'static,
    ) -> Self {
        self.set_value = Some(Arc::new(set_value));
        self
    }

    /// Reads the value the motion should converge onto.
    pub fn with_target(
        mut self,
        get_target: impl Fn() -> V + Send + Sync + 'static,
    ) -> Self {
        self.get_target = Some(Arc::new(get_target));
        self
    }

    /// Starts from `value` instead of sampling the getter.
    pub fn with_initial_value(mut self, value: V) -> Self {
        self.initial_value = Some(value);
        self
    }

    pub fn with_spring(mut self, spring_type: SpringType) -> Self {
        self.spring_type = spring_type;
        self
    }

    pub fn with_half_life(mut self, half_life: f64) -> Self {
        self.half_life = half_life;
        self
    }

    pub fn with_playback_speed(mut self, speed: f32) -> Self {
        self.playback_speed = speed;
        self
    }

    pub fn with_time_kind(mut self, time_kind: MotionTimeKind) -> Self {
        self.time_kind = time_kind;
        self
    }

    /// Overrides the convergence threshold of the adapter.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = Some(epsilon);
        self
    }

    pub fn with_on_complete(
        mut self,
        on_complete: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.on_complete = Some(Arc::new(on_complete));
        self
    }

    pub fn with_on_cancel(
        mut self,
        on_cancel: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.on_cancel = Some(Arc::new(on_cancel));
        self
    }

    pub fn with_cancel_on_error(mut self, cancel_on_error: bool) -> Self {
        self.cancel_on_error = cancel_on_error;
        self
    }

    pub fn with_skip_values_during_delay(mut self, skip: bool) -> Self {
        self.skip_values_during_delay = skip;
        self
    }

    /// Replaces the options, moving the motion into the storage of
    /// the new options type.
    pub fn with_options<P>(self, options: P) -> DamperBuilder<'d, V, P, A>
    where
        P: DamperOptions,
        A: DamperAdapter<V, P>,
    {
        DamperBuilder {
            dispatcher: self.dispatcher,
            get_value: self.get_value,
            set_value: self.set_value,
            get_target: self.get_target,
            initial_value: self.initial_value,
            on_complete: self.on_complete,
            on_cancel: self.on_cancel,
            options,
            spring_type: self.spring_type,
            half_life: self.half_life,
            playback_speed: self.playback_speed,
            time_kind: self.time_kind,
            epsilon: self.epsilon,
            cancel_on_error: self.cancel_on_error,
            skip_values_during_delay: self.skip_values_during_delay,
            _marker: PhantomData,
        }
    }

    /// Validates the configuration and schedules the motion.
    ///
    /// The getter (unless an initial value was given) and the target
    /// getter are invoked once, on the calling thread.
    pub fn schedule(self) -> Result<DamperHandle, DamperError> {
        let get_value =
            self.get_value.ok_or(DamperError::NullCallback("getter"))?;
        let set_value =
            self.set_value.ok_or(DamperError::NullCallback("setter"))?;
        let get_target =
            self.get_target.ok_or(DamperError::NullCallback("target"))?;

        if !self.half_life.is_finite() || self.half_life < 0.0 {
            return Err(DamperError::InvalidArgument {
                name: "half_life",
                reason: "must be a finite, non-negative number",
            });
        }
        if !self.playback_speed.is_finite() || self.playback_speed < 0.0
        {
            return Err(DamperError::InvalidArgument {
                name: "speed",
                reason: "must be a finite, non-negative number",
            });
        }
        let epsilon = self.epsilon.unwrap_or(A::EPSILON);
        if epsilon.is_nan() || epsilon < 0.0 {
            return Err(DamperError::InvalidArgument {
                name: "epsilon",
                reason: "must be a non-negative number",
            });
        }

        let initial = self.initial_value.unwrap_or_else(|| get_value());
        let target = get_target();

        let core = DamperCore {
            playback_speed: self.playback_speed,
            time_kind: self.time_kind,
            spring_type: self.spring_type,
            half_life: self.half_life,
            epsilon,
            ..DamperCore::scheduled(
                A::to_lane(&initial),
                A::to_lane(&target),
            )
        };

        let mut callbacks =
            DamperCallbacks::new(get_value, set_value, get_target);
        callbacks.on_complete = self.on_complete;
        callbacks.on_cancel = self.on_cancel;
        callbacks.cancel_on_error = self.cancel_on_error;
        callbacks.skip_values_during_delay =
            self.skip_values_during_delay;

        Ok(self.dispatcher.schedule::<V, O, A>(
            core,
            self.options,
            callbacks,
        ))
    }
}

// Getter methods.
impl<V, O, A> DamperBuilder<'_, V, O, A> {
    #[inline]
    pub fn options(&self) -> &O {
        &self.options
    }

    #[inline]
    pub fn spring_type(&self) -> SpringType {
        self.spring_type
    }

    #[inline]
    pub fn half_life(&self) -> f64 {
        self.half_life
    }
}
