//! The per-storage update loop.
//!
//! An update runs in three phases:
//!
//! 1. Integration: every scheduled or playing motion advances its
//!    spring and stages its output. Runs in parallel when the
//!    `parallel` feature is enabled.
//! 2. Dispatch: callbacks run in slot order on the calling thread,
//!    with the storage unlocked.
//! 3. Retirement: canceled and delayed motions are swap-removed.

use bevy_platform::sync::Mutex;

use crate::adapter::DamperAdapter;
use crate::callback::{invoke_guarded, ActionFn};
use crate::data::{DamperCore, DamperStatus, MotionTimeKind};
use crate::error::ErrorHandler;
use crate::options::DamperOptions;
use crate::spring::{approximately, SpringGoal};
use crate::storage::{lock, DamperStorage, SlotDispatch};
use crate::ThreadSafe;

/// Readings of the three clocks motions can follow.
///
/// Also used for the deltas between two readings.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct TimeSnapshot {
    pub time: f64,
    pub unscaled_time: f64,
    pub realtime: f64,
}

impl TimeSnapshot {
    pub fn new(time: f64, unscaled_time: f64, realtime: f64) -> Self {
        Self {
            time,
            unscaled_time,
            realtime,
        }
    }

    /// A snapshot where all three clocks read `time`.
    pub fn uniform(time: f64) -> Self {
        Self::new(time, time, time)
    }

    pub fn delta_since(&self, previous: &Self) -> Self {
        Self {
            time: self.time - previous.time,
            unscaled_time: self.unscaled_time - previous.unscaled_time,
            realtime: self.realtime - previous.realtime,
        }
    }

    #[inline]
    pub fn get(&self, kind: MotionTimeKind) -> f64 {
        match kind {
            MotionTimeKind::Time => self.time,
            MotionTimeKind::UnscaledTime => self.unscaled_time,
            MotionTimeKind::Realtime => self.realtime,
        }
    }
}

/// Update state of one storage: the previous clock readings and the
/// scratch buffers reused across ticks.
#[derive(Debug)]
pub struct UpdateRunner {
    previous: TimeSnapshot,
    /// Storage epoch `previous` belongs to.
    epoch: u64,
    /// Staged lane value per dense slot.
    output: Vec<f64>,
    /// Dense slots to retire at the end of the tick.
    retired: Vec<usize>,
    /// Minimum number of slots per parallel work item.
    parallel_min_len: usize,
}

impl UpdateRunner {
    /// Creates a runner whose first delta is measured from
    /// `previous`.
    pub fn new(previous: TimeSnapshot, parallel_min_len: usize) -> Self {
        Self {
            previous,
            epoch: 0,
            output: Vec::new(),
            retired: Vec::new(),
            parallel_min_len: parallel_min_len.max(1),
        }
    }

    #[inline]
    pub fn previous(&self) -> TimeSnapshot {
        self.previous
    }

    pub fn update<V, O, A>(
        &mut self,
        cell: &Mutex<DamperStorage<V, O, A>>,
        now: TimeSnapshot,
        handler: &ErrorHandler,
    ) where
        V: Copy + ThreadSafe,
        O: DamperOptions,
        A: DamperAdapter<V, O>,
    {
        let (count, epoch) = {
            let mut storage = lock(cell);
            if storage.epoch() != self.epoch {
                // Reset since the last update, restart its clocks.
                self.epoch = storage.epoch();
                self.previous = storage.restarted_at();
            }

            let deltas = now.delta_since(&self.previous);
            self.previous = now;

            let count = storage.len();

            self.output.clear();
            self.output.resize(count, 0.0);
            self.retired.clear();

            let (cores, options) = storage.columns_mut();
            advance_all(
                cores,
                options,
                &deltas,
                &mut self.output,
                &mut self.retired,
                self.parallel_min_len,
            );

            (count, storage.epoch())
        };

        for dense in 0..count {
            if !self.dispatch(cell, dense, epoch, handler) {
                // The storage was reset from a callback.
                return;
            }
        }

        let mut storage = lock(cell);
        if storage.epoch() != epoch {
            return;
        }
        storage.remove_all(&self.retired);

        if !self.retired.is_empty() {
            tracing::trace!(
                storage_id = storage.storage_id(),
                retired = self.retired.len(),
                remaining = storage.len(),
                "Retired motions."
            );
        }
    }

    /// Runs the callbacks of a single slot.
    ///
    /// Returns `false` once the storage no longer matches the layout
    /// this tick started with.
    fn dispatch<V, O, A>(
        &self,
        cell: &Mutex<DamperStorage<V, O, A>>,
        dense: usize,
        epoch: u64,
        handler: &ErrorHandler,
    ) -> bool
    where
        V: Copy + ThreadSafe,
        O: DamperOptions,
        A: DamperAdapter<V, O>,
    {
        let slot = {
            let mut storage = lock(cell);
            if storage.epoch() != epoch || dense >= storage.len() {
                return false;
            }
            storage.prepare_dispatch(dense, self.output[dense])
        };

        match slot {
            SlotDispatch::Skip => {}
            SlotDispatch::Update {
                value,
                set_value,
                on_cancel,
                cancel_on_error,
            } => {
                let faulted =
                    invoke_guarded(handler, || set_value(value)).is_none();
                if faulted && cancel_on_error {
                    cancel_faulted(cell, dense, epoch, on_cancel, handler);
                }
            }
            SlotDispatch::Complete {
                value,
                set_value,
                on_complete,
                on_cancel,
                cancel_on_error,
            } => {
                let faulted =
                    invoke_guarded(handler, || set_value(value)).is_none();
                if faulted && cancel_on_error {
                    cancel_faulted(cell, dense, epoch, on_cancel, handler);
                } else if let Some(on_complete) = on_complete {
                    invoke_guarded(handler, || on_complete());
                }

                let mut storage = lock(cell);
                if storage.epoch() == epoch {
                    storage.end_dispatch(dense);
                }
            }
        }

        true
    }
}

fn cancel_faulted<V, O, A>(
    cell: &Mutex<DamperStorage<V, O, A>>,
    dense: usize,
    epoch: u64,
    on_cancel: Option<ActionFn>,
    handler: &ErrorHandler,
) where
    V: Copy + ThreadSafe,
    O: DamperOptions,
    A: DamperAdapter<V, O>,
{
    {
        let mut storage = lock(cell);
        if storage.epoch() != epoch {
            return;
        }
        storage.cancel_at(dense);
    }

    if let Some(on_cancel) = on_cancel {
        invoke_guarded(handler, || on_cancel());
    }
}

/// Advances a single motion by one tick.
///
/// Writes the value to emit into `output` and returns `true` when
/// the motion has to be retired at the end of the tick.
pub fn advance_slot<O: DamperOptions>(
    core: &mut DamperCore,
    options: &O,
    deltas: &TimeSnapshot,
    output: &mut f64,
) -> bool {
    match core.status {
        DamperStatus::Scheduled | DamperStatus::Playing => {
            // Clocks moving backwards never rewind a motion.
            let dt = (deltas.get(core.time_kind)
                * f64::from(core.playback_speed))
            .max(0.0);
            let goal = SpringGoal {
                target: core.target_value,
                half_life: core.half_life,
                time_remaining: options.target_time() - core.motion_time,
                target_velocity: options.target_velocity(),
            };

            core.motion_time += dt;
            let next = core.spring_type.advance(
                core.current_value,
                &mut core.spring,
                &goal,
                dt,
            );

            if approximately(next, core.target_value, core.epsilon) {
                core.settle();
                core.status = DamperStatus::Completed;
            } else {
                core.current_value = next;
                core.status = DamperStatus::Playing;
            }

            *output = core.current_value;
            false
        }
        DamperStatus::Completed => {
            core.status = DamperStatus::Delayed;
            *output = core.current_value;
            true
        }
        DamperStatus::Canceled | DamperStatus::Delayed => {
            core.status = DamperStatus::Disposed;
            true
        }
        DamperStatus::None | DamperStatus::Disposed => false,
    }
}

#[cfg(feature = "parallel")]
fn advance_all<O: DamperOptions>(
    cores: &mut [DamperCore],
    options: &[O],
    deltas: &TimeSnapshot,
    output: &mut [f64],
    retired: &mut Vec<usize>,
    min_len: usize,
) {
    use rayon::prelude::*;

    retired.par_extend(
        cores
            .par_iter_mut()
            .zip(options.par_iter())
            .zip(output.par_iter_mut())
            .enumerate()
            .with_min_len(min_len)
            .filter_map(|(dense, ((core, options), output))| {
                advance_slot(core, options, deltas, output)
                    .then_some(dense)
            }),
    );
}

#[cfg(not(feature = "parallel"))]
fn advance_all<O: DamperOptions>(
    cores: &mut [DamperCore],
    options: &[O],
    deltas: &TimeSnapshot,
    output: &mut [f64],
    retired: &mut Vec<usize>,
    _min_len: usize,
) {
    let slots = cores.iter_mut().zip(options).zip(output.iter_mut());
    for (dense, ((core, options), output)) in slots.enumerate() {
        if advance_slot(core, options, deltas, output) {
            retired.push(dense);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{NoOptions, TimeDamperOptions};
    use crate::spring::SpringType;

    fn playing(spring_type: SpringType) -> DamperCore {
        DamperCore {
            spring_type,
            half_life: 0.333,
            ..DamperCore::scheduled(0.0, 10.0)
        }
    }

    #[test]
    fn scheduled_motion_starts_playing() {
        let mut core = playing(SpringType::Simple);
        let mut output = 0.0;

        let retire = advance_slot(
            &mut core,
            &NoOptions,
            &TimeSnapshot::uniform(0.333),
            &mut output,
        );

        assert!(!retire);
        assert_eq!(core.status, DamperStatus::Playing);
        assert!((output - 5.0).abs() < 1e-3);
        assert!((core.motion_time - 0.333).abs() < 1e-12);
    }

    #[test]
    fn converged_motion_snaps_to_target() {
        let mut core = playing(SpringType::Double);
        let mut output = 0.0;

        advance_slot(
            &mut core,
            &NoOptions,
            &TimeSnapshot::uniform(100.0),
            &mut output,
        );

        assert_eq!(core.status, DamperStatus::Completed);
        assert_eq!(output, 10.0);
        assert_eq!(core.spring.velocity, 0.0);

        // One grace tick, then retirement.
        assert!(advance_slot(
            &mut core,
            &NoOptions,
            &TimeSnapshot::default(),
            &mut output,
        ));
        assert_eq!(core.status, DamperStatus::Delayed);
        assert_eq!(output, 10.0);
    }

    #[test]
    fn canceled_motion_is_disposed() {
        let mut core = playing(SpringType::Double);
        core.status = DamperStatus::Canceled;
        let mut output = -1.0;

        assert!(advance_slot(
            &mut core,
            &NoOptions,
            &TimeSnapshot::uniform(1.0),
            &mut output,
        ));
        assert_eq!(core.status, DamperStatus::Disposed);
        assert_eq!(output, -1.0);
        assert_eq!(core.current_value, 0.0);
    }

    #[test]
    fn deltas_follow_time_kind_and_speed() {
        let deltas = TimeSnapshot::new(1.0, 2.0, 4.0);
        let cases = [
            (MotionTimeKind::Time, 1.0),
            (MotionTimeKind::UnscaledTime, 2.0),
            (MotionTimeKind::Realtime, 4.0),
        ];

        for (time_kind, expected) in cases {
            let mut core = DamperCore {
                time_kind,
                playback_speed: 0.5,
                ..playing(SpringType::Simple)
            };
            advance_slot(&mut core, &NoOptions, &deltas, &mut 0.0);

            assert_eq!(core.motion_time, expected * 0.5);
        }
    }

    #[test]
    fn zero_speed_pauses_motion() {
        let mut core = DamperCore {
            playback_speed: 0.0,
            ..playing(SpringType::Simple)
        };
        let mut output = 0.0;

        advance_slot(
            &mut core,
            &NoOptions,
            &TimeSnapshot::uniform(1.0),
            &mut output,
        );

        assert_eq!(core.status, DamperStatus::Playing);
        assert_eq!(output, 0.0);
        assert_eq!(core.motion_time, 0.0);
    }

    #[test]
    fn timed_motion_reads_target_time_from_options() {
        let options = TimeDamperOptions { target_time: 0.5 };
        let mut core = DamperCore {
            half_life: 0.05,
            ..playing(SpringType::Timed)
        };
        let mut steps = 0;

        while core.status != DamperStatus::Completed && steps < 600 {
            advance_slot(
                &mut core,
                &options,
                &TimeSnapshot::uniform(1.0 / 60.0),
                &mut 0.0,
            );
            steps += 1;
        }

        assert_eq!(core.status, DamperStatus::Completed);
        // Arrives shortly after the requested half second.
        assert!(core.motion_time >= 0.4, "{}", core.motion_time);
        assert!(core.motion_time < 1.0, "{}", core.motion_time);
    }

    #[test]
    fn advance_all_collects_retired_slots() {
        let mut cores = (0..40)
            .map(|i| {
                let mut core = playing(SpringType::Simple);
                if i % 4 == 0 {
                    core.status = DamperStatus::Canceled;
                }
                core
            })
            .collect::<Vec<_>>();
        let options = vec![NoOptions; cores.len()];
        let mut output = vec![0.0; cores.len()];
        let mut retired = Vec::new();

        advance_all(
            &mut cores,
            &options,
            &TimeSnapshot::uniform(0.1),
            &mut output,
            &mut retired,
            4,
        );

        retired.sort_unstable();
        assert_eq!(retired, (0..40).step_by(4).collect::<Vec<_>>());
        assert!(cores
            .iter()
            .enumerate()
            .filter(|(i, _)| i % 4 != 0)
            .all(|(_, core)| core.status == DamperStatus::Playing));
    }
}
