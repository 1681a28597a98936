//! Process state machine for charge, discharge and calibration runs.
//!
//! The controller is driven by calling [`ProcessController::update`] from a
//! single control loop. It never blocks: every wait is a comparison against
//! the injected [`Clock`]. Polls are rate limited by [`PollScheduler`], and
//! three failed polls in a row abort whatever is running.
//!
//! ```no_run
//! use sbs_conditioner::{
//!     BatteryMonitor, ProcessConfig, ProcessController, Smbus, SystemClock,
//! };
//! # fn run<I, O>(i2c: I, relays: O) -> sbs_conditioner::Result<()>
//! # where I: embedded_hal::i2c::I2c, O: sbs_conditioner::ProcessOutputs {
//! let monitor = BatteryMonitor::new(Smbus::new(i2c));
//! let mut controller =
//!     ProcessController::new(monitor, relays, SystemClock::new(), ProcessConfig::default())?;
//! controller.start_calibration(2)?;
//! while controller.is_busy() {
//!     if let Some(event) = controller.update() {
//!         println!("{:?}", event);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use log::{error, info, warn};

use crate::clock::Clock;
use crate::config::ProcessConfig;
use crate::constants::{MAX_CONSECUTIVE_FAILURES, POLL_INTERVAL_MS};
use crate::demo::{DemoBattery, DemoDirection};
use crate::error::{Error, Result};
use crate::monitor::TelemetrySource;
use crate::outputs::{Indication, ProcessOutputs, RelayState};
use crate::policy;
use crate::types::TelemetrySnapshot;

/// Where a calibration gets its readings and wait durations from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timing {
    /// Battery on the bus, configured waits
    Live,
    /// Synthetic battery, every wait is the demo stage duration
    Demo,
}

/// Steps of one calibration, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationStep {
    PreChargeCharging,
    PreChargeWaiting,
    StartDischarge,
    Discharging,
    PostDischargeWait,
    StartCharge,
    Charging,
    PostChargeWait,
}

impl CalibrationStep {
    fn demo_direction(self) -> DemoDirection {
        match self {
            CalibrationStep::PreChargeCharging | CalibrationStep::Charging => {
                DemoDirection::Charging
            }
            CalibrationStep::Discharging => DemoDirection::Discharging,
            _ => DemoDirection::Idle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Idle,
    Charging,
    Discharging,
    Calibrating {
        step: CalibrationStep,
        current_cycle: u32,
        total_cycles: u32,
        timing: Timing,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessKind {
    Charge,
    Discharge,
    Calibration,
    Demo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Polls that returned an error snapshot back to back
    ReadFailures(u8),
    /// The battery flagged an error condition
    BatteryError,
    /// A relay write failed
    RelayFault,
}

/// Notable things that happened during an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessEvent {
    StepEntered { step: CalibrationStep, cycle: u32 },
    Finished(ProcessKind),
    Aborted(AbortReason),
}

/// Outcome of a failed poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollFailure {
    Tolerated(u8),
    Escalated(u8),
}

/// Rate limit for polls and the consecutive failure count.
#[derive(Debug, Clone, Default)]
pub struct PollScheduler {
    last_poll_ms: Option<u64>,
    failures: u8,
}

impl PollScheduler {
    pub fn restart(&mut self, now_ms: u64) {
        self.last_poll_ms = Some(now_ms);
        self.failures = 0;
    }

    pub fn clear(&mut self) {
        self.last_poll_ms = None;
        self.failures = 0;
    }

    /// Whether `interval_ms` has passed since the last poll; marks a poll
    /// as taken when it has.
    pub fn take_due(&mut self, now_ms: u64, interval_ms: u64) -> bool {
        let last = *self.last_poll_ms.get_or_insert(now_ms);
        if now_ms.saturating_sub(last) < interval_ms {
            return false;
        }
        self.last_poll_ms = Some(now_ms);
        true
    }

    pub fn failures(&self) -> u8 {
        self.failures
    }

    fn record_success(&mut self) {
        self.failures = 0;
    }

    fn record_failure(&mut self) -> PollFailure {
        self.failures = self.failures.saturating_add(1);
        if self.failures >= MAX_CONSECUTIVE_FAILURES {
            PollFailure::Escalated(self.failures)
        } else {
            PollFailure::Tolerated(self.failures)
        }
    }
}

/// Sequencer for charge, discharge and calibration runs.
pub struct ProcessController<S, O, C> {
    source: S,
    outputs: O,
    clock: C,
    config: ProcessConfig,
    state: ProcessState,
    relays: RelayState,
    demo: DemoBattery,
    snapshot: Option<TelemetrySnapshot>,
    scheduler: PollScheduler,
    step_start_ms: Option<u64>,
    process_start_ms: Option<u64>,
}

impl<S, O, C> ProcessController<S, O, C>
where
    S: TelemetrySource,
    O: ProcessOutputs,
    C: Clock,
{
    /// Build an idle controller and open both relays.
    pub fn new(source: S, outputs: O, clock: C, config: ProcessConfig) -> Result<Self> {
        config.validate()?;
        let mut controller = ProcessController {
            source,
            outputs,
            clock,
            config,
            state: ProcessState::Idle,
            relays: RelayState::Off,
            demo: DemoBattery::default(),
            snapshot: None,
            scheduler: PollScheduler::default(),
            step_start_ms: None,
            process_start_ms: None,
        };
        controller.command(RelayState::Off, Indication::Off)?;
        Ok(controller)
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.state != ProcessState::Idle
    }

    /// Relay position last commanded
    pub fn relays(&self) -> RelayState {
        self.relays
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ProcessConfig) -> Result<()> {
        if self.is_busy() {
            return Err(Error::Busy);
        }
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Reading the running process is judged on
    pub fn last_snapshot(&self) -> Option<&TelemetrySnapshot> {
        self.snapshot.as_ref()
    }

    pub fn consecutive_failures(&self) -> u8 {
        self.scheduler.failures()
    }

    pub fn step_elapsed_ms(&self) -> Option<u64> {
        let now = self.clock.now_ms();
        self.step_start_ms.map(|start| now.saturating_sub(start))
    }

    pub fn process_elapsed_ms(&self) -> Option<u64> {
        let now = self.clock.now_ms();
        self.process_start_ms.map(|start| now.saturating_sub(start))
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn outputs(&self) -> &O {
        &self.outputs
    }

    pub fn start_charge(&mut self) -> Result<()> {
        self.begin(ProcessState::Charging)?;
        info!("Starting charge");
        self.command_or_halt(RelayState::Charge, Indication::Charge)
    }

    pub fn start_discharge(&mut self) -> Result<()> {
        self.begin(ProcessState::Discharging)?;
        info!("Starting discharge");
        self.command_or_halt(RelayState::Discharge, Indication::Discharge)
    }

    /// Start a calibration of `cycles` discharge/charge passes.
    ///
    /// Relays stay untouched until the first update.
    pub fn start_calibration(&mut self, cycles: u32) -> Result<()> {
        self.begin_calibration(cycles, Timing::Live)?;
        info!("Starting calibration, {} cycle(s)", cycles);
        Ok(())
    }

    /// Run a calibration against a synthetic battery with short stages.
    pub fn start_demo(&mut self, cycles: u32) -> Result<()> {
        self.begin_calibration(cycles, Timing::Demo)?;
        self.demo = DemoBattery::default();
        info!("Starting calibration demo, {} cycle(s)", cycles);
        Ok(())
    }

    /// Open both relays and return to idle, from any state.
    pub fn stop_process(&mut self) -> Result<()> {
        if self.is_busy() {
            info!("Process stopped");
        }
        self.halt()
    }

    /// Advance the running process by at most one transition.
    pub fn update(&mut self) -> Option<ProcessEvent> {
        let timing = match self.state {
            ProcessState::Idle => return None,
            ProcessState::Charging | ProcessState::Discharging => Timing::Live,
            ProcessState::Calibrating { timing, .. } => timing,
        };

        if let Some(event) = self.poll_if_due(timing) {
            return Some(event);
        }

        let result = match self.state {
            ProcessState::Idle => Ok(None),
            ProcessState::Charging => Ok(self.update_single(ProcessKind::Charge)),
            ProcessState::Discharging => Ok(self.update_single(ProcessKind::Discharge)),
            ProcessState::Calibrating {
                step,
                current_cycle,
                total_cycles,
                timing,
            } => self.update_calibration(step, current_cycle, total_cycles, timing),
        };

        result.unwrap_or_else(|e| {
            error!("Relay fault, aborting: {}", e);
            let _ = self.halt();
            Some(ProcessEvent::Aborted(AbortReason::RelayFault))
        })
    }

    fn begin(&mut self, state: ProcessState) -> Result<()> {
        if self.is_busy() {
            return Err(Error::Busy);
        }
        let now = self.clock.now_ms();
        self.state = state;
        self.snapshot = None;
        self.scheduler.restart(now);
        self.step_start_ms = Some(now);
        self.process_start_ms = Some(now);
        Ok(())
    }

    fn begin_calibration(&mut self, cycles: u32, timing: Timing) -> Result<()> {
        if cycles < 1 {
            return Err(Error::InvalidCycleCount(cycles));
        }
        self.begin(ProcessState::Calibrating {
            step: CalibrationStep::PreChargeCharging,
            current_cycle: 1,
            total_cycles: cycles,
            timing,
        })
    }

    fn poll_if_due(&mut self, timing: Timing) -> Option<ProcessEvent> {
        let interval = match timing {
            Timing::Live => POLL_INTERVAL_MS,
            Timing::Demo => self.config.demo_stage_duration_ms,
        };
        if !self.scheduler.take_due(self.clock.now_ms(), interval) {
            return None;
        }

        if timing == Timing::Demo {
            let direction = match self.state {
                ProcessState::Calibrating { step, .. } => step.demo_direction(),
                _ => DemoDirection::Idle,
            };
            self.snapshot = Some(self.demo.next_snapshot(direction));
            return None;
        }

        let snapshot = self.source.poll();
        if !snapshot.is_error() {
            self.scheduler.record_success();
            self.snapshot = Some(snapshot);
            return None;
        }

        match self.scheduler.record_failure() {
            PollFailure::Tolerated(count) => {
                warn!("Battery read failed ({} in a row)", count);
                None
            }
            PollFailure::Escalated(count) => {
                error!("Aborting after {} consecutive read errors", count);
                let _ = self.halt();
                Some(ProcessEvent::Aborted(AbortReason::ReadFailures(count)))
            }
        }
    }

    fn update_single(&mut self, kind: ProcessKind) -> Option<ProcessEvent> {
        let stop = match kind {
            ProcessKind::Charge => self.stop_charging(),
            _ => self.stop_discharging(),
        };
        if !stop {
            return None;
        }

        let battery_error = self.snapshot.as_ref().is_some_and(|s| s.has_error());
        let _ = self.halt();
        if battery_error {
            error!("Battery error, {:?} stopped", kind);
            Some(ProcessEvent::Aborted(AbortReason::BatteryError))
        } else {
            info!("{:?} finished", kind);
            Some(ProcessEvent::Finished(kind))
        }
    }

    fn update_calibration(
        &mut self,
        step: CalibrationStep,
        cycle: u32,
        total: u32,
        timing: Timing,
    ) -> Result<Option<ProcessEvent>> {
        let next = match step {
            CalibrationStep::PreChargeCharging => {
                self.command(RelayState::Charge, Indication::Charge)?;
                if self.stop_charging() || self.demo_stage_over(timing) {
                    info!("Initial charge complete, waiting");
                    self.outputs.indicate(Indication::ChargeDone);
                    Some(CalibrationStep::PreChargeWaiting)
                } else {
                    None
                }
            }
            CalibrationStep::PreChargeWaiting => {
                let wait = self.wait_ms(timing, self.config.pre_charge_wait_ms);
                self.waited(wait).then_some(CalibrationStep::StartDischarge)
            }
            CalibrationStep::StartDischarge => {
                info!("Starting discharge phase, cycle {} of {}", cycle, total);
                // Readings from the rest period say nothing about the new phase.
                self.snapshot = None;
                self.command(RelayState::Discharge, Indication::Discharge)?;
                Some(CalibrationStep::Discharging)
            }
            CalibrationStep::Discharging => {
                if self.stop_discharging() || self.demo_stage_over(timing) {
                    info!("Discharge complete, waiting");
                    self.command(RelayState::Off, Indication::Waiting)?;
                    Some(CalibrationStep::PostDischargeWait)
                } else {
                    None
                }
            }
            CalibrationStep::PostDischargeWait => {
                let wait = self.wait_ms(timing, self.config.discharge_wait_ms);
                self.waited(wait).then_some(CalibrationStep::StartCharge)
            }
            CalibrationStep::StartCharge => {
                info!("Starting charge phase, cycle {} of {}", cycle, total);
                // Readings from the rest period say nothing about the new phase.
                self.snapshot = None;
                self.command(RelayState::Charge, Indication::Charge)?;
                Some(CalibrationStep::Charging)
            }
            CalibrationStep::Charging => {
                if self.stop_charging() || self.demo_stage_over(timing) {
                    info!("Charge complete, waiting");
                    self.outputs.indicate(Indication::ChargeDone);
                    Some(CalibrationStep::PostChargeWait)
                } else {
                    None
                }
            }
            CalibrationStep::PostChargeWait => {
                let wait = self.wait_ms(timing, self.config.charge_wait_ms);
                if !self.waited(wait) {
                    None
                } else if cycle < total {
                    self.enter(CalibrationStep::StartDischarge, cycle + 1, total, timing);
                    return Ok(Some(ProcessEvent::StepEntered {
                        step: CalibrationStep::StartDischarge,
                        cycle: cycle + 1,
                    }));
                } else {
                    info!("All cycles complete");
                    self.halt()?;
                    let kind = match timing {
                        Timing::Live => ProcessKind::Calibration,
                        Timing::Demo => ProcessKind::Demo,
                    };
                    return Ok(Some(ProcessEvent::Finished(kind)));
                }
            }
        };

        Ok(next.map(|step| {
            self.enter(step, cycle, total, timing);
            ProcessEvent::StepEntered { step, cycle }
        }))
    }

    fn enter(&mut self, step: CalibrationStep, cycle: u32, total: u32, timing: Timing) {
        self.step_start_ms = Some(self.clock.now_ms());
        self.state = ProcessState::Calibrating {
            step,
            current_cycle: cycle,
            total_cycles: total,
            timing,
        };
    }

    fn wait_ms(&self, timing: Timing, live_ms: u64) -> u64 {
        match timing {
            Timing::Live => live_ms,
            Timing::Demo => self.config.demo_stage_duration_ms,
        }
    }

    fn waited(&self, wait_ms: u64) -> bool {
        self.step_elapsed_ms().is_some_and(|elapsed| elapsed > wait_ms)
    }

    /// Demo charge and discharge phases end after one stage at the latest.
    fn demo_stage_over(&self, timing: Timing) -> bool {
        timing == Timing::Demo
            && self
                .step_elapsed_ms()
                .is_some_and(|elapsed| elapsed >= self.config.demo_stage_duration_ms)
    }

    fn stop_charging(&self) -> bool {
        self.snapshot
            .as_ref()
            .is_some_and(|s| policy::should_stop_charging(s, &self.config))
    }

    fn stop_discharging(&self) -> bool {
        self.snapshot
            .as_ref()
            .is_some_and(|s| policy::should_stop_discharging(s, &self.config))
    }

    fn command(&mut self, relays: RelayState, indication: Indication) -> Result<()> {
        let (charge, discharge) = relays.outputs();
        assert!(!(charge && discharge), "charge and discharge relays both on");
        self.relays = relays;
        self.outputs.set_relays(relays)?;
        self.outputs.indicate(indication);
        Ok(())
    }

    fn command_or_halt(&mut self, relays: RelayState, indication: Indication) -> Result<()> {
        if let Err(e) = self.command(relays, indication) {
            error!("Relay fault while starting: {}", e);
            let _ = self.halt();
            return Err(e);
        }
        Ok(())
    }

    /// Everything off, back to idle. The state is reset even when the
    /// relay write fails.
    fn halt(&mut self) -> Result<()> {
        self.state = ProcessState::Idle;
        self.scheduler.clear();
        self.step_start_ms = None;
        self.process_start_ms = None;
        let result = self.command(RelayState::Off, Indication::Off);
        if let Err(e) = &result {
            error!("Could not open relays: {}", e);
        }
        result
    }
}
