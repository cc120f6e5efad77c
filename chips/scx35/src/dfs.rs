// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! Dynamic frequency scaling sequencer.
//!
//! A transition walks a fixed sequence of phases:
//!
//! ```text
//! Idle -> Validating -> Quiescing -> ClockTransition -> TimingApply -> Resuming -> Idle
//!              |
//!              +-> Rejected
//! ```
//!
//! Quiescing stalls the command queue, waits for it to drain, and puts DRAM
//! into self-refresh. Entering self-refresh is the commit point. A timeout
//! before it rolls every touched register back and reports a recoverable
//! error. A timeout after it leaves the memory subsystem in a mixed state and
//! is reported as a [`FatalSequenceFault`].
//!
//! The sequencer runs with interrupts masked, from on-chip memory, and
//! without any allocation. It must be the only code touching the DRAM
//! subsystem registers for the whole call.

use embedded_hal::delay::DelayNs;
use log::{debug, error, info, warn};

use crate::config::{Config, CONFIG};
use crate::emc_clk::{ClockSelection, ClockSource, ClockSwitcher};
use crate::errorcode::{FatalSequenceFault, SequenceError, WaitTimeout};
use crate::publ::PhyDllController;
use crate::regio::{poll, Block, RegisterIo};
use crate::request::{self, ValidatedRequest};
use crate::timing::{DdrType, Frequency, ProfileTable};
use crate::umctl::{CommandQueueGate, RefreshController, UmctlRegisters};

/// Number of phase checkpoints kept for one transition. A full successful
/// run records seven.
pub const HISTORY_DEPTH: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Validating,
    Rejected,
    Quiescing,
    ClockTransition,
    TimingApply,
    Resuming,
}

/// What happens to the PHY DLL across the transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DllMode {
    /// Put the DLL in bypass. Used at low frequencies.
    DisableDll,
    /// Take the DLL out of bypass and relock it.
    EnableDll,
    /// Leave the DLL alone.
    NoSwitch,
}

/// Why the caller asked for the transition. Only affects clock source
/// selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionCause {
    NormalSwitch,
    Resume,
    DeepSleep,
}

/// Hardware flags captured on entry to a phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    pub phase: Phase,
    pub command_queue_open: bool,
    pub self_refresh_active: bool,
    pub dll_asserted: bool,
}

/// What the sequencer believes about the hardware during one transition.
///
/// Rebuilt from the live registers at the start of every call, so nothing
/// carries over between transitions except what the hardware itself holds.
#[derive(Clone, Debug)]
pub struct ControllerState {
    pub phase: Phase,
    pub command_queue_open: bool,
    pub self_refresh_active: bool,
    pub dll_asserted: bool,
    pub dll_bypassed: bool,
    pub clock_source: ClockSource,
    pub current_clock_mhz: u32,
    pub ddr_type: Option<DdrType>,
    /// Set once the first register write of the transition has been issued.
    pub mutation_begun: bool,
    history: heapless::Vec<Checkpoint, HISTORY_DEPTH>,
}

impl ControllerState {
    /// Snapshot the hardware. Reads only.
    pub fn observe<IO: RegisterIo>(io: &IO) -> ControllerState {
        let phy = PhyDllController::new(io);
        let clock = ClockSelection::current(io);
        let mut state = ControllerState {
            phase: Phase::Idle,
            command_queue_open: !CommandQueueGate::new(io).is_stalled(),
            self_refresh_active: RefreshController::new(io).in_self_refresh(),
            dll_asserted: phy.dll_reset_asserted(),
            dll_bypassed: phy.dll_bypassed(),
            clock_source: clock.source,
            current_clock_mhz: clock.rate_mhz(),
            ddr_type: None,
            mutation_begun: false,
            history: heapless::Vec::new(),
        };
        state.record();
        state
    }

    /// The supported frequency the EMC clock is running at, if any.
    pub fn current_frequency(&self) -> Option<Frequency> {
        Frequency::from_mhz(self.current_clock_mhz)
    }

    /// Phase checkpoints of the current transition, oldest first.
    pub fn history(&self) -> &[Checkpoint] {
        &self.history
    }

    pub fn phases(&self) -> impl Iterator<Item = Phase> + '_ {
        self.history.iter().map(|checkpoint| checkpoint.phase)
    }

    /// Queue open, DRAM out of self-refresh and DLLs out of reset, with the
    /// bypass setting `dll_mode` asked for.
    pub fn is_canonical(&self, dll_mode: DllMode) -> bool {
        let bypass_ok = match dll_mode {
            DllMode::DisableDll => self.dll_bypassed,
            DllMode::EnableDll => !self.dll_bypassed,
            DllMode::NoSwitch => true,
        };
        self.command_queue_open && !self.self_refresh_active && !self.dll_asserted && bypass_ok
    }

    pub(crate) fn enter(&mut self, phase: Phase) {
        if self.phase == phase {
            return;
        }
        debug!("DFS phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        self.record();
    }

    fn record(&mut self) {
        let checkpoint = Checkpoint {
            phase: self.phase,
            command_queue_open: self.command_queue_open,
            self_refresh_active: self.self_refresh_active,
            dll_asserted: self.dll_asserted,
        };
        if self.history.push(checkpoint).is_err() {
            warn!("DFS phase history full, dropping {:?}", checkpoint.phase);
        }
    }
}

/// Controller registers saved before quiescing, restored on a pre-commit
/// timeout.
#[derive(Clone, Copy, Debug)]
struct QuiesceSnapshot {
    dbg1: u32,
    rfshctl3: u32,
    dfiupd0: u32,
    pwrctl: u32,
}

impl QuiesceSnapshot {
    fn take<IO: RegisterIo>(io: &IO) -> QuiesceSnapshot {
        QuiesceSnapshot {
            dbg1: io.get(UmctlRegisters::DBG1).get(),
            rfshctl3: io.get(UmctlRegisters::RFSHCTL3).get(),
            dfiupd0: io.get(UmctlRegisters::DFIUPD0).get(),
            pwrctl: io.get(UmctlRegisters::PWRCTL).get(),
        }
    }

    /// Rewrite every saved register that no longer holds its saved value,
    /// in reverse order of modification.
    fn restore<IO: RegisterIo>(&self, io: &IO) {
        let saved = [
            (UmctlRegisters::PWRCTL.offset, self.pwrctl),
            (UmctlRegisters::DFIUPD0.offset, self.dfiupd0),
            (UmctlRegisters::RFSHCTL3.offset, self.rfshctl3),
            (UmctlRegisters::DBG1.offset, self.dbg1),
        ];
        for (offset, value) in saved {
            if io.read32(Block::Umctl, offset) != value {
                io.write32(Block::Umctl, offset, value);
            }
        }
    }
}

/// Drives EMC frequency transitions on one DRAM subsystem.
pub struct FrequencySequencer<'a, IO: RegisterIo, D: DelayNs> {
    io: IO,
    delay: D,
    profiles: ProfileTable<'a>,
    switcher: ClockSwitcher,
    config: Config,
    state: ControllerState,
    fatal_faults: u32,
}

impl<'a, IO: RegisterIo, D: DelayNs> FrequencySequencer<'a, IO, D> {
    /// Picks the clock switcher from the hardware capability register and
    /// uses the default [`CONFIG`].
    pub fn new(io: IO, delay: D, profiles: ProfileTable<'a>) -> FrequencySequencer<'a, IO, D> {
        let switcher = ClockSwitcher::detect(&io);
        let state = ControllerState::observe(&io);
        FrequencySequencer {
            io,
            delay,
            profiles,
            switcher,
            config: CONFIG,
            state,
            fatal_faults: 0,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_switcher(mut self, switcher: ClockSwitcher) -> Self {
        self.switcher = switcher;
        self
    }

    pub fn switcher(&self) -> ClockSwitcher {
        self.switcher
    }

    /// State left by the last transition.
    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Number of fatal faults raised since construction.
    pub fn fatal_faults(&self) -> u32 {
        self.fatal_faults
    }

    pub fn io(&self) -> &IO {
        &self.io
    }

    /// Move the EMC clock to the frequency in `request` and reprogram DRAM
    /// timing for it.
    ///
    /// `word` is the caller's packed request word. A request naming the
    /// current frequency runs the full sequence; the caller may rely on it
    /// to re-apply timing or change the DLL mode in place.
    ///
    /// # Errors
    ///
    /// - [`SequenceError::Rejected`] without any register write.
    /// - [`SequenceError::DrainTimeout`] or
    ///   [`SequenceError::SelfRefreshTimeout`] after restoring the registers
    ///   written so far.
    /// - [`SequenceError::Fatal`] when a wait fails after self-refresh entry,
    ///   including the final read-back of the resumed controller. The hardware is left as it was at the failure and needs a reset.
    pub fn run_frequency_transition(&mut self, word: u32) -> Result<(), SequenceError> {
        self.state = ControllerState::observe(&self.io);
        self.state.enter(Phase::Validating);

        let profiles = self.profiles;
        let request = match request::decode_and_validate(word, &profiles) {
            Ok(request) => request,
            Err(rejected) => {
                warn!("DFS request {:#010x} rejected: {}", word, rejected);
                self.state.enter(Phase::Rejected);
                return Err(rejected.into());
            }
        };
        info!(
            "DFS {} MHz -> {} ({:?}, {:?})",
            self.state.current_clock_mhz, request.frequency, request.dll_mode, request.cause
        );
        self.state.ddr_type = Some(request.ddr_type);

        self.quiesce()?;

        if let Err(fault) = self.reconfigure(&request) {
            return Err(self.raise(fault));
        }

        self.resume(request.dll_mode);
        if let Err(cause) = self.confirm_resumed(request.dll_mode) {
            let fault = self.fault(cause);
            return Err(self.raise(fault));
        }
        self.state.enter(Phase::Idle);
        info!("DFS done, EMC at {} MHz", self.state.current_clock_mhz);
        Ok(())
    }

    /// Stall, drain and enter self-refresh. Rolls back on failure.
    fn quiesce(&mut self) -> Result<(), SequenceError> {
        self.state.enter(Phase::Quiescing);
        let snapshot = QuiesceSnapshot::take(&self.io);
        let gate = CommandQueueGate::new(&self.io);
        let refresh = RefreshController::new(&self.io);

        self.state.mutation_begun = true;
        gate.disable_dequeue();
        self.state.command_queue_open = false;
        if let Err(timeout) = gate.wait_drain(&mut self.delay, self.config.drain) {
            self.roll_back(snapshot, timeout);
            return Err(SequenceError::DrainTimeout);
        }

        refresh.disable_auto_refresh();
        gate.disable_dfi_update();
        if let Err(timeout) = refresh.enter_self_refresh(&mut self.delay, self.config.self_refresh)
        {
            self.roll_back(snapshot, timeout);
            return Err(SequenceError::SelfRefreshTimeout);
        }
        self.state.self_refresh_active = true;
        Ok(())
    }

    fn roll_back(&mut self, snapshot: QuiesceSnapshot, cause: WaitTimeout) {
        warn!("DFS {}, restoring controller", cause);
        snapshot.restore(&self.io);
        self.state.command_queue_open = !CommandQueueGate::new(&self.io).is_stalled();
        self.state.self_refresh_active = false;
        self.state.enter(Phase::Idle);
    }

    /// Everything between self-refresh entry and exit. Any failure here is
    /// fatal.
    fn reconfigure(&mut self, request: &ValidatedRequest<'a>) -> Result<(), FatalSequenceFault> {
        if request.dll_mode != DllMode::NoSwitch {
            self.cycle_dll(request.dll_mode);
        }

        self.state.enter(Phase::ClockTransition);
        if request.dll_mode != DllMode::NoSwitch {
            PhyDllController::new(&self.io)
                .request_dll_retrain_and_wait_lock(&mut self.delay, self.config.dll_lock)
                .map_err(|cause| self.fault(cause))?;
        }

        self.switcher
            .change_frequency(
                &self.io,
                &mut self.delay,
                &self.config,
                &mut self.state,
                request.frequency,
                request.cause,
                request.profile,
            )
            .map_err(|cause| self.fault(cause))
    }

    /// Hold the PHY DLLs in reset while the bypass setting changes.
    ///
    /// Disabling gates the reference clock around the bypass change. Enabling
    /// changes bypass first and then pulses the reference clock gate, which
    /// restarts the DLL on the new setting.
    fn cycle_dll(&mut self, dll_mode: DllMode) {
        debug_assert!(self.state.self_refresh_active && !self.state.command_queue_open);
        let phy = PhyDllController::new(&self.io);

        phy.assert_dll_reset();
        self.state.dll_asserted = true;
        match dll_mode {
            DllMode::DisableDll => {
                phy.gate_phy_refclk(false);
                phy.disable_phy_dll();
                phy.gate_phy_refclk(true);
                self.state.dll_bypassed = true;
            }
            DllMode::EnableDll => {
                phy.enable_phy_dll();
                phy.gate_phy_refclk(false);
                phy.gate_phy_refclk(true);
                self.state.dll_bypassed = false;
            }
            DllMode::NoSwitch => {}
        }
        debug_assert!(phy.phy_refclk_enabled());
        phy.release_dll_reset();
        self.state.dll_asserted = false;
    }

    fn resume(&mut self, dll_mode: DllMode) {
        self.state.enter(Phase::Resuming);
        let gate = CommandQueueGate::new(&self.io);
        let refresh = RefreshController::new(&self.io);

        refresh.exit_self_refresh(dll_mode);
        self.state.self_refresh_active = false;
        refresh.manual_autorefresh_pulse();
        refresh.enable_auto_refresh();
        gate.enable_dfi_update();
        gate.enable_dequeue();
        self.state.command_queue_open = true;
    }

    /// Read the controller back until it shows the state `resume` asked for,
    /// then take the state flags from what the hardware reports.
    fn confirm_resumed(&mut self, dll_mode: DllMode) -> Result<(), WaitTimeout> {
        let io = &self.io;
        let confirmed = poll(&mut self.delay, self.config.resume, WaitTimeout::Resume, || {
            ControllerState::observe(io).is_canonical(dll_mode)
        });

        let observed = ControllerState::observe(&self.io);
        self.state.command_queue_open = observed.command_queue_open;
        self.state.self_refresh_active = observed.self_refresh_active;
        self.state.dll_asserted = observed.dll_asserted;
        self.state.dll_bypassed = observed.dll_bypassed;
        confirmed
    }

    fn raise(&mut self, fault: FatalSequenceFault) -> SequenceError {
        self.fatal_faults += 1;
        error!("{}", fault);
        fault.into()
    }

    fn fault(&self, cause: WaitTimeout) -> FatalSequenceFault {
        FatalSequenceFault {
            phase: self.state.phase,
            cause,
            mutation_begun: self.state.mutation_begun,
        }
    }
}
