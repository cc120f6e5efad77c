// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! Data structure for storing compile-time configuration of the sequencer.
//!
//! As in the kernel crate, configuration lives in a typed `const` object
//! rather than behind cargo features, so every code path is type-checked no
//! matter which options a board picks. The only cargo feature consumed here
//! is `trace_register_writes`, and it only controls logging.
//!
//! Boards that need different budgets (slower reference clocks, emulators)
//! build their own `Config` and hand it to
//! [`FrequencySequencer::with_config`](crate::dfs::FrequencySequencer::with_config).

/// Bounded busy-wait parameters for one status poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollBudget {
    /// Maximum number of times the status register is sampled.
    pub max_polls: u32,
    /// Delay between two samples, in microseconds.
    pub interval_us: u32,
}

impl PollBudget {
    pub const fn new(max_polls: u32, interval_us: u32) -> PollBudget {
        PollBudget {
            max_polls,
            interval_us,
        }
    }
}

/// Data structure holding the sequencer configuration options.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Budget for the command queue and data pipelines to drain after
    /// dequeue has been stalled.
    pub drain: PollBudget,

    /// Budget for the controller to report self-refresh after the software
    /// request.
    pub self_refresh: PollBudget,

    /// Budget for the PHY to report DLL lock after a retrain request.
    ///
    /// The PHY lock status is sampled by a single bounded wait. Older
    /// firmware sampled the bit twice in a row without any state change in
    /// between; that second sample is not reproduced.
    pub dll_lock: PollBudget,

    /// Budget for the hardware DFS engine to report completion.
    pub dfs_done: PollBudget,

    /// Budget for the controller to read back as running normally once the
    /// resume writes are done.
    pub resume: PollBudget,

    /// Settling delay after each divider step of a stepped clock ramp, in
    /// microseconds.
    pub ramp_step_delay_us: u32,

    /// Divisor change applied per ramp step.
    pub divider_step: u32,

    /// Whether every register write is logged at `trace` level.
    ///
    /// Useful on bring-up boards with a UART that survives the transition.
    /// Off by default: the log sink may itself live in DRAM.
    pub trace_register_writes: bool,
}

/// The default configuration, tuned for a 26 MHz reference and the SCX35
/// EMC clock plan.
pub const CONFIG: Config = Config {
    drain: PollBudget::new(10_000, 1),
    self_refresh: PollBudget::new(10_000, 1),
    dll_lock: PollBudget::new(10_000, 1),
    dfs_done: PollBudget::new(10_000, 1),
    resume: PollBudget::new(10_000, 1),
    ramp_step_delay_us: 10,
    divider_step: 1,
    trace_register_writes: cfg!(feature = "trace_register_writes"),
};
