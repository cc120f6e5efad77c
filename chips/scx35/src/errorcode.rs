// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! Error types for frequency transitions.
//!
//! Errors fall in three groups, and callers must treat them differently:
//!
//! - [`RejectedRequest`]: the request word or the profile table was wrong.
//!   Nothing was written to the hardware; the request may be retried once the
//!   input is fixed.
//! - [`SequenceError::DrainTimeout`] / [`SequenceError::SelfRefreshTimeout`]:
//!   the controller did not quiesce. Every register touched so far has been
//!   restored and DRAM is still running at the old frequency.
//! - [`SequenceError::Fatal`]: a wait failed after the controller had been
//!   committed to self-refresh. The memory subsystem is in an undefined
//!   mixed-frequency state and only a platform reset recovers it.

use core::fmt;

use crate::dfs::Phase;
use crate::timing::Frequency;

/// A bounded wait that ran out of budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitTimeout {
    /// Command queue and data pipelines did not drain.
    Drain,
    /// Controller did not report self-refresh.
    SelfRefresh,
    /// PHY DLL did not report lock.
    DllLock,
    /// Hardware DFS engine did not report completion.
    DfsDone,
    /// Controller did not come back to normal operation with auto-refresh on
    /// after the resume steps.
    Resume,
}

impl fmt::Display for WaitTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drain => write!(f, "command queue drain timed out"),
            Self::SelfRefresh => write!(f, "self-refresh entry timed out"),
            Self::DllLock => write!(f, "PHY DLL lock timed out"),
            Self::DfsDone => write!(f, "hardware DFS completion timed out"),
            Self::Resume => write!(f, "controller did not return to normal operation"),
        }
    }
}

/// Why a request was refused before any register was written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectedRequest {
    /// Bits above the defined request fields were set.
    ReservedBitsSet(u32),
    UnknownDdrType(u32),
    UnknownDllMode(u32),
    UnknownCause(u32),
    /// The requested clock is not one of the supported frequencies.
    UnsupportedFrequency(u32),
    /// The profile table has no entry for the requested frequency.
    MissingProfile(Frequency),
    /// The profile table entry was generated for another frequency.
    ProfileMismatch {
        requested: Frequency,
        profile: Frequency,
    },
}

impl fmt::Display for RejectedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReservedBitsSet(bits) => write!(f, "reserved request bits set: {:#x}", bits),
            Self::UnknownDdrType(code) => write!(f, "unknown DDR type {}", code),
            Self::UnknownDllMode(code) => write!(f, "unknown DLL mode {}", code),
            Self::UnknownCause(code) => write!(f, "unknown transition cause {}", code),
            Self::UnsupportedFrequency(mhz) => write!(f, "unsupported EMC clock {} MHz", mhz),
            Self::MissingProfile(freq) => write!(f, "no timing profile for {}", freq),
            Self::ProfileMismatch { requested, profile } => write!(
                f,
                "timing profile mismatch: requested {}, profile built for {}",
                requested, profile
            ),
        }
    }
}

/// A wait failed after the hardware was committed to the transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FatalSequenceFault {
    /// Phase the sequencer was in when the wait failed.
    pub phase: Phase,
    pub cause: WaitTimeout,
    /// Whether any register had been written when the fault was raised.
    pub mutation_begun: bool,
}

impl fmt::Display for FatalSequenceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fatal DFS fault in {:?}: {}{}",
            self.phase,
            self.cause,
            if self.mutation_begun {
                " (hardware modified)"
            } else {
                ""
            }
        )
    }
}

/// Result of [`FrequencySequencer::run_frequency_transition`](crate::dfs::FrequencySequencer::run_frequency_transition).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequenceError {
    Rejected(RejectedRequest),
    /// Rolled back before commit; DRAM still runs at the old frequency.
    DrainTimeout,
    /// Rolled back before commit; DRAM still runs at the old frequency.
    SelfRefreshTimeout,
    /// DLL lock wait failed before any register was written, so the caller
    /// may retry. Reserved for a lock check ahead of quiesce; the sequencer
    /// only waits for lock after self-refresh entry today, so inside a
    /// transition a lock timeout is always reported as `Fatal`.
    DllLockTimeout,
    Fatal(FatalSequenceFault),
}

impl SequenceError {
    /// Whether the platform must be reset.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SequenceError::Fatal(_))
    }
}

impl From<RejectedRequest> for SequenceError {
    fn from(err: RejectedRequest) -> SequenceError {
        SequenceError::Rejected(err)
    }
}

impl From<FatalSequenceFault> for SequenceError {
    fn from(fault: FatalSequenceFault) -> SequenceError {
        SequenceError::Fatal(fault)
    }
}

impl fmt::Display for SequenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(err) => write!(f, "request rejected: {}", err),
            Self::DrainTimeout => write!(f, "{} (rolled back)", WaitTimeout::Drain),
            Self::SelfRefreshTimeout => write!(f, "{} (rolled back)", WaitTimeout::SelfRefresh),
            Self::DllLockTimeout => write!(f, "{}", WaitTimeout::DllLock),
            Self::Fatal(fault) => fault.fmt(f),
        }
    }
}
