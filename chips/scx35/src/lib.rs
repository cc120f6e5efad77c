// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! EMC dynamic frequency scaling for the Spreadtrum SCX35 family.
//!
//! The SCX35 DRAM subsystem is a uMCTL DRAM controller paired with a PUBL
//! DDR PHY, clocked from the EMC clock mux in the AON clock block. This crate
//! moves that subsystem from one operating frequency to another while DRAM
//! contents are held in self-refresh:
//!
//! - [`request`] decodes the 32-bit request word handed over by the caller and
//!   validates it against the caller's timing profile table.
//! - [`dfs::FrequencySequencer`] runs the transition state machine.
//! - [`umctl`], [`publ`] and [`emc_clk`] hold the register maps and the
//!   per-block operations the sequencer is assembled from.
//!
//! All hardware access goes through a [`regio::RegisterIo`] handle owned by
//! the sequencer, so tests can run the whole sequence against a simulated
//! register file.

#![cfg_attr(not(test), no_std)]
#![crate_name = "scx35"]
#![crate_type = "rlib"]

pub mod config;
pub mod dfs;
pub mod emc_clk;
pub mod errorcode;
pub mod pmu;
pub mod publ;
pub mod regio;
pub mod request;
pub mod timing;
pub mod umctl;

#[cfg(test)]
mod fake;

pub use crate::dfs::{DllMode, FrequencySequencer, Phase, TransitionCause};
pub use crate::errorcode::{FatalSequenceFault, RejectedRequest, SequenceError, WaitTimeout};
pub use crate::timing::{DdrType, Frequency, ProfileTable, TimingProfile};
