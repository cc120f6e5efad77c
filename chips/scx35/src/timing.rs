// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! Supported EMC frequencies and the timing profiles generated for them.
//!
//! Profiles are produced offline (or by the boot-time training code) and
//! handed to the sequencer as a read-only table. The sequencer never computes
//! timing values itself.

use core::fmt;

/// Number of PHY data lanes with their own DLL, GCR and DQS training
/// registers.
pub const DATA_LANES: usize = 3;

/// Number of `DRAMTMGn` registers programmed per profile.
pub const DRAM_TIMING_REGS: usize = 9;

/// EMC clock frequencies the sequencer can switch between.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Frequency {
    Mhz192,
    Mhz332,
}

impl Frequency {
    pub const ALL: [Frequency; 2] = [Frequency::Mhz192, Frequency::Mhz332];

    pub const fn mhz(self) -> u32 {
        match self {
            Frequency::Mhz192 => 192,
            Frequency::Mhz332 => 332,
        }
    }

    pub const fn from_mhz(mhz: u32) -> Option<Frequency> {
        match mhz {
            192 => Some(Frequency::Mhz192),
            332 => Some(Frequency::Mhz332),
            _ => None,
        }
    }

    /// Position of this frequency's profile in a [`ProfileTable`].
    pub const fn slot(self) -> usize {
        match self {
            Frequency::Mhz192 => 0,
            Frequency::Mhz332 => 1,
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} MHz", self.mhz())
    }
}

/// DRAM device generation, as reported by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DdrType {
    Lpddr1,
    Lpddr2,
    Ddr3,
}

/// Register values for one frequency.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimingProfile {
    /// The frequency these values were generated for.
    pub frequency: Frequency,
    /// `RFSHTMG`: tRFC(min) and the refresh interval.
    pub refresh_timing: u32,
    /// `DRAMTMG0` through `DRAMTMG8`, in register order.
    pub dram_timing: [u32; DRAM_TIMING_REGS],
    /// `DXnGCR` per data lane.
    pub lane_gcr: [u32; DATA_LANES],
    /// `DXnDQSTR` per data lane.
    pub lane_dqstr: [u32; DATA_LANES],
}

/// The caller's profile table, one slot per [`Frequency`] in
/// [`Frequency::slot`] order.
///
/// The table is only ever borrowed; nothing is copied out of it during a
/// transition.
#[derive(Clone, Copy, Debug)]
pub struct ProfileTable<'a> {
    profiles: &'a [TimingProfile],
}

impl<'a> ProfileTable<'a> {
    pub const fn new(profiles: &'a [TimingProfile]) -> ProfileTable<'a> {
        ProfileTable { profiles }
    }

    /// The profile stored in `frequency`'s slot, whatever frequency it was
    /// generated for. Checking that it matches is the caller's job.
    pub fn slot(&self, frequency: Frequency) -> Option<&'a TimingProfile> {
        self.profiles.get(frequency.slot())
    }
}
