// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! PUBL DDR PHY: DLL reset, bypass and lock, and per-lane timing.

use embedded_hal::delay::DelayNs;
use tock_registers::register_bitfields;

use crate::config::PollBudget;
use crate::errorcode::WaitTimeout;
use crate::pmu::{PmuRegisters, DDR_PHY_PWR_CTRL};
use crate::regio::{poll, Block, Reg, RegisterIo};
use crate::timing::{TimingProfile, DATA_LANES};

/// Distance between consecutive `DXn` lane register groups.
pub const LANE_STRIDE: usize = 0x40;

register_bitfields![u32,
    pub PIR [
        /// Start the steps selected in the same write; self-clearing
        INIT OFFSET(0) NUMBITS(1) [],
        DLLSRST OFFSET(1) NUMBITS(1) [],
        DLLLOCK OFFSET(2) NUMBITS(1) [],
        ZCAL OFFSET(3) NUMBITS(1) [],
        ITMSRST OFFSET(4) NUMBITS(1) [],
        DRAMRST OFFSET(5) NUMBITS(1) [],
        DRAMINIT OFFSET(6) NUMBITS(1) [],
        QSTRN OFFSET(7) NUMBITS(1) [],
        /// Run all PHY DLLs in bypass
        DLLBYP OFFSET(17) NUMBITS(1) []
    ],
    pub PGSR [
        IDONE OFFSET(0) NUMBITS(1) [],
        DLDONE OFFSET(1) NUMBITS(1) [],
        ZCDONE OFFSET(2) NUMBITS(1) [],
        DIDONE OFFSET(3) NUMBITS(1) [],
        DTDONE OFFSET(4) NUMBITS(1) []
    ],
    pub DLLCR [
        /// Soft reset, active low
        DLLSRST OFFSET(30) NUMBITS(1) [],
        DLLDIS OFFSET(31) NUMBITS(1) []
    ],
    pub DSGCR [
        /// Power down the I/Os when the DFI clock is stopped
        LPIOPD OFFSET(3) NUMBITS(1) [],
        /// Power down the DLLs when the DFI clock is stopped
        LPDLLPD OFFSET(4) NUMBITS(1) []
    ]
];

/// PUBL register offsets.
pub struct PublRegisters;

impl PublRegisters {
    /// PHY Initialization Register
    pub const PIR: Reg<PIR::Register> = Reg::new(Block::Publ, 0x004);
    /// PHY General Status Register
    pub const PGSR: Reg<PGSR::Register> = Reg::new(Block::Publ, 0x00C);
    /// Address/Command DLL Control Register
    pub const ACDLLCR: Reg<DLLCR::Register> = Reg::new(Block::Publ, 0x014);
    /// DDR System General Configuration Register
    pub const DSGCR: Reg<DSGCR::Register> = Reg::new(Block::Publ, 0x02C);
    /// DATX8 0 General Configuration Register
    pub const DX0GCR: Reg = Reg::new(Block::Publ, 0x1C0);
    /// DATX8 0 DLL Control Register
    pub const DX0DLLCR: Reg<DLLCR::Register> = Reg::new(Block::Publ, 0x1CC);
    /// DATX8 0 DQS Timing Register
    pub const DX0DQSTR: Reg = Reg::new(Block::Publ, 0x1D4);

    /// The address/command DLL followed by the data lane DLLs.
    pub const DLL_CONTROL: [Reg<DLLCR::Register>; 1 + DATA_LANES] = [
        PublRegisters::ACDLLCR,
        PublRegisters::DX0DLLCR,
        PublRegisters::DX0DLLCR.nth(1, LANE_STRIDE),
        PublRegisters::DX0DLLCR.nth(2, LANE_STRIDE),
    ];
}

pub struct PhyDllController<'a, IO: RegisterIo> {
    io: &'a IO,
}

impl<'a, IO: RegisterIo> PhyDllController<'a, IO> {
    pub const fn new(io: &'a IO) -> PhyDllController<'a, IO> {
        PhyDllController { io }
    }

    /// Hold every PHY DLL in soft reset. Only valid while DRAM is in
    /// self-refresh.
    pub fn assert_dll_reset(&self) {
        for reg in PublRegisters::DLL_CONTROL {
            self.io.modify(reg, DLLCR::DLLSRST::CLEAR);
        }
    }

    pub fn release_dll_reset(&self) {
        for reg in PublRegisters::DLL_CONTROL {
            self.io.modify(reg, DLLCR::DLLSRST::SET);
        }
    }

    /// Any DLL still held in reset.
    pub fn dll_reset_asserted(&self) -> bool {
        PublRegisters::DLL_CONTROL
            .iter()
            .any(|reg| !self.io.is_set(*reg, DLLCR::DLLSRST))
    }

    /// Switch the PHY to DLL bypass.
    pub fn disable_phy_dll(&self) {
        self.io.modify(PublRegisters::PIR, PIR::DLLBYP::SET);
    }

    pub fn enable_phy_dll(&self) {
        self.io.modify(PublRegisters::PIR, PIR::DLLBYP::CLEAR);
    }

    pub fn dll_bypassed(&self) -> bool {
        self.io.is_set(PublRegisters::PIR, PIR::DLLBYP)
    }

    /// Kick a DLL lock and impedance calibration and wait for the lock flag.
    ///
    /// The bypass bit and any other `PIR` configuration are preserved.
    pub fn request_dll_retrain_and_wait_lock<D: DelayNs>(
        &self,
        delay: &mut D,
        budget: PollBudget,
    ) -> Result<(), WaitTimeout> {
        self.io.modify(
            PublRegisters::PIR,
            PIR::INIT::SET + PIR::DLLLOCK::SET + PIR::ZCAL::SET,
        );
        poll(delay, budget, WaitTimeout::DllLock, || {
            self.io.is_set(PublRegisters::PGSR, PGSR::DLDONE)
        })
    }

    /// Gate or ungate the PHY reference clock in the PMU.
    pub fn gate_phy_refclk(&self, enable: bool) {
        self.io.modify(
            PmuRegisters::DDR_PHY_PWR_CTRL,
            DDR_PHY_PWR_CTRL::PHY_REFCLK_EN.val(u32::from(enable)),
        );
    }

    pub fn phy_refclk_enabled(&self) -> bool {
        self.io
            .is_set(PmuRegisters::DDR_PHY_PWR_CTRL, DDR_PHY_PWR_CTRL::PHY_REFCLK_EN)
    }

    /// Write the per-lane general configuration and DQS timing from
    /// `profile`.
    pub fn program_lane_timing(&self, profile: &TimingProfile) {
        for lane in 0..DATA_LANES {
            self.io.set(
                PublRegisters::DX0GCR.nth(lane, LANE_STRIDE),
                profile.lane_gcr[lane],
            );
            self.io.set(
                PublRegisters::DX0DQSTR.nth(lane, LANE_STRIDE),
                profile.lane_dqstr[lane],
            );
        }
    }
}
