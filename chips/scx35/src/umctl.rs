// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! uMCTL DRAM controller: refresh control and command queue gating.

use embedded_hal::delay::DelayNs;
use tock_registers::fields::FieldValue;
use tock_registers::register_bitfields;

use crate::config::PollBudget;
use crate::dfs::DllMode;
use crate::errorcode::WaitTimeout;
use crate::publ::{PublRegisters, DSGCR};
use crate::regio::{poll, Block, Reg, RegisterIo};
use crate::timing::TimingProfile;

/// Distance between the active timing registers and the shadow set loaded by
/// the hardware DFS engine.
pub const SHADOW_BANK_OFFSET: usize = 0x2000;

register_bitfields![u32,
    pub STAT [
        OPERATING_MODE OFFSET(0) NUMBITS(3) [
            Init = 0,
            Normal = 1,
            PowerDown = 2,
            SelfRefresh = 3
        ]
    ],
    pub PWRCTL [
        /// Enter self-refresh automatically after the idle timeout
        SELFREF_EN OFFSET(0) NUMBITS(1) [],
        POWERDOWN_EN OFFSET(1) NUMBITS(1) [],
        /// Allow the DFI DRAM clock to stop while in self-refresh/power-down
        EN_DFI_DRAM_CLK_DISABLE OFFSET(3) NUMBITS(1) [],
        /// Software active request; clearing it requests self-refresh
        ACTIVE OFFSET(5) NUMBITS(1) []
    ],
    pub RFSHCTL3 [
        DIS_AUTO_REFRESH OFFSET(0) NUMBITS(1) [],
        /// Toggled to make the controller latch new refresh timing
        REFRESH_UPDATE_LEVEL OFFSET(1) NUMBITS(1) [],
        /// Manual refresh request, sampled on its rising edge
        REFRESH_REQ OFFSET(4) NUMBITS(1) [],
        /// Must differ between the two writes of a refresh request
        REFRESH_ACK OFFSET(5) NUMBITS(1) []
    ],
    pub DFIUPD0 [
        DIS_AUTO_CTRLUPD OFFSET(31) NUMBITS(1) []
    ],
    pub DBG1 [
        /// Stall dequeuing of commands from the CAM
        DIS_DQ OFFSET(0) NUMBITS(1) [],
        DIS_HIF OFFSET(1) NUMBITS(1) []
    ],
    pub DBGCAM [
        DBG_RD_Q_EMPTY OFFSET(25) NUMBITS(1) [],
        DBG_WR_Q_EMPTY OFFSET(26) NUMBITS(1) [],
        RD_DATA_PIPELINE_EMPTY OFFSET(28) NUMBITS(1) [],
        WR_DATA_PIPELINE_EMPTY OFFSET(29) NUMBITS(1) []
    ]
];

/// uMCTL register offsets.
pub struct UmctlRegisters;

impl UmctlRegisters {
    /// Operating Mode Status Register
    pub const STAT: Reg<STAT::Register> = Reg::new(Block::Umctl, 0x004);
    /// Low Power Control Register
    pub const PWRCTL: Reg<PWRCTL::Register> = Reg::new(Block::Umctl, 0x030);
    /// Refresh Control Register 3
    pub const RFSHCTL3: Reg<RFSHCTL3::Register> = Reg::new(Block::Umctl, 0x060);
    /// Refresh Timing Register
    pub const RFSHTMG: Reg = Reg::new(Block::Umctl, 0x064);
    /// SDRAM Timing Register 0; DRAMTMG1..8 follow at 4-byte stride
    pub const DRAMTMG0: Reg = Reg::new(Block::Umctl, 0x100);
    /// DFI Update Register 0
    pub const DFIUPD0: Reg<DFIUPD0::Register> = Reg::new(Block::Umctl, 0x1A0);
    /// Debug Register 1
    pub const DBG1: Reg<DBG1::Register> = Reg::new(Block::Umctl, 0x304);
    /// CAM Debug Register
    pub const DBGCAM: Reg<DBGCAM::Register> = Reg::new(Block::Umctl, 0x308);
}

/// Which copy of the controller timing registers to program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimingBank {
    /// The registers the controller is running on.
    Active,
    /// The set the hardware DFS engine swaps in at the switch point.
    Shadow,
}

impl TimingBank {
    const fn locate(self, reg: Reg) -> Reg {
        match self {
            TimingBank::Active => reg,
            TimingBank::Shadow => reg.nth(1, SHADOW_BANK_OFFSET),
        }
    }
}

/// Write `DRAMTMG0..8` from `profile` into `bank`.
pub fn program_dram_timing<IO: RegisterIo>(io: &IO, profile: &TimingProfile, bank: TimingBank) {
    for (n, value) in profile.dram_timing.iter().enumerate() {
        io.set(bank.locate(UmctlRegisters::DRAMTMG0.nth(n, 4)), *value);
    }
}

/// Write the refresh timing into the shadow set. The active set goes through
/// [`RefreshController::program_refresh_timing`].
pub fn program_shadow_refresh_timing<IO: RegisterIo>(io: &IO, profile: &TimingProfile) {
    io.set(
        TimingBank::Shadow.locate(UmctlRegisters::RFSHTMG),
        profile.refresh_timing,
    );
}

/// Self-refresh entry/exit and refresh timing.
pub struct RefreshController<'a, IO: RegisterIo> {
    io: &'a IO,
}

impl<'a, IO: RegisterIo> RefreshController<'a, IO> {
    pub const fn new(io: &'a IO) -> RefreshController<'a, IO> {
        RefreshController { io }
    }

    pub fn in_self_refresh(&self) -> bool {
        self.io
            .get(UmctlRegisters::STAT)
            .matches_all(STAT::OPERATING_MODE::SelfRefresh)
    }

    /// Drop the software active request and wait for the controller to report
    /// self-refresh.
    pub fn enter_self_refresh<D: DelayNs>(
        &self,
        delay: &mut D,
        budget: PollBudget,
    ) -> Result<(), WaitTimeout> {
        self.io
            .modify(UmctlRegisters::PWRCTL, PWRCTL::ACTIVE::CLEAR);
        poll(delay, budget, WaitTimeout::SelfRefresh, || {
            self.in_self_refresh()
        })
    }

    /// Leave self-refresh with the low-power policy matching `dll_mode`.
    ///
    /// With the DLL bypassed the DRAM clock must keep running: the PHY
    /// low-power-on-clock-stop bits are cleared first, then the controller is
    /// told to leave self-refresh with DFI clock stop disabled. In the other
    /// modes only self-refresh is disabled and clock stop stays allowed.
    pub fn exit_self_refresh(&self, dll_mode: DllMode) {
        match dll_mode {
            DllMode::DisableDll => {
                self.io.modify(
                    PublRegisters::DSGCR,
                    DSGCR::LPIOPD::CLEAR + DSGCR::LPDLLPD::CLEAR,
                );
                self.io.write(UmctlRegisters::PWRCTL, PWRCTL::ACTIVE::SET);
            }
            DllMode::EnableDll | DllMode::NoSwitch => {
                self.io.write(
                    UmctlRegisters::PWRCTL,
                    PWRCTL::ACTIVE::SET + PWRCTL::EN_DFI_DRAM_CLK_DISABLE::SET,
                );
            }
        }
    }

    pub fn disable_auto_refresh(&self) {
        self.io
            .modify(UmctlRegisters::RFSHCTL3, RFSHCTL3::DIS_AUTO_REFRESH::SET);
    }

    pub fn enable_auto_refresh(&self) {
        self.io
            .modify(UmctlRegisters::RFSHCTL3, RFSHCTL3::DIS_AUTO_REFRESH::CLEAR);
    }

    /// Issue one manual auto-refresh burst.
    ///
    /// The request bit is sampled on its rising edge and the acknowledge bit
    /// has to change on both writes, so this is always a pair of writes:
    /// request raised with ack inverted, then request dropped with ack
    /// inverted again.
    pub fn manual_autorefresh_pulse(&self) {
        let current = self.io.get(UmctlRegisters::RFSHCTL3);
        let ack = u32::from(current.is_set(RFSHCTL3::REFRESH_ACK));

        let raise = RFSHCTL3::REFRESH_REQ::SET + RFSHCTL3::REFRESH_ACK.val(ack ^ 1);
        let raised = raise.modify(current.get());
        self.io.set(UmctlRegisters::RFSHCTL3, raised);

        let drop = RFSHCTL3::REFRESH_REQ::CLEAR + RFSHCTL3::REFRESH_ACK.val(ack);
        self.io.set(UmctlRegisters::RFSHCTL3, drop.modify(raised));
    }

    /// Load a new refresh interval and signal the change to the controller.
    ///
    /// Dequeue is stalled around the update. If the caller already holds the
    /// queue stalled it stays stalled afterwards.
    pub fn program_refresh_timing(&self, profile: &TimingProfile) {
        let gate = CommandQueueGate::new(self.io);
        let already_stalled = gate.is_stalled();
        if !already_stalled {
            gate.disable_dequeue();
        }

        self.io.set(UmctlRegisters::RFSHTMG, profile.refresh_timing);
        self.io
            .toggle(UmctlRegisters::RFSHCTL3, RFSHCTL3::REFRESH_UPDATE_LEVEL);

        if !already_stalled {
            gate.enable_dequeue();
        }
    }
}

/// Stalls and drains the controller command queue.
pub struct CommandQueueGate<'a, IO: RegisterIo> {
    io: &'a IO,
}

impl<'a, IO: RegisterIo> CommandQueueGate<'a, IO> {
    pub const fn new(io: &'a IO) -> CommandQueueGate<'a, IO> {
        CommandQueueGate { io }
    }

    pub fn disable_dequeue(&self) {
        self.io.modify(UmctlRegisters::DBG1, DBG1::DIS_DQ::SET);
    }

    pub fn enable_dequeue(&self) {
        self.io.modify(UmctlRegisters::DBG1, DBG1::DIS_DQ::CLEAR);
    }

    pub fn is_stalled(&self) -> bool {
        self.io.is_set(UmctlRegisters::DBG1, DBG1::DIS_DQ)
    }

    fn drained() -> FieldValue<u32, DBGCAM::Register> {
        DBGCAM::DBG_RD_Q_EMPTY::SET
            + DBGCAM::DBG_WR_Q_EMPTY::SET
            + DBGCAM::RD_DATA_PIPELINE_EMPTY::SET
            + DBGCAM::WR_DATA_PIPELINE_EMPTY::SET
    }

    /// Both CAM queues and both data pipelines are empty.
    pub fn is_drained(&self) -> bool {
        self.io
            .get(UmctlRegisters::DBGCAM)
            .matches_all(Self::drained())
    }

    /// Wait for in-flight commands to leave the controller after
    /// [`disable_dequeue`](Self::disable_dequeue).
    pub fn wait_drain<D: DelayNs>(
        &self,
        delay: &mut D,
        budget: PollBudget,
    ) -> Result<(), WaitTimeout> {
        poll(delay, budget, WaitTimeout::Drain, || self.is_drained())
    }

    /// Stop controller-initiated DFI updates so the PHY is not retrained
    /// behind the sequencer's back.
    pub fn disable_dfi_update(&self) {
        self.io
            .modify(UmctlRegisters::DFIUPD0, DFIUPD0::DIS_AUTO_CTRLUPD::SET);
    }

    pub fn enable_dfi_update(&self) {
        self.io
            .modify(UmctlRegisters::DFIUPD0, DFIUPD0::DIS_AUTO_CTRLUPD::CLEAR);
    }
}
