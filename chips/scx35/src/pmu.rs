// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! Power management unit registers used during a transition.

use tock_registers::register_bitfields;

use crate::regio::{Block, Reg};

register_bitfields![u32,
    pub DDR_PHY_PWR_CTRL [
        /// Reference clock to the DDR PHY; must be gated around a DLL
        /// bypass change
        PHY_REFCLK_EN OFFSET(9) NUMBITS(1) []
    ]
];

pub struct PmuRegisters;

impl PmuRegisters {
    pub const DDR_PHY_PWR_CTRL: Reg<DDR_PHY_PWR_CTRL::Register> = Reg::new(Block::Pmu, 0x0D8);
}
