// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! Typed access to the DRAM subsystem register blocks.
//!
//! The sequencer never touches a physical address directly. Every access goes
//! through a [`RegisterIo`] handle, addressed by [`Block`] and byte offset.
//! Register maps in the other modules name their registers as [`Reg`]
//! constants carrying a `register_bitfields!` long name, so field accesses are
//! type-checked exactly like `ReadWrite<u32, R>` fields in a register struct.

use core::marker::PhantomData;

use embedded_hal::delay::DelayNs;
use log::trace;
use tock_registers::fields::{Field, FieldValue};
use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::registers::ReadWrite;
use tock_registers::{LocalRegisterCopy, RegisterLongName};

use crate::config::{PollBudget, CONFIG};
use crate::errorcode::WaitTimeout;

/// The register blocks taking part in a frequency transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Block {
    /// uMCTL DRAM controller.
    Umctl,
    /// PUBL DDR PHY utility block.
    Publ,
    /// Power management unit (PHY reference clock gate).
    Pmu,
    /// AON clock controller (EMC clock mux, DFS engine).
    Clk,
}

/// Physical base addresses of the four register blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlatformMap {
    pub umctl: usize,
    pub publ: usize,
    pub pmu: usize,
    pub clk: usize,
}

impl PlatformMap {
    pub const fn base(&self, block: Block) -> usize {
        match block {
            Block::Umctl => self.umctl,
            Block::Publ => self.publ,
            Block::Pmu => self.pmu,
            Block::Clk => self.clk,
        }
    }
}

/// SC7715/SC8830 address map.
pub const SCX35: PlatformMap = PlatformMap {
    umctl: 0x3000_0000,
    publ: 0x3001_0000,
    pmu: 0x402B_0000,
    clk: 0x402D_0000,
};

/// A 32-bit register at a fixed offset inside one block.
///
/// `R` is the long name generated by `register_bitfields!`, or `()` for
/// registers written as raw values.
pub struct Reg<R: RegisterLongName = ()> {
    pub block: Block,
    pub offset: usize,
    associated_register: PhantomData<R>,
}

impl<R: RegisterLongName> Reg<R> {
    pub const fn new(block: Block, offset: usize) -> Reg<R> {
        Reg {
            block,
            offset,
            associated_register: PhantomData,
        }
    }

    /// The same register `stride * index` bytes further into the block, for
    /// per-lane register arrays.
    pub const fn nth(self, index: usize, stride: usize) -> Reg<R> {
        Reg::new(self.block, self.offset + index * stride)
    }
}

impl<R: RegisterLongName> Clone for Reg<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R: RegisterLongName> Copy for Reg<R> {}

impl<R: RegisterLongName> core::fmt::Debug for Reg<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}+{:#05x}", self.block, self.offset)
    }
}

/// Read/modify/write access to the register blocks.
///
/// Implementations must perform every access as an uncached, unreordered
/// access to the device: two writes issued in program order reach the
/// hardware in that order, and no access is elided or merged. There is no
/// error path; a failed bus access is a hardware fault outside the scope of
/// the sequencer.
pub trait RegisterIo {
    fn read32(&self, block: Block, offset: usize) -> u32;

    fn write32(&self, block: Block, offset: usize, value: u32);

    /// Replace `width` bits starting at bit `shift` with the low bits of
    /// `value`, leaving the rest of the register untouched.
    fn set_bits(&self, block: Block, offset: usize, shift: u32, width: u32, value: u32) {
        let mask = if width >= 32 {
            u32::MAX
        } else {
            (1 << width) - 1
        };
        let old = self.read32(block, offset);
        let cleared = old & !mask.checked_shl(shift).unwrap_or(0);
        self.write32(
            block,
            offset,
            cleared | (value & mask).checked_shl(shift).unwrap_or(0),
        );
    }

    fn get<R: RegisterLongName>(&self, reg: Reg<R>) -> LocalRegisterCopy<u32, R> {
        LocalRegisterCopy::new(self.read32(reg.block, reg.offset))
    }

    fn set<R: RegisterLongName>(&self, reg: Reg<R>, value: u32) {
        self.write32(reg.block, reg.offset, value);
    }

    fn read_field<R: RegisterLongName>(&self, reg: Reg<R>, field: Field<u32, R>) -> u32 {
        field.read(self.read32(reg.block, reg.offset))
    }

    fn is_set<R: RegisterLongName>(&self, reg: Reg<R>, field: Field<u32, R>) -> bool {
        field.is_set(self.read32(reg.block, reg.offset))
    }

    /// Write the whole register; fields not named in `value` become zero.
    fn write<R: RegisterLongName>(&self, reg: Reg<R>, value: FieldValue<u32, R>) {
        self.write32(reg.block, reg.offset, value.value);
    }

    fn modify<R: RegisterLongName>(&self, reg: Reg<R>, value: FieldValue<u32, R>) {
        let old = self.read32(reg.block, reg.offset);
        self.write32(reg.block, reg.offset, value.modify(old));
    }

    /// Invert `field` with a single read-XOR-write.
    ///
    /// Some controller inputs are edge sensitive: the hardware reacts to the
    /// bit changing, not to its value, so the bit must be flipped and never
    /// written to a fixed level.
    fn toggle<R: RegisterLongName>(&self, reg: Reg<R>, field: Field<u32, R>) {
        let old = self.read32(reg.block, reg.offset);
        self.write32(reg.block, reg.offset, old ^ (field.mask << field.shift));
    }
}

/// Sample `done` until it holds, at most `budget.max_polls` times, waiting
/// `budget.interval_us` between samples. Returns `timeout` when the budget is
/// spent.
///
/// The first sample is taken before any delay, so a condition that already
/// holds costs exactly one register read.
pub fn poll<D: DelayNs>(
    delay: &mut D,
    budget: PollBudget,
    timeout: WaitTimeout,
    mut done: impl FnMut() -> bool,
) -> Result<(), WaitTimeout> {
    for sample in 0..budget.max_polls {
        if done() {
            return Ok(());
        }
        if sample + 1 < budget.max_polls {
            delay.delay_us(budget.interval_us);
        }
    }
    Err(timeout)
}

/// [`RegisterIo`] over the real memory-mapped blocks.
pub struct MmioRegisterIo {
    map: PlatformMap,
    trace: bool,
}

impl MmioRegisterIo {
    /// # Safety
    ///
    /// `map` must describe the DRAM subsystem of the running SoC, and the
    /// returned handle must be the only code touching those blocks for as
    /// long as it is alive. The caller runs with interrupts off and with the
    /// MMU and caches disabled, so these addresses are physical and uncached.
    pub const unsafe fn new(map: PlatformMap) -> MmioRegisterIo {
        MmioRegisterIo {
            map,
            trace: CONFIG.trace_register_writes,
        }
    }

    /// Override `trace_register_writes` for this handle.
    pub fn set_tracing(&mut self, trace: bool) {
        self.trace = trace;
    }

    fn register(&self, block: Block, offset: usize) -> &ReadWrite<u32> {
        // Safety: `new` requires `map` to point at the device, and every
        // offset used by this crate lies inside its block.
        unsafe { &*((self.map.base(block) + offset) as *const ReadWrite<u32>) }
    }
}

impl RegisterIo for MmioRegisterIo {
    fn read32(&self, block: Block, offset: usize) -> u32 {
        self.register(block, offset).get()
    }

    fn write32(&self, block: Block, offset: usize, value: u32) {
        if self.trace {
            trace!("{:?}+{:#05x} <= {:#010x}", block, offset, value);
        }
        self.register(block, offset).set(value);
    }
}
