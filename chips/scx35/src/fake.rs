// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! Register-level model of the DRAM subsystem for unit tests.
//!
//! Registers are plain words in a map. A handful react to writes the way the
//! silicon does (self-refresh entry, DLL lock, DFS engine) so the sequencer
//! can be driven end to end, and every write is logged in order.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use embedded_hal::delay::DelayNs;

use crate::regio::{Block, RegisterIo};
use crate::timing::{Frequency, TimingProfile, DATA_LANES, DRAM_TIMING_REGS};

const STAT: (Block, usize) = (Block::Umctl, 0x004);
const PWRCTL: (Block, usize) = (Block::Umctl, 0x030);
const DBGCAM: (Block, usize) = (Block::Umctl, 0x308);
const PIR: (Block, usize) = (Block::Publ, 0x004);
const PGSR: (Block, usize) = (Block::Publ, 0x00C);
const PHY_PWR: (Block, usize) = (Block::Pmu, 0x0D8);
const CLK_CFG: (Block, usize) = (Block::Clk, 0x024);
const DFS_CTRL: (Block, usize) = (Block::Clk, 0x028);
const DFS_STS: (Block, usize) = (Block::Clk, 0x02C);
const DFS_CAP: (Block, usize) = (Block::Clk, 0x030);

const DRAINED: u32 = (1 << 25) | (1 << 26) | (1 << 28) | (1 << 29);
const DLL_RUN: u32 = 1 << 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Write {
    pub block: Block,
    pub offset: usize,
    pub value: u32,
}

impl Write {
    pub fn at(&self, (block, offset): (Block, usize)) -> bool {
        self.block == block && self.offset == offset
    }
}

pub struct FakeDmc {
    regs: RefCell<BTreeMap<(Block, usize), u32>>,
    writes: RefCell<Vec<Write>>,
    reads: RefCell<BTreeMap<(Block, usize), usize>>,
    /// Number of not-drained `DBGCAM` samples before the queues report empty.
    drain_after: Cell<Option<usize>>,
    drain_samples: Cell<usize>,
    self_refresh_stuck: Cell<bool>,
    self_refresh_held: Cell<bool>,
    dll_lock_stuck: Cell<bool>,
    dfs_engine_stuck: Cell<bool>,
    fault: Cell<Option<fn(&Write) -> bool>>,
}

impl FakeDmc {
    /// Out of reset after boot: DRAM running at 192 MHz from TWPLL, DLLs out
    /// of reset and locked, command queue open.
    pub fn new() -> FakeDmc {
        let regs = BTreeMap::from([
            (STAT, 1),
            (PWRCTL, (1 << 5) | (1 << 3)),
            (PGSR, 0b111),
            ((Block::Publ, 0x014), DLL_RUN),
            ((Block::Publ, 0x1CC), DLL_RUN),
            ((Block::Publ, 0x20C), DLL_RUN),
            ((Block::Publ, 0x24C), DLL_RUN),
            (PHY_PWR, 1 << 9),
            (CLK_CFG, 0x0000_0301),
        ]);
        FakeDmc {
            regs: RefCell::new(regs),
            writes: RefCell::new(Vec::new()),
            reads: RefCell::new(BTreeMap::new()),
            drain_after: Cell::new(Some(0)),
            drain_samples: Cell::new(0),
            self_refresh_stuck: Cell::new(false),
            self_refresh_held: Cell::new(false),
            dll_lock_stuck: Cell::new(false),
            dfs_engine_stuck: Cell::new(false),
            fault: Cell::new(None),
        }
    }

    /// Set a register without logging a write.
    pub fn preset(&self, block: Block, offset: usize, value: u32) {
        self.regs.borrow_mut().insert((block, offset), value);
    }

    /// Read a register without counting the access.
    pub fn peek(&self, block: Block, offset: usize) -> u32 {
        self.regs
            .borrow()
            .get(&(block, offset))
            .copied()
            .unwrap_or(0)
    }

    pub fn writes(&self) -> Vec<Write> {
        self.writes.borrow().clone()
    }

    /// Values written to one register, in order.
    pub fn writes_to(&self, block: Block, offset: usize) -> Vec<u32> {
        self.writes
            .borrow()
            .iter()
            .filter(|w| w.at((block, offset)))
            .map(|w| w.value)
            .collect()
    }

    pub fn reads_of(&self, block: Block, offset: usize) -> usize {
        self.reads
            .borrow()
            .get(&(block, offset))
            .copied()
            .unwrap_or(0)
    }

    pub fn clear_log(&self) {
        self.writes.borrow_mut().clear();
        self.reads.borrow_mut().clear();
    }

    pub fn drain_after(&self, samples: usize) {
        self.drain_after.set(Some(samples));
        self.drain_samples.set(0);
    }

    pub fn never_drain(&self) {
        self.drain_after.set(None);
    }

    pub fn stick_self_refresh(&self) {
        self.self_refresh_stuck.set(true);
    }

    /// Enter self-refresh normally but never report leaving it.
    pub fn hold_self_refresh(&self) {
        self.self_refresh_held.set(true);
    }

    pub fn stick_dll_lock(&self) {
        self.dll_lock_stuck.set(true);
    }

    pub fn stick_dfs_engine(&self) {
        self.dfs_engine_stuck.set(true);
    }

    pub fn enable_hw_dfs(&self) {
        self.preset(DFS_CAP.0, DFS_CAP.1, 1);
    }

    /// Panic instead of performing the first write `hit` matches. The write
    /// is neither logged nor applied.
    pub fn fail_on_write(&self, hit: fn(&Write) -> bool) {
        self.fault.set(Some(hit));
    }

    fn react(&self, at: (Block, usize), value: u32) -> u32 {
        match at {
            PWRCTL => {
                let mode = if value & (1 << 5) == 0 {
                    if self.self_refresh_stuck.get() {
                        1
                    } else {
                        3
                    }
                } else if self.self_refresh_held.get() {
                    3
                } else {
                    1
                };
                self.preset(STAT.0, STAT.1, mode);
                value
            }
            PIR if value & 1 == 1 => {
                let done = if self.dll_lock_stuck.get() { 0 } else { 0b111 };
                self.preset(PGSR.0, PGSR.1, done);
                value & !1
            }
            DFS_CTRL if value & 1 == 1 => {
                if self.dfs_engine_stuck.get() {
                    self.preset(DFS_STS.0, DFS_STS.1, 1 << 1);
                } else {
                    let sel = (value >> 4) & 0x3;
                    let div = (value >> 8) & 0x7;
                    self.preset(CLK_CFG.0, CLK_CFG.1, (div << 8) | sel);
                    self.preset(DFS_STS.0, DFS_STS.1, 1);
                }
                value & !1
            }
            DFS_STS => self.peek(DFS_STS.0, DFS_STS.1) & !value,
            _ => value,
        }
    }
}

impl RegisterIo for FakeDmc {
    fn read32(&self, block: Block, offset: usize) -> u32 {
        *self.reads.borrow_mut().entry((block, offset)).or_insert(0) += 1;
        if (block, offset) == DBGCAM {
            let sampled = self.drain_samples.get();
            self.drain_samples.set(sampled + 1);
            return match self.drain_after.get() {
                Some(after) if sampled >= after => DRAINED,
                _ => 0,
            };
        }
        self.peek(block, offset)
    }

    fn write32(&self, block: Block, offset: usize, value: u32) {
        let write = Write {
            block,
            offset,
            value,
        };
        if let Some(hit) = self.fault.get() {
            if hit(&write) {
                self.fault.set(None);
                panic!("injected fault on {:?}", write);
            }
        }
        self.writes.borrow_mut().push(write);
        let stored = self.react((block, offset), value);
        self.preset(block, offset, stored);
    }
}

#[derive(Default)]
pub struct FakeDelay {
    pub total_us: u64,
    pub calls: u32,
}

impl DelayNs for FakeDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_us += u64::from(ns / 1000);
        self.calls += 1;
    }

    fn delay_us(&mut self, us: u32) {
        self.total_us += u64::from(us);
        self.calls += 1;
    }
}

/// A profile whose values identify the frequency, register and lane they
/// belong to.
pub fn profile(frequency: Frequency) -> TimingProfile {
    let mhz = frequency.mhz();
    let mut dram_timing = [0; DRAM_TIMING_REGS];
    for (n, value) in dram_timing.iter_mut().enumerate() {
        *value = (mhz << 16) | 0x0100 | n as u32;
    }
    let mut lane_gcr = [0; DATA_LANES];
    let mut lane_dqstr = [0; DATA_LANES];
    for lane in 0..DATA_LANES {
        lane_gcr[lane] = 0x7C00_0E80 | lane as u32;
        lane_dqstr[lane] = (mhz << 16) | 0xAA00 | lane as u32;
    }
    TimingProfile {
        frequency,
        refresh_timing: (mhz << 16) | 0x0040,
        dram_timing,
        lane_gcr,
        lane_dqstr,
    }
}

/// A complete table in slot order.
pub fn profiles() -> [TimingProfile; 2] {
    [profile(Frequency::Mhz192), profile(Frequency::Mhz332)]
}
