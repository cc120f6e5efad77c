// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! EMC clock source selection and the two ways of switching it.
//!
//! The EMC clock is a mux over four PLL outputs followed by an integer
//! divider. Parts without the hardware DFS engine are switched in software,
//! stepping the divider so the DRAM clock never jumps above the higher of the
//! old and new rates. Parts with the engine get the new timing loaded into the
//! controller's shadow registers and a single request; the engine swaps clock
//! and timing together.

use embedded_hal::delay::DelayNs;
use log::debug;
use tock_registers::register_bitfields;

use crate::config::Config;
use crate::dfs::{ControllerState, Phase, TransitionCause};
use crate::errorcode::WaitTimeout;
use crate::publ::PhyDllController;
use crate::regio::{poll, Block, Reg, RegisterIo};
use crate::timing::{Frequency, TimingProfile};
use crate::umctl::{self, RefreshController, TimingBank};

register_bitfields![u32,
    pub EMC_CLK_CFG [
        SEL OFFSET(0) NUMBITS(2) [
            Xtal26m = 0,
            Twpll = 1,
            Dpll = 2,
            AonApll = 3
        ],
        /// Divisor minus one
        DIV OFFSET(8) NUMBITS(3) []
    ],
    pub EMC_DFS_CTRL [
        REQ OFFSET(0) NUMBITS(1) [],
        SEL OFFSET(4) NUMBITS(2) [],
        DIV OFFSET(8) NUMBITS(3) []
    ],
    pub EMC_DFS_STS [
        /// Write one to clear
        DONE OFFSET(0) NUMBITS(1) [],
        BUSY OFFSET(1) NUMBITS(1) []
    ],
    pub EMC_DFS_CAP [
        HW_DFS OFFSET(0) NUMBITS(1) []
    ]
];

pub struct ClkRegisters;

impl ClkRegisters {
    pub const EMC_CLK_CFG: Reg<EMC_CLK_CFG::Register> = Reg::new(Block::Clk, 0x024);
    pub const EMC_DFS_CTRL: Reg<EMC_DFS_CTRL::Register> = Reg::new(Block::Clk, 0x028);
    pub const EMC_DFS_STS: Reg<EMC_DFS_STS::Register> = Reg::new(Block::Clk, 0x02C);
    pub const EMC_DFS_CAP: Reg<EMC_DFS_CAP::Register> = Reg::new(Block::Clk, 0x030);
}

/// Inputs of the EMC clock mux.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockSource {
    Xtal26m,
    Twpll,
    Dpll,
    AonApll,
}

impl ClockSource {
    pub const fn rate_mhz(self) -> u32 {
        match self {
            ClockSource::Xtal26m => 26,
            ClockSource::Twpll => 768,
            ClockSource::Dpll => 664,
            ClockSource::AonApll => 384,
        }
    }

    const fn sel(self) -> u32 {
        match self {
            ClockSource::Xtal26m => 0,
            ClockSource::Twpll => 1,
            ClockSource::Dpll => 2,
            ClockSource::AonApll => 3,
        }
    }
}

/// A mux input plus divisor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockSelection {
    pub source: ClockSource,
    /// 1..=8, stored in hardware as `divisor - 1`.
    pub divisor: u32,
}

impl ClockSelection {
    pub const fn rate_mhz(&self) -> u32 {
        self.source.rate_mhz() / self.divisor
    }

    /// What the mux and divider are set to right now.
    pub fn current<IO: RegisterIo>(io: &IO) -> ClockSelection {
        use EMC_CLK_CFG::SEL::Value;

        let cfg = io.get(ClkRegisters::EMC_CLK_CFG);
        let source = match cfg.read_as_enum(EMC_CLK_CFG::SEL) {
            Some(Value::Twpll) => ClockSource::Twpll,
            Some(Value::Dpll) => ClockSource::Dpll,
            Some(Value::AonApll) => ClockSource::AonApll,
            Some(Value::Xtal26m) | None => ClockSource::Xtal26m,
        };
        ClockSelection {
            source,
            divisor: cfg.read(EMC_CLK_CFG::DIV) + 1,
        }
    }
}

/// Pick the mux input and divisor for `target`.
///
/// 192 MHz normally comes from TWPLL; a deep-sleep exit uses the always-on
/// APLL instead because TWPLL may still be relocking.
pub fn select_source_and_divider(target: Frequency, cause: TransitionCause) -> ClockSelection {
    let (source, divisor) = match (target, cause) {
        (Frequency::Mhz192, TransitionCause::DeepSleep) => (ClockSource::AonApll, 2),
        (Frequency::Mhz192, _) => (ClockSource::Twpll, 4),
        (Frequency::Mhz332, _) => (ClockSource::Dpll, 2),
    };
    ClockSelection { source, divisor }
}

/// Program all timing for `profile` into the registers the controller and
/// PHY are running on.
pub fn apply_profile<IO: RegisterIo>(io: &IO, profile: &TimingProfile) {
    RefreshController::new(io).program_refresh_timing(profile);
    umctl::program_dram_timing(io, profile, TimingBank::Active);
    PhyDllController::new(io).program_lane_timing(profile);
}

/// How the clock change is carried out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockSwitcher {
    /// Hardware DFS engine: shadow timing plus a single request.
    Direct,
    /// Software mux switch with a stepped divider ramp.
    Stepped,
}

impl ClockSwitcher {
    /// Use the hardware engine when the part advertises it.
    pub fn detect<IO: RegisterIo>(io: &IO) -> ClockSwitcher {
        if io.is_set(ClkRegisters::EMC_DFS_CAP, EMC_DFS_CAP::HW_DFS) {
            ClockSwitcher::Direct
        } else {
            ClockSwitcher::Stepped
        }
    }

    /// Move the EMC clock to `target` and apply `profile`.
    ///
    /// Must be called with the controller in self-refresh. Enters
    /// [`Phase::TimingApply`] on `state` at the point timing registers start
    /// changing, and records the new clock in `state` on success.
    pub fn change_frequency<IO: RegisterIo, D: DelayNs>(
        self,
        io: &IO,
        delay: &mut D,
        config: &Config,
        state: &mut ControllerState,
        target: Frequency,
        cause: TransitionCause,
        profile: &TimingProfile,
    ) -> Result<(), WaitTimeout> {
        let selection = select_source_and_divider(target, cause);
        debug!(
            "EMC clock -> {:?}/{} ({} MHz), {:?}",
            selection.source,
            selection.divisor,
            selection.rate_mhz(),
            self
        );

        match self {
            ClockSwitcher::Direct => direct(io, delay, config, state, selection, profile)?,
            ClockSwitcher::Stepped => stepped(io, delay, config, state, selection, profile),
        }

        state.clock_source = selection.source;
        state.current_clock_mhz = selection.rate_mhz();
        Ok(())
    }
}

fn direct<IO: RegisterIo, D: DelayNs>(
    io: &IO,
    delay: &mut D,
    config: &Config,
    state: &mut ControllerState,
    target: ClockSelection,
    profile: &TimingProfile,
) -> Result<(), WaitTimeout> {
    umctl::program_shadow_refresh_timing(io, profile);
    umctl::program_dram_timing(io, profile, TimingBank::Shadow);

    io.write(
        ClkRegisters::EMC_DFS_CTRL,
        EMC_DFS_CTRL::SEL.val(target.source.sel())
            + EMC_DFS_CTRL::DIV.val(target.divisor - 1)
            + EMC_DFS_CTRL::REQ::SET,
    );
    poll(delay, config.dfs_done, WaitTimeout::DfsDone, || {
        io.is_set(ClkRegisters::EMC_DFS_STS, EMC_DFS_STS::DONE)
    })?;
    io.write(ClkRegisters::EMC_DFS_STS, EMC_DFS_STS::DONE::SET);

    // The engine swaps controller timing only; the PHY lanes follow here.
    state.enter(Phase::TimingApply);
    PhyDllController::new(io).program_lane_timing(profile);
    Ok(())
}

/// Switch in software without ever running the DRAM above the faster of the
/// two clocks.
///
/// Going down, the divider is first raised on the old source, then the mux
/// moves, then the slower timing is applied. Going up, the faster timing is
/// applied first, the mux moves at whichever divisor is larger, then the
/// divider ramps down. The divider only ever moves in the direction that
/// lowers the rate before the mux switch and raises it after.
fn stepped<IO: RegisterIo, D: DelayNs>(
    io: &IO,
    delay: &mut D,
    config: &Config,
    state: &mut ControllerState,
    target: ClockSelection,
    profile: &TimingProfile,
) {
    let current = ClockSelection::current(io);

    if target.rate_mhz() < current.rate_mhz() {
        let exit_divisor = current.divisor.max(target.divisor);
        ramp_divider(io, delay, config, current.divisor, exit_divisor);
        select(io, target);
        state.enter(Phase::TimingApply);
        apply_profile(io, profile);
    } else {
        state.enter(Phase::TimingApply);
        apply_profile(io, profile);
        let entry_divisor = current.divisor.max(target.divisor);
        select(
            io,
            ClockSelection {
                source: target.source,
                divisor: entry_divisor,
            },
        );
        ramp_divider(io, delay, config, entry_divisor, target.divisor);
    }
}

fn select<IO: RegisterIo>(io: &IO, selection: ClockSelection) {
    io.modify(
        ClkRegisters::EMC_CLK_CFG,
        EMC_CLK_CFG::SEL.val(selection.source.sel()) + EMC_CLK_CFG::DIV.val(selection.divisor - 1),
    );
}

/// Move the divider from `from` to `to` in `config.divider_step` increments,
/// settling after each write. A remainder smaller than one step is applied as
/// a final short step.
fn ramp_divider<IO: RegisterIo, D: DelayNs>(
    io: &IO,
    delay: &mut D,
    config: &Config,
    from: u32,
    to: u32,
) {
    let step = config.divider_step.max(1);
    let mut divisor = from;
    while divisor != to {
        divisor = if to > divisor {
            divisor.saturating_add(step).min(to)
        } else {
            divisor.saturating_sub(step).max(to)
        };
        io.modify(ClkRegisters::EMC_CLK_CFG, EMC_CLK_CFG::DIV.val(divisor - 1));
        delay.delay_us(config.ramp_step_delay_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CONFIG;
    use crate::fake::{profile, FakeDelay, FakeDmc};
    use crate::timing::DATA_LANES;

    const CLK_CFG: (Block, usize) = (Block::Clk, 0x024);

    fn first_timing_write(io: &FakeDmc) -> Option<usize> {
        io.writes()
            .iter()
            .position(|w| w.block == Block::Umctl && (0x100..0x124).contains(&w.offset))
    }

    fn last_timing_write(io: &FakeDmc) -> Option<usize> {
        io.writes()
            .iter()
            .rposition(|w| w.block == Block::Umctl && (0x100..0x124).contains(&w.offset))
    }

    fn clock_writes(io: &FakeDmc) -> Vec<usize> {
        io.writes()
            .iter()
            .enumerate()
            .filter(|(_, w)| w.at(CLK_CFG))
            .map(|(n, _)| n)
            .collect()
    }

    #[test]
    fn source_selection_table() {
        let cases = [
            (Frequency::Mhz192, TransitionCause::NormalSwitch, ClockSource::Twpll, 4),
            (Frequency::Mhz192, TransitionCause::Resume, ClockSource::Twpll, 4),
            (Frequency::Mhz192, TransitionCause::DeepSleep, ClockSource::AonApll, 2),
            (Frequency::Mhz332, TransitionCause::NormalSwitch, ClockSource::Dpll, 2),
            (Frequency::Mhz332, TransitionCause::DeepSleep, ClockSource::Dpll, 2),
        ];
        for (target, cause, source, divisor) in cases {
            let sel = select_source_and_divider(target, cause);
            assert_eq!(sel, ClockSelection { source, divisor });
            assert_eq!(sel.rate_mhz(), target.mhz());
        }
    }

    #[test]
    fn current_selection_decodes_mux_and_divider() {
        let io = FakeDmc::new();
        io.preset(CLK_CFG.0, CLK_CFG.1, 0x0000_0102);
        let sel = ClockSelection::current(&io);
        assert_eq!(sel.source, ClockSource::Dpll);
        assert_eq!(sel.divisor, 2);
        assert_eq!(sel.rate_mhz(), 332);
    }

    #[test]
    fn detect_follows_capability_bit() {
        let io = FakeDmc::new();
        assert_eq!(ClockSwitcher::detect(&io), ClockSwitcher::Stepped);
        io.enable_hw_dfs();
        assert_eq!(ClockSwitcher::detect(&io), ClockSwitcher::Direct);
    }

    #[test]
    fn stepped_decrease_applies_timing_after_the_ramp() {
        let io = FakeDmc::new();
        io.preset(CLK_CFG.0, CLK_CFG.1, 0x0000_0102);
        let mut delay = FakeDelay::default();
        let mut state = ControllerState::observe(&io);
        let p = profile(Frequency::Mhz192);

        ClockSwitcher::Stepped
            .change_frequency(
                &io,
                &mut delay,
                &CONFIG,
                &mut state,
                Frequency::Mhz192,
                TransitionCause::NormalSwitch,
                &p,
            )
            .unwrap();

        let clocks = clock_writes(&io);
        // 2 -> 3 -> 4 on DPLL, then the mux write.
        assert_eq!(clocks.len(), 3);
        assert!(clocks.last() < first_timing_write(&io).as_ref());
        assert_eq!(io.peek(CLK_CFG.0, CLK_CFG.1), 0x0000_0301);
        assert_eq!(delay.calls, 2);
        assert_eq!(delay.total_us, 2 * u64::from(CONFIG.ramp_step_delay_us));
        assert_eq!(state.phase, Phase::TimingApply);
        assert_eq!(state.current_clock_mhz, 192);
        assert_eq!(state.clock_source, ClockSource::Twpll);
    }

    #[test]
    fn stepped_increase_applies_timing_before_the_ramp() {
        let io = FakeDmc::new();
        let mut delay = FakeDelay::default();
        let mut state = ControllerState::observe(&io);
        let p = profile(Frequency::Mhz332);

        ClockSwitcher::Stepped
            .change_frequency(
                &io,
                &mut delay,
                &CONFIG,
                &mut state,
                Frequency::Mhz332,
                TransitionCause::NormalSwitch,
                &p,
            )
            .unwrap();

        let clocks = clock_writes(&io);
        // Mux to DPLL at /4, then 4 -> 3 -> 2.
        assert_eq!(clocks.len(), 3);
        assert!(last_timing_write(&io) < clocks.first().copied());
        assert_eq!(io.peek(CLK_CFG.0, CLK_CFG.1), 0x0000_0102);
        for n in 0..p.dram_timing.len() {
            assert_eq!(io.peek(Block::Umctl, 0x100 + 4 * n), p.dram_timing[n]);
        }
        assert_eq!(state.current_clock_mhz, 332);
    }

    #[test]
    fn stepped_to_the_same_clock_does_not_ramp() {
        let io = FakeDmc::new();
        let mut delay = FakeDelay::default();
        let mut state = ControllerState::observe(&io);

        ClockSwitcher::Stepped
            .change_frequency(
                &io,
                &mut delay,
                &CONFIG,
                &mut state,
                Frequency::Mhz192,
                TransitionCause::Resume,
                &profile(Frequency::Mhz192),
            )
            .unwrap();

        assert_eq!(clock_writes(&io).len(), 1);
        assert_eq!(delay.total_us, 0);
    }

    #[test]
    fn direct_loads_shadow_then_issues_one_request() {
        let io = FakeDmc::new();
        io.enable_hw_dfs();
        let mut delay = FakeDelay::default();
        let mut state = ControllerState::observe(&io);
        let p = profile(Frequency::Mhz332);

        ClockSwitcher::Direct
            .change_frequency(
                &io,
                &mut delay,
                &CONFIG,
                &mut state,
                Frequency::Mhz332,
                TransitionCause::NormalSwitch,
                &p,
            )
            .unwrap();

        let log = io.writes();
        let requests: Vec<usize> = log
            .iter()
            .enumerate()
            .filter(|(_, w)| w.at((Block::Clk, 0x028)))
            .map(|(n, _)| n)
            .collect();
        assert_eq!(requests.len(), 1);
        assert_eq!(log[requests[0]].value, 0x0000_0121);
        let last_shadow = log
            .iter()
            .rposition(|w| w.block == Block::Umctl && w.offset >= umctl::SHADOW_BANK_OFFSET);
        assert!(last_shadow < Some(requests[0]));
        // Nothing touches the live controller timing.
        assert_eq!(first_timing_write(&io), None);
        assert_eq!(io.peek(CLK_CFG.0, CLK_CFG.1), 0x0000_0102);
        assert_eq!(io.peek(Block::Clk, 0x02C) & 1, 0);
        assert_eq!(state.phase, Phase::TimingApply);

        // Lanes are reprogrammed only once the engine is done and acknowledged.
        let done_cleared = log
            .iter()
            .position(|w| w.at((Block::Clk, 0x02C)) && w.value & 1 == 1)
            .unwrap();
        let first_lane = log
            .iter()
            .position(|w| {
                w.block == Block::Publ
                    && (0..DATA_LANES)
                        .any(|n| w.offset == 0x1C0 + n * 0x40 || w.offset == 0x1D4 + n * 0x40)
            })
            .unwrap();
        assert!(requests[0] < done_cleared);
        assert!(done_cleared < first_lane);
        for lane in 0..DATA_LANES {
            assert_eq!(io.peek(Block::Publ, 0x1C0 + lane * 0x40), p.lane_gcr[lane]);
            assert_eq!(io.peek(Block::Publ, 0x1D4 + lane * 0x40), p.lane_dqstr[lane]);
        }
    }

    fn divisors(io: &FakeDmc) -> Vec<(u32, u32)> {
        io.writes_to(CLK_CFG.0, CLK_CFG.1)
            .into_iter()
            .map(|v| (v & 0x3, ((v >> 8) & 0x7) + 1))
            .collect()
    }

    #[test]
    fn stepped_increase_ramps_in_configured_steps() {
        let io = FakeDmc::new();
        // TWPLL/8, 96 MHz.
        io.preset(CLK_CFG.0, CLK_CFG.1, 0x0000_0701);
        let mut delay = FakeDelay::default();
        let mut state = ControllerState::observe(&io);
        let config = Config {
            divider_step: 3,
            ..CONFIG
        };

        ClockSwitcher::Stepped
            .change_frequency(
                &io,
                &mut delay,
                &config,
                &mut state,
                Frequency::Mhz192,
                TransitionCause::NormalSwitch,
                &profile(Frequency::Mhz192),
            )
            .unwrap();

        // Mux write at /8, then 8 -> 5 -> 4 with a short final step.
        assert_eq!(divisors(&io), [(1, 8), (1, 5), (1, 4)]);
        assert_eq!(delay.calls, 2);
        assert!(last_timing_write(&io) < clock_writes(&io).first().copied());
        assert_eq!(io.peek(CLK_CFG.0, CLK_CFG.1), 0x0000_0301);
    }

    #[test]
    fn stepped_decrease_ramps_in_configured_steps() {
        let io = FakeDmc::new();
        // DPLL/1, 664 MHz.
        io.preset(CLK_CFG.0, CLK_CFG.1, 0x0000_0002);
        let mut delay = FakeDelay::default();
        let mut state = ControllerState::observe(&io);
        let config = Config {
            divider_step: 2,
            ..CONFIG
        };

        ClockSwitcher::Stepped
            .change_frequency(
                &io,
                &mut delay,
                &config,
                &mut state,
                Frequency::Mhz192,
                TransitionCause::NormalSwitch,
                &profile(Frequency::Mhz192),
            )
            .unwrap();

        // 1 -> 3 -> 4 on DPLL, then the mux moves to TWPLL/4.
        assert_eq!(divisors(&io), [(2, 3), (2, 4), (1, 4)]);
        assert_eq!(delay.calls, 2);
        assert!(clock_writes(&io).last() < first_timing_write(&io).as_ref());
        assert_eq!(state.current_clock_mhz, 192);
    }

    #[test]
    fn oversized_step_lands_on_the_target() {
        let io = FakeDmc::new();
        io.preset(CLK_CFG.0, CLK_CFG.1, 0x0000_0102);
        let mut delay = FakeDelay::default();
        let mut state = ControllerState::observe(&io);
        let config = Config {
            divider_step: u32::MAX,
            ..CONFIG
        };

        ClockSwitcher::Stepped
            .change_frequency(
                &io,
                &mut delay,
                &config,
                &mut state,
                Frequency::Mhz192,
                TransitionCause::NormalSwitch,
                &profile(Frequency::Mhz192),
            )
            .unwrap();

        assert_eq!(divisors(&io), [(2, 4), (1, 4)]);
        assert_eq!(delay.calls, 1);
        assert_eq!(io.peek(CLK_CFG.0, CLK_CFG.1), 0x0000_0301);
    }

    #[test]
    fn direct_times_out_when_engine_never_finishes() {
        let io = FakeDmc::new();
        io.enable_hw_dfs();
        io.stick_dfs_engine();
        let mut delay = FakeDelay::default();
        let mut state = ControllerState::observe(&io);
        let config = Config {
            dfs_done: crate::config::PollBudget::new(3, 1),
            ..CONFIG
        };

        let result = ClockSwitcher::Direct.change_frequency(
            &io,
            &mut delay,
            &config,
            &mut state,
            Frequency::Mhz192,
            TransitionCause::DeepSleep,
            &profile(Frequency::Mhz192),
        );
        assert_eq!(result, Err(WaitTimeout::DfsDone));
        assert_eq!(io.reads_of(Block::Clk, 0x02C), 3);
    }
}
