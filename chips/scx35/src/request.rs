// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2026.

//! Decoding and validation of the packed transition request word.
//!
//! The caller (the power-management firmware, running from on-chip SRAM)
//! passes a single 32-bit word. Validation is pure: it reads the word and the
//! profile table and nothing else, so a rejected request has provably not
//! touched the hardware.

use tock_registers::{register_bitfields, LocalRegisterCopy};

use crate::dfs::{DllMode, TransitionCause};
use crate::errorcode::RejectedRequest;
use crate::timing::{DdrType, Frequency, ProfileTable, TimingProfile};

register_bitfields![u32,
    pub DFS_REQUEST [
        DDR_TYPE OFFSET(0) NUMBITS(4) [
            Lpddr1 = 1,
            Lpddr2 = 2,
            Ddr3 = 3
        ],
        /// Target EMC clock in MHz
        CLOCK_MHZ OFFSET(4) NUMBITS(12) [],
        DLL_MODE OFFSET(16) NUMBITS(4) [
            DisableDll = 0,
            EnableDll = 1,
            NoSwitch = 2
        ],
        CAUSE OFFSET(20) NUMBITS(4) [
            NormalSwitch = 0,
            Resume = 1,
            DeepSleep = 2
        ],
        /// Must be zero
        RESERVED OFFSET(24) NUMBITS(8) []
    ]
];

/// A request word with every field decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DfsRequest {
    pub ddr_type: DdrType,
    pub clock_mhz: u32,
    pub dll_mode: DllMode,
    pub cause: TransitionCause,
}

impl DfsRequest {
    /// Pack into the caller's word format.
    pub fn encode(&self) -> u32 {
        let ddr_type = match self.ddr_type {
            DdrType::Lpddr1 => DFS_REQUEST::DDR_TYPE::Lpddr1,
            DdrType::Lpddr2 => DFS_REQUEST::DDR_TYPE::Lpddr2,
            DdrType::Ddr3 => DFS_REQUEST::DDR_TYPE::Ddr3,
        };
        let dll_mode = match self.dll_mode {
            DllMode::DisableDll => DFS_REQUEST::DLL_MODE::DisableDll,
            DllMode::EnableDll => DFS_REQUEST::DLL_MODE::EnableDll,
            DllMode::NoSwitch => DFS_REQUEST::DLL_MODE::NoSwitch,
        };
        let cause = match self.cause {
            TransitionCause::NormalSwitch => DFS_REQUEST::CAUSE::NormalSwitch,
            TransitionCause::Resume => DFS_REQUEST::CAUSE::Resume,
            TransitionCause::DeepSleep => DFS_REQUEST::CAUSE::DeepSleep,
        };
        (ddr_type + DFS_REQUEST::CLOCK_MHZ.val(self.clock_mhz) + dll_mode + cause).value
    }

    /// Split `word` into its fields, rejecting reserved bits and unknown
    /// codes. The clock is not checked here.
    pub fn decode(word: u32) -> Result<DfsRequest, RejectedRequest> {
        let fields = LocalRegisterCopy::<u32, DFS_REQUEST::Register>::new(word);

        if fields.read(DFS_REQUEST::RESERVED) != 0 {
            return Err(RejectedRequest::ReservedBitsSet(
                word & DFS_REQUEST::RESERVED.mask << DFS_REQUEST::RESERVED.shift,
            ));
        }

        let ddr_type = match fields.read_as_enum(DFS_REQUEST::DDR_TYPE) {
            Some(DFS_REQUEST::DDR_TYPE::Value::Lpddr1) => DdrType::Lpddr1,
            Some(DFS_REQUEST::DDR_TYPE::Value::Lpddr2) => DdrType::Lpddr2,
            Some(DFS_REQUEST::DDR_TYPE::Value::Ddr3) => DdrType::Ddr3,
            None => {
                return Err(RejectedRequest::UnknownDdrType(
                    fields.read(DFS_REQUEST::DDR_TYPE),
                ))
            }
        };
        let dll_mode = match fields.read_as_enum(DFS_REQUEST::DLL_MODE) {
            Some(DFS_REQUEST::DLL_MODE::Value::DisableDll) => DllMode::DisableDll,
            Some(DFS_REQUEST::DLL_MODE::Value::EnableDll) => DllMode::EnableDll,
            Some(DFS_REQUEST::DLL_MODE::Value::NoSwitch) => DllMode::NoSwitch,
            None => {
                return Err(RejectedRequest::UnknownDllMode(
                    fields.read(DFS_REQUEST::DLL_MODE),
                ))
            }
        };
        let cause = match fields.read_as_enum(DFS_REQUEST::CAUSE) {
            Some(DFS_REQUEST::CAUSE::Value::NormalSwitch) => TransitionCause::NormalSwitch,
            Some(DFS_REQUEST::CAUSE::Value::Resume) => TransitionCause::Resume,
            Some(DFS_REQUEST::CAUSE::Value::DeepSleep) => TransitionCause::DeepSleep,
            None => return Err(RejectedRequest::UnknownCause(fields.read(DFS_REQUEST::CAUSE))),
        };

        Ok(DfsRequest {
            ddr_type,
            clock_mhz: fields.read(DFS_REQUEST::CLOCK_MHZ),
            dll_mode,
            cause,
        })
    }
}

/// A request that passed every check, with its profile resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidatedRequest<'a> {
    pub ddr_type: DdrType,
    pub frequency: Frequency,
    pub dll_mode: DllMode,
    pub cause: TransitionCause,
    pub profile: &'a TimingProfile,
}

/// Decode `word` and resolve its profile from `profiles`.
///
/// Succeeds iff the word is well formed, names a supported frequency, and the
/// table holds a profile built for that frequency in its slot.
pub fn decode_and_validate<'a>(
    word: u32,
    profiles: &ProfileTable<'a>,
) -> Result<ValidatedRequest<'a>, RejectedRequest> {
    let request = DfsRequest::decode(word)?;

    let frequency = Frequency::from_mhz(request.clock_mhz)
        .ok_or(RejectedRequest::UnsupportedFrequency(request.clock_mhz))?;
    let profile = profiles
        .slot(frequency)
        .ok_or(RejectedRequest::MissingProfile(frequency))?;
    if profile.frequency != frequency {
        return Err(RejectedRequest::ProfileMismatch {
            requested: frequency,
            profile: profile.frequency,
        });
    }

    Ok(ValidatedRequest {
        ddr_type: request.ddr_type,
        frequency,
        dll_mode: request.dll_mode,
        cause: request.cause,
        profile,
    })
}
