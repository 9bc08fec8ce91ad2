// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The default 5.8 GHz analog FPV channel plan, used when a scanner
//! configuration omits its channel list.

/// The eight Raceband channel center frequencies, in Hz.
pub const RACEBAND_CHANNELS_HZ: [u64; 8] = [
    5_658_000_000,
    5_695_000_000,
    5_732_000_000,
    5_769_000_000,
    5_806_000_000,
    5_843_000_000,
    5_880_000_000,
    5_917_000_000,
];
