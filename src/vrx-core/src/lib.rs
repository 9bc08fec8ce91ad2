// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod math;
pub mod model;
pub mod radio;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use model::{ActivityWindow, Candidate, CandidateStatus, Frame, FrameFormat, TuneState};
pub use radio::raceband::RACEBAND_CHANNELS_HZ;
