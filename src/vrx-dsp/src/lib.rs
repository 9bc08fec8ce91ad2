// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The IQ DSP pipeline: sample-source abstraction, spectral metrics, FM
//! conditioning, line-period estimation, raster assembly, the auto-tune
//! controller, and the frame publisher.

pub mod autotune;
pub mod fm;
pub mod line;
pub mod publisher;
pub mod raster;
pub mod sample_source;
pub mod spectrum;

#[cfg(feature = "soapysdr-sys")]
mod real_iq_source;

pub use sample_source::{HardwareIqSource, IqSource, SampleSource, SyntheticIqSource};
pub use spectrum::SpectralMetrics;
