// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Real SoapySDR device IQ source, compiled only with `--features soapysdr-sys`.
//!
//! Reads raw 16-bit (falling back to 8-bit) interleaved IQ so that clip
//! fraction can be tracked from the original integer samples, as §4.1
//! requires. Normalized `Complex<f32>` samples are derived by dividing by
//! the format's full scale (32768 or 128).

use num_complex::Complex;
use soapysdr::Device;

use crate::sample_source::{GainRequest, IqSource};

const READ_TIMEOUT_US: i64 = 1_000_000;
const FULLSCALE_16: f32 = 32768.0;
const FULLSCALE_8: f32 = 128.0;

enum RxStream {
    Bits16(soapysdr::RxStream<Complex<i16>>),
    Bits8(soapysdr::RxStream<Complex<i8>>),
}

pub struct HardwareIqSource {
    device: Device,
    stream: RxStream,
    raw16: Vec<Complex<i16>>,
    raw8: Vec<Complex<i8>>,
    last_clip_fraction: f32,
    lna_gain: u8,
    vga_gain: u8,
    amp_enabled: bool,
}

impl HardwareIqSource {
    pub fn open(
        args: &str,
        center_freq_hz: f64,
        sample_rate_hz: f64,
        lna_gain: u8,
        vga_gain: u8,
        amp_enabled: bool,
    ) -> Result<Self, String> {
        tracing::info!("opening SoapySDR device (args={args:?})");

        let device = match Device::new(args) {
            Ok(dev) => dev,
            Err(e) => {
                tracing::warn!("failed to open device with args '{args}': {e}; trying empty args");
                Device::new("").map_err(|fallback_err| {
                    format!(
                        "failed to open SoapySDR device: '{args}' -> {e}; fallback -> {fallback_err}"
                    )
                })?
            }
        };

        device
            .set_sample_rate(soapysdr::Direction::Rx, 0, sample_rate_hz)
            .map_err(|e| format!("set_sample_rate failed: {e}"))?;
        device
            .set_frequency(soapysdr::Direction::Rx, 0, center_freq_hz, ())
            .map_err(|e| format!("set_frequency failed: {e}"))?;

        apply_gains(&device, lna_gain, vga_gain, amp_enabled);

        let mut stream = device
            .rx_stream::<Complex<i16>>(&[0])
            .map_err(|e| format!("failed to create CS16 RX stream: {e}"))?;
        stream
            .activate(None)
            .map_err(|e| format!("failed to activate RX stream: {e}"))?;

        tracing::info!("RealIqSource: CS16 RX stream activated");

        Ok(Self {
            device,
            stream: RxStream::Bits16(stream),
            raw16: Vec::new(),
            raw8: Vec::new(),
            last_clip_fraction: 0.0,
            lna_gain,
            vga_gain,
            amp_enabled,
        })
    }

    /// Sticky fallback from 16-bit to 8-bit IQ, per §4.1 and §7 rule 4.
    fn fall_back_to_8bit(&mut self) -> Result<(), String> {
        let mut stream = self
            .device
            .rx_stream::<Complex<i8>>(&[0])
            .map_err(|e| format!("failed to create CS8 RX stream: {e}"))?;
        stream
            .activate(None)
            .map_err(|e| format!("failed to activate CS8 RX stream: {e}"))?;
        tracing::warn!("RealIqSource: fell back to CS8 stream for this session");
        self.stream = RxStream::Bits8(stream);
        Ok(())
    }
}

fn apply_gains(device: &Device, lna_gain: u8, vga_gain: u8, amp_enabled: bool) {
    if let Err(e) = device.set_gain_element(soapysdr::Direction::Rx, 0, "LNA", lna_gain as f64) {
        tracing::warn!("set LNA gain failed: {e}");
    }
    if let Err(e) = device.set_gain_element(soapysdr::Direction::Rx, 0, "VGA", vga_gain as f64) {
        tracing::warn!("set VGA gain failed: {e}");
    }
    let amp_db = if amp_enabled { 14.0 } else { 0.0 };
    if let Err(e) = device.set_gain_element(soapysdr::Direction::Rx, 0, "AMP", amp_db) {
        tracing::warn!("set AMP gain failed: {e}");
    }
}

impl IqSource for HardwareIqSource {
    fn read_into(&mut self, buf: &mut [Complex<f32>]) -> Result<usize, String> {
        match &mut self.stream {
            RxStream::Bits16(stream) => {
                if self.raw16.len() < buf.len() {
                    self.raw16.resize(buf.len(), Complex::new(0, 0));
                }
                let n = stream
                    .read(&mut [&mut self.raw16[..buf.len()]], READ_TIMEOUT_US)
                    .map_err(|e| format!("CS16 stream read error: {e}"))?;
                let mut clipped = 0usize;
                for (dst, src) in buf.iter_mut().zip(self.raw16[..n].iter()) {
                    if src.re.unsigned_abs() as f32 >= FULLSCALE_16 - 1.0
                        || src.im.unsigned_abs() as f32 >= FULLSCALE_16 - 1.0
                    {
                        clipped += 1;
                    }
                    *dst = Complex::new(src.re as f32 / FULLSCALE_16, src.im as f32 / FULLSCALE_16);
                }
                self.last_clip_fraction = if n > 0 { clipped as f32 / n as f32 } else { 0.0 };
                Ok(n)
            }
            RxStream::Bits8(stream) => {
                if self.raw8.len() < buf.len() {
                    self.raw8.resize(buf.len(), Complex::new(0, 0));
                }
                let n = stream
                    .read(&mut [&mut self.raw8[..buf.len()]], READ_TIMEOUT_US)
                    .map_err(|e| format!("CS8 stream read error: {e}"))?;
                let mut clipped = 0usize;
                for (dst, src) in buf.iter_mut().zip(self.raw8[..n].iter()) {
                    if src.re.unsigned_abs() as f32 >= FULLSCALE_8 - 1.0
                        || src.im.unsigned_abs() as f32 >= FULLSCALE_8 - 1.0
                    {
                        clipped += 1;
                    }
                    *dst = Complex::new(src.re as f32 / FULLSCALE_8, src.im as f32 / FULLSCALE_8);
                }
                self.last_clip_fraction = if n > 0 { clipped as f32 / n as f32 } else { 0.0 };
                Ok(n)
            }
        }
    }

    fn is_blocking(&self) -> bool {
        true
    }

    fn set_center_freq(&mut self, hz: f64) -> Result<(), String> {
        self.device
            .set_frequency(soapysdr::Direction::Rx, 0, hz, ())
            .map_err(|e| format!("retune failed: {e}"))
    }

    fn set_gains(&mut self, req: GainRequest) -> Result<(), String> {
        if let Some(lna) = req.lna_db {
            self.lna_gain = lna.min(40);
        }
        if let Some(vga) = req.vga_db {
            self.vga_gain = vga.min(62);
        }
        if let Some(amp) = req.amp_enabled {
            self.amp_enabled = amp;
        }
        apply_gains(&self.device, self.lna_gain, self.vga_gain, self.amp_enabled);
        Ok(())
    }

    fn last_clip_fraction(&self) -> f32 {
        self.last_clip_fraction
    }

    fn handle_read_error(&mut self, err: &str) -> Result<bool, String> {
        if matches!(self.stream, RxStream::Bits16(_)) {
            tracing::warn!("CS16 read error ({err}); attempting CS8 fallback");
            self.fall_back_to_8bit()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn clear(&mut self) {
        match &mut self.stream {
            RxStream::Bits16(s) => {
                let _ = s.deactivate(None);
            }
            RxStream::Bits8(s) => {
                let _ = s.deactivate(None);
            }
        }
    }
}
