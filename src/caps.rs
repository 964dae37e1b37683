//! Negotiated audio format ("caps") and the adapter that derives frame sizing from it.

use crate::error::{Error, Result};

/// Media format tag for the negotiated stream.
///
/// Payload bytes are opaque to the transceiver; this tag only drives the
/// bytes-per-sample derivation in [`CapsAdapter::negotiate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleFormat {
    S16Le,
    S16Be,
    S32Le,
    S32Be,
    F32Le,
    F32Be,
    MuLaw,
    ALaw,
    /// Anything else; treated as 1 byte per sample with a warning.
    Unknown,
}

impl SampleFormat {
    fn bytes_per_sample(self) -> u8 {
        match self {
            SampleFormat::S16Le | SampleFormat::S16Be => 2,
            SampleFormat::S32Le | SampleFormat::S32Be | SampleFormat::F32Le | SampleFormat::F32Be => 4,
            SampleFormat::MuLaw | SampleFormat::ALaw => 1,
            SampleFormat::Unknown => 1,
        }
    }
}

/// Frozen, negotiated audio parameters.
///
/// Once produced by [`CapsAdapter::negotiate`] these values are read-only until the next
/// lifecycle reset (the adapter itself enforces this by only producing a fresh value).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioParameters {
    pub format: SampleFormat,
    pub rate_hz: u32,
    pub channels: u8,
    pub bytes_per_sample: u8,
    pub frame_duration_ms: u32,
    pub frame_size_bytes: u32,
}

impl AudioParameters {
    fn compute(format: SampleFormat, rate_hz: u32, channels: u8, frame_duration_ms: u32) -> Self {
        let bytes_per_sample = format.bytes_per_sample();
        let frame_size_bytes = rate_hz
            .saturating_mul(bytes_per_sample as u32)
            .saturating_mul(channels as u32)
            .saturating_mul(frame_duration_ms)
            / 1000;
        Self {
            format,
            rate_hz,
            channels,
            bytes_per_sample,
            frame_duration_ms,
            frame_size_bytes,
        }
    }
}

/// Resolves negotiated caps into [`AudioParameters`], per the element's frame-duration config.
#[derive(Debug, Default)]
pub struct CapsAdapter {
    frame_duration_ms: u32,
    current: Option<AudioParameters>,
}

impl CapsAdapter {
    pub fn new(frame_duration_ms: u32) -> Self {
        Self {
            frame_duration_ms,
            current: None,
        }
    }

    /// Negotiate caps from a rate/channels/format triple extracted from an upstream caps event.
    ///
    /// Fails with [`Error::Caps`] if rate or channels are out of the supported range.
    pub fn negotiate(&mut self, rate_hz: u32, channels: u8, format: SampleFormat) -> Result<AudioParameters> {
        if !(8000..=48000).contains(&rate_hz) {
            return Err(Error::Caps(format!("sample rate {rate_hz} Hz out of range 8000-48000")));
        }
        if !(1..=2).contains(&channels) {
            return Err(Error::Caps(format!("channel count {channels} out of range 1-2")));
        }
        if matches!(format, SampleFormat::Unknown) {
            tracing::warn!("unknown sample format, assuming 1 byte per sample");
        }

        let params = AudioParameters::compute(format, rate_hz, channels, self.frame_duration_ms);
        self.current = Some(params);
        Ok(params)
    }

    /// The currently negotiated caps, if any.
    pub fn current(&self) -> Option<AudioParameters> {
        self.current
    }

    /// Clear negotiated caps (lifecycle reset back to Prepared/Inactive).
    pub fn reset(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_matches_spec_formula() {
        let mut adapter = CapsAdapter::new(20);
        let params = adapter.negotiate(16000, 1, SampleFormat::S16Le).unwrap();
        // 16000 Hz * 2 bytes * 1 channel * 20ms / 1000 = 640 bytes
        assert_eq!(params.frame_size_bytes, 640);
        assert_eq!(params.bytes_per_sample, 2);
    }

    #[test]
    fn mulaw_is_one_byte_per_sample() {
        let mut adapter = CapsAdapter::new(20);
        let params = adapter.negotiate(8000, 1, SampleFormat::MuLaw).unwrap();
        assert_eq!(params.bytes_per_sample, 1);
        assert_eq!(params.frame_size_bytes, 160);
    }

    #[test]
    fn rejects_out_of_range_rate() {
        let mut adapter = CapsAdapter::new(20);
        assert!(adapter.negotiate(4000, 1, SampleFormat::S16Le).is_err());
        assert!(adapter.negotiate(96000, 1, SampleFormat::S16Le).is_err());
    }

    #[test]
    fn rejects_out_of_range_channels() {
        let mut adapter = CapsAdapter::new(20);
        assert!(adapter.negotiate(16000, 0, SampleFormat::S16Le).is_err());
        assert!(adapter.negotiate(16000, 3, SampleFormat::S16Le).is_err());
    }

    #[test]
    fn unknown_format_falls_back_to_one_byte() {
        let mut adapter = CapsAdapter::new(20);
        let params = adapter.negotiate(16000, 2, SampleFormat::Unknown).unwrap();
        assert_eq!(params.bytes_per_sample, 1);
    }

    #[test]
    fn reset_clears_current() {
        let mut adapter = CapsAdapter::new(20);
        adapter.negotiate(16000, 1, SampleFormat::S16Le).unwrap();
        assert!(adapter.current().is_some());
        adapter.reset();
        assert!(adapter.current().is_none());
    }
}
