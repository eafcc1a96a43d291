use embassy_nrf::saadc::{self, ChannelConfig, Gain, Oversample, Reference, Resolution, Saadc};

use crate::sampler::{bit_level, AsyncReferenceSampler};

/// Channel wired to the external reference
pub const REFERENCE_CHANNEL: usize = 0;

/// 10 bit conversions, oversampled to smooth out noise on VDD
pub fn config() -> saadc::Config {
    let mut config = saadc::Config::default();
    config.resolution = Resolution::_10BIT;
    config.oversample = Oversample::OVER4X;
    config
}

/// Single ended channel whose full scale is VDD: VDD/4 reference at gain 1/4
pub fn channel(mut channel: ChannelConfig<'_>) -> ChannelConfig<'_> {
    channel.reference = Reference::VDD1_4;
    channel.gain = Gain::GAIN1_4;
    channel
}

/// Samples every channel of the SAADC in one scan and reports channel
/// [`REFERENCE_CHANNEL`] as the reference code.
pub struct SaadcSampler<'d, const N: usize> {
    saadc: Saadc<'d, N>,
    raw: [i16; N],
}

impl<'d, const N: usize> SaadcSampler<'d, N> {
    pub fn new(saadc: Saadc<'d, N>) -> Self {
        Self { saadc, raw: [0; N] }
    }

    /// Bit level of `channel` from the latest scan
    pub fn level(&self, channel: usize) -> u16 {
        bit_level(self.raw[channel])
    }
}

impl<const N: usize> AsyncReferenceSampler for SaadcSampler<'_, N> {
    async fn sample_reference(&mut self) -> u16 {
        self.saadc.sample(&mut self.raw).await;
        let factor = bit_level(self.raw[REFERENCE_CHANNEL]);
        debug!("Reference: raw = {}, factor = {}", self.raw[REFERENCE_CHANNEL], factor);
        factor
    }
}
