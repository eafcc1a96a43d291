//! The hardware seam: one conversion of the reference channel against the
//! supply rail.

use crate::reference::FULL_SCALE_COUNT;

/// Time the reference needs after the multiplexer switches to it
pub const DEFAULT_SETTLE_US: u32 = 2_000;

/// Blocking reference sampler.
///
/// Returns the 10-bit code of the reference measured with the supply rail as
/// ADC reference. Conversions are assumed to always complete.
pub trait ReferenceSampler {
    fn sample_reference(&mut self) -> u16;
}

/// Async version of [`ReferenceSampler`] for interrupt driven ADCs
#[allow(async_fn_in_trait)]
pub trait AsyncReferenceSampler {
    async fn sample_reference(&mut self) -> u16;
}

/// Waits for the reference to settle before every sample.
pub struct Settled<S, D> {
    sampler: S,
    delay: D,
    settle_us: u32,
}

impl<S, D> Settled<S, D> {
    pub fn new(sampler: S, delay: D) -> Self {
        Self::with_settle_time(sampler, delay, DEFAULT_SETTLE_US)
    }

    pub fn with_settle_time(sampler: S, delay: D, settle_us: u32) -> Self {
        Self {
            sampler,
            delay,
            settle_us,
        }
    }

    pub fn inner(&self) -> &S {
        &self.sampler
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.sampler
    }

    pub fn release(self) -> (S, D) {
        (self.sampler, self.delay)
    }
}

impl<S, D> ReferenceSampler for Settled<S, D>
where
    S: ReferenceSampler,
    D: embedded_hal::delay::DelayNs,
{
    fn sample_reference(&mut self) -> u16 {
        embedded_hal::delay::DelayNs::delay_us(&mut self.delay, self.settle_us);
        ReferenceSampler::sample_reference(&mut self.sampler)
    }
}

impl<S, D> AsyncReferenceSampler for Settled<S, D>
where
    S: AsyncReferenceSampler,
    D: embedded_hal_async::delay::DelayNs,
{
    async fn sample_reference(&mut self) -> u16 {
        embedded_hal_async::delay::DelayNs::delay_us(&mut self.delay, self.settle_us).await;
        AsyncReferenceSampler::sample_reference(&mut self.sampler).await
    }
}

/// Converts a signed raw conversion result into a bit level.
///
/// Single ended SAADC results go slightly negative around 0 V.
pub fn bit_level(raw: i16) -> u16 {
    raw.clamp(0, FULL_SCALE_COUNT as i16 - 1) as u16
}
