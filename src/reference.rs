use crate::sampler::{AsyncReferenceSampler, ReferenceSampler};

/// Nominal reference voltage in millivolts
pub const NOMINAL_REFERENCE_MV: u16 = 1100;
/// Largest supported deviation from the nominal reference, about 11.5%
pub const OFFSET_TOLERANCE_MV: i16 = 127;
/// Number of distinct codes of a 10-bit conversion
pub const FULL_SCALE_COUNT: u16 = 1024;

const MIN_REFERENCE_MV: u16 = NOMINAL_REFERENCE_MV - OFFSET_TOLERANCE_MV as u16;
const MAX_REFERENCE_MV: u16 = NOMINAL_REFERENCE_MV + OFFSET_TOLERANCE_MV as u16;

/// Calibration state of one reference pin.
///
/// The reference voltage is the only stored voltage, the offset is always
/// derived from it. The factor and the voltage are written together by
/// [`apply_sample`](Self::apply_sample) and used as a pair by every
/// conversion.
///
/// At 5000 mV supply a nominal reference reads about 225 counts, at 3300 mV
/// about 341 counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReferenceCalibrator {
    factor: u16,
    voltage: u16,
    calibrated: bool,
}

impl Default for ReferenceCalibrator {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ReferenceCalibrator {
    /// Creates a calibrator from a previously discovered reference offset in
    /// millivolts, clamped to ±[`OFFSET_TOLERANCE_MV`].
    pub const fn new(offset: i16) -> Self {
        let offset = if offset > OFFSET_TOLERANCE_MV {
            OFFSET_TOLERANCE_MV
        } else if offset < -OFFSET_TOLERANCE_MV {
            -OFFSET_TOLERANCE_MV
        } else {
            offset
        };
        Self {
            factor: 0,
            voltage: (NOMINAL_REFERENCE_MV as i16 + offset) as u16,
            calibrated: false,
        }
    }

    /// Samples the reference once and recalibrates.
    ///
    /// With `measured_vcc` of 0 only the factor is refreshed, otherwise the
    /// reference voltage is recomputed from the multimeter reading of the
    /// supply in millivolts. Returns the resulting reference offset.
    pub fn begin<S: ReferenceSampler>(&mut self, sampler: &mut S, measured_vcc: u16) -> i8 {
        let factor = sampler.sample_reference();
        self.apply_sample(factor, measured_vcc)
    }

    /// Async version of [`begin`](Self::begin)
    pub async fn begin_async<S: AsyncReferenceSampler>(
        &mut self,
        sampler: &mut S,
        measured_vcc: u16,
    ) -> i8 {
        let factor = sampler.sample_reference().await;
        self.apply_sample(factor, measured_vcc)
    }

    /// Calibrates from an already taken reference sample.
    pub fn apply_sample(&mut self, factor: u16, measured_vcc: u16) -> i8 {
        self.factor = factor;
        self.calibrated = true;
        if measured_vcc > 0 {
            let full_scale = FULL_SCALE_COUNT as u32;
            let voltage = (2 * factor as u32 * measured_vcc as u32 + full_scale) / (2 * full_scale);
            self.voltage = clamp_reference(voltage);
        }
        debug!(
            "Reference: factor = {}, voltage = {}, offset = {}",
            self.factor,
            self.voltage,
            self.reference_offset()
        );
        self.reference_offset()
    }

    /// Converts a bit level of any analog input into millivolts, rounding
    /// half up.
    ///
    /// The calibrator must hold a non-zero factor. Debug builds assert it,
    /// release builds return `u32::MAX`.
    pub fn millivolts(&self, bit_level: u16) -> u32 {
        debug_assert!(self.factor > 0, "conversion without a reference factor");
        let factor = self.factor as u32;
        (2 * self.voltage as u32 * bit_level as u32 + factor)
            .checked_div(2 * factor)
            .unwrap_or(u32::MAX)
    }

    /// Samples the reference and returns the supply voltage in millivolts.
    pub fn measure_vcc<S: ReferenceSampler>(&mut self, sampler: &mut S) -> u32 {
        self.begin(sampler, 0);
        self.millivolts(FULL_SCALE_COUNT)
    }

    /// Async version of [`measure_vcc`](Self::measure_vcc)
    pub async fn measure_vcc_async<S: AsyncReferenceSampler>(&mut self, sampler: &mut S) -> u32 {
        self.begin_async(sampler, 0).await;
        self.millivolts(FULL_SCALE_COUNT)
    }

    pub fn reference_factor(&self) -> u16 {
        self.factor
    }

    pub fn reference_voltage(&self) -> u16 {
        self.voltage
    }

    /// Difference of the reference voltage from [`NOMINAL_REFERENCE_MV`],
    /// the value to persist and hand back to [`new`](Self::new).
    pub fn reference_offset(&self) -> i8 {
        (self.voltage as i16 - NOMINAL_REFERENCE_MV as i16) as i8
    }

    /// Whether any calibration or supply measurement has run
    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }
}

fn clamp_reference(voltage: u32) -> u16 {
    if voltage < MIN_REFERENCE_MV as u32 || voltage > MAX_REFERENCE_MV as u32 {
        warn!("Reference voltage {} mV outside tolerance, clamping", voltage);
    }
    voltage.clamp(MIN_REFERENCE_MV as u32, MAX_REFERENCE_MV as u32) as u16
}
