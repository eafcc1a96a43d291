use embassy_time::Duration;
use vccref::config::parse_millivolts;

/// Time the reference pin needs after power up before it is sampled
pub static REFERENCE_SETTLE_US: u32 = 2_000;

/// Last flash page, kept out of the application region by memory.x
pub static OFFSET_PAGE: u32 = 0x000F_F000;

/// Supply voltage read with a multimeter, set through `VCCREF_MEASURED_VCC`
/// when flashing a board for calibration. 0 keeps the stored offset.
pub const MEASURED_VCC: u16 = match option_env!("VCCREF_MEASURED_VCC") {
    Some(value) => match parse_millivolts(value) {
        Some(mv) => mv,
        None => panic!("VCCREF_MEASURED_VCC must be a millivolt integer"),
    },
    None => 0,
};

// Debug timmings
#[cfg(debug_assertions)]
pub static SAMPLE_RATE: Duration = Duration::from_secs(1);
#[cfg(debug_assertions)]
pub static ADV_INTERVAL: u32 = 400; // 400 * 0.625 = 250ms

// Production timmings for power saving
#[cfg(not(debug_assertions))]
pub static SAMPLE_RATE: Duration = Duration::from_secs(30);
#[cfg(not(debug_assertions))]
pub static ADV_INTERVAL: u32 = 8000; // 8000 * 0.625 = 5000ms
