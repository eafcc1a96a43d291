#![no_std]
#![no_main]

mod constants;

use {defmt_rtt as _, embassy_nrf as _, panic_probe as _};

use core::{mem, slice};
use defmt::unwrap;
use embassy_executor::Spawner;
use embassy_nrf::{
    bind_interrupts,
    config::LfclkSource,
    interrupt::Priority,
    saadc::{self, ChannelConfig, Saadc},
};
use embassy_time::{Delay, Timer};
use futures::{
    future::{self, Either},
    pin_mut,
};
use nrf_softdevice::ble::advertisement_builder::{
    AdvertisementDataType, Flag, LegacyAdvertisementBuilder, LegacyAdvertisementPayload,
};
use nrf_softdevice::ble::peripheral;
use nrf_softdevice::raw;
use nrf_softdevice::{Flash, Softdevice};
use vccref::voltage::{self, SaadcSampler};
use vccref::{OffsetStore, ReferenceCalibrator, Settled};

use crate::constants::{ADV_INTERVAL, MEASURED_VCC, OFFSET_PAGE, REFERENCE_SETTLE_US, SAMPLE_RATE};

const INPUT_CHANNEL: usize = 1;

bind_interrupts!(struct Irqs {
    SAADC => saadc::InterruptHandler;
});

#[repr(C)]
#[allow(dead_code)]
struct ManufData {
    id: u16,
    version: u8,
    counter: u8,
    vcc: u16,
    input: u16,
    factor: u16,
    offset: i8,
    reserved: u8,
}

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

async fn advertise(
    sd: &'static Softdevice,
    counter: u8,
    calibrator: &ReferenceCalibrator,
    vcc: u32,
    input: u32,
) {
    let config = peripheral::Config {
        interval: ADV_INTERVAL,
        ..Default::default()
    };

    let data = ManufData {
        id: 0xFFFF,
        version: 0x01,
        counter,
        vcc: vcc.min(u16::MAX as u32) as u16,
        input: input.min(u16::MAX as u32) as u16,
        factor: calibrator.reference_factor(),
        offset: calibrator.reference_offset(),
        reserved: 0,
    };

    let buff = unsafe {
        slice::from_raw_parts(&data as *const _ as *const u8, mem::size_of::<ManufData>())
    };

    let adv_data: LegacyAdvertisementPayload = LegacyAdvertisementBuilder::new()
        .flags(&[Flag::GeneralDiscovery, Flag::LE_Only])
        .short_name("Vccref")
        .raw(AdvertisementDataType::MANUFACTURER_SPECIFIC_DATA, buff)
        .build();

    let adv = peripheral::NonconnectableAdvertisement::NonscannableUndirected {
        adv_data: &adv_data,
    };

    unwrap!(peripheral::advertise(sd, adv, &config).await)
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    defmt::info!("Vccref Start");
    defmt::info!(
        "Vccref version {}, built for {} by {}.",
        built_info::PKG_VERSION,
        built_info::TARGET,
        built_info::RUSTC_VERSION
    );
    if let (Some(version), Some(hash), Some(dirty)) = (
        built_info::GIT_VERSION,
        built_info::GIT_COMMIT_HASH_SHORT,
        built_info::GIT_DIRTY,
    ) {
        defmt::info!("Git version: {} ({}) dirty: {}", version, hash, dirty);
    }

    // 0 is Highest. Lower prio number can preempt higher prio number
    // Softdevice has reserved priorities 0, 1 and 4
    let mut config = embassy_nrf::config::Config::default();
    config.gpiote_interrupt_priority = Priority::P2;
    config.time_interrupt_priority = Priority::P2;
    config.lfclk_source = LfclkSource::ExternalXtal;

    let p = embassy_nrf::init(config);

    let config = nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_XTAL as u8,
            rc_ctiv: 0,
            rc_temp_ctiv: 0,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        ..Default::default()
    };
    let sd = Softdevice::enable(&config);
    unwrap!(spawner.spawn(softdevice_task(sd)));

    // AIN0 carries the reference, AIN1 is the measured input
    let reference = voltage::channel(ChannelConfig::single_ended(p.P0_02));
    let input = voltage::channel(ChannelConfig::single_ended(p.P0_03));
    let mut saadc = Saadc::new(p.SAADC, Irqs, voltage::config(), [reference, input]);
    saadc.calibrate().await;
    let mut sampler = Settled::with_settle_time(SaadcSampler::new(saadc), Delay, REFERENCE_SETTLE_US);

    let mut store = match OffsetStore::new(Flash::take(sd), OFFSET_PAGE) {
        Ok(store) => Some(store),
        Err(e) => {
            defmt::error!("Offset storage unavailable: {}", defmt::Display2Format(&e));
            None
        }
    };
    let stored = match &mut store {
        Some(store) => match store.load().await {
            Ok(offset) => offset,
            Err(e) => {
                defmt::error!("Error reading offset: {}", defmt::Display2Format(&e));
                None
            }
        },
        None => None,
    };
    defmt::info!("Stored offset: {}", stored);

    let mut calibrator = ReferenceCalibrator::new(stored.unwrap_or(0).into());
    let offset = calibrator.begin_async(&mut sampler, MEASURED_VCC).await;
    if MEASURED_VCC > 0 {
        defmt::info!("Calibrated against {} mV: offset {} mV", MEASURED_VCC, offset);
        if let Some(store) = &mut store {
            if let Err(e) = store.save(offset).await {
                defmt::error!("Error saving offset: {}", defmt::Display2Format(&e));
            }
        }
    }

    let mut counter = 0;
    loop {
        // ADC
        let vcc = calibrator.measure_vcc_async(&mut sampler).await;
        let level = sampler.inner().level(INPUT_CHANNEL);
        let input = calibrator.millivolts(level);
        defmt::info!(
            "Vcc: {} mV, input: {} mV ({} bits), factor: {}",
            vcc,
            input,
            level,
            calibrator.reference_factor()
        );

        defmt::info!("Start advertising {}", counter);
        let adv_fut = advertise(sd, counter, &calibrator, vcc, input);
        pin_mut!(adv_fut);
        let sleep_fut = Timer::after(SAMPLE_RATE);
        pin_mut!(sleep_fut);

        if let Either::Left(_) = future::select(adv_fut, sleep_fut).await {
            defmt::warn!("Advertising stopped early");
        }
        counter = counter.wrapping_add(1);
    }
}

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}
