#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // CSV axis parsing must reject garbage without panicking.
    let _ = phasectl_config::parse_wavelength_csv(data);
});
