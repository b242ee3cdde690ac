#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and wavelength-axis parsing for the phase control stack.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Every section is optional; an empty file yields the bench defaults.
//! - The wavelength CSV loader enforces its header and a strictly
//!   increasing, finite axis.
use serde::Deserialize;

/// Wavelength axis CSV schema.
///
/// Expected header:
/// wavelength_nm
///
/// Example:
/// wavelength_nm
/// 796.02
/// 796.09
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct WavelengthRow {
    pub wavelength_nm: f64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SpectrometerCfg {
    /// Acquisition process emitting JSON lines on stdout (program + args).
    pub command: Vec<String>,
    /// Optional wavelength axis used when the stream meta carries none.
    pub wavelength_csv: Option<String>,
    /// Min-max normalize each frame before it reaches the estimators.
    pub normalize: bool,
    /// Frame rate of the simulated spectrometer.
    pub simulate_rate_hz: u32,
}

impl Default for SpectrometerCfg {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            wavelength_csv: None,
            normalize: true,
            simulate_rate_hz: 20,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ActuatorCfg {
    /// Serial port of the rotation stage; absent means simulated.
    pub port: Option<String>,
    /// Device bus address ("0".."F").
    pub address: String,
    /// Travel speed in percent of maximum.
    pub speed_percent: u8,
    /// Upper bound on waiting for a motion to settle.
    pub settle_timeout_ms: u64,
    pub pulses_per_degree: f64,
}

impl Default for ActuatorCfg {
    fn default() -> Self {
        Self {
            port: None,
            address: "0".to_string(),
            speed_percent: 70,
            settle_timeout_ms: 5000,
            pulses_per_degree: 398.2222,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineCfg {
    /// Poll interval of the production loop and the actuator gate.
    pub poll_ms: u64,
    /// Upper bound on one wait for a pending spectrum.
    pub pending_wait_ms: u64,
}

impl Default for EngineCfg {
    fn default() -> Self {
        Self {
            poll_ms: 10,
            pending_wait_ms: 100,
        }
    }
}

/// Seed model coefficients for the interference fit.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct FitSeed {
    pub central_wavelength_nm: f64,
    pub bandwidth_nm: f64,
    pub baseline: f64,
    pub phase_rad: f64,
    pub tau_ps: f64,
    /// Chirp of the right pulse (THz/ps).
    pub chirp_r: f64,
    /// Chirp of the left pulse (THz/ps).
    pub chirp_l: f64,
}

impl Default for FitSeed {
    fn default() -> Self {
        Self {
            central_wavelength_nm: 802.38,
            bandwidth_nm: 7.4728,
            baseline: 0.3338,
            phase_rad: -3.34,
            tau_ps: 0.30,
            chirp_r: 0.60,
            chirp_l: 0.60,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StabilizationCfg {
    pub min_nm: f64,
    pub max_nm: f64,
    /// Maximum mean residual for a phase window to be accepted.
    pub residuals_threshold: f64,
    /// Spectra per averaging window.
    pub avg_spectra: usize,
    /// Dead-band around the target phase (degrees).
    pub tolerance_deg: f64,
    /// Plate degrees per phase degree.
    pub correction_scale: f64,
    /// Either 1 or -1.
    pub correction_sign: i8,
    pub target_phase_rad: f64,
    pub seed: FitSeed,
}

impl Default for StabilizationCfg {
    fn default() -> Self {
        Self {
            min_nm: 796.0,
            max_nm: 810.0,
            residuals_threshold: 15.0,
            avg_spectra: 10,
            tolerance_deg: 10.0,
            correction_scale: 1.0 / 8.0,
            correction_sign: 1,
            target_phase_rad: 0.0,
            seed: FitSeed::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeMode {
    #[default]
    Maximize,
    Minimize,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EnvelopeCfg {
    pub min_nm: f64,
    pub max_nm: f64,
    pub step_deg: f64,
    pub mode: EnvelopeMode,
    /// Moving-average window in points; 1 disables smoothing.
    pub smooth_window: usize,
    /// Minimum metric change that counts as an improvement.
    pub improve_eps: f64,
}

impl Default for EnvelopeCfg {
    fn default() -> Self {
        Self {
            min_nm: 796.0,
            max_nm: 810.0,
            step_deg: 1.0,
            mode: EnvelopeMode::Maximize,
            smooth_window: 1,
            improve_eps: 0.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RandomizerCfg {
    pub step_deg: f64,
    pub speed_percent: u8,
}

impl Default for RandomizerCfg {
    fn default() -> Self {
        Self {
            step_deg: 90.0,
            speed_percent: 70,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub spectrometer: SpectrometerCfg,
    pub actuator: ActuatorCfg,
    pub engine: EngineCfg,
    pub stabilization: StabilizationCfg,
    pub envelope: EnvelopeCfg,
    pub randomizer: RandomizerCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Parse a wavelength axis from CSV text with the exact header `wavelength_nm`.
pub fn parse_wavelength_csv<R: std::io::Read>(reader: R) -> eyre::Result<Vec<f64>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers: {}", e))?
        .clone();
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != ["wavelength_nm"] {
        eyre::bail!(
            "wavelength CSV must have header 'wavelength_nm', got: {}",
            actual.join(",")
        );
    }

    let mut axis = Vec::new();
    for (idx, rec) in rdr.deserialize::<WavelengthRow>().enumerate() {
        let row = rec.map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 2, e))?;
        if !row.wavelength_nm.is_finite() || row.wavelength_nm <= 0.0 {
            eyre::bail!("wavelength at row {} must be finite and > 0", idx + 2);
        }
        if let Some(prev) = axis.last()
            && row.wavelength_nm <= *prev
        {
            eyre::bail!(
                "wavelength axis must be strictly increasing (row {}: {} after {})",
                idx + 2,
                row.wavelength_nm,
                prev
            );
        }
        axis.push(row.wavelength_nm);
    }
    if axis.is_empty() {
        eyre::bail!("wavelength CSV has no rows");
    }
    Ok(axis)
}

pub fn load_wavelength_csv(path: &std::path::Path) -> eyre::Result<Vec<f64>> {
    let file = std::fs::File::open(path)
        .map_err(|e| eyre::eyre!("open wavelength CSV {:?}: {}", path, e))?;
    parse_wavelength_csv(file).map_err(|e| eyre::eyre!("{:?}: {}", path, e))
}

fn check_range(section: &str, min_nm: f64, max_nm: f64) -> eyre::Result<()> {
    if !(min_nm.is_finite() && max_nm.is_finite()) {
        eyre::bail!("{section}.min_nm and {section}.max_nm must be finite");
    }
    if min_nm <= 0.0 {
        eyre::bail!("{section}.min_nm must be > 0");
    }
    if max_nm <= min_nm {
        eyre::bail!("{section}.max_nm must be > {section}.min_nm");
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Spectrometer
        if self.spectrometer.simulate_rate_hz == 0 {
            eyre::bail!("spectrometer.simulate_rate_hz must be > 0");
        }
        if self.spectrometer.simulate_rate_hz > 1000 {
            eyre::bail!("spectrometer.simulate_rate_hz is unreasonably large (>1kHz)");
        }

        // Actuator
        if self.actuator.speed_percent == 0 || self.actuator.speed_percent > 100 {
            eyre::bail!("actuator.speed_percent must be in [1, 100]");
        }
        if self.actuator.settle_timeout_ms == 0 {
            eyre::bail!("actuator.settle_timeout_ms must be >= 1");
        }
        if !(self.actuator.pulses_per_degree.is_finite() && self.actuator.pulses_per_degree > 0.0) {
            eyre::bail!("actuator.pulses_per_degree must be > 0");
        }
        let addr_ok = self.actuator.address.len() == 1
            && self
                .actuator
                .address
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase());
        if !addr_ok {
            eyre::bail!("actuator.address must be a single hex digit 0-9 or A-F");
        }

        // Engine
        if self.engine.poll_ms == 0 {
            eyre::bail!("engine.poll_ms must be >= 1");
        }
        if self.engine.pending_wait_ms < self.engine.poll_ms {
            eyre::bail!("engine.pending_wait_ms must be >= engine.poll_ms");
        }

        // Stabilization
        let st = &self.stabilization;
        check_range("stabilization", st.min_nm, st.max_nm)?;
        if st.avg_spectra == 0 {
            eyre::bail!("stabilization.avg_spectra must be >= 1");
        }
        if !(st.residuals_threshold.is_finite() && st.residuals_threshold > 0.0) {
            eyre::bail!("stabilization.residuals_threshold must be > 0");
        }
        if !(st.tolerance_deg.is_finite() && st.tolerance_deg >= 0.0) {
            eyre::bail!("stabilization.tolerance_deg must be >= 0");
        }
        if !(st.correction_scale.is_finite() && st.correction_scale > 0.0) {
            eyre::bail!("stabilization.correction_scale must be > 0");
        }
        if st.correction_sign != 1 && st.correction_sign != -1 {
            eyre::bail!("stabilization.correction_sign must be 1 or -1");
        }
        if !st.target_phase_rad.is_finite() {
            eyre::bail!("stabilization.target_phase_rad must be finite");
        }
        if !(st.seed.bandwidth_nm.is_finite() && st.seed.bandwidth_nm > 0.0) {
            eyre::bail!("stabilization.seed.bandwidth_nm must be > 0");
        }
        if !(0.0..1.0).contains(&st.seed.baseline) {
            eyre::bail!("stabilization.seed.baseline must be in [0.0, 1.0)");
        }

        // Envelope
        let env = &self.envelope;
        check_range("envelope", env.min_nm, env.max_nm)?;
        if !(env.step_deg.is_finite() && env.step_deg > 0.0) {
            eyre::bail!("envelope.step_deg must be > 0");
        }
        if env.smooth_window == 0 {
            eyre::bail!("envelope.smooth_window must be >= 1");
        }
        if !(env.improve_eps.is_finite() && env.improve_eps >= 0.0) {
            eyre::bail!("envelope.improve_eps must be >= 0");
        }

        // Randomizer
        if !(self.randomizer.step_deg.is_finite() && self.randomizer.step_deg > 0.0) {
            eyre::bail!("randomizer.step_deg must be > 0");
        }
        if self.randomizer.speed_percent == 0 || self.randomizer.speed_percent > 100 {
            eyre::bail!("randomizer.speed_percent must be in [1, 100]");
        }

        // Logging: rotation values are checked where the appender is built

        Ok(())
    }
}
