//! INA226 current/voltage/power monitor driver.
//!
//! Two ways of turning the shunt measurement into a current are supported:
//!
//! * [`MeasurementMode::Fixed`]: the part's own current register, scaled by
//!   the calibration's current LSB.
//! * [`MeasurementMode::AutoRange`]: a PMOS FET across the shunt is switched
//!   by the ALERT output once the shunt voltage passes the programmed limit.
//!   The driver cannot see the FET. It assumes the FET conducts whenever the
//!   measured shunt voltage is below 60 % of the alert threshold, and then
//!   divides by the shunt in parallel with the calibrated PMOS on-resistance.
//!   This is an inference from the voltage, not a reading of the FET state.

use crate::consts::ina226::{self as regs, config, mask_enable};
use crate::device::Ch341;
use crate::error::{Error, Result};
use crate::i2c::I2cAddress;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::thread;
use std::time::Duration;

/// AVG 16, 1.1 ms bus and shunt conversion, continuous shunt and bus.
pub const DEFAULT_CONFIG: u16 = config::FIXED_BIT
    | config::AVG_16
    | config::VBUSCT_1100US
    | config::VSHCT_1100US
    | config::MODE_SHUNT_BUS_CONT;
pub const DEFAULT_MAX_CURRENT: f64 = 0.8192;
pub const DEFAULT_NOMINAL_BUS_VOLTAGE: f64 = 3.3;
/// PMOS on-resistance assumed until one is measured.
pub const DEFAULT_PMOS_RESISTANCE: f64 = 0.05;
pub const DEFAULT_PMOS_SETTLE: Duration = Duration::from_millis(200);
const RESET_DELAY: Duration = Duration::from_millis(10);
/// Fraction of the alert threshold below which the FET is taken to be on.
const CONDUCTING_FRACTION: f64 = 0.6;
/// Alert limit that keeps the FET on for any load.
const ALERT_LIMIT_MIN: u16 = 0x0001;

/// Driver lifecycle. Any failure during [`Ina226::initialize`] returns to
/// `Uninitialized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SenseState {
    Uninitialized,
    Checked,
    Configured,
    Calibrated,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MeasurementMode {
    #[default]
    Fixed,
    AutoRange,
}

impl fmt::Display for MeasurementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasurementMode::Fixed => write!(f, "fixed"),
            MeasurementMode::AutoRange => write!(f, "auto-range"),
        }
    }
}

/// Scaling derived from the shunt and the expected maximum current.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub shunt_ohms: f64,
    pub max_current: f64,
    /// Amps per current register LSB.
    pub current_lsb: f64,
    /// Watts per power register LSB.
    pub power_lsb: f64,
    /// Value for the calibration register.
    pub value: u16,
}

impl Calibration {
    /// `current_lsb = max/32768`, `cal = floor(0.00512 / (current_lsb * R))`,
    /// `power_lsb = 25 * current_lsb`.
    pub fn compute(shunt_ohms: f64, max_current: f64) -> Result<Self> {
        if !(max_current.is_finite() && max_current > 0.0) {
            return Err(Error::InvalidCalibration(format!(
                "max current must be positive, got {} A",
                max_current
            )));
        }
        if !(shunt_ohms.is_finite() && shunt_ohms > 0.0) {
            return Err(Error::InvalidCalibration(format!(
                "shunt resistance must be positive, got {} Ω",
                shunt_ohms
            )));
        }
        let current_lsb = max_current / regs::CURRENT_LSB_DIVISOR;
        let cal = (regs::CAL_SCALE / (current_lsb * shunt_ohms)).floor();
        if cal < 1.0 || cal > regs::MAX_CALIBRATION as f64 {
            return Err(Error::InvalidCalibration(format!(
                "calibration value {} outside 1..=0x7FFF for R={} Ω, Imax={} A",
                cal, shunt_ohms, max_current
            )));
        }
        Ok(Self {
            shunt_ohms,
            max_current,
            current_lsb,
            power_lsb: regs::POWER_LSB_RATIO * current_lsb,
            value: cal as u16,
        })
    }
}

/// Result of solving for the PMOS on-resistance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PmosSolution {
    /// Load current `Vbus / R_load`.
    pub current: f64,
    /// Shunt in parallel with the FET, `Vshunt / I`.
    pub effective_resistance: f64,
    pub on_resistance: f64,
}

/// Solves the PMOS on-resistance from one measurement with a known load.
pub fn solve_pmos_resistance(
    bus_voltage: f64,
    shunt_voltage: f64,
    known_load_ohms: f64,
    shunt_ohms: f64,
) -> Result<PmosSolution> {
    if !(known_load_ohms > 0.0) {
        return Err(Error::InvalidCalibration(format!(
            "known load must be positive, got {} Ω",
            known_load_ohms
        )));
    }
    let current = bus_voltage / known_load_ohms;
    if !(current > 0.0) {
        return Err(Error::InvalidCalibration(format!(
            "measured current {:.6} A is not positive",
            current
        )));
    }
    let effective_resistance = shunt_voltage / current;
    if !(effective_resistance > 0.0) {
        return Err(Error::InvalidCalibration(format!(
            "effective resistance {:.6} Ω is not positive",
            effective_resistance
        )));
    }
    if effective_resistance >= shunt_ohms {
        return Err(Error::InvalidCalibration(format!(
            "effective resistance {:.6} Ω is not below the shunt {} Ω; FET not conducting?",
            effective_resistance, shunt_ohms
        )));
    }
    let on_resistance = effective_resistance * shunt_ohms / (shunt_ohms - effective_resistance);
    Ok(PmosSolution {
        current,
        effective_resistance,
        on_resistance,
    })
}

/// One complete set of readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub shunt_voltage: f64,
    pub bus_voltage: f64,
    pub current: f64,
    pub power: f64,
    /// `bus_voltage + shunt_voltage`.
    pub load_voltage: f64,
    /// Resistance the current was derived from.
    pub effective_resistance: f64,
    /// Inferred FET state (always false in fixed mode).
    pub fet_conducting: bool,
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bus {:.3} V, shunt {:.3} mV, current {:.3} mA, power {:.3} mW, load {:.3} V",
            self.bus_voltage,
            self.shunt_voltage * 1e3,
            self.current * 1e3,
            self.power * 1e3,
            self.load_voltage
        )
    }
}

/// Snapshot returned by [`Ina226::info`]; registers that failed to read are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Ina226Info {
    pub address: I2cAddress,
    pub state: SenseState,
    pub mode: MeasurementMode,
    pub shunt_ohms: f64,
    pub calibration: Option<Calibration>,
    pub configuration: Option<u16>,
    pub manufacturer_id: Option<u16>,
    pub die_id: Option<u16>,
}

impl fmt::Display for Ina226Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = |v: Option<u16>| v.map_or("N/A".to_string(), |v| format!("0x{:04X}", v));
        writeln!(f, "address:         {}", self.address)?;
        writeln!(f, "state:           {:?}", self.state)?;
        writeln!(f, "mode:            {}", self.mode)?;
        writeln!(f, "shunt:           {} Ω", self.shunt_ohms)?;
        match &self.calibration {
            Some(c) => {
                writeln!(f, "current LSB:     {:.6e} A", c.current_lsb)?;
                writeln!(f, "power LSB:       {:.6e} W", c.power_lsb)?;
                writeln!(f, "calibration:     0x{:04X}", c.value)?;
            }
            None => writeln!(f, "calibration:     none")?,
        }
        writeln!(f, "configuration:   {}", hex(self.configuration))?;
        writeln!(f, "manufacturer ID: {}", hex(self.manufacturer_id))?;
        write!(f, "die ID:          {}", hex(self.die_id))
    }
}

/// An INA226 on the bridge's I2C bus.
#[derive(Debug, Clone)]
pub struct Ina226 {
    address: I2cAddress,
    shunt_ohms: f64,
    config: u16,
    state: SenseState,
    calibration: Option<Calibration>,
    mode: MeasurementMode,
    alert_threshold: Option<f64>,
    nominal_bus_voltage: f64,
    /// PMOS on-resistance keyed by nominal bus voltage in millivolts.
    pmos_resistance: BTreeMap<u32, f64>,
    pmos_settle: Duration,
}

fn millivolts(volts: f64) -> u32 {
    (volts * 1000.0).round().max(0.0) as u32
}

impl Ina226 {
    pub fn new(address: u8, shunt_ohms: f64) -> Result<Self> {
        let address = I2cAddress::new(address)?;
        if !(shunt_ohms.is_finite() && shunt_ohms > 0.0) {
            return Err(Error::InvalidCalibration(format!(
                "shunt resistance must be positive, got {} Ω",
                shunt_ohms
            )));
        }
        let mut pmos_resistance = BTreeMap::new();
        pmos_resistance.insert(
            millivolts(DEFAULT_NOMINAL_BUS_VOLTAGE),
            DEFAULT_PMOS_RESISTANCE,
        );
        Ok(Self {
            address,
            shunt_ohms,
            config: DEFAULT_CONFIG,
            state: SenseState::Uninitialized,
            calibration: None,
            mode: MeasurementMode::Fixed,
            alert_threshold: None,
            nominal_bus_voltage: DEFAULT_NOMINAL_BUS_VOLTAGE,
            pmos_resistance,
            pmos_settle: DEFAULT_PMOS_SETTLE,
        })
    }

    pub fn address(&self) -> I2cAddress {
        self.address
    }
    pub fn shunt_ohms(&self) -> f64 {
        self.shunt_ohms
    }
    pub fn state(&self) -> SenseState {
        self.state
    }
    pub fn mode(&self) -> MeasurementMode {
        self.mode
    }
    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }
    pub fn alert_threshold(&self) -> Option<f64> {
        self.alert_threshold
    }

    /// Configuration word written by [`Self::initialize`].
    pub fn set_config(&mut self, config: u16) {
        self.config = config;
    }

    pub fn nominal_bus_voltage(&self) -> f64 {
        self.nominal_bus_voltage
    }

    /// Selects which PMOS map entry auto-range uses.
    pub fn set_nominal_bus_voltage(&mut self, volts: f64) {
        self.nominal_bus_voltage = volts;
    }

    pub fn set_pmos_settle(&mut self, settle: Duration) {
        self.pmos_settle = settle;
    }

    /// Calibrated PMOS on-resistances, keyed by millivolts.
    pub fn pmos_map(&self) -> &BTreeMap<u32, f64> {
        &self.pmos_resistance
    }

    pub fn set_pmos_resistance(&mut self, nominal_bus_voltage: f64, ohms: f64) {
        self.pmos_resistance.insert(millivolts(nominal_bus_voltage), ohms);
    }

    /// On-resistance for `nominal_bus_voltage`, from the closest map entry.
    pub fn pmos_resistance(&self, nominal_bus_voltage: f64) -> f64 {
        let key = millivolts(nominal_bus_voltage);
        self.pmos_resistance
            .iter()
            .min_by_key(|(mv, _)| mv.abs_diff(key))
            .map_or(DEFAULT_PMOS_RESISTANCE, |(_, r)| *r)
    }

    // --- Register Access ---

    fn write_register(&self, bridge: &mut Ch341, reg: u8, value: u16) -> Result<()> {
        debug!("INA226 {} reg 0x{:02X} <- 0x{:04X}", self.address, reg, value);
        bridge.write_register(self.address.value(), reg, &value.to_be_bytes())
    }

    fn read_register(&self, bridge: &mut Ch341, reg: u8) -> Result<u16> {
        let data = bridge.read_register(self.address.value(), reg, 2, true)?;
        Ok(u16::from_be_bytes([data[0], data[1]]))
    }

    // --- Lifecycle ---

    /// Verifies manufacturer and die IDs.
    pub fn check_device(&mut self, bridge: &mut Ch341) -> Result<()> {
        let manufacturer = self.read_register(bridge, regs::REG_MANUFACTURER_ID)?;
        if manufacturer != regs::MANUFACTURER_ID {
            return Err(Error::DeviceMismatch {
                address: self.address,
                message: format!(
                    "manufacturer ID 0x{:04X}, expected 0x{:04X}",
                    manufacturer,
                    regs::MANUFACTURER_ID
                ),
            });
        }
        let die = self.read_register(bridge, regs::REG_DIE_ID)?;
        if die != regs::DIE_ID {
            return Err(Error::DeviceMismatch {
                address: self.address,
                message: format!("die ID 0x{:04X}, expected 0x{:04X}", die, regs::DIE_ID),
            });
        }
        debug!("INA226 identified at {}", self.address);
        if self.state == SenseState::Uninitialized {
            self.state = SenseState::Checked;
        }
        Ok(())
    }

    /// Software reset. The part's calibration is cleared with it.
    pub fn reset(&mut self, bridge: &mut Ch341) -> Result<()> {
        debug!("Resetting INA226 {}", self.address);
        self.write_register(bridge, regs::REG_CONFIGURATION, config::RESET)?;
        thread::sleep(RESET_DELAY);
        self.calibration = None;
        self.state = self.state.min(SenseState::Checked);
        Ok(())
    }

    pub fn configure(&mut self, bridge: &mut Ch341, config: u16) -> Result<()> {
        self.write_register(bridge, regs::REG_CONFIGURATION, config)?;
        self.config = config;
        if self.state >= SenseState::Checked {
            self.state = self.state.max(SenseState::Configured);
        }
        Ok(())
    }

    /// Computes and writes the calibration for `max_current`.
    pub fn calibrate(&mut self, bridge: &mut Ch341, max_current: f64) -> Result<Calibration> {
        let cal = Calibration::compute(self.shunt_ohms, max_current)?;
        self.write_register(bridge, regs::REG_CALIBRATION, cal.value)?;
        info!(
            "INA226 {} calibrated: current LSB {:.6e} A, power LSB {:.6e} W, cal 0x{:04X}",
            self.address, cal.current_lsb, cal.power_lsb, cal.value
        );
        self.calibration = Some(cal);
        if self.state >= SenseState::Configured {
            self.state = SenseState::Calibrated;
        }
        Ok(cal)
    }

    /// Flush, identity check, reset, configure, calibrate.
    ///
    /// In auto-range mode the alert programming lost by the reset is restored.
    pub fn initialize(&mut self, bridge: &mut Ch341, max_current: f64) -> Result<()> {
        self.state = SenseState::Uninitialized;
        self.calibration = None;
        let result = self.run_initialize(bridge, max_current);
        match result {
            Ok(()) => {
                self.state = SenseState::Ready;
                info!("INA226 {} initialized ({} mode)", self.address, self.mode);
            }
            Err(ref e) => {
                warn!("INA226 {} initialization failed: {}", self.address, e);
                self.state = SenseState::Uninitialized;
                self.calibration = None;
            }
        }
        result
    }

    fn run_initialize(&mut self, bridge: &mut Ch341, max_current: f64) -> Result<()> {
        // Fail before touching the part when the inputs cannot calibrate.
        Calibration::compute(self.shunt_ohms, max_current)?;
        bridge.flush()?;
        self.check_device(bridge)?;
        self.reset(bridge)?;
        self.configure(bridge, self.config)?;
        self.calibrate(bridge, max_current)?;
        if let (MeasurementMode::AutoRange, Some(threshold)) = (self.mode, self.alert_threshold) {
            self.program_alert(bridge, threshold)?;
        }
        Ok(())
    }

    // --- Measurements ---

    /// Shunt voltage in volts (signed, 2.5 µV LSB).
    pub fn read_shunt_voltage(&self, bridge: &mut Ch341) -> Result<f64> {
        let raw = self.read_register(bridge, regs::REG_SHUNT_VOLTAGE)? as i16;
        Ok(raw as f64 * regs::SHUNT_LSB_V)
    }

    /// Bus voltage in volts (1.25 mV LSB).
    pub fn read_bus_voltage(&self, bridge: &mut Ch341) -> Result<f64> {
        let raw = self.read_register(bridge, regs::REG_BUS_VOLTAGE)?;
        Ok(raw as f64 * regs::BUS_LSB_V)
    }

    fn require_calibration(&self) -> Result<Calibration> {
        self.calibration.ok_or(Error::NotCalibrated)
    }

    /// Resistance to divide the shunt voltage by, and whether the FET is
    /// assumed on. Fixed mode always answers the bare shunt.
    pub fn effective_resistance(&self, shunt_voltage: f64) -> (f64, bool) {
        match (self.mode, self.alert_threshold) {
            (MeasurementMode::AutoRange, Some(threshold)) => {
                let conducting = shunt_voltage < threshold * CONDUCTING_FRACTION;
                if conducting {
                    let pmos = self.pmos_resistance(self.nominal_bus_voltage);
                    (self.shunt_ohms * pmos / (self.shunt_ohms + pmos), true)
                } else {
                    (self.shunt_ohms, false)
                }
            }
            _ => (self.shunt_ohms, false),
        }
    }

    /// Current in amps.
    pub fn read_current(&self, bridge: &mut Ch341) -> Result<f64> {
        let cal = self.require_calibration()?;
        match self.mode {
            MeasurementMode::Fixed => {
                let raw = self.read_register(bridge, regs::REG_CURRENT)? as i16;
                debug!("INA226 {} current raw {}", self.address, raw);
                Ok(raw as f64 * cal.current_lsb)
            }
            MeasurementMode::AutoRange => {
                let shunt = self.read_shunt_voltage(bridge)?;
                let (r_eff, _) = self.effective_resistance(shunt);
                Ok(shunt / r_eff)
            }
        }
    }

    /// Power in watts.
    ///
    /// Fixed mode reads the power register. In auto-range mode that register
    /// is scaled for the bare shunt, so power is the corrected current times
    /// the bus voltage instead.
    pub fn read_power(&self, bridge: &mut Ch341) -> Result<f64> {
        let cal = self.require_calibration()?;
        match self.mode {
            MeasurementMode::Fixed => {
                let raw = self.read_register(bridge, regs::REG_POWER)?;
                Ok(raw as f64 * cal.power_lsb)
            }
            MeasurementMode::AutoRange => {
                let current = self.read_current(bridge)?;
                Ok(current * self.read_bus_voltage(bridge)?)
            }
        }
    }

    pub fn read_all(&self, bridge: &mut Ch341) -> Result<Measurement> {
        let cal = self.require_calibration()?;
        let shunt_voltage = self.read_shunt_voltage(bridge)?;
        let bus_voltage = self.read_bus_voltage(bridge)?;
        let (effective_resistance, fet_conducting) = self.effective_resistance(shunt_voltage);
        let (current, power) = match self.mode {
            MeasurementMode::Fixed => {
                let raw = self.read_register(bridge, regs::REG_CURRENT)? as i16;
                let power_raw = self.read_register(bridge, regs::REG_POWER)?;
                (raw as f64 * cal.current_lsb, power_raw as f64 * cal.power_lsb)
            }
            MeasurementMode::AutoRange => {
                let current = shunt_voltage / effective_resistance;
                (current, current * bus_voltage)
            }
        };
        Ok(Measurement {
            shunt_voltage,
            bus_voltage,
            current,
            power,
            load_voltage: bus_voltage + shunt_voltage,
            effective_resistance,
            fet_conducting,
        })
    }

    // --- Auto-range ---

    fn program_alert(&self, bridge: &mut Ch341, threshold_volts: f64) -> Result<()> {
        let raw = alert_limit_raw(threshold_volts)?;
        self.write_register(bridge, regs::REG_ALERT_LIMIT, raw)?;
        self.write_register(bridge, regs::REG_MASK_ENABLE, mask_enable::SOL)
    }

    /// Programs the shunt over-limit alert at `threshold_volts` and switches
    /// current computation to auto-range.
    pub fn enable_auto_range(&mut self, bridge: &mut Ch341, threshold_volts: f64) -> Result<()> {
        self.program_alert(bridge, threshold_volts)?;
        self.alert_threshold = Some(threshold_volts);
        self.mode = MeasurementMode::AutoRange;
        info!(
            "INA226 {} auto-range enabled, alert at {:.3} mV",
            self.address,
            threshold_volts * 1e3
        );
        Ok(())
    }

    /// Back to fixed mode. The PMOS map is kept.
    pub fn disable_auto_range(&mut self, bridge: &mut Ch341) -> Result<()> {
        self.write_register(bridge, regs::REG_MASK_ENABLE, 0)?;
        self.mode = MeasurementMode::Fixed;
        info!("INA226 {} auto-range disabled", self.address);
        Ok(())
    }

    /// Measures the PMOS on-resistance with a known resistive load attached.
    ///
    /// The alert limit is dropped to its minimum so the FET stays on, and
    /// restored afterwards whatever the outcome. The result is stored under
    /// the current nominal bus voltage.
    pub fn calibrate_pmos_resistance(
        &mut self,
        bridge: &mut Ch341,
        known_load_ohms: f64,
    ) -> Result<PmosSolution> {
        if !(known_load_ohms > 0.0) {
            return Err(Error::InvalidCalibration(format!(
                "known load must be positive, got {} Ω",
                known_load_ohms
            )));
        }
        let saved_mask = self.read_register(bridge, regs::REG_MASK_ENABLE)?;
        let saved_limit = self.read_register(bridge, regs::REG_ALERT_LIMIT)?;

        let measured = self.measure_with_fet_on(bridge);

        self.write_register(bridge, regs::REG_ALERT_LIMIT, saved_limit)?;
        self.write_register(bridge, regs::REG_MASK_ENABLE, saved_mask)?;

        let (bus, shunt) = measured?;
        let solution = solve_pmos_resistance(bus, shunt, known_load_ohms, self.shunt_ohms)?;
        self.pmos_resistance
            .insert(millivolts(self.nominal_bus_voltage), solution.on_resistance);
        info!(
            "PMOS on-resistance at {:.2} V: {:.4} Ω (I={:.4} A, R_eff={:.4} Ω)",
            self.nominal_bus_voltage,
            solution.on_resistance,
            solution.current,
            solution.effective_resistance
        );
        Ok(solution)
    }

    fn measure_with_fet_on(&self, bridge: &mut Ch341) -> Result<(f64, f64)> {
        self.write_register(bridge, regs::REG_ALERT_LIMIT, ALERT_LIMIT_MIN)?;
        self.write_register(bridge, regs::REG_MASK_ENABLE, mask_enable::SOL)?;
        thread::sleep(self.pmos_settle);
        let bus = self.read_bus_voltage(bridge)?;
        let shunt = self.read_shunt_voltage(bridge)?;
        debug!("PMOS calibration: Vbus {:.4} V, Vshunt {:.6} V", bus, shunt);
        Ok((bus, shunt))
    }

    pub fn info(&self, bridge: &mut Ch341) -> Ina226Info {
        Ina226Info {
            address: self.address,
            state: self.state,
            mode: self.mode,
            shunt_ohms: self.shunt_ohms,
            calibration: self.calibration,
            configuration: self.read_register(bridge, regs::REG_CONFIGURATION).ok(),
            manufacturer_id: self.read_register(bridge, regs::REG_MANUFACTURER_ID).ok(),
            die_id: self.read_register(bridge, regs::REG_DIE_ID).ok(),
        }
    }
}

/// Alert limit register value for a shunt voltage threshold.
pub fn alert_limit_raw(threshold_volts: f64) -> Result<u16> {
    let raw = (threshold_volts / regs::SHUNT_LSB_V).round();
    if !(raw >= 1.0 && raw <= i16::MAX as f64) {
        return Err(Error::ArgumentOutOfRange(format!(
            "alert threshold {} V outside 2.5 µV..81.92 mV",
            threshold_volts
        )));
    }
    Ok(raw as u16)
}

/// Addresses in 0x40-0x4F answering with INA226 identity registers.
///
/// Per-address failures are skipped; a closed bridge is reported.
pub fn scan_ina226(bridge: &mut Ch341) -> Result<Vec<u8>> {
    bridge.ensure_open()?;
    let mut found = Vec::new();
    for addr in regs::DEFAULT_ADDRESS..=regs::LAST_ADDRESS {
        let mut probe = Ina226::new(addr, 1.0)?;
        match probe.check_device(bridge) {
            Ok(()) => {
                info!("Found INA226 at 0x{:02X}", addr);
                found.push(addr);
            }
            Err(e) => debug!("No INA226 at 0x{:02X}: {}", addr, e),
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_config_value() {
        assert_eq!(DEFAULT_CONFIG, 0x4527);
    }

    #[test]
    fn test_calibration_math() {
        let cal = Calibration::compute(10.0, 0.8192).unwrap();
        assert_relative_eq!(cal.current_lsb, 2.5e-5, max_relative = 1e-12);
        assert_relative_eq!(cal.power_lsb, 6.25e-4, max_relative = 1e-12);
        assert_eq!(cal.value, 20);

        let cal = Calibration::compute(0.1, 3.2).unwrap();
        assert_eq!(cal.value, 524);
    }

    #[test]
    fn test_calibration_rejects_bad_inputs() {
        assert!(matches!(
            Calibration::compute(0.1, 0.0),
            Err(Error::InvalidCalibration(_))
        ));
        // Tiny current with a tiny shunt overflows the 15-bit register.
        assert!(matches!(
            Calibration::compute(0.001, 0.001),
            Err(Error::InvalidCalibration(_))
        ));
        // Huge current with a large shunt rounds down to zero.
        assert!(matches!(
            Calibration::compute(100.0, 100.0),
            Err(Error::InvalidCalibration(_))
        ));
    }

    #[test]
    fn test_pmos_solve() {
        let s = solve_pmos_resistance(3.3, 0.01, 10.0, 0.1).unwrap();
        assert_relative_eq!(s.current, 0.33, max_relative = 1e-12);
        assert_relative_eq!(s.effective_resistance, 0.030303, max_relative = 1e-4);
        assert_relative_eq!(s.on_resistance, 0.043478, max_relative = 1e-4);

        // A shunt smaller than R_eff cannot be bypassed by anything.
        assert!(matches!(
            solve_pmos_resistance(3.3, 0.01, 10.0, 0.01),
            Err(Error::InvalidCalibration(_))
        ));
        assert!(solve_pmos_resistance(0.0, 0.01, 10.0, 0.1).is_err());
        assert!(solve_pmos_resistance(3.3, -0.01, 10.0, 0.1).is_err());
    }

    #[test]
    fn test_range_inference() {
        let mut ina = Ina226::new(0x40, 0.1).unwrap();
        ina.mode = MeasurementMode::AutoRange;
        ina.alert_threshold = Some(0.05);

        // 0.029 < 0.05 * 0.6: FET assumed on, shunt ∥ 0.05 Ω.
        let (r, on) = ina.effective_resistance(0.029);
        assert!(on);
        assert_relative_eq!(r, 0.1 * 0.05 / 0.15, max_relative = 1e-12);

        let (r, on) = ina.effective_resistance(0.031);
        assert!(!on);
        assert_relative_eq!(r, 0.1);
    }

    #[test]
    fn test_pmos_map_nearest_entry() {
        let mut ina = Ina226::new(0x40, 0.1).unwrap();
        assert_relative_eq!(ina.pmos_resistance(3.3), DEFAULT_PMOS_RESISTANCE);
        ina.set_pmos_resistance(12.0, 0.02);
        assert_relative_eq!(ina.pmos_resistance(11.0), 0.02);
        assert_relative_eq!(ina.pmos_resistance(5.0), DEFAULT_PMOS_RESISTANCE);
        assert_eq!(ina.pmos_map().len(), 2);
    }

    #[test]
    fn test_alert_limit_raw() {
        assert_eq!(alert_limit_raw(0.05).unwrap(), 20000);
        assert!(alert_limit_raw(0.0).is_err());
        assert!(alert_limit_raw(0.1).is_err());
    }
}
