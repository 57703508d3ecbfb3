//! INA226 driver against the simulated register model.

use approx::assert_relative_eq;
use ch341_powerbench::ina226::scan_ina226;
use ch341_powerbench::sim::SimBridge;
use ch341_powerbench::{
    Ch341, EepromGeometry, Error, ErrorKind, Ina226, MeasurementMode, Result, SenseState,
};
use std::time::Duration;

const REG_CONFIGURATION: u8 = 0x00;
const REG_CALIBRATION: u8 = 0x05;
const REG_MASK_ENABLE: u8 = 0x06;
const REG_ALERT_LIMIT: u8 = 0x07;
const SOL: u16 = 0x8000;

fn setup(shunt_ohms: f64) -> (SimBridge, Ch341, Ina226) {
    let sim = SimBridge::new();
    sim.add_ina226(0x40);
    let mut bridge = Ch341::open_with(sim.clone(), 0).unwrap();
    bridge.set_settle_delay(Duration::ZERO);
    let mut sense = Ina226::new(0x40, shunt_ohms).unwrap();
    sense.set_pmos_settle(Duration::ZERO);
    (sim, bridge, sense)
}

#[test]
fn test_initialize_programs_the_part() -> Result<()> {
    let (sim, mut bridge, mut sense) = setup(10.0);
    assert_eq!(sense.state(), SenseState::Uninitialized);
    sense.initialize(&mut bridge, 0.8192)?;

    assert_eq!(sense.state(), SenseState::Ready);
    assert_eq!(sim.flush_calls(), 1);
    assert_eq!(sim.ina226_register(0x40, REG_CONFIGURATION), Some(0x4527));
    assert_eq!(sim.ina226_register(0x40, REG_CALIBRATION), Some(20));
    let cal = sense.calibration().copied().unwrap();
    assert_eq!(cal.value, 20);
    assert_relative_eq!(cal.current_lsb, 2.5e-5, max_relative = 1e-12);
    Ok(())
}

#[test]
fn test_fixed_mode_measurements() -> Result<()> {
    let (sim, mut bridge, mut sense) = setup(10.0);
    sense.initialize(&mut bridge, 0.8192)?;
    sim.set_shunt_voltage(0x40, 0.01);
    sim.set_bus_voltage(0x40, 3.3);

    assert_relative_eq!(sense.read_shunt_voltage(&mut bridge)?, 0.01, epsilon = 1e-9);
    assert_relative_eq!(sense.read_bus_voltage(&mut bridge)?, 3.3, epsilon = 1e-9);
    // Current register: floor(4000 * 20 / 2048) = 39 LSB.
    assert_relative_eq!(sense.read_current(&mut bridge)?, 39.0 * 2.5e-5, epsilon = 1e-12);

    let m = sense.read_all(&mut bridge)?;
    assert_relative_eq!(m.current, 0.000975, epsilon = 1e-12);
    assert_relative_eq!(m.power, 5.0 * 6.25e-4, epsilon = 1e-12);
    assert_relative_eq!(m.load_voltage, 3.31, epsilon = 1e-9);
    assert_relative_eq!(m.effective_resistance, 10.0);
    assert!(!m.fet_conducting);
    Ok(())
}

#[test]
fn test_reads_before_calibration_fail() {
    let (sim, mut bridge, sense) = setup(10.0);
    sim.clear_log();
    let err = sense.read_current(&mut bridge).unwrap_err();
    assert!(matches!(err, Error::NotCalibrated));
    assert_eq!(err.kind(), ErrorKind::Calibration);
    assert!(matches!(sense.read_power(&mut bridge), Err(Error::NotCalibrated)));
    assert!(matches!(sense.read_all(&mut bridge), Err(Error::NotCalibrated)));
    assert_eq!(sim.io_count(), 0);
}

#[test]
fn test_wrong_part_is_rejected() {
    let (sim, mut bridge, mut sense) = setup(10.0);
    sim.set_manufacturer_id(0x40, 0x1234);
    let err = sense.initialize(&mut bridge, 0.8192).unwrap_err();
    assert!(matches!(err, Error::DeviceMismatch { .. }));
    assert_eq!(err.kind(), ErrorKind::Device);
    assert_eq!(sense.state(), SenseState::Uninitialized);
    assert!(sense.calibration().is_none());
}

#[test]
fn test_bad_calibration_fails_before_bus_traffic() {
    let (sim, mut bridge, mut sense) = setup(10.0);
    sim.clear_log();
    assert!(matches!(
        sense.initialize(&mut bridge, 0.0),
        Err(Error::InvalidCalibration(_))
    ));
    assert_eq!(sim.flush_calls(), 0);
    assert!(sim.transfers().is_empty());
}

#[test]
fn test_absent_part() {
    let (_sim, mut bridge, _) = setup(10.0);
    let mut absent = Ina226::new(0x41, 10.0).unwrap();
    assert!(matches!(
        absent.initialize(&mut bridge, 0.8192),
        Err(Error::I2cTransferFailed { .. })
    ));
    assert_eq!(absent.state(), SenseState::Uninitialized);
}

#[test]
fn test_register_pointer_cache() -> Result<()> {
    let (sim, mut bridge, mut sense) = setup(10.0);
    sense.initialize(&mut bridge, 0.8192)?;
    sim.clear_log();
    sense.read_shunt_voltage(&mut bridge)?;
    sense.read_shunt_voltage(&mut bridge)?;
    assert_eq!(sim.transfers().len(), 3);
    Ok(())
}

#[test]
fn test_auto_range() -> Result<()> {
    let (sim, mut bridge, mut sense) = setup(0.1);
    sense.initialize(&mut bridge, 0.8192)?;
    sense.enable_auto_range(&mut bridge, 0.05)?;
    assert_eq!(sense.mode(), MeasurementMode::AutoRange);
    assert_eq!(sim.ina226_register(0x40, REG_ALERT_LIMIT), Some(20000));
    assert_eq!(sim.ina226_register(0x40, REG_MASK_ENABLE), Some(SOL));

    // Below 60 % of the threshold the FET is taken to bypass the shunt.
    sim.set_shunt_voltage(0x40, 0.01);
    sim.set_bus_voltage(0x40, 5.0);
    let r_eff = 0.1 * 0.05 / 0.15;
    assert_relative_eq!(sense.read_current(&mut bridge)?, 0.01 / r_eff, max_relative = 1e-9);
    let m = sense.read_all(&mut bridge)?;
    assert!(m.fet_conducting);
    assert_relative_eq!(m.effective_resistance, r_eff, max_relative = 1e-12);

    // Power follows the corrected current, not the shunt-only power register.
    assert_relative_eq!(m.power, 0.3 * 5.0, max_relative = 1e-9);
    assert_relative_eq!(sense.read_power(&mut bridge)?, m.current * m.bus_voltage, max_relative = 1e-9);

    sim.set_shunt_voltage(0x40, 0.04);
    assert_relative_eq!(sense.read_current(&mut bridge)?, 0.4, max_relative = 1e-9);
    assert!(!sense.read_all(&mut bridge)?.fet_conducting);

    // Re-initializing keeps the alert programming.
    sense.initialize(&mut bridge, 0.8192)?;
    assert_eq!(sim.ina226_register(0x40, REG_ALERT_LIMIT), Some(20000));
    assert_eq!(sim.ina226_register(0x40, REG_MASK_ENABLE), Some(SOL));

    sense.disable_auto_range(&mut bridge)?;
    assert_eq!(sense.mode(), MeasurementMode::Fixed);
    assert_eq!(sim.ina226_register(0x40, REG_MASK_ENABLE), Some(0));
    Ok(())
}

#[test]
fn test_alert_threshold_range() {
    let (_sim, mut bridge, mut sense) = setup(0.1);
    assert!(matches!(
        sense.enable_auto_range(&mut bridge, 0.1),
        Err(Error::ArgumentOutOfRange(_))
    ));
    assert_eq!(sense.mode(), MeasurementMode::Fixed);
}

#[test]
fn test_pmos_calibration_restores_alert() -> Result<()> {
    let (sim, mut bridge, mut sense) = setup(0.1);
    sense.initialize(&mut bridge, 0.8192)?;
    sense.enable_auto_range(&mut bridge, 0.05)?;
    sim.set_bus_voltage(0x40, 3.3);
    sim.set_shunt_voltage(0x40, 0.01);

    let solution = sense.calibrate_pmos_resistance(&mut bridge, 10.0)?;
    assert_relative_eq!(solution.current, 0.33, max_relative = 1e-9);
    assert_relative_eq!(solution.effective_resistance, 0.01 / 0.33, max_relative = 1e-9);
    assert_relative_eq!(solution.on_resistance, 0.043478, max_relative = 1e-4);
    assert_relative_eq!(sense.pmos_resistance(3.3), solution.on_resistance);

    assert_eq!(sim.ina226_register(0x40, REG_ALERT_LIMIT), Some(20000));
    assert_eq!(sim.ina226_register(0x40, REG_MASK_ENABLE), Some(SOL));

    // Auto-range now divides by the shunt in parallel with the measured FET.
    let (r, on) = sense.effective_resistance(0.01);
    assert!(on);
    assert_relative_eq!(r, 0.01 / 0.33, max_relative = 1e-6);
    Ok(())
}

#[test]
fn test_pmos_calibration_rejects_impossible_result() -> Result<()> {
    let (sim, mut bridge, mut sense) = setup(0.01);
    sim.set_bus_voltage(0x40, 3.3);
    sim.set_shunt_voltage(0x40, 0.01);
    bridge.write_register(0x40, REG_ALERT_LIMIT, &[0x12, 0x34])?;

    // R_eff = 0.0303 Ω is above the 0.01 Ω shunt: no FET could explain it.
    assert!(matches!(
        sense.calibrate_pmos_resistance(&mut bridge, 10.0),
        Err(Error::InvalidCalibration(_))
    ));
    assert_eq!(sim.ina226_register(0x40, REG_ALERT_LIMIT), Some(0x1234));
    assert_eq!(sim.ina226_register(0x40, REG_MASK_ENABLE), Some(0));
    assert_relative_eq!(sense.pmos_resistance(3.3), 0.05);

    assert!(matches!(
        sense.calibrate_pmos_resistance(&mut bridge, 0.0),
        Err(Error::InvalidCalibration(_))
    ));
    Ok(())
}

#[test]
fn test_pmos_map_per_bus_voltage() {
    let (_sim, _bridge, mut sense) = setup(0.1);
    sense.set_pmos_resistance(5.0, 0.02);
    assert_relative_eq!(sense.pmos_resistance(4.8), 0.02);
    assert_relative_eq!(sense.pmos_resistance(3.0), 0.05);
    assert_eq!(sense.pmos_map().len(), 2);
}

#[test]
fn test_info_and_scan() -> Result<()> {
    let (sim, mut bridge, mut sense) = setup(10.0);
    sim.add_ina226(0x45);
    sim.add_eeprom(0x48, EepromGeometry::lookup("24C02")?);
    sense.initialize(&mut bridge, 0.8192)?;

    let info = sense.info(&mut bridge);
    assert_eq!(info.manufacturer_id, Some(0x5449));
    assert_eq!(info.die_id, Some(0x2260));
    assert_eq!(info.configuration, Some(0x4527));
    assert_eq!(info.state, SenseState::Ready);
    assert!(info.to_string().contains("0x0014"));

    assert_eq!(scan_ina226(&mut bridge)?, vec![0x40, 0x45]);
    Ok(())
}
