//! Loading bench configuration files and building drivers from them.

use approx::assert_relative_eq;
use ch341_powerbench::sim::SimBridge;
use ch341_powerbench::{
    BenchConfig, EepromGeometry, Error, ErrorKind, I2cSpeed, MeasurementMode, PowerRelay, Result,
};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

const BENCH_TOML: &str = r#"
[bridge]
device_index = 0
i2c_speed_khz = 400
gpio_settle_ms = 0

[sense]
address = 0x41
shunt_ohms = 0.1
max_current = 0.8192
mode = "auto-range"
alert_threshold = 0.05
nominal_bus_voltage = 5.0
pmos_settle_ms = 0

[eeprom]
address = 0x50
type = "24C32"
board_id_offset = 0x20

[relay]
power_pin = "GPIO0"
"#;

fn write_config(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(text.as_bytes()).expect("write config");
    file
}

#[test]
fn test_load_from_file() -> Result<()> {
    let file = write_config(BENCH_TOML);
    let config = BenchConfig::load(file.path())?;
    assert_eq!(config.bridge.i2c_speed_khz, 400);
    assert_eq!(config.sense.address, 0x41);
    assert_eq!(config.sense.mode, MeasurementMode::AutoRange);
    assert_eq!(config.sense.alert_threshold, Some(0.05));
    assert_eq!(config.eeprom.eeprom_type, "24C32");
    assert_eq!(config.eeprom.board_id_offset, 0x20);
    assert_eq!(config.eeprom.write_timeout_ms, 100);
    assert_eq!(config.relay.power_pin, "GPIO0");
    Ok(())
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = BenchConfig::load(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn test_malformed_file() {
    let file = write_config("[sense\nshunt_ohms = ");
    assert!(matches!(BenchConfig::load(file.path()), Err(Error::Config(_))));

    let file = write_config("[sense]\nshunt_ohms = \"ten\"");
    assert!(matches!(BenchConfig::load(file.path()), Err(Error::Config(_))));
}

#[test]
fn test_bench_built_from_config() -> Result<()> {
    let config = BenchConfig::from_toml_str(BENCH_TOML)?;
    let sim = SimBridge::new();
    sim.add_ina226(0x41);
    sim.add_eeprom(0x50, EepromGeometry::lookup("24C32")?);

    let mut bridge = config.open_bridge_with(sim.clone())?;
    assert_eq!(bridge.i2c_speed(), I2cSpeed::Fast);
    assert_eq!(bridge.settle_delay(), Duration::ZERO);

    let eeprom = config.eeprom()?;
    eeprom.write_board_id(&mut bridge, config.eeprom.board_id_offset, "CFG-1")?;
    assert_eq!(eeprom.read_board_id(&mut bridge, 0x20)?, "CFG-1");

    let mut sense = config.ina226()?;
    config.start_ina226(&mut bridge, &mut sense)?;
    assert_eq!(sense.mode(), MeasurementMode::AutoRange);
    assert_relative_eq!(sense.nominal_bus_voltage(), 5.0);

    let mut power = PowerRelay::new(&mut bridge, config.power_relay_controller(), 0)?;
    power.enable(&mut bridge)?;
    assert!(bridge.gpio_read("GPIO0")?);
    Ok(())
}
