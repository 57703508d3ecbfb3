//! Bench configuration loaded from TOML.
//!
//! Every section and field is optional; missing values take the defaults of
//! the reference bench (INA226 at 0x40 on a 10 Ω shunt, 24C02 at 0x50, power
//! relay on `GPIO1`).
//!
//! ```
//! use ch341_powerbench::BenchConfig;
//!
//! let config = BenchConfig::from_toml_str(
//!     r#"
//!     [sense]
//!     shunt_ohms = 0.1
//!     max_current = 3.2
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(config.sense.address, 0x40);
//! assert_eq!(config.eeprom.eeprom_type, "24C02");
//! ```

use crate::consts::{eeprom as eeprom_consts, ina226 as ina226_consts};
use crate::device::Ch341;
use crate::eeprom::{Eeprom, EepromGeometry};
use crate::error::{Error, Result};
use crate::i2c::{I2cAddress, I2cSpeed};
use crate::ina226::{
    alert_limit_raw, Calibration, Ina226, MeasurementMode, DEFAULT_MAX_CURRENT,
    DEFAULT_NOMINAL_BUS_VOLTAGE,
};
use crate::native::NativeDriver;
use crate::relay::RelayController;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// `[bridge]`: which CH341 to open and how to drive it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Device index passed to the driver library.
    pub device_index: u32,
    /// Bus clock in kHz: 20, 100, 400 or 750.
    pub i2c_speed_khz: u32,
    /// Wait after a GPIO write before reading the pin back.
    pub gpio_settle_ms: u64,
    /// Vendor library to load instead of the platform default.
    pub library: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            i2c_speed_khz: 100,
            gpio_settle_ms: 500,
            library: None,
        }
    }
}

/// `[sense]`: the INA226 and its shunt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenseConfig {
    /// 7-bit bus address, 0x40-0x4F.
    pub address: u8,
    /// Shunt resistance in ohms.
    pub shunt_ohms: f64,
    /// Largest expected current in amperes; sets the current LSB.
    pub max_current: f64,
    /// `"fixed"` or `"auto-range"`.
    pub mode: MeasurementMode,
    /// Shunt voltage at which the ALERT pin turns the PMOS on.
    pub alert_threshold: Option<f64>,
    /// Bus voltage used to look up the PMOS on-resistance.
    pub nominal_bus_voltage: f64,
    /// Wait after forcing the PMOS on during its calibration.
    pub pmos_settle_ms: u64,
}

impl Default for SenseConfig {
    fn default() -> Self {
        Self {
            address: ina226_consts::DEFAULT_ADDRESS,
            shunt_ohms: 10.0,
            max_current: DEFAULT_MAX_CURRENT,
            mode: MeasurementMode::Fixed,
            alert_threshold: None,
            nominal_bus_voltage: DEFAULT_NOMINAL_BUS_VOLTAGE,
            pmos_settle_ms: 200,
        }
    }
}

/// `[eeprom]`: the board ID EEPROM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EepromConfig {
    /// Base bus address, 0x50-0x57.
    pub address: u8,
    /// Part name such as `"24C02"`; `type` in TOML.
    #[serde(rename = "type")]
    pub eeprom_type: String,
    /// Memory address of the board ID.
    pub board_id_offset: usize,
    /// Deadline for a write cycle to complete.
    pub write_timeout_ms: u64,
}

impl Default for EepromConfig {
    fn default() -> Self {
        Self {
            address: eeprom_consts::DEFAULT_ADDRESS,
            eeprom_type: "24C02".to_string(),
            board_id_offset: 0,
            write_timeout_ms: 100,
        }
    }
}

/// `[relay]`: the power relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Bridge GPIO driving the relay, e.g. `"GPIO1"`.
    pub power_pin: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            power_pin: "GPIO1".to_string(),
        }
    }
}

/// Whole bench configuration; every section may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub bridge: BridgeConfig,
    pub sense: SenseConfig,
    pub eeprom: EepromConfig,
    pub relay: RelayConfig,
}

impl BenchConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: BenchConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading bench configuration from {}", path.display());
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Checks values that parse but cannot drive the bench.
    pub fn validate(&self) -> Result<()> {
        I2cSpeed::from_khz(self.bridge.i2c_speed_khz).map_err(|e| Error::Config(e.to_string()))?;

        let sense = &self.sense;
        I2cAddress::new(sense.address)
            .map_err(|e| Error::Config(format!("sense.address: {}", e)))?;
        Calibration::compute(sense.shunt_ohms, sense.max_current)
            .map_err(|e| Error::Config(format!("sense: {}", e)))?;
        if !(sense.nominal_bus_voltage.is_finite() && sense.nominal_bus_voltage > 0.0) {
            return Err(Error::Config(format!(
                "sense.nominal_bus_voltage must be positive, got {}",
                sense.nominal_bus_voltage
            )));
        }
        match (sense.mode, sense.alert_threshold) {
            (_, Some(threshold)) => {
                alert_limit_raw(threshold)
                    .map_err(|e| Error::Config(format!("sense.alert_threshold: {}", e)))?;
            }
            (MeasurementMode::AutoRange, None) => {
                return Err(Error::Config(
                    "sense.alert_threshold is required in auto-range mode".to_string(),
                ))
            }
            (MeasurementMode::Fixed, None) => {}
        }

        let eeprom = &self.eeprom;
        if !(eeprom_consts::FIRST_ADDR..=eeprom_consts::LAST_ADDR).contains(&eeprom.address) {
            return Err(Error::Config(format!(
                "eeprom.address 0x{:02X} outside 0x{:02X}-0x{:02X}",
                eeprom.address,
                eeprom_consts::FIRST_ADDR,
                eeprom_consts::LAST_ADDR
            )));
        }
        let geometry = EepromGeometry::lookup(&eeprom.eeprom_type)
            .map_err(|e| Error::Config(format!("eeprom.type: {}", e)))?;
        if eeprom.board_id_offset >= geometry.size {
            return Err(Error::Config(format!(
                "eeprom.board_id_offset {} beyond {} bytes of {}",
                eeprom.board_id_offset, geometry.size, geometry.name
            )));
        }

        if self.relay.power_pin.trim().is_empty() {
            return Err(Error::Config("relay.power_pin is empty".to_string()));
        }
        Ok(())
    }

    // --- Builders ---

    /// Opens the configured bridge through the vendor library.
    pub fn open_bridge(&self) -> Result<Ch341> {
        let bridge = match &self.bridge.library {
            Some(path) => Ch341::open_with_library(path, self.bridge.device_index)?,
            None => Ch341::open(self.bridge.device_index)?,
        };
        self.apply_bridge(bridge)
    }

    /// Opens the configured bridge index on an explicit driver.
    pub fn open_bridge_with<D: NativeDriver + 'static>(&self, driver: D) -> Result<Ch341> {
        let bridge = Ch341::open_with(driver, self.bridge.device_index)?;
        self.apply_bridge(bridge)
    }

    fn apply_bridge(&self, mut bridge: Ch341) -> Result<Ch341> {
        bridge.set_i2c_speed(I2cSpeed::from_khz(self.bridge.i2c_speed_khz)?)?;
        bridge.set_settle_delay(Duration::from_millis(self.bridge.gpio_settle_ms));
        Ok(bridge)
    }

    pub fn eeprom(&self) -> Result<Eeprom> {
        let mut eeprom = Eeprom::new(self.eeprom.address, &self.eeprom.eeprom_type)?;
        eeprom.set_write_timeout(Duration::from_millis(self.eeprom.write_timeout_ms));
        Ok(eeprom)
    }

    /// An uninitialized power monitor with the configured shunt and PMOS settings.
    pub fn ina226(&self) -> Result<Ina226> {
        let mut sense = Ina226::new(self.sense.address, self.sense.shunt_ohms)?;
        sense.set_nominal_bus_voltage(self.sense.nominal_bus_voltage);
        sense.set_pmos_settle(Duration::from_millis(self.sense.pmos_settle_ms));
        Ok(sense)
    }

    /// Initializes `sense` and applies the configured measurement mode.
    pub fn start_ina226(&self, bridge: &mut Ch341, sense: &mut Ina226) -> Result<()> {
        sense.initialize(bridge, self.sense.max_current)?;
        if let (MeasurementMode::AutoRange, Some(threshold)) =
            (self.sense.mode, self.sense.alert_threshold)
        {
            sense.enable_auto_range(bridge, threshold)?;
        }
        Ok(())
    }

    /// Single-relay controller on the power pin, relay id 0.
    pub fn power_relay_controller(&self) -> RelayController {
        RelayController::gpio([(0, self.relay.power_pin.clone())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_document_is_default() {
        let config = BenchConfig::from_toml_str("").unwrap();
        assert_eq!(config, BenchConfig::default());
        assert_eq!(config.bridge.i2c_speed_khz, 100);
        assert_eq!(config.relay.power_pin, "GPIO1");
        assert_relative_eq!(config.sense.shunt_ohms, 10.0);
    }

    #[test]
    fn test_partial_sections() {
        let config = BenchConfig::from_toml_str(
            r#"
            [sense]
            mode = "auto-range"
            alert_threshold = 0.05
            [eeprom]
            type = "24c256"
            address = 0x51
            "#,
        )
        .unwrap();
        assert_eq!(config.sense.mode, MeasurementMode::AutoRange);
        assert_eq!(config.eeprom.address, 0x51);
        assert_eq!(config.sense.address, 0x40);
        assert!(config.eeprom().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let cases = [
            "[bridge]\ni2c_speed_khz = 123",
            "[sense]\nshunt_ohms = 0.0",
            "[sense]\nmode = \"auto-range\"",
            "[eeprom]\naddress = 0x40",
            "[eeprom]\ntype = \"24C99\"",
            "[eeprom]\nboard_id_offset = 256",
            "[relay]\npower_pin = \"\"",
        ];
        for case in cases {
            let err = BenchConfig::from_toml_str(case).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{case}: {err:?}");
        }
    }

    #[test]
    fn test_serialize_round_trips() {
        let mut config = BenchConfig::default();
        config.bridge.library = Some("/opt/ch341/libch341.so".to_string());
        let text = config.to_toml_string().unwrap();
        assert_eq!(BenchConfig::from_toml_str(&text).unwrap(), config);
    }
}
