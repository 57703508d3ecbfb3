//! # ch341-powerbench
//!
//! A Rust crate for driving a WCH CH341 USB bridge (I²C master plus a few
//! GPIO lines) and the parts of a small power test bench hanging off it:
//! an INA226 current/voltage monitor, a 24Cxx EEPROM holding a board ID,
//! and a relay switching the supply of the device under test.
//!
//! The bridge is reached through the vendor driver library (`CH341DLL.DLL`,
//! `CH341DLLA64.DLL`, or a compatible `libch341`), loaded at runtime with
//! `libloading`. Everything above the library goes through the
//! [`NativeDriver`] trait, which `sim::SimBridge` (behind the `sim` cargo
//! feature) also implements, so the drivers can be exercised without hardware.
//!
//! ## Features
//!
//! *   Bridge handle ([`Ch341`]): open/close/reset, chip detection, status word.
//! *   I²C: speed selection, write / read / write-read, probing, register
//!     access with a cached register pointer, bus scan with double confirmation.
//! *   GPIO: named pins (`GPIO0`, `GPIO1`, `GPIO2`..`GPIO7` on the CH341B),
//!     direction, write with read-back check, read, toggle.
//! *   24Cxx EEPROM ([`Eeprom`]): 24C02 to 24C256, page-aware writes with ACK
//!     polling, strings, board ID, hex dump.
//! *   INA226 ([`Ina226`]): calibration, fixed and PMOS auto-range current
//!     measurement, ALERT programming, PMOS on-resistance calibration.
//! *   Relays ([`RelayController`], [`PowerRelay`]) on bridge GPIOs or a PCF8574.
//! *   TOML bench configuration ([`BenchConfig`]).
//!
//! ## Basic Usage
//!
//! ```no_run
//! use ch341_powerbench::{BenchConfig, PowerRelay, Result};
//! use std::time::Duration;
//!
//! fn main() -> Result<()> {
//!     let config = BenchConfig::load("bench.toml")?;
//!     let mut bridge = config.open_bridge()?;
//!
//!     let eeprom = config.eeprom()?;
//!     println!("Board: {}", eeprom.read_board_id(&mut bridge, config.eeprom.board_id_offset)?);
//!
//!     let mut power = PowerRelay::new(&mut bridge, config.power_relay_controller(), 0)?;
//!     power.enable(&mut bridge)?;
//!     std::thread::sleep(Duration::from_millis(100));
//!
//!     let mut sense = config.ina226()?;
//!     config.start_ina226(&mut bridge, &mut sense)?;
//!     println!("{}", sense.read_all(&mut bridge)?);
//!
//!     power.disable(&mut bridge)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Hardware Setup Notes
//!
//! *   **I²C Pull-up Resistors:** Required externally (e.g., 4.7kΩ to 3.3V).
//! *   **Driver library:** On Windows install the WCH CH341PAR driver. Elsewhere
//!     point [`BenchConfig`]'s `bridge.library` (or [`Ch341::open_with_library`])
//!     at a library exporting the same entry points.
//! *   **Settle time:** GPIO writes wait 500 ms before the read-back check by
//!     default. Lower it with [`Ch341::set_settle_delay`] when the lines carry
//!     no relay coil.
//!
//! ## Logging
//!
//! Uses the `log` crate. Enable with a logger implementation (e.g.,
//! `env_logger`) and set the level (e.g., `RUST_LOG=ch341_powerbench=debug`).
//! `trace` shows every bus transfer.

mod consts;
pub mod config;
pub mod device;
pub mod eeprom;
mod error;
pub mod gpio;
pub mod i2c;
pub mod ina226;
pub mod native;
pub mod relay;
#[cfg(feature = "sim")]
pub mod sim;

pub use config::BenchConfig;
pub use device::{Ch341, Ch341Info, Chip, DeviceStatus};
pub use eeprom::{Eeprom, EepromGeometry, EepromInfo};
pub use error::{Error, ErrorKind, Result};
pub use gpio::{GpioDirection, GpioMasks, GpioPin};
pub use i2c::{I2cAddress, I2cSpeed, I2cTransaction};
pub use ina226::{Calibration, Ina226, Ina226Info, Measurement, MeasurementMode, SenseState};
pub use native::{Ch341Library, NativeDriver};
pub use relay::{PowerRelay, RelayBackend, RelayController, RelayState};
