//! Opening and managing a CH341 bridge.

use crate::consts;
use crate::error::{Error, Result};
use crate::gpio::GpioMasks;
use crate::i2c::I2cSpeed;
use crate::native::{Ch341Library, NativeDriver};
use log::{debug, info, trace, warn};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Default wait after a GPIO write before reading the level back.
pub const DEFAULT_GPIO_SETTLE: Duration = Duration::from_millis(500);

/// Chip variant as reported by `CH341GetVerIC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chip {
    /// First-generation CH341.
    Ch341,
    /// CH341T, the SSOP-20 variant.
    Ch341T,
    /// CH341A.
    Ch341A,
    /// Exposes GPIO2..GPIO7 on the D0-D7 lines.
    Ch341B,
    /// Any other version value.
    Unknown(u32),
}

impl Chip {
    /// Maps a `CH341GetVerIC` value to a chip variant.
    pub fn from_ic_version(version: u32) -> Self {
        match version {
            consts::IC_VER_CH341 => Chip::Ch341,
            consts::IC_VER_CH341T => Chip::Ch341T,
            consts::IC_VER_CH341A => Chip::Ch341A,
            consts::IC_VER_CH341B => Chip::Ch341B,
            other => Chip::Unknown(other),
        }
    }

    /// Whether the extra D-line GPIOs are usable.
    pub fn has_extended_gpio(&self) -> bool {
        matches!(self, Chip::Ch341B)
    }
}

impl fmt::Display for Chip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chip::Ch341 => write!(f, "CH341"),
            Chip::Ch341T => write!(f, "CH341T"),
            Chip::Ch341A => write!(f, "CH341A"),
            Chip::Ch341B => write!(f, "CH341B"),
            Chip::Unknown(v) => write!(f, "unknown (IC version 0x{:02X})", v),
        }
    }
}

/// Decoded `CH341GetStatus` word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatus(pub u32);

impl DeviceStatus {
    #[inline]
    fn bit(&self, mask: u32) -> bool {
        self.0 & mask != 0
    }

    /// Levels of D0-D7.
    pub fn data_lines(&self) -> u8 {
        (self.0 & consts::gpio::status::DATA_LINES) as u8
    }

    /// ERR# input (bit 8).
    pub fn err(&self) -> bool {
        self.bit(consts::gpio::status::ERR)
    }
    /// PEMP input (bit 9).
    pub fn pemp(&self) -> bool {
        self.bit(consts::gpio::status::PEMP)
    }
    /// INT# input (bit 10).
    pub fn int(&self) -> bool {
        self.bit(consts::gpio::status::INT)
    }
    /// SLCT input (bit 11).
    pub fn slct(&self) -> bool {
        self.bit(consts::gpio::status::SLCT)
    }
    /// WAIT# input (bit 13).
    pub fn wait(&self) -> bool {
        self.bit(consts::gpio::status::WAIT)
    }
    /// DATAS# output (bit 14).
    pub fn datas(&self) -> bool {
        self.bit(consts::gpio::status::DATAS)
    }
    /// ADDRS# output (bit 15).
    pub fn addrs(&self) -> bool {
        self.bit(consts::gpio::status::ADDRS)
    }
    /// RESET# output (bit 16).
    pub fn reset(&self) -> bool {
        self.bit(consts::gpio::status::RESET)
    }
    /// WRITE# output (bit 17).
    pub fn write(&self) -> bool {
        self.bit(consts::gpio::status::WRITE)
    }
    /// I2C clock line level (bit 22).
    pub fn scl(&self) -> bool {
        self.bit(consts::gpio::status::SCL)
    }
    /// I2C data line level (bit 23).
    pub fn sda(&self) -> bool {
        self.bit(consts::gpio::status::SDA)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:08X} (D={:02X} ERR={} PEMP={} INT={} SLCT={} WAIT={} DATAS={} ADDRS={} RESET={} WRITE={} SCL={} SDA={})",
            self.0,
            self.data_lines(),
            u8::from(self.err()),
            u8::from(self.pemp()),
            u8::from(self.int()),
            u8::from(self.slct()),
            u8::from(self.wait()),
            u8::from(self.datas()),
            u8::from(self.addrs()),
            u8::from(self.reset()),
            u8::from(self.write()),
            u8::from(self.scl()),
            u8::from(self.sda()),
        )
    }
}

/// Summary of an opened bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ch341Info {
    /// Device index passed to the driver library.
    pub index: u32,
    /// Chip variant derived from `ic_version`.
    pub chip: Chip,
    /// Raw `CH341GetVerIC` value.
    pub ic_version: u32,
    /// `CH341GetVersion` value of the loaded library.
    pub driver_version: u32,
    /// Name reported by the driver, if any.
    pub device_name: Option<String>,
    /// Current I2C stream speed.
    pub i2c_speed: I2cSpeed,
}

/// A handle to an opened CH341 bridge.
///
/// Drivers for parts on the bus borrow the handle mutably for each
/// operation. The handle is closed on drop.
/// **Note:** This handle is not thread-safe (`!Send`, `!Sync`).
pub struct Ch341 {
    pub(crate) driver: Box<dyn NativeDriver>,
    pub(crate) index: u32,
    pub(crate) is_open: bool,
    pub(crate) ic_version: u32,
    pub(crate) chip: Chip,
    pub(crate) device_name: Option<String>,
    pub(crate) speed: I2cSpeed,
    pub(crate) masks: GpioMasks,
    /// Last register written per 7-bit device address.
    pub(crate) register_pointers: HashMap<u8, u8>,
    pub(crate) settle_delay: Duration,
}

impl fmt::Debug for Ch341 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ch341")
            .field("index", &self.index)
            .field("is_open", &self.is_open)
            .field("chip", &self.chip)
            .field("device_name", &self.device_name)
            .field("speed", &self.speed)
            .field("masks", &self.masks)
            .finish_non_exhaustive()
    }
}

impl Ch341 {
    // --- Constructors and Info ---

    /// Opens device `index` through the vendor library found under its
    /// platform default name.
    pub fn open(index: u32) -> Result<Self> {
        let library = Ch341Library::load_default()?;
        Self::open_with(library, index)
    }

    /// Opens device `index` through the vendor library at `path`.
    pub fn open_with_library(path: &str, index: u32) -> Result<Self> {
        let library = Ch341Library::load(path)?;
        Self::open_with(library, index)
    }

    /// Opens device `index` through an arbitrary driver implementation.
    pub fn open_with<D: NativeDriver + 'static>(driver: D, index: u32) -> Result<Self> {
        let mut driver: Box<dyn NativeDriver> = Box::new(driver);

        if !driver.open_device(index) {
            return Err(Error::DeviceNotFound { index });
        }
        if !driver.reset_device(index) {
            driver.close_device(index);
            return Err(Error::DeviceNotFound { index });
        }

        let ic_version = driver.get_ic_version(index);
        let chip = Chip::from_ic_version(ic_version);
        debug!("CH341 {} chip version 0x{:02X} ({})", index, ic_version, chip);

        let device_name = driver.get_device_name(index);
        debug!(
            "CH341 {} device name: {}",
            index,
            device_name.as_deref().unwrap_or("unknown")
        );

        let speed = I2cSpeed::Standard;
        if !driver.set_stream(index, speed.stream_mode()) {
            warn!("Failed to set I2C stream mode on CH341 {}; continuing", index);
        }

        let data = driver.get_input(index).unwrap_or(0);
        debug!("CH341 {} initial GPIO data mask 0x{:08X}", index, data);

        match driver.get_status(index) {
            Some(raw) => debug!("CH341 {} status {}", index, DeviceStatus(raw)),
            None => debug!("CH341 {} status unavailable", index),
        }

        info!("Opened CH341 device {} ({})", index, chip);
        Ok(Self {
            driver,
            index,
            is_open: true,
            ic_version,
            chip,
            device_name,
            speed,
            masks: GpioMasks {
                direction: consts::gpio::DEFAULT_DIRECTION_MASK,
                data,
            },
            register_pointers: HashMap::new(),
            settle_delay: DEFAULT_GPIO_SETTLE,
        })
    }

    /// Releases the device. Calling it again is a no-op.
    pub fn close(&mut self) {
        if self.is_open {
            self.driver.close_device(self.index);
            self.is_open = false;
            self.register_pointers.clear();
            info!("Closed CH341 device {}", self.index);
        }
    }

    /// Whether the device is still open.
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_open {
            Ok(())
        } else {
            Err(Error::DeviceNotOpen)
        }
    }

    /// Device index this handle was opened with.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Chip variant detected at open.
    pub fn chip(&self) -> Chip {
        self.chip
    }

    /// Raw IC version read at open.
    pub fn ic_version(&self) -> u32 {
        self.ic_version
    }

    /// Device name reported by the driver at open.
    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    /// Version of the vendor driver library.
    pub fn driver_version(&mut self) -> u32 {
        self.driver.get_version()
    }

    /// Gets basic information about the opened device.
    pub fn info(&mut self) -> Ch341Info {
        Ch341Info {
            index: self.index,
            chip: self.chip,
            ic_version: self.ic_version,
            driver_version: self.driver.get_version(),
            device_name: self.device_name.clone(),
            i2c_speed: self.speed,
        }
    }

    /// Resets the bridge's USB pipes. Cached register pointers are dropped.
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_open()?;
        debug!("Resetting CH341 {}", self.index);
        self.register_pointers.clear();
        if self.driver.reset_device(self.index) {
            Ok(())
        } else {
            Err(Error::BridgeCommandFailed { operation: "reset" })
        }
    }

    /// Discards pending data in the bridge buffers.
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.driver.flush_buffer(self.index) {
            Ok(())
        } else {
            Err(Error::BridgeCommandFailed { operation: "flush" })
        }
    }

    /// Wait between a GPIO write and its readback.
    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// Changes the GPIO settle delay; zero skips the wait.
    pub fn set_settle_delay(&mut self, delay: Duration) {
        self.settle_delay = delay;
    }

    // --- Pin Register Access ---

    /// Masked write of the direction and data registers.
    ///
    /// `enable` selects which lanes of `direction` and `data` take effect
    /// (bits 0-4: data 8-15, direction 8-15, data 0-7, direction 0-7,
    /// data 16-23).
    pub fn set_output(&mut self, enable: u32, direction: u32, data: u32) -> Result<()> {
        self.ensure_open()?;
        trace!(
            "CH341SetOutput(enable=0x{:02X}, dir=0x{:08X}, data=0x{:08X})",
            enable,
            direction,
            data
        );
        if self.driver.set_output(self.index, enable, direction, data) {
            Ok(())
        } else {
            Err(Error::BridgeCommandFailed {
                operation: "set_output",
            })
        }
    }

    /// Current levels of bits 0-23.
    pub fn get_input(&mut self) -> Result<u32> {
        self.ensure_open()?;
        let value = self
            .driver
            .get_input(self.index)
            .ok_or(Error::BridgeCommandFailed {
                operation: "get_input",
            })?;
        trace!("CH341GetInput = 0x{:08X}", value);
        Ok(value)
    }

    pub fn get_status(&mut self) -> Result<DeviceStatus> {
        self.ensure_open()?;
        self.driver
            .get_status(self.index)
            .map(DeviceStatus)
            .ok_or(Error::StatusUnavailable)
    }
}

impl Drop for Ch341 {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chip_from_ic_version() {
        assert_eq!(Chip::from_ic_version(0x32), Chip::Ch341B);
        assert_eq!(Chip::from_ic_version(0x20), Chip::Ch341A);
        assert!(Chip::Ch341B.has_extended_gpio());
        assert!(!Chip::Ch341A.has_extended_gpio());
        assert_eq!(Chip::from_ic_version(0x99), Chip::Unknown(0x99));
    }

    #[test]
    fn test_status_decoding() {
        let status = DeviceStatus(0x00C0_0A5A);
        assert_eq!(status.data_lines(), 0x5A);
        assert!(status.scl());
        assert!(status.sda());
        assert!(status.slct());
        assert!(status.pemp());
        assert!(!status.int());
        assert!(!status.err());
        assert!(!status.wait());
    }
}
