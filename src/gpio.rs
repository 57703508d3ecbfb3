//! GPIO access on the CH341 parallel-port lines.
//!
//! Pins are addressed by name (`GPIO0`, `GPIO1`, and on the CH341B also
//! `GPIO2`..`GPIO7`). Each name maps to a bit of the bridge's 24-bit pin
//! word; only bits 0-15 have a direction register.

use crate::consts::gpio::{enable, MAX_DATA_BIT, MAX_DIRECTION_BIT};
use crate::device::{Ch341, Chip};
use crate::error::{Error, Result};
use log::{debug, warn};
use std::fmt;
use std::str::FromStr;
use std::thread;

/// Pins present on every chip variant.
const BASE_PINS: [(&str, u8); 2] = [("GPIO0", 8), ("GPIO1", 9)];
/// Extra pins on the CH341B, on the D0-D7 lines.
const CH341B_PINS: [(&str, u8); 6] = [
    ("GPIO2", 0),
    ("GPIO3", 1),
    ("GPIO4", 2),
    ("GPIO5", 3),
    ("GPIO6", 5),
    ("GPIO7", 7),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioDirection {
    Input,
    Output,
}

impl FromStr for GpioDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "in" | "input" => Ok(GpioDirection::Input),
            "out" | "output" => Ok(GpioDirection::Output),
            _ => Err(Error::ArgumentOutOfRange(format!(
                "Invalid GPIO direction '{}' (expected 'in' or 'out')",
                s
            ))),
        }
    }
}

/// 8-bit group of the pin word sharing one enable bit in `set_output`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioLane {
    /// Bits 0-7 (D0-D7).
    Low,
    /// Bits 8-15.
    Mid,
    /// Bits 16-23, input/fixed function, data only.
    High,
}

impl GpioLane {
    fn of_bit(bit: u8) -> Self {
        match bit {
            0..=7 => GpioLane::Low,
            8..=15 => GpioLane::Mid,
            _ => GpioLane::High,
        }
    }

    /// Enable bit validating this lane's data bits.
    pub fn data_enable(&self) -> u32 {
        match self {
            GpioLane::Low => enable::DATA_0_7,
            GpioLane::Mid => enable::DATA_8_15,
            GpioLane::High => enable::DATA_16_23,
        }
    }

    /// Enable bit validating this lane's direction bits, if it has any.
    pub fn direction_enable(&self) -> Option<u32> {
        match self {
            GpioLane::Low => Some(enable::DIR_0_7),
            GpioLane::Mid => Some(enable::DIR_8_15),
            GpioLane::High => None,
        }
    }
}

/// A named pin and the bit it drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpioPin {
    name: &'static str,
    bit: u8,
}

impl GpioPin {
    /// Creates a pin, returning an error if the bit is beyond the 24-bit pin word.
    pub fn new(name: &'static str, bit: u8) -> Result<Self> {
        if bit <= MAX_DATA_BIT {
            Ok(GpioPin { name, bit })
        } else {
            Err(Error::ArgumentOutOfRange(format!(
                "GPIO bit {} for '{}' must be 0-{}",
                bit, name, MAX_DATA_BIT
            )))
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn bit_index(&self) -> u8 {
        self.bit
    }

    /// Returns the bit mask (1 << bit_index) for register operations.
    #[inline]
    pub fn mask(&self) -> u32 {
        1u32 << self.bit
    }

    #[inline]
    pub fn lane(&self) -> GpioLane {
        GpioLane::of_bit(self.bit)
    }

    /// Whether the direction register covers this pin.
    #[inline]
    pub fn has_direction(&self) -> bool {
        self.bit <= MAX_DIRECTION_BIT
    }

    /// `set_output` enable bit for this pin's direction register.
    ///
    /// Bits 16-23 are inputs or fixed-function lines and have none.
    pub fn direction_enable(&self) -> Result<u32> {
        match self.lane().direction_enable() {
            Some(e) if self.has_direction() => Ok(e),
            _ => Err(Error::DirectionNotSupported {
                name: self.name.to_string(),
                bit: self.bit,
            }),
        }
    }
}

impl fmt::Display for GpioPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (bit {})", self.name, self.bit)
    }
}

/// Pins available on `chip`.
pub fn pins_for_chip(chip: Chip) -> Vec<GpioPin> {
    let mut pins: Vec<GpioPin> = BASE_PINS
        .iter()
        .map(|&(name, bit)| GpioPin { name, bit })
        .collect();
    if chip.has_extended_gpio() {
        pins.extend(CH341B_PINS.iter().map(|&(name, bit)| GpioPin { name, bit }));
    }
    pins
}

/// Direction (1 = output) and last written levels of the pin word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioMasks {
    pub direction: u32,
    pub data: u32,
}

impl Ch341 {
    // --- GPIO Methods ---

    /// Pins usable on this bridge.
    pub fn supported_pins(&self) -> Vec<GpioPin> {
        pins_for_chip(self.chip)
    }

    /// Looks a pin up by name (case-insensitive).
    pub fn pin(&self, name: &str) -> Result<GpioPin> {
        let pins = self.supported_pins();
        pins.iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .copied()
            .ok_or_else(|| Error::UnknownPin {
                name: name.to_string(),
                available: pins
                    .iter()
                    .map(|p| p.name)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    /// Current direction and data masks.
    pub fn gpio_masks(&self) -> GpioMasks {
        self.masks
    }

    /// Sets the direction of a pin.
    ///
    /// Does no I/O when the direction is already as requested.
    pub fn gpio_init(&mut self, name: &str, direction: GpioDirection) -> Result<()> {
        let pin = self.pin(name)?;
        self.init_pin(pin, direction)
    }

    fn init_pin(&mut self, pin: GpioPin, direction: GpioDirection) -> Result<()> {
        let dir_enable = pin.direction_enable()?;

        let new_direction = match direction {
            GpioDirection::Output => self.masks.direction | pin.mask(),
            GpioDirection::Input => self.masks.direction & !pin.mask(),
        };
        if new_direction == self.masks.direction {
            return Ok(());
        }

        debug!(
            "GPIO {} -> {:?}, direction mask 0x{:08X}",
            pin, direction, new_direction
        );
        self.set_output(dir_enable, new_direction, 0)?;
        self.masks.direction = new_direction;
        Ok(())
    }

    /// Drives a pin high (`true`) or low.
    ///
    /// A pin not yet configured as output is switched to output first. After
    /// the write the level is read back once the settle delay has passed; a
    /// mismatch only logs a warning.
    pub fn gpio_write(&mut self, name: &str, level: bool) -> Result<()> {
        let pin = self.pin(name)?;

        if self.masks.direction & pin.mask() == 0 {
            warn!("GPIO {} is not configured as output; initializing", pin);
            if let Err(e) = self.gpio_init(name, GpioDirection::Output) {
                warn!("Auto-init of GPIO {} as output failed: {}", pin, e);
            }
        }

        // Other pins keep whatever level they have now, not the cached one.
        let current = self.get_input()?;
        let data = if level {
            current | pin.mask()
        } else {
            current & !pin.mask()
        };

        debug!("GPIO {} <- {}", pin, u8::from(level));
        self.set_output(pin.lane().data_enable(), 0, data)?;
        self.masks.data = data;

        if !self.settle_delay.is_zero() {
            thread::sleep(self.settle_delay);
        }
        match self.get_input() {
            Ok(readback) if (readback & pin.mask() != 0) == level => {}
            Ok(readback) => warn!(
                "GPIO {} reads back {} after writing {} (input 0x{:08X})",
                pin,
                u8::from(!level),
                u8::from(level),
                readback
            ),
            Err(e) => warn!("GPIO {} readback failed: {}", pin, e),
        }
        Ok(())
    }

    /// Current level of a pin.
    pub fn gpio_read(&mut self, name: &str) -> Result<bool> {
        let pin = self.pin(name)?;
        Ok(self.get_input()? & pin.mask() != 0)
    }

    /// Inverts the level of a pin and returns the new level.
    pub fn gpio_toggle(&mut self, name: &str) -> Result<bool> {
        let level = !self.gpio_read(name)?;
        self.gpio_write(name, level)?;
        Ok(level)
    }

    /// Direction currently recorded for a pin.
    pub fn gpio_direction(&self, name: &str) -> Result<GpioDirection> {
        let pin = self.pin(name)?;
        Ok(if self.masks.direction & pin.mask() != 0 {
            GpioDirection::Output
        } else {
            GpioDirection::Input
        })
    }
}
