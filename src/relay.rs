//! Relays driven from a bridge GPIO or from a PCF8574 I2C expander.

use crate::consts::pcf8574;
use crate::device::Ch341;
use crate::error::{Error, Result};
use crate::i2c::I2cAddress;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fmt;
use std::thread;
use std::time::Duration;

/// Default on-time of [`PowerRelay::pulse`].
pub const DEFAULT_PULSE: Duration = Duration::from_millis(100);

/// PCF8574 (0x20-0x27) and PCF8574A (0x38-0x3F) address windows.
const PCF8574_ADDRESSES: [std::ops::RangeInclusive<u8>; 2] = [0x20..=0x27, 0x38..=0x3F];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayState {
    #[default]
    Off,
    On,
}

impl RelayState {
    pub fn is_on(self) -> bool {
        self == RelayState::On
    }

    pub fn toggled(self) -> Self {
        match self {
            RelayState::Off => RelayState::On,
            RelayState::On => RelayState::Off,
        }
    }
}

impl From<bool> for RelayState {
    fn from(on: bool) -> Self {
        if on {
            RelayState::On
        } else {
            RelayState::Off
        }
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayState::Off => write!(f, "OFF"),
            RelayState::On => write!(f, "ON"),
        }
    }
}

/// How relay coils are switched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayBackend {
    /// One bridge GPIO per relay, high = energized.
    Gpio { pins: BTreeMap<u8, String> },
    /// One expander bit per relay, low = energized.
    Pcf8574 {
        address: I2cAddress,
        pins: BTreeMap<u8, u8>,
        /// Last byte written to the expander.
        output: u8,
    },
}

/// A set of relays addressed by id, all starting OFF.
#[derive(Debug, Clone)]
pub struct RelayController {
    backend: RelayBackend,
    states: BTreeMap<u8, RelayState>,
}

impl RelayController {
    /// Relays on bridge GPIOs, `relay id -> pin name`.
    pub fn gpio<I, S>(pins: I) -> Self
    where
        I: IntoIterator<Item = (u8, S)>,
        S: Into<String>,
    {
        let pins: BTreeMap<u8, String> = pins.into_iter().map(|(id, p)| (id, p.into())).collect();
        debug!("GPIO relay controller {:?}", pins);
        Self::with_backend(RelayBackend::Gpio { pins })
    }

    /// Relays on a PCF8574 at `address`, `relay id -> expander bit`.
    pub fn pcf8574<I>(address: u8, pins: I) -> Result<Self>
    where
        I: IntoIterator<Item = (u8, u8)>,
    {
        let address = I2cAddress::new(address)?;
        let pins: BTreeMap<u8, u8> = pins.into_iter().collect();
        if let Some((id, bit)) = pins.iter().find(|(_, bit)| **bit > 7) {
            return Err(Error::ArgumentOutOfRange(format!(
                "PCF8574 relay {} mapped to bit {}, must be 0-7",
                id, bit
            )));
        }
        debug!("PCF8574 relay controller at {}: {:?}", address, pins);
        Ok(Self::with_backend(RelayBackend::Pcf8574 {
            address,
            pins,
            output: pcf8574::POWER_ON_OUTPUT,
        }))
    }

    fn with_backend(backend: RelayBackend) -> Self {
        let ids: Vec<u8> = match &backend {
            RelayBackend::Gpio { pins } => pins.keys().copied().collect(),
            RelayBackend::Pcf8574 { pins, .. } => pins.keys().copied().collect(),
        };
        Self {
            backend,
            states: ids.into_iter().map(|id| (id, RelayState::Off)).collect(),
        }
    }

    pub fn backend(&self) -> &RelayBackend {
        &self.backend
    }

    pub fn relay_ids(&self) -> Vec<u8> {
        self.states.keys().copied().collect()
    }

    fn unknown_relay(&self, relay_id: u8) -> Error {
        Error::ArgumentOutOfRange(format!(
            "Unknown relay {} (configured: {:?})",
            relay_id,
            self.relay_ids()
        ))
    }

    pub fn set_relay(&mut self, bridge: &mut Ch341, relay_id: u8, state: RelayState) -> Result<()> {
        if !self.states.contains_key(&relay_id) {
            return Err(self.unknown_relay(relay_id));
        }
        match &mut self.backend {
            RelayBackend::Gpio { pins } => {
                let pin = &pins[&relay_id];
                bridge.gpio_write(pin, state.is_on())?;
                info!("Relay {} {} (GPIO {})", relay_id, state, pin);
            }
            RelayBackend::Pcf8574 {
                address,
                pins,
                output,
            } => {
                let mask = 1u8 << pins[&relay_id];
                let next = match state {
                    RelayState::On => *output & !mask,
                    RelayState::Off => *output | mask,
                };
                bridge.i2c_write(address.value(), &[next])?;
                *output = next;
                info!(
                    "Relay {} {} (PCF8574 {} bit {}, output 0x{:02X})",
                    relay_id, state, address, pins[&relay_id], next
                );
            }
        }
        self.states.insert(relay_id, state);
        Ok(())
    }

    /// Last state set, `None` for an unknown id.
    pub fn get_relay(&self, relay_id: u8) -> Option<RelayState> {
        self.states.get(&relay_id).copied()
    }

    /// Flips a relay and returns its new state.
    pub fn toggle_relay(&mut self, bridge: &mut Ch341, relay_id: u8) -> Result<RelayState> {
        let next = self
            .get_relay(relay_id)
            .ok_or_else(|| self.unknown_relay(relay_id))?
            .toggled();
        self.set_relay(bridge, relay_id, next)?;
        Ok(next)
    }

    /// Reads the expander's pin levels.
    pub fn read_inputs(&self, bridge: &mut Ch341) -> Result<u8> {
        match &self.backend {
            RelayBackend::Pcf8574 { address, .. } => {
                let data = bridge.i2c_read(address.value(), 1)?;
                Ok(data[0])
            }
            RelayBackend::Gpio { .. } => Err(Error::ArgumentOutOfRange(
                "GPIO relays have no expander inputs".to_string(),
            )),
        }
    }

    /// True when every relay's driver is reachable.
    pub fn test_device(&self, bridge: &mut Ch341) -> bool {
        match &self.backend {
            RelayBackend::Gpio { pins } => pins.values().all(|p| bridge.pin(p).is_ok()),
            RelayBackend::Pcf8574 { address, .. } => match self.read_inputs(bridge) {
                Ok(v) => {
                    debug!("PCF8574 {} inputs 0x{:02X}", address, v);
                    true
                }
                Err(e) => {
                    warn!("PCF8574 {} test failed: {}", address, e);
                    false
                }
            },
        }
    }
}

/// Addresses in the PCF8574/PCF8574A windows answering a one-byte read.
pub fn scan_pcf8574(bridge: &mut Ch341) -> Result<Vec<u8>> {
    bridge.ensure_open()?;
    let mut found = Vec::new();
    for addr in PCF8574_ADDRESSES.iter().cloned().flatten() {
        match bridge.i2c_read(addr, 1) {
            Ok(_) => {
                info!("Found PCF8574 at 0x{:02X}", addr);
                found.push(addr);
            }
            Err(e) => debug!("No PCF8574 at 0x{:02X}: {}", addr, e),
        }
    }
    Ok(found)
}

/// The bench supply switch: one relay of a controller.
#[derive(Debug, Clone)]
pub struct PowerRelay {
    controller: RelayController,
    relay_id: u8,
    enabled: bool,
}

impl PowerRelay {
    /// Takes over `relay_id` and switches it OFF.
    pub fn new(bridge: &mut Ch341, controller: RelayController, relay_id: u8) -> Result<Self> {
        let mut relay = Self {
            controller,
            relay_id,
            enabled: false,
        };
        relay.disable(bridge)?;
        debug!("Power relay {} ready", relay_id);
        Ok(relay)
    }

    pub fn enable(&mut self, bridge: &mut Ch341) -> Result<()> {
        self.controller.set_relay(bridge, self.relay_id, RelayState::On)?;
        self.enabled = true;
        info!("Power on (relay {})", self.relay_id);
        Ok(())
    }

    pub fn disable(&mut self, bridge: &mut Ch341) -> Result<()> {
        self.controller.set_relay(bridge, self.relay_id, RelayState::Off)?;
        self.enabled = false;
        info!("Power off (relay {})", self.relay_id);
        Ok(())
    }

    pub fn toggle(&mut self, bridge: &mut Ch341) -> Result<()> {
        if self.enabled {
            self.disable(bridge)
        } else {
            self.enable(bridge)
        }
    }

    /// On for `duration`, then off. Timing is sleep-based.
    pub fn pulse(&mut self, bridge: &mut Ch341, duration: Duration) -> Result<()> {
        self.enable(bridge)?;
        thread::sleep(duration);
        self.disable(bridge)
    }

    pub fn state(&self) -> RelayState {
        self.controller
            .get_relay(self.relay_id)
            .unwrap_or(RelayState::Off)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn relay_id(&self) -> u8 {
        self.relay_id
    }

    pub fn controller(&self) -> &RelayController {
        &self.controller
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_helpers() {
        assert_eq!(RelayState::from(true), RelayState::On);
        assert_eq!(RelayState::On.toggled(), RelayState::Off);
        assert_eq!(RelayState::default(), RelayState::Off);
        assert_eq!(RelayState::On.to_string(), "ON");
    }

    #[test]
    fn test_controllers_start_off() {
        let c = RelayController::gpio([(0, "GPIO1"), (1, "GPIO0")]);
        assert_eq!(c.relay_ids(), vec![0, 1]);
        assert_eq!(c.get_relay(1), Some(RelayState::Off));
        assert_eq!(c.get_relay(2), None);

        let c = RelayController::pcf8574(0x20, [(0, 0), (1, 3)]).unwrap();
        match c.backend() {
            RelayBackend::Pcf8574 { output, .. } => assert_eq!(*output, 0xFF),
            other => panic!("unexpected backend {other:?}"),
        }
    }

    #[test]
    fn test_pcf8574_bit_validation() {
        assert!(matches!(
            RelayController::pcf8574(0x20, [(0, 8)]),
            Err(Error::ArgumentOutOfRange(_))
        ));
    }
}
