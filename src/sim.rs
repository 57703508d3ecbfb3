//! In-memory CH341 with simulated parts on its I2C bus.
//!
//! [`SimBridge`] implements [`NativeDriver`], so a [`crate::Ch341`] can be
//! opened on it with [`crate::Ch341::open_with`]. Clones share state: keep a
//! clone to inspect the bus traffic and the parts after handing one to the
//! handle.
//!
//! ```
//! use ch341_powerbench::sim::SimBridge;
//! use ch341_powerbench::{Ch341, EepromGeometry};
//!
//! let sim = SimBridge::new();
//! sim.add_eeprom(0x50, EepromGeometry::lookup("24C02").unwrap());
//! let mut bridge = Ch341::open_with(sim.clone(), 0).unwrap();
//! assert!(bridge.i2c_probe(0x50).unwrap());
//! assert!(!bridge.i2c_probe(0x51).unwrap());
//! ```

use crate::consts;
use crate::consts::gpio::enable;
use crate::eeprom::EepromGeometry;
use crate::error::{Error, Result};
use crate::native::NativeDriver;
use std::cell::RefCell;
use std::rc::Rc;

/// Idle levels of bits 16-23: SCL and SDA pulled up.
const IDLE_HIGH_LANE: u32 = consts::gpio::status::SCL | consts::gpio::status::SDA;

/// One `CH341StreamI2C` call as seen on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimTransfer {
    /// 7-bit target address.
    pub address: u8,
    /// Direction bit of the first byte.
    pub read: bool,
    /// Bytes after the address byte.
    pub write: Vec<u8>,
    pub read_len: usize,
}

#[derive(Debug, Clone)]
struct SimEeprom {
    base: u8,
    geometry: EepromGeometry,
    memory: Vec<u8>,
    pointer: usize,
    busy_polls: u32,
    busy_remaining: u32,
    write_protect: bool,
    writes: usize,
}

impl SimEeprom {
    fn new(base: u8, geometry: EepromGeometry) -> Self {
        Self {
            base,
            geometry,
            memory: vec![0xFF; geometry.size],
            pointer: 0,
            busy_polls: 0,
            busy_remaining: 0,
            write_protect: false,
            writes: 0,
        }
    }

    /// Device addresses the part answers on (block-select bits included).
    fn blocks(&self) -> u8 {
        if self.geometry.address_bytes == 1 {
            (self.geometry.size / consts::eeprom::BLOCK_SIZE).max(1) as u8
        } else {
            1
        }
    }

    fn responds_to(&self, address: u8) -> bool {
        address >= self.base && address < self.base + self.blocks()
    }

    fn write(&mut self, address: u8, data: &[u8]) -> bool {
        if self.busy_remaining > 0 {
            self.busy_remaining -= 1;
            return false;
        }
        if data.is_empty() {
            return true;
        }
        let block = (address - self.base) as usize;
        let (mem_addr, payload) = if self.geometry.address_bytes == 1 {
            (block * consts::eeprom::BLOCK_SIZE + data[0] as usize, &data[1..])
        } else if data.len() >= 2 {
            (((data[0] as usize) << 8) | data[1] as usize, &data[2..])
        } else {
            ((data[0] as usize) << 8, &data[1..])
        };
        let mem_addr = mem_addr % self.geometry.size;
        self.pointer = mem_addr;
        if payload.is_empty() {
            return true;
        }
        let page = self.geometry.page_size;
        let page_start = mem_addr - mem_addr % page;
        let offset = mem_addr % page;
        if !self.write_protect {
            for (i, b) in payload.iter().enumerate() {
                self.memory[page_start + (offset + i) % page] = *b;
            }
            self.busy_remaining = self.busy_polls;
            self.writes += 1;
        }
        self.pointer = page_start + (offset + payload.len()) % page;
        true
    }

    fn read(&mut self, buf: &mut [u8]) -> bool {
        if self.busy_remaining > 0 {
            self.busy_remaining -= 1;
            return false;
        }
        for b in buf.iter_mut() {
            *b = self.memory[self.pointer];
            self.pointer = (self.pointer + 1) % self.geometry.size;
        }
        true
    }
}

#[derive(Debug, Clone)]
struct SimIna226 {
    address: u8,
    pointer: u8,
    config: u16,
    calibration: u16,
    mask_enable: u16,
    alert_limit: u16,
    shunt_raw: i16,
    bus_raw: u16,
    manufacturer_id: u16,
    die_id: u16,
}

impl SimIna226 {
    fn new(address: u8) -> Self {
        Self {
            address,
            pointer: 0,
            config: consts::ina226::config::POWER_ON_DEFAULT,
            calibration: 0,
            mask_enable: 0,
            alert_limit: 0,
            shunt_raw: 0,
            bus_raw: 0,
            manufacturer_id: consts::ina226::MANUFACTURER_ID,
            die_id: consts::ina226::DIE_ID,
        }
    }

    fn current_raw(&self) -> i16 {
        let raw = self.shunt_raw as i32 * self.calibration as i32 / 2048;
        raw.clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }

    fn register(&self, reg: u8) -> u16 {
        use consts::ina226::*;
        match reg {
            REG_CONFIGURATION => self.config,
            REG_SHUNT_VOLTAGE => self.shunt_raw as u16,
            REG_BUS_VOLTAGE => self.bus_raw,
            REG_POWER => {
                let p = (self.current_raw() as i32).unsigned_abs() * self.bus_raw as u32 / 20000;
                p.min(u16::MAX as u32) as u16
            }
            REG_CURRENT => self.current_raw() as u16,
            REG_CALIBRATION => self.calibration,
            REG_MASK_ENABLE => self.mask_enable,
            REG_ALERT_LIMIT => self.alert_limit,
            REG_MANUFACTURER_ID => self.manufacturer_id,
            REG_DIE_ID => self.die_id,
            _ => 0xFFFF,
        }
    }

    fn reset(&mut self) {
        self.config = consts::ina226::config::POWER_ON_DEFAULT;
        self.calibration = 0;
        self.mask_enable = 0;
        self.alert_limit = 0;
    }

    fn write(&mut self, data: &[u8]) -> bool {
        use consts::ina226::*;
        if data.is_empty() {
            return true;
        }
        self.pointer = data[0];
        if data.len() < 3 {
            return true;
        }
        let value = u16::from_be_bytes([data[1], data[2]]);
        match self.pointer {
            REG_CONFIGURATION if value & config::RESET != 0 => self.reset(),
            REG_CONFIGURATION => self.config = value,
            REG_CALIBRATION => self.calibration = value & MAX_CALIBRATION,
            REG_MASK_ENABLE => self.mask_enable = value,
            REG_ALERT_LIMIT => self.alert_limit = value,
            _ => {}
        }
        true
    }

    fn read(&mut self, buf: &mut [u8]) -> bool {
        let bytes = self.register(self.pointer).to_be_bytes();
        for (i, b) in buf.iter_mut().enumerate() {
            *b = bytes.get(i).copied().unwrap_or(0xFF);
        }
        true
    }
}

#[derive(Debug, Clone)]
struct SimPcf8574 {
    address: u8,
    output: u8,
    /// Lines pulled low from outside read as 0.
    external: u8,
}

#[derive(Debug, Clone)]
enum SimDevice {
    Eeprom(SimEeprom),
    Ina226(SimIna226),
    Pcf8574(SimPcf8574),
}

impl SimDevice {
    fn responds_to(&self, address: u8) -> bool {
        match self {
            SimDevice::Eeprom(e) => e.responds_to(address),
            SimDevice::Ina226(d) => d.address == address,
            SimDevice::Pcf8574(d) => d.address == address,
        }
    }

    fn write(&mut self, address: u8, data: &[u8]) -> bool {
        match self {
            SimDevice::Eeprom(e) => e.write(address, data),
            SimDevice::Ina226(d) => d.write(data),
            SimDevice::Pcf8574(d) => {
                if let Some(last) = data.last() {
                    d.output = *last;
                }
                true
            }
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> bool {
        match self {
            SimDevice::Eeprom(e) => e.read(buf),
            SimDevice::Ina226(d) => d.read(buf),
            SimDevice::Pcf8574(d) => {
                buf.fill(d.output & d.external);
                true
            }
        }
    }
}

#[derive(Debug)]
struct SimState {
    present: bool,
    fail_reset: bool,
    opened: bool,
    ic_version: u32,
    driver_version: u32,
    name: Option<String>,
    stream_mode: Option<u32>,
    fail_set_stream: bool,
    latch: u32,
    direction: u32,
    external: u32,
    stuck_low: u32,
    stuck_high: u32,
    fail_set_output: bool,
    fail_get_input: bool,
    floating_bus: bool,
    devices: Vec<SimDevice>,
    transfers: Vec<SimTransfer>,
    set_output_log: Vec<(u32, u32, u32)>,
    get_input_calls: usize,
    native_calls: usize,
    reset_calls: usize,
    flush_calls: usize,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            present: true,
            fail_reset: false,
            opened: false,
            ic_version: consts::IC_VER_CH341A,
            driver_version: 0x0000_0034,
            name: Some("CH341A (simulated)".to_string()),
            stream_mode: None,
            fail_set_stream: false,
            latch: 0,
            direction: consts::gpio::DEFAULT_DIRECTION_MASK,
            external: IDLE_HIGH_LANE,
            stuck_low: 0,
            stuck_high: 0,
            fail_set_output: false,
            fail_get_input: false,
            floating_bus: false,
            devices: Vec::new(),
            transfers: Vec::new(),
            set_output_log: Vec::new(),
            get_input_calls: 0,
            native_calls: 0,
            reset_calls: 0,
            flush_calls: 0,
        }
    }
}

impl SimState {
    fn device(&mut self, address: u8) -> Option<&mut SimDevice> {
        self.devices.iter_mut().find(|d| d.responds_to(address))
    }

    fn levels(&self) -> u32 {
        let levels = (self.latch & self.direction) | (self.external & !self.direction);
        (levels | self.stuck_high) & !self.stuck_low
    }
}

/// Simulated CH341 bridge. See the module docs.
#[derive(Debug, Clone, Default)]
pub struct SimBridge {
    state: Rc<RefCell<SimState>>,
}

impl SimBridge {
    /// A CH341A with nothing on the bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// A bridge reporting `ic_version` (0x32 for the CH341B).
    pub fn with_ic_version(ic_version: u32) -> Self {
        let sim = Self::default();
        sim.state.borrow_mut().ic_version = ic_version;
        sim
    }

    // --- Fault injection ---

    /// When false, open fails as if no device were plugged in.
    pub fn set_present(&self, present: bool) {
        self.state.borrow_mut().present = present;
    }
    pub fn set_fail_reset(&self, fail: bool) {
        self.state.borrow_mut().fail_reset = fail;
    }
    pub fn set_fail_set_stream(&self, fail: bool) {
        self.state.borrow_mut().fail_set_stream = fail;
    }
    pub fn set_fail_set_output(&self, fail: bool) {
        self.state.borrow_mut().fail_set_output = fail;
    }
    pub fn set_fail_get_input(&self, fail: bool) {
        self.state.borrow_mut().fail_get_input = fail;
    }
    /// Reads from addresses nobody answers return `0xFF` instead of failing.
    pub fn set_floating_bus(&self, floating: bool) {
        self.state.borrow_mut().floating_bus = floating;
    }

    // --- GPIO ---

    /// Levels seen on pins configured as inputs.
    pub fn set_external_levels(&self, levels: u32) {
        self.state.borrow_mut().external = levels;
    }
    /// Pins that read low whatever is driven.
    pub fn set_stuck_low(&self, mask: u32) {
        self.state.borrow_mut().stuck_low = mask;
    }
    /// Pins that read high whatever is driven.
    pub fn set_stuck_high(&self, mask: u32) {
        self.state.borrow_mut().stuck_high = mask;
    }
    pub fn latch(&self) -> u32 {
        self.state.borrow().latch
    }
    pub fn direction(&self) -> u32 {
        self.state.borrow().direction
    }
    /// Every `CH341SetOutput(enable, direction, data)` received.
    pub fn set_output_log(&self) -> Vec<(u32, u32, u32)> {
        self.state.borrow().set_output_log.clone()
    }

    // --- Bus parts ---

    pub fn add_eeprom(&self, base: u8, geometry: EepromGeometry) {
        self.state
            .borrow_mut()
            .devices
            .push(SimDevice::Eeprom(SimEeprom::new(base, geometry)));
    }

    fn with_eeprom<R>(&self, base: u8, f: impl FnOnce(&mut SimEeprom) -> R) -> Option<R> {
        let mut state = self.state.borrow_mut();
        state.devices.iter_mut().find_map(|d| match d {
            SimDevice::Eeprom(e) if e.base == base => Some(e),
            _ => None,
        }).map(f)
    }

    /// Contents of the EEPROM registered at `base`.
    pub fn eeprom_memory(&self, base: u8) -> Option<Vec<u8>> {
        self.with_eeprom(base, |e| e.memory.clone())
    }

    /// Preloads EEPROM contents without bus traffic.
    ///
    /// Data that would run past the end of the part is rejected, as is a
    /// `base` with no simulated EEPROM.
    pub fn load_eeprom(&self, base: u8, offset: usize, data: &[u8]) -> Result<()> {
        self.with_eeprom(base, |e| {
            let size = e.memory.len();
            match offset.checked_add(data.len()) {
                Some(end) if end <= size => {
                    e.memory[offset..end].copy_from_slice(data);
                    Ok(())
                }
                _ => Err(Error::AddressOutOfRange {
                    address: offset,
                    length: data.len(),
                    size,
                }),
            }
        })
        .unwrap_or_else(|| {
            Err(Error::ArgumentOutOfRange(format!(
                "no simulated EEPROM at 0x{:02X}",
                base
            )))
        })
    }

    /// Number of NACKed polls after each write cycle starts.
    pub fn set_eeprom_busy_polls(&self, base: u8, polls: u32) {
        self.with_eeprom(base, |e| e.busy_polls = polls);
    }

    /// Writes are acknowledged but not stored.
    pub fn set_eeprom_write_protect(&self, base: u8, protect: bool) {
        self.with_eeprom(base, |e| e.write_protect = protect);
    }

    /// Number of write cycles the EEPROM at `base` has performed.
    pub fn eeprom_write_cycles(&self, base: u8) -> Option<usize> {
        self.with_eeprom(base, |e| e.writes)
    }

    pub fn add_ina226(&self, address: u8) {
        self.state
            .borrow_mut()
            .devices
            .push(SimDevice::Ina226(SimIna226::new(address)));
    }

    fn with_ina226<R>(&self, address: u8, f: impl FnOnce(&mut SimIna226) -> R) -> Option<R> {
        let mut state = self.state.borrow_mut();
        state.devices.iter_mut().find_map(|d| match d {
            SimDevice::Ina226(m) if m.address == address => Some(m),
            _ => None,
        }).map(f)
    }

    /// Sets the differential shunt voltage the ADC reports.
    pub fn set_shunt_voltage(&self, address: u8, volts: f64) {
        let raw = (volts / consts::ina226::SHUNT_LSB_V).round() as i16;
        self.with_ina226(address, |m| m.shunt_raw = raw);
    }

    /// Sets the bus voltage the ADC reports.
    pub fn set_bus_voltage(&self, address: u8, volts: f64) {
        let raw = (volts / consts::ina226::BUS_LSB_V).round() as u16;
        self.with_ina226(address, |m| m.bus_raw = raw);
    }

    pub fn set_manufacturer_id(&self, address: u8, id: u16) {
        self.with_ina226(address, |m| m.manufacturer_id = id);
    }

    /// Register value as the INA226 at `address` would return it.
    pub fn ina226_register(&self, address: u8, reg: u8) -> Option<u16> {
        self.with_ina226(address, |m| m.register(reg))
    }

    pub fn add_pcf8574(&self, address: u8) {
        self.state.borrow_mut().devices.push(SimDevice::Pcf8574(SimPcf8574 {
            address,
            output: consts::pcf8574::POWER_ON_OUTPUT,
            external: 0xFF,
        }));
    }

    fn with_pcf8574<R>(&self, address: u8, f: impl FnOnce(&mut SimPcf8574) -> R) -> Option<R> {
        let mut state = self.state.borrow_mut();
        state.devices.iter_mut().find_map(|d| match d {
            SimDevice::Pcf8574(p) if p.address == address => Some(p),
            _ => None,
        }).map(f)
    }

    /// Output latch of the expander at `address`.
    pub fn pcf8574_output(&self, address: u8) -> Option<u8> {
        self.with_pcf8574(address, |p| p.output)
    }

    /// Lines held low from outside the expander (0 bits).
    pub fn set_pcf8574_external(&self, address: u8, levels: u8) {
        self.with_pcf8574(address, |p| p.external = levels);
    }

    // --- Traffic ---

    pub fn is_device_open(&self) -> bool {
        self.state.borrow().opened
    }

    pub fn stream_mode(&self) -> Option<u32> {
        self.state.borrow().stream_mode
    }

    pub fn transfers(&self) -> Vec<SimTransfer> {
        self.state.borrow().transfers.clone()
    }

    pub fn reset_calls(&self) -> usize {
        self.state.borrow().reset_calls
    }

    pub fn flush_calls(&self) -> usize {
        self.state.borrow().flush_calls
    }

    /// Total bus and pin register accesses since the last [`Self::clear_log`].
    pub fn io_count(&self) -> usize {
        let s = self.state.borrow();
        s.transfers.len() + s.set_output_log.len() + s.get_input_calls + s.native_calls
    }

    pub fn clear_log(&self) {
        let mut s = self.state.borrow_mut();
        s.transfers.clear();
        s.set_output_log.clear();
        s.get_input_calls = 0;
        s.native_calls = 0;
    }
}

impl NativeDriver for SimBridge {
    fn open_device(&mut self, _index: u32) -> bool {
        let mut s = self.state.borrow_mut();
        s.opened = s.present;
        s.opened
    }

    fn close_device(&mut self, _index: u32) {
        self.state.borrow_mut().opened = false;
    }

    fn reset_device(&mut self, _index: u32) -> bool {
        let mut s = self.state.borrow_mut();
        s.reset_calls += 1;
        s.opened && !s.fail_reset
    }

    fn get_version(&mut self) -> u32 {
        self.state.borrow().driver_version
    }

    fn get_ic_version(&mut self, _index: u32) -> u32 {
        self.state.borrow().ic_version
    }

    fn get_device_name(&mut self, _index: u32) -> Option<String> {
        self.state.borrow().name.clone()
    }

    fn flush_buffer(&mut self, _index: u32) -> bool {
        let mut s = self.state.borrow_mut();
        s.flush_calls += 1;
        s.opened
    }

    fn read_i2c(&mut self, _index: u32, device: u8, register: u8) -> Option<u8> {
        let mut s = self.state.borrow_mut();
        s.native_calls += 1;
        if !s.opened {
            return None;
        }
        let dev = s.device(device)?;
        let mut value = [0u8; 1];
        (dev.write(device, &[register]) && dev.read(&mut value)).then_some(value[0])
    }

    fn write_i2c(&mut self, _index: u32, device: u8, register: u8, value: u8) -> bool {
        let mut s = self.state.borrow_mut();
        s.native_calls += 1;
        if !s.opened {
            return false;
        }
        match s.device(device) {
            Some(dev) => dev.write(device, &[register, value]),
            None => false,
        }
    }

    fn set_stream(&mut self, _index: u32, mode: u32) -> bool {
        let mut s = self.state.borrow_mut();
        if !s.opened || s.fail_set_stream {
            return false;
        }
        s.stream_mode = Some(mode);
        true
    }

    fn stream_i2c(&mut self, _index: u32, write: &[u8], read: &mut [u8]) -> bool {
        let mut s = self.state.borrow_mut();
        let Some((&first, payload)) = write.split_first() else {
            return false;
        };
        let address = first >> 1;
        let is_read = first & 1 == 1;
        s.transfers.push(SimTransfer {
            address,
            read: is_read,
            write: payload.to_vec(),
            read_len: read.len(),
        });
        if !s.opened {
            return false;
        }
        let floating = s.floating_bus;
        match s.device(address) {
            Some(dev) => {
                if is_read {
                    dev.read(read)
                } else {
                    dev.write(address, payload) && (read.is_empty() || dev.read(read))
                }
            }
            None if floating && is_read => {
                read.fill(0xFF);
                true
            }
            None => false,
        }
    }

    fn set_output(&mut self, _index: u32, enable_mask: u32, direction: u32, data: u32) -> bool {
        let mut s = self.state.borrow_mut();
        s.set_output_log.push((enable_mask, direction, data));
        if !s.opened || s.fail_set_output {
            return false;
        }
        let lanes = [
            (enable::DIR_8_15, 0x0000_FF00, true),
            (enable::DIR_0_7, 0x0000_00FF, true),
            (enable::DATA_8_15, 0x0000_FF00, false),
            (enable::DATA_0_7, 0x0000_00FF, false),
            (enable::DATA_16_23, 0x00FF_0000, false),
        ];
        for (bit, lane, is_direction) in lanes {
            if enable_mask & bit == 0 {
                continue;
            }
            if is_direction {
                s.direction = (s.direction & !lane) | (direction & lane);
            } else {
                s.latch = (s.latch & !lane) | (data & lane);
            }
        }
        true
    }

    fn get_input(&mut self, _index: u32) -> Option<u32> {
        let mut s = self.state.borrow_mut();
        s.get_input_calls += 1;
        (s.opened && !s.fail_get_input).then(|| s.levels())
    }

    fn get_status(&mut self, _index: u32) -> Option<u32> {
        let s = self.state.borrow();
        s.opened.then(|| s.levels())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eeprom_page_wrap() {
        let geometry = EepromGeometry::lookup("24C02").unwrap();
        let mut e = SimEeprom::new(0x50, geometry);
        // Page size 8: writing 4 bytes at 6 wraps to 0 and 1.
        assert!(e.write(0x50, &[6, 1, 2, 3, 4]));
        assert_eq!(&e.memory[0..8], &[3, 4, 0xFF, 0xFF, 0xFF, 0xFF, 1, 2]);
    }

    #[test]
    fn test_eeprom_block_select() {
        let geometry = EepromGeometry::lookup("24C08").unwrap();
        let mut e = SimEeprom::new(0x50, geometry);
        assert!(e.responds_to(0x53));
        assert!(!e.responds_to(0x54));
        assert!(e.write(0x52, &[0x10, 0xAB]));
        assert_eq!(e.memory[0x210], 0xAB);
    }

    #[test]
    fn test_eeprom_busy_nacks() {
        let geometry = EepromGeometry::lookup("24C32").unwrap();
        let mut e = SimEeprom::new(0x50, geometry);
        e.busy_polls = 2;
        assert!(e.write(0x50, &[0x01, 0x00, 0x55]));
        assert!(!e.write(0x50, &[]));
        assert!(!e.write(0x50, &[]));
        assert!(e.write(0x50, &[]));
        assert_eq!(e.memory[0x100], 0x55);
    }

    #[test]
    fn test_load_eeprom_is_bounds_checked() {
        let sim = SimBridge::new();
        sim.add_eeprom(0x50, EepromGeometry::lookup("24C02").unwrap());
        assert!(sim.load_eeprom(0x50, 0xF0, &[0xAA; 16]).is_ok());
        assert!(matches!(
            sim.load_eeprom(0x50, 0xF0, &[0xAA; 17]),
            Err(Error::AddressOutOfRange { address: 0xF0, length: 17, size: 256 })
        ));
        assert!(matches!(
            sim.load_eeprom(0x50, usize::MAX, &[0]),
            Err(Error::AddressOutOfRange { .. })
        ));
        assert!(matches!(
            sim.load_eeprom(0x51, 0, &[0]),
            Err(Error::ArgumentOutOfRange(_))
        ));
        assert_eq!(sim.eeprom_memory(0x50).unwrap()[0xFF], 0xAA);
    }

    #[test]
    fn test_ina226_current_register() {
        let mut m = SimIna226::new(0x40);
        m.shunt_raw = 4000; // 10 mV
        m.calibration = 20;
        assert_eq!(m.current_raw(), 39);
        assert!(m.write(&[0x00, 0x80, 0x00]));
        assert_eq!(m.calibration, 0);
        assert_eq!(m.config, 0x4127);
    }

    #[test]
    fn test_gpio_levels_follow_direction() {
        let mut s = SimState::default();
        s.direction = 0x0000_0100;
        s.latch = 0x0000_0300;
        s.external = 0x0000_0000;
        assert_eq!(s.levels() & 0x300, 0x100);
        s.stuck_low = 0x100;
        assert_eq!(s.levels() & 0x100, 0);
    }
}
