//! 24Cxx serial EEPROM driver.

use crate::consts;
use crate::device::Ch341;
use crate::error::{Error, Result};
use crate::i2c::I2cAddress;
use log::{debug, info, trace, warn};
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

/// Default deadline for a write cycle to finish.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(100);
const POLL_INTERVAL: Duration = Duration::from_millis(1);
/// Gap after each byte on single-address-byte parts.
const BYTE_WRITE_GAP: Duration = Duration::from_millis(1);
/// Gap after each page and before string verification.
const PAGE_WRITE_GAP: Duration = Duration::from_millis(5);

/// Size and addressing of a 24Cxx part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EepromGeometry {
    pub name: &'static str,
    /// Capacity in bytes.
    pub size: usize,
    /// Largest write that stays inside one page.
    pub page_size: usize,
    /// Width of the memory address sent after the device address (1 or 2).
    pub address_bytes: u8,
}

const GEOMETRIES: [EepromGeometry; 8] = [
    EepromGeometry { name: "24C02", size: 256, page_size: 8, address_bytes: 1 },
    EepromGeometry { name: "24C04", size: 512, page_size: 16, address_bytes: 1 },
    EepromGeometry { name: "24C08", size: 1024, page_size: 16, address_bytes: 1 },
    EepromGeometry { name: "24C16", size: 2048, page_size: 16, address_bytes: 1 },
    EepromGeometry { name: "24C32", size: 4096, page_size: 32, address_bytes: 2 },
    EepromGeometry { name: "24C64", size: 8192, page_size: 32, address_bytes: 2 },
    EepromGeometry { name: "24C128", size: 16384, page_size: 64, address_bytes: 2 },
    EepromGeometry { name: "24C256", size: 32768, page_size: 64, address_bytes: 2 },
];

impl EepromGeometry {
    /// Finds a part by type name, e.g. `"24c32"` (case-insensitive).
    pub fn lookup(name: &str) -> Result<Self> {
        GEOMETRIES
            .iter()
            .find(|g| g.name.eq_ignore_ascii_case(name.trim()))
            .copied()
            .ok_or_else(|| Error::UnsupportedEepromType(name.to_string()))
    }

    /// Every supported part, smallest first.
    pub fn all() -> &'static [EepromGeometry] {
        &GEOMETRIES
    }
}

/// Static description returned by [`Eeprom::info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EepromInfo {
    pub type_name: &'static str,
    pub address: I2cAddress,
    pub size: usize,
    pub page_size: usize,
    pub address_bytes: u8,
}

impl fmt::Display for EepromInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {}: {} bytes, {} byte pages, {} address byte(s)",
            self.type_name, self.address, self.size, self.page_size, self.address_bytes
        )
    }
}

/// A 24Cxx EEPROM on the bridge's I2C bus.
///
/// Single-address-byte parts above 256 bytes (24C04/08/16) take the upper
/// memory address bits in the low bits of the device address, so they occupy
/// `size / 256` consecutive bus addresses starting at `address`.
#[derive(Debug, Clone)]
pub struct Eeprom {
    address: I2cAddress,
    geometry: EepromGeometry,
    write_timeout: Duration,
}

impl Eeprom {
    /// Creates a driver for a part of type `type_name` at `address`.
    pub fn new(address: u8, type_name: &str) -> Result<Self> {
        Self::with_geometry(address, EepromGeometry::lookup(type_name)?)
    }

    pub fn with_geometry(address: u8, geometry: EepromGeometry) -> Result<Self> {
        let address = I2cAddress::new(address)?;
        debug!("EEPROM {} at {}, {} bytes", geometry.name, address, geometry.size);
        Ok(Self {
            address,
            geometry,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        })
    }

    pub fn address(&self) -> I2cAddress {
        self.address
    }

    pub fn geometry(&self) -> EepromGeometry {
        self.geometry
    }

    pub fn size(&self) -> usize {
        self.geometry.size
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    pub fn set_write_timeout(&mut self, timeout: Duration) {
        self.write_timeout = timeout;
    }

    pub fn info(&self) -> EepromInfo {
        EepromInfo {
            type_name: self.geometry.name,
            address: self.address,
            size: self.geometry.size,
            page_size: self.geometry.page_size,
            address_bytes: self.geometry.address_bytes,
        }
    }

    fn check_range(&self, address: usize, length: usize) -> Result<()> {
        let end = address.checked_add(length);
        if address >= self.geometry.size || end.map_or(true, |end| end > self.geometry.size) {
            return Err(Error::AddressOutOfRange {
                address,
                length,
                size: self.geometry.size,
            });
        }
        Ok(())
    }

    /// Bus address serving memory address `mem`.
    fn device_address(&self, mem: usize) -> u8 {
        if self.geometry.address_bytes == 1 {
            self.address.value() | (mem / consts::eeprom::BLOCK_SIZE) as u8
        } else {
            self.address.value()
        }
    }

    /// Memory address bytes as sent after the device address.
    fn address_bytes(&self, mem: usize) -> Vec<u8> {
        if self.geometry.address_bytes == 1 {
            vec![(mem & 0xFF) as u8]
        } else {
            vec![((mem >> 8) & 0xFF) as u8, (mem & 0xFF) as u8]
        }
    }

    pub fn read_byte(&self, bridge: &mut Ch341, address: usize) -> Result<u8> {
        let data = self.read_bytes(bridge, address, 1)?;
        Ok(data[0])
    }

    pub fn write_byte(&self, bridge: &mut Ch341, address: usize, value: u8) -> Result<()> {
        self.write_bytes(bridge, address, &[value])
    }

    /// Sequential read of `length` bytes from `address`.
    pub fn read_bytes(&self, bridge: &mut Ch341, address: usize, length: usize) -> Result<Vec<u8>> {
        self.check_range(address, length)?;
        let mut data = Vec::with_capacity(length);
        let mut mem = address;
        while data.len() < length {
            // Block-select parts cannot read across a 256-byte boundary in one go.
            let chunk = if self.geometry.address_bytes == 1 {
                let block_end = (mem / consts::eeprom::BLOCK_SIZE + 1) * consts::eeprom::BLOCK_SIZE;
                (length - data.len()).min(block_end - mem)
            } else {
                length - data.len()
            };
            let part = bridge.i2c_write_read(self.device_address(mem), &self.address_bytes(mem), chunk)?;
            data.extend_from_slice(&part);
            mem += chunk;
        }
        trace!("EEPROM read 0x{:04X}+{}: {:02X?}", address, length, &data[..]);
        Ok(data)
    }

    /// Writes `data` at `address`, waiting out every write cycle.
    ///
    /// Single-address-byte parts are written one byte at a time; larger
    /// parts one page-aligned chunk at a time.
    pub fn write_bytes(&self, bridge: &mut Ch341, address: usize, data: &[u8]) -> Result<()> {
        self.check_range(address, data.len())?;
        if data.is_empty() {
            return Ok(());
        }

        if self.geometry.address_bytes == 1 {
            for (i, &value) in data.iter().enumerate() {
                let mem = address + i;
                bridge.write_register_byte(self.device_address(mem), (mem & 0xFF) as u8, value)?;
                self.wait_write_complete(bridge, Some((mem, value)))?;
                thread::sleep(BYTE_WRITE_GAP);
            }
        } else {
            let page = self.geometry.page_size;
            let mut offset = 0;
            while offset < data.len() {
                let mem = address + offset;
                let chunk = (page - mem % page).min(data.len() - offset);
                let mut buf = self.address_bytes(mem);
                buf.extend_from_slice(&data[offset..offset + chunk]);
                bridge.i2c_write(self.device_address(mem), &buf)?;

                let last = mem + chunk - 1;
                self.wait_write_complete(bridge, Some((last, data[offset + chunk - 1])))?;
                thread::sleep(PAGE_WRITE_GAP);
                debug!("EEPROM page write 0x{:04X}+{}", mem, chunk);
                offset += chunk;
            }
        }
        info!("Wrote {} bytes to EEPROM at 0x{:04X}", data.len(), address);
        Ok(())
    }

    /// Polls until the part accepts commands again.
    ///
    /// Each round tries an address-only write (ACK polling); if that fails and
    /// `probe` names a memory address with its expected value, the byte is
    /// read back and compared instead.
    pub fn wait_write_complete(
        &self,
        bridge: &mut Ch341,
        probe: Option<(usize, u8)>,
    ) -> Result<()> {
        let deadline = Instant::now() + self.write_timeout;
        let device = probe.map_or(self.address.value(), |(mem, _)| self.device_address(mem));
        loop {
            if bridge.i2c_probe(device)? {
                return Ok(());
            }
            if let Some((mem, expected)) = probe {
                if let Ok(rb) = bridge.i2c_write_read(device, &self.address_bytes(mem), 1) {
                    if rb.first() == Some(&expected) {
                        return Ok(());
                    }
                }
            }
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }
        warn!("EEPROM {} write cycle did not complete", self.address);
        Err(Error::ProtocolTimeout {
            operation: format!("EEPROM {} write cycle", self.address),
            timeout: self.write_timeout,
        })
    }

    /// Reads a NUL-terminated string of at most `max_length` bytes.
    ///
    /// Blank memory (all `0xFF` or all `0x00`) reads as an empty string.
    /// Invalid UTF-8 sequences are replaced.
    pub fn read_string(&self, bridge: &mut Ch341, address: usize, max_length: usize) -> Result<String> {
        let data = self.read_bytes(bridge, address, max_length)?;
        trace!(
            "EEPROM string raw (first 16): {:02X?}",
            &data[..data.len().min(16)]
        );
        if data.iter().all(|&b| b == 0xFF) || data.iter().all(|&b| b == 0x00) {
            return Ok(String::new());
        }
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        Ok(String::from_utf8_lossy(&data[..end]).into_owned())
    }

    /// Writes `text` plus a NUL terminator and verifies it by reading back.
    pub fn write_string(&self, bridge: &mut Ch341, address: usize, text: &str) -> Result<()> {
        let mut data = text.as_bytes().to_vec();
        data.push(0);
        self.write_bytes(bridge, address, &data)?;
        thread::sleep(PAGE_WRITE_GAP);
        let verify = self.read_bytes(bridge, address, data.len())?;
        if verify != data {
            warn!(
                "EEPROM verify mismatch at 0x{:04X}; write protect enabled or wrong address?",
                address
            );
            return Err(Error::VerifyMismatch {
                address,
                expected: data,
                actual: verify,
            });
        }
        Ok(())
    }

    /// Reads the board identifier stored at `offset`.
    pub fn read_board_id(&self, bridge: &mut Ch341, offset: usize) -> Result<String> {
        info!("Reading board ID at 0x{:04X}", offset);
        let len = consts::eeprom::BOARD_ID_MAX_LEN.min(self.geometry.size.saturating_sub(offset));
        self.read_string(bridge, offset, len)
    }

    /// Stores `board_id` at `offset`.
    ///
    /// The ID and its NUL terminator must fit in the board ID field read back
    /// by [`Eeprom::read_board_id`].
    pub fn write_board_id(&self, bridge: &mut Ch341, offset: usize, board_id: &str) -> Result<()> {
        if board_id.len() >= consts::eeprom::BOARD_ID_MAX_LEN {
            return Err(Error::ArgumentOutOfRange(format!(
                "Board ID is {} bytes, at most {} fit",
                board_id.len(),
                consts::eeprom::BOARD_ID_MAX_LEN - 1
            )));
        }
        info!("Writing board ID '{}' at 0x{:04X}", board_id, offset);
        self.write_string(bridge, offset, board_id)
    }

    /// Hex/ASCII listing, 16 bytes per line. `length` defaults to the rest of the part.
    pub fn dump_hex(&self, bridge: &mut Ch341, start: usize, length: Option<usize>) -> Result<String> {
        let length = length.unwrap_or_else(|| self.geometry.size.saturating_sub(start));
        let data = self.read_bytes(bridge, start, length)?;
        Ok(format_hex_dump(start, &data))
    }

    /// True when the first byte can be read.
    pub fn test_device(&self, bridge: &mut Ch341) -> bool {
        match self.read_byte(bridge, 0) {
            Ok(_) => {
                info!("EEPROM {} responds", self.address);
                true
            }
            Err(e) => {
                warn!("EEPROM {} test failed: {}", self.address, e);
                false
            }
        }
    }
}

/// Renders `data` as `AAAA: XX XX ..  |ascii|` lines.
pub fn format_hex_dump(start: usize, data: &[u8]) -> String {
    data.chunks(16)
        .enumerate()
        .map(|(i, row)| {
            let mut hex = String::with_capacity(48);
            let mut ascii = String::with_capacity(16);
            for j in 0..16 {
                match row.get(j) {
                    Some(&b) => {
                        hex.push_str(&format!("{:02X} ", b));
                        ascii.push(if (32..=126).contains(&b) { b as char } else { '.' });
                    }
                    None => {
                        hex.push_str("   ");
                        ascii.push(' ');
                    }
                }
            }
            format!("{:04X}: {} |{}|", start + i * 16, hex, ascii)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Scans 0x50-0x57 for EEPROMs with double-confirmed read probes.
pub fn scan_eeproms(bridge: &mut Ch341) -> Result<Vec<u8>> {
    bridge.i2c_scan_with_progress(
        consts::eeprom::FIRST_ADDR,
        consts::eeprom::LAST_ADDR,
        |_, _, _, _| {},
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_table() {
        let g = EepromGeometry::lookup("24c64").unwrap();
        assert_eq!((g.size, g.page_size, g.address_bytes), (8192, 32, 2));
        let g = EepromGeometry::lookup("24C04").unwrap();
        assert_eq!((g.size, g.page_size, g.address_bytes), (512, 16, 1));
        assert!(matches!(
            EepromGeometry::lookup("24C512"),
            Err(Error::UnsupportedEepromType(_))
        ));
        assert_eq!(EepromGeometry::all().len(), 8);
    }

    #[test]
    fn test_range_check() {
        let e = Eeprom::new(0x50, "24C02").unwrap();
        assert!(e.check_range(0, 256).is_ok());
        assert!(e.check_range(255, 1).is_ok());
        assert!(e.check_range(256, 0).is_err());
        assert!(e.check_range(250, 7).is_err());
        assert!(e.check_range(1, usize::MAX).is_err());
    }

    #[test]
    fn test_block_select_addressing() {
        let e = Eeprom::new(0x50, "24C16").unwrap();
        assert_eq!(e.device_address(0x000), 0x50);
        assert_eq!(e.device_address(0x1FF), 0x51);
        assert_eq!(e.device_address(0x7FF), 0x57);
        assert_eq!(e.address_bytes(0x7FF), vec![0xFF]);

        let e = Eeprom::new(0x50, "24C256").unwrap();
        assert_eq!(e.device_address(0x7FFF), 0x50);
        assert_eq!(e.address_bytes(0x1234), vec![0x12, 0x34]);
    }

    #[test]
    fn test_hex_dump_format() {
        let dump = format_hex_dump(0x10, b"Hi\x00\xFF");
        assert_eq!(
            dump,
            format!("0010: 48 69 00 FF {} |Hi..{}|", "   ".repeat(12), " ".repeat(12))
        );
        let two = format_hex_dump(0, &[0x41; 17]);
        assert_eq!(two.lines().count(), 2);
        assert!(two.lines().nth(1).unwrap().starts_with("0010: 41 "));
    }
}
