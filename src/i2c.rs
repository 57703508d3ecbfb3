//! I2C communication through the CH341 stream interface.

use crate::consts;
use crate::consts::i2c::stream;
use crate::device::Ch341;
use crate::error::{Error, Result};
use log::{debug, trace};
use std::fmt;
use std::thread;
use std::time::Duration;

/// Pause between scan candidates.
const SCAN_INTERVAL: Duration = Duration::from_millis(1);

/// A 7-bit I2C slave address.
/// Use `I2cAddress::new(addr)` to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct I2cAddress(u8);

impl I2cAddress {
    /// Creates a 7-bit address, checking validity (0-127).
    pub fn new(addr: u8) -> Result<Self> {
        if addr <= 0x7F {
            Ok(I2cAddress(addr))
        } else {
            Err(Error::ArgumentOutOfRange(format!(
                "7-bit I2C address must be 0x00-0x7F, got 0x{:02X}",
                addr
            )))
        }
    }

    /// Returns the raw 7-bit value.
    #[inline]
    pub fn value(&self) -> u8 {
        self.0
    }

    /// First byte on the wire: address shifted left with the R/W bit.
    #[inline]
    pub fn wire_byte(&self, read: bool) -> u8 {
        (self.0 << 1) | u8::from(read)
    }
}

impl fmt::Display for I2cAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// SCL rates selectable through the stream mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum I2cSpeed {
    /// 20 kHz
    Low,
    /// 100 kHz
    #[default]
    Standard,
    /// 400 kHz
    Fast,
    /// 750 kHz
    High,
}

impl I2cSpeed {
    /// Value passed to `CH341SetStream`.
    pub fn stream_mode(self) -> u32 {
        match self {
            I2cSpeed::Low => consts::i2c::SPEED_LOW,
            I2cSpeed::Standard => consts::i2c::SPEED_STANDARD,
            I2cSpeed::Fast => consts::i2c::SPEED_FAST,
            I2cSpeed::High => consts::i2c::SPEED_HIGH,
        }
    }

    /// Nominal clock rate in kHz.
    pub fn khz(self) -> u32 {
        match self {
            I2cSpeed::Low => 20,
            I2cSpeed::Standard => 100,
            I2cSpeed::Fast => 400,
            I2cSpeed::High => 750,
        }
    }

    /// Maps a clock rate in kHz onto one of the supported speeds.
    pub fn from_khz(khz: u32) -> Result<Self> {
        match khz {
            20 => Ok(I2cSpeed::Low),
            100 => Ok(I2cSpeed::Standard),
            400 => Ok(I2cSpeed::Fast),
            750 => Ok(I2cSpeed::High),
            other => Err(Error::ArgumentOutOfRange(format!(
                "I2C speed {} kHz not supported (20, 100, 400 or 750)",
                other
            ))),
        }
    }
}

/// One bus transaction: optional write phase, optional read phase.
///
/// With both phases the bridge issues a repeated START between them. With
/// neither, the transaction is an address-only probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I2cTransaction {
    pub address: I2cAddress,
    pub write: Vec<u8>,
    pub read_len: usize,
}

impl I2cTransaction {
    pub fn write(address: I2cAddress, data: &[u8]) -> Self {
        Self {
            address,
            write: data.to_vec(),
            read_len: 0,
        }
    }

    pub fn read(address: I2cAddress, len: usize) -> Self {
        Self {
            address,
            write: Vec::new(),
            read_len: len,
        }
    }

    pub fn write_read(address: I2cAddress, data: &[u8], len: usize) -> Self {
        Self {
            address,
            write: data.to_vec(),
            read_len: len,
        }
    }

    /// Address-only write, used for ACK polling and presence checks.
    pub fn probe(address: I2cAddress) -> Self {
        Self::write(address, &[])
    }

    /// True when the transaction starts in read direction.
    pub fn is_read(&self) -> bool {
        self.write.is_empty() && self.read_len > 0
    }

    /// Buffer handed to `CH341StreamI2C`: address byte followed by the write phase.
    pub fn stream_buffer(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.write.len() + 1);
        buf.push(self.address.wire_byte(self.is_read()));
        buf.extend_from_slice(&self.write);
        buf
    }

    /// Renders the in-band command packet the bridge firmware executes.
    ///
    /// Payloads are split into `OUT|n` / `IN|n` chunks of at most 31 bytes. The
    /// final read byte is clocked with a bare `IN`, which answers NACK.
    pub fn command_stream(&self) -> Vec<u8> {
        let mut cmd = vec![stream::CMD_I2C_STREAM, stream::STA];
        let first = self.stream_buffer();
        for chunk in first.chunks(stream::MAX_CHUNK) {
            cmd.push(stream::OUT | chunk.len() as u8);
            cmd.extend_from_slice(chunk);
        }
        if self.read_len > 0 {
            if !self.write.is_empty() {
                cmd.push(stream::STA);
                cmd.push(stream::OUT | 1);
                cmd.push(self.address.wire_byte(true));
            }
            let mut acked = self.read_len - 1;
            while acked > 0 {
                let n = acked.min(stream::MAX_CHUNK);
                cmd.push(stream::IN | n as u8);
                acked -= n;
            }
            cmd.push(stream::IN);
        }
        cmd.push(stream::STO);
        cmd.push(stream::END);
        cmd
    }
}

impl Ch341 {
    // --- I2C Methods ---

    /// Selects the SCL rate.
    pub fn set_i2c_speed(&mut self, speed: I2cSpeed) -> Result<()> {
        self.ensure_open()?;
        debug!("Setting I2C speed {} kHz", speed.khz());
        if self.driver.set_stream(self.index, speed.stream_mode()) {
            self.speed = speed;
            Ok(())
        } else {
            Err(Error::BridgeCommandFailed {
                operation: "set_stream",
            })
        }
    }

    /// Currently selected SCL rate.
    pub fn i2c_speed(&self) -> I2cSpeed {
        self.speed
    }

    /// Executes one transaction and returns the bytes read (empty for writes).
    ///
    /// Either the whole exchange succeeds or an error is returned; there is
    /// no partial count.
    pub fn i2c_transact(&mut self, txn: &I2cTransaction) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let wbuf = txn.stream_buffer();
        let mut rbuf = vec![0u8; txn.read_len];
        trace!(
            "I2C {} stream {:02X?} (read {}), command {:02X?}",
            txn.address,
            &wbuf[..],
            txn.read_len,
            txn.command_stream()
        );
        if self.driver.stream_i2c(self.index, &wbuf, &mut rbuf) {
            if !rbuf.is_empty() {
                trace!("I2C {} read {:02X?}", txn.address, &rbuf[..]);
            }
            Ok(rbuf)
        } else {
            // Where the device pointer ended up is unknown now.
            self.register_pointers.remove(&txn.address.value());
            Err(Error::I2cTransferFailed {
                address: txn.address,
                write_len: txn.write.len(),
                read_len: txn.read_len,
            })
        }
    }

    /// Plain write: START, address+W, `data`, STOP.
    pub fn i2c_write(&mut self, slave_addr: u8, data: &[u8]) -> Result<()> {
        let addr = I2cAddress::new(slave_addr)?;
        self.i2c_transact(&I2cTransaction::write(addr, data))?;
        Ok(())
    }

    /// Plain read of `len` bytes from the device's current pointer.
    pub fn i2c_read(&mut self, slave_addr: u8, len: usize) -> Result<Vec<u8>> {
        let addr = I2cAddress::new(slave_addr)?;
        self.i2c_transact(&I2cTransaction::read(addr, len))
    }

    /// Write followed by a repeated-START read.
    pub fn i2c_write_read(&mut self, slave_addr: u8, data: &[u8], len: usize) -> Result<Vec<u8>> {
        let addr = I2cAddress::new(slave_addr)?;
        self.i2c_transact(&I2cTransaction::write_read(addr, data, len))
    }

    /// Address-only write. `Ok(false)` when nothing acknowledges.
    pub fn i2c_probe(&mut self, slave_addr: u8) -> Result<bool> {
        let addr = I2cAddress::new(slave_addr)?;
        self.ensure_open()?;
        Ok(self.i2c_transact(&I2cTransaction::probe(addr)).is_ok())
    }

    /// Writes `reg` followed by `data`, leaving the device pointer at `reg`.
    pub fn write_register(&mut self, slave_addr: u8, reg: u8, data: &[u8]) -> Result<()> {
        let addr = I2cAddress::new(slave_addr)?;
        let mut buf = Vec::with_capacity(data.len() + 1);
        buf.push(reg);
        buf.extend_from_slice(data);
        self.i2c_transact(&I2cTransaction::write(addr, &buf))?;
        self.register_pointers.insert(slave_addr, reg);
        Ok(())
    }

    /// Reads `len` bytes starting at `reg`.
    ///
    /// With `fast` set and the cached pointer for this device already at
    /// `reg`, the pointer write is skipped and only the read phase runs.
    pub fn read_register(
        &mut self,
        slave_addr: u8,
        reg: u8,
        len: usize,
        fast: bool,
    ) -> Result<Vec<u8>> {
        let addr = I2cAddress::new(slave_addr)?;
        if !(fast && self.register_pointers.get(&slave_addr) == Some(&reg)) {
            self.write_register(slave_addr, reg, &[])?;
        } else {
            trace!("I2C {} fast read of register 0x{:02X}", addr, reg);
        }
        self.i2c_transact(&I2cTransaction::read(addr, len))
    }

    /// Native single-byte register read (`CH341ReadI2C`).
    pub fn read_register_byte(&mut self, slave_addr: u8, reg: u8) -> Result<u8> {
        let addr = I2cAddress::new(slave_addr)?;
        self.ensure_open()?;
        self.register_pointers.remove(&slave_addr);
        self.driver
            .read_i2c(self.index, slave_addr, reg)
            .ok_or(Error::I2cTransferFailed {
                address: addr,
                write_len: 1,
                read_len: 1,
            })
    }

    /// Native single-byte register write (`CH341WriteI2C`).
    pub fn write_register_byte(&mut self, slave_addr: u8, reg: u8, value: u8) -> Result<()> {
        let addr = I2cAddress::new(slave_addr)?;
        self.ensure_open()?;
        self.register_pointers.remove(&slave_addr);
        trace!("I2C {} write byte [0x{:02X}] = 0x{:02X}", addr, reg, value);
        if self.driver.write_i2c(self.index, slave_addr, reg, value) {
            Ok(())
        } else {
            Err(Error::I2cTransferFailed {
                address: addr,
                write_len: 2,
                read_len: 0,
            })
        }
    }

    /// Scans the standard range (0x03 to 0x77) with read probes.
    pub fn i2c_scan(&mut self) -> Result<Vec<u8>> {
        self.i2c_scan_with_progress(
            consts::i2c::SCAN_FIRST_ADDR,
            consts::i2c::SCAN_LAST_ADDR,
            |_, _, _, _| {},
        )
    }

    /// Read-probe scan over `start_addr..=end_addr`.
    ///
    /// A candidate counts when a one-byte read returns something other than
    /// `0xFF` and a second read confirms it still answers. Per-address errors
    /// are ignored. Calls `progress_callback(addr, found, idx, total)` for each
    /// address tested.
    pub fn i2c_scan_with_progress<F>(
        &mut self,
        start_addr: u8,
        end_addr: u8,
        mut progress_callback: F,
    ) -> Result<Vec<u8>>
    where
        F: FnMut(u8, bool, usize, usize),
    {
        self.ensure_open()?;
        if start_addr > end_addr || end_addr > 0x7F {
            return Err(Error::ArgumentOutOfRange(format!(
                "Invalid scan range 0x{:02X}-0x{:02X}",
                start_addr, end_addr
            )));
        }
        let mut found_devices = Vec::new();
        let total_addresses = (end_addr - start_addr) as usize + 1;

        for (idx, addr_7bit) in (start_addr..=end_addr).enumerate() {
            let address = I2cAddress::new(addr_7bit)?;
            let probe = I2cTransaction::read(address, 1);
            let found = match self.i2c_transact(&probe) {
                Ok(resp) if resp.first().is_some_and(|b| *b != 0xFF) => {
                    self.i2c_transact(&probe).is_ok()
                }
                Ok(_) => false,
                Err(e) => {
                    trace!("Scan of {}: {}", address, e);
                    false
                }
            };
            if found {
                debug!("Found I2C device at {}", address);
                found_devices.push(addr_7bit);
            }
            progress_callback(addr_7bit, found, idx, total_addresses);
            thread::sleep(SCAN_INTERVAL);
        }

        debug!("I2C scan found {} device(s)", found_devices.len());
        Ok(found_devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(a: u8) -> I2cAddress {
        I2cAddress::new(a).unwrap()
    }

    #[test]
    fn test_address_validation() {
        assert!(I2cAddress::new(0x7F).is_ok());
        assert!(matches!(
            I2cAddress::new(0x80),
            Err(Error::ArgumentOutOfRange(_))
        ));
        assert_eq!(addr(0x50).to_string(), "0x50");
        assert_eq!(addr(0x50).wire_byte(false), 0xA0);
        assert_eq!(addr(0x50).wire_byte(true), 0xA1);
    }

    #[test]
    fn test_stream_buffer_direction_bit() {
        assert_eq!(
            I2cTransaction::write(addr(0x40), &[0x05, 0x00, 0x14]).stream_buffer(),
            vec![0x80, 0x05, 0x00, 0x14]
        );
        assert_eq!(I2cTransaction::read(addr(0x40), 2).stream_buffer(), vec![0x81]);
        assert_eq!(
            I2cTransaction::write_read(addr(0x40), &[0x02], 2).stream_buffer(),
            vec![0x80, 0x02]
        );
        assert_eq!(I2cTransaction::probe(addr(0x50)).stream_buffer(), vec![0xA0]);
    }

    #[test]
    fn test_command_stream_write() {
        let cmd = I2cTransaction::write(addr(0x50), &[0x00, 0x41]).command_stream();
        assert_eq!(cmd, vec![0xAA, 0x74, 0x83, 0xA0, 0x00, 0x41, 0x75, 0x00]);
    }

    #[test]
    fn test_command_stream_write_read() {
        let cmd = I2cTransaction::write_read(addr(0x40), &[0xFE], 2).command_stream();
        assert_eq!(
            cmd,
            vec![0xAA, 0x74, 0x82, 0x80, 0xFE, 0x74, 0x81, 0x81, 0xC1, 0xC0, 0x75, 0x00]
        );
    }

    #[test]
    fn test_command_stream_splits_long_payloads() {
        let data = vec![0x5A; 40];
        let cmd = I2cTransaction::write(addr(0x50), &data).command_stream();
        // 41 bytes on the wire: one full chunk of 31 and one of 10.
        assert_eq!(cmd[2], 0x80 | 31);
        assert_eq!(cmd[3], 0xA0);
        assert_eq!(cmd[34], 0x80 | 10);
        assert_eq!(cmd.len(), 2 + 1 + 31 + 1 + 10 + 2);

        let cmd = I2cTransaction::read(addr(0x50), 40).command_stream();
        assert_eq!(&cmd[..4], &[0xAA, 0x74, 0x81, 0xA1]);
        assert_eq!(&cmd[4..], &[0xC0 | 31, 0xC0 | 8, 0xC0, 0x75, 0x00]);
    }

    #[test]
    fn test_speed_mapping() {
        assert_eq!(I2cSpeed::default(), I2cSpeed::Standard);
        assert_eq!(I2cSpeed::Standard.stream_mode(), 0x01);
        assert_eq!(I2cSpeed::from_khz(400).unwrap(), I2cSpeed::Fast);
        assert!(I2cSpeed::from_khz(1000).is_err());
    }
}
