//! 24Cxx driver against simulated parts.

use ch341_powerbench::eeprom::scan_eeproms;
use ch341_powerbench::sim::SimBridge;
use ch341_powerbench::{Ch341, Eeprom, EepromGeometry, Error, ErrorKind, Result};
use std::time::Duration;

fn setup(type_name: &str) -> (SimBridge, Ch341, Eeprom) {
    let sim = SimBridge::new();
    sim.add_eeprom(0x50, EepromGeometry::lookup(type_name).unwrap());
    let mut bridge = Ch341::open_with(sim.clone(), 0).unwrap();
    bridge.set_settle_delay(Duration::ZERO);
    let eeprom = Eeprom::new(0x50, type_name).unwrap();
    (sim, bridge, eeprom)
}

#[test]
fn test_round_trip_on_every_geometry() -> Result<()> {
    for geometry in EepromGeometry::all() {
        let (sim, mut bridge, eeprom) = setup(geometry.name);
        // Straddles a page boundary on every part.
        let start = geometry.page_size - 3;
        let data: Vec<u8> = (0..geometry.page_size as u8 + 5).collect();
        eeprom.write_bytes(&mut bridge, start, &data)?;
        assert_eq!(eeprom.read_bytes(&mut bridge, start, data.len())?, data, "{}", geometry.name);

        let memory = sim.eeprom_memory(0x50).unwrap();
        assert_eq!(&memory[start..start + data.len()], &data[..]);
        assert_eq!(memory[start - 1], 0xFF);
        assert_eq!(memory[start + data.len()], 0xFF);
    }
    Ok(())
}

#[test]
fn test_page_writes_are_split() -> Result<()> {
    let (sim, mut bridge, eeprom) = setup("24C32");
    // 30..=33 crosses the 32-byte page boundary: two write cycles.
    eeprom.write_bytes(&mut bridge, 30, &[1, 2, 3, 4])?;
    assert_eq!(sim.eeprom_write_cycles(0x50), Some(2));
    assert_eq!(eeprom.read_bytes(&mut bridge, 30, 4)?, vec![1, 2, 3, 4]);
    Ok(())
}

#[test]
fn test_small_parts_write_byte_by_byte() -> Result<()> {
    let (sim, mut bridge, eeprom) = setup("24C02");
    eeprom.write_bytes(&mut bridge, 6, &[1, 2, 3, 4])?;
    assert_eq!(sim.eeprom_write_cycles(0x50), Some(4));
    assert_eq!(eeprom.read_bytes(&mut bridge, 6, 4)?, vec![1, 2, 3, 4]);
    Ok(())
}

#[test]
fn test_block_select_addressing() -> Result<()> {
    let (sim, mut bridge, eeprom) = setup("24C08");
    eeprom.write_byte(&mut bridge, 0x2FF, 0xA5)?;
    eeprom.write_byte(&mut bridge, 0x300, 0x5A)?;
    assert_eq!(sim.eeprom_memory(0x50).unwrap()[0x2FF], 0xA5);

    sim.clear_log();
    assert_eq!(eeprom.read_bytes(&mut bridge, 0x2FE, 3)?, vec![0xFF, 0xA5, 0x5A]);
    // The read crosses into the next block and needs a second device address.
    let addresses: Vec<u8> = sim.transfers().iter().map(|t| t.address).collect();
    assert_eq!(addresses, vec![0x52, 0x53]);
    Ok(())
}

#[test]
fn test_out_of_range_does_no_io() {
    let (sim, mut bridge, eeprom) = setup("24C02");
    sim.clear_log();
    assert!(matches!(
        eeprom.read_bytes(&mut bridge, 250, 10),
        Err(Error::AddressOutOfRange { address: 250, length: 10, size: 256 })
    ));
    assert!(matches!(
        eeprom.write_bytes(&mut bridge, 256, &[0]),
        Err(Error::AddressOutOfRange { .. })
    ));
    assert!(matches!(
        eeprom.read_byte(&mut bridge, 256),
        Err(Error::AddressOutOfRange { .. })
    ));
    assert_eq!(sim.io_count(), 0);
    assert_eq!(
        eeprom.read_byte(&mut bridge, 300).unwrap_err().kind(),
        ErrorKind::Range
    );
}

#[test]
fn test_huge_lengths_are_out_of_range() {
    let (sim, mut bridge, eeprom) = setup("24C02");
    sim.clear_log();
    assert!(matches!(
        eeprom.read_bytes(&mut bridge, 1, usize::MAX),
        Err(Error::AddressOutOfRange { address: 1, length: usize::MAX, size: 256 })
    ));
    assert!(matches!(
        eeprom.dump_hex(&mut bridge, 0x10, Some(usize::MAX)),
        Err(Error::AddressOutOfRange { .. })
    ));
    assert!(matches!(
        eeprom.write_bytes(&mut bridge, usize::MAX, &[0xA5]),
        Err(Error::AddressOutOfRange { .. })
    ));
    assert_eq!(sim.io_count(), 0);
}

#[test]
fn test_busy_part_is_polled() -> Result<()> {
    let (sim, mut bridge, eeprom) = setup("24C64");
    sim.set_eeprom_busy_polls(0x50, 5);
    eeprom.write_bytes(&mut bridge, 0x100, b"busy")?;
    assert_eq!(eeprom.read_bytes(&mut bridge, 0x100, 4)?, b"busy".to_vec());
    Ok(())
}

#[test]
fn test_write_cycle_timeout() {
    let (sim, mut bridge, mut eeprom) = setup("24C64");
    eeprom.set_write_timeout(Duration::from_millis(10));
    sim.set_eeprom_busy_polls(0x50, u32::MAX);
    let err = eeprom.write_bytes(&mut bridge, 0, &[1]).unwrap_err();
    assert!(matches!(err, Error::ProtocolTimeout { .. }));
    assert_eq!(err.kind(), ErrorKind::ProtocolTimeout);
}

#[test]
fn test_string_across_page_boundary() -> Result<()> {
    let (sim, mut bridge, eeprom) = setup("24C32");
    eeprom.write_string(&mut bridge, 28, "PowerBench-7")?;
    let memory = sim.eeprom_memory(0x50).unwrap();
    assert_eq!(&memory[28..41], b"PowerBench-7\0");
    assert_eq!(eeprom.read_string(&mut bridge, 28, 32)?, "PowerBench-7");
    Ok(())
}

#[test]
fn test_blank_memory_reads_empty() -> Result<()> {
    let (sim, mut bridge, eeprom) = setup("24C02");
    assert_eq!(eeprom.read_string(&mut bridge, 0, 32)?, "");
    sim.load_eeprom(0x50, 0, &[0u8; 32])?;
    assert_eq!(eeprom.read_board_id(&mut bridge, 0)?, "");
    Ok(())
}

#[test]
fn test_write_protect_fails_verification() {
    let (sim, mut bridge, eeprom) = setup("24C02");
    sim.set_eeprom_write_protect(0x50, true);
    match eeprom.write_string(&mut bridge, 0, "ID") {
        Err(Error::VerifyMismatch { address, expected, actual }) => {
            assert_eq!(address, 0);
            assert_eq!(expected, b"ID\0".to_vec());
            assert_eq!(actual, vec![0xFF; 3]);
        }
        other => panic!("expected VerifyMismatch, got {other:?}"),
    }
}

#[test]
fn test_board_id() -> Result<()> {
    let (sim, mut bridge, eeprom) = setup("24C02");
    eeprom.write_board_id(&mut bridge, 0x10, "BRD-0042")?;
    assert_eq!(eeprom.read_board_id(&mut bridge, 0x10)?, "BRD-0042");

    // 31 characters plus the terminator fill the 32-byte field exactly.
    let longest = "Y".repeat(31);
    eeprom.write_board_id(&mut bridge, 0x40, &longest)?;
    assert_eq!(eeprom.read_board_id(&mut bridge, 0x40)?, longest);

    sim.clear_log();
    for too_long in ["X".repeat(32), "X".repeat(33)] {
        assert!(matches!(
            eeprom.write_board_id(&mut bridge, 0, &too_long),
            Err(Error::ArgumentOutOfRange(_))
        ));
    }
    assert_eq!(sim.io_count(), 0);
    // Near the end of the part the read shrinks to what is left.
    assert_eq!(eeprom.read_board_id(&mut bridge, 250)?, "");
    Ok(())
}

#[test]
fn test_dump_hex() -> Result<()> {
    let (sim, mut bridge, eeprom) = setup("24C02");
    sim.load_eeprom(0x50, 0x10, b"Hello\x00\x01")?;
    let dump = eeprom.dump_hex(&mut bridge, 0x10, Some(20))?;
    let lines: Vec<&str> = dump.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("0010: 48 65 6C 6C 6F 00 01 FF"));
    assert!(lines[0].ends_with("|Hello...........|"));
    assert!(lines[1].starts_with("0020: FF FF FF FF "));

    let full = eeprom.dump_hex(&mut bridge, 0, None)?;
    assert_eq!(full.lines().count(), 16);
    Ok(())
}

#[test]
fn test_device_test_and_scan() -> Result<()> {
    let (sim, mut bridge, eeprom) = setup("24C02");
    assert!(eeprom.test_device(&mut bridge));
    let absent = Eeprom::new(0x57, "24C02")?;
    assert!(!absent.test_device(&mut bridge));

    // Reads start wherever the pointer was left; make every byte non-blank.
    sim.load_eeprom(0x50, 0, &[0x00; 256])?;
    assert_eq!(scan_eeproms(&mut bridge)?, vec![0x50]);
    Ok(())
}
