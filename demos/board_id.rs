//! Reads (and optionally writes) the board ID stored in the bench EEPROM.
//!
//! ```text
//! cargo run --example board_id                  # simulated bench
//! cargo run --example board_id -- BRD-0042      # write, then read back
//! cargo run --example board_id -- --hardware    # CH341 at index 0
//! ```
use ch341_powerbench::{sim::SimBridge, BenchConfig, Ch341, EepromGeometry, Result};
use std::env;

fn main() -> Result<()> {
    env_logger::init();
    let args: Vec<String> = env::args().skip(1).collect();
    let hardware = args.iter().any(|a| a == "--hardware");
    let new_id = args.iter().find(|a| !a.starts_with("--"));

    let config = BenchConfig::default();
    let mut bridge: Ch341 = if hardware {
        println!("Opening CH341 device {}...", config.bridge.device_index);
        config.open_bridge()?
    } else {
        println!("Using a simulated bench.");
        let sim = SimBridge::new();
        sim.add_eeprom(
            config.eeprom.address,
            EepromGeometry::lookup(&config.eeprom.eeprom_type)?,
        );
        sim.load_eeprom(config.eeprom.address, 0, b"SIM-BOARD-01\0")?;
        config.open_bridge_with(sim)?
    };
    println!("Bridge: {:?}", bridge.info());

    let eeprom = config.eeprom()?;
    println!("{}", eeprom.info());
    let offset = config.eeprom.board_id_offset;

    if let Some(id) = new_id {
        println!("Writing board ID '{}'...", id);
        eeprom.write_board_id(&mut bridge, offset, id)?;
    }

    match eeprom.read_board_id(&mut bridge, offset)?.as_str() {
        "" => println!("Board ID: <blank>"),
        id => println!("Board ID: {}", id),
    }
    println!("\n{}", eeprom.dump_hex(&mut bridge, offset, Some(32))?);
    Ok(())
}
