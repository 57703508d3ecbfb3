//! Powers a simulated device under test and reads the INA226 in fixed and
//! auto-range mode.
use ch341_powerbench::{
    ina226::scan_ina226, sim::SimBridge, BenchConfig, PowerRelay, Result,
};
use std::{thread, time::Duration};

const SENSE: u8 = 0x40;

fn main() -> Result<()> {
    env_logger::init();

    let config = BenchConfig::from_toml_str(
        r#"
        [bridge]
        gpio_settle_ms = 10
        [sense]
        shunt_ohms = 0.1
        alert_threshold = 0.05
        pmos_settle_ms = 20
        "#,
    )?;

    let sim = SimBridge::new();
    sim.add_ina226(SENSE);
    sim.set_bus_voltage(SENSE, 3.3);
    let mut bridge = config.open_bridge_with(sim.clone())?;
    println!("INA226 found at {:02X?}", scan_ina226(&mut bridge)?);

    let mut power = PowerRelay::new(&mut bridge, config.power_relay_controller(), 0)?;
    power.enable(&mut bridge)?;
    thread::sleep(Duration::from_millis(100));

    let mut sense = config.ina226()?;
    config.start_ina226(&mut bridge, &mut sense)?;
    println!("{}\n", sense.info(&mut bridge));

    println!("Fixed mode:");
    for shunt_mv in [1.0, 5.0, 20.0] {
        sim.set_shunt_voltage(SENSE, shunt_mv / 1e3);
        println!("  {}", sense.read_all(&mut bridge)?);
    }

    // A 10 Ω load on 3.3 V through the shunt with the FET on.
    sim.set_shunt_voltage(SENSE, 0.01);
    let pmos = sense.calibrate_pmos_resistance(&mut bridge, 10.0)?;
    println!("\nPMOS on-resistance: {:.4} Ω", pmos.on_resistance);

    if let Some(threshold) = config.sense.alert_threshold {
        sense.enable_auto_range(&mut bridge, threshold)?;
    }
    println!("Auto-range mode:");
    for shunt_mv in [1.0, 10.0, 40.0] {
        sim.set_shunt_voltage(SENSE, shunt_mv / 1e3);
        let m = sense.read_all(&mut bridge)?;
        println!(
            "  {} [FET {}]",
            m,
            if m.fet_conducting { "on" } else { "off" }
        );
    }

    power.disable(&mut bridge)?;
    Ok(())
}
