//! Internal constants, register addresses, and bit definitions.

// --- CH341 bridge ---

/// IC version reported by the first-generation CH341.
pub const IC_VER_CH341: u32 = 0x10;
/// IC version reported by the CH341T.
pub const IC_VER_CH341T: u32 = 0x18;
/// IC version reported by the CH341A.
pub const IC_VER_CH341A: u32 = 0x20;
/// IC version reported by the CH341B (exposes the extra D0-D7 GPIOs).
pub const IC_VER_CH341B: u32 = 0x32;

/// Native handle value returned by a failed open.
pub const INVALID_HANDLE_VALUE: isize = -1;

// --- I2C Related Constants ---
pub mod i2c {
    // Stream mode values for CH341SetStream (bits 1..0 select the SCL rate)
    pub const SPEED_LOW: u32 = 0x00; // 20 kHz
    pub const SPEED_STANDARD: u32 = 0x01; // 100 kHz
    pub const SPEED_FAST: u32 = 0x02; // 400 kHz
    pub const SPEED_HIGH: u32 = 0x03; // 750 kHz

    // Bus scan window, reserved addresses excluded
    pub const SCAN_FIRST_ADDR: u8 = 0x03;
    pub const SCAN_LAST_ADDR: u8 = 0x77;

    // In-band command stream understood by the bridge firmware.
    pub mod stream {
        /// Packet header: I2C stream command.
        pub const CMD_I2C_STREAM: u8 = 0xAA;
        /// Generate START (or repeated START).
        pub const STA: u8 = 0x74;
        /// Generate STOP.
        pub const STO: u8 = 0x75;
        /// Clock out the following `n` bytes (`OUT | n`), checking ACK.
        pub const OUT: u8 = 0x80;
        /// Clock in `n` bytes (`IN | n`), ACK-ing all but the last.
        pub const IN: u8 = 0xC0;
        /// Terminates a command packet.
        pub const END: u8 = 0x00;
        /// Largest payload a single OUT/IN sub-command can carry.
        pub const MAX_CHUNK: usize = 0x1F;
    }
}

// --- GPIO Related Constants ---
pub mod gpio {
    /// Direction mask loaded at open (1 = output).
    pub const DEFAULT_DIRECTION_MASK: u32 = 0x000F_C000;

    /// Highest bit whose direction can be changed.
    pub const MAX_DIRECTION_BIT: u8 = 15;
    /// Highest bit addressable through set_output.
    pub const MAX_DATA_BIT: u8 = 23;

    // Enable mask bits for CH341SetOutput
    pub mod enable {
        /// Data bits 8-15 valid.
        pub const DATA_8_15: u32 = 1 << 0;
        /// Direction bits 8-15 valid.
        pub const DIR_8_15: u32 = 1 << 1;
        /// Data bits 0-7 valid.
        pub const DATA_0_7: u32 = 1 << 2;
        /// Direction bits 0-7 valid.
        pub const DIR_0_7: u32 = 1 << 3;
        /// Data bits 16-23 valid (no direction control).
        pub const DATA_16_23: u32 = 1 << 4;
    }

    // Status word bits returned by CH341GetStatus
    pub mod status {
        pub const DATA_LINES: u32 = 0x0000_00FF;
        pub const ERR: u32 = 0x0000_0100;
        pub const PEMP: u32 = 0x0000_0200;
        pub const INT: u32 = 0x0000_0400;
        pub const SLCT: u32 = 0x0000_0800;
        pub const WAIT: u32 = 0x0000_2000;
        pub const DATAS: u32 = 0x0000_4000;
        pub const ADDRS: u32 = 0x0000_8000;
        pub const RESET: u32 = 0x0001_0000;
        pub const WRITE: u32 = 0x0002_0000;
        pub const SCL: u32 = 0x0040_0000;
        pub const SDA: u32 = 0x0080_0000;
    }
}

// --- INA226 power monitor ---
pub mod ina226 {
    pub const DEFAULT_ADDRESS: u8 = 0x40;
    /// Highest address selectable with A0/A1.
    pub const LAST_ADDRESS: u8 = 0x4F;

    // Register Addresses
    pub const REG_CONFIGURATION: u8 = 0x00;
    pub const REG_SHUNT_VOLTAGE: u8 = 0x01;
    pub const REG_BUS_VOLTAGE: u8 = 0x02;
    pub const REG_POWER: u8 = 0x03;
    pub const REG_CURRENT: u8 = 0x04;
    pub const REG_CALIBRATION: u8 = 0x05;
    pub const REG_MASK_ENABLE: u8 = 0x06;
    pub const REG_ALERT_LIMIT: u8 = 0x07;
    pub const REG_MANUFACTURER_ID: u8 = 0xFE;
    pub const REG_DIE_ID: u8 = 0xFF;

    pub const MANUFACTURER_ID: u16 = 0x5449; // "TI"
    pub const DIE_ID: u16 = 0x2260;

    // Configuration register fields
    pub mod config {
        pub const RESET: u16 = 0x8000;
        /// Bit 14 always reads back as 1.
        pub const FIXED_BIT: u16 = 0x4000;
        pub const AVG_16: u16 = 0x0400;
        pub const VBUSCT_1100US: u16 = 0x0100;
        pub const VSHCT_1100US: u16 = 0x0020;
        pub const MODE_SHUNT_BUS_CONT: u16 = 0x0007;
        /// Power-on value of the configuration register.
        pub const POWER_ON_DEFAULT: u16 = 0x4127;
    }

    // Mask/Enable register bits
    pub mod mask_enable {
        /// Shunt voltage over-limit alert function.
        pub const SOL: u16 = 0x8000;
    }

    // ADC scaling fixed by the part
    pub const SHUNT_LSB_V: f64 = 2.5e-6;
    pub const BUS_LSB_V: f64 = 1.25e-3;
    pub const CAL_SCALE: f64 = 0.00512;
    pub const POWER_LSB_RATIO: f64 = 25.0;
    pub const CURRENT_LSB_DIVISOR: f64 = 32768.0;
    /// Bit 15 of the calibration register is reserved.
    pub const MAX_CALIBRATION: u16 = 0x7FFF;
}

// --- 24Cxx EEPROM ---
pub mod eeprom {
    pub const DEFAULT_ADDRESS: u8 = 0x50;
    pub const FIRST_ADDR: u8 = 0x50;
    pub const LAST_ADDR: u8 = 0x57;
    /// Bytes addressed by one device address on single-address-byte parts.
    pub const BLOCK_SIZE: usize = 256;
    /// Size of the board ID field, NUL terminator included.
    pub const BOARD_ID_MAX_LEN: usize = 32;
}

// --- PCF8574 IO expander ---
pub mod pcf8574 {
    pub const DEFAULT_ADDRESS: u8 = 0x20;
    /// All quasi-bidirectional outputs high after power-on.
    pub const POWER_ON_OUTPUT: u8 = 0xFF;
}
