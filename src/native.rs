//! Boundary to the vendor CH341 driver library.
//!
//! [`NativeDriver`] mirrors the fixed set of entry points exported by the
//! WCH driver (`CH341DLL.DLL` / `CH341DLLA64.DLL`, or a compatible shared
//! object elsewhere). Results keep the library's conventions: booleans for
//! success and `Option` in place of pointer out-parameters. [`crate::Ch341`]
//! turns these into [`crate::Error`] values.

use crate::consts;
use crate::error::{Error, Result};
use libloading::Library;
use log::{debug, trace};
use std::ffi::{c_char, c_void, CStr};

/// Entry points of the CH341 vendor library, one method per exported function.
///
/// `index` is the device index the library uses to address an opened bridge.
pub trait NativeDriver {
    /// `CH341OpenDevice`: returns `true` when a valid handle was returned.
    fn open_device(&mut self, index: u32) -> bool;
    /// `CH341CloseDevice`.
    fn close_device(&mut self, index: u32);
    /// `CH341ResetDevice`.
    fn reset_device(&mut self, index: u32) -> bool;
    /// `CH341GetVersion`: version of the driver library itself.
    fn get_version(&mut self) -> u32;
    /// `CH341GetVerIC`: chip version, `0` when unknown.
    fn get_ic_version(&mut self, index: u32) -> u32;
    /// `CH341GetDeviceName`.
    fn get_device_name(&mut self, index: u32) -> Option<String>;
    /// `CH341FlushBuffer`.
    fn flush_buffer(&mut self, index: u32) -> bool;
    /// `CH341ReadI2C`: single register byte read.
    fn read_i2c(&mut self, index: u32, device: u8, register: u8) -> Option<u8>;
    /// `CH341WriteI2C`: single register byte write.
    fn write_i2c(&mut self, index: u32, device: u8, register: u8, value: u8) -> bool;
    /// `CH341SetStream`: I2C speed and stream mode.
    fn set_stream(&mut self, index: u32, mode: u32) -> bool;
    /// `CH341StreamI2C`: writes `write` (address byte first) then fills `read`.
    fn stream_i2c(&mut self, index: u32, write: &[u8], read: &mut [u8]) -> bool;
    /// `CH341SetOutput`: masked write of the direction and data registers.
    fn set_output(&mut self, index: u32, enable: u32, direction: u32, data: u32) -> bool;
    /// `CH341GetInput`: current pin levels.
    fn get_input(&mut self, index: u32) -> Option<u32>;
    /// `CH341GetStatus`: pin levels plus parallel-port status lines.
    fn get_status(&mut self, index: u32) -> Option<u32>;
}

/// Name of the vendor library for the host platform.
pub fn default_library_name() -> &'static str {
    if cfg!(all(windows, target_pointer_width = "64")) {
        "CH341DLLA64.DLL"
    } else if cfg!(windows) {
        "CH341DLL.DLL"
    } else if cfg!(target_os = "macos") {
        "libch341.dylib"
    } else {
        "libch341.so"
    }
}

type FnOpenDevice = unsafe extern "system" fn(u32) -> isize;
type FnCloseDevice = unsafe extern "system" fn(u32);
type FnGetVersion = unsafe extern "system" fn() -> u32;
type FnIndexBool = unsafe extern "system" fn(u32) -> i32;
type FnIndexU32 = unsafe extern "system" fn(u32) -> u32;
type FnGetDeviceName = unsafe extern "system" fn(u32) -> *const c_char;
type FnReadI2c = unsafe extern "system" fn(u32, u8, u8, *mut u8) -> i32;
type FnWriteI2c = unsafe extern "system" fn(u32, u8, u8, u8) -> i32;
type FnSetStream = unsafe extern "system" fn(u32, u32) -> i32;
type FnStreamI2c = unsafe extern "system" fn(u32, u32, *const c_void, u32, *mut c_void) -> i32;
type FnSetOutput = unsafe extern "system" fn(u32, u32, u32, u32) -> i32;
type FnGetWord = unsafe extern "system" fn(u32, *mut u32) -> i32;

#[derive(Clone, Copy)]
struct EntryPoints {
    open_device: FnOpenDevice,
    close_device: FnCloseDevice,
    get_version: FnGetVersion,
    reset_device: FnIndexBool,
    get_ver_ic: FnIndexU32,
    get_device_name: FnGetDeviceName,
    flush_buffer: FnIndexBool,
    read_i2c: FnReadI2c,
    write_i2c: FnWriteI2c,
    set_stream: FnSetStream,
    stream_i2c: FnStreamI2c,
    set_output: FnSetOutput,
    get_input: FnGetWord,
    get_status: FnGetWord,
}

/// [`NativeDriver`] backed by the dynamically loaded vendor library.
pub struct Ch341Library {
    api: EntryPoints,
    path: String,
    // Keeps the entry points above valid; must outlive `api`.
    _library: Library,
}

impl std::fmt::Debug for Ch341Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ch341Library").field("path", &self.path).finish()
    }
}

fn symbol<T: Copy>(library: &Library, name: &'static str) -> Result<T> {
    // SAFETY: the type aliases above match the prototypes in CH341DLL.H.
    unsafe { library.get::<T>(name.as_bytes()) }
        .map(|s| *s)
        .map_err(|_| Error::MissingSymbol(name))
}

impl Ch341Library {
    /// Loads the library with the platform default name.
    pub fn load_default() -> Result<Self> {
        Self::load(default_library_name())
    }

    /// Loads the library from `path` and resolves every entry point.
    pub fn load(path: &str) -> Result<Self> {
        // SAFETY: loading runs the library's initializers; the vendor driver
        // has no requirements beyond being loaded once per process.
        let library = unsafe { Library::new(path) }.map_err(|e| Error::LibraryUnavailable {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        let api = EntryPoints {
            open_device: symbol(&library, "CH341OpenDevice")?,
            close_device: symbol(&library, "CH341CloseDevice")?,
            get_version: symbol(&library, "CH341GetVersion")?,
            reset_device: symbol(&library, "CH341ResetDevice")?,
            get_ver_ic: symbol(&library, "CH341GetVerIC")?,
            get_device_name: symbol(&library, "CH341GetDeviceName")?,
            flush_buffer: symbol(&library, "CH341FlushBuffer")?,
            read_i2c: symbol(&library, "CH341ReadI2C")?,
            write_i2c: symbol(&library, "CH341WriteI2C")?,
            set_stream: symbol(&library, "CH341SetStream")?,
            stream_i2c: symbol(&library, "CH341StreamI2C")?,
            set_output: symbol(&library, "CH341SetOutput")?,
            get_input: symbol(&library, "CH341GetInput")?,
            get_status: symbol(&library, "CH341GetStatus")?,
        };
        debug!("Loaded CH341 driver library '{}'", path);
        Ok(Self {
            api,
            path: path.to_string(),
            _library: library,
        })
    }

    /// Path the library was loaded from.
    pub fn path(&self) -> &str {
        &self.path
    }
}

// SAFETY (all methods below): arguments are plain integers or pointers to
// buffers that live for the duration of the call, sized as the library
// expects from the accompanying length arguments.
impl NativeDriver for Ch341Library {
    fn open_device(&mut self, index: u32) -> bool {
        let handle = unsafe { (self.api.open_device)(index) };
        trace!("CH341OpenDevice({}) = {:#X}", index, handle);
        handle != consts::INVALID_HANDLE_VALUE
    }

    fn close_device(&mut self, index: u32) {
        unsafe { (self.api.close_device)(index) }
    }

    fn reset_device(&mut self, index: u32) -> bool {
        unsafe { (self.api.reset_device)(index) != 0 }
    }

    fn get_version(&mut self) -> u32 {
        unsafe { (self.api.get_version)() }
    }

    fn get_ic_version(&mut self, index: u32) -> u32 {
        unsafe { (self.api.get_ver_ic)(index) }
    }

    fn get_device_name(&mut self, index: u32) -> Option<String> {
        let ptr = unsafe { (self.api.get_device_name)(index) };
        if ptr.is_null() {
            return None;
        }
        // Names are ANSI (GBK on Chinese locales); keep what decodes.
        let name = unsafe { CStr::from_ptr(ptr) };
        Some(String::from_utf8_lossy(name.to_bytes()).into_owned())
    }

    fn flush_buffer(&mut self, index: u32) -> bool {
        unsafe { (self.api.flush_buffer)(index) != 0 }
    }

    fn read_i2c(&mut self, index: u32, device: u8, register: u8) -> Option<u8> {
        let mut value = 0u8;
        let ok = unsafe { (self.api.read_i2c)(index, device, register, &mut value) != 0 };
        ok.then_some(value)
    }

    fn write_i2c(&mut self, index: u32, device: u8, register: u8, value: u8) -> bool {
        unsafe { (self.api.write_i2c)(index, device, register, value) != 0 }
    }

    fn set_stream(&mut self, index: u32, mode: u32) -> bool {
        unsafe { (self.api.set_stream)(index, mode) != 0 }
    }

    fn stream_i2c(&mut self, index: u32, write: &[u8], read: &mut [u8]) -> bool {
        let read_ptr = if read.is_empty() {
            std::ptr::null_mut()
        } else {
            read.as_mut_ptr() as *mut c_void
        };
        unsafe {
            (self.api.stream_i2c)(
                index,
                write.len() as u32,
                write.as_ptr() as *const c_void,
                read.len() as u32,
                read_ptr,
            ) != 0
        }
    }

    fn set_output(&mut self, index: u32, enable: u32, direction: u32, data: u32) -> bool {
        unsafe { (self.api.set_output)(index, enable, direction, data) != 0 }
    }

    fn get_input(&mut self, index: u32) -> Option<u32> {
        let mut value = 0u32;
        let ok = unsafe { (self.api.get_input)(index, &mut value) != 0 };
        ok.then_some(value)
    }

    fn get_status(&mut self, index: u32) -> Option<u32> {
        let mut value = 0u32;
        let ok = unsafe { (self.api.get_status)(index, &mut value) != 0 };
        ok.then_some(value)
    }
}
