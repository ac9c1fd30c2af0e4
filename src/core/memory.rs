//! Memory - Emulator process memory operations
//!
//! Provides the `TargetMemory` contract the debugger engine talks to, and
//! `ProcessMemory`, its out-of-process implementation across platforms.

use thiserror::Error;

/// Memory operation errors
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Failed to read memory at {address:#x}: {reason}")]
    ReadFailed { address: u64, reason: String },

    #[error("Failed to write memory at {address:#x}: {reason}")]
    WriteFailed { address: u64, reason: String },

    #[error("Short access at {address:#x}: {done} of {wanted} bytes")]
    ShortRead {
        address: u64,
        wanted: usize,
        done: usize,
    },

    #[error("No process attached")]
    NoProcess,
}

/// A live connection to emulated RAM.
///
/// Addresses passed to `read`/`write` are host (emulator process) addresses,
/// i.e. `main_ram_base() + console offset`.
pub trait TargetMemory {
    /// Host address at which console RAM offset 0 is mapped
    fn main_ram_base(&self) -> u64;

    /// Whether the emulator process behind this connection still exists
    fn is_alive(&self) -> bool;

    /// Read exactly `len` bytes
    fn read(&self, address: u64, len: usize) -> Result<Vec<u8>, MemoryError>;

    /// Write all of `data`
    fn write(&self, address: u64, data: &[u8]) -> Result<(), MemoryError>;

    /// Read a little-endian 32-bit word
    fn read_u32(&self, address: u64) -> Result<u32, MemoryError> {
        let data = self.read(address, 4)?;
        let bytes: [u8; 4] = data.as_slice().try_into().map_err(|_| MemoryError::ShortRead {
            address,
            wanted: 4,
            done: data.len(),
        })?;
        Ok(u32::from_le_bytes(bytes))
    }

    /// Write a little-endian 32-bit word
    fn write_u32(&self, address: u64, value: u32) -> Result<(), MemoryError> {
        self.write(address, &value.to_le_bytes())
    }
}

/// Memory of another process, opened by PID
pub struct ProcessMemory {
    pid: u32,

    #[cfg(target_os = "windows")]
    process_handle: isize,
}

impl ProcessMemory {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Read memory into an existing buffer, returning the bytes transferred
    pub fn read_into(&self, address: u64, buffer: &mut [u8]) -> Result<usize, MemoryError> {
        #[cfg(target_os = "windows")]
        {
            self.read_windows(address, buffer)
        }

        #[cfg(target_os = "linux")]
        {
            self.read_linux(address, buffer)
        }

        #[cfg(not(any(target_os = "windows", target_os = "linux")))]
        {
            let _ = (address, buffer);
            Err(MemoryError::NoProcess)
        }
    }

    /// Write memory, returning the bytes transferred
    pub fn write_from(&self, address: u64, data: &[u8]) -> Result<usize, MemoryError> {
        #[cfg(target_os = "windows")]
        {
            self.write_windows(address, data)
        }

        #[cfg(target_os = "linux")]
        {
            self.write_linux(address, data)
        }

        #[cfg(not(any(target_os = "windows", target_os = "linux")))]
        {
            let _ = (address, data);
            Err(MemoryError::NoProcess)
        }
    }

    /// Read a little-endian 64-bit pointer stored in the target
    pub fn read_pointer(&self, address: u64) -> Result<u64, MemoryError> {
        let mut buffer = [0u8; 8];
        let done = self.read_into(address, &mut buffer)?;
        if done != buffer.len() {
            return Err(MemoryError::ShortRead {
                address,
                wanted: buffer.len(),
                done,
            });
        }
        Ok(u64::from_le_bytes(buffer))
    }
}

// Windows-specific implementations
#[cfg(target_os = "windows")]
impl ProcessMemory {
    /// Open a process for memory operations
    pub fn open(pid: u32) -> Result<Self, MemoryError> {
        use windows::Win32::System::Threading::{
            OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_OPERATION, PROCESS_VM_READ,
            PROCESS_VM_WRITE,
        };

        let access = PROCESS_VM_OPERATION
            | PROCESS_VM_READ
            | PROCESS_VM_WRITE
            | PROCESS_QUERY_INFORMATION;
        let handle = unsafe {
            OpenProcess(access, false, pid).map_err(|e| MemoryError::ReadFailed {
                address: 0,
                reason: format!("OpenProcess({}): {}", pid, e),
            })?
        };

        Ok(Self {
            pid,
            process_handle: handle.0,
        })
    }

    fn handle(&self) -> windows::Win32::Foundation::HANDLE {
        windows::Win32::Foundation::HANDLE(self.process_handle)
    }

    fn read_windows(&self, address: u64, buffer: &mut [u8]) -> Result<usize, MemoryError> {
        use windows::Win32::System::Diagnostics::Debug::ReadProcessMemory;

        let mut bytes_read = 0usize;
        unsafe {
            ReadProcessMemory(
                self.handle(),
                address as *const std::ffi::c_void,
                buffer.as_mut_ptr() as *mut std::ffi::c_void,
                buffer.len(),
                Some(&mut bytes_read),
            )
            .map_err(|e| MemoryError::ReadFailed {
                address,
                reason: e.to_string(),
            })?;
        }

        Ok(bytes_read)
    }

    fn write_windows(&self, address: u64, data: &[u8]) -> Result<usize, MemoryError> {
        use windows::Win32::System::Diagnostics::Debug::WriteProcessMemory;

        let mut bytes_written = 0usize;
        unsafe {
            WriteProcessMemory(
                self.handle(),
                address as *const std::ffi::c_void,
                data.as_ptr() as *const std::ffi::c_void,
                data.len(),
                Some(&mut bytes_written),
            )
            .map_err(|e| MemoryError::WriteFailed {
                address,
                reason: e.to_string(),
            })?;
        }

        Ok(bytes_written)
    }

    fn alive(&self) -> bool {
        use windows::Win32::System::Threading::GetExitCodeProcess;

        const STILL_ACTIVE: u32 = 259;
        let mut code = 0u32;
        unsafe { GetExitCodeProcess(self.handle(), &mut code).is_ok() && code == STILL_ACTIVE }
    }
}

#[cfg(target_os = "windows")]
impl Drop for ProcessMemory {
    fn drop(&mut self) {
        use windows::Win32::Foundation::CloseHandle;

        unsafe {
            let _ = CloseHandle(self.handle());
        }
    }
}

// Linux-specific implementations
#[cfg(target_os = "linux")]
impl ProcessMemory {
    /// Open a process for memory operations
    pub fn open(pid: u32) -> Result<Self, MemoryError> {
        let process = Self { pid };
        if !process.alive() {
            return Err(MemoryError::NoProcess);
        }
        Ok(process)
    }

    fn mem_path(&self) -> String {
        format!("/proc/{}/mem", self.pid)
    }

    fn read_linux(&self, address: u64, buffer: &mut [u8]) -> Result<usize, MemoryError> {
        use std::fs::File;
        use std::io::{Read, Seek, SeekFrom};

        let read_failed = |e: std::io::Error| MemoryError::ReadFailed {
            address,
            reason: e.to_string(),
        };

        let mut file = File::open(self.mem_path()).map_err(read_failed)?;
        file.seek(SeekFrom::Start(address)).map_err(read_failed)?;

        let mut done = 0;
        while done < buffer.len() {
            match file.read(&mut buffer[done..]).map_err(read_failed)? {
                0 => break,
                n => done += n,
            }
        }
        Ok(done)
    }

    fn write_linux(&self, address: u64, data: &[u8]) -> Result<usize, MemoryError> {
        use std::fs::OpenOptions;
        use std::io::{Seek, SeekFrom, Write};

        let write_failed = |e: std::io::Error| MemoryError::WriteFailed {
            address,
            reason: e.to_string(),
        };

        let mut file = OpenOptions::new()
            .write(true)
            .open(self.mem_path())
            .map_err(write_failed)?;
        file.seek(SeekFrom::Start(address)).map_err(write_failed)?;
        file.write_all(data).map_err(write_failed)?;

        Ok(data.len())
    }

    fn alive(&self) -> bool {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        kill(Pid::from_raw(self.pid as i32), None).is_ok()
    }
}

#[cfg(not(any(target_os = "windows", target_os = "linux")))]
impl ProcessMemory {
    pub fn open(_pid: u32) -> Result<Self, MemoryError> {
        Err(MemoryError::NoProcess)
    }

    fn alive(&self) -> bool {
        false
    }
}

/// Process memory with a resolved RAM base
pub struct EmulatorMemory {
    process: ProcessMemory,
    main_ram_base: u64,
}

impl EmulatorMemory {
    pub fn new(process: ProcessMemory, main_ram_base: u64) -> Self {
        Self {
            process,
            main_ram_base,
        }
    }

    pub fn pid(&self) -> u32 {
        self.process.pid()
    }
}

impl TargetMemory for EmulatorMemory {
    fn main_ram_base(&self) -> u64 {
        self.main_ram_base
    }

    fn is_alive(&self) -> bool {
        self.process.alive()
    }

    fn read(&self, address: u64, len: usize) -> Result<Vec<u8>, MemoryError> {
        let mut buffer = vec![0u8; len];
        let done = self.process.read_into(address, &mut buffer)?;
        if done != len {
            return Err(MemoryError::ShortRead {
                address,
                wanted: len,
                done,
            });
        }
        Ok(buffer)
    }

    fn write(&self, address: u64, data: &[u8]) -> Result<(), MemoryError> {
        let done = self.process.write_from(address, data)?;
        if done != data.len() {
            return Err(MemoryError::WriteFailed {
                address,
                reason: format!("wrote {} of {} bytes", done, data.len()),
            });
        }
        Ok(())
    }
}
