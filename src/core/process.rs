//! Running-process discovery: PIDs, executable paths and module bases.

use std::path::PathBuf;

/// Information about a running process
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    /// Process ID
    pub pid: u32,
    /// Process name (executable name)
    pub name: String,
    /// Full path of the main executable, when readable
    pub exe_path: Option<PathBuf>,
}

impl ProcessInfo {
    /// Case-insensitive prefix match on the executable name
    pub fn name_starts_with(&self, prefix: &str) -> bool {
        self.name.to_lowercase().starts_with(&prefix.to_lowercase())
    }
}

/// Find the first process whose name starts with `prefix`
pub fn find_by_prefix(prefix: &str) -> Option<ProcessInfo> {
    enumerate_processes()
        .into_iter()
        .find(|p| p.name_starts_with(prefix))
}

#[cfg(target_os = "linux")]
pub use linux::{enumerate_processes, module_base};

#[cfg(target_os = "windows")]
pub use windows_impl::{enumerate_processes, module_base};

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
pub fn enumerate_processes() -> Vec<ProcessInfo> {
    Vec::new()
}

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
pub fn module_base(_pid: u32, _module: &str) -> Option<u64> {
    None
}

#[cfg(target_os = "linux")]
mod linux {
    use super::ProcessInfo;
    use std::fs;
    use std::path::Path;

    /// Enumerate all running processes from /proc
    pub fn enumerate_processes() -> Vec<ProcessInfo> {
        let Ok(entries) = fs::read_dir("/proc") else {
            return Vec::new();
        };

        let mut processes: Vec<ProcessInfo> = entries
            .flatten()
            .filter_map(|entry| {
                let pid: u32 = entry.file_name().to_str()?.parse().ok()?;
                let exe_path = fs::read_link(entry.path().join("exe")).ok();
                let name = exe_path
                    .as_deref()
                    .and_then(Path::file_name)
                    .map(|n| n.to_string_lossy().into_owned())
                    .or_else(|| {
                        fs::read_to_string(entry.path().join("comm"))
                            .ok()
                            .map(|s| s.trim_end().to_string())
                    })?;
                Some(ProcessInfo {
                    pid,
                    name,
                    exe_path,
                })
            })
            .collect();

        processes.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        processes
    }

    /// Load address of a mapped module, matched by file name (case-insensitive)
    pub fn module_base(pid: u32, module: &str) -> Option<u64> {
        let maps = fs::read_to_string(format!("/proc/{}/maps", pid)).ok()?;
        let wanted = module.to_lowercase();

        maps.lines().find_map(|line| {
            // start-end perms offset dev inode path
            let mut fields = line.split_whitespace();
            let range = fields.next()?;
            let _perms = fields.next()?;
            let offset = u64::from_str_radix(fields.next()?, 16).ok()?;
            let path = fields.nth(2)?;

            let name = Path::new(path).file_name()?.to_string_lossy().to_lowercase();
            if name != wanted {
                return None;
            }
            let start = u64::from_str_radix(range.split('-').next()?, 16).ok()?;
            Some(start.saturating_sub(offset))
        })
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_finds_self() {
            let me = std::process::id();
            let processes = enumerate_processes();
            let own = processes.iter().find(|p| p.pid == me).unwrap();
            assert!(own.exe_path.is_some());

            let exe_name = own.name.clone();
            assert!(module_base(me, &exe_name).is_some());
            assert!(module_base(me, "definitely-not-mapped.dll").is_none());
        }
    }
}

#[cfg(target_os = "windows")]
mod windows_impl {
    use super::ProcessInfo;
    use std::path::PathBuf;

    use windows::Win32::Foundation::{CloseHandle, HANDLE, HMODULE, MAX_PATH};
    use windows::Win32::System::ProcessStatus::{
        EnumProcessModules, EnumProcesses, GetModuleBaseNameW, GetModuleFileNameExW,
    };
    use windows::Win32::System::Threading::{
        OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ,
    };

    /// Enumerate all running processes
    pub fn enumerate_processes() -> Vec<ProcessInfo> {
        let mut processes = Vec::new();
        let mut pids: [u32; 4096] = [0; 4096];
        let mut bytes_returned: u32 = 0;

        unsafe {
            if EnumProcesses(
                pids.as_mut_ptr(),
                (pids.len() * std::mem::size_of::<u32>()) as u32,
                &mut bytes_returned,
            )
            .is_err()
            {
                return processes;
            }

            let num_processes = bytes_returned as usize / std::mem::size_of::<u32>();

            for &pid in pids.iter().take(num_processes) {
                if pid == 0 {
                    continue;
                }

                // Skip processes we can't access
                let Ok(handle) = OpenProcess(PROCESS_QUERY_INFORMATION | PROCESS_VM_READ, false, pid)
                else {
                    continue;
                };

                let name = module_name(handle, None).unwrap_or_else(|| format!("<PID {}>", pid));
                let exe_path = module_path(handle, None);
                let _ = CloseHandle(handle);

                processes.push(ProcessInfo {
                    pid,
                    name,
                    exe_path,
                });
            }
        }

        processes.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        processes
    }

    /// Load address of a module in `pid`, matched by base name (case-insensitive)
    pub fn module_base(pid: u32, module: &str) -> Option<u64> {
        let wanted = module.to_lowercase();
        let mut modules = [HMODULE::default(); 1024];
        let mut needed: u32 = 0;

        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_INFORMATION | PROCESS_VM_READ, false, pid).ok()?;
            let listed = EnumProcessModules(
                handle,
                modules.as_mut_ptr(),
                std::mem::size_of_val(&modules) as u32,
                &mut needed,
            );

            let mut found = None;
            if listed.is_ok() {
                let count = (needed as usize / std::mem::size_of::<HMODULE>()).min(modules.len());
                found = modules[..count].iter().find_map(|&m| {
                    let name = module_name(handle, Some(m))?;
                    (name.to_lowercase() == wanted).then_some(m.0 as u64)
                });
            }

            let _ = CloseHandle(handle);
            found
        }
    }

    fn module_name(handle: HANDLE, module: Option<HMODULE>) -> Option<String> {
        let mut name_buf = [0u16; MAX_PATH as usize];
        let len = unsafe { GetModuleBaseNameW(handle, module.unwrap_or_default(), &mut name_buf) };
        if len == 0 {
            return None;
        }
        Some(String::from_utf16_lossy(&name_buf[..len as usize]))
    }

    fn module_path(handle: HANDLE, module: Option<HMODULE>) -> Option<PathBuf> {
        let mut path_buf = [0u16; 1024];
        let len = unsafe { GetModuleFileNameExW(handle, module.unwrap_or_default(), &mut path_buf) };
        if len == 0 {
            return None;
        }
        Some(PathBuf::from(String::from_utf16_lossy(&path_buf[..len as usize])))
    }
}
