//! Sender pid to image name, for display and `--name` filtering

use std::collections::{HashMap, HashSet};
use windows::Win32::Foundation::CloseHandle;
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, PROCESSENTRY32W, Process32FirstW, Process32NextW, TH32CS_SNAPPROCESS,
};
use windows::core::Result;

/// Image names of running processes, refreshed when an unknown pid shows up
#[derive(Debug, Default)]
pub struct ProcessNames {
    names: HashMap<u32, String>,
    /// Pids missing from the last snapshot (typically already exited)
    missing: HashSet<u32>,
}

impl ProcessNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Image name of `pid`, taking a new snapshot on a cache miss
    pub fn lookup(&mut self, pid: i32) -> Option<&str> {
        let pid = u32::try_from(pid).ok()?;

        if !self.names.contains_key(&pid) && !self.missing.contains(&pid) {
            match snapshot() {
                Ok(names) => {
                    self.names = names;
                    self.missing.clear();
                }
                Err(e) => tracing::debug!(error = %e, "process snapshot failed"),
            }
            if !self.names.contains_key(&pid) {
                self.missing.insert(pid);
            }
        }

        self.names.get(&pid).map(String::as_str)
    }
}

/// List all running processes
fn snapshot() -> Result<HashMap<u32, String>> {
    let mut processes = HashMap::new();

    unsafe {
        let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0)?;

        let mut entry = PROCESSENTRY32W {
            dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };

        if Process32FirstW(snapshot, &mut entry).is_ok() {
            loop {
                let len = entry
                    .szExeFile
                    .iter()
                    .position(|&c| c == 0)
                    .unwrap_or(entry.szExeFile.len());
                let name = String::from_utf16_lossy(&entry.szExeFile[..len]);
                processes.insert(entry.th32ProcessID, name);

                if Process32NextW(snapshot, &mut entry).is_err() {
                    break;
                }
            }
        }

        CloseHandle(snapshot)?;
    }

    Ok(processes)
}
