//! Windows process inspection.
//!
//! Processes are listed with `wmic` (`/format:list` key-value blocks). Newer
//! Windows builds ship without `wmic`; the strategy then switches to
//! PowerShell's `Get-CimInstance` with JSON output. Ports come from
//! `netstat -ano`.

use quotawatch_core::ProcessCandidate;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{
    CommandStage, ErrorMessages, PlatformStrategy, ShellCommand, is_local_bind, is_target_command,
    sorted_ports, split_host_port,
};

/// Process listing mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowsListMode {
    /// `wmic process ... /format:list`.
    Wmic,
    /// `Get-CimInstance Win32_Process | ConvertTo-Json`.
    PowerShell,
}

/// Strategy for Windows.
#[derive(Debug, Clone)]
pub struct WindowsStrategy {
    mode: WindowsListMode,
    system_root: String,
}

impl WindowsStrategy {
    /// Creates a strategy in the given mode, using `%SystemRoot%` for tool
    /// paths.
    pub fn new(mode: WindowsListMode) -> Self {
        let system_root = std::env::var("SystemRoot").unwrap_or_else(|_| r"C:\Windows".to_string());
        Self::with_system_root(mode, system_root)
    }

    /// Creates a strategy with an explicit Windows directory.
    pub fn with_system_root(mode: WindowsListMode, system_root: impl Into<String>) -> Self {
        Self {
            mode,
            system_root: system_root.into(),
        }
    }

    /// Current listing mode.
    pub fn mode(&self) -> WindowsListMode {
        self.mode
    }

    fn system32(&self, tail: &str) -> String {
        format!(r"{}\System32\{tail}", self.system_root.trim_end_matches('\\'))
    }
}

impl PlatformStrategy for WindowsStrategy {
    fn platform_name(&self) -> &'static str {
        "Windows"
    }

    fn process_list_command(&self, process_name: &str) -> ShellCommand {
        match self.mode {
            WindowsListMode::Wmic => ShellCommand::new(
                self.system32(r"wbem\wmic.exe"),
                [
                    "process".to_string(),
                    "where".to_string(),
                    format!("name='{process_name}'"),
                    "get".to_string(),
                    "ProcessId,CommandLine".to_string(),
                    "/format:list".to_string(),
                ],
            ),
            WindowsListMode::PowerShell => {
                let name = process_name.replace('\'', "''");
                let script = format!(
                    "Get-CimInstance Win32_Process -Filter 'name=''{name}''' | Select-Object ProcessId,CommandLine | ConvertTo-Json"
                );
                ShellCommand::new(
                    self.system32(r"WindowsPowerShell\v1.0\powershell.exe"),
                    ["-NoProfile".to_string(), "-NonInteractive".to_string(), "-Command".to_string(), script],
                )
            }
        }
    }

    fn parse_process_list(&self, output: &str, _process_name: &str) -> Vec<ProcessCandidate> {
        let trimmed = output.trim_start_matches('\u{feff}').trim();
        let all = if trimmed.starts_with('{') || trimmed.starts_with('[') {
            parse_cim_json(trimmed).unwrap_or_else(|| {
                warn!("Process list looked like JSON but did not parse, trying key-value blocks");
                parse_wmic_blocks(output)
            })
        } else {
            parse_wmic_blocks(output)
        };

        let total = all.len();
        let matching: Vec<ProcessCandidate> = all
            .into_iter()
            .filter(|c| is_target_command(&c.command_line))
            .collect();
        debug!(
            total,
            matching = matching.len(),
            "Parsed language server processes"
        );
        matching
    }

    fn listening_ports_command(&self, _pid: u32) -> ShellCommand {
        ShellCommand::new(self.system32("netstat.exe"), ["-ano"])
    }

    fn parse_listening_ports(&self, output: &str, pid: u32) -> Vec<u16> {
        sorted_ports(output.lines().filter_map(|line| parse_netstat_line(line, pid)))
    }

    fn error_messages(&self) -> ErrorMessages {
        let command_not_available = match self.mode {
            WindowsListMode::Wmic => {
                "wmic/PowerShell command unavailable; please check the system environment"
            }
            WindowsListMode::PowerShell => {
                "PowerShell command failed; please check system permissions"
            }
        };
        let permissions = match self.mode {
            WindowsListMode::Wmic => {
                "The system has permission to run wmic/PowerShell and netstat commands (auto-fallback supported)"
            }
            WindowsListMode::PowerShell => {
                "The system has permission to run PowerShell and netstat commands"
            }
        };
        ErrorMessages {
            process_not_found: "language_server process not found".to_string(),
            command_not_available: command_not_available.to_string(),
            requirements: vec![
                "Antigravity is running".to_string(),
                "language_server_windows_x64.exe process is running".to_string(),
                permissions.to_string(),
            ],
        }
    }

    fn handle_command_unavailable(&mut self, stage: CommandStage) -> bool {
        if stage == CommandStage::ProcessList && self.mode == WindowsListMode::Wmic {
            info!("wmic is unavailable, switching to PowerShell");
            self.mode = WindowsListMode::PowerShell;
            true
        } else {
            false
        }
    }
}

// ============================================================================
// Parsers
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CimOutput {
    Many(Vec<CimProcess>),
    One(CimProcess),
}

#[derive(Debug, Deserialize)]
struct CimProcess {
    #[serde(rename = "ProcessId")]
    process_id: Option<u32>,
    #[serde(rename = "CommandLine")]
    command_line: Option<String>,
}

/// Parses `ConvertTo-Json` output: one object, or an array of objects.
fn parse_cim_json(output: &str) -> Option<Vec<ProcessCandidate>> {
    let parsed: CimOutput = serde_json::from_str(output).ok()?;
    let processes = match parsed {
        CimOutput::Many(list) => list,
        CimOutput::One(single) => vec![single],
    };
    Some(
        processes
            .into_iter()
            .filter_map(|p| {
                let pid = p.process_id.filter(|pid| *pid != 0)?;
                let command_line = p.command_line.filter(|c| !c.trim().is_empty())?;
                Some(ProcessCandidate::new(pid, command_line))
            })
            .collect(),
    )
}

/// Parses `wmic ... /format:list` output.
///
/// Each process is a block of `Key=Value` lines; blocks are separated by
/// blank lines. `wmic` emits `\r\r\n` line endings.
fn parse_wmic_blocks(output: &str) -> Vec<ProcessCandidate> {
    let normalized = output.replace('\r', "");
    let mut candidates = Vec::new();
    let mut pid: Option<u32> = None;
    let mut command_line: Option<String> = None;

    let mut flush = |pid: &mut Option<u32>, command_line: &mut Option<String>| {
        if let (Some(p), Some(c)) = (pid.take(), command_line.take()) {
            candidates.push(ProcessCandidate::new(p, c));
        }
        *pid = None;
        *command_line = None;
    };

    for line in normalized.lines() {
        let line = line.trim();
        if line.is_empty() {
            flush(&mut pid, &mut command_line);
            continue;
        }
        if let Some(value) = line.strip_prefix("ProcessId=") {
            pid = value.trim().parse().ok();
        } else if let Some(value) = line.strip_prefix("CommandLine=") {
            let value = value.trim();
            command_line = (!value.is_empty()).then(|| value.to_string());
        }
    }
    flush(&mut pid, &mut command_line);

    candidates
}

/// Parses one `netstat -ano` row.
///
/// ```text
///   TCP    127.0.0.1:2873         0.0.0.0:0              LISTENING       4412
/// ```
fn parse_netstat_line(line: &str, pid: u32) -> Option<u16> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [proto, local, _foreign, state, owner] = fields.as_slice() else {
        return None;
    };
    if !proto.eq_ignore_ascii_case("TCP") || !state.eq_ignore_ascii_case("LISTENING") {
        return None;
    }
    if owner.parse::<u32>().ok()? != pid {
        return None;
    }
    let (host, port) = split_host_port(local)?;
    is_local_bind(host).then_some(port)
}
