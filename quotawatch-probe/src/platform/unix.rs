//! macOS and Linux process inspection.
//!
//! Processes come from `ps -ax -o pid=,command=`. Listening ports come from
//! `lsof`; on Linux hosts without `lsof` the strategy switches to `ss -tlnp`.

use quotawatch_core::ProcessCandidate;
use tracing::{debug, info};

use super::{
    CommandStage, ErrorMessages, PlatformStrategy, ShellCommand, is_local_bind, is_target_command,
    sorted_ports, split_host_port,
};

/// Unix variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnixFlavor {
    /// macOS.
    MacOs,
    /// Linux.
    Linux,
}

/// Port listing tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortTool {
    /// `lsof -nP -iTCP -sTCP:LISTEN -a -p <pid>`.
    Lsof,
    /// `ss -tlnp`.
    Ss,
}

/// Strategy for macOS and Linux.
#[derive(Debug, Clone)]
pub struct UnixStrategy {
    flavor: UnixFlavor,
    port_tool: PortTool,
}

impl UnixStrategy {
    /// Creates a strategy that lists ports with `lsof`.
    pub fn new(flavor: UnixFlavor) -> Self {
        Self {
            flavor,
            port_tool: PortTool::Lsof,
        }
    }

    /// Current port tool.
    pub fn port_tool(&self) -> PortTool {
        self.port_tool
    }
}

impl PlatformStrategy for UnixStrategy {
    fn platform_name(&self) -> &'static str {
        match self.flavor {
            UnixFlavor::MacOs => "macOS",
            UnixFlavor::Linux => "Linux",
        }
    }

    fn process_list_command(&self, _process_name: &str) -> ShellCommand {
        ShellCommand::new("ps", ["-ax", "-o", "pid=,command="])
    }

    fn parse_process_list(&self, output: &str, process_name: &str) -> Vec<ProcessCandidate> {
        let mut matching = Vec::new();
        let mut named = 0usize;

        for line in output.lines() {
            let Some((pid, command)) = parse_ps_line(line) else {
                continue;
            };
            if !executable_matches(command, process_name) {
                continue;
            }
            named += 1;
            if is_target_command(command) {
                matching.push(ProcessCandidate::new(pid, command));
            } else {
                debug!(pid, "Skipping language server of another application");
            }
        }

        debug!(named, matching = matching.len(), "Parsed process list");
        matching
    }

    fn listening_ports_command(&self, pid: u32) -> ShellCommand {
        match self.port_tool {
            PortTool::Lsof => ShellCommand::new(
                "lsof",
                [
                    "-nP".to_string(),
                    "-iTCP".to_string(),
                    "-sTCP:LISTEN".to_string(),
                    "-a".to_string(),
                    "-p".to_string(),
                    pid.to_string(),
                ],
            ),
            PortTool::Ss => ShellCommand::new("ss", ["-tlnp"]),
        }
    }

    fn parse_listening_ports(&self, output: &str, pid: u32) -> Vec<u16> {
        match self.port_tool {
            PortTool::Lsof => {
                sorted_ports(output.lines().filter_map(|line| parse_lsof_line(line, pid)))
            }
            PortTool::Ss => sorted_ports(output.lines().filter_map(|line| parse_ss_line(line, pid))),
        }
    }

    fn error_messages(&self) -> ErrorMessages {
        let (binary, tools) = match (self.flavor, self.port_tool) {
            (UnixFlavor::MacOs, _) => ("language_server_macos", "ps and lsof"),
            (UnixFlavor::Linux, PortTool::Lsof) => ("language_server_linux", "ps and lsof (or ss)"),
            (UnixFlavor::Linux, PortTool::Ss) => ("language_server_linux", "ps and ss"),
        };
        ErrorMessages {
            process_not_found: "language_server process not found".to_string(),
            command_not_available: format!("{tools} command unavailable; please install it"),
            requirements: vec![
                "Antigravity is running".to_string(),
                format!("{binary} process is running"),
                format!("The system can run {tools} commands"),
            ],
        }
    }

    fn handle_command_unavailable(&mut self, stage: CommandStage) -> bool {
        if stage == CommandStage::ListeningPorts
            && self.flavor == UnixFlavor::Linux
            && self.port_tool == PortTool::Lsof
        {
            info!("lsof is unavailable, switching to ss");
            self.port_tool = PortTool::Ss;
            true
        } else {
            false
        }
    }
}

// ============================================================================
// Parsers
// ============================================================================

/// Parses a `ps -o pid=,command=` row: leading PID, then the command line.
fn parse_ps_line(line: &str) -> Option<(u32, &str)> {
    let trimmed = line.trim_start();
    let (pid, command) = trimmed.split_once(char::is_whitespace)?;
    let pid = pid.parse().ok()?;
    let command = command.trim();
    (!command.is_empty()).then_some((pid, command))
}

/// Returns true if the command's executable is `process_name`, allowing an
/// architecture suffix such as `_arm` or `_x64`.
fn executable_matches(command: &str, process_name: &str) -> bool {
    let executable = command.split(" -").next().unwrap_or(command).trim_end();
    let base = executable.rsplit('/').next().unwrap_or(executable);
    match base.strip_prefix(process_name) {
        Some(rest) => rest.is_empty() || rest.starts_with('_'),
        None => false,
    }
}

/// Parses an `lsof` row ending in `(LISTEN)`.
///
/// ```text
/// language_ 12345 me   23u  IPv4 0x1234  0t0  TCP 127.0.0.1:42069 (LISTEN)
/// ```
fn parse_lsof_line(line: &str, pid: u32) -> Option<u16> {
    let before = line[..line.find("(LISTEN)")?].trim_end();
    let mut fields = before.split_whitespace();
    let _command = fields.next()?;
    if let Some(owner) = fields.next().and_then(|f| f.parse::<u32>().ok()) {
        if owner != pid {
            return None;
        }
    }
    let name = before.split_whitespace().last()?;
    let (host, port) = split_host_port(name)?;
    is_local_bind(host).then_some(port)
}

/// Parses an `ss -tlnp` row owned by `pid`.
///
/// ```text
/// LISTEN 0 4096 127.0.0.1:42100 0.0.0.0:* users:(("language_server",pid=12345,fd=9))
/// ```
fn parse_ss_line(line: &str, pid: u32) -> Option<u16> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 6 || fields[0] != "LISTEN" {
        return None;
    }
    let needle = format!("pid={pid},");
    if !fields[5..].iter().any(|f| f.contains(&needle)) {
        return None;
    }
    let (host, port) = split_host_port(fields[3])?;
    let host = host.split('%').next().unwrap_or(host);
    is_local_bind(host).then_some(port)
}
