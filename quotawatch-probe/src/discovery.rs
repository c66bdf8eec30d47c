//! Credential discovery for the local language server.
//!
//! Each attempt lists processes, picks the first target candidate carrying a
//! CSRF token, lists its listening ports and probes them one by one until a
//! port answers the `GetUnleashData` call with HTTP 200.

use std::sync::Arc;
use std::time::Duration;

use quotawatch_core::CredentialBundle;
use quotawatch_core::models::credentials::mask_token;
use quotawatch_fetch::{CommandRunner, ProcessOutput, RpcRequest, RpcTransport, Scheme};
use tracing::{debug, error, info, instrument, warn};

use crate::client_info::ClientInfo;
use crate::error::DiscoveryError;
use crate::platform::{
    CommandStage, ErrorMessages, PlatformDetector, PlatformStrategy, select_candidate,
};
use crate::rpc::GET_UNLEASH_DATA_PATH;

// ============================================================================
// Options
// ============================================================================

/// Attempt budget and timeouts for discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Attempts made by [`CredentialDiscovery::discover_with_defaults`].
    pub max_attempts: u32,
    /// Pause between failed attempts.
    pub retry_delay: Duration,
    /// Timeout of the process-list command.
    pub process_list_timeout: Duration,
    /// Timeout of the listening-ports command.
    pub port_list_timeout: Duration,
    /// Timeout of a single port probe.
    pub probe_timeout: Duration,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            process_list_timeout: Duration::from_secs(15),
            port_list_timeout: Duration::from_secs(3),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

// ============================================================================
// Discovery
// ============================================================================

/// Locates the language server and the port serving its API.
///
/// The strategy is owned, so a switch to an alternative inspection command
/// persists across calls.
pub struct CredentialDiscovery {
    strategy: Box<dyn PlatformStrategy>,
    process_name: String,
    runner: Arc<dyn CommandRunner>,
    transport: Arc<dyn RpcTransport>,
    client_info: Arc<ClientInfo>,
    options: DiscoveryOptions,
}

impl CredentialDiscovery {
    /// Creates a discovery for the detected platform.
    pub fn new(
        detector: &PlatformDetector,
        runner: Arc<dyn CommandRunner>,
        transport: Arc<dyn RpcTransport>,
        client_info: Arc<ClientInfo>,
    ) -> Self {
        Self::with_strategy(
            detector.strategy(),
            detector.process_name(),
            runner,
            transport,
            client_info,
        )
    }

    /// Creates a discovery with an explicit strategy and process name.
    pub fn with_strategy(
        strategy: Box<dyn PlatformStrategy>,
        process_name: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
        transport: Arc<dyn RpcTransport>,
        client_info: Arc<ClientInfo>,
    ) -> Self {
        Self {
            strategy,
            process_name: process_name.into(),
            runner,
            transport,
            client_info,
            options: DiscoveryOptions::default(),
        }
    }

    /// Replaces the options.
    #[must_use]
    pub fn with_options(mut self, options: DiscoveryOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the options.
    pub fn options(&self) -> &DiscoveryOptions {
        &self.options
    }

    /// Display name of the platform.
    pub fn platform_name(&self) -> &'static str {
        self.strategy.platform_name()
    }

    /// OS-specific guidance for the user.
    pub fn error_messages(&self) -> ErrorMessages {
        self.strategy.error_messages()
    }

    /// Runs [`Self::discover`] with the configured attempt budget.
    ///
    /// # Errors
    ///
    /// See [`Self::discover`].
    pub async fn discover_with_defaults(&mut self) -> Result<CredentialBundle, DiscoveryError> {
        let DiscoveryOptions {
            max_attempts,
            retry_delay,
            ..
        } = self.options;
        self.discover(max_attempts, retry_delay).await
    }

    /// Makes up to `max_attempts` independent attempts, pausing `retry_delay`
    /// between them.
    ///
    /// Switching a strategy to its alternative command does not consume an
    /// attempt.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Exhausted`] when every attempt fails.
    #[instrument(skip(self), fields(platform = self.strategy.platform_name()))]
    pub async fn discover(
        &mut self,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Result<CredentialBundle, DiscoveryError> {
        let max_attempts = max_attempts.max(1);

        for attempt in 1..=max_attempts {
            info!(attempt, max_attempts, "Detecting language server");

            match self.attempt().await {
                Ok(bundle) => {
                    info!(
                        attempt,
                        extension_port = bundle.extension_port,
                        connect_port = bundle.connect_port,
                        "Language server detected"
                    );
                    return Ok(bundle);
                }
                Err(e) => warn!(attempt, error = %e, "Discovery attempt failed"),
            }

            if attempt < max_attempts {
                debug!(delay_ms = retry_delay.as_millis(), "Waiting before next attempt");
                tokio::time::sleep(retry_delay).await;
            }
        }

        let messages = self.strategy.error_messages();
        error!(
            attempts = max_attempts,
            requirements = ?messages.requirements,
            "All discovery attempts failed"
        );
        Err(DiscoveryError::Exhausted {
            attempts: max_attempts,
        })
    }

    async fn attempt(&mut self) -> Result<CredentialBundle, DiscoveryError> {
        let listing = self.run_stage(CommandStage::ProcessList, 0).await?;
        let candidates = self
            .strategy
            .parse_process_list(&listing.stdout, &self.process_name);
        let (candidate, creds) = select_candidate(self.strategy.as_ref(), &candidates)?;

        info!(
            pid = candidate.pid,
            extension_port = creds.extension_port,
            csrf_token = %mask_token(&creds.csrf_token),
            "Found language server process"
        );

        let listing = self
            .run_stage(CommandStage::ListeningPorts, candidate.pid)
            .await?;
        let ports = self
            .strategy
            .parse_listening_ports(&listing.stdout, candidate.pid);
        if ports.is_empty() {
            return Err(DiscoveryError::NoListeningPorts { pid: candidate.pid });
        }
        debug!(pid = candidate.pid, ?ports, "Found listening ports");

        let connect_port = self
            .find_working_port(&ports, &creds.csrf_token)
            .await
            .ok_or(DiscoveryError::NoResponsivePort { ports })?;

        Ok(CredentialBundle::new(
            creds.extension_port,
            connect_port,
            creds.csrf_token,
        ))
    }

    /// Runs the command for `stage`, switching to the alternative command
    /// when the program is missing.
    ///
    /// Output is used whatever the exit code; tools such as `lsof` exit
    /// non-zero on an empty result.
    async fn run_stage(
        &mut self,
        stage: CommandStage,
        pid: u32,
    ) -> Result<ProcessOutput, DiscoveryError> {
        loop {
            let (command, timeout) = match stage {
                CommandStage::ProcessList => (
                    self.strategy.process_list_command(&self.process_name),
                    self.options.process_list_timeout,
                ),
                CommandStage::ListeningPorts => (
                    self.strategy.listening_ports_command(pid),
                    self.options.port_list_timeout,
                ),
            };
            debug!(%command, ?stage, "Running inspection command");

            let result = self
                .runner
                .run(&command.program, &command.args, timeout)
                .await;

            if self.strategy.is_command_unavailable(&result) {
                if self.strategy.handle_command_unavailable(stage) {
                    continue;
                }
                return Err(DiscoveryError::Command(
                    self.strategy.error_messages().command_not_available,
                ));
            }

            return result.map_err(|e| DiscoveryError::Command(format!("{command}: {e}")));
        }
    }

    /// Probes `ports` in order and returns the first answering HTTP 200.
    async fn find_working_port(&self, ports: &[u16], csrf_token: &str) -> Option<u16> {
        for &port in ports {
            let request = RpcRequest {
                scheme: Scheme::Https,
                port,
                path: GET_UNLEASH_DATA_PATH.to_string(),
                csrf_token: csrf_token.to_string(),
                body: self.client_info.probe_body(),
                timeout: self.options.probe_timeout,
            };

            match self.transport.post_json(request).await {
                Ok(response) if response.is_ok() => {
                    debug!(port, "Port answered probe");
                    return Some(port);
                }
                Ok(response) => debug!(port, status = response.status, "Port rejected probe"),
                Err(e) => debug!(port, error = %e, "Port probe failed"),
            }
        }
        None
    }
}

impl std::fmt::Debug for CredentialDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialDiscovery")
            .field("strategy", &self.strategy)
            .field("process_name", &self.process_name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use quotawatch_fetch::{ProcessError, RpcResponse, TransportError};

    use crate::platform::{UnixFlavor, UnixStrategy, WindowsListMode, WindowsStrategy};

    #[derive(Default)]
    struct ScriptedRunner {
        replies: Mutex<VecDeque<Result<ProcessOutput, ProcessError>>>,
        programs: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        fn new(replies: Vec<Result<ProcessOutput, ProcessError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                programs: Mutex::default(),
            })
        }

        fn programs(&self) -> Vec<String> {
            self.programs.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(
            &self,
            program: &str,
            _args: &[String],
            _timeout: Duration,
        ) -> Result<ProcessOutput, ProcessError> {
            self.programs.lock().unwrap().push(program.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ProcessOutput::from_stdout("")))
        }
    }

    #[derive(Default)]
    struct PortTransport {
        statuses: HashMap<u16, u16>,
        probed: Mutex<Vec<u16>>,
    }

    impl PortTransport {
        fn new(statuses: &[(u16, u16)]) -> Arc<Self> {
            Arc::new(Self {
                statuses: statuses.iter().copied().collect(),
                probed: Mutex::default(),
            })
        }

        fn probed(&self) -> Vec<u16> {
            self.probed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RpcTransport for PortTransport {
        async fn post_json(&self, request: RpcRequest) -> Result<RpcResponse, TransportError> {
            assert_eq!(request.scheme, Scheme::Https);
            assert_eq!(request.path, GET_UNLEASH_DATA_PATH);
            self.probed.lock().unwrap().push(request.port);
            match self.statuses.get(&request.port) {
                Some(&status) => Ok(RpcResponse {
                    status,
                    body: b"{}".to_vec(),
                }),
                None => Err(TransportError::Connect("connection refused".to_string())),
            }
        }
    }

    const PS_OUTPUT: &str = "\
  700 /opt/windsurf/bin/language_server_linux_x64 --extension_server_port 41000 --csrf_token aaaa1111 --app_data_dir windsurf
  812 /opt/antigravity/bin/language_server_linux_x64 --extension_server_port 42001 --csrf_token 8d2c61aa-7f55 --app_data_dir antigravity
";

    const LSOF_OUTPUT: &str = "\
language_ 812 me 23u IPv4 0x1 0t0 TCP 127.0.0.1:5678 (LISTEN)
language_ 812 me 24u IPv4 0x2 0t0 TCP 127.0.0.1:1234 (LISTEN)
";

    fn linux_discovery(
        runner: Arc<ScriptedRunner>,
        transport: Arc<PortTransport>,
    ) -> CredentialDiscovery {
        CredentialDiscovery::with_strategy(
            Box::new(UnixStrategy::new(UnixFlavor::Linux)),
            "language_server_linux",
            runner,
            transport,
            Arc::new(ClientInfo::detect()),
        )
    }

    #[tokio::test]
    async fn test_discovers_matching_candidate_and_first_working_port() {
        let runner = ScriptedRunner::new(vec![
            Ok(ProcessOutput::from_stdout(PS_OUTPUT)),
            Ok(ProcessOutput::from_stdout(LSOF_OUTPUT)),
        ]);
        let transport = PortTransport::new(&[(1234, 401), (5678, 200)]);
        let mut discovery = linux_discovery(runner, transport.clone());

        let bundle = discovery.discover(1, Duration::ZERO).await.unwrap();

        assert_eq!(bundle.extension_port, 42001);
        assert_eq!(bundle.connect_port, 5678);
        assert_eq!(bundle.csrf_token, "8d2c61aa-7f55");
        assert_eq!(transport.probed(), vec![1234, 5678]);
    }

    #[tokio::test]
    async fn test_probing_stops_at_first_success() {
        let runner = ScriptedRunner::new(vec![
            Ok(ProcessOutput::from_stdout(PS_OUTPUT)),
            Ok(ProcessOutput::from_stdout(LSOF_OUTPUT)),
        ]);
        let transport = PortTransport::new(&[(1234, 200), (5678, 200)]);
        let mut discovery = linux_discovery(runner, transport.clone());

        let bundle = discovery.discover(1, Duration::ZERO).await.unwrap();

        assert_eq!(bundle.connect_port, 1234);
        assert_eq!(transport.probed(), vec![1234]);
    }

    #[tokio::test]
    async fn test_wmic_unavailable_switches_without_consuming_attempt() {
        let powershell = r#"{"ProcessId": 4412, "CommandLine": "C:\\p\\antigravity\\bin\\language_server_windows_x64.exe --csrf_token abcd-ef01"}"#;
        let netstat = "  TCP    127.0.0.1:2873         0.0.0.0:0              LISTENING       4412\n";
        let runner = ScriptedRunner::new(vec![
            Err(ProcessError::NotFound("wmic.exe".to_string())),
            Ok(ProcessOutput::from_stdout(powershell)),
            Ok(ProcessOutput::from_stdout(netstat)),
        ]);
        let transport = PortTransport::new(&[(2873, 200)]);
        let mut discovery = CredentialDiscovery::with_strategy(
            Box::new(WindowsStrategy::new(WindowsListMode::Wmic)),
            "language_server_windows_x64.exe",
            runner.clone(),
            transport,
            Arc::new(ClientInfo::detect()),
        );

        let bundle = discovery.discover(1, Duration::ZERO).await.unwrap();

        assert_eq!(bundle.connect_port, 2873);
        assert_eq!(bundle.extension_port, 0);
        assert_eq!(bundle.fallback_port(), None);

        let programs = runner.programs();
        assert_eq!(programs.len(), 3);
        assert!(programs[0].to_lowercase().ends_with("wmic.exe"));
        assert!(programs[1].to_lowercase().ends_with("powershell.exe"));
        assert!(programs[2].to_lowercase().ends_with("netstat.exe"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_attempts_without_process() {
        let runner = ScriptedRunner::new(Vec::new());
        let transport = PortTransport::new(&[]);
        let mut discovery = linux_discovery(runner.clone(), transport);

        let started = tokio::time::Instant::now();
        let result = discovery.discover(3, Duration::from_secs(2)).await;

        assert!(matches!(result, Err(DiscoveryError::Exhausted { attempts: 3 })));
        assert_eq!(runner.programs().len(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_no_responsive_port_fails_attempt() {
        let runner = ScriptedRunner::new(vec![
            Ok(ProcessOutput::from_stdout(PS_OUTPUT)),
            Ok(ProcessOutput::from_stdout(LSOF_OUTPUT)),
        ]);
        let transport = PortTransport::new(&[(1234, 500)]);
        let mut discovery = linux_discovery(runner, transport.clone());

        let result = discovery.discover(1, Duration::ZERO).await;

        assert!(matches!(result, Err(DiscoveryError::Exhausted { attempts: 1 })));
        assert_eq!(transport.probed(), vec![1234, 5678]);
    }

    #[tokio::test]
    async fn test_attempt_reports_missing_ports() {
        let runner = ScriptedRunner::new(vec![
            Ok(ProcessOutput::from_stdout(PS_OUTPUT)),
            Ok(ProcessOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 1,
                duration: Duration::ZERO,
            }),
        ]);
        let mut discovery = linux_discovery(runner, PortTransport::new(&[]));

        let err = discovery.attempt().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::NoListeningPorts { pid: 812 }));
    }

    #[tokio::test]
    async fn test_linux_switches_to_ss_when_lsof_missing() {
        let ss = "LISTEN 0 4096 127.0.0.1:42100 0.0.0.0:* users:((\"language_server\",pid=812,fd=9))\n";
        let runner = ScriptedRunner::new(vec![
            Ok(ProcessOutput::from_stdout(PS_OUTPUT)),
            Err(ProcessError::NotFound("lsof".to_string())),
            Ok(ProcessOutput::from_stdout(ss)),
        ]);
        let transport = PortTransport::new(&[(42100, 200)]);
        let mut discovery = linux_discovery(runner.clone(), transport);

        let bundle = discovery.discover(1, Duration::ZERO).await.unwrap();

        assert_eq!(bundle.connect_port, 42100);
        assert_eq!(runner.programs(), vec!["ps", "lsof", "ss"]);
    }

    #[tokio::test]
    async fn test_missing_command_without_alternative() {
        let runner = ScriptedRunner::new(vec![Err(ProcessError::NotFound("ps".to_string()))]);
        let mut discovery = linux_discovery(runner, PortTransport::new(&[]));

        let err = discovery.attempt().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Command(_)));
    }
}
