//! Command-line flag extraction for language-server invocations.

use std::sync::LazyLock;

use regex::Regex;

/// Credentials declared on a language server's command line.
#[derive(Clone, PartialEq, Eq)]
pub struct LaunchCredentials {
    /// `--extension_server_port` value, 0 when absent.
    pub extension_port: u16,
    /// `--csrf_token` value.
    pub csrf_token: String,
}

impl std::fmt::Debug for LaunchCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchCredentials")
            .field("extension_port", &self.extension_port)
            .field(
                "csrf_token",
                &quotawatch_core::models::credentials::mask_token(&self.csrf_token),
            )
            .finish()
    }
}

/// Pattern for `--extension_server_port=N` or `--extension_server_port N`.
static EXTENSION_PORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"--extension_server_port[=\s]+(\d+)").expect("Invalid regex")
});

/// Pattern for the hex/UUID CSRF token.
static CSRF_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)--csrf_token[=\s]+([a-f0-9-]+)").expect("Invalid regex")
});

static APP_DATA_DIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)--app_data_dir[=\s]+antigravity\b").expect("Invalid regex")
});

/// Returns true if the command line belongs to the Antigravity application.
///
/// Matches `--app_data_dir antigravity` or an `antigravity` path segment.
pub fn is_target_command(command_line: &str) -> bool {
    if APP_DATA_DIR_RE.is_match(command_line) {
        return true;
    }
    let lower = command_line.to_lowercase();
    lower.contains("/antigravity/") || lower.contains("\\antigravity\\")
}

/// Extracts the extension port and CSRF token.
///
/// Returns `None` when the token is missing. A missing or unparseable port
/// becomes 0.
pub fn extract_credentials(command_line: &str) -> Option<LaunchCredentials> {
    let csrf_token = CSRF_TOKEN_RE
        .captures(command_line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())?;

    let extension_port = EXTENSION_PORT_RE
        .captures(command_line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);

    Some(LaunchCredentials {
        extension_port,
        csrf_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_flag_equals() {
        let cmd = "/opt/ls --extension_server_port=42001 --csrf_token=ab12-cd34";
        let creds = extract_credentials(cmd).unwrap();
        assert_eq!(creds.extension_port, 42001);
        assert_eq!(creds.csrf_token, "ab12-cd34");
    }

    #[test]
    fn test_extract_flag_space() {
        let cmd = "/opt/ls --extension_server_port 42001 --csrf_token ABCDEF01";
        let creds = extract_credentials(cmd).unwrap();
        assert_eq!(creds.extension_port, 42001);
        assert_eq!(creds.csrf_token, "ABCDEF01");
    }

    #[test]
    fn test_missing_port_defaults_to_zero() {
        let creds = extract_credentials("/opt/ls --csrf_token=deadbeef").unwrap();
        assert_eq!(creds.extension_port, 0);
    }

    #[test]
    fn test_missing_token_is_none() {
        assert!(extract_credentials("/opt/ls --extension_server_port=1").is_none());
    }

    #[test]
    fn test_is_target_command() {
        assert!(is_target_command("ls --app_data_dir antigravity --x"));
        assert!(is_target_command("ls --APP_DATA_DIR=Antigravity"));
        assert!(is_target_command("/Applications/Antigravity.app/Contents/Resources/app/extensions/antigravity/bin/ls"));
        assert!(is_target_command(r"C:\Users\me\AppData\Local\Programs\Antigravity\resources\app\extensions\antigravity\bin\ls.exe"));
        assert!(!is_target_command("ls --app_data_dir windsurf"));
        assert!(!is_target_command("ls --app_data_dir antigravity_next"));
    }

    #[test]
    fn test_debug_masks_token() {
        let creds = extract_credentials("--csrf_token=0123456789abcdef").unwrap();
        assert!(!format!("{creds:?}").contains("89abcdef"));
    }
}
