//! Remote executor over the system `ssh` client
//!
//! Commands run through `sshpass -e ssh ...`; the password reaches
//! `sshpass` through the child's `SSHPASS` variable, never through argv.
//! Connections are multiplexed so one authenticated session serves the
//! whole run. The control socket lives in a private directory created
//! for the session and removed with it.

use crate::config::Credentials;
use anyhow::{Context, Result, bail};
use declarative::{CommandOutput, Error as EngineError, RemoteExecutor};
use std::borrow::Cow;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tempfile::TempDir;

/// Local helper that feeds the password to ssh
pub const SSHPASS: &str = "sshpass";

/// The ssh client, used directly for control-socket operations
const SSH: &str = "ssh";

/// Socket name inside the session's private directory
const CONTROL_SOCKET: &str = "mux";

/// Seconds to wait for the TCP/SSH handshake
pub const CONNECT_TIMEOUT_SECS: u32 = 10;

/// Exit status ssh uses for its own errors
const SSH_ERROR_STATUS: i32 = 255;

const REDACTED: &str = "***";

// ============================================================================
// Command Builder
// ============================================================================

/// Assembles the `sshpass` argument vector for a remote command
#[derive(Debug, Clone)]
pub struct SshCommand {
    host: String,
    user: String,
    port: u16,
    control_path: Option<PathBuf>,
}

impl SshCommand {
    pub fn new(host: &str, user: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            user: user.to_string(),
            port,
            control_path: None,
        }
    }

    /// Share one master connection through a control socket
    pub fn multiplex(mut self, control_path: PathBuf) -> Self {
        self.control_path = Some(control_path);
        self
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Arguments passed to `sshpass` to run `remote` on the host
    pub fn args(&self, remote: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-e".into(),
            "ssh".into(),
            "-p".into(),
            self.port.to_string().into(),
            "-o".into(),
            "StrictHostKeyChecking=accept-new".into(),
            "-o".into(),
            format!("ConnectTimeout={CONNECT_TIMEOUT_SECS}").into(),
            "-o".into(),
            "NumberOfPasswordPrompts=1".into(),
            "-o".into(),
            "LogLevel=ERROR".into(),
        ];
        if let Some(path) = &self.control_path {
            let mut control = OsString::from("ControlPath=");
            control.push(path);
            args.extend([
                "-o".into(),
                "ControlMaster=auto".into(),
                "-o".into(),
                control,
                "-o".into(),
                "ControlPersist=60".into(),
            ]);
        }
        args.push(self.destination().into());
        args.push("--".into());
        args.push(remote.into());
        args
    }

    /// Arguments passed to `ssh` for a control request (`check`, `exit`)
    /// against the master; `None` without multiplexing
    pub fn control_args(&self, request: &str) -> Option<Vec<OsString>> {
        let path = self.control_path.as_ref()?;
        let mut control = OsString::from("ControlPath=");
        control.push(path);
        Some(vec![
            "-p".into(),
            self.port.to_string().into(),
            "-o".into(),
            control,
            "-O".into(),
            request.into(),
            self.destination().into(),
        ])
    }
}

// ============================================================================
// Exit Status
// ============================================================================

/// How a finished ssh invocation is read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The remote command ran and exited with this status
    Remote(i32),
    /// ssh itself failed; the command may never have reached the host
    Transport,
}

/// Classify an exit status.
///
/// ssh reports its own errors as 255, which a remote command can also
/// return. `channel_alive` is consulted only for 255: a live channel means
/// the status came from the command.
pub fn classify(status: i32, channel_alive: impl FnOnce() -> bool) -> Exit {
    if status == SSH_ERROR_STATUS && !channel_alive() {
        Exit::Transport
    } else {
        Exit::Remote(status)
    }
}

// ============================================================================
// Session
// ============================================================================

/// An authenticated channel to the managed host
pub struct SshSession {
    command: SshCommand,
    password: String,
    /// Owner-only directory holding the control socket
    _control_dir: TempDir,
}

impl SshSession {
    /// Open a session and prove it works by running a no-op command
    pub fn connect(creds: &Credentials) -> Result<Self> {
        if !command_exists(SSHPASS) {
            bail!("{SSHPASS} is required to authenticate with a password but was not found in PATH");
        }

        let control_dir = tempfile::Builder::new()
            .prefix("viki-")
            .tempdir()
            .context("Failed to create a private directory for the ssh control socket")?;
        let control_path = control_dir.path().join(CONTROL_SOCKET);
        let mut session = Self {
            command: SshCommand::new(&creds.hostname, &creds.username, creds.port)
                .multiplex(control_path),
            password: creds.password.clone(),
            _control_dir: control_dir,
        };

        log::info!(
            component = "ssh", op = "connect";
            "Connecting to {}:{}", session.command.destination(), creds.port
        );
        match session.run("true", None) {
            Ok(out) if out.success() => {
                log::debug!(component = "ssh", op = "connect"; "Connection established");
                Ok(session)
            }
            Ok(out) => bail!(
                "SSH connection failed: {} exited with status {}: {}",
                session.command.destination(),
                out.status,
                out.output.trim()
            ),
            Err(e) => bail!("SSH connection failed: {e}"),
        }
    }

    /// Send a control request to the master connection
    fn control(&self, request: &str) -> bool {
        let Some(args) = self.command.control_args(request) else {
            return false;
        };
        Command::new(SSH)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        // Stop the master before its socket directory is removed
        if self.control("exit") {
            log::debug!(component = "ssh", op = "close"; "Master connection closed");
        }
    }
}

impl RemoteExecutor for SshSession {
    fn run(&mut self, command: &str, secret: Option<&str>) -> declarative::Result<CommandOutput> {
        let shown = redact(command, secret);
        log::debug!(component = "ssh", op = "run"; "{shown}");

        let output = Command::new(SSHPASS)
            .args(self.command.args(command))
            .env("SSHPASS", &self.password)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| EngineError::Executor(format!("failed to start {SSHPASS}: {e}")))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        let text = redact(&text, secret).into_owned();

        // Killed by a signal
        let status = output.status.code().unwrap_or(-1);
        match classify(status, || self.control("check")) {
            Exit::Remote(status) => {
                log::trace!(component = "ssh", op = "run"; "status {status}");
                Ok(CommandOutput::new(status, text))
            }
            Exit::Transport => Err(EngineError::Executor(format!(
                "ssh transport error while running `{shown}`: {}",
                text.trim()
            ))),
        }
    }
}

/// Replace every occurrence of a non-empty secret with `***`
pub fn redact<'a>(text: &'a str, secret: Option<&str>) -> Cow<'a, str> {
    match secret {
        Some(secret) if !secret.is_empty() && text.contains(secret) => {
            Cow::Owned(text.replace(secret, REDACTED))
        }
        _ => Cow::Borrowed(text),
    }
}

/// Check if a command exists locally
fn command_exists(cmd: &str) -> bool {
    Command::new("which")
        .arg(cmd)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_args_layout() {
        let args = strings(SshCommand::new("10.0.0.5", "deploy", 2222).args("ls ~"));

        assert_eq!(&args[..4], ["-e", "ssh", "-p", "2222"]);
        assert!(args.contains(&"ConnectTimeout=10".to_string()));
        assert!(args.contains(&"StrictHostKeyChecking=accept-new".to_string()));
        assert_eq!(&args[args.len() - 3..], ["deploy@10.0.0.5", "--", "ls ~"]);
        assert!(!args.iter().any(|a| a.starts_with("ControlPath")));
    }

    #[test]
    fn test_remote_command_is_one_argument() {
        let cmd = "echo pw | sudo -S docker ps";
        let args = strings(SshCommand::new("h", "u", 22).args(cmd));
        assert_eq!(args.last().map(String::as_str), Some(cmd));
    }

    #[test]
    fn test_multiplex() {
        let args = strings(
            SshCommand::new("h", "u", 22)
                .multiplex(PathBuf::from("/tmp/viki.sock"))
                .args("true"),
        );
        assert!(args.contains(&"ControlMaster=auto".to_string()));
        assert!(args.contains(&"ControlPath=/tmp/viki.sock".to_string()));
    }

    #[test]
    fn test_password_comes_from_environment() {
        let args = strings(SshCommand::new("h", "u", 22).args("true"));
        // sshpass -e reads SSHPASS; no -p <password> pair is emitted
        assert_eq!(args[0], "-e");
        assert!(!args.iter().any(|a| a == "-P" || a.starts_with("-f")));
    }

    #[test]
    fn test_control_args() {
        assert!(SshCommand::new("h", "u", 22).control_args("check").is_none());

        let args = strings(
            SshCommand::new("h", "u", 2222)
                .multiplex(PathBuf::from("/tmp/viki-x/mux"))
                .control_args("check")
                .unwrap(),
        );
        assert_eq!(
            args,
            ["-p", "2222", "-o", "ControlPath=/tmp/viki-x/mux", "-O", "check", "u@h"]
        );
    }

    #[test]
    fn test_classify_plain_statuses_skip_channel_check() {
        let unreachable = || -> bool { panic!("channel checked for an ordinary status") };
        assert_eq!(classify(0, unreachable), Exit::Remote(0));
        assert_eq!(classify(1, unreachable), Exit::Remote(1));
        assert_eq!(classify(-1, unreachable), Exit::Remote(-1));
    }

    #[test]
    fn test_classify_255() {
        // Command exited 255 on a healthy connection
        assert_eq!(classify(255, || true), Exit::Remote(255));
        // Connection is gone
        assert_eq!(classify(255, || false), Exit::Transport);
    }

    #[test]
    fn test_control_dir_is_private() {
        let dir = tempfile::Builder::new().prefix("viki-").tempdir().unwrap();
        assert!(dir.path().join(CONTROL_SOCKET).starts_with(std::env::temp_dir()));
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(dir.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o077, 0);
        }
    }

    #[test]
    fn test_redact() {
        assert_eq!(
            redact("echo s3cret | sudo -S ls", Some("s3cret")),
            "echo *** | sudo -S ls"
        );
        assert_eq!(redact("ls", Some("")), "ls");
        assert_eq!(redact("ls", None), "ls");
        assert!(matches!(redact("ls", Some("pw")), Cow::Borrowed(_)));
    }
}
