//! Adapter CLI arguments (spec §6).
//!
//! Grounded on the teacher's `src/dap/main.rs` clap usage (`--port`,
//! `--debugee` style flags for its own TCP-only DAP front end),
//! generalized to the three transport families and the launcher IPC
//! flags [`crate::transport::launcher_ipc_args`] emits for a spawned
//! debuggee to parse back.

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum TransportArg {
    Auto,
    Tcp,
    Unix,
    Pipe,
}

impl From<TransportArg> for crate::transport::TransportKind {
    fn from(value: TransportArg) -> Self {
        match value {
            TransportArg::Auto => crate::transport::TransportKind::Auto,
            TransportArg::Tcp => crate::transport::TransportKind::Tcp,
            TransportArg::Unix => crate::transport::TransportKind::Unix,
            TransportArg::Pipe => crate::transport::TransportKind::Pipe,
        }
    }
}

/// CLI surface for the `dap-adapter` binary (spec §6).
#[derive(Debug, Parser)]
#[command(name = "dap-adapter", about = "Debug Adapter Protocol server core")]
pub struct Args {
    /// Transport family for the IDE<->adapter leg.
    #[arg(long, value_enum, default_value = "tcp", env = "DAP_TRANSPORT")]
    pub transport: TransportArg,

    #[arg(long, default_value = "127.0.0.1", env = "DAP_HOST")]
    pub host: String,

    /// 0 requests an ephemeral port (spec §4.2).
    #[arg(long, default_value_t = 0, env = "DAP_PORT")]
    pub port: u16,

    #[arg(long, default_value = "/tmp/dap-adapter.sock", env = "DAP_UNIX_PATH")]
    pub unix_path: String,

    #[arg(long, default_value = "dap-adapter", env = "DAP_PIPE_NAME")]
    pub pipe_name: String,

    /// Transport family for the adapter<->debuggee leg, when launching
    /// an external backend instead of the in-process toy reference one.
    #[arg(long, value_enum, default_value = "auto", env = "DAP_IPC_TRANSPORT")]
    pub ipc_transport: TransportArg,

    #[arg(long, default_value_t = false)]
    pub external_backend: bool,

    /// Host for the adapter<->debuggee IPC leg, used both to bind the
    /// connect-back listener for `--launch-debuggee` and as the target
    /// `tcp` address for `--attach-target` (spec §6 `ipcHost`).
    #[arg(long, default_value = "127.0.0.1", env = "DAP_IPC_HOST")]
    pub ipc_host: String,

    /// 0 requests an ephemeral port when binding the connect-back
    /// listener (spec §4.2, §6 `ipcPort`).
    #[arg(long, default_value_t = 0, env = "DAP_IPC_PORT")]
    pub ipc_port: u16,

    #[arg(long, default_value = "/tmp/dap-adapter-ipc.sock", env = "DAP_IPC_PATH")]
    pub ipc_path: String,

    #[arg(long, default_value = "dap-adapter-ipc", env = "DAP_IPC_PIPE_NAME")]
    pub ipc_pipe_name: String,

    /// With `--external-backend`: the debuggee binary to spawn. The
    /// adapter binds the IPC listener first, spawns this binary with
    /// the connect-back flags [`crate::transport::launcher_ipc_args`]
    /// builds, then accepts its connection (spec §6 launcher CLI).
    /// Mutually exclusive with `--attach-target`.
    #[arg(long)]
    pub launch_debuggee: Option<String>,

    /// Extra arguments appended after the IPC connect-back flags when
    /// spawning `--launch-debuggee`.
    #[arg(long)]
    pub debuggee_arg: Vec<String>,

    /// With `--external-backend`: an already-running debuggee's IPC
    /// endpoint to connect to directly (`host:port` for `tcp`, a
    /// filesystem path for `unix`, a pipe name for `pipe`). Mutually
    /// exclusive with `--launch-debuggee`.
    #[arg(long)]
    pub attach_target: Option<String>,

    #[arg(long, default_value = "info", env = "DAP_LOG_LEVEL")]
    pub log_level: log::Level,

    /// Raw value for the correlator's per-command response timeout
    /// (spec §6 `DAPPER_COMMAND_RESPONSE_TIMEOUT_SECONDS`). Kept as a
    /// string rather than `f64` because the spec requires a missing,
    /// empty, non-numeric, zero, or negative value to silently disable
    /// the timeout rather than fail CLI parsing — see
    /// [`Args::command_response_timeout`].
    #[arg(long = "command-response-timeout-seconds", env = "DAPPER_COMMAND_RESPONSE_TIMEOUT_SECONDS")]
    pub command_response_timeout_seconds: Option<String>,
}

impl Args {
    /// Resolves the raw `command_response_timeout_seconds` value into a
    /// timeout, applying spec §6's disable rules: absent, empty,
    /// non-numeric, zero, or negative all mean "no timeout".
    pub fn command_response_timeout(&self) -> Option<std::time::Duration> {
        let seconds: f64 = self.command_response_timeout_seconds.as_deref()?.trim().parse().ok()?;
        if seconds > 0.0 {
            Some(std::time::Duration::from_secs_f64(seconds))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_with_timeout(raw: Option<&str>) -> Args {
        Args {
            transport: TransportArg::Tcp,
            host: "127.0.0.1".into(),
            port: 0,
            unix_path: String::new(),
            pipe_name: String::new(),
            ipc_transport: TransportArg::Auto,
            external_backend: false,
            ipc_host: "127.0.0.1".into(),
            ipc_port: 0,
            ipc_path: String::new(),
            ipc_pipe_name: String::new(),
            launch_debuggee: None,
            debuggee_arg: Vec::new(),
            attach_target: None,
            log_level: log::Level::Info,
            command_response_timeout_seconds: raw.map(str::to_string),
        }
    }

    #[test]
    fn absent_timeout_is_unlimited() {
        assert_eq!(args_with_timeout(None).command_response_timeout(), None);
    }

    #[test]
    fn empty_or_non_numeric_timeout_is_unlimited() {
        assert_eq!(args_with_timeout(Some("")).command_response_timeout(), None);
        assert_eq!(args_with_timeout(Some("not-a-number")).command_response_timeout(), None);
    }

    #[test]
    fn zero_or_negative_timeout_is_unlimited() {
        assert_eq!(args_with_timeout(Some("0")).command_response_timeout(), None);
        assert_eq!(args_with_timeout(Some("-5")).command_response_timeout(), None);
    }

    #[test]
    fn positive_timeout_is_honored() {
        assert_eq!(
            args_with_timeout(Some("2.5")).command_response_timeout(),
            Some(std::time::Duration::from_secs_f64(2.5))
        );
    }
}
