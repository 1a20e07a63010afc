//! Spawns an external debuggee process and tells it how to connect
//! back over IPC (spec §6).
//!
//! Grounded on `src/debugger/process.rs`'s `Installer`/child-spawning
//! logic (there: exec the debuggee under ptrace; here: exec it plainly
//! and hand it the IPC flags [`crate::transport::launcher_ipc_args`]
//! builds, since this core's external backend talks to its debuggee
//! over a socket rather than tracing it).

use std::process::{Child, Command};

use crate::transport::{launcher_ipc_args, TransportKind};

pub struct LaunchSpec<'a> {
    pub binary: &'a str,
    pub program_args: &'a [String],
    pub ipc_kind: TransportKind,
    pub host: &'a str,
    pub port: u16,
    pub unix_path: &'a str,
    pub pipe_name: &'a str,
}

/// Spawns `binary`, appending the IPC connect-back flags ahead of the
/// debuggee's own program arguments.
pub fn spawn(spec: LaunchSpec<'_>) -> std::io::Result<Child> {
    let ipc_args = launcher_ipc_args(
        spec.ipc_kind,
        spec.host,
        spec.port,
        spec.unix_path,
        spec.pipe_name,
        true,
    );
    Command::new(spec.binary)
        .args(&ipc_args)
        .args(spec.program_args)
        .spawn()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_passes_tcp_connect_back_flags_ahead_of_program_args() {
        let program_args = vec!["--child-flag".to_string()];
        let spec = LaunchSpec {
            binary: "true",
            program_args: &program_args,
            ipc_kind: TransportKind::Tcp,
            host: "127.0.0.1",
            port: 4000,
            unix_path: "/tmp/unused.sock",
            pipe_name: "unused",
        };
        let mut child = spawn(spec).expect("spawning `true` should succeed");
        let status = child.wait().expect("waiting on the child should succeed");
        assert!(status.success());
    }

    #[test]
    fn spawn_fails_cleanly_for_a_missing_binary() {
        let spec = LaunchSpec {
            binary: "definitely-not-a-real-binary-on-this-system",
            program_args: &[],
            ipc_kind: TransportKind::Unix,
            host: "127.0.0.1",
            port: 0,
            unix_path: "/tmp/unused.sock",
            pipe_name: "unused",
        };
        assert!(spawn(spec).is_err());
    }
}
