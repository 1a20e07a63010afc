//! `dap-adapter` binary entry point.
//!
//! Grounded on `src/dap/main.rs`: bind a listener, accept one IDE
//! connection, run the protocol engine against it. Generalized from
//! the teacher's TCP-only bind to the three transport families
//! [`dap_core::transport`] supports.

use std::sync::Arc;

use clap::Parser;

use dap_core::args::Args;
use dap_core::backend::external::ExternalBackend;
use dap_core::backend::inprocess::InProcessBackend;
use dap_core::backend::toy::ToyBackend;
use dap_core::backend::Backend;
use dap_core::dispatch::Dispatcher;
use dap_core::lifecycle::Lifecycle;
use dap_core::logger::DapLogger;
use dap_core::protocol::ProtocolEngine;
use dap_core::session::Session;
use dap_core::transport::{connect, Listener, TransportKind};

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    DapLogger::install(args.log_level).ok();

    let listener = match args.transport.into() {
        dap_core::transport::TransportKind::Tcp | dap_core::transport::TransportKind::Auto => {
            let l = Listener::bind_tcp(&args.host, args.port)?;
            log::info!("listening on tcp {}:{}", args.host, l.bound_port().unwrap_or(args.port));
            l
        }
        dap_core::transport::TransportKind::Unix => {
            log::info!("listening on unix socket {}", args.unix_path);
            Listener::bind_unix(&args.unix_path)?
        }
        dap_core::transport::TransportKind::Pipe => {
            log::info!("listening on named pipe {}", args.pipe_name);
            Listener::bind_pipe(&args.pipe_name)?
        }
    };

    let stream = listener.accept()?;
    listener.close();

    let session = Arc::new(Session::new());
    let backend: Arc<dyn Backend> = build_backend(&args)?;
    let lifecycle = Arc::new(Lifecycle::new("dap-adapter"));
    let dispatcher = Arc::new(Dispatcher::new(session, backend, lifecycle));

    let mut engine = ProtocolEngine::new(stream, dispatcher);
    engine.run()?;
    Ok(())
}

/// Selects the backend this adapter drives (spec §4.8, §4.10): the
/// in-process toy reference interpreter by default, or an
/// [`ExternalBackend`] reached either by spawning a debuggee and
/// accepting its connect-back (`--launch-debuggee`) or by connecting
/// out to one already running (`--attach-target`).
fn build_backend(args: &Args) -> anyhow::Result<Arc<dyn Backend>> {
    if !args.external_backend {
        return Ok(Arc::new(InProcessBackend::new(ToyBackend::new())));
    }

    let ipc_kind: TransportKind = args.ipc_transport.into();
    let timeout = args.command_response_timeout();

    match (&args.launch_debuggee, &args.attach_target) {
        (Some(binary), None) => {
            let listener = match ipc_kind.resolve() {
                TransportKind::Tcp => Listener::bind_tcp(&args.ipc_host, args.ipc_port)?,
                TransportKind::Unix => Listener::bind_unix(&args.ipc_path)?,
                TransportKind::Pipe => Listener::bind_pipe(&args.ipc_pipe_name)?,
                TransportKind::Auto => unreachable!("resolve() never returns Auto"),
            };
            let bound_port = listener.bound_port().unwrap_or(args.ipc_port);
            log::info!("spawning debuggee {binary}, awaiting its connect-back");
            let mut child = dap_core::launcher::spawn(dap_core::launcher::LaunchSpec {
                binary,
                program_args: &args.debuggee_arg,
                ipc_kind,
                host: &args.ipc_host,
                port: bound_port,
                unix_path: &args.ipc_path,
                pipe_name: &args.ipc_pipe_name,
            })?;
            let stream = match listener.accept() {
                Ok(stream) => stream,
                Err(err) => {
                    let _ = child.kill();
                    return Err(err.into());
                }
            };
            listener.close();
            Ok(Arc::new(ExternalBackend::new(stream, timeout)))
        }
        (None, Some(target)) => {
            log::info!("attaching to debuggee at {target}");
            let stream = connect(ipc_kind, target)?;
            Ok(Arc::new(ExternalBackend::new(stream, timeout)))
        }
        (Some(_), Some(_)) => Err(anyhow::anyhow!(
            "--launch-debuggee and --attach-target are mutually exclusive"
        )),
        (None, None) => Err(anyhow::anyhow!(
            "--external-backend requires either --launch-debuggee or --attach-target"
        )),
    }
}
