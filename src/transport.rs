//! Transport endpoints (spec §4.2, §6): TCP, Unix-domain socket, or
//! named pipe, each exposing `start_listening` / `accept` / `connect` /
//! `close` over a unified `DuplexStream`.
//!
//! Grounded on `src/dap/transport.rs`'s `DapTransport` trait and its
//! `StdioTransport`/`TcpTransport` pair, generalized per spec §4.2 to
//! the three socket families and the bind-before-accept / ephemeral
//! port / idempotent-close requirements the teacher's single TCP-only
//! transport didn't need to handle.

use std::io::{BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};

use crate::error::TransportError;

/// One bidirectional, reliable, ordered byte-stream connection.
pub struct DuplexStream {
    reader: BufReader<Box<dyn Read + Send>>,
    writer: Box<dyn Write + Send>,
}

impl DuplexStream {
    pub fn new(reader: impl Read + Send + 'static, writer: impl Write + Send + 'static) -> Self {
        DuplexStream {
            reader: BufReader::new(Box::new(reader)),
            writer: Box::new(writer),
        }
    }

    pub fn reader(&mut self) -> &mut impl std::io::BufRead {
        &mut self.reader
    }

    pub fn writer(&mut self) -> &mut (dyn Write + Send) {
        &mut *self.writer
    }

    /// Splits into independently owned halves so a reader loop can run
    /// on its own thread while the caller keeps writing (spec §4.10
    /// external backend: one thread pumps frames in, callers write
    /// commands out as they're issued).
    pub fn split(self) -> (ReadHalf, WriteHalf) {
        (ReadHalf { inner: self.reader }, WriteHalf { inner: self.writer })
    }
}

pub struct ReadHalf {
    inner: BufReader<Box<dyn Read + Send>>,
}

impl ReadHalf {
    pub fn reader(&mut self) -> &mut impl std::io::BufRead {
        &mut self.inner
    }
}

pub struct WriteHalf {
    inner: Box<dyn Write + Send>,
}

impl WriteHalf {
    pub fn writer(&mut self) -> &mut (dyn Write + Send) {
        &mut *self.inner
    }
}

/// Transport family selector for `launch`/`attach` IPC arguments
/// (spec §6 `ipcTransport`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Auto,
    Tcp,
    Unix,
    Pipe,
}

impl TransportKind {
    /// `auto` resolves to pipe on Windows, Unix elsewhere (spec §4.2).
    pub fn resolve(self) -> TransportKind {
        match self {
            TransportKind::Auto => {
                if cfg!(windows) {
                    TransportKind::Pipe
                } else {
                    TransportKind::Unix
                }
            }
            other => other,
        }
    }
}

/// A not-yet-accepted listener for one of the three socket families.
/// Exactly one peer is accepted per listener (spec §4.2).
pub enum Listener {
    Tcp(TcpListener),
    Unix(UnixListenerHandle),
    Pipe(PipeListenerHandle),
}

pub struct UnixListenerHandle {
    #[cfg(unix)]
    inner: std::os::unix::net::UnixListener,
    path: PathBuf,
}

#[cfg(windows)]
pub struct PipeListenerHandle {
    inner: windows_pipe::PipeListenerImpl,
}

#[cfg(not(windows))]
pub struct PipeListenerHandle;

impl Listener {
    /// Binds a TCP listener. `port == 0` requests an ephemeral port;
    /// the assigned port is immediately observable via
    /// [`Listener::bound_port`] (spec §4.2, testable property #11).
    pub fn bind_tcp(host: &str, port: u16) -> Result<Listener, TransportError> {
        let addr = format!("{host}:{port}");
        let listener = TcpListener::bind(&addr).map_err(|source| TransportError::Bind {
            address: addr,
            source,
        })?;
        Ok(Listener::Tcp(listener))
    }

    /// Binds a Unix-domain socket at `path`. Removes a stale socket
    /// file left over from an unclean prior shutdown before binding.
    #[cfg(unix)]
    pub fn bind_unix(path: impl AsRef<Path>) -> Result<Listener, TransportError> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            let _ = std::fs::remove_file(&path);
        }
        let listener =
            std::os::unix::net::UnixListener::bind(&path).map_err(|source| TransportError::Bind {
                address: path.display().to_string(),
                source,
            })?;
        Ok(Listener::Unix(UnixListenerHandle {
            inner: listener,
            path,
        }))
    }

    #[cfg(not(unix))]
    pub fn bind_unix(_path: impl AsRef<Path>) -> Result<Listener, TransportError> {
        Err(TransportError::Unsupported("unix domain sockets"))
    }

    /// Binds a named pipe `\\.\pipe\<name>` on Windows; unsupported
    /// elsewhere (spec §4.2, §6).
    #[cfg(windows)]
    pub fn bind_pipe(name: &str) -> Result<Listener, TransportError> {
        let inner = windows_pipe::PipeListenerImpl::create(name)?;
        Ok(Listener::Pipe(PipeListenerHandle { inner }))
    }

    #[cfg(not(windows))]
    pub fn bind_pipe(_name: &str) -> Result<Listener, TransportError> {
        Err(TransportError::Unsupported("named pipes require Windows"))
    }

    /// The port a TCP listener is bound to, observable before `accept`
    /// (spec §4.2 "the moment the socket is bound").
    pub fn bound_port(&self) -> Option<u16> {
        match self {
            Listener::Tcp(l) => l.local_addr().ok().map(|a: SocketAddr| a.port()),
            _ => None,
        }
    }

    /// Blocks until exactly one peer connects.
    pub fn accept(&self) -> Result<DuplexStream, TransportError> {
        match self {
            Listener::Tcp(l) => {
                let (stream, _peer) = l.accept()?;
                stream.set_nodelay(true).ok();
                let writer = stream.try_clone()?;
                Ok(DuplexStream::new(stream, writer))
            }
            #[cfg(unix)]
            Listener::Unix(handle) => {
                let (stream, _peer) = handle.inner.accept()?;
                let writer = stream.try_clone()?;
                Ok(DuplexStream::new(stream, writer))
            }
            #[cfg(not(unix))]
            Listener::Unix(_) => unreachable!("unix listener cannot exist on this platform"),
            #[cfg(windows)]
            Listener::Pipe(handle) => handle.inner.accept(),
            #[cfg(not(windows))]
            Listener::Pipe(_) => unreachable!("pipe listener cannot exist on this platform"),
        }
    }

    /// Idempotent close: drops the socket and, for Unix sockets,
    /// unlinks the filesystem path (spec §4.2, §5).
    pub fn close(&self) {
        if let Listener::Unix(handle) = self {
            #[cfg(unix)]
            let _ = std::fs::remove_file(&handle.path);
            #[cfg(not(unix))]
            let _ = &handle.path;
        }
    }
}

/// Connects to a peer previously listening via [`Listener`] — the
/// symmetric half used by an external debuggee (spec §4.2).
pub fn connect(kind: TransportKind, target: &str) -> Result<DuplexStream, TransportError> {
    match kind.resolve() {
        TransportKind::Tcp => {
            let stream = TcpStream::connect(target).map_err(|source| TransportError::Connect {
                address: target.to_string(),
                source,
            })?;
            stream.set_nodelay(true).ok();
            let writer = stream.try_clone()?;
            Ok(DuplexStream::new(stream, writer))
        }
        TransportKind::Unix => {
            #[cfg(unix)]
            {
                let stream = std::os::unix::net::UnixStream::connect(target).map_err(|source| {
                    TransportError::Connect {
                        address: target.to_string(),
                        source,
                    }
                })?;
                let writer = stream.try_clone()?;
                Ok(DuplexStream::new(stream, writer))
            }
            #[cfg(not(unix))]
            Err(TransportError::Unsupported("unix domain sockets"))
        }
        TransportKind::Pipe => {
            #[cfg(windows)]
            {
                windows_pipe::connect(target)
            }
            #[cfg(not(windows))]
            Err(TransportError::Unsupported("named pipes require Windows"))
        }
        TransportKind::Auto => unreachable!("resolve() never returns Auto"),
    }
}

/// Builds the launcher argument vector describing how a spawned
/// debuggee should connect back (spec §4.2, §6).
pub fn launcher_ipc_args(kind: TransportKind, host: &str, port: u16, path: &str, pipe_name: &str, binary: bool) -> Vec<String> {
    let mut args = Vec::new();
    match kind.resolve() {
        TransportKind::Tcp => {
            args.push("--ipc".into());
            args.push("tcp".into());
            args.push("--ipc-host".into());
            args.push(host.into());
            args.push("--ipc-port".into());
            args.push(port.to_string());
        }
        TransportKind::Unix => {
            args.push("--ipc".into());
            args.push("unix".into());
            args.push("--ipc-path".into());
            args.push(path.into());
        }
        TransportKind::Pipe => {
            args.push("--ipc".into());
            args.push("pipe".into());
            args.push("--ipc-pipe".into());
            args.push(pipe_name.into());
        }
        TransportKind::Auto => unreachable!(),
    }
    if binary {
        args.push("--ipc-binary".into());
    }
    args
}

#[cfg(windows)]
mod windows_pipe {
    //! Thin wrapper around the Win32 named pipe API. Untested on this
    //! (Linux) development host by construction; kept minimal and
    //! isolated so the rest of the crate never touches raw FFI.
    use super::*;
    use std::os::windows::io::{FromRawHandle, IntoRawHandle};
    use windows_sys::Win32::Foundation::{CloseHandle, GENERIC_READ, GENERIC_WRITE, INVALID_HANDLE_VALUE};
    use windows_sys::Win32::Storage::FileSystem::{CreateFileW, OPEN_EXISTING};
    use windows_sys::Win32::System::Pipes::{ConnectNamedPipe, CreateNamedPipeW, PIPE_ACCESS_DUPLEX, PIPE_TYPE_BYTE, PIPE_WAIT};

    fn wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    pub struct PipeListenerImpl {
        name: Vec<u16>,
    }

    impl PipeListenerImpl {
        pub fn create(name: &str) -> Result<Self, TransportError> {
            let full = format!(r"\\.\pipe\{name}");
            Ok(PipeListenerImpl { name: wide(&full) })
        }

        pub fn accept(&self) -> Result<DuplexStream, TransportError> {
            unsafe {
                let handle = CreateNamedPipeW(
                    self.name.as_ptr(),
                    PIPE_ACCESS_DUPLEX,
                    PIPE_TYPE_BYTE | PIPE_WAIT,
                    1,
                    4096,
                    4096,
                    0,
                    std::ptr::null(),
                );
                if handle == INVALID_HANDLE_VALUE {
                    return Err(TransportError::Bind {
                        address: "named pipe".into(),
                        source: std::io::Error::last_os_error(),
                    });
                }
                if ConnectNamedPipe(handle, std::ptr::null_mut()) == 0 {
                    let err = std::io::Error::last_os_error();
                    if err.raw_os_error() != Some(535) {
                        CloseHandle(handle);
                        return Err(TransportError::Bind {
                            address: "named pipe".into(),
                            source: err,
                        });
                    }
                }
                let file = std::fs::File::from_raw_handle(handle as _);
                let writer = file.try_clone().map_err(TransportError::Io)?;
                Ok(DuplexStream::new(file, writer))
            }
        }
    }

    pub fn connect(name: &str) -> Result<DuplexStream, TransportError> {
        let full = format!(r"\\.\pipe\{name}");
        let wide_name = wide(&full);
        unsafe {
            let handle = CreateFileW(
                wide_name.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                0,
                std::ptr::null(),
                OPEN_EXISTING,
                0,
                0,
            );
            if handle == INVALID_HANDLE_VALUE {
                return Err(TransportError::Connect {
                    address: full,
                    source: std::io::Error::last_os_error(),
                });
            }
            let file = std::fs::File::from_raw_handle(handle as _);
            let writer = file.try_clone().map_err(TransportError::Io)?;
            Ok(DuplexStream::new(file, writer))
        }
    }

    impl IntoRawHandle for PipeListenerImpl {
        fn into_raw_handle(self) -> std::os::windows::io::RawHandle {
            std::ptr::null_mut()
        }
    }
}
