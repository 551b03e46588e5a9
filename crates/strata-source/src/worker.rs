// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Worker-marshalled byte source for thread-affine transports.
//!
//! Live backends (process attach, debug-server RPC) often must only be
//! touched from the thread that created them. [`WorkerSource`] owns one
//! dedicated thread that builds the transport and then serves a request
//! queue; callers push a request and block on its reply. Every transport
//! call therefore happens on the same thread, one at a time, no matter how
//! many threads read through the source.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::{ByteSource, SourceError};

/// Static facts a transport reports once it is connected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportInfo {
    /// Display name (process or target name).
    pub name: String,
    /// Backend family label ("Process", "Remote", ...).
    pub kind: String,
    /// Whether bytes may change underneath the reader.
    pub live: bool,
    /// Whether writes are supported at all.
    pub writable: bool,
    /// Initial rebasing address.
    pub base: u64,
}

/// A thread-affine memory backend driven by a [`WorkerSource`].
///
/// Implementations are constructed on the worker thread and never leave it,
/// so they need not be `Send`.
pub trait MemoryTransport: 'static {
    /// Connection facts, queried once after construction.
    fn info(&self) -> TransportInfo;
    /// Current addressable size.
    fn size(&mut self) -> u64;
    /// Fills `buf` from `addr`; `false` if any byte is unavailable.
    fn read(&mut self, addr: u64, buf: &mut [u8]) -> bool;
    /// Writes all of `data` or nothing.
    fn write(&mut self, _addr: u64, _data: &[u8]) -> bool {
        false
    }
    /// Symbol covering `addr`, if known.
    fn symbol(&mut self, _addr: u64) -> Option<String> {
        None
    }
}

enum Request {
    Size(Sender<u64>),
    Read {
        addr: u64,
        len: usize,
        reply: Sender<Option<Vec<u8>>>,
    },
    Write {
        addr: u64,
        data: Vec<u8>,
        reply: Sender<bool>,
    },
    Symbol {
        addr: u64,
        reply: Sender<Option<String>>,
    },
    Shutdown,
}

/// [`ByteSource`] that forwards every call to a dedicated worker thread.
pub struct WorkerSource {
    tx: Sender<Request>,
    info: TransportInfo,
    base: AtomicU64,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for WorkerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerSource")
            .field("info", &self.info)
            .field("base", &self.base.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl WorkerSource {
    /// Starts the worker thread and builds the transport on it.
    ///
    /// `connect` runs on the worker; its error message is surfaced as
    /// [`SourceError::Connect`] and the thread exits.
    pub fn spawn<T, F>(connect: F) -> Result<Self, SourceError>
    where
        T: MemoryTransport,
        F: FnOnce() -> Result<T, String> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Request>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<TransportInfo, String>>();
        let handle = std::thread::Builder::new()
            .name("strata-source-worker".into())
            .spawn(move || {
                let transport = match connect() {
                    Ok(t) => t,
                    Err(msg) => {
                        let _ = ready_tx.send(Err(msg));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(transport.info()));
                serve(transport, &rx);
            })?;

        match ready_rx.recv() {
            Ok(Ok(info)) => {
                debug!(name = %info.name, kind = %info.kind, "source worker started");
                Ok(Self {
                    tx,
                    base: AtomicU64::new(info.base),
                    info,
                    handle: Some(handle),
                })
            }
            Ok(Err(msg)) => {
                warn!(%msg, "source transport refused to connect");
                let _ = handle.join();
                Err(SourceError::Connect(msg))
            }
            Err(_) => {
                let _ = handle.join();
                Err(SourceError::WorkerGone)
            }
        }
    }

    /// Connection facts reported at startup.
    pub fn info(&self) -> &TransportInfo {
        &self.info
    }

    fn call<R>(&self, make: impl FnOnce(Sender<R>) -> Request) -> Option<R> {
        let (reply_tx, reply_rx) = mpsc::channel();
        if self.tx.send(make(reply_tx)).is_err() {
            warn!("source worker is gone");
            return None;
        }
        reply_rx.recv().ok()
    }
}

fn serve<T: MemoryTransport>(mut transport: T, rx: &Receiver<Request>) {
    while let Ok(req) = rx.recv() {
        match req {
            Request::Size(reply) => {
                let _ = reply.send(transport.size());
            }
            Request::Read { addr, len, reply } => {
                let mut buf = vec![0u8; len];
                let out = transport.read(addr, &mut buf).then_some(buf);
                let _ = reply.send(out);
            }
            Request::Write { addr, data, reply } => {
                let ok = transport.write(addr, &data);
                if !ok {
                    warn!(addr, len = data.len(), "transport refused write");
                }
                let _ = reply.send(ok);
            }
            Request::Symbol { addr, reply } => {
                let _ = reply.send(transport.symbol(addr));
            }
            Request::Shutdown => break,
        }
    }
    debug!("source worker stopped");
}

impl ByteSource for WorkerSource {
    fn size(&self) -> u64 {
        self.call(Request::Size).unwrap_or(0)
    }

    fn read(&self, addr: u64, buf: &mut [u8]) -> bool {
        if buf.is_empty() {
            return true;
        }
        let len = buf.len();
        match self.call(|reply| Request::Read { addr, len, reply }) {
            Some(Some(bytes)) if bytes.len() == len => {
                buf.copy_from_slice(&bytes);
                true
            }
            _ => false,
        }
    }

    fn is_writable(&self) -> bool {
        self.info.writable
    }

    fn write(&self, addr: u64, data: &[u8]) -> bool {
        if !self.info.writable {
            return false;
        }
        if data.is_empty() {
            return true;
        }
        let data = data.to_vec();
        self.call(|reply| Request::Write { addr, data, reply })
            .unwrap_or(false)
    }

    fn name(&self) -> String {
        self.info.name.clone()
    }

    fn kind(&self) -> String {
        self.info.kind.clone()
    }

    fn is_live(&self) -> bool {
        self.info.live
    }

    fn base(&self) -> u64 {
        self.base.load(Ordering::Acquire)
    }

    fn set_base(&self, base: u64) {
        self.base.store(base, Ordering::Release);
    }

    fn symbol_at(&self, addr: u64) -> Option<String> {
        self.call(|reply| Request::Symbol { addr, reply }).flatten()
    }
}

impl Drop for WorkerSource {
    fn drop(&mut self) {
        let _ = self.tx.send(Request::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("source worker panicked");
            }
        }
    }
}
