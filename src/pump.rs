//! Forwards a child's output stream into the log sink.
use std::{
    io::{self, ErrorKind, PipeReader, Read},
    os::fd::{AsFd, BorrowedFd},
    process::{ChildStderr, ChildStdout},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use nix::{
    errno::Errno,
    poll::{PollFd, PollFlags, poll},
};
use tracing::{debug, error, warn};

use crate::constants::{
    PUMP_CHUNK_SIZE, PUMP_DRAIN_MAX_CHUNKS, PUMP_MAX_CONSECUTIVE_ERRORS,
    PUMP_POLL_INTERVAL,
};
use crate::error::PipeError;
use crate::logs::{LogSink, StreamKind};

/// Cancellation token shared by everything that belongs to one process generation.
#[derive(Debug, Clone)]
pub struct GenerationToken {
    generation: u64,
    cancelled: Arc<AtomicBool>,
}

impl GenerationToken {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Sequence number of the launch this token belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Why a pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The write end was closed.
    EndOfStream,
    /// The generation was cancelled and the readable backlog was forwarded.
    Cancelled,
    /// Reads kept failing.
    TooManyErrors,
}

/// A stream a pump can wait on without committing to a blocking read.
pub trait PumpSource: Read {
    /// Waits up to `timeout` until the next read will not block, whether it yields
    /// data, end of stream or an error. Returns `Ok(false)` on timeout.
    fn wait_readable(&self, timeout: Duration) -> io::Result<bool>;
}

fn poll_readable(fd: BorrowedFd<'_>, timeout: Duration) -> io::Result<bool> {
    let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
    match poll(&mut fds, millis) {
        Ok(0) | Err(Errno::EINTR) => Ok(false),
        Ok(_) => Ok(true),
        Err(errno) => Err(errno.into()),
    }
}

impl PumpSource for ChildStdout {
    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        poll_readable(self.as_fd(), timeout)
    }
}

impl PumpSource for ChildStderr {
    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        poll_readable(self.as_fd(), timeout)
    }
}

impl PumpSource for PipeReader {
    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        poll_readable(self.as_fd(), timeout)
    }
}

/// Per-pump read state.
struct Pump<'a> {
    buf: [u8; PUMP_CHUNK_SIZE],
    consecutive_errors: u32,
    stream: StreamKind,
    sink: &'a dyn LogSink,
}

impl Pump<'_> {
    /// Performs one read. Anything read is forwarded before this returns.
    fn step<R: Read>(&mut self, reader: &mut R) -> Option<PumpExit> {
        match reader.read(&mut self.buf) {
            Ok(0) => Some(PumpExit::EndOfStream),
            Ok(n) => {
                self.consecutive_errors = 0;
                let text = String::from_utf8_lossy(&self.buf[..n]);
                self.sink.record(self.stream.level(), self.stream, &text);
                None
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => None,
            Err(source) => self.failed(source),
        }
    }

    fn failed(&mut self, source: io::Error) -> Option<PumpExit> {
        let err = PipeError {
            stream: self.stream.as_static_str(),
            source,
        };
        error!("{err}");
        self.consecutive_errors += 1;
        if self.consecutive_errors >= PUMP_MAX_CONSECUTIVE_ERRORS {
            warn!(
                "Giving up on child {} after {} consecutive read errors",
                self.stream, self.consecutive_errors
            );
            return Some(PumpExit::TooManyErrors);
        }
        None
    }

    /// Forwards whatever is readable right now, then stops.
    fn drain<R: PumpSource>(&mut self, reader: &mut R) -> PumpExit {
        for _ in 0..PUMP_DRAIN_MAX_CHUNKS {
            match reader.wait_readable(Duration::ZERO) {
                Ok(true) => {
                    if let Some(exit) = self.step(reader) {
                        return exit;
                    }
                }
                Ok(false) | Err(_) => break,
            }
        }
        PumpExit::Cancelled
    }
}

/// Copies `reader` into `sink` until end of stream, cancellation, or repeated failure.
///
/// Each successful read becomes exactly one record at the stream's level, decoded as
/// lossy UTF-8. There is no line framing, so a long line may span several records.
/// Reads only happen once the stream is readable, so a cancelled pump notices within
/// [`PUMP_POLL_INTERVAL`] even if the write end stays open. On cancellation the data
/// already buffered in the stream is still forwarded.
pub fn pump_stream<R: PumpSource>(
    mut reader: R,
    stream: StreamKind,
    sink: &dyn LogSink,
    token: &GenerationToken,
) -> PumpExit {
    let mut pump = Pump {
        buf: [0u8; PUMP_CHUNK_SIZE],
        consecutive_errors: 0,
        stream,
        sink,
    };

    loop {
        if token.is_cancelled() {
            return pump.drain(&mut reader);
        }

        let exit = match reader.wait_readable(PUMP_POLL_INTERVAL) {
            Ok(false) => None,
            Ok(true) => pump.step(&mut reader),
            Err(source) => pump.failed(source),
        };
        if let Some(exit) = exit {
            return exit;
        }
    }
}

/// Runs [`pump_stream`] on a dedicated thread.
pub fn spawn_pump<R>(
    reader: R,
    stream: StreamKind,
    sink: Arc<dyn LogSink>,
    token: GenerationToken,
) -> io::Result<thread::JoinHandle<PumpExit>>
where
    R: PumpSource + Send + 'static,
{
    thread::Builder::new()
        .name(format!("pump-{stream}-{}", token.generation()))
        .spawn(move || {
            let exit = pump_stream(reader, stream, sink.as_ref(), &token);
            debug!(
                "Pump for child {stream} (generation {}) finished: {exit:?}",
                token.generation()
            );
            exit
        })
}
