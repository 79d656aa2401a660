use std::io;
use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::capture::StreamCapture;
use crate::monitor::Monitor;

/// Standard output destinations a policy can guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    /// Open a handle to the underlying process stream.
    pub fn open(self) -> StandardStream {
        match self {
            Self::Stdout => StandardStream::Stdout(io::stdout()),
            Self::Stderr => StandardStream::Stderr(io::stderr()),
        }
    }
}

/// Writer over either process stream.
#[derive(Debug)]
pub enum StandardStream {
    Stdout(io::Stdout),
    Stderr(io::Stderr),
}

impl Write for StandardStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Stdout(out) => out.write(buf),
            Self::Stderr(err) => err.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Stdout(out) => out.flush(),
            Self::Stderr(err) => err.flush(),
        }
    }
}

/// Shared count of bytes written through one or more [`CountingWriter`]s.
#[derive(Debug, Clone, Default)]
pub struct ByteCounter {
    bytes: Arc<AtomicU64>,
}

impl ByteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.bytes.store(0, Ordering::Relaxed);
    }

    fn add(&self, n: usize) {
        self.bytes.fetch_add(n as u64, Ordering::Relaxed);
    }
}

/// Writer spliced in front of another writer, counting every byte that the
/// inner writer accepts. Flushing is not counted.
#[derive(Debug)]
pub struct CountingWriter<W> {
    inner: W,
    counter: ByteCounter,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W, counter: ByteCounter) -> Self {
        Self { inner, counter }
    }

    pub fn counter(&self) -> &ByteCounter {
        &self.counter
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.counter.add(written);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Detects writes to an output stream between `start` and `stop`.
///
/// Writes through a writer obtained from [`writer`] or [`tap`] are always
/// counted. A monitor built with [`capturing`] additionally redirects the
/// process stream into a spool while armed, so writes through
/// `std::io::stdout()`, `eprintln!` and foreign code are seen too; check
/// [`is_capturing`] for which path is active.
///
/// [`writer`]: OutputStreamMonitor::writer
/// [`tap`]: OutputStreamMonitor::tap
/// [`capturing`]: OutputStreamMonitor::capturing
/// [`is_capturing`]: OutputStreamMonitor::is_capturing
#[derive(Debug, Clone)]
pub struct OutputStreamMonitor {
    stream: OutputStream,
    counter: ByteCounter,
    capture: Option<Arc<Mutex<StreamCapture>>>,
}

impl OutputStreamMonitor {
    pub fn new(stream: OutputStream) -> Self {
        Self::with_counter(stream, ByteCounter::new())
    }

    pub fn with_counter(stream: OutputStream, counter: ByteCounter) -> Self {
        Self {
            stream,
            counter,
            capture: None,
        }
    }

    /// Monitor that also captures the process stream. Falls back to counting
    /// harness writers only when the platform cannot redirect the stream.
    pub fn capturing(stream: OutputStream) -> Self {
        let mut monitor = Self::new(stream);
        match StreamCapture::new(stream) {
            Ok(capture) => {
                debug!(?stream, "capturing process stream");
                monitor.capture = Some(Arc::new(Mutex::new(capture)));
            }
            Err(err) => {
                warn!(?stream, %err, "process stream capture unavailable, counting harness writers only");
            }
        }
        monitor
    }

    pub fn stream(&self) -> OutputStream {
        self.stream
    }

    pub fn counter(&self) -> &ByteCounter {
        &self.counter
    }

    /// Whether writes to the process stream itself are detected.
    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    /// Counting writer in front of the guarded process stream.
    pub fn writer(&self) -> CountingWriter<StandardStream> {
        CountingWriter::new(self.stream.open(), self.counter.clone())
    }

    /// Counting writer in front of an arbitrary destination.
    pub fn tap<W: Write>(&self, inner: W) -> CountingWriter<W> {
        CountingWriter::new(inner, self.counter.clone())
    }
}

// No logging below: `start` and `stop` run inside other policies' windows.
impl Monitor for OutputStreamMonitor {
    fn start(&mut self) {
        self.counter.reset();
        if let Some(capture) = &self.capture {
            if let Ok(mut capture) = capture.lock() {
                // Without the redirect only harness writers are counted.
                let _ = capture.start();
            }
        }
    }

    fn stop(&mut self) -> bool {
        let captured = match &self.capture {
            Some(capture) => capture
                .lock()
                .ok()
                .and_then(|mut capture| capture.finish().ok())
                .unwrap_or(0),
            None => 0,
        };
        self.counter.count() > 0 || captured > 0
    }
}
