//! Process-level capture of the standard streams.
//!
//! While a [`StreamCapture`] is active, file descriptor 1 or 2 points at a
//! spool file created up front, so every write to the stream lands there no
//! matter which handle made it (`std::io::stdout()`, `println!` outside the
//! libtest capture, C code, child processes). Finishing the capture measures
//! the spool, points the descriptor back at the original stream and forwards
//! the captured bytes to it.
//!
//! The descriptor table is process-wide: only one capture per stream can be
//! active at a time, and writes from other threads during the window are
//! attributed to it. Start and finish perform no heap allocation once the
//! capture is constructed.

use std::fs::File;
use std::io;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use crate::output::OutputStream;

static STDOUT_CAPTURED: AtomicBool = AtomicBool::new(false);
static STDERR_CAPTURED: AtomicBool = AtomicBool::new(false);

fn claim(stream: OutputStream) -> &'static AtomicBool {
    match stream {
        OutputStream::Stdout => &STDOUT_CAPTURED,
        OutputStream::Stderr => &STDERR_CAPTURED,
    }
}

fn flush(stream: OutputStream) {
    // Best effort: a failing stream fails the next write too.
    let _ = stream.open().flush();
}

/// Redirection of one standard stream into a spool file.
#[derive(Debug)]
pub struct StreamCapture {
    stream: OutputStream,
    spool: File,
    saved: Option<sys::SavedFd>,
}

impl StreamCapture {
    /// Prepare a capture. Fails where descriptor redirection is unsupported
    /// or the spool file cannot be created.
    pub fn new(stream: OutputStream) -> io::Result<Self> {
        sys::check_supported()?;
        let spool = tempfile::tempfile()?;
        // Initialise the std stream buffers outside any detection window.
        flush(stream);
        Ok(Self {
            stream,
            spool,
            saved: None,
        })
    }

    pub fn stream(&self) -> OutputStream {
        self.stream
    }

    pub fn is_active(&self) -> bool {
        self.saved.is_some()
    }

    /// Point the process stream at an empty spool. Returns false, leaving the
    /// stream untouched, when another capture already holds it.
    pub fn start(&mut self) -> io::Result<bool> {
        if self.is_active() {
            flush(self.stream);
            self.rewind()?;
            return Ok(true);
        }
        let claimed = claim(self.stream);
        if claimed.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        flush(self.stream);
        let redirected = self
            .rewind()
            .and_then(|()| sys::redirect(self.stream, &self.spool));
        match redirected {
            Ok(saved) => {
                self.saved = Some(saved);
                Ok(true)
            }
            Err(err) => {
                claimed.store(false, Ordering::Release);
                Err(err)
            }
        }
    }

    /// Restore the process stream and forward what was captured. Returns the
    /// number of bytes written to the stream since `start`; zero when the
    /// capture was not active.
    pub fn finish(&mut self) -> io::Result<u64> {
        let Some(saved) = self.saved.take() else {
            return Ok(0);
        };
        flush(self.stream);
        let captured = self.spool.stream_position();
        let restored = sys::restore(self.stream, saved);
        claim(self.stream).store(false, Ordering::Release);
        restored?;
        let captured = captured?;
        self.forward()?;
        Ok(captured)
    }

    fn rewind(&mut self) -> io::Result<()> {
        self.spool.set_len(0)?;
        self.spool.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    fn forward(&mut self) -> io::Result<()> {
        self.spool.seek(SeekFrom::Start(0))?;
        let mut out = self.stream.open();
        let mut buf = [0u8; 4096];
        loop {
            let n = self.spool.read(&mut buf)?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n])?;
        }
        out.flush()
    }
}

impl Drop for StreamCapture {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

#[cfg(unix)]
mod sys {
    use std::fs::File;
    use std::io;
    use std::os::fd::AsRawFd;
    use std::os::fd::FromRawFd;
    use std::os::fd::OwnedFd;
    use std::os::fd::RawFd;

    use crate::output::OutputStream;

    pub(super) type SavedFd = OwnedFd;

    fn target(stream: OutputStream) -> RawFd {
        match stream {
            OutputStream::Stdout => libc::STDOUT_FILENO,
            OutputStream::Stderr => libc::STDERR_FILENO,
        }
    }

    pub(super) fn check_supported() -> io::Result<()> {
        Ok(())
    }

    /// Duplicate the stream's descriptor, then make the stream refer to `spool`.
    pub(super) fn redirect(stream: OutputStream, spool: &File) -> io::Result<OwnedFd> {
        let fd = target(stream);
        // SAFETY: `dup` has no memory-safety preconditions; the result is
        // checked before ownership is taken.
        let saved = unsafe { libc::dup(fd) };
        if saved < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `saved` is a freshly duplicated descriptor owned by nobody else.
        let saved = unsafe { OwnedFd::from_raw_fd(saved) };
        // SAFETY: both descriptors are open for the duration of the call.
        if unsafe { libc::dup2(spool.as_raw_fd(), fd) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(saved)
    }

    pub(super) fn restore(stream: OutputStream, saved: OwnedFd) -> io::Result<()> {
        // SAFETY: `saved` stays open until dropped at the end of this function.
        if unsafe { libc::dup2(saved.as_raw_fd(), target(stream)) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(not(unix))]
mod sys {
    use std::fs::File;
    use std::io;

    use crate::output::OutputStream;

    #[derive(Debug)]
    pub(super) enum SavedFd {}

    pub(super) fn check_supported() -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "stream redirection requires unix file descriptors",
        ))
    }

    pub(super) fn redirect(_stream: OutputStream, _spool: &File) -> io::Result<SavedFd> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    pub(super) fn restore(_stream: OutputStream, saved: SavedFd) -> io::Result<()> {
        match saved {}
    }
}
