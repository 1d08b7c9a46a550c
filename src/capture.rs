//! Non-blocking capture of child process output
//!
//! A background thread drains one stream of the child into a shared
//! buffer. The supervisor's poll loop then inspects whatever has been
//! buffered so far without ever issuing a read of its own, so a slow or
//! silent child can never stall a poll tick.

use std::io::Read;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Upper bound on captured bytes per stream. Startup banners and
/// diagnostics fit comfortably; a chatty child cannot grow the buffer
/// without bound. The reader keeps draining past the cap so the child
/// never blocks on a full pipe.
const CAPTURE_CAP: usize = 1 << 20;

/// Accumulates one output stream of a child process.
pub struct StreamCapture {
    buf: Arc<Mutex<Vec<u8>>>,
    reader: Option<JoinHandle<()>>,
}

impl StreamCapture {
    /// Start draining `stream` on a background thread. The thread exits
    /// when the stream reaches EOF, which happens once the child is
    /// reaped and the pipe closes.
    pub fn attach<R>(stream: R) -> Self
    where
        R: Read + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let reader = thread::spawn(move || {
            let mut stream = stream;
            let mut chunk = [0u8; 4096];
            loop {
                match stream.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let mut buf = sink.lock().unwrap_or_else(|e| e.into_inner());
                        let room = CAPTURE_CAP.saturating_sub(buf.len());
                        buf.extend_from_slice(&chunk[..n.min(room)]);
                    }
                }
            }
        });

        Self {
            buf,
            reader: Some(reader),
        }
    }

    /// Snapshot of the bytes buffered so far, lossily decoded. Returns
    /// immediately regardless of what the child is doing.
    pub fn contents(&self) -> String {
        let buf = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl Drop for StreamCapture {
    fn drop(&mut self) {
        // The reader exits on EOF once the child is reaped. Join only if
        // it already has; teardown must not block on a pipe that some
        // orphaned grandchild still holds open.
        if let Some(handle) = self.reader.take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}
