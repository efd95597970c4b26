//! In-memory pty and consumer doubles shared by the unit tests.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::consumer::SessionConsumer;
use crate::error::PtyError;
use crate::size::WindowSize;
use crate::spawner::{ChildControl, PtySpawner, SpawnRequest, SpawnedChild};

/// Poll `cond` until it holds or three seconds pass.
pub(crate) fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        if cond() {
            return true;
        }
        if Instant::now() > deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
}

/// Give background threads time to do something they should not do.
pub(crate) fn settle() {
    thread::sleep(Duration::from_millis(50));
}

enum Feed {
    Data(Vec<u8>),
    Error(io::ErrorKind),
}

/// A blocking reader fed through a channel. Closing the feed reads as EOF.
pub(crate) struct ChannelReader {
    rx: mpsc::Receiver<Feed>,
    pending: Vec<u8>,
    reads: Arc<AtomicUsize>,
}

impl ChannelReader {
    pub(crate) fn new() -> (Self, FeedHandle) {
        let (tx, rx) = mpsc::channel();
        let reads = Arc::new(AtomicUsize::new(0));
        (
            Self {
                rx,
                pending: Vec::new(),
                reads: Arc::clone(&reads),
            },
            FeedHandle {
                tx: Mutex::new(Some(tx)),
                reads,
            },
        )
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.pending.is_empty() {
            match self.rx.recv() {
                Ok(Feed::Data(bytes)) => self.pending = bytes,
                Ok(Feed::Error(kind)) => {
                    return Err(io::Error::new(kind, "injected read failure"))
                }
                Err(_) => return Ok(0),
            }
        }
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

/// Producer side of a [`ChannelReader`].
pub(crate) struct FeedHandle {
    tx: Mutex<Option<mpsc::Sender<Feed>>>,
    reads: Arc<AtomicUsize>,
}

impl FeedHandle {
    fn push(&self, feed: Feed) {
        if let Some(tx) = self.tx.lock().unwrap().as_ref() {
            let _ = tx.send(feed);
        }
    }

    /// Complete the next read with `bytes`. Empty bytes read as EOF.
    pub(crate) fn data(&self, bytes: &[u8]) {
        self.push(Feed::Data(bytes.to_vec()));
    }

    pub(crate) fn error(&self, kind: io::ErrorKind) {
        self.push(Feed::Error(kind));
    }

    pub(crate) fn close(&self) {
        self.tx.lock().unwrap().take();
    }

    /// Number of `read` calls the reader has started.
    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

/// A writer that appends to a shared buffer, optionally failing or stalling.
#[derive(Clone, Default)]
pub(crate) struct SharedWriter {
    sink: Arc<Mutex<Vec<u8>>>,
    fail_next: Arc<AtomicUsize>,
    delay_micros: Arc<AtomicU64>,
}

impl SharedWriter {
    pub(crate) fn contents(&self) -> Vec<u8> {
        self.sink.lock().unwrap().clone()
    }

    pub(crate) fn fail_next_writes(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }
}

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "injected write failure",
            ));
        }
        let delay = self.delay_micros.load(Ordering::Relaxed);
        if delay > 0 {
            thread::sleep(Duration::from_micros(delay));
        }
        self.sink.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct FakeControl {
    resizes: Arc<Mutex<Vec<WindowSize>>>,
    exit_code: Arc<Mutex<Option<u32>>>,
    released: Arc<AtomicBool>,
    kills: Arc<AtomicUsize>,
}

impl ChildControl for FakeControl {
    fn resize(&mut self, size: WindowSize) -> Result<(), PtyError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(PtyError::Resize("pty already closed".to_string()));
        }
        self.resizes.lock().unwrap().push(size);
        Ok(())
    }

    fn try_wait(&mut self) -> Option<u32> {
        *self.exit_code.lock().unwrap()
    }

    fn release_pty(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }

    fn kill(&mut self) {
        self.kills.fetch_add(1, Ordering::SeqCst);
    }
}

/// A spawner whose children are in-memory channels.
///
/// Cloning shares the same state, so a test keeps one clone as a handle
/// while the session owns another as its spawner.
#[derive(Clone)]
pub(crate) struct FakePty {
    feed: Arc<Mutex<Option<FeedHandle>>>,
    writer: SharedWriter,
    fail_spawns: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<SpawnRequest>>>,
    resizes: Arc<Mutex<Vec<WindowSize>>>,
    exit_code: Arc<Mutex<Option<u32>>>,
    released: Arc<AtomicBool>,
    kills: Arc<AtomicUsize>,
}

impl FakePty {
    pub(crate) const PID: u32 = 4242;

    pub(crate) fn new() -> Self {
        Self {
            feed: Arc::new(Mutex::new(None)),
            writer: SharedWriter::default(),
            fail_spawns: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            resizes: Arc::new(Mutex::new(Vec::new())),
            exit_code: Arc::new(Mutex::new(None)),
            released: Arc::new(AtomicBool::new(false)),
            kills: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn spawner(&self) -> Box<dyn PtySpawner> {
        Box::new(self.clone())
    }

    fn with_feed(&self, f: impl FnOnce(&FeedHandle)) {
        if let Some(feed) = self.feed.lock().unwrap().as_ref() {
            f(feed);
        }
    }

    pub(crate) fn feed(&self, bytes: &[u8]) {
        self.with_feed(|feed| feed.data(bytes));
    }

    pub(crate) fn fail_read(&self) {
        self.with_feed(|feed| feed.error(io::ErrorKind::Other));
    }

    /// Close the child's output; the pending read returns EOF.
    pub(crate) fn close(&self) {
        self.with_feed(FeedHandle::close);
    }

    pub(crate) fn written(&self) -> Vec<u8> {
        self.writer.contents()
    }

    pub(crate) fn fail_next_writes(&self, count: usize) {
        self.writer.fail_next_writes(count);
    }

    pub(crate) fn set_write_delay_micros(&self, micros: u64) {
        self.writer.delay_micros.store(micros, Ordering::Relaxed);
    }

    pub(crate) fn fail_next_spawn(&self) {
        self.fail_spawns.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn requests(&self) -> Vec<SpawnRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn resizes(&self) -> Vec<WindowSize> {
        self.resizes.lock().unwrap().clone()
    }

    pub(crate) fn set_exit_code(&self, code: u32) {
        *self.exit_code.lock().unwrap() = Some(code);
    }

    /// Read calls issued against the current child's output.
    pub(crate) fn reads(&self) -> usize {
        self.feed
            .lock()
            .unwrap()
            .as_ref()
            .map_or(0, FeedHandle::reads)
    }

    /// Whether the session closed the master side of the pty.
    pub(crate) fn pty_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub(crate) fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

impl PtySpawner for FakePty {
    fn spawn(&self, request: &SpawnRequest) -> Result<SpawnedChild, PtyError> {
        self.requests.lock().unwrap().push(request.clone());
        if self
            .fail_spawns
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PtyError::Spawn("injected spawn failure".to_string()));
        }

        let (reader, feed) = ChannelReader::new();
        *self.feed.lock().unwrap() = Some(feed);
        Ok(SpawnedChild {
            pid: Some(Self::PID),
            reader: Box::new(reader),
            writer: Box::new(self.writer.clone()),
            control: Box::new(FakeControl {
                resizes: Arc::clone(&self.resizes),
                exit_code: Arc::clone(&self.exit_code),
                released: Arc::clone(&self.released),
                kills: Arc::clone(&self.kills),
            }),
        })
    }
}

/// What a [`RecordingConsumer`] saw, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Seen {
    Data(Vec<u8>),
    Terminated,
}

type DataHook = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Consumer that records every callback and flags overlapping calls.
pub(crate) struct RecordingConsumer {
    events: Mutex<Vec<Seen>>,
    size: Mutex<WindowSize>,
    size_queries: AtomicUsize,
    in_callback: AtomicBool,
    overlapped: AtomicBool,
    callback_delay_micros: AtomicU64,
    on_data: Mutex<Option<DataHook>>,
}

impl RecordingConsumer {
    pub(crate) fn new() -> Arc<Self> {
        Self::with_size(WindowSize::default())
    }

    pub(crate) fn with_size(size: WindowSize) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            size: Mutex::new(size),
            size_queries: AtomicUsize::new(0),
            in_callback: AtomicBool::new(false),
            overlapped: AtomicBool::new(false),
            callback_delay_micros: AtomicU64::new(0),
            on_data: Mutex::new(None),
        })
    }

    pub(crate) fn set_size(&self, size: WindowSize) {
        *self.size.lock().unwrap() = size;
    }

    pub(crate) fn set_callback_delay_micros(&self, micros: u64) {
        self.callback_delay_micros.store(micros, Ordering::Relaxed);
    }

    /// Run `hook` after each recorded data callback.
    pub(crate) fn set_on_data(&self, hook: impl Fn(&[u8]) + Send + Sync + 'static) {
        *self.on_data.lock().unwrap() = Some(Arc::new(hook));
    }

    pub(crate) fn events(&self) -> Vec<Seen> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn chunks(&self) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Seen::Data(bytes) => Some(bytes),
                Seen::Terminated => None,
            })
            .collect()
    }

    pub(crate) fn data(&self) -> Vec<u8> {
        self.chunks().concat()
    }

    pub(crate) fn terminations(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| **event == Seen::Terminated)
            .count()
    }

    pub(crate) fn size_queries(&self) -> usize {
        self.size_queries.load(Ordering::SeqCst)
    }

    pub(crate) fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        if self.in_callback.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        let delay = self.callback_delay_micros.load(Ordering::Relaxed);
        if delay > 0 {
            thread::sleep(Duration::from_micros(delay));
        }
    }

    fn leave(&self) {
        self.in_callback.store(false, Ordering::SeqCst);
    }
}

impl SessionConsumer for RecordingConsumer {
    fn on_data_received(&self, bytes: &[u8]) {
        self.enter();
        self.events.lock().unwrap().push(Seen::Data(bytes.to_vec()));
        self.leave();

        let hook = self.on_data.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook(bytes);
        }
    }

    fn on_process_terminated(&self) {
        self.enter();
        self.events.lock().unwrap().push(Seen::Terminated);
        self.leave();
    }

    fn window_size(&self) -> WindowSize {
        self.size_queries.fetch_add(1, Ordering::SeqCst);
        *self.size.lock().unwrap()
    }
}
