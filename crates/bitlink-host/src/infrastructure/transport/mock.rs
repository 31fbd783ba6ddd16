//! Mock transport for unit testing and the headless demo.
//!
//! Allows tests to script connection outcomes, inject incoming serial chunks,
//! and inspect written lines without a physical board or USB stack.  The demo
//! binary drives a simulated firmware through the same surface, so this
//! module is a regular (non-test) module.

use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use tokio::sync::mpsc;

use bitlink_core::UsbIdentifier;

use super::{HotplugEvent, LinkError, SerialLink, UsbHost};

// ── MockSerialLink ────────────────────────────────────────────────────────────

/// A scriptable in-memory implementation of [`SerialLink`].
pub struct MockSerialLink {
    serial_number: String,
    connected: AtomicBool,
    forgotten: AtomicBool,
    baud_rate: Mutex<u32>,
    next_connect_error: Mutex<Option<LinkError>>,
    chunk_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    written: Mutex<Vec<String>>,
    written_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl MockSerialLink {
    /// Creates a disconnected mock link with the given serial number and the
    /// driver's default baud rate of 9600 (so setup has to reconfigure it).
    pub fn new(serial_number: &str) -> Arc<Self> {
        Arc::new(Self {
            serial_number: serial_number.to_string(),
            connected: AtomicBool::new(false),
            forgotten: AtomicBool::new(false),
            baud_rate: Mutex::new(9600),
            next_connect_error: Mutex::new(None),
            chunk_tx: Mutex::new(None),
            written: Mutex::new(Vec::new()),
            written_tx: Mutex::new(None),
        })
    }

    /// Scripts the next `connect()` call to fail with `error`.
    pub fn fail_next_connect(&self, error: LinkError) {
        *self.next_connect_error.lock().expect("lock poisoned") = Some(error);
    }

    /// Injects an incoming serial chunk, as if read from hardware.
    ///
    /// Panics if no read session is active — call sites must only inject
    /// after `start_read()`.
    pub fn inject(&self, chunk: &str) {
        let guard = self.chunk_tx.lock().expect("lock poisoned");
        match guard.as_ref() {
            Some(sender) => sender
                .send(chunk.to_string())
                .expect("chunk receiver has been dropped"),
            None => panic!("MockSerialLink::inject called before start_read()"),
        }
    }

    /// All lines written to the link so far, in order.
    pub fn written(&self) -> Vec<String> {
        self.written.lock().expect("lock poisoned").clone()
    }

    /// Live stream of written lines, for auto-responder tasks.
    pub fn observe_written(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.written_tx.lock().expect("lock poisoned") = Some(tx);
        rx
    }

    /// Whether `forget()` has been called.
    pub fn forgotten(&self) -> bool {
        self.forgotten.load(Ordering::SeqCst)
    }

    /// Whether a read session is currently active.
    pub fn reading(&self) -> bool {
        self.chunk_tx.lock().expect("lock poisoned").is_some()
    }
}

#[async_trait]
impl SerialLink for MockSerialLink {
    fn serial_number(&self) -> &str {
        &self.serial_number
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> Result<(), LinkError> {
        if let Some(error) = self.next_connect_error.lock().expect("lock poisoned").take() {
            return Err(error);
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), LinkError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn baud_rate(&self) -> Result<u32, LinkError> {
        Ok(*self.baud_rate.lock().expect("lock poisoned"))
    }

    async fn set_baud_rate(&self, baud_rate: u32) -> Result<(), LinkError> {
        *self.baud_rate.lock().expect("lock poisoned") = baud_rate;
        Ok(())
    }

    fn start_read(&self) -> Result<mpsc::UnboundedReceiver<String>, LinkError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.chunk_tx.lock().expect("lock poisoned") = Some(tx);
        Ok(rx)
    }

    fn stop_read(&self) {
        // Drop the sender to close the chunk channel
        *self.chunk_tx.lock().expect("lock poisoned") = None;
    }

    async fn write(&self, data: &str) -> Result<(), LinkError> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }
        self.written
            .lock()
            .expect("lock poisoned")
            .push(data.to_string());
        if let Some(sender) = self.written_tx.lock().expect("lock poisoned").as_ref() {
            let _ = sender.send(data.to_string());
        }
        Ok(())
    }

    async fn forget(&self) -> Result<(), LinkError> {
        self.forgotten.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ── MockUsbHost ───────────────────────────────────────────────────────────────

/// A scriptable in-memory implementation of [`UsbHost`].
pub struct MockUsbHost {
    supported: bool,
    authorized: Mutex<Vec<Arc<dyn SerialLink>>>,
    picker_queue: Mutex<VecDeque<Result<Option<Arc<dyn SerialLink>>, LinkError>>>,
    picker_filters: Mutex<Vec<UsbIdentifier>>,
    hotplug_tx: mpsc::UnboundedSender<HotplugEvent>,
    hotplug_rx: Mutex<Option<mpsc::UnboundedReceiver<HotplugEvent>>>,
}

impl MockUsbHost {
    pub fn new(supported: bool) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            supported,
            authorized: Mutex::new(Vec::new()),
            picker_queue: Mutex::new(VecDeque::new()),
            picker_filters: Mutex::new(Vec::new()),
            hotplug_tx: tx,
            hotplug_rx: Mutex::new(Some(rx)),
        })
    }

    /// Adds a device to the already-authorized set returned by enumeration.
    pub fn add_authorized(&self, link: Arc<dyn SerialLink>) {
        self.authorized.lock().expect("lock poisoned").push(link);
    }

    /// Scripts the outcome of the next `request_device()` call.  With an
    /// empty queue the picker reports a user cancellation.
    pub fn queue_picker(&self, outcome: Result<Option<Arc<dyn SerialLink>>, LinkError>) {
        self.picker_queue
            .lock()
            .expect("lock poisoned")
            .push_back(outcome);
    }

    /// The filters passed to `request_device()` so far.
    pub fn requested_filters(&self) -> Vec<UsbIdentifier> {
        self.picker_filters.lock().expect("lock poisoned").clone()
    }

    /// Emits a page-level connect notification.
    pub fn plug_in(&self, link: Arc<dyn SerialLink>) {
        let _ = self.hotplug_tx.send(HotplugEvent::Connected(link));
    }

    /// Emits a page-level disconnect notification.
    pub fn unplug(&self, link: Arc<dyn SerialLink>) {
        let _ = self.hotplug_tx.send(HotplugEvent::Disconnected(link));
    }
}

#[async_trait]
impl UsbHost for MockUsbHost {
    fn supported(&self) -> bool {
        self.supported
    }

    async fn authorized_devices(&self) -> Result<Vec<Arc<dyn SerialLink>>, LinkError> {
        Ok(self.authorized.lock().expect("lock poisoned").clone())
    }

    async fn request_device(
        &self,
        filter: UsbIdentifier,
    ) -> Result<Option<Arc<dyn SerialLink>>, LinkError> {
        self.picker_filters
            .lock()
            .expect("lock poisoned")
            .push(filter);
        self.picker_queue
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .unwrap_or(Ok(None))
    }

    fn hotplug_events(&self) -> Option<mpsc::UnboundedReceiver<HotplugEvent>> {
        self.hotplug_rx.lock().expect("lock poisoned").take()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
