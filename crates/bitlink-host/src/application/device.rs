//! Device: the per-board serial protocol engine.
//!
//! A `Device` owns all protocol state for one physical board — line
//! reassembly, command/response correlation, event classification, the
//! handshake, and lifecycle status.  It drives the transport only through the
//! [`SerialLink`] seam.
//!
//! # Correlation model
//!
//! Commands and replies are correlated strictly by position: the Nth `send()`
//! is resolved by the Nth `ok`/`err` line received, regardless of content.
//! The inflight queue holds one oneshot resolver per outstanding command;
//! `handle_data` pops the oldest resolver for each reply line.  Outgoing
//! commands carry no timeout — a reply that never arrives leaves its caller
//! suspended until the session is torn down.
//!
//! # Handshake
//!
//! `setup()` opens the link, waits a short settle delay (immediate writes
//! are dropped by the bridge while serial is still coming up), then writes a
//! literal `hello` command, retransmitting at a fixed interval for up to 4
//! additional attempts.  A correct reply records [`BoardInfo`], transitions
//! to `Ready`, and fires the one-time ready notification.  Exhausting the
//! retries leaves the device `Initialising` with no terminal transition.

use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, Weak,
};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use bitlink_core::{
    encode_command, parse_record, BoardInfo, CommandReply, DeviceStatus, HelloRecord, LineBuffer,
    Record, BAUD_RATE, BOARD_TYPE,
};

use crate::infrastructure::transport::{LinkError, SerialLink};

// ── Protocol command literals ─────────────────────────────────────────────────

const CMD_HELLO: &str = "hello";
const CMD_IDENTIFY: &str = "identify";
const CMD_STOP: &str = "stop_music";
const CMD_SHOW_IMAGE: &str = "show_image";

/// All-off 5x5 image used to blank the display on reset.
const BLANK_IMAGE: &str = "00000:00000:00000:00000:00000";

// ── Timing settings ───────────────────────────────────────────────────────────

/// Timing and rate knobs for one serial session.
///
/// Injectable so tests can run the settle delay and the handshake retry loop
/// in milliseconds.
#[derive(Debug, Clone)]
pub struct LinkSettings {
    /// Required serial baud rate; reconfigured if the link reports another.
    pub baud_rate: u32,
    /// Delay between enabling serial read and the first handshake write.
    /// Writes issued immediately are dropped by the bridge.
    pub settle_delay: Duration,
    /// Interval between handshake retransmissions.
    pub hello_retry_interval: Duration,
    /// Total number of `hello` writes before giving up (initial + retries).
    pub hello_attempts: u32,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            baud_rate: BAUD_RATE,
            settle_delay: Duration::from_millis(1500),
            hello_retry_interval: Duration::from_millis(2000),
            hello_attempts: 5,
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// The remote device claimed to be something other than the expected board
/// family.
///
/// This is the one condition that aborts `setup()` with an error rather than
/// a degraded status: it indicates a wiring/contract violation, not a
/// recoverable transport condition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("device identified as '{claimed}' instead of '{expected}'")]
pub struct BoardIdentityError {
    pub claimed: String,
    pub expected: &'static str,
}

// ── Device ────────────────────────────────────────────────────────────────────

type DeviceCallback = Arc<dyn Fn(&Arc<Device>) + Send + Sync>;

/// Protocol state mutated only by the engine itself (`setup`, `handle_data`).
struct ProtocolState {
    status: DeviceStatus,
    board_info: Option<BoardInfo>,
    lines: LineBuffer,
    inflight: VecDeque<oneshot::Sender<CommandReply>>,
    pending_messages: VecDeque<String>,
    undrained_events: Vec<String>,
    /// Resolver for the handshake waiter inside `setup()`.
    initialising: Option<oneshot::Sender<Result<(), BoardIdentityError>>>,
}

/// The serial protocol engine for one physical board.
pub struct Device {
    link: Arc<dyn SerialLink>,
    settings: LinkSettings,
    /// Self-handle for background tasks and subscriber notifications.
    weak_self: Weak<Device>,
    state: Mutex<ProtocolState>,
    /// Serialises enqueue + write so inflight order always matches wire order
    /// under concurrent senders.
    send_gate: tokio::sync::Mutex<()>,
    ready_fired: AtomicBool,
    ready_subs: Mutex<Vec<DeviceCallback>>,
    status_subs: Mutex<Vec<DeviceCallback>>,
}

impl Device {
    /// Wraps a transport handle whose serial number is already known.
    /// Performs no I/O.
    pub fn new(link: Arc<dyn SerialLink>) -> Arc<Self> {
        Self::with_settings(link, LinkSettings::default())
    }

    pub fn with_settings(link: Arc<dyn SerialLink>, settings: LinkSettings) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            link,
            settings,
            weak_self: weak_self.clone(),
            state: Mutex::new(ProtocolState {
                status: DeviceStatus::Initialising,
                board_info: None,
                lines: LineBuffer::new(),
                inflight: VecDeque::new(),
                pending_messages: VecDeque::new(),
                undrained_events: Vec::new(),
                initialising: None,
            }),
            send_gate: tokio::sync::Mutex::new(()),
            ready_fired: AtomicBool::new(false),
            ready_subs: Mutex::new(Vec::new()),
            status_subs: Mutex::new(Vec::new()),
        })
    }

    /// Strong self-handle; valid for as long as any caller holds the device.
    fn strong(&self) -> Arc<Device> {
        self.weak_self
            .upgrade()
            .expect("device outlives its own method calls")
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn serial_number(&self) -> &str {
        self.link.serial_number()
    }

    pub fn status(&self) -> DeviceStatus {
        self.state.lock().expect("lock poisoned").status
    }

    /// Version information from the handshake; `None` until `Ready`.
    pub fn board_info(&self) -> Option<BoardInfo> {
        self.state.lock().expect("lock poisoned").board_info
    }

    pub fn hardware_version(&self) -> Option<[u32; 3]> {
        self.board_info().map(|info| info.hardware_version)
    }

    pub fn firmware_version(&self) -> Option<[u32; 2]> {
        self.board_info().map(|info| info.firmware_version)
    }

    // ── Notifications ─────────────────────────────────────────────────────────

    /// Registers a callback fired exactly once, when the handshake completes.
    pub fn on_ready(&self, callback: impl Fn(&Arc<Device>) + Send + Sync + 'static) {
        self.ready_subs
            .lock()
            .expect("lock poisoned")
            .push(Arc::new(callback));
    }

    /// Registers a callback fired on every status or board-info change.
    pub fn on_status_changed(&self, callback: impl Fn(&Arc<Device>) + Send + Sync + 'static) {
        self.status_subs
            .lock()
            .expect("lock poisoned")
            .push(Arc::new(callback));
    }

    // ── Setup ─────────────────────────────────────────────────────────────────

    /// Opens the connection and performs the `hello` handshake.
    ///
    /// Every connection-phase failure settles into a status (`AlreadyInUse`
    /// for a claimed interface, `BadState` for a bad setup-phase reply,
    /// `Failed` otherwise) — the device stays registered so the user can
    /// retry or forget it.  The single `Err` is a [`BoardIdentityError`]:
    /// the remote claimed to be a different board family, which aborts the
    /// attempt without any status transition.
    pub async fn setup(&self) -> Result<(), BoardIdentityError> {
        self.reset_session_state();

        if let Err(link_error) = self.link.connect().await {
            error!(
                serial = self.serial_number(),
                error = %link_error,
                "failed to connect to device"
            );
            self.set_status(classify_connect_error(&link_error));
            return Ok(());
        }

        if let Err(link_error) = self.ensure_baud_rate().await {
            error!(
                serial = self.serial_number(),
                error = %link_error,
                "failed to configure baud rate"
            );
            self.set_status(DeviceStatus::Failed);
            return Ok(());
        }

        let chunks = match self.link.start_read() {
            Ok(chunks) => chunks,
            Err(link_error) => {
                error!(
                    serial = self.serial_number(),
                    error = %link_error,
                    "failed to start serial read"
                );
                self.set_status(DeviceStatus::Failed);
                return Ok(());
            }
        };
        self.spawn_read_pump(chunks);

        // Writes issued immediately after enabling serial are dropped by the
        // bridge; wait before the first handshake attempt.
        tokio::time::sleep(self.settings.settle_delay).await;
        debug!(serial = self.serial_number(), "finished setup, sending hello");

        let handshake = {
            let (resolver, waiter) = oneshot::channel();
            self.state.lock().expect("lock poisoned").initialising = Some(resolver);
            waiter
        };

        if let Err(link_error) = self.link.write(&encode_command(CMD_HELLO, &[])).await {
            warn!(
                serial = self.serial_number(),
                error = %link_error,
                "failed to write hello"
            );
            self.set_status(DeviceStatus::Failed);
            return Ok(());
        }

        self.await_handshake(handshake).await
    }

    /// Waits for the handshake reply, retransmitting `hello` at the fixed
    /// interval until the attempt budget is spent.
    async fn await_handshake(
        &self,
        mut handshake: oneshot::Receiver<Result<(), BoardIdentityError>>,
    ) -> Result<(), BoardIdentityError> {
        let mut attempts = 1u32;
        loop {
            match tokio::time::timeout(self.settings.hello_retry_interval, &mut handshake).await {
                Ok(Ok(Ok(()))) => {
                    self.state.lock().expect("lock poisoned").initialising = None;
                    self.set_status(DeviceStatus::Ready);
                    self.fire_ready();
                    info!(serial = self.serial_number(), "handshake complete");
                    return Ok(());
                }
                Ok(Ok(Err(identity))) => {
                    self.state.lock().expect("lock poisoned").initialising = None;
                    return Err(identity);
                }
                // Resolver dropped by a session reset or disconnect; this
                // attempt is over.
                Ok(Err(_)) => return Ok(()),
                Err(_elapsed) => {
                    if attempts >= self.settings.hello_attempts {
                        // No terminal failure transition is defined for
                        // handshake exhaustion; the device stays
                        // `Initialising` indefinitely.
                        error!(
                            serial = self.serial_number(),
                            attempts, "failed to initialise; giving up on handshake"
                        );
                        return Ok(());
                    }
                    attempts += 1;
                    debug!(
                        serial = self.serial_number(),
                        attempt = attempts,
                        "re-attempting hello"
                    );
                    if let Err(link_error) =
                        self.link.write(&encode_command(CMD_HELLO, &[])).await
                    {
                        warn!(
                            serial = self.serial_number(),
                            error = %link_error,
                            "failed to re-send hello"
                        );
                    }
                }
            }
        }
    }

    async fn ensure_baud_rate(&self) -> Result<(), LinkError> {
        let current = self.link.baud_rate().await?;
        if current != self.settings.baud_rate {
            self.link.set_baud_rate(self.settings.baud_rate).await?;
        }
        Ok(())
    }

    fn spawn_read_pump(&self, mut chunks: mpsc::UnboundedReceiver<String>) {
        let device = self.strong();
        tokio::spawn(async move {
            while let Some(chunk) = chunks.recv().await {
                if let Err(identity) = device.handle_data(&chunk) {
                    error!(
                        serial = device.serial_number(),
                        error = %identity,
                        "protocol contract violated; stopping serial read"
                    );
                    device.link.stop_read();
                    break;
                }
            }
        });
    }

    /// Clears all protocol-level state for a fresh session.  Dropping the
    /// inflight resolvers releases any caller still waiting on a reply from
    /// the previous session.
    fn reset_session_state(&self) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.status = DeviceStatus::Initialising;
        state.board_info = None;
        state.lines.clear();
        state.inflight.clear();
        state.pending_messages.clear();
        state.undrained_events.clear();
        state.initialising = None;
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    /// Writes `command|arg1|arg2...` and resolves with the positionally
    /// correlated reply.
    ///
    /// An `err` reply resolves with [`CommandReply::Err`] — a value for the
    /// caller to inspect, not an error return.  `Err(LinkError)` is reserved
    /// for transport failures (the write failed, or the session was torn
    /// down while waiting).
    ///
    /// No timeout is applied: a lost reply suspends the caller until the
    /// session is torn down.
    pub async fn send(&self, command: &str, args: &[&str]) -> Result<CommandReply, LinkError> {
        let line = encode_command(command, args);
        let waiter = {
            let _gate = self.send_gate.lock().await;
            let (resolver, waiter) = oneshot::channel();
            self.state
                .lock()
                .expect("lock poisoned")
                .inflight
                .push_back(resolver);
            if let Err(link_error) = self.link.write(&line).await {
                self.state
                    .lock()
                    .expect("lock poisoned")
                    .inflight
                    .pop_back();
                return Err(link_error);
            }
            waiter
        };
        waiter.await.map_err(|_| LinkError::NotConnected)
    }

    /// Triggers the board's physical indicator.
    pub async fn identify(&self) -> Result<CommandReply, LinkError> {
        self.send(CMD_IDENTIFY, &[]).await
    }

    /// Halts any ongoing sound output.
    pub async fn stop(&self) -> Result<CommandReply, LinkError> {
        self.send(CMD_STOP, &[]).await
    }

    /// `stop()` plus clearing both local queues plus blanking the display.
    ///
    /// The queue clear is what keeps stale undrained signals from before a
    /// logical restart from being observed afterwards; no other operation
    /// mutates local queue state.
    pub async fn reset(&self) -> Result<(), LinkError> {
        self.stop().await?;
        {
            let mut state = self.state.lock().expect("lock poisoned");
            state.undrained_events.clear();
            state.pending_messages.clear();
        }
        self.send(CMD_SHOW_IMAGE, &[BLANK_IMAGE]).await?;
        Ok(())
    }

    /// Idempotent: stops the read session and closes the link if connected.
    pub async fn disconnect(&self) {
        info!(serial = self.serial_number(), "disconnecting device");
        if self.link.is_connected() {
            self.link.stop_read();
            if let Err(link_error) = self.link.disconnect().await {
                warn!(
                    serial = self.serial_number(),
                    error = %link_error,
                    "transport disconnect failed"
                );
            }
        }
    }

    /// Revokes the board's USB permission grant.
    pub async fn forget(&self) -> Result<(), LinkError> {
        self.link.forget().await
    }

    // ── Polling surface ───────────────────────────────────────────────────────

    /// Atomically empties and returns the undrained-events queue.  A second
    /// immediate call returns empty.
    pub fn drain_new_events(&self) -> Vec<String> {
        std::mem::take(&mut self.state.lock().expect("lock poisoned").undrained_events)
    }

    /// Pops one delivered application-message payload, if any.
    pub fn get_next_message(&self) -> Option<String> {
        self.state
            .lock()
            .expect("lock poisoned")
            .pending_messages
            .pop_front()
    }

    // ── Incoming data ─────────────────────────────────────────────────────────

    /// Consumes one transport chunk: buffers it, then dispatches every line
    /// it completes.
    ///
    /// # Errors
    ///
    /// Returns [`BoardIdentityError`] — the protocol layer's only error —
    /// when a `hello` record claims a foreign board type.
    pub fn handle_data(&self, chunk: &str) -> Result<(), BoardIdentityError> {
        let lines = self
            .state
            .lock()
            .expect("lock poisoned")
            .lines
            .push_chunk(chunk);
        for line in lines {
            self.dispatch_line(&line)?;
        }
        Ok(())
    }

    fn dispatch_line(&self, line: &str) -> Result<(), BoardIdentityError> {
        debug!(serial = self.serial_number(), line, "received record");
        let record = match parse_record(line) {
            Ok(record) => record,
            Err(parse_error) => {
                // A single malformed record is dropped; nothing else is
                // touched.
                warn!(
                    serial = self.serial_number(),
                    error = %parse_error,
                    "dropping malformed record"
                );
                return Ok(());
            }
        };

        match record {
            Record::Ok(args) => self.resolve_inflight("ok", CommandReply::Ok(args)),
            Record::Err(fault) => self.resolve_inflight("err", CommandReply::Err(fault)),
            Record::Button(button) => self.push_event(format!("button:{}", button.as_str())),
            Record::Gesture(gesture) => self.push_event(format!("gesture:{}", gesture.as_str())),
            Record::Pin { pin, level } => {
                self.push_event(format!("pin_{}:{}", level.as_str(), pin.as_str()));
            }
            Record::Message(payload) => {
                let mut state = self.state.lock().expect("lock poisoned");
                state.pending_messages.push_back(payload);
                state.undrained_events.push("message".to_string());
            }
            Record::Mic(level) => self.push_event(format!("mic:{}", level.as_str())),
            Record::Hello(hello) => self.handle_hello(hello)?,
            Record::Unknown(tag) => {
                warn!(
                    serial = self.serial_number(),
                    tag, "received unknown record tag"
                );
            }
        }
        Ok(())
    }

    fn handle_hello(&self, hello: HelloRecord) -> Result<(), BoardIdentityError> {
        if hello.board_type != BOARD_TYPE {
            let identity = BoardIdentityError {
                claimed: hello.board_type,
                expected: BOARD_TYPE,
            };
            if let Some(waiter) = self
                .state
                .lock()
                .expect("lock poisoned")
                .initialising
                .take()
            {
                let _ = waiter.send(Err(identity.clone()));
            }
            return Err(identity);
        }

        let waiter = {
            let mut state = self.state.lock().expect("lock poisoned");
            state.board_info = Some(hello.board_info);
            state.initialising.take()
        };
        if let Some(waiter) = waiter {
            let _ = waiter.send(Ok(()));
        }
        self.notify_status_changed();
        Ok(())
    }

    fn resolve_inflight(&self, tag: &str, reply: CommandReply) {
        let resolver = self
            .state
            .lock()
            .expect("lock poisoned")
            .inflight
            .pop_front();
        match resolver {
            Some(resolver) => {
                // A dropped caller leaves a closed channel; nothing to do.
                let _ = resolver.send(reply);
            }
            None => {
                error!(
                    serial = self.serial_number(),
                    tag, "received reply but there is no in-flight command"
                );
            }
        }
    }

    fn push_event(&self, tag: String) {
        self.state
            .lock()
            .expect("lock poisoned")
            .undrained_events
            .push(tag);
    }

    fn set_status(&self, status: DeviceStatus) {
        self.state.lock().expect("lock poisoned").status = status;
        self.notify_status_changed();
    }

    fn notify_status_changed(&self) {
        let device = self.strong();
        let subscribers: Vec<DeviceCallback> =
            self.status_subs.lock().expect("lock poisoned").clone();
        for subscriber in subscribers {
            subscriber(&device);
        }
    }

    fn fire_ready(&self) {
        if self.ready_fired.swap(true, Ordering::SeqCst) {
            return;
        }
        let device = self.strong();
        let subscribers: Vec<DeviceCallback> =
            self.ready_subs.lock().expect("lock poisoned").clone();
        for subscriber in subscribers {
            subscriber(&device);
        }
    }
}

fn classify_connect_error(link_error: &LinkError) -> DeviceStatus {
    match link_error {
        LinkError::InterfaceClaimed(_) => DeviceStatus::AlreadyInUse,
        LinkError::BadResponse { .. } => DeviceStatus::BadState,
        _ => DeviceStatus::Failed,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
