//! FleetManager: process-wide registry and lifecycle orchestrator.
//!
//! The fleet manager owns every known [`Device`], keyed by serial number,
//! and the selection of the single *active* device.  It funnels the three
//! ways a board can appear — bootstrap enumeration, a page-level connect
//! notification, and an explicit pairing request — through the idempotent
//! [`FleetManager::register_device`], so near-simultaneous arrivals of the
//! same physical board always converge on one instance.
//!
//! Fleet state is published to observers as a [`FleetSnapshot`] on every
//! change; the subsystem performs no rendering of its own.

use std::sync::{Arc, Mutex, Weak};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use bitlink_core::{BoardInfo, DeviceStatus, MICROBIT_USB};

use crate::application::device::{BoardIdentityError, Device, LinkSettings};
use crate::infrastructure::transport::{HotplugEvent, LinkError, SerialLink, UsbHost};

// ── Errors ────────────────────────────────────────────────────────────────────

/// Error type for fleet lifecycle operations.
#[derive(Debug, Error)]
pub enum FleetError {
    /// The host lacks the required USB capability; the manager performs no
    /// further action.
    #[error("USB capability is not available on this host")]
    Unsupported,

    /// Enumerating already-authorized devices failed.
    #[error("device enumeration failed: {0}")]
    Enumeration(#[source] LinkError),

    /// The platform device picker failed (a user cancellation is not an
    /// error; it resolves to no device).
    #[error("device picker failed: {0}")]
    Picker(#[source] LinkError),

    /// Revoking a device's USB permission grant failed.
    #[error("permission revocation failed: {0}")]
    Revoke(#[source] LinkError),

    /// The paired device claimed to be a foreign board type.
    #[error(transparent)]
    Identity(#[from] BoardIdentityError),
}

// ── Published state ───────────────────────────────────────────────────────────

/// Point-in-time view of one registered device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    pub serial_number: String,
    pub status: DeviceStatus,
    pub board_info: Option<BoardInfo>,
}

/// Point-in-time view of the fleet, published to observers on every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetSnapshot {
    /// Every registered device, in registration order.
    pub devices: Vec<DeviceSummary>,
    /// Serial number of the active device; always `None` or a member of
    /// `devices`.
    pub active_serial: Option<String>,
}

type FleetObserver = Arc<dyn Fn(&FleetSnapshot) + Send + Sync>;

// ── FleetManager ──────────────────────────────────────────────────────────────

/// Registry of known devices and orchestrator of their lifecycles.
///
/// Created once per application session (explicitly constructed and owned by
/// the embedder) and kept for the page lifetime.
pub struct FleetManager {
    usb: Arc<dyn UsbHost>,
    settings: LinkSettings,
    /// Self-handle for the hotplug pump and device subscriptions.
    weak_self: Weak<FleetManager>,
    devices: Mutex<Vec<Arc<Device>>>,
    active: Mutex<Option<Arc<Device>>>,
    observers: Mutex<Vec<FleetObserver>>,
}

impl FleetManager {
    pub fn new(usb: Arc<dyn UsbHost>) -> Arc<Self> {
        Self::with_settings(usb, LinkSettings::default())
    }

    pub fn with_settings(usb: Arc<dyn UsbHost>, settings: LinkSettings) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            usb,
            settings,
            weak_self: weak_self.clone(),
            devices: Mutex::new(Vec::new()),
            active: Mutex::new(None),
            observers: Mutex::new(Vec::new()),
        })
    }

    /// Whether the host exposes the required USB capability.
    pub fn supported(&self) -> bool {
        self.usb.supported()
    }

    // ── Observation ───────────────────────────────────────────────────────────

    /// Registers an observer invoked with the current snapshot on every
    /// fleet-state change.
    pub fn on_change(&self, observer: impl Fn(&FleetSnapshot) + Send + Sync + 'static) {
        self.observers
            .lock()
            .expect("lock poisoned")
            .push(Arc::new(observer));
    }

    /// Builds a point-in-time snapshot of the fleet.
    pub fn snapshot(&self) -> FleetSnapshot {
        let devices = self
            .devices
            .lock()
            .expect("lock poisoned")
            .iter()
            .map(|device| DeviceSummary {
                serial_number: device.serial_number().to_string(),
                status: device.status(),
                board_info: device.board_info(),
            })
            .collect();
        let active_serial = self
            .active
            .lock()
            .expect("lock poisoned")
            .as_ref()
            .map(|device| device.serial_number().to_string());
        FleetSnapshot {
            devices,
            active_serial,
        }
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        let observers: Vec<FleetObserver> =
            self.observers.lock().expect("lock poisoned").clone();
        for observer in observers {
            observer(&snapshot);
        }
    }

    // ── Registry accessors ────────────────────────────────────────────────────

    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.lock().expect("lock poisoned").clone()
    }

    pub fn active_device(&self) -> Option<Arc<Device>> {
        self.active.lock().expect("lock poisoned").clone()
    }

    fn find_device(&self, serial_number: &str) -> Option<Arc<Device>> {
        self.devices
            .lock()
            .expect("lock poisoned")
            .iter()
            .find(|device| device.serial_number() == serial_number)
            .cloned()
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Subscribes to hotplug notifications for the session and enumerates
    /// already-authorized devices, registering each.
    ///
    /// # Errors
    ///
    /// [`FleetError::Unsupported`] when the host lacks the USB capability
    /// (no further action is taken), or [`FleetError::Enumeration`] when the
    /// authorized-device listing fails.
    pub async fn bootstrap(&self) -> Result<(), FleetError> {
        if !self.usb.supported() {
            warn!("USB capability unavailable; fleet manager is disabled");
            return Err(FleetError::Unsupported);
        }

        if let Some(mut events) = self.usb.hotplug_events() {
            let fleet = self.weak_self.clone();
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    let Some(fleet) = fleet.upgrade() else { break };
                    match event {
                        HotplugEvent::Connected(handle) => {
                            let serial = handle.serial_number().to_string();
                            if let Err(fleet_error) = fleet.register_device(handle).await {
                                error!(
                                    serial = %serial,
                                    error = %fleet_error,
                                    "failed to register connected device"
                                );
                            }
                        }
                        HotplugEvent::Disconnected(handle) => {
                            fleet.disconnect_device(handle.serial_number()).await;
                        }
                    }
                }
            });
        }

        let handles = self
            .usb
            .authorized_devices()
            .await
            .map_err(FleetError::Enumeration)?;
        for handle in handles {
            let serial = handle.serial_number().to_string();
            if let Err(fleet_error) = self.register_device(handle).await {
                error!(
                    serial = %serial,
                    error = %fleet_error,
                    "failed to register authorized device"
                );
            }
        }
        Ok(())
    }

    /// Best-effort page-unload handler: disconnects every known device,
    /// leaving their identity records registered.
    pub async fn shutdown(&self) {
        let devices = self.devices();
        for device in devices {
            device.disconnect().await;
        }
    }

    /// Registers a transport handle, idempotently by serial number.
    ///
    /// If a device with that serial number is already known, the existing
    /// instance is returned without re-running setup — near-simultaneous
    /// hotplug and pairing arrivals of the same board converge here.
    /// Otherwise the new device is appended, published, and `setup()` is
    /// invoked; its final status communicates every connection-phase
    /// outcome.
    ///
    /// # Errors
    ///
    /// [`FleetError::Identity`] when the board claims a foreign type during
    /// the handshake — the one setup outcome that propagates as an error.
    pub async fn register_device(
        &self,
        handle: Arc<dyn SerialLink>,
    ) -> Result<Arc<Device>, FleetError> {
        let (device, created) = {
            let mut devices = self.devices.lock().expect("lock poisoned");
            let existing = devices
                .iter()
                .find(|device| device.serial_number() == handle.serial_number())
                .cloned();
            match existing {
                Some(existing) => (existing, false),
                None => {
                    let device = Device::with_settings(handle, self.settings.clone());

                    // First-ready-wins across concurrently booting devices.
                    let fleet = self.weak_self.clone();
                    device.on_ready(move |ready| {
                        if let Some(fleet) = fleet.upgrade() {
                            fleet.promote_first_ready(ready);
                        }
                    });

                    // Republish so observers see status transitions.
                    let fleet = self.weak_self.clone();
                    device.on_status_changed(move |_| {
                        if let Some(fleet) = fleet.upgrade() {
                            fleet.publish();
                        }
                    });

                    devices.push(Arc::clone(&device));
                    (device, true)
                }
            }
        };

        if !created {
            debug!(
                serial = device.serial_number(),
                "device already registered"
            );
            return Ok(device);
        }

        self.publish();
        let outcome = device.setup().await;
        info!(serial = device.serial_number(), "registered new device");
        outcome?;
        Ok(device)
    }

    /// Invokes the platform device picker restricted to the expected board
    /// family and registers the chosen handle.
    ///
    /// A user cancellation resolves to `Ok(None)` without error.  If
    /// registration fails after the picker handed out a handle, the raw
    /// handle is closed best-effort before the error propagates, so an
    /// opened-but-unmanaged resource is not leaked.
    pub async fn attempt_pair(&self) -> Result<Option<Arc<Device>>, FleetError> {
        let handle = match self.usb.request_device(MICROBIT_USB).await {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                debug!("device picker dismissed without a selection");
                return Ok(None);
            }
            Err(link_error) => return Err(FleetError::Picker(link_error)),
        };

        match self.register_device(Arc::clone(&handle)).await {
            Ok(device) => Ok(Some(device)),
            Err(fleet_error) => {
                if handle.is_connected() {
                    if let Err(close_error) = handle.disconnect().await {
                        warn!(
                            serial = handle.serial_number(),
                            error = %close_error,
                            "failed to close handle after registration failure"
                        );
                    }
                }
                Err(fleet_error)
            }
        }
    }

    /// Makes `device` the active device.
    ///
    /// # Panics
    ///
    /// Panics if `device` is not a member of the registry — a programming
    /// error, not a recoverable condition.
    pub fn make_active(&self, device: &Arc<Device>) {
        {
            let devices = self.devices.lock().expect("lock poisoned");
            assert!(
                devices.iter().any(|member| Arc::ptr_eq(member, device)),
                "attempted to make an unregistered device active"
            );
        }
        *self.active.lock().expect("lock poisoned") = Some(Arc::clone(device));
        info!(serial = device.serial_number(), "made device active");
        self.publish();
    }

    /// Auto-promotes a freshly ready device when nothing is active yet.
    fn promote_first_ready(&self, device: &Arc<Device>) {
        {
            let mut active = self.active.lock().expect("lock poisoned");
            if active.is_some() {
                return;
            }
            *active = Some(Arc::clone(device));
        }
        info!(
            serial = device.serial_number(),
            "promoted first ready device to active"
        );
        self.publish();
    }

    /// Removes a device from the registry and closes its transport.
    ///
    /// No-op if the serial number is not currently known.  If the removed
    /// device was active, the first remaining device (or none) becomes
    /// active, published separately from the removal.
    pub async fn disconnect_device(&self, serial_number: &str) {
        let device = {
            let mut devices = self.devices.lock().expect("lock poisoned");
            match devices
                .iter()
                .position(|device| device.serial_number() == serial_number)
            {
                Some(index) => devices.remove(index),
                None => return,
            }
        };
        self.publish();

        let replacement = self
            .devices
            .lock()
            .expect("lock poisoned")
            .first()
            .cloned();
        let was_active = {
            let mut active = self.active.lock().expect("lock poisoned");
            if active
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &device))
            {
                *active = replacement;
                true
            } else {
                false
            }
        };
        if was_active {
            self.publish();
        }

        device.disconnect().await;
    }

    /// `disconnect_device` followed by revocation of the board's USB
    /// permission grant — strictly stronger and terminal: a forgotten board
    /// is not re-offered by future enumeration.
    pub async fn forget_device(&self, serial_number: &str) -> Result<(), FleetError> {
        let Some(device) = self.find_device(serial_number) else {
            return Ok(());
        };
        self.disconnect_device(serial_number).await;
        device.forget().await.map_err(FleetError::Revoke)?;
        info!(serial = serial_number, "forgot device");
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
