//! Snapshot DTOs for an embedding frontend.
//!
//! The fleet manager publishes [`FleetSnapshot`]s; this module projects them
//! into flat, JSON-serialisable shapes so a frontend can render device lists
//! without importing engine types.  Any change to a DTO struct here must be
//! reflected in the consuming frontend's type definitions.

use serde::{Deserialize, Serialize};

use crate::application::fleet::{DeviceSummary, FleetSnapshot};

/// DTO representing one registered device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDto {
    pub serial_number: String,
    pub status: String,
    pub hardware_version: Option<[u32; 3]>,
    pub firmware_version: Option<[u32; 2]>,
}

impl From<&DeviceSummary> for DeviceDto {
    fn from(summary: &DeviceSummary) -> Self {
        Self {
            serial_number: summary.serial_number.clone(),
            status: format!("{:?}", summary.status),
            hardware_version: summary.board_info.map(|info| info.hardware_version),
            firmware_version: summary.board_info.map(|info| info.firmware_version),
        }
    }
}

/// DTO for one published fleet snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetDto {
    pub devices: Vec<DeviceDto>,
    pub active_serial: Option<String>,
}

impl From<&FleetSnapshot> for FleetDto {
    fn from(snapshot: &FleetSnapshot) -> Self {
        Self {
            devices: snapshot.devices.iter().map(DeviceDto::from).collect(),
            active_serial: snapshot.active_serial.clone(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
