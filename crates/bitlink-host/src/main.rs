//! bitlink host entry point.
//!
//! Headless demonstration of the fleet subsystem: a simulated board is
//! registered through the mock transport, the fleet boots it through the
//! full connect/handshake path, and every published snapshot is logged.
//! In a real embedding the transport traits are implemented over the USB
//! debug-link driver instead of the mock.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use bitlink_host::application::fleet::FleetManager;
use bitlink_host::infrastructure::storage::config::load_config;
use bitlink_host::infrastructure::transport::mock::{MockSerialLink, MockUsbHost};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("bitlink host starting");

    let config = load_config().unwrap_or_default();

    // ── Simulated board ───────────────────────────────────────────────────────
    let board = MockSerialLink::new("9904360259482024");
    spawn_simulated_firmware(Arc::clone(&board));

    let usb = MockUsbHost::new(true);
    usb.add_authorized(board);

    // ── Fleet ─────────────────────────────────────────────────────────────────
    let fleet = FleetManager::with_settings(usb, config.link.to_settings());
    fleet.on_change(|snapshot| {
        info!(
            devices = snapshot.devices.len(),
            active = ?snapshot.active_serial,
            "fleet state changed"
        );
    });
    fleet.bootstrap().await?;

    if let Some(device) = fleet.active_device() {
        match device.identify().await {
            Ok(reply) => info!(serial = device.serial_number(), ?reply, "identify acknowledged"),
            Err(link_error) => error!(
                serial = device.serial_number(),
                error = %link_error,
                "identify failed"
            ),
        }
    }

    info!("bitlink host ready.  Press Ctrl-C to exit.");
    tokio::signal::ctrl_c().await?;

    fleet.shutdown().await;
    info!("bitlink host stopped");
    Ok(())
}

/// Answers the wire protocol on behalf of the simulated board.
fn spawn_simulated_firmware(board: Arc<MockSerialLink>) {
    let mut commands = board.observe_written();
    tokio::spawn(async move {
        while let Some(line) = commands.recv().await {
            let command = line.trim_end();
            let reply = match command.split('|').next().unwrap_or_default() {
                "hello" => "hello|microbit|2.0.0|0.1\n".to_string(),
                "identify" | "stop_music" | "show_image" => "ok\n".to_string(),
                other => format!("err|unknown|unrecognised command '{other}'\n"),
            };
            board.inject(&reply);
        }
    });
}
