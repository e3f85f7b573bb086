use ascom_alpaca::api::CargoServerInfo;
use ascom_alpaca::Server;
use net_literals::addr;
use tracing::{info, warn};

use skymount_alpaca::alpaca::MountDevice;
use skymount_alpaca::config::MountConfig;
use skymount_alpaca::mount_control::MountController;
use skymount_alpaca::util::MountEvent;

const PROFILE: &str = "config";

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt::init();

    let config = match MountConfig::load(PROFILE) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "could not load profile; using defaults");
            MountConfig::default()
        }
    };

    let controller = MountController::new(config);

    // Settings adapter: persist park-state transitions so AtPark
    // survives power cycles.
    {
        let controller = controller.clone();
        let mut events = controller.events().subscribe();
        tokio::task::spawn(async move {
            while let Ok(event) = events.recv().await {
                if matches!(event, MountEvent::AtPark(_)) {
                    let snapshot = controller.config_snapshot().await;
                    if let Err(e) = snapshot.store(PROFILE) {
                        warn!(error = %e, "failed to persist park state");
                    }
                }
            }
        });
    }

    let mut server = Server::new(CargoServerInfo!());
    server.listen_addr = addr!("0.0.0.0:11111");
    server.devices.register(MountDevice::new(controller));

    info!(addr = %server.listen_addr, "starting Alpaca server");
    match server.start().await? {}
}
