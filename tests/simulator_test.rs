//! End-to-end scenarios against the simulator driver.

#[macro_use]
extern crate assert_float_eq;

use std::sync::Arc;
use std::time::{Duration, Instant};

use skymount_alpaca::config::{MountConfig, MountKind, ParkPosition};
use skymount_alpaca::mount_control::MountController;
use skymount_alpaca::util::{AlignmentMode, GuideDirection, RunState, SlewType};

fn sim_config() -> MountConfig {
    let mut config = MountConfig::default();
    config.connection.mount_kind = MountKind::Simulator;
    config.site.latitude = 37.0;
    config.site.longitude = -122.0;
    config.geometry.alignment_mode = AlignmentMode::GermanPolar;
    config.home_park.home_axis_x = 0.;
    config.home_park.home_axis_y = 90.;
    config.home_park.park_positions = vec![ParkPosition {
        name: "Default".to_string(),
        x: 180.,
        y: 90.,
    }];
    config.home_park.selected_park = "Default".to_string();
    config.other.auto_track = true;
    config
}

async fn running_controller(config: MountConfig) -> Arc<MountController> {
    let controller = MountController::new(config);
    assert!(controller.connect().await, "simulator connect failed");
    controller.start().await.unwrap();
    controller
}

async fn wait_until<F, Fut>(timeout: Duration, mut pred: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if pred().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cold_start_connect_and_slew() {
    let controller = running_controller(sim_config()).await;
    controller.set_tracking(false).await.unwrap();

    controller.slew_to_coordinates_async(6.0, 0.0).await.unwrap();
    assert!(controller.is_slewing().await, "slewing must be observable");

    let done = wait_until(Duration::from_secs(30), || {
        let c = controller.clone();
        async move { !c.is_slewing().await }
    })
    .await;
    assert!(done, "slew did not finish within 30 s");

    let ra = controller.right_ascension().await.unwrap();
    let dec = controller.declination().await.unwrap();
    assert_float_absolute_eq!(ra, 6.0, 0.001);
    assert_float_absolute_eq!(dec, 0.0, 0.005);
    assert!(!controller.at_park().await);
    assert!(!controller.is_home().await);

    controller.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn park_unpark_round_trip() {
    let controller = running_controller(sim_config()).await;
    controller.set_tracking(true).await.unwrap();

    controller.park().await.unwrap();
    assert!(controller.at_park().await);
    assert!(!controller.is_tracking().await, "parked implies not tracking");
    // The park flag is pushed to the settings snapshot for persistence.
    assert!(controller.config_snapshot().await.home_park.at_park);

    controller.unpark().await.unwrap();
    assert!(!controller.at_park().await);
    // auto-track restores the pre-park tracking state.
    assert!(controller.is_tracking().await);

    controller.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn abort_slew_stops_quickly() {
    let controller = running_controller(sim_config()).await;
    controller.set_tracking(false).await.unwrap();

    controller
        .slew_to_coordinates_async(18.0, 60.0)
        .await
        .unwrap();
    assert!(controller.is_slewing().await);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let abort_at = Instant::now();
    controller.abort_slew().await.unwrap();
    let stopped = wait_until(Duration::from_secs(1), || {
        let c = controller.clone();
        async move { !c.is_slewing().await }
    })
    .await;
    assert!(stopped, "slewing still true 1 s after abort");
    assert!(abort_at.elapsed() < Duration::from_secs(5));
    assert_eq!(controller.slew_state().await, SlewType::None);

    controller.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn limit_violation_stops_tracking() {
    let mut config = sim_config();
    // Fork mount so the primary axis can sit past the +/-90 window.
    config.geometry.alignment_mode = AlignmentMode::Polar;
    config.limits.limit_tracking = true;
    config.limits.axis_limit_x = 90.;
    let controller = running_controller(config).await;

    controller.set_tracking(true).await.unwrap();

    // Craft a sync that lands the primary axis at ~+91.5 degrees.
    let lst = controller.sidereal_time().await.unwrap();
    let ra = (lst - 6.1).rem_euclid(24.);
    controller.sync_to_coordinates(ra, 0.0).await.unwrap();

    // Within two display ticks the monitor must react.
    let stopped = wait_until(Duration::from_millis(600), || {
        let c = controller.clone();
        async move { !c.is_tracking().await }
    })
    .await;
    assert!(stopped, "tracking survived a limit breach");
    assert!(controller.get_last_error().is_some());

    controller.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pulse_guide_duration_envelope() {
    let controller = running_controller(sim_config()).await;
    controller.set_tracking(true).await.unwrap();

    let start = Instant::now();
    controller
        .pulse_guide(GuideDirection::West, 500)
        .await
        .unwrap();
    // The flag must already be up when the call returns.
    assert!(controller.is_pulse_guiding().await.unwrap());
    assert!(start.elapsed() < Duration::from_millis(20));

    tokio::time::sleep(Duration::from_millis(460)).await;
    assert!(
        controller.is_pulse_guiding().await.unwrap(),
        "pulse ended early"
    );

    let cleared = wait_until(Duration::from_millis(120), || {
        let c = controller.clone();
        async move { !c.is_pulse_guiding().await.unwrap_or(true) }
    })
    .await;
    assert!(cleared, "pulse overran its duration");

    controller.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pec_lookup_keeps_tracking_alive() {
    let mut config = sim_config();
    config.other.pec_on = true;
    let controller = running_controller(config).await;
    controller.set_tracking(true).await.unwrap();

    // A small sinusoidal worm curve, one period over the table.
    let bins: Vec<f64> = (0..100)
        .map(|i| (i as f64 / 100. * std::f64::consts::TAU).sin() * 1e-6)
        .collect();
    controller.install_pec_table(bins, 0.).await.unwrap();
    controller.set_pec_enabled(true).await.unwrap();

    // A few display ticks with the correction folded in must leave
    // tracking running and error-free.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(controller.is_tracking().await);
    assert!(controller.get_last_error().is_none());

    controller.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn emergency_stop_faults_the_mount() {
    let controller = running_controller(sim_config()).await;
    controller.set_tracking(true).await.unwrap();

    controller.emergency_stop().await.unwrap();
    assert_eq!(controller.run_state().await, RunState::Faulted);
    assert!(!controller.is_slewing().await);

    // Recovery requires a stop/start cycle.
    assert!(controller.start().await.is_err());
    controller.stop().await.unwrap();
    controller.start().await.unwrap();
    assert!(controller.is_running().await);

    controller.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sync_moves_reported_position() {
    let controller = running_controller(sim_config()).await;
    controller.set_tracking(false).await.unwrap();

    controller.sync_to_coordinates(18., 33.).await.unwrap();
    assert_float_absolute_eq!(controller.right_ascension().await.unwrap(), 18., 1e-3);
    assert_float_absolute_eq!(controller.declination().await.unwrap(), 33., 1e-3);

    controller.set_target_ra(12.).await.unwrap();
    controller.set_target_dec(-40.).await.unwrap();
    controller.sync_to_target().await.unwrap();
    assert_float_absolute_eq!(controller.right_ascension().await.unwrap(), 12., 1e-3);
    assert_float_absolute_eq!(controller.declination().await.unwrap(), -40., 1e-3);

    controller.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn find_home_latches_at_home() {
    let controller = running_controller(sim_config()).await;
    controller.set_tracking(false).await.unwrap();

    controller.sync_to_coordinates(3., 20.).await.unwrap();
    controller.find_home().await.unwrap();

    // The display tick refreshes the AtHome flag from the axis window.
    let home = wait_until(Duration::from_secs(1), || {
        let c = controller.clone();
        async move { c.is_home().await }
    })
    .await;
    assert!(home, "mount not reporting home after find_home");

    controller.stop().await.unwrap();
}

mod coordinate_sweep {
    use super::*;
    use rand::{Rng, SeedableRng};
    use skymount_alpaca::astro_math::{self, CoordContext};
    use skymount_alpaca::util::Hemisphere;

    #[test]
    fn radec_round_trip_sweep() {
        let ctx = CoordContext {
            latitude: 37.0,
            longitude: -122.0,
            alignment: AlignmentMode::GermanPolar,
            polar_mode: skymount_alpaca::config::PolarMode::Right,
            hemisphere: Hemisphere::Northern,
        };
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
        let lst = 11.3;
        for _ in 0..1000 {
            let ra: f64 = rng.gen_range(0.0..24.0);
            let dec: f64 = rng.gen_range(-89.0..89.0);
            let axes = astro_math::radec_to_axes_xy(ra, dec, lst, &ctx);
            let (ra_back, dec_back) = astro_math::axes_xy_to_radec(axes, lst, &ctx);
            assert!(
                astro_math::modulo(ra_back - ra, 24.).min(astro_math::modulo(ra - ra_back, 24.))
                    < 1e-8,
                "ra {} -> {}",
                ra,
                ra_back
            );
            assert!((dec_back - dec).abs() < 1e-8, "dec {} -> {}", dec, dec_back);
        }
    }
}
