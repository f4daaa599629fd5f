//! End-to-end scenarios for preloading, playback, and cancellation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use vidify_core::scheduler::rank_candidates;
use vidify_core::{
    BandwidthArbiter, Feed, LoadScheduler, PlaybackDriver, PlaybackState, SimClock, VidifyConfig,
    VideoProfile, Viewport,
};
use vidify_sim::{FeedSimulation, SimulationError};

fn config(bandwidth_mbps: f64, max_flows: usize) -> VidifyConfig {
    let mut config = VidifyConfig::for_testing();
    config.network.bandwidth_mbps = bandwidth_mbps;
    config.network.max_flows = max_flows;
    config.network.chunk_duration_secs = 4.0;
    config.layout.viewport_height = 1080.0;
    config.layout.video_height = 1080.0;
    config.layout.preload_distance_factor = 1.5;
    config
}

fn uniform_feed(count: usize, duration: f64, bitrate: f64) -> Feed {
    Feed::from_profiles(
        (0..count).map(|_| VideoProfile::new(duration, bitrate)),
        1080.0,
    )
}

#[tokio::test(start_paused = true)]
async fn single_video_loads_in_size_over_bandwidth() {
    let config = config(10.0, 1);
    let feed = Arc::new(uniform_feed(1, 20.0, 2.0));
    assert_eq!(feed.videos()[0].profile().size_mb(), 5.0);

    let arbiter = Arc::new(BandwidthArbiter::from_config(&config.network));
    let clock = SimClock::default();
    let mut scheduler = LoadScheduler::new(
        Arc::clone(&feed),
        Arc::clone(&arbiter),
        &config,
        clock,
        CancellationToken::new(),
    );

    assert_eq!(scheduler.tick(&Viewport::at(0.0, 1080.0)), 1);
    scheduler.drain().await;

    let snapshot = feed.videos()[0].snapshot();
    assert_eq!(snapshot.loaded.ranges().len(), 1);
    assert_eq!(snapshot.loaded.ranges()[0].start, 0.0);
    assert_eq!(snapshot.loaded.ranges()[0].end, 20.0);
    assert!(!snapshot.loading);

    // 5 MB * 8 / 10 Mbps
    let elapsed = clock.elapsed_secs();
    assert!((elapsed - 4.0).abs() < 0.05, "elapsed {elapsed}");
    assert_eq!(arbiter.stats().released, 1);
}

#[tokio::test(start_paused = true)]
async fn visible_video_ranks_first_and_flows_stay_bounded() {
    let config = config(10.0, 2);
    let feed = Arc::new(uniform_feed(3, 60.0, 4.0));
    let viewport = Viewport::at(0.0, 1080.0);

    let candidates = rank_candidates(&feed, &viewport, 1.5);
    assert_eq!(candidates.len(), 3);
    assert_eq!(candidates[0].index, 0);
    assert!(candidates[0].is_current);
    assert_eq!(candidates[0].distance, 0.0);

    let arbiter = Arc::new(BandwidthArbiter::from_config(&config.network));
    let cancel = CancellationToken::new();
    let scheduler = LoadScheduler::new(
        Arc::clone(&feed),
        Arc::clone(&arbiter),
        &config,
        SimClock::default(),
        cancel.clone(),
    );
    let (_viewport_tx, viewport_rx) = watch::channel(viewport);
    let handle = tokio::spawn(scheduler.run(viewport_rx));

    tokio::task::yield_now().await;
    assert!(feed.videos()[0].is_loading());

    // Video 0 finishes at 24 s, video 1 at 48 s, video 2 (launched at 25 s) at 73 s
    for _ in 0..400 {
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(arbiter.active_flows() <= 2);
        let loading = feed.videos().iter().filter(|v| v.is_loading()).count();
        assert!(loading <= 2);
    }

    cancel.cancel();
    let stats = handle.await.unwrap();

    assert!(feed.videos().iter().all(|v| v.is_fully_loaded()));
    assert_eq!(stats.completed, 3);
    let flows = arbiter.stats();
    assert_eq!(flows.peak, 2);
    assert_eq!(flows.started, flows.released);
}

#[test]
fn fast_scrolling_records_no_watch_time() {
    let config = config(10.0, 3);
    let feed = Arc::new(uniform_feed(3, 20.0, 2.0));
    feed.videos()[0].record_loaded(0.0, 20.0);
    let mut driver = PlaybackDriver::new(Arc::clone(&feed), &config.playback);

    let flicking =
        Viewport::at(0.0, 1080.0).with_speed(config.playback.scroll_speed_threshold * 4.0);
    for _ in 0..20 {
        let (_, state) = driver.step(&flicking, 0.1).unwrap();
        assert_eq!(state, PlaybackState::Scrolling);
    }

    let snapshot = feed.videos()[0].snapshot();
    assert!(snapshot.watched.is_empty());
    assert_eq!(snapshot.position, 0.0);
    assert!(!snapshot.playing);
}

#[test]
fn buffering_holds_position_until_data_arrives() {
    let config = config(10.0, 3);
    let feed = Arc::new(uniform_feed(1, 20.0, 2.0));
    let video = Arc::clone(&feed.videos()[0]);
    video.record_loaded(0.0, 1.0);
    let mut driver = PlaybackDriver::new(Arc::clone(&feed), &config.playback);
    let viewport = Viewport::at(0.0, 1080.0);

    for _ in 0..30 {
        driver.step(&viewport, 0.1);
    }
    let stalled = video.snapshot();
    assert!((stalled.position - 1.0).abs() < 1e-9);
    assert!(stalled.is_buffering());
    assert!(!stalled.playing);

    video.record_loaded(1.0, 4.0);
    let (_, state) = driver.step(&viewport, 0.1).unwrap();
    assert_eq!(state, PlaybackState::Playing);
    assert!(video.position() > 1.0);
}

#[test]
fn reset_clears_history_but_keeps_loaded_data() {
    let feed = uniform_feed(1, 20.0, 2.0);
    let video = &feed.videos()[0];
    video.record_loaded(0.0, 12.0);
    video.advance_playback(5.0);
    video.advance_playback(2.0);

    let before = video.snapshot();
    assert!(!before.watched.is_empty());
    assert_eq!(before.position, 7.0);

    video.reset();

    let after = video.snapshot();
    assert!(after.watched.is_empty());
    assert_eq!(after.position, 0.0);
    assert_eq!(after.loaded, before.loaded);
}

#[tokio::test(start_paused = true)]
async fn full_simulation_holds_every_invariant() {
    let mut config = VidifyConfig::for_testing();
    config.simulation.video_count = 12;
    config.network.max_flows = 3;

    let simulation = FeedSimulation::new(config).unwrap();
    let report = simulation.run_for(180.0).await.unwrap();

    assert!(report.success(), "{}", report.summary());
    assert!(report.metrics.peak_active_flows <= 3);
    assert!(report.flows.peak <= 3);
    assert_eq!(report.flows.active, 0);
    assert_eq!(report.flows.started, report.flows.released);
    assert!(report.videos.iter().all(|v| !v.loading));
    assert!(report.total_watched_secs() > 0.0);
    assert!(report.user.steps > 0);
}

#[tokio::test(start_paused = true)]
async fn same_seed_same_outcome() {
    let run = || async {
        let mut config = VidifyConfig::for_testing();
        config.simulation.seed = Some(2024);
        FeedSimulation::new(config)
            .unwrap()
            .run_for(20.0)
            .await
            .unwrap()
    };

    let first = run().await;
    let second = run().await;

    let durations = |report: &vidify_sim::SimulationReport| -> Vec<f64> {
        report.videos.iter().map(|v| v.duration_secs).collect()
    };
    assert_eq!(first.seed, 2024);
    assert_eq!(durations(&first), durations(&second));
    assert_eq!(first.user, second.user);
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_the_run_and_releases_flows() {
    let mut config = VidifyConfig::for_testing();
    config.network.bandwidth_mbps = 1.0;

    let simulation = FeedSimulation::new(config).unwrap();
    let arbiter = Arc::clone(simulation.arbiter());
    let feed = Arc::clone(simulation.feed());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });

    let report = simulation.run_until(3_600.0, cancel).await.unwrap();

    assert!(report.cancelled);
    assert!(report.duration_secs < 10.0);
    assert!(report.scheduler.cancelled > 0);
    assert_eq!(arbiter.active_flows(), 0);
    assert!(feed.videos().iter().all(|v| !v.is_loading()));
}

#[tokio::test(start_paused = true)]
async fn invalid_duration_is_an_error() {
    let simulation = FeedSimulation::new(VidifyConfig::for_testing()).unwrap();
    assert!(matches!(
        simulation.run_for(f64::NAN).await,
        Err(SimulationError::InvalidDuration { .. })
    ));
}
