//! Site Monitoring Daemon
//!
//! Wires the alarm store, the hazard rules and one monitor worker per
//! configured camera, then runs until interrupted.

mod settings;

pub use settings::{CameraSettings, LogSettings, Settings, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use camera_capture::ImageDirSource;
use hazard_detect::{parse_hazard_list, ReplayObjectDetector, SiteRules};
use monitor::MonitorRegistry;
use storage::{AlarmRepository, ImageStore, SqliteAlarmSink};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Initialize logging
pub fn init_logging(log: &LogSettings) -> anyhow::Result<()> {
    let level = log.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    let installed = if log.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    installed.context("Failed to set tracing subscriber")
}

/// Start every configured camera on `registry`; returns how many started
pub fn start_cameras(registry: &MonitorRegistry, cameras: &[CameraSettings]) -> anyhow::Result<usize> {
    let mut started = 0;

    for camera in cameras {
        let kinds = parse_hazard_list(&camera.hazards)
            .with_context(|| format!("camera {}: bad hazard list", camera.device_id))?;
        let source = ImageDirSource::new(&camera.frames_dir, camera.looping);

        if registry.start(&camera.device_id, Box::new(source), kinds) {
            started += 1;
        } else {
            warn!("Camera {} not started", camera.device_id);
        }
    }

    Ok(started)
}

/// Run the daemon until Ctrl-C
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let repository = AlarmRepository::connect(&settings.database_url, settings.max_connections)
        .await
        .context("Failed to open alarm database")?;
    let images = ImageStore::new(&settings.evidence_dir, settings.evidence_url_prefix.clone())
        .await
        .context("Failed to prepare evidence directory")?;
    let sink = Arc::new(SqliteAlarmSink::new(repository.clone(), images));

    let objects = match &settings.detections_file {
        Some(path) => ReplayObjectDetector::from_json_file(path)?,
        None => {
            warn!("No detections file configured; only absence hazards can fire");
            ReplayObjectDetector::new(HashMap::new())
        }
    };
    let detector = Arc::new(SiteRules::new(settings.rules.clone(), objects));

    let registry = MonitorRegistry::new(detector, sink, settings.monitor.clone())?;
    let started = start_cameras(&registry, &settings.cameras)?;
    if started == 0 {
        warn!("No cameras running");
    }
    info!("Monitoring {} camera(s): {:?}", started, registry.active_devices());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown requested");
    registry.shutdown().await;
    info!("{} alarm(s) on record", repository.count().await?);
    repository.close().await;

    Ok(())
}
