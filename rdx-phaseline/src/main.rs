use anyhow::{Context, Result};
use phaseline::prelude::*;
use std::path::PathBuf;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    phaseline::logging::init_logging("info");

    // 2. Load configuration: an optional path argument, then PHASELINE__* overrides.
    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = PhaselineConfig::load(path.as_deref())
        .with_context(|| format!("loading configuration from {:?}", path))?;

    // 3. Build the engine on the real clock.
    let clock = SystemClock::shared();
    let engine = PhaselineEngine::from_config(&config, clock.clone());

    // 4. Attach a probe channel for every configured subsystem.
    attach_probes(&engine, &config, &clock).await;

    // 5. Log what the experience does.
    spawn_event_listener(&engine);

    // 6. Schedule the launch and run until Ctrl+C.
    engine.schedule_launch(&config.timeline, &config.debug).await;
    engine.run().await?;

    if let Some(stats) = engine.status().await.network {
        info!(
            sent = stats.sent,
            dropped = stats.dropped,
            reopened = stats.reopened,
            "haptic channel summary"
        );
    }
    Ok(())
}

async fn attach_probes(engine: &PhaselineEngine, config: &PhaselineConfig, clock: &SharedClock) {
    let mut sequencer = engine.sequencer().await;
    for subsystem in &config.subsystems {
        sequencer.attach(Box::new(ChannelProbe::new(subsystem.name.clone(), clock.clone())));
    }
    info!(channels = ?sequencer.subsystems().names(), "probe channels attached");
}

fn spawn_event_listener(engine: &PhaselineEngine) {
    let mut events = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SequencerEvent::SubsystemFailed { name, op, error } => {
                    warn!("[SUBSYSTEM] {} failed during {}: {}", name, op, error)
                }
                other => info!("[SEQUENCER] => {:?}", other),
            }
        }
    });
}
