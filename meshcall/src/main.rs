use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use meshcall_conference::{
    ConferenceSession, FrameCollector, LoopbackFactory, Renderer, Resolution, SessionConfig,
    SyntheticCamera, Viewport,
};
use meshcall_core::{
    bootstrap::{self, load_config_from},
    logging, Config,
};

#[derive(Parser, Debug)]
#[command(name = "meshcall")]
#[command(about = "Simulated multi-party SVC video call", long_about = None)]
struct Args {
    /// Configuration file (YAML)
    #[arg(long, env = "MESHCALL_CONFIG_PATH")]
    config: Option<String>,

    /// Number of participants including yourself
    #[arg(long)]
    participants: Option<usize>,

    /// Share the screen during the call
    #[arg(long)]
    present: bool,

    /// Pictures to encode before hanging up (0 = until interrupted)
    #[arg(long)]
    frames: Option<u64>,

    /// Camera codec (VP8 or VP9)
    #[arg(long)]
    codec: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(participants) = self.participants {
            config.conference.participants = participants;
        }
        if self.present {
            config.conference.presenting = true;
        }
        if let Some(frames) = self.frames {
            config.encoder.frames = frames;
        }
        if let Some(codec) = &self.codec {
            config.conference.codec.clone_from(codec);
        }
        if let Some(level) = &self.log_level {
            config.logging.level.clone_from(level);
        }
    }
}

fn session_config(config: &Config) -> SessionConfig {
    SessionConfig {
        codec: config.conference.codec.clone(),
        leg_channel_capacity: config.transport.leg_channel_capacity,
        viewport: Viewport {
            width: config.viewport.width,
            height: config.viewport.height,
        },
        keyframe_interval: config.encoder.keyframe_interval,
        layer_payload_bytes: config.encoder.layer_payload_bytes,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration, CLI flags win
    let mut config = load_config_from(args.config.as_deref())?;
    args.apply(&mut config);
    bootstrap::validate(&config)?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!(
        participants = config.conference.participants,
        presenting = config.conference.presenting,
        codec = %config.conference.codec,
        "meshcall starting"
    );

    // 3. Camera and preview
    let camera = SyntheticCamera::new(
        Resolution::new(config.camera.width, config.camera.height),
        config.camera.frame_rate,
    );
    let mut session = ConferenceSession::new(
        session_config(&config),
        Arc::new(camera),
        Arc::new(LoopbackFactory::new()),
    );
    session.start_camera().await?;
    let preview = FrameCollector::new();
    session.show_camera_preview(&preview).await?;

    // 4. Call
    let receivers = config.conference.participants - 1;
    let renderers: Vec<Arc<dyn Renderer>> = (0..receivers)
        .map(|_| Arc::new(FrameCollector::new()) as Arc<dyn Renderer>)
        .collect();
    session
        .hold_call(
            config.conference.participants,
            config.conference.presenting,
            renderers,
        )
        .await?;

    // 5. Frame loop
    let mut ticker = tokio::time::interval(Duration::from_millis(config.encoder.frame_interval_ms.max(1)));
    let limit = config.encoder.frames;
    let mut sent = 0u64;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    while limit == 0 || sent < limit {
        tokio::select! {
            () = &mut shutdown => {
                info!("Shutdown signal received, hanging up");
                break;
            }
            _ = ticker.tick() => {
                match session.send_picture().await {
                    Ok(0) => warn!(picture = sent, "Picture reached no receiver"),
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "Failed to send picture");
                        break;
                    }
                }
                sent += 1;
            }
        }
    }

    // 6. Report
    let report = session.finish().await?;
    println!("{}", report.to_json()?);
    info!(pictures = report.pictures_encoded, "meshcall stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_fix_an_invalid_file() {
        let mut config = Config::default();
        config.conference.participants = 1;
        assert!(config.validate().is_err());

        Args::parse_from(["meshcall", "--participants", "5"]).apply(&mut config);
        assert!(config.validate().is_ok());
        assert_eq!(config.conference.participants, 5);
    }

    #[test]
    fn test_flags_left_unset_keep_file_values() {
        let mut config = Config::default();
        config.conference.codec = "VP8".to_string();
        Args::parse_from(["meshcall", "--present"]).apply(&mut config);
        assert_eq!(config.conference.codec, "VP8");
        assert!(config.conference.presenting);
    }
}
