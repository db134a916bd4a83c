//! `balrogd`: the cat-flap prey-detection pipeline binary.
//!
//! Wires `FrameRing` + camera producer + cascade worker pool + aggregator +
//! verdict sender pool + bot listener together: one camera thread, K
//! cascade workers, one aggregator, one bot listener hosting the shared
//! `tokio` runtime, and a small sender pool.

mod bot;
mod logging;

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use balrog_config::{BalrogConfig, Env};
use cascade::{Cascade, StubCascade};
use clap::Parser;
use flap::{FlapController, NullFlapController, SurepetFlapController};
use ring::FrameRing;
use sender::{MessageSender, NullMessageSender, TelegramMessageSender};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Cat-flap prey-detection pipeline")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Override `stdout_debug_level` from the config file
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let env = Env::load();
    let config = BalrogConfig::load(&args.config)?;
    env.require_live_backends()
        .context("missing required environment variables")?;
    config
        .general
        .timezone()
        .context("invalid general.local_timezone in config file")?;

    let _logging_guards = logging::init(
        &config.logging,
        args.log_level.as_deref(),
        env.log_folder_override.as_deref(),
    )?;

    info!(target: "balrog::main", "balrogd starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let handle = runtime.handle().clone();

    let stop = Arc::new(AtomicBool::new(false));
    let clean_queue = Arc::new(AtomicBool::new(false));

    let ring = Arc::new(FrameRing::new(config.general.max_frame_buffers));

    let message_sender: Arc<dyn MessageSender> = if env.use_null_telegram {
        Arc::new(NullMessageSender::new())
    } else {
        Arc::new(TelegramMessageSender::new(
            handle.clone(),
            env.telegram_bot_token.clone().expect("validated by require_live_backends"),
            env.telegram_chat_id.clone().expect("validated by require_live_backends"),
        ))
    };

    let flap: Arc<dyn FlapController> = {
        let user = env.surepet_user.clone().expect("validated by require_live_backends");
        let password = env.surepet_password.clone().expect("validated by require_live_backends");
        match SurepetFlapController::new(handle.clone(), user, password) {
            Ok(controller) => Arc::new(controller),
            Err(err) => {
                warn!(target: "balrog::main", %err, "failed to log in to surepet, falling back to a null flap controller");
                Arc::new(NullFlapController::new())
            }
        }
    };

    let camera_source = build_camera_source(&env)?;

    let cascade_impl: Arc<dyn Cascade> = Arc::new(StubCascade::new());
    cascade_pool::warm_up(&*cascade_impl);

    let camera_handle = {
        let ring = Arc::clone(&ring);
        let stop = Arc::clone(&stop);
        let frame_interval = Duration::from_secs_f64(1.0 / config.camera.camera_fps.max(1) as f64);
        let cleanup_threshold = config.camera.camera_cleanup_frames_threshold;
        std::thread::spawn(move || {
            camera::run_producer(camera_source, ring, frame_interval, cleanup_threshold, stop);
        })
    };

    let cascade_handles = cascade_pool::spawn_pool(
        cascade_impl,
        Arc::clone(&ring),
        config.general.max_frame_processor_threads.max(1),
        Some(PathBuf::from(&config.logging.log_base_folder).join("cascade_failures")),
        config.general.timestamp_format.clone(),
        Arc::clone(&stop),
    );

    let (verdict_tx, verdict_rx) = aggregator::dispatch::channel();
    let sender_handles = aggregator::dispatch::spawn_senders(
        Arc::clone(&message_sender),
        verdict_rx,
        config.general.max_message_sender_threads.max(1),
    );

    let aggregator_config = aggregator::AggregatorConfig {
        min_aggregation_frames_threshold: config.general.min_aggregation_frames_threshold,
        event_reset_threshold: config.model.event_reset_threshold,
        cat_counter_threshold: config.model.cat_counter_threshold,
        cumulus_prey_threshold: config.model.cumulus_prey_threshold,
        cumulus_no_prey_threshold: config.model.cumulus_no_prey_threshold,
    };
    let aggregator_handle = {
        let ring = Arc::clone(&ring);
        let message_sender = Arc::clone(&message_sender);
        let stop = Arc::clone(&stop);
        let clean_queue = Arc::clone(&clean_queue);
        std::thread::spawn(move || {
            aggregator::run_aggregator(
                ring,
                aggregator_config,
                message_sender,
                verdict_tx,
                Arc::new(aggregator::event_sink::NoopEventSink),
                stop,
                clean_queue,
            );
        })
    };

    let bot_handle = if env.use_null_telegram {
        None
    } else {
        let bot_config = bot::BotConfig {
            token: env.telegram_bot_token.clone().expect("validated by require_live_backends"),
            chat_id: env.telegram_chat_id.clone().expect("validated by require_live_backends"),
            let_in_open_seconds: config.flap.let_in_open_seconds,
            log_base_folder: PathBuf::from(&config.logging.log_base_folder),
            log_file_name: config.logging.log_file_name.clone(),
            log_dbg_file_name: config.logging.log_dbg_file_name.clone(),
            max_log_files_kept: config.logging.max_log_files_kept,
        };
        let listener = bot::BotListener::new(
            bot_config,
            Arc::clone(&message_sender),
            Arc::clone(&flap),
            Arc::clone(&stop),
            Arc::clone(&clean_queue),
        );
        let handle_for_bot = handle.clone();
        Some(std::thread::spawn(move || listener.run(handle_for_bot)))
    };

    camera_handle.join().expect("camera thread panicked");
    for h in cascade_handles {
        h.join().expect("cascade worker panicked");
    }
    aggregator_handle.join().expect("aggregator thread panicked");
    for h in sender_handles {
        h.join().expect("sender worker panicked");
    }
    if let Some(h) = bot_handle {
        h.join().expect("bot listener panicked");
    }

    info!(target: "balrog::main", "balrogd exiting cleanly");
    Ok(())
}

#[cfg(feature = "live-camera")]
fn build_camera_source(env: &Env) -> Result<Box<dyn camera::CameraSource>> {
    if env.use_null_camera {
        return Ok(Box::new(camera::DebugCameraSource::new("assets/warmup_frame.jpg")));
    }
    let uri = env
        .camera_stream_uri
        .clone()
        .context("CAMERA_STREAM_URI is required when BALROG_USE_NULL_CAMERA is unset")?;
    Ok(Box::new(camera::LiveCameraSource::new(uri)))
}

#[cfg(not(feature = "live-camera"))]
fn build_camera_source(env: &Env) -> Result<Box<dyn camera::CameraSource>> {
    if !env.use_null_camera {
        anyhow::bail!(
            "a live camera was requested but this binary was built without the `live-camera` feature"
        );
    }
    Ok(Box::new(camera::DebugCameraSource::new("assets/warmup_frame.jpg")))
}
