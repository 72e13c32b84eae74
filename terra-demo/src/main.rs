//! A headless demo streaming the terrain around a scripted camera.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::level_filters::LevelFilter;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

pub mod config;

// The demo drives the terrain with a camera following a fixed path.
pub mod demo;


pub fn main() {

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy())
        .init();

    let running = Arc::new(AtomicBool::new(true));
    let handler_running = Arc::clone(&running);
    if let Err(err) = ctrlc::set_handler(move || handler_running.store(false, Ordering::Relaxed)) {
        warn!("failed to set interrupt handler: {err}");
    }

    let mut demo = match demo::Demo::new() {
        Ok(demo) => demo,
        Err(err) => {
            error!("invalid terrain configuration: {err}");
            return;
        }
    };

    let ticks = config::ticks();
    while running.load(Ordering::Relaxed) && (ticks == 0 || demo.tick_count() < ticks) {
        demo.tick_padded();
    }

    demo.stop();

}
