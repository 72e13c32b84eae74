//! The configuration of the demo, given from environment variables and lazy
//! initialized when needed.

use std::str::FromStr;
use std::env;

use once_cell::race::OnceBool;
use once_cell::sync::OnceCell;

use tracing::warn;


/// Parse an environment variable, an invalid value is logged and ignored.
fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    let value = env::var(name).ok()?;
    match value.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("ignoring invalid {name}: {value:?}");
            None
        }
    }
}

/// Seed of the terrain noise.
///
/// To change it, set `TERRA_SEED=<integer>`.
pub fn seed() -> i64 {
    static ENV: OnceCell<i64> = OnceCell::new();
    *ENV.get_or_init(|| parse_var("TERRA_SEED").unwrap_or(0))
}

/// Number of chunks around the camera chunk kept in the render window.
///
/// To change it, set `TERRA_VIEW_DISTANCE=<even integer>`.
pub fn view_distance() -> usize {
    static ENV: OnceCell<usize> = OnceCell::new();
    *ENV.get_or_init(|| parse_var("TERRA_VIEW_DISTANCE").unwrap_or(2))
}

/// Number of ticks to run before stopping, zero runs until interrupted.
///
/// To change it, set `TERRA_TICKS=<integer>`.
pub fn ticks() -> u64 {
    static ENV: OnceCell<u64> = OnceCell::new();
    *ENV.get_or_init(|| parse_var("TERRA_TICKS").unwrap_or(1200))
}

/// Camera speed, in pixels per tick.
///
/// To change it, set `TERRA_SPEED=<number>`.
pub fn speed() -> f32 {
    static ENV: OnceCell<f32> = OnceCell::new();
    *ENV.get_or_init(|| parse_var("TERRA_SPEED").unwrap_or(48.0))
}

/// Return true if ticks are not padded to the target tick duration.
///
/// To enable this feature, set `TERRA_FAST=1`.
pub fn fast() -> bool {
    static ENV: OnceBool = OnceBool::new();
    ENV.get_or_init(|| {
        env::var_os("TERRA_FAST")
            .map(|s| s.as_encoded_bytes() == b"1")
            .unwrap_or(false)
    })
}
