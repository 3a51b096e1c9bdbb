//! Path and route utilities.
//!
//! Pure functions for path manipulation. No side effects.
//!
//! - [`fs`]: Filesystem path normalization (`normalize_path`, `watch_target`)
//! - [`route`]: Route normalization (`normalize_route`, `route_key`)

pub mod fs;
pub mod route;

pub use fs::{normalize_path, resolve_path, watch_target};
pub use route::{
    normalize_route, normalized_key, normalized_to_relative_path, route_key,
    route_to_relative_path,
};
