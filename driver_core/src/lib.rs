pub mod bridge;
pub mod config;
pub mod device;
pub mod distortion;
mod entry;
pub mod geometry;
pub mod graphics;
pub mod host_interfaces;
pub mod interceptors;
pub mod introspection;
pub mod loader;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod prober;
#[allow(dead_code)]
pub mod runtime_interfaces;
pub mod services;
pub mod time;
pub mod wrappers;

pub use entry::create_plugin;

pub const DRIVER_NAME: &str = "illixr";
