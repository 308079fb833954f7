use std::ffi::CString;
use std::time::Duration;

use lazy_static::lazy_static;

pub const SPEW_ENV: &str = "ILLIXR_PRINT_SPEW";
pub const DEBUG_ENV: &str = "ILLIXR_PRINT_DEBUG";
pub const PATH_ENV: &str = "ILLIXR_PATH";
pub const COMP_ENV: &str = "ILLIXR_COMP";

/// Fixed geometry of the target headset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayParams {
    pub width_pixels: u32,
    pub height_pixels: u32,
    pub width_meters: f32,
    pub height_meters: f32,
    pub lens_separation: f32,
    pub lens_vertical_position: f32,
    /// Degrees. Field of view of the left view; the left view mirrors the right one, so this
    /// is informational.
    pub fov_x: f32,
    /// Degrees. Horizontal field of view of the right view. Vertical angles follow from the
    /// viewing distance.
    pub fov_y: f32,
    /// Hz.
    pub frequency: f64,
}

impl DisplayParams {
    pub const DEFAULT: DisplayParams = DisplayParams {
        width_pixels: 2560,
        height_pixels: 1440,
        width_meters: 0.11047,
        height_meters: 0.06214,
        lens_separation: 0.11047 / 2.0,
        lens_vertical_position: 0.06214 / 2.0,
        fov_x: 90.0,
        fov_y: 90.0,
        frequency: 120.0,
    };

    /// Nominal time between two vsyncs.
    pub fn period(&self) -> Duration {
        Duration::from_nanos((1_000_000_000.0 / self.frequency) as u64)
    }
}

impl Default for DisplayParams {
    fn default() -> Self {
        DisplayParams::DEFAULT
    }
}

/// Parses a boolean option the way the host does: anything that is not an explicit "false"
/// spelling counts as true.
pub fn debug_string_to_bool(value: &str) -> bool {
    !matches!(
        value,
        "false" | "FALSE" | "off" | "OFF" | "no" | "NO" | "n" | "N" | "f" | "F" | "0"
    )
}

pub fn bool_option(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => debug_string_to_bool(&value),
        Err(_) => default,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugOptions {
    pub print_spew: bool,
    pub print_debug: bool,
}

lazy_static! {
    static ref DEBUG_OPTIONS: DebugOptions = DebugOptions {
        print_spew: bool_option(SPEW_ENV, false),
        print_debug: bool_option(DEBUG_ENV, false),
    };
}

impl DebugOptions {
    /// The process-wide options, read from the environment on first use.
    pub fn get() -> DebugOptions {
        *DEBUG_OPTIONS
    }
}

/// Runtime module and plugin list selected through the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    pub runtime_path: CString,
    pub plugins: CString,
}

impl ProbeConfig {
    pub fn from_env() -> Option<ProbeConfig> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<ProbeConfig> {
        let runtime_path = CString::new(lookup(PATH_ENV)?).ok()?;
        let plugins = CString::new(lookup(COMP_ENV)?).ok()?;
        Some(ProbeConfig {
            runtime_path,
            plugins,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn false_spellings() {
        for value in ["false", "FALSE", "off", "OFF", "no", "NO", "n", "N", "f", "F", "0"] {
            assert!(!debug_string_to_bool(value), "{}", value);
        }
        for value in ["1", "true", "on", "yes", "anything", "False", "oFF", "No"] {
            assert!(debug_string_to_bool(value), "{}", value);
        }
    }

    #[test]
    fn unset_option_uses_default() {
        assert!(bool_option("ILLIXR_TEST_OPTION_THAT_IS_NEVER_SET", true));
        assert!(!bool_option("ILLIXR_TEST_OPTION_THAT_IS_NEVER_SET", false));
    }

    #[test]
    fn default_period_is_120hz() {
        assert_eq!(DisplayParams::default().period(), Duration::from_nanos(8_333_333));
    }

    #[test]
    fn probe_needs_both_variables() {
        let lookup = |name: &str| match name {
            PATH_ENV => Some("/opt/illixr/runtime.so".to_owned()),
            COMP_ENV => Some("a.so:b.so".to_owned()),
            _ => None,
        };
        let config = ProbeConfig::from_lookup(lookup).unwrap();
        assert_eq!(config.runtime_path.to_str().unwrap(), "/opt/illixr/runtime.so");
        assert_eq!(config.plugins.to_str().unwrap(), "a.so:b.so");

        let only_path = |name: &str| (name == PATH_ENV).then(|| "/x.so".to_owned());
        assert!(ProbeConfig::from_lookup(only_path).is_none());
    }
}
