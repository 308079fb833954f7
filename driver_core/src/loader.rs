//! Loading the external runtime module and driving the runtime it constructs.

use std::ffi::{CString, OsStr};
use std::os::raw::c_char;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use log::{debug, info, warn};
use thiserror::Error;

use crate::graphics::GraphicsContext;
use crate::runtime_interfaces::{PluginFactory, RawRuntime, RuntimeFactory, RUNTIME_FACTORY_SYMBOL};

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("runtime path is not valid UTF-8")]
    InvalidPath,
    #[error("plugin path `{0}` contains a NUL byte")]
    InvalidPluginPath(String),
    #[error("failed to open runtime module `{}`: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("runtime module is missing `{symbol}`: {source}")]
    MissingSymbol {
        symbol: String,
        #[source]
        source: libloading::Error,
    },
    #[error("runtime factory returned null")]
    NullRuntime,
    #[error("runtime rejected {0}")]
    Rejected(String),
}

/// A runtime instance created by a [`RuntimeModule`].
pub trait Runtime: Send {
    fn load_so(&mut self, paths: &[String]) -> Result<(), LaunchError>;

    fn load_plugin_factory(&mut self, factory: PluginFactory) -> Result<(), LaunchError>;

    fn stop(&mut self);
}

/// A loaded runtime module. Must outlive every runtime it created.
pub trait RuntimeModule: Send {
    fn create_runtime(&self, context: GraphicsContext) -> Result<Box<dyn Runtime>, LaunchError>;
}

pub trait RuntimeProvider: Send {
    fn open(&self, path: &Path) -> Result<Box<dyn RuntimeModule>, LaunchError>;
}

/// Splits a `:` separated plugin list. Empty entries are skipped.
pub fn split_plugin_list(list: &str) -> Vec<String> {
    list.split(':')
        .filter(|entry| {
            if entry.is_empty() {
                debug!("Skipping empty plugin entry in `{}`", list);
            }
            !entry.is_empty()
        })
        .map(str::to_owned)
        .collect()
}

/// Opens runtime modules with the platform's dynamic loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct DynamicLibraryProvider;

impl RuntimeProvider for DynamicLibraryProvider {
    fn open(&self, path: &Path) -> Result<Box<dyn RuntimeModule>, LaunchError> {
        info!("Opening runtime module `{}`", path.display());
        let lib = open_library(path.as_os_str()).map_err(|source| LaunchError::Open {
            path: path.to_owned(),
            source,
        })?;
        let factory = unsafe { lib.get::<RuntimeFactory>(RUNTIME_FACTORY_SYMBOL) }
            .map_err(|source| LaunchError::MissingSymbol {
                symbol: String::from_utf8_lossy(&RUNTIME_FACTORY_SYMBOL[..RUNTIME_FACTORY_SYMBOL.len() - 1])
                    .into_owned(),
                source,
            })?;
        let factory = unsafe { factory.into_raw() };

        Ok(Box::new(DynamicRuntimeModule {
            factory,
            _lib: lib,
        }))
    }
}

#[cfg(unix)]
fn open_library(path: &OsStr) -> Result<libloading::Library, libloading::Error> {
    unsafe {
        libloading::os::unix::Library::open(Some(path), libc::RTLD_LAZY | libc::RTLD_LOCAL)
            .map(Into::into)
    }
}

#[cfg(not(unix))]
fn open_library(path: &OsStr) -> Result<libloading::Library, libloading::Error> {
    unsafe { libloading::Library::new(path) }
}

#[cfg(unix)]
type Symbol<T> = libloading::os::unix::Symbol<T>;
#[cfg(windows)]
type Symbol<T> = libloading::os::windows::Symbol<T>;

struct DynamicRuntimeModule {
    factory: Symbol<RuntimeFactory>,
    _lib: libloading::Library,
}

impl RuntimeModule for DynamicRuntimeModule {
    fn create_runtime(&self, context: GraphicsContext) -> Result<Box<dyn Runtime>, LaunchError> {
        let raw = unsafe { (*self.factory)(context.as_ptr()) };
        let runtime = unsafe { FfiRuntime::from_raw(raw) }.ok_or(LaunchError::NullRuntime)?;
        Ok(Box::new(runtime))
    }
}

/// A runtime reached through its C function table. Destroyed on drop.
pub struct FfiRuntime {
    raw: NonNull<RawRuntime>,
}

// The runtime is only driven from the thread holding the device lock.
unsafe impl Send for FfiRuntime {}

impl FfiRuntime {
    /// # Safety
    ///
    /// `raw` must be null or a runtime table that stays valid until its `destroy` is called,
    /// which this wrapper does exactly once.
    pub unsafe fn from_raw(raw: *mut RawRuntime) -> Option<Self> {
        NonNull::new(raw).map(|raw| FfiRuntime { raw })
    }

    fn table(&self) -> &RawRuntime {
        unsafe { self.raw.as_ref() }
    }
}

impl Runtime for FfiRuntime {
    fn load_so(&mut self, paths: &[String]) -> Result<(), LaunchError> {
        let paths = paths
            .iter()
            .map(|path| CString::new(path.as_str()).map_err(|_| LaunchError::InvalidPluginPath(path.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        let ptrs: Vec<*const c_char> = paths.iter().map(|path| path.as_ptr()).collect();

        let table = self.table();
        if unsafe { (table.load_so)(table.ctx, ptrs.as_ptr(), ptrs.len()) } {
            Ok(())
        } else {
            Err(LaunchError::Rejected(format!("plugins {:?}", paths)))
        }
    }

    fn load_plugin_factory(&mut self, factory: PluginFactory) -> Result<(), LaunchError> {
        let table = self.table();
        if unsafe { (table.load_plugin_factory)(table.ctx, factory) } {
            Ok(())
        } else {
            Err(LaunchError::Rejected("plugin factory".to_owned()))
        }
    }

    fn stop(&mut self) {
        let table = self.table();
        unsafe { (table.stop)(table.ctx) }
    }
}

impl Drop for FfiRuntime {
    fn drop(&mut self) {
        let table = self.table();
        unsafe { (table.destroy)(table.ctx) }
    }
}

/// Opens the module at `path`, builds a runtime on `context`, loads every plugin of
/// `plugin_list` and finally registers `factory` as a built-in plugin.
///
/// Nothing is rolled back on failure beyond dropping what was created here.
pub fn launch(
    provider: &dyn RuntimeProvider,
    path: &str,
    plugin_list: &str,
    context: GraphicsContext,
    factory: PluginFactory,
) -> Result<(Box<dyn Runtime>, Box<dyn RuntimeModule>), LaunchError> {
    let module = provider.open(Path::new(path))?;
    let mut runtime = module.create_runtime(context)?;

    let plugins = split_plugin_list(plugin_list);
    if plugins.is_empty() {
        warn!("No plugins listed for the runtime");
    }
    runtime.load_so(&plugins)?;
    runtime.load_plugin_factory(factory)?;

    Ok((runtime, module))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{raw_runtime, MockRuntimeProvider};

    unsafe extern "C" fn no_plugin(
        _registry: *const crate::runtime_interfaces::RawRegistry,
    ) -> *mut crate::runtime_interfaces::RawPlugin {
        std::ptr::null_mut()
    }

    #[test]
    fn plugin_list_splits_on_colons() {
        assert_eq!(split_plugin_list("a.so:b.so:c.so"), vec!["a.so", "b.so", "c.so"]);
        assert_eq!(split_plugin_list("only.so"), vec!["only.so"]);
        assert_eq!(split_plugin_list("a.so::b.so:"), vec!["a.so", "b.so"]);
        assert!(split_plugin_list("").is_empty());
    }

    #[test]
    fn missing_module_fails_to_open() {
        let err = DynamicLibraryProvider
            .open(Path::new("/nonexistent/libillixr_runtime.so"))
            .err()
            .unwrap();
        assert!(matches!(err, LaunchError::Open { .. }));
    }

    #[test]
    fn launch_runs_every_step_in_order() {
        let provider = MockRuntimeProvider::default();
        let (_runtime, _module) = launch(
            &provider,
            "/opt/runtime.so",
            "a.so:b.so",
            GraphicsContext::NULL,
            no_plugin,
        )
        .unwrap();

        let log = provider.log();
        assert_eq!(log.opened, vec![PathBuf::from("/opt/runtime.so")]);
        assert_eq!(log.plugin_lists, vec![vec!["a.so".to_owned(), "b.so".to_owned()]]);
        assert_eq!(log.factories, 1);
    }

    #[test]
    fn failed_plugin_load_stops_before_the_factory() {
        let provider = MockRuntimeProvider::failing_load_so();
        let err = launch(&provider, "/opt/runtime.so", "a.so", GraphicsContext::NULL, no_plugin)
            .err()
            .unwrap();

        assert!(matches!(err, LaunchError::Rejected(_)));
        let log = provider.log();
        assert_eq!(log.factories, 0);
        // Runtime dropped before its module.
        assert_eq!(log.drops, vec!["runtime", "module"]);
    }

    #[test]
    fn ffi_runtime_forwards_and_destroys() {
        let (raw, log) = raw_runtime();
        let mut runtime = unsafe { FfiRuntime::from_raw(raw) }.unwrap();

        runtime
            .load_so(&["x.so".to_owned(), "y.so".to_owned()])
            .unwrap();
        runtime.load_plugin_factory(no_plugin).unwrap();
        runtime.stop();
        drop(runtime);

        let log = log.lock().unwrap();
        assert_eq!(log.plugin_lists, vec![vec!["x.so".to_owned(), "y.so".to_owned()]]);
        assert_eq!(log.factories, 1);
        assert_eq!(log.stops, 1);
        assert_eq!(log.drops, vec!["runtime"]);
    }

    #[test]
    fn null_runtime_is_rejected() {
        assert!(unsafe { FfiRuntime::from_raw(std::ptr::null_mut()) }.is_none());
    }
}
