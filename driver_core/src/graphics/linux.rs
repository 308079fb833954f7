use std::ffi::CString;

use glutin_glx_sys::glx as glx_sys;
use lazy_static::lazy_static;
use log::warn;

use super::GraphicsContext;

struct Glx {
    inner: glx_sys::Glx,
    _lib: libloading::Library,
}

impl std::ops::Deref for Glx {
    type Target = glx_sys::Glx;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

unsafe impl Sync for Glx {}

lazy_static! {
    static ref GLX: Option<Glx> = {
        ["libGL.so.1", "libGL.so"]
            .iter()
            .find_map(|path| unsafe { libloading::Library::new(path).ok() })
            .map(|lib| {
                let glx = glx_sys::Glx::load_with(|name| unsafe {
                    match CString::new(name.as_bytes()) {
                        Ok(addr) => lib
                            .get(addr.as_bytes_with_nul())
                            .map(|ptr| *ptr)
                            .unwrap_or(std::ptr::null()),
                        Err(_) => std::ptr::null(),
                    }
                });
                Glx {
                    inner: glx,
                    _lib: lib,
                }
            })
    };
}

pub(super) fn current_glx_context() -> GraphicsContext {
    match GLX.as_deref() {
        Some(glx) => GraphicsContext::from_raw(unsafe { glx.GetCurrentContext() } as *mut _),
        None => {
            warn!("libGL not found; no current GLX context");
            GraphicsContext::NULL
        }
    }
}
