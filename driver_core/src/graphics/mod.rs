#[cfg(target_os = "linux")]
mod linux;

use std::os::raw::c_void;

use log::debug;

/// Opaque handle of the GL context the runtime renders with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphicsContext(*mut c_void);

// Only ever passed through to the runtime factory.
unsafe impl Send for GraphicsContext {}

impl GraphicsContext {
    pub const NULL: GraphicsContext = GraphicsContext(std::ptr::null_mut());

    pub fn from_raw(ptr: *mut c_void) -> Self {
        GraphicsContext(ptr)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }

    /// Keeps a context supplied by the host, otherwise falls back to the context current on the
    /// calling thread.
    pub fn or_current(self) -> Self {
        if !self.is_null() {
            return self;
        }
        let current = current_context();
        debug!("No GL context supplied; using current context {:?}", current.0);
        current
    }
}

#[cfg(target_os = "linux")]
fn current_context() -> GraphicsContext {
    linux::current_glx_context()
}

#[cfg(not(target_os = "linux"))]
fn current_context() -> GraphicsContext {
    GraphicsContext::NULL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supplied_context_is_kept() {
        let mut marker = 0u8;
        let ctx = GraphicsContext::from_raw((&mut marker as *mut u8).cast());
        assert_eq!(ctx.or_current(), ctx);
        assert!(!ctx.is_null());
        assert!(GraphicsContext::NULL.is_null());
    }
}
