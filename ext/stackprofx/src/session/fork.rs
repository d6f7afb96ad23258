//! `pthread_atfork(3)` wiring for a process-wide session.

use std::io;
use std::sync::{Mutex, Once, PoisonError};

use super::{ForkHandle, Session};
use crate::error::{Error, Result};

static FORK_TARGET: Mutex<Option<ForkHandle>> = Mutex::new(None);
static INSTALL_HANDLERS: Once = Once::new();

/// Routes fork notifications to `session`.
///
/// The handlers are registered with the C library once per process; later
/// calls only replace the session they act on. The handlers do not go
/// through `session` itself, so forking while it is locked or running a
/// `Session::run` body still stops profiling in the child.
pub fn install(session: &Session) -> Result<()> {
    *FORK_TARGET.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.fork_handle());

    let mut err = 0;
    INSTALL_HANDLERS.call_once(|| {
        err = unsafe { libc::pthread_atfork(Some(prepare), Some(parent), Some(child)) };
    });
    if err != 0 {
        return Err(Error::Os { call: "pthread_atfork", source: io::Error::from_raw_os_error(err) });
    }
    log::debug!("Fork handlers installed");
    Ok(())
}

/// Stops routing fork notifications.
pub fn uninstall() {
    *FORK_TARGET.lock().unwrap_or_else(PoisonError::into_inner) = None;
}

// Only install/uninstall contend on the target; never block here.
fn target() -> Option<ForkHandle> {
    let target = FORK_TARGET.try_lock().ok()?;
    target.clone()
}

unsafe extern "C" fn prepare() {
    if let Some(handle) = target() {
        handle.prepare();
    }
}

unsafe extern "C" fn parent() {
    if let Some(handle) = target() {
        handle.parent();
    }
}

unsafe extern "C" fn child() {
    if let Some(handle) = target() {
        handle.child();
    }
}
