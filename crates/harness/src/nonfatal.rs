//! Isolate-and-continue wrapper for instrumentation and teardown paths.
//!
//! Reporting, failure capture and resource release run through
//! [`nonfatal`]: an error or a panic is logged at `warn` and dropped, so it can
//! never change a test's outcome or replace its failure reason.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::RefCell;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use tracing::warn;

/// Run `op`, returning its value, or `None` after logging an error or panic.
pub fn nonfatal<T, E, F>(operation: &str, op: F) -> Option<T>
where
    E: Display,
    F: FnOnce() -> Result<T, E>,
{
    match panic::catch_unwind(AssertUnwindSafe(op)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!(operation, error = %e, "non-fatal operation failed");
            None
        }
        Err(payload) => {
            warn!(operation, panic = %panic_message(payload.as_ref()), "non-fatal operation panicked");
            None
        }
    }
}

thread_local! {
    static PANIC_SITE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static RECORD_PANIC_SITE: Once = Once::new();

/// Chain a panic hook that remembers where the current thread last panicked.
fn install_site_hook() {
    RECORD_PANIC_SITE.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let site = info.location().map(|location| {
                let backtrace = Backtrace::capture();
                match backtrace.status() {
                    BacktraceStatus::Captured => format!("{}\n{}", location, backtrace),
                    _ => location.to_string(),
                }
            });
            PANIC_SITE.with(|slot| *slot.borrow_mut() = site);
            previous(info);
        }));
    });
}

/// Run `op`, turning a panic into its message followed by the
/// `file:line:column` it came from (and a backtrace when `RUST_BACKTRACE`
/// enables one).
pub(crate) fn catch_panic<T, F>(op: F) -> Result<T, String>
where
    F: FnOnce() -> T,
{
    install_site_hook();
    PANIC_SITE.with(|slot| slot.borrow_mut().take());

    panic::catch_unwind(AssertUnwindSafe(op)).map_err(|payload| {
        let message = panic_message(payload.as_ref());
        match PANIC_SITE.with(|slot| slot.borrow_mut().take()) {
            Some(site) => format!("{}\n    at {}", message, site),
            None => message,
        }
    })
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
