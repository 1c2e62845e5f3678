// SPDX-License-Identifier: MIT

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

static CANCELLED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_interrupt(_signal: libc::c_int) {
    CANCELLED.store(true, Ordering::SeqCst);
}

/// Route SIGINT to a flag that transfers poll between chunks, and return
/// that flag. A second Ctrl-C does not kill the process; the running chunk
/// always completes.
pub fn install() -> io::Result<&'static AtomicBool> {
    let handler = on_interrupt as extern "C" fn(libc::c_int);
    if unsafe { libc::signal(libc::SIGINT, handler as libc::sighandler_t) } == libc::SIG_ERR {
        return Err(io::Error::last_os_error());
    }
    Ok(&CANCELLED)
}
