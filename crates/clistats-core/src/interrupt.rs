//! Self-interrupt helper.
//!
//! Delivers the same interruption a user pressing Ctrl+C would, so whatever
//! SIGINT handler the host installed (for example via `ctrlc`) runs. Needed
//! when the terminal is in raw mode and Ctrl+C arrives as a plain keypress.

use std::io;

/// Sends SIGINT to the current process.
///
/// # Errors
/// Returns the OS error if the signal cannot be delivered.
#[cfg(unix)]
pub fn interrupt_self() -> io::Result<()> {
    // SAFETY: getpid has no preconditions and kill only reads its arguments.
    let rc = unsafe { libc::kill(libc::getpid(), libc::SIGINT) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Terminates the current process with the conventional interrupt status.
///
/// Windows has no catchable self-directed SIGINT, so this does not return.
///
/// # Errors
/// Never returns.
#[cfg(not(unix))]
pub fn interrupt_self() -> io::Result<()> {
    std::process::exit(130)
}
