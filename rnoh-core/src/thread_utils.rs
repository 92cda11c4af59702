//! # Thread Utilities
//!
//! Thread naming for the task lanes and the [`ThreadGuard`] used by every
//! main-thread-affine structure of the mounting pipeline.
//!
//! The registry, factory and provider are never locked against each other.
//! They are only ever touched from the thread that constructed them, and the
//! guard turns a cross-thread access into an immediate panic instead of a
//! silent data race in the native widget tree.

use std::thread::{self, ThreadId};

/// Sets the name of the current thread for debugging and profiling purposes.
///
/// Thread names appear in debuggers, profilers and system monitors, which
/// makes the JS, WORKER and BACKGROUND lanes easy to tell apart.
///
/// # Platform Behavior
///
/// - **Unix-like systems**: Uses `pthread_setname_np()`
/// - **Windows**: Uses `SetThreadDescription()`
/// - **Other platforms**: No operation is performed
///
/// Names containing interior NUL bytes are ignored.
pub fn set_thread_name(name: &str) {
    #[cfg(target_family = "unix")]
    set_thread_name_unix(name);

    #[cfg(target_os = "windows")]
    set_thread_name_windows(name);

    #[cfg(not(any(target_family = "unix", target_os = "windows")))]
    {
        let _ = name;
    }
}

/// Sets the thread name on Unix-like systems using pthread APIs.
///
/// Linux limits names to 15 bytes plus the terminator; longer names are
/// truncated before the call so the kernel does not reject them.
#[cfg(target_family = "unix")]
fn set_thread_name_unix(name: &str) {
    use std::ffi::CString;

    #[cfg(not(target_vendor = "apple"))]
    let name = truncate_to_char_boundary(name, 15);

    let Ok(cname) = CString::new(name) else {
        return;
    };

    // SAFETY: `cname` is a valid NUL-terminated string that outlives the call
    // and the target is the calling thread.
    unsafe {
        #[cfg(target_vendor = "apple")]
        libc::pthread_setname_np(cname.as_ptr());
        #[cfg(not(target_vendor = "apple"))]
        libc::pthread_setname_np(libc::pthread_self(), cname.as_ptr());
    }
}

#[cfg(all(target_family = "unix", not(target_vendor = "apple")))]
fn truncate_to_char_boundary(name: &str, max_len: usize) -> &str {
    if name.len() <= max_len {
        return name;
    }
    let mut end = max_len;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Sets the thread name on Windows using the Win32 API.
///
/// Errors are ignored, naming is a debugging aid only.
#[cfg(target_os = "windows")]
fn set_thread_name_windows(name: &str) {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;

    let name_wide: Vec<u16> = OsStr::new(name)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();

    // SAFETY: `name_wide` is NUL-terminated UTF-16 and outlives the call.
    unsafe {
        use windows::{
            Win32::System::Threading::{GetCurrentThread, SetThreadDescription},
            core::PCWSTR,
        };

        let _ = SetThreadDescription(GetCurrentThread(), PCWSTR(name_wide.as_ptr()));
    }
}

/// Captures the thread that created an object and asserts later accesses
/// happen on that same thread.
///
/// A violation is a bug in a collaborator, so [`ThreadGuard::assert_thread`]
/// panics rather than returning an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThreadGuard {
    owner: ThreadId,
}

impl ThreadGuard {
    /// Creates a guard bound to the calling thread.
    pub fn new() -> Self {
        Self {
            owner: thread::current().id(),
        }
    }

    /// Returns `true` when called from the owning thread.
    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Returns the owning thread id.
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// Panics if the calling thread is not the owning thread.
    #[track_caller]
    pub fn assert_thread(&self) {
        let current = thread::current();
        assert!(
            current.id() == self.owner,
            "thread affinity violated: expected {:?}, called from {:?} ({})",
            self.owner,
            current.id(),
            current.name().unwrap_or("<unnamed>"),
        );
    }
}

impl Default for ThreadGuard {
    fn default() -> Self {
        Self::new()
    }
}
