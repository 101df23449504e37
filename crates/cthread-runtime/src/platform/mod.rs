//! OS thread identity and scheduling priority
//!
//! Platform-specific implementations use the most direct primitive available.

// Platform-specific implementations
cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod linux;
        pub use linux::{current_lwpid, set_nice_relative};
    } else {
        mod fallback;
        pub use fallback::{current_lwpid, set_nice_relative};
    }
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        /// Native pthread handle of the calling thread
        #[inline]
        pub fn native_handle() -> u64 {
            nix::sys::pthread::pthread_self() as u64
        }
    } else {
        #[inline]
        pub fn native_handle() -> u64 {
            0
        }
    }
}
