//! OS primitives behind the dump protocol.
//!
//! Thread-directed signals, kernel thread ids and `/proc/self/task` are
//! Linux-only; other targets get stubs and `SUPPORTED == false`.

pub(crate) use imp::*;

#[cfg(target_os = "linux")]
mod imp {
    use std::ffi::{c_int, c_void};
    use std::io;

    use crate::Tid;

    pub(crate) const SUPPORTED: bool = true;

    pub(crate) type SignalHandler = extern "C" fn(c_int, *mut libc::siginfo_t, *mut c_void);

    /// Kernel id of the calling thread. Async-signal-safe.
    pub(crate) fn current_tid() -> Tid {
        unsafe { libc::syscall(libc::SYS_gettid) as Tid }
    }

    pub(crate) fn install_handler(signal: c_int, handler: SignalHandler) -> io::Result<()> {
        unsafe {
            let mut sa: libc::sigaction = std::mem::zeroed();
            sa.sa_sigaction = handler as *const () as usize;
            // SA_RESTART keeps the target's interrupted syscalls transparent.
            sa.sa_flags = libc::SA_SIGINFO | libc::SA_RESTART;
            libc::sigemptyset(&mut sa.sa_mask);
            if libc::sigaction(signal, &sa, std::ptr::null_mut()) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }

    /// Sends `signal` to one thread of this process.
    ///
    /// `tgkill` pins the thread group, so a recycled tid that now belongs to
    /// another process cannot be hit.
    pub(crate) fn signal_thread(tid: Tid, signal: c_int) -> io::Result<()> {
        let rc = unsafe { libc::syscall(libc::SYS_tgkill, libc::getpid(), tid, signal) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Restores `errno` on drop, so a handler does not clobber the
    /// interrupted code's view of it.
    pub(crate) struct ErrnoGuard(c_int);

    impl ErrnoGuard {
        pub(crate) fn save() -> Self {
            Self(unsafe { *libc::__errno_location() })
        }
    }

    impl Drop for ErrnoGuard {
        fn drop(&mut self) {
            unsafe { *libc::__errno_location() = self.0 }
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod imp {
    use std::ffi::c_int;
    use std::io;

    use crate::Tid;

    pub(crate) const SUPPORTED: bool = false;

    pub(crate) fn current_tid() -> Tid {
        0
    }

    pub(crate) fn signal_thread(_tid: Tid, _signal: c_int) -> io::Result<()> {
        Err(io::ErrorKind::Unsupported.into())
    }
}
