//! Thin wrappers over the libc calls `std::net` does not expose.

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// Which readiness a [`wait_ready`] call is waiting for.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Interest {
    Read,
    Write,
}

/// Waits until `fd` is ready for `interest` or `timeout` elapses.
///
/// Returns `Ok(false)` on timeout. Hang-up and error conditions count as
/// ready so the following syscall reports them.
pub(crate) fn wait_ready(
    fd: RawFd,
    interest: Interest,
    timeout: Duration,
) -> io::Result<bool> {
    let events = match interest {
        Interest::Read => libc::POLLIN,
        Interest::Write => libc::POLLOUT,
    };
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

    loop {
        // SAFETY: `pfd` is a valid, exclusively borrowed pollfd and we pass
        // a count of exactly one.
        let rc = unsafe { libc::poll(&mut pfd, 1, millis) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        return Ok(rc > 0);
    }
}

/// Number of bytes that can be read from `fd` without blocking.
pub(crate) fn bytes_available(fd: RawFd) -> io::Result<usize> {
    let mut count: libc::c_int = 0;
    // SAFETY: FIONREAD writes a single c_int through the provided pointer.
    let rc = unsafe { libc::ioctl(fd, libc::FIONREAD, &mut count) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(count.max(0) as usize)
}

pub(crate) fn set_linger(fd: RawFd, linger: Option<Duration>) -> io::Result<()> {
    let value = libc::linger {
        l_onoff: libc::c_int::from(linger.is_some()),
        l_linger: linger
            .map(|d| d.as_secs().min(libc::c_int::MAX as u64) as libc::c_int)
            .unwrap_or(0),
    };
    set_option(fd, libc::SOL_SOCKET, libc::SO_LINGER, &value)
}

pub(crate) fn set_buffer_sizes(fd: RawFd, size: libc::c_int) -> io::Result<()> {
    set_option(fd, libc::SOL_SOCKET, libc::SO_RCVBUF, &size)?;
    set_option(fd, libc::SOL_SOCKET, libc::SO_SNDBUF, &size)
}

/// Re-issues `listen(2)` on an already listening socket to apply `backlog`.
pub(crate) fn listen(fd: RawFd, backlog: i32) -> io::Result<()> {
    // SAFETY: plain syscall on a descriptor owned by the caller.
    let rc = unsafe { libc::listen(fd, backlog) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn set_option<T>(
    fd: RawFd,
    level: libc::c_int,
    name: libc::c_int,
    value: &T,
) -> io::Result<()> {
    // SAFETY: `value` points to a live `T` and the length passed matches it.
    let rc = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            (value as *const T).cast(),
            std::mem::size_of::<T>() as libc::socklen_t,
        )
    };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
