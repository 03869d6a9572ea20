//! File descriptor limit detection for capping concurrent I/O lanes (Unix).

/// Descriptors a single I/O lane can hold open at once: source file, temp
/// destination, backup destination, plus directory handles.
pub const FDS_PER_LANE: usize = 4;

/// Fraction of the process FD limit to use (leave headroom for other code).
const FD_LIMIT_FRACTION: f64 = 0.8;

/// Soft limit for max open file descriptors, or `None` if unavailable (e.g. Windows).
#[cfg(unix)]
pub fn max_open_fds() -> Option<u64> {
    use std::mem::MaybeUninit;
    let mut rlim = MaybeUninit::<libc::rlimit>::uninit();
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, rlim.as_mut_ptr()) } != 0 {
        return None;
    }
    let cur = unsafe { rlim.assume_init() }.rlim_cur;
    // RLIM_INFINITY is typically !0 or u64::MAX; treat as "no practical limit"
    if cur == libc::RLIM_INFINITY || cur > i64::MAX as u64 {
        return None;
    }
    Some(cur)
}

#[cfg(not(unix))]
pub fn max_open_fds() -> Option<u64> {
    None
}

/// Suggested max lane count so we stay under ~80% of the FD limit.
/// Returns `None` when no limit is available (use caller's default).
pub fn max_lanes_by_fd_limit() -> Option<usize> {
    let limit = max_open_fds()?;
    let usable = (limit as f64 * FD_LIMIT_FRACTION) as usize;
    Some((usable / FDS_PER_LANE).max(1))
}
