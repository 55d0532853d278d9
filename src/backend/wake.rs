//! Self-pipe used to interrupt `poll(2)` from another thread

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use super::LoopWaker;

pub struct WakePipe {
    reader: OwnedFd,
    writer: OwnedFd,
}

impl WakePipe {
    pub fn new() -> io::Result<Self> {
        let mut fds: [libc::c_int; 2] = [0; 2];
        // SAFETY: `fds` has room for the two descriptors pipe2 writes.
        let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: pipe2 succeeded, both descriptors are open and owned by us.
        let (reader, writer) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        Ok(Self { reader, writer })
    }

    pub fn fd(&self) -> RawFd {
        self.reader.as_raw_fd()
    }

    pub fn signal(&self) {
        let byte = 1u8;
        // A full pipe already guarantees a pending wakeup, so EAGAIN is fine.
        // SAFETY: writes one byte from a valid stack location.
        unsafe {
            libc::write(self.writer.as_raw_fd(), (&byte as *const u8).cast(), 1);
        }
    }

    pub fn drain(&self) {
        let mut buf = [0u8; 64];
        loop {
            // SAFETY: reads into a valid buffer of the given length.
            let n = unsafe { libc::read(self.reader.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
            if n <= 0 {
                break;
            }
        }
    }
}

impl LoopWaker for WakePipe {
    fn wake(&self) {
        self.signal();
    }
}

/// Switch a descriptor the caller keeps open to non-blocking reads
pub fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl only reads and updates the flags of an open descriptor.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Wait until any descriptor is readable or `timeout` elapses.
///
/// Returns one readiness flag per descriptor; hang-ups and errors count as
/// readable so the caller's read reports them.
pub fn poll_readable(fds: &[RawFd], timeout: Duration) -> io::Result<Vec<bool>> {
    let mut pollfds: Vec<libc::pollfd> = fds
        .iter()
        .map(|&fd| libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();
    let millis = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);

    // SAFETY: `pollfds` is a valid array of `pollfds.len()` entries.
    let rc = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, millis) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(vec![false; fds.len()]);
        }
        return Err(err);
    }

    Ok(pollfds
        .iter()
        .map(|p| p.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_poll_times_out_without_signal() {
        let pipe = WakePipe::new().unwrap();
        let ready = poll_readable(&[pipe.fd()], Duration::from_millis(20)).unwrap();
        assert_eq!(ready, vec![false]);
    }

    #[test]
    fn test_signal_interrupts_long_poll() {
        let pipe = Arc::new(WakePipe::new().unwrap());
        let waker = Arc::clone(&pipe);
        let started = Instant::now();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            waker.wake();
        });

        let ready = poll_readable(&[pipe.fd()], Duration::from_secs(10)).unwrap();
        assert_eq!(ready, vec![true]);
        assert!(started.elapsed() < Duration::from_secs(2));
        handle.join().unwrap();

        pipe.drain();
        let ready = poll_readable(&[pipe.fd()], Duration::ZERO).unwrap();
        assert_eq!(ready, vec![false]);
    }

    #[test]
    fn test_set_nonblocking() {
        let pipe = WakePipe::new().unwrap();
        set_nonblocking(pipe.fd()).unwrap();
        // SAFETY: the descriptor is open for the whole test.
        let flags = unsafe { libc::fcntl(pipe.fd(), libc::F_GETFL) };
        assert_ne!(flags & libc::O_NONBLOCK, 0);
        assert!(set_nonblocking(-1).is_err());
    }

    #[test]
    fn test_repeated_signals_coalesce() {
        let pipe = WakePipe::new().unwrap();
        for _ in 0..1000 {
            pipe.signal();
        }
        pipe.drain();
        let ready = poll_readable(&[pipe.fd()], Duration::ZERO).unwrap();
        assert_eq!(ready, vec![false]);
    }
}
