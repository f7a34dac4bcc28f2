//! Linux tap backend: opens `/dev/net/tun` in IFF_TAP | IFF_NO_PI mode so
//! reads and writes move whole Ethernet frames. Reads poll with a timeout
//! so a blocked reader observes cooperative shutdown.

use std::ffi::CString;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use super::{DeviceError, FrameIo};

const TUNSETIFF: libc::c_ulong = 0x4004_54ca;
const IFF_TAP: libc::c_short = 0x0002;
const IFF_NO_PI: libc::c_short = 0x1000;
const POLL_TIMEOUT_MS: libc::c_int = 250;

#[repr(C)]
struct IfReq {
    ifr_name: [libc::c_char; libc::IFNAMSIZ],
    ifr_flags: libc::c_short,
    _pad: [u8; 22],
}

/// One opened tap interface.
pub struct TapInterface {
    fd: RawFd,
    closed: AtomicBool,
}

impl TapInterface {
    /// Open the named tap interface. The interface must already exist (e.g.
    /// created with `ip tuntap add`) or the caller must have CAP_NET_ADMIN.
    pub fn open(name: &str) -> Result<TapInterface, DeviceError> {
        let path = CString::new("/dev/net/tun").map_err(|_| DeviceError::Closed)?;
        let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDWR) };
        if fd < 0 {
            return Err(DeviceError::Io(io::Error::last_os_error()));
        }

        let mut request = IfReq {
            ifr_name: [0; libc::IFNAMSIZ],
            ifr_flags: IFF_TAP | IFF_NO_PI,
            _pad: [0; 22],
        };
        for (slot, byte) in request
            .ifr_name
            .iter_mut()
            .zip(name.bytes().take(libc::IFNAMSIZ - 1))
        {
            *slot = byte as libc::c_char;
        }

        let rc = unsafe { libc::ioctl(fd, TUNSETIFF, &request) };
        if rc < 0 {
            let error = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(DeviceError::Io(error));
        }

        debug!(interface = name, fd, "tap interface opened");
        Ok(TapInterface {
            fd,
            closed: AtomicBool::new(false),
        })
    }
}

impl FrameIo for TapInterface {
    fn recv(&self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Ok(0);
            }
            let mut pollfd = libc::pollfd {
                fd: self.fd,
                events: libc::POLLIN,
                revents: 0,
            };
            let ready = unsafe { libc::poll(&mut pollfd, 1, POLL_TIMEOUT_MS) };
            if ready < 0 {
                let error = io::Error::last_os_error();
                if error.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(DeviceError::Io(error));
            }
            if ready == 0 {
                continue; // timeout, re-check the closed flag
            }
            let count =
                unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
            if count < 0 {
                let error = io::Error::last_os_error();
                if error.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(DeviceError::Io(error));
            }
            return Ok(count as usize);
        }
    }

    fn send(&self, frame: &[u8]) -> Result<(), DeviceError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DeviceError::Closed);
        }
        let count =
            unsafe { libc::write(self.fd, frame.as_ptr() as *const libc::c_void, frame.len()) };
        if count < 0 {
            return Err(DeviceError::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Drop for TapInterface {
    fn drop(&mut self) {
        self.close();
        unsafe { libc::close(self.fd) };
    }
}
