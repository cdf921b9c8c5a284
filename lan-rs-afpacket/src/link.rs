use crate::linux;
use lan_rs_packets::MacAddr;
use lan_rs_stack::Driver;
use libc;
use log::{debug, info};
use std::{
    ffi::CString,
    io,
    mem::{self, MaybeUninit},
    ptr,
};

/// A raw Ethernet link on one interface.
///
/// The socket is opened non-blocking and bound to a single interface, which is how the stack
/// expects its driver to behave: `receive` returns `Ok(0)` when the wire is quiet instead of
/// parking the polling thread.
pub struct RawLink {
    fd: libc::c_int,
    ifindex: libc::c_int,
    send_addr: libc::sockaddr_ll,
    promiscuous: bool,
}

impl RawLink {
    /// Opens an `AF_PACKET` socket bound to `iface`, for example `"eth0"`.
    pub fn open(iface: &str) -> io::Result<RawLink> {
        let name = CString::new(iface)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "interface name has a NUL"))?;
        if name.as_bytes_with_nul().len() > libc::IFNAMSIZ {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "interface name too long",
            ));
        }

        // FFI only; the descriptor is owned by the `RawLink` from here on and closed on drop,
        // including on the early returns below.
        let fd = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW, libc::ETH_P_ALL.to_be()) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let mut link = RawLink {
            fd,
            ifindex: 0,
            send_addr: unsafe { MaybeUninit::zeroed().assume_init() },
            promiscuous: false,
        };

        let mut ifr = link.request(&name);
        // SIOCGIFINDEX writes the index into the union; `ifr` lives on our stack for the call.
        if unsafe { libc::ioctl(link.fd, linux::SIOCGIFINDEX, &mut ifr) } < 0 {
            return Err(io::Error::last_os_error());
        }
        link.ifindex = unsafe { ifr.ifr_ifru.ifru_ivalue };

        link.send_addr.sll_family = libc::AF_PACKET as libc::c_ushort;
        link.send_addr.sll_protocol = (libc::ETH_P_ALL as u16).to_be();
        link.send_addr.sll_ifindex = link.ifindex;
        let err = unsafe {
            libc::bind(
                link.fd,
                &link.send_addr as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if err < 0 {
            return Err(io::Error::last_os_error());
        }

        link.set_nonblocking()?;
        debug!("bound raw link to {} (ifindex {})", iface, link.ifindex);
        Ok(link)
    }

    fn request(&self, name: &CString) -> linux::ifreq {
        // An all-zero ifreq is a valid value for every member of the union.
        let mut ifr: linux::ifreq = unsafe { MaybeUninit::zeroed().assume_init() };
        let bytes = name.as_bytes_with_nul();
        unsafe {
            ptr::copy_nonoverlapping(
                bytes.as_ptr() as *const libc::c_char,
                ifr.ifr_name.as_mut_ptr(),
                bytes.len(),
            );
        }
        ifr
    }

    fn set_nonblocking(&mut self) -> io::Result<()> {
        unsafe {
            let flags = libc::fcntl(self.fd, libc::F_GETFL);
            if flags < 0 {
                return Err(io::Error::last_os_error());
            }
            if libc::fcntl(self.fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }

    /// Kernel index of the bound interface.
    pub fn ifindex(&self) -> i32 {
        self.ifindex
    }

    /// Reads the interface's own MAC address, handy as the stack's address when the link is a
    /// dedicated port.
    pub fn hardware_addr(&self, iface: &str) -> io::Result<MacAddr> {
        let name = CString::new(iface)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "interface name has a NUL"))?;
        let mut ifr = self.request(&name);
        if unsafe { libc::ioctl(self.fd, linux::SIOCGIFHWADDR, &mut ifr) } < 0 {
            return Err(io::Error::last_os_error());
        }
        let raw = unsafe { ifr.ifr_ifru.ifru_hwaddr.sa_data };
        let mut bytes = [0u8; 6];
        for (dst, src) in bytes.iter_mut().zip(raw.iter()) {
            *dst = *src as u8;
        }
        Ok(MacAddr::new(bytes))
    }

    /// Turns promiscuous reception on or off. Needed when the stack runs with a MAC address
    /// that is not the interface's own.
    pub fn set_promiscuous(&mut self, on: bool) -> io::Result<()> {
        if on == self.promiscuous {
            return Ok(());
        }
        let mreq = linux::packet_mreq {
            mr_ifindex: self.ifindex,
            mr_type: linux::PACKET_MR_PROMISC,
            mr_alen: 0,
            mr_address: [0; 8],
        };
        let option = if on {
            linux::PACKET_ADD_MEMBERSHIP
        } else {
            linux::PACKET_DROP_MEMBERSHIP
        };
        let err = unsafe {
            libc::setsockopt(
                self.fd,
                linux::SOL_PACKET,
                option,
                &mreq as *const _ as *const libc::c_void,
                mem::size_of::<linux::packet_mreq>() as libc::socklen_t,
            )
        };
        if err < 0 {
            return Err(io::Error::last_os_error());
        }
        self.promiscuous = on;
        info!("promiscuous mode {} on ifindex {}", if on { "on" } else { "off" }, self.ifindex);
        Ok(())
    }

    /// Sends one frame, returning how many bytes the kernel took.
    pub fn send(&mut self, frame: &[u8]) -> io::Result<usize> {
        // The frame is only borrowed for the length we pass in.
        let bytes = unsafe {
            libc::sendto(
                self.fd,
                frame.as_ptr() as *const libc::c_void,
                frame.len(),
                0,
                &self.send_addr as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if bytes < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(bytes as usize)
        }
    }

    /// Receives one inbound frame into `frame`.
    ///
    /// Returns `Ok(None)` when nothing is queued. Frames this host transmitted itself are looped
    /// back by the kernel on packet sockets; those are skipped the same way.
    pub fn recv(&mut self, frame: &mut [u8]) -> io::Result<Option<usize>> {
        let mut from: libc::sockaddr_ll = unsafe { MaybeUninit::zeroed().assume_init() };
        let mut from_len = mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;
        let bytes = unsafe {
            libc::recvfrom(
                self.fd,
                frame.as_mut_ptr() as *mut libc::c_void,
                frame.len(),
                0,
                &mut from as *mut _ as *mut libc::sockaddr,
                &mut from_len,
            )
        };
        if bytes < 0 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(None),
                _ => Err(err),
            };
        }
        if from.sll_pkttype == linux::PACKET_OUTGOING {
            return Ok(None);
        }
        Ok(Some(bytes as usize))
    }
}

impl Driver for RawLink {
    fn transmit(&mut self, frame: &[u8]) -> io::Result<()> {
        let sent = self.send(frame)?;
        if sent != frame.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short send: {} of {} bytes", sent, frame.len()),
            ));
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.recv(buf)?.unwrap_or(0))
    }
}

impl Drop for RawLink {
    fn drop(&mut self) {
        if self.promiscuous {
            let _ = self.set_promiscuous(false);
        }
        unsafe {
            libc::close(self.fd);
        }
    }
}
