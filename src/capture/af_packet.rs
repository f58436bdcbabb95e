//! AF_PACKET socket bound to one interface.
//!
//! `recv` and `send` take `&self` so a socket can sit behind an `Arc`
//! and serve a reader task and the dispatcher concurrently.

use crate::protocol::MacAddr;
use crate::{Error, Result};
use std::os::unix::io::{AsRawFd, RawFd};
use tokio::io::unix::AsyncFd;

pub struct AfPacketSocket {
    async_fd: AsyncFd<RawFd>,
    ifindex: i32,
    mac: MacAddr,
}

impl AfPacketSocket {
    /// Open a raw socket, bind it to `ifname`, enable promiscuous mode
    /// and record the device's hardware address.
    pub fn bind(ifname: &str) -> Result<Self> {
        let fd = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW,
                (libc::ETH_P_ALL as u16).to_be() as i32,
            )
        };
        if fd < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        let result = Self::setup(fd, ifname);
        if result.is_err() {
            unsafe { libc::close(fd) };
        }
        let (ifindex, mac) = result?;

        let async_fd = match AsyncFd::new(fd) {
            Ok(async_fd) => async_fd,
            Err(e) => {
                unsafe { libc::close(fd) };
                return Err(Error::Io(e));
            }
        };
        Ok(Self {
            async_fd,
            ifindex,
            mac,
        })
    }

    fn setup(fd: RawFd, ifname: &str) -> Result<(i32, MacAddr)> {
        let ifindex = Self::get_ifindex(fd, ifname)?;
        let mac = Self::get_hwaddr(fd, ifname)?;

        let sockaddr = libc::sockaddr_ll {
            sll_family: libc::AF_PACKET as u16,
            sll_protocol: (libc::ETH_P_ALL as u16).to_be(),
            sll_ifindex: ifindex,
            sll_hatype: 0,
            sll_pkttype: 0,
            sll_halen: 0,
            sll_addr: [0; 8],
        };
        let ret = unsafe {
            libc::bind(
                fd,
                &sockaddr as *const _ as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as u32,
            )
        };
        if ret < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };

        Self::set_promisc(fd, ifindex, true)?;
        Ok((ifindex, mac))
    }

    fn ifreq_for(ifname: &str) -> Result<libc::ifreq> {
        let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
        let bytes = ifname.as_bytes();
        if bytes.is_empty() || bytes.len() >= ifr.ifr_name.len() {
            return Err(Error::InterfaceNotFound {
                name: ifname.to_string(),
            });
        }
        for (dst, &src) in ifr.ifr_name.iter_mut().zip(bytes) {
            *dst = src as libc::c_char;
        }
        Ok(ifr)
    }

    fn get_ifindex(fd: RawFd, ifname: &str) -> Result<i32> {
        let mut ifr = Self::ifreq_for(ifname)?;
        let ret = unsafe { libc::ioctl(fd, libc::SIOCGIFINDEX, &mut ifr) };
        if ret < 0 {
            return Err(Error::InterfaceNotFound {
                name: ifname.to_string(),
            });
        }
        Ok(unsafe { ifr.ifr_ifru.ifru_ifindex })
    }

    fn get_hwaddr(fd: RawFd, ifname: &str) -> Result<MacAddr> {
        let mut ifr = Self::ifreq_for(ifname)?;
        let ret = unsafe { libc::ioctl(fd, libc::SIOCGIFHWADDR, &mut ifr) };
        if ret < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        let sa_data = unsafe { ifr.ifr_ifru.ifru_hwaddr.sa_data };
        let mut mac = [0u8; 6];
        for (dst, &src) in mac.iter_mut().zip(&sa_data[..6]) {
            *dst = src as u8;
        }
        Ok(MacAddr(mac))
    }

    fn set_promisc(fd: RawFd, ifindex: i32, enable: bool) -> Result<()> {
        let mreq = libc::packet_mreq {
            mr_ifindex: ifindex,
            mr_type: libc::PACKET_MR_PROMISC as u16,
            mr_alen: 0,
            mr_address: [0; 8],
        };
        let optname = if enable {
            libc::PACKET_ADD_MEMBERSHIP
        } else {
            libc::PACKET_DROP_MEMBERSHIP
        };
        let ret = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_PACKET,
                optname,
                &mreq as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::packet_mreq>() as u32,
            )
        };
        if ret < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    pub async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let mut guard = self.async_fd.readable().await.map_err(Error::Io)?;
            match guard.try_io(|inner| {
                let fd = *inner.get_ref();
                let n = unsafe { libc::recv(fd, buf.as_mut_ptr() as *mut _, buf.len(), 0) };
                if n < 0 {
                    Err(std::io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            }) {
                Ok(Ok(len)) => return Ok(len),
                Ok(Err(e)) => return Err(Error::Io(e)),
                Err(_would_block) => continue,
            }
        }
    }

    pub async fn send(&self, buf: &[u8]) -> Result<usize> {
        loop {
            let mut guard = self.async_fd.writable().await.map_err(Error::Io)?;
            match guard.try_io(|inner| {
                let fd = *inner.get_ref();
                let n = unsafe { libc::send(fd, buf.as_ptr() as *const _, buf.len(), 0) };
                if n < 0 {
                    Err(std::io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            }) {
                Ok(Ok(len)) => return Ok(len),
                Ok(Err(e)) => return Err(Error::Io(e)),
                Err(_would_block) => continue,
            }
        }
    }

    pub fn ifindex(&self) -> i32 {
        self.ifindex
    }

    /// Hardware address discovered at bind time
    pub fn mac(&self) -> MacAddr {
        self.mac
    }
}

impl AsRawFd for AfPacketSocket {
    fn as_raw_fd(&self) -> RawFd {
        *self.async_fd.get_ref()
    }
}

impl Drop for AfPacketSocket {
    fn drop(&mut self) {
        let _ = Self::set_promisc(*self.async_fd.get_ref(), self.ifindex, false);
        unsafe { libc::close(*self.async_fd.get_ref()) };
    }
}
