#![allow(non_camel_case_types)]

use libc;

/// Fetch the interface index for a name.
pub(crate) const SIOCGIFINDEX: libc::c_ulong = 0x8933;
/// Fetch the hardware address for a name.
pub(crate) const SIOCGIFHWADDR: libc::c_ulong = 0x8927;

pub(crate) const SOL_PACKET: libc::c_int = 263;
pub(crate) const PACKET_ADD_MEMBERSHIP: libc::c_int = 1;
pub(crate) const PACKET_DROP_MEMBERSHIP: libc::c_int = 2;
pub(crate) const PACKET_MR_PROMISC: libc::c_ushort = 1;

/// `sll_pkttype` of a frame this host sent itself.
pub(crate) const PACKET_OUTGOING: libc::c_uchar = 4;

// Only the members we read or write. The kernel union is 24 bytes wide; `ifru_pad` keeps ours
// the same size so the ioctl never writes past the end.
#[repr(C)]
pub(crate) union ifru {
    pub(crate) ifru_hwaddr: libc::sockaddr,
    pub(crate) ifru_ivalue: libc::c_int,
    #[allow(dead_code)]
    ifru_pad: [u8; 24],
}

#[repr(C)]
pub(crate) struct ifreq {
    pub(crate) ifr_name: [libc::c_char; libc::IFNAMSIZ],
    pub(crate) ifr_ifru: ifru,
}

#[repr(C)]
pub(crate) struct packet_mreq {
    pub(crate) mr_ifindex: libc::c_int,
    pub(crate) mr_type: libc::c_ushort,
    pub(crate) mr_alen: libc::c_ushort,
    pub(crate) mr_address: [libc::c_uchar; 8],
}
