use std::net::Ipv4Addr;

/// Adds `data` to a running one's complement sum as big-endian 16bit words.
/// A trailing odd byte is padded with a zero low byte.
pub fn checksum_add(mut sum: u32, data: &[u8]) -> u32 {
    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }
    if let [last] = words.remainder() {
        sum += u32::from(*last) << 8;
    }
    sum
}

/// Folds the carries back in and returns the complemented 16bit checksum.
pub fn checksum_finish(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Internet checksum (RFC 1071) over a single byte range.
pub fn internet_checksum(data: &[u8]) -> u16 {
    checksum_finish(checksum_add(0, data))
}

/// Partial sum of the pseudo header used by UDP and TCP checksums.
pub fn pseudo_header_sum(src: Ipv4Addr, dest: Ipv4Addr, protocol: u8, length: u16) -> u32 {
    let mut sum = checksum_add(0, &src.octets());
    sum = checksum_add(sum, &dest.octets());
    sum += u32::from(protocol);
    sum += u32::from(length);
    sum
}
