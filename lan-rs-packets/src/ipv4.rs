use crate::*;
use std::convert::TryInto;
use std::net::Ipv4Addr;

/// View over an IPv4 header located at `layer3_offset` of a frame buffer.
///
/// The buffer may carry trailing link-layer padding; `total_len` is what bounds the packet.
#[derive(Clone, Debug)]
pub struct Ipv4Packet<T> {
    pub data: T,
    pub layer3_offset: usize,
    pub payload_offset: usize,
}

impl<T: AsRef<[u8]>> Ipv4Packet<T> {
    pub fn from_buffer(data: T, layer3_offset: usize) -> Result<Ipv4Packet<T>, &'static str> {
        let buf = data.as_ref();
        if buf.len() < layer3_offset + IPV4_HEADER_LEN {
            return Err("Data is too short to be an IPv4 Packet");
        }

        // Check version number
        let version: u8 = (buf[layer3_offset] & 0xF0) >> 4;
        if version != 4 {
            return Err("Packet has incorrect version, is not Ipv4Packet");
        }

        // This is the header length in 32bit words
        let ihl = (buf[layer3_offset] & 0x0F) as usize;
        if ihl < 5 {
            return Err("Packet has an IHL shorter than the minimum header");
        }
        let payload_offset = layer3_offset + (ihl * 4);

        let total_len = u16::from_be_bytes(
            buf[layer3_offset + 2..=layer3_offset + 3]
                .try_into()
                .unwrap(),
        ) as usize;
        if total_len < ihl * 4 || buf.len() < layer3_offset + total_len {
            return Err("Packet has invalid total length field");
        }

        Ok(Ipv4Packet {
            data,
            layer3_offset,
            payload_offset,
        })
    }

    fn header(&self) -> &[u8] {
        &self.data.as_ref()[self.layer3_offset..self.payload_offset]
    }

    pub fn version_ihl(&self) -> u8 {
        self.data.as_ref()[self.layer3_offset]
    }

    pub fn ihl(&self) -> u8 {
        self.version_ihl() & 0x0F
    }

    pub fn total_len(&self) -> u16 {
        u16::from_be_bytes(self.header()[2..=3].try_into().unwrap())
    }

    pub fn identification(&self) -> u16 {
        u16::from_be_bytes(self.header()[4..=5].try_into().unwrap())
    }

    /// Returns tuple of (Don't Fragment, More Fragments)
    pub fn flags(&self) -> (bool, bool) {
        let df = (self.header()[6] & 0x40) != 0;
        let mf = (self.header()[6] & 0x20) != 0;
        (df, mf)
    }

    pub fn ttl(&self) -> u8 {
        self.header()[8]
    }

    pub fn protocol(&self) -> IpProtocol {
        IpProtocol::from(self.header()[9])
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes(self.header()[10..=11].try_into().unwrap())
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        let octets: [u8; 4] = self.header()[12..16].try_into().unwrap();
        Ipv4Addr::from(octets)
    }

    pub fn dest_addr(&self) -> Ipv4Addr {
        let octets: [u8; 4] = self.header()[16..20].try_into().unwrap();
        Ipv4Addr::from(octets)
    }

    /// The bytes after the header, up to `total_len`.
    pub fn payload(&self) -> &[u8] {
        let end = self.layer3_offset + self.total_len() as usize;
        &self.data.as_ref()[self.payload_offset..end]
    }

    /// Verifies the header checksum: summing the header with the checksum field
    /// included must fold to zero.
    pub fn validate_checksum(&self) -> bool {
        internet_checksum(self.header()) == 0
    }

    /// Calculates what the checksum should be set to given the current header
    pub fn calculate_checksum(&self) -> u16 {
        let header = self.header();
        let sum = checksum_add(checksum_add(0, &header[..10]), &header[12..]);
        checksum_finish(sum)
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Ipv4Packet<T> {
    fn header_mut(&mut self) -> &mut [u8] {
        let (start, end) = (self.layer3_offset, self.payload_offset);
        &mut self.data.as_mut()[start..end]
    }

    pub fn set_total_len(&mut self, len: u16) {
        self.header_mut()[2..=3].copy_from_slice(&len.to_be_bytes());
    }

    pub fn set_identification(&mut self, id: u16) {
        self.header_mut()[4..=5].copy_from_slice(&id.to_be_bytes());
    }

    /// Clears flags and fragment offset, this stack never fragments.
    pub fn clear_fragmentation(&mut self) {
        self.header_mut()[6..=7].copy_from_slice(&[0, 0]);
    }

    pub fn set_ttl(&mut self, ttl: u8) {
        self.header_mut()[8] = ttl;
    }

    pub fn set_protocol(&mut self, protocol: IpProtocol) {
        self.header_mut()[9] = protocol.into();
    }

    pub fn set_src_addr(&mut self, addr: Ipv4Addr) {
        self.header_mut()[12..16].copy_from_slice(&addr.octets());
    }

    pub fn set_dest_addr(&mut self, addr: Ipv4Addr) {
        self.header_mut()[16..20].copy_from_slice(&addr.octets());
    }

    /// Sets checksum field to valid value
    pub fn set_checksum(&mut self) {
        let new_checksum = self.calculate_checksum();
        self.header_mut()[10..=11].copy_from_slice(&new_checksum.to_be_bytes());
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        let end = self.layer3_offset + self.total_len() as usize;
        let start = self.payload_offset;
        &mut self.data.as_mut()[start..end]
    }
}

/// Writes a fresh option-less header at `layer3_offset`: version 4, IHL 5, TOS 0,
/// identification 0, no fragmentation. The checksum is left for the caller to set once
/// the addresses are filled in.
pub fn write_ipv4_header(
    data: &mut [u8],
    layer3_offset: usize,
    total_len: u16,
    ttl: u8,
    protocol: IpProtocol,
) -> Result<Ipv4Packet<&mut [u8]>, &'static str> {
    if data.len() < layer3_offset + IPV4_HEADER_LEN {
        return Err("Data is too short to be an IPv4 Packet");
    }
    let header = &mut data[layer3_offset..layer3_offset + IPV4_HEADER_LEN];
    header.iter_mut().for_each(|b| *b = 0);
    header[0] = 0x45;
    header[2..=3].copy_from_slice(&total_len.to_be_bytes());
    header[8] = ttl;
    header[9] = protocol.into();
    Ipv4Packet::from_buffer(data, layer3_offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn udp_packet() -> Vec<u8> {
        vec![
            0x45, 0x00, 0x00, 0x20, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00, 0x00, 0x0a, 0x00,
            0x00, 0x05, 0x0a, 0x00, 0x00, 0x01, 0x04, 0xd2, 0x13, 0x88, 0x00, 0x0c, 0x00, 0x00,
            0x50, 0x49, 0x4e, 0x47,
        ]
    }

    #[test]
    fn ipv4_packet() {
        let packet = Ipv4Packet::from_buffer(udp_packet(), 0).unwrap();
        assert_eq!(packet.version_ihl(), 0x45);
        assert_eq!(packet.total_len(), 32);
        assert_eq!(packet.flags(), (true, false));
        assert_eq!(packet.ttl(), 64);
        assert_eq!(packet.protocol(), IpProtocol::UDP);
        assert_eq!(packet.src_addr(), Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(packet.dest_addr(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(packet.payload().len(), 12);
    }

    #[test]
    fn padding_is_not_payload() {
        let mut data = udp_packet();
        data.extend_from_slice(&[0u8; 14]);
        let packet = Ipv4Packet::from_buffer(data, 0).unwrap();
        assert_eq!(packet.payload().len(), 12);
    }

    #[test]
    fn invalid_lengths() {
        let mut data = udp_packet();
        data.truncate(30);
        assert!(Ipv4Packet::from_buffer(data, 0).is_err());

        let mut data = udp_packet();
        data[0] = 0x65;
        assert!(Ipv4Packet::from_buffer(data, 0).is_err());

        let mut data = udp_packet();
        data[0] = 0x44;
        assert!(Ipv4Packet::from_buffer(data, 0).is_err());
    }

    #[test]
    fn checksum() {
        let mut packet = Ipv4Packet::from_buffer(udp_packet(), 0).unwrap();
        assert!(!packet.validate_checksum());
        packet.set_checksum();
        assert!(packet.validate_checksum());
        assert_eq!(packet.checksum(), packet.calculate_checksum());

        packet.set_ttl(63);
        assert!(!packet.validate_checksum());
    }

    #[test]
    fn write_header() {
        let mut data = vec![0xAAu8; 14 + 28];
        let mut packet = write_ipv4_header(&mut data, 14, 28, 64, IpProtocol::UDP).unwrap();
        packet.set_src_addr(Ipv4Addr::new(192, 168, 0, 222));
        packet.set_dest_addr(Ipv4Addr::new(192, 168, 0, 1));
        packet.set_checksum();
        assert!(packet.validate_checksum());
        assert_eq!(packet.identification(), 0);
        assert_eq!(packet.flags(), (false, false));
        assert_eq!(packet.payload().len(), 8);
        assert_eq!(data[0], 0xAA);
        assert_eq!(data[14], 0x45);
    }
}
