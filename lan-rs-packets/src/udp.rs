use crate::*;
use std::convert::TryInto;
use std::net::Ipv4Addr;

/// View over a UDP header located at `layer4_offset` of a frame buffer.
#[derive(Clone, Debug)]
pub struct UdpSegment<T> {
    pub data: T,
    pub layer4_offset: usize,
    pub payload_offset: usize,
}

impl<T: AsRef<[u8]>> UdpSegment<T> {
    pub fn from_buffer(data: T, layer4_offset: usize) -> Result<UdpSegment<T>, &'static str> {
        let buf = data.as_ref();
        if buf.len() < layer4_offset + UDP_HEADER_LEN {
            return Err("Segment to short to contain valid UDP Header");
        }

        let length = u16::from_be_bytes(
            buf[layer4_offset + 4..=layer4_offset + 5]
                .try_into()
                .unwrap(),
        ) as usize;
        if length < UDP_HEADER_LEN || buf.len() < layer4_offset + length {
            return Err("Segment is not correct length as given by it's length field");
        }

        Ok(UdpSegment {
            data,
            layer4_offset,
            payload_offset: layer4_offset + UDP_HEADER_LEN,
        })
    }

    fn header(&self) -> &[u8] {
        &self.data.as_ref()[self.layer4_offset..self.payload_offset]
    }

    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes(self.header()[0..=1].try_into().unwrap())
    }

    pub fn dest_port(&self) -> u16 {
        u16::from_be_bytes(self.header()[2..=3].try_into().unwrap())
    }

    /// Length of header plus payload, as given by the length field.
    pub fn length(&self) -> u16 {
        u16::from_be_bytes(self.header()[4..=5].try_into().unwrap())
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes(self.header()[6..=7].try_into().unwrap())
    }

    pub fn payload(&self) -> &[u8] {
        let end = self.layer4_offset + self.length() as usize;
        &self.data.as_ref()[self.payload_offset..end]
    }

    fn segment(&self) -> &[u8] {
        let end = self.layer4_offset + self.length() as usize;
        &self.data.as_ref()[self.layer4_offset..end]
    }

    /// A zero checksum means the sender did not compute one.
    pub fn validate_checksum(&self, src: Ipv4Addr, dest: Ipv4Addr) -> bool {
        if self.checksum() == 0 {
            return true;
        }
        let sum = pseudo_header_sum(src, dest, IpProtocol::UDP.into(), self.length());
        checksum_finish(checksum_add(sum, self.segment())) == 0
    }

    /// Calculates the checksum over pseudo header, header and payload.
    pub fn calculate_checksum(&self, src: Ipv4Addr, dest: Ipv4Addr) -> u16 {
        let segment = self.segment();
        let mut sum = pseudo_header_sum(src, dest, IpProtocol::UDP.into(), self.length());
        sum = checksum_add(sum, &segment[..6]);
        sum = checksum_add(sum, &segment[UDP_HEADER_LEN..]);
        match checksum_finish(sum) {
            // An all-zero result goes on the wire as all ones.
            0 => 0xFFFF,
            checksum => checksum,
        }
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> UdpSegment<T> {
    fn header_mut(&mut self) -> &mut [u8] {
        let (start, end) = (self.layer4_offset, self.payload_offset);
        &mut self.data.as_mut()[start..end]
    }

    pub fn set_src_port(&mut self, port: u16) {
        self.header_mut()[0..=1].copy_from_slice(&port.to_be_bytes());
    }

    pub fn set_dest_port(&mut self, port: u16) {
        self.header_mut()[2..=3].copy_from_slice(&port.to_be_bytes());
    }

    pub fn set_length(&mut self, length: u16) {
        self.header_mut()[4..=5].copy_from_slice(&length.to_be_bytes());
    }

    pub fn set_checksum(&mut self, src: Ipv4Addr, dest: Ipv4Addr) {
        let checksum = self.calculate_checksum(src, dest);
        self.header_mut()[6..=7].copy_from_slice(&checksum.to_be_bytes());
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        let end = self.layer4_offset + self.length() as usize;
        let start = self.payload_offset;
        &mut self.data.as_mut()[start..end]
    }
}

/// Writes ports and length of a fresh UDP header at `layer4_offset`, zeroing the checksum.
pub fn write_udp_header(
    data: &mut [u8],
    layer4_offset: usize,
    src_port: u16,
    dest_port: u16,
    payload_len: usize,
) -> Result<UdpSegment<&mut [u8]>, &'static str> {
    let length = UDP_HEADER_LEN + payload_len;
    if length > u16::max_value() as usize || data.len() < layer4_offset + length {
        return Err("Payload does not fit in the buffer");
    }
    let header = &mut data[layer4_offset..layer4_offset + UDP_HEADER_LEN];
    header[0..=1].copy_from_slice(&src_port.to_be_bytes());
    header[2..=3].copy_from_slice(&dest_port.to_be_bytes());
    header[4..=5].copy_from_slice(&(length as u16).to_be_bytes());
    header[6..=7].copy_from_slice(&[0, 0]);
    UdpSegment::from_buffer(data, layer4_offset)
}
