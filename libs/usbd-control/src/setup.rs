use core::fmt;

use bitfield::bitfield;
use usb_device::UsbDirection;
use usb_device::endpoint::EndpointAddress;

use crate::request::StandardRequest;

bitfield! {
    /// bmRequestType, the first byte of every SETUP packet
    #[derive(Copy, Clone, Eq, PartialEq)]
    pub struct RequestType(u8);
    pub device_to_host, _: 7;
    pub kind_bits, _: 6, 5;
    pub recipient_bits, _: 4, 0;
}
impl fmt::Debug for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{:?}|{:?}",
            if self.device_to_host() { "IN" } else { "OUT" },
            self.kind(),
            self.recipient()
        )
    }
}
impl RequestType {
    pub fn kind(&self) -> RequestKind {
        match self.kind_bits() {
            0 => RequestKind::Standard,
            1 => RequestKind::Class,
            2 => RequestKind::Vendor,
            _ => RequestKind::Reserved,
        }
    }

    pub fn recipient(&self) -> Recipient {
        match self.recipient_bits() {
            0 => Recipient::Device,
            1 => Recipient::Interface,
            2 => Recipient::Endpoint,
            3 => Recipient::Other,
            _ => Recipient::Reserved,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RequestKind {
    Standard,
    Class,
    Vendor,
    Reserved,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
    Reserved,
}

/// A decoded SETUP packet. The raw field names follow the wire layout; the accessors
/// interpret them.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct SetupRequest {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl SetupRequest {
    pub const LEN: usize = 8;

    /// Decodes the little-endian wire packet. Pure: no validation happens here.
    pub fn parse(raw: &[u8; Self::LEN]) -> Self {
        SetupRequest {
            request_type: raw[0],
            request: raw[1],
            value: u16::from_le_bytes([raw[2], raw[3]]),
            index: u16::from_le_bytes([raw[4], raw[5]]),
            length: u16::from_le_bytes([raw[6], raw[7]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut raw = [0u8; Self::LEN];
        raw[0] = self.request_type;
        raw[1] = self.request;
        raw[2..4].copy_from_slice(&self.value.to_le_bytes());
        raw[4..6].copy_from_slice(&self.index.to_le_bytes());
        raw[6..8].copy_from_slice(&self.length.to_le_bytes());
        raw
    }

    pub fn bm_request_type(&self) -> RequestType { RequestType(self.request_type) }

    pub fn direction(&self) -> UsbDirection {
        if self.bm_request_type().device_to_host() { UsbDirection::In } else { UsbDirection::Out }
    }

    pub fn kind(&self) -> RequestKind { self.bm_request_type().kind() }

    pub fn recipient(&self) -> Recipient { self.bm_request_type().recipient() }

    /// `None` for codes outside the chapter 9 table; callers stall on those.
    pub fn standard_request(&self) -> Option<StandardRequest> { StandardRequest::from_code(self.request) }

    /// (descriptor type, descriptor index) from the value field of GET_DESCRIPTOR
    pub fn descriptor_type_index(&self) -> (u8, u8) { ((self.value >> 8) as u8, self.value as u8) }

    /// Endpoint targeted by an endpoint-recipient request
    pub fn endpoint(&self) -> EndpointAddress { EndpointAddress::from(self.index as u8) }

    /// Interface targeted by an interface-recipient request
    pub fn interface(&self) -> u8 { self.index as u8 }
}
