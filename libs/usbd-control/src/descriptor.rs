//! Descriptor plumbing. The bytes themselves come from the application; this module only
//! defines how the core asks for them, plus a few builders for the fixed-format records.

use crate::request::DescriptorType;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Speed {
    Low,
    Full,
    High,
}
impl Speed {
    /// Largest endpoint-0 packet allowed at this speed
    pub fn ep0_max_packet_size(&self) -> usize {
        match self {
            Speed::Low => 8,
            Speed::Full | Speed::High => crate::FS_MAX_PKT_SIZE,
        }
    }
}

/// Source of the device-level descriptors. Each method returns the complete descriptor;
/// the core clamps to wLength. An empty slice means "not provided" and the request stalls.
pub trait DescriptorProvider {
    fn device_descriptor(&self, speed: Speed) -> &[u8];
    fn lang_id_string(&self, speed: Speed) -> &[u8];
    fn manufacturer_string(&self, speed: Speed) -> &[u8];
    fn product_string(&self, speed: Speed) -> &[u8];
    fn serial_string(&self, speed: Speed) -> &[u8];
    fn configuration_string(&self, speed: Speed) -> &[u8];
    fn interface_string(&self, speed: Speed) -> &[u8];
    /// Only high-speed capable devices have one.
    fn device_qualifier(&self, _speed: Speed) -> Option<&[u8]> { None }
}

/// A [`DescriptorProvider`] over pre-built byte slices, the same for every speed.
#[derive(Debug, Copy, Clone, Default)]
pub struct StaticDescriptors<'a> {
    pub device: &'a [u8],
    pub qualifier: Option<&'a [u8]>,
    pub lang_id: &'a [u8],
    pub manufacturer: &'a [u8],
    pub product: &'a [u8],
    pub serial: &'a [u8],
    pub configuration: &'a [u8],
    pub interface: &'a [u8],
}

impl<'a> DescriptorProvider for StaticDescriptors<'a> {
    fn device_descriptor(&self, _speed: Speed) -> &[u8] { self.device }

    fn lang_id_string(&self, _speed: Speed) -> &[u8] { self.lang_id }

    fn manufacturer_string(&self, _speed: Speed) -> &[u8] { self.manufacturer }

    fn product_string(&self, _speed: Speed) -> &[u8] { self.product }

    fn serial_string(&self, _speed: Speed) -> &[u8] { self.serial }

    fn configuration_string(&self, _speed: Speed) -> &[u8] { self.configuration }

    fn interface_string(&self, _speed: Speed) -> &[u8] { self.interface }

    fn device_qualifier(&self, _speed: Speed) -> Option<&[u8]> { self.qualifier }
}

/// Encodes `s` as a string descriptor (UTF-16LE) into `buf`; returns the descriptor length.
/// Output that does not fit in `buf` or in the one-byte bLength is truncated at a character
/// boundary.
pub fn string_descriptor(s: &str, buf: &mut [u8]) -> usize {
    if buf.len() < 2 {
        return 0;
    }
    let limit = buf.len().min(u8::MAX as usize) & !1;
    let mut len = 2;
    for unit in s.encode_utf16() {
        if len + 2 > limit {
            break;
        }
        buf[len..len + 2].copy_from_slice(&unit.to_le_bytes());
        len += 2;
    }
    buf[0] = len as u8;
    buf[1] = DescriptorType::String as u8;
    len
}

/// String descriptor 0 advertising a single language
pub const fn lang_id_descriptor(lang_id: u16) -> [u8; 4] {
    let id = lang_id.to_le_bytes();
    [4, DescriptorType::String as u8, id[0], id[1]]
}

/// US English
pub const LANG_ID_EN_US: u16 = 0x0409;

#[allow(dead_code)]
#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct DeviceDescriptor {
    pub b_length: u8,
    pub b_descriptor_type: u8,
    pub b_cd_usb: [u8; 2],
    pub b_device_class: u8,
    pub b_device_sub_class: u8,
    pub b_device_protocol: u8,
    pub b_max_packet_size0: u8,
    pub id_vendor: [u8; 2],
    pub id_product: [u8; 2],
    pub b_cd_device: [u8; 2],
    pub i_manufacturer: u8,
    pub i_product: u8,
    pub i_serial_number: u8,
    pub b_num_configurations: u8,
}

impl DeviceDescriptor {
    /// USB 2.0 device with per-interface classing and the standard string indices
    pub fn new(id_vendor: u16, id_product: u16, max_packet_size0: u8) -> Self {
        Self {
            b_length: core::mem::size_of::<Self>() as u8,
            b_descriptor_type: DescriptorType::Device as u8,
            b_cd_usb: 0x0200u16.to_le_bytes(),
            b_device_class: 0,
            b_device_sub_class: 0,
            b_device_protocol: 0,
            b_max_packet_size0: max_packet_size0,
            id_vendor: id_vendor.to_le_bytes(),
            id_product: id_product.to_le_bytes(),
            b_cd_device: 0x0100u16.to_le_bytes(),
            i_manufacturer: crate::request::string_index::MANUFACTURER,
            i_product: crate::request::string_index::PRODUCT,
            i_serial_number: crate::request::string_index::SERIAL,
            b_num_configurations: 1,
        }
    }
}

impl AsRef<[u8]> for DeviceDescriptor {
    fn as_ref(&self) -> &[u8] {
        // all fields are bytes, multi-byte values already in wire order
        unsafe {
            core::slice::from_raw_parts(
                self as *const DeviceDescriptor as *const u8,
                core::mem::size_of::<DeviceDescriptor>(),
            )
        }
    }
}

/* USB_DT_DEVICE_QUALIFIER: Device Qualifier descriptor */
#[allow(dead_code)]
#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct QualifierDescriptor {
    pub b_length: u8,
    pub b_descriptor_type: u8,
    pub b_cd_usb: [u8; 2],
    pub b_device_class: u8,
    pub b_device_sub_class: u8,
    pub b_device_protocol: u8,
    pub b_max_packet_size0: u8,
    pub b_num_configurations: u8,
    pub b_reserved: u8,
}

impl QualifierDescriptor {
    /// Describes the same device as `dd`, as it would look at the other speed.
    pub fn from_device(dd: &DeviceDescriptor) -> Self {
        Self {
            b_length: core::mem::size_of::<Self>() as u8,
            b_descriptor_type: DescriptorType::DeviceQualifier as u8,
            b_cd_usb: dd.b_cd_usb,
            b_device_class: dd.b_device_class,
            b_device_sub_class: dd.b_device_sub_class,
            b_device_protocol: dd.b_device_protocol,
            b_max_packet_size0: dd.b_max_packet_size0,
            b_num_configurations: dd.b_num_configurations,
            b_reserved: 0,
        }
    }
}

impl AsRef<[u8]> for QualifierDescriptor {
    fn as_ref(&self) -> &[u8] {
        unsafe {
            core::slice::from_raw_parts(
                self as *const QualifierDescriptor as *const u8,
                core::mem::size_of::<QualifierDescriptor>(),
            )
        }
    }
}
