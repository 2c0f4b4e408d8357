//! Chapter 9 code tables.

use num_traits::FromPrimitive;

#[derive(num_derive::FromPrimitive, Debug, Copy, Clone, Eq, PartialEq)]
pub enum StandardRequest {
    GetStatus = 0x00,
    ClearFeature = 0x01,
    SetFeature = 0x03,
    SetAddress = 0x05,
    GetDescriptor = 0x06,
    SetDescriptor = 0x07,
    GetConfiguration = 0x08,
    SetConfiguration = 0x09,
    GetInterface = 0x0A,
    SetInterface = 0x0B,
    SynchFrame = 0x0C,
}
impl StandardRequest {
    pub fn from_code(code: u8) -> Option<Self> { FromPrimitive::from_u8(code) }
}

#[derive(num_derive::FromPrimitive, Debug, Copy, Clone, Eq, PartialEq)]
pub enum DescriptorType {
    Device = 0x01,
    Configuration = 0x02,
    String = 0x03,
    Interface = 0x04,
    Endpoint = 0x05,
    DeviceQualifier = 0x06,
    OtherSpeedConfiguration = 0x07,
    InterfacePower = 0x08,
    Bos = 0x0F,
}
impl DescriptorType {
    pub fn from_code(code: u8) -> Option<Self> { FromPrimitive::from_u8(code) }
}

#[derive(num_derive::FromPrimitive, Debug, Copy, Clone, Eq, PartialEq)]
pub enum FeatureSelector {
    EndpointHalt = 0,
    DeviceRemoteWakeup = 1,
    TestMode = 2,
}
impl FeatureSelector {
    pub fn from_value(value: u16) -> Option<Self> { FromPrimitive::from_u16(value) }
}

/// Test selectors carried in the high byte of wIndex for SET_FEATURE(TEST_MODE)
#[derive(num_derive::FromPrimitive, Debug, Copy, Clone, Eq, PartialEq)]
pub enum TestMode {
    TestJ = 1,
    TestK = 2,
    Se0Nak = 3,
    Packet = 4,
    ForceEnable = 5,
}
impl TestMode {
    pub fn from_selector(selector: u8) -> Option<Self> { FromPrimitive::from_u8(selector) }
}

/// String descriptor indices served by the [`crate::DescriptorProvider`]. Anything above
/// `INTERFACE` is asked of the class.
pub mod string_index {
    pub const LANGID: u8 = 0;
    pub const MANUFACTURER: u8 = 1;
    pub const PRODUCT: u8 = 2;
    pub const SERIAL: u8 = 3;
    pub const CONFIGURATION: u8 = 4;
    pub const INTERFACE: u8 = 5;
}

/// GET_STATUS(device) bits
pub const STATUS_SELF_POWERED: u8 = 1 << 0;
pub const STATUS_REMOTE_WAKEUP: u8 = 1 << 1;
/// GET_STATUS(endpoint) bit
pub const STATUS_ENDPOINT_HALT: u8 = 1 << 0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_codes_do_not_map() {
        assert_eq!(StandardRequest::from_code(0x02), None);
        assert_eq!(StandardRequest::from_code(0x04), None);
        assert_eq!(StandardRequest::from_code(0x30), None);
        assert_eq!(StandardRequest::from_code(0x09), Some(StandardRequest::SetConfiguration));
        assert_eq!(DescriptorType::from_code(0x0b), None);
        assert_eq!(FeatureSelector::from_value(0x100), None);
        assert_eq!(TestMode::from_selector(0), None);
        assert_eq!(TestMode::from_selector(6), None);
        assert_eq!(TestMode::from_selector(3), Some(TestMode::Se0Nak));
    }
}
