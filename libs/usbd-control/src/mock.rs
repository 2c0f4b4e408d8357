//! Test doubles: a recording UDC driver, a scriptable class and a descriptor set.

use std::cell::RefCell;
use std::rc::Rc;
use std::vec::Vec;

use usb_device::endpoint::EndpointAddress;
use usb_device::{UsbDirection, UsbError};

use crate::class::{ClassCallback, ControlXfer, DeviceEvents};
use crate::descriptor::{Speed, StaticDescriptors};
use crate::error::{Error, Result};
use crate::request::TestMode;
use crate::setup::SetupRequest;
use crate::UsbDriver;

pub fn ep_u8(ep: EndpointAddress) -> u8 {
    match ep.direction() {
        UsbDirection::In => 0x80 | ep.index() as u8,
        UsbDirection::Out => ep.index() as u8,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Transmit(u8, Vec<u8>),
    PrepareReceive(u8, usize),
    Stall(u8),
    ClearStall(u8),
    SetAddress(u8),
    Ep0OutStart,
    TestMode(TestMode),
    RemoteWakeup,
}

#[derive(Debug, Default)]
pub struct MockDriver {
    pub calls: Vec<Call>,
    /// returned (once) by the next transmit or prepare-receive
    pub fail_next: Option<UsbError>,
}

impl MockDriver {
    /// Payloads queued on endpoint 0x80, oldest first
    pub fn transmits(&self) -> Vec<Vec<u8>> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Transmit(0x80, data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn stalls(&self) -> Vec<u8> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Stall(ep) => Some(*ep),
                _ => None,
            })
            .collect()
    }
}

impl UsbDriver for MockDriver {
    fn ep_transmit(&mut self, ep: EndpointAddress, data: &[u8]) -> core::result::Result<(), UsbError> {
        if let Some(e) = self.fail_next.take() {
            return Err(e);
        }
        self.calls.push(Call::Transmit(ep_u8(ep), data.to_vec()));
        Ok(())
    }

    fn ep_prepare_receive(&mut self, ep: EndpointAddress, len: usize) -> core::result::Result<(), UsbError> {
        if let Some(e) = self.fail_next.take() {
            return Err(e);
        }
        self.calls.push(Call::PrepareReceive(ep_u8(ep), len));
        Ok(())
    }

    fn ep_stall(&mut self, ep: EndpointAddress) { self.calls.push(Call::Stall(ep_u8(ep))); }

    fn ep_clear_stall(&mut self, ep: EndpointAddress) { self.calls.push(Call::ClearStall(ep_u8(ep))); }

    fn set_device_address(&mut self, addr: u8) { self.calls.push(Call::SetAddress(addr)); }

    fn ep0_out_start(&mut self) { self.calls.push(Call::Ep0OutStart); }

    fn set_test_mode(&mut self, mode: TestMode) { self.calls.push(Call::TestMode(mode)); }

    fn remote_wakeup(&mut self) { self.calls.push(Call::RemoteWakeup); }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassEvent {
    Activate(u8),
    Deactivate(u8),
    Setup(SetupRequest),
    Unhalted(u8),
    TxSent,
    RxReady(Vec<u8>),
    DataIn(u8),
    DataOut(u8, Vec<u8>),
    Sof,
}

/// One configuration (bConfigurationValue 1) with a single vendor interface
pub const CONFIG: [u8; 18] = [9, 2, 18, 0, 1, 1, 0, 0x80, 50, 9, 4, 0, 0, 0, 0xff, 0, 0, 0];

pub struct MockClass {
    pub log: Rc<RefCell<Vec<ClassEvent>>>,
    pub config: Vec<u8>,
    pub other_speed: Option<Vec<u8>>,
    pub user_string: Option<Vec<u8>>,
    /// configurations offered besides the one in `config`
    pub extra_configs: Vec<u8>,
    /// activation of this configuration is logged, then refused
    pub reject_activate: Option<u8>,
    pub reject_setup: bool,
    /// sent back for device-to-host class requests
    pub reply: Option<Vec<u8>>,
    /// arm an OUT data stage for host-to-device class requests with data
    pub receive: bool,
}

impl Default for MockClass {
    fn default() -> Self {
        MockClass {
            log: Rc::new(RefCell::new(Vec::new())),
            config: CONFIG.to_vec(),
            other_speed: None,
            user_string: None,
            extra_configs: Vec::new(),
            reject_activate: None,
            reject_setup: false,
            reply: None,
            receive: false,
        }
    }
}

impl MockClass {
    pub fn events(&self) -> Rc<RefCell<Vec<ClassEvent>>> { self.log.clone() }

    fn push(&self, ev: ClassEvent) { self.log.borrow_mut().push(ev); }
}

impl ClassCallback for MockClass {
    fn activate(&mut self, cfgidx: u8) -> Result<()> {
        self.push(ClassEvent::Activate(cfgidx));
        if self.reject_activate == Some(cfgidx) {
            return Err(Error::ClassRejected);
        }
        Ok(())
    }

    fn deactivate(&mut self, cfgidx: u8) { self.push(ClassEvent::Deactivate(cfgidx)); }

    fn setup(&mut self, req: &SetupRequest, xfer: &mut ControlXfer<'_>) -> Result<()> {
        self.push(ClassEvent::Setup(*req));
        if self.reject_setup {
            return Err(Error::ClassRejected);
        }
        if req.bm_request_type().device_to_host() {
            if let Some(data) = &self.reply {
                xfer.send(data)?;
            }
        } else if self.receive && req.length > 0 {
            xfer.prepare_receive(req.length as usize)?;
        }
        Ok(())
    }

    fn config_descriptor(&self, _speed: Speed) -> &[u8] { &self.config }

    fn advertises_configuration(&self, _speed: Speed, cfgidx: u8) -> bool {
        self.config.get(5) == Some(&cfgidx) || self.extra_configs.contains(&cfgidx)
    }

    fn other_speed_config_descriptor(&self, _speed: Speed) -> Option<&[u8]> { self.other_speed.as_deref() }

    fn usr_string(&self, _speed: Speed, index: u8) -> Option<&[u8]> {
        if index == 0xEE { self.user_string.as_deref() } else { None }
    }

    fn endpoint_unhalted(&mut self, ep: EndpointAddress) { self.push(ClassEvent::Unhalted(ep_u8(ep))); }

    fn ep0_tx_sent(&mut self) { self.push(ClassEvent::TxSent); }

    fn ep0_rx_ready(&mut self, data: &[u8]) { self.push(ClassEvent::RxReady(data.to_vec())); }

    fn data_in(&mut self, ep: EndpointAddress) { self.push(ClassEvent::DataIn(ep_u8(ep))); }

    fn data_out(&mut self, ep: EndpointAddress, data: &[u8]) {
        self.push(ClassEvent::DataOut(ep_u8(ep), data.to_vec()));
    }

    fn sof(&mut self) { self.push(ClassEvent::Sof); }
}

#[derive(Debug, Default)]
pub struct MockEvents {
    pub resets: usize,
    pub configured: Vec<u8>,
    pub suspended: usize,
    pub resumed: usize,
    pub connected: usize,
    pub disconnected: usize,
}

impl DeviceEvents for MockEvents {
    fn device_reset(&mut self, _speed: Speed) { self.resets += 1; }

    fn device_configured(&mut self, cfgidx: u8) { self.configured.push(cfgidx); }

    fn device_suspended(&mut self) { self.suspended += 1; }

    fn device_resumed(&mut self) { self.resumed += 1; }

    fn device_connected(&mut self) { self.connected += 1; }

    fn device_disconnected(&mut self) { self.disconnected += 1; }
}

pub const DEVICE: [u8; 18] =
    [18, 1, 0x00, 0x02, 0, 0, 0, 64, 0x09, 0x12, 0x13, 0x36, 0x00, 0x01, 1, 2, 3, 1];
pub const QUALIFIER: [u8; 10] = [10, 6, 0x00, 0x02, 0, 0, 0, 64, 1, 0];
pub const LANG: [u8; 4] = [4, 3, 0x09, 0x04];
pub const MANUFACTURER: [u8; 8] = [8, 3, b'A', 0, b'c', 0, b'm', 0];
pub const PRODUCT: [u8; 6] = [6, 3, b'U', 0, b'n', 0];
pub const SERIAL: [u8; 6] = [6, 3, b'0', 0, b'1', 0];

/// Device, language and three strings; no configuration or interface string.
pub fn descriptors() -> StaticDescriptors<'static> {
    StaticDescriptors {
        device: &DEVICE,
        qualifier: Some(&QUALIFIER),
        lang_id: &LANG,
        manufacturer: &MANUFACTURER,
        product: &PRODUCT,
        serial: &SERIAL,
        configuration: &[],
        interface: &[],
    }
}

pub fn setup(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> [u8; 8] {
    SetupRequest { request_type, request, value, index, length }.to_bytes()
}
