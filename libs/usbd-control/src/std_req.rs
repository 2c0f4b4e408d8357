//! Chapter 9 standard requests, by recipient.

use crate::descriptor::Speed;
use crate::driver::UsbDriver;
use crate::error::{Error, Result};
use crate::request::{
    string_index, DescriptorType, FeatureSelector, StandardRequest, TestMode, STATUS_ENDPOINT_HALT,
    STATUS_REMOTE_WAKEUP, STATUS_SELF_POWERED,
};
use crate::setup::SetupRequest;
use crate::state::{ConfigChange, DeviceState};
use crate::UsbDeviceCore;

/// Device descriptor bytes sent before enumeration has settled: enough for bMaxPacketSize0.
const DEVICE_DESCRIPTOR_PREFIX: usize = 8;

impl<'a, D: UsbDriver> UsbDeviceCore<'a, D> {
    /// Standard request with a device recipient.
    pub fn handle_device_request(&mut self, req: &SetupRequest) -> Result<()> {
        self.open(req);
        let ret = self.device_request(req);
        self.complete(req, ret)
    }

    /// Any request with an interface recipient. Only a configured device has interfaces.
    pub fn handle_interface_request(&mut self, req: &SetupRequest) -> Result<()> {
        self.open(req);
        let ret = self.interface_request(req);
        self.complete(req, ret)
    }

    /// Standard request with an endpoint recipient.
    pub fn handle_endpoint_request(&mut self, req: &SetupRequest) -> Result<()> {
        self.open(req);
        let ret = self.endpoint_request(req);
        self.complete(req, ret)
    }

    fn device_request(&mut self, req: &SetupRequest) -> Result<()> {
        let code = req.standard_request().ok_or(Error::UnsupportedRequest)?;
        match code {
            StandardRequest::GetDescriptor => self.get_descriptor(req),
            StandardRequest::SetAddress => self.set_address(req),
            StandardRequest::SetConfiguration => self.set_configuration(req),
            StandardRequest::GetConfiguration => self.get_configuration(req),
            StandardRequest::GetStatus => self.get_device_status(req),
            StandardRequest::SetFeature => self.set_device_feature(req, true),
            StandardRequest::ClearFeature => self.set_device_feature(req, false),
            StandardRequest::SetDescriptor
            | StandardRequest::GetInterface
            | StandardRequest::SetInterface
            | StandardRequest::SynchFrame => Err(Error::UnsupportedRequest),
        }
    }

    fn interface_request(&mut self, req: &SetupRequest) -> Result<()> {
        if self.ctx.state() != DeviceState::Configured {
            return Err(Error::InvalidState);
        }
        if req.interface() >= self.settings.num_interfaces {
            return Err(Error::InvalidRequest);
        }
        self.forward_to_class(req)
    }

    fn endpoint_request(&mut self, req: &SetupRequest) -> Result<()> {
        let code = req.standard_request().ok_or(Error::UnsupportedRequest)?;
        let ep = req.endpoint();
        if ep.index() >= self.settings.num_endpoints {
            return Err(Error::InvalidEndpoint);
        }
        match self.ctx.state() {
            DeviceState::Default => return Err(Error::InvalidState),
            // only endpoint 0 exists until a configuration is selected
            DeviceState::Addressed if ep.index() != 0 => return Err(Error::InvalidState),
            _ => {}
        }
        match code {
            StandardRequest::SetFeature | StandardRequest::ClearFeature => {
                let set = code == StandardRequest::SetFeature;
                if FeatureSelector::from_value(req.value) == Some(FeatureSelector::EndpointHalt) && ep.index() != 0 {
                    self.ctx.set_halt(ep, set)?;
                    if set {
                        self.driver.ep_stall(ep);
                    } else {
                        self.driver.ep_clear_stall(ep);
                        self.class.endpoint_unhalted(ep);
                    }
                    log::debug!("ep {:?} halt {}", ep, set);
                }
                self.pipe.send_status(&mut self.driver)
            }
            StandardRequest::GetStatus => {
                let status = if self.ctx.is_halted(ep)? { STATUS_ENDPOINT_HALT } else { 0 };
                self.respond(req, &[status, 0])
            }
            StandardRequest::GetDescriptor
            | StandardRequest::SetAddress
            | StandardRequest::SetDescriptor
            | StandardRequest::GetConfiguration
            | StandardRequest::SetConfiguration
            | StandardRequest::GetInterface
            | StandardRequest::SetInterface
            | StandardRequest::SynchFrame => Err(Error::UnsupportedRequest),
        }
    }

    fn get_descriptor(&mut self, req: &SetupRequest) -> Result<()> {
        let speed = self.ctx.speed();
        let (dtype, index) = req.descriptor_type_index();
        let descriptors = self.descriptors;
        let class = &*self.class;
        let desc: &[u8] = match DescriptorType::from_code(dtype) {
            Some(DescriptorType::Device) => {
                let dd = descriptors.device_descriptor(speed);
                if req.length == 64 || self.ctx.state() == DeviceState::Default {
                    &dd[..dd.len().min(DEVICE_DESCRIPTOR_PREFIX)]
                } else {
                    dd
                }
            }
            Some(DescriptorType::Configuration) => class.config_descriptor(speed),
            Some(DescriptorType::String) => match index {
                string_index::LANGID => descriptors.lang_id_string(speed),
                string_index::MANUFACTURER => descriptors.manufacturer_string(speed),
                string_index::PRODUCT => descriptors.product_string(speed),
                string_index::SERIAL => descriptors.serial_string(speed),
                string_index::CONFIGURATION => descriptors.configuration_string(speed),
                string_index::INTERFACE => descriptors.interface_string(speed),
                _ => class.usr_string(speed, index).ok_or(Error::UnsupportedRequest)?,
            },
            Some(DescriptorType::DeviceQualifier) if speed == Speed::High => {
                descriptors.device_qualifier(speed).ok_or(Error::UnsupportedRequest)?
            }
            Some(DescriptorType::OtherSpeedConfiguration) if speed == Speed::High => {
                class.other_speed_config_descriptor(speed).ok_or(Error::UnsupportedRequest)?
            }
            _ => return Err(Error::UnsupportedRequest),
        };
        if desc.is_empty() {
            return Err(Error::UnsupportedRequest);
        }
        #[cfg(feature = "verbose-debug")]
        log::trace!("GET_DESCRIPTOR {:02x}/{} -> {} of {} bytes", dtype, index, desc.len(), req.length);
        let len = desc.len().min(req.length as usize);
        if len == 0 {
            return self.pipe.send_status(&mut self.driver);
        }
        let len = self.pipe.load(&desc[..len]);
        if dtype == DescriptorType::OtherSpeedConfiguration as u8 && len > 1 {
            // the class hands over its ordinary configuration layout
            self.pipe.buffer_mut()[1] = DescriptorType::OtherSpeedConfiguration as u8;
        }
        self.pipe.start_in(len, &mut self.driver)
    }

    fn set_address(&mut self, req: &SetupRequest) -> Result<()> {
        if req.index != 0 || req.length != 0 {
            return Err(Error::InvalidRequest);
        }
        let addr = self.ctx.set_address((req.value & 0x7F) as u8)?;
        log::info!("USB address {}", addr);
        self.driver.set_device_address(addr);
        self.pipe.send_status(&mut self.driver)
    }

    fn set_configuration(&mut self, req: &SetupRequest) -> Result<()> {
        if req.value > u8::MAX as u16 {
            return Err(Error::InvalidRequest);
        }
        let cfgidx = req.value as u8;
        if cfgidx != 0 && !self.class.advertises_configuration(self.ctx.speed(), cfgidx) {
            return Err(Error::InvalidRequest);
        }
        let change = self.ctx.plan_configuration(cfgidx)?;
        match change {
            ConfigChange::Unchanged => {}
            ConfigChange::Activate { previous, cfgidx } => {
                if let Some(prev) = previous {
                    self.class.deactivate(prev);
                }
                if let Err(e) = self.class.activate(cfgidx) {
                    log::warn!("configuration {} refused: {}", cfgidx, e);
                    if let Some(prev) = previous {
                        // restore the previous configuration
                        if self.class.activate(prev).is_err() {
                            log::error!("configuration {} could not be restored", prev);
                        }
                    }
                    return Err(if e.is_protocol() { Error::ClassRejected } else { e });
                }
                self.ctx.apply_configuration(change);
                log::info!("USB configured, cfg {}", cfgidx);
                self.notify_configured(cfgidx);
            }
            ConfigChange::Deactivate { previous } => {
                self.class.deactivate(previous);
                self.ctx.apply_configuration(change);
                log::info!("USB deconfigured");
            }
        }
        self.pipe.send_status(&mut self.driver)
    }

    fn get_configuration(&mut self, req: &SetupRequest) -> Result<()> {
        if req.length != 1 {
            return Err(Error::InvalidRequest);
        }
        match self.ctx.state() {
            DeviceState::Default => Err(Error::InvalidState),
            DeviceState::Addressed | DeviceState::Configured => {
                let cfg = self.ctx.config().config_index;
                self.respond(req, &[cfg])
            }
        }
    }

    fn get_device_status(&mut self, req: &SetupRequest) -> Result<()> {
        if self.ctx.state() == DeviceState::Default {
            return Err(Error::InvalidState);
        }
        let mut status = STATUS_SELF_POWERED;
        if self.ctx.config().remote_wakeup {
            status |= STATUS_REMOTE_WAKEUP;
        }
        self.respond(req, &[status])
    }

    fn set_device_feature(&mut self, req: &SetupRequest, set: bool) -> Result<()> {
        match FeatureSelector::from_value(req.value) {
            Some(FeatureSelector::DeviceRemoteWakeup) => {
                if self.ctx.state() == DeviceState::Default {
                    return Err(Error::InvalidState);
                }
                self.ctx.set_remote_wakeup(set);
            }
            Some(FeatureSelector::TestMode) => {
                if !set || req.index & 0xFF != 0 {
                    return Err(Error::InvalidRequest);
                }
                let mode = TestMode::from_selector((req.index >> 8) as u8).ok_or(Error::InvalidRequest)?;
                // entered once the status stage has gone out
                self.ctx.arm_test_mode(mode);
            }
            Some(FeatureSelector::EndpointHalt) | None => {
                log::debug!("device feature {} ignored", req.value);
            }
        }
        self.pipe.send_status(&mut self.driver)
    }
}
