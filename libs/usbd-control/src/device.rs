use usb_device::endpoint::EndpointAddress;

use crate::class::{ClassCallback, ControlXfer, DeviceEvents};
use crate::ctrl::{ControlPipe, ControlTransferSession, Ep0Event, Ep0State};
use crate::descriptor::{DescriptorProvider, Speed};
use crate::driver::UsbDriver;
use crate::error::{Error, Result};
use crate::setup::{Recipient, RequestKind, SetupRequest};
use crate::state::{DeviceConfig, DeviceContext, DeviceState};
use crate::{FS_MAX_PKT_SIZE, NUM_ENDPOINTS};

/// Static parameters of the device the core is driving.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DeviceSettings {
    /// speed assumed until the first bus reset reports the negotiated one
    pub speed: Speed,
    /// bMaxPacketSize0 from the device descriptor
    pub ep0_max_packet: usize,
    /// interfaces in the configuration; interface requests beyond this stall
    pub num_interfaces: u8,
    /// endpoint indices in use, including 0; at most [`NUM_ENDPOINTS`]
    pub num_endpoints: usize,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        DeviceSettings { speed: Speed::Full, ep0_max_packet: FS_MAX_PKT_SIZE, num_interfaces: 1, num_endpoints: NUM_ENDPOINTS }
    }
}

/// The device-side USB core: chapter 9 state, the endpoint-0 pipe and the glue to the
/// class and the hardware.
///
/// Every entry point runs to completion without blocking. When SETUP packets and endpoint
/// completions can arrive from different contexts, wrap the core in a
/// [`crate::SharedDevice`].
pub struct UsbDeviceCore<'a, D: UsbDriver> {
    pub(crate) driver: D,
    pub(crate) class: &'a mut dyn ClassCallback,
    pub(crate) descriptors: &'a dyn DescriptorProvider,
    events: Option<&'a mut dyn DeviceEvents>,
    pub(crate) ctx: DeviceContext,
    pub(crate) pipe: ControlPipe,
    pub(crate) settings: DeviceSettings,
}

impl<'a, D: UsbDriver> UsbDeviceCore<'a, D> {
    pub fn new(
        driver: D,
        class: &'a mut dyn ClassCallback,
        descriptors: &'a dyn DescriptorProvider,
        settings: DeviceSettings,
    ) -> Self {
        let settings = DeviceSettings { num_endpoints: settings.num_endpoints.min(NUM_ENDPOINTS), ..settings };
        UsbDeviceCore {
            driver,
            class,
            descriptors,
            events: None,
            ctx: DeviceContext::new(settings.speed),
            pipe: ControlPipe::new(ep0_packet_size(&settings, settings.speed)),
            settings,
        }
    }

    /// Attaches an observer for bus-level events.
    pub fn with_events(mut self, events: &'a mut dyn DeviceEvents) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(&self) -> DeviceState { self.ctx.state() }

    pub fn config(&self) -> &DeviceConfig { self.ctx.config() }

    pub fn context(&self) -> &DeviceContext { &self.ctx }

    pub fn settings(&self) -> &DeviceSettings { &self.settings }

    pub fn ep0_state(&self) -> Ep0State { self.pipe.state() }

    pub fn session(&self) -> Option<&ControlTransferSession> { self.pipe.session() }

    pub fn driver(&self) -> &D { &self.driver }

    pub fn driver_mut(&mut self) -> &mut D { &mut self.driver }

    /// A SETUP packet arrived on endpoint 0. Whatever transfer was in progress is dropped.
    ///
    /// Requests the device cannot honor are answered with a STALL and reported as `Ok`; an
    /// `Err` always comes from the driver.
    pub fn setup_stage(&mut self, raw: &[u8; SetupRequest::LEN]) -> Result<()> {
        let req = SetupRequest::parse(raw);
        #[cfg(feature = "verbose-debug")]
        log::debug!("SETUP {:x?} {:?}", raw, req.bm_request_type());
        match (req.kind(), req.recipient()) {
            (RequestKind::Reserved, _) | (_, Recipient::Other) | (_, Recipient::Reserved) => {
                self.open(&req);
                self.complete(&req, Err(Error::UnsupportedRequest))
            }
            (RequestKind::Standard, Recipient::Device) => self.handle_device_request(&req),
            (RequestKind::Standard, Recipient::Endpoint) => self.handle_endpoint_request(&req),
            (_, Recipient::Interface) => self.handle_interface_request(&req),
            (_, Recipient::Device) | (_, Recipient::Endpoint) => {
                self.open(&req);
                let ret = if self.ctx.state() == DeviceState::Default {
                    Err(Error::InvalidState)
                } else {
                    self.forward_to_class(&req)
                };
                self.complete(&req, ret)
            }
        }
    }

    /// An IN transfer finished on `ep`.
    pub fn data_in_stage(&mut self, ep: EndpointAddress) -> Result<()> {
        if ep.index() != 0 {
            if self.ctx.state() == DeviceState::Configured {
                self.class.data_in(ep);
            }
            return Ok(());
        }
        match self.pipe.in_complete(&mut self.driver)? {
            Ep0Event::TxSent { class_owned } => {
                if class_owned && self.ctx.state() == DeviceState::Configured {
                    self.class.ep0_tx_sent();
                }
                self.pipe.receive_status(&mut self.driver)
            }
            Ep0Event::StatusComplete => {
                if let Some(mode) = self.ctx.take_test_mode() {
                    log::info!("entering test mode {:?}", mode);
                    self.driver.set_test_mode(mode);
                }
                Ok(())
            }
            Ep0Event::RxReady { .. } | Ep0Event::None => Ok(()),
        }
    }

    /// An OUT transfer delivered `data` on `ep`.
    pub fn data_out_stage(&mut self, ep: EndpointAddress, data: &[u8]) -> Result<()> {
        if ep.index() != 0 {
            if self.ctx.state() == DeviceState::Configured {
                self.class.data_out(ep, data);
            }
            return Ok(());
        }
        match self.pipe.out_complete(data, &mut self.driver)? {
            Ep0Event::RxReady { class_owned, .. } => {
                if class_owned && self.ctx.state() == DeviceState::Configured {
                    self.class.ep0_rx_ready(self.pipe.received());
                }
                self.pipe.send_status(&mut self.driver)
            }
            Ep0Event::TxSent { .. } | Ep0Event::StatusComplete | Ep0Event::None => Ok(()),
        }
    }

    /// Re-issues the endpoint-0 packet that last failed with a driver error.
    pub fn rearm(&mut self) -> Result<()> { self.pipe.rearm(&mut self.driver) }

    pub fn bus_reset(&mut self, speed: Speed) {
        log::info!("USB reset, {:?} speed", speed);
        self.release_class();
        self.ctx.reset(speed);
        self.pipe.reset();
        self.pipe.set_max_packet_size(ep0_packet_size(&self.settings, speed));
        self.driver.ep0_out_start();
        if let Some(ev) = self.events.as_deref_mut() {
            ev.device_reset(speed);
        }
    }

    pub fn suspend(&mut self) {
        log::debug!("USB suspend");
        self.ctx.suspend();
        if let Some(ev) = self.events.as_deref_mut() {
            ev.device_suspended();
        }
    }

    pub fn resume(&mut self) {
        log::debug!("USB resume");
        self.ctx.resume();
        if let Some(ev) = self.events.as_deref_mut() {
            ev.device_resumed();
        }
    }

    /// Signals resume to the host. Only allowed while suspended, and only if the host
    /// enabled DEVICE_REMOTE_WAKEUP.
    pub fn remote_wakeup(&mut self) -> Result<()> {
        if !self.ctx.is_suspended() || !self.ctx.config().remote_wakeup {
            return Err(Error::InvalidState);
        }
        self.driver.remote_wakeup();
        self.resume();
        Ok(())
    }

    pub fn connected(&mut self) {
        log::info!("USB connected");
        if let Some(ev) = self.events.as_deref_mut() {
            ev.device_connected();
        }
    }

    pub fn disconnected(&mut self) {
        log::info!("USB disconnected");
        self.release_class();
        let speed = self.ctx.speed();
        self.ctx.reset(speed);
        self.pipe.reset();
        if let Some(ev) = self.events.as_deref_mut() {
            ev.device_disconnected();
        }
    }

    pub fn sof(&mut self) {
        if self.ctx.state() == DeviceState::Configured {
            self.class.sof();
        }
    }

    pub fn iso_in_incomplete(&mut self, ep: EndpointAddress) {
        if self.ctx.state() == DeviceState::Configured {
            self.class.iso_in_incomplete(ep);
        }
    }

    pub fn iso_out_incomplete(&mut self, ep: EndpointAddress) {
        if self.ctx.state() == DeviceState::Configured {
            self.class.iso_out_incomplete(ep);
        }
    }

    /// Starts the endpoint-0 session for `req`. Nothing armed by the previous request
    /// outlives it.
    pub(crate) fn open(&mut self, req: &SetupRequest) {
        if let Some(mode) = self.ctx.take_test_mode() {
            log::debug!("test mode {:?} dropped by new SETUP", mode);
        }
        self.pipe.begin(*req);
    }

    pub(crate) fn notify_configured(&mut self, cfgidx: u8) {
        if let Some(ev) = self.events.as_deref_mut() {
            ev.device_configured(cfgidx);
        }
    }

    fn release_class(&mut self) {
        if self.ctx.state() == DeviceState::Configured {
            self.class.deactivate(self.ctx.config().config_index);
        }
    }

    /// Turns a protocol failure into a STALL; driver failures go back to the caller.
    pub(crate) fn complete(&mut self, req: &SetupRequest, ret: Result<()>) -> Result<()> {
        match ret {
            Err(e) if e.is_protocol() => {
                log::debug!("STALL {:x?}: {}", req, e);
                self.ctx.take_test_mode();
                self.pipe.error(req, &mut self.driver);
                Ok(())
            }
            ret => ret,
        }
    }

    /// Hands `req` to the class. A class that accepts a request without a data stage gets
    /// the status stage sent on its behalf.
    pub(crate) fn forward_to_class(&mut self, req: &SetupRequest) -> Result<()> {
        let started = {
            let mut xfer = ControlXfer::new(&mut self.pipe, &mut self.driver);
            self.class.setup(req, &mut xfer)?;
            xfer.is_started()
        };
        if started {
            Ok(())
        } else if req.length == 0 {
            self.pipe.send_status(&mut self.driver)
        } else {
            log::debug!("class accepted {:x?} without a data stage", req);
            Err(Error::ClassRejected)
        }
    }

    /// Sends `data`, cut to wLength. Nothing to send means status only.
    pub(crate) fn respond(&mut self, req: &SetupRequest, data: &[u8]) -> Result<()> {
        let len = data.len().min(req.length as usize);
        if len == 0 {
            self.pipe.send_status(&mut self.driver)
        } else {
            self.pipe.send(&data[..len], &mut self.driver)
        }
    }
}

fn ep0_packet_size(settings: &DeviceSettings, speed: Speed) -> usize {
    settings.ep0_max_packet.min(speed.ep0_max_packet_size())
}
