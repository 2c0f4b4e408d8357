//! The seam between the core and whatever class (HID, CDC, vendor...) owns the device's
//! configurations and interfaces.

use usb_device::endpoint::EndpointAddress;

use crate::ctrl::ControlPipe;
use crate::descriptor::Speed;
use crate::driver::UsbDriver;
use crate::error::Result;
use crate::setup::SetupRequest;

/// Class-side callbacks. Only the first four are mandatory; the rest default to doing
/// nothing, which is what a class without the matching endpoints wants.
pub trait ClassCallback {
    /// Bring up the endpoints of configuration `cfgidx`. An error leaves the device in its
    /// previous state and the SET_CONFIGURATION is stalled.
    fn activate(&mut self, cfgidx: u8) -> Result<()>;

    /// Tear down configuration `cfgidx`.
    fn deactivate(&mut self, cfgidx: u8);

    /// Non-standard requests, and standard requests aimed at one of the class's interfaces.
    /// A data stage is started through `xfer`; returning `Ok` without starting one means the
    /// core sends the status stage when wLength is zero. An error stalls the request.
    fn setup(&mut self, req: &SetupRequest, xfer: &mut ControlXfer<'_>) -> Result<()>;

    /// Complete configuration descriptor (with all subordinate descriptors) for `speed`.
    fn config_descriptor(&self, speed: Speed) -> &[u8];

    /// Configuration descriptor for the speed the device is not currently running at.
    fn other_speed_config_descriptor(&self, _speed: Speed) -> Option<&[u8]> { None }

    /// String descriptors above the ones the [`crate::DescriptorProvider`] serves.
    fn usr_string(&self, _speed: Speed, _index: u8) -> Option<&[u8]> { None }

    /// Whether SET_CONFIGURATION(`cfgidx`) names a configuration this class offers.
    fn advertises_configuration(&self, speed: Speed, cfgidx: u8) -> bool {
        self.config_descriptor(speed).get(5).map_or(false, |&v| v == cfgidx)
    }

    /// The host cleared ENDPOINT_HALT on `ep`; data toggles and FIFOs should be reset.
    fn endpoint_unhalted(&mut self, _ep: EndpointAddress) {}

    /// The IN data stage the class started has been fully sent.
    fn ep0_tx_sent(&mut self) {}

    /// The OUT data stage the class asked for has arrived in full.
    fn ep0_rx_ready(&mut self, _data: &[u8]) {}

    /// A non-control IN endpoint finished a transfer.
    fn data_in(&mut self, _ep: EndpointAddress) {}

    /// A non-control OUT endpoint received `data`.
    fn data_out(&mut self, _ep: EndpointAddress, _data: &[u8]) {}

    fn sof(&mut self) {}

    fn iso_in_incomplete(&mut self, _ep: EndpointAddress) {}

    fn iso_out_incomplete(&mut self, _ep: EndpointAddress) {}
}

/// Handle on the endpoint-0 pipe given to [`ClassCallback::setup`]. The class can start
/// exactly one data stage (or a bare status stage) through it.
pub struct ControlXfer<'a> {
    pipe: &'a mut ControlPipe,
    driver: &'a mut dyn UsbDriver,
    started: bool,
}

impl<'a> ControlXfer<'a> {
    pub(crate) fn new(pipe: &'a mut ControlPipe, driver: &'a mut dyn UsbDriver) -> Self {
        ControlXfer { pipe, driver, started: false }
    }

    /// Device-to-host data stage. The data is copied; the host gets at most wLength bytes.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        let wlength = self.pipe.session().map_or(0, |s| s.request().length as usize);
        self.started = true;
        self.pipe.mark_class_owned();
        self.pipe.send(&data[..data.len().min(wlength)], &mut *self.driver)
    }

    /// Host-to-device data stage of `len` bytes. [`ClassCallback::ep0_rx_ready`] gets the
    /// data once it is all in.
    pub fn prepare_receive(&mut self, len: usize) -> Result<()> {
        self.started = true;
        self.pipe.mark_class_owned();
        self.pipe.prepare_receive(len, &mut *self.driver)
    }

    /// Acknowledges a request that has no data stage.
    pub fn send_status(&mut self) -> Result<()> {
        self.started = true;
        self.pipe.send_status(&mut *self.driver)
    }

    pub fn max_packet_size(&self) -> usize { self.pipe.max_packet_size() }

    /// Whether one of the stage methods was called.
    pub fn is_started(&self) -> bool { self.started }
}

/// Bus-level notifications for the application. All optional.
pub trait DeviceEvents {
    fn device_reset(&mut self, _speed: Speed) {}
    fn device_configured(&mut self, _cfgidx: u8) {}
    fn device_suspended(&mut self) {}
    fn device_resumed(&mut self) {}
    fn device_connected(&mut self) {}
    fn device_disconnected(&mut self) {}
}
