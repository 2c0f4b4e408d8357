use usb_device::endpoint::EndpointAddress;
use usb_device::UsbError;

use crate::request::TestMode;

/// What the core needs from the UDC. Implementations push packets into the FIFO/DMA
/// engine and report completions back through [`crate::UsbDeviceCore::data_in_stage`] and
/// [`crate::UsbDeviceCore::data_out_stage`].
pub trait UsbDriver {
    /// Queues one packet on an IN endpoint. `data` may be empty (zero-length packet).
    ///
    /// # Errors
    ///
    /// * [`WouldBlock`](UsbError::WouldBlock) - the previous packet has not left yet; the
    ///   caller may try again.
    /// * anything else the hardware can report; none of these are retried by the core.
    fn ep_transmit(&mut self, ep: EndpointAddress, data: &[u8]) -> Result<(), UsbError>;

    /// Arms an OUT endpoint to accept up to `len` bytes. `len == 0` arms a status stage.
    fn ep_prepare_receive(&mut self, ep: EndpointAddress, len: usize) -> Result<(), UsbError>;

    fn ep_stall(&mut self, ep: EndpointAddress);

    fn ep_clear_stall(&mut self, ep: EndpointAddress);

    /// Called while the SET_ADDRESS transfer is still in flight; cores that need the new
    /// address applied after the status stage must defer it themselves.
    fn set_device_address(&mut self, addr: u8);

    /// Re-arms endpoint 0 so that the next SETUP packet is accepted.
    fn ep0_out_start(&mut self);

    /// Enters the requested electrical test mode. The device is unusable afterwards until
    /// power cycled.
    fn set_test_mode(&mut self, mode: TestMode) { log::warn!("test mode {:?} not supported by this driver", mode); }

    /// Drives resume signalling on the bus.
    fn remote_wakeup(&mut self) { log::warn!("remote wakeup not supported by this driver"); }
}
