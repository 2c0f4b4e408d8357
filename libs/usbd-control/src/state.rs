use usb_device::UsbDirection;
use usb_device::endpoint::EndpointAddress;

use crate::descriptor::Speed;
use crate::error::{Error, Result};
use crate::request::TestMode;
use crate::NUM_ENDPOINTS;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DeviceState {
    /// After bus reset; address 0, nothing configured
    Default,
    Addressed,
    Configured,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct DeviceConfig {
    pub address: u8,
    /// bConfigurationValue of the active configuration, 0 if none
    pub config_index: u8,
    /// set by the host with SET_FEATURE(DEVICE_REMOTE_WAKEUP)
    pub remote_wakeup: bool,
}

/// Transfer bookkeeping for one endpoint direction.
///
/// `remaining_len` never exceeds `total_data_len`: both are only written through
/// [`EndpointContext::start`] and [`EndpointContext::consume`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct EndpointContext {
    total_data_len: u32,
    remaining_len: u32,
    is_stalled: bool,
}

impl EndpointContext {
    /// Begins a new transfer of `len` bytes.
    pub fn start(&mut self, len: u32) {
        self.total_data_len = len;
        self.remaining_len = len;
    }

    /// Accounts for `n` bytes moved; returns how many were actually accounted.
    pub fn consume(&mut self, n: u32) -> u32 {
        let n = n.min(self.remaining_len);
        self.remaining_len -= n;
        n
    }

    pub fn total_data_len(&self) -> u32 { self.total_data_len }

    pub fn remaining_len(&self) -> u32 { self.remaining_len }

    pub fn transferred(&self) -> u32 { self.total_data_len - self.remaining_len }

    pub fn is_stalled(&self) -> bool { self.is_stalled }

    pub fn set_stalled(&mut self, stalled: bool) { self.is_stalled = stalled; }

    /// Drops any transfer in progress; stall state survives.
    pub fn clear_transfer(&mut self) {
        self.total_data_len = 0;
        self.remaining_len = 0;
    }
}

/// Outcome of validating a SET_CONFIGURATION against the current state. Nothing is
/// committed until [`DeviceContext::apply_configuration`], so that a class which refuses to
/// activate leaves the state machine untouched.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConfigChange {
    /// status-only acknowledgement
    Unchanged,
    Activate { previous: Option<u8>, cfgidx: u8 },
    Deactivate { previous: u8 },
}

/// Everything the core knows about the device. One per device; there are no statics.
#[derive(Debug)]
pub struct DeviceContext {
    state: DeviceState,
    config: DeviceConfig,
    speed: Speed,
    suspended: bool,
    pending_test_mode: Option<TestMode>,
    in_eps: [EndpointContext; NUM_ENDPOINTS],
    out_eps: [EndpointContext; NUM_ENDPOINTS],
}

impl DeviceContext {
    pub fn new(speed: Speed) -> Self {
        DeviceContext {
            state: DeviceState::Default,
            config: DeviceConfig::default(),
            speed,
            suspended: false,
            pending_test_mode: None,
            in_eps: [EndpointContext::default(); NUM_ENDPOINTS],
            out_eps: [EndpointContext::default(); NUM_ENDPOINTS],
        }
    }

    pub fn state(&self) -> DeviceState { self.state }

    pub fn config(&self) -> &DeviceConfig { &self.config }

    pub fn speed(&self) -> Speed { self.speed }

    pub fn is_suspended(&self) -> bool { self.suspended }

    /// Checks the address/configuration invariant that every state implies.
    pub fn is_consistent(&self) -> bool {
        match self.state {
            DeviceState::Default => self.config.address == 0 && self.config.config_index == 0,
            DeviceState::Addressed => self.config.address != 0 && self.config.config_index == 0,
            DeviceState::Configured => self.config.address != 0 && self.config.config_index != 0,
        }
    }

    /// SET_ADDRESS. Only the low seven bits of `addr` are meaningful.
    pub fn set_address(&mut self, addr: u8) -> Result<u8> {
        if self.state == DeviceState::Configured {
            return Err(Error::InvalidState);
        }
        let addr = addr & 0x7F;
        self.config.address = addr;
        self.state = if addr != 0 { DeviceState::Addressed } else { DeviceState::Default };
        debug_assert!(self.is_consistent());
        Ok(addr)
    }

    /// Works out what SET_CONFIGURATION(`cfgidx`) means from the current state. The caller
    /// has already checked that a non-zero `cfgidx` is advertised.
    pub fn plan_configuration(&self, cfgidx: u8) -> Result<ConfigChange> {
        match self.state {
            DeviceState::Default => Err(Error::InvalidState),
            DeviceState::Addressed => {
                if cfgidx == 0 {
                    Ok(ConfigChange::Unchanged)
                } else {
                    Ok(ConfigChange::Activate { previous: None, cfgidx })
                }
            }
            DeviceState::Configured => {
                let current = self.config.config_index;
                if cfgidx == 0 {
                    Ok(ConfigChange::Deactivate { previous: current })
                } else if cfgidx == current {
                    Ok(ConfigChange::Unchanged)
                } else {
                    Ok(ConfigChange::Activate { previous: Some(current), cfgidx })
                }
            }
        }
    }

    pub fn apply_configuration(&mut self, change: ConfigChange) {
        match change {
            ConfigChange::Unchanged => {}
            ConfigChange::Activate { cfgidx, .. } => {
                self.config.config_index = cfgidx;
                self.state = DeviceState::Configured;
            }
            ConfigChange::Deactivate { .. } => {
                self.config.config_index = 0;
                self.state = DeviceState::Addressed;
                // halts belong to the configuration that just went away
                self.clear_halts();
            }
        }
        debug_assert!(self.is_consistent());
    }

    pub fn set_remote_wakeup(&mut self, enabled: bool) { self.config.remote_wakeup = enabled; }

    pub fn endpoint(&self, ep: EndpointAddress) -> Result<&EndpointContext> {
        let table = match ep.direction() {
            UsbDirection::In => &self.in_eps,
            UsbDirection::Out => &self.out_eps,
        };
        table.get(ep.index()).ok_or(Error::InvalidEndpoint)
    }

    pub fn endpoint_mut(&mut self, ep: EndpointAddress) -> Result<&mut EndpointContext> {
        let table = match ep.direction() {
            UsbDirection::In => &mut self.in_eps,
            UsbDirection::Out => &mut self.out_eps,
        };
        table.get_mut(ep.index()).ok_or(Error::InvalidEndpoint)
    }

    /// ENDPOINT_HALT bookkeeping. Endpoint 0 can never be halted.
    pub fn set_halt(&mut self, ep: EndpointAddress, halted: bool) -> Result<()> {
        if ep.index() == 0 {
            return Err(Error::InvalidEndpoint);
        }
        self.endpoint_mut(ep)?.set_stalled(halted);
        Ok(())
    }

    pub fn is_halted(&self, ep: EndpointAddress) -> Result<bool> { Ok(self.endpoint(ep)?.is_stalled()) }

    fn clear_halts(&mut self) {
        for ep in self.in_eps.iter_mut().chain(self.out_eps.iter_mut()) {
            *ep = EndpointContext::default();
        }
    }

    /// Bus reset: back to Default at the newly negotiated speed.
    pub fn reset(&mut self, speed: Speed) {
        self.state = DeviceState::Default;
        self.config = DeviceConfig::default();
        self.speed = speed;
        self.suspended = false;
        self.pending_test_mode = None;
        self.clear_halts();
    }

    pub fn suspend(&mut self) { self.suspended = true; }

    pub fn resume(&mut self) { self.suspended = false; }

    pub fn arm_test_mode(&mut self, mode: TestMode) { self.pending_test_mode = Some(mode); }

    pub fn take_test_mode(&mut self) -> Option<TestMode> { self.pending_test_mode.take() }
}
