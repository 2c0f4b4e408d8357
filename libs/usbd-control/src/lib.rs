#![cfg_attr(not(any(test, feature = "std")), no_std)]

//! Endpoint-0 control transfer engine and USB 2.0 chapter 9 request dispatcher.
//!
//! The crate sits between a UDC interrupt layer, which hands over raw SETUP packets and
//! endpoint completions, and a class implementation, which owns the descriptors and any
//! class-specific requests. Everything in between lives in [`UsbDeviceCore`]:
//!
//! ```text
//!   irq layer --setup_stage()--> parser --> dispatcher --> class.setup()
//!                                              |                |
//!                                              v                v
//!                                         state machine    ControlPipe --> UsbDriver
//! ```
//!
//! Failures that the host can see are always reported as a STALL on endpoint 0. The only
//! errors returned to the caller are hardware driver failures, which are retryable.

#[cfg(test)]
mod mock;

pub mod class;
pub mod ctrl;
pub mod descriptor;
pub mod device;
pub mod driver;
pub mod error;
pub mod request;
pub mod setup;
pub mod shared;
pub mod state;
mod std_req;

pub use class::{ClassCallback, ControlXfer, DeviceEvents};
pub use ctrl::{ControlPipe, ControlTransferSession, Ep0State};
pub use descriptor::{DescriptorProvider, Speed, StaticDescriptors};
pub use device::{DeviceSettings, UsbDeviceCore};
pub use driver::UsbDriver;
pub use error::{Error, Result};
pub use request::{DescriptorType, FeatureSelector, StandardRequest, TestMode};
pub use setup::{Recipient, RequestKind, SetupRequest};
pub use shared::SharedDevice;
pub use state::{DeviceConfig, DeviceContext, DeviceState, EndpointContext};
pub use usb_device::endpoint::EndpointAddress;
pub use usb_device::{UsbDirection, UsbError};

/// Size of the endpoint-0 staging buffer. Control data stages longer than this are clamped.
pub const EP0_BUF_SIZE: usize = 0x400;
/// Endpoint indices tracked for halt state, including endpoint 0.
pub const NUM_ENDPOINTS: usize = 16;

/// Endpoint-0 max packet size at full and high speed.
pub const FS_MAX_PKT_SIZE: usize = 64;

/// Endpoint 0, host to device.
pub const EP0_OUT: u8 = 0x00;
/// Endpoint 0, device to host.
pub const EP0_IN: u8 = 0x80;
