//! Endpoint-0 control pipe: SETUP -> DATA -> STATUS.
//!
//! The pipe owns the only staging buffer for endpoint 0. Descriptors and class data are
//! copied into it and sent one packet per IN completion; OUT data stages accumulate in it
//! and are handed over once complete. A new SETUP always wins: [`ControlPipe::begin`]
//! throws away whatever transfer was in flight.

use usb_device::endpoint::EndpointAddress;

use crate::driver::UsbDriver;
use crate::error::{Error, Result};
use crate::setup::SetupRequest;
use crate::state::EndpointContext;
use crate::{EP0_BUF_SIZE, EP0_IN, EP0_OUT};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Ep0State {
    Idle,
    SetupReceived,
    DataIn,
    DataOut,
    StatusIn,
    StatusOut,
    Stall,
}

/// What an endpoint-0 completion meant, for the device core to act on.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Ep0Event {
    /// nothing for the core to do; the pipe already armed the next packet, or the
    /// completion belonged to a transfer that no longer exists
    None,
    /// every IN data byte (and any terminating ZLP) went out; the status stage is next
    TxSent { class_owned: bool },
    /// the OUT data stage is complete; `len` bytes are in [`ControlPipe::received`]
    RxReady { len: usize, class_owned: bool },
    /// the status stage finished and the pipe is idle
    StatusComplete,
}

/// A driver call that failed and can be re-issued by [`ControlPipe::rearm`]. The transfer
/// bookkeeping for it has already been done.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum PendingOp {
    Transmit { start: usize, len: usize },
    Receive { len: usize },
}

/// One control transfer, from SETUP until its status stage completes or it is stalled.
#[derive(Debug, Copy, Clone, Default)]
pub struct ControlTransferSession {
    request: SetupRequest,
    in_ctx: EndpointContext,
    out_ctx: EndpointContext,
    cursor: usize,
    /// wLength still owed to the host; zeroed once a terminating ZLP has been queued
    requested_len: u16,
    /// the data stage was started by the class, which wants ep0_tx_sent/ep0_rx_ready
    class_owned: bool,
}

impl ControlTransferSession {
    fn new(request: SetupRequest) -> Self {
        ControlTransferSession { request, requested_len: request.length, ..Default::default() }
    }

    pub fn request(&self) -> &SetupRequest { &self.request }

    pub fn in_ctx(&self) -> &EndpointContext { &self.in_ctx }

    pub fn out_ctx(&self) -> &EndpointContext { &self.out_ctx }

    pub fn cursor(&self) -> usize { self.cursor }

    pub fn requested_len(&self) -> u16 { self.requested_len }

    pub fn is_class_owned(&self) -> bool { self.class_owned }
}

pub struct ControlPipe {
    buf: [u8; EP0_BUF_SIZE],
    session: Option<ControlTransferSession>,
    state: Ep0State,
    max_packet_size: usize,
    pending: Option<PendingOp>,
}

impl ControlPipe {
    pub fn new(max_packet_size: usize) -> Self {
        ControlPipe {
            buf: [0u8; EP0_BUF_SIZE],
            session: None,
            state: Ep0State::Idle,
            max_packet_size: max_packet_size.max(1),
            pending: None,
        }
    }

    pub fn state(&self) -> Ep0State { self.state }

    pub fn session(&self) -> Option<&ControlTransferSession> { self.session.as_ref() }

    pub fn max_packet_size(&self) -> usize { self.max_packet_size }

    pub fn set_max_packet_size(&mut self, size: usize) { self.max_packet_size = size.max(1); }

    /// Bytes collected by the last OUT data stage
    pub fn received(&self) -> &[u8] {
        let len = self.session.map(|s| s.out_ctx.transferred() as usize).unwrap_or(0);
        &self.buf[..len]
    }

    /// Opens a session for a freshly parsed SETUP packet, discarding any transfer that was
    /// still in progress.
    pub fn begin(&mut self, request: SetupRequest) {
        if let Some(old) = self.session.take() {
            if !matches!(self.state, Ep0State::Idle | Ep0State::Stall) {
                log::debug!(
                    "SETUP aborted transfer {:x}/{:x} in {:?} with {} bytes outstanding",
                    old.request.request_type,
                    old.request.request,
                    self.state,
                    old.in_ctx.remaining_len().max(old.out_ctx.remaining_len())
                );
            }
        }
        self.pending = None;
        self.session = Some(ControlTransferSession::new(request));
        self.state = Ep0State::SetupReceived;
    }

    /// Bus reset
    pub fn reset(&mut self) {
        self.session = None;
        self.pending = None;
        self.state = Ep0State::Idle;
    }

    pub(crate) fn mark_class_owned(&mut self) {
        if let Some(s) = self.session.as_mut() {
            s.class_owned = true;
        }
    }

    /// Starts the IN data stage with (a copy of) `data`. Data that does not fit in the
    /// endpoint-0 buffer is clamped.
    pub fn send(&mut self, data: &[u8], driver: &mut dyn UsbDriver) -> Result<()> {
        let len = self.load(data);
        self.start_in(len, driver)
    }

    /// Copies `data` into the staging buffer and returns how much of it fit.
    pub fn load(&mut self, data: &[u8]) -> usize {
        let len = data.len().min(EP0_BUF_SIZE);
        if len < data.len() {
            log::warn!("ep0 data stage clamped from {} to {} bytes", data.len(), len);
        }
        self.buf[..len].copy_from_slice(&data[..len]);
        len
    }

    /// Staging buffer, for callers that build a response in place before [`Self::start_in`].
    pub fn buffer_mut(&mut self) -> &mut [u8] { &mut self.buf }

    /// Starts the IN data stage with the first `len` bytes of the staging buffer.
    pub fn start_in(&mut self, len: usize, driver: &mut dyn UsbDriver) -> Result<()> {
        let len = len.min(EP0_BUF_SIZE);
        let session = self.session.as_mut().ok_or(Error::InvalidState)?;
        session.in_ctx.start(len as u32);
        session.cursor = 0;
        self.state = Ep0State::DataIn;
        self.transmit_next(driver)
    }

    /// Queues the next IN packet: up to one max-packet of whatever is left.
    fn transmit_next(&mut self, driver: &mut dyn UsbDriver) -> Result<()> {
        let session = self.session.as_mut().ok_or(Error::InvalidState)?;
        let start = session.cursor;
        let len = (session.in_ctx.remaining_len() as usize).min(self.max_packet_size);
        session.cursor += len;
        session.in_ctx.consume(len as u32);
        self.issue(PendingOp::Transmit { start, len }, driver)
    }

    /// Arms the OUT data stage for `len` bytes, clamped to the staging buffer.
    pub fn prepare_receive(&mut self, len: usize, driver: &mut dyn UsbDriver) -> Result<()> {
        if len == 0 {
            return self.send_status(driver);
        }
        let len = len.min(EP0_BUF_SIZE);
        let session = self.session.as_mut().ok_or(Error::InvalidState)?;
        session.out_ctx.start(len as u32);
        session.cursor = 0;
        self.state = Ep0State::DataOut;
        let first = len.min(self.max_packet_size);
        self.issue(PendingOp::Receive { len: first }, driver)
    }

    /// Status stage of a host-to-device (or data-less) transfer: a ZLP on IN.
    pub fn send_status(&mut self, driver: &mut dyn UsbDriver) -> Result<()> {
        self.state = Ep0State::StatusIn;
        let ret = self.issue(PendingOp::Transmit { start: 0, len: 0 }, driver);
        driver.ep0_out_start();
        ret
    }

    /// Status stage of a device-to-host transfer: wait for the host's ZLP on OUT.
    pub fn receive_status(&mut self, driver: &mut dyn UsbDriver) -> Result<()> {
        self.state = Ep0State::StatusOut;
        let ret = self.issue(PendingOp::Receive { len: 0 }, driver);
        driver.ep0_out_start();
        ret
    }

    /// Rejects `request` with a protocol STALL and gets ready for the next SETUP.
    pub fn error(&mut self, request: &SetupRequest, driver: &mut dyn UsbDriver) {
        let ep = if request.bm_request_type().device_to_host() || request.length == 0 {
            EP0_IN
        } else {
            EP0_OUT
        };
        log::debug!("ep0 STALL {:02x} for {:x?}", ep, request);
        driver.ep_stall(EndpointAddress::from(ep));
        driver.ep0_out_start();
        self.session = None;
        self.pending = None;
        self.state = Ep0State::Stall;
    }

    /// An endpoint-0 IN packet left the device.
    pub fn in_complete(&mut self, driver: &mut dyn UsbDriver) -> Result<Ep0Event> {
        match self.state {
            Ep0State::DataIn => {
                let mps = self.max_packet_size;
                let session = self.session.as_mut().ok_or(Error::InvalidState)?;
                if session.in_ctx.remaining_len() > 0 {
                    self.transmit_next(driver)?;
                    return Ok(Ep0Event::None);
                }
                let total = session.in_ctx.total_data_len() as usize;
                if total != 0 && total % mps == 0 && total < session.requested_len as usize {
                    // host asked for more than we have and the last packet was full sized:
                    // only a short packet tells it the data stage is over
                    session.requested_len = 0;
                    self.issue(PendingOp::Transmit { start: 0, len: 0 }, driver)?;
                    return Ok(Ep0Event::None);
                }
                Ok(Ep0Event::TxSent { class_owned: session.class_owned })
            }
            Ep0State::StatusIn => {
                self.finish();
                Ok(Ep0Event::StatusComplete)
            }
            state => {
                log::trace!("ep0 IN completion ignored in {:?}", state);
                Ok(Ep0Event::None)
            }
        }
    }

    /// An endpoint-0 OUT packet arrived carrying `data`.
    pub fn out_complete(&mut self, data: &[u8], driver: &mut dyn UsbDriver) -> Result<Ep0Event> {
        match self.state {
            Ep0State::DataOut => {
                let mps = self.max_packet_size;
                let session = self.session.as_mut().ok_or(Error::InvalidState)?;
                let start = session.cursor;
                let n = data.len().min(session.out_ctx.remaining_len() as usize);
                self.buf[start..start + n].copy_from_slice(&data[..n]);
                session.cursor += n;
                session.out_ctx.consume(n as u32);
                let remaining = session.out_ctx.remaining_len() as usize;
                if remaining > 0 && data.len() >= mps {
                    self.issue(PendingOp::Receive { len: remaining.min(mps) }, driver)?;
                    return Ok(Ep0Event::None);
                }
                Ok(Ep0Event::RxReady { len: session.out_ctx.transferred() as usize, class_owned: session.class_owned })
            }
            Ep0State::StatusOut => {
                self.finish();
                Ok(Ep0Event::StatusComplete)
            }
            state => {
                log::trace!("ep0 OUT completion of {} bytes ignored in {:?}", data.len(), state);
                Ok(Ep0Event::None)
            }
        }
    }

    /// Re-issues the driver call that failed last, if any.
    pub fn rearm(&mut self, driver: &mut dyn UsbDriver) -> Result<()> {
        match self.pending.take() {
            Some(op) => self.issue(op, driver),
            None => Ok(()),
        }
    }

    pub fn has_pending(&self) -> bool { self.pending.is_some() }

    fn issue(&mut self, op: PendingOp, driver: &mut dyn UsbDriver) -> Result<()> {
        #[cfg(feature = "verbose-debug")]
        log::trace!("ep0 {:?} in {:?}", op, self.state);
        let ret = match op {
            PendingOp::Transmit { start, len } => {
                driver.ep_transmit(EndpointAddress::from(EP0_IN), &self.buf[start..start + len])
            }
            PendingOp::Receive { len } => driver.ep_prepare_receive(EndpointAddress::from(EP0_OUT), len),
        };
        ret.map_err(|e| {
            self.pending = Some(op);
            Error::Driver(e)
        })
    }

    fn finish(&mut self) {
        self.session = None;
        self.pending = None;
        self.state = Ep0State::Idle;
    }
}

#[cfg(test)]
mod tests {
    use rand_chacha::rand_core::{RngCore, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use usb_device::UsbError;

    use super::*;
    use crate::mock::{Call, MockDriver};

    fn get(length: u16) -> SetupRequest {
        SetupRequest { request_type: 0x80, request: 0x06, value: 0x0200, index: 0, length }
    }

    /// Drives an IN data stage to completion and returns the packet sizes that went out.
    fn run_in(pipe: &mut ControlPipe, drv: &mut MockDriver) -> Vec<usize> {
        let mut sizes: Vec<usize> = drv.transmits().iter().map(|p| p.len()).collect();
        drv.calls.clear();
        loop {
            match pipe.in_complete(drv).unwrap() {
                Ep0Event::None => {
                    sizes.extend(drv.transmits().iter().map(|p| p.len()));
                    drv.calls.clear();
                }
                Ep0Event::TxSent { .. } => return sizes,
                e => panic!("unexpected {:?}", e),
            }
        }
    }

    #[test]
    fn split_in_transfer() {
        let mut pipe = ControlPipe::new(64);
        let mut drv = MockDriver::default();
        let data: Vec<u8> = (0..130u8).collect();
        pipe.begin(get(255));
        pipe.send(&data, &mut drv).unwrap();
        assert_eq!(pipe.state(), Ep0State::DataIn);
        assert_eq!(drv.transmits()[0], &data[..64]);
        let s = pipe.session().unwrap();
        assert_eq!(s.in_ctx().total_data_len(), 130);
        assert_eq!(s.in_ctx().remaining_len(), 66);

        drv.calls.clear();
        assert_eq!(pipe.in_complete(&mut drv), Ok(Ep0Event::None));
        assert_eq!(drv.transmits()[0], &data[64..128]);
        drv.calls.clear();
        assert_eq!(pipe.in_complete(&mut drv), Ok(Ep0Event::None));
        assert_eq!(drv.transmits()[0], &data[128..]);
        drv.calls.clear();
        // 130 is not a multiple of 64: no ZLP
        assert_eq!(pipe.in_complete(&mut drv), Ok(Ep0Event::TxSent { class_owned: false }));
        assert!(drv.calls.is_empty());
        assert_eq!(pipe.session().unwrap().in_ctx().remaining_len(), 0);

        pipe.receive_status(&mut drv).unwrap();
        assert_eq!(drv.calls, vec![Call::PrepareReceive(0x00, 0), Call::Ep0OutStart]);
        assert_eq!(pipe.out_complete(&[], &mut drv), Ok(Ep0Event::StatusComplete));
        assert_eq!(pipe.state(), Ep0State::Idle);
        assert!(pipe.session().is_none());
    }

    #[test]
    fn zlp_terminates_full_packets() {
        let mut pipe = ControlPipe::new(64);
        let mut drv = MockDriver::default();
        pipe.begin(get(255));
        pipe.send(&[0xAA; 128], &mut drv).unwrap();
        assert_eq!(run_in(&mut pipe, &mut drv), vec![64, 64, 0]);
    }

    #[test]
    fn no_zlp_when_wlength_satisfied() {
        let mut pipe = ControlPipe::new(64);
        let mut drv = MockDriver::default();
        pipe.begin(get(128));
        pipe.send(&[0xAA; 128], &mut drv).unwrap();
        assert_eq!(run_in(&mut pipe, &mut drv), vec![64, 64]);
    }

    #[test]
    fn short_packet_rule_randomized() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        for _ in 0..500 {
            let mps = [8usize, 16, 32, 64][(rng.next_u32() % 4) as usize];
            let total = 1 + (rng.next_u32() as usize % 600);
            let wlength = total + (rng.next_u32() as usize % 3) * mps;
            let mut pipe = ControlPipe::new(mps);
            let mut drv = MockDriver::default();
            pipe.begin(get(wlength as u16));
            pipe.send(&vec![0x5A; total], &mut drv).unwrap();
            let sizes = run_in(&mut pipe, &mut drv);

            assert_eq!(sizes.iter().sum::<usize>(), total);
            assert!(sizes.iter().all(|&s| s <= mps));
            let zlp = *sizes.last().unwrap() == 0;
            assert_eq!(zlp, total % mps == 0 && total < wlength, "mps {} total {} wlength {}", mps, total, wlength);
            // every packet but the last is full sized
            let data_packets = if zlp { &sizes[..sizes.len() - 1] } else { &sizes[..] };
            assert!(data_packets[..data_packets.len() - 1].iter().all(|&s| s == mps));
        }
    }

    #[test]
    fn oversized_data_is_clamped() {
        let mut pipe = ControlPipe::new(64);
        let mut drv = MockDriver::default();
        pipe.begin(get(0xFFFF));
        pipe.send(&vec![1u8; EP0_BUF_SIZE + 100], &mut drv).unwrap();
        assert_eq!(pipe.session().unwrap().in_ctx().total_data_len() as usize, EP0_BUF_SIZE);
    }

    #[test]
    fn out_stage_accumulates() {
        let mut pipe = ControlPipe::new(8);
        let mut drv = MockDriver::default();
        let req = SetupRequest { request_type: 0x21, request: 0x20, value: 0, index: 0, length: 12 };
        pipe.begin(req);
        pipe.prepare_receive(12, &mut drv).unwrap();
        assert_eq!(drv.calls, vec![Call::PrepareReceive(0x00, 8)]);
        drv.calls.clear();
        assert_eq!(pipe.out_complete(&[1, 2, 3, 4, 5, 6, 7, 8], &mut drv), Ok(Ep0Event::None));
        assert_eq!(drv.calls, vec![Call::PrepareReceive(0x00, 4)]);
        assert_eq!(
            pipe.out_complete(&[9, 10, 11, 12], &mut drv),
            Ok(Ep0Event::RxReady { len: 12, class_owned: false })
        );
        assert_eq!(pipe.received(), &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
        assert!(pipe.session().unwrap().out_ctx().remaining_len() <= pipe.session().unwrap().out_ctx().total_data_len());
    }

    #[test]
    fn stall_direction() {
        let mut pipe = ControlPipe::new(64);
        let mut drv = MockDriver::default();

        // device-to-host
        pipe.begin(get(18));
        pipe.error(&get(18), &mut drv);
        assert_eq!(drv.calls, vec![Call::Stall(0x80), Call::Ep0OutStart]);
        assert_eq!(pipe.state(), Ep0State::Stall);
        assert!(pipe.session().is_none());

        // host-to-device without data stage
        drv.calls.clear();
        let set = SetupRequest { request_type: 0x00, request: 0x09, value: 1, index: 0, length: 0 };
        pipe.error(&set, &mut drv);
        assert_eq!(drv.calls, vec![Call::Stall(0x80), Call::Ep0OutStart]);

        // host-to-device with data stage
        drv.calls.clear();
        let out = SetupRequest { request_type: 0x21, request: 0x20, value: 0, index: 0, length: 7 };
        pipe.error(&out, &mut drv);
        assert_eq!(drv.calls, vec![Call::Stall(0x00), Call::Ep0OutStart]);
    }

    #[test]
    fn new_setup_discards_transfer() {
        let mut pipe = ControlPipe::new(64);
        let mut drv = MockDriver::default();
        pipe.begin(get(255));
        pipe.send(&[7u8; 200], &mut drv).unwrap();
        assert_eq!(pipe.session().unwrap().in_ctx().remaining_len(), 136);

        pipe.begin(get(4));
        assert_eq!(pipe.state(), Ep0State::SetupReceived);
        let s = pipe.session().unwrap();
        assert_eq!(s.in_ctx().remaining_len(), 0);
        assert_eq!(s.in_ctx().total_data_len(), 0);
        assert_eq!(s.requested_len(), 4);
        // a late completion for the old transfer does nothing
        drv.calls.clear();
        assert_eq!(pipe.in_complete(&mut drv), Ok(Ep0Event::None));
        assert!(drv.calls.is_empty());
    }

    #[test]
    fn retry_after_driver_failure() {
        let mut pipe = ControlPipe::new(64);
        let mut drv = MockDriver::default();
        pipe.begin(get(255));
        drv.fail_next = Some(UsbError::WouldBlock);
        let err = pipe.send(&[3u8; 70], &mut drv).unwrap_err();
        assert!(err.is_retryable());
        assert!(pipe.has_pending());
        assert!(drv.transmits().is_empty());

        pipe.rearm(&mut drv).unwrap();
        assert_eq!(drv.transmits(), vec![vec![3u8; 64]]);
        assert!(!pipe.has_pending());
        drv.calls.clear();
        assert_eq!(pipe.in_complete(&mut drv), Ok(Ep0Event::None));
        assert_eq!(drv.transmits(), vec![vec![3u8; 6]]);
    }
}
