use core::cell::RefCell;

use critical_section::Mutex;

/// A [`crate::UsbDeviceCore`] (or anything else) reachable from both the USB interrupt and
/// thread context. Every entry point of the core must go through [`SharedDevice::lock`] so
/// that a SETUP packet never interleaves with a completion.
///
/// ```ignore
/// static USB: SharedDevice<Option<UsbDeviceCore<'static, Udc>>> = SharedDevice::new(None);
///
/// fn irq_setup(raw: &[u8; 8]) {
///     USB.lock(|usb| usb.as_mut().map(|core| core.setup_stage(raw)));
/// }
/// ```
pub struct SharedDevice<T>(Mutex<RefCell<T>>);

impl<T> SharedDevice<T> {
    pub const fn new(inner: T) -> Self { SharedDevice(Mutex::new(RefCell::new(inner))) }

    /// Runs `f` with exclusive access. Must not be re-entered from inside `f`.
    pub fn lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section::with(|cs| {
            let mut inner = self.0.borrow(cs).borrow_mut();
            f(&mut inner)
        })
    }

    pub fn into_inner(self) -> T { self.0.into_inner().into_inner() }
}
