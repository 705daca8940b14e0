// SPDX-License-Identifier: GPL-3.0-or-later

//! Packet descriptor and the types the upper host stack fills in before
//! calling [`crate::Controller::read`] / [`crate::Controller::write`].

/// USB transfer speed as negotiated on the root port.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Speed {
    Low,
    Full,
    High,
}

/// Endpoint transfer type. Numeric values match the hardware's `EPTYP`
/// field so they can be written straight into `HCCHAR`.
#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum EndpointType {
    Control = 0,
    Isochronous = 1,
    Bulk = 2,
    Interrupt = 3,
}

/// Which phase of a Control transfer this submission belongs to. Ignored
/// for non-Control endpoints.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ControlPhase {
    Setup,
    Data,
}

/// Outcome delivered to a packet's completion callback.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Status {
    /// Transfer completed with the requested length (IN) or acknowledged (OUT).
    Ok,
    /// IN transfer ended short (fewer bytes than requested). Not retried.
    ErrSize,
    /// Recoverable transaction error (OUT TXERR); caller may resubmit.
    EAgain,
    /// Unrecoverable: STALL, babble, frame overrun, IN TXERR, or no free channel.
    EFatal,
}

/// Data delivered to a packet's completion callback.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct CallbackData {
    pub status: Status,
    pub transferred_length: u16,
}

/// A packet submission signature: called at most once per accepted
/// `read`/`write`, never from a true interrupt context, must not block.
pub type Callback = fn(arg: *mut (), data: CallbackData);

/// A caller-owned packet descriptor, copied into a channel on submission.
///
/// `data` and `toggle` are raw pointers rather than borrows: the
/// descriptor is stored inside the channel table for the lifetime of the
/// transfer, which routinely outlives a single `read`/`write` call's stack
/// frame (the transfer completes on a later `poll`). The caller is
/// responsible for keeping both pointers valid until the callback fires.
#[derive(Copy, Clone)]
pub struct Packet {
    pub data: *mut u8,
    pub datalen: u16,
    pub device_address: u8,
    pub endpoint_number: u8,
    pub endpoint_max_packet: u16,
    pub endpoint_type: EndpointType,
    pub control_phase: ControlPhase,
    pub speed: Speed,
    /// External toggle byte (0 or 1), read and written in place.
    pub toggle: *mut u8,
    pub callback: Callback,
    pub callback_arg: *mut (),
}

impl Packet {
    #[inline]
    pub(crate) fn toggle_bit(&self) -> bool {
        unsafe { *self.toggle != 0 }
    }

    #[inline]
    pub(crate) fn set_toggle(&self, bit: bool) {
        unsafe { *self.toggle = bit as u8 }
    }

    #[inline]
    pub(crate) fn flip_toggle(&self) {
        unsafe { *self.toggle ^= 1 }
    }

    #[inline]
    pub(crate) fn invoke_callback(&self, data: CallbackData) {
        (self.callback)(self.callback_arg, data);
    }
}

/// Direction relative to the host, matching the hardware's `EPDIR` bit
/// (`0` = OUT, `1` = IN).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Direction {
    Out,
    In,
}
