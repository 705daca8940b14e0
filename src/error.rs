// SPDX-License-Identifier: GPL-3.0-or-later

pub type Result<T> = core::result::Result<T, Error>;

/// Internal error classification. The packet engine narrows these down to
/// the four-valued [`crate::packet::Status`] delivered to submission
/// callbacks; variants that never reach a callback (e.g. `Nak`, which is
/// always retried internally) exist for intermediate classification and
/// logging only.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Error {
    /// No free hardware channel was available at submission time.
    ChannelExhausted,
    /// Negative acknowledge; retried by re-enabling the channel.
    Nak,
    /// Endpoint returned STALL; caller must clear-halt before resubmitting.
    Stall,
    /// Data toggle mismatch reported by the hardware.
    DataToggleError,
    /// Frame overrun (periodic endpoints) or OUT direction fatal overrun.
    FrameOverrun,
    /// More data arrived than the endpoint's max packet size allows.
    BabbleError,
    /// Transaction error (CRC, bit-stuffing, timeout, false EOP).
    TransactionError,
}
