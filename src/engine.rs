// SPDX-License-Identifier: GPL-3.0-or-later

//! Packet submission and per-channel interrupt dispatch.

use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::LocalRegisterCopy;

use crate::channel::{ChannelState, PacketId};
use crate::error::Error;
use crate::fifo;
use crate::packet::{CallbackData, Direction, EndpointType, Packet, Speed, Status};
use crate::regs::{HAINT, HCCHAR, HCINT, HCTSIZ};
use crate::Controller;

/// Maps a hardware error classification to the OUT-direction callback
/// status (spec §7): a transaction error is recoverable, everything else
/// that reaches here is not.
fn out_status(err: Error) -> Status {
    match err {
        Error::TransactionError => Status::EAgain,
        _ => Status::EFatal,
    }
}

/// Maps a hardware error classification to the IN-direction callback
/// status: unlike OUT, a transaction error on IN is not retried by the
/// core.
fn in_status(_err: Error) -> Status {
    Status::EFatal
}

/// Acquires a channel for `packet` and programs it for an IN transfer. If
/// no channel is free, the callback fires immediately with `EFatal` and a
/// transferred length of 0.
pub(crate) fn submit_read<const N: usize, const RX: u16, const NPTX: u16, const PTX: u16>(
    ctrl: &mut Controller<N, RX, NPTX, PTX>,
    packet: Packet,
) {
    let ch = match ctrl.channels.acquire(ctrl.regs) {
        Ok(ch) => ch,
        Err(_) => {
            packet.invoke_callback(CallbackData {
                status: Status::EFatal,
                transferred_length: 0,
            });
            return;
        }
    };

    let pid = if packet.toggle_bit() {
        PacketId::Data1
    } else {
        PacketId::Data0
    };
    let num_packets = if packet.datalen > 0 {
        fifo::div_round_up(packet.datalen as u32, packet.endpoint_max_packet as u32) as u16
    } else {
        0
    };

    {
        let record = &mut ctrl.channels.channels[ch as usize];
        record.packet = packet;
        record.data_index = 0;
    }

    ctrl.regs.hctsiz(ch).write(
        HCTSIZ::DPID.val(pid as u32)
            + HCTSIZ::PKTCNT.val(num_packets as u32)
            + HCTSIZ::XFRSIZ.val(packet.datalen as u32),
    );
    configure_channel(ctrl, ch, &packet, Direction::In);
}

/// Acquires a channel for `packet` and programs it for an OUT transfer,
/// including the zero-length status-stage case, then pushes the payload
/// into the channel's transmit FIFO window.
pub(crate) fn submit_write<const N: usize, const RX: u16, const NPTX: u16, const PTX: u16>(
    ctrl: &mut Controller<N, RX, NPTX, PTX>,
    packet: Packet,
) {
    let ch = match ctrl.channels.acquire(ctrl.regs) {
        Ok(ch) => ch,
        Err(_) => {
            packet.invoke_callback(CallbackData {
                status: Status::EFatal,
                transferred_length: 0,
            });
            return;
        }
    };

    let pid = match packet.endpoint_type {
        EndpointType::Control => {
            // Setup and the fixed Setup->Data sequencing both ride on the
            // same two-bit PID encoding as MDATA on this hardware.
            packet.set_toggle(false);
            PacketId::MdataOrSetup
        }
        EndpointType::Bulk | EndpointType::Interrupt => {
            if packet.toggle_bit() {
                PacketId::Data1
            } else {
                PacketId::Data0
            }
        }
        EndpointType::Isochronous => {
            // TODO: isochronous OUT never computes a real PID here; the
            // MDATA/DATA0/DATA1/DATA2 sequencing this needs has not been
            // worked out. Do not guess at it.
            log::warn!("otg: ch={ch} BUG: isochronous OUT PID not computed, forcing DATA0");
            PacketId::Data0
        }
    };
    let num_packets = if packet.datalen == 0 {
        1
    } else {
        fifo::div_round_up(packet.datalen as u32, packet.endpoint_max_packet as u32) as u16
    };

    {
        let record = &mut ctrl.channels.channels[ch as usize];
        record.packet = packet;
        record.data_index = 0;
    }

    ctrl.regs.hctsiz(ch).write(
        HCTSIZ::DPID.val(pid as u32)
            + HCTSIZ::PKTCNT.val(num_packets as u32)
            + HCTSIZ::XFRSIZ.val(packet.datalen as u32),
    );
    configure_channel(ctrl, ch, &packet, Direction::Out);
    fifo::fill(ctrl.regs, ch, packet.data as *const u8, packet.datalen);
}

fn configure_channel<const N: usize, const RX: u16, const NPTX: u16, const PTX: u16>(
    ctrl: &mut Controller<N, RX, NPTX, PTX>,
    ch: u8,
    packet: &Packet,
    dir: Direction,
) {
    ctrl.regs.hcchar(ch).write(
        HCCHAR::MPSIZ.val(packet.endpoint_max_packet as u32)
            + HCCHAR::EPNUM.val(packet.endpoint_number as u32)
            + HCCHAR::EPTYP.val(packet.endpoint_type as u32)
            + HCCHAR::MCNT.val(1)
            + HCCHAR::DAD.val(packet.device_address as u32)
            + HCCHAR::LSDEV.val((packet.speed == Speed::Low) as u32)
            + HCCHAR::EPDIR.val((dir == Direction::In) as u32)
            + HCCHAR::CHENA::SET
            + HCCHAR::CHDIS::CLEAR,
    );
}

/// Services the aggregate host-channel interrupt: for every channel bit
/// set in `HAINT` whose allocation is Working, reads and dispatches its
/// `HCINT` flags. Bits are scanned ascending, so callbacks for multiple
/// completions in the same poll fire in channel-index order.
pub(crate) fn dispatch_channel_interrupts<const N: usize, const RX: u16, const NPTX: u16, const PTX: u16>(
    ctrl: &mut Controller<N, RX, NPTX, PTX>,
) {
    let mut pending = ctrl.regs.haint().read(HAINT::HAINT);
    while pending != 0 {
        let ch = pending.trailing_zeros() as u8;
        pending &= !(1 << ch);
        if (ch as usize) < N && ctrl.channels.channels[ch as usize].state == ChannelState::Working
        {
            handle_channel_interrupt(ctrl, ch);
        }
    }
}

fn handle_channel_interrupt<const N: usize, const RX: u16, const NPTX: u16, const PTX: u16>(
    ctrl: &mut Controller<N, RX, NPTX, PTX>,
    ch: u8,
) {
    let hcint = ctrl.regs.hcint(ch).extract();
    if ctrl.regs.hcchar(ch).is_set(HCCHAR::EPDIR) {
        handle_in(ctrl, ch, hcint);
    } else {
        handle_out(ctrl, ch, hcint);
    }
}

/// OUT-direction flag handling. Flags are checked in a fixed order; after
/// any flag that delivers a callback, the rest of this pass is skipped,
/// since only one callback may be delivered per transfer.
fn handle_out<const N: usize, const RX: u16, const NPTX: u16, const PTX: u16>(
    ctrl: &mut Controller<N, RX, NPTX, PTX>,
    ch: u8,
    hcint: LocalRegisterCopy<u32, HCINT::Register>,
) {
    if hcint.is_set(HCINT::NAK) {
        ctrl.regs.hcint(ch).write(HCINT::NAK::SET);
        log::trace!("otg: ch={ch} {:?}", Error::Nak);
        reenable(ctrl, ch);
    }
    if hcint.is_set(HCINT::ACK) {
        ctrl.regs.hcint(ch).write(HCINT::ACK::SET);
        let packet = ctrl.channels.channels[ch as usize].packet;
        match packet.endpoint_type {
            EndpointType::Control => packet.set_toggle(true),
            _ => packet.flip_toggle(),
        }
    }
    if hcint.is_set(HCINT::XFRC) {
        ctrl.regs.hcint(ch).write(HCINT::XFRC::SET);
        let datalen = ctrl.channels.channels[ch as usize].packet.datalen;
        finish(ctrl, ch, Status::Ok, datalen);
        return;
    }
    if hcint.is_set(HCINT::FRMOR) {
        ctrl.regs.hcint(ch).write(HCINT::FRMOR::SET);
        let err = Error::FrameOverrun;
        log::trace!("otg: ch={ch} {err:?}");
        finish(ctrl, ch, out_status(err), 0);
        return;
    }
    if hcint.is_set(HCINT::TXERR) {
        ctrl.regs.hcint(ch).write(HCINT::TXERR::SET);
        let err = Error::TransactionError;
        log::trace!("otg: ch={ch} {err:?}");
        // Recoverable: the caller decides whether to resubmit. Escalating
        // after repeated TXERR is left unimplemented (see
        // `ChannelRecord::error_count`).
        finish(ctrl, ch, out_status(err), 0);
        return;
    }
    if hcint.is_set(HCINT::STALL) {
        ctrl.regs.hcint(ch).write(HCINT::STALL::SET);
        let err = Error::Stall;
        log::trace!("otg: ch={ch} {err:?}");
        finish(ctrl, ch, out_status(err), 0);
        return;
    }
    if hcint.is_set(HCINT::CHH) {
        ctrl.regs.hcint(ch).write(HCINT::CHH::SET);
        ctrl.channels.release(ctrl.regs, ch);
    }
}

/// IN-direction flag handling.
fn handle_in<const N: usize, const RX: u16, const NPTX: u16, const PTX: u16>(
    ctrl: &mut Controller<N, RX, NPTX, PTX>,
    ch: u8,
    hcint: LocalRegisterCopy<u32, HCINT::Register>,
) {
    if hcint.is_set(HCINT::NAK) {
        ctrl.regs.hcint(ch).write(HCINT::NAK::SET);
        log::trace!("otg: ch={ch} {:?}", Error::Nak);
        reenable(ctrl, ch);
    }
    if hcint.is_set(HCINT::DTERR) {
        // Acknowledge only; retried implicitly by the hardware.
        ctrl.regs.hcint(ch).write(HCINT::DTERR::SET);
        log::trace!("otg: ch={ch} {:?}", Error::DataToggleError);
    }
    if hcint.is_set(HCINT::ACK) {
        ctrl.regs.hcint(ch).write(HCINT::ACK::SET);
        ctrl.channels.channels[ch as usize].packet.flip_toggle();
    }
    if hcint.is_set(HCINT::XFRC) {
        ctrl.regs.hcint(ch).write(HCINT::XFRC::SET);
        let record = &ctrl.channels.channels[ch as usize];
        let transferred = record.data_index;
        let status = if transferred == record.packet.datalen {
            Status::Ok
        } else {
            Status::ErrSize
        };
        finish(ctrl, ch, status, transferred);
        return;
    }
    if hcint.is_set(HCINT::BBERR) {
        ctrl.regs.hcint(ch).write(HCINT::BBERR::SET);
        let err = Error::BabbleError;
        log::trace!("otg: ch={ch} {err:?}");
        finish(ctrl, ch, in_status(err), 0);
        return;
    }
    if hcint.is_set(HCINT::FRMOR) {
        // Acknowledge only; unlike the OUT direction this is not fatal.
        ctrl.regs.hcint(ch).write(HCINT::FRMOR::SET);
        log::trace!("otg: ch={ch} {:?}", Error::FrameOverrun);
    }
    if hcint.is_set(HCINT::TXERR) {
        ctrl.regs.hcint(ch).write(HCINT::TXERR::SET);
        let err = Error::TransactionError;
        log::trace!("otg: ch={ch} {err:?}");
        finish(ctrl, ch, in_status(err), 0);
        return;
    }
    if hcint.is_set(HCINT::STALL) {
        ctrl.regs.hcint(ch).write(HCINT::STALL::SET);
        let err = Error::Stall;
        log::trace!("otg: ch={ch} {err:?}");
        finish(ctrl, ch, in_status(err), 0);
        return;
    }
    if hcint.is_set(HCINT::CHH) {
        ctrl.regs.hcint(ch).write(HCINT::CHH::SET);
        ctrl.channels.release(ctrl.regs, ch);
    }
}

fn reenable<const N: usize, const RX: u16, const NPTX: u16, const PTX: u16>(
    ctrl: &Controller<N, RX, NPTX, PTX>,
    ch: u8,
) {
    ctrl.regs
        .hcchar(ch)
        .modify(HCCHAR::CHENA::SET + HCCHAR::CHDIS::CLEAR);
}

fn finish<const N: usize, const RX: u16, const NPTX: u16, const PTX: u16>(
    ctrl: &mut Controller<N, RX, NPTX, PTX>,
    ch: u8,
    status: Status,
    transferred_length: u16,
) {
    let packet = ctrl.channels.channels[ch as usize].packet;
    ctrl.channels.release(ctrl.regs, ch);
    packet.invoke_callback(CallbackData {
        status,
        transferred_length,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::test_mmio::FakeMmio;
    use crate::packet::{CallbackData, ControlPhase, EndpointType, Packet, Speed, Status};
    use crate::port::TopState;
    use core::cell::Cell;
    use core::sync::atomic::{AtomicPtr, Ordering};

    // Callbacks are plain `fn` pointers with a `*mut ()` argument (spec
    // §6), so tests route the observed `CallbackData` through a thread
    // local-ish static cell keyed by the opaque argument pointer.
    static LAST: AtomicPtr<Cell<Option<CallbackData>>> = AtomicPtr::new(core::ptr::null_mut());

    fn record_callback(arg: *mut (), data: CallbackData) {
        let cell = arg as *mut Cell<Option<CallbackData>>;
        unsafe { (*cell).set(Some(data)) };
    }

    fn make_controller() -> (FakeMmio, Controller<4, 64, 64, 64>) {
        let mmio = FakeMmio::new();
        let ctrl = unsafe { Controller::new(0) };
        (mmio, ctrl)
    }

    fn bind_regs(ctrl: &mut Controller<4, 64, 64, 64>, mmio: &mut FakeMmio) {
        ctrl.regs = mmio.regs();
    }

    fn bulk_packet(data: *mut u8, datalen: u16, toggle: *mut u8) -> Packet {
        Packet {
            data,
            datalen,
            device_address: 5,
            endpoint_number: 1,
            endpoint_max_packet: 64,
            endpoint_type: EndpointType::Bulk,
            control_phase: ControlPhase::Data,
            speed: Speed::Full,
            toggle,
            callback: record_callback,
            callback_arg: core::ptr::null_mut(),
        }
    }

    #[test]
    fn submit_write_programs_zero_length_status_stage_as_one_packet() {
        let (mut mmio, mut ctrl) = make_controller();
        bind_regs(&mut ctrl, &mut mmio);
        ctrl.top_state = TopState::Run;

        let mut toggle = 0u8;
        let packet = bulk_packet(core::ptr::null_mut(), 0, &mut toggle);
        submit_write(&mut ctrl, packet);

        assert_eq!(ctrl.regs.hctsiz(0).read(HCTSIZ::PKTCNT), 1);
        assert_eq!(ctrl.regs.hctsiz(0).read(HCTSIZ::XFRSIZ), 0);
    }

    #[test]
    fn submit_read_computes_ceil_division_num_packets() {
        let (mut mmio, mut ctrl) = make_controller();
        bind_regs(&mut ctrl, &mut mmio);
        ctrl.top_state = TopState::Run;

        let mut buf = [0u8; 80];
        let mut toggle = 0u8;
        let packet = bulk_packet(buf.as_mut_ptr(), 80, &mut toggle);
        submit_read(&mut ctrl, packet);

        // ceil(80/64) == 2
        assert_eq!(ctrl.regs.hctsiz(0).read(HCTSIZ::PKTCNT), 2);
        assert_eq!(ctrl.regs.hctsiz(0).read(HCTSIZ::XFRSIZ), 80);
    }

    #[test]
    fn out_xfrc_delivers_ok_with_full_datalen_and_releases_channel() {
        let (mut mmio, mut ctrl) = make_controller();
        bind_regs(&mut ctrl, &mut mmio);
        ctrl.top_state = TopState::Run;

        let cell = Cell::new(None);
        let mut buf = [0u8; 8];
        let mut toggle = 0u8;
        let mut packet = bulk_packet(buf.as_mut_ptr(), 8, &mut toggle);
        packet.callback_arg = &cell as *const _ as *mut ();
        submit_write(&mut ctrl, packet);

        ctrl.regs.hcint(0).write(HCINT::XFRC::SET);
        handle_channel_interrupt(&mut ctrl, 0);

        assert_eq!(
            cell.get(),
            Some(CallbackData {
                status: Status::Ok,
                transferred_length: 8
            })
        );
        // XFRC only requests a disable (CHDIS); the record stays Working
        // until the hardware reports CHH, same as a real channel halt.
        assert_eq!(ctrl.channels.channels[0].state, ChannelState::Working);
        assert!(ctrl.regs.hcchar(0).is_set(crate::regs::HCCHAR::CHDIS));
    }

    #[test]
    fn out_txerr_delivers_eagain_and_caller_may_resubmit() {
        let (mut mmio, mut ctrl) = make_controller();
        bind_regs(&mut ctrl, &mut mmio);
        ctrl.top_state = TopState::Run;

        let cell = Cell::new(None);
        let mut buf = [0u8; 8];
        let mut toggle = 0u8;
        let mut packet = bulk_packet(buf.as_mut_ptr(), 8, &mut toggle);
        packet.callback_arg = &cell as *const _ as *mut ();
        submit_write(&mut ctrl, packet);

        ctrl.regs.hcint(0).write(HCINT::TXERR::SET);
        handle_channel_interrupt(&mut ctrl, 0);

        assert_eq!(
            cell.get(),
            Some(CallbackData {
                status: Status::EAgain,
                transferred_length: 0
            })
        );
    }

    #[test]
    fn in_stall_delivers_efatal() {
        let (mut mmio, mut ctrl) = make_controller();
        bind_regs(&mut ctrl, &mut mmio);
        ctrl.top_state = TopState::Run;

        let cell = Cell::new(None);
        let mut buf = [0u8; 8];
        let mut toggle = 0u8;
        let mut packet = bulk_packet(buf.as_mut_ptr(), 8, &mut toggle);
        packet.callback_arg = &cell as *const _ as *mut ();
        submit_read(&mut ctrl, packet);

        ctrl.regs.hcchar(0).modify(HCCHAR::EPDIR::SET);
        ctrl.regs.hcint(0).write(HCINT::STALL::SET);
        handle_channel_interrupt(&mut ctrl, 0);

        assert_eq!(
            cell.get(),
            Some(CallbackData {
                status: Status::EFatal,
                transferred_length: 0
            })
        );
    }

    #[test]
    fn bulk_out_ack_flips_toggle_each_time() {
        let (mut mmio, mut ctrl) = make_controller();
        bind_regs(&mut ctrl, &mut mmio);
        ctrl.top_state = TopState::Run;

        let mut buf = [0u8; 8];
        let mut toggle = 0u8;
        let packet = bulk_packet(buf.as_mut_ptr(), 8, &mut toggle);
        submit_write(&mut ctrl, packet);

        ctrl.regs.hcint(0).write(HCINT::ACK::SET);
        handle_channel_interrupt(&mut ctrl, 0);
        assert_eq!(toggle, 1);

        ctrl.regs.hcint(0).write(HCINT::ACK::SET);
        handle_channel_interrupt(&mut ctrl, 0);
        assert_eq!(toggle, 0, "bulk OUT flips again on a second ACK");
    }

    #[test]
    fn control_out_ack_forces_toggle_to_one_regardless_of_prior_value() {
        let (mut mmio, mut ctrl) = make_controller();
        bind_regs(&mut ctrl, &mut mmio);
        ctrl.top_state = TopState::Run;

        let mut toggle = 1u8;
        let mut packet = bulk_packet(core::ptr::null_mut(), 0, &mut toggle);
        packet.endpoint_type = EndpointType::Control;
        submit_write(&mut ctrl, packet);
        // submission itself resets the toggle to 0 for a Control OUT.
        assert_eq!(toggle, 0);

        toggle = 0;
        ctrl.regs.hcint(0).write(HCINT::ACK::SET);
        handle_channel_interrupt(&mut ctrl, 0);
        assert_eq!(toggle, 1);
    }

    #[test]
    fn chh_with_no_prior_callback_just_frees_channel() {
        let (mut mmio, mut ctrl) = make_controller();
        bind_regs(&mut ctrl, &mut mmio);
        ctrl.top_state = TopState::Run;

        let mut buf = [0u8; 8];
        let mut toggle = 0u8;
        let packet = bulk_packet(buf.as_mut_ptr(), 8, &mut toggle);
        submit_write(&mut ctrl, packet);

        // A CHH interrupt means the hardware has already halted the
        // channel by the time software observes it; model that by
        // clearing CHENA before dispatching, same as `release` would see
        // on real hardware.
        ctrl.regs.hcchar(0).modify(HCCHAR::CHENA::CLEAR);
        ctrl.regs.hcint(0).write(HCINT::CHH::SET);
        handle_channel_interrupt(&mut ctrl, 0);

        assert_eq!(ctrl.channels.channels[0].state, ChannelState::Free);
    }
}
