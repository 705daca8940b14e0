// SPDX-License-Identifier: GPL-3.0-or-later

//! Polled USB OTG host controller driver core.
//!
//! This crate is the low-level layer between a higher-level USB host stack
//! and the memory-mapped registers of an on-chip OTG host controller: port
//! bring-up and the runtime connect/disconnect state machine, a channel
//! allocator that multiplexes logical transfers onto a fixed pool of
//! hardware channels, and a packet engine that drives the transmit/receive
//! FIFOs and DATA0/DATA1 toggling.
//!
//! Operation is entirely non-blocking and single-threaded: there is no
//! interrupt handler here. The host stack calls [`Controller::poll`] at
//! regular intervals with a monotonic microsecond timestamp, which advances
//! the state machine and drains whatever interrupt status flags the
//! hardware has raised since the last call. [`Controller::read`] and
//! [`Controller::write`] may be called at any time outside `poll`, or from
//! within a completion callback invoked by `poll`.
//!
//! Out of scope: device enumeration, descriptor parsing, class drivers,
//! logging backend selection, the timing source, and board-specific clock
//! and PHY configuration. Callers own all of that.

#![no_std]

pub mod channel;
pub mod engine;
pub mod error;
pub mod fifo;
pub mod packet;
pub mod port;
pub mod regs;

pub use error::{Error, Result};
pub use packet::{
    CallbackData, Callback, ControlPhase, Direction, EndpointType, Packet, Speed, Status,
};
pub use port::{PollEvent, PortState, TopState};

use channel::ChannelTable;
use packet::Speed as RootSpeed;
use regs::Regs;

/// A Full-Speed instance: 8 channels, 64/64/64-word FIFO partitioning.
#[cfg(feature = "fs")]
pub type FsController = Controller<8, 64, 64, 64>;

/// A High-Speed instance: 12 channels, 128/96/64-word FIFO partitioning.
#[cfg(feature = "hs")]
pub type HsController = Controller<12, 128, 96, 64>;

/// One controller instance: base register address, channel table, and the
/// full bring-up/runtime/packet-engine state.
///
/// `N` is the channel count (8 for Full-Speed, 12 for High-Speed).
/// `RX`/`NPTX`/`PTX` are the FIFO partition sizes in 32-bit words (default
/// 64 words each). They are associated constants of the monomorphization
/// rather than runtime configuration, so two differently-sized instances
/// coexist with zero runtime branching and no dynamic allocation.
///
/// Two instances share no mutable state and may be polled independently
/// from the same cooperative loop.
pub struct Controller<const N: usize, const RX: u16, const NPTX: u16, const PTX: u16> {
    regs: Regs,
    channels: ChannelTable<N>,
    init_step: u8,
    top_state: TopState,
    top_state_prev: TopState,
    port_state: PortState,
    root_speed: RootSpeed,
    now_us: u32,
    phase_start_us: u32,
}

impl<const N: usize, const RX: u16, const NPTX: u16, const PTX: u16> Controller<N, RX, NPTX, PTX> {
    /// Builds a controller bound to `base`. Touches no hardware by itself;
    /// call [`Controller::init`] and then poll repeatedly.
    ///
    /// # Safety
    /// `base` must be the base address of a real (or test-double) OTG
    /// host-controller register block, valid for the instance's entire
    /// lifetime, and not aliased by any other live `Controller` over the
    /// same address range.
    pub const unsafe fn new(base: usize) -> Self {
        Self {
            regs: unsafe { Regs::new(base) },
            channels: ChannelTable::new(),
            init_step: 0,
            top_state: TopState::Init,
            top_state_prev: TopState::Init,
            port_state: PortState::Disconnected,
            root_speed: RootSpeed::Full,
            now_us: 0,
            phase_start_us: 0,
        }
    }

    /// Places the instance in the INIT state. Non-blocking; bring-up
    /// proceeds one step per [`Controller::poll`] call.
    pub fn init(&mut self) {
        self.init_step = 0;
        self.top_state = TopState::Init;
        self.top_state_prev = TopState::Init;
        self.port_state = PortState::Disconnected;
    }

    /// Advances the state machine and drains interrupt status flags. Must
    /// be called repeatedly with a monotonically increasing microsecond
    /// timestamp; between calls the driver performs no activity.
    pub fn poll(&mut self, now_us: u32) -> PollEvent {
        self.now_us = now_us;
        match self.top_state {
            TopState::Init => {
                self.poll_init();
                PollEvent::None
            }
            TopState::Reset => {
                self.poll_reset();
                PollEvent::None
            }
            TopState::Run => self.poll_run(),
        }
    }

    /// Submits an IN transfer. `packet` is copied into a free channel; if
    /// none is free, the callback fires immediately with `EFatal` and the
    /// call returns without touching hardware.
    pub fn read(&mut self, packet: Packet) {
        engine::submit_read(self, packet);
    }

    /// Submits an OUT transfer, including the zero-length status-stage
    /// case (`datalen == 0` programs a single packet).
    pub fn write(&mut self, packet: Packet) {
        engine::submit_write(self, packet);
    }

    /// Current negotiated port speed. Valid only after a `DeviceConnected`
    /// return from [`Controller::poll`].
    pub fn root_speed(&self) -> RootSpeed {
        self.root_speed
    }
}
