// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Public error surface for the gateway core.
//!
//! The frame/addressing layer raises small leaf errors (`UnknownOpcode`,
//! `UnknownDeviceType`) that convert into [`RamsesError`] via `#[from]`.
//! Ambient-stack code (config loading, logger setup, CLI wiring) uses
//! `anyhow` directly instead of this enum, matching how the rest of this
//! crate's lineage keeps a typed error at protocol boundaries and `anyhow`
//! everywhere else.

use thiserror::Error;

/// Unrecognised 4-hex-digit opcode.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("unknown opcode: {0:04X}")]
pub struct UnknownOpcode(pub u16);

/// Unrecognised 2-digit device type code.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("unknown device type: {0:02}")]
pub struct UnknownDeviceType(pub u8);

/// Structural error taxonomy for the gateway core.
#[derive(Debug, Error)]
pub enum RamsesError {
    /// The line did not match the frame grammar.
    #[error("invalid frame grammar: {0}")]
    InvalidFrameGrammar(String),

    /// `len * 2 != payload.len()`.
    #[error("invalid frame length: declared {declared}, payload has {actual} hex chars")]
    InvalidFrameLength { declared: usize, actual: usize },

    /// The three-address table rejected the address set.
    #[error("corrupt address set: {0}")]
    CorruptAddrSet(String),

    /// A received frame contradicts an established entity invariant.
    #[error("corrupt state: {0}")]
    CorruptState(String),

    /// Illegal Send FSM transition.
    #[error("protocol fsm error: {0}")]
    ProtocolFsmError(String),

    /// Outer `send_cmd` timeout elapsed before reaching `IsInIdle`.
    #[error("protocol wait failed: timed out waiting for a free slot/completion")]
    ProtocolWaitFailed,

    /// Echo timeout elapsed in `WantEcho`.
    #[error("protocol echo failed: no echo received within the echo timeout")]
    ProtocolEchoFailed,

    /// Reply timeout elapsed in `WantRply`.
    #[error("protocol reply failed: no reply received within the reply timeout")]
    ProtocolRplyFailed,

    /// Retries exhausted, or some other generic send failure.
    #[error("protocol send failed: {0}")]
    ProtocolSendFailed(String),

    /// The bounded priority send queue rejected a new submission.
    #[error("send queue is full")]
    QueueFull,

    /// The byte-line transport disappeared.
    #[error("transport error: {0}")]
    TransportError(String),

    #[error(transparent)]
    UnknownOpcode(#[from] UnknownOpcode),

    #[error(transparent)]
    UnknownDeviceType(#[from] UnknownDeviceType),
}

pub type Result<T> = std::result::Result<T, RamsesError>;
