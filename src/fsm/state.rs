// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Pure Send/Echo/Reply state-transition logic, kept free of any async/IO
//! concerns so the transition table can be unit-tested directly.

use crate::{error::RamsesError, model::command::Command, model::opcode::PUZZLE_OPCODE};

/// A command currently occupying the FSM, plus how many times it has
/// been (re)sent.
#[derive(Debug, Clone)]
pub struct ActiveCmd {
    pub cmd: Command,
    pub sends: u8,
}

/// The Send/Echo/Reply state machine.
#[derive(Debug, Clone)]
pub enum ContextState {
    Inactive,
    IsPaused,
    IsInIdle,
    WantEcho(ActiveCmd),
    WantRply(ActiveCmd),
    IsFailed,
}

/// What the caller (the async conductor in [`crate::fsm::context`])
/// should do after a transition.
#[derive(Debug)]
pub enum StepOutcome {
    /// No externally visible effect.
    None,
    /// The command's echo was captured; deliver it and, if no reply is
    /// expected, resolve the caller's future.
    EchoCaptured,
    /// The command's reply was captured; resolve the caller's future.
    ReplyCaptured,
    /// The previously active command was abandoned (connection lost, or
    /// writing paused mid-flight); its waiter should be failed.
    Abandoned(RamsesError),
}

fn is_same_or_puzzle(active: &Command, incoming: &Command) -> bool {
    active.opcode == PUZZLE_OPCODE
        || incoming.opcode == PUZZLE_OPCODE
        || active.tx_header == incoming.tx_header
}

impl ContextState {
    pub fn is_idle(&self) -> bool {
        matches!(self, ContextState::IsInIdle)
    }

    pub fn made_connection(&mut self, transport_paused: bool) {
        *self = if transport_paused {
            ContextState::IsPaused
        } else {
            ContextState::IsInIdle
        };
    }

    /// Any state reacts to `lost_connection` by resetting to `Inactive`.
    /// Returns the abandoned command, if one was in flight.
    pub fn lost_connection(&mut self) -> StepOutcome {
        let abandoned = match std::mem::replace(self, ContextState::Inactive) {
            ContextState::WantEcho(_) | ContextState::WantRply(_) => {
                Some(StepOutcome::Abandoned(RamsesError::TransportError(
                    "connection lost while a command was in flight".into(),
                )))
            }
            _ => None,
        };
        abandoned.unwrap_or(StepOutcome::None)
    }

    pub fn writing_paused(&mut self) -> StepOutcome {
        match std::mem::replace(self, ContextState::IsPaused) {
            ContextState::WantEcho(_) | ContextState::WantRply(_) => {
                StepOutcome::Abandoned(RamsesError::ProtocolSendFailed(
                    "writing paused mid-command".into(),
                ))
            }
            ContextState::IsInIdle => StepOutcome::None,
            other => {
                *self = other;
                StepOutcome::None
            }
        }
    }

    pub fn writing_resumed(&mut self) {
        if matches!(self, ContextState::IsPaused) {
            *self = ContextState::IsInIdle;
        }
    }

    /// `sent_cmd(cmd)`: either opens a new WantEcho window from IsInIdle,
    /// or (re)counts a retry of the already-active command.
    pub fn sent_cmd(&mut self, cmd: Command, max_retries: u8) -> Result<StepOutcome, RamsesError> {
        match self {
            ContextState::IsInIdle => {
                *self = ContextState::WantEcho(ActiveCmd { cmd, sends: 1 });
                Ok(StepOutcome::None)
            }
            ContextState::WantEcho(active) | ContextState::WantRply(active) => {
                if !is_same_or_puzzle(&active.cmd, &cmd) {
                    return Err(RamsesError::ProtocolFsmError(
                        "sent_cmd for a different command while one is already active".into(),
                    ));
                }
                if active.sends > max_retries {
                    *self = ContextState::IsFailed;
                    return Err(RamsesError::ProtocolSendFailed(
                        "retries exhausted".into(),
                    ));
                }
                active.sends += 1;
                Ok(StepOutcome::None)
            }
            other => Err(RamsesError::ProtocolFsmError(format!(
                "sent_cmd illegal in state {other:?}"
            ))),
        }
    }

    /// `rcvd_pkt(hdr)`: `hdr` is the inbound frame's own (non-flipped)
    /// header, i.e. `Frame::hdr(false)`.
    pub fn rcvd_pkt(&mut self, hdr: &str) -> Result<StepOutcome, RamsesError> {
        match self {
            ContextState::WantEcho(active) => {
                if hdr == active.cmd.tx_header {
                    if active.cmd.rx_header.is_none() {
                        *self = ContextState::IsInIdle;
                        Ok(StepOutcome::EchoCaptured)
                    } else {
                        let active = active.clone();
                        *self = ContextState::WantRply(active);
                        Ok(StepOutcome::None)
                    }
                } else if Some(hdr) == active.cmd.rx_header.as_deref() {
                    *self = ContextState::IsFailed;
                    Err(RamsesError::ProtocolFsmError(
                        "reply observed before echo".into(),
                    ))
                } else {
                    Ok(StepOutcome::None)
                }
            }
            ContextState::WantRply(active) => {
                if Some(hdr) == active.cmd.rx_header.as_deref() {
                    *self = ContextState::IsInIdle;
                    Ok(StepOutcome::ReplyCaptured)
                } else {
                    // duplicate echo (hdr == tx_header) or unrelated frame: ignored
                    Ok(StepOutcome::None)
                }
            }
            _ => Ok(StepOutcome::None),
        }
    }

    pub fn active_cmd(&self) -> Option<&ActiveCmd> {
        match self {
            ContextState::WantEcho(a) | ContextState::WantRply(a) => Some(a),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{address::Address, frame::Verb};

    fn cmd(rx: bool) -> Command {
        Command::new(
            Verb::RQ,
            Address::new(18, 730),
            Address::new(1, 222222),
            0x12B0,
            "00".to_string(),
            rx,
        )
    }

    #[test]
    fn echo_only_command_completes_in_idle() {
        let mut s = ContextState::IsInIdle;
        let c = cmd(false);
        let hdr = c.tx_header.clone();
        s.sent_cmd(c, 3).expect("sent ok");
        assert!(matches!(s, ContextState::WantEcho(_)));
        let outcome = s.rcvd_pkt(&hdr).expect("transition ok");
        assert!(matches!(outcome, StepOutcome::EchoCaptured));
        assert!(s.is_idle());
    }

    #[test]
    fn command_expecting_reply_transitions_through_want_rply() {
        let mut s = ContextState::IsInIdle;
        let c = cmd(true);
        let tx = c.tx_header.clone();
        let rx = c.rx_header.clone().expect("rx header set");
        s.sent_cmd(c, 3).expect("sent ok");
        s.rcvd_pkt(&tx).expect("echo ok");
        assert!(matches!(s, ContextState::WantRply(_)));
        let outcome = s.rcvd_pkt(&rx).expect("reply ok");
        assert!(matches!(outcome, StepOutcome::ReplyCaptured));
        assert!(s.is_idle());
    }

    #[test]
    fn reply_before_echo_is_an_fsm_error() {
        let mut s = ContextState::IsInIdle;
        let c = cmd(true);
        let rx = c.rx_header.clone().expect("rx header set");
        s.sent_cmd(c, 3).expect("sent ok");
        let err = s.rcvd_pkt(&rx).unwrap_err();
        assert!(matches!(err, RamsesError::ProtocolFsmError(_)));
    }

    #[test]
    fn resending_same_command_increments_sends_without_changing_state() {
        let mut s = ContextState::IsInIdle;
        let c = cmd(false);
        s.sent_cmd(c.clone(), 3).expect("sent ok");
        s.sent_cmd(c, 3).expect("resend ok");
        let active = s.active_cmd().expect("still active");
        assert_eq!(active.sends, 2);
    }

    #[test]
    fn retries_exhausted_fails_the_command() {
        let mut s = ContextState::IsInIdle;
        let c = cmd(false);
        s.sent_cmd(c.clone(), 3).expect("send 1");
        s.sent_cmd(c.clone(), 3).expect("send 2");
        s.sent_cmd(c.clone(), 3).expect("send 3");
        s.sent_cmd(c.clone(), 3).expect("send 4 (sends=4 <= max_retries+1 boundary)");
        let err = s.sent_cmd(c, 3).unwrap_err();
        assert!(matches!(err, RamsesError::ProtocolSendFailed(_)));
        assert!(matches!(s, ContextState::IsFailed));
    }

    #[test]
    fn duplicate_echo_in_want_rply_is_ignored() {
        let mut s = ContextState::IsInIdle;
        let c = cmd(true);
        let tx = c.tx_header.clone();
        s.sent_cmd(c, 3).expect("sent ok");
        s.rcvd_pkt(&tx).expect("echo ok");
        let outcome = s.rcvd_pkt(&tx).expect("duplicate echo tolerated");
        assert!(matches!(outcome, StepOutcome::None));
        assert!(matches!(s, ContextState::WantRply(_)));
    }

    #[test]
    fn lost_connection_resets_to_inactive_and_abandons_active_command() {
        let mut s = ContextState::IsInIdle;
        let c = cmd(false);
        s.sent_cmd(c, 3).expect("sent ok");
        let outcome = s.lost_connection();
        assert!(matches!(outcome, StepOutcome::Abandoned(_)));
        assert!(matches!(s, ContextState::Inactive));
    }
}
