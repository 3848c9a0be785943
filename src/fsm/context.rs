// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The async conductor tying the pure [`ContextState`] transition table
//! together with the [`SendQueue`] and the outer/echo/reply timeouts.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use once_cell::sync::OnceCell;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, error, warn};

use crate::{
    error::RamsesError,
    fsm::{
        queue::{QueueEntry, SendPriority, SendQueue},
        state::{ActiveCmd, ContextState, StepOutcome},
    },
    model::{command::Command, frame::Frame},
    transport::ByteLineSink,
};

/// FSM timeouts and retry budget.
#[derive(Debug, Clone, Copy)]
pub struct FsmConfig {
    pub outer_timeout: Duration,
    pub echo_timeout: Duration,
    pub reply_timeout: Duration,
    pub max_retries: u8,
    pub queue_capacity: usize,
}

impl Default for FsmConfig {
    fn default() -> Self {
        FsmConfig {
            outer_timeout: Duration::from_secs_f64(3.0),
            echo_timeout: Duration::from_secs_f64(0.50),
            reply_timeout: Duration::from_secs_f64(0.50),
            max_retries: 3,
            queue_capacity: 10,
        }
    }
}

struct Inner {
    state: ContextState,
    queue: SendQueue,
    /// Resolves the caller's `send_cmd` future for the currently active
    /// command, if any.
    active_responder: Option<oneshot::Sender<std::result::Result<Frame, RamsesError>>>,
}

/// Send/Echo/Reply FSM conductor, one per transport.
///
/// Uses the `OnceCell<Weak<Self>>` self-reference pattern so that spawned
/// echo/reply watchdog tasks can hold their own `Arc` handle without this
/// type needing to be constructed behind a wrapper that hands one out.
pub struct Context {
    inner: Mutex<Inner>,
    config: FsmConfig,
    transport: Arc<dyn ByteLineSink>,
    self_ref: OnceCell<Weak<Context>>,
}

impl Context {
    pub fn new(config: FsmConfig, transport: Arc<dyn ByteLineSink>) -> Arc<Context> {
        let ctx = Arc::new(Context {
            inner: Mutex::new(Inner {
                state: ContextState::Inactive,
                queue: SendQueue::new(config.queue_capacity),
                active_responder: None,
            }),
            config,
            transport,
            self_ref: OnceCell::new(),
        });
        let _ = ctx.self_ref.set(Arc::downgrade(&ctx));
        ctx
    }

    fn self_arc(&self) -> Arc<Context> {
        self.self_ref
            .get()
            .and_then(Weak::upgrade)
            .expect("self_ref initialised in Context::new")
    }

    pub async fn made_connection(&self, transport_paused: bool) {
        let mut inner = self.inner.lock().await;
        inner.state.made_connection(transport_paused);
    }

    pub async fn lost_connection(&self) {
        let abandoned = {
            let mut inner = self.inner.lock().await;
            let outcome = inner.state.lost_connection();
            match outcome {
                StepOutcome::Abandoned(err) => inner.active_responder.take().map(|r| (r, err)),
                _ => None,
            }
        };
        if let Some((responder, err)) = abandoned {
            let _ = responder.send(Err(err));
        }
        self.drain().await;
    }

    pub async fn writing_paused(&self) {
        let abandoned = {
            let mut inner = self.inner.lock().await;
            let outcome = inner.state.writing_paused();
            match outcome {
                StepOutcome::Abandoned(err) => inner.active_responder.take().map(|r| (r, err)),
                _ => None,
            }
        };
        if let Some((responder, err)) = abandoned {
            let _ = responder.send(Err(err));
        }
    }

    pub async fn writing_resumed(&self) {
        {
            let mut inner = self.inner.lock().await;
            inner.state.writing_resumed();
        }
        self.drain().await;
    }

    /// Feed a received, already-parsed frame into the FSM. Returns
    /// `true` if the frame resolved (echo or reply of) the active
    /// command.
    pub async fn rcvd_pkt(&self, frame: &Frame) -> bool {
        let Some(hdr) = frame.hdr(false) else {
            return false;
        };
        let resolved;
        {
            let mut inner = self.inner.lock().await;
            match inner.state.rcvd_pkt(&hdr) {
                Ok(StepOutcome::EchoCaptured) | Ok(StepOutcome::ReplyCaptured) => {
                    resolved = true;
                    if let Some(responder) = inner.active_responder.take() {
                        let _ = responder.send(Ok(frame.clone()));
                    }
                }
                Err(err) => {
                    resolved = true;
                    error!(%err, "fsm rejected received packet");
                    if let Some(responder) = inner.active_responder.take() {
                        let _ = responder.send(Err(err));
                    }
                }
                Ok(StepOutcome::None) | Ok(StepOutcome::Abandoned(_)) => {
                    resolved = false;
                }
            }
        }
        if resolved {
            self.drain().await;
        }
        resolved
    }

    /// Submit a command for transmission.
    pub async fn send_cmd(
        &self,
        mut cmd: Command,
        wait_for_reply: Option<bool>,
        max_retries: Option<u8>,
        timeout: Option<Duration>,
        priority: SendPriority,
    ) -> std::result::Result<Frame, RamsesError> {
        let want_reply = cmd.rx_header.is_some()
            && cmd.opcode != 0x1FC9
            && match wait_for_reply {
                Some(explicit) => explicit,
                None => cmd.verb == crate::model::frame::Verb::RQ,
            };
        if !want_reply {
            cmd.rx_header = None;
        }

        let outer_timeout = timeout.unwrap_or(self.config.outer_timeout);
        let retries = max_retries.unwrap_or(self.config.max_retries);

        let (tx, rx) = oneshot::channel();
        let now = std::time::Instant::now();
        let entry = QueueEntry {
            priority,
            submitted: now,
            cmd,
            expires: now + outer_timeout,
            max_retries: retries,
            responder: tx,
        };

        {
            let mut inner = self.inner.lock().await;
            if let Err((entry, err)) = inner.queue.push(entry) {
                let _ = entry.responder.send(Err(err));
            }
        }

        self.drain().await;

        match tokio::time::timeout(outer_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_recv_dropped)) => Err(RamsesError::ProtocolFsmError(
                "responder dropped without a result".into(),
            )),
            Err(_elapsed) => Err(RamsesError::ProtocolWaitFailed),
        }
    }

    /// Expire stale queue entries and, if idle, dispatch the next live
    /// entry.
    async fn drain(&self) {
        let dispatched = {
            let mut inner = self.inner.lock().await;
            inner.queue.expire_stale(std::time::Instant::now());
            if !inner.state.is_idle() {
                None
            } else {
                inner.queue.pop_next()
            }
        };
        let Some(entry) = dispatched else { return };

        let line = entry.cmd.to_wire();
        if let Err(err) = self.transport.write_line(&line).await {
            warn!(%err, "failed writing command to transport");
            let _ = entry.responder.send(Err(RamsesError::TransportError(err.to_string())));
            return;
        }

        let tx_header = entry.cmd.tx_header.clone();
        let max_retries = entry.max_retries;
        let outcome = {
            let mut inner = self.inner.lock().await;
            inner.state.sent_cmd(entry.cmd.clone(), max_retries)
        };
        match outcome {
            Ok(_) => {
                let mut inner = self.inner.lock().await;
                inner.active_responder = Some(entry.responder);
            }
            Err(err) => {
                let _ = entry.responder.send(Err(err));
                return;
            }
        }
        debug!(%tx_header, "dispatched command, arming echo watchdog");
        self.arm_watchdog(tx_header, max_retries, entry.cmd, true);
    }

    /// Spawn a timer that, if the named command is still active in the
    /// expected phase when it fires, retransmits it (budget permitting)
    /// or fails it.
    fn arm_watchdog(&self, tx_header: String, max_retries: u8, cmd: Command, awaiting_echo: bool) {
        let this = self.self_arc();
        let delay = if awaiting_echo {
            self.config.echo_timeout
        } else {
            self.config.reply_timeout
        };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            enum Action {
                Idle,
                Fail(oneshot::Sender<std::result::Result<Frame, RamsesError>>),
                Retransmit,
            }

            let action = {
                let mut inner = this.inner.lock().await;
                let phase_matches = match (&inner.state, awaiting_echo) {
                    (ContextState::WantEcho(ActiveCmd { cmd: c, .. }), true) => {
                        c.tx_header == tx_header
                    }
                    (ContextState::WantRply(ActiveCmd { cmd: c, .. }), false) => {
                        c.tx_header == tx_header
                    }
                    _ => false,
                };
                if !phase_matches {
                    Action::Idle
                } else if !awaiting_echo {
                    inner.state = ContextState::IsFailed;
                    match inner.active_responder.take() {
                        Some(r) => Action::Fail(r),
                        None => Action::Idle,
                    }
                } else {
                    let sends = inner.state.active_cmd().map(|a| a.sends).unwrap_or(0);
                    if sends <= max_retries {
                        Action::Retransmit
                    } else {
                        inner.state = ContextState::IsFailed;
                        match inner.active_responder.take() {
                            Some(r) => Action::Fail(r),
                            None => Action::Idle,
                        }
                    }
                }
            };

            match action {
                Action::Idle => {}
                Action::Fail(responder) => {
                    let err = if awaiting_echo {
                        RamsesError::ProtocolEchoFailed
                    } else {
                        RamsesError::ProtocolRplyFailed
                    };
                    let _ = responder.send(Err(err));
                    this.drain().await;
                }
                Action::Retransmit => {
                    if this.transport.write_line(&cmd.to_wire()).await.is_ok() {
                        let mut inner = this.inner.lock().await;
                        let _ = inner.state.sent_cmd(cmd.clone(), max_retries);
                        drop(inner);
                    }
                    this.arm_watchdog(tx_header, max_retries, cmd, true);
                }
            }
        });
    }
}
