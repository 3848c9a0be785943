// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A frame prepared for transmission: carries `tx_header` and, when a
//! reply is expected, `rx_header`.

use crate::model::{
    address::{Address, encode_three_addr},
    context,
    frame::Verb,
};

#[derive(Debug, Clone)]
pub struct Command {
    pub verb: Verb,
    pub seq: String,
    pub src: Address,
    pub dst: Address,
    pub opcode: u16,
    pub payload: String,
    /// This command's own header — matched against an incoming echo.
    pub tx_header: String,
    /// The header of the reply this command expects, if any.
    pub rx_header: Option<String>,
}

impl Command {
    /// Build a command whose `tx_header`/`rx_header` follow the same
    /// derivation as a parsed [`crate::model::frame::Frame`] would,
    /// without needing to round-trip through the wire.
    pub fn new(
        verb: Verb,
        src: Address,
        dst: Address,
        opcode: u16,
        payload: String,
        expects_reply: bool,
    ) -> Command {
        let addr_for_hdr = if src.device_type == 18 { dst } else { src };
        let len = payload.len() / 2;
        let ctx = context::compute_ctx(opcode, &payload, verb, src, dst, len);
        let mut tx_header = format!("{opcode:04X}|{verb}|{addr_for_hdr}");
        if let Some(ctx) = &ctx {
            tx_header.push('|');
            tx_header.push_str(ctx);
        }
        let rx_header = if expects_reply && opcode != 0x1FC9 {
            verb.flip_for_rx().map(|rx_verb| {
                let mut hdr = format!("{opcode:04X}|{rx_verb}|{addr_for_hdr}");
                if let Some(ctx) = &ctx {
                    hdr.push('|');
                    hdr.push_str(ctx);
                }
                hdr
            })
        } else {
            None
        };
        Command {
            verb,
            seq: "---".to_string(),
            src,
            dst,
            opcode,
            payload,
            tx_header,
            rx_header,
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len() / 2
    }

    pub fn to_wire(&self) -> String {
        format!(
            "000 {} {} {} {:04X} {:03} {}",
            self.verb,
            self.seq,
            encode_three_addr(self.src, self.dst),
            self.opcode,
            self.len(),
            self.payload.to_uppercase(),
        )
    }
}
