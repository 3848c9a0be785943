// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Exercises the Send/Echo/Reply FSM end to end through [`Context`] and a
//! [`ChannelTransport`] pair, standing in for a radio that hears its own
//! transmissions before a remote device answers.

use std::sync::Arc;

use ramses_core::{
    error::RamsesError,
    fsm::{context::{Context, FsmConfig}, queue::SendPriority},
    model::{address::Address, command::Command, frame::{Frame, Verb}},
    transport::{ByteLineSource, ChannelTransport},
};

fn dtm() -> chrono::NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(2026, 1, 1)
        .expect("date")
        .and_hms_opt(12, 0, 0)
        .expect("time")
}

#[tokio::test]
async fn request_reply_round_trip_resolves_with_the_reply_frame() {
    let (gateway_side, peer_side) = ChannelTransport::pair();
    let ctx = Context::new(FsmConfig::default(), Arc::new(gateway_side));
    ctx.made_connection(false).await;

    let cmd = Command::new(
        Verb::RQ,
        Address::new(18, 730),
        Address::new(1, 222222),
        0x0008,
        "00".to_string(),
        true,
    );

    let send_ctx = ctx.clone();
    let send_task = tokio::spawn(async move {
        send_ctx
            .send_cmd(cmd, None, None, None, SendPriority::Default)
            .await
    });

    // The radio hears its own transmission (rssi "000") before the device
    // answers: `to_wire` already stamps rssi "000", so replaying the same
    // line back is exactly what a loopback echo looks like on the wire.
    let sent_line = peer_side
        .read_line()
        .await
        .expect("read ok")
        .expect("a line was written");
    let echo = Frame::parse(&sent_line, dtm()).expect("echo parses");
    assert!(echo.is_echo());
    let resolved = ctx.rcvd_pkt(&echo).await;
    assert!(!resolved, "echo alone must not resolve a reply-expecting command");

    let reply_line = "092 RP --- 01:222222 18:000730 --:------ 0008 001 00";
    let reply = Frame::parse(reply_line, dtm()).expect("reply parses");
    let resolved = ctx.rcvd_pkt(&reply).await;
    assert!(resolved, "the matching reply must resolve the command");

    let result = send_task.await.expect("task did not panic");
    let frame = result.expect("send_cmd resolved with a frame");
    assert_eq!(frame.opcode, 0x0008);
    assert_eq!(frame.verb, Verb::RP);
    assert_eq!(frame.src, Address::new(1, 222222));
}

#[tokio::test]
async fn request_reply_round_trip_resolves_when_the_opcode_carries_a_zone_ctx() {
    // 12B0 (window status) has a Simple idx class, so both the echo and
    // the reply carry a `|00` ctx suffix on their header that
    // `Command::new` must precompute to match.
    let (gateway_side, peer_side) = ChannelTransport::pair();
    let ctx = Context::new(FsmConfig::default(), Arc::new(gateway_side));
    ctx.made_connection(false).await;

    let cmd = Command::new(
        Verb::RQ,
        Address::new(18, 730),
        Address::new(1, 222222),
        0x12B0,
        "00".to_string(),
        true,
    );
    assert_eq!(cmd.tx_header, "12B0|RQ|01:222222|00");
    assert_eq!(cmd.rx_header.as_deref(), Some("12B0|RP|01:222222|00"));

    let send_ctx = ctx.clone();
    let send_task = tokio::spawn(async move {
        send_ctx
            .send_cmd(cmd, None, None, None, SendPriority::Default)
            .await
    });

    let sent_line = peer_side
        .read_line()
        .await
        .expect("read ok")
        .expect("a line was written");
    let echo = Frame::parse(&sent_line, dtm()).expect("echo parses");
    assert!(echo.is_echo());
    assert_eq!(echo.hdr(false).as_deref(), Some("12B0|RQ|01:222222|00"));
    let resolved = ctx.rcvd_pkt(&echo).await;
    assert!(!resolved, "echo alone must not resolve a reply-expecting command");

    let reply_line = "092 RP --- 01:222222 18:000730 --:------ 12B0 003 000000";
    let reply = Frame::parse(reply_line, dtm()).expect("reply parses");
    let resolved = ctx.rcvd_pkt(&reply).await;
    assert!(resolved, "the matching reply must resolve the command");

    let result = send_task.await.expect("task did not panic");
    let frame = result.expect("send_cmd resolved with a frame");
    assert_eq!(frame.opcode, 0x12B0);
    assert_eq!(frame.verb, Verb::RP);
    assert_eq!(frame.src, Address::new(1, 222222));
}

#[tokio::test]
async fn echo_timeout_fails_the_command_when_nothing_answers() {
    let (gateway_side, _peer_side) = ChannelTransport::pair();
    let fsm = FsmConfig {
        echo_timeout: std::time::Duration::from_millis(30),
        reply_timeout: std::time::Duration::from_millis(30),
        outer_timeout: std::time::Duration::from_millis(200),
        max_retries: 1,
        queue_capacity: 10,
    };
    let ctx = Context::new(fsm, Arc::new(gateway_side));
    ctx.made_connection(false).await;

    let cmd = Command::new(
        Verb::RQ,
        Address::new(18, 730),
        Address::new(1, 222222),
        0x0008,
        "00".to_string(),
        true,
    );

    let err = ctx
        .send_cmd(cmd, None, None, None, SendPriority::Default)
        .await
        .expect_err("no echo ever arrives, command must fail");
    assert!(matches!(
        err,
        RamsesError::ProtocolEchoFailed | RamsesError::ProtocolWaitFailed
    ));
}
