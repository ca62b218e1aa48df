//! End-to-end exchange tests driven by scripted bodies and sinks.

mod common;

use std::{io, sync::Arc, time::Duration};

use common::{acknowledge, echo, post, post_with_charset};
use rstest::rstest;
use serial_test::serial;
use wirepoll::{
    Delivery,
    Dispatch,
    DispatchContext,
    JSON_CONTENT_TYPE,
    LongPollTransport,
    Message,
    Outcome,
    Suspension,
    TransportConfig,
    Wakeup,
};
use wirepoll_testing::{
    BodyCall,
    BodyStep,
    LoggerHandle,
    RecordingSession,
    ScriptedBody,
    ScriptedSink,
    logger,
};

const CONNECT: &[u8] = br#"[{"channel":"/meta/connect","clientId":"c1"}]"#;

fn delivering(
    session: Arc<RecordingSession>,
    start_interval: bool,
) -> impl Fn(&DispatchContext, Vec<Message>) -> Dispatch + Send + Sync + 'static {
    move |_ctx: &DispatchContext, messages: Vec<Message>| {
        Dispatch::Reply(Delivery {
            session: Some(session.clone()),
            start_interval,
            messages: vec![
                Message::builder("/chat").data("one").build(),
                Message::builder("/chat").data("two").build(),
            ],
            replies: acknowledge(&messages),
        })
    }
}

#[tokio::test]
async fn readiness_is_always_checked_before_end_of_body() {
    let transport = LongPollTransport::new(echo)
        .with_config(TransportConfig::default().read_chunk_size(4));
    let mut body = ScriptedBody::stalling([&CONNECT[..10], &CONNECT[10..]]);
    let (sink, probe) = ScriptedSink::new();

    assert_eq!(transport.handle(post(), &mut body, sink).await, Outcome::Replied);
    assert_eq!(
        probe.text(),
        r#"[{"channel":"/meta/connect","successful":true}]"#
    );

    let calls = body.calls();
    for (index, call) in calls.iter().enumerate() {
        if *call == BodyCall::IsFinished {
            assert_eq!(
                calls.get(index.wrapping_sub(1)),
                Some(&BodyCall::IsReady),
                "is_finished not preceded by is_ready: {calls:?}"
            );
        }
    }
    assert_eq!(
        calls.iter().filter(|call| **call == BodyCall::Read).count(),
        10_usize.div_ceil(4) + (CONNECT.len() - 10).div_ceil(4),
        "one read per chunk-sized slice: {calls:?}"
    );
}

#[tokio::test]
async fn read_failure_answers_500_without_body() {
    let transport = LongPollTransport::new(echo);
    let mut body = ScriptedBody::new([
        BodyStep::chunk(&CONNECT[..5]),
        BodyStep::Fail(io::ErrorKind::ConnectionReset),
    ]);
    let (sink, probe) = ScriptedSink::new();

    assert_eq!(
        transport.handle(post(), &mut body, sink).await,
        Outcome::Failed("io")
    );
    assert_eq!(probe.status(), 500);
    assert!(probe.chunks().is_empty());
    assert_eq!(probe.completions(), 1);
}

#[tokio::test]
async fn stalled_sink_still_produces_the_whole_array() {
    let transport = LongPollTransport::new(echo);
    let mut body = ScriptedBody::stalling([br#"[{"channel":"/a"},{"channel":"/b"},{"channel":"/c"}]"#]);
    let (sink, probe) = ScriptedSink::new();
    let sink = sink.with_readiness([false, true, false, false]);

    assert_eq!(transport.handle(post(), &mut body, sink).await, Outcome::Replied);
    assert_eq!(
        probe.text(),
        r#"[{"channel":"/a","successful":true},{"channel":"/b","successful":true},{"channel":"/c","successful":true}]"#
    );
    assert_eq!(probe.chunks().len(), 3);
    assert_eq!(probe.completions(), 1);
    assert_eq!(probe.content_type(), Some(JSON_CONTENT_TYPE));
}

#[tokio::test]
async fn write_failure_completes_the_exchange_once() {
    let session = RecordingSession::connected(1);
    let transport = LongPollTransport::new(delivering(session.clone(), true));
    let mut body = ScriptedBody::stalling([CONNECT]);
    let (sink, probe) = ScriptedSink::new();

    let outcome = transport
        .handle(post(), &mut body, sink.failing_on_write(1))
        .await;

    assert_eq!(outcome, Outcome::Failed("io"));
    assert_eq!(probe.chunks().len(), 1);
    assert_eq!(probe.completions(), 1);
    assert_eq!(session.arms(), 1, "a failing client stays sweepable");
}

#[rstest]
#[case::requested(true, true, 1)]
#[case::not_requested(false, true, 0)]
#[case::disconnected(true, false, 0)]
#[tokio::test]
async fn interval_is_armed_at_most_once(
    #[case] start_interval: bool,
    #[case] connected: bool,
    #[case] expected: usize,
) {
    let session = if connected {
        RecordingSession::connected(2)
    } else {
        RecordingSession::disconnected(2)
    };
    let interval = Duration::from_millis(750);
    let transport = LongPollTransport::new(delivering(session.clone(), start_interval))
        .with_config(TransportConfig::default().interval(interval));
    let mut body = ScriptedBody::stalling([CONNECT]);
    let (sink, probe) = ScriptedSink::new();
    let sink = sink.with_readiness([false; 8]);

    assert_eq!(transport.handle(post(), &mut body, sink).await, Outcome::Replied);
    assert_eq!(session.arms(), expected);
    if expected > 0 {
        assert_eq!(session.intervals(), [interval]);
    }
    assert!(probe.text().starts_with(r#"[{"channel":"/chat","data":"one"}"#));
}

#[tokio::test(start_paused = true)]
async fn suspended_exchange_times_out_with_replies() {
    let session = RecordingSession::connected(3);
    let held = session.clone();
    let transport = LongPollTransport::new(move |_ctx: &DispatchContext, messages: Vec<Message>| {
        Dispatch::Suspend(Suspension {
            session: held.clone(),
            replies: acknowledge(&messages),
            timeout: Some(Duration::from_secs(20)),
        })
    })
    .with_config(TransportConfig::default().interval(Duration::from_secs(3)));
    let mut body = ScriptedBody::stalling([CONNECT]);
    let (sink, probe) = ScriptedSink::new();

    let started = tokio::time::Instant::now();
    assert_eq!(
        transport.handle(post(), &mut body, sink).await,
        Outcome::Resumed(Wakeup::Expired)
    );
    assert!(started.elapsed() >= Duration::from_secs(20));
    assert_eq!(
        probe.text(),
        r#"[{"channel":"/meta/connect","successful":true}]"#
    );
    assert_eq!(session.intervals(), [Duration::from_secs(3)]);
    assert!(!session.has_scheduler());
}

#[tokio::test]
async fn utf16_body_is_decoded_after_the_last_fragment() {
    let transport = LongPollTransport::new(echo);
    let text = r#"[{"channel":"/ü"}]"#;
    let bytes: Vec<u8> = text.encode_utf16().flat_map(u16::to_be_bytes).collect();
    // Split inside a code unit so the buffered strategy is required.
    let mut body = ScriptedBody::stalling([&bytes[..3], &bytes[3..]]);
    let (sink, probe) = ScriptedSink::new();

    assert_eq!(
        transport
            .handle(post_with_charset("UTF-16BE"), &mut body, sink)
            .await,
        Outcome::Replied
    );
    assert_eq!(probe.text(), r#"[{"channel":"/ü","successful":true}]"#);
}

#[rstest]
#[serial(transport_logs)]
#[tokio::test]
async fn parse_failures_are_logged(mut logger: LoggerHandle) {
    logger.clear();
    let transport = LongPollTransport::new(echo);
    let mut body = ScriptedBody::stalling([b"[{]"]);
    let (sink, probe) = ScriptedSink::new();

    assert_eq!(
        transport.handle(post(), &mut body, sink).await,
        Outcome::Failed("parse")
    );
    assert_eq!(probe.status(), 500);
    let messages = logger.messages_containing("exchange failed");
    assert!(
        messages.iter().any(|m| m.contains("kind=parse")),
        "parse failure not logged: {messages:?}"
    );
}
