#![cfg(feature = "metrics")]
//! Tests for `wirepoll` metrics helpers.
//!
//! These tests verify that counters and gauges update as expected using
//! `metrics_util::debugging::DebuggingRecorder`.

use std::time::Duration;

use metrics::{SharedString, Unit};
use metrics_util::{
    CompositeKey,
    debugging::{DebugValue, DebuggingRecorder, Snapshotter},
};
use rstest::rstest;
use wirepoll::{
    Delivery,
    ELEMENTS_WRITTEN,
    ERRORS_TOTAL,
    EXCHANGES_ACTIVE,
    Element,
    Exchange,
    Message,
    ReplyWriter,
    WriteProgress,
};
use wirepoll_testing::ScriptedSink;

/// Creates a debugging recorder and snapshotter for metrics testing.
fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

/// One snapshot's worth of recorded metrics.
type Recorded = [(CompositeKey, Option<Unit>, Option<SharedString>, DebugValue)];

fn counter(metrics: &Recorded, name: &str, label: (&str, &str)) -> u64 {
    metrics
        .iter()
        .find_map(|(key, _, _, value)| {
            let matches = key.key().name() == name
                && key
                    .key()
                    .labels()
                    .any(|l| l.key() == label.0 && l.value() == label.1);
            match value {
                DebugValue::Counter(count) if matches => Some(*count),
                _ => None,
            }
        })
        .unwrap_or(0)
}

#[test]
fn written_elements_are_counted_by_kind() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        let (mut sink, _probe) = ScriptedSink::new();
        let mut writer = ReplyWriter::new(
            Delivery {
                messages: vec![Message::builder("/a").build(), Message::builder("/b").build()],
                replies: vec![Some(Message::builder("/meta/connect").build()), None],
                ..Delivery::default()
            },
            Duration::ZERO,
        );
        assert_eq!(
            writer.on_write_possible(&mut sink).expect("write succeeds"),
            WriteProgress::Complete
        );
    });

    let metrics = snapshotter.snapshot().into_vec();
    assert_eq!(
        counter(&metrics, ELEMENTS_WRITTEN, ("kind", Element::Message.as_str())),
        2
    );
    assert_eq!(
        counter(&metrics, ELEMENTS_WRITTEN, ("kind", Element::Reply.as_str())),
        1
    );
}

#[rstest]
#[case("parse")]
#[case("io")]
fn error_metric_is_labelled_by_kind(#[case] kind: &'static str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || wirepoll::metrics::inc_errors(kind));
    let metrics = snapshotter.snapshot().into_vec();
    assert_eq!(counter(&metrics, ERRORS_TOTAL, ("kind", kind)), 1);
}

#[test]
fn exchange_gauge_returns_to_zero() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        let (sink, _probe) = ScriptedSink::new();
        let mut exchange = Exchange::new(sink);
        exchange.complete();
    });

    let gauge = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .find_map(|(key, _, _, value)| match value {
            DebugValue::Gauge(g) if key.key().name() == EXCHANGES_ACTIVE => Some(g.into_inner()),
            _ => None,
        });
    assert_eq!(gauge, Some(0.0));
}
