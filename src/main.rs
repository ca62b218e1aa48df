//! Demo binary serving one long-poll exchange in memory.
//!
//! The request body is fed to the transport in small chunks and the
//! response is printed part by part as the transport writes it.

mod cli;

use std::{process::ExitCode, sync::Arc, time::Duration};

use bytes::Bytes;
use clap::Parser;
use log::{info, warn};
use wirepoll::{
    BatchProcessor,
    ClientSession,
    Delivery,
    Dispatch,
    DispatchContext,
    LongPollTransport,
    Message,
    Outcome,
    RequestHead,
    ResponsePart,
    Session,
    SessionId,
    Suspension,
    TransportConfig,
    io::{DEFAULT_BODY_CHANNEL_CAPACITY, body_channel, response_channel},
};

const CONNECT_CHANNEL: &str = "/meta/connect";

/// Acknowledges every message and holds `/meta/connect` when asked to.
struct DemoProcessor {
    session: Arc<ClientSession>,
    hold_connect: bool,
}

impl BatchProcessor for DemoProcessor {
    fn process(&self, _ctx: &DispatchContext, messages: Vec<Message>) -> Dispatch {
        let replies = messages
            .iter()
            .map(|message| {
                let mut reply = Message::builder(message.channel().unwrap_or_default()).successful(true);
                if let Some(id) = message.id() {
                    reply = reply.id(id);
                }
                Some(reply.build())
            })
            .collect();
        let connect = messages
            .iter()
            .any(|message| message.channel() == Some(CONNECT_CHANNEL));
        if self.hold_connect && connect {
            Dispatch::Suspend(Suspension {
                session: self.session.clone(),
                replies,
                timeout: None,
            })
        } else {
            Dispatch::Reply(Delivery {
                session: Some(self.session.clone()),
                start_interval: connect,
                messages: self.session.take_queue(),
                replies,
            })
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Enable structured logging for the demo.
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    install_metrics(&cli);

    let session = ClientSession::new(SessionId::new(1));
    let config = TransportConfig::default()
        .timeout(Duration::from_millis(cli.timeout_ms))
        .interval(Duration::from_millis(cli.interval_ms));
    let transport = LongPollTransport::new(DemoProcessor {
        session: Arc::clone(&session),
        hold_connect: cli.publish.is_some(),
    })
    .with_config(config);

    let head = RequestHead::post("/cometd")
        .with_content_type(format!("application/json;charset={}", cli.charset));
    if !transport.accept(&head) {
        warn!("request rejected: method={}", head.method());
        return ExitCode::FAILURE;
    }

    let (tx, body) = body_channel(DEFAULT_BODY_CHANNEL_CAPACITY);
    let (sink, mut rx) = response_channel(cli.high_water);
    let exchange = transport.spawn(head, body, sink);

    let payload = Bytes::from(cli.body.into_bytes());
    let chunk_size = cli.chunk_size.max(1);
    tokio::spawn(async move {
        let mut offset = 0;
        while offset < payload.len() {
            let end = (offset + chunk_size).min(payload.len());
            if tx.send(Ok(payload.slice(offset..end))).await.is_err() {
                break;
            }
            offset = end;
        }
    });

    if let Some(data) = cli.publish {
        let delay = Duration::from_millis(cli.publish_after_ms);
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            session.deliver(Message::builder("/demo").data(data).build());
        });
    }

    while let Some(part) = rx.recv().await {
        match part {
            ResponsePart::Head {
                status,
                content_type,
            } => println!("{status} {}", content_type.unwrap_or("-")),
            ResponsePart::Body(bytes) => print!("{}", String::from_utf8_lossy(&bytes)),
        }
    }
    println!();

    let outcome = exchange.await.ok().flatten();
    transport.shutdown().await;
    info!(
        "exchange finished: outcome={outcome:?}, interval_arms={}",
        session.interval_arms()
    );
    match outcome {
        Some(Outcome::Replied | Outcome::Resumed(_)) => ExitCode::SUCCESS,
        Some(Outcome::Failed(_)) | None => ExitCode::FAILURE,
    }
}

#[cfg(feature = "metrics")]
fn install_metrics(cli: &cli::Cli) {
    if let Some(addr) = cli.metrics_addr
        && let Err(e) = wirepoll::metrics::install_prometheus(addr)
    {
        warn!("failed to install Prometheus exporter: addr={addr}, error={e}");
    }
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(cli: &cli::Cli) {
    if let Some(addr) = cli.metrics_addr {
        warn!("metrics feature disabled, ignoring --metrics-addr {addr}");
    }
}

#[cfg(test)]
mod tests {
    use wirepoll::transport::NAME;

    use super::*;

    fn context() -> DispatchContext {
        DispatchContext::new(
            NAME,
            TransportConfig::default(),
            Arc::new(RequestHead::post("/cometd")),
        )
    }

    fn connect() -> Vec<Message> { vec![Message::builder(CONNECT_CHANNEL).id("1").build()] }

    #[test]
    fn queued_messages_are_delivered_with_the_reply() {
        let session = ClientSession::new(SessionId::new(1));
        session.deliver(Message::builder("/demo").data("hi").build());
        let processor = DemoProcessor {
            session: Arc::clone(&session),
            hold_connect: false,
        };

        let Dispatch::Reply(delivery) = processor.process(&context(), connect()) else {
            panic!("connect should be answered immediately");
        };
        assert_eq!(delivery.messages.len(), 1);
        assert_eq!(delivery.replies.len(), 1);
        assert!(delivery.start_interval);
        assert_eq!(session.queued(), 0);
    }

    #[test]
    fn connect_is_held_when_publishing() {
        let session = ClientSession::new(SessionId::new(2));
        let processor = DemoProcessor {
            session,
            hold_connect: true,
        };
        assert!(matches!(
            processor.process(&context(), connect()),
            Dispatch::Suspend(_)
        ));
    }
}
