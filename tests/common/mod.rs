//! Shared processors and request helpers for integration tests.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use wirepoll::{Delivery, Dispatch, DispatchContext, Message, RequestHead};

/// Reply to every message with a successful acknowledgement on its channel.
pub fn acknowledge(messages: &[Message]) -> Vec<Option<Message>> {
    messages
        .iter()
        .map(|message| {
            Some(
                Message::builder(message.channel().unwrap_or_default())
                    .successful(true)
                    .build(),
            )
        })
        .collect()
}

/// Processor answering each batch immediately with acknowledgements.
pub fn echo(_ctx: &DispatchContext, messages: Vec<Message>) -> Dispatch {
    Dispatch::Reply(Delivery {
        replies: acknowledge(&messages),
        ..Delivery::default()
    })
}

/// A `POST` request to the usual endpoint.
pub fn post() -> RequestHead { RequestHead::post("/cometd") }

/// A `POST` request declaring `charset`.
pub fn post_with_charset(charset: &str) -> RequestHead {
    post().with_content_type(format!("application/json;charset={charset}"))
}
