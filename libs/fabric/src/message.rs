use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::error::Result;

/// A message delivered by the broker.
///
/// The delivery tag identifies this delivery on the channel that received it
/// and is what an ack refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub exchange: String,
    pub routing_key: String,
    pub redelivered: bool,
    pub payload: Vec<u8>,
}

impl Delivery {
    pub fn new(
        delivery_tag: u64,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            delivery_tag,
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            redelivered: false,
            payload,
        }
    }

    /// Decode the payload with the given codec
    pub fn decode<T, C>(&self, codec: &C) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
        C: Codec,
    {
        codec.decode(&self.payload)
    }
}

/// A payload ready to be handed to the broker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outgoing {
    pub exchange: String,
    pub routing_key: String,
    pub content_type: &'static str,
    pub payload: Vec<u8>,
}
