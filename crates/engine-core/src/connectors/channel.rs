use crate::{
    coldswap::{Coldswap, ResourceFactory},
    error::ChannelError,
};
use async_trait::async_trait;
use model::{execution::outcome::WriteOutcome, records::row::ParsedRow};
use std::sync::Arc;

/// A session bound to the destination table.
///
/// A channel reports every row it was given: rows not listed in a
/// `PartialFailures` outcome were durably accepted, and a `ChannelInvalid`
/// outcome means nothing from that call was. Once a channel has reported
/// `ChannelInvalid` it must not be written to again.
#[async_trait]
pub trait WriteChannel: Send + Sync {
    async fn write(&self, rows: &[ParsedRow]) -> Result<WriteOutcome, ChannelError>;
}

pub type Channel = Box<dyn WriteChannel>;

/// Opens and closes channels for a [`Coldswap`].
pub type ChannelFactory = dyn ResourceFactory<Resource = Channel, Error = ChannelError>;

/// The single live channel shared by every upload task.
pub type ChannelSwap = Coldswap<Arc<ChannelFactory>>;
