use crate::CollectError;
use chrono::{
    DateTime,
    Utc,
};
use guild_pulse_platform::Guild;
use std::{
    future::Future,
    pin::Pin,
};

pub type CollectFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CollectError>> + Send + 'a>>;

/// Produces one value per sampling cycle from the live state of a guild.
pub trait Collector {
    type Output;

    /// Collect for the resolved `guild`, stamping results with `at`.
    fn collect<'a>(&'a self, guild: &'a Guild, at: DateTime<Utc>) -> CollectFuture<'a, Self::Output>;

    /// Get the name of this collector
    fn name(&self) -> &'static str;
}
