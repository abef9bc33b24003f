//! Dispatch of single items into named buffers owned by an external service.

use super::errors::BufferError;
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq)]
pub struct BufferItem<D> {
    pub ch_name: String,
    pub data: D,
}

pub trait Buffer<D>: Send + Sync {
    fn add_item(&self, item: BufferItem<D>) -> Result<(), BufferError>;
}

/// Lookup of live buffers by name.
pub trait BufferRegistry<D> {
    fn instance(&self, name: &str) -> Result<Arc<dyn Buffer<D>>, BufferError>;
}

/// Adds `data` to channel `ch_name` of the buffer registered as `buffer_name`.
pub fn send_one_ch<D, R>(
    registry: &R,
    buffer_name: &str,
    ch_name: &str,
    data: D,
) -> Result<(), BufferError>
where
    R: BufferRegistry<D> + ?Sized,
{
    let buffer = registry.instance(buffer_name).inspect_err(|err| {
        error!(buffer = buffer_name, error = %err, "buffer lookup failed");
    })?;

    buffer
        .add_item(BufferItem {
            ch_name: ch_name.to_owned(),
            data,
        })
        .inspect_err(|err| {
            error!(
                buffer = buffer_name,
                channel = ch_name,
                error = %err,
                "adding buffer item failed"
            );
        })?;

    debug!(buffer = buffer_name, channel = ch_name, "buffer item added");
    Ok(())
}
