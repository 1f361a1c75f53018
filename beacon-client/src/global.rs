//! Optional process-wide client.
//!
//! A thin holder around one [`Client`]; nothing else in the crate reads it.

use once_cell::sync::OnceCell;

use beacon_sync::Options;

use crate::client::Client;
use crate::error::ClientError;

static INSTANCE: OnceCell<Client> = OnceCell::new();

/// Build, install and start the process-wide client. Must be called inside
/// a tokio runtime.
pub fn init(options: Options) -> Result<&'static Client, ClientError> {
    if INSTANCE.get().is_some() {
        return Err(ClientError::AlreadyInitialized);
    }
    let client = install(Client::new(options)?)?;
    client.start()?;
    Ok(client)
}

/// Install an already-built client as the process-wide one.
pub fn install(client: Client) -> Result<&'static Client, ClientError> {
    INSTANCE
        .set(client)
        .map_err(|_| ClientError::AlreadyInitialized)?;
    instance()
}

pub fn instance() -> Result<&'static Client, ClientError> {
    INSTANCE.get().ok_or(ClientError::Uninitialized)
}
