use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::{Error, Result};
use crate::transport::{CreateTableParams, TableDescription, Transport};

/// Delay between describe calls while a table is being created.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

/// Wait for a table to become active, creating it first if it does not exist.
///
/// Describes the table; on "not found" issues `create`, then re-describes every
/// `poll_interval` until the status is `ACTIVE`. Any other transport error ends
/// the wait. Cancelling `cancel` stops the timer and returns [`Error::Cancelled`].
pub async fn wait_for_table_active(
    transport: &dyn Transport,
    create: &CreateTableParams,
    poll_interval: Duration,
    cancel: &CancellationToken,
) -> Result<TableDescription> {
    let table = create.table_name.as_str();

    let mut description = match transport.describe_table(table).await {
        Ok(description) => description,
        Err(e) if e.is_not_found() => {
            info!(table, "table not found, creating it");
            transport.create_table(create.clone()).await?
        }
        Err(e) => return Err(e.into()),
    };

    let mut polls = 0u32;
    while !description.is_active() {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(table, polls, "stopped waiting for table");
                return Err(Error::Cancelled);
            }
            _ = tokio::time::sleep(poll_interval) => {}
        }
        polls += 1;
        description = transport.describe_table(table).await?;
        debug!(table, polls, status = description.status.as_str(), "polled table status");
    }

    info!(table, polls, "table is active");
    Ok(description)
}
