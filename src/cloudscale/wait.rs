//! Status polling for freshly created servers.

use std::time::Instant;

use tokio::time::sleep;
use tracing::debug;

use crate::compute::{STATUS_RUNNING, Server};

use super::{CloudscaleClient, CloudscaleError};

impl CloudscaleClient {
    pub(super) async fn poll_until_running(&self, id: &str) -> Result<Server, CloudscaleError> {
        let deadline = Instant::now() + self.wait_timeout;

        while Instant::now() <= deadline {
            let server = self.fetch_server(id).await?;
            if server.status == STATUS_RUNNING {
                return Ok(server);
            }
            debug!(uuid = %id, status = %server.status, "waiting for server to run");
            sleep(self.poll_interval).await;
        }

        Err(CloudscaleError::Timeout {
            action: String::from("wait_until_running"),
            server_id: id.to_owned(),
        })
    }
}
