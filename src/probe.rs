//! Startup reachability probe.

use crate::client::{ClientError, ClientResult};
use tokio_tungstenite::connect_async;

/// Attempt one WebSocket connection to the target and close it again.
///
/// Run before any round: an unreachable server fails the whole run up front
/// instead of leaving the first ramp-up burning through reconnect budgets.
pub async fn check_server(url: &str) -> ClientResult<()> {
    match connect_async(url).await {
        Ok((mut stream, _response)) => {
            let _ = stream.close(None).await;
            Ok(())
        }
        Err(err) => Err(ClientError::ConnectFailed(err.to_string())),
    }
}
