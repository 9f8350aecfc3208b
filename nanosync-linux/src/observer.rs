//! The observability server: serves the current engine snapshot as JSON
//! over a unix socket, one snapshot per connection.

use std::os::unix::fs::PermissionsExt;

use nanosync::observability::ObservableState;
use tokio::{io::AsyncWriteExt, net::UnixListener, sync::watch};

use crate::config::ObservabilityConfig;

/// Serve snapshots until the channel closes. Does nothing when no
/// observation path is configured.
pub async fn observer_task(
    config: ObservabilityConfig,
    mut receiver: watch::Receiver<Option<ObservableState>>,
) {
    let Some(path) = config.observation_path else {
        return;
    };

    // A stale socket from a previous run would block the bind
    let _ = std::fs::remove_file(&path);

    let listener = match UnixListener::bind(&path) {
        Ok(listener) => listener,
        Err(error) => {
            log::error!(
                "could not create observation socket at {}: {error}",
                path.display()
            );
            return;
        }
    };

    if let Err(error) = std::fs::set_permissions(
        &path,
        std::fs::Permissions::from_mode(config.observation_permissions),
    ) {
        log::warn!(
            "could not set observation socket permissions on {}: {error}",
            path.display()
        );
    }

    log::info!("observation socket listening at {}", path.display());

    loop {
        let (mut stream, _) = match listener.accept().await {
            Ok(connection) => connection,
            Err(error) => {
                log::warn!("observation socket accept failed: {error}");
                continue;
            }
        };

        let snapshot = *receiver.borrow_and_update();
        let Some(snapshot) = snapshot else {
            // No state yet; the observer gets an empty document
            let _ = stream.write_all(b"{}\n").await;
            continue;
        };

        match serde_json::to_vec_pretty(&snapshot) {
            Ok(mut body) => {
                body.push(b'\n');
                if let Err(error) = stream.write_all(&body).await {
                    log::debug!("could not write observation: {error}");
                }
            }
            Err(error) => log::warn!("could not serialize observation: {error}"),
        }
    }
}
