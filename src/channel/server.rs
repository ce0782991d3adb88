use crate::channel::acl::{AclGate, AclPolicy, capture_peer};
use crate::channel::handlers::{ChannelState, routes};
use crate::error::{Error, Result};
use actix_web::{App, HttpServer, dev::ServerHandle, middleware, web::Data};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Socket file mode: owner and group may connect.
const SOCKET_MODE: u32 = 0o660;

/// The command channel bound to a Unix socket.
pub struct CommandChannel;

impl CommandChannel {
    /// Binds `socket` and serves the channel in the background.
    ///
    /// A stale socket file at `socket` is removed first.
    #[tracing::instrument(skip(state, policy), fields(socket = %socket.display()))]
    pub fn start(
        socket: &Path,
        state: ChannelState,
        policy: Arc<AclPolicy>,
    ) -> Result<CommandChannelHandle> {
        remove_stale_socket(socket)?;

        let state = Data::new(state);
        let server = HttpServer::new(move || {
            App::new()
                .wrap(AclGate::new(policy.clone()))
                .wrap(middleware::Logger::default())
                .app_data(state.clone())
                .configure(routes)
        })
        .workers(1)
        .on_connect(capture_peer)
        .disable_signals()
        .bind_uds(socket)
        .map_err(|e| Error::Other(format!("Failed to bind {}: {}", socket.display(), e)))?
        .run();

        std::fs::set_permissions(socket, std::fs::Permissions::from_mode(SOCKET_MODE))?;

        let handle = server.handle();
        let task = tokio::spawn(async move {
            if let Err(e) = server.await {
                tracing::error!(error = %e, "Command channel failed");
            }
        });
        tracing::info!("Command channel listening");

        Ok(CommandChannelHandle {
            socket: socket.to_path_buf(),
            handle,
            task,
        })
    }
}

fn remove_stale_socket(socket: &Path) -> Result<()> {
    match std::fs::remove_file(socket) {
        Ok(()) => {
            tracing::debug!("Removed stale socket");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Handle to stop a running command channel.
pub struct CommandChannelHandle {
    socket: PathBuf,
    handle: ServerHandle,
    task: JoinHandle<()>,
}

impl CommandChannelHandle {
    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Stops accepting, lets in-flight requests finish and removes the socket.
    pub async fn shutdown(self) {
        self.handle.stop(true).await;
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Command channel task failed");
        }
        if let Err(e) = remove_stale_socket(&self.socket) {
            tracing::warn!(error = %e, "Cannot remove command socket");
        }
        tracing::info!("Command channel stopped");
    }
}
