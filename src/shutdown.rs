use actix_web::{dev::ServerHandle, web};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::worker::PipelineRunner;

/// Handles graceful shutdown of the application
///
/// On SIGTERM or SIGINT/CTRL+C the HTTP server stops accepting requests and
/// drains the ones in progress. Pipeline runs are detached and are not
/// waited for; the number still running is logged.
pub struct ShutdownCoordinator {
    server_handle: ServerHandle,
    server_task: JoinHandle<Result<(), std::io::Error>>,
    runner: web::Data<PipelineRunner>,
}

impl ShutdownCoordinator {
    pub fn new(
        server_handle: ServerHandle,
        server_task: JoinHandle<Result<(), std::io::Error>>,
        runner: web::Data<PipelineRunner>,
    ) -> Self {
        Self {
            server_handle,
            server_task,
            runner,
        }
    }

    /// Wait for a shutdown signal, then stop the server
    ///
    /// Returns early if the server task ends on its own before any signal.
    pub async fn wait_for_shutdown(mut self) -> Result<(), std::io::Error> {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for CTRL+C: {:?}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {:?}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received CTRL+C signal, initiating graceful shutdown...");
            }
            _ = terminate => {
                info!("Received SIGTERM signal, initiating graceful shutdown...");
            }
            joined = &mut self.server_task => {
                error!("HTTP server exited before any shutdown signal");
                let result = Self::server_result(joined);
                log_in_flight(&self.runner);
                return result;
            }
        }

        self.shutdown().await
    }

    fn server_result(
        joined: Result<Result<(), std::io::Error>, tokio::task::JoinError>,
    ) -> Result<(), std::io::Error> {
        match joined {
            Ok(Ok(())) => {
                info!("HTTP server shut down successfully");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("HTTP server encountered error: {:?}", e);
                Err(e)
            }
            Err(e) => {
                error!("HTTP server task panicked: {:?}", e);
                Err(std::io::Error::other(e))
            }
        }
    }

    async fn shutdown(self) -> Result<(), std::io::Error> {
        let Self {
            server_handle,
            server_task,
            runner,
        } = self;

        info!("Stopping HTTP server (no longer accepting new requests)...");
        server_handle.stop(true).await;

        let result = Self::server_result(server_task.await);
        log_in_flight(&runner);

        info!("Shutdown completed");
        result
    }
}

fn log_in_flight(runner: &PipelineRunner) {
    let in_flight = runner.in_flight();
    if in_flight > 0 {
        warn!("Exiting with {} pipeline run(s) still in flight", in_flight);
    }
}
