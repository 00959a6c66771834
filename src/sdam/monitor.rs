use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use bson::Document;
use tokio::sync::broadcast;

use super::{
    cluster::WeakCluster,
    description::server::{ServerDescription, ServerType},
};
use crate::{
    error::Result,
    event::{
        SdamEventHandler,
        ServerHeartbeatFailedEvent,
        ServerHeartbeatStartedEvent,
        ServerHeartbeatSucceededEvent,
    },
    is_master::IsMasterCommandResponse,
    options::{ClusterSettings, ServerAddress},
    pool::{ConnectionPool, Socket},
    runtime,
};

/// The minimum amount of time a monitor waits between consecutive checks,
/// even when checks are requested on demand. Bounds the rate at which a
/// flood of selection attempts can probe a server.
pub(crate) const MIN_HEARTBEAT_FREQUENCY: Duration = Duration::from_millis(500);

/// Background task that determines the status of one server by running
/// `ismaster` checks periodically or on demand, delivering each result to
/// the cluster.
///
/// The monitor's pool is exclusively its own; application traffic uses a
/// separate pool owned by the `Server`. The cluster is held weakly so that a
/// cluster dropped without `close` lets its monitors observe the dead
/// reference and shut themselves down.
pub(crate) struct Monitor {
    address: ServerAddress,
    server_description: ServerDescription,
    cluster: WeakCluster,
    pool: Arc<dyn ConnectionPool>,
    settings: ClusterSettings,
    stopped: Arc<AtomicBool>,
    check_requests: CheckRequestReceiver,
}

impl Monitor {
    /// Spawn a monitor for `address` and return the handle used to poke and
    /// stop it.
    pub(crate) fn start(
        address: ServerAddress,
        cluster: WeakCluster,
        pool: Arc<dyn ConnectionPool>,
        settings: ClusterSettings,
    ) -> MonitorHandle {
        let stopped = Arc::new(AtomicBool::new(false));
        let (check_requester, check_request_receiver) = broadcast::channel(1);

        let handle = MonitorHandle {
            stopped: stopped.clone(),
            check_requester,
            pool: pool.clone(),
        };

        let monitor = Monitor {
            server_description: ServerDescription::new(address.clone()),
            address,
            cluster,
            pool,
            settings,
            stopped,
            check_requests: CheckRequestReceiver {
                receiver: check_request_receiver,
            },
        };
        runtime::spawn(monitor.execute());

        handle
    }

    async fn execute(mut self) {
        let heartbeat_frequency = self.settings.heartbeat_frequency();

        while !self.stopped.load(Ordering::SeqCst) {
            // Requests that arrived while a check was already underway are
            // satisfied by that check.
            self.check_requests.clear_check_requests();

            let server_description = self.check_with_retry().await;
            self.server_description = server_description.clone();

            match self.cluster.upgrade() {
                Some(cluster) => cluster.on_change(server_description).await,
                None => {
                    // The cluster was dropped without being closed.
                    self.pool.reset().await;
                    break;
                }
            }

            runtime::delay_for(MIN_HEARTBEAT_FREQUENCY).await;
            self.check_requests
                .wait_for_check_request(heartbeat_frequency.saturating_sub(MIN_HEARTBEAT_FREQUENCY))
                .await;
        }
    }

    /// Check the server once or twice, producing a description of what was
    /// learned. Each failed attempt has the cluster reset the server's
    /// application pool so broken connections are purged. A server that was
    /// available on the last check gets one retry before being reported
    /// unknown.
    async fn check_with_retry(&mut self) -> ServerDescription {
        let retry = self.server_description.server_type() != ServerType::Unknown;

        if let Some(description) = self.check_once().await {
            return description;
        }
        self.reset_application_pool().await;

        if retry {
            if let Some(description) = self.check_once().await {
                return description;
            }
            self.reset_application_pool().await;
        }

        ServerDescription::new(self.address.clone())
    }

    /// A single attempt to check the server. Returns `None` if a socket
    /// couldn't be acquired or the call failed.
    async fn check_once(&mut self) -> Option<ServerDescription> {
        let mut socket = match self.pool.get_socket().await {
            Ok(socket) => socket,
            Err(_) => return None,
        };

        self.emit_event(|handler| {
            handler.handle_server_heartbeat_started_event(ServerHeartbeatStartedEvent {
                server_address: self.address.clone(),
            })
        });

        let start = Instant::now();
        let reply_result = self.run_is_master(socket.as_mut()).await;
        let round_trip_time = start.elapsed();

        let check_result = reply_result.and_then(|reply| self.parse_reply(reply, round_trip_time));
        let description = match check_result {
            Ok((description, reply)) => {
                self.emit_event(|handler| {
                    handler.handle_server_heartbeat_succeeded_event(
                        ServerHeartbeatSucceededEvent {
                            duration: round_trip_time,
                            reply,
                            server_address: self.address.clone(),
                        },
                    )
                });
                Some(description)
            }
            Err(error) => {
                socket.close().await;
                self.emit_event(|handler| {
                    handler.handle_server_heartbeat_failed_event(ServerHeartbeatFailedEvent {
                        duration: round_trip_time,
                        failure: error.clone(),
                        server_address: self.address.clone(),
                    })
                });
                None
            }
        };

        self.pool.maybe_return_socket(socket).await;
        description
    }

    async fn run_is_master(&self, socket: &mut dyn Socket) -> Result<Document> {
        let query = self.settings.message_codec.is_master_query()?;
        socket.send_message(&query.bytes).await?;
        let response = socket.receive_message(query.request_id).await?;
        self.settings.message_codec.decode_reply(&response)
    }

    fn parse_reply(
        &self,
        reply: Document,
        round_trip_time: Duration,
    ) -> Result<(ServerDescription, Document)> {
        let response = IsMasterCommandResponse::parse(reply.clone())?;
        let description = ServerDescription::from_is_master(
            self.address.clone(),
            &response,
            round_trip_time,
            self.server_description.round_trip_times(),
        )?;
        Ok((description, reply))
    }

    async fn reset_application_pool(&self) {
        if let Some(cluster) = self.cluster.upgrade() {
            cluster.reset_pool(&self.address).await;
        }
    }

    fn emit_event(&self, emit: impl FnOnce(&Arc<dyn SdamEventHandler>)) {
        if let Some(ref handler) = self.settings.sdam_event_handler {
            emit(handler);
        }
    }
}

/// Control handle to a running [`Monitor`], owned by its `Server`.
#[derive(Debug)]
pub(crate) struct MonitorHandle {
    stopped: Arc<AtomicBool>,
    check_requester: broadcast::Sender<()>,
    pool: Arc<dyn ConnectionPool>,
}

impl MonitorHandle {
    /// Wake the monitor so that its next action is an immediate check
    /// rather than waiting out its heartbeat.
    pub(crate) fn request_check(&self) {
        let _: std::result::Result<_, _> = self.check_requester.send(());
    }

    /// Stop the monitor: mark it stopped, reset its pool (aborting a check
    /// that is mid-I/O), and wake it so it exits. The pool reset runs off
    /// task, so this is safe to call while holding the cluster lock.
    pub(crate) fn close(&self) {
        self.stopped.store(true, Ordering::SeqCst);

        let pool = self.pool.clone();
        let check_requester = self.check_requester.clone();
        runtime::spawn(async move {
            pool.reset().await;
            let _: std::result::Result<_, _> = check_requester.send(());
        });
    }
}

struct CheckRequestReceiver {
    receiver: broadcast::Receiver<()>,
}

impl CheckRequestReceiver {
    fn clear_check_requests(&mut self) {
        while self.receiver.try_recv().is_ok() {}
    }

    async fn wait_for_check_request(&mut self, timeout: Duration) {
        let _: Result<_> = runtime::timeout(timeout, self.receiver.recv()).await;
    }
}
