use std::time::Duration;

use tokio::sync::broadcast::{self, Receiver, Sender};

use crate::runtime;

/// Provides functionality for message passing between server selection
/// operations and the monitoring background tasks.
#[derive(Clone, Debug)]
pub(crate) struct ClusterMessageManager {
    cluster_change_notifier: Sender<()>,
}

impl ClusterMessageManager {
    pub(super) fn new() -> Self {
        let (cluster_change_notifier, _) = broadcast::channel(1);

        Self {
            cluster_change_notifier,
        }
    }

    /// Notifies the server selection operations that the cluster description
    /// has changed. This should be called after every applied update.
    pub(super) fn notify_cluster_changed(&self) {
        let _: std::result::Result<_, _> = self.cluster_change_notifier.send(());
    }

    /// Subscribe to change notifications. A notification sent any time after
    /// this call is buffered for the subscriber, so checking the description
    /// and then waiting on the subscriber cannot miss an update in between.
    pub(super) fn subscribe_to_cluster_changes(&self) -> ClusterMessageSubscriber {
        ClusterMessageSubscriber::new(self.cluster_change_notifier.subscribe())
    }
}

pub(crate) struct ClusterMessageSubscriber {
    receiver: Receiver<()>,
}

impl ClusterMessageSubscriber {
    fn new(receiver: Receiver<()>) -> Self {
        Self { receiver }
    }

    /// Waits for either `timeout` to elapse or a message to be received.
    /// Returns true if a message was received, false for a timeout.
    pub(crate) async fn wait_for_message(&mut self, timeout: Duration) -> bool {
        runtime::timeout(timeout, self.receiver.recv()).await.is_ok()
    }
}
