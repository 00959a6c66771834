use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use bson::{doc, Document};

use super::{Cluster, ClusterType, ServerDescription, ServerType};
use crate::{
    error::{ErrorKind, Result},
    event::{SdamEventHandler, ServerHeartbeatStartedEvent, ServerHeartbeatSucceededEvent},
    message::{MessageCodec, Query},
    options::{ClusterSettings, ServerAddress},
    pool::{ConnectionPool, PoolFactory, Socket},
    runtime,
    selection_criteria::SelectionCriteria,
};

#[derive(Debug, Clone)]
enum Behavior {
    Reply(Document),
    Fail,
}

/// A scriptable stand-in for the deployment: maps each host to the reply
/// its sockets should produce, and counts pool resets per host.
#[derive(Debug, Default)]
struct MockNetwork {
    behaviors: Mutex<HashMap<String, Behavior>>,
    resets: Mutex<HashMap<String, usize>>,
}

impl MockNetwork {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn reply(&self, host: &str, reply: Document) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(host.to_string(), Behavior::Reply(reply));
    }

    fn fail(&self, host: &str) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(host.to_string(), Behavior::Fail);
    }

    fn resets(&self, host: &str) -> usize {
        self.resets.lock().unwrap().get(host).copied().unwrap_or(0)
    }
}

fn pool_factory(network: &Arc<MockNetwork>) -> PoolFactory {
    let network = network.clone();
    Arc::new(move |address: &ServerAddress| {
        Arc::new(MockPool {
            host: address.host().to_string(),
            network: network.clone(),
        }) as Arc<dyn ConnectionPool>
    })
}

#[derive(Debug)]
struct MockPool {
    host: String,
    network: Arc<MockNetwork>,
}

#[async_trait]
impl ConnectionPool for MockPool {
    async fn get_socket(&self) -> Result<Box<dyn Socket>> {
        let behavior = self.network.behaviors.lock().unwrap().get(&self.host).cloned();
        match behavior {
            Some(Behavior::Reply(reply)) => Ok(Box::new(MockSocket { reply })),
            Some(Behavior::Fail) | None => {
                Err(ErrorKind::from(std::io::ErrorKind::ConnectionRefused).into())
            }
        }
    }

    async fn maybe_return_socket(&self, _socket: Box<dyn Socket>) {}

    async fn reset(&self) {
        *self
            .network
            .resets
            .lock()
            .unwrap()
            .entry(self.host.clone())
            .or_default() += 1;
    }
}

#[derive(Debug)]
struct MockSocket {
    reply: Document,
}

#[async_trait]
impl Socket for MockSocket {
    async fn send_message(&mut self, _message: &[u8]) -> Result<()> {
        Ok(())
    }

    async fn receive_message(&mut self, _response_to: i32) -> Result<Vec<u8>> {
        bson::to_vec(&self.reply).map_err(|e| {
            ErrorKind::Internal {
                message: e.to_string(),
            }
            .into()
        })
    }

    async fn close(&mut self) {}
}

#[derive(Debug)]
struct MockCodec;

impl MessageCodec for MockCodec {
    fn is_master_query(&self) -> Result<Query> {
        Ok(Query {
            request_id: 0,
            bytes: Vec::new(),
        })
    }

    fn decode_reply(&self, response: &[u8]) -> Result<Document> {
        Ok(bson::from_slice(response)?)
    }
}

fn address(s: &str) -> ServerAddress {
    ServerAddress::parse(s).unwrap()
}

fn settings(network: &Arc<MockNetwork>, seeds: &[&str]) -> ClusterSettings {
    settings_with(network, seeds, None)
}

fn settings_with(
    network: &Arc<MockNetwork>,
    seeds: &[&str],
    set_name: Option<&str>,
) -> ClusterSettings {
    ClusterSettings {
        seeds: seeds.iter().map(|s| address(s)).collect(),
        set_name: set_name.map(String::from),
        heartbeat_frequency: None,
        server_selection_timeout: None,
        pool_factory: pool_factory(network),
        message_codec: Arc::new(MockCodec),
        sdam_event_handler: None,
    }
}

const SELECTION_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn discovers_standalone_and_selects_it() {
    let network = MockNetwork::new();
    network.reply("a", doc! { "ok": 1, "ismaster": true });

    let cluster = Cluster::new(settings(&network, &["a"])).unwrap();
    cluster.open().await.unwrap();

    let servers = cluster
        .select_servers(&SelectionCriteria::Writable, SELECTION_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].address(), &address("a"));
    assert_eq!(servers[0].description().server_type(), ServerType::Standalone);

    let description = cluster.description().await;
    assert_eq!(description.cluster_type(), ClusterType::Single);

    cluster.close().await.unwrap();
}

#[tokio::test]
async fn discovers_secondary_through_primary_host_list() {
    let network = MockNetwork::new();
    network.reply(
        "a",
        doc! { "ok": 1, "ismaster": true, "setName": "rs", "hosts": ["a", "b"] },
    );
    network.reply(
        "b",
        doc! { "ok": 1, "secondary": true, "setName": "rs", "hosts": ["a", "b"] },
    );

    let cluster = Cluster::new(settings_with(&network, &["a"], Some("rs"))).unwrap();
    cluster.open().await.unwrap();

    let criteria = SelectionCriteria::Predicate(Arc::new(|sd: &ServerDescription| {
        sd.server_type() == ServerType::RsSecondary
    }));
    let servers = cluster
        .select_servers(&criteria, SELECTION_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].address(), &address("b"));

    let description = cluster.description().await;
    assert_eq!(description.cluster_type(), ClusterType::ReplicaSetWithPrimary);
    assert!(cluster.has_server(&address("b")).await);

    cluster.close().await.unwrap();
}

#[tokio::test]
async fn single_cluster_bypasses_criteria() {
    let network = MockNetwork::new();
    // A direct connection to a secondary: not writable, selected anyway.
    network.reply("a", doc! { "ok": 1, "secondary": true, "setName": "rs" });

    let cluster = Cluster::new(settings(&network, &["a"])).unwrap();
    cluster.open().await.unwrap();

    let servers = cluster
        .select_servers(&SelectionCriteria::Writable, SELECTION_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].address(), &address("a"));

    cluster.close().await.unwrap();
}

#[tokio::test]
async fn selection_times_out_when_no_server_is_reachable() {
    let network = MockNetwork::new();
    network.fail("a");

    let cluster = Cluster::new(settings(&network, &["a"])).unwrap();
    cluster.open().await.unwrap();

    let error = cluster
        .select_servers(&SelectionCriteria::Writable, Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(matches!(
        error.kind.as_ref(),
        ErrorKind::ConnectionFailure { .. }
    ));
    assert!(error.to_string().contains("No suitable servers available"));

    cluster.close().await.unwrap();
}

#[tokio::test]
async fn selection_unblocks_when_a_server_becomes_available() {
    let network = MockNetwork::new();
    network.fail("a");

    let cluster = Cluster::new(settings_with(&network, &["a"], Some("rs"))).unwrap();
    cluster.open().await.unwrap();

    {
        let network = network.clone();
        runtime::spawn(async move {
            runtime::delay_for(Duration::from_millis(300)).await;
            network.reply(
                "a",
                doc! { "ok": 1, "ismaster": true, "setName": "rs", "hosts": ["a"] },
            );
        });
    }

    let servers = cluster
        .select_servers(&SelectionCriteria::Writable, SELECTION_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].description().server_type(), ServerType::RsPrimary);

    cluster.close().await.unwrap();
}

#[tokio::test]
async fn open_twice_is_an_error() {
    let network = MockNetwork::new();
    network.reply("a", doc! { "ok": 1, "ismaster": true });

    let cluster = Cluster::new(settings(&network, &["a"])).unwrap();
    cluster.open().await.unwrap();

    let error = cluster.open().await.unwrap_err();
    assert!(matches!(error.kind.as_ref(), ErrorKind::InvalidState { .. }));

    cluster.close().await.unwrap();
    let error = cluster.close().await.unwrap_err();
    assert!(matches!(error.kind.as_ref(), ErrorKind::InvalidState { .. }));
}

#[tokio::test]
async fn empty_seed_list_is_rejected() {
    let network = MockNetwork::new();
    let error = Cluster::new(settings(&network, &[])).unwrap_err();
    assert!(matches!(
        error.kind.as_ref(),
        ErrorKind::InvalidArgument { .. }
    ));
}

#[tokio::test]
async fn failed_check_resets_application_pool_once_per_attempt() {
    let network = MockNetwork::new();
    network.fail("a");

    let cluster = Cluster::new(settings(&network, &["a"])).unwrap();
    cluster.open().await.unwrap();

    // The first check fails with no prior successful contact: a single
    // attempt, and with it a single pool reset.
    runtime::delay_for(Duration::from_millis(250)).await;
    assert_eq!(network.resets("a"), 1);

    cluster.close().await.unwrap();
}

#[tokio::test]
async fn failed_check_after_successful_contact_retries_once() {
    let network = MockNetwork::new();
    network.reply("a", doc! { "ok": 1, "ismaster": true });

    let cluster = Cluster::new(settings(&network, &["a"])).unwrap();
    cluster.open().await.unwrap();

    cluster
        .select_servers(&SelectionCriteria::Writable, SELECTION_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(network.resets("a"), 0);

    // Break the server, then ask for an immediate check. The monitor knew
    // the server, so it probes twice before giving up, resetting the
    // application pool after each failed attempt.
    network.fail("a");
    runtime::delay_for(Duration::from_millis(600)).await;
    cluster.request_check_all().await;
    runtime::delay_for(Duration::from_millis(300)).await;

    assert_eq!(network.resets("a"), 2);
    let description = cluster.description().await;
    assert_eq!(
        description
            .get_server_description(&address("a"))
            .unwrap()
            .server_type(),
        ServerType::Unknown
    );

    cluster.close().await.unwrap();
}

#[tokio::test]
async fn incompatible_server_fails_selection_with_configuration_error() {
    let network = MockNetwork::new();
    network.reply(
        "a",
        doc! {
            "ok": 1,
            "ismaster": true,
            "setName": "rs",
            "hosts": ["a"],
            "minWireVersion": 11,
            "maxWireVersion": 12,
        },
    );

    let cluster = Cluster::new(settings_with(&network, &["a"], Some("rs"))).unwrap();
    cluster.open().await.unwrap();

    let error = cluster
        .select_servers(&SelectionCriteria::Writable, SELECTION_TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(
        error.kind.as_ref(),
        ErrorKind::Configuration { .. }
    ));
    assert!(error.to_string().contains("a:27017"));
    assert!(error
        .to_string()
        .contains("wire protocol versions 11 through 12"));

    cluster.close().await.unwrap();
}

#[tokio::test]
async fn on_change_ignores_servers_no_longer_in_the_description() {
    let network = MockNetwork::new();
    network.fail("a");
    network.fail("b");

    let cluster = Cluster::new(settings(&network, &["a", "b"])).unwrap();

    let stray = ServerDescription::new(address("x"));
    cluster.on_change(stray).await;

    let description = cluster.description().await;
    assert!(!description.has_server(&address("x")));
    assert_eq!(description.addresses().count(), 2);
}

#[derive(Debug, Default)]
struct EventRecorder {
    events: Mutex<Vec<&'static str>>,
}

impl EventRecorder {
    fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }
}

impl SdamEventHandler for EventRecorder {
    fn handle_server_heartbeat_started_event(&self, _event: ServerHeartbeatStartedEvent) {
        self.events.lock().unwrap().push("ServerHeartbeatStarted");
    }

    fn handle_server_heartbeat_succeeded_event(&self, _event: ServerHeartbeatSucceededEvent) {
        self.events.lock().unwrap().push("ServerHeartbeatSucceeded");
    }
}

#[tokio::test]
async fn heartbeat_events_are_emitted() {
    let network = MockNetwork::new();
    network.reply("a", doc! { "ok": 1, "ismaster": true });
    let recorder = Arc::new(EventRecorder::default());

    let mut settings = settings(&network, &["a"]);
    settings.sdam_event_handler = Some(recorder.clone() as Arc<dyn SdamEventHandler>);

    let cluster = Cluster::new(settings).unwrap();
    cluster.open().await.unwrap();
    cluster
        .select_servers(&SelectionCriteria::Writable, SELECTION_TIMEOUT)
        .await
        .unwrap();

    let names = recorder.names();
    assert!(names.contains(&"ServerHeartbeatStarted"), "events: {:?}", names);
    assert!(names.contains(&"ServerHeartbeatSucceeded"), "events: {:?}", names);

    cluster.close().await.unwrap();
}
