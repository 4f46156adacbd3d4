#![cfg(feature = "sync")]

use std::{sync::Arc, time::Duration};

use dsrsim::{packet::Packet, Config, Graph, Network, NodeId, Observer};
use parking_lot::Mutex;
use tracing_subscriber::{fmt, EnvFilter};

#[allow(dead_code)]
pub fn enable_tracing() {
    fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}

/// Records everything the network reports.
#[derive(Default)]
pub struct RecordingObserver {
    pub logs: Mutex<Vec<String>>,
    pub steps: Mutex<Vec<(Packet, NodeId)>>,
    pub routes: Mutex<Vec<Vec<NodeId>>>,
}

#[allow(dead_code)]
impl RecordingObserver {
    pub fn step_count(&self) -> usize {
        self.steps.lock().len()
    }

    pub fn route_count(&self) -> usize {
        self.routes.lock().len()
    }

    pub fn clear(&self) {
        self.logs.lock().clear();
        self.steps.lock().clear();
        self.routes.lock().clear();
    }

    pub fn logged(&self, needle: &str) -> bool {
        self.logs.lock().iter().any(|line| line.contains(needle))
    }
}

impl Observer for RecordingObserver {
    fn log(&self, message: &str) {
        self.logs.lock().push(message.to_owned());
    }

    fn on_step(&self, packet: &Packet, current_node: NodeId) {
        self.steps.lock().push((packet.clone(), current_node));
    }

    fn on_route_found(&self, path: &[NodeId]) {
        self.routes.lock().push(path.to_vec());
    }
}

/// Creates a network without propagation delay, installs and starts the graph.
#[allow(dead_code)]
pub async fn start_network(graph: Graph) -> (Network, Arc<RecordingObserver>) {
    start_network_with(Config::instant(), graph).await
}

#[allow(dead_code)]
pub async fn start_network_with(config: Config, graph: Graph) -> (Network, Arc<RecordingObserver>) {
    let observer = Arc::new(RecordingObserver::default());
    let network = Network::new(config, observer.clone());

    network.load_topology(graph).await;
    network.start_all().unwrap();

    (network, observer)
}

/// Polls the condition until it holds, returns `false` if it doesn't within the limit.
#[allow(dead_code)]
pub async fn wait_until<F: Fn() -> bool>(limit: Duration, condition: F) -> bool {
    tokio::time::timeout(limit, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}
