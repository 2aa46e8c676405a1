//! In-process development network
//!
//! Spreads the computors of one configuration round-robin over several
//! nodes joined by a `LoopbackNetwork`, runs each node on its own task and
//! keeps one extra endpoint for submitting client messages.

use crate::clock::{Clock, SystemClock};
use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::node::{Node, NodeStatus};
use crate::transport::{LoopbackNetwork, LoopbackTransport};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Frames buffered per loopback endpoint
const FRAME_CAPACITY: usize = 1 << 14;

/// A running set of in-process nodes
#[derive(Debug)]
pub struct Devnet {
    nodes: Vec<Arc<Node>>,
    client: LoopbackTransport,
    shutdown: Vec<mpsc::Sender<()>>,
    tasks: Vec<JoinHandle<Result<()>>>,
}

impl Devnet {
    /// Start `nodes` nodes sharing `config`. Must run inside a Tokio runtime.
    pub fn launch(config: &NodeConfig, nodes: usize) -> Result<Self> {
        if nodes == 0 || nodes > config.consensus.computors {
            return Err(NodeError::config(format!(
                "{nodes} nodes cannot share {} computors",
                config.consensus.computors
            )));
        }
        let mut config = config.clone();
        if config.node.genesis_unix_millis == 0 {
            config.node.genesis_unix_millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_millis() as u64)
                .map_err(|e| NodeError::config(format!("clock before 1970: {e}")))?;
        }

        let network = LoopbackNetwork::new(config.wire_dimensions(), FRAME_CAPACITY);
        let client = network.join();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let mut devnet = Self {
            nodes: Vec::with_capacity(nodes),
            client,
            shutdown: Vec::with_capacity(nodes),
            tasks: Vec::with_capacity(nodes),
        };

        for index in 0..nodes {
            let mut node_config = config.clone();
            node_config.node.hosted_computors = (0..config.consensus.computors)
                .filter(|computor| computor % nodes == index)
                .collect();
            if let Some(dir) = config.snapshot_dir() {
                node_config.node.snapshot_dir = dir.join(format!("node-{index}")).to_string_lossy().into_owned();
            }
            let node = Arc::new(Node::bootstrap(
                &node_config,
                Arc::new(network.join()),
                Arc::clone(&clock),
            )?);

            let (sender, receiver) = mpsc::channel(1);
            let runner = Arc::clone(&node);
            devnet.tasks.push(tokio::spawn(async move { runner.run(receiver).await }));
            devnet.shutdown.push(sender);
            devnet.nodes.push(node);
        }
        tracing::info!(nodes, computors = config.consensus.computors, "Devnet launched");
        Ok(devnet)
    }

    /// Endpoint for client traffic
    pub fn client(&self) -> &LoopbackTransport {
        &self.client
    }

    /// Running nodes
    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    /// Status of every node
    pub fn statuses(&self) -> Vec<NodeStatus> {
        self.nodes.iter().map(|node| node.status()).collect()
    }

    /// Wait until every node is at `tick` or later; false on timeout
    pub async fn wait_for_tick(&self, tick: u32, timeout: Duration) -> bool {
        let reached = async {
            loop {
                if self.statuses().iter().all(|status| status.tick >= tick) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(timeout, reached).await.is_ok()
    }

    /// Stop every node and wait for its task
    pub async fn shutdown(self) -> Result<()> {
        for sender in &self.shutdown {
            // a node that already stopped has dropped its receiver
            let _ = sender.send(()).await;
        }
        for task in self.tasks {
            task.await
                .map_err(|e| NodeError::worker(format!("node task failed: {e}")))??;
        }
        Ok(())
    }
}
