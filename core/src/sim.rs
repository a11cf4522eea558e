//! The simulation driver (§4.8): a single cooperative loop that pops events
//! in `(t_ms, eid)` order, advances the virtual clock, and dispatches into
//! the node whose id the event names. No async runtime, no threads — see
//! §5: exactly one logical executor.

use std::rc::Rc;

use crate::config::Config;
use crate::error::ConsensusError;
use crate::event::EventKind;
use crate::log::{LogSink, SummaryRecord};
use crate::network::Network;
use crate::node::Node;

pub struct Simulation {
    cfg: Rc<Config>,
    network: Network,
    nodes: Vec<Node>,
}

impl Simulation {
    pub fn new(cfg: Config) -> Self {
        let cfg = Rc::new(cfg);
        let mut network = Network::new(Rc::clone(&cfg));
        let nodes: Vec<Node> = (0..cfg.n_nodes)
            .map(|id| {
                let node = Node::new(id, Rc::clone(&cfg));
                node.schedule_initial(&mut network);
                node
            })
            .collect();

        Simulation { cfg, network, nodes }
    }

    /// Runs to completion (queue drained or `sim_time_limit_ms` exceeded),
    /// emitting structured records to `sink` as it goes. On a fatal
    /// invariant violation, logs the `error` record and returns `Err`
    /// without emitting summaries — the caller is expected to exit non-zero.
    pub fn run(&mut self, sink: &mut dyn LogSink) -> Result<(), ConsensusError> {
        if let Err(err) = self.drive(sink) {
            sink.log_error(self.network.time_ms, &err.to_string());
            return Err(err);
        }
        self.emit_summaries(sink);
        Ok(())
    }

    fn drive(&mut self, sink: &mut dyn LogSink) -> Result<(), ConsensusError> {
        while let Some(event) = self.network.pop() {
            if event.t_ms > self.cfg.sim_time_limit_ms {
                break;
            }
            self.network.time_ms = event.t_ms;

            match event.kind {
                EventKind::Tick { node } => {
                    self.nodes[node].on_tick(event.t_ms, &mut self.network, sink);
                }
                EventKind::Work { node } => {
                    self.nodes[node].on_work(event.t_ms, &mut self.network, sink)?;
                }
                EventKind::RecvBlock { src, dst, block } => {
                    if self.network.connected(src, dst, event.t_ms) {
                        self.nodes[dst].on_recv_block(event.t_ms, *block, sink)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Read-only access to node state for cross-node property checks.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    fn emit_summaries(&self, sink: &mut dyn LogSink) {
        for node in &self.nodes {
            sink.log_summary(SummaryRecord {
                summary: true,
                node: node.id,
                algo: self.cfg.algo.as_str(),
                best_height: node.best_height(),
                final_height: node.final_height,
                best_head: node.best_head.clone(),
            });
        }
    }
}
