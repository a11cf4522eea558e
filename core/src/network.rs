//! Virtual clock, event queue ownership, and the pairwise link model
//! (delay + partition connectivity).

use std::rc::Rc;

use crate::config::Config;
use crate::event::{Event, EventKind, EventQueue};
use crate::hash::h_int;

/// Owns the event queue and the virtual clock. The simulation driver is the
/// only thing that advances `time_ms`; everything else only reads it.
pub struct Network {
    cfg: Rc<Config>,
    pub time_ms: u64,
    queue: EventQueue,
}

impl Network {
    pub fn new(cfg: Rc<Config>) -> Self {
        Network {
            cfg,
            time_ms: 0,
            queue: EventQueue::new(),
        }
    }

    pub fn push(&mut self, t_ms: u64, kind: EventKind) {
        self.queue.push(t_ms, kind);
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.queue.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn in_partition_window(&self, t_ms: u64) -> bool {
        match &self.cfg.partition {
            Some(p) => t_ms >= p.start_ms && t_ms < p.end_ms,
            None => false,
        }
    }

    /// True unless `t_ms` falls in the configured partition window and
    /// `src`/`dst` land in different (non-empty) groups.
    pub fn connected(&self, src: usize, dst: usize, t_ms: u64) -> bool {
        if !self.in_partition_window(t_ms) {
            return true;
        }
        let Some(partition) = &self.cfg.partition else {
            return true;
        };
        if partition.groups.is_empty() {
            return true;
        }
        partition
            .groups
            .iter()
            .any(|g| g.contains(&src) && g.contains(&dst))
    }

    /// `base + (H_int(seed,"delay",[src,dst],context,now_be8) mod (jitter+1))`.
    pub fn delay_ms(&self, src: usize, dst: usize, context: &[u8], now_ms: u64) -> u64 {
        let src_b = [src as u8];
        let dst_b = [dst as u8];
        let now_b = now_ms.to_be_bytes();
        let r = h_int(&[
            self.cfg.seed.as_bytes(),
            b"delay",
            &src_b,
            &dst_b,
            context,
            &now_b,
        ]);
        let jitter_span = self.cfg.jitter_ms + 1;
        let jitter = (r % primitive_types::U256::from(jitter_span)).as_u64();
        self.cfg.base_delay_ms + jitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PartitionSchedule;

    fn cfg_with_partition() -> Rc<Config> {
        let mut cfg = Config::default();
        cfg.partition = Some(PartitionSchedule {
            start_ms: 3000,
            end_ms: 6000,
            groups: vec![vec![0, 1, 2], vec![3, 4]],
        });
        Rc::new(cfg)
    }

    #[test]
    fn connected_outside_window_always_true() {
        let net = Network::new(cfg_with_partition());
        assert!(net.connected(0, 3, 0));
        assert!(net.connected(0, 3, 6000));
    }

    #[test]
    fn connected_inside_window_respects_groups() {
        let net = Network::new(cfg_with_partition());
        assert!(net.connected(0, 1, 4000));
        assert!(!net.connected(0, 3, 4000));
        assert!(net.connected(3, 4, 4000));
    }

    #[test]
    fn empty_groups_disable_partition_even_inside_window() {
        let mut cfg = Config::default();
        cfg.partition = Some(PartitionSchedule {
            start_ms: 3000,
            end_ms: 6000,
            groups: vec![],
        });
        let net = Network::new(Rc::new(cfg));
        assert!(net.connected(0, 3, 4000));
    }

    #[test]
    fn delay_is_deterministic_and_bounded() {
        let net = Network::new(Rc::new(Config::default()));
        let d1 = net.delay_ms(0, 1, b"ctx", 100);
        let d2 = net.delay_ms(0, 1, b"ctx", 100);
        assert_eq!(d1, d2);
        assert!(d1 >= net.cfg.base_delay_ms);
        assert!(d1 <= net.cfg.base_delay_ms + net.cfg.jitter_ms);
    }
}
