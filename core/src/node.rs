//! The per-node consensus engine: block graph, fork choice, k-deep finality,
//! mempool, the balance/nonce state machine, and both block-production
//! algorithms. This is the load-bearing subsystem (§1).

use std::collections::HashMap;
use std::rc::Rc;

use crate::config::Config;
use crate::error::ConsensusError;
use crate::event::EventKind;
use crate::hash::{h_hex, h_int, hex_to_u256, meets_target, work_for_difficulty};
use crate::log::{EventRecord, LogSink};
use crate::model::{Algo, Block, Tx};
use crate::network::Network;

/// `nonce = epoch * attempts + salt + i`; grinding budget per work tick.
const POW_ATTEMPTS: u64 = 300;
const HYBRID_LEADER_ATTEMPTS: u64 = 260;
const HYBRID_FOLLOWER_ATTEMPTS: u64 = 12;
const MAX_TXS_PER_BLOCK: usize = 5;
const SLOT_LEN_MS: u64 = 100;
const TICK_PERIOD_MS: u64 = 100;
const WORK_PERIOD_MS: u64 = 1;

pub struct Node {
    pub id: usize,
    cfg: Rc<Config>,

    blocks: HashMap<String, Block>,
    children: HashMap<String, Vec<String>>,
    pub best_head: String,

    mempool: Vec<Tx>,
    nonce: Vec<u64>,
    balance: Vec<u64>,
    stake: Vec<u64>,

    pub final_height: u64,
    final_block_by_h: HashMap<u64, String>,

    pow_epoch: u64,
    hybrid_epoch: u64,
    nonce_salt: u64,
}

impl Node {
    pub fn new(id: usize, cfg: Rc<Config>) -> Self {
        let ghash = h_hex(&[cfg.seed.as_bytes(), b"genesis"]);
        let genesis = Block {
            parent: String::new(),
            height: 0,
            proposer: -1,
            algo: Algo::Genesis,
            difficulty: 1,
            stake_epoch: 0,
            rnd_tag: String::new(),
            nonce: 0,
            txs: Vec::new(),
            bhash: ghash.clone(),
            work: 1,
        };

        let mut blocks = HashMap::new();
        let mut children = HashMap::new();
        children.insert(ghash.clone(), Vec::new());
        blocks.insert(ghash.clone(), genesis);

        let mut final_block_by_h = HashMap::new();
        final_block_by_h.insert(0, ghash.clone());

        let n = cfg.n_nodes;
        Node {
            id,
            nonce_salt: 1_000_003u64.wrapping_mul(id as u64 + 1),
            cfg,
            blocks,
            children,
            best_head: ghash,
            mempool: Vec::new(),
            nonce: vec![0; n],
            balance: vec![0; n],
            stake: vec![0; n],
            final_height: 0,
            final_block_by_h,
            pow_epoch: 0,
            hybrid_epoch: 0,
        }
        .with_initial_balances()
    }

    fn with_initial_balances(mut self) -> Self {
        for i in 0..self.cfg.n_nodes {
            self.balance[i] = self.cfg.init_balance;
            self.stake[i] = self.cfg.init_balance;
        }
        self
    }

    /// Schedules this node's first tick and work events at `t=0`.
    pub fn schedule_initial(&self, network: &mut Network) {
        network.push(0, EventKind::Tick { node: self.id });
        network.push(0, EventKind::Work { node: self.id });
    }

    pub fn best_height(&self) -> u64 {
        self.blocks[&self.best_head].height
    }

    /// The finalized block id at height `h`, if this node has finalized that
    /// far yet. Used by cross-node safety checks (P1).
    pub fn final_block_at(&self, h: u64) -> Option<&str> {
        self.final_block_by_h.get(&h).map(|s| s.as_str())
    }

    /// The proposer of the block at `bhash`, if attached.
    pub fn proposer_of(&self, bhash: &str) -> Option<i64> {
        self.blocks.get(bhash).map(|b| b.proposer)
    }

    /// The `stake_epoch` recorded on the block at `bhash`, if attached.
    pub fn stake_epoch_of(&self, bhash: &str) -> Option<u64> {
        self.blocks.get(bhash).map(|b| b.stake_epoch)
    }

    pub fn leader_for(&self, height: u64, slot: u64) -> usize {
        self.leader_for_height(height, slot)
    }

    /// Every attached block, for parent-closure (P4) and header-integrity
    /// (P3) checks.
    pub fn attached_blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    pub fn has_block(&self, bhash: &str) -> bool {
        self.blocks.contains_key(bhash)
    }

    // -- fork choice -------------------------------------------------------

    fn head_work_height(&self, bhash: &str) -> (u64, u64) {
        let mut work = 0u64;
        let mut height = 0u64;
        let mut cur = bhash.to_string();
        while !cur.is_empty() {
            let b = &self.blocks[&cur];
            work += b.work;
            height = b.height;
            cur = b.parent.clone();
        }
        (work, height)
    }

    fn better(&self, a: &str, b: &str) -> bool {
        let (wa, ha) = self.head_work_height(a);
        let (wb, hb) = self.head_work_height(b);
        if wa != wb {
            return wa > wb;
        }
        if ha != hb {
            return ha > hb;
        }
        hex_to_u256(a) < hex_to_u256(b)
    }

    // -- block graph ---------------------------------------------------

    /// Attaches `blk` if not already present and its parent is known.
    /// Silently does nothing otherwise (duplicate / orphan — §7, §9).
    fn attach_block(
        &mut self,
        blk: Block,
        now_ms: u64,
        sink: &mut dyn LogSink,
    ) -> Result<(), ConsensusError> {
        if self.blocks.contains_key(&blk.bhash) {
            return Ok(());
        }
        if !self.blocks.contains_key(&blk.parent) {
            return Ok(());
        }

        let bhash = blk.bhash.clone();
        let parent = blk.parent.clone();
        self.children.entry(parent).or_default().push(bhash.clone());
        self.children.entry(bhash.clone()).or_default();
        self.blocks.insert(bhash.clone(), blk);

        if self.better(&bhash, &self.best_head) {
            let old = self.best_head.clone();
            self.best_head = bhash.clone();
            tracing::debug!(node = self.id, old_head = %old, new_head = %bhash, "reorg");
            sink.log_event(
                now_ms,
                self.id,
                EventRecord::Reorg {
                    old_head: old,
                    new_head: bhash,
                },
            );
        }

        self.update_finality(now_ms, sink)
    }

    fn update_finality(&mut self, now_ms: u64, sink: &mut dyn LogSink) -> Result<(), ConsensusError> {
        let k = self.cfg.k_final;

        let mut chain = Vec::new();
        let mut cur = self.best_head.clone();
        while !cur.is_empty() {
            let parent = self.blocks[&cur].parent.clone();
            chain.push(cur);
            cur = parent;
        }
        chain.reverse();

        if chain.is_empty() {
            return Ok(());
        }
        let len = chain.len() as u64;
        if len == 0 || len - 1 < k {
            return Ok(());
        }
        let final_idx = len - 1 - k;
        if final_idx == 0 {
            return Ok(());
        }

        let mut advanced = false;
        for i in (self.final_height + 1)..=final_idx {
            let bh = chain[i as usize].clone();
            if let Some(existing) = self.final_block_by_h.get(&i) {
                if existing != &bh {
                    tracing::error!(node = self.id, height = i, existing = %existing, attempted = %bh, "finality conflict");
                    return Err(ConsensusError::FinalityConflict {
                        height: i,
                        existing: existing.clone(),
                        attempted: bh,
                    });
                }
            }
            self.final_block_by_h.insert(i, bh.clone());
            self.final_height = i;
            advanced = true;
            tracing::debug!(node = self.id, height = i, bhash = %bh, "finalize");
            sink.log_event(now_ms, self.id, EventRecord::Finalize { height: i, bhash: bh });
        }

        if advanced {
            self.check_final_chain_state()?;
        }
        Ok(())
    }

    /// Replays the finalized prefix from scratch (§4.6); a pure check, no
    /// node state is mutated by this, only verified.
    fn check_final_chain_state(&self) -> Result<(), ConsensusError> {
        let n = self.cfg.n_nodes;
        let mut bal = vec![self.cfg.init_balance; n];
        let mut nonce = vec![0u64; n];

        for h in 1..=self.final_height {
            let bh = &self.final_block_by_h[&h];
            let blk = &self.blocks[bh];
            for tx in &blk.txs {
                if tx.nonce != nonce[tx.from] {
                    return Err(ConsensusError::NonceMismatch {
                        node: tx.from,
                        tx_nonce: tx.nonce,
                        expected: nonce[tx.from],
                    });
                }
                if bal[tx.from] < tx.amount {
                    return Err(ConsensusError::NegativeBalance {
                        node: tx.from,
                        amount: tx.amount,
                        balance: bal[tx.from],
                    });
                }
                bal[tx.from] -= tx.amount;
                bal[tx.to] += tx.amount;
                nonce[tx.from] += 1;
            }
        }
        Ok(())
    }

    // -- ticks: transaction creation -------------------------------------

    pub fn on_tick(&mut self, now_ms: u64, network: &mut Network, sink: &mut dyn LogSink) {
        let rate = self.cfg.tx_rate_per_node_per_sec;
        let id_b = [self.id as u8];
        let now_b = now_ms.to_be_bytes();
        let r = h_int(&[self.cfg.seed.as_bytes(), b"tick", &id_b, &now_b]);

        let threshold = crate::hash::tick_fire_threshold(rate);
        if primitive_types::U512::from(r) < threshold {
            let n = self.cfg.n_nodes as u64;
            let to = (self.id as u64 + 1 + (r % primitive_types::U256::from(n - 1)).as_u64()) % n;
            let amount = 1 + (r % primitive_types::U256::from(5u32)).as_u64();
            let my_nonce = self.nonce[self.id];
            let tid = h_hex(&[self.cfg.seed.as_bytes(), b"tx", &id_b, &now_b]);

            self.mempool.push(Tx {
                from: self.id,
                to: to as usize,
                amount,
                nonce: my_nonce,
                tid: tid.clone(),
            });
            self.nonce[self.id] += 1;

            sink.log_event(
                now_ms,
                self.id,
                EventRecord::TxNew {
                    tid,
                    to: to as usize,
                    amount,
                    nonce: my_nonce,
                },
            );
        }

        network.push(now_ms + TICK_PERIOD_MS, EventKind::Tick { node: self.id });
    }

    // -- block production -------------------------------------------------

    fn leader_for_height(&self, height: u64, slot: u64) -> usize {
        let total: u64 = self.stake.iter().sum();
        if total == 0 {
            return 0;
        }
        let r = h_int(&[
            self.cfg.seed.as_bytes(),
            b"leader",
            &height.to_be_bytes(),
            &(slot as u32).to_be_bytes(),
        ]);
        let pick = (r % primitive_types::U256::from(total)).as_u64();
        let mut acc = 0u64;
        for nid in 0..self.cfg.n_nodes {
            acc += self.stake[nid];
            if pick < acc {
                return nid;
            }
        }
        self.cfg.n_nodes - 1
    }

    /// Selects up to [`MAX_TXS_PER_BLOCK`] mempool transactions that are
    /// valid against a simulated balance/nonce projection, in mempool order.
    fn make_block_candidate(&self, height: u64, algo: Algo) -> (String, Vec<Tx>, String) {
        let parent = self.best_head.clone();
        let header = Block::header(&parent, height, self.id as i64, algo);

        let mut bal = self.balance.clone();
        let mut nce = self.nonce.clone();
        let mut txs = Vec::new();

        for tx in &self.mempool {
            if tx.from == self.id && tx.nonce != nce[self.id] {
                continue;
            }
            if bal[tx.from] >= tx.amount {
                bal[tx.from] -= tx.amount;
                bal[tx.to] += tx.amount;
                nce[tx.from] += 1;
                txs.push(tx.clone());
            }
            if txs.len() >= MAX_TXS_PER_BLOCK {
                break;
            }
        }

        (header, txs, parent)
    }

    /// Checks whether `nonce` solves the PoW puzzle for `header` at
    /// `difficulty`, returning `(meets_target, bhash, work)`.
    fn try_hash(header: &str, nonce: u64, difficulty: u64) -> (bool, String, u64) {
        let nonce_b = nonce.to_be_bytes();
        let parts: &[&[u8]] = &[header.as_bytes(), &nonce_b];
        let hval = h_int(parts);
        let bh = h_hex(parts);
        let ok = meets_target(hval, difficulty);
        let work = work_for_difficulty(difficulty);
        (ok, bh, work)
    }

    pub fn on_work(
        &mut self,
        now_ms: u64,
        network: &mut Network,
        sink: &mut dyn LogSink,
    ) -> Result<(), ConsensusError> {
        let height = self.best_height() + 1;

        match self.cfg.algo {
            Algo::Pow => {
                let (header, txs, parent) = self.make_block_candidate(height, Algo::Pow);
                let attempts = POW_ATTEMPTS;
                let base = self.pow_epoch.wrapping_mul(attempts).wrapping_add(self.nonce_salt);
                let difficulty = self.cfg.difficulty_for(Algo::Pow);

                for i in 0..attempts {
                    let nonce = base.wrapping_add(i);
                    let (ok, bh, work) = Self::try_hash(&header, nonce, difficulty);
                    if ok {
                        let blk = Block {
                            parent: parent.clone(),
                            height,
                            proposer: self.id as i64,
                            algo: Algo::Pow,
                            difficulty,
                            stake_epoch: 0,
                            rnd_tag: String::new(),
                            nonce,
                            txs,
                            bhash: bh,
                            work,
                        };
                        self.broadcast_and_apply(blk, now_ms, network, sink)?;
                        break;
                    }
                }
                self.pow_epoch += 1;
            }
            Algo::Hybrid => {
                let slot = now_ms / SLOT_LEN_MS;
                let leader = self.leader_for_height(height, slot);
                let (header, txs, parent) = self.make_block_candidate(height, Algo::Hybrid);
                let attempts = if self.id == leader {
                    HYBRID_LEADER_ATTEMPTS
                } else {
                    HYBRID_FOLLOWER_ATTEMPTS
                };
                let base = self
                    .hybrid_epoch
                    .wrapping_mul(attempts)
                    .wrapping_add(self.nonce_salt);
                let difficulty = self.cfg.difficulty_for(Algo::Hybrid);

                for i in 0..attempts {
                    let nonce = base.wrapping_add(i);
                    let (ok, bh, work) = Self::try_hash(&header, nonce, difficulty);
                    if ok {
                        let blk = Block {
                            parent: parent.clone(),
                            height,
                            proposer: self.id as i64,
                            algo: Algo::Hybrid,
                            difficulty,
                            stake_epoch: slot,
                            rnd_tag: format!("s{slot}"),
                            nonce,
                            txs,
                            bhash: bh,
                            work,
                        };
                        self.broadcast_and_apply(blk, now_ms, network, sink)?;
                        break;
                    }
                }
                self.hybrid_epoch += 1;
            }
            // `Config::validate` rejects `Algo::Genesis` before a run starts (§7
            // config errors); a caller that bypasses validation just gets a
            // work tick that mines nothing, the same no-branch-taken outcome
            // `examples/original_source/node.py`'s `on_work` falls through to
            // for an algo it doesn't recognize.
            Algo::Genesis => {}
        }

        network.push(now_ms + WORK_PERIOD_MS, EventKind::Work { node: self.id });
        Ok(())
    }

    fn broadcast_and_apply(
        &mut self,
        blk: Block,
        now_ms: u64,
        network: &mut Network,
        sink: &mut dyn LogSink,
    ) -> Result<(), ConsensusError> {
        for dst in 0..self.cfg.n_nodes {
            if dst == self.id {
                continue;
            }
            if !network.connected(self.id, dst, now_ms) {
                continue;
            }
            let ctx = blk.bhash.as_bytes().to_vec();
            let delay = network.delay_ms(self.id, dst, &ctx, now_ms);
            network.push(
                now_ms + delay,
                EventKind::RecvBlock {
                    src: self.id,
                    dst,
                    block: Box::new(blk.clone()),
                },
            );
        }

        let record = if matches!(self.cfg.algo, Algo::Pow) {
            EventRecord::BlockMined {
                height: blk.height,
                bhash: blk.bhash.clone(),
                leader: self.id,
            }
        } else {
            EventRecord::BlockProposed {
                height: blk.height,
                bhash: blk.bhash.clone(),
                leader: self.id,
            }
        };
        sink.log_event(now_ms, self.id, record);

        self.apply_local_block(blk, now_ms, sink)
    }

    /// Attaches a just-mined (or just-received) block locally, purges its
    /// transactions from the mempool, and optimistically updates balance and
    /// nonce. Optimistic state is never rolled back on reorg (§9) — only the
    /// finalized replay is authoritative.
    fn apply_local_block(
        &mut self,
        blk: Block,
        now_ms: u64,
        sink: &mut dyn LogSink,
    ) -> Result<(), ConsensusError> {
        let tids: std::collections::HashSet<&str> = blk.txs.iter().map(|t| t.tid.as_str()).collect();
        if !tids.is_empty() {
            self.mempool.retain(|tx| !tids.contains(tx.tid.as_str()));
        }
        for tx in &blk.txs {
            if self.balance[tx.from] >= tx.amount {
                self.balance[tx.from] -= tx.amount;
                self.balance[tx.to] += tx.amount;
            }
        }
        for tx in &blk.txs {
            if self.nonce[tx.from] <= tx.nonce {
                self.nonce[tx.from] = tx.nonce + 1;
            }
        }
        self.attach_block(blk, now_ms, sink)
    }

    /// Re-validates a received block's header/PoW before attaching it.
    /// Drops silently on any mismatch (§4.7, §7).
    pub fn on_recv_block(
        &mut self,
        now_ms: u64,
        blk: Block,
        sink: &mut dyn LogSink,
    ) -> Result<(), ConsensusError> {
        let header = Block::header(&blk.parent, blk.height, blk.proposer, blk.algo);
        let difficulty = self.cfg.difficulty_for(blk.algo);
        let (ok, bh, _work) = Self::try_hash(&header, blk.nonce, difficulty);
        if !ok || bh != blk.bhash {
            return Ok(());
        }
        self.apply_local_block(blk, now_ms, sink)
    }
}
