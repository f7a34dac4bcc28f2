//! Fragment reassembly for both IP families. One flow per
//! `(src, dst, id, next_proto)` holds a sparse byte buffer and the set of
//! byte ranges covered so far; overlapping fragments resolve last-writer-
//! wins. A flow completes when the covered set is exactly `[0, total_len)`
//! and expires after the configured timeout otherwise.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::{debug, trace};

pub const MAX_FLOWS: usize = 64;
pub const MAX_DATAGRAM_LEN: usize = 65_535;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct FlowKey {
    pub src: IpAddr,
    pub dst: IpAddr,
    pub id: u32,
    pub next_proto: u8,
}

struct FragmentFlow {
    buffer: Vec<u8>,
    /// Sorted, disjoint `[start, end)` ranges, merged on every insert.
    covered: SmallVec<[(usize, usize); 8]>,
    /// Latched by the MF=0 fragment.
    total_len: Option<usize>,
    created: Instant,
}

impl FragmentFlow {
    fn new() -> FragmentFlow {
        FragmentFlow {
            buffer: Vec::new(),
            covered: SmallVec::new(),
            total_len: None,
            created: Instant::now(),
        }
    }

    fn insert(&mut self, offset: usize, data: &[u8]) {
        let end = offset + data.len();
        if self.buffer.len() < end {
            self.buffer.resize(end, 0);
        }
        self.buffer[offset..end].copy_from_slice(data);

        self.covered.push((offset, end));
        self.covered.sort_unstable();
        let mut merged: SmallVec<[(usize, usize); 8]> = SmallVec::new();
        for &(start, stop) in self.covered.iter() {
            match merged.last_mut() {
                Some((_, last_stop)) if start <= *last_stop => {
                    *last_stop = (*last_stop).max(stop);
                }
                _ => merged.push((start, stop)),
            }
        }
        self.covered = merged;
    }

    fn is_complete(&self) -> bool {
        match self.total_len {
            Some(total) => self.covered.as_slice() == [(0, total)],
            None => false,
        }
    }
}

/// Outcome of feeding one fragment into the table.
#[derive(Debug, PartialEq, Eq)]
pub enum FragmentOutcome {
    /// More fragments are needed.
    Pending,
    /// The flow completed; here is the reassembled datagram.
    Complete(Vec<u8>),
    /// The fragment was rejected (oversize or inconsistent).
    Rejected,
}

pub struct Reassembler {
    flows: Mutex<FxHashMap<FlowKey, FragmentFlow>>,
    timeout: Duration,
}

impl Reassembler {
    pub fn new(timeout: Duration) -> Reassembler {
        Reassembler {
            flows: Mutex::new(FxHashMap::default()),
            timeout,
        }
    }

    /// Feed one fragment. `last` is true when this fragment carries MF=0.
    pub fn push(
        &self,
        key: FlowKey,
        offset: usize,
        data: &[u8],
        last: bool,
    ) -> FragmentOutcome {
        if offset + data.len() > MAX_DATAGRAM_LEN {
            debug!(?key, offset, len = data.len(), "fragment beyond datagram bound");
            return FragmentOutcome::Rejected;
        }

        let mut flows = self.flows.lock();

        if !flows.contains_key(&key) && flows.len() >= MAX_FLOWS {
            evict_oldest(&mut flows);
        }
        let flow = flows.entry(key).or_insert_with(FragmentFlow::new);

        if last {
            let total = offset + data.len();
            match flow.total_len {
                Some(existing) if existing != total => {
                    trace!(?key, existing, total, "conflicting total length, dropping flow");
                    flows.remove(&key);
                    return FragmentOutcome::Rejected;
                }
                _ => flow.total_len = Some(total),
            }
        } else if let Some(total) = flow.total_len {
            if offset + data.len() > total {
                trace!(?key, total, "fragment beyond latched total, dropping flow");
                flows.remove(&key);
                return FragmentOutcome::Rejected;
            }
        }

        flow.insert(offset, data);

        if flow.is_complete() {
            let flow = flows.remove(&key).unwrap_or_else(FragmentFlow::new);
            trace!(?key, len = flow.buffer.len(), "flow reassembled");
            return FragmentOutcome::Complete(flow.buffer);
        }
        FragmentOutcome::Pending
    }

    /// Drop flows past their deadline. Returns the number removed.
    pub fn expire(&self) -> usize {
        let now = Instant::now();
        let mut flows = self.flows.lock();
        let before = flows.len();
        flows.retain(|key, flow| {
            let keep = now.duration_since(flow.created) < self.timeout;
            if !keep {
                debug!(?key, "fragment flow expired");
            }
            keep
        });
        before - flows.len()
    }

    pub fn flow_count(&self) -> usize {
        self.flows.lock().len()
    }
}

fn evict_oldest(flows: &mut FxHashMap<FlowKey, FragmentFlow>) {
    if let Some(key) = flows
        .iter()
        .min_by_key(|(_, flow)| flow.created)
        .map(|(key, _)| *key)
    {
        debug!(?key, "fragment table full, evicting oldest flow");
        flows.remove(&key);
    }
}
