//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte buffers* handed over by value, so a send
//! buffer always lives as long as the transfer that uses it. Receives are
//! posted up front as wildcard-source slots of a fixed maximum size and
//! completed with [`Communicator::wait_any`]; every completion reports the rank
//! it came from, and the caller must not assume any correspondence between a
//! receive slot and a sender. Collectives (`all_reduce_*`) are element-wise
//! over `u64` vectors and must be reached by every rank in the same order.

use crate::overlap_error::OverlapError;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;

/// Largest tag every MPI implementation must accept (`MPI_TAG_UB` lower bound).
pub const MAX_TAG: u16 = 0x7FFF;

/// Message tag shared by the sends and receives of one exchange phase.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        CommTag(tag)
    }
    pub const fn as_u16(self) -> u16 {
        self.0
    }
    /// Tag `k` steps after this one (wrapping).
    pub const fn offset(self, k: u16) -> Self {
        CommTag(self.0.wrapping_add(k))
    }
    /// Whether every transport accepts this tag.
    pub const fn is_portable(self) -> bool {
        self.0 <= MAX_TAG
    }
}

/// Tags for the two phases of one overlap iteration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OverlapTags {
    pub request: CommTag,
    pub response: CommTag,
}

impl OverlapTags {
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            request: base,
            response: base.offset(1),
        }
    }
}

/// A completed receive: payload plus the rank that sent it.
#[derive(Clone, Debug)]
pub struct Envelope {
    pub source: usize,
    pub payload: Bytes,
}

/// Anything that can be waited on.
pub trait Wait {
    /// Block until the operation has completed.
    fn wait(self) -> Result<(), OverlapError>;
}

impl Wait for () {
    fn wait(self) -> Result<(), OverlapError> {
        Ok(())
    }
}

/// Non-blocking point-to-point messaging plus the two reductions the overlap
/// protocol needs.
pub trait Communicator {
    /// Handle returned by `isend`; owns the outgoing buffer until waited on.
    type SendHandle: Wait;
    /// One posted wildcard-source receive; owns its landing buffer.
    type RecvHandle;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Start sending `buf` to `peer` under `tag`.
    fn isend(&self, peer: usize, tag: CommTag, buf: Bytes)
        -> Result<Self::SendHandle, OverlapError>;

    /// Post a receive from any source on `tag` for a message of at most `max_bytes`.
    fn irecv_any(&self, tag: CommTag, max_bytes: usize)
        -> Result<Self::RecvHandle, OverlapError>;

    /// Block until one of `pending` completes, remove it and return its message.
    ///
    /// `pending` must not be empty.
    fn wait_any(&self, pending: &mut Vec<Self::RecvHandle>) -> Result<Envelope, OverlapError>;

    /// Element-wise maximum of `local` across all ranks.
    fn all_reduce_max(&self, local: &[u64]) -> Result<Vec<u64>, OverlapError>;

    /// Element-wise sum of `local` across all ranks.
    fn all_reduce_sum(&self, local: &[u64]) -> Result<Vec<u64>, OverlapError>;
}

/// Single-rank communicator: reductions are the identity and no peer exists.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }

    fn isend(&self, peer: usize, _tag: CommTag, _buf: Bytes) -> Result<(), OverlapError> {
        Err(OverlapError::comm(peer, "NoComm has no peers"))
    }

    fn irecv_any(&self, _tag: CommTag, _max_bytes: usize) -> Result<(), OverlapError> {
        Err(OverlapError::comm(0, "NoComm cannot receive: no peers"))
    }

    fn wait_any(&self, _pending: &mut Vec<()>) -> Result<Envelope, OverlapError> {
        Err(OverlapError::comm(0, "NoComm cannot receive: no peers"))
    }

    fn all_reduce_max(&self, local: &[u64]) -> Result<Vec<u64>, OverlapError> {
        Ok(local.to_vec())
    }

    fn all_reduce_sum(&self, local: &[u64]) -> Result<Vec<u64>, OverlapError> {
        Ok(local.to_vec())
    }
}

// --- LocalComm: intra-process ranks on threads ---

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ReduceOp {
    Max,
    Sum,
}

#[derive(Default)]
struct ReduceState {
    generation: u64,
    arrived: usize,
    op: Option<ReduceOp>,
    acc: Vec<u64>,
    result: Arc<Vec<u64>>,
}

/// Shared hub for a group of in-process ranks.
///
/// Mailboxes are keyed by `(dst, tag)` and keep arrival order. A blocked
/// receiver sleeps on `arrivals` until some rank delivers a message.
pub struct LocalWorld {
    size: usize,
    mailboxes: DashMap<(usize, u16), VecDeque<Envelope>>,
    arrivals: Mutex<u64>,
    arrived_cv: Condvar,
    reduce: Mutex<ReduceState>,
    reduce_cv: Condvar,
}

impl LocalWorld {
    pub fn new(size: usize) -> Arc<Self> {
        Arc::new(Self {
            size,
            mailboxes: DashMap::new(),
            arrivals: Mutex::new(0),
            arrived_cv: Condvar::new(),
            reduce: Mutex::new(ReduceState::default()),
            reduce_cv: Condvar::new(),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// One communicator handle per rank, in rank order.
    pub fn comms(self: &Arc<Self>) -> Vec<LocalComm> {
        (0..self.size)
            .map(|rank| LocalComm {
                rank,
                world: Arc::clone(self),
            })
            .collect()
    }

    /// Run `f` once per rank on its own thread and collect the results in rank order.
    ///
    /// A panic on any rank is re-raised on the caller after all threads finish.
    pub fn run<F, R>(size: usize, f: F) -> Vec<R>
    where
        F: Fn(LocalComm) -> R + Sync,
        R: Send,
    {
        let world = LocalWorld::new(size);
        let comms = world.comms();
        let f = &f;
        std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| s.spawn(move || f(comm)))
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(r) => r,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }

    fn deliver(&self, dst: usize, tag: CommTag, env: Envelope) {
        self.mailboxes
            .entry((dst, tag.as_u16()))
            .or_default()
            .push_back(env);
        let mut n = self.arrivals.lock();
        *n += 1;
        self.arrived_cv.notify_all();
    }

    fn take(&self, dst: usize, tag: CommTag) -> Option<Envelope> {
        self.mailboxes
            .get_mut(&(dst, tag.as_u16()))
            .and_then(|mut q| q.pop_front())
    }

    fn all_reduce(&self, local: &[u64], op: ReduceOp) -> Result<Vec<u64>, OverlapError> {
        let mut st = self.reduce.lock();
        if st.arrived == 0 {
            st.op = Some(op);
            st.acc = local.to_vec();
        } else {
            if st.op != Some(op) || st.acc.len() != local.len() {
                return Err(OverlapError::comm(
                    0,
                    format!(
                        "mismatched all-reduce: {:?} over {} words joined {:?} over {} words",
                        op,
                        local.len(),
                        st.op,
                        st.acc.len()
                    ),
                ));
            }
            for (a, &b) in st.acc.iter_mut().zip(local) {
                *a = match op {
                    ReduceOp::Max => (*a).max(b),
                    ReduceOp::Sum => *a + b,
                };
            }
        }
        st.arrived += 1;
        let my_gen = st.generation;
        if st.arrived == self.size {
            st.result = Arc::new(std::mem::take(&mut st.acc));
            st.arrived = 0;
            st.op = None;
            st.generation += 1;
            self.reduce_cv.notify_all();
        } else {
            while st.generation == my_gen {
                self.reduce_cv.wait(&mut st);
            }
        }
        Ok(st.result.as_ref().clone())
    }
}

/// Per-rank handle onto a [`LocalWorld`].
#[derive(Clone)]
pub struct LocalComm {
    rank: usize,
    world: Arc<LocalWorld>,
}

/// Posted receive on a [`LocalComm`]. The mailbox already holds the payload,
/// so the slot only records which tag it listens on.
#[derive(Copy, Clone, Debug)]
pub struct LocalRecv {
    tag: CommTag,
}

impl std::fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalComm")
            .field("rank", &self.rank)
            .field("size", &self.world.size)
            .finish()
    }
}

impl LocalComm {
    /// Take one message with `tag` from any source, if one has arrived.
    pub fn try_recv_any(&self, tag: CommTag) -> Option<Envelope> {
        self.world.take(self.rank, tag)
    }

    /// Block until a message with `tag` arrives from any source.
    pub fn recv_any(&self, tag: CommTag) -> Envelope {
        loop {
            let seen = *self.world.arrivals.lock();
            if let Some(env) = self.try_recv_any(tag) {
                return env;
            }
            let mut n = self.world.arrivals.lock();
            while *n == seen {
                self.world.arrived_cv.wait(&mut n);
            }
        }
    }
}

impl Communicator for LocalComm {
    type SendHandle = ();
    type RecvHandle = LocalRecv;

    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.world.size
    }

    fn isend(&self, peer: usize, tag: CommTag, buf: Bytes) -> Result<(), OverlapError> {
        if peer >= self.world.size {
            return Err(OverlapError::comm(
                peer,
                format!("rank {peer} ≥ world size {}", self.world.size),
            ));
        }
        self.world.deliver(
            peer,
            tag,
            Envelope {
                source: self.rank,
                payload: buf,
            },
        );
        Ok(())
    }

    fn irecv_any(&self, tag: CommTag, _max_bytes: usize) -> Result<LocalRecv, OverlapError> {
        Ok(LocalRecv { tag })
    }

    fn wait_any(&self, pending: &mut Vec<LocalRecv>) -> Result<Envelope, OverlapError> {
        if pending.is_empty() {
            return Err(OverlapError::comm(self.rank, "wait_any on no posted receives"));
        }
        loop {
            let seen = *self.world.arrivals.lock();
            for k in 0..pending.len() {
                if let Some(env) = self.try_recv_any(pending[k].tag) {
                    pending.remove(k);
                    return Ok(env);
                }
            }
            let mut n = self.world.arrivals.lock();
            while *n == seen {
                self.world.arrived_cv.wait(&mut n);
            }
        }
    }

    fn all_reduce_max(&self, local: &[u64]) -> Result<Vec<u64>, OverlapError> {
        self.world.all_reduce(local, ReduceOp::Max)
    }

    fn all_reduce_sum(&self, local: &[u64]) -> Result<Vec<u64>, OverlapError> {
        self.world.all_reduce(local, ReduceOp::Sum)
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{CommTag, Communicator, Envelope, OverlapError, Wait};
    use bytes::Bytes;
    use mpi::collective::SystemOperation;
    use mpi::request::{CancelGuard, Request, StaticScope};
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::Communicator as _;
    use mpi::traits::*;

    /// Overlap transport over an MPI communicator.
    ///
    /// Owns its communicator, so any subgroup can run the overlap
    /// independently of the rest of the world.
    pub struct MpiComm {
        comm: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    impl MpiComm {
        pub fn new(comm: SimpleCommunicator) -> Self {
            let rank = comm.rank() as usize;
            let size = comm.size() as usize;
            Self { comm, rank, size }
        }

        /// `MPI_COMM_WORLD`. `mpi::initialize()` must have been called and the
        /// returned universe kept alive for as long as this value is used.
        pub fn world() -> Self {
            Self::new(SimpleCommunicator::world())
        }

        pub fn raw(&self) -> &SimpleCommunicator {
            &self.comm
        }
    }

    impl std::fmt::Debug for MpiComm {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MpiComm")
                .field("rank", &self.rank)
                .field("size", &self.size)
                .finish()
        }
    }

    /// In-flight send; keeps its buffer alive until `wait`.
    pub struct MpiSendHandle {
        request: Request<'static, [u8]>,
        _buf: Bytes,
    }

    impl Wait for MpiSendHandle {
        fn wait(self) -> Result<(), OverlapError> {
            let MpiSendHandle { request, _buf } = self;
            request.wait();
            Ok(())
        }
    }

    /// Posted wildcard receive into a buffer of the agreed maximum size.
    ///
    /// Dropping it before completion cancels the receive.
    pub struct MpiRecvHandle {
        request: Option<Request<'static, Vec<u8>>>,
        buf: Box<Vec<u8>>,
    }

    impl Drop for MpiRecvHandle {
        fn drop(&mut self) {
            if let Some(request) = self.request.take() {
                drop(CancelGuard::from(request));
            }
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn rank(&self) -> usize {
            self.rank
        }
        fn size(&self) -> usize {
            self.size
        }

        fn isend(
            &self,
            peer: usize,
            tag: CommTag,
            buf: Bytes,
        ) -> Result<MpiSendHandle, OverlapError> {
            if peer >= self.size {
                return Err(OverlapError::comm(peer, "destination outside communicator"));
            }
            // SAFETY: the heap block behind `buf` is owned by the returned handle,
            // does not move, and is only released after `request.wait()`.
            let data: &'static [u8] =
                unsafe { std::mem::transmute::<&[u8], &'static [u8]>(&buf[..]) };
            let request = self
                .comm
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, data, i32::from(tag.as_u16()));
            Ok(MpiSendHandle { request, _buf: buf })
        }

        fn irecv_any(
            &self,
            tag: CommTag,
            max_bytes: usize,
        ) -> Result<MpiRecvHandle, OverlapError> {
            let mut raw = Vec::new();
            raw.try_reserve_exact(max_bytes)
                .map_err(|_| OverlapError::Allocation {
                    what: "receive buffer",
                    words: max_bytes.div_ceil(8),
                })?;
            raw.resize(max_bytes, 0u8);
            let mut buf = Box::new(raw);
            // SAFETY: the boxed vector is owned by the handle and never moves or
            // resizes while the request is live; `Drop` cancels and completes
            // the request before the box is freed.
            let target: &'static mut Vec<u8> =
                unsafe { std::mem::transmute::<&mut Vec<u8>, &'static mut Vec<u8>>(&mut *buf) };
            let request = self
                .comm
                .any_process()
                .immediate_receive_into_with_tag(StaticScope, target, i32::from(tag.as_u16()));
            Ok(MpiRecvHandle {
                request: Some(request),
                buf,
            })
        }

        fn wait_any(
            &self,
            pending: &mut Vec<MpiRecvHandle>,
        ) -> Result<Envelope, OverlapError> {
            let mut requests: Vec<_> = pending
                .iter_mut()
                .filter_map(|h| h.request.take())
                .collect();
            if requests.len() != pending.len() || requests.is_empty() {
                for (h, r) in pending.iter_mut().zip(requests) {
                    h.request = Some(r);
                }
                return Err(OverlapError::comm(self.rank, "wait_any on no posted receives"));
            }
            let Some((idx, status)) = mpi::request::wait_any(&mut requests) else {
                for (h, r) in pending.iter_mut().zip(requests) {
                    h.request = Some(r);
                }
                return Err(OverlapError::comm(self.rank, "no active receive to wait on"));
            };
            let mut done = pending.remove(idx);
            for (h, r) in pending.iter_mut().zip(requests) {
                h.request = Some(r);
            }
            let count = status.count(u8::equivalent_datatype());
            let mut data = std::mem::take(&mut *done.buf);
            data.truncate(usize::try_from(count).unwrap_or(0));
            Ok(Envelope {
                source: status.source_rank() as usize,
                payload: Bytes::from(data),
            })
        }

        fn all_reduce_max(&self, local: &[u64]) -> Result<Vec<u64>, OverlapError> {
            let mut out = vec![0u64; local.len()];
            self.comm
                .all_reduce_into(local, &mut out[..], SystemOperation::max());
            Ok(out)
        }

        fn all_reduce_sum(&self, local: &[u64]) -> Result<Vec<u64>, OverlapError> {
            let mut out = vec![0u64; local.len()];
            self.comm
                .all_reduce_into(local, &mut out[..], SystemOperation::sum());
            Ok(out)
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::{MpiComm, MpiRecvHandle, MpiSendHandle};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_roundtrip_two_ranks() {
        let world = LocalWorld::new(2);
        let comms = world.comms();
        let tag = CommTag::new(7);

        let mut pending = vec![comms[1].irecv_any(tag, 4).unwrap()];
        comms[0]
            .isend(1, tag, Bytes::from_static(&[1, 2, 3, 4]))
            .unwrap()
            .wait()
            .unwrap();
        let env = comms[1].wait_any(&mut pending).unwrap();
        assert!(pending.is_empty());
        assert_eq!(env.source, 0);
        assert_eq!(&env.payload[..], &[1, 2, 3, 4]);
    }

    #[test]
    fn tags_do_not_mix() {
        let world = LocalWorld::new(2);
        let comms = world.comms();
        comms[0]
            .isend(1, CommTag::new(1), Bytes::from_static(b"a"))
            .unwrap();
        assert!(comms[1].try_recv_any(CommTag::new(2)).is_none());
        assert!(comms[1].try_recv_any(CommTag::new(1)).is_some());
    }

    #[test]
    fn wait_any_blocks_until_delivery() {
        let out = LocalWorld::run(2, |comm| {
            let tag = CommTag::new(11);
            if comm.rank() == 1 {
                let mut pending = vec![
                    comm.irecv_any(tag, 8).unwrap(),
                    comm.irecv_any(tag, 8).unwrap(),
                ];
                let a = comm.wait_any(&mut pending).unwrap();
                let b = comm.wait_any(&mut pending).unwrap();
                assert!(pending.is_empty());
                vec![a.payload[0], b.payload[0]]
            } else {
                std::thread::sleep(std::time::Duration::from_millis(20));
                comm.isend(1, tag, Bytes::from_static(&[5])).unwrap();
                comm.isend(1, tag, Bytes::from_static(&[6])).unwrap();
                Vec::new()
            }
        });
        assert_eq!(out[1], vec![5, 6]);
    }

    #[test]
    fn all_reduce_on_threads() {
        let out = LocalWorld::run(3, |comm| {
            let mut v = vec![0u64; 3];
            v[comm.rank()] = comm.rank() as u64 + 1;
            let max = comm.all_reduce_max(&v).unwrap();
            let sum = comm.all_reduce_sum(&[1, comm.rank() as u64]).unwrap();
            (max, sum)
        });
        for (max, sum) in out {
            assert_eq!(max, vec![1, 2, 3]);
            assert_eq!(sum, vec![3, 3]);
        }
    }

    #[test]
    fn no_comm_is_identity() {
        let c = NoComm;
        assert_eq!(c.all_reduce_max(&[4, 2]).unwrap(), vec![4, 2]);
        assert_eq!(c.all_reduce_sum(&[4, 2]).unwrap(), vec![4, 2]);
        assert!(c.irecv_any(CommTag::new(0), 8).is_err());
        assert!(c.isend(1, CommTag::new(0), Bytes::new()).is_err());
    }

    #[test]
    fn overlap_tags_are_distinct() {
        let tags = OverlapTags::from_base(CommTag::new(0xFFFF));
        assert_ne!(tags.request, tags.response);
        assert_eq!(tags.response.as_u16(), 0);
    }

    #[test]
    fn portable_tag_bound() {
        assert!(CommTag::new(MAX_TAG).is_portable());
        assert!(!CommTag::new(MAX_TAG + 1).is_portable());
    }

    #[cfg(feature = "mpi-support")]
    #[test]
    fn mpi_roundtrip_and_reduce() {
        let universe = mpi::initialize().unwrap();
        let comm = MpiComm::new(universe.world());
        let size = comm.size();
        let nbr = (comm.rank() + 1) % size;
        let tag = CommTag::new(9);

        let mut pending = vec![comm.irecv_any(tag, 4).unwrap()];
        let s = comm
            .isend(nbr, tag, Bytes::from(vec![42u8, comm.rank() as u8]))
            .unwrap();
        let env = comm.wait_any(&mut pending).unwrap();
        s.wait().unwrap();
        assert_eq!(env.source, (comm.rank() + size - 1) % size);
        assert_eq!(&env.payload[..], &[42, env.source as u8]);

        let max = comm.all_reduce_max(&[comm.rank() as u64, 1]).unwrap();
        let sum = comm.all_reduce_sum(&[1, comm.rank() as u64]).unwrap();
        assert_eq!(max, vec![size as u64 - 1, 1]);
        assert_eq!(sum, vec![size as u64, (size * (size - 1) / 2) as u64]);
    }
}
