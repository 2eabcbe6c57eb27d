//! One asynchronous exchange phase: post receives, post sends, overlap local
//! work with the transfer, then drain completions in arrival order.
//!
//! Both phases of an overlap iteration (requests, then replies) run through
//! [`run_phase`]. Receives are wildcard-source with a fixed maximum size agreed
//! through an all-reduce beforehand; each completion reports its sender, so the
//! caller never relies on receive-slot order. Every send handle is drained
//! before the phase returns, even when a receive fails.

use crate::algs::communicator::{CommTag, Communicator, Envelope, Wait};
use crate::algs::wire::WORD_BYTES;
use crate::overlap_error::OverlapError;
use bytes::Bytes;

/// Outstanding sends of one phase. Each handle owns its buffer.
pub struct PendingSends<H> {
    handles: Vec<(usize, H)>,
}

impl<H: Wait> PendingSends<H> {
    /// Post one send per `(destination, payload)`.
    pub fn post<C>(
        comm: &C,
        tag: CommTag,
        outgoing: impl IntoIterator<Item = (usize, Bytes)>,
    ) -> Result<Self, OverlapError>
    where
        C: Communicator<SendHandle = H>,
    {
        let mut handles = Vec::new();
        for (dst, buf) in outgoing {
            handles.push((dst, comm.isend(dst, tag, buf)?));
        }
        Ok(Self { handles })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every send; all handles are drained before the first error is returned.
    pub fn wait_all(self) -> Result<(), OverlapError> {
        let mut maybe_err = None;
        for (_dst, h) in self.handles {
            if let Err(e) = h.wait() {
                maybe_err.get_or_insert(e);
            }
        }
        match maybe_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// `count` posted wildcard-source receives on `tag`, each at most `max_words` long.
pub struct PendingRecvs<C: Communicator> {
    tag: CommTag,
    handles: Vec<C::RecvHandle>,
    max_bytes: usize,
}

impl<C: Communicator> PendingRecvs<C> {
    /// Post all `count` receives on the transport.
    pub fn post(
        comm: &C,
        tag: CommTag,
        count: usize,
        max_words: usize,
    ) -> Result<Self, OverlapError> {
        let max_bytes = max_words * WORD_BYTES;
        let mut handles = Vec::with_capacity(count);
        for _ in 0..count {
            handles.push(comm.irecv_any(tag, max_bytes)?);
        }
        Ok(Self {
            tag,
            handles,
            max_bytes,
        })
    }

    /// Receives not yet completed.
    pub fn remaining(&self) -> usize {
        self.handles.len()
    }

    /// Complete whichever receive finishes next; `None` once all are done.
    pub fn wait_any(&mut self, comm: &C) -> Result<Option<Envelope>, OverlapError> {
        if self.handles.is_empty() {
            return Ok(None);
        }
        let env = comm.wait_any(&mut self.handles)?;
        if env.payload.len() > self.max_bytes {
            return Err(OverlapError::malformed(
                env.source,
                format!(
                    "message of {} bytes exceeds the agreed maximum of {} bytes",
                    env.payload.len(),
                    self.max_bytes
                ),
            ));
        }
        log::trace!(
            "[{}] tag {:#x}: {} bytes from rank {} ({} outstanding)",
            comm.rank(),
            self.tag.as_u16(),
            env.payload.len(),
            env.source,
            self.handles.len()
        );
        Ok(Some(env))
    }

    /// Complete every remaining receive, in arrival order.
    pub fn drain(mut self, comm: &C) -> Result<Vec<Envelope>, OverlapError> {
        let mut out = Vec::with_capacity(self.handles.len());
        while let Some(env) = self.wait_any(comm)? {
            out.push(env);
        }
        Ok(out)
    }
}

/// Run one exchange phase.
///
/// `expected` receives of at most `max_words` are posted on the transport
/// first, then one send per entry of `outgoing`. `local_work` runs while the
/// messages are in flight. Returns its result together with all received envelopes.
pub fn run_phase<C, R>(
    comm: &C,
    tag: CommTag,
    outgoing: Vec<(usize, Bytes)>,
    expected: usize,
    max_words: usize,
    local_work: impl FnOnce() -> R,
) -> Result<(R, Vec<Envelope>), OverlapError>
where
    C: Communicator,
{
    let recvs = PendingRecvs::post(comm, tag, expected, max_words)?;
    let sends = PendingSends::post(comm, tag, outgoing)?;

    let local = local_work();

    let received = recvs.drain(comm);
    let sent = sends.wait_all();
    let received = received?;
    sent?;
    Ok((local, received))
}
