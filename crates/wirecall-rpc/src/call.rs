use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};

use tracing::{debug, warn};

use crate::context::Context;
use crate::error::{Result, RpcError};

/// Terminal outcome of one call, delivered exactly once on its completion
/// channel.
#[derive(Debug)]
pub struct Completion<R> {
    pub seq: u64,
    pub service_method: String,
    pub result: Result<R>,
}

/// Handle to an in-flight call returned by [`Client::go`](crate::Client::go).
///
/// Owns the receiving end of a capacity-1 completion channel. Dropping the
/// handle abandons the call; a late response is then discarded.
#[derive(Debug)]
pub struct Call<R> {
    seq: u64,
    service_method: String,
    done: Receiver<Completion<R>>,
}

impl<R> Call<R> {
    pub(crate) fn new(seq: u64, service_method: String, done: Receiver<Completion<R>>) -> Self {
        Self {
            seq,
            service_method,
            done,
        }
    }

    /// Sequence number assigned to this call.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn service_method(&self) -> &str {
        &self.service_method
    }

    /// Block until the call completes.
    pub fn wait(self) -> Result<R> {
        match self.done.recv() {
            Ok(completion) => completion.result,
            Err(_) => Err(RpcError::ConnectionClosed),
        }
    }

    /// Block until the call completes or the context's deadline passes,
    /// whichever comes first.
    ///
    /// On timeout the call stays registered with the client; its response,
    /// if one ever arrives, is dropped.
    pub fn wait_with(self, ctx: &Context) -> Result<R> {
        let Some(remaining) = ctx.remaining() else {
            return self.wait();
        };
        match self.done.recv_timeout(remaining) {
            Ok(completion) => completion.result,
            Err(RecvTimeoutError::Timeout) => {
                debug!(seq = self.seq, method = %self.service_method, "call deadline elapsed");
                Err(RpcError::Timeout)
            }
            Err(RecvTimeoutError::Disconnected) => Err(RpcError::ConnectionClosed),
        }
    }

    /// Non-blocking poll. `None` while the call is still outstanding.
    pub fn try_result(&self) -> Option<Result<R>> {
        match self.done.try_recv() {
            Ok(completion) => Some(completion.result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(RpcError::ConnectionClosed)),
        }
    }
}

/// Hand a completion to its channel without ever blocking the caller.
pub(crate) fn deliver<R>(done: &SyncSender<Completion<R>>, completion: Completion<R>) {
    match done.try_send(completion) {
        Ok(()) => {}
        Err(TrySendError::Full(completion)) => {
            warn!(
                seq = completion.seq,
                method = %completion.service_method,
                "completion channel full; dropping result"
            );
        }
        Err(TrySendError::Disconnected(completion)) => {
            debug!(
                seq = completion.seq,
                method = %completion.service_method,
                "caller no longer waiting; discarding result"
            );
        }
    }
}
