//! The one place where optimistic writes are sequenced.
//!
//! Every store mutation that reaches the gateway is expressed as an
//! [`Optimistic`] value and executed with [`Optimistic::run`]. `run` always
//! takes the snapshot before applying, and it restores that snapshot if the
//! remote call fails or times out.

use crate::error::StoreError;
use crate::gateway::GatewayResult;
use crate::store::StoreState;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::time::Duration;

/// A mutation that has been applied locally and is waiting on the gateway.
///
/// Dropping it before completion leaves the optimistic state in place.
pub type Pending<T> = Pin<Box<dyn Future<Output = Result<T, StoreError>>>>;

/// The steps of an optimistic mutation.
///
/// - `snapshot` reads the pre-mutation slice. Returning `None` skips the
///   mutation entirely (unknown document, blank input, ...).
/// - `apply` mutates local state synchronously.
/// - `remote` starts the gateway call.
/// - `confirm` reconciles local state with the gateway's reply.
/// - `revert` restores the captured slice.
pub struct Optimistic<Snap, Apply, Remote, Confirm, Revert> {
    pub operation: &'static str,
    pub snapshot: Snap,
    pub apply: Apply,
    pub remote: Remote,
    pub confirm: Confirm,
    pub revert: Revert,
}

impl<Snap, Apply, Remote, Confirm, Revert> Optimistic<Snap, Apply, Remote, Confirm, Revert> {
    pub fn run<S, R, T, Fut>(
        self,
        state: &Rc<RefCell<StoreState>>,
        timeout: Duration,
    ) -> Option<Pending<T>>
    where
        Snap: FnOnce(&StoreState) -> Option<S>,
        Apply: FnOnce(&mut StoreState, &S),
        Remote: FnOnce(&S) -> Fut,
        Fut: Future<Output = GatewayResult<R>> + 'static,
        Confirm: FnOnce(&mut StoreState, &S, R) -> T + 'static,
        Revert: FnOnce(&mut StoreState, S) + 'static,
        S: 'static,
        R: 'static,
        T: 'static,
    {
        let Optimistic {
            operation,
            snapshot,
            apply,
            remote,
            confirm,
            revert,
        } = self;

        let captured = snapshot(&*state.borrow());
        let Some(captured) = captured else {
            tracing::debug!(operation, "skipped: nothing to mutate");
            return None;
        };

        apply(&mut *state.borrow_mut(), &captured);
        tracing::debug!(operation, "applied optimistically");
        let call = remote(&captured);

        let state = Rc::clone(state);
        Some(Box::pin(async move {
            match bounded(operation, timeout, call).await {
                Ok(reply) => {
                    let value = confirm(&mut *state.borrow_mut(), &captured, reply);
                    tracing::info!(operation, "confirmed");
                    Ok(value)
                }
                Err(e) => {
                    revert(&mut *state.borrow_mut(), captured);
                    tracing::warn!(operation, error = %e, "rolled back");
                    Err(e)
                }
            }
        }))
    }
}

/// Awaits a gateway call under a deadline.
pub async fn bounded<R>(
    operation: &'static str,
    timeout: Duration,
    call: impl Future<Output = GatewayResult<R>>,
) -> Result<R, StoreError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(reply)) => Ok(reply),
        Ok(Err(source)) => Err(StoreError::Gateway { operation, source }),
        Err(_) => Err(StoreError::Timeout { operation, timeout }),
    }
}
