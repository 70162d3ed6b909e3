//! Live, cached views of Workload API material.
//!
//! Each source owns one background task that watches the Workload API and
//! installs every update as an immutable snapshot. Getters hand out `Arc`s to
//! the current snapshot and never block on the network.
//!
//! A source moves through `Uninitialized → Initialized → Disposed`:
//!
//! * getters fail with [`SourceError::InvalidState`] until the first update,
//! * [`SourceError::Disposed`] is returned after `dispose()`, whatever else happens,
//! * the background task stops only when the cancellation token handed to the
//!   source fires. Disposing does not stop it.

mod builder;
mod bundle;
mod error;
mod jwt;
mod x509;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::svid::x509::X509Svid;
use crate::workload_api::error::WorkloadApiError;

pub use builder::{BundleSourceBuilder, JwtSourceBuilder, X509SourceBuilder};
pub use bundle::WorkloadBundleSource;
pub use error::SourceError;
pub use jwt::JwtSource;
pub use x509::X509Source;

/// Chooses the current SVID out of every X.509 context update.
///
/// The choice is made again on every update, so a picker that depends on the
/// agent's ordering may switch SVIDs when the agent reorders its response.
pub trait SvidPicker: Send + Sync {
    /// Returns the SVID to serve, or `None` if no SVID is suitable.
    fn pick(&self, svids: &[Arc<X509Svid>]) -> Option<Arc<X509Svid>>;
}

impl<F> SvidPicker for F
where
    F: Fn(&[Arc<X509Svid>]) -> Option<Arc<X509Svid>> + Send + Sync,
{
    fn pick(&self, svids: &[Arc<X509Svid>]) -> Option<Arc<X509Svid>> {
        self(svids)
    }
}

/// Picks the first SVID, the agent's default.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstSvid;

impl SvidPicker for FirstSvid {
    fn pick(&self, svids: &[Arc<X509Svid>]) -> Option<Arc<X509Svid>> {
        svids.first().cloned()
    }
}

/// Called with an SVID once a source stops serving it: on rotation and on dispose.
///
/// Use it to evict key material from external key stores. The in-memory key is
/// zeroized when the last reference to the SVID is dropped.
pub trait KeyReleaseHook: Send + Sync {
    /// Releases the key material associated with `svid`.
    fn release(&self, svid: &X509Svid);
}

impl<F> KeyReleaseHook for F
where
    F: Fn(&X509Svid) + Send + Sync,
{
    fn release(&self, svid: &X509Svid) {
        self(svid);
    }
}

const UNINITIALIZED: u8 = 0;
const INITIALIZED: u8 = 1;
const DISPOSED: u8 = 2;

/// State flag plus the update sequence shared by every source.
#[derive(Debug)]
struct Lifecycle {
    state: AtomicU8,
    updates: watch::Sender<u64>,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(UNINITIALIZED),
            updates: watch::Sender::new(0),
        }
    }

    fn check(&self) -> Result<(), SourceError> {
        match self.state.load(Ordering::Acquire) {
            INITIALIZED => Ok(()),
            DISPOSED => Err(SourceError::Disposed),
            _ => Err(SourceError::InvalidState),
        }
    }

    fn is_initialized(&self) -> bool {
        self.state.load(Ordering::Acquire) == INITIALIZED
    }

    fn is_disposed(&self) -> bool {
        self.state.load(Ordering::Acquire) == DISPOSED
    }

    /// Moves `Uninitialized` to `Initialized`; any other state is kept.
    fn mark_initialized(&self) {
        let _ = self.state.compare_exchange(
            UNINITIALIZED,
            INITIALIZED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Returns `false` if the source was already disposed.
    fn dispose(&self) -> bool {
        self.state.swap(DISPOSED, Ordering::AcqRel) != DISPOSED
    }

    fn publish(&self) -> u64 {
        let mut seq = 0;
        self.updates.send_modify(|current| {
            *current += 1;
            seq = *current;
        });
        seq
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.updates.subscribe()
    }
}

/// Waits for the first snapshot, racing cancellation, the timeout and the
/// watch task ending early.
async fn wait_until_ready(
    lifecycle: &Lifecycle,
    watch_task: &mut JoinHandle<Result<(), WorkloadApiError>>,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<(), SourceError> {
    let mut updates = lifecycle.subscribe();

    let ready = async {
        // The sender outlives this call, so `wait_for` only returns once the
        // predicate holds.
        let _ = updates.wait_for(|_| lifecycle.is_initialized()).await;
    };

    let deadline = async {
        match timeout {
            Some(timeout) => {
                tokio::time::sleep(timeout).await;
                timeout
            }
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(SourceError::InitializationCancelled),
        () = ready => Ok(()),
        joined = watch_task => match joined {
            Ok(Err(err)) => Err(SourceError::WorkloadApi(err)),
            Ok(Ok(())) | Err(_) => Err(SourceError::InitializationCancelled),
        },
        timeout = deadline => Err(SourceError::InitializationTimeout(timeout)),
    }
}
