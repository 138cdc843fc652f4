/// The peer's background loop.
///
/// A single task per active peer, multiplexing the liveness timer, the
/// store subscription and the shutdown signal.
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use xt_store::{Notification, StoreSubscription};

use super::engine::PeerCore;

pub(super) async fn peer_loop(
    core: Arc<PeerCore>,
    mut subscription: StoreSubscription,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut liveness = tokio::time::interval(core.config.ping_interval);
    liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // init() already wrote a fresh ping; skip the immediate first tick.
    liveness.tick().await;

    let mut subscribed = true;

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => break,

            _ = liveness.tick() => core.on_tick(),

            note = subscription.next(), if subscribed => match note {
                Some(Notification::Changed(event)) => core.on_change(&event),
                Some(Notification::Lagged(_)) => core.resync(),
                None => {
                    tracing::warn!(peer = %core.identity.id, "store subscription closed, polling on liveness ticks");
                    subscribed = false;
                }
            },
        }
    }

    tracing::debug!(peer = %core.identity.id, "peer loop stopped");
}
