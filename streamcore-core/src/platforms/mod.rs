// File: src/platforms/mod.rs

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use streamcore_common::models::ChatMessage;

use crate::eventbus::{BotEvent, EventBus};
use crate::tasks::{StopSignal, Supervisor};
use crate::Error;

pub mod twitch_irc;
pub mod stdin;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// A producer of normalized chat messages (one per platform connection).
#[cfg_attr(test, mockall::automock)]
pub trait ChatSource {
    /// Label used in logs.
    fn name(&self) -> &str;

    /// Blocks until at least one line arrived or the source failed.
    /// `Ok(None)` means the source has ended for good.
    fn next_batch(&mut self) -> Result<Option<Vec<ChatMessage>>, Error>;
}

/// Pumps `source` into `chat:message_received` until it ends or `stop` is
/// raised. Errors back off exponentially (capped) and never end the loop.
pub fn run_connector(
    source: &mut dyn ChatSource,
    bus: &EventBus,
    stop: &StopSignal,
    initial_backoff: Duration,
) -> u64 {
    let name = source.name().to_string();
    let mut published = 0u64;
    let mut backoff = initial_backoff;
    info!(connector = %name, "connector started");

    while !stop.is_stopped() {
        match source.next_batch() {
            Ok(Some(batch)) => {
                backoff = initial_backoff;
                for msg in batch {
                    debug!(connector = %name, platform = %msg.platform(), sender = %msg.sender(), "chat message");
                    bus.publish(BotEvent::ChatMessageReceived(msg));
                    published += 1;
                }
            }
            Ok(None) => {
                info!(connector = %name, "source ended");
                break;
            }
            Err(e) => {
                warn!(connector = %name, "source error, retrying in {:?}: {}", backoff, e);
                if stop.wait_timeout(backoff) {
                    break;
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }

    info!(connector = %name, published, "connector stopped");
    published
}

/// Runs a connector on its own supervised thread. The source is built on
/// that thread, so it does not need to be `Send`.
pub fn spawn_connector<F>(
    supervisor: &Supervisor,
    bus: Arc<EventBus>,
    thread_name: &str,
    make_source: F,
) -> Result<(), Error>
where
    F: FnOnce() -> Result<Box<dyn ChatSource>, Error> + Send + 'static,
{
    let label = thread_name.to_string();
    supervisor.spawn(thread_name, move |stop| match make_source() {
        Ok(mut source) => {
            run_connector(source.as_mut(), &bus, &stop, Duration::from_millis(500));
        }
        Err(e) => warn!(connector = %label, "could not start connector: {}", e),
    })
}
