//! Best-effort delivery of accepted LED commands to the physical controller.
//!
//! The hub enqueues an intent and moves on; this worker resolves the target,
//! makes one bounded-timeout HTTP call, and reports failure as a
//! `server_message` event. No retries, no rollback.

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::directory::Directory;
use crate::types::{Event, LedState, Severity, ServerMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardIntent {
    pub state: LedState,
}

pub fn spawn_worker(
    mut intents: mpsc::Receiver<ForwardIntent>,
    directory: Directory,
    events: broadcast::Sender<Event>,
    client: reqwest::Client,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(intent) = intents.recv().await {
            forward_one(&directory, &events, &client, intent).await;
        }
    })
}

async fn forward_one(
    directory: &Directory,
    events: &broadcast::Sender<Event>,
    client: &reqwest::Client,
    intent: ForwardIntent,
) {
    let Some(target) = directory.resolve_target().await else {
        warn!("no controller registered, dropping LED command");
        report(events, "No controller registered; LED state saved but not forwarded.");
        return;
    };

    let url = format!("{}/api/control-led", target.base_url.trim_end_matches('/'));
    match client.post(&url).json(&intent.state).send().await {
        Ok(resp) if resp.status().is_success() => {
            debug!(%url, ?intent.state, "LED command forwarded");
        }
        Ok(resp) => {
            warn!(%url, status = %resp.status(), "device rejected LED command");
            report(
                events,
                format!("Failed to control device at {url}: HTTP {}", resp.status()),
            );
        }
        Err(e) => {
            warn!(%url, "LED command forwarding failed: {e}");
            report(events, format!("Failed to contact microcontrollers: {e}"));
        }
    }
}

fn report(events: &broadcast::Sender<Event>, text: impl Into<String>) {
    let _ = events.send(Event::ServerMessage(ServerMessage {
        kind: Severity::Error,
        text: text.into(),
    }));
}
