//! Single dispatch loop that owns the [`ViewController`].
//!
//! Every interaction is an [`Event`] sent over one channel, so the view state
//! and filtered records are only ever touched by one task, one event at a time.

use crate::chart::Tooltip;
use crate::map::MapSnapshot;
use crate::types::{DecadeFilter, View, ViewState};
use crate::view::{Display, Rendered, ViewController};
use anyhow::{anyhow, Result};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ViewSelected(View),
    FilterChanged(DecadeFilter),
    PointerMoved { x: f64, y: f64 },
    PointerLeft,
    Inspect,
    MarkersWithin { min: [f64; 2], max: [f64; 2] },
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub state: ViewState,
    pub display: Display,
    pub tooltip: Option<Tooltip>,
    pub decades: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    Rendered(Rendered),
    Tooltip(Option<Tooltip>),
    Snapshot(Snapshot),
    Markers(Option<MapSnapshot>),
}

struct Envelope {
    event: Event,
    reply: oneshot::Sender<Result<Outcome>>,
}

/// Cloneable sender side of the dispatch loop.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<Envelope>,
}

impl ControllerHandle {
    pub async fn send(&self, event: Event) -> Result<Outcome> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Envelope { event, reply })
            .await
            .map_err(|_| anyhow!("View controller has stopped"))?;
        rx.await.map_err(|_| anyhow!("View controller dropped the request"))?
    }
}

/// Render the initial view, then start the loop. It exits once every handle is dropped.
pub fn spawn(mut controller: ViewController) -> (ControllerHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Envelope>(CHANNEL_CAPACITY);
    controller.render();

    let task = tokio::spawn(async move {
        while let Some(Envelope { event, reply }) = rx.recv().await {
            debug!(?event, "Dispatching event");
            let outcome = handle(&mut controller, event);
            let _ = reply.send(outcome);
        }
        info!("View controller stopped");
    });

    (ControllerHandle { tx }, task)
}

pub fn handle(controller: &mut ViewController, event: Event) -> Result<Outcome> {
    match event {
        Event::ViewSelected(view) => Ok(Outcome::Rendered(controller.select_view(view))),
        Event::FilterChanged(decade) => controller.change_filter(decade).map(Outcome::Rendered),
        Event::PointerMoved { x, y } => Ok(Outcome::Tooltip(controller.pointer_moved(x, y))),
        Event::PointerLeft => {
            controller.pointer_left();
            Ok(Outcome::Tooltip(None))
        }
        Event::Inspect => Ok(Outcome::Snapshot(Snapshot {
            state: controller.state().clone(),
            display: controller.display(),
            tooltip: controller.tooltip().cloned(),
            decades: controller.decade_options(),
        })),
        Event::MarkersWithin { min, max } => {
            Ok(Outcome::Markers(controller.map().snapshot_within(min, max)))
        }
    }
}
