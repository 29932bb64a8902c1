/// Async driver for [`FeedMonitor`]
///
/// The monitor runs on a local task (the parsed page is not `Send`), so
/// [`spawn`] must be called from within a `tokio::task::LocalSet`. Everything
/// else talks to it through the cloneable [`MonitorHandle`].
use super::{FeedMonitor, MonitorEvent, MonitorSnapshot};
use crate::classify::Classifier;
use crate::error::{FilterError, Result};
use crate::extract::AttributeExtractor;
use crate::page::PageEdit;
use crate::render::Renderer;
use crate::scan::CardRow;
use crate::settings::{FilterMessage, FilterSettings, PartialSettings, StatusReply};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const COMMAND_BUFFER: usize = 64;

enum Command {
    Event(MonitorEvent),
    UpdateFilters {
        settings: PartialSettings,
        reply: oneshot::Sender<StatusReply>,
    },
    Settings(oneshot::Sender<FilterSettings>),
    Snapshot(oneshot::Sender<MonitorSnapshot>),
    Rows(oneshot::Sender<Vec<CardRow>>),
    Shutdown,
}

/// Sends events and queries to a running monitor
#[derive(Clone)]
pub struct MonitorHandle {
    tx: mpsc::Sender<Command>,
}

/// The task running the monitor; yields the monitor back on shutdown
pub struct MonitorTask<E, C, R> {
    handle: MonitorHandle,
    join: JoinHandle<FeedMonitor<E, C, R>>,
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

/// Start `monitor` on a local task and attach its observer
pub fn spawn<E, C, R>(mut monitor: FeedMonitor<E, C, R>) -> (MonitorHandle, MonitorTask<E, C, R>)
where
    E: AttributeExtractor + 'static,
    C: Classifier + 'static,
    R: Renderer + 'static,
{
    let (tx, mut rx) = mpsc::channel(COMMAND_BUFFER);
    let handle = MonitorHandle { tx };

    let join = tokio::task::spawn_local(async move {
        monitor.start(now());
        info!("🚀 Feed monitor running on {}", monitor.page().url());

        loop {
            let deadline = monitor.next_deadline();
            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => dispatch(&mut monitor, command),
                },
                _ = sleep_until(deadline) => monitor.fire_due(now()),
            }
        }

        monitor.stop();
        info!("Feed monitor shut down");
        monitor
    });

    (
        handle.clone(),
        MonitorTask {
            handle,
            join,
        },
    )
}

fn dispatch<E, C, R>(monitor: &mut FeedMonitor<E, C, R>, command: Command)
where
    E: AttributeExtractor,
    C: Classifier,
    R: Renderer,
{
    match command {
        Command::Event(event) => {
            monitor.handle(event, now());
        }
        Command::UpdateFilters { settings, reply } => {
            if let Some(status) = monitor.handle(MonitorEvent::UpdateFilters(settings), now()) {
                if reply.send(status).is_err() {
                    debug!("Update acknowledgement dropped by caller");
                }
            }
        }
        Command::Settings(reply) => {
            let _ = reply.send(monitor.settings().clone());
        }
        Command::Snapshot(reply) => {
            let _ = reply.send(monitor.snapshot());
        }
        Command::Rows(reply) => {
            let _ = reply.send(monitor.rows());
        }
        Command::Shutdown => {}
    }
}

impl MonitorHandle {
    async fn command(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| FilterError::MonitorClosed)
    }

    async fn query<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.command(make(reply)).await?;
        response.await.map_err(|_| FilterError::MonitorClosed)
    }

    async fn event(&self, event: MonitorEvent) -> Result<()> {
        self.command(Command::Event(event)).await
    }

    /// Apply a host edit to the page
    pub async fn send(&self, edit: PageEdit) -> Result<()> {
        self.event(MonitorEvent::Page(edit)).await
    }

    pub async fn navigate_finished(&self) -> Result<()> {
        self.event(MonitorEvent::NavigateFinished).await
    }

    pub async fn storage_changed(&self, stored: PartialSettings) -> Result<()> {
        self.event(MonitorEvent::StorageChanged(stored)).await
    }

    /// Merge `settings` over the current ones and reclassify every card
    pub async fn update_filters(&self, settings: PartialSettings) -> Result<StatusReply> {
        self.query(|reply| Command::UpdateFilters { settings, reply }).await
    }

    /// Handle a message from the settings surface
    pub async fn deliver(&self, message: FilterMessage) -> Result<StatusReply> {
        match message {
            FilterMessage::UpdateFilters { settings } => self.update_filters(settings).await,
        }
    }

    pub async fn settings(&self) -> Result<FilterSettings> {
        self.query(Command::Settings).await
    }

    pub async fn snapshot(&self) -> Result<MonitorSnapshot> {
        self.query(Command::Snapshot).await
    }

    pub async fn rows(&self) -> Result<Vec<CardRow>> {
        self.query(Command::Rows).await
    }

    pub async fn scan_now(&self) -> Result<()> {
        self.event(MonitorEvent::ScanNow).await
    }

    pub async fn reapply(&self) -> Result<()> {
        self.event(MonitorEvent::Reapply).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.event(MonitorEvent::Stop).await
    }

    pub async fn start(&self) -> Result<()> {
        self.event(MonitorEvent::Start).await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<E, C, R> MonitorTask<E, C, R> {
    /// Stop the monitor after the events already queued and return it
    pub async fn shutdown(self) -> Result<FeedMonitor<E, C, R>> {
        if self.handle.command(Command::Shutdown).await.is_err() {
            warn!("Monitor already stopped before shutdown");
        }
        self.join.await.map_err(|e| {
            warn!("Monitor task failed: {}", e);
            FilterError::MonitorClosed
        })
    }
}

/// Forward settings-file changes into the monitor as storage events
pub fn forward_settings(
    handle: MonitorHandle,
    mut changes: mpsc::Receiver<PartialSettings>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(stored) = changes.recv().await {
            if handle.storage_changed(stored).await.is_err() {
                break;
            }
        }
        debug!("Settings forwarding stopped");
    })
}
