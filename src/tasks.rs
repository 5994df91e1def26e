//! Background work decoupled from the frame path.
//!
//! The watcher only ever *submits* tasks, which is a non-blocking channel
//! send. Two worker threads run them: a media lane for transcodes and an
//! alert lane for notifications, announcements and the deterrent, so a long
//! re-encode never holds back an alert. Each lane runs its tasks in
//! submission order. Failures are logged and dropped.

use anyhow::{anyhow, Result};
use chrono::NaiveDateTime;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::config::WatcherConfig;
use crate::notify::{
    Announcer, CommandAnnouncer, CooldownNotifier, Deterrent, LogAnnouncer, LogDeterrent,
    LogNotifier, Notifier,
};
use crate::recorder::Transcoder;

#[derive(Clone, Debug, PartialEq)]
pub enum Task {
    /// Re-encode a kept `.m4v` clip to `.mp4`.
    Transcode { source: PathBuf },
    /// `raised_at` is the frame time the notification was raised at.
    Notify {
        title: String,
        message: String,
        raised_at: NaiveDateTime,
    },
    Announce { phrase: String },
    Deter { reason: String },
}

impl Task {
    pub fn kind(&self) -> &'static str {
        match self {
            Task::Transcode { .. } => "transcode",
            Task::Notify { .. } => "notify",
            Task::Announce { .. } => "announce",
            Task::Deter { .. } => "deter",
        }
    }

    pub fn lane(&self) -> Lane {
        match self {
            Task::Transcode { .. } => Lane::Media,
            _ => Lane::Alerts,
        }
    }
}

/// Worker thread a task runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lane {
    Media,
    Alerts,
}

/// Where the watcher hands off background work.
pub trait TaskSink: Send {
    fn submit(&self, task: Task) -> Result<()>;
}

/// Submit from the frame path, where a full or closed queue is only logged.
pub fn submit_or_log(sink: &dyn TaskSink, task: Task) {
    let kind = task.kind();
    if let Err(err) = sink.submit(task) {
        log::warn!("failed to queue {} task: {}", kind, err);
    }
}

/// Sink that only remembers what was submitted.
#[derive(Clone, Debug, Default)]
pub struct CollectingSink {
    tasks: Arc<Mutex<Vec<Task>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.tasks
            .lock()
            .map(|tasks| tasks.clone())
            .unwrap_or_default()
    }
}

impl TaskSink for CollectingSink {
    fn submit(&self, task: Task) -> Result<()> {
        self.tasks
            .lock()
            .map_err(|_| anyhow!("task list lock poisoned"))?
            .push(task);
        Ok(())
    }
}

// -------------------- Handlers --------------------

/// Collaborators that execute tasks on the worker threads.
pub struct TaskHandlers {
    pub transcoder: Option<Transcoder>,
    pub notifier: CooldownNotifier<Box<dyn Notifier>>,
    pub announcer: Box<dyn Announcer>,
    pub deterrent: Box<dyn Deterrent>,
}

impl TaskHandlers {
    /// Log-only handlers and no transcoder.
    pub fn logging() -> Self {
        Self {
            transcoder: None,
            notifier: CooldownNotifier::passthrough(
                Box::new(LogNotifier) as Box<dyn Notifier>
            ),
            announcer: Box::new(LogAnnouncer),
            deterrent: Box::new(LogDeterrent),
        }
    }

    pub fn from_config(cfg: &WatcherConfig) -> Result<Self> {
        let transcoder = (cfg.save_video || cfg.secondary_tracking.is_some())
            .then(|| Transcoder::new(&cfg.ffmpeg_path));

        let cooldown = cfg
            .notify
            .as_ref()
            .map(|notify| chrono::Duration::seconds(notify.cooldown_seconds as i64))
            .unwrap_or_else(chrono::Duration::zero);
        let notifier = CooldownNotifier::new(build_notifier(cfg), cooldown);

        let announcer: Box<dyn Announcer> = match cfg.announce_command.as_deref() {
            Some(line) => Box::new(CommandAnnouncer::from_command_line(line)?),
            None => Box::new(LogAnnouncer),
        };

        Ok(Self {
            transcoder,
            notifier,
            announcer,
            deterrent: build_deterrent(cfg),
        })
    }

    pub fn run(&mut self, task: Task) -> Result<()> {
        match task {
            Task::Transcode { source } => match &self.transcoder {
                Some(transcoder) => transcoder.transcode(&source).map(|_| ()),
                None => {
                    log::warn!("no transcoder configured, leaving {}", source.display());
                    Ok(())
                }
            },
            Task::Notify {
                title,
                message,
                raised_at,
            } => self.notifier.notify_at(raised_at, &title, &message),
            Task::Announce { phrase } => self.announcer.announce(&phrase),
            Task::Deter { reason } => self.deterrent.activate(&reason),
        }
    }
}

#[cfg(feature = "notify-http")]
fn build_notifier(cfg: &WatcherConfig) -> Box<dyn Notifier> {
    match cfg.notify.as_ref().and_then(|n| n.pushsafer_key.clone()) {
        Some(key) => {
            let device = cfg.notify.as_ref().and_then(|n| n.pushsafer_device.clone());
            Box::new(crate::notify::PushsaferNotifier::new(key, device))
        }
        None => Box::new(LogNotifier),
    }
}

#[cfg(not(feature = "notify-http"))]
fn build_notifier(cfg: &WatcherConfig) -> Box<dyn Notifier> {
    if cfg.notify.as_ref().is_some_and(|n| n.pushsafer_key.is_some()) {
        log::warn!("pushsafer key configured but built without notify-http; logging notifications");
    }
    Box::new(LogNotifier)
}

#[cfg(feature = "notify-http")]
fn build_deterrent(cfg: &WatcherConfig) -> Box<dyn Deterrent> {
    match cfg.deterrent.as_ref() {
        Some(settings) => match settings.linktap.as_ref() {
            Some(tap) => Box::new(crate::notify::LinkTapDeterrent::new(
                tap.username.clone(),
                tap.api_key.clone(),
                tap.gateway_id.clone(),
                tap.taplinker_id.clone(),
                settings.duration_secs,
            )),
            None => Box::new(LogDeterrent),
        },
        None => Box::new(LogDeterrent),
    }
}

#[cfg(not(feature = "notify-http"))]
fn build_deterrent(cfg: &WatcherConfig) -> Box<dyn Deterrent> {
    if cfg.deterrent.as_ref().is_some_and(|d| d.linktap.is_some()) {
        log::warn!("linktap configured but built without notify-http; logging deterrent calls");
    }
    Box::new(LogDeterrent)
}

// -------------------- Queue --------------------

enum Message {
    Run(Task),
    Shutdown,
}

/// Cloneable submission handle for a [`TaskQueue`].
#[derive(Clone)]
pub struct TaskSender {
    media: Sender<Message>,
    alerts: Sender<Message>,
}

impl TaskSink for TaskSender {
    fn submit(&self, task: Task) -> Result<()> {
        log::debug!("queued {} task", task.kind());
        let tx = match task.lane() {
            Lane::Media => &self.media,
            Lane::Alerts => &self.alerts,
        };
        tx.send(Message::Run(task))
            .map_err(|_| anyhow!("task queue is closed"))
    }
}

struct Worker {
    tx: Sender<Message>,
    join: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(name: &str, handlers: TaskHandlers, cancelled: Arc<AtomicBool>) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let join = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_worker(rx, handlers, cancelled))?;
        Ok(Self {
            tx,
            join: Some(join),
        })
    }

    fn signal(&self) {
        let _ = self.tx.send(Message::Shutdown);
    }

    fn join(&mut self) -> Result<()> {
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("task worker thread panicked"))?;
        }
        Ok(())
    }
}

pub struct TaskQueue {
    media: Worker,
    alerts: Worker,
    cancelled: Arc<AtomicBool>,
}

impl TaskQueue {
    pub fn spawn(handlers: TaskHandlers) -> Result<Self> {
        let TaskHandlers {
            transcoder,
            notifier,
            announcer,
            deterrent,
        } = handlers;
        let media = TaskHandlers {
            transcoder,
            ..TaskHandlers::logging()
        };
        let alerts = TaskHandlers {
            transcoder: None,
            notifier,
            announcer,
            deterrent,
        };

        let cancelled = Arc::new(AtomicBool::new(false));
        Ok(Self {
            media: Worker::spawn("watcher-media", media, cancelled.clone())?,
            alerts: Worker::spawn("watcher-alerts", alerts, cancelled.clone())?,
            cancelled,
        })
    }

    pub fn sender(&self) -> TaskSender {
        TaskSender {
            media: self.media.tx.clone(),
            alerts: self.alerts.tx.clone(),
        }
    }

    /// Run everything already submitted, then stop both workers.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    /// Drop pending tasks and stop once the running ones return.
    pub fn cancel(mut self) -> Result<()> {
        self.cancelled.store(true, Ordering::SeqCst);
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        self.alerts.signal();
        self.media.signal();
        let alerts = self.alerts.join();
        let media = self.media.join();
        alerts.and(media)
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        if self.media.join.is_some() || self.alerts.join.is_some() {
            self.cancelled.store(true, Ordering::SeqCst);
            self.alerts.signal();
            self.media.signal();
        }
    }
}

fn run_worker(rx: Receiver<Message>, mut handlers: TaskHandlers, cancelled: Arc<AtomicBool>) {
    while let Ok(message) = rx.recv() {
        let task = match message {
            Message::Run(task) => task,
            Message::Shutdown => break,
        };
        if cancelled.load(Ordering::SeqCst) {
            log::debug!("dropping {} task after cancel", task.kind());
            continue;
        }
        let kind = task.kind();
        if let Err(err) = handlers.run(task) {
            log::warn!("{} task failed: {:#}", kind, err);
        }
    }
}
