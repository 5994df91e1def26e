//! Outbound side effects run on the task queue: notifications, the
//! deterrent actuator and spoken announcements.
//!
//! Every call here is best effort. Failures are returned to the task queue,
//! which logs them; tracking state never depends on the outcome.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use chrono::{Duration, NaiveDateTime};

// -------------------- Notifier --------------------

pub trait Notifier: Send {
    fn notify(&mut self, title: &str, message: &str) -> Result<()>;
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn notify(&mut self, title: &str, message: &str) -> Result<()> {
        (**self).notify(title, message)
    }
}

/// Writes notifications to the log only.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&mut self, title: &str, message: &str) -> Result<()> {
        log::info!("notification: {}: {}", title, message);
        Ok(())
    }
}

/// Drops notifications raised within `cooldown` of the last delivered one.
///
/// Times are frame-clock timestamps carried on the task, so a replay run at
/// any speed suppresses the same notifications as the live stream did. A
/// timestamp earlier than the last delivery (a new stream) is never held back.
pub struct CooldownNotifier<N> {
    inner: N,
    cooldown: Duration,
    last_sent: Option<NaiveDateTime>,
}

impl<N: Notifier> CooldownNotifier<N> {
    pub fn new(inner: N, cooldown: Duration) -> Self {
        Self {
            inner,
            cooldown,
            last_sent: None,
        }
    }

    /// No suppression at all.
    pub fn passthrough(inner: N) -> Self {
        Self::new(inner, Duration::zero())
    }

    fn cooling_down(&self, at: NaiveDateTime) -> bool {
        match self.last_sent {
            Some(last) if at >= last => at - last < self.cooldown,
            _ => false,
        }
    }

    pub fn notify_at(&mut self, at: NaiveDateTime, title: &str, message: &str) -> Result<()> {
        if self.cooling_down(at) {
            log::debug!("notification suppressed by cooldown: {}", title);
            return Ok(());
        }
        self.inner.notify(title, message)?;
        self.last_sent = Some(at);
        Ok(())
    }
}

#[cfg(feature = "notify-http")]
pub use http::{LinkTapDeterrent, PushsaferNotifier};

// -------------------- Deterrent --------------------

pub trait Deterrent: Send {
    fn activate(&mut self, reason: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct LogDeterrent;

impl Deterrent for LogDeterrent {
    fn activate(&mut self, reason: &str) -> Result<()> {
        log::info!("deterrent triggered: {}", reason);
        Ok(())
    }
}

// -------------------- Announcer --------------------

pub trait Announcer: Send {
    fn announce(&mut self, phrase: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct LogAnnouncer;

impl Announcer for LogAnnouncer {
    fn announce(&mut self, phrase: &str) -> Result<()> {
        log::info!("announce: {}", phrase);
        Ok(())
    }
}

/// Runs `program [args..] <phrase>` and waits for it, e.g. a TTS player.
#[derive(Debug, Clone)]
pub struct CommandAnnouncer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandAnnouncer {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a whitespace-separated command line into program and arguments.
    pub fn from_command_line(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| anyhow!("announce command must not be empty"))?;
        Ok(Self::new(program, parts.map(str::to_string).collect()))
    }
}

impl Announcer for CommandAnnouncer {
    fn announce(&mut self, phrase: &str) -> Result<()> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(phrase)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .with_context(|| format!("failed to run {}", self.program.display()))?;
        if !status.success() {
            return Err(anyhow!(
                "{} exited with {}",
                self.program.display(),
                status
            ));
        }
        Ok(())
    }
}

// -------------------- HTTP integrations --------------------

#[cfg(feature = "notify-http")]
mod http {
    use super::{Deterrent, Notifier};
    use anyhow::{anyhow, Context, Result};

    const PUSHSAFER_URL: &str = "https://www.pushsafer.com/api";
    const LINKTAP_URL: &str = "https://www.link-tap.com/api/activateInstantMode";

    /// Pushsafer push notifications.
    pub struct PushsaferNotifier {
        private_key: String,
        device: Option<String>,
    }

    impl PushsaferNotifier {
        pub fn new(private_key: impl Into<String>, device: Option<String>) -> Self {
            Self {
                private_key: private_key.into(),
                device,
            }
        }
    }

    impl Notifier for PushsaferNotifier {
        fn notify(&mut self, title: &str, message: &str) -> Result<()> {
            let mut form: Vec<(&str, &str)> = vec![
                ("k", self.private_key.as_str()),
                ("t", title),
                ("m", message),
                ("i", "176"),
                ("s", "61"),
                ("v", "3"),
            ];
            if let Some(device) = self.device.as_deref() {
                form.push(("d", device));
            }
            let body = ureq::post(PUSHSAFER_URL)
                .send_form(&form)
                .context("pushsafer request")?
                .into_string()
                .context("read pushsafer response")?;
            let reply: serde_json::Value =
                serde_json::from_str(&body).context("pushsafer response is not JSON")?;
            if reply.get("status").and_then(serde_json::Value::as_i64) != Some(1) {
                return Err(anyhow!("pushsafer rejected notification: {}", body));
            }
            log::info!("notification sent: {}", title);
            Ok(())
        }
    }

    /// LinkTap water valve, opened in instant mode for a fixed duration.
    pub struct LinkTapDeterrent {
        username: String,
        api_key: String,
        gateway_id: String,
        taplinker_id: String,
        duration_secs: u32,
    }

    impl LinkTapDeterrent {
        pub fn new(
            username: impl Into<String>,
            api_key: impl Into<String>,
            gateway_id: impl Into<String>,
            taplinker_id: impl Into<String>,
            duration_secs: u32,
        ) -> Self {
            Self {
                username: username.into(),
                api_key: api_key.into(),
                gateway_id: gateway_id.into(),
                taplinker_id: taplinker_id.into(),
                duration_secs,
            }
        }
    }

    impl Deterrent for LinkTapDeterrent {
        fn activate(&mut self, reason: &str) -> Result<()> {
            let minutes = (self.duration_secs / 60).to_string();
            let seconds = (self.duration_secs % 60).to_string();
            let body = ureq::post(LINKTAP_URL)
                .send_form(&[
                    ("username", self.username.as_str()),
                    ("apiKey", self.api_key.as_str()),
                    ("gatewayId", self.gateway_id.as_str()),
                    ("taplinkerId", self.taplinker_id.as_str()),
                    ("action", "true"),
                    ("duration", minutes.as_str()),
                    ("durationSec", seconds.as_str()),
                    ("eco", "false"),
                    ("autoBack", "true"),
                ])
                .context("linktap request")?
                .into_string()
                .context("read linktap response")?;
            let reply: serde_json::Value =
                serde_json::from_str(&body).context("linktap response is not JSON")?;
            if reply.get("result").and_then(serde_json::Value::as_str) == Some("error") {
                return Err(anyhow!("linktap refused activation: {}", body));
            }
            log::info!(
                "watering for {}s ({})",
                self.duration_secs,
                reason
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recording(Arc<Mutex<Vec<String>>>);

    impl Notifier for Recording {
        fn notify(&mut self, title: &str, _message: &str) -> Result<()> {
            self.0.lock().unwrap().push(title.to_string());
            Ok(())
        }
    }

    struct Failing;

    impl Notifier for Failing {
        fn notify(&mut self, _title: &str, _message: &str) -> Result<()> {
            Err(anyhow!("offline"))
        }
    }

    fn at(seconds: i64) -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
            + Duration::seconds(seconds)
    }

    #[test]
    fn cooldown_drops_repeats() {
        let sent = Recording::default();
        let mut notifier = CooldownNotifier::new(sent.clone(), Duration::seconds(300));
        notifier.notify_at(at(0), "first", "m").unwrap();
        notifier.notify_at(at(299), "second", "m").unwrap();
        notifier.notify_at(at(300), "third", "m").unwrap();
        assert_eq!(
            *sent.0.lock().unwrap(),
            vec!["first".to_string(), "third".to_string()]
        );
    }

    #[test]
    fn cooldown_follows_frame_time_not_wall_time() {
        // An hour of frame time replayed in a few microseconds.
        let sent = Recording::default();
        let mut notifier = CooldownNotifier::new(sent.clone(), Duration::seconds(300));
        for minute in 0..60 {
            notifier.notify_at(at(minute * 60), "tick", "m").unwrap();
        }
        assert_eq!(sent.0.lock().unwrap().len(), 12);
    }

    #[test]
    fn earlier_timestamp_is_not_suppressed() {
        let sent = Recording::default();
        let mut notifier = CooldownNotifier::new(sent.clone(), Duration::seconds(300));
        notifier.notify_at(at(600), "late", "m").unwrap();
        notifier.notify_at(at(0), "rewound", "m").unwrap();
        assert_eq!(sent.0.lock().unwrap().len(), 2);
    }

    #[test]
    fn zero_cooldown_passes_everything() {
        let sent = Recording::default();
        let mut notifier = CooldownNotifier::passthrough(sent.clone());
        notifier.notify_at(at(0), "a", "m").unwrap();
        notifier.notify_at(at(0), "b", "m").unwrap();
        assert_eq!(sent.0.lock().unwrap().len(), 2);
    }

    #[test]
    fn failed_delivery_does_not_start_cooldown() {
        let mut notifier = CooldownNotifier::new(Failing, Duration::seconds(300));
        assert!(notifier.notify_at(at(0), "a", "m").is_err());
        assert!(notifier.last_sent.is_none());
    }

    #[test]
    fn command_line_is_split() {
        let announcer = CommandAnnouncer::from_command_line("espeak -v en").unwrap();
        assert_eq!(announcer.program, PathBuf::from("espeak"));
        assert_eq!(announcer.args, vec!["-v".to_string(), "en".to_string()]);
        assert!(CommandAnnouncer::from_command_line("   ").is_err());
    }
}
