use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::time::Duration;

use super::source::{DetectedFrame, DetectionSource};

/// What the consumer of a [`FrameReader`] sees next.
#[derive(Debug)]
pub enum ReaderEvent {
    Frame(DetectedFrame),
    End,
    Failed(anyhow::Error),
    Stop,
}

/// Pulls frames from a source on its own thread into a bounded channel.
///
/// A source blocked in a read (stdin with no writer, say) never hides a stop
/// request: [`StopHandle::stop`] wakes the consumer directly.
pub struct FrameReader {
    events: Receiver<ReaderEvent>,
    stopping: Arc<AtomicBool>,
    wake: SyncSender<ReaderEvent>,
}

/// Cloneable handle that ends a [`FrameReader`] from any thread.
#[derive(Clone)]
pub struct StopHandle {
    stopping: Arc<AtomicBool>,
    wake: SyncSender<ReaderEvent>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        let _ = self.wake.try_send(ReaderEvent::Stop);
    }
}

impl FrameReader {
    /// `open` runs on the reader thread, so the source need not be `Send`.
    /// `pace` sleeps between frames for real-time replay.
    pub fn spawn<F>(open: F, pace: Option<Duration>, capacity: usize) -> Result<Self>
    where
        F: FnOnce() -> Box<dyn DetectionSource> + Send + 'static,
    {
        let (tx, events) = mpsc::sync_channel(capacity.max(1));
        let wake = tx.clone();
        std::thread::Builder::new()
            .name("watcher-reader".to_string())
            .spawn(move || {
                let mut source = open();
                loop {
                    let event = match source.next_frame() {
                        Ok(Some(frame)) => ReaderEvent::Frame(frame),
                        Ok(None) => {
                            log::info!(
                                "{}: end of input after {} frames",
                                source.name(),
                                source.frames_read()
                            );
                            ReaderEvent::End
                        }
                        Err(err) => ReaderEvent::Failed(
                            err.context(format!("{}: read failed", source.name())),
                        ),
                    };
                    let done = !matches!(event, ReaderEvent::Frame(_));
                    if tx.send(event).is_err() || done {
                        return;
                    }
                    if let Some(pace) = pace {
                        std::thread::sleep(pace);
                    }
                }
            })
            .map_err(|err| anyhow!("failed to start reader thread: {}", err))?;
        Ok(Self {
            events,
            stopping: Arc::new(AtomicBool::new(false)),
            wake,
        })
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stopping: self.stopping.clone(),
            wake: self.wake.clone(),
        }
    }

    /// Blocks for the next event. Once stopped, always returns `Stop`, even
    /// with frames still buffered.
    pub fn next_event(&self) -> ReaderEvent {
        if self.stopping.load(Ordering::SeqCst) {
            return ReaderEvent::Stop;
        }
        match self.events.recv() {
            Ok(_) if self.stopping.load(Ordering::SeqCst) => ReaderEvent::Stop,
            Ok(event) => event,
            Err(_) => ReaderEvent::End,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::ReplaySource;
    use std::io::{BufRead, Cursor, Read};
    use std::time::Instant;

    /// A reader that blocks until its channel closes.
    struct Hanging(Receiver<Vec<u8>>, Vec<u8>);

    impl Read for Hanging {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.fill_buf()?.len().min(buf.len());
            buf[..n].copy_from_slice(&self.1[..n]);
            self.consume(n);
            Ok(n)
        }
    }

    impl BufRead for Hanging {
        fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
            if self.1.is_empty() {
                if let Ok(bytes) = self.0.recv() {
                    self.1 = bytes;
                }
            }
            Ok(&self.1)
        }

        fn consume(&mut self, amt: usize) {
            self.1.drain(..amt);
        }
    }

    fn origin() -> chrono::NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn stop_wakes_a_blocked_read() {
        let (_keep_open, rx) = mpsc::channel::<Vec<u8>>();
        let reader = FrameReader::spawn(
            move || {
                Box::new(ReplaySource::new("hanging", Hanging(rx, Vec::new()), origin(), 30))
                    as Box<dyn DetectionSource>
            },
            None,
            4,
        )
        .unwrap();

        let stop = reader.stop_handle();
        let started = Instant::now();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            stop.stop();
        });
        assert!(matches!(reader.next_event(), ReaderEvent::Stop));
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn frames_then_end() {
        let lines = concat!(
            r#"{"captured_at": "2025-06-01T12:00:00", "width": 640, "height": 480, "detections": []}"#,
            "\n",
            r#"{"captured_at": "2025-06-01T12:00:01", "width": 640, "height": 480, "detections": []}"#,
            "\n",
        );
        let reader = FrameReader::spawn(
            move || {
                Box::new(ReplaySource::new("lines", Cursor::new(lines), origin(), 30))
                    as Box<dyn DetectionSource>
            },
            None,
            1,
        )
        .unwrap();
        assert!(matches!(reader.next_event(), ReaderEvent::Frame(_)));
        assert!(matches!(reader.next_event(), ReaderEvent::Frame(_)));
        assert!(matches!(reader.next_event(), ReaderEvent::End));
    }

    #[test]
    fn stop_wins_over_buffered_frames() {
        let lines = r#"{"captured_at": "2025-06-01T12:00:00", "width": 640, "height": 480}"#;
        let reader = FrameReader::spawn(
            move || {
                Box::new(ReplaySource::new("lines", Cursor::new(lines), origin(), 30))
                    as Box<dyn DetectionSource>
            },
            None,
            4,
        )
        .unwrap();
        reader.stop_handle().stop();
        assert!(matches!(reader.next_event(), ReaderEvent::Stop));
    }
}
