// ===============================
// src/recorder.rs
// ===============================
//
// JSONL event recorder:
// - one `Event` per line, appended
// - BufWriter, flushed every second and every 1000 events
// - parent directory created on open
// - on write failure the file is reopened and the line retried once
//
// Producers hold a `RecorderHandle` and never block: a full channel drops the event.
//
use std::path::Path;
use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{debug, error, info};

use crate::domain::Event;

const FLUSH_EVERY_N_EVENTS: u32 = 1000;
const CHANNEL_CAPACITY: usize = 10_000;

#[derive(Clone)]
pub struct RecorderHandle {
    tx: mpsc::Sender<Event>,
}

impl RecorderHandle {
    pub fn record(&self, ev: Event) {
        if let Err(e) = self.tx.try_send(ev) {
            debug!(%e, "recorder: event dropped");
        }
    }
}

/// Spawns the writer task and returns the producer side.
pub fn spawn(path: String) -> RecorderHandle {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(run(rx, path));
    RecorderHandle { tx }
}

async fn open_writer(path: &str) -> std::io::Result<BufWriter<fs::File>> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    Ok(BufWriter::new(file))
}

async fn write_line(writer: &mut BufWriter<fs::File>, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await
}

pub async fn run(mut rx: mpsc::Receiver<Event>, path: String) {
    let mut writer = match open_writer(&path).await {
        Ok(w) => w,
        Err(e) => {
            error!(?e, %path, "recorder: open failed, recording disabled");
            return;
        }
    };
    info!(%path, "recorder: started");

    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut since_last_flush: u32 = 0;

    loop {
        tokio::select! {
            maybe_ev = rx.recv() => {
                let Some(ev) = maybe_ev else {
                    let _ = writer.flush().await;
                    info!("recorder: channel closed, stopped");
                    break;
                };
                let line = match serde_json::to_string(&ev) {
                    Ok(s) => s,
                    Err(e) => {
                        error!(?e, "recorder: serialize error, skip event");
                        continue;
                    }
                };

                if let Err(e) = write_line(&mut writer, &line).await {
                    error!(?e, "recorder: write failed, attempting reopen");
                    match open_writer(&path).await {
                        Ok(w) => writer = w,
                        Err(e2) => {
                            error!(?e2, "recorder: reopen failed, drop event");
                            continue;
                        }
                    }
                    if let Err(e2) = write_line(&mut writer, &line).await {
                        error!(?e2, "recorder: write failed again after reopen, drop event");
                        continue;
                    }
                }

                since_last_flush += 1;
                if since_last_flush >= FLUSH_EVERY_N_EVENTS {
                    let _ = writer.flush().await;
                    since_last_flush = 0;
                }
            }

            _ = tick.tick() => {
                let _ = writer.flush().await;
                since_last_flush = 0;
            }
        }
    }
}
