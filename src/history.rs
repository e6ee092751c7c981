//! Violation history poller.
//!
//! Pulls the detector's `/violations` list on a fixed interval (first poll
//! immediately) and keeps the newest `limit` records for the status API. A
//! failed poll keeps the previous list.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::detect::{DetectorClient, ViolationRecord};

pub const DEFAULT_HISTORY_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Shared, read-mostly view of the latest history poll.
#[derive(Clone, Default)]
pub struct HistoryBoard {
    records: Arc<Mutex<Vec<ViolationRecord>>>,
    healthy: Arc<AtomicBool>,
}

impl HistoryBoard {
    pub fn records(&self) -> Vec<ViolationRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// False once a poll has failed, until the next success.
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    fn publish(&self, mut records: Vec<ViolationRecord>, limit: usize) {
        // keep the newest `limit`; the service returns oldest first
        if records.len() > limit {
            records.drain(..records.len() - limit);
        }
        if let Ok(mut current) = self.records.lock() {
            *current = records;
        }
        self.healthy.store(true, Ordering::SeqCst);
    }
}

pub struct HistoryPoller {
    board: HistoryBoard,
    stop_tx: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl HistoryPoller {
    pub fn spawn(
        client: Arc<dyn DetectorClient>,
        interval: Duration,
        limit: usize,
    ) -> Result<Self> {
        if interval.is_zero() {
            return Err(anyhow!("history interval must be greater than zero"));
        }
        let board = HistoryBoard::default();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread_board = board.clone();

        let join = std::thread::Builder::new()
            .name("redzone-history".to_string())
            .spawn(move || loop {
                match client.violations() {
                    Ok(records) => {
                        log::debug!("history poll: {} record(s)", records.len());
                        thread_board.publish(records, limit);
                    }
                    Err(e) => {
                        log::warn!("history poll failed: {:?}", e);
                        thread_board.healthy.store(false, Ordering::SeqCst);
                    }
                }
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        Ok(Self {
            board,
            stop_tx: Some(stop_tx),
            join: Some(join),
        })
    }

    pub fn board(&self) -> HistoryBoard {
        self.board.clone()
    }

    pub fn stop(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("history poller thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for HistoryPoller {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("{}", e);
        }
    }
}
