use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Datelike, Duration, Local, NaiveDateTime, NaiveTime, Weekday};
use log::{debug, error, info, warn};

use crate::config::Config;
use crate::email_processor::PayslipProcessor;
use crate::imap_client::ImapClient;
use crate::ledger::ProcessedLedger;

/// Per-folder counters, reported once the folder pass is over.
#[derive(Debug, Default)]
pub struct CycleSummary {
    pub seen: usize,
    pub new: usize,
    pub extraction_ok: usize,
    pub extraction_err: usize,
    pub sink_ok: usize,
    pub sink_err: usize,
}

pub struct Scheduler {
    config: Config,
    processor: PayslipProcessor,
    ledger: ProcessedLedger,
    limit: Option<usize>,
    dry_run: bool,
    shutdown: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(config: Config, processor: PayslipProcessor, limit: Option<usize>, dry_run: bool) -> Self {
        let ledger = ProcessedLedger::new(&config.ledger_path);

        Scheduler {
            config,
            processor,
            ledger,
            limit,
            dry_run,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for the signal handler to request a clean stop.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// One pass over every configured folder: the one-shot mode.
    pub async fn run_once(&self) -> Result<()> {
        self.run_cycle().await
    }

    /// Daemon loop: one cycle per weekday, none on weekends. The inter-cycle
    /// sleep is sliced so a shutdown request takes effect within a second.
    pub async fn run_forever(&self) -> Result<()> {
        info!("📅 Daemon started, press Ctrl+C to stop");

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("🛑 Shutdown requested, exiting");
                return Ok(());
            }

            let now = Local::now().naive_local();
            let next_run = if is_weekend(now) {
                // No mailbox connection on weekends
                info!("📅 {} is a weekend day, sleeping until Monday", now.format("%A"));
                next_monday_midnight(now)
            } else {
                if let Err(e) = self.run_cycle().await {
                    error!("❌ Cycle failed: {}", e);
                }
                next_weekday_midnight(Local::now().naive_local())
            };

            info!("⏰ Next run at {}", next_run.format("%Y-%m-%d %H:%M:%S"));

            if !self.sleep_until(next_run).await {
                info!("🛑 Shutdown requested during sleep, exiting");
                return Ok(());
            }
        }
    }

    async fn run_cycle(&self) -> Result<()> {
        // 1. Connect to the IMAP server
        let mut imap_client = ImapClient::new(&self.config.imap)
            .await
            .context("Unable to connect to the IMAP server")?;

        // 2. Load the ledger once per cycle
        let mut processed = self
            .ledger
            .load()
            .context("Unable to load the processed ledger")?;

        debug!("Ledger holds {} processed id(s)", processed.len());

        let since = imap_since_date(Local::now().naive_local(), self.config.lookback_days);

        // 3. Work through each folder; one folder failing must not stop the others
        for folder in &self.config.folders {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            match self
                .process_folder(&mut imap_client, folder, &since, &mut processed)
                .await
            {
                Ok(summary) => {
                    info!(
                        "📊 Folder '{}': {} seen, {} new, {} extracted, {} extraction error(s), {} row(s) appended, {} sink error(s)",
                        folder,
                        summary.seen,
                        summary.new,
                        summary.extraction_ok,
                        summary.extraction_err,
                        summary.sink_ok,
                        summary.sink_err
                    );
                }
                Err(e) => {
                    warn!("⚠️ Skipping folder '{}': {}", folder, e);
                }
            }
        }

        // 4. Disconnect cleanly
        if let Err(e) = imap_client.logout().await {
            warn!("⚠️ IMAP logout failed: {}", e);
        }

        Ok(())
    }

    async fn process_folder(
        &self,
        imap_client: &mut ImapClient,
        folder: &str,
        since: &str,
        processed: &mut std::collections::HashSet<String>,
    ) -> Result<CycleSummary> {
        let mut summary = CycleSummary::default();

        let total = imap_client.select_folder(folder).await?;
        debug!("Folder '{}' holds {} message(s)", folder, total);

        let message_ids = imap_client
            .search_sender_since(&self.config.sender, since)
            .await?;
        summary.seen = message_ids.len();

        let new_ids: Vec<u32> = message_ids
            .into_iter()
            .filter(|id| !processed.contains(&id.to_string()))
            .collect();
        summary.new = new_ids.len();

        if new_ids.is_empty() {
            info!("No new payslip email in '{}'", folder);
            return Ok(summary);
        }

        info!("📧 {} new payslip email(s) in '{}'", new_ids.len(), folder);

        let to_process: Vec<u32> = match self.limit {
            Some(limit) => new_ids.into_iter().take(limit).collect(),
            None => new_ids,
        };

        for message_id in to_process {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("🛑 Shutdown requested, stopping mid-folder");
                break;
            }

            match self.processor.process_message(imap_client, message_id).await {
                Ok(outcome) => {
                    if outcome.extraction_status.is_some() {
                        if outcome.extraction_succeeded() {
                            summary.extraction_ok += 1;
                        } else {
                            summary.extraction_err += 1;
                        }
                    }
                    if outcome.sink_status.is_some() {
                        if outcome.sink_succeeded() {
                            summary.sink_ok += 1;
                        } else {
                            summary.sink_err += 1;
                        }
                    }
                }
                Err(e) => {
                    error!("❌ Error processing email {}: {}", message_id, e);
                    summary.extraction_err += 1;
                }
            }

            // Mark the attempt even on failure so the next run skips it
            self.record_processed(message_id, processed);
        }

        Ok(summary)
    }

    fn record_processed(&self, message_id: u32, processed: &mut std::collections::HashSet<String>) {
        let id_str = message_id.to_string();

        if self.dry_run {
            info!("🧪 Dry-run: email {} not recorded in the ledger", message_id);
        } else if let Err(e) = self.ledger.save(&id_str) {
            error!("❌ Unable to record email {} in the ledger: {}", message_id, e);
        }

        processed.insert(id_str);
    }

    /// Sleeps until the deadline in one-second slices, returning false as
    /// soon as a shutdown is requested.
    async fn sleep_until(&self, deadline: NaiveDateTime) -> bool {
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                return false;
            }

            let remaining = deadline - Local::now().naive_local();
            if remaining <= Duration::zero() {
                return true;
            }

            let slice = remaining
                .to_std()
                .unwrap_or_default()
                .min(std::time::Duration::from_secs(1));
            tokio::time::sleep(slice).await;
        }
    }
}

pub fn is_weekend(now: NaiveDateTime) -> bool {
    matches!(now.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Midnight of the Monday after `now`. Only called on weekend days.
pub fn next_monday_midnight(now: NaiveDateTime) -> NaiveDateTime {
    let days_ahead = (7 - now.weekday().num_days_from_monday()) as i64;
    (now.date() + Duration::days(days_ahead)).and_time(NaiveTime::MIN)
}

/// Midnight of the next day that is not a Saturday or Sunday.
pub fn next_weekday_midnight(now: NaiveDateTime) -> NaiveDateTime {
    let mut date = now.date() + Duration::days(1);
    while matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
        date += Duration::days(1);
    }
    date.and_time(NaiveTime::MIN)
}

/// Start of the lookback window in IMAP SEARCH date format, e.g. `06-Jan-2024`.
pub fn imap_since_date(now: NaiveDateTime, lookback_days: i64) -> String {
    (now - Duration::days(lookback_days)).format("%d-%b-%Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_saturday_waits_for_monday_midnight() {
        // 2024-01-06 was a Saturday
        let now = at(2024, 1, 6, 10);
        assert!(is_weekend(now));

        let next = next_monday_midnight(now);
        assert_eq!(next.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-01-08 00:00:00");
        assert_eq!(next.weekday(), Weekday::Mon);
    }

    #[test]
    fn test_sunday_waits_for_monday_midnight() {
        let now = at(2024, 1, 7, 23);
        assert!(is_weekend(now));

        let next = next_monday_midnight(now);
        assert_eq!(next.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-01-08 00:00:00");
    }

    #[test]
    fn test_midweek_runs_again_next_day() {
        // 2024-01-03 was a Wednesday
        let now = at(2024, 1, 3, 0);
        assert!(!is_weekend(now));

        let next = next_weekday_midnight(now);
        assert_eq!(next.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-01-04 00:00:00");
    }

    #[test]
    fn test_friday_skips_to_monday() {
        // 2024-01-05 was a Friday
        let next = next_weekday_midnight(at(2024, 1, 5, 14));
        assert_eq!(next.format("%Y-%m-%d").to_string(), "2024-01-08");
        assert_eq!(next.weekday(), Weekday::Mon);
    }

    #[test]
    fn test_since_date_covers_the_lookback_window() {
        // 2024-02-05 minus 30 days lands on 2024-01-06
        let since = imap_since_date(at(2024, 2, 5, 9), 30);
        assert_eq!(since, "06-Jan-2024");
    }
}
