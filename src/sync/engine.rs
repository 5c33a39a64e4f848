//! Sync Engine - cursor-driven tailer over the remote ledger log
//!
//! One run performs at most `max_iteration_count` fetches of `max_results`
//! entries starting at the cursor (`scan_end_tx_id`):
//!
//! ```text
//!   uninitialized ──get_transactions(0,1)──▶ cursor := log_length (no history)
//!   fetch batch ──▶ adopt first_index as oldest
//!               ──▶ first_index > cursor: archival gap, jump, raise window start
//!               ──▶ project entries involving the vault, advance per entry
//!               ──▶ persist cursor; stop once cursor >= log_length
//! ```
//!
//! Remote calls are the only suspension points. Store work between them runs
//! under the vault's state gate, never across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::projection::{self, Projection};
use crate::error::{Result, VaultError};
use crate::ledger::{GetTransactionsResponse, LedgerClient};
use crate::store::{AppData, Store};
use crate::vault::{ledger_principal, load_app_data};

/// What one run did. Logged, and partly surfaced as the transaction summary.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub new_txs_count: u64,
    pub batches: u64,
    pub gaps_skipped: u64,
    /// Entries counted as scanned that produced no record
    pub skipped_entries: u64,
    /// `log_length` from the last reply
    pub log_length: u64,
    pub caught_up: bool,
}

pub struct SyncEngine {
    store: Store,
    ledger: Arc<dyn LedgerClient>,
    vault_principal: String,
    gate: Arc<Mutex<()>>,
}

impl SyncEngine {
    pub fn new(
        store: Store,
        ledger: Arc<dyn LedgerClient>,
        vault_principal: String,
        gate: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            store,
            ledger,
            vault_principal,
            gate,
        }
    }

    /// Run one `update_transaction_history` pass.
    ///
    /// Fails with `SyncBusy` while another pass holds the in-progress flag.
    /// Progress committed by earlier batches survives a failing batch.
    pub async fn run(&self) -> Result<(SyncReport, AppData)> {
        self.begin()?;
        let outcome = self.run_batches().await;
        let finished = self.finish();

        let report = outcome?;
        let app = finished?;

        info!(
            new_txs_count = report.new_txs_count,
            batches = report.batches,
            gaps_skipped = report.gaps_skipped,
            skipped_entries = report.skipped_entries,
            scan_end_tx_id = app.scan_end_tx_id,
            log_length = report.log_length,
            sync_status = %app.sync_status(),
            "Transaction history updated"
        );
        Ok((report, app))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.gate
            .lock()
            .map_err(|_| VaultError::Internal("state lock poisoned".into()))
    }

    fn begin(&self) -> Result<()> {
        let _guard = self.lock()?;
        let mut app = load_app_data(&self.store)?;
        if app.sync_in_progress {
            return Err(VaultError::SyncBusy);
        }
        app.sync_in_progress = true;
        self.store.put(&app)?;
        Ok(())
    }

    fn finish(&self) -> Result<AppData> {
        let _guard = self.lock()?;
        let mut app = load_app_data(&self.store)?;
        app.sync_in_progress = false;
        self.store.put(&app)?;
        Ok(app)
    }

    async fn run_batches(&self) -> Result<SyncReport> {
        let ledger = ledger_principal(&self.store)?;
        let max_iterations = load_app_data(&self.store)?.max_iteration_count;
        let mut report = SyncReport::default();

        for _ in 0..max_iterations {
            let app = load_app_data(&self.store)?;

            if app.scan_uninitialized() {
                let reply = self.ledger.get_transactions(&ledger, 0, 1).await?;
                self.position_cursor(&reply)?;
                report.log_length = reply.log_length;
                report.caught_up = true;
                break;
            }

            let start = app.scan_end_tx_id;
            let reply = self
                .ledger
                .get_transactions(&ledger, start, app.max_results)
                .await?;
            report.batches += 1;
            report.log_length = reply.log_length;

            self.apply_batch(start, &reply, &mut report)?;
            if report.caught_up {
                break;
            }
        }

        Ok(report)
    }

    /// First contact: deployment time counts as zero history.
    fn position_cursor(&self, reply: &GetTransactionsResponse) -> Result<()> {
        let _guard = self.lock()?;
        let mut app = load_app_data(&self.store)?;
        app.scan_start_tx_id = reply.log_length;
        app.scan_end_tx_id = reply.log_length;
        app.scan_oldest_tx_id = reply.first_index;
        self.store.put(&app)?;

        info!(
            scan_start_tx_id = app.scan_start_tx_id,
            scan_oldest_tx_id = app.scan_oldest_tx_id,
            "Scan cursor positioned at the ledger tip"
        );
        Ok(())
    }

    fn apply_batch(
        &self,
        start: u64,
        reply: &GetTransactionsResponse,
        report: &mut SyncReport,
    ) -> Result<()> {
        let _guard = self.lock()?;
        let mut app = load_app_data(&self.store)?;
        if app.scan_end_tx_id != start {
            return Err(VaultError::Internal(format!(
                "scan cursor moved from {} to {} during fetch",
                start, app.scan_end_tx_id
            )));
        }

        app.scan_oldest_tx_id = reply.first_index;
        let mut idx = app.scan_end_tx_id;

        // Returned entries start at first_index; anything below it that we
        // never scanned is gone.
        if reply.first_index > idx {
            warn!(
                skipped_from = idx,
                skipped_to = reply.first_index,
                archived_ranges = reply.archived_transactions.len(),
                "Archival gap: skipping transactions the ledger no longer serves"
            );
            idx = reply.first_index;
            app.scan_start_tx_id = app.scan_start_tx_id.max(reply.first_index);
            report.gaps_skipped += 1;
        }

        for entry in &reply.transactions {
            match projection::extract_entry(idx, entry) {
                Ok(vtx) if vtx.involves(&self.vault_principal) => {
                    match projection::plan(&self.store, &vtx)? {
                        Projection::Record(mutations) => {
                            self.store.apply(mutations)?;
                            report.new_txs_count += 1;
                            debug!(
                                tx_id = idx,
                                from = %vtx.principal_from,
                                to = %vtx.principal_to,
                                amount = %vtx.amount,
                                kind = %vtx.kind,
                                "Recorded vault transaction"
                            );
                        }
                        Projection::Duplicate => {
                            debug!(tx_id = idx, "Transaction already recorded");
                        }
                        Projection::Overflow => {
                            warn!(
                                tx_id = idx,
                                amount = %vtx.amount,
                                "Amount exceeds the balance range, entry skipped"
                            );
                            report.skipped_entries += 1;
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        tx_id = idx,
                        error = %e,
                        "Skipping ledger entry that could not be interpreted"
                    );
                    report.skipped_entries += 1;
                }
            }
            idx += 1;
        }

        app.scan_end_tx_id = idx;
        self.store.put(&app)?;
        report.caught_up = idx >= reply.log_length;

        debug!(
            start,
            scan_end_tx_id = idx,
            first_index = reply.first_index,
            log_length = reply.log_length,
            returned = reply.transactions.len(),
            "Batch applied"
        );
        Ok(())
    }
}
