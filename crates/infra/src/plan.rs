//! Pure planning: snapshot in, ordered write units out.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};

use stockwarden_core::{OrderId, ProductId, RunId};
use stockwarden_deliveries::{DuplicateResolution, resolve_duplicates};
use stockwarden_inventory::{Discrepancies, ReservationLedger, compute_corrections};
use stockwarden_sales::{ClassifiedOrder, ExpiryPolicy};

use crate::config::Collections;
use crate::executor::WriteUnit;
use crate::journal::{self, JournalLine};
use crate::snapshot::Snapshot;
use crate::store::WriteOp;

pub const RESERVED_STOCK_FIELD: &str = "reservedStock";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Everything a run intends to change, computed without touching the store.
#[derive(Debug, Clone)]
pub struct ReconcilePlan {
    pub run_id: RunId,
    pub now: DateTime<Utc>,
    pub collections: Collections,
    pub classified: Vec<ClassifiedOrder>,
    pub ledger: ReservationLedger,
    pub discrepancies: Discrepancies,
    pub duplicates: DuplicateResolution,
    /// Released lines to journal, per product present in the snapshot.
    pub journal_lines: BTreeMap<ProductId, Vec<JournalLine>>,
    /// Journal documents whose order no longer exists.
    pub stale_journal: Vec<String>,
}

impl ReconcilePlan {
    pub fn build(
        snapshot: &Snapshot,
        collections: &Collections,
        policy: &ExpiryPolicy,
        now: DateTime<Utc>,
        run_id: RunId,
    ) -> Self {
        let classified = policy.classify_all(snapshot.orders.iter().cloned(), now);
        let released = journal::released_lines(&snapshot.journal, &collections.products);
        let ledger = ReservationLedger::build(&classified, &released);
        let discrepancies = compute_corrections(&ledger, &snapshot.products);
        let duplicates = resolve_duplicates(&snapshot.deliveries);

        let mut per_line: BTreeMap<(ProductId, OrderId), JournalLine> = BTreeMap::new();
        for order in ledger.released_orders() {
            for line in &order.lines {
                if !snapshot.products.contains_key(&line.product_id) {
                    continue;
                }
                per_line
                    .entry((line.product_id.clone(), order.order_id.clone()))
                    .and_modify(|j| j.quantity = j.quantity.saturating_add(line.quantity))
                    .or_insert_with(|| JournalLine {
                        order_id: order.order_id.clone(),
                        product_id: line.product_id.clone(),
                        quantity: line.quantity,
                        reason: order.reason,
                    });
            }
        }
        let mut journal_lines: BTreeMap<ProductId, Vec<JournalLine>> = BTreeMap::new();
        for ((product_id, _), line) in per_line {
            journal_lines.entry(product_id).or_default().push(line);
        }

        let live: HashSet<&OrderId> = snapshot.orders.iter().map(|o| o.id()).collect();
        let stale_journal = snapshot
            .journal
            .iter()
            .filter(|r| !live.contains(&r.order_id))
            .map(|r| r.document_id.clone())
            .collect();

        Self {
            run_id,
            now,
            collections: collections.clone(),
            classified,
            ledger,
            discrepancies,
            duplicates,
            journal_lines,
            stale_journal,
        }
    }

    /// Ordered write units.
    ///
    /// Each corrected product's counter adjustment shares a unit with the
    /// journal entries of the lines it releases, so both commit together.
    /// Journal-only units follow for products that needed no correction,
    /// then duplicate deletions, then pruning of stale journal entries.
    pub fn units(&self) -> Vec<WriteUnit> {
        let collections = &self.collections;
        let journal_unit = |product_id: &ProductId| -> Vec<WriteOp> {
            self.journal_lines
                .get(product_id)
                .into_iter()
                .flatten()
                .map(|l| journal::entry(&collections.releases, &collections.products, l, self.run_id))
                .collect()
        };

        let mut units = Vec::new();
        let mut corrected = HashSet::new();
        for c in &self.discrepancies.corrections {
            let mut unit = vec![WriteOp::AdjustCounter {
                collection: collections.products.clone(),
                id: c.product_id.as_str().to_string(),
                field: RESERVED_STOCK_FIELD.to_string(),
                delta: -(c.release as i64),
                touch: Some(UPDATED_AT_FIELD.to_string()),
            }];
            unit.extend(journal_unit(&c.product_id));
            corrected.insert(&c.product_id);
            units.push(unit);
        }

        for product_id in self.journal_lines.keys() {
            if !corrected.contains(product_id) {
                units.push(journal_unit(product_id));
            }
        }

        units.extend(self.duplicates.deletions().map(|id| {
            vec![WriteOp::Delete {
                collection: collections.deliveries.clone(),
                id: id.as_str().to_string(),
            }]
        }));

        units.extend(self.stale_journal.iter().map(|id| {
            vec![WriteOp::Delete {
                collection: collections.releases.clone(),
                id: id.clone(),
            }]
        }));

        units
    }

    /// Total operations across [`units`](Self::units).
    pub fn operation_count(&self) -> usize {
        self.units().iter().map(Vec::len).sum()
    }

    pub fn journal_entry_count(&self) -> usize {
        self.journal_lines.values().map(Vec::len).sum()
    }

    /// Whether applying the plan would change nothing.
    pub fn is_noop(&self) -> bool {
        self.discrepancies.is_empty()
            && self.duplicates.is_clean()
            && self.journal_lines.is_empty()
            && self.stale_journal.is_empty()
    }
}
