use crate::core::{PageId, ProcessId};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetCheck {
    WithinLimit { total: u64 },
    Exceeded { total: u64 },
}

/// Bytes buffered for frozen pages in one renderer process.
///
/// Each page's contribution is tracked separately so it can be dropped as a
/// whole when that page is restored or evicted; other pages in the process
/// keep theirs.
#[derive(Debug, Clone)]
pub struct ProcessByteBudget {
    process: ProcessId,
    limit: u64,
    contributions: HashMap<PageId, u64>,
}

impl ProcessByteBudget {
    pub fn new(process: ProcessId, limit: u64) -> Self {
        Self {
            process,
            limit,
            contributions: HashMap::new(),
        }
    }

    pub fn process(&self) -> ProcessId {
        self.process
    }

    pub fn add(&mut self, page: PageId, bytes: u64) -> BudgetCheck {
        let entry = self.contributions.entry(page).or_insert(0);
        *entry = entry.saturating_add(bytes);
        let total = self.total();
        if total > self.limit {
            BudgetCheck::Exceeded { total }
        } else {
            BudgetCheck::WithinLimit { total }
        }
    }

    /// Drop a page's contribution; returns what it had buffered
    pub fn release(&mut self, page: PageId) -> u64 {
        self.contributions.remove(&page).unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.contributions
            .values()
            .fold(0, |total, bytes| total.saturating_add(*bytes))
    }

    pub fn contribution(&self, page: PageId) -> u64 {
        self.contributions.get(&page).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.contributions.is_empty()
    }
}

/// All per-process budgets, keyed by renderer process
#[derive(Debug)]
pub struct BufferedBytesLedger {
    limit: u64,
    budgets: HashMap<ProcessId, ProcessByteBudget>,
}

impl BufferedBytesLedger {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            budgets: HashMap::new(),
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn add(&mut self, process: ProcessId, page: PageId, bytes: u64) -> BudgetCheck {
        let limit = self.limit;
        self.budgets
            .entry(process)
            .or_insert_with(|| ProcessByteBudget::new(process, limit))
            .add(page, bytes)
    }

    /// Release a page's contribution in every process it used
    pub fn release_page(&mut self, page: PageId) -> u64 {
        let mut released = 0;
        self.budgets.retain(|_, budget| {
            released = budget.release(page).saturating_add(released);
            !budget.is_empty()
        });
        released
    }

    pub fn drop_process(&mut self, process: ProcessId) {
        self.budgets.remove(&process);
    }

    pub fn total(&self, process: ProcessId) -> u64 {
        self.budgets.get(&process).map(|b| b.total()).unwrap_or(0)
    }

    pub fn contribution(&self, process: ProcessId, page: PageId) -> u64 {
        self.budgets
            .get(&process)
            .map(|b| b.contribution(page))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_many_small_contributions_exceed_together() {
        let process = ProcessId::new();
        let mut ledger = BufferedBytesLedger::new(100);
        let a = PageId::new();
        let b = PageId::new();

        assert_eq!(ledger.add(process, a, 60), BudgetCheck::WithinLimit { total: 60 });
        assert_eq!(ledger.add(process, b, 41), BudgetCheck::Exceeded { total: 101 });
    }

    #[test]
    fn test_release_resets_only_that_page() {
        let process = ProcessId::new();
        let mut ledger = BufferedBytesLedger::new(100);
        let a = PageId::new();
        let b = PageId::new();
        ledger.add(process, a, 90);
        ledger.add(process, b, 5);

        assert_eq!(ledger.release_page(a), 90);
        assert_eq!(ledger.total(process), 5);
        assert_eq!(ledger.contribution(process, a), 0);

        let c = PageId::new();
        assert_eq!(ledger.add(process, c, 90), BudgetCheck::WithinLimit { total: 95 });
    }

    #[test]
    fn test_exactly_at_limit_is_allowed() {
        let mut budget = ProcessByteBudget::new(ProcessId::new(), 10);
        assert_eq!(budget.add(PageId::new(), 10), BudgetCheck::WithinLimit { total: 10 });
    }

    #[test]
    fn test_totals_saturate_near_max() {
        let process = ProcessId::new();
        let mut budget = ProcessByteBudget::new(process, u64::MAX);
        assert_eq!(
            budget.add(PageId::new(), u64::MAX - 1),
            BudgetCheck::WithinLimit { total: u64::MAX - 1 }
        );
        assert_eq!(
            budget.add(PageId::new(), 10),
            BudgetCheck::WithinLimit { total: u64::MAX }
        );
        assert_eq!(budget.total(), u64::MAX);
    }
}
