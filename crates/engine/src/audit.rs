//! Read-only consistency check of one wallet against its ledger.
//!
//! [`replay`] walks the ledger entries of a wallet in insertion order and
//! checks them against the cached balance and the wallet's transactions.
//! It never writes anything.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{LedgerEntry, Money, Transaction, TransactionStatus};

/// A single broken invariant found while replaying a wallet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditViolation {
    /// An entry does not start where the previous one ended.
    ChainBreak {
        entry_id: i64,
        expected_previous: Money,
        found_previous: Money,
    },
    /// The cached balance differs from the last ledger snapshot.
    BalanceMismatch { wallet: Money, ledger: Money },
    /// The cached balance differs from the signed sum of successful
    /// transactions.
    TotalMismatch { wallet: Money, transactions: Money },
    /// An entry's delta is not the signed amount of its transaction.
    DeltaMismatch {
        entry_id: i64,
        transaction_id: i64,
        expected: Money,
        found: Money,
    },
    NegativeSnapshot { entry_id: i64 },
    /// A successful transaction with no ledger entry.
    MissingEntry { transaction_id: i64 },
    /// An entry whose transaction is unknown or not successful.
    OrphanEntry { entry_id: i64, transaction_id: i64 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAudit {
    pub user_id: Uuid,
    pub wallet_balance: Money,
    /// Balance reached by chaining the entries from zero.
    pub ledger_balance: Money,
    /// Signed sum of the `SUCCESSFUL` transactions.
    pub transactions_total: Money,
    pub entries: usize,
    pub transactions: usize,
    pub violations: Vec<AuditViolation>,
}

impl WalletAudit {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Replay `entries` and `transactions` (both in insertion order) against
/// `wallet_balance`.
pub fn replay(
    user_id: Uuid,
    wallet_balance: Money,
    entries: &[LedgerEntry],
    transactions: &[Transaction],
) -> WalletAudit {
    let mut violations = Vec::new();

    let successful: HashMap<i64, &Transaction> = transactions
        .iter()
        .filter(|tx| tx.status == TransactionStatus::Successful)
        .map(|tx| (tx.id, tx))
        .collect();
    let transactions_total = successful
        .values()
        .fold(Money::ZERO, |acc, tx| acc.saturating_add(tx.signed_amount()));

    let mut ledger_balance = Money::ZERO;
    for entry in entries {
        if entry.previous_balance.is_negative() || entry.new_balance.is_negative() {
            violations.push(AuditViolation::NegativeSnapshot { entry_id: entry.id });
        }
        if entry.previous_balance != ledger_balance {
            violations.push(AuditViolation::ChainBreak {
                entry_id: entry.id,
                expected_previous: ledger_balance,
                found_previous: entry.previous_balance,
            });
        }
        match successful.get(&entry.transaction_id) {
            Some(tx) => {
                let found = entry.delta().unwrap_or(Money::ZERO);
                let expected = tx.signed_amount();
                if found != expected {
                    violations.push(AuditViolation::DeltaMismatch {
                        entry_id: entry.id,
                        transaction_id: tx.id,
                        expected,
                        found,
                    });
                }
            }
            None => violations.push(AuditViolation::OrphanEntry {
                entry_id: entry.id,
                transaction_id: entry.transaction_id,
            }),
        }
        ledger_balance = entry.new_balance;
    }

    let mut recorded: Vec<i64> = entries.iter().map(|e| e.transaction_id).collect();
    recorded.sort_unstable();
    let mut missing: Vec<i64> = successful
        .keys()
        .copied()
        .filter(|id| recorded.binary_search(id).is_err())
        .collect();
    missing.sort_unstable();
    violations.extend(
        missing
            .into_iter()
            .map(|transaction_id| AuditViolation::MissingEntry { transaction_id }),
    );

    if ledger_balance != wallet_balance {
        violations.push(AuditViolation::BalanceMismatch {
            wallet: wallet_balance,
            ledger: ledger_balance,
        });
    }
    if transactions_total != wallet_balance {
        violations.push(AuditViolation::TotalMismatch {
            wallet: wallet_balance,
            transactions: transactions_total,
        });
    }

    WalletAudit {
        user_id,
        wallet_balance,
        ledger_balance,
        transactions_total,
        entries: entries.len(),
        transactions: transactions.len(),
        violations,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::TransactionKind;

    fn tx(id: i64, kind: TransactionKind, amount: i64) -> Transaction {
        Transaction {
            id,
            reference: format!("REF_{id}"),
            user_id: Uuid::nil(),
            amount: Money::new(amount),
            kind,
            status: TransactionStatus::Successful,
            created_at: Utc::now(),
        }
    }

    fn entry(id: i64, transaction_id: i64, previous: i64, new: i64) -> LedgerEntry {
        LedgerEntry {
            id,
            transaction_id,
            user_id: Uuid::nil(),
            previous_balance: Money::new(previous),
            new_balance: Money::new(new),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn clean_history_is_consistent() {
        let txs = vec![
            tx(1, TransactionKind::Credit, 2_000_000),
            tx(2, TransactionKind::Debit, 500_000),
        ];
        let entries = vec![entry(1, 1, 0, 2_000_000), entry(2, 2, 2_000_000, 1_500_000)];

        let audit = replay(Uuid::nil(), Money::new(1_500_000), &entries, &txs);

        assert!(audit.is_consistent(), "{:?}", audit.violations);
        assert_eq!(audit.ledger_balance, Money::new(1_500_000));
        assert_eq!(audit.transactions_total, Money::new(1_500_000));
        assert_eq!(audit.entries, 2);
    }

    #[test]
    fn empty_wallet_is_consistent() {
        let audit = replay(Uuid::nil(), Money::ZERO, &[], &[]);
        assert!(audit.is_consistent());
    }

    #[test]
    fn detects_broken_chain_and_cached_drift() {
        let txs = vec![
            tx(1, TransactionKind::Credit, 100),
            tx(2, TransactionKind::Credit, 100),
        ];
        let entries = vec![entry(1, 1, 0, 100), entry(2, 2, 150, 250)];

        let audit = replay(Uuid::nil(), Money::new(200), &entries, &txs);

        assert!(audit.violations.contains(&AuditViolation::ChainBreak {
            entry_id: 2,
            expected_previous: Money::new(100),
            found_previous: Money::new(150),
        }));
        assert!(audit.violations.contains(&AuditViolation::BalanceMismatch {
            wallet: Money::new(200),
            ledger: Money::new(250),
        }));
    }

    #[test]
    fn detects_missing_entry_and_wrong_delta() {
        let txs = vec![
            tx(1, TransactionKind::Credit, 100),
            tx(2, TransactionKind::Debit, 40),
        ];
        let entries = vec![entry(1, 1, 0, 90)];

        let audit = replay(Uuid::nil(), Money::new(60), &entries, &txs);

        assert!(audit.violations.contains(&AuditViolation::MissingEntry { transaction_id: 2 }));
        assert!(audit.violations.contains(&AuditViolation::DeltaMismatch {
            entry_id: 1,
            transaction_id: 1,
            expected: Money::new(100),
            found: Money::new(90),
        }));
    }

    #[test]
    fn ignores_transactions_that_did_not_succeed() {
        let mut failed = tx(2, TransactionKind::Debit, 40);
        failed.status = TransactionStatus::Failed;
        let txs = vec![tx(1, TransactionKind::Credit, 100), failed];
        let entries = vec![entry(1, 1, 0, 100)];

        let audit = replay(Uuid::nil(), Money::new(100), &entries, &txs);

        assert!(audit.is_consistent(), "{:?}", audit.violations);
        assert_eq!(audit.transactions, 2);
    }
}
