use serde_json::Value;

use crate::Section;

/// A pending overwrite or removal of one key, applied to a freshly re-read
/// remote document at commit time.
#[derive(Debug, Clone, PartialEq)]
pub enum TxnOp {
    Put(Value),
    Delete,
}

/// One staged mutation: "this session intends to replace (or remove) this
/// key". Transactions live only within a session; they are dropped after a
/// successful commit.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    section: Section,
    key: String,
    op: TxnOp,
}

impl Transaction {
    pub fn section(&self) -> Section {
        self.section
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn op(&self) -> &TxnOp {
        &self.op
    }
}

/// Ordered staged mutations, keyed by `(section, key)`. Restaging a key
/// replaces its pending operation in place, so commit applies at most one
/// operation per key, in first-staged order.
#[derive(Debug, Default)]
pub struct TxnBuffer {
    txns: Vec<Transaction>,
}

impl TxnBuffer {
    pub fn stage_put<S: AsRef<str>>(&mut self, section: Section, key: S, content: Value) {
        self.stage(section, key.as_ref(), TxnOp::Put(content));
    }

    pub fn stage_delete<S: AsRef<str>>(&mut self, section: Section, key: S) {
        self.stage(section, key.as_ref(), TxnOp::Delete);
    }

    fn stage(&mut self, section: Section, key: &str, op: TxnOp) {
        match self
            .txns
            .iter_mut()
            .find(|t| t.section == section && t.key == key)
        {
            Some(txn) => txn.op = op,
            None => self.txns.push(Transaction {
                section,
                key: key.to_string(),
                op,
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.txns.iter()
    }

    pub fn len(&self) -> usize {
        self.txns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txns.is_empty()
    }

    pub fn clear(&mut self) {
        self.txns.clear();
    }
}
