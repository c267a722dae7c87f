use crate::core::{JoinError, Result, Row};
use std::sync::{Arc, Mutex};

/// Pre-sized append-only row buffer.
///
/// The capacity is fixed at construction. Appending past it fails with
/// [`JoinError::CapacityExceeded`] and leaves the store untouched, so
/// `len() <= capacity()` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleStore {
    rows: Vec<Row>,
    capacity: usize,
}

impl TupleStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rows: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Wraps already loaded rows; the capacity is their count.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let capacity = rows.len();
        Self { rows, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of filled rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.rows.len()
    }

    pub fn append(&mut self, row: Row) -> Result<()> {
        if self.rows.len() >= self.capacity {
            return Err(JoinError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Appends all rows or none of them.
    pub fn extend_from_slice(&mut self, rows: &[Row]) -> Result<()> {
        if rows.len() > self.remaining() {
            return Err(JoinError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.rows.extend_from_slice(rows);
        Ok(())
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

/// A [`TupleStore`] behind its own lock, shared between a node's main task
/// and its background receiver.
#[derive(Debug, Clone)]
pub struct SharedTupleStore {
    inner: Arc<Mutex<TupleStore>>,
}

impl SharedTupleStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TupleStore::with_capacity(capacity))),
        }
    }

    pub fn append(&self, row: Row) -> Result<()> {
        self.inner.lock()?.append(row)
    }

    pub fn extend_from_slice(&self, rows: &[Row]) -> Result<()> {
        self.inner.lock()?.extend_from_slice(rows)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.inner.lock()?.len())
    }

    pub fn capacity(&self) -> Result<usize> {
        Ok(self.inner.lock()?.capacity())
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Result<TupleStore> {
        Ok(self.inner.lock()?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_until_full_then_fail() {
        let mut store = TupleStore::with_capacity(2);
        store.append(Row::new(1, 1, 0)).unwrap();
        store.append(Row::new(2, 2, 0)).unwrap();

        let err = store.append(Row::new(3, 3, 0)).unwrap_err();
        assert!(matches!(err, JoinError::CapacityExceeded { capacity: 2 }));
        assert_eq!(store.len(), 2);
        assert!(store.len() <= store.capacity());
    }

    #[test]
    fn zero_capacity_rejects_everything() {
        let mut store = TupleStore::with_capacity(0);
        assert!(store.append(Row::new(1, 0, 1)).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn extend_is_all_or_nothing() {
        let mut store = TupleStore::with_capacity(3);
        store.append(Row::new(0, 0, 0)).unwrap();
        let batch = [Row::new(1, 0, 0), Row::new(2, 0, 0), Row::new(3, 0, 0)];
        assert!(store.extend_from_slice(&batch).is_err());
        assert_eq!(store.len(), 1);
        store.extend_from_slice(&batch[..2]).unwrap();
        assert_eq!(store.remaining(), 0);
    }

    #[test]
    fn shared_store_serializes_concurrent_appends() {
        let store = SharedTupleStore::with_capacity(1_000);
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..300 {
                        let _ = store.append(Row::new(t * 1_000 + i, 0, 0));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        // 1200 attempts against 1000 slots
        assert_eq!(store.len().unwrap(), 1_000);
        assert_eq!(store.snapshot().unwrap().rows().len(), 1_000);
    }
}
