use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::models::{SemesterResult, StoredResult, StudentAggregate};

/// Durable home for parsed semester results.
///
/// Records are never deduplicated: re-uploading a sheet adds new rows, and
/// `find_latest` resolves to the most recently inserted one.
pub trait ResultStore {
    /// Inserts every record or none of them.
    async fn insert_all(&self, results: &[SemesterResult]) -> anyhow::Result<usize>;

    /// All stored records in insertion order.
    async fn find_all(&self) -> anyhow::Result<Vec<StoredResult>>;

    async fn find_latest(&self, index_no: &str) -> anyhow::Result<Option<StoredResult>>;

    /// Writes the aggregate onto every row of the student, returning how many
    /// rows changed.
    async fn update_aggregate(
        &self,
        index_no: &str,
        aggregate: &StudentAggregate,
    ) -> anyhow::Result<u64>;

    /// Reads every row, hands them to `compute`, and writes each returned
    /// aggregate onto its student's rows. Runs are mutually exclusive: a
    /// second run waits until the first has written everything.
    ///
    /// Returns each written aggregate with the number of rows it touched.
    async fn recalculate_exclusive<F>(&self, compute: F) -> anyhow::Result<Vec<AggregateWrite>>
    where
        F: FnOnce(&[StoredResult]) -> Vec<(String, StudentAggregate)> + Send;
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateWrite {
    pub index_no: String,
    pub aggregate: StudentAggregate,
    pub rows_updated: u64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<Vec<StoredResult>>,
    recalculation: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultStore for MemoryStore {
    async fn insert_all(&self, results: &[SemesterResult]) -> anyhow::Result<usize> {
        let mut rows = self.rows.write().await;
        rows.extend(results.iter().map(|result| StoredResult {
            id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            result: result.clone(),
            aggregate: None,
        }));
        Ok(results.len())
    }

    async fn find_all(&self) -> anyhow::Result<Vec<StoredResult>> {
        Ok(self.rows.read().await.clone())
    }

    async fn find_latest(&self, index_no: &str) -> anyhow::Result<Option<StoredResult>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .rev()
            .find(|row| row.result.index_no == index_no)
            .cloned())
    }

    async fn update_aggregate(
        &self,
        index_no: &str,
        aggregate: &StudentAggregate,
    ) -> anyhow::Result<u64> {
        let mut rows = self.rows.write().await;
        let mut updated = 0;
        for row in rows.iter_mut().filter(|row| row.result.index_no == index_no) {
            row.aggregate = Some(aggregate.clone());
            updated += 1;
        }
        Ok(updated)
    }

    async fn recalculate_exclusive<F>(&self, compute: F) -> anyhow::Result<Vec<AggregateWrite>>
    where
        F: FnOnce(&[StoredResult]) -> Vec<(String, StudentAggregate)> + Send,
    {
        let _guard = self.recalculation.lock().await;

        let rows = self.find_all().await?;
        let mut writes = Vec::new();
        for (index_no, aggregate) in compute(&rows) {
            let rows_updated = self.update_aggregate(&index_no, &aggregate).await?;
            writes.push(AggregateWrite {
                index_no,
                aggregate,
                rows_updated,
            });
        }
        Ok(writes)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, Arc};
    use std::time::Duration;

    use super::*;
    use crate::models::FinalClass;

    fn result(index_no: &str, semester: u8, semester_gpa: f64) -> SemesterResult {
        SemesterResult {
            index_no: index_no.to_string(),
            name: "Kofi Boateng".to_string(),
            semester,
            year: 1,
            courses: Vec::new(),
            semester_gpa,
        }
    }

    #[tokio::test]
    async fn latest_is_most_recent_insert() {
        let store = MemoryStore::new();
        store.insert_all(&[result("A1", 1, 3.0)]).await.unwrap();
        store
            .insert_all(&[result("A1", 2, 3.5), result("B2", 1, 2.0)])
            .await
            .unwrap();

        let latest = store.find_latest("A1").await.unwrap().unwrap();
        assert_eq!(latest.result.semester, 2);
        assert!(store.find_latest("C3").await.unwrap().is_none());
        assert_eq!(store.find_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn aggregate_fans_out_to_every_row() {
        let store = MemoryStore::new();
        store
            .insert_all(&[result("A1", 1, 3.0), result("B2", 1, 2.0), result("A1", 1, 3.0)])
            .await
            .unwrap();

        let aggregate = StudentAggregate {
            year_gpa: BTreeMap::from([(1, 3.0)]),
            final_gpa: 3.0,
            final_class: FinalClass::SecondLower,
        };
        assert_eq!(store.update_aggregate("A1", &aggregate).await.unwrap(), 2);

        let rows = store.find_all().await.unwrap();
        assert_eq!(rows[0].aggregate.as_ref(), Some(&aggregate));
        assert_eq!(rows[1].aggregate, None);
        assert_eq!(rows[2].aggregate.as_ref(), Some(&aggregate));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn second_recalculation_waits_for_the_first() {
        let store = Arc::new(MemoryStore::new());
        store.insert_all(&[result("A1", 1, 3.0)]).await.unwrap();

        let first_started = Arc::new(AtomicBool::new(false));
        let second_started = Arc::new(AtomicBool::new(false));
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let first = tokio::spawn({
            let store = Arc::clone(&store);
            let started = Arc::clone(&first_started);
            async move {
                store
                    .recalculate_exclusive(move |rows| {
                        started.store(true, Ordering::SeqCst);
                        release_rx.recv().unwrap();
                        crate::gpa::aggregate(rows.iter().map(|row| &row.result))
                    })
                    .await
            }
        });

        while !first_started.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let second = tokio::spawn({
            let store = Arc::clone(&store);
            let started = Arc::clone(&second_started);
            async move {
                store
                    .recalculate_exclusive(move |rows| {
                        started.store(true, Ordering::SeqCst);
                        crate::gpa::aggregate(rows.iter().map(|row| &row.result))
                    })
                    .await
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!second_started.load(Ordering::SeqCst));

        release_tx.send(()).unwrap();
        let first_writes = first.await.unwrap().unwrap();
        let second_writes = second.await.unwrap().unwrap();

        assert!(second_started.load(Ordering::SeqCst));
        assert_eq!(first_writes, second_writes);
        assert_eq!(first_writes[0].rows_updated, 1);
    }
}
