//! Static, contiguous partitioning of `n_items` across `n_workers`.
//!
//! Worker `i` owns `[i * chunk, (i + 1) * chunk)` with `chunk = n_items / n_workers`;
//! the last worker additionally absorbs the remainder. Ranges never overlap and
//! together cover `[0, n_items)` exactly once.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Half-open `[start, end)` range of corpus indices owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Partition {
    pub start: usize,
    pub end: usize,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

pub fn partition(n_items: usize, n_workers: usize, worker_id: usize) -> Result<Partition> {
    if n_workers == 0 {
        return Err(Error::InvalidArgument("n_workers must be at least 1".to_string()));
    }
    if worker_id >= n_workers {
        return Err(Error::InvalidArgument(format!(
            "worker_id {} out of range for {} workers",
            worker_id, n_workers
        )));
    }
    let chunk = n_items / n_workers;
    let start = worker_id * chunk;
    let end = if worker_id == n_workers - 1 { n_items } else { (worker_id + 1) * chunk };
    Ok(Partition { start, end })
}

/// All partitions in worker-ordinal order.
pub fn partitions(n_items: usize, n_workers: usize) -> Result<Vec<Partition>> {
    (0..n_workers.max(1))
        .map(|w| partition(n_items, n_workers, w))
        .collect()
}

/// The slice of `items` owned by `worker_id`.
pub fn split_work<T>(items: &[T], n_workers: usize, worker_id: usize) -> Result<&[T]> {
    let p = partition(items.len(), n_workers, worker_id)?;
    Ok(&items[p.range()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_tile_the_input_exactly_once() {
        for n_items in 0..40usize {
            for n_workers in 1..12usize {
                let parts = partitions(n_items, n_workers).unwrap();
                assert_eq!(parts.len(), n_workers);
                let mut seen = vec![0u8; n_items];
                for p in &parts {
                    assert!(p.start <= p.end);
                    for i in p.range() { seen[i] += 1; }
                }
                assert!(seen.iter().all(|&c| c == 1), "n_items={n_items} n_workers={n_workers}");
                assert_eq!(parts[0].start, 0);
                assert_eq!(parts[n_workers - 1].end, n_items);
            }
        }
    }

    #[test]
    fn seven_items_two_workers() {
        assert_eq!(partition(7, 2, 0).unwrap(), Partition { start: 0, end: 3 });
        assert_eq!(partition(7, 2, 1).unwrap(), Partition { start: 3, end: 7 });
    }

    #[test]
    fn more_workers_than_items_yields_empty_ranges() {
        let parts = partitions(2, 5).unwrap();
        assert!(parts[..4].iter().all(Partition::is_empty));
        assert_eq!(parts[4], Partition { start: 0, end: 2 });
    }

    #[test]
    fn invalid_arguments_are_rejected() {
        assert!(matches!(partition(10, 0, 0), Err(Error::InvalidArgument(_))));
        assert!(matches!(partition(10, 3, 3), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn split_work_slices_topics() {
        let topics = ["a", "b", "c", "d", "e"];
        assert_eq!(split_work(&topics, 2, 0).unwrap(), &["a", "b"]);
        assert_eq!(split_work(&topics, 2, 1).unwrap(), &["c", "d", "e"]);
    }
}
