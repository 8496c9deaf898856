use std::ops::Range;

use crate::BenchError;

// ═══════════════════════════════════════════════════════════════
//  Worker ranges
// ═══════════════════════════════════════════════════════════════

/// Разбить `[0, count)` на `workers` непрерывных непересекающихся диапазонов.
///
/// Первые `count % workers` диапазонов получают на один id больше, так что
/// сумма длин всегда равна `count`. При `count < workers` хвостовые
/// диапазоны пустые.
pub fn partition(count: u64, workers: usize) -> Result<Vec<Range<u64>>, BenchError> {
    if workers == 0 {
        return Err(BenchError::Config("workers must be at least 1".into()));
    }

    let n = workers as u64;
    let base = count / n;
    let extra = count % n;

    let mut ranges = Vec::with_capacity(workers);
    let mut start = 0;
    for w in 0..n {
        let len = base + u64::from(w < extra);
        ranges.push(start..start + len);
        start += len;
    }
    Ok(ranges)
}

// ═══════════════════════════════════════════════════════════════
//  Batches
// ═══════════════════════════════════════════════════════════════

/// Итератор по последовательным под-диапазонам длиной не больше `size`.
#[derive(Debug, Clone)]
pub struct Batches {
    next: u64,
    end: u64,
    size: u64,
}

impl Batches {
    /// Сколько id ещё не выдано.
    pub fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.next)
    }
}

impl Iterator for Batches {
    type Item = Range<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let start = self.next;
        let stop = start.saturating_add(self.size).min(self.end);
        self.next = stop;
        Some(start..stop)
    }
}

pub fn batches(range: Range<u64>, size: usize) -> Result<Batches, BenchError> {
    if size == 0 {
        return Err(BenchError::Config("batch size must be at least 1".into()));
    }
    Ok(Batches { next: range.start, end: range.end, size: size as u64 })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_covers(ranges: &[Range<u64>], count: u64) {
        let mut expected_start = 0;
        for r in ranges {
            assert_eq!(r.start, expected_start, "gap or overlap at {r:?}");
            assert!(r.end >= r.start);
            expected_start = r.end;
        }
        assert_eq!(expected_start, count);
    }

    #[test]
    fn even_split() {
        let ranges = partition(50_000, 8).unwrap();
        assert_eq!(ranges.len(), 8);
        assert!(ranges.iter().all(|r| r.end - r.start == 6_250));
        assert_covers(&ranges, 50_000);
    }

    #[test]
    fn remainder_goes_to_leading_workers() {
        let ranges = partition(10, 4).unwrap();
        let lens: Vec<u64> = ranges.iter().map(|r| r.end - r.start).collect();
        assert_eq!(lens, vec![3, 3, 2, 2]);
        assert_covers(&ranges, 10);
    }

    #[test]
    fn more_workers_than_messages() {
        let ranges = partition(3, 5).unwrap();
        assert_eq!(ranges.len(), 5);
        assert_covers(&ranges, 3);
        assert!(ranges[3].is_empty() && ranges[4].is_empty());
    }

    #[test]
    fn sizes_differ_by_at_most_one() {
        for count in [0u64, 1, 7, 99, 500_000] {
            for workers in 1..=17 {
                let ranges = partition(count, workers).unwrap();
                assert_covers(&ranges, count);
                let lens: Vec<u64> = ranges.iter().map(|r| r.end - r.start).collect();
                let max = lens.iter().max().unwrap();
                let min = lens.iter().min().unwrap();
                assert!(max - min <= 1, "count={count} workers={workers}");
            }
        }
    }

    #[test]
    fn zero_workers_rejected() {
        assert!(matches!(partition(10, 0), Err(BenchError::Config(_))));
    }

    #[test]
    fn batches_cover_range_with_short_tail() {
        let plan = batches(100..350, 100).unwrap();
        assert_eq!(plan.remaining(), 250);
        let got: Vec<_> = plan.collect();
        assert_eq!(got, vec![100..200, 200..300, 300..350]);
    }

    #[test]
    fn batches_of_empty_range() {
        assert_eq!(batches(5..5, 10).unwrap().count(), 0);
        assert!(matches!(batches(0..5, 0), Err(BenchError::Config(_))));
    }
}
