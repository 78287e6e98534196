/// Split a linear work range `[0, total)` into at most `chunks` contiguous,
/// nearly-equal ranges.
///
/// Boundaries are `round(step * (i + 1))` with `step = total / chunks`, so
/// remainders spread across the chunks instead of piling up on the last
/// one. Empty chunks are omitted.
pub fn partition(total: usize, chunks: usize) -> Vec<(usize, usize)> {
    debug_assert!(chunks > 0);
    let step = total as f64 / chunks as f64;
    let mut ranges = Vec::with_capacity(chunks);
    let mut start = 0usize;
    for i in 0..chunks {
        let end = (step * (i + 1) as f64 + 0.5) as usize;
        if start != end {
            ranges.push((start, end));
        }
        start = end;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_covers_range_exactly() {
        for total in [0usize, 1, 7, 64, 1000, 1001] {
            for chunks in [1usize, 2, 3, 8, 13] {
                let ranges = partition(total, chunks);
                let mut expect = 0;
                for &(s, e) in &ranges {
                    assert_eq!(s, expect);
                    assert!(e > s);
                    expect = e;
                }
                assert_eq!(expect, total);
            }
        }
    }

    #[test]
    fn test_rounded_boundaries() {
        // 10 units over 4 workers: 2.5 per chunk, rounded half-up.
        assert_eq!(partition(10, 4), vec![(0, 3), (3, 5), (5, 8), (8, 10)]);
    }

    #[test]
    fn test_empty_chunks_skipped() {
        let ranges = partition(2, 8);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges.last(), Some(&(1, 2)));
    }

    #[test]
    fn test_no_work() {
        assert!(partition(0, 4).is_empty());
    }
}
