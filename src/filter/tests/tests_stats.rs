//! Statistics, retain-all mode, and merge/large-value accounting tests.

#[cfg(test)]
mod tests {
    use crate::filter::FilterOptions;
    use crate::filter::tests::helpers::{
        del, drain, filter, filter_with, large_put, merge, put, single_del,
    };
    use crate::key::{FOOTER_LEN, OpType};
    use crate::snapshot::SnapshotSet;

    /// # Scenario
    /// Retain-all mode (new-subtable build): every well-formed record
    /// passes through, shadowed versions included.
    ///
    /// # Starting environment
    /// Input `[Put(k)@5, Put(k)@3, Delete(j)@2]`, `retain_all_records`.
    ///
    /// # Expected behavior
    /// - All three records survive in input order; zero drops.
    #[test]
    fn retain_all_keeps_everything() {
        let mut f = filter_with(
            vec![put(b"k", 5, b"new"), put(b"k", 3, b"old"), del(b"j", 2)],
            SnapshotSet::empty(),
            10,
            FilterOptions {
                retain_all_records: true,
                ..FilterOptions::default()
            },
        );
        let out = drain(&mut f);
        assert_eq!(
            out.iter().map(|r| (r.0.clone(), r.1)).collect::<Vec<_>>(),
            vec![
                (b"j".to_vec(), 2),
                (b"k".to_vec(), 5),
                (b"k".to_vec(), 3),
            ]
        );
        assert_eq!(f.stats().hidden_drop, 0);
        assert_eq!(f.stats().obsolete_drop, 0);
    }

    /// # Scenario
    /// Merge operands are not supported: they are excluded from the
    /// output and counted.
    ///
    /// # Starting environment
    /// Input `[Put(a)@9, Merge(m)@5, Put(z)@3]`.
    ///
    /// # Expected behavior
    /// - `a@9` and `z@3` survive; `merge_skipped == 1`.
    #[test]
    fn merge_operands_are_skipped() {
        let mut f = filter(
            vec![put(b"a", 9, b"v"), merge(b"m", 5, b"operand"), put(b"z", 3, b"v")],
            SnapshotSet::empty(),
            10,
        );
        let out = drain(&mut f);
        assert_eq!(
            out.iter().map(|r| r.0.clone()).collect::<Vec<_>>(),
            vec![b"a".to_vec(), b"z".to_vec()]
        );
        assert_eq!(f.stats().merge_skipped, 1);
        f.status().expect("clean run");
    }

    /// # Scenario
    /// A shadowed `LargeValuePut` is dropped like any put, and its
    /// backing blob is accounted for reclamation.
    ///
    /// # Starting environment
    /// Input `[Put(k)@9, LargeValuePut(k)@5]`, empty snapshot set.
    ///
    /// # Expected behavior
    /// - Only `@9` survives; `large_values_dropped == 1`.
    #[test]
    fn shadowed_large_value_is_accounted() {
        let mut f = filter(
            vec![put(b"k", 9, b"v"), large_put(b"k", 5, b"blob-ref")],
            SnapshotSet::empty(),
            10,
        );
        let out = drain(&mut f);
        assert_eq!(out.len(), 1);
        assert_eq!(f.stats().hidden_drop, 1);
        assert_eq!(f.stats().large_values_dropped, 1);
    }

    /// # Scenario
    /// The deferred-output path clears a `LargeValuePut`'s reference;
    /// the blob becomes reclaimable and is counted.
    ///
    /// # Starting environment
    /// Input `[SingleDelete(k)@5, LargeValuePut(k)@4]`,
    /// `earliest_write_conflict = 2`.
    ///
    /// # Expected behavior
    /// - Marker + cleared record survive; `large_values_dropped == 1`.
    #[test]
    fn cleared_large_value_is_accounted() {
        let mut f = filter(
            vec![single_del(b"k", 5), large_put(b"k", 4, b"blob-ref")],
            SnapshotSet::new(vec![], 2),
            10,
        );
        let out = drain(&mut f);
        assert_eq!(
            out,
            vec![
                (b"k".to_vec(), 5, OpType::SingleDelete, Vec::new()),
                (b"k".to_vec(), 4, OpType::LargeValuePut, Vec::new()),
            ]
        );
        assert_eq!(f.stats().large_values_dropped, 1);
    }

    /// # Scenario
    /// Input-side counters: record, deletion, and raw byte totals
    /// reflect everything pulled, dropped or not.
    ///
    /// # Starting environment
    /// Input `[Put(k,"abc")@5, Put(k,"de")@3, Delete(j)@2]`.
    ///
    /// # Expected behavior
    /// - 3 input records, 1 deletion record.
    /// - Raw key bytes = 3 × (1 + footer); raw value bytes = 5.
    #[test]
    fn input_side_accounting() {
        let mut f = filter(
            vec![put(b"k", 5, b"abc"), put(b"k", 3, b"de"), del(b"j", 2)],
            SnapshotSet::empty(),
            10,
        );
        drain(&mut f);

        let stats = f.stats();
        assert_eq!(stats.input_records, 3);
        assert_eq!(stats.input_deletion_records, 1);
        assert_eq!(stats.raw_key_bytes, 3 * (1 + FOOTER_LEN) as u64);
        assert_eq!(stats.raw_value_bytes, 5);
    }

    /// # Scenario
    /// `reset_drop_counts` zeroes the per-round drop counters without
    /// touching the input totals.
    ///
    /// # Expected behavior
    /// - `hidden_drop`/`obsolete_drop` return to 0; `input_records`
    ///   keeps its value.
    #[test]
    fn reset_drop_counts_preserves_totals() {
        let mut f = filter(
            vec![put(b"k", 5, b"v"), put(b"k", 3, b"v"), single_del(b"j", 2), put(b"j", 1, b"v")],
            SnapshotSet::empty(),
            10,
        );
        drain(&mut f);
        assert!(f.stats().hidden_drop > 0);
        assert!(f.stats().obsolete_drop > 0);

        let inputs_before = f.stats().input_records;
        f.reset_drop_counts();
        assert_eq!(f.stats().hidden_drop, 0);
        assert_eq!(f.stats().obsolete_drop, 0);
        assert_eq!(f.stats().input_records, inputs_before);
    }
}
