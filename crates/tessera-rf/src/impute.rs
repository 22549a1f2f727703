//! Class-conditional median imputation of missing factor values.

use tracing::{debug, instrument};

use crate::data_frame::DataFrame;

/// Median of a non-empty slice; the mean of the two middle values for even lengths.
fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

impl DataFrame {
    /// Replace every missing value with the median of that factor among rows
    /// of the same class.
    ///
    /// When a class has no present value for a factor, the factor's median
    /// over all rows is used instead. When a factor has no present value at
    /// all, its entries stay missing. Returns the number of entries filled;
    /// running it again afterwards fills nothing.
    #[instrument(skip_all, fields(n_rows = self.n_rows(), n_factors = self.n_factors()))]
    pub fn replace_missing_with_class_medians(&mut self) -> usize {
        let missing = self.missing_positions();
        if missing.is_empty() {
            return 0;
        }

        let groups: Vec<Vec<usize>> = self.class_groups().into_values().collect();
        let mut filled = 0usize;

        for factor in 0..self.n_factors() {
            let mut all_present: Vec<f64> = (0..self.n_rows())
                .map(|r| self.value(r, factor))
                .filter(|v| !v.is_nan())
                .collect();
            let global = median(&mut all_present);

            for rows in &groups {
                let gaps: Vec<usize> = rows
                    .iter()
                    .copied()
                    .filter(|&r| self.is_missing(r, factor))
                    .collect();
                if gaps.is_empty() {
                    continue;
                }
                let mut present: Vec<f64> = rows
                    .iter()
                    .map(|&r| self.value(r, factor))
                    .filter(|v| !v.is_nan())
                    .collect();
                let Some(fill) = median(&mut present).or(global) else {
                    continue;
                };
                for r in gaps {
                    self.set_value(r, factor, fill);
                    filled += 1;
                }
            }
        }

        debug!(
            n_missing = missing.len(),
            n_filled = filled,
            "replaced missing values with class medians"
        );
        filled
    }
}

#[cfg(test)]
mod tests {
    use crate::data_frame::DataFrame;

    fn frame_with_gaps() -> DataFrame {
        DataFrame::from_rows(
            vec!["x".into(), "y".into()],
            vec![
                vec![1.0, 10.0],
                vec![3.0, f64::NAN],
                vec![f64::NAN, 30.0],
                vec![100.0, 1.0],
                vec![200.0, 2.0],
                vec![f64::NAN, f64::NAN],
            ],
            vec![
                "a".into(),
                "a".into(),
                "a".into(),
                "b".into(),
                "b".into(),
                "b".into(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn fills_with_per_class_median() {
        let mut frame = frame_with_gaps();
        let filled = frame.replace_missing_with_class_medians();
        assert_eq!(filled, 4);
        // class a, factor x: median(1, 3) = 2
        assert_eq!(frame.value(2, 0), 2.0);
        // class a, factor y: median(10, 30) = 20
        assert_eq!(frame.value(1, 1), 20.0);
        // class b: median(100, 200) = 150, median(1, 2) = 1.5
        assert_eq!(frame.value(5, 0), 150.0);
        assert_eq!(frame.value(5, 1), 1.5);
        assert!(frame.missing_positions().is_empty());
    }

    #[test]
    fn idempotent() {
        let mut once = frame_with_gaps();
        once.replace_missing_with_class_medians();
        let mut twice = once.clone();
        assert_eq!(twice.replace_missing_with_class_medians(), 0);
        assert_eq!(once, twice);
    }

    #[test]
    fn falls_back_to_global_median() {
        let mut frame = DataFrame::from_rows(
            vec!["x".into()],
            vec![vec![1.0], vec![5.0], vec![9.0], vec![f64::NAN]],
            vec!["a".into(), "a".into(), "a".into(), "b".into()],
        )
        .unwrap();
        assert_eq!(frame.replace_missing_with_class_medians(), 1);
        assert_eq!(frame.value(3, 0), 5.0);
    }

    #[test]
    fn fully_missing_factor_stays_missing() {
        let mut frame = DataFrame::from_rows(
            vec!["x".into()],
            vec![vec![f64::NAN], vec![f64::NAN]],
            vec!["a".into(), "b".into()],
        )
        .unwrap();
        assert_eq!(frame.replace_missing_with_class_medians(), 0);
        assert_eq!(frame.missing_positions().len(), 2);
    }
}
