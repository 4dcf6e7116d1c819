//! Half-open ranges with display labels, for binning continuous variables.

/// Range where lower bound is inclusive, upper bound is exclusive or unbounded.
#[derive(Copy, Clone, Debug)]
pub struct Range<T>(T, Option<T>);

impl<T> Range<T>
where
    T: Ord,
{
    pub fn new(from: T, to: Option<T>) -> Self {
        if let Some(ref to) = to {
            if from >= *to {
                panic!("ranges must go from low to high")
            }
        }
        Range(from, to)
    }

    pub fn contains(&self, val: &T) -> bool {
        if let Some(end) = &self.1 {
            val >= &self.0 && val < end
        } else {
            val >= &self.0
        }
    }
}

/// An ordered list of labelled ranges. A value outside every range has no label, which
/// the reporting stage treats the same as a missing value.
pub struct Bands<T> {
    bands: Vec<(Range<T>, &'static str)>,
}

impl<T> Bands<T>
where
    T: Ord,
{
    pub fn new(bands: impl IntoIterator<Item = (Range<T>, &'static str)>) -> Self {
        Self {
            bands: bands.into_iter().collect(),
        }
    }

    pub fn classify(&self, val: &T) -> Option<&'static str> {
        self.bands
            .iter()
            .find(|(range, _)| range.contains(val))
            .map(|(_, label)| *label)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classify_half_open() {
        let bands = Bands::new([
            (Range::new(0, Some(10)), "low"),
            (Range::new(10, Some(20)), "mid"),
            (Range::new(20, None), "high"),
        ]);
        assert_eq!(bands.classify(&0), Some("low"));
        assert_eq!(bands.classify(&9), Some("low"));
        assert_eq!(bands.classify(&10), Some("mid"));
        assert_eq!(bands.classify(&500), Some("high"));
        assert_eq!(bands.classify(&-1), None);
    }
}
