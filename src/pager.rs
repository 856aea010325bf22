use std::collections::BTreeMap;

/// A display location attached to a reference index: page number plus the
/// horizontal and vertical position on that page as fractions.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Marker {
    pub page: u32,
    pub x: f64,
    pub y: f64,
}

/// Maps raw matcher positions onto the nearest preceding marker, ignoring
/// small backward jitter.
pub struct PositionPager {
    markers: BTreeMap<usize, Marker>,
    current: i64,
    previous: i64,
    changed: bool,
}

impl PositionPager {
    pub fn new(markers: BTreeMap<usize, Marker>) -> Self {
        Self {
            markers,
            current: -1,
            previous: -1,
            changed: false,
        }
    }

    /// Feeds one raw position. Returns whether the current marker moved.
    ///
    /// A backward move is taken only when `raw` is closer to the earlier
    /// marker than to the one currently shown.
    pub fn set_estimate(&mut self, raw: i64) -> bool {
        self.changed = false;
        if raw < 0 {
            return false;
        }
        let Some((&key, _)) = self.markers.range(..=(raw as usize)).next_back() else {
            return false;
        };
        let k = key as i64;
        let accept = k >= self.current || self.current - raw > raw - k;
        if accept {
            self.previous = self.current;
            self.current = k;
            self.changed = self.current != self.previous;
        }
        self.changed
    }

    /// Whether the last `set_estimate` moved to a different marker.
    pub fn has_changed(&self) -> bool {
        self.changed
    }

    /// Reference index of the shown marker, -1 before the first one.
    pub fn current_index(&self) -> i64 {
        self.current
    }

    pub fn previous_index(&self) -> i64 {
        self.previous
    }

    /// The shown marker, or the top of the first page when there is none.
    pub fn marker(&self) -> Marker {
        usize::try_from(self.current)
            .ok()
            .and_then(|i| self.markers.get(&i).copied())
            .unwrap_or_default()
    }

    pub fn markers(&self) -> &BTreeMap<usize, Marker> {
        &self.markers
    }

    pub fn reset(&mut self) {
        self.current = -1;
        self.previous = -1;
        self.changed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pager() -> PositionPager {
        let mut m = BTreeMap::new();
        for (i, idx) in [0usize, 10, 20].iter().enumerate() {
            m.insert(*idx, Marker { page: i as u32, x: 0.5, y: 0.1 * (i as f64) });
        }
        PositionPager::new(m)
    }

    #[test]
    fn forward_estimate_snaps_to_preceding_marker() {
        let mut p = pager();
        assert!(p.set_estimate(15));
        assert_eq!(p.current_index(), 10);
        assert_eq!(p.previous_index(), -1);
        assert_eq!(p.marker().page, 1);
    }

    #[test]
    fn small_backward_jitter_is_rejected() {
        let mut p = pager();
        p.set_estimate(15);
        // 10 - 9 = 1 is not more than 9 - 0 = 9
        assert!(!p.set_estimate(9));
        assert_eq!(p.current_index(), 10);
        assert!(!p.has_changed());
    }

    #[test]
    fn clear_backward_jump_is_accepted() {
        let mut p = pager();
        p.set_estimate(15);
        p.set_estimate(9);
        // 10 - 3 = 7 is more than 3 - 0 = 3
        assert!(p.set_estimate(3));
        assert_eq!(p.current_index(), 0);
        assert_eq!(p.previous_index(), 10);
        assert!(p.has_changed());
    }

    #[test]
    fn staying_on_a_marker_is_not_a_change() {
        let mut p = pager();
        assert!(p.set_estimate(11));
        assert!(!p.set_estimate(12));
        assert!(!p.has_changed());
        assert_eq!(p.current_index(), 10);
    }

    #[test]
    fn nothing_below_the_first_marker() {
        let mut m = BTreeMap::new();
        m.insert(5usize, Marker { page: 2, x: 0.0, y: 0.0 });
        let mut p = PositionPager::new(m);
        assert!(!p.set_estimate(4));
        assert!(!p.set_estimate(-1));
        assert_eq!(p.current_index(), -1);
        assert_eq!(p.marker(), Marker::default());
        assert!(p.set_estimate(5));
    }
}
