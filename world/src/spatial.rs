//! Uniform grid answering "what is near this point" queries.
//!
//! Cells are keyed by `floor(position / cell_size)` on each axis using `i64`
//! keys, so negative and very large coordinates bucket correctly. Each key is
//! stored in exactly one bucket, the one containing its last known position.

use std::{collections::HashMap, hash::Hash};

use horde_core::Vec2;
use tracing::warn;

const FALLBACK_CELL_SIZE: f32 = 64.0;

/// Integer coordinate of a grid cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    x: i64,
    y: i64,
}

impl CellKey {
    /// Creates a cell key from its column and row.
    #[must_use]
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Column of the cell.
    #[must_use]
    pub const fn x(&self) -> i64 {
        self.x
    }

    /// Row of the cell.
    #[must_use]
    pub const fn y(&self) -> i64 {
        self.y
    }
}

#[derive(Clone, Copy, Debug)]
struct Location {
    cell: CellKey,
    position: Vec2,
}

/// Uniform spatial grid over world coordinates.
#[derive(Clone, Debug)]
pub struct SpatialIndex<K> {
    cell_size: f32,
    cells: HashMap<CellKey, Vec<K>>,
    locations: HashMap<K, Location>,
}

impl<K: Copy + Eq + Hash> SpatialIndex<K> {
    /// Creates an empty index with square cells of the provided side length.
    #[must_use]
    pub fn new(cell_size: f32) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            warn!(cell_size, "invalid cell size, using {FALLBACK_CELL_SIZE}");
            FALLBACK_CELL_SIZE
        };
        Self {
            cell_size,
            cells: HashMap::new(),
            locations: HashMap::new(),
        }
    }

    /// Side length of a cell in world units.
    #[must_use]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Cell containing the provided position.
    #[must_use]
    pub fn cell_of(&self, position: Vec2) -> CellKey {
        CellKey::new(
            axis_cell(position.x, self.cell_size),
            axis_cell(position.y, self.cell_size),
        )
    }

    /// Adds `key` to the bucket for `position`, moving it if already present.
    ///
    /// Non-finite positions are rejected and leave the key unindexed.
    pub fn insert(&mut self, key: K, position: Vec2) -> bool {
        if !position.is_finite() {
            warn!(?position, "refusing to index a non-finite position");
            let _ = self.remove(key);
            return false;
        }

        let cell = self.cell_of(position);
        if let Some(location) = self.locations.get_mut(&key) {
            if location.cell == cell {
                location.position = position;
                return true;
            }
        }
        let _ = self.remove(key);

        self.cells.entry(cell).or_default().push(key);
        let _ = self.locations.insert(key, Location { cell, position });
        true
    }

    /// Deletes `key` from its last known bucket.
    pub fn remove(&mut self, key: K) -> bool {
        let Some(location) = self.locations.remove(&key) else {
            return false;
        };

        if let Some(bucket) = self.cells.get_mut(&location.cell) {
            if let Some(slot) = bucket.iter().position(|member| *member == key) {
                let _ = bucket.swap_remove(slot);
            }
            if bucket.is_empty() {
                let _ = self.cells.remove(&location.cell);
            }
        }
        true
    }

    /// Re-buckets `key` using its current position.
    pub fn update(&mut self, key: K, position: Vec2) -> bool {
        self.insert(key, position)
    }

    /// Removes every key from the index.
    pub fn clear(&mut self) {
        self.cells.clear();
        self.locations.clear();
    }

    /// Clears the index and inserts every provided entry.
    pub fn rebuild<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, Vec2)>,
    {
        self.clear();
        for (key, position) in entries {
            let _ = self.insert(key, position);
        }
    }

    /// Collects every key whose cell touches the bounding box of the circle.
    ///
    /// The result over-approximates the circle; callers doing exact collision
    /// must filter by true distance. A radius of zero still returns the keys
    /// in the cell containing `center`.
    pub fn query_radius(&self, center: Vec2, radius: f32, out: &mut Vec<K>) {
        if !center.is_finite() || radius.is_nan() {
            return;
        }
        let radius = radius.max(0.0);
        if radius.is_infinite() {
            out.extend(self.locations.keys().copied());
            return;
        }

        let extent = Vec2::splat(radius);
        let low = self.cell_of(center - extent);
        let high = self.cell_of(center + extent);

        let columns = i128::from(high.x) - i128::from(low.x) + 1;
        let rows = i128::from(high.y) - i128::from(low.y) + 1;
        let touched = columns.saturating_mul(rows);

        if touched > self.cells.len() as i128 {
            for (cell, bucket) in &self.cells {
                if (low.x..=high.x).contains(&cell.x) && (low.y..=high.y).contains(&cell.y) {
                    out.extend(bucket.iter().copied());
                }
            }
            return;
        }

        for y in low.y..=high.y {
            for x in low.x..=high.x {
                if let Some(bucket) = self.cells.get(&CellKey::new(x, y)) {
                    out.extend(bucket.iter().copied());
                }
            }
        }
    }

    /// Last position recorded for `key`.
    #[must_use]
    pub fn position(&self, key: K) -> Option<Vec2> {
        self.locations.get(&key).map(|location| location.position)
    }

    /// Cell currently holding `key`.
    #[must_use]
    pub fn cell_for(&self, key: K) -> Option<CellKey> {
        self.locations.get(&key).map(|location| location.cell)
    }

    /// Keys stored in the provided cell.
    #[must_use]
    pub fn members(&self, cell: CellKey) -> &[K] {
        self.cells.get(&cell).map(Vec::as_slice).unwrap_or_default()
    }

    /// Number of indexed keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Reports whether no key is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Number of non-empty cells.
    #[must_use]
    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }
}

fn axis_cell(value: f32, cell_size: f32) -> i64 {
    // Float-to-int casts saturate, keeping far-away positions in edge cells.
    (f64::from(value) / f64::from(cell_size)).floor() as i64
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn negative_coordinates_use_floor_division() {
        let index: SpatialIndex<u32> = SpatialIndex::new(10.0);
        assert_eq!(index.cell_of(Vec2::new(-0.5, 0.5)), CellKey::new(-1, 0));
        assert_eq!(index.cell_of(Vec2::new(-10.0, -10.01)), CellKey::new(-1, -2));
        assert_eq!(index.cell_of(Vec2::new(9.99, 10.0)), CellKey::new(0, 1));
    }

    #[test]
    fn update_moves_key_between_buckets() {
        let mut index = SpatialIndex::new(10.0);
        assert!(index.insert(1_u32, Vec2::new(5.0, 5.0)));
        assert!(index.update(1, Vec2::new(-25.0, 5.0)));

        assert!(index.members(CellKey::new(0, 0)).is_empty());
        assert_eq!(index.members(CellKey::new(-3, 0)), &[1]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.occupied_cells(), 1);
    }

    #[test]
    fn remove_forgets_key() {
        let mut index = SpatialIndex::new(10.0);
        assert!(index.insert(3_u32, Vec2::ZERO));
        assert!(index.remove(3));
        assert!(!index.remove(3));
        assert!(index.is_empty());
        assert_eq!(index.position(3), None);
    }

    #[test]
    fn zero_radius_returns_same_cell() {
        let mut index = SpatialIndex::new(10.0);
        assert!(index.insert(1_u32, Vec2::new(3.0, 3.0)));
        assert!(index.insert(2_u32, Vec2::new(13.0, 3.0)));
        let mut out = Vec::new();
        index.query_radius(Vec2::new(3.0, 3.0), 0.0, &mut out);
        assert_eq!(out, vec![1]);
    }

    #[test]
    fn non_finite_positions_are_not_indexed() {
        let mut index = SpatialIndex::new(10.0);
        assert!(index.insert(1_u32, Vec2::new(1.0, 1.0)));
        assert!(!index.insert(1_u32, Vec2::new(f32::NAN, 1.0)));
        assert!(index.is_empty());

        let mut out = Vec::new();
        index.query_radius(Vec2::new(f32::INFINITY, 0.0), 5.0, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn huge_coordinates_are_indexed_and_found() {
        let mut index = SpatialIndex::new(32.0);
        let far = Vec2::new(3.0e38, -3.0e38);
        assert!(index.insert(9_u32, far));
        let mut out = Vec::new();
        index.query_radius(far, 1.0, &mut out);
        assert_eq!(out, vec![9]);
    }

    #[test]
    fn wide_query_scans_occupied_cells() {
        let mut index = SpatialIndex::new(1.0);
        assert!(index.insert(1_u32, Vec2::new(-5_000.0, 0.0)));
        assert!(index.insert(2_u32, Vec2::new(5_000.0, 0.0)));
        let mut out = Vec::new();
        index.query_radius(Vec2::ZERO, 10_000.0, &mut out);
        out.sort_unstable();
        assert_eq!(out, vec![1, 2]);
    }

    #[test]
    fn query_matches_brute_force_reference() {
        let mut rng = ChaCha8Rng::seed_from_u64(0x5eed_0001);
        for round in 0..40 {
            let cell_size = rng.gen_range(4.0_f32..=64.0);
            let mut index = SpatialIndex::new(cell_size);
            let mut points = Vec::new();
            for key in 0..150_u32 {
                let position = Vec2::new(
                    rng.gen_range(-500.0_f32..=500.0),
                    rng.gen_range(-500.0_f32..=500.0),
                );
                points.push((key, position));
                assert!(index.insert(key, position));
            }

            for _ in 0..20 {
                let center = Vec2::new(
                    rng.gen_range(-520.0_f32..=520.0),
                    rng.gen_range(-520.0_f32..=520.0),
                );
                let radius = rng.gen_range(0.0_f32..=120.0);
                let mut found = Vec::new();
                index.query_radius(center, radius, &mut found);

                for (key, position) in &points {
                    if position.distance(center) <= radius {
                        assert!(
                            found.contains(key),
                            "round {round}: key {key} within {radius} of {center:?} was missed"
                        );
                    }
                }

                // Over-approximation is bounded by the cell rectangle.
                let slack = (radius + cell_size) * 2.0_f32.sqrt();
                for key in &found {
                    let position = points[*key as usize].1;
                    assert!(position.distance(center) <= slack + 1e-3);
                }
            }
        }
    }

    #[test]
    fn rebuild_matches_incremental_updates() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut incremental = SpatialIndex::new(16.0);
        let mut rebuilt = SpatialIndex::new(16.0);
        let mut positions: Vec<Vec2> = (0..64)
            .map(|_| Vec2::new(rng.gen_range(-200.0..=200.0), rng.gen_range(-200.0..=200.0)))
            .collect();
        for (key, position) in positions.iter().enumerate() {
            assert!(incremental.insert(key, *position));
        }

        for position in &mut positions {
            *position += Vec2::new(rng.gen_range(-40.0..=40.0), rng.gen_range(-40.0..=40.0));
        }
        for (key, position) in positions.iter().enumerate() {
            assert!(incremental.update(key, *position));
        }
        rebuilt.rebuild(positions.iter().copied().enumerate());

        for key in 0..positions.len() {
            assert_eq!(incremental.cell_for(key), rebuilt.cell_for(key));
        }
        assert_eq!(incremental.occupied_cells(), rebuilt.occupied_cells());
    }
}
