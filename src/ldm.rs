//! Local Dynamic Map: the latest CAM received from every station.
//!
//! The map is shared between the ingest loop, which overwrites entries, and
//! readers iterating over it. Iteration copies the map under the read lock
//! and filters the copy, so no lock is held while the caller consumes it.
//!
//! Entries are never removed. Stale stations stay visible until overwritten;
//! use [`CamFilter::max_age`] to hide them.

use crate::time;
use crate::types::{Cam, CamField, StationId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LdmError {
    #[error("Unknown station: {0}")]
    UnknownStation(StationId),
    #[error("position must be given if max_distance is")]
    InvalidFilterArgs,
}

/// Spatial and age constraints for [`Ldm::iter_filtered`].
///
/// Positions and distances are in raw wire units (1e-7 degree), measured as a
/// planar Euclidean distance between `(longitude, latitude)` pairs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CamFilter {
    /// Reference point as `(longitude, latitude)`
    pub position: Option<(f64, f64)>,
    /// Maximum distance from `position`
    pub max_distance: Option<f64>,
    /// Maximum age in milliseconds
    pub max_age: Option<i64>,
}

impl CamFilter {
    /// A filter letting everything through.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at_position(mut self, longitude: f64, latitude: f64) -> Self {
        self.position = Some((longitude, latitude));
        self
    }

    pub fn within(mut self, max_distance: f64) -> Self {
        self.max_distance = Some(max_distance);
        self
    }

    pub fn max_age(mut self, max_age_ms: i64) -> Self {
        self.max_age = Some(max_age_ms);
        self
    }

    /// Check the filter without running it.
    pub fn validate(&self) -> Result<(), LdmError> {
        self.resolve().map(|_| ())
    }

    /// Resolve defaults: `(position, max_distance, max_age)`.
    fn resolve(&self) -> Result<((f64, f64), f64, f64), LdmError> {
        let (position, max_distance) = match (self.position, self.max_distance) {
            (_, None) => ((0.0, 0.0), f64::INFINITY),
            (None, Some(_)) => return Err(LdmError::InvalidFilterArgs),
            (Some(p), Some(d)) => (p, d),
        };
        let max_age = self.max_age.map(|a| a as f64).unwrap_or(f64::INFINITY);
        Ok((position, max_distance, max_age))
    }
}

/// Planar distance between a CAM and `(longitude, latitude)`, in wire units.
///
/// Unavailable positions use their sentinel values, which places them far
/// away from any real coordinate.
pub fn distance(cam: &Cam, position: (f64, f64)) -> f64 {
    let dx = cam.get(CamField::Longitude) as f64 - position.0;
    let dy = cam.get(CamField::Latitude) as f64 - position.1;
    (dx * dx + dy * dy).sqrt()
}

/// Lazy iterator over a snapshot of the map, see [`Ldm::iter_filtered`].
pub struct FilteredCams {
    cams: std::vec::IntoIter<Cam>,
    now: u64,
    position: (f64, f64),
    max_distance: f64,
    max_age: f64,
}

impl Iterator for FilteredCams {
    type Item = Cam;

    fn next(&mut self) -> Option<Cam> {
        let (now, position, max_distance, max_age) =
            (self.now, self.position, self.max_distance, self.max_age);
        self.cams.find(|cam| {
            cam.age_at(now) as f64 <= max_age && distance(cam, position) <= max_distance
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.cams.size_hint().1)
    }
}

/// Local dynamic map.
#[derive(Default)]
pub struct Ldm {
    cams: RwLock<HashMap<StationId, Cam>>,
}

impl Ldm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `cam` with `station_id`, replacing any previous entry.
    pub fn put(&self, station_id: StationId, cam: Cam) {
        self.cams.write().insert(station_id, cam);
    }

    /// Store `cam` under its own station id.
    pub fn insert(&self, cam: Cam) {
        self.put(cam.station_id(), cam);
    }

    /// Latest CAM received from `station_id`.
    pub fn get(&self, station_id: StationId) -> Result<Cam, LdmError> {
        self.cams
            .read()
            .get(&station_id)
            .copied()
            .ok_or(LdmError::UnknownStation(station_id))
    }

    pub fn contains(&self, station_id: StationId) -> bool {
        self.cams.read().contains_key(&station_id)
    }

    /// Number of stations tracked.
    pub fn len(&self) -> usize {
        self.cams.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cams.read().is_empty()
    }

    /// Stations currently tracked, in ascending order.
    pub fn station_ids(&self) -> Vec<StationId> {
        let mut ids: Vec<_> = self.cams.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Iterate over the latest CAM of every station matching `filter`, aged
    /// against the current time.
    pub fn iter_filtered(&self, filter: &CamFilter) -> Result<FilteredCams, LdmError> {
        self.iter_filtered_at(filter, time::now_its())
    }

    /// Same as [`Ldm::iter_filtered`] with ages measured at ITS timestamp `now`.
    ///
    /// The result reflects the map at call time. Later writes are not seen.
    pub fn iter_filtered_at(&self, filter: &CamFilter, now: u64) -> Result<FilteredCams, LdmError> {
        let (position, max_distance, max_age) = filter.resolve()?;
        Ok(self.snapshot(now, position, max_distance, max_age))
    }

    /// Iterate over every station without filtering.
    pub fn iter(&self) -> FilteredCams {
        self.snapshot(time::now_its(), (0.0, 0.0), f64::INFINITY, f64::INFINITY)
    }

    fn snapshot(&self, now: u64, position: (f64, f64), max_distance: f64, max_age: f64) -> FilteredCams {
        let cams: Vec<Cam> = self.cams.read().values().copied().collect();

        FilteredCams {
            cams: cams.into_iter(),
            now,
            position,
            max_distance,
            max_age,
        }
    }
}

impl fmt::Display for Ldm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LDM{{nvehicles={}}}", self.len())
    }
}

impl fmt::Debug for Ldm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ldm").field("nvehicles", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::gdt_from_its;
    use std::sync::Arc;

    const NOW: u64 = 65_536 * 10_000 + 30_000;

    fn cam_at(station: u32, lon: i32, lat: i32, stamped: u64) -> Cam {
        Cam::builder()
            .station_id(station)
            .gen_delta_time(gdt_from_its(stamped))
            .position(lat, lon)
            .build_at(NOW)
            .unwrap()
    }

    fn ids(iter: FilteredCams) -> Vec<u32> {
        let mut v: Vec<u32> = iter.map(|c| c.station_id().raw()).collect();
        v.sort_unstable();
        v
    }

    #[test]
    fn test_put_overwrites() {
        let ldm = Ldm::new();
        let a = cam_at(5, 1, 1, NOW);
        let b = cam_at(5, 2, 2, NOW);

        ldm.put(StationId(5), a);
        ldm.put(StationId(5), b);

        assert_eq!(ldm.get(StationId(5)).unwrap(), b);
        assert_ne!(ldm.get(StationId(5)).unwrap(), a);
        assert_eq!(ldm.len(), 1);
    }

    #[test]
    fn test_get_unknown() {
        let ldm = Ldm::new();
        assert_eq!(
            ldm.get(StationId(9)).unwrap_err(),
            LdmError::UnknownStation(StationId(9))
        );
        assert!(ldm.is_empty());
    }

    #[test]
    fn test_insert_uses_station_id() {
        let ldm = Ldm::new();
        ldm.insert(cam_at(3, 0, 0, NOW));
        ldm.insert(cam_at(1, 0, 0, NOW));
        assert!(ldm.contains(StationId(3)));
        assert_eq!(ldm.station_ids(), vec![StationId(1), StationId(3)]);
        assert_eq!(ldm.to_string(), "LDM{nvehicles=2}");
    }

    #[test]
    fn test_distance_filter() {
        let ldm = Ldm::new();
        ldm.insert(cam_at(1, 0, 0, NOW));
        ldm.insert(cam_at(2, 10, 0, NOW));
        ldm.insert(cam_at(3, 100, 0, NOW));

        let filter = CamFilter::new().at_position(0.0, 0.0).within(20.0);
        assert_eq!(ids(ldm.iter_filtered_at(&filter, NOW).unwrap()), vec![1, 2]);

        // boundary is inclusive
        let filter = CamFilter::new().at_position(0.0, 0.0).within(10.0);
        assert_eq!(ids(ldm.iter_filtered_at(&filter, NOW).unwrap()), vec![1, 2]);

        let filter = CamFilter::new().at_position(100.0, 0.0).within(95.0);
        assert_eq!(ids(ldm.iter_filtered_at(&filter, NOW).unwrap()), vec![2, 3]);
    }

    #[test]
    fn test_distance_is_euclidean() {
        let cam = cam_at(1, 3, 4, NOW);
        assert_eq!(distance(&cam, (0.0, 0.0)), 5.0);
    }

    #[test]
    fn test_age_filter() {
        let ldm = Ldm::new();
        ldm.insert(cam_at(1, 0, 0, NOW - 5000));

        let filter = CamFilter::new().max_age(1000);
        assert_eq!(ids(ldm.iter_filtered_at(&filter, NOW).unwrap()), Vec::<u32>::new());

        let filter = CamFilter::new().max_age(10_000);
        assert_eq!(ids(ldm.iter_filtered_at(&filter, NOW).unwrap()), vec![1]);

        let filter = CamFilter::new().max_age(5000);
        assert_eq!(ids(ldm.iter_filtered_at(&filter, NOW).unwrap()), vec![1]);
    }

    #[test]
    fn test_no_filter_yields_everything() {
        let ldm = Ldm::new();
        // unavailable position sits at the sentinel coordinates
        ldm.insert(
            Cam::builder()
                .station_id(7)
                .gen_delta_time(gdt_from_its(NOW))
                .build_at(NOW)
                .unwrap(),
        );
        ldm.insert(cam_at(8, -500, 900, NOW - 60_000));

        assert_eq!(ids(ldm.iter_filtered_at(&CamFilter::new(), NOW).unwrap()), vec![7, 8]);
        assert_eq!(ids(ldm.iter()), vec![7, 8]);
    }

    #[test]
    fn test_iter_is_unfiltered_snapshot() {
        let ldm = Ldm::new();
        ldm.insert(cam_at(1, 0, 0, NOW - 3_600_000));
        ldm.insert(cam_at(2, 1_800_000_001, 900_000_001, NOW));

        let iter = ldm.iter();
        ldm.insert(cam_at(3, 0, 0, NOW));

        assert_eq!(ids(iter), vec![1, 2]);
        assert_eq!(ids(ldm.iter()), vec![1, 2, 3]);
    }

    #[test]
    fn test_position_without_distance_is_ignored() {
        let ldm = Ldm::new();
        ldm.insert(cam_at(1, 1_000_000, 0, NOW));
        let filter = CamFilter::new().at_position(0.0, 0.0);
        assert_eq!(ids(ldm.iter_filtered_at(&filter, NOW).unwrap()), vec![1]);
    }

    #[test]
    fn test_invalid_filter_args() {
        let ldm = Ldm::new();
        let filter = CamFilter::new().within(5.0);
        assert_eq!(
            ldm.iter_filtered(&filter).err(),
            Some(LdmError::InvalidFilterArgs)
        );
    }

    #[test]
    fn test_snapshot_ignores_later_writes() {
        let ldm = Ldm::new();
        ldm.insert(cam_at(1, 0, 0, NOW));

        let iter = ldm.iter_filtered_at(&CamFilter::new(), NOW).unwrap();
        ldm.insert(cam_at(2, 0, 0, NOW));

        assert_eq!(ids(iter), vec![1]);
        assert_eq!(ldm.len(), 2);
    }

    #[test]
    fn test_concurrent_writers() {
        let ldm = Arc::new(Ldm::new());

        let handles: Vec<_> = (0..4u32)
            .map(|t| {
                let ldm = Arc::clone(&ldm);
                std::thread::spawn(move || {
                    for i in 0..100u32 {
                        ldm.insert(cam_at(t * 1000 + i, i as i32, 0, NOW));
                        let _ = ldm.iter_filtered_at(&CamFilter::new(), NOW).unwrap().count();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(ldm.len(), 400);
    }
}
