//! # Repositories
//!
//! Storage contracts consumed by the session and navigation flows, with
//! in-memory implementations and a viewport cache for spot lookups.
//!
//! All methods take `&self`: implementations own their synchronization so a
//! single store can be shared behind an `Arc` by the journey session, the
//! navigation session and the host UI.
//!
//! Backend failures surface as [`Error::Storage`]; corrupted stored values as
//! [`Error::DataIntegrity`]. Neither is ever coerced into a default.

use log::{debug, info};
use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::journey::{Travel, TravelId, UserId};
use crate::spot::{Comment, Spot, SpotId};
use crate::Bounds;

// ============================================================================
// Contracts
// ============================================================================

/// Spot storage.
pub trait SpotRepository: Send + Sync {
    /// All spots, newest first.
    fn get_all_spots(&self) -> Result<Vec<Spot>>;

    fn get_spot_by_id(&self, id: &SpotId) -> Result<Option<Spot>>;

    /// Spots whose coordinates lie inside `bounds` (edges inclusive).
    fn get_spots_in_bounds(&self, bounds: &Bounds) -> Result<Vec<Spot>>;

    fn create_spot(&self, spot: &Spot) -> Result<()>;

    /// Fails with [`Error::NotFound`] when the spot does not exist.
    fn update_spot(&self, spot: &Spot) -> Result<()>;

    /// Deleting a missing spot is not an error.
    fn delete_spot(&self, id: &SpotId) -> Result<()>;
}

/// Travel storage. Saving a travel upserts it together with its steps.
pub trait TravelRepository: Send + Sync {
    fn save_travel(&self, travel: &Travel) -> Result<()>;

    fn get_travel(&self, id: &TravelId) -> Result<Option<Travel>>;

    /// Most recently started in-progress travel of `user_id`.
    fn get_active_travel(&self, user_id: &UserId) -> Result<Option<Travel>>;

    /// Travels of `user_id`, most recently started first.
    fn get_travels_for_user(&self, user_id: &UserId) -> Result<Vec<Travel>>;

    fn delete_travel(&self, id: &TravelId) -> Result<()>;
}

/// Comment storage.
pub trait CommentRepository: Send + Sync {
    /// Comments on `spot_id`, newest first.
    fn get_comments_for_spot(&self, spot_id: &SpotId) -> Result<Vec<Comment>>;

    fn create_comment(&self, comment: &Comment) -> Result<()>;
}

impl<T: SpotRepository + ?Sized> SpotRepository for Arc<T> {
    fn get_all_spots(&self) -> Result<Vec<Spot>> {
        (**self).get_all_spots()
    }

    fn get_spot_by_id(&self, id: &SpotId) -> Result<Option<Spot>> {
        (**self).get_spot_by_id(id)
    }

    fn get_spots_in_bounds(&self, bounds: &Bounds) -> Result<Vec<Spot>> {
        (**self).get_spots_in_bounds(bounds)
    }

    fn create_spot(&self, spot: &Spot) -> Result<()> {
        (**self).create_spot(spot)
    }

    fn update_spot(&self, spot: &Spot) -> Result<()> {
        (**self).update_spot(spot)
    }

    fn delete_spot(&self, id: &SpotId) -> Result<()> {
        (**self).delete_spot(id)
    }
}

impl<T: TravelRepository + ?Sized> TravelRepository for Arc<T> {
    fn save_travel(&self, travel: &Travel) -> Result<()> {
        (**self).save_travel(travel)
    }

    fn get_travel(&self, id: &TravelId) -> Result<Option<Travel>> {
        (**self).get_travel(id)
    }

    fn get_active_travel(&self, user_id: &UserId) -> Result<Option<Travel>> {
        (**self).get_active_travel(user_id)
    }

    fn get_travels_for_user(&self, user_id: &UserId) -> Result<Vec<Travel>> {
        (**self).get_travels_for_user(user_id)
    }

    fn delete_travel(&self, id: &TravelId) -> Result<()> {
        (**self).delete_travel(id)
    }
}

impl<T: CommentRepository + ?Sized> CommentRepository for Arc<T> {
    fn get_comments_for_spot(&self, spot_id: &SpotId) -> Result<Vec<Comment>> {
        (**self).get_comments_for_spot(spot_id)
    }

    fn create_comment(&self, comment: &Comment) -> Result<()> {
        (**self).create_comment(comment)
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| Error::Storage(format!("{} lock poisoned", name)))
}

fn envelope(bounds: &Bounds) -> AABB<[f64; 2]> {
    AABB::from_corners([bounds.min_lng, bounds.min_lat], [bounds.max_lng, bounds.max_lat])
}

fn newest_first(spots: &mut [Spot]) {
    spots.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}

// ============================================================================
// In-memory spot store
// ============================================================================

type SpotPoint = GeomWithData<[f64; 2], SpotId>;

#[derive(Default)]
struct SpotIndex {
    tree: RTree<SpotPoint>,
    spots: HashMap<SpotId, Spot>,
}

impl SpotIndex {
    fn point(spot: &Spot) -> SpotPoint {
        GeomWithData::new([spot.coordinates.longitude, spot.coordinates.latitude], spot.id.clone())
    }
}

/// Spot store backed by an R-tree for bounds queries.
#[derive(Default)]
pub struct MemorySpotStore {
    index: Mutex<SpotIndex>,
}

impl MemorySpotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk-load a store from existing spots.
    pub fn with_spots(spots: Vec<Spot>) -> Self {
        let points: Vec<SpotPoint> = spots.iter().map(SpotIndex::point).collect();
        let index = SpotIndex {
            tree: RTree::bulk_load(points),
            spots: spots.into_iter().map(|s| (s.id.clone(), s)).collect(),
        };
        Self { index: Mutex::new(index) }
    }

    pub fn len(&self) -> usize {
        self.index.lock().map(|i| i.spots.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SpotRepository for MemorySpotStore {
    fn get_all_spots(&self) -> Result<Vec<Spot>> {
        let index = lock(&self.index, "spot store")?;
        let mut spots: Vec<Spot> = index.spots.values().cloned().collect();
        newest_first(&mut spots);
        Ok(spots)
    }

    fn get_spot_by_id(&self, id: &SpotId) -> Result<Option<Spot>> {
        let index = lock(&self.index, "spot store")?;
        Ok(index.spots.get(id).cloned())
    }

    fn get_spots_in_bounds(&self, bounds: &Bounds) -> Result<Vec<Spot>> {
        let index = lock(&self.index, "spot store")?;
        let mut spots: Vec<Spot> = index
            .tree
            .locate_in_envelope(&envelope(bounds))
            .filter_map(|p| index.spots.get(&p.data).cloned())
            .collect();
        newest_first(&mut spots);
        Ok(spots)
    }

    fn create_spot(&self, spot: &Spot) -> Result<()> {
        let mut index = lock(&self.index, "spot store")?;
        if index.spots.contains_key(&spot.id) {
            return Err(Error::Storage(format!("Spot '{}' already exists", spot.id)));
        }
        index.tree.insert(SpotIndex::point(spot));
        index.spots.insert(spot.id.clone(), spot.clone());
        Ok(())
    }

    fn update_spot(&self, spot: &Spot) -> Result<()> {
        let mut index = lock(&self.index, "spot store")?;
        let Some(previous) = index.spots.get(&spot.id).cloned() else {
            return Err(Error::NotFound { entity: "Spot", id: spot.id.to_string() });
        };
        index.tree.remove(&SpotIndex::point(&previous));
        index.tree.insert(SpotIndex::point(spot));
        index.spots.insert(spot.id.clone(), spot.clone());
        Ok(())
    }

    fn delete_spot(&self, id: &SpotId) -> Result<()> {
        let mut index = lock(&self.index, "spot store")?;
        if let Some(previous) = index.spots.remove(id) {
            index.tree.remove(&SpotIndex::point(&previous));
        }
        Ok(())
    }
}

// ============================================================================
// In-memory travel and comment stores
// ============================================================================

/// Travel store keeping full copies of each saved travel.
#[derive(Default)]
pub struct MemoryTravelStore {
    travels: Mutex<HashMap<TravelId, Travel>>,
}

impl MemoryTravelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TravelRepository for MemoryTravelStore {
    fn save_travel(&self, travel: &Travel) -> Result<()> {
        let mut travels = lock(&self.travels, "travel store")?;
        travels.insert(travel.id.clone(), travel.clone());
        Ok(())
    }

    fn get_travel(&self, id: &TravelId) -> Result<Option<Travel>> {
        Ok(lock(&self.travels, "travel store")?.get(id).cloned())
    }

    fn get_active_travel(&self, user_id: &UserId) -> Result<Option<Travel>> {
        let travels = lock(&self.travels, "travel store")?;
        Ok(travels
            .values()
            .filter(|t| &t.user_id == user_id && t.is_in_progress())
            .max_by_key(|t| t.start_date)
            .cloned())
    }

    fn get_travels_for_user(&self, user_id: &UserId) -> Result<Vec<Travel>> {
        let travels = lock(&self.travels, "travel store")?;
        let mut result: Vec<Travel> = travels.values().filter(|t| &t.user_id == user_id).cloned().collect();
        result.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Ok(result)
    }

    fn delete_travel(&self, id: &TravelId) -> Result<()> {
        lock(&self.travels, "travel store")?.remove(id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCommentStore {
    comments: Mutex<Vec<Comment>>,
}

impl MemoryCommentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CommentRepository for MemoryCommentStore {
    fn get_comments_for_spot(&self, spot_id: &SpotId) -> Result<Vec<Comment>> {
        let comments = lock(&self.comments, "comment store")?;
        let mut result: Vec<Comment> = comments.iter().filter(|c| &c.spot_id == spot_id).cloned().collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    fn create_comment(&self, comment: &Comment) -> Result<()> {
        let mut comments = lock(&self.comments, "comment store")?;
        if comments.iter().any(|c| c.id == comment.id) {
            return Err(Error::Storage(format!("Comment '{}' already exists", comment.id)));
        }
        comments.push(comment.clone());
        Ok(())
    }
}

// ============================================================================
// Viewport cache
// ============================================================================

/// Configuration for [`CachedSpotRepository`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Fraction of the query span added on each side before fetching.
    /// Default: 0.25
    pub padding_factor: f64,

    /// Lifetime of a cached region.
    /// Default: 60 seconds
    pub ttl_secs: u64,

    /// Maximum number of cached regions; the oldest is evicted first.
    /// Default: 12
    pub max_regions: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            padding_factor: 0.25,
            ttl_secs: 60,
            max_regions: 12,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedRegion {
    bounds: Bounds,
    spots: Vec<Spot>,
    fetched_at: Instant,
}

/// Spot repository wrapper serving map-viewport queries from padded regions.
///
/// A query fully inside a live cached region is answered by filtering that
/// region's spots. Anything else fetches the padded query from the inner
/// repository and caches it. Any write through the wrapper drops every
/// cached region.
pub struct CachedSpotRepository<R: SpotRepository> {
    inner: R,
    config: CacheConfig,
    regions: Mutex<VecDeque<CachedRegion>>,
}

impl<R: SpotRepository> CachedSpotRepository<R> {
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, CacheConfig::default())
    }

    pub fn with_config(inner: R, config: CacheConfig) -> Self {
        Self {
            inner,
            config,
            regions: Mutex::new(VecDeque::new()),
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Drop every cached region.
    pub fn invalidate(&self) {
        if let Ok(mut regions) = self.regions.lock() {
            if !regions.is_empty() {
                debug!("[SpotCache] Invalidating {} regions", regions.len());
            }
            regions.clear();
        }
    }

    /// Number of regions currently held, live or not yet purged.
    pub fn cached_region_count(&self) -> usize {
        self.regions.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn query_at(&self, bounds: &Bounds, now: Instant) -> Result<Vec<Spot>> {
        let ttl = Duration::from_secs(self.config.ttl_secs);
        let mut regions = lock(&self.regions, "spot cache")?;

        while regions
            .front()
            .is_some_and(|r| now.saturating_duration_since(r.fetched_at) >= ttl)
        {
            regions.pop_front();
        }

        if let Some(region) = regions.iter().find(|r| r.bounds.contains(bounds)) {
            debug!("[SpotCache] Hit ({} cached spots)", region.spots.len());
            return Ok(filter_in_bounds(&region.spots, bounds));
        }

        let padded = bounds.expand(self.config.padding_factor);
        let spots = self.inner.get_spots_in_bounds(&padded)?;
        debug!("[SpotCache] Miss, fetched {} spots for padded region", spots.len());

        let result = filter_in_bounds(&spots, bounds);
        regions.push_back(CachedRegion { bounds: padded, spots, fetched_at: now });
        while regions.len() > self.config.max_regions {
            regions.pop_front();
        }

        Ok(result)
    }
}

fn filter_in_bounds(spots: &[Spot], bounds: &Bounds) -> Vec<Spot> {
    spots
        .iter()
        .filter(|s| bounds.contains_point(&s.coordinates))
        .cloned()
        .collect()
}

impl<R: SpotRepository> SpotRepository for CachedSpotRepository<R> {
    fn get_all_spots(&self) -> Result<Vec<Spot>> {
        self.inner.get_all_spots()
    }

    fn get_spot_by_id(&self, id: &SpotId) -> Result<Option<Spot>> {
        self.inner.get_spot_by_id(id)
    }

    fn get_spots_in_bounds(&self, bounds: &Bounds) -> Result<Vec<Spot>> {
        self.query_at(bounds, Instant::now())
    }

    fn create_spot(&self, spot: &Spot) -> Result<()> {
        let result = self.inner.create_spot(spot);
        self.invalidate();
        if result.is_ok() {
            info!("[SpotCache] Spot {} created", spot.id);
        }
        result
    }

    fn update_spot(&self, spot: &Spot) -> Result<()> {
        let result = self.inner.update_spot(spot);
        self.invalidate();
        result
    }

    fn delete_spot(&self, id: &SpotId) -> Result<()> {
        let result = self.inner.delete_spot(id);
        self.invalidate();
        result
    }
}
