//! Resolve-or-create for hierarchy nodes
//!
//! [`ResolutionCache`] is the per-run working set, keyed by `(slug, type)`.
//! It is pure: it answers hit or miss and is told about creations by the
//! caller. [`resolve_or_create`] layers the store lookup and insert on top.
//!
//! Slugs are unique across all types, so a name can collide with a node of
//! another level ("New York" the state and "New York" the city). The second
//! level then uses the type-qualified slug `new-york-city`. Both the cache
//! and the store are probed in the same candidate order, so a rerun lands on
//! the same node.

use std::collections::HashMap;

use lv_common::{Region, RegionType};
use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use super::{slugify, HierarchyError};
use crate::db::regions;

/// Outcome of a working-set lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Node already resolved in this run
    Hit(Uuid),
    /// Not resolved yet; `slug` is the base slug of the name
    Miss { slug: String },
}

/// Slugs a node of `region_type` may occupy, in probe order
pub fn slug_candidates(base: &str, region_type: RegionType) -> [String; 2] {
    [base.to_string(), format!("{}-{}", base, region_type.as_str())]
}

/// Per-run `(slug, type) → id` working set
#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: HashMap<(String, RegionType), Uuid>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a node by display name and type
    pub fn lookup(&self, name: &str, region_type: RegionType) -> Result<Resolution, HierarchyError> {
        let base = slugify(name)?;

        for candidate in slug_candidates(&base, region_type) {
            if let Some(id) = self.entries.get(&(candidate, region_type)) {
                return Ok(Resolution::Hit(*id));
            }
        }

        Ok(Resolution::Miss { slug: base })
    }

    /// Record a node found in or written to the store
    pub fn record(&mut self, slug: impl Into<String>, region_type: RegionType, id: Uuid) {
        self.entries.insert((slug.into(), region_type), id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Node to resolve, with the fields used if it has to be created
#[derive(Debug, Clone)]
pub struct NewRegion<'a> {
    pub name: &'a str,
    pub region_type: RegionType,
    pub parent_id: Option<Uuid>,
    pub is_active: bool,
    /// Only applied on creation
    pub metadata: Option<serde_json::Value>,
}

/// Node id plus whether this call created it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRegion {
    pub id: Uuid,
    pub created: bool,
}

/// Find the node in the working set or the store, creating it if absent
///
/// Existing nodes are returned untouched, even if their parent or flags
/// differ from the request.
pub async fn resolve_or_create(
    conn: &mut SqliteConnection,
    cache: &mut ResolutionCache,
    request: NewRegion<'_>,
) -> Result<ResolvedRegion, HierarchyError> {
    let base = match cache.lookup(request.name, request.region_type)? {
        Resolution::Hit(id) => return Ok(ResolvedRegion { id, created: false }),
        Resolution::Miss { slug } => slug,
    };

    for candidate in slug_candidates(&base, request.region_type) {
        match regions::find_by_slug(&mut *conn, &candidate).await? {
            Some(existing) if existing.region_type == request.region_type => {
                debug!(slug = %candidate, id = %existing.id, "Reusing existing region");
                cache.record(candidate, request.region_type, existing.id);
                return Ok(ResolvedRegion {
                    id: existing.id,
                    created: false,
                });
            }
            Some(_) => continue,
            None => {
                let mut region = Region::new(
                    request.name.trim().to_string(),
                    candidate.clone(),
                    request.region_type,
                    request.parent_id,
                );
                region.is_active = request.is_active;
                region.metadata = request.metadata;

                regions::insert_region(&mut *conn, &region).await?;
                debug!(
                    slug = %candidate,
                    id = %region.id,
                    region_type = %request.region_type,
                    "Created region"
                );

                cache.record(candidate, request.region_type, region.id);
                return Ok(ResolvedRegion {
                    id: region.id,
                    created: true,
                });
            }
        }
    }

    Err(HierarchyError::SlugTaken {
        slug: base,
        region_type: request.region_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lv_common::db::init::init_memory_database;

    fn request(name: &str, region_type: RegionType, parent_id: Option<Uuid>) -> NewRegion<'_> {
        NewRegion {
            name,
            region_type,
            parent_id,
            is_active: true,
            metadata: None,
        }
    }

    #[test]
    fn test_cache_miss_then_hit() {
        let mut cache = ResolutionCache::new();
        let id = Uuid::new_v4();

        assert_eq!(
            cache.lookup("Alachua County", RegionType::County).unwrap(),
            Resolution::Miss {
                slug: "alachua-county".into()
            }
        );

        cache.record("alachua-county", RegionType::County, id);
        assert_eq!(
            cache.lookup(" alachua  county ", RegionType::County).unwrap(),
            Resolution::Hit(id)
        );
    }

    #[test]
    fn test_cache_is_keyed_by_type() {
        let mut cache = ResolutionCache::new();
        let state = Uuid::new_v4();
        cache.record("new-york", RegionType::State, state);

        assert!(matches!(
            cache.lookup("New York", RegionType::City).unwrap(),
            Resolution::Miss { .. }
        ));

        let city = Uuid::new_v4();
        cache.record("new-york-city", RegionType::City, city);
        assert_eq!(cache.lookup("New York", RegionType::City).unwrap(), Resolution::Hit(city));
        assert_eq!(cache.lookup("New York", RegionType::State).unwrap(), Resolution::Hit(state));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cache_rejects_unsluggable_name() {
        let cache = ResolutionCache::new();
        assert!(matches!(
            cache.lookup("???", RegionType::City),
            Err(HierarchyError::EmptySlug(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_or_create_reuses_store_node() {
        let pool = init_memory_database().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let existing = Region::new("Florida".into(), "florida".into(), RegionType::State, None);
        regions::insert_region(&mut *conn, &existing).await.unwrap();

        let mut cache = ResolutionCache::new();
        let resolved = resolve_or_create(&mut conn, &mut cache, request("Florida", RegionType::State, None))
            .await
            .unwrap();

        assert_eq!(resolved, ResolvedRegion { id: existing.id, created: false });
        assert_eq!(cache.len(), 1);

        // Existing node is not activated
        let loaded = regions::find_by_id(&mut *conn, existing.id).await.unwrap().unwrap();
        assert!(!loaded.is_active);
    }

    #[tokio::test]
    async fn test_resolve_or_create_qualifies_colliding_slug() {
        let pool = init_memory_database().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let mut cache = ResolutionCache::new();

        let state = resolve_or_create(&mut conn, &mut cache, request("New York", RegionType::State, None))
            .await
            .unwrap();
        let city = resolve_or_create(
            &mut conn,
            &mut cache,
            request("New York", RegionType::City, Some(state.id)),
        )
        .await
        .unwrap();

        assert!(state.created && city.created);
        assert_ne!(state.id, city.id);

        let city_row = regions::find_by_id(&mut *conn, city.id).await.unwrap().unwrap();
        assert_eq!(city_row.slug, "new-york-city");
        assert_eq!(city_row.name, "New York");

        // A fresh run lands on the same nodes
        let mut rerun = ResolutionCache::new();
        let again = resolve_or_create(
            &mut conn,
            &mut rerun,
            request("New York", RegionType::City, Some(state.id)),
        )
        .await
        .unwrap();
        assert_eq!(again, ResolvedRegion { id: city.id, created: false });
    }
}
