use std::path::Path;

use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::hash::quad_hash;
use crate::index::{KdTree, RangeIndex};
use crate::matcher::{CancelToken, Matcher};
use crate::models::{FpType, Match, MatcherConfig, RecordId};
use crate::storage::SqliteCatalog;

/// The matching engine: a catalog of reference fingerprints plus the
/// spatial index over their quad hashes.
///
/// The index is not persisted; on open it is bulk-loaded bottom-up from
/// the quad table (hashing is deterministic, so the rebuilt tree equals
/// the one built during ingestion). One engine value is a single writer
/// and a single reader; batch workloads open one engine per worker over
/// the same catalog file.
pub struct Engine {
    catalog: SqliteCatalog,
    index: KdTree,
    config: MatcherConfig,
}

impl Engine {
    /// Opens (or creates) an engine over the catalog at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_catalog(SqliteCatalog::open(path)?)
    }

    /// An ephemeral engine; used by tests and throwaway sessions.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_catalog(SqliteCatalog::open_in_memory()?)
    }

    fn from_catalog(catalog: SqliteCatalog) -> Result<Self> {
        let mut points = Vec::new();
        catalog.for_each_quad(|quad_id, quad| {
            if let Some(hash) = quad_hash(quad) {
                points.push((hash.as_array(), quad_id));
            }
        })?;
        log::debug!("bulk-loaded spatial index with {} hashes", points.len());
        let index = KdTree::bulk_load(points);
        Ok(Engine { catalog, index, config: MatcherConfig::default() })
    }

    /// Replaces the matcher tunables.
    pub fn with_config(mut self, config: MatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Stores a reference fingerprint under `title`: the record, its
    /// peaks, its quads, and the hash index entries, atomically.
    ///
    /// Returns the new record id, or `None` when the title already
    /// exists (logged, nothing written). Query fingerprints are refused.
    pub fn store(&mut self, fp: &Fingerprint, title: &str) -> Result<Option<RecordId>> {
        if fp.fp_type != FpType::Reference {
            return Err(Error::WrongFingerprintType {
                expected: FpType::Reference,
                actual: fp.fp_type,
            });
        }

        let Some((record_id, quad_ids)) = self.catalog.store_record(title, &fp.peaks, &fp.quads)?
        else {
            return Ok(None);
        };
        for (hash, quad_id) in fp.hashes.iter().zip(quad_ids) {
            self.index.insert(quad_id, hash.as_array());
        }
        Ok(Some(record_id))
    }

    /// Matches a query fingerprint against the catalog. Reference
    /// fingerprints are refused.
    pub fn query(&self, fp: &Fingerprint) -> Result<Vec<Match>> {
        self.query_with_cancel(fp, &CancelToken::new())
    }

    pub fn query_with_cancel(&self, fp: &Fingerprint, cancel: &CancelToken) -> Result<Vec<Match>> {
        if fp.fp_type != FpType::Query {
            return Err(Error::WrongFingerprintType {
                expected: FpType::Query,
                actual: fp.fp_type,
            });
        }
        Matcher::new(&self.index, &self.catalog, self.config).query_with_cancel(fp, cancel)
    }

    pub fn record_count(&self) -> Result<u64> {
        self.catalog.record_count()
    }
}
