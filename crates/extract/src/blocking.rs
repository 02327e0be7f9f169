//! In-memory lookup structures rebuilt from the store at startup: the alias
//! cache (exact key -> entity) and the last-token blocking index used to
//! propose link candidates.

use std::collections::{BTreeMap, HashMap};

use crate::normalizer::{last_token, name_key, token_jaccard};
use crate::schema::{Entity, EntityType};

pub const MIN_CANDIDATE_SCORE: f64 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntity {
    pub id: String,
    pub key: String,
    pub entity_type: EntityType,
}

#[derive(Debug, Default)]
pub struct AliasCache {
    by_key: HashMap<String, CachedEntity>,
}

impl AliasCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the entity under its name and every alias.
    pub fn seed_from(&mut self, entities: &[Entity]) {
        for entity in entities {
            self.insert_entity(entity);
        }
    }

    pub fn insert_entity(&mut self, entity: &Entity) {
        let cached = CachedEntity {
            id: entity.id.clone(),
            key: name_key(&entity.full_name),
            entity_type: entity.entity_type,
        };
        for name in std::iter::once(&entity.full_name).chain(entity.aliases.iter()) {
            self.by_key.entry(name_key(name)).or_insert_with(|| cached.clone());
        }
    }

    pub fn insert(&mut self, name: &str, id: &str, entity_type: EntityType) {
        let key = name_key(name);
        self.by_key.insert(
            key.clone(),
            CachedEntity {
                id: id.to_string(),
                key,
                entity_type,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&CachedEntity> {
        self.by_key.get(&name_key(name))
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub entity_id: String,
    pub score: f64,
    pub features: BTreeMap<String, f64>,
}

/// Entities bucketed by the last token of their key.
#[derive(Debug, Default)]
pub struct BlockingIndex {
    buckets: HashMap<String, Vec<CachedEntity>>,
}

impl BlockingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_from(&mut self, entities: &[Entity]) {
        for entity in entities {
            self.insert(&entity.id, &entity.full_name, entity.entity_type);
        }
    }

    pub fn insert(&mut self, id: &str, name: &str, entity_type: EntityType) {
        let key = name_key(name);
        let Some(token) = last_token(&key) else {
            return;
        };

        let bucket = self.buckets.entry(token.to_string()).or_default();
        if bucket.iter().any(|cached| cached.id == id) {
            return;
        }
        bucket.push(CachedEntity {
            id: id.to_string(),
            key,
            entity_type,
        });
    }

    /// Up to `limit` bucket neighbours of `key`, best first. Scores below
    /// the floor are dropped.
    pub fn candidates(&self, key: &str, entity_type: EntityType, limit: usize) -> Vec<ScoredCandidate> {
        let Some(bucket) = last_token(key).and_then(|token| self.buckets.get(token)) else {
            return Vec::new();
        };

        let mut scored: Vec<ScoredCandidate> = bucket
            .iter()
            .filter_map(|cached| {
                let features = candidate_features(key, entity_type, cached);
                let score = candidate_score(&features);
                (score >= MIN_CANDIDATE_SCORE).then(|| ScoredCandidate {
                    entity_id: cached.id.clone(),
                    score,
                    features,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });
        scored.truncate(limit);
        scored
    }
}

fn candidate_features(key: &str, entity_type: EntityType, cached: &CachedEntity) -> BTreeMap<String, f64> {
    let exact = if cached.key == key { 1.0 } else { 0.0 };
    let type_match = if cached.entity_type == entity_type { 1.0 } else { 0.0 };

    BTreeMap::from([
        ("exact".to_string(), exact),
        ("jaccard".to_string(), token_jaccard(key, &cached.key)),
        ("type_match".to_string(), type_match),
    ])
}

/// `0.5·exact + 0.25·jaccard + 0.25·type_match`
pub fn candidate_score(features: &BTreeMap<String, f64>) -> f64 {
    let get = |name: &str| features.get(name).copied().unwrap_or(0.0);
    0.5 * get("exact") + 0.25 * get("jaccard") + 0.25 * get("type_match")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn entity(id: &str, name: &str, entity_type: EntityType, aliases: &[&str]) -> Entity {
        Entity {
            id: id.into(),
            full_name: name.into(),
            entity_type,
            aliases: aliases.iter().map(|a| a.to_string()).collect::<BTreeSet<_>>(),
            risk: Default::default(),
        }
    }

    #[test]
    fn test_alias_cache_seeds_aliases() {
        let mut cache = AliasCache::new();
        cache.seed_from(&[entity("e1", "Jeffrey Epstein", EntityType::Person, &["Jeff Epstein"])]);

        assert_eq!(cache.get("JEFF EPSTEIN").map(|c| c.id.as_str()), Some("e1"));
        assert_eq!(cache.get("Jeffrey Epstein.").map(|c| c.key.as_str()), Some("jeffrey epstein"));
    }

    #[test]
    fn test_blocking_ranks_by_score() {
        let mut index = BlockingIndex::new();
        index.insert("e2", "Mark Epstein", EntityType::Person);
        index.insert("e1", "Jeffrey Epstein", EntityType::Person);
        index.insert("e3", "Epstein Foundation", EntityType::Organization);
        index.insert("e1", "Jeffrey Epstein", EntityType::Person);

        let found = index.candidates("jeffrey epstein", EntityType::Person, 5);
        let ids: Vec<&str> = found.iter().map(|c| c.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e2"]);

        // exact 0.5 + jaccard 0.25 + type 0.25
        assert!((found[0].score - 1.0).abs() < 1e-9);
        // jaccard 1/3 and type match
        assert!((found[1].score - (0.25 / 3.0 + 0.25)).abs() < 1e-9);
    }

    #[test]
    fn test_blocking_respects_limit_and_floor() {
        let mut index = BlockingIndex::new();
        for i in 0..8 {
            index.insert(&format!("e{}", i), &format!("Person{} Smith", i), EntityType::Person);
        }
        assert_eq!(index.candidates("john smith", EntityType::Person, 5).len(), 5);
        assert!(index.candidates("john jones", EntityType::Person, 5).is_empty());

        let mut features = BTreeMap::new();
        features.insert("jaccard".to_string(), 0.0);
        assert!(candidate_score(&features) < MIN_CANDIDATE_SCORE);
    }
}
