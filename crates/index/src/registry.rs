use std::ops::Range;

use anyhow::{Context, Result};
use extract::{
    AliasCache, BlockingIndex, EntityDraft, EntityType, NameResolution, ResolutionMethod, Resolver,
    ScoredCandidate,
};

use crate::store::GraphStore;

pub const VIP_CONFIDENCE: f64 = 1.0;
pub const KNOWN_CONFIDENCE: f64 = 0.8;
pub const NEW_NON_PERSON_CONFIDENCE: f64 = 0.7;
pub const NEW_PERSON_CONFIDENCE: f64 = 0.5;

/// A candidate bound to an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Linked {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub method: ResolutionMethod,
    pub confidence: f64,
    pub created: bool,
    /// Blocking-index neighbours of the resolved name, best first.
    pub candidates: Vec<ScoredCandidate>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Link {
    Linked(Linked),
    /// Newly seen name the type heuristics could not place.
    Unresolved,
}

/// Resolver stages plus the per-run caches mirrored from the store.
pub struct EntityRegistry {
    resolver: Resolver,
    cache: AliasCache,
    blocking: BlockingIndex,
}

impl EntityRegistry {
    pub fn new(resolver: Resolver) -> Self {
        Self {
            resolver,
            cache: AliasCache::new(),
            blocking: BlockingIndex::new(),
        }
    }

    /// Seed the alias cache and blocking index from the store.
    pub async fn warm(&mut self, store: &dyn GraphStore) -> Result<usize> {
        let entities = store
            .load_entities()
            .await
            .context("Failed to load entities for the alias cache")?;

        self.cache = AliasCache::new();
        self.blocking = BlockingIndex::new();
        self.cache.seed_from(&entities);
        self.blocking.seed_from(&entities);

        tracing::info!(entities = entities.len(), aliases = self.cache.len(), "Alias cache warmed");
        Ok(entities.len())
    }

    pub fn resolve_name(&self, candidate: &str, context: &str, at: Range<usize>) -> NameResolution {
        self.resolver.resolve_name(candidate, context, at)
    }

    /// Bind a resolved name to an entity, creating it when unseen.
    pub async fn link(
        &mut self,
        store: &dyn GraphStore,
        resolution: NameResolution,
        candidate_limit: usize,
    ) -> Result<Link> {
        let vip = resolution.is_vip();
        let name = resolution.name.clone();

        let (entity_id, entity_type, method, created) = match self.cache.get(&name) {
            Some(hit) => {
                let method = match resolution.method {
                    ResolutionMethod::Heuristic => ResolutionMethod::AliasCache,
                    other => other,
                };
                (hit.id.clone(), hit.entity_type, method, false)
            }
            None => {
                let entity_type = match resolution.entity_type {
                    Some(ty) => ty,
                    None => self.resolver.classify(&name),
                };
                if entity_type == EntityType::Other {
                    return Ok(Link::Unresolved);
                }

                let draft = EntityDraft {
                    full_name: name.clone(),
                    entity_type,
                    aliases: resolution.aliases.clone(),
                    risk: resolution.risk.clone(),
                };
                let upserted = store
                    .upsert_entity_by_name(&draft)
                    .await
                    .with_context(|| format!("Failed to upsert entity {}", name))?;

                self.cache.insert(&name, &upserted.id, entity_type);
                for alias in &resolution.aliases {
                    if self.cache.get(alias).is_none() {
                        self.cache.insert(alias, &upserted.id, entity_type);
                    }
                }
                self.blocking.insert(&upserted.id, &name, entity_type);

                (upserted.id, entity_type, resolution.method, upserted.created)
            }
        };

        let confidence = if vip {
            VIP_CONFIDENCE
        } else if !created {
            KNOWN_CONFIDENCE
        } else if entity_type != EntityType::Person {
            NEW_NON_PERSON_CONFIDENCE
        } else {
            NEW_PERSON_CONFIDENCE
        };

        let candidates = self
            .blocking
            .candidates(&extract::name_key(&name), entity_type, candidate_limit);

        Ok(Link::Linked(Linked {
            entity_id,
            entity_type,
            method,
            confidence,
            created,
            candidates,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn linked(link: Link) -> Linked {
        match link {
            Link::Linked(l) => l,
            Link::Unresolved => panic!("expected a linked entity"),
        }
    }

    #[tokio::test]
    async fn test_confidence_ladder() {
        let store = MemoryStore::new();
        let mut registry = EntityRegistry::new(Resolver::builtin().unwrap());

        let vip = registry.resolve_name("Jeff Epstein", "", 0..0);
        let vip = linked(registry.link(&store, vip, 5).await.unwrap());
        assert_eq!(vip.confidence, VIP_CONFIDENCE);
        assert_eq!(vip.method, ResolutionMethod::VipRule);

        let person = registry.resolve_name("Sarah Kellen", "", 0..0);
        let person = linked(registry.link(&store, person, 5).await.unwrap());
        assert!(person.created);
        assert_eq!(person.confidence, NEW_PERSON_CONFIDENCE);
        assert_eq!(person.method, ResolutionMethod::Heuristic);

        let org = registry.resolve_name("Southern Trust Company", "", 0..0);
        let org = linked(registry.link(&store, org, 5).await.unwrap());
        assert_eq!(org.confidence, NEW_NON_PERSON_CONFIDENCE);

        let again = registry.resolve_name("Sarah Kellen", "", 0..0);
        let again = linked(registry.link(&store, again, 5).await.unwrap());
        assert!(!again.created);
        assert_eq!(again.entity_id, person.entity_id);
        assert_eq!(again.confidence, KNOWN_CONFIDENCE);
        assert_eq!(again.method, ResolutionMethod::AliasCache);
    }

    #[tokio::test]
    async fn test_other_is_not_persisted() {
        let store = MemoryStore::new();
        let mut registry = EntityRegistry::new(Resolver::builtin().unwrap());

        let name = registry.resolve_name("One Two Three Four Five", "", 0..0);
        assert_eq!(registry.link(&store, name, 5).await.unwrap(), Link::Unresolved);
        assert!(store.load_entities().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_warm_cache_counts_as_known() {
        let store = MemoryStore::new();
        store
            .upsert_entity_by_name(&EntityDraft::new("Sarah Kellen", EntityType::Person))
            .await
            .unwrap();

        let mut registry = EntityRegistry::new(Resolver::builtin().unwrap());
        assert_eq!(registry.warm(&store).await.unwrap(), 1);

        let name = registry.resolve_name("Sarah Kellen", "", 0..0);
        let link = linked(registry.link(&store, name, 5).await.unwrap());
        assert_eq!(link.confidence, KNOWN_CONFIDENCE);
        assert_eq!(link.candidates[0].entity_id, link.entity_id);
    }
}
