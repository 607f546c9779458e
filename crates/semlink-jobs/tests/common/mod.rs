//! In-memory repository fakes shared by the integration tests.
//!
//! One `MemState` behind a mutex backs every repository, so tests can
//! assert cross-repository effects (reject writes the blacklist, reset
//! empties everything) the same way the production wiring does against
//! PostgreSQL.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use semlink_core::{
    defaults, validate_target_url, BlacklistEffect, BlacklistRepository, ContentItem, ContentStore,
    CreateCustomTargetRequest, CustomTarget, CustomTargetRepository, EmbeddingRepository,
    EmbeddingRow, Error, EventBus, Link, LinkEvent, LinkRepository, LinkStatus,
    ProposeLinkRequest, Result, TargetStatus, UpdateCustomTargetRequest, Vector,
};

#[derive(Default)]
struct MemState {
    items: Vec<ContentItem>,
    links: Vec<Link>,
    /// (source_id, target_url) -> anchor annotation.
    blacklist: HashMap<(i64, String), String>,
    embeddings: Vec<EmbeddingRow>,
    custom: Vec<CustomTarget>,
    fail_persistence: bool,
}

/// Container wiring every fake repository over one shared state.
pub struct MemWorld {
    state: Arc<Mutex<MemState>>,
    pub events: EventBus,
}

impl MemWorld {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemState::default())),
            events: EventBus::default(),
        }
    }

    pub fn links(&self) -> Arc<dyn LinkRepository> {
        Arc::new(MemLinks {
            state: self.state.clone(),
            events: self.events.clone(),
        })
    }

    pub fn blacklist(&self) -> Arc<dyn BlacklistRepository> {
        Arc::new(MemBlacklist {
            state: self.state.clone(),
        })
    }

    pub fn embeddings(&self) -> Arc<dyn EmbeddingRepository> {
        Arc::new(MemEmbeddings {
            state: self.state.clone(),
        })
    }

    pub fn custom_targets(&self) -> Arc<dyn CustomTargetRepository> {
        Arc::new(MemCustomTargets {
            state: self.state.clone(),
        })
    }

    pub fn content(&self) -> Arc<dyn ContentStore> {
        Arc::new(MemContent {
            state: self.state.clone(),
        })
    }

    /// Make every embedding write fail with [`Error::Persistence`].
    pub fn fail_persistence(&self, on: bool) {
        self.state.lock().unwrap().fail_persistence = on;
    }

    pub fn add_item(&self, id: i64, title: &str, body: &str) {
        self.state.lock().unwrap().items.push(ContentItem {
            id,
            title: title.to_string(),
            body: body.to_string(),
            url: format!("https://example.com/item-{id}"),
        });
    }

    pub fn add_custom_target(&self, url: &str, title: &str, embedding: Option<Vec<f32>>) -> Uuid {
        let id = Uuid::now_v7();
        self.state.lock().unwrap().custom.push(CustomTarget {
            id,
            url: url.to_string(),
            title: title.to_string(),
            keywords: String::new(),
            status: TargetStatus::Active,
            embedding: embedding.map(Vector::from),
            created_at_utc: Utc::now(),
        });
        id
    }

    pub fn update_item_body(&self, id: i64, body: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(item) = state.items.iter_mut().find(|i| i.id == id) {
            item.body = body.to_string();
        }
    }

    /// Seed a title-chunk embedding row directly, bypassing the indexer.
    pub fn seed_title_embedding(&self, item_id: i64, vector: Vec<f32>) {
        let mut state = self.state.lock().unwrap();
        state.embeddings.push(EmbeddingRow {
            id: Uuid::now_v7(),
            item_id,
            chunk_index: defaults::TITLE_CHUNK_INDEX,
            chunk_text: format!("title of item {item_id}"),
            vector: Vector::from(vector),
            content_hash: format!("seeded-{item_id}"),
        });
    }

    pub fn link_rows(&self) -> Vec<Link> {
        self.state.lock().unwrap().links.clone()
    }

    pub fn embedding_rows(&self) -> Vec<EmbeddingRow> {
        self.state.lock().unwrap().embeddings.clone()
    }

    pub fn blacklist_len(&self) -> usize {
        self.state.lock().unwrap().blacklist.len()
    }
}

struct MemLinks {
    state: Arc<Mutex<MemState>>,
    events: EventBus,
}

#[async_trait]
impl LinkRepository for MemLinks {
    async fn propose(&self, req: ProposeLinkRequest) -> Result<Uuid> {
        if req.anchor_text.trim().is_empty() {
            return Err(Error::InvalidInput("empty anchor text".to_string()));
        }
        if !(0.0..=1.0).contains(&req.score) {
            return Err(Error::InvalidInput(format!(
                "score {} outside [0, 1]",
                req.score
            )));
        }
        validate_target_url(&req.target_url)?;

        let mut state = self.state.lock().unwrap();
        let active = |link: &&Link| link.status == LinkStatus::Active;

        if state.links.iter().filter(active).any(|l| {
            l.source_id == req.source_id
                && l.anchor_text == req.anchor_text
                && l.target_url != req.target_url
        }) {
            return Err(Error::DuplicateLink(format!(
                "anchor {:?} already bound to a different URL in source {}",
                req.anchor_text, req.source_id
            )));
        }
        if state
            .links
            .iter()
            .filter(active)
            .any(|l| l.anchor_text == req.anchor_text && l.target_url != req.target_url)
        {
            return Err(Error::DuplicateLink(format!(
                "anchor {:?} already bound to a different URL site-wide",
                req.anchor_text
            )));
        }
        if state
            .links
            .iter()
            .filter(active)
            .any(|l| l.source_id == req.source_id && l.target_url == req.target_url)
        {
            return Err(Error::DuplicateLink(format!(
                "active link from source {} to {:?} already exists",
                req.source_id, req.target_url
            )));
        }

        let id = Uuid::now_v7();
        state.links.push(Link {
            id,
            source_id: req.source_id,
            anchor_text: req.anchor_text,
            target_url: req.target_url,
            target_id: req.target_id,
            score: req.score,
            status: LinkStatus::Active,
            created_at_utc: Utc::now(),
        });
        drop(state);
        self.events.emit(LinkEvent::LinkChanged {
            source_id: req.source_id,
        });
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Link> {
        self.state
            .lock()
            .unwrap()
            .links
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or(Error::LinkNotFound(id))
    }

    async fn get_by_source(&self, source_id: i64, status: LinkStatus) -> Result<Vec<Link>> {
        let mut rows: Vec<Link> = self
            .state
            .lock()
            .unwrap()
            .links
            .iter()
            .filter(|l| l.source_id == source_id && l.status == status)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(rows)
    }

    async fn list_all(&self, status: Option<LinkStatus>) -> Result<Vec<Link>> {
        let mut rows: Vec<Link> = self
            .state
            .lock()
            .unwrap()
            .links
            .iter()
            .filter(|l| status.map_or(true, |s| l.status == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at_utc.cmp(&a.created_at_utc));
        Ok(rows)
    }

    async fn set_status(&self, id: Uuid, status: LinkStatus) -> Result<()> {
        let source_id = {
            let mut state = self.state.lock().unwrap();
            let link = state
                .links
                .iter()
                .find(|l| l.id == id)
                .cloned()
                .ok_or(Error::LinkNotFound(id))?;
            if link.status == status {
                return Ok(());
            }
            match link.status.blacklist_effect(status) {
                BlacklistEffect::Add => {
                    state.blacklist.insert(
                        (link.source_id, link.target_url.clone()),
                        link.anchor_text.clone(),
                    );
                }
                BlacklistEffect::Remove => {
                    state
                        .blacklist
                        .remove(&(link.source_id, link.target_url.clone()));
                }
                BlacklistEffect::None => {}
            }
            let row = state
                .links
                .iter_mut()
                .find(|l| l.id == id)
                .ok_or(Error::LinkNotFound(id))?;
            row.status = status;
            link.source_id
        };
        self.events.emit(LinkEvent::LinkChanged { source_id });
        Ok(())
    }

    async fn reject(&self, id: Uuid) -> Result<()> {
        let source_id = {
            let mut state = self.state.lock().unwrap();
            let link = state
                .links
                .iter()
                .find(|l| l.id == id)
                .cloned()
                .ok_or(Error::LinkNotFound(id))?;
            state.blacklist.insert(
                (link.source_id, link.target_url.clone()),
                link.anchor_text.clone(),
            );
            let row = state
                .links
                .iter_mut()
                .find(|l| l.id == id)
                .ok_or(Error::LinkNotFound(id))?;
            row.status = LinkStatus::Rejected;
            link.source_id
        };
        self.events.emit(LinkEvent::LinkChanged { source_id });
        Ok(())
    }

    async fn restore(&self, id: Uuid) -> Result<()> {
        let source_id = {
            let mut state = self.state.lock().unwrap();
            let link = state
                .links
                .iter()
                .find(|l| l.id == id)
                .cloned()
                .ok_or(Error::LinkNotFound(id))?;
            state
                .blacklist
                .remove(&(link.source_id, link.target_url.clone()));
            let row = state
                .links
                .iter_mut()
                .find(|l| l.id == id)
                .ok_or(Error::LinkNotFound(id))?;
            row.status = LinkStatus::Active;
            link.source_id
        };
        self.events.emit(LinkEvent::LinkChanged { source_id });
        Ok(())
    }

    async fn active_count_for_source(&self, source_id: i64) -> Result<i64> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .links
            .iter()
            .filter(|l| l.source_id == source_id && l.status == LinkStatus::Active)
            .count() as i64)
    }

    async fn active_count_to_url(&self, target_url: &str) -> Result<i64> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .links
            .iter()
            .filter(|l| l.target_url == target_url && l.status == LinkStatus::Active)
            .count() as i64)
    }

    async fn active_counts_by_target(&self) -> Result<HashMap<String, i64>> {
        let mut counts = HashMap::new();
        for link in &self.state.lock().unwrap().links {
            if link.status == LinkStatus::Active {
                *counts.entry(link.target_url.clone()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn active_anchors(&self) -> Result<Vec<(String, String)>> {
        let mut pairs: HashSet<(String, String)> = HashSet::new();
        for link in &self.state.lock().unwrap().links {
            if link.status == LinkStatus::Active {
                pairs.insert((link.anchor_text.clone(), link.target_url.clone()));
            }
        }
        Ok(pairs.into_iter().collect())
    }

    async fn delete_by_source(&self, source_id: i64) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let before = state.links.len();
        state.links.retain(|l| l.source_id != source_id);
        Ok((before - state.links.len()) as u64)
    }

    async fn delete_by_target(&self, target_id: i64) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let before = state.links.len();
        state.links.retain(|l| l.target_id != Some(target_id));
        Ok((before - state.links.len()) as u64)
    }

    async fn delete_all(&self) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let deleted = state.links.len() as u64;
        state.links.clear();
        Ok(deleted)
    }
}

struct MemBlacklist {
    state: Arc<Mutex<MemState>>,
}

#[async_trait]
impl BlacklistRepository for MemBlacklist {
    async fn add(&self, source_id: i64, target_url: &str, anchor_text: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .blacklist
            .entry((source_id, target_url.to_string()))
            .or_insert_with(|| anchor_text.to_string());
        Ok(())
    }

    async fn contains(&self, source_id: i64, target_url: &str) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .blacklist
            .contains_key(&(source_id, target_url.to_string())))
    }

    async fn remove(&self, source_id: i64, target_url: &str) -> Result<u64> {
        let removed = self
            .state
            .lock()
            .unwrap()
            .blacklist
            .remove(&(source_id, target_url.to_string()));
        Ok(if removed.is_some() { 1 } else { 0 })
    }

    async fn delete_by_source(&self, source_id: i64) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let before = state.blacklist.len();
        state.blacklist.retain(|(sid, _), _| *sid != source_id);
        Ok((before - state.blacklist.len()) as u64)
    }

    async fn delete_all(&self) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let deleted = state.blacklist.len() as u64;
        state.blacklist.clear();
        Ok(deleted)
    }

    async fn load_all_keys(&self) -> Result<HashSet<(i64, String)>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .blacklist
            .keys()
            .cloned()
            .collect())
    }
}

struct MemEmbeddings {
    state: Arc<Mutex<MemState>>,
}

#[async_trait]
impl EmbeddingRepository for MemEmbeddings {
    async fn upsert_chunk(
        &self,
        item_id: i64,
        chunk_index: i32,
        chunk_text: &str,
        vector: Vector,
        content_hash: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_persistence {
            return Err(Error::Persistence("injected storage failure".to_string()));
        }
        state
            .embeddings
            .retain(|r| !(r.item_id == item_id && r.chunk_index == chunk_index));
        state.embeddings.push(EmbeddingRow {
            id: Uuid::now_v7(),
            item_id,
            chunk_index,
            chunk_text: chunk_text.to_string(),
            vector,
            content_hash: content_hash.to_string(),
        });
        Ok(())
    }

    async fn store_item(
        &self,
        item_id: i64,
        chunks: Vec<(String, Vector)>,
        content_hash: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_persistence {
            return Err(Error::Persistence("injected storage failure".to_string()));
        }
        state.embeddings.retain(|r| r.item_id != item_id);
        for (index, (chunk_text, vector)) in chunks.into_iter().enumerate() {
            state.embeddings.push(EmbeddingRow {
                id: Uuid::now_v7(),
                item_id,
                chunk_index: index as i32,
                chunk_text,
                vector,
                content_hash: content_hash.to_string(),
            });
        }
        Ok(())
    }

    async fn get_for_item(&self, item_id: i64) -> Result<Vec<EmbeddingRow>> {
        let mut rows: Vec<EmbeddingRow> = self
            .state
            .lock()
            .unwrap()
            .embeddings
            .iter()
            .filter(|r| r.item_id == item_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.chunk_index);
        Ok(rows)
    }

    async fn title_embeddings(&self) -> Result<Vec<EmbeddingRow>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .embeddings
            .iter()
            .filter(|r| r.chunk_index == defaults::TITLE_CHUNK_INDEX)
            .cloned()
            .collect())
    }

    async fn is_current(&self, item_id: i64, content_hash: &str) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .embeddings
            .iter()
            .any(|r| r.item_id == item_id && r.content_hash == content_hash))
    }

    async fn delete_for_item(&self, item_id: i64) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let before = state.embeddings.len();
        state.embeddings.retain(|r| r.item_id != item_id);
        Ok((before - state.embeddings.len()) as u64)
    }

    async fn delete_all(&self) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let deleted = state.embeddings.len() as u64;
        state.embeddings.clear();
        Ok(deleted)
    }
}

struct MemCustomTargets {
    state: Arc<Mutex<MemState>>,
}

#[async_trait]
impl CustomTargetRepository for MemCustomTargets {
    async fn create(&self, req: CreateCustomTargetRequest) -> Result<Uuid> {
        validate_target_url(&req.url)?;
        let mut state = self.state.lock().unwrap();
        if state.custom.len() as i64 >= defaults::MAX_CUSTOM_TARGETS {
            return Err(Error::InvalidInput(format!(
                "custom target cap of {} reached",
                defaults::MAX_CUSTOM_TARGETS
            )));
        }
        if state.custom.iter().any(|t| t.url == req.url) {
            return Err(Error::InvalidInput(format!(
                "custom target URL {:?} already exists",
                req.url
            )));
        }
        let id = Uuid::now_v7();
        state.custom.push(CustomTarget {
            id,
            url: req.url,
            title: req.title,
            keywords: req.keywords,
            status: TargetStatus::Active,
            embedding: None,
            created_at_utc: Utc::now(),
        });
        Ok(id)
    }

    async fn update(&self, id: Uuid, req: UpdateCustomTargetRequest) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let target = state
            .custom
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(Error::NotFound(format!("custom target {id}")))?;
        if let Some(url) = req.url {
            target.url = url;
        }
        let mut text_changed = false;
        if let Some(title) = req.title {
            text_changed |= title != target.title;
            target.title = title;
        }
        if let Some(keywords) = req.keywords {
            text_changed |= keywords != target.keywords;
            target.keywords = keywords;
        }
        if text_changed {
            target.embedding = None;
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let before = state.custom.len();
        state.custom.retain(|t| t.id != id);
        if state.custom.len() == before {
            return Err(Error::NotFound(format!("custom target {id}")));
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<CustomTarget> {
        self.state
            .lock()
            .unwrap()
            .custom
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or(Error::NotFound(format!("custom target {id}")))
    }

    async fn list(&self, status: Option<TargetStatus>) -> Result<Vec<CustomTarget>> {
        let mut rows: Vec<CustomTarget> = self
            .state
            .lock()
            .unwrap()
            .custom
            .iter()
            .filter(|t| status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at_utc.cmp(&a.created_at_utc));
        Ok(rows)
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.state.lock().unwrap().custom.len() as i64)
    }

    async fn url_exists(&self, url: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().custom.iter().any(|t| t.url == url))
    }

    async fn needing_embedding(&self) -> Result<Vec<CustomTarget>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .custom
            .iter()
            .filter(|t| t.status == TargetStatus::Active && t.embedding.is_none())
            .cloned()
            .collect())
    }

    async fn set_embedding(&self, id: Uuid, vector: Vector) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let target = state
            .custom
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(Error::NotFound(format!("custom target {id}")))?;
        target.embedding = Some(vector);
        Ok(())
    }

    async fn embedded(&self) -> Result<Vec<CustomTarget>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .custom
            .iter()
            .filter(|t| t.status == TargetStatus::Active && t.embedding.is_some())
            .cloned()
            .collect())
    }
}

struct MemContent {
    state: Arc<Mutex<MemState>>,
}

#[async_trait]
impl ContentStore for MemContent {
    async fn list_publishable(&self) -> Result<Vec<ContentItem>> {
        Ok(self.state.lock().unwrap().items.clone())
    }
}
