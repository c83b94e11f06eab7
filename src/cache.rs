use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use log::debug;
use lru::LruCache;

use crate::{body::Body, param::HttpRequestMethod, pattern::Params, table::RouteEntry};

type VisitedKey = (String, HttpRequestMethod);

/// 首次执行成功的路由快照。
///
/// 命中缓存时只复用 `entry` 和 `params`；`query` 与 `body` 记录首次请求时的取值，
/// 仅用于诊断，之后的请求总是从自身重新解析。
#[derive(Debug, Clone)]
pub struct VisitedEntry {
    entry: Arc<RouteEntry>,
    params: Params,
    query: HashMap<String, String>,
    body: Body,
}

impl VisitedEntry {
    pub fn new(
        entry: Arc<RouteEntry>,
        params: Params,
        query: HashMap<String, String>,
        body: Body,
    ) -> Self {
        Self {
            entry,
            params,
            query,
            body,
        }
    }

    pub fn entry(&self) -> &Arc<RouteEntry> {
        &self.entry
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    pub fn body(&self) -> &Body {
        &self.body
    }
}

/// 按 (请求路径, 方法) 索引的访问缓存，容量为 0 时整体禁用
///
/// 每次 `clear` 都会推进代数。请求在解析路由前记下当时的代数，
/// 提升时代数已变化说明路由表在此期间提交过，这次提升会被丢弃。
pub struct VisitedCache {
    cache: Option<LruCache<VisitedKey, VisitedEntry>>,
    generation: u64,
}

impl VisitedCache {
    // 根据容量构造
    pub fn from_capacity(capacity: usize) -> Self {
        Self {
            cache: NonZeroUsize::new(capacity).map(LruCache::new),
            generation: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.cache.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    // 放入，已存在的条目保持不变；`generation` 过期时丢弃。返回是否写入
    pub fn push(
        &mut self,
        path: &str,
        method: HttpRequestMethod,
        generation: u64,
        visited: VisitedEntry,
    ) -> bool {
        if generation != self.generation {
            debug!(
                "路由表已在请求期间更新（代数 {} -> {}），放弃缓存 {} {}",
                generation, self.generation, method, path
            );
            return false;
        }
        let Some(cache) = self.cache.as_mut() else {
            return false;
        };
        let key = (path.to_string(), method);
        if cache.contains(&key) {
            return false;
        }
        debug!("缓存访问路由 {} {}", method, path);
        cache.put(key, visited);
        true
    }

    // 查询
    pub fn find(&mut self, path: &str, method: HttpRequestMethod) -> Option<VisitedEntry> {
        self.cache
            .as_mut()?
            .get(&(path.to_string(), method))
            .cloned()
    }

    // 路由表变更后整体失效
    pub fn clear(&mut self) {
        self.generation += 1;
        if let Some(cache) = self.cache.as_mut() {
            cache.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.cache.as_ref().map_or(0, |c| c.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.cache.as_ref().map_or(0, |c| c.cap().get())
    }
}
