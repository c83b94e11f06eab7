// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 路由器
//!
//! 对外的入口：注册全局中间件、添加路由、挂载根模块、执行懒加载，
//! 以及把一个 `Request` 处理成 `Response`。
//!
//! 请求处理流程：
//! 1. 写入默认响应头；
//! 2. 先查访问缓存，未命中再查路由表；
//! 3. 解码请求体并构建上下文；
//! 4. 依次执行全局中间件、路由中间件，最后执行路由回调；
//! 5. 回调成功后把该路由提升进访问缓存。

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use log::{debug, error, info, warn};
use serde_json::json;
use tokio::task::JoinHandle;

use crate::{
    body,
    cache::{VisitedCache, VisitedEntry},
    config::Config,
    context::Context,
    exception::Exception,
    mapper::{LazyLoad, RouteMapper},
    middleware::{self, Middleware, Terminal},
    module::{Module, ModuleId, ModuleRegistry},
    param::{HttpRequestMethod, POWERED_BY},
    pattern::{normalize_request_path, Params},
    request::Request,
    response::{Response, ResponseWriter},
    route::Route,
    table::{Resolved, RouteEntry, RouteTable},
};

pub struct Router {
    table: RwLock<RouteTable>,
    visited: Arc<Mutex<VisitedCache>>,
    registry: Mutex<ModuleRegistry>,
    middlewares: Vec<Middleware>,
    headers: Vec<(String, String)>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(&Config::new())
    }
}

impl Router {
    pub fn new(config: &Config) -> Self {
        let mut router = Self::with_cache_capacity(config.visited_cache_size());
        router.headers = vec![("X-Powered-By".to_string(), config.powered_by().to_string())];
        router
    }

    /// 容量为 0 时禁用访问缓存
    pub fn with_cache_capacity(capacity: usize) -> Self {
        Self {
            table: RwLock::new(RouteTable::new()),
            visited: Arc::new(Mutex::new(VisitedCache::from_capacity(capacity))),
            registry: Mutex::new(ModuleRegistry::new()),
            middlewares: vec![],
            headers: vec![("X-Powered-By".to_string(), POWERED_BY.to_string())],
        }
    }

    /// 注册全局中间件，按注册顺序在路由中间件之前执行
    pub fn use_middleware(&mut self, middleware: Middleware) -> &mut Self {
        self.middlewares.push(middleware);
        self
    }

    /// 设置附加到每个响应上的默认响应头
    pub fn default_header(&mut self, name: &str, value: &str) -> &mut Self {
        match self.headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
        self
    }

    /// 添加一组路由。已挂载根模块时，路由归属根模块。
    ///
    /// 返回其中声明的懒加载，交给 [`Router::load_lazy`] 或 [`Router::spawn_lazy`] 执行。
    pub fn add(&self, routes: &[Route]) -> Result<Vec<LazyLoad>, Exception> {
        self.stage(|mapper, root| {
            for route in routes {
                mapper.map_route(route, "", root)?;
            }
            Ok(())
        })
    }

    /// 挂载根模块，每个注册表只允许一次
    pub fn bootstrap(&self, module: Module) -> Result<Vec<LazyLoad>, Exception> {
        info!("挂载根模块 {}", module.name());
        self.stage(|mapper, _| mapper.map_root(&module).map(|_| ()))
    }

    /// 清空模块注册表，之后可以重新挂载根模块。已提交的路由保持不变。
    pub fn reset_modules(&self) {
        self.lock_registry().reset();
    }

    /// 在注册表锁内完成映射；全部成功才提交到路由表，失败则撤销新登记的模块节点
    fn stage<F>(&self, f: F) -> Result<Vec<LazyLoad>, Exception>
    where
        F: FnOnce(&mut RouteMapper, Option<ModuleId>) -> Result<(), Exception>,
    {
        let mut registry = self.lock_registry();
        let mark = registry.len();
        let root = registry.root();
        let staged = {
            let mut mapper = RouteMapper::new(&mut registry);
            f(&mut mapper, root).map(|_| mapper.finish())
        };
        match staged {
            Ok((entries, lazy)) => {
                self.commit(entries);
                Ok(lazy)
            }
            Err(e) => {
                error!("路由注册失败：{}", e);
                registry.truncate(mark);
                Err(e)
            }
        }
    }

    fn commit(&self, entries: Vec<RouteEntry>) {
        if entries.is_empty() {
            return;
        }
        let count = entries.len();
        {
            let mut table = self.write_table();
            for entry in entries {
                table.insert(entry);
            }
        }
        self.lock_visited().clear();
        info!("提交 {} 条路由", count);
    }

    /// 依次执行懒加载，加载出的模块中新的懒加载也会继续执行。
    ///
    /// 失败的加载记录日志后放弃，不重试，也不影响其他加载。返回遇到的第一个错误。
    pub async fn load_lazy(&self, loads: Vec<LazyLoad>) -> Result<(), Exception> {
        let mut queue: VecDeque<LazyLoad> = loads.into();
        let mut first_error = None;
        while let Some(load) = queue.pop_front() {
            debug!("开始懒加载 {}", load.prefix());
            let result = match (load.loader())().await {
                Ok(module) => self.stage(|mapper, _| mapper.map_lazy(&load, &module).map(|_| ())),
                Err(e) if e.is_fatal() => Err(e),
                Err(e) => Err(Exception::LazyLoadFailed(e.to_string())),
            };
            match result {
                Ok(more) => {
                    info!("懒加载 {} 完成", load.prefix());
                    queue.extend(more);
                }
                Err(e) => {
                    error!("懒加载 {} 失败：{}", load.prefix(), e);
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// 在后台任务中执行懒加载，不阻塞请求处理
    pub fn spawn_lazy(self: &Arc<Self>, loads: Vec<LazyLoad>) -> JoinHandle<Result<(), Exception>> {
        let router = Arc::clone(self);
        tokio::spawn(async move { router.load_lazy(loads).await })
    }

    /// 先查访问缓存，再查路由表
    pub fn resolve(&self, path: &str, method: HttpRequestMethod) -> Result<Resolved, Exception> {
        self.resolve_at(path, method).map(|(resolved, _)| resolved)
    }

    /// 同时返回查表之前的缓存代数，提升时据此判断路由表是否已经变化
    fn resolve_at(
        &self,
        path: &str,
        method: HttpRequestMethod,
    ) -> Result<(Resolved, u64), Exception> {
        let path = normalize_request_path(path);
        let generation = {
            let mut visited = self.lock_visited();
            if let Some(hit) = visited.find(&path, method) {
                let resolved = Resolved {
                    entry: Arc::clone(hit.entry()),
                    params: hit.params().clone(),
                    cached: true,
                };
                return Ok((resolved, visited.generation()));
            }
            visited.generation()
        };
        self.read_table()
            .resolve(&path, method)
            .map(|resolved| (resolved, generation))
    }

    /// 访问缓存中的快照，供诊断使用
    pub fn visited(&self, path: &str, method: HttpRequestMethod) -> Option<VisitedEntry> {
        self.lock_visited().find(&normalize_request_path(path), method)
    }

    /// 处理一个请求，总是返回一个已结束的响应
    pub async fn handle(&self, request: Request) -> Response {
        let id = request.id();
        let response = ResponseWriter::new(id);
        for (name, value) in &self.headers {
            response.write_header(name, value);
        }

        let path = normalize_request_path(request.path());
        let method = request.method();
        let (resolved, generation) = match self.resolve_at(&path, method) {
            Ok(r) => r,
            Err(e) => {
                warn!("[ID{}]{} {} 未找到路由", id, method, path);
                response.json(json!({ "message": e.to_string() }), e.status_code());
                return response.snapshot();
            }
        };
        debug!(
            "[ID{}]{} {} 匹配路由 {}，缓存命中：{}",
            id,
            method,
            path,
            resolved.entry.path(),
            resolved.cached
        );

        let body = match body::decode(&request) {
            Ok(b) => b,
            Err(e) => {
                warn!("[ID{}]请求体解码失败：{}", id, e);
                response.send(e, 400);
                return response.snapshot();
            }
        };

        let Resolved { entry, params, .. } = resolved;
        let ctx = Context::build(
            Arc::new(request),
            response.clone(),
            params.clone(),
            body,
            entry.dependencies().clone(),
        );
        let chain: Vec<Middleware> = self
            .middlewares
            .iter()
            .chain(entry.middlewares())
            .cloned()
            .collect();
        let terminal = execute_route(
            entry,
            path.clone(),
            params,
            generation,
            Arc::clone(&self.visited),
        );
        middleware::invoke(chain, ctx, terminal).await;

        if !response.is_ended() {
            warn!("[ID{}]中间件链结束但响应未完成：{} {}", id, method, path);
            response.json(
                json!({ "message": format!("Request '{}' was not handled", path) }),
                500,
            );
        }
        response.snapshot()
    }

    /// 路由表中所有 (路径, 方法)
    pub fn routes(&self) -> Vec<(String, HttpRequestMethod)> {
        self.read_table().routes()
    }

    pub fn route_count(&self) -> usize {
        self.read_table().len()
    }

    pub fn visited_count(&self) -> usize {
        self.lock_visited().len()
    }

    pub fn module_count(&self) -> usize {
        self.lock_registry().len()
    }

    fn read_table(&self) -> RwLockReadGuard<'_, RouteTable> {
        match self.table.read() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!("路由表读锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        }
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, RouteTable> {
        match self.table.write() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!("路由表写锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        }
    }

    fn lock_visited(&self) -> MutexGuard<'_, VisitedCache> {
        lock_visited(&self.visited)
    }

    fn lock_registry(&self) -> MutexGuard<'_, ModuleRegistry> {
        match self.registry.lock() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!("模块注册表锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        }
    }
}

fn lock_visited(visited: &Mutex<VisitedCache>) -> MutexGuard<'_, VisitedCache> {
    match visited.lock() {
        Ok(lock) => lock,
        Err(poisoned) => {
            warn!("访问缓存锁被污染，恢复并继续");
            poisoned.into_inner()
        }
    }
}

/// 链尾：在独立任务中执行路由回调，panic 会被转成回调错误
fn execute_route(
    entry: Arc<RouteEntry>,
    path: String,
    matched: Params,
    generation: u64,
    visited: Arc<Mutex<VisitedCache>>,
) -> Terminal {
    Arc::new(move |ctx: Context| {
        let entry = Arc::clone(&entry);
        let path = path.clone();
        let matched = matched.clone();
        let visited = Arc::clone(&visited);
        Box::pin(async move {
            let id = ctx.id();
            let method = ctx.method;
            let response = ctx.response.clone();
            let query = ctx.query.clone();
            let body = ctx.body.clone();
            let callback = entry.callback().clone();

            let result = match tokio::spawn(async move { callback.call(ctx).await }).await {
                Ok(r) => r,
                Err(e) => Err(Exception::CallbackError(panic_message(e))),
            };
            match result {
                Ok(reply) => {
                    if !response.is_ended() {
                        response.send(reply, 200);
                    }
                    lock_visited(&visited).push(
                        &path,
                        method,
                        generation,
                        VisitedEntry::new(entry, matched, query, body),
                    );
                }
                Err(e) => {
                    error!("[ID{}]路由回调 {} {} 出错：{}", id, method, path, e);
                    response.send(e, 400);
                }
            }
        })
    })
}

fn panic_message(e: tokio::task::JoinError) -> String {
    if !e.is_panic() {
        return e.to_string();
    }
    let payload = e.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "route callback panicked".to_string()
    }
}
