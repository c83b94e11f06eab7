// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 路由表与路由解析
//!
//! 路由表分为两部分：
//! - **静态路由**：不含参数片段的路径，按完整路径做哈希查找；
//! - **参数路由**：含 `:param` 片段的路径，按注册顺序线性扫描正则。
//!
//! 同一路径只会落在其中一张表里。解析时静态路由总是优先，
//! 多个参数路由都能匹配时先注册的胜出。

use std::{collections::HashMap, fmt, sync::Arc};

use log::{debug, warn};

use crate::{
    exception::Exception,
    mapper,
    middleware::Middleware,
    module::{Dependencies, ModuleRegistry},
    param::HttpRequestMethod,
    pattern::{normalize_request_path, Params, PathPattern},
    route::{Handler, Route},
};

type MethodMap = HashMap<HttpRequestMethod, Arc<RouteEntry>>;

/// 路由表中的一个条目，对应唯一的 (路径, 方法)。进入路由表后不再修改。
#[derive(Clone)]
pub struct RouteEntry {
    path: String,
    method: HttpRequestMethod,
    callback: Handler,
    middlewares: Vec<Middleware>,
    dependencies: Dependencies,
    pattern: Arc<PathPattern>,
}

impl RouteEntry {
    pub fn new(
        path: &str,
        method: HttpRequestMethod,
        callback: Handler,
        middlewares: Vec<Middleware>,
        dependencies: Dependencies,
        pattern: Arc<PathPattern>,
    ) -> Self {
        Self {
            path: path.to_string(),
            method,
            callback,
            middlewares,
            dependencies,
            pattern,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    pub fn callback(&self) -> &Handler {
        &self.callback
    }

    pub fn middlewares(&self) -> &[Middleware] {
        &self.middlewares
    }

    pub fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    pub fn is_static(&self) -> bool {
        !self.pattern.has_params()
    }
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("path", &self.path)
            .field("method", &self.method)
            .field("middlewares", &self.middlewares.len())
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// 一次成功解析的结果
#[derive(Debug, Clone)]
pub struct Resolved {
    pub entry: Arc<RouteEntry>,
    pub params: Params,
    /// 是否来自访问缓存
    pub cached: bool,
}

#[derive(Default)]
pub struct RouteTable {
    static_routes: HashMap<String, MethodMap>,
    /// 保持注册顺序
    param_routes: Vec<(Arc<PathPattern>, MethodMap)>,
    param_index: HashMap<String, usize>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 把单个路由声明的各方法注册到 `parent` 前缀下，不处理子路由。
    ///
    /// 没有所属模块，因此控制器的必需依赖无法满足。返回新增的条目数。
    pub fn add_route(&mut self, route: &Route, parent: &str) -> Result<usize, Exception> {
        let mut registry = ModuleRegistry::new();
        let entries = mapper::stage_route(route, parent, None, &mut registry)?;
        let count = entries.len();
        for entry in entries {
            self.insert(entry);
        }
        Ok(count)
    }

    /// 同一 (路径, 方法) 重复注册时后者覆盖前者
    pub fn insert(&mut self, entry: RouteEntry) {
        let path = entry.path.clone();
        let method = entry.method;
        let methods = if entry.pattern.has_params() {
            let slot = match self.param_index.get(&path) {
                Some(&slot) => slot,
                None => {
                    self.param_routes
                        .push((Arc::clone(&entry.pattern), HashMap::new()));
                    self.param_index.insert(path.clone(), self.param_routes.len() - 1);
                    self.param_routes.len() - 1
                }
            };
            &mut self.param_routes[slot].1
        } else {
            self.static_routes.entry(path.clone()).or_default()
        };

        if methods.insert(method, Arc::new(entry)).is_some() {
            warn!("路由 {} {} 被重复注册，新条目覆盖旧条目", method, path);
        } else {
            debug!("注册路由 {} {}", method, path);
        }
    }

    /// 先查静态路由，再按注册顺序扫描参数路由；路径和方法都要匹配
    pub fn resolve(&self, path: &str, method: HttpRequestMethod) -> Result<Resolved, Exception> {
        let path = normalize_request_path(path);

        if let Some(entry) = self.static_routes.get(&path).and_then(|m| m.get(&method)) {
            return Ok(Resolved {
                entry: Arc::clone(entry),
                params: Params::new(),
                cached: false,
            });
        }

        for (pattern, methods) in &self.param_routes {
            let Some(entry) = methods.get(&method) else {
                continue;
            };
            if let Some(params) = pattern.captures(&path) {
                return Ok(Resolved {
                    entry: Arc::clone(entry),
                    params,
                    cached: false,
                });
            }
        }

        Err(Exception::RouteNotFound { path, method })
    }

    pub fn len(&self) -> usize {
        self.static_routes.values().map(|m| m.len()).sum::<usize>()
            + self.param_routes.iter().map(|(_, m)| m.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 列出所有 (路径, 方法)：静态路由按字典序，参数路由按注册顺序
    pub fn routes(&self) -> Vec<(String, HttpRequestMethod)> {
        let mut statics: Vec<(String, HttpRequestMethod)> = self
            .static_routes
            .iter()
            .flat_map(|(path, methods)| methods.keys().map(move |m| (path.clone(), *m)))
            .collect();
        statics.sort();

        let params = self.param_routes.iter().flat_map(|(pattern, methods)| {
            let mut keys: Vec<HttpRequestMethod> = methods.keys().copied().collect();
            keys.sort();
            keys.into_iter()
                .map(move |m| (pattern.template().to_string(), m))
        });
        statics.into_iter().chain(params).collect()
    }
}
