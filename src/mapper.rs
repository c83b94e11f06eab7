// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 模块与路由映射
//!
//! 深度优先地遍历路由声明和模块树，带着当前前缀生成路由表条目。
//! 映射只做暂存：所有条目都校验通过后才由调用方一次性提交到路由表，
//! 因此中途失败不会留下半注册的路由。
//!
//! `load_children` 不在映射时执行，而是收集为 [`LazyLoad`]，
//! 由 `Router::load_lazy` 在同步注册完成后异步解析。

use std::{fmt, sync::Arc};

use log::{debug, warn};

use crate::{
    exception::Exception,
    module::{Module, ModuleId, ModuleRegistry, Provider},
    pattern::{join_paths, PathPattern},
    route::{LazyModule, Route},
    table::RouteEntry,
};

/// 一个尚未执行的懒加载子模块
#[derive(Clone)]
pub struct LazyLoad {
    prefix: String,
    parent: Option<ModuleId>,
    epoch: u64,
    loader: LazyModule,
}

impl LazyLoad {
    /// 子模块挂载的路径前缀，即声明 `load_children` 的路由的完整路径
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn parent(&self) -> Option<ModuleId> {
        self.parent
    }

    /// 登记时模块注册表的纪元
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn loader(&self) -> &LazyModule {
        &self.loader
    }
}

impl fmt::Debug for LazyLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyLoad")
            .field("prefix", &self.prefix)
            .field("parent", &self.parent)
            .field("epoch", &self.epoch)
            .finish()
    }
}

/// 把单个路由声明展开为路由表条目，不递归子路由。
///
/// 条目的依赖依次合并所属模块、路由自身和控制器的依赖；
/// 中间件为路由级在前，控制器或方法级在后。
pub fn stage_route(
    route: &Route,
    prefix: &str,
    module: Option<ModuleId>,
    registry: &mut ModuleRegistry,
) -> Result<Vec<RouteEntry>, Exception> {
    let full_path = join_paths(prefix, &route.path);
    route.validate_shape(&full_path)?;
    if route.controller.is_none() && route.methods.is_empty() {
        return Ok(vec![]);
    }
    let pattern = Arc::new(PathPattern::compile(&full_path)?);

    let mut dependencies = module
        .and_then(|id| registry.node(id))
        .map(|node| node.dependencies().clone())
        .unwrap_or_default();
    let route_dependencies = registry.resolve_all(
        module,
        &route.dependencies,
        &format!("route '{}'", full_path),
    )?;
    dependencies.extend(&route_dependencies);

    let methods = match &route.controller {
        Some(controller) => {
            let name = controller.name();
            if let Some(id) = module {
                if !registry.is_declared(id, &name) {
                    return Err(Exception::ControllerNotDeclared {
                        controller: name,
                        module: registry
                            .node(id)
                            .map(|node| node.name().to_string())
                            .unwrap_or_default(),
                    });
                }
            }
            let controller_dependencies =
                registry.resolve_all(module, &controller.dependencies(), &name)?;
            dependencies.extend(&controller_dependencies);
            controller.handlers(&dependencies)
        }
        None => route.methods.clone(),
    };

    Ok(methods
        .into_iter()
        .map(|method_route| {
            let mut middlewares = route.middlewares.clone();
            middlewares.extend(method_route.middlewares);
            RouteEntry::new(
                &full_path,
                method_route.method,
                method_route.callback,
                middlewares,
                dependencies.clone(),
                Arc::clone(&pattern),
            )
        })
        .collect())
}

pub struct RouteMapper<'a> {
    registry: &'a mut ModuleRegistry,
    staged: Vec<RouteEntry>,
    lazy: Vec<LazyLoad>,
}

impl<'a> RouteMapper<'a> {
    pub fn new(registry: &'a mut ModuleRegistry) -> Self {
        Self {
            registry,
            staged: vec![],
            lazy: vec![],
        }
    }

    /// 映射路由及其内联子路由，`module` 是声明该路由的模块节点
    pub fn map_route(
        &mut self,
        route: &Route,
        prefix: &str,
        module: Option<ModuleId>,
    ) -> Result<(), Exception> {
        let full_path = join_paths(prefix, &route.path);
        let entries = stage_route(route, prefix, module, self.registry)?;
        self.staged.extend(entries);

        if let Some(children) = &route.children {
            for child in children {
                self.map_route(child, &full_path, module)?;
            }
        }
        if let Some(loader) = &route.load_children {
            debug!("路由 {} 的子模块将延迟加载", full_path);
            self.lazy.push(LazyLoad {
                prefix: full_path,
                parent: module,
                epoch: self.registry.epoch(),
                loader: Arc::clone(loader),
            });
        }
        Ok(())
    }

    /// 登记根模块并映射其全部路由与导入
    pub fn map_root(&mut self, module: &Module) -> Result<ModuleId, Exception> {
        let id = self.registry.register_root(module, "")?;
        self.populate(id, module, "")?;
        Ok(id)
    }

    /// 把模块挂到 `parent` 之下。导入的模块与导入方共用同一前缀。
    pub fn map_module(
        &mut self,
        module: &Module,
        prefix: &str,
        parent: Option<ModuleId>,
        overrides: Vec<Provider>,
    ) -> Result<ModuleId, Exception> {
        let id = self.registry.attach(module, prefix, parent, overrides);
        self.populate(id, module, prefix)?;
        Ok(id)
    }

    /// 挂载懒加载得到的模块。父模块在登记之后被重置掉时拒绝挂载。
    pub fn map_lazy(&mut self, load: &LazyLoad, module: &Module) -> Result<ModuleId, Exception> {
        if load.parent.is_some() && load.epoch != self.registry.epoch() {
            warn!(
                "懒加载 {} 的父模块已随注册表重置失效（纪元 {} -> {}）",
                load.prefix,
                load.epoch,
                self.registry.epoch()
            );
            return Err(Exception::LazyLoadFailed(format!(
                "parent module of '{}' was removed by a registry reset",
                load.prefix
            )));
        }
        self.map_module(module, &load.prefix, load.parent, vec![])
    }

    fn populate(&mut self, id: ModuleId, module: &Module, prefix: &str) -> Result<(), Exception> {
        let dependencies = self
            .registry
            .resolve_all(Some(id), &module.dependencies, module.name())?;
        self.registry.set_dependencies(id, dependencies);

        for route in &module.routes {
            self.map_route(route, prefix, Some(id))?;
        }
        for import in &module.imports {
            self.map_module(&import.module, prefix, Some(id), import.providers.clone())?;
        }
        Ok(())
    }

    /// 取出暂存的条目和待执行的懒加载
    pub fn finish(self) -> (Vec<RouteEntry>, Vec<LazyLoad>) {
        (self.staged, self.lazy)
    }
}
