// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 路由声明。`Route` 只描述路径、处理函数和子路由，映射到路由表的工作由 `mapper` 完成。

use std::{fmt, future::Future, sync::Arc};

use crate::{
    context::Context,
    exception::Exception,
    middleware::{BoxFuture, Middleware},
    module::{Dependencies, Dependency, Module},
    param::HttpRequestMethod,
    response::Reply,
};

pub type HandlerFn = dyn Fn(Context) -> BoxFuture<Result<Reply, Exception>> + Send + Sync;

/// 懒加载子模块的工厂
pub type LazyModule = Arc<dyn Fn() -> BoxFuture<Result<Module, Exception>> + Send + Sync>;

/// 路由回调
#[derive(Clone)]
pub struct Handler(Arc<HandlerFn>);

impl Handler {
    pub fn new<F, Fut, R>(f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Exception>> + Send + 'static,
        R: Into<Reply>,
    {
        Handler(Arc::new(move |ctx| {
            let fut = f(ctx);
            Box::pin(async move { fut.await.map(Into::into) })
        }))
    }

    pub fn call(&self, ctx: Context) -> BoxFuture<Result<Reply, Exception>> {
        (self.0)(ctx)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler")
    }
}

/// 某个方法上的处理函数及其专属中间件
#[derive(Debug, Clone)]
pub struct MethodRoute {
    pub(crate) method: HttpRequestMethod,
    pub(crate) middlewares: Vec<Middleware>,
    pub(crate) callback: Handler,
}

impl MethodRoute {
    pub fn new(method: HttpRequestMethod, callback: Handler) -> Self {
        Self {
            method,
            middlewares: vec![],
            callback,
        }
    }

    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }
}

/// 控制器通过显式的绑定表暴露各方法的处理函数。
///
/// `dependencies` 在挂载时按模块树解析，结果传给 `handlers`。
pub trait Controller: Send + Sync {
    fn name(&self) -> String;

    fn dependencies(&self) -> Vec<Dependency> {
        vec![]
    }

    fn handlers(&self, dependencies: &Dependencies) -> Vec<MethodRoute>;
}

#[derive(Clone)]
pub struct Route {
    pub(crate) path: String,
    pub(crate) middlewares: Vec<Middleware>,
    pub(crate) dependencies: Vec<Dependency>,
    pub(crate) controller: Option<Arc<dyn Controller>>,
    pub(crate) children: Option<Vec<Route>>,
    pub(crate) load_children: Option<LazyModule>,
    pub(crate) methods: Vec<MethodRoute>,
}

impl Route {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            middlewares: vec![],
            dependencies: vec![],
            controller: None,
            children: None,
            load_children: None,
            methods: vec![],
        }
    }

    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn middlewares(mut self, middlewares: Vec<Middleware>) -> Self {
        self.middlewares.extend(middlewares);
        self
    }

    pub fn dependency(mut self, dependency: impl Into<Dependency>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn controller<C: Controller + 'static>(mut self, controller: C) -> Self {
        self.controller = Some(Arc::new(controller));
        self
    }

    pub fn children(mut self, children: Vec<Route>) -> Self {
        self.children = Some(children);
        self
    }

    pub fn load_children<F, Fut>(mut self, loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Module, Exception>> + Send + 'static,
    {
        self.load_children = Some(Arc::new(move || Box::pin(loader())));
        self
    }

    pub fn method<F, Fut, R>(self, method: HttpRequestMethod, callback: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Exception>> + Send + 'static,
        R: Into<Reply>,
    {
        self.method_with(method, vec![], callback)
    }

    pub fn method_with<F, Fut, R>(
        mut self,
        method: HttpRequestMethod,
        middlewares: Vec<Middleware>,
        callback: F,
    ) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Exception>> + Send + 'static,
        R: Into<Reply>,
    {
        let mut method_route = MethodRoute::new(method, Handler::new(callback));
        method_route.middlewares = middlewares;
        self.methods.push(method_route);
        self
    }

    pub fn get<F, Fut, R>(self, callback: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Exception>> + Send + 'static,
        R: Into<Reply>,
    {
        self.method(HttpRequestMethod::Get, callback)
    }

    pub fn post<F, Fut, R>(self, callback: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Exception>> + Send + 'static,
        R: Into<Reply>,
    {
        self.method(HttpRequestMethod::Post, callback)
    }

    pub fn put<F, Fut, R>(self, callback: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Exception>> + Send + 'static,
        R: Into<Reply>,
    {
        self.method(HttpRequestMethod::Put, callback)
    }

    pub fn patch<F, Fut, R>(self, callback: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Exception>> + Send + 'static,
        R: Into<Reply>,
    {
        self.method(HttpRequestMethod::Patch, callback)
    }

    pub fn delete<F, Fut, R>(self, callback: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Exception>> + Send + 'static,
        R: Into<Reply>,
    {
        self.method(HttpRequestMethod::Delete, callback)
    }

    pub fn options<F, Fut, R>(self, callback: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Exception>> + Send + 'static,
        R: Into<Reply>,
    {
        self.method(HttpRequestMethod::Options, callback)
    }

    pub fn head<F, Fut, R>(self, callback: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Exception>> + Send + 'static,
        R: Into<Reply>,
    {
        self.method(HttpRequestMethod::Head, callback)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// 检查互斥的形态选项，`full_path` 只用于错误信息
    pub fn validate_shape(&self, full_path: &str) -> Result<(), Exception> {
        let conflict = |property: &str, other: &str| {
            Err(Exception::ConflictingRouteShape(format!(
                "Property '{}' can't be used with '{}' in route '{}'",
                property, other, full_path
            )))
        };
        if self.load_children.is_some() && self.children.is_some() {
            return conflict("load_children", "children");
        }
        if self.load_children.is_some() && self.controller.is_some() {
            return conflict("load_children", "controller");
        }
        if self.controller.is_some() && !self.methods.is_empty() {
            return conflict("controller", "methods");
        }
        Ok(())
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.path)
            .field("methods", &self.methods.iter().map(|m| m.method).collect::<Vec<_>>())
            .field("controller", &self.controller.as_ref().map(|c| c.name()))
            .field("children", &self.children)
            .field("lazy", &self.load_children.is_some())
            .finish()
    }
}
