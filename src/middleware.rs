// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 中间件链调用模块
//!
//! 中间件有两种调用形态，在注册时通过 [`Middleware::context`] 或 [`Middleware::transport`] 显式选择：
//! - **上下文形态**：接收 `(Context, Next)`，可以读写 query、params、body 后调用 `next`；
//! - **传输层形态**：接收 `(Request, ResponseWriter, TransportNext, error)`，
//!   兼容直接面向传输层抽象编写的处理函数。
//!
//! 调用严格按链上顺序串行进行。传给 `next` 的错误只会被转交给下一个中间件，
//! 调用器本身不会因此跳过任何环节。中间件不调用 `next` 即终止整条链。

use std::{fmt, future::Future, pin::Pin, sync::Arc};

use crate::{context::Context, exception::Exception, request::Request, response::ResponseWriter};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

pub type ContextMiddlewareFn = dyn Fn(Context, Next) -> BoxFuture<()> + Send + Sync;

pub type TransportMiddlewareFn = dyn Fn(
        Arc<Request>,
        ResponseWriter,
        TransportNext,
        Option<MiddlewareError>,
    ) -> BoxFuture<()>
    + Send
    + Sync;

/// 链尾的回调，通常是路由处理函数的执行器
pub type Terminal = Arc<dyn Fn(Context) -> BoxFuture<()> + Send + Sync>;

/// 中间件之间传递的错误信息
#[derive(Debug, Clone, PartialEq)]
pub struct MiddlewareError(String);

impl MiddlewareError {
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MiddlewareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MiddlewareError {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for MiddlewareError {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<Exception> for MiddlewareError {
    fn from(value: Exception) -> Self {
        Self(value.to_string())
    }
}

#[derive(Clone)]
pub enum Middleware {
    Context(Arc<ContextMiddlewareFn>),
    Transport(Arc<TransportMiddlewareFn>),
}

impl Middleware {
    pub fn context<F, Fut>(f: F) -> Self
    where
        F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Middleware::Context(Arc::new(move |ctx, next| Box::pin(f(ctx, next))))
    }

    pub fn transport<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<Request>, ResponseWriter, TransportNext, Option<MiddlewareError>) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Middleware::Transport(Arc::new(move |req, res, next, error| {
            Box::pin(f(req, res, next, error))
        }))
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Middleware::Context(_) => write!(f, "Middleware::Context"),
            Middleware::Transport(_) => write!(f, "Middleware::Transport"),
        }
    }
}

/// 指向链上剩余部分的续体
pub struct Next {
    chain: Arc<[Middleware]>,
    index: usize,
    terminal: Terminal,
}

impl Next {
    /// 继续执行下一个中间件，清除上游传下来的错误
    pub fn run(self, ctx: Context) -> BoxFuture<()> {
        self.dispatch(ctx, None)
    }

    /// 携带错误继续执行下一个中间件
    pub fn run_with_error(self, ctx: Context, error: impl Into<MiddlewareError>) -> BoxFuture<()> {
        self.dispatch(ctx, Some(error.into()))
    }

    /// 链上还剩多少个中间件
    pub fn remaining(&self) -> usize {
        self.chain.len().saturating_sub(self.index)
    }

    fn dispatch(self, mut ctx: Context, error: Option<MiddlewareError>) -> BoxFuture<()> {
        ctx.error = error;
        invoke_at(self.chain, self.index, ctx, self.terminal)
    }
}

/// 传输层形态中间件的续体，自身持有上下文
pub struct TransportNext {
    next: Next,
    ctx: Context,
}

impl TransportNext {
    pub fn run(self) -> BoxFuture<()> {
        self.next.run(self.ctx)
    }

    pub fn run_with_error(self, error: impl Into<MiddlewareError>) -> BoxFuture<()> {
        self.next.run_with_error(self.ctx, error)
    }
}

/// 从链头开始执行中间件，全部执行完后运行 `terminal`
pub fn invoke(middlewares: Vec<Middleware>, ctx: Context, terminal: Terminal) -> BoxFuture<()> {
    invoke_at(Arc::from(middlewares), 0, ctx, terminal)
}

fn invoke_at(
    chain: Arc<[Middleware]>,
    index: usize,
    ctx: Context,
    terminal: Terminal,
) -> BoxFuture<()> {
    let current = match chain.get(index) {
        Some(m) => m.clone(),
        None => return terminal(ctx),
    };
    let next = Next {
        chain,
        index: index + 1,
        terminal,
    };
    match current {
        Middleware::Context(f) => f(ctx, next),
        Middleware::Transport(f) => {
            let request = Arc::clone(&ctx.request);
            let response = ctx.response.clone();
            let error = ctx.error.clone();
            f(request, response, TransportNext { next, ctx }, error)
        }
    }
}
