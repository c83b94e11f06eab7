// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了路由引擎在注册期和请求处理期可能抛出的各类异常情况。
//!
//! - **注册期异常**（路由形态冲突、路径模板非法、重复根模块、懒加载校验失败）是致命的，
//!   由启动流程记录日志后中止，或使对应的懒加载被拒绝。
//! - **请求期异常**（报文解析失败、路由未命中、回调出错）在本地恢复，
//!   由上层转化为对应状态码的响应，服务器继续运行。

use std::fmt;

use crate::param::HttpRequestMethod;

/// 路由引擎处理过程中发生的异常类型。
#[derive(Debug, Clone, PartialEq)]
pub enum Exception {
    /// 客户端发送的请求字节流无法解析为合法的 UTF-8 字符串。
    RequestIsNotUtf8,
    /// 客户端使用了服务器不支持的 HTTP 方法。
    UnSupportedRequestMethod,
    /// 客户端使用了服务器不支持的 HTTP 协议版本。
    UnsupportedHttpVersion,
    /// 请求行或标头格式非法。
    MalformedRequest(String),
    /// 请求报文超过了配置允许的最大长度。对应 `413`。
    RequestTooLarge(usize),
    /// 请求体无法按照 `Content-Type` 解码。
    InvalidBody(String),
    /// 路由表中没有与路径和方法同时匹配的条目。对应 `404`。
    RouteNotFound {
        path: String,
        method: HttpRequestMethod,
    },
    /// 路由同时声明了互斥的形态选项，例如 `children` 与 `load_children`。
    ConflictingRouteShape(String),
    /// 路径模板中存在不支持的片段，例如字面量与参数混写。
    InvalidPathTemplate(String),
    /// 路由引用的控制器既未被当前模块声明，也未被任何祖先模块声明。
    ControllerNotDeclared { controller: String, module: String },
    /// 依赖在当前模块及其祖先模块的 provider 列表中都找不到。
    DependencyNotProvided { dependency: String, requester: String },
    /// 根模块已经注册过一次。
    NotRootModule,
    /// 懒加载的子模块在解析过程中失败。
    LazyLoadFailed(String),
    /// 路由回调返回错误或发生 panic。
    CallbackError(String),
}

use Exception::*;

impl Exception {
    /// 请求期异常对应的 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            RouteNotFound { .. } => 404,
            RequestTooLarge(_) => 413,
            RequestIsNotUtf8
            | UnSupportedRequestMethod
            | UnsupportedHttpVersion
            | MalformedRequest(_)
            | InvalidBody(_)
            | CallbackError(_) => 400,
            _ => 500,
        }
    }

    /// 是否属于注册期的致命错误
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConflictingRouteShape(_)
                | InvalidPathTemplate(_)
                | ControllerNotDeclared { .. }
                | DependencyNotProvided { .. }
                | NotRootModule
                | LazyLoadFailed(_)
        )
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIsNotUtf8 => write!(f, "Request bytes can't be parsed in UTF-8"),
            UnSupportedRequestMethod => write!(f, "Unsupported request method"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            MalformedRequest(reason) => write!(f, "Malformed request: {}", reason),
            RequestTooLarge(limit) => write!(f, "Request exceeds {} bytes", limit),
            InvalidBody(reason) => write!(f, "Invalid request body: {}", reason),
            RouteNotFound { path, .. } => write!(f, "Route path of '{}' was not found!", path),
            ConflictingRouteShape(reason) => write!(f, "{}", reason),
            InvalidPathTemplate(reason) => write!(f, "Invalid path template: {}", reason),
            ControllerNotDeclared { controller, module } => write!(
                f,
                "Controller '{}' is not declared in module '{}' or its parents",
                controller, module
            ),
            DependencyNotProvided {
                dependency,
                requester,
            } => write!(
                f,
                "Dependency '{}' required by '{}' is not provided",
                dependency, requester
            ),
            NotRootModule => write!(f, "Root module has already been registered"),
            LazyLoadFailed(reason) => write!(f, "Lazy module failed to load: {}", reason),
            CallbackError(reason) => write!(f, "{}", reason),
        }
    }
}

impl std::error::Error for Exception {}
