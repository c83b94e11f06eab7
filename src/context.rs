// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 请求上下文的构建。每个请求创建一个新的 `Context`，随后按值在中间件链中传递。

use std::{any::Any, collections::HashMap, sync::Arc};

use url::form_urlencoded;

use crate::{
    body::Body,
    middleware::MiddlewareError,
    module::Dependencies,
    param::HttpRequestMethod,
    pattern::Params,
    request::Request,
    response::ResponseWriter,
};

/// 中间件与路由回调共享的请求上下文。
///
/// `query` 与 `params` 始终存在，没有内容时为空表。
#[derive(Debug, Clone)]
pub struct Context {
    id: u128,
    pub request: Arc<Request>,
    pub response: ResponseWriter,
    pub method: HttpRequestMethod,
    pub query: HashMap<String, String>,
    pub params: Params,
    pub body: Body,
    /// 上一个中间件通过 `next` 传递下来的错误
    pub error: Option<MiddlewareError>,
    dependencies: Dependencies,
}

impl Context {
    /// 由请求、匹配得到的参数（或访问缓存中的快照）和已解码的请求体组装上下文
    pub fn build(
        request: Arc<Request>,
        response: ResponseWriter,
        params: Params,
        body: Body,
        dependencies: Dependencies,
    ) -> Self {
        let query = parse_query(request.query_string());
        Self {
            id: request.id(),
            method: request.method(),
            request,
            response,
            query,
            params,
            body,
            error: None,
            dependencies,
        }
    }

    pub fn id(&self) -> u128 {
        self.id
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(|v| v.as_str())
    }

    /// 路由声明的依赖实例，类型不符或未提供时返回 `None`
    pub fn dependency<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.dependencies.get::<T>(name)
    }

    pub fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }
}

/// 解析查询字符串。
///
/// 按 `&` 切分后，每一对只在第一个 `=` 处拆开；没有 `=` 的键映射为空串，
/// 重复的键以后出现的为准。键和值都会做百分号解码，`+` 解码为空格，
/// 非法的转义序列原样保留。
pub fn parse_query(query: &str) -> HashMap<String, String> {
    form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
        .into_owned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_pairs() {
        let query = parse_query("a=1&b=two&c");
        assert_eq!(query.get("a").map(String::as_str), Some("1"));
        assert_eq!(query.get("b").map(String::as_str), Some("two"));
        assert_eq!(query.get("c").map(String::as_str), Some(""));
        assert_eq!(query.len(), 3);
    }

    #[test]
    fn test_parse_query_splits_on_first_equals() {
        let query = parse_query("?expr=a=b");
        assert_eq!(query.get("expr").map(String::as_str), Some("a=b"));
    }

    #[test]
    fn test_parse_query_percent_decoding() {
        let query = parse_query("name=a%20b&city=new+york&%E4%BD%A0=%E5%A5%BD");
        assert_eq!(query.get("name").map(String::as_str), Some("a b"));
        assert_eq!(query.get("city").map(String::as_str), Some("new york"));
        assert_eq!(query.get("你").map(String::as_str), Some("好"));
    }

    #[test]
    fn test_parse_query_keeps_invalid_escapes() {
        let query = parse_query("bad=%zz&half=%4&tail=100%");
        assert_eq!(query.get("bad").map(String::as_str), Some("%zz"));
        assert_eq!(query.get("half").map(String::as_str), Some("%4"));
        assert_eq!(query.get("tail").map(String::as_str), Some("100%"));
    }

    #[test]
    fn test_parse_query_later_duplicate_wins() {
        let query = parse_query("a=1&a=2");
        assert_eq!(query.get("a").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_parse_query_empty() {
        assert!(parse_query("").is_empty());
        assert!(parse_query("&&").is_empty());
    }

    #[test]
    fn test_build_context() {
        let request =
            Arc::new(Request::new(HttpRequestMethod::Get, "/users/7?sort=asc").with_id(3));
        let mut params = Params::new();
        params.insert("id", "7");
        let ctx = Context::build(
            request,
            ResponseWriter::new(3),
            params,
            Body::Empty,
            Dependencies::default(),
        );

        assert_eq!(ctx.id(), 3);
        assert_eq!(ctx.method, HttpRequestMethod::Get);
        assert_eq!(ctx.param("id"), Some("7"));
        assert_eq!(ctx.query("sort"), Some("asc"));
        assert!(ctx.error.is_none());
        assert!(ctx.dependency::<String>("anything").is_none());
    }

    #[test]
    fn test_maps_exist_when_empty() {
        let request = Arc::new(Request::new(HttpRequestMethod::Get, "/"));
        let ctx = Context::build(
            request,
            ResponseWriter::new(0),
            Params::new(),
            Body::Empty,
            Dependencies::default(),
        );
        assert!(ctx.query.is_empty());
        assert!(ctx.params.is_empty());
    }
}
