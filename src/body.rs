// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 请求体解码。路由引擎只把结果当作不透明的值放进上下文。

use std::collections::HashMap;

use log::debug;
use regex::Regex;
use serde_json::Value;
use url::form_urlencoded;

use crate::{exception::Exception, param::HttpRequestMethod, request::Request};

const TEXT_PLAIN: &str = "text/plain";
const FORM_DATA: &str = "multipart/form-data";
const APPLICATION_JSON: &str = "application/json";
const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// 解码后的请求体
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Body {
    #[default]
    Empty,
    Text(String),
    Json(Value),
    Form(HashMap<String, String>),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Body::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        match self {
            Body::Form(map) => map.get(name).map(|v| v.as_str()),
            Body::Json(Value::Object(map)) => map.get(name).and_then(|v| v.as_str()),
            _ => None,
        }
    }
}

/// 按请求方法和 `Content-Type` 解码请求体
pub fn decode(request: &Request) -> Result<Body, Exception> {
    decode_bytes(
        request.method(),
        request.content_type().unwrap_or(""),
        request.body(),
    )
}

pub fn decode_bytes(
    method: HttpRequestMethod,
    content_type: &str,
    raw: &[u8],
) -> Result<Body, Exception> {
    if !method.has_body() || raw.is_empty() {
        return Ok(Body::Empty);
    }
    let text = String::from_utf8(raw.to_vec())
        .map_err(|_| Exception::InvalidBody("body is not UTF-8".to_string()))?;
    debug!("解码请求体，Content-Type: {:?}, {} bytes", content_type, raw.len());

    if content_type.contains(APPLICATION_JSON) {
        return serde_json::from_str(&text)
            .map(Body::Json)
            .map_err(|e| Exception::InvalidBody(e.to_string()));
    }
    if content_type.contains(FORM_URLENCODED) {
        return Ok(Body::Form(parse_urlencoded(&text)));
    }
    if content_type.contains(FORM_DATA) {
        return parse_form_data(&text, content_type).map(Body::Form);
    }
    if !content_type.is_empty() && !content_type.starts_with(TEXT_PLAIN) {
        debug!("未知的Content-Type {}，按纯文本处理", content_type);
    }
    Ok(Body::Text(text))
}

fn parse_urlencoded(text: &str) -> HashMap<String, String> {
    form_urlencoded::parse(text.as_bytes()).into_owned().collect()
}

// 只支持普通字段，文件上传会被拒绝
fn parse_form_data(text: &str, content_type: &str) -> Result<HashMap<String, String>, Exception> {
    if text.contains("filename=") {
        return Err(Exception::InvalidBody(
            "multipart/form-data with files is not supported".to_string(),
        ));
    }
    let boundary = content_type
        .split("boundary=")
        .nth(1)
        .map(|b| b.trim_matches('"'))
        .ok_or_else(|| Exception::InvalidBody("missing multipart boundary".to_string()))?;
    let source = format!(
        r#"--{}\r\nContent-Disposition: form-data; name="(?P<field>[^"]+)"\r\n\r\n(?P<value>[^\r]*)\r\n"#,
        regex::escape(boundary)
    );
    let re = Regex::new(&source).map_err(|e| Exception::InvalidBody(e.to_string()))?;

    Ok(re
        .captures_iter(text)
        .map(|caps| (caps["field"].to_string(), caps["value"].to_string()))
        .collect())
}
