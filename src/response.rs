// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 响应模块
//!
//! `Response` 保存一次请求的响应状态，`ResponseWriter` 是它在中间件链中流转的共享句柄，
//! 提供传输层的 `write_status` / `write_header` / `write` / `end`，
//! 以及面向路由回调的 `send` / `json` / `html`。序列化时按 `Accept-Encoding` 协商压缩。

use std::{
    io::{self, Write},
    sync::{Arc, Mutex, MutexGuard},
};

use brotli::enc::{self, backward_references::BrotliEncoderParams};
use bytes::Bytes;
use chrono::prelude::*;
use flate2::{
    write::{DeflateEncoder, GzEncoder},
    Compression,
};
use log::{debug, error, warn};
use serde_json::{json, Value};

use crate::{exception::Exception, param::*};

/// 路由回调的返回值，也是 `send` 能接受的全部形态
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Empty,
    Text(String),
    Json(Value),
    Html(String),
    /// 错误形态，总是以 400 和 `{"message": ...}` 发送
    Error(String),
}

impl From<&str> for Reply {
    fn from(value: &str) -> Self {
        Reply::Text(value.to_string())
    }
}

impl From<String> for Reply {
    fn from(value: String) -> Self {
        Reply::Text(value)
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Json(value)
    }
}

impl From<()> for Reply {
    fn from(_: ()) -> Self {
        Reply::Empty
    }
}

impl From<Exception> for Reply {
    fn from(e: Exception) -> Self {
        Reply::Error(e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    version: HttpVersion,
    status_code: u16,
    information: String,
    content_type: Option<String>,
    date: DateTime<Utc>,
    server_name: String,
    headers: Vec<(String, String)>,
    content: Vec<u8>,
    ended: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            version: HttpVersion::V1_1,
            status_code: 200,
            information: "OK".to_string(),
            content_type: None,
            date: Utc::now(),
            server_name: SERVER_NAME.to_string(),
            headers: vec![],
            content: vec![],
            ended: false,
        }
    }

    fn set_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = match STATUS_CODES.get(&code) {
            Some(&info) => info.to_string(),
            None => {
                warn!("未登记的状态码：{}", code);
                "Unknown".to_string()
            }
        };
        self
    }

    fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        if name.eq_ignore_ascii_case("content-type") {
            self.content_type = Some(value.to_string());
            return self;
        }
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
        self
    }

    /// 序列化为完整报文。内容非空时按客户端支持的编码压缩，压缩失败退回原文。
    pub fn as_bytes(&self, accept_encoding: &[HttpEncoding]) -> Vec<u8> {
        let mut encoding = match self.content.is_empty() {
            true => None,
            false => decide_encoding(accept_encoding),
        };
        let content = match compress(self.content.clone(), encoding) {
            Ok(c) => c,
            Err(e) => {
                error!("压缩响应失败: {}，返回未压缩内容", e);
                encoding = None;
                self.content.clone()
            }
        };

        let mut header = format!(
            "HTTP/{} {} {}{}",
            self.version, self.status_code, self.information, CRLF
        );
        if let Some(t) = &self.content_type {
            header.push_str(&["Content-Type: ", t, CRLF].concat());
        }
        if let Some(e) = encoding {
            header.push_str(&format!("Content-Encoding: {}{}", e, CRLF));
        }
        header.push_str(&format!("Content-Length: {}{}", content.len(), CRLF));
        header.push_str(&["Date: ", &format_date(&self.date), CRLF].concat());
        header.push_str(&["Server: ", &self.server_name, CRLF].concat());
        for (name, value) in &self.headers {
            header.push_str(&[name.as_str(), ": ", value, CRLF].concat());
        }
        header.push_str(CRLF);

        [header.as_bytes(), &content].concat()
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        if name.eq_ignore_ascii_case("content-type") {
            return self.content_type();
        }
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// 以 UTF-8 解读响应体，便于日志和测试
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.content).to_string()
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }
}

/// 在中间件和回调之间共享的响应句柄，克隆后指向同一个响应。
#[derive(Debug, Clone)]
pub struct ResponseWriter {
    id: u128,
    inner: Arc<Mutex<Response>>,
}

impl ResponseWriter {
    pub fn new(id: u128) -> Self {
        Self {
            id,
            inner: Arc::new(Mutex::new(Response::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Response> {
        match self.inner.lock() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!("[ID{}]响应锁被污染，恢复并继续", self.id);
                poisoned.into_inner()
            }
        }
    }

    /// 响应结束后的写入会被忽略
    fn writable(&self, response: &Response, op: &str) -> bool {
        if response.ended {
            warn!("[ID{}]响应已经结束，忽略{}", self.id, op);
        }
        !response.ended
    }

    pub fn write_status(&self, code: u16) {
        let mut response = self.lock();
        if self.writable(&response, "write_status") {
            response.set_code(code);
        }
    }

    pub fn write_header(&self, name: &str, value: &str) {
        let mut response = self.lock();
        if self.writable(&response, "write_header") {
            response.set_header(name, value);
        }
    }

    pub fn write(&self, data: &[u8]) {
        let mut response = self.lock();
        if self.writable(&response, "write") {
            response.content.extend_from_slice(data);
        }
    }

    pub fn end(&self) {
        let mut response = self.lock();
        if self.writable(&response, "end") {
            response.date = Utc::now();
            response.ended = true;
            debug!(
                "[ID{}]响应结束：{} {}",
                self.id, response.status_code, response.information
            );
        }
    }

    pub fn is_ended(&self) -> bool {
        self.lock().ended
    }

    pub fn status_code(&self) -> u16 {
        self.lock().status_code
    }

    /// 当前响应的副本
    pub fn snapshot(&self) -> Response {
        self.lock().clone()
    }

    /// 按值的形态选择 Content-Type 并结束响应。文本为 `text/plain`，
    /// 其余为 JSON；错误形态固定返回 400。
    pub fn send(&self, value: impl Into<Reply>, status_code: u16) {
        match value.into() {
            Reply::Empty => self.finish(status_code, None, Bytes::new()),
            Reply::Text(text) => self.finish(status_code, Some("text/plain"), Bytes::from(text)),
            Reply::Json(value) => self.json(value, status_code),
            Reply::Html(html) => self.html(&html, status_code),
            Reply::Error(message) => self.json(json!({ "message": message }), 400),
        }
    }

    pub fn json(&self, value: Value, status_code: u16) {
        let body = match serde_json::to_vec(&value) {
            Ok(b) => b,
            Err(e) => {
                error!("[ID{}]JSON序列化失败: {}", self.id, e);
                return self.finish(500, None, Bytes::new());
            }
        };
        self.finish(status_code, Some("application/json"), Bytes::from(body));
    }

    pub fn html(&self, html: &str, status_code: u16) {
        self.finish(
            status_code,
            Some("text/html;charset=utf-8"),
            Bytes::from(html.to_string()),
        );
    }

    fn finish(&self, status_code: u16, content_type: Option<&str>, body: Bytes) {
        {
            let mut response = self.lock();
            if !self.writable(&response, "send") {
                return;
            }
            response.set_code(status_code);
            response.content_type = content_type.map(|t| t.to_string());
            response.content.clear();
            response.content.extend_from_slice(&body);
        }
        self.end();
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc2822()
}

fn compress(data: Vec<u8>, mode: Option<HttpEncoding>) -> io::Result<Vec<u8>> {
    let original_size = data.len();
    let result = match mode {
        Some(HttpEncoding::Gzip) => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data)?;
            encoder.finish()
        }
        Some(HttpEncoding::Deflate) => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data)?;
            encoder.finish()
        }
        Some(HttpEncoding::Br) => {
            let params = BrotliEncoderParams::default();
            let mut output = Vec::new();
            enc::BrotliCompress(&mut io::Cursor::new(data), &mut output, &params)?;
            Ok(output)
        }
        None => Ok(data),
    };

    if let Ok(ref compressed) = result {
        debug!(
            "压缩完成: {:?}, 原始大小: {} bytes, 压缩后: {} bytes",
            mode,
            original_size,
            compressed.len()
        );
    }

    result
}

fn decide_encoding(accept_encoding: &[HttpEncoding]) -> Option<HttpEncoding> {
    if accept_encoding.contains(&HttpEncoding::Gzip) {
        Some(HttpEncoding::Gzip)
    } else if accept_encoding.contains(&HttpEncoding::Deflate) {
        Some(HttpEncoding::Deflate)
    } else if accept_encoding.contains(&HttpEncoding::Br) {
        Some(HttpEncoding::Br)
    } else {
        None
    }
}
