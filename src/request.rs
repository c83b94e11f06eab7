// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 负责将 TCP 流中读取的原始字节解析为强类型的 `Request` 结构体，作为路由引擎的传输层抽象：
//! 1. 请求行（Request-Line）的解析（方法、目标 URL、版本）。
//! 2. 标头（Headers）的提取，字段名大小写不敏感。
//! 3. 按 `Content-Length` 截取原始请求体，解码交给 `body` 模块。

use std::collections::HashMap;

use bytes::Bytes;
use log::error;

use crate::{exception::Exception, param::*};

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// 表示一个完整的 HTTP 请求。
#[derive(Debug, Clone)]
pub struct Request {
    /// 全局请求 ID，用于日志追踪
    id: u128,
    method: HttpRequestMethod,
    /// 请求目标，包含查询字符串
    url: String,
    version: HttpVersion,
    /// 键统一为小写
    headers: HashMap<String, String>,
    /// 客户端支持的压缩编码列表（按解析顺序排列）
    accept_encoding: Vec<HttpEncoding>,
    body: Bytes,
}

impl Request {
    /// 直接构造请求，主要用于测试和进程内调用。
    pub fn new(method: HttpRequestMethod, url: &str) -> Self {
        Self {
            id: 0,
            method,
            url: url.to_string(),
            version: HttpVersion::V1_1,
            headers: HashMap::new(),
            accept_encoding: vec![],
            body: Bytes::new(),
        }
    }

    pub fn with_id(mut self, id: u128) -> Self {
        self.id = id;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        let name = name.to_lowercase();
        if name == "accept-encoding" {
            self.accept_encoding = parse_accept_encoding(value);
        }
        self.headers.insert(name, value.to_string());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// 从原始字节缓冲区尝试构建 `Request` 实例。
    ///
    /// # 逻辑步骤
    /// 1. 定位头部结束标记，头部必须是合法的 UTF-8。
    /// 2. 解析请求行：提取方法、目标和协议版本。
    /// 3. 迭代解析标头。
    /// 4. 按 `Content-Length` 截取请求体。
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let header_end = find_header_end(buffer).unwrap_or(buffer.len());
        let head = match std::str::from_utf8(&buffer[..header_end]) {
            Ok(s) => s,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };

        let mut lines = head.split(CRLF);
        let request_line = lines.next().unwrap_or("");
        let parts: Vec<&str> = request_line.split(' ').filter(|s| !s.is_empty()).collect();
        if parts.len() != 3 {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, request_line);
            return Err(Exception::MalformedRequest(request_line.to_string()));
        }

        let method = match parts[0].parse::<HttpRequestMethod>() {
            Ok(m) => m,
            Err(_) => {
                error!("[ID{}]不支持的HTTP请求方法：{}", id, parts[0]);
                return Err(Exception::UnSupportedRequestMethod);
            }
        };

        let version = match parts[2].to_uppercase().as_str() {
            "HTTP/1.1" => HttpVersion::V1_1,
            other => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, other);
                return Err(Exception::UnsupportedHttpVersion);
            }
        };

        let mut request = Self::new(method, parts[1]).with_id(id);
        request.version = version;
        for line in lines.filter(|l| !l.is_empty()) {
            match line.split_once(':') {
                Some((name, value)) => {
                    request = request.with_header(name.trim(), value.trim());
                }
                None => {
                    error!("[ID{}]无法解析的标头行：{}", id, line);
                    return Err(Exception::MalformedRequest(line.to_string()));
                }
            }
        }

        let body_start = (header_end + HEADER_TERMINATOR.len()).min(buffer.len());
        let declared = request.content_length()?.unwrap_or(0);
        let body_end = (body_start + declared).min(buffer.len());
        request.body = Bytes::copy_from_slice(&buffer[body_start..body_end]);

        Ok(request)
    }

    fn content_length(&self) -> Result<Option<usize>, Exception> {
        match self.header("content-length") {
            Some(v) => v
                .parse::<usize>()
                .map(Some)
                .map_err(|_| Exception::MalformedRequest(format!("Content-Length: {}", v))),
            None => Ok(None),
        }
    }
}

/// 缓冲区中已经收齐的完整报文长度。
///
/// 头部尚未结束时返回 `None`；否则返回头部加上 `Content-Length` 声明的总字节数。
pub fn frame_length(buffer: &[u8]) -> Option<usize> {
    let header_end = find_header_end(buffer)?;
    let head = String::from_utf8_lossy(&buffer[..header_end]);
    let declared = head
        .split(CRLF)
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    Some(header_end + HEADER_TERMINATOR.len() + declared)
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
}

// 这里的逻辑比较简单，只要包含关键词即视为支持
fn parse_accept_encoding(value: &str) -> Vec<HttpEncoding> {
    let mut encodings = vec![];
    if value.contains("gzip") {
        encodings.push(HttpEncoding::Gzip);
    }
    if value.contains("deflate") {
        encodings.push(HttpEncoding::Deflate);
    }
    if value.contains("br") {
        encodings.push(HttpEncoding::Br);
    }
    encodings
}

// --- Getter 访问器实现 ---

impl Request {
    pub fn id(&self) -> u128 {
        self.id
    }

    pub fn version(&self) -> &HttpVersion {
        &self.version
    }

    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    /// 原始请求目标（含查询字符串）
    pub fn url(&self) -> &str {
        &self.url
    }

    /// 不含查询字符串的路径部分
    pub fn path(&self) -> &str {
        match self.url.split_once('?') {
            Some((path, _)) => path,
            None => &self.url,
        }
    }

    /// `?` 之后的部分，不存在时为空串
    pub fn query_string(&self) -> &str {
        match self.url.split_once('?') {
            Some((_, query)) => query,
            None => "",
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(|v| v.as_str())
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or("")
    }

    pub fn accept_encoding(&self) -> &Vec<HttpEncoding> {
        &self.accept_encoding
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}
