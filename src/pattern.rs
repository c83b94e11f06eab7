// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 路径模板编译模块
//!
//! 将 `/users/:id` 形式的路径模板编译为带命名捕获组的锚定正则。
//! 编译只发生在路由注册期，请求期只做匹配与参数提取。

use log::debug;
use regex::Regex;

use crate::exception::Exception;

/// 参数片段的匹配规则：非贪婪的单词字符或连字符
const PARAM_MATCHER: &str = r"[\w\-]+?";

/// 路径模板中的单个片段
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// 逐字匹配的字面量
    Literal(String),
    /// 以 `:` 开头的命名参数
    Param(String),
}

/// 按模板顺序排列的参数表。
///
/// 参数名在同一个模板内唯一，因此用有序向量代替哈希表，保证迭代顺序与模板一致。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// 已存在的键会被覆盖，且保留原位置
    pub fn insert(&mut self, name: &str, value: &str) {
        match self.0.iter_mut().find(|(key, _)| key == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.0.push((name.to_string(), value.to_string())),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Params {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

/// 编译后的路径模板
#[derive(Debug, Clone)]
pub struct PathPattern {
    template: String,
    segments: Vec<Segment>,
    matcher: Regex,
}

impl PathPattern {
    /// 编译路径模板。
    ///
    /// 模板按 `/` 切分，空片段被忽略，所以根路径（`""` 或 `"/"`）得到空片段列表，
    /// 只匹配 `/`。参数必须占据整个片段，`user:id` 这类混写会返回
    /// [`Exception::InvalidPathTemplate`]。
    pub fn compile(template: &str) -> Result<Self, Exception> {
        let mut segments = Vec::new();
        for raw in template.split('/').filter(|s| !s.is_empty()) {
            let segment = match raw.strip_prefix(':') {
                Some(name) => {
                    validate_param_name(template, name)?;
                    if segments
                        .iter()
                        .any(|s| matches!(s, Segment::Param(n) if n == name))
                    {
                        return Err(Exception::InvalidPathTemplate(format!(
                            "parameter ':{}' appears twice in '{}'",
                            name, template
                        )));
                    }
                    Segment::Param(name.to_string())
                }
                None if raw.contains(':') => {
                    return Err(Exception::InvalidPathTemplate(format!(
                        "segment '{}' of '{}' mixes a literal and a parameter",
                        raw, template
                    )));
                }
                None => Segment::Literal(raw.to_string()),
            };
            segments.push(segment);
        }

        let source = build_source(&segments);
        debug!("路径模板 {} 编译为 {}", template, source);
        let matcher = Regex::new(&source)
            .map_err(|e| Exception::InvalidPathTemplate(format!("'{}': {}", template, e)))?;

        Ok(Self {
            template: template.to_string(),
            segments,
            matcher,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn has_params(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Param(_)))
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.matcher.is_match(path)
    }

    /// 匹配成功时按模板顺序返回参数
    pub fn captures(&self, path: &str) -> Option<Params> {
        let caps = self.matcher.captures(path)?;
        let mut params = Params::new();
        for segment in &self.segments {
            if let Segment::Param(name) = segment {
                if let Some(value) = caps.name(name) {
                    params.insert(name, value.as_str());
                }
            }
        }
        Some(params)
    }
}

fn build_source(segments: &[Segment]) -> String {
    if segments.is_empty() {
        return "^/$".to_string();
    }
    let mut source = String::from("^");
    for segment in segments {
        match segment {
            Segment::Literal(lit) => {
                source.push_str(r"/");
                source.push_str(&regex::escape(lit));
            }
            Segment::Param(name) => {
                source.push_str(&format!("/(?P<{}>{})", name, PARAM_MATCHER));
            }
        }
    }
    source.push('$');
    source
}

fn validate_param_name(template: &str, name: &str) -> Result<(), Exception> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Exception::InvalidPathTemplate(format!(
            "invalid parameter name ':{}' in '{}'",
            name, template
        )))
    }
}

/// 规范化路由声明中的路径片段：`""` 和 `"/"` 变为空串，其余保证恰好一个前导斜杠且无尾随斜杠。
pub fn sanitize_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    let mut out = String::with_capacity(trimmed.len() + 1);
    out.push('/');
    out.push_str(trimmed);
    out
}

/// 拼接父级前缀与子路径，结果总是以 `/` 开头；重复拼接不会产生双斜杠。
pub fn join_paths(parent: &str, child: &str) -> String {
    let joined = sanitize_path(parent) + &sanitize_path(child);
    if joined.is_empty() {
        "/".to_string()
    } else {
        joined
    }
}

/// 规范化请求路径：去掉尾随斜杠，保证前导斜杠，空路径视为根路径。
pub fn normalize_request_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
