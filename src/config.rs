use num_cpus;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use log::{error, info, warn};
use std::fs::File;
use std::io::prelude::*;

use crate::param::POWERED_BY;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_local")]
    local: bool,
    #[serde(default)]
    worker_threads: usize,
    #[serde(default = "default_visited_cache_size")]
    visited_cache_size: usize,
    #[serde(default = "default_max_request_size")]
    max_request_size: usize,
    #[serde(default = "default_powered_by")]
    powered_by: String,
}

fn default_port() -> u16 {
    7878
}

fn default_local() -> bool {
    true
}

fn default_visited_cache_size() -> usize {
    1024
}

fn default_max_request_size() -> usize {
    1048576 // 1MB
}

fn default_powered_by() -> String {
    POWERED_BY.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            port: default_port(),
            local: default_local(),
            worker_threads: 0,
            visited_cache_size: default_visited_cache_size(),
            max_request_size: default_max_request_size(),
            powered_by: default_powered_by(),
        }
    }

    /// 读取 TOML 配置文件，文件缺失或格式错误时使用默认配置
    pub fn from_toml(filename: &str) -> Self {
        let mut str_val = String::new();
        let read = File::open(filename).and_then(|mut file| file.read_to_string(&mut str_val));
        let mut raw_config = match read {
            Ok(_) => Self::from_toml_str(&str_val),
            Err(e) => {
                error!("无法读取配置文件 {}：{}，使用默认配置", filename, e);
                Config::new()
            }
        };
        if raw_config.worker_threads == 0 {
            raw_config.worker_threads = num_cpus::get();
        }
        raw_config
    }

    pub fn from_toml_str(content: &str) -> Self {
        let config: Config = match toml::from_str(content) {
            Ok(t) => t,
            Err(e) => {
                error!("无法成功从配置文件构建配置对象，使用默认配置：{}", e);
                Config::new()
            }
        };
        if config.visited_cache_size == 0 {
            warn!("visited_cache_size被设置为0，访问缓存将被禁用");
        }
        if config.max_request_size == 0 {
            info!("max_request_size为0，不限制请求大小");
        }
        config
    }

    pub fn with_visited_cache_size(mut self, size: usize) -> Self {
        self.visited_cache_size = size;
        self
    }
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn visited_cache_size(&self) -> usize {
        self.visited_cache_size
    }

    pub fn max_request_size(&self) -> usize {
        self.max_request_size
    }

    pub fn powered_by(&self) -> &str {
        &self.powered_by
    }
}
