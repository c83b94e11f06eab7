// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # TCP 服务
//!
//! 接收连接、读取完整报文、交给 `Router` 处理并写回响应。每个连接处理一个请求后关闭。

use std::{
    sync::{Arc, Mutex},
    time::Instant,
};

use log::{debug, error, info, warn};
use serde_json::json;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

use crate::{
    exception::Exception,
    param::HttpEncoding,
    request::{frame_length, Request},
    response::{Response, ResponseWriter},
    router::Router,
};

const READ_CHUNK: usize = 4096;

/// 服务器运行状态，供管理控制台读取
#[derive(Debug, Default)]
pub struct ServerState {
    shutdown: Mutex<bool>,
    active_connection: Mutex<u32>,
}

impl ServerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 发出停机信号，主循环在接受下一个连接后退出
    pub fn stop(&self) {
        *lock(&self.shutdown) = true;
    }

    pub fn is_stopped(&self) -> bool {
        *lock(&self.shutdown)
    }

    pub fn active_connection(&self) -> u32 {
        *lock(&self.active_connection)
    }

    fn enter(&self) {
        *lock(&self.active_connection) += 1;
    }

    fn leave(&self) {
        let mut active = lock(&self.active_connection);
        *active = active.saturating_sub(1);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(lock) => lock,
        Err(poisoned) => {
            warn!("服务器状态锁被污染，恢复并继续");
            poisoned.into_inner()
        }
    }
}

/// 主事件循环：持续接收连接，并把每个连接分发到独立的任务中处理
pub async fn serve(
    listener: TcpListener,
    router: Arc<Router>,
    state: Arc<ServerState>,
    max_request_size: usize,
) {
    let mut id: u128 = 0;
    loop {
        if state.is_stopped() {
            info!("主循环接收到停机指令，正在退出...");
            break;
        }

        let (stream, addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("接受连接失败：{}", e);
                continue;
            }
        };
        debug!("[ID{}]TCP连接已建立：{}", id, addr);

        let router = Arc::clone(&router);
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            state.enter();
            handle_connection(stream, id, &router, max_request_size).await;
            state.leave();
        });

        id += 1;
    }
}

/// 读取一个完整请求，处理后写回响应并关闭连接
pub async fn handle_connection(
    mut stream: TcpStream,
    id: u128,
    router: &Router,
    max_request_size: usize,
) {
    let (response, encodings) = match read_request(&mut stream, id, max_request_size).await {
        Ok(Some(buffer)) => match Request::try_from(&buffer, id) {
            Ok(request) => {
                debug!(
                    "[ID{}]{} {}，User-Agent：{}",
                    id,
                    request.method(),
                    request.url(),
                    request.user_agent()
                );
                let start_time = Instant::now();
                let encodings = request.accept_encoding().clone();
                let (version, url, method) =
                    (*request.version(), request.url().to_string(), request.method());
                let user_agent = request.user_agent().to_string();
                let response = router.handle(request).await;
                info!(
                    "[ID{}] {}, {}, {}, {}, {}, {}, {}ms",
                    id,
                    version,
                    url,
                    method,
                    response.status_code(),
                    response.information(),
                    user_agent,
                    start_time.elapsed().as_millis()
                );
                (response, encodings)
            }
            Err(e) => (error_response(id, e), vec![]),
        },
        Ok(None) => {
            debug!("[ID{}]连接在发送请求前关闭", id);
            return;
        }
        Err(e) => (error_response(id, e), vec![]),
    };

    write_response(&mut stream, id, &response, &encodings).await;
}

async fn read_request(
    stream: &mut TcpStream,
    id: u128,
    max_request_size: usize,
) -> Result<Option<Vec<u8>>, Exception> {
    let mut buffer = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                error!("[ID{}]读取请求失败：{}", id, e);
                return Err(Exception::MalformedRequest(e.to_string()));
            }
        };
        buffer.extend_from_slice(&chunk[..n]);

        let expected = frame_length(&buffer);
        let size = expected.unwrap_or(buffer.len()).max(buffer.len());
        if max_request_size > 0 && size > max_request_size {
            warn!("[ID{}]请求大小 {} 超过上限 {}", id, size, max_request_size);
            return Err(Exception::RequestTooLarge(max_request_size));
        }
        if expected.is_some_and(|total| buffer.len() >= total) {
            break;
        }
    }
    match buffer.is_empty() {
        true => Ok(None),
        false => Ok(Some(buffer)),
    }
}

fn error_response(id: u128, e: Exception) -> Response {
    let response = ResponseWriter::new(id);
    response.json(json!({ "message": e.to_string() }), e.status_code());
    response.snapshot()
}

async fn write_response(
    stream: &mut TcpStream,
    id: u128,
    response: &Response,
    encodings: &[HttpEncoding],
) {
    let bytes = response.as_bytes(encodings);
    debug!(
        "[ID{}]发送响应：{} {}，长度: {}",
        id,
        response.status_code(),
        response.information(),
        bytes.len()
    );
    if let Err(e) = stream.write_all(&bytes).await {
        error!("[ID{}]发送响应失败: {}", id, e);
        return;
    }
    let _ = stream.flush().await;
    let _ = stream.shutdown().await;
}
