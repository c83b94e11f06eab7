// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 路由服务器
//!
//! 加载配置与日志，组装示例应用的模块树和路由，启动 TCP 服务。
//! 核心功能包括：
//! - 静态路由与参数路由，带访问缓存
//! - 全局中间件与路由中间件
//! - 懒加载子模块与依赖注入
//! - 后台管理控制台（CLI 指令交互）

use std::{
    net::{Ipv4Addr, SocketAddrV4},
    sync::Arc,
};

use log::{debug, error, info};
use serde_json::json;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::TcpListener,
    runtime::Builder,
};

use webrouter::{
    server, Config, Context, Controller, Dependencies, Dependency, Exception, Handler,
    HttpRequestMethod, MethodRoute, Middleware, Module, Next, Provider, Route, Router,
    ServerState,
};

/// 示例控制器：后台统计信息
struct StatsController;

impl Controller for StatsController {
    fn name(&self) -> String {
        "StatsController".to_string()
    }

    fn dependencies(&self) -> Vec<Dependency> {
        vec![Dependency::required("started_at")]
    }

    fn handlers(&self, dependencies: &Dependencies) -> Vec<MethodRoute> {
        let started_at = dependencies
            .get::<String>("started_at")
            .map(|s| s.to_string())
            .unwrap_or_default();
        vec![MethodRoute::new(
            HttpRequestMethod::Get,
            Handler::new(move |ctx: Context| {
                let started_at = started_at.clone();
                async move {
                    Ok::<_, Exception>(json!({
                        "started_at": started_at,
                        "request": ctx.id().to_string(),
                    }))
                }
            }),
        )]
    }
}

fn admin_module() -> Module {
    Module::new("AdminModule")
        .declare("StatsController")
        .route(Route::new("stats").controller(StatsController))
        .route(Route::new("echo").post(|ctx: Context| async move {
            Ok::<_, Exception>(json!({ "body": format!("{:?}", ctx.body) }))
        }))
}

fn app_module() -> Module {
    let started_at = chrono::Utc::now().to_rfc3339();
    Module::new("AppModule")
        .provider(Provider::value("started_at", started_at))
        .route(Route::new("").get(|_ctx| async {
            Ok::<_, Exception>(json!({ "message": "webrouter is running" }))
        }))
        .route(
            Route::new("users").children(vec![
                Route::new("").get(|ctx: Context| async move {
                    Ok::<_, Exception>(json!({ "users": [], "query": ctx.query }))
                }),
                Route::new(":id").get(|ctx: Context| async move {
                    Ok::<_, Exception>(json!({ "id": ctx.param("id") }))
                }),
            ]),
        )
        .route(Route::new("admin").load_children(|| async { Ok(admin_module()) }))
}

fn request_logger() -> Middleware {
    Middleware::context(|ctx: Context, next: Next| async move {
        debug!("[ID{}]进入中间件链：{} {}", ctx.id(), ctx.method, ctx.request.url());
        next.run(ctx).await;
    })
}

/// # 程序入口点
///
/// 初始化日志与配置，构建运行时后进入主事件循环。
fn main() {
    // 1. 初始化日志系统
    if let Err(e) = log4rs::init_file("config/log4rs.yaml", Default::default()) {
        panic!("无法初始化日志系统：{}", e);
    }

    // 2. 环境配置加载
    let config = Config::from_toml("config/development.toml");
    info!("配置文件已载入");

    // 3. 根据配置文件分配工作线程数
    let runtime = match Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
    {
        Ok(r) => r,
        Err(e) => {
            error!("无法构建异步运行时：{}", e);
            panic!("无法构建异步运行时：{}", e);
        }
    };

    runtime.block_on(run(config));
}

async fn run(config: Config) {
    // 4. 组装路由
    let mut router = Router::new(&config);
    router.use_middleware(request_logger());
    let router = Arc::new(router);
    let lazy = match router.bootstrap(app_module()) {
        Ok(lazy) => lazy,
        Err(e) => {
            error!("根模块挂载失败：{}", e);
            panic!("根模块挂载失败：{}", e);
        }
    };
    info!("已注册 {} 条路由", router.route_count());
    router.spawn_lazy(lazy);

    // 5. 网络层初始化
    let port = config.port();
    let address = match config.local() {
        true => Ipv4Addr::new(127, 0, 0, 1),
        false => Ipv4Addr::new(0, 0, 0, 0),
    };
    info!("服务端将在{}:{}上监听Socket连接", address, port);
    let listener = match TcpListener::bind(SocketAddrV4::new(address, port)).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("无法绑定端口：{}，错误：{}", port, e);
            panic!("无法绑定端口：{}，错误：{}", port, e);
        }
    };
    info!("端口{}绑定完成", port);

    // 6. 启动交互式管理控制台
    let state = Arc::new(ServerState::new());
    tokio::spawn(console(Arc::clone(&state), Arc::clone(&router)));

    // 7. 主事件循环
    server::serve(listener, router, state, config.max_request_size()).await;
}

async fn console(state: Arc<ServerState>, router: Arc<Router>) {
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut input = String::new();
    loop {
        input.clear();
        match reader.read_line(&mut input).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let cmd = input.trim();
        match cmd {
            "stop" => {
                state.stop();
                println!("停机指令已激活，服务器将在处理完下一个请求后关闭...");
                break;
            }
            "help" => {
                println!("== Webrouter Help ==");
                println!("stop   - 发出停机信号");
                println!("status - 查看当前服务器运行状态");
                println!("routes - 列出已注册的路由");
                println!("help   - 显示此帮助信息");
                println!("====================");
            }
            "status" => {
                println!("== Webrouter 状态 ===");
                println!("当前活跃连接数: {}", state.active_connection());
                println!("已注册路由数: {}", router.route_count());
                println!("访问缓存条目数: {}", router.visited_count());
                println!("模块节点数: {}", router.module_count());
                println!("====================");
            }
            "routes" => {
                for (path, method) in router.routes() {
                    println!("{:<8}{}", method.as_str(), path);
                }
            }
            "" => {}
            _ => {
                println!("无效的命令：{}", cmd);
            }
        }
    }
}
