// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use mockall::mock;
use serde_json::json;
use tokio::sync::Notify;

use webrouter::{
    Context, Controller, Dependencies, Dependency, Exception, Handler, HttpRequestMethod,
    MethodRoute, Middleware, Module, Provider, Request, ResponseWriter, Route, Router,
    TransportNext,
};

mock! {
    pub Ctrl {}

    impl Controller for Ctrl {
        fn name(&self) -> String;
        fn dependencies(&self) -> Vec<Dependency>;
        fn handlers(&self, dependencies: &Dependencies) -> Vec<MethodRoute>;
    }
}

fn get(url: &str) -> Request {
    Request::new(HttpRequestMethod::Get, url)
}

/// 依赖 `db`，GET 时返回注入的连接串
fn users_controller() -> MockCtrl {
    let mut controller = MockCtrl::new();
    controller
        .expect_name()
        .return_const("UsersController".to_string());
    controller
        .expect_dependencies()
        .returning(|| vec![Dependency::required("db")]);
    controller
        .expect_handlers()
        .withf(|dependencies: &Dependencies| dependencies.contains("db"))
        .times(1)
        .returning(|dependencies: &Dependencies| {
            let db = dependencies
                .get::<String>("db")
                .map(|db| db.to_string())
                .unwrap_or_default();
            vec![MethodRoute::new(
                HttpRequestMethod::Get,
                Handler::new(move |_ctx: Context| {
                    let db = db.clone();
                    async move { Ok::<_, Exception>(db) }
                }),
            )]
        });
    controller
}

/// 名字固定、不应被展开的控制器
fn undeclared_controller() -> MockCtrl {
    let mut controller = MockCtrl::new();
    controller
        .expect_name()
        .return_const("GhostController".to_string());
    controller.expect_dependencies().returning(Vec::new);
    controller.expect_handlers().never();
    controller
}

fn greeting_route(path: &str) -> Route {
    Route::new(path)
        .dependency("greeting")
        .get(|ctx: Context| async move {
            Ok::<_, Exception>(
                ctx.dependency::<String>("greeting")
                    .map(|g| g.to_string())
                    .unwrap_or_default(),
            )
        })
}

#[tokio::test]
async fn test_controller_receives_injected_dependencies() {
    let router = Router::default();
    router
        .bootstrap(
            Module::new("AppModule")
                .declare("UsersController")
                .provider(Provider::value("db", "postgres://local".to_string()))
                .route(Route::new("users").controller(users_controller())),
        )
        .unwrap();

    let response = router.handle(get("/users")).await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.body_text(), "postgres://local");
    assert_eq!(router.module_count(), 1);
}

#[test]
fn test_undeclared_controller_rolls_back_bootstrap() {
    let router = Router::default();
    let err = router
        .bootstrap(
            Module::new("AppModule")
                .route(Route::new("health").get(|_ctx| async { Ok::<_, Exception>("ok") }))
                .route(Route::new("ghost").controller(undeclared_controller())),
        )
        .unwrap_err();

    assert_eq!(
        err,
        Exception::ControllerNotDeclared {
            controller: "GhostController".to_string(),
            module: "AppModule".to_string(),
        }
    );
    assert_eq!(router.route_count(), 0);
    assert_eq!(router.module_count(), 0);

    // 失败的挂载不占用根模块位置
    router
        .bootstrap(Module::new("AppModule").route(Route::new("health").get(|_ctx| async {
            Ok::<_, Exception>("ok")
        })))
        .unwrap();
    assert_eq!(router.route_count(), 1);
}

#[tokio::test]
async fn test_controller_declared_by_ancestor() {
    let router = Arc::new(Router::default());
    let lazy = router
        .bootstrap(
            Module::new("AppModule")
                .declare("UsersController")
                .provider(Provider::value("db", "mysql://remote".to_string()))
                .route(Route::new("v1").load_children(|| async {
                    Ok(Module::new("V1Module")
                        .route(Route::new("users").controller(users_controller())))
                })),
        )
        .unwrap();

    router.load_lazy(lazy).await.unwrap();
    let response = router.handle(get("/v1/users")).await;
    assert_eq!(response.body_text(), "mysql://remote");
}

#[tokio::test]
async fn test_lazy_module_with_undeclared_controller_is_rejected() {
    let router = Router::default();
    let lazy = router
        .bootstrap(
            Module::new("AppModule")
                .route(Route::new("ping").get(|_ctx| async { Ok::<_, Exception>("pong") }))
                .route(Route::new("ghosts").load_children(|| async {
                    Ok(Module::new("GhostModule")
                        .route(Route::new("list").get(|_ctx| async { Ok::<_, Exception>("[]") }))
                        .route(Route::new("one").controller(undeclared_controller())))
                })),
        )
        .unwrap();
    let nodes = router.module_count();

    let err = router.load_lazy(lazy).await.unwrap_err();
    assert!(matches!(err, Exception::ControllerNotDeclared { .. }));
    assert_eq!(router.module_count(), nodes);
    assert_eq!(router.handle(get("/ghosts/list")).await.status_code(), 404);
    assert_eq!(router.handle(get("/ping")).await.body_text(), "pong");
}

#[test]
fn test_missing_dependency_is_reported() {
    let router = Router::default();
    let err = router
        .bootstrap(Module::new("AppModule").route(greeting_route("hello")))
        .unwrap_err();
    assert_eq!(
        err,
        Exception::DependencyNotProvided {
            dependency: "greeting".to_string(),
            requester: "route '/hello'".to_string(),
        }
    );
    assert_eq!(router.route_count(), 0);
}

#[test]
fn test_missing_module_dependency_is_reported() {
    let router = Router::default();
    let err = router
        .bootstrap(Module::new("AppModule").dependency("logger"))
        .unwrap_err();
    assert!(matches!(
        err,
        Exception::DependencyNotProvided { ref dependency, ref requester }
            if dependency == "logger" && requester == "AppModule"
    ));
}

#[tokio::test]
async fn test_optional_dependency_may_be_absent() {
    let router = Router::default();
    router
        .bootstrap(
            Module::new("AppModule").route(
                Route::new("cache")
                    .dependency(Dependency::optional("redis"))
                    .get(|ctx: Context| async move {
                        let present = ctx.dependency::<String>("redis").is_some();
                        Ok::<_, Exception>(json!({ "redis": present }))
                    }),
            ),
        )
        .unwrap();
    let response = router.handle(get("/cache")).await;
    assert_eq!(response.body_text(), r#"{"redis":false}"#);
}

#[tokio::test]
async fn test_second_root_rejected_until_reset() {
    let router = Router::default();
    router
        .bootstrap(Module::new("AppModule").route(Route::new("a").get(|_ctx| async {
            Ok::<_, Exception>("a")
        })))
        .unwrap();

    let err = router
        .bootstrap(Module::new("OtherModule").route(Route::new("b").get(|_ctx| async {
            Ok::<_, Exception>("b")
        })))
        .unwrap_err();
    assert_eq!(err, Exception::NotRootModule);
    assert_eq!(router.route_count(), 1);

    router.reset_modules();
    assert_eq!(router.module_count(), 0);
    router
        .bootstrap(Module::new("OtherModule").route(Route::new("b").get(|_ctx| async {
            Ok::<_, Exception>("b")
        })))
        .unwrap();

    // 已提交的路由不随模块注册表重置
    assert_eq!(router.handle(get("/a")).await.body_text(), "a");
    assert_eq!(router.handle(get("/b")).await.body_text(), "b");
}

#[tokio::test]
async fn test_lazy_routes_appear_after_loading() {
    let router = Arc::new(Router::default());
    let lazy = router
        .bootstrap(Module::new("AppModule").route(Route::new("admin").load_children(|| async {
            Ok(Module::new("AdminModule")
                .route(Route::new("stats").get(|_ctx| async { Ok::<_, Exception>("stats") }))
                .route(Route::new("deep").load_children(|| async {
                    Ok(Module::new("DeepModule").route(
                        Route::new(":level").get(|ctx: Context| async move {
                            Ok::<_, Exception>(ctx.param("level").unwrap_or_default().to_string())
                        }),
                    ))
                })))
        })))
        .unwrap();
    assert_eq!(lazy.len(), 1);
    assert_eq!(lazy[0].prefix(), "/admin");

    assert_eq!(router.handle(get("/admin/stats")).await.status_code(), 404);
    assert!(matches!(
        router.resolve("/admin/stats", HttpRequestMethod::Get),
        Err(Exception::RouteNotFound { .. })
    ));

    router.spawn_lazy(lazy).await.unwrap().unwrap();
    assert_eq!(router.handle(get("/admin/stats")).await.body_text(), "stats");
    assert_eq!(router.handle(get("/admin/deep/3")).await.body_text(), "3");
    assert_eq!(router.module_count(), 3);
}

#[tokio::test]
async fn test_lazy_commit_during_request_takes_effect() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let (on_enter, on_release) = (Arc::clone(&entered), Arc::clone(&release));
    let router = Arc::new(Router::default());
    let lazy = router
        .bootstrap(
            Module::new("AppModule")
                .route(Route::new(":section").get(move |_ctx| {
                    let (on_enter, on_release) = (Arc::clone(&on_enter), Arc::clone(&on_release));
                    async move {
                        on_enter.notify_one();
                        on_release.notified().await;
                        Ok::<_, Exception>("section")
                    }
                }))
                .route(Route::new("docs").load_children(|| async {
                    Ok(Module::new("DocsModule")
                        .route(Route::new("").get(|_ctx| async { Ok::<_, Exception>("docs") })))
                })),
        )
        .unwrap();

    let in_flight = tokio::spawn({
        let router = Arc::clone(&router);
        async move { router.handle(get("/docs")).await }
    });
    entered.notified().await;
    router.load_lazy(lazy).await.unwrap();
    release.notify_one();

    assert_eq!(in_flight.await.unwrap().body_text(), "section");
    assert_eq!(router.handle(get("/docs")).await.body_text(), "docs");
    assert_eq!(router.handle(get("/docs")).await.body_text(), "docs");
    assert!(router.resolve("/docs", HttpRequestMethod::Get).unwrap().cached);
}

#[tokio::test]
async fn test_pending_lazy_load_rejected_after_reset() {
    let router = Router::default();
    let lazy = router
        .bootstrap(
            Module::new("AppModule")
                .route(Route::new("v1").load_children(|| async {
                    Ok(Module::new("V1Module")
                        .route(Route::new("ping").get(|_ctx| async { Ok::<_, Exception>("pong") })))
                })),
        )
        .unwrap();

    router.reset_modules();
    router.bootstrap(Module::new("OtherModule")).unwrap();

    let err = router.load_lazy(lazy).await.unwrap_err();
    assert!(matches!(err, Exception::LazyLoadFailed(ref m) if m.contains("/v1")));
    assert_eq!(router.module_count(), 1);
    assert_eq!(router.handle(get("/v1/ping")).await.status_code(), 404);
}

#[tokio::test]
async fn test_failed_loader_does_not_block_others() {
    let router = Router::default();
    let lazy = router
        .bootstrap(
            Module::new("AppModule")
                .route(Route::new("broken").load_children(|| async {
                    Err(Exception::CallbackError("network down".to_string()))
                }))
                .route(Route::new("fine").load_children(|| async {
                    Ok(Module::new("FineModule")
                        .route(Route::new("").get(|_ctx| async { Ok::<_, Exception>("fine") })))
                })),
        )
        .unwrap();

    let err = router.load_lazy(lazy).await.unwrap_err();
    assert!(matches!(err, Exception::LazyLoadFailed(ref m) if m.contains("network down")));
    assert_eq!(router.handle(get("/fine")).await.body_text(), "fine");
    assert_eq!(router.handle(get("/broken")).await.status_code(), 404);
}

#[tokio::test]
async fn test_import_override_providers() {
    let shared = || {
        Module::new("GreetingModule")
            .provider(Provider::value("greeting", "hello".to_string()))
            .route(greeting_route("greet"))
    };
    let router = Arc::new(Router::default());
    let lazy = router
        .bootstrap(
            Module::new("AppModule")
                .import(shared())
                .route(Route::new("fr").load_children(move || async move {
                    Ok(Module::new("FrenchModule").import_with_providers(
                        shared(),
                        vec![Provider::value("greeting", "bonjour".to_string())],
                    ))
                })),
        )
        .unwrap();
    router.load_lazy(lazy).await.unwrap();

    // 导入的模块与导入方共用前缀
    assert_eq!(router.handle(get("/greet")).await.body_text(), "hello");
    assert_eq!(router.handle(get("/fr/greet")).await.body_text(), "bonjour");
}

#[tokio::test]
async fn test_provider_instance_is_shared_within_module() {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&created);
    let router = Router::default();
    router
        .bootstrap(
            Module::new("AppModule")
                .provider(Provider::new("pool", move || counter.fetch_add(1, Ordering::SeqCst)))
                .route(
                    Route::new("one")
                        .dependency("pool")
                        .get(|_ctx| async { Ok::<_, Exception>("1") }),
                )
                .route(
                    Route::new("two")
                        .dependency("pool")
                        .get(|_ctx| async { Ok::<_, Exception>("2") }),
                ),
        )
        .unwrap();

    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(router.handle(get("/two")).await.body_text(), "2");
}

#[tokio::test]
async fn test_children_do_not_inherit_parent_middlewares() {
    let tag = |value: &'static str| {
        Middleware::transport(
            move |_req, res: ResponseWriter, next: TransportNext, _error| async move {
                res.write_header("X-Route", value);
                next.run().await;
            },
        )
    };
    let router = Router::default();
    router
        .add(&[Route::new("parent")
            .middleware(tag("parent"))
            .get(|_ctx| async { Ok::<_, Exception>("parent") })
            .children(vec![Route::new("child").get(|_ctx| async {
                Ok::<_, Exception>("child")
            })])])
        .unwrap();

    let parent = router.handle(get("/parent")).await;
    assert_eq!(parent.header("X-Route"), Some("parent"));
    let child = router.handle(get("/parent/child")).await;
    assert_eq!(child.body_text(), "child");
    assert_eq!(child.header("X-Route"), None);
}
