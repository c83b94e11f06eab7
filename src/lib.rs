pub mod body;
pub mod cache;
pub mod config;
pub mod context;
pub mod exception;
pub mod mapper;
pub mod middleware;
pub mod module;
pub mod param;
pub mod pattern;
pub mod request;
pub mod response;
pub mod route;
pub mod router;
pub mod server;
pub mod table;

pub use body::Body;
pub use cache::{VisitedCache, VisitedEntry};
pub use config::Config;
pub use context::Context;
pub use exception::Exception;
pub use mapper::LazyLoad;
pub use middleware::{Middleware, MiddlewareError, Next, TransportNext};
pub use module::{Dependencies, Dependency, Module, ModuleRegistry, Provider};
pub use param::{HttpEncoding, HttpRequestMethod, HttpVersion};
pub use pattern::{Params, PathPattern};
pub use request::Request;
pub use response::{Reply, Response, ResponseWriter};
pub use route::{Controller, Handler, MethodRoute, Route};
pub use router::Router;
pub use server::ServerState;
pub use table::{Resolved, RouteEntry, RouteTable};
