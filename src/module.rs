// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 模块树与依赖注入
//!
//! `Module` 是声明式的描述：控制器声明、导入的子模块、provider 和路由。
//! 映射时每个模块被登记为 `ModuleRegistry` 中的一个节点，节点之间只通过
//! `ModuleId` 下标引用父节点。
//!
//! 依赖解析先查找当前节点的 provider，再沿父链向上查找。
//! provider 实例在其所属节点内是单例，首次解析时创建。

use std::{any::Any, collections::HashMap, fmt, sync::Arc};

use log::{debug, info, warn};

use crate::{exception::Exception, route::Route};

/// 注入的依赖实例
pub type Instance = Arc<dyn Any + Send + Sync>;

pub type Factory = Arc<dyn Fn() -> Instance + Send + Sync>;

pub type ModuleId = usize;

#[derive(Clone)]
pub struct Provider {
    name: String,
    factory: Factory,
}

impl Provider {
    pub fn new<T, F>(name: &str, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            factory: Arc::new(move || Arc::new(factory()) as Instance),
        }
    }

    /// 以固定值作为 provider，每个节点第一次解析时克隆一份
    pub fn value<T>(name: &str, value: T) -> Self
    where
        T: Any + Send + Sync + Clone,
    {
        Self::new(name, move || value.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn create(&self) -> Instance {
        (self.factory)()
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider").field("name", &self.name).finish()
    }
}

/// 对某个 provider 的依赖声明
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    name: String,
    optional: bool,
}

impl Dependency {
    pub fn required(name: &str) -> Self {
        Self {
            name: name.to_string(),
            optional: false,
        }
    }

    /// 找不到 provider 时解析为空，而不是报错
    pub fn optional(name: &str) -> Self {
        Self {
            name: name.to_string(),
            optional: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }
}

impl From<&str> for Dependency {
    fn from(name: &str) -> Self {
        Dependency::required(name)
    }
}

/// 已解析的依赖实例表，按名称索引
#[derive(Clone, Default)]
pub struct Dependencies(HashMap<String, Instance>);

impl Dependencies {
    /// 取出依赖并向下转型，类型不符时返回 `None`
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.0
            .get(name)
            .and_then(|instance| Arc::clone(instance).downcast::<T>().ok())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.0.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }

    fn insert(&mut self, name: &str, instance: Instance) {
        self.0.insert(name.to_string(), instance);
    }

    pub(crate) fn extend(&mut self, other: &Dependencies) {
        for (name, instance) in &other.0 {
            self.0.insert(name.clone(), Arc::clone(instance));
        }
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

/// 导入的子模块，`providers` 会覆盖子模块自身的同名 provider
#[derive(Debug, Clone)]
pub struct ModuleImport {
    pub(crate) module: Module,
    pub(crate) providers: Vec<Provider>,
}

#[derive(Clone)]
pub struct Module {
    pub(crate) name: String,
    pub(crate) declarations: Vec<String>,
    pub(crate) imports: Vec<ModuleImport>,
    pub(crate) providers: Vec<Provider>,
    pub(crate) dependencies: Vec<Dependency>,
    pub(crate) routes: Vec<Route>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            declarations: vec![],
            imports: vec![],
            providers: vec![],
            dependencies: vec![],
            routes: vec![],
        }
    }

    /// 声明本模块拥有的控制器，按 `Controller::name` 匹配
    pub fn declare(mut self, controller: &str) -> Self {
        self.declarations.push(controller.to_string());
        self
    }

    pub fn import(self, module: Module) -> Self {
        self.import_with_providers(module, vec![])
    }

    pub fn import_with_providers(mut self, module: Module, providers: Vec<Provider>) -> Self {
        self.imports.push(ModuleImport { module, providers });
        self
    }

    pub fn provider(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn dependency(mut self, dependency: impl Into<Dependency>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn routes(mut self, routes: Vec<Route>) -> Self {
        self.routes.extend(routes);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("declarations", &self.declarations)
            .field("imports", &self.imports)
            .field("providers", &self.providers)
            .field("dependencies", &self.dependencies)
            .field("routes", &self.routes.len())
            .finish()
    }
}

/// 模块在注册表中的节点
#[derive(Debug)]
pub struct ModuleNode {
    id: ModuleId,
    name: String,
    prefix: String,
    declarations: Vec<String>,
    providers: Vec<Provider>,
    dependencies: Dependencies,
    parent: Option<ModuleId>,
    instances: HashMap<String, Instance>,
}

impl ModuleNode {
    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn parent(&self) -> Option<ModuleId> {
        self.parent
    }

    /// 模块自身声明的依赖，在挂载时解析
    pub fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }
}

/// 模块树。根模块只能登记一次，`reset` 用于测试之间的隔离。
///
/// `epoch` 在每次重置时递增，重置前发出的 `ModuleId` 在新纪元中不再有效。
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    nodes: Vec<ModuleNode>,
    root: Option<ModuleId>,
    epoch: u64,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        info!("重置模块注册表，丢弃 {} 个节点", self.nodes.len());
        self.nodes.clear();
        self.root = None;
        self.epoch += 1;
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn root(&self) -> Option<ModuleId> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: ModuleId) -> Option<&ModuleNode> {
        self.nodes.get(id)
    }

    pub fn register_root(&mut self, module: &Module, prefix: &str) -> Result<ModuleId, Exception> {
        if self.root.is_some() {
            return Err(Exception::NotRootModule);
        }
        let id = self.attach(module, prefix, None, vec![]);
        self.root = Some(id);
        Ok(id)
    }

    /// 登记一个模块节点。`overrides` 排在模块自身的 provider 之前，因此优先命中。
    pub fn attach(
        &mut self,
        module: &Module,
        prefix: &str,
        parent: Option<ModuleId>,
        overrides: Vec<Provider>,
    ) -> ModuleId {
        let id = self.nodes.len();
        let mut providers = overrides;
        providers.extend(module.providers.iter().cloned());
        debug!(
            "登记模块 {} (#{})，前缀 '{}'，父节点 {:?}",
            module.name, id, prefix, parent
        );
        self.nodes.push(ModuleNode {
            id,
            name: module.name.clone(),
            prefix: prefix.to_string(),
            declarations: module.declarations.clone(),
            providers,
            dependencies: Dependencies::default(),
            parent,
            instances: HashMap::new(),
        });
        id
    }

    /// 丢弃 `len` 之后登记的节点，用于撤销一次失败的注册
    pub fn truncate(&mut self, len: usize) {
        if len < self.nodes.len() {
            warn!("撤销 {} 个模块节点", self.nodes.len() - len);
        }
        self.nodes.truncate(len);
        if self.root.is_some_and(|root| root >= len) {
            self.root = None;
        }
    }

    pub(crate) fn set_dependencies(&mut self, id: ModuleId, dependencies: Dependencies) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.dependencies.extend(&dependencies);
        }
    }

    /// 控制器是否被该节点或其任一祖先声明
    pub fn is_declared(&self, id: ModuleId, controller: &str) -> bool {
        self.ancestry(id)
            .any(|node| node.declarations.iter().any(|d| d == controller))
    }

    fn ancestry(&self, id: ModuleId) -> impl Iterator<Item = &ModuleNode> {
        std::iter::successors(self.nodes.get(id), |node| {
            node.parent.and_then(|p| self.nodes.get(p))
        })
    }

    /// 解析单个依赖：先查当前节点，再沿父链向上
    pub fn resolve(
        &mut self,
        id: Option<ModuleId>,
        dependency: &Dependency,
        requester: &str,
    ) -> Result<Option<Instance>, Exception> {
        let mut current = id;
        while let Some(node_id) = current {
            let Some(node) = self.nodes.get_mut(node_id) else {
                break;
            };
            if let Some(instance) = node.instances.get(dependency.name()) {
                return Ok(Some(Arc::clone(instance)));
            }
            if let Some(provider) = node.providers.iter().find(|p| p.name() == dependency.name()) {
                let instance = provider.create();
                debug!("模块 {} 创建依赖实例 {}", node.name, dependency.name());
                node.instances
                    .insert(dependency.name().to_string(), Arc::clone(&instance));
                return Ok(Some(instance));
            }
            current = node.parent;
        }

        if dependency.is_optional() {
            debug!("可选依赖 {} 未提供，跳过", dependency.name());
            return Ok(None);
        }
        Err(Exception::DependencyNotProvided {
            dependency: dependency.name().to_string(),
            requester: requester.to_string(),
        })
    }

    pub fn resolve_all(
        &mut self,
        id: Option<ModuleId>,
        dependencies: &[Dependency],
        requester: &str,
    ) -> Result<Dependencies, Exception> {
        let mut resolved = Dependencies::default();
        for dependency in dependencies {
            if let Some(instance) = self.resolve(id, dependency, requester)? {
                resolved.insert(dependency.name(), instance);
            }
        }
        Ok(resolved)
    }
}
