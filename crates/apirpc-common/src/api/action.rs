use crate::protocol::error::Result;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, RwLock};

/// Boxed future returned by an action handler
pub type ActionFuture = BoxFuture<'static, Result<Value>>;

/// Type-erased action handler
pub type ActionFn = dyn Fn(ActionContext, Value) -> ActionFuture + Send + Sync;

/// Per-call context handed to an action handler.
#[derive(Debug, Clone)]
pub struct ActionContext {
    /// Name of the host that owns the action
    pub host: String,
    /// Action being invoked
    pub action: String,
    /// Caller flag byte from the request message
    pub flag: u8,
}

/// A named, callable action.
pub struct ApiAction {
    name: String,
    handler: Arc<ActionFn>,
}

impl ApiAction {
    /// Wraps an async closure as an action.
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ActionContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let handler: Arc<ActionFn> = Arc::new(move |ctx, args| Box::pin(handler(ctx, args)));
        Self {
            name: name.into(),
            handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the handler.
    pub fn call(&self, ctx: ActionContext, args: Value) -> ActionFuture {
        (self.handler)(ctx, args)
    }
}

impl fmt::Debug for ApiAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiAction").field("name", &self.name).finish()
    }
}

/// Lookup table from action names to handlers.
///
/// Names follow the `Controller/Method` convention and are matched
/// case-insensitively. Registering a name twice replaces the earlier
/// handler.
///
/// # Example
///
/// ```
/// use apirpc_common::api::ActionRegistry;
/// use serde_json::{json, Value};
///
/// let registry = ActionRegistry::new();
/// registry.register("Math/Double", |_ctx, args: Value| async move {
///     Ok(json!(args.as_i64().unwrap_or(0) * 2))
/// });
///
/// assert!(registry.find("math/double").is_some());
/// assert!(registry.find("Math/Triple").is_none());
/// ```
#[derive(Default)]
pub struct ActionRegistry {
    actions: RwLock<HashMap<String, Arc<ApiAction>>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an async closure under `name`.
    pub fn register<F, Fut>(&self, name: impl Into<String>, handler: F) -> Arc<ApiAction>
    where
        F: Fn(ActionContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.insert(ApiAction::new(name, handler))
    }

    /// Registers a prepared action.
    pub fn insert(&self, action: ApiAction) -> Arc<ApiAction> {
        let action = Arc::new(action);
        let mut actions = self.actions.write().unwrap_or_else(|e| e.into_inner());
        actions.insert(action.name.to_lowercase(), action.clone());
        action
    }

    /// Resolves an action by name.
    pub fn find(&self, name: &str) -> Option<Arc<ApiAction>> {
        let actions = self.actions.read().unwrap_or_else(|e| e.into_inner());
        actions.get(&name.to_lowercase()).cloned()
    }

    /// All registered action names, sorted.
    pub fn names(&self) -> Vec<String> {
        let actions = self.actions.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = actions.values().map(|a| a.name.clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.actions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An action bound to the host that runs it.
#[derive(Debug, Clone)]
pub struct Controller {
    host: String,
    action: Arc<ApiAction>,
}

impl Controller {
    pub fn new(host: impl Into<String>, action: Arc<ApiAction>) -> Self {
        Self {
            host: host.into(),
            action,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn action(&self) -> &ApiAction {
        &self.action
    }

    /// Invokes the bound action.
    pub async fn invoke(&self, args: Value, flag: u8) -> Result<Value> {
        let ctx = ActionContext {
            host: self.host.clone(),
            action: self.action.name.clone(),
            flag,
        };
        self.action.call(ctx, args).await
    }
}
