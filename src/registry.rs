//! Declarative route registration.
//!
//! Controllers announce their base path, routes, class-level access
//! requirement and per-handler overrides as plain data; none of them touch
//! dispatch or permission logic. The compiler turns the registry into an
//! axum router plus a read-only dispatch table in one pass at startup and
//! fails fast on configuration mistakes — a half-wired authorization table
//! is a security defect, not a recoverable condition.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::handler::Handler;
use axum::http::Method;
use axum::routing::{on, MethodFilter, MethodRouter};
use axum::Router;

use crate::app::AppState;
use crate::authz::AccessRequirement;

/// Closed set of dispatchable methods; anything else is rejected when the
/// route is declared, not when a request arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub fn from_method(method: &Method) -> Option<Self> {
        match *method {
            Method::GET => Some(HttpMethod::Get),
            Method::POST => Some(HttpMethod::Post),
            Method::PUT => Some(HttpMethod::Put),
            Method::PATCH => Some(HttpMethod::Patch),
            Method::DELETE => Some(HttpMethod::Delete),
            _ => None,
        }
    }

    fn filter(self) -> MethodFilter {
        match self {
            HttpMethod::Get => MethodFilter::GET,
            HttpMethod::Post => MethodFilter::POST,
            HttpMethod::Put => MethodFilter::PUT,
            HttpMethod::Patch => MethodFilter::PATCH,
            HttpMethod::Delete => MethodFilter::DELETE,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dispatchable endpoint, immutable once registered.
#[derive(Debug, Clone)]
pub struct RouteDescriptor {
    pub method: HttpMethod,
    pub path: &'static str,
    pub handler_id: &'static str,
}

/// Controller-level facts plus the routes and overrides declared on it.
#[derive(Debug)]
pub struct ControllerDef {
    base_path: &'static str,
    access: AccessRequirement,
    routes: Vec<RouteDescriptor>,
    overrides: Vec<(&'static str, AccessRequirement)>,
}

impl ControllerDef {
    /// Append a route; registration order is preserved through compilation.
    pub fn route(&mut self, method: HttpMethod, path: &'static str, handler_id: &'static str) -> &mut Self {
        self.routes.push(RouteDescriptor {
            method,
            path,
            handler_id,
        });
        self
    }

    /// Override the class-level requirement for one handler. Several
    /// declarations for the same handler combine their permission lists;
    /// holding rights to any one of them satisfies the route.
    pub fn authorize(&mut self, handler_id: &'static str, requirement: AccessRequirement) -> &mut Self {
        self.overrides.push((handler_id, requirement));
        self
    }

    /// Handler override if declared, else the controller's class-level
    /// requirement.
    fn effective_requirement(&self, handler_id: &str) -> AccessRequirement {
        let mut combined = Vec::new();
        let mut authenticated = false;
        for (id, requirement) in &self.overrides {
            if *id != handler_id {
                continue;
            }
            match requirement {
                AccessRequirement::Public => return AccessRequirement::Public,
                AccessRequirement::Authenticated => authenticated = true,
                AccessRequirement::Permissions(entries) => combined.extend(entries.iter().cloned()),
            }
        }

        if !combined.is_empty() {
            AccessRequirement::Permissions(combined)
        } else if authenticated {
            AccessRequirement::Authenticated
        } else {
            self.access.clone()
        }
    }
}

/// Collects controller declarations at process start. Purely additive and
/// in-memory; the compiler consumes it once after all registrations are in.
#[derive(Debug, Default)]
pub struct ControllerRegistry {
    controllers: Vec<ControllerDef>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record controller-level facts once; route and authorization
    /// declarations hang off the returned definition.
    pub fn controller(&mut self, base_path: &'static str, access: AccessRequirement) -> &mut ControllerDef {
        self.controllers.push(ControllerDef {
            base_path,
            access,
            routes: Vec::new(),
            overrides: Vec::new(),
        });
        self.controllers.last_mut().expect("just pushed")
    }
}

type BoundHandler = Box<dyn FnOnce(MethodFilter) -> MethodRouter<AppState> + Send>;

/// Maps handler ids to their implementations. A route whose id has no
/// binding, or a binding no route references, fails compilation.
#[derive(Default)]
pub struct HandlerBindings {
    handlers: HashMap<&'static str, BoundHandler>,
    duplicates: Vec<&'static str>,
}

impl HandlerBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind<H, T>(&mut self, handler_id: &'static str, handler: H) -> &mut Self
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        let bound: BoundHandler = Box::new(move |filter| on(filter, handler));
        if self.handlers.insert(handler_id, bound).is_some() {
            self.duplicates.push(handler_id);
        }
        self
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("route {method} {path} declared twice on controller {base_path}")]
    DuplicateRoute {
        base_path: &'static str,
        method: HttpMethod,
        path: &'static str,
    },
    #[error("route {method} {path} mounted twice across controllers")]
    DuplicateMount { method: HttpMethod, path: String },
    #[error("handler '{0}' has no bound implementation")]
    UnboundHandler(&'static str),
    #[error("handler '{0}' bound more than once")]
    DuplicateBinding(&'static str),
    #[error("binding '{0}' is not referenced by any route")]
    UnusedBinding(&'static str),
    #[error("authorization rule on controller {base_path} references unknown handler '{handler_id}'")]
    UnknownAuthorizationTarget {
        base_path: &'static str,
        handler_id: &'static str,
    },
}

/// The compiled dispatch table: effective requirement per mounted route,
/// keyed by method and route pattern. Built once, never mutated, shared
/// read-only across requests.
pub type RouteTable = HashMap<(HttpMethod, String), AccessRequirement>;

/// Materialize the registry into a mountable router plus the dispatch
/// table consulted by the request pipeline.
pub fn compile(
    registry: ControllerRegistry,
    bindings: HandlerBindings,
) -> Result<(Router<AppState>, Arc<RouteTable>), ConfigError> {
    if let Some(id) = bindings.duplicates.first() {
        return Err(ConfigError::DuplicateBinding(*id));
    }
    let mut handlers = bindings.handlers;

    let mut router = Router::new();
    let mut table = RouteTable::new();

    for controller in &registry.controllers {
        for (handler_id, _) in &controller.overrides {
            if !controller.routes.iter().any(|route| route.handler_id == *handler_id) {
                return Err(ConfigError::UnknownAuthorizationTarget {
                    base_path: controller.base_path,
                    handler_id: *handler_id,
                });
            }
        }

        let mut declared: HashSet<(HttpMethod, &str)> = HashSet::new();
        for route in &controller.routes {
            if !declared.insert((route.method, route.path)) {
                return Err(ConfigError::DuplicateRoute {
                    base_path: controller.base_path,
                    method: route.method,
                    path: route.path,
                });
            }

            let full_path = join_paths(controller.base_path, route.path);
            if table.contains_key(&(route.method, full_path.clone())) {
                return Err(ConfigError::DuplicateMount {
                    method: route.method,
                    path: full_path,
                });
            }

            let bound = handlers
                .remove(route.handler_id)
                .ok_or(ConfigError::UnboundHandler(route.handler_id))?;

            tracing::debug!(
                method = route.method.as_str(),
                path = %full_path,
                handler = route.handler_id,
                "route mounted"
            );

            router = router.route(&full_path, bound(route.method.filter()));
            table.insert(
                (route.method, full_path),
                controller.effective_requirement(route.handler_id),
            );
        }
    }

    if let Some(id) = handlers.keys().next() {
        return Err(ConfigError::UnusedBinding(*id));
    }

    Ok((router, Arc::new(table)))
}

fn join_paths(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        if base.is_empty() {
            "/".to_string()
        } else {
            base.to_string()
        }
    } else {
        format!("{base}/{path}")
    }
}
