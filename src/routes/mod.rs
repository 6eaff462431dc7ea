use crate::registry::{ControllerRegistry, HandlerBindings};

pub mod auth;
pub mod employees;
pub mod health;
pub mod leave;
pub mod roles;
pub mod users;

/// Enumerate every controller at process start. This is the single place
/// where routes and authorization rules enter the registry; the compiler
/// rejects anything half-wired before the server binds.
pub fn register_all(registry: &mut ControllerRegistry, bindings: &mut HandlerBindings) {
    health::register(registry, bindings);
    auth::register(registry, bindings);
    employees::register(registry, bindings);
    leave::register(registry, bindings);
    roles::register(registry, bindings);
    users::register(registry, bindings);
}
