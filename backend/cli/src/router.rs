//! In-memory route table handed to plugins as the shared router.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub method: String,
    pub path: String,
    /// Plugin that registered the route
    pub owner: String,
}

#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Mutex<Vec<Route>>,
    middlewares: Mutex<Vec<String>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, method: &str, path: &str, owner: &str) {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Route {
                method: method.to_uppercase(),
                path: path.to_string(),
                owner: owner.to_string(),
            });
    }

    pub fn middleware(&self, name: impl Into<String>) {
        self.middlewares
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name.into());
    }

    /// Routes in registration order.
    pub fn routes(&self) -> Vec<Route> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn middlewares(&self) -> Vec<String> {
        self.middlewares
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_keep_registration_order() {
        let table = RouteTable::new();
        table.route("get", "/users", "users");
        table.route("post", "/users", "users");
        table.middleware("request-id");

        let routes = table.routes();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].method, "GET");
        assert_eq!(routes[1].method, "POST");
        assert_eq!(table.middlewares(), vec!["request-id"]);
    }
}
