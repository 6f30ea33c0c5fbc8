//! Registered service table.
//!
//! # Responsibilities
//! - Collect named services and their methods before the listener starts
//! - Freeze into an immutable table shared by every connection
//! - Resolve `/package.Service/Method` paths to a handler
//!
//! # Design Decisions
//! - Registration happens on a builder; `build()` consumes it, so nothing
//!   can be appended once the table is serving
//! - Ordered maps keep the startup service listing deterministic

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::rpc::engine::RpcHandler;

/// Error raised while registering services.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("service {0:?} is already registered")]
    DuplicateService(String),
    #[error("invalid service name {0:?}")]
    InvalidServiceName(String),
    #[error("invalid method name {method:?} on service {service:?}")]
    InvalidMethodName { service: String, method: String },
    #[error("method {method:?} declared twice on service {service:?}")]
    DuplicateMethod { service: String, method: String },
    #[error("service {0:?} declares no methods")]
    NoMethods(String),
}

/// Name and methods of a service, e.g. `grpc.health.v1.Health` / `Check`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    name: String,
    methods: Vec<String>,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// Declare a method on the service.
    pub fn method(mut self, name: impl Into<String>) -> Self {
        self.methods.push(name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &[String] {
        &self.methods
    }
}

fn is_valid_segment(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

struct RegisteredService {
    methods: BTreeSet<String>,
    handler: Arc<dyn RpcHandler>,
}

impl fmt::Debug for RegisteredService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredService")
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}

/// Accumulates services until [`build`](Self::build) freezes them.
#[derive(Debug, Default)]
pub struct ServiceRegistryBuilder {
    services: BTreeMap<String, RegisteredService>,
}

impl ServiceRegistryBuilder {
    /// Register a service and the handler that implements all its methods.
    pub fn register<H>(
        &mut self,
        descriptor: ServiceDescriptor,
        handler: H,
    ) -> Result<&mut Self, RegistryError>
    where
        H: RpcHandler,
    {
        let ServiceDescriptor { name, methods } = descriptor;

        if !is_valid_segment(&name) || name.starts_with('.') || name.ends_with('.') {
            return Err(RegistryError::InvalidServiceName(name));
        }
        if self.services.contains_key(&name) {
            return Err(RegistryError::DuplicateService(name));
        }
        if methods.is_empty() {
            return Err(RegistryError::NoMethods(name));
        }

        let mut set = BTreeSet::new();
        for method in methods {
            if !is_valid_segment(&method) || method.contains('.') {
                return Err(RegistryError::InvalidMethodName {
                    service: name,
                    method,
                });
            }
            if set.contains(&method) {
                return Err(RegistryError::DuplicateMethod {
                    service: name,
                    method,
                });
            }
            set.insert(method);
        }

        self.services.insert(
            name,
            RegisteredService {
                methods: set,
                handler: Arc::new(handler),
            },
        );
        Ok(self)
    }

    /// Close registration.
    pub fn build(self) -> ServiceRegistry {
        ServiceRegistry {
            services: self.services,
        }
    }
}

/// The frozen service table.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: BTreeMap<String, RegisteredService>,
}

/// A resolved call target.
#[derive(Clone)]
pub struct MethodTarget {
    pub service: String,
    pub method: String,
    pub handler: Arc<dyn RpcHandler>,
}

impl fmt::Debug for MethodTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTarget")
            .field("service", &self.service)
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// Why a path did not resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unresolved {
    /// Not of the form `/service/method`.
    MalformedPath,
    UnknownService(String),
    UnknownMethod { service: String, method: String },
}

impl fmt::Display for Unresolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unresolved::MalformedPath => f.write_str("malformed method path"),
            Unresolved::UnknownService(service) => write!(f, "unknown service {service}"),
            Unresolved::UnknownMethod { service, method } => {
                write!(f, "unknown method {method} for service {service}")
            }
        }
    }
}

impl ServiceRegistry {
    pub fn builder() -> ServiceRegistryBuilder {
        ServiceRegistryBuilder::default()
    }

    /// Resolve a request path of the form `/package.Service/Method`.
    pub fn resolve(&self, path: &str) -> Result<MethodTarget, Unresolved> {
        let (service, method) = path
            .strip_prefix('/')
            .and_then(|p| p.split_once('/'))
            .filter(|(s, m)| !s.is_empty() && !m.is_empty() && !m.contains('/'))
            .ok_or(Unresolved::MalformedPath)?;

        let registered = self
            .services
            .get(service)
            .ok_or_else(|| Unresolved::UnknownService(service.to_string()))?;
        if !registered.methods.contains(method) {
            return Err(Unresolved::UnknownMethod {
                service: service.to_string(),
                method: method.to_string(),
            });
        }

        Ok(MethodTarget {
            service: service.to_string(),
            method: method.to_string(),
            handler: Arc::clone(&registered.handler),
        })
    }

    /// Every registered service with its methods, ordered by name.
    pub fn service_info(&self) -> Vec<ServiceDescriptor> {
        self.services
            .iter()
            .map(|(name, s)| ServiceDescriptor {
                name: name.clone(),
                methods: s.methods.iter().cloned().collect(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::engine::RpcCall;
    use crate::rpc::status::RpcStatus;
    use axum::body::Body;
    use axum::response::Response;
    use futures_util::future::BoxFuture;

    struct Noop;

    impl RpcHandler for Noop {
        fn call(&self, _call: RpcCall, _body: Body) -> BoxFuture<'static, Result<Response, RpcStatus>> {
            Box::pin(async { Ok(Response::new(Body::empty())) })
        }
    }

    fn greeter() -> ServiceDescriptor {
        ServiceDescriptor::new("helloworld.Greeter")
            .method("SayHello")
            .method("SayHelloStream")
    }

    #[test]
    fn resolves_registered_methods() {
        let mut builder = ServiceRegistry::builder();
        builder.register(greeter(), Noop).unwrap();
        let registry = builder.build();

        let target = registry.resolve("/helloworld.Greeter/SayHello").unwrap();
        assert_eq!(target.service, "helloworld.Greeter");
        assert_eq!(target.method, "SayHello");

        assert_eq!(
            registry.resolve("/helloworld.Greeter/Missing").unwrap_err(),
            Unresolved::UnknownMethod {
                service: "helloworld.Greeter".into(),
                method: "Missing".into()
            }
        );
        assert_eq!(
            registry.resolve("/pkg.Other/SayHello").unwrap_err(),
            Unresolved::UnknownService("pkg.Other".into())
        );
        for path in ["/", "/ws", "/helloworld.Greeter/", "//SayHello", "/a/b/c", "index.html"] {
            assert_eq!(registry.resolve(path).unwrap_err(), Unresolved::MalformedPath, "{path}");
        }
    }

    #[test]
    fn rejects_bad_registrations() {
        let mut builder = ServiceRegistry::builder();
        builder.register(greeter(), Noop).unwrap();

        assert_eq!(
            builder.register(greeter(), Noop).unwrap_err(),
            RegistryError::DuplicateService("helloworld.Greeter".into())
        );
        assert!(matches!(
            builder.register(ServiceDescriptor::new("bad/name").method("M"), Noop),
            Err(RegistryError::InvalidServiceName(_))
        ));
        assert!(matches!(
            builder.register(ServiceDescriptor::new("pkg.Empty"), Noop),
            Err(RegistryError::NoMethods(_))
        ));
        assert!(matches!(
            builder.register(ServiceDescriptor::new("pkg.S").method("A").method("A"), Noop),
            Err(RegistryError::DuplicateMethod { .. })
        ));
        assert!(matches!(
            builder.register(ServiceDescriptor::new("pkg.T").method("a/b"), Noop),
            Err(RegistryError::InvalidMethodName { .. })
        ));

        // Failed registrations leave the table untouched.
        assert_eq!(builder.build().len(), 1);
    }

    #[test]
    fn service_info_is_sorted() {
        let mut builder = ServiceRegistry::builder();
        builder
            .register(ServiceDescriptor::new("z.Last").method("Go"), Noop)
            .unwrap()
            .register(greeter(), Noop)
            .unwrap();
        let registry = builder.build();

        let info = registry.service_info();
        assert_eq!(info.len(), 2);
        assert_eq!(info[0].name(), "helloworld.Greeter");
        assert_eq!(info[0].methods(), ["SayHello", "SayHelloStream"]);
        assert_eq!(info[1].name(), "z.Last");
        assert!(!registry.is_empty());
        assert!(ServiceRegistry::default().is_empty());
    }
}
