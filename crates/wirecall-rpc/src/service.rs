use std::collections::HashMap;
use std::fmt::{self, Display};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{Codec, JsonCodec};
use crate::context::RequestContext;
use crate::error::{Result, RpcError};

/// Type-erased method: decodes the argument body, runs the handler and
/// encodes its reply. Errors come back as the text sent to the client.
/// Shared so a dispatcher can run it without holding the registry lock.
pub(crate) type Invoker<C> =
    Arc<dyn Fn(&C, &RequestContext, &[u8]) -> std::result::Result<Vec<u8>, String> + Send + Sync>;

/// A named set of methods, built once and handed to
/// [`Server::register`](crate::Server::register).
///
/// ```
/// use wirecall_rpc::{RequestContext, Service};
///
/// let arith: Service = Service::new("Arith")
///     .method("Add", |_ctx: &RequestContext, (a, b): (i64, i64)| {
///         Ok::<_, String>(a + b)
///     });
/// assert_eq!(arith.method_names(), vec!["Add"]);
/// ```
pub struct Service<C: Codec = JsonCodec> {
    name: String,
    methods: HashMap<String, Invoker<C>>,
    duplicate_method: Option<String>,
}

impl<C: Codec> Service<C> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
            duplicate_method: None,
        }
    }

    /// A service named after the type `T` (its last path segment, without
    /// generic parameters).
    pub fn of<T: ?Sized>() -> Self {
        Self::new(type_short_name(std::any::type_name::<T>()))
    }

    /// Add a method.
    ///
    /// `handler` receives the request context and the decoded argument. An
    /// `Err` is returned to the caller as its `Display` text.
    pub fn method<A, R, E, F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        A: DeserializeOwned + 'static,
        R: Serialize + 'static,
        E: Display + 'static,
        F: Fn(&RequestContext, A) -> std::result::Result<R, E> + Send + Sync + 'static,
    {
        let name = name.into();
        let invoker: Invoker<C> = Arc::new(move |codec: &C, ctx: &RequestContext, body: &[u8]| {
            let args: A = codec.decode(body).map_err(|err| {
                format!(
                    "rpc: invalid arguments for {}.{}: {err}",
                    ctx.service(),
                    ctx.method()
                )
            })?;
            let reply = handler(ctx, args).map_err(|err| err.to_string())?;
            codec.encode(&reply).map_err(|err| {
                format!(
                    "rpc: encoding reply of {}.{}: {err}",
                    ctx.service(),
                    ctx.method()
                )
            })
        });
        if self.methods.insert(name.clone(), invoker).is_some() && self.duplicate_method.is_none() {
            self.duplicate_method = Some(name);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Method names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Check the service's shape and give up its method table.
    pub(crate) fn into_methods(self) -> Result<(String, HashMap<String, Invoker<C>>)> {
        if !is_valid_service_name(&self.name) {
            return Err(RpcError::InvalidServiceName(self.name));
        }
        if let Some(method) = self.duplicate_method {
            return Err(RpcError::DuplicateMethod {
                service: self.name,
                method,
            });
        }
        if self.methods.is_empty() {
            return Err(RpcError::NoMethods(self.name));
        }
        Ok((self.name, self.methods))
    }
}

impl<C: Codec> fmt::Debug for Service<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("methods", &self.method_names())
            .finish()
    }
}

/// Service names end up on the left of the first `.` in a call target.
fn is_valid_service_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('.') && !name.chars().any(char::is_whitespace)
}

fn type_short_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    mod nested {
        pub struct Arith<T>(pub T);
    }

    fn ctx(method: &str) -> RequestContext {
        RequestContext::new(
            1,
            "Arith".to_string(),
            method.to_string(),
            HashMap::new(),
            "test".to_string(),
        )
    }

    fn arith() -> Service {
        Service::new("Arith")
            .method("Add", |_: &RequestContext, (a, b): (i64, i64)| {
                Ok::<_, String>(a + b)
            })
            .method("Div", |_: &RequestContext, (a, b): (i64, i64)| {
                if b == 0 {
                    Err("divide by zero".to_string())
                } else {
                    Ok(a / b)
                }
            })
    }

    #[test]
    fn of_uses_short_type_name() {
        assert_eq!(Service::<JsonCodec>::of::<Echo>().name(), "Echo");
        assert_eq!(Service::<JsonCodec>::of::<nested::Arith<u8>>().name(), "Arith");
    }

    #[test]
    fn invoker_runs_handler() {
        let Ok((_, methods)) = arith().into_methods() else {
            panic!("arith service should be valid");
        };
        let out = methods["Add"](&JsonCodec, &ctx("Add"), b"[2,3]").unwrap();
        assert_eq!(out, b"5");
    }

    #[test]
    fn handler_error_text_passes_through() {
        let Ok((_, methods)) = arith().into_methods() else {
            panic!("arith service should be valid");
        };
        let err = methods["Div"](&JsonCodec, &ctx("Div"), b"[1,0]").unwrap_err();
        assert_eq!(err, "divide by zero");
    }

    #[test]
    fn undecodable_arguments_name_the_method() {
        let Ok((_, methods)) = arith().into_methods() else {
            panic!("arith service should be valid");
        };
        let err = methods["Add"](&JsonCodec, &ctx("Add"), b"{\"x\":1}").unwrap_err();
        assert!(err.starts_with("rpc: invalid arguments for Arith.Add: "), "{err}");
    }

    #[test]
    fn shape_errors() {
        let empty: Service = Service::new("Empty");
        assert_eq!(
            empty.into_methods().err(),
            Some(RpcError::NoMethods("Empty".to_string()))
        );

        let dotted: Service =
            Service::new("a.b").method("M", |_: &RequestContext, _: ()| Ok::<_, String>(()));
        assert!(matches!(
            dotted.into_methods(),
            Err(RpcError::InvalidServiceName(_))
        ));

        let twice: Service = Service::new("Twice")
            .method("M", |_: &RequestContext, _: ()| Ok::<_, String>(1))
            .method("M", |_: &RequestContext, _: ()| Ok::<_, String>(2));
        assert_eq!(
            twice.into_methods().err(),
            Some(RpcError::DuplicateMethod {
                service: "Twice".to_string(),
                method: "M".to_string()
            })
        );
    }

    #[test]
    fn method_names_sorted() {
        assert_eq!(arith().method_names(), vec!["Add", "Div"]);
    }
}
