//! Interception of pipeline stages.
//!
//! An [`Interceptor`] declares the stage methods it wants through [`Signature`]s.
//! [`InterceptorChain`] wraps each freshly created stage in one [`Plugin`] per
//! interceptor that declared a method of that stage; later registrations wrap
//! earlier ones, so the last registered interceptor runs first.

mod invocation;
mod signature;
mod wrap;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::executor::{Executor, ParameterHandler, StatementHandler};
use crate::results::ResultSetHandler;

pub use invocation::{Args, Invocation, Invoke, Outcome};
pub use signature::{Capability, MethodSignature, Signature, SignatureMap};
pub use wrap::Plugin;

/// Cross-cutting behavior around pipeline stages.
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// The stage methods this interceptor intercepts. Must not be empty.
    fn signatures(&self) -> Vec<Signature>;

    /// Handle one intercepted call. Call [`Invocation::proceed`] to reach the target,
    /// or return an [`Outcome`] directly to short-circuit it.
    ///
    /// # Errors
    ///
    /// Any error is returned to the caller of the intercepted method.
    fn intercept(&self, invocation: Invocation<'_>) -> Result<Outcome>;

    /// Receive configuration properties at registration time.
    fn set_properties(&mut self, properties: &BTreeMap<String, String>) {
        let _ = properties;
    }
}

/// Reports which stages an object implements.
pub trait Pluggable {
    fn capabilities(&self) -> &'static [Capability];
}

#[derive(Clone)]
struct Registration {
    interceptor: Arc<dyn Interceptor>,
    signatures: Arc<SignatureMap>,
}

impl Registration {
    fn applies_to<T: Pluggable + ?Sized>(&self, target: &T, capability: Capability) -> bool {
        self.signatures.covers(capability) && target.capabilities().contains(&capability)
    }
}

/// Registered interceptors in registration order.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    registrations: Vec<Registration>,
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.registrations.iter().map(|r| r.interceptor.name()))
            .finish()
    }
}

impl InterceptorChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an interceptor, validating its signatures.
    ///
    /// # Errors
    ///
    /// `PluginError` when the signatures are empty or name unknown methods.
    pub fn add(&mut self, interceptor: Arc<dyn Interceptor>) -> Result<()> {
        let signatures = Arc::new(SignatureMap::build(interceptor.as_ref())?);
        debug!(interceptor = interceptor.name(), "registered interceptor");
        self.registrations.push(Registration {
            interceptor,
            signatures,
        });
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn interceptors(&self) -> impl Iterator<Item = &Arc<dyn Interceptor>> {
        self.registrations.iter().map(|r| &r.interceptor)
    }

    #[must_use]
    pub fn plugin_executor(&self, target: Box<dyn Executor>) -> Box<dyn Executor> {
        self.registrations.iter().fold(target, |target, registration| -> Box<dyn Executor> {
            if registration.applies_to(target.as_ref(), Capability::Executor) {
                Box::new(Plugin::with_signatures(
                    target,
                    registration.interceptor.clone(),
                    registration.signatures.clone(),
                ))
            } else {
                target
            }
        })
    }

    #[must_use]
    pub fn plugin_statement_handler(
        &self,
        target: Box<dyn StatementHandler>,
    ) -> Box<dyn StatementHandler> {
        self.registrations.iter().fold(target, |target, registration| -> Box<dyn StatementHandler> {
            if registration.applies_to(target.as_ref(), Capability::StatementHandler) {
                Box::new(Plugin::with_signatures(
                    target,
                    registration.interceptor.clone(),
                    registration.signatures.clone(),
                ))
            } else {
                target
            }
        })
    }

    #[must_use]
    pub fn plugin_parameter_handler(
        &self,
        target: Box<dyn ParameterHandler>,
    ) -> Box<dyn ParameterHandler> {
        self.registrations.iter().fold(target, |target, registration| -> Box<dyn ParameterHandler> {
            if registration.applies_to(target.as_ref(), Capability::ParameterHandler) {
                Box::new(Plugin::with_signatures(
                    target,
                    registration.interceptor.clone(),
                    registration.signatures.clone(),
                ))
            } else {
                target
            }
        })
    }

    #[must_use]
    pub fn plugin_result_set_handler(
        &self,
        target: Box<dyn ResultSetHandler>,
    ) -> Box<dyn ResultSetHandler> {
        self.registrations.iter().fold(target, |target, registration| -> Box<dyn ResultSetHandler> {
            if registration.applies_to(target.as_ref(), Capability::ResultSetHandler) {
                Box::new(Plugin::with_signatures(
                    target,
                    registration.interceptor.clone(),
                    registration.signatures.clone(),
                ))
            } else {
                target
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ParameterOnly;

    impl Interceptor for ParameterOnly {
        fn signatures(&self) -> Vec<Signature> {
            vec![Signature::new(
                Capability::ParameterHandler,
                "set_parameters",
                &["Statement"],
            )]
        }

        fn intercept(&self, invocation: Invocation<'_>) -> Result<Outcome> {
            invocation.proceed()
        }
    }

    struct Both;

    impl Pluggable for Both {
        fn capabilities(&self) -> &'static [Capability] {
            &[Capability::StatementHandler, Capability::ParameterHandler]
        }
    }

    struct ExecutorLike;

    impl Pluggable for ExecutorLike {
        fn capabilities(&self) -> &'static [Capability] {
            &[Capability::Executor]
        }
    }

    #[test]
    fn applies_only_where_declared_and_implemented() {
        let interceptor: Arc<dyn Interceptor> = Arc::new(ParameterOnly);
        let registration = Registration {
            signatures: Arc::new(SignatureMap::build(interceptor.as_ref()).unwrap()),
            interceptor,
        };
        assert!(registration.applies_to(&Both, Capability::ParameterHandler));
        assert!(!registration.applies_to(&Both, Capability::StatementHandler));
        assert!(!registration.applies_to(&ExecutorLike, Capability::Executor));
        assert!(!registration.applies_to(&ExecutorLike, Capability::ParameterHandler));
    }

    #[test]
    fn chain_keeps_registration_order() {
        let mut chain = InterceptorChain::new();
        assert!(chain.is_empty());
        chain.add(Arc::new(ParameterOnly)).unwrap();
        chain.add(Arc::new(ParameterOnly)).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.interceptors().count(), 2);
    }
}
