//! Pipeline invocation boundary: guard, flow lookup, flow run.

use anyhow::{anyhow, Result};
use axum::http::Method;
use std::{collections::HashMap, time::Duration};
use tracing::{debug, instrument};

use super::{
    error::AuthError,
    flows::Services,
    guard::RouteTable,
    pipeline::Flow,
    types::{Inbound, Reply},
};

#[derive(Debug)]
pub struct Gateway {
    table: RouteTable,
    flows: HashMap<(&'static str, Method), Flow>,
    default_timeout: Duration,
}

impl Gateway {
    /// Validate the table against the bindings and every flow.
    ///
    /// # Errors
    /// Returns an error if a binding names an undeclared route or a method the
    /// route does not allow, if two flows share a binding, or if a flow does
    /// not end in a terminal stage.
    pub fn new(
        table: RouteTable,
        bindings: Vec<(&'static str, Method, Flow)>,
        default_timeout: Duration,
    ) -> Result<Self> {
        if default_timeout.is_zero() {
            return Err(anyhow!("adapter timeout must be positive"));
        }

        let mut flows = HashMap::new();
        for (route, method, flow) in bindings {
            let allowed = table
                .methods(route)
                .ok_or_else(|| anyhow!("flow `{}` is bound to undeclared route `{route}`", flow.name()))?;
            if !allowed.contains(&method) {
                return Err(anyhow!(
                    "flow `{}` is bound to {method} {route}, which the route does not allow",
                    flow.name()
                ));
            }
            flow.validate()?;
            if let Some(previous) = flows.insert((route, method.clone()), flow) {
                return Err(anyhow!(
                    "{method} {route} is bound twice (`{}`)",
                    previous.name()
                ));
            }
        }

        Ok(Self {
            table,
            flows,
            default_timeout,
        })
    }

    /// Gateway with the standard route table and every flow.
    ///
    /// # Errors
    /// Returns an error if validation fails.
    pub fn from_services(services: &Services, default_timeout: Duration) -> Result<Self> {
        Self::new(RouteTable::standard()?, services.bindings(), default_timeout)
    }

    /// Handle one request end to end. Never fails: every outcome is a `Reply`.
    #[instrument(skip_all, fields(method = %inbound.method, route = %inbound.route))]
    pub async fn handle(&self, mut inbound: Inbound) -> Reply {
        let resolved = match self.table.check(&inbound.method, &inbound.route) {
            Ok(resolved) => resolved,
            Err(err) => return err.into_reply(),
        };

        // Declared methods without a flow (none in the standard table) are still 405.
        let Some(flow) = self.flows.get(&(resolved.pattern, inbound.method.clone())) else {
            return AuthError::MethodNotAllowed {
                allow: self.bound_methods(resolved.pattern),
            }
            .into_reply();
        };

        inbound.params = resolved.params;
        inbound.timeout.get_or_insert(self.default_timeout);
        debug!(flow = flow.name(), "dispatching");

        flow.run(&inbound).await
    }

    fn bound_methods(&self, pattern: &'static str) -> Vec<Method> {
        self.table
            .methods(pattern)
            .unwrap_or_default()
            .iter()
            .filter(|method| self.flows.contains_key(&(pattern, (*method).clone())))
            .cloned()
            .collect()
    }
}
