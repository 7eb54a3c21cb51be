//! `Graph` resource (alias `GraphMap`) of the root control service
//!
//! Starts, stops and reports graph services through the `ServiceManager`.

use std::sync::Arc;

use super::{Context, Resource};
use crate::error::{Error, Result};
use crate::protocol::Request;
use crate::service::ServiceManager;
use crate::value::{Entity, GraphInfo, Value};

pub struct GraphAdminResource {
    services: Arc<ServiceManager>,
}

impl GraphAdminResource {
    pub fn new(services: Arc<ServiceManager>) -> Self {
        Self { services }
    }

    /// `host` (defaulting to the server's host) and a non-zero `port`
    fn address(&self, request: &Request) -> Result<(String, u16)> {
        let host = request
            .arguments
            .opt_str("host")?
            .unwrap_or(&self.services.config().host)
            .to_string();
        if host.trim().is_empty() {
            return Err(Error::InvalidGraphAddress("host must not be empty".into()));
        }
        let port = request.arguments.require_i64("port")?;
        match u16::try_from(port) {
            Ok(port) if port != 0 => Ok((host, port)),
            _ => Err(Error::InvalidGraphAddress(format!("port {} is out of range", port))),
        }
    }

    fn start(&self, request: &Request, ctx: &mut Context<'_>, create: bool) -> Result<Option<Entity>> {
        let (host, port) = self.address(request)?;
        let service = self.services.start(&host, port, create)?;
        ctx.responder.send_body(&Value::Graph(service.info()))?;
        Ok(None)
    }
}

impl Resource for GraphAdminResource {
    fn name(&self) -> &'static str {
        "Graph"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["GraphMap"]
    }

    /// Without a port: every running service. With one: that service and
    /// its batch metrics, or `running: false` when only its storage exists.
    fn get(&self, request: &Request, ctx: &mut Context<'_>) -> Result<Option<Entity>> {
        if request.arguments.get("port").is_none() {
            ctx.responder.start_body_list()?;
            for service in self.services.list() {
                ctx.responder.send_body_item(&Value::Graph(service.info()))?;
            }
            ctx.responder.end_body_list()?;
            return Ok(None);
        }

        let (host, port) = self.address(request)?;
        if let Some(service) = self.services.get(&host, port) {
            ctx.responder.send_body(&Value::Graph(service.info()))?;
            ctx.responder.send_foot(&service.metrics().snapshot().to_map())?;
        } else if self.services.store_exists(&host, port) {
            ctx.responder.send_body(&Value::Graph(GraphInfo { host, port, running: false }))?;
        } else {
            return Err(Error::NoSuchGraph { host, port });
        }
        Ok(None)
    }

    fn patch(&self, request: &Request, ctx: &mut Context<'_>) -> Result<Option<Entity>> {
        let create = request.arguments.opt_bool("create", false)?;
        self.start(request, ctx, create)
    }

    fn create(&self, request: &Request, ctx: &mut Context<'_>) -> Result<Option<Entity>> {
        self.start(request, ctx, true)
    }

    fn delete(&self, request: &Request, _ctx: &mut Context<'_>) -> Result<Option<Entity>> {
        let (host, port) = self.address(request)?;
        let delete = request.arguments.opt_bool("delete", false)?;
        self.services.stop(&host, port, delete)?;
        Ok(None)
    }
}
