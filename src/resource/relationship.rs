//! `Rel` resource: single-relationship CRUD

use super::{properties_arg, require_node_arg, resolve_entity, Context, EntityKind, Resource};
use crate::error::Result;
use crate::protocol::Request;
use crate::value::{Entity, Relationship, Value};

pub struct RelationshipResource;

fn relationship_id(request: &Request) -> Result<u64> {
    resolve_entity(request.arguments.require("id")?, EntityKind::Relationship)
}

fn respond(ctx: &mut Context<'_>, rel: Relationship) -> Result<Option<Entity>> {
    ctx.responder.send_body(&Value::Rel(rel.clone()))?;
    Ok(Some(Entity::Relationship(rel)))
}

impl Resource for RelationshipResource {
    fn name(&self) -> &'static str {
        "Rel"
    }

    fn get(&self, request: &Request, ctx: &mut Context<'_>) -> Result<Option<Entity>> {
        let id = relationship_id(request)?;
        let rel = ctx.tx()?.get_relationship(id)?;
        respond(ctx, rel)
    }

    fn set(&self, request: &Request, ctx: &mut Context<'_>) -> Result<Option<Entity>> {
        let id = relationship_id(request)?;
        let properties = request.arguments.require_map("properties")?;
        let rel = ctx.tx()?.put_relationship(id, &properties)?;
        respond(ctx, rel)
    }

    fn patch(&self, request: &Request, ctx: &mut Context<'_>) -> Result<Option<Entity>> {
        let id = relationship_id(request)?;
        let properties = properties_arg(request)?;
        let rel = ctx.tx()?.patch_relationship(id, &properties)?;
        respond(ctx, rel)
    }

    fn create(&self, request: &Request, ctx: &mut Context<'_>) -> Result<Option<Entity>> {
        let start = require_node_arg(request, "start")?;
        let end = require_node_arg(request, "end")?;
        let rel_type = request.arguments.require_str("type")?;
        let properties = properties_arg(request)?;
        let rel = ctx.tx()?.create_relationship(start, end, rel_type, &properties)?;
        respond(ctx, rel)
    }

    fn delete(&self, request: &Request, ctx: &mut Context<'_>) -> Result<Option<Entity>> {
        let id = relationship_id(request)?;
        ctx.tx()?.delete_relationship(id)?;
        Ok(None)
    }
}
