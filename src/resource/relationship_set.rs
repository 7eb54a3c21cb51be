//! `RelSet` resource: relationships selected by endpoint and type

use super::{count_foot, require_node_arg, resolve_node_arg, Context, Resource};
use crate::error::Result;
use crate::protocol::Request;
use crate::value::Entity;

pub struct RelationshipSetResource;

/// `(start, end, type)` selector; the store rejects a selector with
/// neither endpoint.
fn selector(request: &Request) -> Result<(Option<u64>, Option<u64>, Option<&str>)> {
    Ok((
        resolve_node_arg(request, "start")?,
        resolve_node_arg(request, "end")?,
        request.arguments.opt_str("type")?,
    ))
}

impl Resource for RelationshipSetResource {
    fn name(&self) -> &'static str {
        "RelSet"
    }

    fn get(&self, request: &Request, ctx: &mut Context<'_>) -> Result<Option<Entity>> {
        let (start, end, rel_type) = selector(request)?;
        let rels = ctx.tx()?.match_relationships(start, end, rel_type)?;
        let count = rels.len();
        let first = ctx.responder.send_entities(rels.into_iter().map(Entity::Relationship))?;
        ctx.responder.send_foot(&count_foot("count", count))?;
        Ok(first)
    }

    fn patch(&self, request: &Request, ctx: &mut Context<'_>) -> Result<Option<Entity>> {
        let start = require_node_arg(request, "start")?;
        let end = require_node_arg(request, "end")?;
        let rel_type = request.arguments.require_str("type")?;
        let rels = ctx.tx()?.merge_relationships(start, end, rel_type)?;
        let count = rels.len();
        let first = ctx.responder.send_entities(rels.into_iter().map(Entity::Relationship))?;
        ctx.responder.send_foot(&count_foot("count", count))?;
        Ok(first)
    }

    fn delete(&self, request: &Request, ctx: &mut Context<'_>) -> Result<Option<Entity>> {
        let (start, end, rel_type) = selector(request)?;
        let deleted = ctx.tx()?.purge_relationships(start, end, rel_type)?;
        ctx.responder.send_entities(std::iter::empty())?;
        ctx.responder.send_foot(&count_foot("relationships_deleted", deleted))?;
        Ok(None)
    }
}
