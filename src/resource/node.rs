//! `Node` resource: single-node CRUD

use super::{properties_arg, resolve_entity, Context, EntityKind, Resource};
use crate::error::Result;
use crate::protocol::Request;
use crate::value::{Entity, Node, Value};

pub struct NodeResource;

fn node_id(request: &Request) -> Result<u64> {
    resolve_entity(request.arguments.require("id")?, EntityKind::Node)
}

fn respond(ctx: &mut Context<'_>, node: Node) -> Result<Option<Entity>> {
    ctx.responder.send_body(&Value::Node(node.clone()))?;
    Ok(Some(Entity::Node(node)))
}

impl Resource for NodeResource {
    fn name(&self) -> &'static str {
        "Node"
    }

    fn get(&self, request: &Request, ctx: &mut Context<'_>) -> Result<Option<Entity>> {
        let id = node_id(request)?;
        let node = ctx.tx()?.get_node(id)?;
        respond(ctx, node)
    }

    /// Replace every label and property
    fn set(&self, request: &Request, ctx: &mut Context<'_>) -> Result<Option<Entity>> {
        let id = node_id(request)?;
        let labels = request.arguments.require_strings("labels")?;
        let properties = request.arguments.require_map("properties")?;
        let node = ctx.tx()?.put_node(id, &labels, &properties)?;
        respond(ctx, node)
    }

    fn patch(&self, request: &Request, ctx: &mut Context<'_>) -> Result<Option<Entity>> {
        let id = node_id(request)?;
        let labels = request.arguments.opt_strings("labels")?.unwrap_or_default();
        let properties = properties_arg(request)?;
        let node = ctx.tx()?.patch_node(id, &labels, &properties)?;
        respond(ctx, node)
    }

    fn create(&self, request: &Request, ctx: &mut Context<'_>) -> Result<Option<Entity>> {
        let labels = request.arguments.opt_strings("labels")?.unwrap_or_default();
        let properties = properties_arg(request)?;
        let node = ctx.tx()?.create_node(&labels, &properties)?;
        respond(ctx, node)
    }

    fn delete(&self, request: &Request, ctx: &mut Context<'_>) -> Result<Option<Entity>> {
        let id = node_id(request)?;
        ctx.tx()?.delete_node(id)?;
        Ok(None)
    }
}

#[cfg(test)]
mod node_tests {
    use super::*;
    use crate::error::{Error, Status};
    use crate::resource::testing::call;

    #[test]
    fn test_create_then_get() {
        let mut run = call(&NodeResource);
        let (created, lines) = run(r#"CREATE Node {"labels":["Person"],"properties":{"name":"Alice"}}"#);
        let created = created.unwrap().unwrap();
        assert!(lines[0].starts_with("body: !Node"));
        assert!(lines[0].contains(r#""name":"Alice""#));

        let (fetched, _) = run(&format!(r#"GET Node {{"id":{}}}"#, created.id()));
        assert_eq!(fetched.unwrap(), Some(created));
    }

    #[test]
    fn test_set_replaces_and_patch_adds() {
        let mut run = call(&NodeResource);
        let (created, _) = run(r#"CREATE Node {"labels":["A"],"properties":{"x":1,"y":2}}"#);
        let id = created.unwrap().unwrap().id();

        let (patched, _) = run(&format!(r#"PATCH Node {{"id":{},"labels":["B"],"properties":{{"z":3}}}}"#, id));
        let Some(Entity::Node(node)) = patched.unwrap() else { panic!("expected node") };
        assert_eq!(node.labels.len(), 2);
        assert_eq!(node.properties.len(), 3);

        let (replaced, _) = run(&format!(r#"SET Node {{"id":{},"labels":["C"],"properties":{{}}}}"#, id));
        let Some(Entity::Node(node)) = replaced.unwrap() else { panic!("expected node") };
        assert_eq!(node.labels.iter().collect::<Vec<_>>(), vec!["C"]);
        assert!(node.properties.is_empty());
    }

    #[test]
    fn test_set_requires_labels_and_properties() {
        let mut run = call(&NodeResource);
        let (created, _) = run(r#"CREATE Node {}"#);
        let id = created.unwrap().unwrap().id();
        let (result, _) = run(&format!(r#"SET Node {{"id":{}}}"#, id));
        assert_eq!(result.unwrap_err().status(), Status::BadRequest);
    }

    #[test]
    fn test_delete_returns_no_entity() {
        let mut run = call(&NodeResource);
        let (created, _) = run(r#"CREATE Node {}"#);
        let id = created.unwrap().unwrap().id();
        let (deleted, lines) = run(&format!(r#"DELETE Node {{"id":{}}}"#, id));
        assert_eq!(deleted.unwrap(), None);
        assert!(lines.is_empty());

        let (missing, _) = run(&format!(r#"GET Node {{"id":{}}}"#, id));
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_execute_not_allowed() {
        let mut run = call(&NodeResource);
        let (result, _) = run(r#"EXECUTE Node {}"#);
        let err = result.unwrap_err();
        assert_eq!(err.status(), Status::MethodNotAllowed);
        assert_eq!(err.to_string(), "Method EXECUTE not allowed on resource Node");
    }
}
