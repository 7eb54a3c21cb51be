//! `NodeSet` resource: nodes selected by label and an optional key/value

use super::{count_foot, Context, Resource};
use crate::error::Result;
use crate::protocol::Request;
use crate::value::Entity;

pub struct NodeSetResource;

impl Resource for NodeSetResource {
    fn name(&self) -> &'static str {
        "NodeSet"
    }

    fn get(&self, request: &Request, ctx: &mut Context<'_>) -> Result<Option<Entity>> {
        let label = request.arguments.require_str("label")?;
        let key = request.arguments.opt_str("key")?;
        let value = request.arguments.get("value");
        let nodes = ctx.tx()?.match_nodes(label, key, value)?;
        let count = nodes.len();
        let first = ctx.responder.send_entities(nodes.into_iter().map(Entity::Node))?;
        ctx.responder.send_foot(&count_foot("count", count))?;
        Ok(first)
    }

    /// Merge: the matching nodes, or a single new one
    fn patch(&self, request: &Request, ctx: &mut Context<'_>) -> Result<Option<Entity>> {
        let label = request.arguments.require_str("label")?;
        let key = request.arguments.require_str("key")?;
        let value = request.arguments.require("value")?;
        let nodes = ctx.tx()?.merge_nodes(label, key, value)?;
        let count = nodes.len();
        let first = ctx.responder.send_entities(nodes.into_iter().map(Entity::Node))?;
        ctx.responder.send_foot(&count_foot("count", count))?;
        Ok(first)
    }

    fn delete(&self, request: &Request, ctx: &mut Context<'_>) -> Result<Option<Entity>> {
        let label = request.arguments.require_str("label")?;
        let key = request.arguments.opt_str("key")?;
        let value = request.arguments.get("value");
        let deleted = ctx.tx()?.purge_nodes(label, key, value)?;
        ctx.responder.send_entities(std::iter::empty())?;
        ctx.responder.send_foot(&count_foot("nodes_deleted", deleted))?;
        Ok(None)
    }
}

#[cfg(test)]
mod node_set_tests {
    use super::*;
    use crate::error::Status;
    use crate::resource::testing::call;

    #[test]
    fn test_merge_is_idempotent() {
        let mut run = call(&NodeSetResource);
        let (first, lines) = run(r#"PATCH NodeSet {"label":"Person","key":"name","value":"Alice"}"#);
        let first = first.unwrap().unwrap();
        assert_eq!(lines[0], "body:");
        assert_eq!(lines.last().unwrap(), r#"foot: {"count":1}"#);

        let (second, _) = run(r#"PATCH NodeSet {"label":"Person","key":"name","value":"Alice"}"#);
        assert_eq!(second.unwrap().unwrap().id(), first.id());
    }

    #[test]
    fn test_get_filters_by_value() {
        let mut run = call(&NodeSetResource);
        for name in ["Alice", "Bob"] {
            let line = format!(r#"PATCH NodeSet {{"label":"Person","key":"name","value":"{}"}}"#, name);
            run(&line).0.unwrap();
        }
        let (_, lines) = run(r#"GET NodeSet {"label":"Person"}"#);
        assert_eq!(lines.last().unwrap(), r#"foot: {"count":2}"#);

        let (_, lines) = run(r#"GET NodeSet {"label":"Person","key":"name","value":"Bob"}"#);
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains(r#""name":"Bob""#));
    }

    #[test]
    fn test_get_empty_set() {
        let mut run = call(&NodeSetResource);
        let (first, lines) = run(r#"GET NodeSet {"label":"Nobody"}"#);
        assert_eq!(first.unwrap(), None);
        assert_eq!(lines, vec!["body: []".to_string(), r#"foot: {"count":0}"#.to_string()]);
    }

    #[test]
    fn test_purge() {
        let mut run = call(&NodeSetResource);
        run(r#"PATCH NodeSet {"label":"Tmp","key":"k","value":1}"#).0.unwrap();
        run(r#"PATCH NodeSet {"label":"Tmp","key":"k","value":2}"#).0.unwrap();
        let (result, lines) = run(r#"DELETE NodeSet {"label":"Tmp","key":"k","value":1}"#);
        assert_eq!(result.unwrap(), None);
        assert_eq!(lines, vec!["body: []".to_string(), r#"foot: {"nodes_deleted":1}"#.to_string()]);
    }

    #[test]
    fn test_unsupported_verbs() {
        let mut run = call(&NodeSetResource);
        for line in [r#"SET NodeSet {}"#, r#"CREATE NodeSet {}"#, r#"EXECUTE NodeSet {}"#] {
            assert_eq!(run(line).0.unwrap_err().status(), Status::MethodNotAllowed);
        }
    }
}
