//! `Cypher` resource (alias `Query`): runs a query in the batch transaction

use super::{Context, Resource};
use crate::error::Result;
use crate::protocol::Request;
use crate::value::{Entity, Map, Value};

pub struct QueryResource;

impl Resource for QueryResource {
    fn name(&self) -> &'static str {
        "Cypher"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["Query"]
    }

    /// Head carries the column names, the body one list per row and the
    /// foot the store's statistics. The first column of the first row is
    /// the request's output when it is an entity.
    fn execute(&self, request: &Request, ctx: &mut Context<'_>) -> Result<Option<Entity>> {
        let text = request.arguments.require_str("query")?;
        let params = request.arguments.opt_map("params")?.unwrap_or_default();
        let result = ctx.tx()?.execute(text, &params)?;

        let output = result
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(Value::as_entity);

        let mut head = Map::new();
        head.insert(
            "columns".to_string(),
            Value::List(result.columns.into_iter().map(Value::String).collect()),
        );
        ctx.responder.send_head(&head)?;
        ctx.responder.start_body_list()?;
        for row in result.rows {
            ctx.responder.send_body_item(&Value::List(row))?;
        }
        ctx.responder.end_body_list()?;
        ctx.responder.send_foot(&result.stats)?;
        Ok(output)
    }
}

#[cfg(test)]
mod query_resource_tests {
    use super::*;
    use crate::error::Status;
    use crate::resource::testing::call;

    #[test]
    fn test_create_returns_head_rows_and_stats() {
        let mut run = call(&QueryResource);
        let (output, lines) = run(r#"EXECUTE Cypher {"query":"CREATE (n:Person {name: $name}) RETURN n, n.name","params":{"name":"Alice"}}"#);
        let output = output.unwrap();
        assert!(matches!(output, Some(Entity::Node(_))));
        assert_eq!(lines[0], r#"head: {"columns":["n","n.name"]}"#);
        assert_eq!(lines[1], "body:");
        assert!(lines[2].starts_with("- [!Node"));
        assert!(lines[2].ends_with(r#""Alice"]"#));
        assert_eq!(lines[3], r#"foot: {"nodes_created":1}"#);
    }

    #[test]
    fn test_match_without_rows() {
        let mut run = call(&QueryResource);
        let (output, lines) = run(r#"EXECUTE Query {"query":"MATCH (n:Person) RETURN n.name"}"#);
        assert_eq!(output.unwrap(), None);
        assert_eq!(lines[1], "body: []");
    }

    #[test]
    fn test_scalar_first_column_is_not_an_output() {
        let mut run = call(&QueryResource);
        run(r#"EXECUTE Cypher {"query":"CREATE (n:Person {name: 'Bob'})"}"#).0.unwrap();
        let (output, _) = run(r#"EXECUTE Cypher {"query":"MATCH (n:Person) RETURN n.name"}"#);
        assert_eq!(output.unwrap(), None);
    }

    #[test]
    fn test_bad_query_and_missing_argument() {
        let mut run = call(&QueryResource);
        assert_eq!(run(r#"EXECUTE Cypher {"query":"DROP EVERYTHING"}"#).0.unwrap_err().status(), Status::BadRequest);
        assert_eq!(run(r#"EXECUTE Cypher {}"#).0.unwrap_err().status(), Status::BadRequest);
        assert_eq!(run(r#"GET Cypher {}"#).0.unwrap_err().status(), Status::MethodNotAllowed);
    }
}
