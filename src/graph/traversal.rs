use super::{Direction, GraphOperations, RelationshipList};
use crate::backend::{Connector, Statement};
use crate::codec::{parse_entity_id, take_relationship};
use crate::error::Result;
use crate::validation::{Identifier, RELATIONSHIP_TYPE};

impl<C: Connector> GraphOperations<C> {
    /// Relationships touching node `id`, filtered by `direction` and optionally by type.
    ///
    /// An empty `rel_type` means no type filter. A node without relationships, or one
    /// that does not exist, yields an empty list.
    pub async fn get_node_relationships(
        &self,
        id: &str,
        direction: Direction,
        rel_type: Option<&str>,
    ) -> Result<RelationshipList> {
        let rel_type = match rel_type.filter(|value| !value.is_empty()) {
            Some(value) => Some(Identifier::parse(value, RELATIONSHIP_TYPE)?),
            None => None,
        };
        let Some(node_id) = parse_entity_id(id) else {
            return Ok(RelationshipList::from(Vec::new()));
        };
        let statement = node_relationships_statement(node_id, direction, rel_type.as_ref());
        let rows = self
            .connections
            .run_once("get_node_relationships", &statement)
            .await?;
        let relationships = rows
            .into_iter()
            .map(|mut row| take_relationship(&mut row, "r"))
            .collect::<Result<Vec<_>>>()?;
        Ok(RelationshipList::from(relationships))
    }
}

fn node_relationships_statement(
    node_id: i64,
    direction: Direction,
    rel_type: Option<&Identifier>,
) -> Statement {
    let filter = rel_type.map(|t| format!(":{t}")).unwrap_or_default();
    let pattern = match direction {
        Direction::Incoming => format!("(n)<-[r{filter}]-()"),
        Direction::Outgoing => format!("(n)-[r{filter}]->()"),
        Direction::All => format!("(n)-[r{filter}]-()"),
    };
    Statement::new(format!(
        "MATCH {pattern} WHERE id(n) = $node_id RETURN DISTINCT r"
    ))
    .param("node_id", node_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_polarity_follows_direction() {
        let incoming = node_relationships_statement(1, Direction::Incoming, None);
        assert!(incoming.text().starts_with("MATCH (n)<-[r]-()"));
        let outgoing = node_relationships_statement(1, Direction::Outgoing, None);
        assert!(outgoing.text().starts_with("MATCH (n)-[r]->()"));
        let all = node_relationships_statement(1, Direction::All, None);
        assert!(all.text().starts_with("MATCH (n)-[r]-()"));
        assert!(all.text().ends_with("RETURN DISTINCT r"));
    }

    #[test]
    fn type_filter_narrows_the_pattern() {
        let knows = Identifier::parse("KNOWS", RELATIONSHIP_TYPE).unwrap();
        let statement = node_relationships_statement(7, Direction::Outgoing, Some(&knows));
        assert!(statement.text().contains("-[r:KNOWS]->"));
        assert_eq!(statement.params()["node_id"], 7);
    }
}
