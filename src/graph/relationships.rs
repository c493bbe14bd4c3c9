use serde_json::{Map, Value};
use tracing::debug;

use super::{
    relationship_identity, DeleteReport, GraphOperations, RelationshipList,
    RELATIONSHIP_NOT_FOUND,
};
use crate::backend::{Connector, Statement};
use crate::codec::{parse_entity_id, take_count, take_relationship, RelationshipRecord};
use crate::error::{GatewayError, Result};
use crate::validation::{Identifier, RELATIONSHIP_TYPE};

const ENDPOINTS_MISSING: &str = "Failed to create relationship. Nodes may not exist.";

impl<C: Connector> GraphOperations<C> {
    /// Creates `(from)-[:rel_type]->(to)`. Both endpoints must already exist; when either
    /// is missing nothing is written.
    pub async fn create_relationship(
        &self,
        from_node: &str,
        to_node: &str,
        rel_type: &str,
        properties: Map<String, Value>,
    ) -> Result<RelationshipRecord> {
        let rel_type = Identifier::parse(rel_type, RELATIONSHIP_TYPE)?;
        let (Some(from_id), Some(to_id)) = (parse_entity_id(from_node), parse_entity_id(to_node))
        else {
            return Err(GatewayError::not_found(ENDPOINTS_MISSING));
        };
        let statement = create_relationship_statement(&rel_type, from_id, to_id, properties);
        let mut rows = self
            .connections
            .run_once("create_relationship", &statement)
            .await?;
        let Some(row) = rows.first_mut() else {
            return Err(GatewayError::not_found(ENDPOINTS_MISSING));
        };
        let rel = take_relationship(row, "r")?;
        debug!(id = %rel.id, rel_type = %rel.rel_type, "relationship created");
        Ok(rel)
    }

    /// Fetches a relationship by id.
    pub async fn get_relationship(&self, id: &str) -> Result<RelationshipRecord> {
        let rel_id = relationship_identity(id)?;
        let statement = Statement::new("MATCH ()-[r]->() WHERE id(r) = $relationship_id RETURN r")
            .param("relationship_id", rel_id);
        let mut rows = self
            .connections
            .run_once("get_relationship", &statement)
            .await?;
        match rows.first_mut() {
            Some(row) => take_relationship(row, "r"),
            None => Err(GatewayError::not_found(RELATIONSHIP_NOT_FOUND)),
        }
    }

    /// Merges `properties` into the relationship; `null` removes a key.
    pub async fn update_relationship(
        &self,
        id: &str,
        properties: Map<String, Value>,
    ) -> Result<RelationshipRecord> {
        let rel_id = relationship_identity(id)?;
        let statement = Statement::new(
            "MATCH ()-[r]->() WHERE id(r) = $relationship_id SET r += $properties RETURN r",
        )
        .param("relationship_id", rel_id)
        .param("properties", properties);
        let mut rows = self
            .connections
            .run_once("update_relationship", &statement)
            .await?;
        match rows.first_mut() {
            Some(row) => take_relationship(row, "r"),
            None => Err(GatewayError::not_found(RELATIONSHIP_NOT_FOUND)),
        }
    }

    /// Deletes a relationship; its endpoints are untouched.
    pub async fn delete_relationship(&self, id: &str) -> Result<DeleteReport> {
        let rel_id = relationship_identity(id)?;
        let statement = Statement::new(
            "MATCH ()-[r]->() WHERE id(r) = $relationship_id \
             DELETE r RETURN count(r) AS deleted_count",
        )
        .param("relationship_id", rel_id);
        let mut rows = self
            .connections
            .run_once("delete_relationship", &statement)
            .await?;
        let deleted_count = match rows.first_mut() {
            Some(row) => take_count(row, "deleted_count")?,
            None => 0,
        };
        if deleted_count == 0 {
            return Err(GatewayError::not_found(RELATIONSHIP_NOT_FOUND));
        }
        Ok(DeleteReport {
            message: "Relationship deleted successfully".to_string(),
            deleted_count,
        })
    }

    /// Lists every relationship of `rel_type`.
    pub async fn get_relationships_by_type(&self, rel_type: &str) -> Result<RelationshipList> {
        let rel_type = Identifier::parse(rel_type, RELATIONSHIP_TYPE)?;
        let statement = Statement::new(format!("MATCH ()-[r:{rel_type}]->() RETURN r"));
        let rows = self
            .connections
            .run_once("get_relationships_by_type", &statement)
            .await?;
        let relationships = rows
            .into_iter()
            .map(|mut row| take_relationship(&mut row, "r"))
            .collect::<Result<Vec<_>>>()?;
        Ok(RelationshipList::from(relationships))
    }
}

fn create_relationship_statement(
    rel_type: &Identifier,
    from_id: i64,
    to_id: i64,
    properties: Map<String, Value>,
) -> Statement {
    Statement::new(format!(
        "MATCH (a) WHERE id(a) = $from_node \
         MATCH (b) WHERE id(b) = $to_node \
         CREATE (a)-[r:{rel_type} $properties]->(b) RETURN r"
    ))
    .param("from_node", from_id)
    .param("to_node", to_id)
    .param("properties", properties)
}
