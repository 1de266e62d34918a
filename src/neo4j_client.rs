use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use neo4rs::{query, Graph, Row};
use tracing::{debug, info};
use url::Url;

use crate::config::Neo4jConfig;
use crate::error::StoreError;
use crate::models::{IssueRecord, NewIssue};
use crate::store::{new_issue_id, next_timestamp, IssueStore};

pub async fn connect_from_config(cfg: &Neo4jConfig) -> Result<Graph> {
    let url = Url::parse(&cfg.uri)?;
    let host = url.host_str().unwrap_or("localhost");
    let port = url.port().unwrap_or(7687);
    let addr = format!("{host}:{port}");

    info!("Conectando a Neo4j en {addr}...");
    let graph = Graph::new(&addr, &cfg.user, &cfg.password).await?;
    info!("Conexión a Neo4j OK");
    Ok(graph)
}

/// Crea los constraints e índices usados por los nodos :Issue.
pub async fn ensure_schema(graph: &Graph) -> Result<()> {
    let statements = [
        // Issue.id único
        "CREATE CONSTRAINT issue_id IF NOT EXISTS
         FOR (i:Issue)
         REQUIRE i.id IS UNIQUE",
        // Orden del panel por fecha de creación
        "CREATE INDEX issue_created_at IF NOT EXISTS
         FOR (i:Issue)
         ON (i.created_at_ms)",
    ];

    for stmt in statements {
        graph.run(query(stmt)).await?;
    }

    info!("Esquema de Neo4j asegurado (constraints de :Issue creados).");
    Ok(())
}

/// Almacén de incidencias sobre nodos (:Issue) de Neo4j.
pub struct Neo4jIssueStore {
    graph: Graph,
    last_created_at: Mutex<Option<DateTime<Utc>>>,
}

impl Neo4jIssueStore {
    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            last_created_at: Mutex::new(None),
        }
    }

    fn stamp(&self) -> DateTime<Utc> {
        match self.last_created_at.lock() {
            Ok(mut last) => {
                let ts = next_timestamp(*last);
                *last = Some(ts);
                ts
            }
            Err(_) => Utc::now(),
        }
    }
}

#[async_trait]
impl IssueStore for Neo4jIssueStore {
    async fn append(&self, issue: NewIssue) -> Result<IssueRecord, StoreError> {
        let record = IssueRecord::from_new(new_issue_id(), self.stamp(), issue);

        self.graph
            .run(
                query(
                    "CREATE (i:Issue {
                        id: $id,
                        description: $description,
                        department: $department,
                        category: $category,
                        urgency: $urgency,
                        draft: $draft,
                        lat: $lat,
                        lng: $lng,
                        pincode: $pincode,
                        created_at: $created_at,
                        created_at_ms: $created_at_ms
                     })",
                )
                .param("id", record.id.clone())
                .param("description", record.description.clone())
                .param("department", record.department.clone())
                .param("category", record.category.clone())
                .param("urgency", record.urgency.clone())
                .param("draft", record.draft.clone())
                .param("lat", record.lat)
                .param("lng", record.lng)
                .param("pincode", record.pincode.clone().unwrap_or_default())
                .param("created_at", record.created_at.to_rfc3339())
                .param("created_at_ms", record.created_at.timestamp_millis()),
            )
            .await?;

        debug!("Incidencia {} guardada en Neo4j", record.id);
        Ok(record)
    }

    async fn list_all(&self) -> Result<Vec<IssueRecord>, StoreError> {
        let mut cursor = self
            .graph
            .execute(query(
                "MATCH (i:Issue)
                 RETURN i.id AS id, i.description AS description, i.department AS department,
                        i.category AS category, i.urgency AS urgency, i.draft AS draft,
                        i.lat AS lat, i.lng AS lng, i.pincode AS pincode,
                        i.created_at_ms AS created_at_ms
                 ORDER BY i.created_at_ms DESC",
            ))
            .await?;

        let mut output = Vec::new();
        while let Some(row) = cursor.next().await? {
            output.push(record_from_row(&row)?);
        }
        Ok(output)
    }

    fn backend_name(&self) -> &'static str {
        "neo4j"
    }
}

fn record_from_row(row: &Row) -> Result<IssueRecord, StoreError> {
    let text = |key: &str| -> Result<String, StoreError> {
        row.get::<String>(key)
            .ok_or_else(|| StoreError::Malformed(format!("falta el campo '{key}'")))
    };
    let number = |key: &str| -> Result<f64, StoreError> {
        row.get::<f64>(key)
            .ok_or_else(|| StoreError::Malformed(format!("falta el campo '{key}'")))
    };

    let id = text("id")?;
    let created_at_ms: i64 = row
        .get("created_at_ms")
        .ok_or_else(|| StoreError::Malformed(format!("falta created_at_ms en {id}")))?;
    let created_at = Utc
        .timestamp_millis_opt(created_at_ms)
        .single()
        .ok_or_else(|| StoreError::Malformed(format!("created_at_ms inválido en {id}")))?;

    Ok(IssueRecord {
        description: text("description")?,
        department: text("department")?,
        category: text("category")?,
        urgency: text("urgency")?,
        draft: text("draft")?,
        lat: number("lat")?,
        lng: number("lng")?,
        pincode: row.get::<String>("pincode").filter(|p| !p.is_empty()),
        created_at,
        id,
    })
}
