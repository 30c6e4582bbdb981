//! Scripted in-memory catalog shared by the crawler integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use dbcrawl_core::{
    CrawlError, Result,
    inspector::{CatalogInspector, ColumnRow, DatabaseInspector},
    models::{
        ColumnDescriptor, DatasetEntity, DatasetProfile, FieldProfile, ForeignKeyRef,
        PrimaryKey, ProfileRequest, TableComment, TableStorage, WorkUnit,
    },
    profiling::{ProfileThresholds, Profiler},
    sink::{EntitySink, MemorySink},
};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

pub const PLATFORM: &str = "scripted";

#[derive(Debug, Clone, Default)]
pub struct ScriptedEntity {
    pub name: String,
    pub is_view: bool,
    pub columns: Vec<ColumnDescriptor>,
    pub primary_key: Option<Vec<String>>,
    pub foreign_keys: Vec<ForeignKeyRef>,
    pub comment: Option<String>,
    pub view_definition: Option<String>,
    pub location: Option<String>,
    pub fail_columns: bool,
    pub fail_primary_key: bool,
}

#[derive(Debug, Default)]
struct CatalogScript {
    /// database -> schema -> entities, in listing order
    databases: BTreeMap<String, BTreeMap<String, Vec<ScriptedEntity>>>,
    fail_list_databases: bool,
    fail_connect: HashSet<String>,
    fail_table_listing: HashSet<(String, String)>,
    bulk_columns: bool,
    row_permutation: Option<Vec<usize>>,
    profile_candidates: Option<Vec<String>>,
    cancel_on_schema: Option<(String, CancellationToken)>,
}

/// Catalog whose contents and failures are scripted by the test.
#[derive(Clone, Default)]
pub struct ScriptedCatalog {
    script: Arc<Mutex<CatalogScript>>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

pub fn col(name: &str, native_type: &str, ordinal: u32) -> ColumnDescriptor {
    ColumnDescriptor::new(name, native_type, ordinal)
}

impl ScriptedCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_script(&self, f: impl FnOnce(&mut CatalogScript)) {
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut script);
    }

    fn with_entity(&self, db: &str, schema: &str, name: &str, f: impl FnOnce(&mut ScriptedEntity)) {
        self.with_script(|script| {
            if let Some(entity) = script
                .databases
                .get_mut(db)
                .and_then(|schemas| schemas.get_mut(schema))
                .and_then(|entities| entities.iter_mut().find(|e| e.name == name))
            {
                f(entity);
            }
        });
    }

    pub fn schema(self, db: &str, schema: &str) -> Self {
        self.with_script(|script| {
            script
                .databases
                .entry(db.to_string())
                .or_default()
                .entry(schema.to_string())
                .or_default();
        });
        self
    }

    pub fn entity(self, db: &str, schema: &str, entity: ScriptedEntity) -> Self {
        self.with_script(|script| {
            script
                .databases
                .entry(db.to_string())
                .or_default()
                .entry(schema.to_string())
                .or_default()
                .push(entity);
        });
        self
    }

    pub fn table(self, db: &str, schema: &str, name: &str, columns: Vec<ColumnDescriptor>) -> Self {
        self.entity(
            db,
            schema,
            ScriptedEntity {
                name: name.to_string(),
                columns,
                ..Default::default()
            },
        )
    }

    pub fn view(
        self,
        db: &str,
        schema: &str,
        name: &str,
        columns: Vec<ColumnDescriptor>,
        definition: &str,
    ) -> Self {
        self.entity(
            db,
            schema,
            ScriptedEntity {
                name: name.to_string(),
                is_view: true,
                columns,
                view_definition: Some(definition.to_string()),
                ..Default::default()
            },
        )
    }

    pub fn primary_key(self, db: &str, schema: &str, table: &str, columns: &[&str]) -> Self {
        self.with_entity(db, schema, table, |e| {
            e.primary_key = Some(columns.iter().map(|c| (*c).to_string()).collect());
        });
        self
    }

    pub fn foreign_key(self, db: &str, schema: &str, table: &str, fk: ForeignKeyRef) -> Self {
        self.with_entity(db, schema, table, |e| e.foreign_keys.push(fk));
        self
    }

    pub fn location(self, db: &str, schema: &str, table: &str, location: &str) -> Self {
        self.with_entity(db, schema, table, |e| {
            e.location = Some(location.to_string());
        });
        self
    }

    pub fn comment(self, db: &str, schema: &str, table: &str, comment: &str) -> Self {
        self.with_entity(db, schema, table, |e| {
            e.comment = Some(comment.to_string());
        });
        self
    }

    pub fn failing_columns(self, db: &str, schema: &str, table: &str) -> Self {
        self.with_entity(db, schema, table, |e| e.fail_columns = true);
        self
    }

    pub fn failing_primary_key(self, db: &str, schema: &str, table: &str) -> Self {
        self.with_entity(db, schema, table, |e| e.fail_primary_key = true);
        self
    }

    /// Clears the scripted introspection failures of one entity.
    pub fn drop_failures(self, db: &str, schema: &str, table: &str) -> Self {
        self.with_entity(db, schema, table, |e| {
            e.fail_columns = false;
            e.fail_primary_key = false;
        });
        self
    }

    pub fn failing_table_listing(self, db: &str, schema: &str) -> Self {
        self.with_script(|script| {
            script
                .fail_table_listing
                .insert((db.to_string(), schema.to_string()));
        });
        self
    }

    pub fn failing_database_listing(self) -> Self {
        self.with_script(|script| script.fail_list_databases = true);
        self
    }

    pub fn failing_connect(self, db: &str) -> Self {
        self.with_script(|script| {
            script.fail_connect.insert(db.to_string());
        });
        self
    }

    /// Serve columns through the bulk, ungrouped column listing.
    pub fn bulk_columns(self, row_permutation: Option<Vec<usize>>) -> Self {
        self.with_script(|script| {
            script.bulk_columns = true;
            script.row_permutation = row_permutation;
        });
        self
    }

    pub fn profile_candidates(self, candidates: &[&str]) -> Self {
        self.with_script(|script| {
            script.profile_candidates = Some(candidates.iter().map(|c| (*c).to_string()).collect());
        });
        self
    }

    /// Cancels `token` when the tables of `schema` are listed.
    pub fn cancel_on_schema(self, schema: &str, token: CancellationToken) -> Self {
        self.with_script(|script| {
            script.cancel_on_schema = Some((schema.to_string(), token));
        });
        self
    }

    /// Removes an entity between runs.
    pub fn drop_entity(&self, db: &str, schema: &str, name: &str) {
        self.with_script(|script| {
            if let Some(entities) = script
                .databases
                .get_mut(db)
                .and_then(|schemas| schemas.get_mut(schema))
            {
                entities.retain(|e| e.name != name);
            }
        });
    }

    pub fn opened_sessions(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed_sessions(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

fn transient(context: &str) -> CrawlError {
    CrawlError::introspection_failed(context.to_string(), std::io::Error::other("scripted failure"))
}

#[async_trait]
impl CatalogInspector for ScriptedCatalog {
    fn platform(&self) -> &str {
        PLATFORM
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        let script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        if script.fail_list_databases {
            return Err(CrawlError::connection_failed(
                "catalog unreachable",
                std::io::Error::other("connection refused"),
            ));
        }
        Ok(script.databases.keys().cloned().collect())
    }

    async fn connect(&self, database: &str) -> Result<Box<dyn DatabaseInspector>> {
        let fail = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_connect
            .contains(database);
        if fail {
            return Err(CrawlError::connection_failed(
                format!("cannot open {}", database),
                std::io::Error::other("connection refused"),
            ));
        }

        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            catalog: self.clone(),
            database: database.to_string(),
        }))
    }
}

pub struct ScriptedSession {
    catalog: ScriptedCatalog,
    database: String,
}

impl ScriptedSession {
    fn entities(&self, schema: &str) -> Vec<ScriptedEntity> {
        self.catalog
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .databases
            .get(&self.database)
            .and_then(|schemas| schemas.get(schema))
            .cloned()
            .unwrap_or_default()
    }

    fn find(&self, schema: &str, name: &str) -> Result<ScriptedEntity> {
        self.entities(schema)
            .into_iter()
            .find(|e| e.name == name)
            .ok_or_else(|| transient(&format!("no such entity {}.{}", schema, name)))
    }

    fn list(&self, schema: &str, views: bool) -> Result<Vec<String>> {
        {
            let script = self.catalog.script.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some((cancel_schema, token)) = &script.cancel_on_schema
                && cancel_schema == schema
            {
                token.cancel();
            }
            if script
                .fail_table_listing
                .contains(&(self.database.clone(), schema.to_string()))
            {
                return Err(transient(&format!("listing {} timed out", schema)));
            }
        }

        Ok(self
            .entities(schema)
            .into_iter()
            .filter(|e| e.is_view == views)
            .map(|e| e.name)
            .collect())
    }
}

#[async_trait]
impl DatabaseInspector for ScriptedSession {
    fn platform(&self) -> &str {
        PLATFORM
    }

    async fn list_schemas(&self) -> Result<Vec<String>> {
        Ok(self
            .catalog
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .databases
            .get(&self.database)
            .map(|schemas| schemas.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        self.list(schema, false)
    }

    async fn list_views(&self, schema: &str) -> Result<Vec<String>> {
        self.list(schema, true)
    }

    async fn get_columns(&self, entity: &str, schema: &str) -> Result<Vec<ColumnDescriptor>> {
        let entity = self.find(schema, entity)?;
        if entity.fail_columns {
            return Err(transient(&format!("column query for {} failed", entity.name)));
        }
        Ok(entity.columns)
    }

    async fn list_schema_columns(&self, schema: &str) -> Result<Vec<ColumnRow>> {
        let (bulk, permutation) = {
            let script = self.catalog.script.lock().unwrap_or_else(PoisonError::into_inner);
            (script.bulk_columns, script.row_permutation.clone())
        };
        if !bulk {
            return Err(CrawlError::not_supported("list_schema_columns", PLATFORM));
        }

        let rows: Vec<ColumnRow> = self
            .entities(schema)
            .into_iter()
            .filter(|e| !e.fail_columns)
            .flat_map(|e| {
                let table = e.name.clone();
                e.columns.into_iter().map(move |column| ColumnRow {
                    schema: schema.to_string(),
                    table: table.clone(),
                    column,
                })
            })
            .collect();

        match permutation {
            Some(order) if order.len() == rows.len() => {
                Ok(order.into_iter().map(|i| rows[i].clone()).collect())
            }
            _ => Ok(rows),
        }
    }

    async fn get_table_comment(&self, entity: &str, schema: &str) -> Result<TableComment> {
        let entity = self.find(schema, entity)?;
        Ok(TableComment {
            text: entity.comment,
            properties: BTreeMap::new(),
        })
    }

    async fn get_primary_key(&self, table: &str, schema: &str) -> Result<Option<PrimaryKey>> {
        let entity = self.find(schema, table)?;
        if entity.fail_primary_key {
            return Err(transient("primary key query failed"));
        }
        Ok(entity.primary_key.map(|columns| PrimaryKey {
            name: None,
            columns,
        }))
    }

    async fn get_foreign_keys(&self, table: &str, schema: &str) -> Result<Vec<ForeignKeyRef>> {
        Ok(self.find(schema, table)?.foreign_keys)
    }

    async fn get_view_definition(&self, view: &str, schema: &str) -> Result<Option<String>> {
        Ok(self.find(schema, view)?.view_definition)
    }

    async fn get_table_storage(&self, table: &str, schema: &str) -> Result<TableStorage> {
        let entity = self.find(schema, table)?;
        match entity.location {
            Some(location) => Ok(TableStorage {
                location: Some(location),
                created_at: None,
            }),
            None => Err(CrawlError::not_supported("get_table_storage", PLATFORM)),
        }
    }

    async fn profile_candidates(
        &self,
        _schema: &str,
        _thresholds: &ProfileThresholds,
    ) -> Result<Vec<String>> {
        self.catalog
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .profile_candidates
            .clone()
            .ok_or_else(|| CrawlError::not_supported("profile_candidates", PLATFORM))
    }

    async fn close(&self) -> Result<()> {
        self.catalog.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Profiler that records requests and fails for chosen datasets.
#[derive(Default)]
pub struct ScriptedProfiler {
    requests: Mutex<Vec<ProfileRequest>>,
    failing: HashSet<String>,
}

impl ScriptedProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, qualified_name: &str) -> Self {
        self.failing.insert(qualified_name.to_string());
        self
    }

    /// Qualified names of profiled datasets, sorted.
    pub fn profiled(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|r| r.dataset.qualified_name())
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl Profiler for ScriptedProfiler {
    async fn profile(&self, request: &ProfileRequest) -> Result<DatasetProfile> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let name = request.dataset.qualified_name();
        if self.failing.contains(&name) {
            return Err(transient("profiling query failed"));
        }

        Ok(DatasetProfile {
            dataset: request.dataset.urn(),
            row_count: Some(0),
            column_count: 0,
            partition_spec: request.partition_spec.clone(),
            field_profiles: vec![FieldProfile {
                path: "id".to_string(),
                null_count: Some(0),
                distinct_count: Some(0),
            }],
            profiled_at: Utc::now(),
        })
    }
}

/// Dataset entities among emitted units, in emission order.
pub fn datasets(units: &[WorkUnit]) -> Vec<DatasetEntity> {
    units
        .iter()
        .filter_map(|u| match u {
            WorkUnit::Dataset(d) => Some(d.clone()),
            _ => None,
        })
        .collect()
}

/// Qualified names of emitted datasets, in emission order.
pub fn dataset_names(units: &[WorkUnit]) -> Vec<String> {
    datasets(units)
        .iter()
        .map(|d| d.identifier.qualified_name())
        .collect()
}

/// Urns of removal signals among emitted units.
pub fn removals(units: &[WorkUnit]) -> Vec<String> {
    units
        .iter()
        .filter_map(|u| match u {
            WorkUnit::Removal(r) => Some(r.urn.clone()),
            _ => None,
        })
        .collect()
}

/// Sink that accepts every unit but cannot flush them.
#[derive(Debug, Default)]
pub struct UnflushableSink {
    pub inner: MemorySink,
}

#[async_trait]
impl EntitySink for UnflushableSink {
    async fn emit(&self, unit: &WorkUnit) -> Result<()> {
        self.inner.emit(unit).await
    }

    async fn flush(&self) -> Result<()> {
        Err(CrawlError::sink_failed(
            "Failed to flush work units",
            std::io::Error::other("disk full"),
        ))
    }
}
