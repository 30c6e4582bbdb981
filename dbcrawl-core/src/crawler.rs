//! Crawl orchestration.
//!
//! The [`Crawler`] walks database → schema → table/view → column through a
//! [`CatalogInspector`], applies the per-level filters, deduplicates by
//! identifier, maps column types and pushes work units to an
//! [`EntitySink`]. When the walk ends it dispatches profiling and runs the
//! stale-entity diff.
//!
//! Failure scope follows where an error is caught:
//!
//! - listing databases, opening a session, cancellation: fatal, the run
//!   returns `Err` and no checkpoint is written
//! - listing schemas, tables or views: the database or schema is recorded as
//!   a [`FailureKind::SchemaEnumeration`] and siblings proceed
//! - anything while building or emitting one table/view: recorded as a
//!   [`FailureKind::EntityProcessing`] and the entity is skipped
//!
//! The walk is sequential and holds one session per database.

use crate::{
    Result,
    config::CrawlConfig,
    dialect::{Dialect, StandardDialect},
    error::CrawlError,
    filter::PatternFilter,
    inspector::{
        CatalogInspector, ColumnDescriptorMap, DatabaseInspector, TableKey, group_columns_by_table,
    },
    models::{
        CanonicalField, ColumnDescriptor, ContainerEntity, ContainerKey, ContainerSubtype,
        DatasetEntity, DatasetIdentifier, DatasetKind, ForeignKeyConstraint, ForeignKeyRef,
        ProfileRequest, UpstreamLineage, WorkUnit,
    },
    profiling::{self, ProfileCandidateSelector, Profiler},
    report::{CrawlReport, FailureKind, MISSING_COLUMN_INFO},
    sink::EntitySink,
    stale::StaleEntityRemover,
    state::CheckpointStore,
    type_mapping::TypeMapper,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle of one crawl run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    /// No run started yet
    Idle,
    /// Databases listed
    Connected,
    /// Between databases
    WalkingDatabases,
    /// Inside one database, between schemas
    WalkingSchemas,
    /// Inside one schema, processing tables and views
    WalkingEntities,
    /// Profiling dispatch and stale-entity removal
    Finalizing,
    /// Run completed, report returned
    Done,
    /// Terminal state after a fatal error
    Failed,
}

/// Collaborators for one run.
pub struct CrawlContext<'a> {
    /// Catalog being crawled
    pub inspector: &'a dyn CatalogInspector,
    /// Receives every work unit
    pub sink: &'a dyn EntitySink,
    /// Checkpoint store; stale removal only runs when set
    pub checkpoints: Option<&'a dyn CheckpointStore>,
    /// Profiler for eligible tables
    pub profiler: Option<&'a dyn Profiler>,
    /// Checked before each database and each schema
    pub cancel: CancellationToken,
}

impl<'a> CrawlContext<'a> {
    /// Context without checkpoints, profiler or external cancellation.
    pub fn new(inspector: &'a dyn CatalogInspector, sink: &'a dyn EntitySink) -> Self {
        Self {
            inspector,
            sink,
            checkpoints: None,
            profiler: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Builder method to set the checkpoint store.
    pub fn with_checkpoints(mut self, store: &'a dyn CheckpointStore) -> Self {
        self.checkpoints = Some(store);
        self
    }

    /// Builder method to set the profiler.
    pub fn with_profiler(mut self, profiler: &'a dyn Profiler) -> Self {
        self.profiler = Some(profiler);
        self
    }

    /// Builder method to set the cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

struct CrawlFilters {
    database: PatternFilter,
    schema: PatternFilter,
    table: PatternFilter,
    view: PatternFilter,
    profile: PatternFilter,
}

impl CrawlFilters {
    fn compile(config: &CrawlConfig) -> Result<Self> {
        Ok(Self {
            database: PatternFilter::compile(&config.database_pattern)?,
            schema: PatternFilter::compile(&config.schema_pattern)?,
            table: PatternFilter::compile(&config.table_pattern)?,
            view: PatternFilter::compile(&config.view_pattern)?,
            profile: PatternFilter::compile(&config.profile_pattern)?,
        })
    }
}

/// Mutable state of one run, threaded through the walk.
struct RunState {
    state: CrawlState,
    platform: String,
    report: CrawlReport,
    /// Dataset urns already considered this run, emitted or not, with the
    /// kind that claimed them
    processed: HashMap<String, EntityKind>,
    /// Urns of every emitted container and dataset, plus listed datasets
    /// that failed processing and still exist in the catalog
    seen: BTreeSet<String>,
    profile_requests: Vec<ProfileRequest>,
}

impl RunState {
    fn transition(&mut self, next: CrawlState) {
        if self.state != next {
            debug!("Crawl state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}

/// Table or view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityKind {
    Table,
    View,
}

impl EntityKind {
    fn is_view(self) -> bool {
        self == EntityKind::View
    }

    fn label(self) -> &'static str {
        match self {
            EntityKind::Table => "table",
            EntityKind::View => "view",
        }
    }
}

/// Native names locating one entity in the catalog.
struct EntityLocation<'s> {
    database: &'s str,
    schema: &'s str,
    name: &'s str,
}

/// Catalog crawl engine.
///
/// # Example
/// ```rust,no_run
/// use dbcrawl_core::config::CrawlConfig;
/// use dbcrawl_core::crawler::{CrawlContext, Crawler};
/// use dbcrawl_core::inspector::CatalogInspector;
/// use dbcrawl_core::sink::MemorySink;
///
/// # async fn example(inspector: &dyn CatalogInspector) -> dbcrawl_core::Result<()> {
/// let mut crawler = Crawler::new(CrawlConfig::default())?;
/// let sink = MemorySink::new();
/// let report = crawler.run(CrawlContext::new(inspector, &sink)).await?;
/// println!("{}", report);
/// # Ok(())
/// # }
/// ```
pub struct Crawler {
    config: CrawlConfig,
    filters: CrawlFilters,
    type_mapper: TypeMapper,
    dialect: Arc<dyn Dialect>,
    state: CrawlState,
}

impl Crawler {
    /// Creates a crawler, validating the configuration.
    ///
    /// # Errors
    /// Returns a configuration error if any value or pattern is invalid
    pub fn new(config: CrawlConfig) -> Result<Self> {
        config.validate()?;
        let filters = CrawlFilters::compile(&config)?;
        let dialect = StandardDialect::new()
            .with_case(config.identifier_case)
            .with_catalog_subtype(config.use_catalog_subtype);

        Ok(Self {
            config,
            filters,
            type_mapper: TypeMapper::new(),
            dialect: Arc::new(dialect),
            state: CrawlState::Idle,
        })
    }

    /// Builder method to replace the type mapper.
    pub fn with_type_mapper(mut self, type_mapper: TypeMapper) -> Self {
        self.type_mapper = type_mapper;
        self
    }

    /// Builder method to replace the dialect hooks.
    pub fn with_dialect(mut self, dialect: Arc<dyn Dialect>) -> Self {
        self.dialect = dialect;
        self
    }

    /// Configuration this crawler was built with.
    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// State the last run ended in.
    pub fn state(&self) -> CrawlState {
        self.state
    }

    /// Runs one crawl.
    ///
    /// # Errors
    /// Returns error only for fatal failures: the catalog cannot be reached,
    /// databases cannot be listed, a session cannot be opened, the checkpoint
    /// cannot be loaded or saved, or the run is cancelled. Everything else is
    /// recorded in the returned report.
    pub async fn run(&mut self, ctx: CrawlContext<'_>) -> Result<CrawlReport> {
        let mut run = RunState {
            state: CrawlState::Idle,
            platform: self
                .config
                .platform
                .clone()
                .unwrap_or_else(|| ctx.inspector.platform().to_string()),
            report: CrawlReport::new(),
            processed: HashMap::new(),
            seen: BTreeSet::new(),
            profile_requests: Vec::new(),
        };

        info!(
            "Starting crawl run {} for job '{}' on platform '{}'",
            run.report.run_id, self.config.job_id, run.platform
        );

        let result = self.execute(&ctx, &mut run).await;
        match result {
            Ok(()) => {
                run.report.finish();
                run.transition(CrawlState::Done);
                self.state = run.state;
                info!(
                    "Crawl run {} finished: {} tables, {} views, {} failures",
                    run.report.run_id,
                    run.report.tables_scanned,
                    run.report.views_scanned,
                    run.report.failures.len()
                );
                Ok(run.report)
            }
            Err(e) => {
                run.transition(CrawlState::Failed);
                self.state = run.state;
                error!("Crawl run {} failed: {}", run.report.run_id, e);
                Err(e)
            }
        }
    }

    async fn execute(&self, ctx: &CrawlContext<'_>, run: &mut RunState) -> Result<()> {
        let remover = ctx
            .checkpoints
            .filter(|_| self.config.stateful_ingestion.enabled)
            .map(|store| {
                StaleEntityRemover::new(store, &self.config.job_id).with_remove_stale_metadata(
                    self.config.stateful_ingestion.remove_stale_metadata,
                )
            });

        // Loaded once and never touched until the walk completes
        let previous = match &remover {
            Some(remover) => Some(remover.load_previous().await?),
            None => None,
        };

        let mut databases = ctx.inspector.list_databases().await?;
        databases.sort();
        databases.dedup();
        run.transition(CrawlState::Connected);

        run.transition(CrawlState::WalkingDatabases);
        for database in &databases {
            if ctx.cancel.is_cancelled() {
                return Err(CrawlError::Cancelled);
            }
            if !self.filters.database.allowed(database) {
                debug!("Database '{}' dropped by database_pattern", database);
                run.report.report_dropped(database.clone());
                continue;
            }
            self.walk_database(ctx, run, database).await?;
            run.transition(CrawlState::WalkingDatabases);
        }

        run.transition(CrawlState::Finalizing);

        if self.config.profiling.enabled {
            match ctx.profiler {
                Some(profiler) => {
                    let requests = std::mem::take(&mut run.profile_requests);
                    profiling::dispatch_profiles(
                        profiler,
                        requests,
                        self.config.profiling.max_workers,
                        ctx.sink,
                        &mut run.report,
                    )
                    .await;
                }
                None => warn!(
                    "Profiling enabled but no profiler configured, {} requests skipped",
                    run.profile_requests.len()
                ),
            }
        }

        let (Some(remover), Some(previous)) = (remover, previous) else {
            return ctx.sink.flush().await;
        };

        let mut current = std::mem::take(&mut run.seen);
        if self.config.stateful_ingestion.fail_safe_on_failures && !run.report.failures.is_empty()
        {
            warn!(
                "Crawl reported {} failures, carrying previous checkpoint forward instead of removing stale entities",
                run.report.failures.len()
            );
            current.extend(previous.urns.iter().cloned());
        }
        remover
            .emit_removals(&current, &previous, ctx.sink, &mut run.report)
            .await?;
        // Removals must be durable before the checkpoint forgets them
        ctx.sink.flush().await?;
        remover.save(current, run.report.run_id).await
    }

    async fn walk_database(
        &self,
        ctx: &CrawlContext<'_>,
        run: &mut RunState,
        database: &str,
    ) -> Result<()> {
        let session = ctx.inspector.connect(database).await?;
        info!("Crawling database '{}'", database);

        let result = self.walk_schemas(ctx, run, session.as_ref(), database).await;

        if let Err(e) = session.close().await {
            warn!("Failed to close session for database '{}': {}", database, e);
        }
        result
    }

    async fn walk_schemas(
        &self,
        ctx: &CrawlContext<'_>,
        run: &mut RunState,
        session: &dyn DatabaseInspector,
        database: &str,
    ) -> Result<()> {
        let database_key = ContainerKey {
            platform: run.platform.clone(),
            platform_instance: self.config.platform_instance.clone(),
            environment: self.config.env.clone(),
            path: vec![self.dialect.normalize_identifier(database)],
        };
        let database_container = ContainerEntity {
            key: database_key.clone(),
            name: database.to_string(),
            subtype: self.dialect.database_subtype(),
            parent: None,
            properties: BTreeMap::new(),
        };
        if let Err(e) = self.emit_container(ctx, run, database_container).await {
            warn!("Skipping database '{}': {}", database, e);
            run.report
                .report_failure(FailureKind::EntityProcessing, database, e.to_string());
            return Ok(());
        }

        run.transition(CrawlState::WalkingSchemas);
        let mut schemas = match session.list_schemas().await {
            Ok(schemas) => schemas,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("Failed to list schemas of database '{}': {}", database, e);
                run.report
                    .report_failure(FailureKind::SchemaEnumeration, database, e.to_string());
                return Ok(());
            }
        };
        schemas.sort();
        schemas.dedup();

        for schema in &schemas {
            if ctx.cancel.is_cancelled() {
                info!("Cancellation requested, stopping before schema '{}'", schema);
                return Err(CrawlError::Cancelled);
            }

            if !self.filters.schema.allowed(schema) {
                debug!("Schema '{}' dropped by schema_pattern", schema);
                run.report.report_dropped(format!("{}.*", schema));
                continue;
            }

            let schema_container = ContainerEntity {
                key: database_key.child(self.dialect.normalize_identifier(schema)),
                name: schema.clone(),
                subtype: ContainerSubtype::Schema,
                parent: Some(database_key.clone()),
                properties: BTreeMap::new(),
            };
            let schema_key = schema_container.key.clone();
            if let Err(e) = self.emit_container(ctx, run, schema_container).await {
                warn!("Skipping schema '{}.{}': {}", database, schema, e);
                run.report.report_failure(
                    FailureKind::EntityProcessing,
                    format!("{}.{}", database, schema),
                    e.to_string(),
                );
                continue;
            }

            run.transition(CrawlState::WalkingEntities);
            match self
                .walk_schema(ctx, run, session, database, schema, &schema_key)
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Aborting schema '{}.{}': {}", database, schema, e);
                    run.report.report_failure(
                        FailureKind::SchemaEnumeration,
                        format!("{}.{}", database, schema),
                        e.to_string(),
                    );
                }
            }
            run.transition(CrawlState::WalkingSchemas);
        }

        Ok(())
    }

    /// Walks one schema. An `Err` aborts only this schema.
    async fn walk_schema(
        &self,
        ctx: &CrawlContext<'_>,
        run: &mut RunState,
        session: &dyn DatabaseInspector,
        database: &str,
        schema: &str,
        schema_key: &ContainerKey,
    ) -> Result<()> {
        let candidates = if self.config.profiling.enabled && self.config.include_tables {
            match ProfileCandidateSelector::select(
                session,
                schema,
                &self.config.profiling.thresholds(),
            )
            .await
            {
                Ok(candidates) => candidates,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(
                        "Profile candidate selection failed for '{}.{}': {}",
                        database, schema, e
                    );
                    run.report.report_warning(
                        format!("{}.{}", database, schema),
                        format!("profile candidates unavailable, profiling skipped: {}", e),
                    );
                    Some(BTreeSet::new())
                }
            }
        } else {
            None
        };

        let bulk_columns = match session.list_schema_columns(schema).await {
            Ok(rows) => Some(group_columns_by_table(rows)),
            Err(e) if e.is_not_supported() => None,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                debug!(
                    "Bulk column listing failed for '{}', falling back per entity: {}",
                    schema, e
                );
                None
            }
        };

        let walk = SchemaWalk {
            session,
            schema_key,
            bulk_columns: bulk_columns.as_ref(),
            candidates: candidates.as_ref(),
        };

        if self.config.include_tables {
            let mut tables = session.list_tables(schema).await?;
            tables.sort();
            for table in &tables {
                let location = EntityLocation {
                    database,
                    schema,
                    name: table,
                };
                self.process_entity(ctx, run, &walk, EntityKind::Table, &location)
                    .await?;
            }
        }

        if self.config.include_views {
            let mut views = session.list_views(schema).await?;
            views.sort();
            for view in &views {
                let location = EntityLocation {
                    database,
                    schema,
                    name: view,
                };
                self.process_entity(ctx, run, &walk, EntityKind::View, &location)
                    .await?;
            }
        }

        Ok(())
    }

    /// Dedups, filters, builds and emits one entity. Returns `Err` only for
    /// fatal errors.
    async fn process_entity(
        &self,
        ctx: &CrawlContext<'_>,
        run: &mut RunState,
        walk: &SchemaWalk<'_>,
        kind: EntityKind,
        location: &EntityLocation<'_>,
    ) -> Result<()> {
        let (schema_name, entity_name) = self
            .dialect
            .standardize_names(location.schema, location.name);
        let identifier = DatasetIdentifier::new(
            run.platform.clone(),
            self.config.platform_instance.clone(),
            self.config.env.clone(),
            vec![
                self.dialect.normalize_identifier(location.database),
                self.dialect.normalize_identifier(&schema_name),
            ],
            self.dialect.normalize_identifier(&entity_name),
        );
        let dataset_name = identifier.qualified_name();

        match run.processed.get(&identifier.urn()) {
            Some(&seen) if seen == kind => {
                debug!("{} has already been seen, skipping", dataset_name);
                return Ok(());
            }
            Some(&seen) => {
                warn!(
                    "{:?} {} shares its identifier with a {:?}, skipping",
                    kind, dataset_name, seen
                );
                run.report.report_warning(
                    dataset_name.clone(),
                    format!(
                        "{} skipped: identifier already used by a {}",
                        kind.label(),
                        seen.label()
                    ),
                );
                return Ok(());
            }
            None => {
                run.processed.insert(identifier.urn(), kind);
            }
        }
        run.report.report_entity_scanned(kind.is_view());

        let filter = if kind.is_view() {
            &self.filters.view
        } else {
            &self.filters.table
        };
        if !filter.allowed(&dataset_name) {
            debug!("{} dropped by pattern", dataset_name);
            run.report.report_dropped(dataset_name);
            return Ok(());
        }

        debug!("Processing {:?} {}", kind, dataset_name);
        let urn = identifier.urn();
        let built = self
            .build_dataset(run, walk, kind, location, &entity_name, identifier)
            .await;
        let (entity, storage_location) = match built {
            Ok(built) => built,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("Failed to process {}: {}", dataset_name, e);
                run.report
                    .report_failure(FailureKind::EntityProcessing, dataset_name, e.to_string());
                run.seen.insert(urn);
                return Ok(());
            }
        };

        let identifier = entity.identifier.clone();
        run.seen.insert(urn.clone());
        if let Err(e) = ctx.sink.emit(&WorkUnit::Dataset(entity)).await {
            warn!("Failed to emit {}: {}", dataset_name, e);
            run.report
                .report_failure(FailureKind::EntityProcessing, dataset_name, e.to_string());
            return Ok(());
        }
        run.report.report_work_unit();

        if let Some(upstream_location) =
            storage_location.filter(|_| self.config.include_table_location_lineage)
        {
            let lineage = WorkUnit::Lineage(UpstreamLineage {
                dataset: urn,
                upstream_location,
            });
            match ctx.sink.emit(&lineage).await {
                Ok(()) => run.report.report_work_unit(),
                Err(e) => {
                    warn!("Failed to emit lineage of {}: {}", dataset_name, e);
                    run.report
                        .report_warning(dataset_name.clone(), format!("lineage not emitted: {}", e));
                }
            }
        }

        if kind == EntityKind::Table && self.config.profiling.enabled {
            self.queue_profile(run, walk, location, &identifier).await;
        }

        Ok(())
    }

    async fn queue_profile(
        &self,
        run: &mut RunState,
        walk: &SchemaWalk<'_>,
        location: &EntityLocation<'_>,
        identifier: &DatasetIdentifier,
    ) {
        let dataset_name = identifier.qualified_name();
        let eligible = profiling::is_eligible(
            &dataset_name,
            location.name,
            &self.filters.table,
            &self.filters.profile,
            walk.candidates,
        ) && !run.report.has_missing_column_info(&dataset_name);

        if !eligible {
            if self.config.profiling.report_dropped_profiles {
                run.report
                    .report_dropped(format!("profile of {}", dataset_name));
            }
            return;
        }

        if let Some(request) = profiling::plan_profile_request(
            walk.session,
            identifier,
            location.schema,
            location.name,
            &self.config.profiling,
            &mut run.report,
        )
        .await
        {
            run.profile_requests.push(request);
        }
    }

    /// Builds the dataset entity and returns it with its storage location.
    async fn build_dataset(
        &self,
        run: &mut RunState,
        walk: &SchemaWalk<'_>,
        kind: EntityKind,
        location: &EntityLocation<'_>,
        standardized_name: &str,
        identifier: DatasetIdentifier,
    ) -> Result<(DatasetEntity, Option<String>)> {
        let session = walk.session;
        let (schema, name) = (location.schema, location.name);
        let dataset_name = identifier.qualified_name();

        let columns = match walk
            .bulk_columns
            .and_then(|grouped| grouped.get(&TableKey::new(schema, name)))
        {
            Some(columns) => columns.clone(),
            None => {
                let mut columns = session.get_columns(name, schema).await?;
                columns.sort_by(|a, b| a.ordinal.cmp(&b.ordinal).then_with(|| a.name.cmp(&b.name)));
                columns
            }
        };
        if columns.is_empty() {
            warn!("Missing column information for {}", dataset_name);
            run.report.report_warning(MISSING_COLUMN_INFO, dataset_name.clone());
        }

        let comment = supported_or_default(session.get_table_comment(name, schema).await)?;
        let mut properties = comment.properties;
        if standardized_name != name {
            properties.insert("original_table_name".to_string(), name.to_string());
        }

        let column_tags = lenient(
            session.get_column_tags(name, schema).await,
            &mut run.report,
            &dataset_name,
            "column tags",
        )?;

        let (kind, primary_key, foreign_keys, storage_location) = match kind {
            EntityKind::Table => {
                let primary_key = lenient(
                    session.get_primary_key(name, schema).await,
                    &mut run.report,
                    &dataset_name,
                    "primary key",
                )?;
                let foreign_keys = lenient(
                    session.get_foreign_keys(name, schema).await,
                    &mut run.report,
                    &dataset_name,
                    "foreign keys",
                )?;
                let storage = supported_or_default(session.get_table_storage(name, schema).await)?;

                let partition_column_names: Vec<String> = columns
                    .iter()
                    .filter(|c| c.is_partition_key)
                    .map(|c| c.name.clone())
                    .collect();
                if !partition_column_names.is_empty() {
                    properties.insert(
                        "partitioned_columns".to_string(),
                        partition_column_names.join(","),
                    );
                }
                if let Some(created_at) = storage.created_at {
                    properties.insert("create_date".to_string(), created_at.to_rfc3339());
                }
                if let Some(location) = &storage.location {
                    properties.insert("table_location".to_string(), location.clone());
                }

                let kind = DatasetKind::Table {
                    create_date: storage.created_at,
                    storage_location: storage.location.clone(),
                    partition_column_names,
                };
                (kind, primary_key, foreign_keys, storage.location)
            }
            EntityKind::View => {
                let definition =
                    supported_or_default(session.get_view_definition(name, schema).await)?;
                properties.insert("is_view".to_string(), "True".to_string());
                let kind = DatasetKind::View {
                    view_definition_text: definition,
                    is_materialized: false,
                };
                (kind, None, Vec::new(), None)
            }
        };

        let key_columns: HashSet<&str> = primary_key
            .as_ref()
            .map(|pk| pk.columns.iter().map(String::as_str).collect())
            .unwrap_or_default();
        let fields =
            self.build_fields(&columns, &key_columns, &column_tags, &dataset_name, &mut run.report);
        let foreign_keys = self.resolve_foreign_keys(&identifier, location, foreign_keys);

        let entity = DatasetEntity {
            identifier,
            container: walk.schema_key.clone(),
            description: comment.text,
            fields,
            foreign_keys,
            properties,
            kind,
        };
        Ok((entity, storage_location))
    }

    fn build_fields(
        &self,
        columns: &[ColumnDescriptor],
        key_columns: &HashSet<&str>,
        column_tags: &BTreeMap<String, Vec<String>>,
        dataset_name: &str,
        report: &mut CrawlReport,
    ) -> Vec<CanonicalField> {
        let mut paths = HashSet::new();
        let mut fields = Vec::with_capacity(columns.len());

        for column in columns {
            let path = self.dialect.field_path(column);
            if !paths.insert(path.clone()) {
                warn!("Duplicate field '{}' in {}, keeping the first", path, dataset_name);
                report.report_warning(dataset_name, format!("duplicate field {}", path));
                continue;
            }

            let mapping = self.type_mapper.map(&column.native_type);
            if !mapping.matched {
                warn!(
                    "Unable to map type {} of {}.{} to metadata schema",
                    column.native_type, dataset_name, column.name
                );
                report.report_warning(
                    dataset_name,
                    format!(
                        "unable to map type {} to metadata schema",
                        column.native_type
                    ),
                );
            }

            fields.push(CanonicalField {
                path,
                type_category: mapping.category,
                native_type_label: column.native_type.clone(),
                nullable: column.nullable,
                description: self.dialect.field_description(column),
                tags: column_tags.get(&column.name).cloned().unwrap_or_default(),
                is_key_column: key_columns.contains(column.name.as_str()),
            });
        }

        fields
    }

    fn resolve_foreign_keys(
        &self,
        source: &DatasetIdentifier,
        location: &EntityLocation<'_>,
        foreign_keys: Vec<ForeignKeyRef>,
    ) -> Vec<ForeignKeyConstraint> {
        foreign_keys
            .into_iter()
            .map(|fk| {
                let referred_schema = fk.referred_schema.as_deref().unwrap_or(location.schema);
                let (schema_name, table_name) = self
                    .dialect
                    .standardize_names(referred_schema, &fk.referred_table);
                let foreign = DatasetIdentifier::new(
                    source.platform.clone(),
                    source.platform_instance.clone(),
                    source.environment.clone(),
                    vec![
                        self.dialect.normalize_identifier(location.database),
                        self.dialect.normalize_identifier(&schema_name),
                    ],
                    self.dialect.normalize_identifier(&table_name),
                );

                ForeignKeyConstraint {
                    name: fk.name,
                    source_fields: fk
                        .constrained_columns
                        .iter()
                        .map(|c| source.field_urn(c))
                        .collect(),
                    foreign_fields: fk
                        .referred_columns
                        .iter()
                        .map(|c| foreign.field_urn(c))
                        .collect(),
                    foreign_dataset: foreign.urn(),
                }
            })
            .collect()
    }

    async fn emit_container(
        &self,
        ctx: &CrawlContext<'_>,
        run: &mut RunState,
        container: ContainerEntity,
    ) -> Result<()> {
        let urn = container.key.urn();
        if run.seen.contains(&urn) {
            return Ok(());
        }
        ctx.sink.emit(&WorkUnit::Container(container)).await?;
        run.report.report_work_unit();
        run.seen.insert(urn);
        Ok(())
    }
}

/// Per-schema context shared by every entity of the schema.
struct SchemaWalk<'a> {
    session: &'a dyn DatabaseInspector,
    schema_key: &'a ContainerKey,
    bulk_columns: Option<&'a ColumnDescriptorMap>,
    candidates: Option<&'a BTreeSet<String>>,
}

/// Maps the NotSupported signal to "no data".
fn supported_or_default<T: Default>(result: Result<T>) -> Result<T> {
    match result {
        Err(e) if e.is_not_supported() => Ok(T::default()),
        other => other,
    }
}

/// Like [`supported_or_default`], but non-fatal errors also become "no
/// data" with a warning.
fn lenient<T: Default>(
    result: Result<T>,
    report: &mut CrawlReport,
    dataset_name: &str,
    what: &str,
) -> Result<T> {
    match supported_or_default(result) {
        Ok(value) => Ok(value),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!("Failed to get {} of {}: {}", what, dataset_name, e);
            report.report_warning(dataset_name, format!("failed to get {}: {}", what, e));
            Ok(T::default())
        }
    }
}
