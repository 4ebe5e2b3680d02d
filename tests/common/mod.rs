//! Shared fixtures for the integration suite.

use sitepack::core::{Context, RecordData, Schema};
use sitepack::engine::{
    Depth, ExportConfig, ExportOutcome, Exporter, ImportConfig, ImportOutcome, Importer,
};
use sitepack::model::Document;
use sitepack::store::{builtin_schema, MemoryBlobStore, MemoryStore, SchemaReferenceIndex};

/// One repository instance: schema + record store + blob store + context.
pub struct Repo {
    pub schema: Schema,
    pub store: MemoryStore,
    pub blobs: MemoryBlobStore,
    pub ctx: Context,
}

impl Repo {
    pub fn new() -> Self {
        Self {
            schema: builtin_schema(),
            store: MemoryStore::new(),
            blobs: MemoryBlobStore::new(),
            ctx: Context::operator("tests"),
        }
    }

    pub fn elevated() -> Self {
        Self {
            ctx: Context::elevated("tests"),
            ..Self::new()
        }
    }

    pub fn export(&self, config: ExportConfig) -> ExportOutcome {
        let index = SchemaReferenceIndex::new(&self.schema, &self.blobs);
        Exporter::new(
            &self.ctx,
            &self.schema,
            &self.store,
            &index,
            &self.blobs,
            config,
        )
        .run()
        .expect("export run")
    }

    pub fn import(&mut self, doc: Document, config: ImportConfig) -> ImportOutcome {
        Importer::new(
            &self.ctx,
            &self.schema,
            &mut self.store,
            &mut self.blobs,
            doc,
            config,
        )
        .run()
        .expect("import run")
    }
}

pub fn row(uid: i64, pid: i64) -> RecordData {
    RecordData::new().with("uid", uid).with("pid", pid)
}

/// Export everything under a root page.
pub fn subtree_config(root: i64) -> ExportConfig {
    ExportConfig {
        title: "integration".to_string(),
        root_page: Some(root),
        depth: Depth::Infinite,
        tables: vec!["*".to_string()],
        relation_tables: vec!["*".to_string()],
        ..Default::default()
    }
}
