//! sitepack CLI — export/import archiver over a JSON repository directory.
//!
//! Two subcommands:
//! - `sitepack export <stem>` — build an archive from the repository
//! - `sitepack import <archive>` — reconstitute an archive into it
//!
//! Exit code 0 when the run report is clean, 1 otherwise.

mod commands;
mod format;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{anyhow, bail, Context as _};
use clap::ArgMatches;

use sitepack_codec::{
    read_document, read_document_xml, write_document_to_path, write_document_xml, ArchiveFormat,
};
use sitepack_core::{Context, RecordId};
use sitepack_engine::{
    render_preview, Depth, ExportConfig, Exporter, ImportConfig, ImportMode, Importer,
};
use sitepack_model::header::{BINARY_EXTENSION, XML_EXTENSION};
use sitepack_store::{builtin_schema, DiskBlobStore, JsonStore, SchemaReferenceIndex};

use commands::build_cli;
use format::{format_preview, format_report};

fn main() {
    let matches = build_cli().get_matches();

    if matches.get_flag("log") {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
            .with_writer(std::io::stderr)
            .init();
    }

    let verbose = matches.get_flag("verbose-errors");
    let outcome = match matches.subcommand() {
        Some(("export", sub)) => run_export(&matches, sub, verbose),
        Some(("import", sub)) => run_import(&matches, sub, verbose),
        _ => unreachable!("subcommand is required"),
    };

    match outcome {
        Ok(true) => process::exit(0),
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(1);
        }
    }
}

fn repo_dir(matches: &ArgMatches) -> PathBuf {
    matches
        .get_one::<String>("repo")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn parse_record_selector(s: &str) -> anyhow::Result<RecordId> {
    RecordId::parse(s).ok_or_else(|| anyhow!("bad record selector '{s}', expected TABLE:UID"))
}

// =============================================================================
// Export
// =============================================================================

fn run_export(global: &ArgMatches, sub: &ArgMatches, verbose: bool) -> anyhow::Result<bool> {
    let dir = repo_dir(global);
    let store = JsonStore::open(&dir).context("open repository")?;
    let blobs = DiskBlobStore::new(JsonStore::assets_dir(&dir));
    let schema = builtin_schema();
    let index = SchemaReferenceIndex::new(&schema, &blobs);
    let ctx = Context::operator("operator");

    let depth = match sub.get_one::<String>("depth").map(String::as_str) {
        Some("page") => Depth::ThisPage,
        Some("infinite") | None => Depth::Infinite,
        Some(n) => Depth::Levels(
            n.parse()
                .map_err(|_| anyhow!("bad depth '{n}', expected a number, 'page' or 'infinite'"))?,
        ),
    };

    let collect = |name: &str| -> Vec<String> {
        sub.get_many::<String>(name)
            .map(|v| v.cloned().collect())
            .unwrap_or_default()
    };

    let mut records = Vec::new();
    for selector in collect("record") {
        records.push(parse_record_selector(&selector)?);
    }
    let mut lists = Vec::new();
    for selector in collect("list") {
        let id = parse_record_selector(&selector)?;
        lists.push((id.table, id.uid));
    }
    let mut exclude = BTreeSet::new();
    for selector in collect("exclude") {
        exclude.insert(parse_record_selector(&selector)?);
    }

    let config = ExportConfig {
        title: sub.get_one::<String>("title").cloned().unwrap_or_default(),
        description: sub
            .get_one::<String>("description")
            .cloned()
            .unwrap_or_default(),
        notes: sub.get_one::<String>("notes").cloned().unwrap_or_default(),
        root_page: sub
            .get_one::<String>("root")
            .map(|r| r.parse::<i64>())
            .transpose()
            .context("bad --root page uid")?,
        depth,
        tables: collect("table"),
        relation_tables: collect("relation-table"),
        records,
        lists,
        exclude,
        exclude_disabled: sub.get_flag("exclude-disabled"),
        extension_dependencies: collect("dep"),
        softref_modes: BTreeMap::new(),
        files_external: sub.get_flag("files-external"),
    };

    let outcome = Exporter::new(&ctx, &schema, &store, &index, &blobs, config)
        .run()
        .context("export run")?;

    let stem = sub.get_one::<String>("stem").expect("stem is required");
    let format = match sub.get_one::<String>("format").map(String::as_str) {
        Some("xml") => ArchiveFormat::Xml,
        Some("bin") | None => ArchiveFormat::Binary,
        Some(other) => bail!("unknown format '{other}'"),
    };
    let path = match format {
        ArchiveFormat::Binary => PathBuf::from(format!("{stem}.{BINARY_EXTENSION}")),
        ArchiveFormat::Xml => PathBuf::from(format!("{stem}.{XML_EXTENSION}")),
    };

    match format {
        ArchiveFormat::Binary => {
            let compress = !sub.get_flag("no-compress") && cfg!(feature = "compression");
            write_document_to_path(&outcome.document, &path, compress).context("write archive")?;
        }
        ArchiveFormat::Xml => {
            let bytes = write_document_xml(&outcome.document).context("serialize archive")?;
            std::fs::write(&path, bytes).context("write archive")?;
        }
    }

    if let Some(staging) = &outcome.external_files {
        persist_external_files(staging.path(), &files_dir_for(&path))?;
    }

    if outcome.closure_truncated {
        eprintln!("note: relation closure was truncated at the round cap");
    }
    print!("{}", format_report(&outcome.report, verbose));
    if outcome.report.is_success() {
        println!("saved {}", path.display());
    }
    Ok(outcome.report.is_success())
}

/// Sibling directory for externally stored blob content
fn files_dir_for(archive: &Path) -> PathBuf {
    PathBuf::from(format!("{}.files", archive.display()))
}

fn persist_external_files(staging: &Path, target: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(target).context("create files directory")?;
    for entry in std::fs::read_dir(staging).context("read staging directory")? {
        let entry = entry?;
        std::fs::copy(entry.path(), target.join(entry.file_name()))
            .with_context(|| format!("copy {}", entry.path().display()))?;
    }
    Ok(())
}

// =============================================================================
// Import
// =============================================================================

fn run_import(global: &ArgMatches, sub: &ArgMatches, verbose: bool) -> anyhow::Result<bool> {
    let archive = PathBuf::from(sub.get_one::<String>("archive").expect("archive is required"));
    let bytes = std::fs::read(&archive)
        .with_context(|| format!("read archive {}", archive.display()))?;

    let doc = match ArchiveFormat::from_path(&archive) {
        ArchiveFormat::Binary => read_document(&bytes).context("load archive")?,
        ArchiveFormat::Xml => read_document_xml(&bytes).context("load archive")?,
    };

    let schema = builtin_schema();

    if sub.get_flag("preview") {
        print!("{}", format_preview(&render_preview(&doc, schema.page_table())));
        return Ok(true);
    }

    let mut overrides = BTreeMap::new();
    if let Some(specs) = sub.get_many::<String>("mode") {
        for spec in specs {
            let (selector, mode) = spec
                .split_once('=')
                .ok_or_else(|| anyhow!("bad --mode '{spec}', expected TABLE:UID=MODE"))?;
            let id = parse_record_selector(selector)?;
            let mode = ImportMode::parse(mode)
                .ok_or_else(|| anyhow!("unknown import mode '{mode}'"))?;
            overrides.insert(id, mode);
        }
    }

    let mut softref_overrides = BTreeMap::new();
    if let Some(specs) = sub.get_many::<String>("softref") {
        for spec in specs {
            let (token, value) = spec
                .split_once('=')
                .ok_or_else(|| anyhow!("bad --softref '{spec}', expected TOKEN=VALUE"))?;
            softref_overrides.insert(token.to_string(), value.to_string());
        }
    }

    let external_dir = files_dir_for(&archive);
    let config = ImportConfig {
        destination_pid: sub
            .get_one::<String>("pid")
            .expect("pid has a default")
            .parse()
            .context("bad --pid page uid")?,
        update: sub.get_flag("update"),
        ignore_pid: sub.get_flag("ignore-pid"),
        force_uids: sub.get_flag("force-uid"),
        overrides,
        softref_overrides,
        available_extensions: sub
            .get_many::<String>("extension")
            .map(|v| v.cloned().collect())
            .unwrap_or_default(),
        external_files_dir: external_dir.is_dir().then_some(external_dir),
        ..Default::default()
    };

    let dir = repo_dir(global);
    let mut store = JsonStore::open(&dir).context("open repository")?;
    let mut blobs = DiskBlobStore::new(JsonStore::assets_dir(&dir));
    let ctx = if sub.get_flag("elevated") {
        Context::elevated("operator")
    } else {
        Context::operator("operator")
    };

    let outcome = Importer::new(&ctx, &schema, &mut store, &mut blobs, doc, config)
        .run()
        .context("import run")?;

    // Partial writes are committed even on semantic failures; the exit code
    // carries the verdict.
    store.save().context("save repository")?;

    print!("{}", format_report(&outcome.report, verbose));
    if outcome.report.is_success() {
        println!(
            "imported {} record(s) under page {}",
            outcome.mapping.len(),
            outcome.destination_pid
        );
    }
    Ok(outcome.report.is_success())
}
