//! Clap command tree definition.
//!
//! Builds the full `clap::Command` tree for the `sitepack` binary:
//! `export` and `import` subcommands over a JSON repository directory.

use clap::{Arg, ArgAction, Command};

/// Build the complete CLI command tree.
pub fn build_cli() -> Command {
    Command::new("sitepack")
        .about("Bidirectional content-graph archiver")
        .subcommand_required(true)
        .arg(
            Arg::new("repo")
                .long("repo")
                .value_name("DIR")
                .help("Repository directory (default: .)")
                .global(true),
        )
        .arg(
            Arg::new("log")
                .long("log")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("verbose-errors")
                .long("verbose-errors")
                .help("Dump the full error list on failure")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(build_export())
        .subcommand(build_import())
}

fn build_export() -> Command {
    Command::new("export")
        .about("Export a page subtree into a portable archive")
        .arg(
            Arg::new("stem")
                .required(true)
                .value_name("FILE_STEM")
                .help("Destination file stem (extension is added per format)"),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .value_name("bin|xml")
                .default_value("bin")
                .help("Archive wire form"),
        )
        .arg(
            Arg::new("no-compress")
                .long("no-compress")
                .action(ArgAction::SetTrue)
                .help("Store binary segments uncompressed"),
        )
        .arg(
            Arg::new("root")
                .long("root")
                .value_name("PAGE_UID")
                .help("Root page of the tree walk"),
        )
        .arg(
            Arg::new("depth")
                .long("depth")
                .value_name("N|page|infinite")
                .default_value("infinite")
                .help("Tree walk depth"),
        )
        .arg(
            Arg::new("table")
                .long("table")
                .value_name("TABLE")
                .action(ArgAction::Append)
                .help("Table collected per tree page (repeatable, * for all)"),
        )
        .arg(
            Arg::new("relation-table")
                .long("relation-table")
                .value_name("TABLE")
                .action(ArgAction::Append)
                .help("Table allowed into the relation closure (repeatable, * for all)"),
        )
        .arg(
            Arg::new("record")
                .long("record")
                .value_name("TABLE:UID")
                .action(ArgAction::Append)
                .help("Seed a single record (repeatable)"),
        )
        .arg(
            Arg::new("list")
                .long("list")
                .value_name("TABLE:PID")
                .action(ArgAction::Append)
                .help("Seed all records of a table at a page (repeatable)"),
        )
        .arg(
            Arg::new("exclude")
                .long("exclude")
                .value_name("TABLE:UID")
                .action(ArgAction::Append)
                .help("Exclude a record (repeatable)"),
        )
        .arg(
            Arg::new("exclude-disabled")
                .long("exclude-disabled")
                .action(ArgAction::SetTrue)
                .help("Skip records flagged disabled"),
        )
        .arg(
            Arg::new("title")
                .long("title")
                .value_name("TEXT")
                .help("Archive title"),
        )
        .arg(
            Arg::new("description")
                .long("description")
                .value_name("TEXT")
                .help("Archive description"),
        )
        .arg(
            Arg::new("notes")
                .long("notes")
                .value_name("TEXT")
                .help("Operator notes"),
        )
        .arg(
            Arg::new("dep")
                .long("dep")
                .value_name("EXTENSION")
                .action(ArgAction::Append)
                .help("Extension the importing side must provide (repeatable)"),
        )
        .arg(
            Arg::new("files-external")
                .long("files-external")
                .action(ArgAction::SetTrue)
                .help("Store file content in a .files sibling directory"),
        )
}

fn build_import() -> Command {
    Command::new("import")
        .about("Import an archive into the repository")
        .arg(
            Arg::new("archive")
                .required(true)
                .value_name("ARCHIVE")
                .help("Archive file to import"),
        )
        .arg(
            Arg::new("pid")
                .long("pid")
                .value_name("PAGE_UID")
                .default_value("0")
                .help("Destination page for imported tree roots"),
        )
        .arg(
            Arg::new("update")
                .long("update")
                .action(ArgAction::SetTrue)
                .help("Update records with matching identifiers in place"),
        )
        .arg(
            Arg::new("ignore-pid")
                .long("ignore-pid")
                .action(ArgAction::SetTrue)
                .help("On update, keep target-side parents untouched"),
        )
        .arg(
            Arg::new("force-uid")
                .long("force-uid")
                .action(ArgAction::SetTrue)
                .help("Request original identifiers (elevated only)"),
        )
        .arg(
            Arg::new("elevated")
                .long("elevated")
                .action(ArgAction::SetTrue)
                .help("Run with elevated permission"),
        )
        .arg(
            Arg::new("mode")
                .long("mode")
                .value_name("TABLE:UID=MODE")
                .action(ArgAction::Append)
                .help("Per-record mode override (exclude, as-new, force-uid, ignore-pid, respect-pid)"),
        )
        .arg(
            Arg::new("softref")
                .long("softref")
                .value_name("TOKEN=VALUE")
                .action(ArgAction::Append)
                .help("Value for an editable soft-reference token (repeatable)"),
        )
        .arg(
            Arg::new("extension")
                .long("extension")
                .value_name("EXTENSION")
                .action(ArgAction::Append)
                .help("Extension available on this target (repeatable)"),
        )
        .arg(
            Arg::new("preview")
                .long("preview")
                .action(ArgAction::SetTrue)
                .help("Render the archive preview instead of importing"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_parses() {
        let matches = build_cli()
            .try_get_matches_from([
                "sitepack", "export", "out/site", "--root", "1", "--table", "*",
                "--relation-table", "*", "--record", "content:5",
            ])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "export");
        assert_eq!(sub.get_one::<String>("stem").unwrap(), "out/site");
        assert_eq!(
            sub.get_many::<String>("record").unwrap().collect::<Vec<_>>(),
            vec!["content:5"]
        );
    }

    #[test]
    fn test_import_parses() {
        let matches = build_cli()
            .try_get_matches_from([
                "sitepack", "import", "site.sitepack", "--pid", "4", "--update",
                "--mode", "content:5=exclude",
            ])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "import");
        assert_eq!(sub.get_one::<String>("pid").unwrap(), "4");
        assert!(sub.get_flag("update"));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(build_cli().try_get_matches_from(["sitepack"]).is_err());
    }
}
