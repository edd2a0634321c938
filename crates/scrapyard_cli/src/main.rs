//! Command-line inspector for a Scrapyard node store.
//!
//! # Responsibility
//! - Open a store from `--config` or `--db` and print shelves, subtrees or
//!   query results, one node per line.
//! - Double as a linkage probe for `scrapyard_core`.

use clap::{Arg, ArgAction, ArgMatches, Command};
use log::info;
use scrapyard_core::{Node, NodeId, NodeQuery, NodeType, QueryDepth, Storage, StorageConfig};
use std::error::Error;
use std::path::Path;
use std::process::ExitCode;

type CliResult<T> = Result<T, Box<dyn Error>>;

fn main() -> ExitCode {
    let matches = command().get_matches();
    match run(&matches) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("scrapyard: {err}");
            ExitCode::FAILURE
        }
    }
}

fn command() -> Command {
    Command::new("scrapyard")
        .version(scrapyard_core::core_version())
        .about("Inspect a Scrapyard bookmark store.")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("TOML config file"),
        )
        .arg(
            Arg::new("db")
                .long("db")
                .value_name("PATH")
                .global(true)
                .help("SQLite database path (overrides config)"),
        )
        .subcommand_required(true)
        .subcommand(Command::new("ping").about("Print core linkage info"))
        .subcommand(Command::new("shelves").about("List shelves"))
        .subcommand(
            Command::new("subtree")
                .about("List nodes and all their descendants")
                .arg(
                    Arg::new("ids")
                        .value_name("ID")
                        .num_args(1..)
                        .required(true)
                        .value_parser(clap::value_parser!(i64)),
                ),
        )
        .subcommand(
            Command::new("query")
                .about("Run a filtered node query")
                .arg(
                    Arg::new("scope")
                        .long("scope")
                        .value_name("ID")
                        .value_parser(clap::value_parser!(i64)),
                )
                .arg(Arg::new("search").long("search").value_name("REGEX"))
                .arg(
                    Arg::new("tag")
                        .long("tag")
                        .value_name("TAG")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("type")
                        .long("type")
                        .value_name("TYPE")
                        .action(ArgAction::Append)
                        .help("shelf, group, bookmark, archive or separator"),
                )
                .arg(
                    Arg::new("depth")
                        .long("depth")
                        .value_name("DEPTH")
                        .value_parser(["group", "subtree", "root+subtree"]),
                )
                .arg(
                    Arg::new("limit")
                        .long("limit")
                        .value_name("N")
                        .value_parser(clap::value_parser!(u32)),
                )
                .arg(
                    Arg::new("custom-order")
                        .long("custom-order")
                        .action(ArgAction::SetTrue)
                        .help("Sort by sibling position"),
                )
                .arg(
                    Arg::new("path")
                        .long("path")
                        .action(ArgAction::SetTrue)
                        .help("Require a scope node"),
                ),
        )
}

fn run(matches: &ArgMatches) -> CliResult<()> {
    if let Some(("ping", _)) = matches.subcommand() {
        println!("scrapyard_core ping={}", scrapyard_core::ping());
        println!("scrapyard_core version={}", scrapyard_core::core_version());
        return Ok(());
    }

    let storage = Storage::open(&load_config(matches)?)?;
    if let Some((name, _)) = matches.subcommand() {
        info!("event=cli_run module=cli status=start command={name}");
    }
    match matches.subcommand() {
        Some(("shelves", _)) => print_nodes(&storage.find_shelves()?),
        Some(("subtree", sub)) => {
            let ids: Vec<NodeId> = sub
                .get_many::<i64>("ids")
                .into_iter()
                .flatten()
                .copied()
                .collect();
            print_nodes(&storage.query_full_subtree(&ids)?);
        }
        Some(("query", sub)) => {
            let scope = sub.get_one::<i64>("scope").copied();
            print_nodes(&storage.query(scope, &build_query(sub)?)?);
        }
        _ => return Err("unknown command".into()),
    }
    Ok(())
}

fn load_config(matches: &ArgMatches) -> CliResult<StorageConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => StorageConfig::load(Path::new(path))?,
        None => StorageConfig::in_memory(),
    };
    if let Some(db) = matches.get_one::<String>("db") {
        config.db_path = db.into();
    }
    Ok(config)
}

fn build_query(sub: &ArgMatches) -> CliResult<NodeQuery> {
    let mut query = NodeQuery::new();
    if let Some(search) = sub.get_one::<String>("search") {
        query = query.search(search.as_str());
    }
    if let Some(tags) = sub.get_many::<String>("tag") {
        query = query.tags(tags.cloned());
    }
    if let Some(types) = sub.get_many::<String>("type") {
        let kinds = types
            .map(|raw| NodeType::parse(raw).ok_or_else(|| format!("unknown node type: {raw}")))
            .collect::<Result<Vec<_>, _>>()?;
        query = query.types(kinds);
    }
    if let Some(depth) = sub.get_one::<String>("depth") {
        query = query.depth(match depth.as_str() {
            "group" => QueryDepth::Group,
            "subtree" => QueryDepth::Subtree,
            _ => QueryDepth::RootAndSubtree,
        });
    }
    if let Some(limit) = sub.get_one::<u32>("limit") {
        query = query.limit(*limit);
    }
    if sub.get_flag("custom-order") {
        query = query.custom_order();
    }
    if sub.get_flag("path") {
        query = query.with_path();
    }
    Ok(query)
}

fn print_nodes(nodes: &[Node]) {
    for node in nodes {
        let tags = node.tags.iter().cloned().collect::<Vec<_>>().join(",");
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            node.id,
            node.parent_id.map_or_else(|| "-".to_string(), |id| id.to_string()),
            node.kind.as_str(),
            node.name,
            node.uri.as_deref().unwrap_or(""),
            tags
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{build_query, command};
    use scrapyard_core::{NodeType, QueryDepth};

    #[test]
    fn command_definition_is_consistent() {
        command().debug_assert();
    }

    #[test]
    fn query_flags_map_to_options() {
        let matches = command()
            .try_get_matches_from([
                "scrapyard", "query", "--type", "bookmark", "--tag", "rust", "--depth",
                "subtree", "--limit", "3", "--custom-order",
            ])
            .unwrap();
        let Some(("query", sub)) = matches.subcommand() else {
            panic!("expected query subcommand");
        };
        let query = build_query(sub).unwrap();
        assert_eq!(query.types, Some(vec![NodeType::Bookmark]));
        assert_eq!(query.tags, Some(vec!["rust".to_string()]));
        assert_eq!(query.depth, Some(QueryDepth::Subtree));
        assert_eq!(query.limit, Some(3));
    }
}
