use std::path::PathBuf;

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::config_io::{self, CONFIG_FILE};
use crate::io::manager::RecordManager;
use crate::model::config::TrackerConfig;
use crate::model::project;
use crate::util::logging;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Loaded config plus an open registry with every readable project loaded.
struct Context {
    config: TrackerConfig,
    manager: RecordManager,
    json: bool,
}

pub fn dispatch(cli: Cli) -> CmdResult {
    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    let mut config = config_io::load_config(&config_path)?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = PathBuf::from(dir);
    }
    logging::init_logging(&config.log)?;

    let manager = RecordManager::open(&config.data_dir, config.storage.workers)?;
    for failure in manager.wait_for_loads() {
        eprintln!("warning: skipped {}: {}", failure.path.display(), failure.reason);
    }
    let ctx = Context {
        config,
        manager,
        json: cli.json,
    };

    match cli.command {
        Commands::List => cmd_list(&ctx),
        Commands::Show(args) => cmd_show(&ctx, args),
        Commands::Create(args) => cmd_create(&ctx, args),
        Commands::Remove(args) => cmd_remove(&ctx, args),
        Commands::AddTime(args) => cmd_add_time(&ctx, args),
        Commands::AddSub(args) => cmd_add_sub(&ctx, args),
    }
}

fn cmd_list(ctx: &Context) -> CmdResult {
    let roots = ctx
        .manager
        .all()
        .iter()
        .map(|record| record.root())
        .collect::<Result<Vec<_>, _>>()?;
    if ctx.json {
        let projects: Vec<ProjectJson> = roots.iter().map(project_to_json).collect();
        println!("{}", serde_json::to_string_pretty(&projects)?);
    } else {
        for root in &roots {
            println!("{}", format_project_line(root));
        }
    }
    Ok(())
}

fn cmd_show(ctx: &Context, args: ShowArgs) -> CmdResult {
    let (_, node) = ctx
        .manager
        .find_node(&args.uid)
        .ok_or_else(|| not_found(&args.uid))?;
    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&project_to_json(&node))?);
    } else {
        for line in format_project_tree(&node, 0) {
            println!("{}", line);
        }
    }
    Ok(())
}

fn cmd_create(ctx: &Context, args: CreateArgs) -> CmdResult {
    let defaults = &ctx.config.defaults;
    let name = args.name.unwrap_or_else(|| defaults.name.clone());
    let icon = args.icon.unwrap_or_else(|| defaults.icon.clone());
    let record = ctx.manager.create(&name, &icon)?;
    let root = record.root()?;
    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&project_to_json(&root))?);
    } else {
        println!("{}", project::uid_of(&root));
    }
    Ok(())
}

fn cmd_remove(ctx: &Context, args: RemoveArgs) -> CmdResult {
    let record = ctx
        .manager
        .find(&args.uid)
        .ok_or_else(|| not_found(&args.uid))?;
    ctx.manager.remove(&record)?;
    Ok(())
}

fn cmd_add_time(ctx: &Context, args: AddTimeArgs) -> CmdResult {
    let (_, node) = ctx
        .manager
        .find_node(&args.uid)
        .ok_or_else(|| not_found(&args.uid))?;
    let total = project::add_time(&node, args.hours, args.minutes)?;
    ctx.manager.flush_all()?;
    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&project_to_json(&node))?);
    } else {
        println!("{:.1}", total);
    }
    Ok(())
}

fn cmd_add_sub(ctx: &Context, args: AddSubArgs) -> CmdResult {
    let (_, parent) = ctx
        .manager
        .find_node(&args.parent)
        .ok_or_else(|| not_found(&args.parent))?;
    let child = project::add_sub_item(&parent, &args.name, &args.icon)?;
    ctx.manager.flush_all()?;
    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&project_to_json(&child))?);
    } else {
        println!("{}", project::uid_of(&child));
    }
    Ok(())
}

fn not_found(uid: &str) -> Box<dyn std::error::Error> {
    format!("no project with uid {}", uid).into()
}
