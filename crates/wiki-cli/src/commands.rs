use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::json;

use wiki_engine::{
    Actor, BackendConfig, EngineConfig, PageVersion, SaveOutcome, WikiEngine, WikiPage, WorkflowId,
    WorkflowSummary,
};

use crate::cli::*;

/// Page directory used when neither `--root` nor the configuration names one.
const DEFAULT_ROOT: &str = "wiki-data";

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = effective_config(&cli)?;
    if let Command::Config(args) = &cli.command {
        return cmd_config(&config, args, &cli.format);
    }

    let engine = WikiEngine::new(config).context("cannot open the wiki")?;
    let actor = actor(&cli.user);
    let format = cli.format;
    let result = match cli.command {
        Command::Save(args) => cmd_save(&engine, args, &actor),
        Command::Show(args) => cmd_show(&engine, args, &format),
        Command::History(args) => cmd_history(&engine, args, &format),
        Command::Delete(args) => cmd_delete(&engine, args),
        Command::DeleteVersion(args) => cmd_delete_version(&engine, args),
        Command::Rename(args) => cmd_rename(&engine, args, &actor),
        Command::List(args) => cmd_list(&engine, args, &format),
        Command::Lock(args) => cmd_lock(&engine, args, &actor),
        Command::Pending(args) => cmd_pending(&engine, args, &format),
        Command::Approve(args) => cmd_approve(&engine, args, &actor),
        Command::Reject(args) => cmd_reject(&engine, args, &actor),
        Command::Config(_) => Ok(()),
    };
    engine.release_session();
    result
}

/// The configuration file (or defaults), pointed at a file backend.
pub fn effective_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(root) = &cli.root {
        config.backend = BackendConfig::File { root: root.clone() };
    } else if config.backend == BackendConfig::Memory {
        config.backend = BackendConfig::File {
            root: PathBuf::from(DEFAULT_ROOT),
        };
    }
    Ok(config)
}

fn actor(user: &str) -> Actor {
    if user == ANONYMOUS {
        Actor::anonymous(user)
    } else {
        Actor::authenticated(user)
    }
}

fn cmd_save(engine: &WikiEngine, args: SaveArgs, actor: &Actor) -> anyhow::Result<()> {
    let text = match (args.text, args.file) {
        (Some(text), _) => text,
        (None, Some(file)) => std::fs::read_to_string(&file)
            .with_context(|| format!("cannot read {}", file.display()))?,
        (None, None) => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text).context("cannot read stdin")?;
            text
        }
    };

    match engine.save_text(&args.page, &text, actor) {
        Ok(SaveOutcome::Saved(version)) => {
            println!("{} Saved {} version {}", "✓".green().bold(), args.page.bold(), version);
        }
        Ok(SaveOutcome::Unchanged) => println!("No changes."),
        Ok(SaveOutcome::EmptyPageSkipped) => {
            println!("{} Not creating empty page {}", "!".yellow().bold(), args.page.bold());
        }
        Err(e) if e.is_decision_required() => println!("{} {}", "…".yellow().bold(), e),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn cmd_show(engine: &WikiEngine, args: ShowArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let version = args.version.map_or(PageVersion::Latest, PageVersion::Exact);
    let page = engine.get_page(&args.page, version)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&page_json(&page, true))?),
        OutputFormat::Text => {
            if args.info {
                println!("{} {}", page.path().to_string().bold(), format!("v{}", page.version()).yellow());
                println!("  Author: {}", page.author().unwrap_or("-"));
                if let Some(at) = page.last_modified() {
                    println!("  Modified: {at}");
                }
                for (key, value) in page.attributes() {
                    println!("  {key}: {value}");
                }
                if !page.acl().is_empty() {
                    println!("  ACL: {}", page.acl().to_string().cyan());
                }
                println!();
            }
            println!("{}", page.content());
        }
    }
    Ok(())
}

fn cmd_history(engine: &WikiEngine, args: PageArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let history = engine.version_history(&args.page)?;
    match format {
        OutputFormat::Json => {
            let entries: Vec<_> = history.iter().map(|p| page_json(p, false)).collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Text => {
            for page in history.iter().rev() {
                let modified = page.last_modified().map(|t| t.to_rfc3339()).unwrap_or_default();
                println!(
                    "{}  {}  {}  {}",
                    format!("v{}", page.version()).yellow().bold(),
                    modified.dimmed(),
                    page.author().unwrap_or("-"),
                    page.change_note().unwrap_or("")
                );
            }
        }
    }
    Ok(())
}

fn cmd_delete(engine: &WikiEngine, args: PageArgs) -> anyhow::Result<()> {
    if !engine.delete_page(&args.page)? {
        bail!("no page named {}", args.page);
    }
    println!("{} Deleted {}", "✓".green().bold(), args.page.bold());
    Ok(())
}

fn cmd_delete_version(engine: &WikiEngine, args: DeleteVersionArgs) -> anyhow::Result<()> {
    if !engine.delete_version(&args.page, args.version)? {
        bail!("{} has no version {}", args.page, args.version);
    }
    println!("{} Deleted {} version {}", "✓".green().bold(), args.page.bold(), args.version);
    Ok(())
}

fn cmd_rename(engine: &WikiEngine, args: RenameArgs, actor: &Actor) -> anyhow::Result<()> {
    let renamed = engine.rename_page(&args.from, &args.to, actor)?;
    println!("{} Renamed {} to {}", "✓".green().bold(), args.from.bold(), renamed.to_string().bold());
    Ok(())
}

fn cmd_list(engine: &WikiEngine, args: ListArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let pages = engine.all_pages(args.space.as_deref())?;
    match format {
        OutputFormat::Json => {
            let entries: Vec<_> = pages.iter().map(|p| page_json(p, false)).collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Text => {
            for page in &pages {
                println!("{}  {}", page.path(), format!("v{}", page.version()).dimmed());
            }
            println!("{} page(s)", pages.len().to_string().bold());
        }
    }
    Ok(())
}

fn cmd_lock(engine: &WikiEngine, args: PageArgs, actor: &Actor) -> anyhow::Result<()> {
    match engine.lock_page(&args.page, &actor.name)? {
        Some(lock) => println!(
            "{} {} ({} minutes left)",
            "✓".green().bold(),
            lock,
            lock.time_left_minutes()
        ),
        None => match engine.current_lock(&args.page)? {
            Some(held) => println!("{} Already locked: {}", "✗".red().bold(), held),
            None => println!("{} Lock not granted", "✗".red().bold()),
        },
    }
    Ok(())
}

fn cmd_pending(engine: &WikiEngine, args: PendingArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let pending = match &args.approver {
        Some(approver) => engine.pending_for(approver),
        None => engine.pending_approvals(),
    };
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&pending)?),
        OutputFormat::Text => {
            if pending.is_empty() {
                println!("No pending approvals.");
            }
            for summary in &pending {
                print_summary(summary);
            }
        }
    }
    Ok(())
}

fn cmd_approve(engine: &WikiEngine, args: DecisionArgs, actor: &Actor) -> anyhow::Result<()> {
    let id = parse_id(&args.id)?;
    let summary = engine.approve(id, actor)?;
    println!("{} Approved {} ({})", "✓".green().bold(), summary.subject.bold(), id);
    Ok(())
}

fn cmd_reject(engine: &WikiEngine, args: RejectArgs, actor: &Actor) -> anyhow::Result<()> {
    let id = parse_id(&args.id)?;
    let summary = engine.reject(id, actor, &args.reason)?;
    println!("{} Rejected {} ({}): {}", "✗".red().bold(), summary.subject.bold(), id, args.reason);
    Ok(())
}

fn cmd_config(config: &EngineConfig, args: &ConfigArgs, format: &OutputFormat) -> anyhow::Result<()> {
    match (&args.key, format) {
        (Some(key), _) => {
            let values = serde_json::to_value(config)?;
            let value = values.get(key).with_context(|| format!("unknown configuration key {key}"))?;
            println!("{key} = {value}");
        }
        (None, OutputFormat::Json) => println!("{}", serde_json::to_string_pretty(config)?),
        (None, OutputFormat::Text) => print!("{}", config.to_toml_string()?),
    }
    Ok(())
}

fn parse_id(raw: &str) -> anyhow::Result<WorkflowId> {
    raw.parse()
        .with_context(|| format!("invalid workflow id {raw:?}"))
}

fn print_summary(summary: &WorkflowSummary) {
    println!(
        "{}  {}  by {}  for {}  {}",
        summary.id.to_string().yellow().bold(),
        summary.subject.bold(),
        summary.owner,
        summary.approver.as_deref().unwrap_or("-"),
        summary.submitted.to_rfc3339().dimmed()
    );
    if let Some(diff) = summary.facts.get_str(wiki_workflow::keys::DIFF_TEXT) {
        for line in diff.lines() {
            let line = match line.chars().next() {
                Some('+') => line.green(),
                Some('-') => line.red(),
                _ => line.dimmed(),
            };
            println!("    {line}");
        }
    }
}

fn page_json(page: &WikiPage, with_content: bool) -> serde_json::Value {
    let mut value = json!({
        "path": page.path().to_string(),
        "version": page.version(),
        "author": page.author(),
        "modified": page.last_modified(),
        "attributes": page.attributes(),
    });
    if with_content {
        value["acl"] = json!(page.acl());
        value["content"] = json!(page.content());
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn default_backend_is_a_file_directory() {
        let config = effective_config(&parse(&["wiki", "list"])).unwrap();
        assert_eq!(
            config.backend,
            BackendConfig::File {
                root: PathBuf::from(DEFAULT_ROOT)
            }
        );
    }

    #[test]
    fn root_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("wiki.toml");
        std::fs::write(&file, "save_approver = \"admin\"\n[backend]\nkind = \"file\"\nroot = \"/elsewhere\"\n").unwrap();

        let file_arg = file.to_str().unwrap();
        let root = dir.path().join("pages");
        let root_arg = root.to_str().unwrap();
        let config = effective_config(&parse(&["wiki", "list", "-c", file_arg, "--root", root_arg])).unwrap();
        assert_eq!(config.save_approver.as_deref(), Some("admin"));
        assert_eq!(config.backend, BackendConfig::File { root });
    }

    #[test]
    fn commands_run_against_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap();
        let run = |args: &[&str]| {
            let mut full = vec!["wiki", "--root", root, "--user", "alice"];
            full.extend_from_slice(args);
            run_command(parse(&full))
        };

        run(&["save", "Foo", "--text", "v1"]).unwrap();
        run(&["save", "Foo", "--text", "v2"]).unwrap();
        run(&["history", "Foo"]).unwrap();
        run(&["delete-version", "Foo", "1"]).unwrap();
        assert!(run(&["delete-version", "Foo", "1"]).is_err());
        run(&["rename", "Foo", "Bar"]).unwrap();
        run(&["show", "Bar", "--info"]).unwrap();
        assert!(run(&["show", "Foo"]).is_err());
        run(&["list", "--format", "json"]).unwrap();
        assert!(run(&["approve", "seven"]).is_err());
    }
}
