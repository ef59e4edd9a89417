//! Command execution against an open session.

use std::io::{Read, Write};

use anyhow::{Context, Result};

use threads_engine::{
    BranchId, Generation, GenerationId, LineageView, ThreadSession, ThreadsConfig, resolve_prefix,
};

use crate::Command;

pub fn run(
    command: Command,
    session: &mut ThreadSession,
    config: &ThreadsConfig,
    input: &mut dyn Read,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        Command::Add {
            file,
            parent,
            description,
            tag,
            code,
            code_file,
        } => {
            let parent = parent.map(|p| resolve_generation(session, &p)).transpose()?;
            // An explicit parent decides the file unless one was named.
            let file = match (file, parent) {
                (Some(file), _) => file,
                (None, Some(parent)) => session.get(&parent)?.file_name.clone(),
                (None, None) => config.default_file.clone(),
            };
            let tag = tag.unwrap_or_else(|| config.default_tag.clone());
            let code = match (code, code_file) {
                (Some(code), _) => code,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                (None, None) => {
                    let mut buf = String::new();
                    input.read_to_string(&mut buf).context("reading code from stdin")?;
                    buf
                }
            };
            let id = session.add_generation(code, description, &tag, &file, parent)?;
            writeln!(out, "{}", id.to_hex())?;
        }
        Command::Rewind { id } => {
            let id = resolve_generation(session, &id)?;
            write!(out, "{}", session.rewind_to(id)?)?;
        }
        Command::Fork { id, label } => {
            let id = resolve_generation(session, &id)?;
            let branch = session.fork_from(id, label)?;
            writeln!(out, "{}", branch.to_hex())?;
        }
        Command::Switch { branch } => {
            let branch = resolve_branch(session, &branch)?;
            write!(out, "{}", session.switch_branch(branch)?)?;
        }
        Command::Rename { branch, label } => {
            let branch = resolve_branch(session, &branch)?;
            session.rename_branch(branch, label)?;
        }
        Command::Delete { id } => {
            let id = resolve_generation(session, &id)?;
            session.delete_generation(id)?;
        }
        Command::Reject { id } => {
            let id = resolve_generation(session, &id)?;
            session.mark_as_rejected(id)?;
        }
        Command::Restore { id } => {
            let id = resolve_generation(session, &id)?;
            session.restore_generation(id)?;
        }
        Command::Show { id } => {
            let id = resolve_generation(session, &id)?;
            let generation = session.get(&id)?;
            let preview = generation.preview();
            writeln!(out, "{} [{}] {}", id.to_hex(), generation.tag, generation.status)?;
            if !preview.description.is_empty() {
                writeln!(out, "{}", preview.description)?;
            }
            writeln!(out, "---")?;
            write!(out, "{}", preview.code)?;
        }
        Command::Path { id } => {
            let id = resolve_generation(session, &id)?;
            let view = session.view();
            for step in view.path_to(&id)? {
                writeln!(out, "{}", row(view.get(&step)?))?;
            }
        }
        Command::Children { id } => {
            let id = resolve_generation(session, &id)?;
            let view = session.view();
            for child in view.children_of(&id)? {
                writeln!(out, "{}", row(view.get(&child)?))?;
            }
        }
        Command::Tree { file } => {
            let file = file.unwrap_or_else(|| config.default_file.clone());
            render_tree(session.view(), &file, out)?;
        }
        Command::Branches { file } => {
            let file = file.unwrap_or_else(|| config.default_file.clone());
            let active = session.cursor(&file).active_branch;
            for branch in session.list_branches(&file) {
                let marker = if Some(branch.id) == active { '*' } else { ' ' };
                writeln!(
                    out,
                    "{marker} {} {} {} origin={} head={}",
                    branch.id.to_hex(),
                    branch.display_name(),
                    branch.state,
                    branch.origin_generation_id.short(),
                    branch.head_generation_id.short(),
                )?;
            }
        }
        Command::Files => {
            for file in session.view().files() {
                writeln!(out, "{file}")?;
            }
        }
        Command::Export => {
            serde_json::to_writer_pretty(&mut *out, &session.snapshot())?;
            writeln!(out)?;
        }
    }
    Ok(())
}

fn resolve_generation(session: &ThreadSession, query: &str) -> Result<GenerationId> {
    let snapshot = session.snapshot();
    let id = resolve_prefix(snapshot.generations.iter().map(|g| (g.id, None)), query)
        .with_context(|| format!("generation '{query}'"))?;
    Ok(id)
}

fn resolve_branch(session: &ThreadSession, query: &str) -> Result<BranchId> {
    let snapshot = session.snapshot();
    let id = resolve_prefix(
        snapshot.branches.iter().map(|b| (b.id, b.label.as_deref())),
        query,
    )
    .with_context(|| format!("branch '{query}'"))?;
    Ok(id)
}

fn row(generation: &Generation) -> String {
    let first_line = generation.description.lines().next().unwrap_or("");
    let rejected = if generation.is_rejected() { " (rejected)" } else { "" };
    format!("{} [{}] {first_line}{rejected}", generation.id.to_hex(), generation.tag)
}

fn render_tree(view: LineageView<'_>, file: &str, out: &mut dyn Write) -> Result<()> {
    for (depth, generation) in view.iter_dfs(file) {
        let marker = if view.is_current(&generation.id, file) { '*' } else { ' ' };
        writeln!(out, "{marker} {}{}", "  ".repeat(depth), row(generation))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Args;
    use clap::Parser;

    fn exec(session: &mut ThreadSession, argv: &[&str], stdin: &str) -> Result<String> {
        let args = Args::try_parse_from(std::iter::once("threads").chain(argv.iter().copied()))?;
        let mut out = Vec::new();
        run(
            args.command,
            session,
            &ThreadsConfig::default(),
            &mut stdin.as_bytes(),
            &mut out,
        )?;
        Ok(String::from_utf8(out)?)
    }

    fn add(session: &mut ThreadSession, code: &str) -> GenerationId {
        let hex = exec(session, &["add", "--code", code], "").unwrap();
        GenerationId::parse(hex.trim()).unwrap()
    }

    #[test]
    fn test_add_reads_stdin_and_uses_defaults() {
        let mut session = ThreadSession::new();
        let hex = exec(&mut session, &["add", "-d", "first"], "fn main() {}\n").unwrap();
        let id = GenerationId::parse(hex.trim()).unwrap();

        let generation = session.get(&id).unwrap();
        assert_eq!(generation.code, "fn main() {}\n");
        assert_eq!(generation.file_name, "main");
        assert_eq!(generation.tag, "manual");
        assert!(session.is_current(&id, "main"));
    }

    #[test]
    fn test_rewind_by_prefix_prints_code() {
        let mut session = ThreadSession::new();
        let a = add(&mut session, "A");
        add(&mut session, "B");

        let out = exec(&mut session, &["rewind", &a.to_hex()[..28]], "").unwrap();
        assert_eq!(out, "A");
        assert_eq!(session.current("main"), Some(a));
    }

    #[test]
    fn test_unknown_prefix_is_error() {
        let mut session = ThreadSession::new();
        add(&mut session, "A");
        assert!(exec(&mut session, &["rewind", "zzzz"], "").is_err());
    }

    #[test]
    fn test_parent_picks_file() {
        let mut session = ThreadSession::new();
        let root = exec(&mut session, &["add", "--file", "lib.rs", "--code", "x"], "").unwrap();
        let hex = exec(&mut session, &["add", "--parent", root.trim(), "--code", "y"], "").unwrap();
        let id = GenerationId::parse(hex.trim()).unwrap();
        assert_eq!(session.get(&id).unwrap().file_name, "lib.rs");
    }

    #[test]
    fn test_fork_and_switch_by_label() {
        let mut session = ThreadSession::new();
        let root = add(&mut session, "root");
        exec(&mut session, &["fork", &root.to_hex(), "--label", "experiment"], "").unwrap();
        add(&mut session, "exp");
        session.rewind_to(root).unwrap();

        let out = exec(&mut session, &["switch", "exp"], "").unwrap();
        assert_eq!(out, "exp");
        let listing = exec(&mut session, &["branches"], "").unwrap();
        assert!(listing.starts_with('*'));
        assert!(listing.contains("experiment live"));
    }

    #[test]
    fn test_tree_marks_current_and_rejected() {
        let mut session = ThreadSession::new();
        let root = add(&mut session, "root");
        let bad = add(&mut session, "bad");
        exec(&mut session, &["reject", &bad.to_hex()], "").unwrap();
        session.rewind_to(root).unwrap();

        let tree = exec(&mut session, &["tree"], "").unwrap();
        let lines: Vec<&str> = tree.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with(&format!("* {}", root.to_hex())));
        assert!(lines[1].starts_with(&format!("    {}", bad.to_hex())));
        assert!(lines[1].ends_with("(rejected)"));
    }

    #[test]
    fn test_delete_then_path_skips_removed() {
        let mut session = ThreadSession::new();
        let root = add(&mut session, "root");
        let mid = add(&mut session, "mid");
        let leaf = add(&mut session, "leaf");
        exec(&mut session, &["delete", &mid.to_hex()], "").unwrap();

        let path = exec(&mut session, &["path", &leaf.to_hex()], "").unwrap();
        let ids: Vec<&str> = path.lines().map(|l| &l[..32]).collect();
        assert_eq!(ids, vec![root.to_hex(), leaf.to_hex()]);
    }

    #[test]
    fn test_export_is_snapshot_json() {
        let mut session = ThreadSession::new();
        add(&mut session, "A");
        let json = exec(&mut session, &["export"], "").unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["generations"][0]["code"], "A");
        assert!(value["cursors"]["main"]["current"].is_string());
    }
}
