mod app;
mod board;
mod cli;
mod coach;
mod debug_log;
mod fallback;
mod gateway;
mod logstore;
mod model;
mod output;
mod runner;
mod session;
mod store;
mod ticker;

use std::io::Read as _;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use app::App;
use board::NoteField;
use cli::{Cli, Command, ConfigCommand, DocCommand, LogCommand, ProfileCommand};
use model::Category;
use store::Store;

fn default_db_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".compass").join("compass.db"))
}

fn resolve_db_path(cli_db: Option<String>) -> Result<String> {
    match cli_db {
        Some(p) => Ok(p),
        None => {
            let path = default_db_path()?;
            Ok(path
                .to_str()
                .context("default DB path is not valid UTF-8")?
                .to_string())
        }
    }
}

fn ensure_db_dir(db_path: &str) -> Result<()> {
    if let Some(parent) = std::path::Path::new(db_path).parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    Ok(())
}

fn open_app(db_path: &str) -> Result<App> {
    App::load(Store::open(db_path)?)
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db)?;
    ensure_db_dir(&db_path)?;

    match cli.command {
        Command::Add { title, category } => {
            let category = Category::parse(&category)?;
            let mut app = open_app(&db_path)?;
            let task = app.add_task(&title, category)?;
            eprintln!(
                "Added task {} '{}' to {} (score {})",
                task.id, task.title, task.category, task.score
            );
        }

        Command::Bulk { text, stdin } => {
            let text = match text {
                Some(t) if !stdin => t,
                _ => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    if buf.trim().is_empty() {
                        bail!("no tasks provided");
                    }
                    buf
                }
            };
            let mut app = open_app(&db_path)?;
            let tasks = app.bulk_add(&text)?;
            let aspirational = tasks
                .iter()
                .filter(|t| t.category == Category::Aspirational)
                .count();
            eprintln!(
                "Added {} tasks ({} aspirational, {} obligatory)",
                tasks.len(),
                aspirational,
                tasks.len() - aspirational
            );
        }

        Command::List { category, json } => {
            let category = category.map(|c| Category::parse(&c)).transpose()?;
            let app = open_app(&db_path)?;
            match (category, json) {
                (Some(c), true) => {
                    println!("{}", serde_json::to_string_pretty(app.board.collection(c))?)
                }
                (Some(c), false) => print!("{}", output::format_task_list(app.board.collection(c))),
                (None, true) => println!("{}", serde_json::to_string_pretty(&app.board)?),
                (None, false) => print!("{}", output::format_board(&app.board)),
            }
        }

        Command::Rm { id } => {
            let mut app = open_app(&db_path)?;
            app.delete_task(id)?;
            eprintln!("Removed task {id}");
        }

        Command::Clear { category } => {
            let category = Category::parse(&category)?;
            let mut app = open_app(&db_path)?;
            let count = app.clear_category(category)?;
            eprintln!("Removed {count} tasks from {category}");
        }

        Command::Note { id, field, text } => {
            let field = NoteField::parse(&field)?;
            let mut app = open_app(&db_path)?;
            app.update_note(id, field, &text)?;
            eprintln!("Updated note on task {id}");
        }

        Command::Done { id } => {
            let mut app = open_app(&db_path)?;
            let request = app.quick_complete(id)?;
            let entry = &app.logs.entries[0];
            eprintln!("Completed '{}' ({}min)", entry.title, entry.actual_duration);
            print!("{}", output::format_log_detail(entry));
            if let Some(req) = request {
                // Entry is already visible with its provisional note; the
                // summary patches it in place.
                eprintln!("Generating summary...");
                let coach = app.coach().clone();
                let context = app.context.clone();
                let text = coach.summary(&req.task, req.actual_duration, &context);
                if app.apply_summary(&req.key, &text)? {
                    eprintln!("Summary: {text}");
                }
            }
        }

        Command::Run { id } => {
            let mut app = open_app(&db_path)?;
            runner::run(&mut app, id)?;
        }

        Command::Log { command } => {
            let mut app = open_app(&db_path)?;
            match command {
                LogCommand::List { category, json } => {
                    let category = category.map(|c| Category::parse(&c)).transpose()?;
                    let entries = app.logs.filter(category);
                    if json {
                        println!("{}", serde_json::to_string_pretty(&entries)?);
                    } else {
                        print!("{}", output::format_log_list(&entries));
                        eprintln!(
                            "{} completed ({} aspirational, {} obligatory)",
                            app.logs.len(),
                            app.logs.count_for(Category::Aspirational),
                            app.logs.count_for(Category::Obligatory)
                        );
                    }
                }
                LogCommand::Show { index } => {
                    let entry = app
                        .logs
                        .get(index)
                        .with_context(|| format!("no log entry at index {index}"))?;
                    print!("{}", output::format_log_detail(entry));
                }
                LogCommand::Edit {
                    index,
                    note,
                    actual,
                } => {
                    let mut entry = app
                        .logs
                        .get(index)
                        .with_context(|| format!("no log entry at index {index}"))?
                        .clone();
                    if let Some(note) = note {
                        entry.post_action_note = note;
                    }
                    if let Some(actual) = actual {
                        entry.actual_duration = actual;
                    }
                    app.edit_log(index, entry)?;
                    eprintln!("Updated log entry {index}");
                }
                LogCommand::Rm { index } => {
                    let removed = app.delete_log(index)?;
                    eprintln!("Removed log entry for '{}'", removed.title);
                }
            }
        }

        Command::Profile { command } => {
            let mut app = open_app(&db_path)?;
            match command {
                ProfileCommand::Show => {
                    println!("Name:         {}", display_or_unset(&app.context.user_name));
                    println!("About:        {}", display_or_unset(&app.context.profile));
                    println!(
                        "Instructions: {}",
                        display_or_unset(&app.context.custom_instructions)
                    );
                    println!("Documents:    {}", app.context.documents.len());
                }
                ProfileCommand::Set {
                    name,
                    about,
                    instructions,
                } => {
                    app.update_profile(name, about, instructions)?;
                    eprintln!("Profile updated");
                }
            }
        }

        Command::Doc { command } => {
            let mut app = open_app(&db_path)?;
            match command {
                DocCommand::Add { path } => {
                    let content = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {path}"))?;
                    let name = std::path::Path::new(&path)
                        .file_name()
                        .and_then(|n| n.to_str())
                        .context("invalid document path")?
                        .to_string();
                    app.add_document(&name, content)?;
                    eprintln!("Uploaded '{name}'");
                }
                DocCommand::Rm { name } => {
                    app.remove_document(&name)?;
                    eprintln!("Removed '{name}'");
                }
                DocCommand::List => {
                    for doc in &app.context.documents {
                        println!(
                            "{}  ({} chars, uploaded {})",
                            doc.name,
                            doc.content.chars().count(),
                            doc.uploaded_at
                        );
                    }
                }
            }
        }

        Command::Config { command } => {
            let mut app = open_app(&db_path)?;
            match command {
                ConfigCommand::Show => {
                    let key = if app.settings.has_credential() {
                        "set"
                    } else {
                        "(not set)"
                    };
                    println!("API key:  {key}");
                    println!("Model:    {}", app.settings.model);
                    println!("Base URL: {}", app.settings.base_url);
                    println!("Timeout:  {}s", app.settings.timeout_secs);
                }
                ConfigCommand::Set {
                    api_key,
                    model,
                    base_url,
                    timeout,
                } => {
                    let mut settings = app.settings.clone();
                    if let Some(key) = api_key {
                        settings.api_key = key;
                    }
                    if let Some(model) = model {
                        settings.model = model;
                    }
                    if let Some(url) = base_url {
                        settings.base_url = url;
                    }
                    if let Some(timeout) = timeout {
                        settings.timeout_secs = timeout;
                    }
                    app.update_settings(settings)?;
                    eprintln!("Settings updated");
                }
            }
        }
    }

    Ok(())
}

fn display_or_unset(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}
