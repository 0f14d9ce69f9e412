//! Command handlers. Positions on the command line start at 1.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use tracing::warn;

use asegurados_core::export::{self, BACKUP_FILE_NAME};
use asegurados_core::import::{ErrorKind, ImportError, ImportFormat, PersonDraft, UpsertOutcome, UpsertTarget};
use asegurados_core::offline::{CacheStorage, Registration};
use asegurados_core::roster::RosterError;
use asegurados_core::RecordStore;

use crate::app::App;
use crate::cli::{CacheCommand, Command, FormatArg, PersonArgs};
use crate::prompt;

/// Run a roster command against a loaded store.
pub async fn run(store: &mut RecordStore, command: Command, assume_yes: bool) -> Result<()> {
    match command {
        Command::List { query } => list(store, query.as_deref()),
        Command::Add(person) => add(store, &person, assume_yes),
        Command::Edit { position, person } => edit(store, position, &person),
        Command::Toggle { position } => toggle(store, position),
        Command::Remove { position } => remove(store, position, assume_yes),
        Command::Import { file, format } => import(store, &file, format),
        Command::Export { file } => export(store, file),
        Command::Print { query } => {
            print!("{}", export::render_table(&store.search(query.as_deref().unwrap_or(""))));
            Ok(())
        }
        Command::Debtors => {
            println!("{} of {} owe (DEBE)", store.count_owing(), store.len());
            Ok(())
        }
        Command::Reset => reset(store, assume_yes).await,
        Command::Cache { .. } => bail!("Cache commands do not use the roster"),
    }
}

fn to_index(position: usize) -> Result<usize> {
    position
        .checked_sub(1)
        .ok_or_else(|| anyhow!("Positions start at 1"))
}

fn draft(args: &PersonArgs) -> PersonDraft {
    PersonDraft {
        id: args.dni.clone(),
        last_name: args.apellido.clone(),
        first_name: args.nombre.clone(),
        status: args.status(),
    }
}

fn list(store: &RecordStore, query: Option<&str>) -> Result<()> {
    let rows = store.search(query.unwrap_or(""));
    for (index, person) in &rows {
        println!(
            "{:>4}. {:<8}  {}  [{}]",
            index + 1,
            person.id,
            person.display_name(),
            person.status
        );
    }
    println!(
        "{} shown, {} total, {} owing",
        rows.len(),
        store.len(),
        store.count_owing()
    );
    Ok(())
}

fn add(store: &mut RecordStore, args: &PersonArgs, assume_yes: bool) -> Result<()> {
    let outcome = store.upsert(&draft(args), UpsertTarget::New, |existing| {
        let question = format!(
            "DNI {} already belongs to {}. Overwrite?",
            existing.id,
            existing.display_name()
        );
        prompt::confirm(&question, assume_yes).unwrap_or_else(|e| {
            warn!(error = %e, "Could not read confirmation");
            false
        })
    })?;

    match outcome {
        UpsertOutcome::Added(index) => println!("Added at position {}", index + 1),
        UpsertOutcome::Replaced(index) => println!("Replaced position {}", index + 1),
        UpsertOutcome::Updated(index) => println!("Updated position {}", index + 1),
        UpsertOutcome::Declined => println!("Nothing changed"),
    }
    Ok(())
}

fn edit(store: &mut RecordStore, position: usize, args: &PersonArgs) -> Result<()> {
    let index = to_index(position)?;
    store.upsert(&draft(args), UpsertTarget::Existing(index), |_| true)?;
    println!("Updated position {}", position);
    Ok(())
}

fn toggle(store: &mut RecordStore, position: usize) -> Result<()> {
    let index = to_index(position)?;
    let records = store.toggle_status(index)?;
    let person = &records[index];
    println!("{} is now {}", person.display_name(), person.status);
    Ok(())
}

fn remove(store: &mut RecordStore, position: usize, assume_yes: bool) -> Result<()> {
    let index = to_index(position)?;
    let person = store.get(index).ok_or(RosterError::IndexOutOfRange {
        index,
        len: store.len(),
    })?;

    let question = format!("Remove {} (DNI {})?", person.display_name(), person.id);
    if !prompt::confirm(&question, assume_yes)? {
        println!("Nothing changed");
        return Ok(());
    }
    store.remove_at(index)?;
    println!("Removed. {} records left", store.len());
    Ok(())
}

fn import(store: &mut RecordStore, file: &Path, format: Option<FormatArg>) -> Result<()> {
    let payload = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let format = match format {
        Some(FormatArg::Csv) => ImportFormat::Csv,
        Some(FormatArg::Json) => ImportFormat::Json,
        None => ImportFormat::from_file_name(&file.to_string_lossy()),
    };

    let records = store.import(&payload, format).map_err(|e| {
        match e.downcast_ref::<ImportError>() {
            Some(import_error) => {
                let label = match import_error.kind() {
                    ErrorKind::Validation => "Validation error",
                    ErrorKind::Format => "Format error",
                };
                anyhow!("{}: {}. The roster was not changed", label, import_error)
            }
            None => e,
        }
    })?;
    println!("Imported {} records", records.len());
    Ok(())
}

fn export(store: &RecordStore, file: Option<PathBuf>) -> Result<()> {
    let path = file.unwrap_or_else(|| PathBuf::from(BACKUP_FILE_NAME));
    export::write_json(&path, store.records())?;
    println!("Wrote {} records to {}", store.len(), path.display());
    Ok(())
}

async fn reset(store: &mut RecordStore, assume_yes: bool) -> Result<()> {
    if !prompt::confirm("Discard local changes and restore the bundled roster?", assume_yes)? {
        println!("Nothing changed");
        return Ok(());
    }
    let records = store.reset_to_bundled().await?;
    println!("Restored {} records", records.len());
    Ok(())
}

/// Run an offline cache command. These never touch the roster.
pub async fn cache(app: &App, command: CacheCommand, assume_yes: bool) -> Result<()> {
    match command {
        CacheCommand::Status => cache_status(app),
        CacheCommand::Install => {
            let registration = app.worker.register().await?;
            match registration {
                Registration::Installed { purged } => {
                    println!("Installed {}", app.worker.generation());
                    for name in purged {
                        println!("Deleted old generation {}", name);
                    }
                }
                Registration::Resumed { purged } => {
                    println!("{} was already installed", app.worker.generation());
                    for name in purged {
                        println!("Deleted old generation {}", name);
                    }
                }
                Registration::AlreadyActive => {}
            }
            println!("Phase: {}", app.worker.phase());
            Ok(())
        }
        CacheCommand::Clear => {
            if !prompt::confirm("Delete every offline cache generation?", assume_yes)? {
                println!("Nothing changed");
                return Ok(());
            }
            let names = app.cache_storage.names()?;
            for name in &names {
                app.cache_storage.delete(name)?;
            }
            println!("Deleted {} cache generations", names.len());
            Ok(())
        }
    }
}

fn cache_status(app: &App) -> Result<()> {
    let storage: &dyn CacheStorage = app.cache_storage.as_ref();
    let current = app.worker.generation();

    if !storage.has(current)? {
        println!("{}: not installed", current);
    } else {
        let entries = storage.entries(current)?;
        println!("{}: {} entries", current, entries.len());
        for entry in entries {
            println!(
                "  {}  {}  ({})",
                entry.data.status,
                entry.data.url,
                entry.age_display()
            );
        }
    }

    for name in storage.names()? {
        if name != current {
            println!("{}: stale, removed on next activation", name);
        }
    }
    Ok(())
}
