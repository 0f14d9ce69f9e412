use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use asegurados_core::PaymentStatus;

#[derive(Parser)]
#[command(name = "asegurados")]
#[command(about = "Roster of insured people and their payment status")]
#[command(version)]
pub struct Cli {
    /// Answer yes to every confirmation prompt
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List records, optionally filtered by DNI, nombre or apellido
    List {
        /// Case-insensitive search text
        query: Option<String>,
    },
    /// Add a person. Adding an existing DNI asks before overwriting
    Add(PersonArgs),
    /// Replace the record at a position (as shown by `list`)
    Edit {
        position: usize,
        #[command(flatten)]
        person: PersonArgs,
    },
    /// Flip a record between PAGO and DEBE
    Toggle { position: usize },
    /// Delete the record at a position
    Remove { position: usize },
    /// Replace the whole roster with a CSV or JSON file
    Import {
        file: PathBuf,
        /// Override the format guessed from the file extension
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },
    /// Write the roster as a JSON backup
    Export {
        /// Destination file (default: asegurados-backup.json)
        file: Option<PathBuf>,
    },
    /// Print the roster as a text table
    Print {
        query: Option<String>,
    },
    /// Count the people who still owe
    Debtors,
    /// Discard local changes and restore the bundled roster
    Reset,
    /// Offline cache management
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Subcommand)]
pub enum CacheCommand {
    /// Show the current generation and what it holds
    Status,
    /// Download every offline asset into the current generation
    Install,
    /// Delete every cache generation
    Clear,
}

#[derive(Args, Clone)]
pub struct PersonArgs {
    /// DNI; separators are ignored
    #[arg(long)]
    pub dni: String,

    #[arg(long)]
    pub apellido: String,

    #[arg(long)]
    pub nombre: String,

    /// Mark as owing (DEBE); default is PAGO
    #[arg(long)]
    pub debe: bool,
}

impl PersonArgs {
    pub fn status(&self) -> PaymentStatus {
        if self.debe {
            PaymentStatus::Owing
        } else {
            PaymentStatus::Paid
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Csv,
    Json,
}
