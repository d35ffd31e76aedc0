//! Bestiary CLI
//!
//! Command-line interface for a local Bestiary data directory.

use std::process;

use bestiary::{BestiaryError, Config, Creature, Engine, SearchField, SyncStrategy};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// Bestiary CLI
#[derive(Parser, Debug)]
#[command(name = "bestiary")]
#[command(about = "Creature records with a dynamic hash index")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./bestiary_data")]
    data_dir: String,

    /// Usable records per hash bucket (only used when the index is built)
    #[arg(short, long, default_value = "8")]
    bucket_records: usize,

    /// fsync every write instead of only on exit
    #[arg(long)]
    sync: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add a creature and print its id
    Create(CreatureFields),

    /// Print a creature by id
    Get {
        /// Creature id
        id: i64,
    },

    /// Print one page of creatures
    List {
        /// Zero-based page number
        #[arg(short, long, default_value = "0")]
        page: usize,
    },

    /// Print the number of pages
    Pages,

    /// Print `id matches` for creatures whose field contains the text
    Search {
        /// Field to search: name, species, types or description
        #[arg(short, long, default_value = "name")]
        field: SearchField,

        /// Text to look for, ignoring case
        needle: String,
    },

    /// Replace a creature's fields
    Update {
        /// Creature id
        id: i64,

        #[command(flatten)]
        fields: CreatureFields,
    },

    /// Delete a creature by id
    Delete {
        /// Creature id
        id: i64,
    },

    /// Rebuild the hash index from the data file
    RebuildIndex,

    /// Print the hash directory and buckets
    DumpIndex,
}

#[derive(ClapArgs, Debug)]
struct CreatureFields {
    /// Name
    #[arg(long)]
    name: String,

    /// Species
    #[arg(long, default_value = "")]
    species: String,

    /// Types, comma separated
    #[arg(long, value_delimiter = ',')]
    types: Vec<String>,

    /// Height in metres
    #[arg(long, default_value = "0")]
    height: f32,

    /// Weight in kilograms
    #[arg(long, default_value = "0")]
    weight: f32,

    /// Generation
    #[arg(long, default_value = "1")]
    generation: u8,

    /// Legendary flag
    #[arg(long)]
    legendary: bool,

    /// Free-text description
    #[arg(long, default_value = "")]
    description: String,
}

impl CreatureFields {
    fn into_creature(self, id: i64) -> Creature {
        Creature {
            id,
            name: self.name,
            species: self.species,
            types: self.types,
            height_m: self.height,
            weight_kg: self.weight,
            generation: self.generation,
            legendary: self.legendary,
            description: self.description,
        }
    }
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bestiary=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::debug!("Bestiary v{}", bestiary::VERSION);
    tracing::debug!("Data directory: {}", args.data_dir);

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .bucket_records(args.bucket_records)
        .sync_strategy(if args.sync {
            SyncStrategy::EveryWrite
        } else {
            SyncStrategy::OnClose
        })
        .build();

    let engine = match Engine::open(config) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run(&engine, args.command) {
        match e {
            BestiaryError::NotFound => eprintln!("not found"),
            e => tracing::error!("{}", e),
        }
        process::exit(1);
    }

    if let Err(e) = engine.close() {
        tracing::error!("Failed to close engine: {}", e);
        process::exit(1);
    }
}

fn run(engine: &Engine, command: Commands) -> bestiary::Result<()> {
    match command {
        Commands::Create(fields) => {
            let id = engine.create(fields.into_creature(0))?;
            println!("{}", id);
        }
        Commands::Get { id } => print_creature(&engine.read(id)?),
        Commands::List { page } => {
            for creature in engine.read_page(page)? {
                print_creature(&creature);
            }
        }
        Commands::Pages => println!("{}", engine.page_count()),
        Commands::Search { field, needle } => {
            for (id, count) in engine.search(field, &needle)? {
                println!("{} {}", id, count);
            }
        }
        Commands::Update { id, fields } => engine.update(&fields.into_creature(id))?,
        Commands::Delete { id } => {
            let creature = engine.delete(id)?;
            println!("deleted {} ({})", creature.id, creature.name);
        }
        Commands::RebuildIndex => {
            let count = engine.rebuild_index()?;
            println!("indexed {} records", count);
        }
        Commands::DumpIndex => print!("{}", engine.dump_index()?),
    }
    Ok(())
}

fn print_creature(c: &Creature) {
    println!(
        "#{:<5} {:<16} {:<20} [{}] {:.1}m {:.1}kg gen {}{}",
        c.id,
        c.name,
        c.species,
        c.types.join("/"),
        c.height_m,
        c.weight_kg,
        c.generation,
        if c.legendary { " legendary" } else { "" }
    );
    if !c.description.is_empty() {
        println!("       {}", c.description);
    }
}
