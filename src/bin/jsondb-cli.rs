use clap::{Parser, Subcommand};
use jsondb::{Engine, EngineOptions, Path, Result};
use log::info;
use serde_json::Value;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Opts {
    /// JSON document file, created if missing.
    #[arg(long, default_value = "db.json")]
    file: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prints the value at a dot-separated path, or the whole document if
    /// omitted.
    Get {
        #[arg(default_value = "")]
        path: String,
    },
    /// Parses `value` as JSON and sets it at `path`.
    Set { path: String, value: String },
    /// Deletes the value at `path`.
    Delete { path: String },
    /// Prints every element of the array at `path` whose `field` equals
    /// `value` (parsed as JSON).
    Find {
        path: String,
        field: String,
        value: String,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let opts = Opts::parse();
    info!("opening {}", opts.file);
    let engine = Engine::open(&opts.file, EngineOptions::new())?;

    match opts.command {
        Commands::Get { path } => {
            match engine.get(&Path::parse(&path))? {
                Some(value) => println!("{value}"),
                None => println!("path not found"),
            }
        }
        Commands::Set { path, value } => {
            let value: Value = serde_json::from_str(&value)?;
            engine.set(&Path::parse(&path), value)?.wait()?;
        }
        Commands::Delete { path } => {
            engine.delete(&Path::parse(&path))?.wait()?;
        }
        Commands::Find { path, field, value } => {
            let value: Value = serde_json::from_str(&value)?;
            let mut shape = serde_json::Map::new();
            shape.insert(field, value);
            let predicate = jsondb::Predicate::shape(Value::Object(shape));
            let results = engine.find(&Path::parse(&path), &predicate, &jsondb::QueryOptions::default())?;
            for item in results {
                println!("{item}");
            }
        }
    }

    engine.close();
    Ok(())
}
