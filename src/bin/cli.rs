//! ChunkDB CLI Client
//!
//! Command-line interface for interacting with a ChunkDB daemon. Payloads
//! are given as JSON strings mirroring the resource hierarchy.

use std::net::TcpStream;
use std::process::ExitCode;

use chunkdb::protocol::{read_response, write_command, Command, CommandType, Response};
use clap::{Parser, Subcommand};
use serde_json::Value;

/// ChunkDB CLI
#[derive(Parser, Debug)]
#[command(name = "chunkdb-cli")]
#[command(about = "CLI for the ChunkDB document database")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:8008")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create databases, collections, and documents
    Create {
        /// Nested payload, e.g. '{"db": {"coll": {"d1": {"name": "x"}}}}'
        payload: String,
    },

    /// Read a resource path
    Read {
        /// Path payload, e.g. '{"db": {"coll": {}}}' (omit for databases)
        payload: Option<String>,
    },

    /// Rename resources or merge document fields
    Update {
        /// Payload, e.g. '{"db": {"coll": {"<id>": {"name": "y"}}}}'
        payload: String,
    },

    /// Delete resources or matching documents
    Delete {
        /// Payload, e.g. '{"db": {"coll": {"$field": "n", ">": 5}}}'
        payload: String,
    },

    /// Search documents matching a predicate
    Search {
        /// Payload, optionally wrapped '{"data": ..., "pageNumber": 1, "limit": 10}'
        payload: String,
    },

    /// List resource names at a path
    List {
        /// Path payload (omit for databases)
        payload: Option<String>,
    },

    /// Export a subtree as one nested JSON object
    Export {
        /// Path payload, e.g. '{"db": {}}' (omit for the whole store)
        payload: Option<String>,
    },

    /// Ping the server
    Ping,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let command = match build_command(&args.command) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Invalid payload: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let response = match send(&args.server, &command) {
        Ok(response) => response,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    print_response(&response);
    if response.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn build_command(commands: &Commands) -> Result<Command, serde_json::Error> {
    let (command_type, payload) = match commands {
        Commands::Create { payload } => (CommandType::Create, parse_payload(Some(payload))?),
        Commands::Read { payload } => (CommandType::Read, parse_payload(payload.as_deref())?),
        Commands::Update { payload } => (CommandType::Update, parse_payload(Some(payload))?),
        Commands::Delete { payload } => (CommandType::Delete, parse_payload(Some(payload))?),
        Commands::Search { payload } => (CommandType::Search, parse_payload(Some(payload))?),
        Commands::List { payload } => (CommandType::List, parse_payload(payload.as_deref())?),
        Commands::Export { payload } => (CommandType::Export, parse_payload(payload.as_deref())?),
        Commands::Ping => return Ok(Command::ping()),
    };
    Ok(Command::new(command_type, payload))
}

fn parse_payload(payload: Option<&str>) -> Result<Value, serde_json::Error> {
    match payload {
        Some(text) => serde_json::from_str(text),
        None => Ok(Value::Null),
    }
}

fn send(addr: &str, command: &Command) -> chunkdb::Result<Response> {
    let mut stream = TcpStream::connect(addr)?;
    write_command(&mut stream, command)?;
    read_response(&mut stream)
}

fn print_response(response: &Response) {
    if response.success {
        println!("OK: {}", response.message);
    } else {
        println!("ERROR: {}", response.message);
    }
    if let Some(counts) = &response.counts {
        println!(
            "affected: databases={} collections={} documents={}",
            counts.databases, counts.collections, counts.documents
        );
    }
    if let Some(data) = &response.data {
        match serde_json::to_string_pretty(data) {
            Ok(text) => println!("{}", text),
            Err(_) => println!("{}", data),
        }
    }
}
