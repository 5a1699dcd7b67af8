//! Build automation tasks for Rowport
//!
//! Currently this renders the `rowport` command reference from its clap
//! definitions.

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for Rowport", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference in Markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<rowport_ingest::Cli>();

    let content = format!(
        r#"# Rowport CLI Reference

This documentation is generated from the CLI source code. Last updated: {}.

## Overview

`rowport` maps rows of uploaded tabular files onto the resources of a target
REST API and publishes them, one agent at a time. Data maps, lookups and
bootstrap payloads are read from a JSON catalog.

## Quick Start

```bash
# Check a data map against a resource schema
rowport validate-map --schema students.schema.json --map students.map.json

# Preview the documents a file would produce
rowport apply-map --schema students.schema.json --map students.map.json --csv students.csv

# Publish bootstrap data and ingest every pending file
rowport run --connection sandbox --catalog catalog.json --file-root ./uploads
```

## Commands

{}

## Environment Variables

- `ROWPORT_CONNECTION_NAME` - Connection whose agents are processed (default: `default`)
- `ROWPORT_API_URL` - Base URL of the target API
- `ROWPORT_TOKEN_URL` - OAuth token endpoint; requests are anonymous when unset
- `ROWPORT_CLIENT_ID` / `ROWPORT_CLIENT_SECRET` - Client credentials for the token endpoint
- `ROWPORT_API_TIMEOUT_SECS` - Request timeout in seconds (default: `300`)
- `ROWPORT_LIMIT_CONCURRENT_POSTS` - Bound row concurrency (default: `false`)
- `ROWPORT_MAX_CONCURRENT_POSTS` - Row concurrency bound (default: `100`)
- `ROWPORT_CHECK_METADATA` - Compare maps with the target's schemas before a run (default: `true`)
- `ROWPORT_INGESTION_LOG_LEVEL` - Lowest level written to the ingestion log (default: `info`)
- `ROWPORT_SCHEDULED_ONLY` - Only run agents with a due weekly schedule slot (default: `false`)
- `ROWPORT_CATALOG` - Catalog file
- `ROWPORT_FILE_ROOT` - Root directory of uploaded files
- `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT`, `LOG_DIR` - Diagnostic logging
- `LOG_INGESTION_FILE_PREFIX` - Write ingestion records to their own JSON-lines file

---

*To update, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
