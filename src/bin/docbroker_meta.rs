//! CLI entry point for docbroker-meta: metadata inspection and maintenance.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use docbroker::config::parse_config;
use docbroker::metadata::{DocumentMap, LoadErrorPolicy, MetadataStore};

#[derive(Parser)]
#[command(name = "docbroker-meta", about = "docbroker metadata maintenance tool")]
struct Cli {
    /// Config file used to locate the metadata file.
    #[arg(long, default_value = "docbroker.yaml", global = true)]
    config: PathBuf,
    /// Metadata file (overrides the config).
    #[arg(long, global = true)]
    file: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every record
    Show,
    /// Reset the metadata file to an empty map (stored objects are kept)
    Clear {
        /// Skip the confirmation prompt.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Write the metadata map as JSON
    Export {
        #[arg(long, default_value = "-")]
        output: String,
    },
}

fn resolve_metadata_path(
    config_path: &Path,
    file: Option<PathBuf>,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(file) = file {
        return Ok(file);
    }
    let mut config = if config_path.exists() {
        parse_config(&std::fs::read_to_string(config_path)?)?
    } else {
        Default::default()
    };
    config.apply_env(|name| std::env::var(name).ok())?;
    Ok(PathBuf::from(config.metadata.path))
}

fn main() {
    let cli = Cli::parse();
    let path = match resolve_metadata_path(&cli.config, cli.file) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error reading config: {}", e);
            std::process::exit(1);
        }
    };

    let rc = match cli.command {
        Commands::Show => run_show(&path),
        Commands::Clear { yes } => run_clear(&path, yes),
        Commands::Export { output } => run_export(&path, &output),
    };
    std::process::exit(rc);
}

/// Load the map without creating the file when it is absent.
fn load(path: &Path) -> Result<Option<DocumentMap>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let store = MetadataStore::open(path, LoadErrorPolicy::Fail).map_err(|e| e.to_string())?;
    store.load().map(Some).map_err(|e| e.to_string())
}

fn render_summary(map: &DocumentMap) -> String {
    let mut out = format!("Total documents: {}\n", map.len());
    for (id, doc) in map {
        let size = doc
            .size_bytes
            .map(|s| format!("{s} bytes"))
            .unwrap_or_else(|| "size unknown".to_string());
        out.push_str(&format!(
            "  - {} ({}) [{}]\n    ID: {}\n",
            doc.original_filename, size, doc.status, id
        ));
    }
    out
}

fn run_show(path: &Path) -> i32 {
    match load(path) {
        Ok(None) => {
            println!("Metadata file {} does not exist.", path.display());
            0
        }
        Ok(Some(map)) => {
            print!("{}", render_summary(&map));
            0
        }
        Err(e) => {
            eprintln!("Error loading metadata: {}", e);
            1
        }
    }
}

fn run_clear(path: &Path, yes: bool) -> i32 {
    let map = match load(path) {
        Ok(None) => {
            println!("Metadata file {} does not exist. Nothing to clear.", path.display());
            return 0;
        }
        Ok(Some(map)) => map,
        Err(e) => {
            eprintln!("Error loading metadata: {}", e);
            return 1;
        }
    };
    if map.is_empty() {
        println!("No metadata to clear.");
        return 0;
    }

    print!("{}", render_summary(&map));
    if !yes && !confirm() {
        println!("Cancelled. Nothing was modified.");
        return 0;
    }

    let cleared = MetadataStore::open(path, LoadErrorPolicy::Fail).and_then(|store| store.clear());
    match cleared {
        Ok(count) => {
            println!("Cleared {} record(s). Stored objects were not touched.", count);
            0
        }
        Err(e) => {
            eprintln!("Error clearing metadata: {}", e);
            1
        }
    }
}

fn confirm() -> bool {
    print!("This deletes all local metadata. Type 'yes' to continue: ");
    if std::io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    match std::io::stdin().lock().read_line(&mut answer) {
        Ok(_) => answer.trim().eq_ignore_ascii_case("yes"),
        Err(_) => false,
    }
}

fn run_export(path: &Path, output: &str) -> i32 {
    let map = match load(path) {
        Ok(map) => map.unwrap_or_default(),
        Err(e) => {
            eprintln!("Error loading metadata: {}", e);
            return 1;
        }
    };
    let json = match serde_json::to_string_pretty(&map) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error encoding metadata: {}", e);
            return 1;
        }
    };

    if output == "-" {
        println!("{}", json);
    } else {
        if let Err(e) = std::fs::write(output, format!("{}\n", json)) {
            eprintln!("Error writing output: {}", e);
            return 1;
        }
        eprintln!("Exported {} record(s) to {}", map.len(), output);
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use docbroker::metadata::{DocumentRecord, DocumentStatus};

    #[test]
    fn test_render_summary() {
        let mut map = DocumentMap::new();
        let mut doc = DocumentRecord::pending(
            "abc".to_string(),
            "report.pdf",
            "application/pdf",
            Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
        );
        doc.status = DocumentStatus::Uploaded;
        doc.size_bytes = Some(2048);
        map.insert("abc".to_string(), doc);

        let text = render_summary(&map);
        assert!(text.starts_with("Total documents: 1\n"));
        assert!(text.contains("report.pdf (2048 bytes) [uploaded]"));
        assert!(text.contains("ID: abc"));
    }

    #[test]
    fn test_missing_file_is_not_created() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("absent.json");
        assert!(matches!(load(&path), Ok(None)));
        assert!(!path.exists());
    }

    #[test]
    fn test_explicit_file_wins() {
        let path = resolve_metadata_path(
            Path::new("/nonexistent/docbroker.yaml"),
            Some(PathBuf::from("/tmp/meta.json")),
        )
        .unwrap();
        assert_eq!(path, PathBuf::from("/tmp/meta.json"));
    }
}
