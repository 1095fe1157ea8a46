//! Main entry point for the ghpak CLI application.
//!
//! Finds pak/pab pairs on disk, writes extracted entries to a folder tree,
//! and compiles folders back into paks.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ghpak::cli::Command;
use ghpak::{Cli, EncodeOptions, PakExtractor, PakFiles, SymbolTable, encode};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Command::Extract {
            file,
            names,
            extract_dir,
        } => extract(&file, names.as_deref(), extract_dir),
        Command::List { file, names } => list(&file, names.as_deref()),
        Command::Compile {
            folder,
            qb,
            split,
            game,
            output_dir,
        } => compile(
            &folder,
            EncodeOptions {
                game,
                is_qb: qb,
                split,
            },
            output_dir,
        ),
    }
}

/// Extract every entry of the pak at `file`.
fn extract(file: &Path, names: Option<&Path>, extract_dir: Option<PathBuf>) -> Result<()> {
    let Some(files) = PakFiles::locate(file)? else {
        info!("skipping {}: pab files are read with their pak", file.display());
        return Ok(());
    };

    let symbols = load_symbols(names)?;
    let extractor = PakExtractor::open(&files, &symbols)
        .with_context(|| format!("could not extract {}", file.display()))?;

    let out_dir = extract_dir.unwrap_or_else(|| files.default_output());
    for entry in extractor.entries() {
        info!("  extracting: {}", extractor.output_name(entry));
    }
    let written = extractor.extract_all(&out_dir, files.is_debug)?;
    info!("wrote {} files to {}", written.len(), out_dir.display());
    Ok(())
}

/// Print the entry table of the pak at `file`.
fn list(file: &Path, names: Option<&Path>) -> Result<()> {
    let files = PakFiles::locate(file)?
        .with_context(|| format!("{} is a pab file, list its pak instead", file.display()))?;
    let symbols = load_symbols(names)?;
    let extractor = PakExtractor::open(&files, &symbols)
        .with_context(|| format!("could not read {}", file.display()))?;

    println!(
        "{:>10}  {:>10}  {:>5}  {:>10}  Name",
        "Length", "Offset", "Flags", "Parent"
    );
    println!("{}", "-".repeat(70));

    let mut total = 0u64;
    for entry in extractor.entries() {
        println!(
            "{:>10}  {:>#10x}  {:>#5x}  {:>#10x}  {}",
            entry.file_size(),
            entry.start_offset(),
            entry.flags(),
            entry.parent_id(),
            entry.full_name()
        );
        total += u64::from(entry.file_size());
    }

    println!("{}", "-".repeat(70));
    println!(
        "{:>10}  {:>10}  {:>5}  {:>10}  {} files",
        total,
        "",
        "",
        "",
        extractor.entries().len()
    );
    Ok(())
}

/// Compile `folder` into `<name>.pak<ext>` and `<name>.pab<ext>`.
fn compile(folder: &Path, options: EncodeOptions, output_dir: Option<PathBuf>) -> Result<()> {
    let built = encode(folder, options, None)
        .with_context(|| format!("could not compile {}", folder.display()))?;

    let name = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("folder has no name")?;
    let out_dir = output_dir
        .or_else(|| folder.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    fs::create_dir_all(&out_dir)?;

    let suffix = built.platform.suffix();
    let pak_path = out_dir.join(format!("{name}.pak{suffix}"));
    let pab_path = out_dir.join(format!("{name}.pab{suffix}"));
    fs::write(&pak_path, &built.header)
        .with_context(|| format!("could not write {}", pak_path.display()))?;
    fs::write(&pab_path, &built.payload)
        .with_context(|| format!("could not write {}", pab_path.display()))?;

    info!(
        "wrote {} ({} bytes) and {} ({} bytes)",
        pak_path.display(),
        built.header.len(),
        pab_path.display(),
        built.payload.len()
    );
    Ok(())
}

/// Build the symbol table from a newline-separated name list.
fn load_symbols(names: Option<&Path>) -> Result<SymbolTable> {
    let Some(path) = names else {
        return Ok(SymbolTable::new());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("could not read names from {}", path.display()))?;
    let table = SymbolTable::from_names(
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string),
    );
    info!("loaded {} names from {}", table.len(), path.display());
    Ok(table)
}
