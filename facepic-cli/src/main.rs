use anyhow::Context;
use clap::{Parser, Subcommand};
use facepic_core::config::Config;
use facepic_core::library::Library;
use facepic_core::{Catalog, ClusterStats, Clusterer, Detection, Person, PersonId};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facepic")]
#[command(about = "Group photo faces into people", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of the default search path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the library directory
    #[arg(long, global = true)]
    library: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record detected faces (JSON lines) and cluster them
    Ingest {
        /// File with one detection per line
        file: PathBuf,
    },
    /// Cluster faces not yet assigned to anyone
    Cluster,
    /// Discard all persons and cluster every face again
    Recluster,
    /// List persons
    Persons {
        /// Only persons with a name
        #[arg(long, conflicts_with = "unlabeled")]
        labeled: bool,
        /// Only persons without a name
        #[arg(long)]
        unlabeled: bool,
    },
    /// Show one person and their faces
    Show {
        person: PersonId,
    },
    /// Set a person's name (omit to clear it)
    Rename {
        person: PersonId,
        name: Option<String>,
    },
    /// Fold one person into another
    Merge {
        /// Person to absorb and remove
        source: PersonId,
        /// Person that keeps the faces
        target: PersonId,
    },
    /// Delete a person; their faces become unassigned
    Delete {
        person: PersonId,
    },
    /// Remove all faces detected in an image
    RemoveImage {
        image_id: String,
    },
    /// Prune unreliable faces and merge duplicate persons
    Fixup {
        /// Skip pruning faces
        #[arg(long)]
        skip_prune: bool,
        /// Skip merging persons
        #[arg(long)]
        skip_merge: bool,
        /// Override the duplicate merge threshold
        #[arg(long)]
        tolerance: Option<f32>,
    },
    /// Check catalog invariants
    Check,
    /// Show configuration
    Config {
        /// Validate configuration
        #[arg(long)]
        validate: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::load_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::load()?,
    };
    if let Some(library) = cli.library {
        config.storage.library_path = library;
    }

    match cli.command {
        Commands::Ingest { file } => cmd_ingest(&config, file),
        Commands::Cluster => cmd_cluster(&config, false),
        Commands::Recluster => cmd_cluster(&config, true),
        Commands::Persons { labeled, unlabeled } => {
            let filter = match (labeled, unlabeled) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            cmd_persons(&config, filter)
        }
        Commands::Show { person } => cmd_show(&config, person),
        Commands::Rename { person, name } => cmd_rename(&config, person, name),
        Commands::Merge { source, target } => cmd_merge(&config, source, target),
        Commands::Delete { person } => cmd_delete(&config, person),
        Commands::RemoveImage { image_id } => cmd_remove_image(&config, image_id),
        Commands::Fixup {
            skip_prune,
            skip_merge,
            tolerance,
        } => cmd_fixup(&config, skip_prune, skip_merge, tolerance),
        Commands::Check => cmd_check(&config),
        Commands::Config { validate } => cmd_config(&config, validate),
    }
}

fn open_library(config: &Config) -> Library {
    Library::new(config.library_path(), config.embedding.dimension)
}

fn open_clusterer(config: &Config) -> anyhow::Result<(Library, Clusterer)> {
    let library = open_library(config);
    let catalog = library
        .load()
        .with_context(|| format!("Failed to load library {}", library.path().display()))?;
    Ok((library, Clusterer::new(config, catalog)))
}

fn save(library: &Library, clusterer: &Clusterer) -> anyhow::Result<()> {
    library
        .save(clusterer.catalog())
        .with_context(|| format!("Failed to save library {}", library.path().display()))
}

fn read_detections(file: &Path) -> anyhow::Result<Vec<Detection>> {
    let reader = BufReader::new(
        File::open(file).with_context(|| format!("Failed to open {}", file.display()))?,
    );

    let mut detections = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Detection>(&line) {
            Ok(detection) => detections.push(detection),
            Err(e) => log::warn!("Skipping line {}: {}", idx + 1, e),
        }
    }
    Ok(detections)
}

fn print_cluster_stats(stats: &ClusterStats) {
    println!("Faces processed:     {}", stats.faces_processed);
    println!("Matched to existing: {}", stats.matched_to_existing);
    println!("New persons:         {}", stats.new_persons_created);
    if stats.skipped > 0 {
        println!("Skipped:             {}", stats.skipped);
    }
}

fn cmd_ingest(config: &Config, file: PathBuf) -> anyhow::Result<()> {
    let detections = read_detections(&file)?;
    println!("Read {} detections from {}", detections.len(), file.display());

    let (library, mut clusterer) = open_clusterer(config)?;
    let stats = clusterer.ingest(detections)?;
    save(&library, &clusterer)?;

    println!();
    println!("Accepted:            {}", stats.accepted);
    println!("Rejected by filter:  {}", stats.rejected);
    println!("Invalid embeddings:  {}", stats.invalid);
    print_cluster_stats(&stats.clustering);

    Ok(())
}

fn cmd_cluster(config: &Config, from_scratch: bool) -> anyhow::Result<()> {
    let (library, mut clusterer) = open_clusterer(config)?;

    let stats = if from_scratch {
        clusterer.recluster_all()?
    } else {
        clusterer.cluster_pending()?
    };
    save(&library, &clusterer)?;

    print_cluster_stats(&stats);
    Ok(())
}

/// Named persons first, then newest first
fn sorted_persons(catalog: &Catalog, labeled: Option<bool>) -> Vec<&Person> {
    let mut persons: Vec<&Person> = catalog
        .persons()
        .filter(|p| labeled.map_or(true, |want| p.is_labeled() == want))
        .collect();
    persons.sort_by(|a, b| {
        b.is_labeled()
            .cmp(&a.is_labeled())
            .then(b.created_at.cmp(&a.created_at))
            .then(a.id.cmp(&b.id))
    });
    persons
}

fn cmd_persons(config: &Config, labeled: Option<bool>) -> anyhow::Result<()> {
    let (_, clusterer) = open_clusterer(config)?;
    let catalog = clusterer.catalog();

    let persons = sorted_persons(catalog, labeled);
    if persons.is_empty() {
        println!("No persons found");
        return Ok(());
    }

    println!("{:<8} {:<24} {:>6} {:>7} {:>10}", "ID", "Name", "Faces", "Photos", "Thumbnail");
    println!("{}", "-".repeat(60));

    for person in persons {
        let faces: Vec<_> = catalog.faces_of(person.id).collect();
        let photos: HashSet<&str> = faces.iter().map(|f| f.image_id.as_str()).collect();
        let thumbnail = person
            .representative
            .map_or_else(|| "-".to_string(), |f| f.to_string());
        println!(
            "{:<8} {:<24} {:>6} {:>7} {:>10}",
            person.id,
            person.display_name(),
            faces.len(),
            photos.len(),
            thumbnail
        );
    }

    Ok(())
}

fn cmd_show(config: &Config, person: PersonId) -> anyhow::Result<()> {
    let (_, clusterer) = open_clusterer(config)?;
    let catalog = clusterer.catalog();
    let record = catalog.person(person)?;

    println!("Person {}: {}", record.id, record.display_name());
    println!("Created: {}", record.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Updated: {}", record.updated_at.format("%Y-%m-%d %H:%M:%S"));
    println!();
    println!("{:<8} {:<24} {:>8} {:<22}", "Face", "Image", "Quality", "Box (t,r,b,l)");
    println!("{}", "-".repeat(70));

    for face in catalog.faces_of(person) {
        let marker = if record.representative == Some(face.id) { "★" } else { "" };
        let bbox = face.bbox;
        println!(
            "{:<8} {:<24} {:>8.3} {:<22} {}",
            face.id,
            face.image_id,
            face.quality,
            format!("{},{},{},{}", bbox.top, bbox.right, bbox.bottom, bbox.left),
            marker
        );
    }

    Ok(())
}

fn cmd_rename(config: &Config, person: PersonId, name: Option<String>) -> anyhow::Result<()> {
    let (library, mut clusterer) = open_clusterer(config)?;
    clusterer.rename(person, name)?;
    save(&library, &clusterer)?;

    let record = clusterer.catalog().person(person)?;
    println!("✓ Person {} is now {}", person, record.display_name());
    Ok(())
}

fn cmd_merge(config: &Config, source: PersonId, target: PersonId) -> anyhow::Result<()> {
    let (library, mut clusterer) = open_clusterer(config)?;
    clusterer.merge(source, target)?;
    save(&library, &clusterer)?;

    println!("✓ Merged person {} into {}", source, target);
    Ok(())
}

fn cmd_delete(config: &Config, person: PersonId) -> anyhow::Result<()> {
    let (library, mut clusterer) = open_clusterer(config)?;
    let released = clusterer.delete_person(person)?;
    save(&library, &clusterer)?;

    println!("✓ Person {} deleted, {} faces unassigned", person, released);
    println!("(Run `facepic cluster` to assign them again)");
    Ok(())
}

fn cmd_remove_image(config: &Config, image_id: String) -> anyhow::Result<()> {
    let (library, mut clusterer) = open_clusterer(config)?;
    let stats = clusterer.remove_image(&image_id)?;
    save(&library, &clusterer)?;

    println!(
        "✓ Removed {} faces from {} ({} persons emptied)",
        stats.faces_removed, image_id, stats.persons_removed
    );
    Ok(())
}

fn cmd_fixup(
    config: &Config,
    skip_prune: bool,
    skip_merge: bool,
    tolerance: Option<f32>,
) -> anyhow::Result<()> {
    let (library, mut clusterer) = open_clusterer(config)?;

    if !skip_prune {
        let stats = clusterer.prune()?;
        println!("Removed {} faces, {} persons emptied", stats.faces_removed, stats.persons_removed);
    }

    if !skip_merge {
        let threshold = tolerance.unwrap_or_else(|| config.merge_threshold());
        if !(-1.0..=1.0).contains(&threshold) {
            anyhow::bail!("Tolerance must be between -1.0 and 1.0");
        }
        println!("Merging duplicate persons (threshold={})...", threshold);
        let merged = clusterer.merge_duplicates(threshold)?;
        println!("Merged {} persons", merged);
    }

    let emptied = clusterer.prune_empty_persons()?;
    if emptied > 0 {
        println!("Removed {} empty persons", emptied);
    }

    save(&library, &clusterer)?;
    Ok(())
}

fn cmd_check(config: &Config) -> anyhow::Result<()> {
    let (_, clusterer) = open_clusterer(config)?;
    let catalog = clusterer.catalog();

    let issues = catalog.check_integrity();
    let empty = catalog.empty_persons();

    println!("{} faces, {} persons", catalog.face_count(), catalog.person_count());
    for issue in &issues {
        println!("✗ {}", issue);
    }
    for person in &empty {
        println!("! person {} has no faces", person);
    }

    if issues.is_empty() {
        println!("✓ Catalog is consistent");
        Ok(())
    } else {
        anyhow::bail!("{} integrity issues found", issues.len())
    }
}

fn cmd_config(config: &Config, validate: bool) -> anyhow::Result<()> {
    if validate {
        config.validate()?;
        println!("✓ Configuration is valid");
        return Ok(());
    }

    println!("Configuration:");
    println!();

    println!("[embedding]");
    println!("  dimension = {}", config.embedding.dimension);
    println!();

    println!("[matching]");
    println!("  threshold = {}", config.matching.threshold);
    println!();

    println!("[filter]");
    println!("  min_score = {}", config.filter.min_score);
    println!("  edge_margin = {}", config.filter.edge_margin);
    println!();

    println!("[fixup]");
    println!("  merge_threshold = {}", config.merge_threshold());
    println!();

    println!("[storage]");
    println!("  library_path = {:?}", config.library_path());

    Ok(())
}
