use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use forge_tfrag_lib::export::{self, Manifest};
use forge_tfrag_lib::terrain::{self, CancelFlag, ConversionCache, RenderState, TerrainJob};
use forge_tfrag_lib::tfrag::{unpack_def, TemplateSet};

fn usage() -> ! {
    eprintln!("Usage:");
    eprintln!("  tfrag-cli convert <job.json> <output_dir> [--force] [--glb] [--zeroed-templates]");
    eprintln!("  tfrag-cli inspect <chunk.tfragdef>");
    eprintln!("  tfrag-cli hash <job.json>");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  tfrag-cli convert ./level/terrain.json ./out/terrain");
    eprintln!("  tfrag-cli convert ./level/terrain.json ./out/terrain --force --glb");
    eprintln!("  tfrag-cli inspect ./out/terrain/0.tfragdef");
    std::process::exit(1);
}

fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        usage();
    }

    let outcome = match args[1].as_str() {
        "convert" => {
            let Some(output_dir) = args.get(3) else { usage() };
            let mut force = false;
            let mut glb = false;
            let mut zeroed = false;
            for flag in &args[4..] {
                match flag.as_str() {
                    "--force" => force = true,
                    "--glb" => glb = true,
                    "--zeroed-templates" => zeroed = true,
                    other => {
                        eprintln!("Unknown option '{}'", other);
                        std::process::exit(1);
                    }
                }
            }
            convert(Path::new(&args[2]), &PathBuf::from(output_dir), force, glb, zeroed)
        }
        "inspect" => inspect(Path::new(&args[2])),
        "hash" => hash(Path::new(&args[2])),
        _ => usage(),
    };

    if let Err(e) = outcome {
        eprintln!("Failed: {:?}", e);
        std::process::exit(1);
    }
}

fn convert(job_path: &Path, output_dir: &Path, force: bool, glb: bool, zeroed: bool) -> Result<()> {
    eprintln!("Converting terrain ...");
    eprintln!("  Job:        {}", job_path.display());
    eprintln!("  Output dir: {}", output_dir.display());

    let job = TerrainJob::load(job_path)?;
    let heightfield = job.build_heightfield()?;

    let cache = Manifest::load(output_dir)?
        .map(|m| m.cache)
        .unwrap_or_else(ConversionCache::default);
    let plan = terrain::plan_conversion(&heightfield, &job.settings, &job.overrides, &cache)?;
    if plan.up_to_date && !force {
        eprintln!("Terrain unchanged ({}), {} chunks up to date", plan.hash, plan.chunk_count);
        return Ok(());
    }

    let templates = if zeroed {
        TemplateSet::zeroed()?
    } else {
        TemplateSet::reference()?
    };
    let cancel = CancelFlag::new();
    let result = terrain::convert_terrain(&heightfield, &job.settings, &job.overrides, &templates, Some(&cancel))
        .context("Terrain conversion failed")?;

    let manifest = export::write_conversion(&result, &job.overrides, output_dir)?;
    if glb {
        let path = output_dir.join("terrain.glb");
        export::export_terrain_glb(&result, &job.overrides, RenderState::default(), &path)?;
        eprintln!("  GLB:        {}", path.display());
    }

    eprintln!("Conversion {}!", if manifest.complete { "complete" } else { "incomplete" });
    eprintln!("  Hash:     {}", manifest.hash);
    eprintln!(
        "  Faces:    {}x{}",
        manifest.faces_per_row, manifest.faces_per_column
    );
    eprintln!("  Chunks:   {}/{}", manifest.chunks.len(), manifest.chunk_count);
    eprintln!("  Textures: {}", manifest.textures.len());

    match &manifest.failure {
        Some(failure) => Err(anyhow!("Stopped at {}", failure)),
        None => Ok(()),
    }
}

fn inspect(def_path: &Path) -> Result<()> {
    let def = std::fs::read(def_path).with_context(|| format!("Failed to read {}", def_path.display()))?;
    let header = unpack_def(&def)?;
    println!("{:#?}", header);
    Ok(())
}

fn hash(job_path: &Path) -> Result<()> {
    let job = TerrainJob::load(job_path)?;
    let heightfield = job.build_heightfield()?;
    let hash = terrain::compute_hash(&heightfield, &job.overrides, &job.settings)?;
    println!("{}", hash);
    Ok(())
}
