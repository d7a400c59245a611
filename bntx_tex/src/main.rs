use std::path::{Path, PathBuf};

use anyhow::Context;
use bntx_lib::astc::{self, CreateAstcError};
use bntx_lib::bntx::{channel_source_name, Bntx, FormatKind, Texture};
use bntx_lib::dds::{self, CreateDdsError};
use clap::Parser;
use log::{info, warn};
use rayon::prelude::*;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// The input .bntx file.
    input: String,
    /// The output folder for extracted images.
    /// Defaults to the input file's folder.
    #[arg(short, long)]
    output: Option<String>,
}

fn main() -> anyhow::Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()?;

    let cli = Cli::parse();
    let input = PathBuf::from(&cli.input);

    let bntx = Bntx::from_file(&input).with_context(|| format!("failed to read {}", cli.input))?;
    println!("File name: {}", bntx.file_name);
    println!("Texture count: {}", bntx.textures.len());
    for texture in &bntx.textures {
        print_texture_info(texture);
    }

    let output = cli
        .output
        .map(PathBuf::from)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&output)
        .with_context(|| format!("failed to create {}", output.display()))?;

    // Each texture converts independently, so extraction parallelizes
    // across entries with no ordering requirement.
    bntx.textures
        .par_iter()
        .try_for_each(|texture| extract_texture(texture, &output))
}

fn print_texture_info(texture: &Texture) {
    println!();
    println!("Name: {}", texture.name);
    match texture.image_format() {
        Some(format) => println!("Format: {format}"),
        None => println!("Format: {:#06x} (not supported)", texture.format_code),
    }
    println!("Width: {}", texture.width);
    println!("Height: {}", texture.height);
    println!("Mipmaps: {}", texture.mipmap_count.saturating_sub(1));
    println!("Faces: {}", texture.layer_count);
    let [r, g, b, a] = texture.component_selector.map(channel_source_name);
    println!("Channels: {r} {g} {b} {a}");
    println!("Image size: {}", texture.image_data.len());
}

fn extract_texture(texture: &Texture, output: &Path) -> anyhow::Result<()> {
    let (bytes, extension) = match texture.image_format().map(|f| f.family().kind()) {
        Some(FormatKind::Astc) => match astc::create_astc(texture) {
            Ok(bytes) => (bytes, "astc"),
            Err(CreateAstcError::Convert(error)) => {
                warn!("can't convert {}: {error}", texture.name);
                return Ok(());
            }
            Err(error) => return Err(error.into()),
        },
        // Unknown codes fall through and report as an unsupported format.
        _ => match dds::create_dds(texture) {
            Ok(bytes) => (bytes, "dds"),
            Err(CreateDdsError::Convert(error)) => {
                warn!("can't convert {}: {error}", texture.name);
                return Ok(());
            }
            Err(error) => return Err(error.into()),
        },
    };

    let path = output.join(format!("{}.{extension}", texture.name));
    std::fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    info!("extracted {}", path.display());
    Ok(())
}
