use anyhow::Context;
use cartbridge_floppy::{create_st_image, msa_to_st, remove_msa_extension};
use cartbridge_storage::HostVolume;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "cartbridge-img", about = "Disk-image tools for the floppy engine")]
struct Arguments {
    /// Folder the images live in.
    folder: std::path::PathBuf,
    #[clap(subcommand)]
    subcommand: Subcommand,
}

#[derive(Debug, clap::Subcommand)]
enum Subcommand {
    /// Create a blank, formatted raw image.
    Create {
        name: String,
        #[arg(long, default_value_t = 80)]
        tracks: u16,
        #[arg(long, default_value_t = 9)]
        sectors: u16,
        #[arg(long, default_value_t = 2)]
        sides: u16,
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        overwrite: bool,
    },
    /// Decompress an MSA image to a writable raw image.
    Convert {
        name: String,
        #[arg(long)]
        overwrite: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Arguments::parse();
    let mut volume = HostVolume::new(&args.folder);
    match args.subcommand {
        Subcommand::Create {
            name,
            tracks,
            sectors,
            sides,
            label,
            overwrite,
        } => {
            create_st_image(
                &mut volume,
                "/",
                &name,
                tracks,
                sectors,
                sides,
                label.as_deref(),
                overwrite,
            )
            .with_context(|| format!("creating {name}"))?;
            println!("created {name}: {tracks} tracks, {sectors} sectors, {sides} sides");
        }
        Subcommand::Convert { name, overwrite } => {
            let output = format!("{}.st.rw", remove_msa_extension(&name));
            msa_to_st(&mut volume, "/", &name, &output, overwrite)
                .with_context(|| format!("converting {name}"))?;
            println!("converted {name} -> {output}");
        }
    }
    Ok(())
}
