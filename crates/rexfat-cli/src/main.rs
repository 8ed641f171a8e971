use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use rexfat::Exfat;
use rexfat::structures::directory::DentryFilter;
use rexfat::structures::raw::dentry::entry_type;

#[derive(Debug, Clone, Parser)]
#[command(name = "exfatdump", version, about = "Dump exFAT volume metadata")]
pub struct Args {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Clone, clap::Subcommand)]
pub enum Command {
    /// Show the boot sector region, the root entries and the statistics
    Info(InfoArgs),
}

impl Command {
    pub fn verbose(&self) -> bool {
        match self {
            Command::Info(args) => args.verbose,
        }
    }
}

#[derive(Debug, Clone, Parser)]
pub struct InfoArgs {
    /// Path to an exFAT image or block device
    input: PathBuf,
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    simple_logger::SimpleLogger::new()
        .with_level(if args.cmd.verbose() {
            log::LevelFilter::Trace
        } else {
            log::LevelFilter::Warn
        })
        .init()
        .unwrap();

    match args.cmd {
        Command::Info(args) => info(&args.input),
    }
}

fn info(input: &PathBuf) -> anyhow::Result<()> {
    let device = OpenOptions::new()
        .read(true)
        .open(input)
        .with_context(|| format!("Cannot open {}", input.display()))?;
    let mut fs = Exfat::open(device)
        .with_context(|| format!("{} does not hold a valid exFAT volume", input.display()))?;
    let geometry = *fs.info();

    println!("-------------- Dump Boot sector region --------------");
    println!("Volume Length(sectors): \t\t{}", geometry.volume_length);
    println!("FAT Offset(sector offset): \t\t{}", geometry.fat_offset);
    println!("FAT Length(sectors): \t\t\t{}", geometry.fat_length);
    println!(
        "Cluster Heap Offset (sector offset): \t{}",
        geometry.cluster_heap_offset
    );
    println!("Cluster Count: \t\t\t\t{}", geometry.cluster_count);
    println!(
        "Root Cluster (cluster offset): \t\t{}",
        geometry.root_cluster
    );
    println!("Volume Serial: \t\t\t\t{:#x}", geometry.volume_serial);
    println!("Bytes per Sector: \t\t\t{}", geometry.bytes_per_sector());
    println!(
        "Sectors per Cluster: \t\t\t{}\n",
        geometry.sectors_per_cluster()
    );

    println!("----------------- Dump Root entries -----------------");
    if let Some(label) = fs.find_root_entry(&mut DentryFilter::by_type(entry_type::VOLUME_LABEL))? {
        println!(
            "Volume label entry position: \t\t{:#x}",
            label.device_offset()
        );
        println!(
            "Volume label character count: \t\t{}",
            label.label_char_count().unwrap_or(0)
        );
        match label.volume_label() {
            Some(text) => println!("Volume label: \t\t\t\t{}", text),
            None => println!("Volume label: \t\t\t\t<invalid>"),
        }
    }

    if let Some(upcase) = fs.find_root_entry(&mut DentryFilter::by_type(entry_type::UPCASE_TABLE))? {
        if let Some(descriptor) = upcase.upcase_descriptor() {
            println!(
                "Upcase table entry position: \t\t{:#x}",
                upcase.device_offset()
            );
            println!(
                "Upcase table start cluster: \t\t{:x}",
                descriptor.first_cluster
            );
            println!("Upcase table size: \t\t\t{}", descriptor.data_length);
        }
    }

    if let Some(set) = fs.find_root_entry(&mut DentryFilter::by_type(entry_type::ALLOCATION_BITMAP))? {
        if let Some(descriptor) = set.bitmap_descriptor() {
            println!("Bitmap entry position: \t\t\t{:#x}", set.device_offset());
            println!("Bitmap start cluster: \t\t\t{:x}", descriptor.first_cluster);
            println!("Bitmap size: \t\t\t\t{}", descriptor.data_length);

            let stats = fs
                .cluster_stats()
                .context("Cannot read the allocation bitmap")?
                .context("Bitmap entry vanished while reading")?;
            println!("\n---------------- Show the statistics ----------------");
            println!("Cluster size:  \t\t\t\t{}", geometry.cluster_size());
            println!("Total Clusters: \t\t\t{}", stats.total);
            println!("Free Clusters: \t\t\t\t{}", stats.free);
        }
    }

    Ok(())
}
