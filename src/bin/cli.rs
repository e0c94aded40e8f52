use clap::{App, Arg, ArgMatches, SubCommand};
use iovring::{
    engine::{self, IoEngine, SyncEngine},
    IoContext, IovError, Namespace, Priority, ReadControl, ReadOptions, Result, SymlinkNamespace,
    IOVEC_NAMESPACE_DIR,
};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

fn main() -> Result<()> {
    env_logger::init();

    let matches = App::new("iovring-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Zero-copy I/O ring tool")
        .subcommand(
            SubCommand::with_name("cat")
                .about("Stream a file through an I/O ring to stdout")
                .arg(
                    Arg::with_name("path")
                        .value_name("PATH")
                        .help("File to read")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("mount")
                        .short("m")
                        .long("mount")
                        .value_name("MOUNT")
                        .help("Mount point (discovered from the path by default)")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("block_size")
                        .short("b")
                        .long("block-size")
                        .value_name("BYTES")
                        .help("Bytes per read round")
                        .default_value("4194304")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("offset")
                        .short("o")
                        .long("offset")
                        .value_name("OFFSET")
                        .help("Offset to start reading at")
                        .default_value("0")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("length")
                        .short("l")
                        .long("length")
                        .value_name("BYTES")
                        .help("Stop after this many bytes")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("priority")
                        .short("p")
                        .long("priority")
                        .value_name("PRIORITY")
                        .help("Ring priority: high, normal, low or the raw value -1, 0, 1")
                        .allow_hyphen_values(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("engine")
                        .short("e")
                        .long("engine")
                        .value_name("ENGINE")
                        .help("I/O engine")
                        .possible_values(&["auto", "sync", "uring"])
                        .default_value("auto")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("shm_dir")
                        .long("shm-dir")
                        .value_name("DIR")
                        .help("Directory for shared buffers")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("sweep")
                .about("List vector entries on a mount whose buffers are gone")
                .arg(
                    Arg::with_name("mount")
                        .short("m")
                        .long("mount")
                        .value_name("MOUNT")
                        .help("Mount point to inspect")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("remove")
                        .long("remove")
                        .help("Remove the stale entries"),
                ),
        )
        .subcommand(
            SubCommand::with_name("info")
                .about("Show version and engine information")
                .arg(
                    Arg::with_name("entries")
                        .short("n")
                        .long("entries")
                        .value_name("ENTRIES")
                        .help("Ring entries to size")
                        .default_value("1024")
                        .takes_value(true),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        ("cat", Some(cat_matches)) => handle_cat(cat_matches),
        ("sweep", Some(sweep_matches)) => handle_sweep(sweep_matches),
        ("info", Some(info_matches)) => show_info(info_matches),
        _ => {
            println!("Use --help for usage information");
            Ok(())
        }
    }
}

fn arg<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .value_of(name)
        .ok_or_else(|| IovError::invalid_parameter(name, "missing value"))
}

fn parse<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> Result<T> {
    arg(matches, name)?
        .parse()
        .map_err(|_| IovError::invalid_parameter(name, "Invalid number"))
}

fn select_engine(name: &str) -> Result<Arc<dyn IoEngine>> {
    match name {
        "auto" => Ok(engine::default_engine()),
        "sync" => Ok(Arc::new(SyncEngine::new())),
        #[cfg(all(target_os = "linux", feature = "uring"))]
        "uring" => Ok(Arc::new(iovring::UringEngine::new())),
        other => Err(IovError::invalid_parameter(
            "engine",
            format!("engine '{}' is not available in this build", other),
        )),
    }
}

fn handle_cat(matches: &ArgMatches) -> Result<()> {
    let path = PathBuf::from(arg(matches, "path")?);
    let limit: Option<u64> = match matches.value_of("length") {
        Some(_) => Some(parse(matches, "length")?),
        None => None,
    };

    let mut options = ReadOptions::new()
        .with_block_size(parse(matches, "block_size")?)
        .with_start_offset(parse(matches, "offset")?);
    if let Some(mount) = matches.value_of("mount") {
        options = options.with_mount_point(mount);
    }
    if let Some(priority) = matches.value_of("priority") {
        options = options.with_priority(Some(priority.parse::<Priority>()?));
    }

    let mut ctx = IoContext::new(select_engine(arg(matches, "engine")?)?);
    if let Some(dir) = matches.value_of("shm_dir") {
        ctx = ctx.with_shm_config(iovring::ShmConfig::new(dir));
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut written = 0u64;
    let mut write_error = None;

    ctx.read_file_with(&path, &options, |data, _offset| {
        let take = match limit {
            Some(limit) => data.len().min((limit - written) as usize),
            None => data.len(),
        };
        if let Err(e) = out.write_all(&data[..take]) {
            write_error = Some(e);
            return ReadControl::Stop;
        }
        written += take as u64;

        if limit.map_or(false, |limit| written >= limit) {
            ReadControl::Stop
        } else {
            ReadControl::Continue
        }
    })?;

    if let Some(e) = write_error {
        return Err(IovError::from_io(e, "Failed to write to stdout"));
    }
    out.flush()
        .map_err(|e| IovError::from_io(e, "Failed to flush stdout"))?;

    log::info!("{}: {} bytes written", path.display(), written);
    Ok(())
}

fn handle_sweep(matches: &ArgMatches) -> Result<()> {
    let mount = Path::new(arg(matches, "mount")?);
    let dir = mount.join(IOVEC_NAMESPACE_DIR);
    let remove = matches.is_present("remove");

    let entries = fs::read_dir(&dir)
        .map_err(|e| IovError::from_io(e, &format!("Failed to list {}", dir.display())))?;

    let namespace = SymlinkNamespace;
    let mut stale = 0usize;
    for entry in entries {
        let entry = entry.map_err(|e| IovError::from_io(e, "Failed to read entry"))?;
        let link = entry.path();
        let target = match fs::read_link(&link) {
            Ok(target) => target,
            Err(_) => continue,
        };
        if target.exists() {
            continue;
        }

        stale += 1;
        println!("  - {} -> {}", link.display(), target.display());
        if remove {
            namespace
                .remove_entry(&link)
                .map_err(|e| IovError::from_io(e, "Failed to remove entry"))?;
        }
    }

    if stale == 0 {
        println!("No stale entries under {}", dir.display());
    } else if remove {
        println!("Removed {} stale entries", stale);
    } else {
        println!("{} stale entries (use --remove to delete)", stale);
    }
    Ok(())
}

fn show_info(matches: &ArgMatches) -> Result<()> {
    let entries: usize = parse(matches, "entries")?;
    let engine = engine::default_engine();

    println!("iovring {}", iovring::VERSION);
    println!("  Engine: {}", engine.name());
    println!(
        "  Ring memory for {} entries: {} bytes",
        entries,
        engine.ring_size_for_entries(entries)
    );
    println!("  Default read block size: {} bytes", iovring::DEFAULT_READ_BLOCK_SIZE);
    Ok(())
}
