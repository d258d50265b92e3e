//! Application orchestrator.
//! Loads/merges config, initializes logging, installs the interrupt handler,
//! builds the storage facade and invokes the requested operation.

use anyhow::{Result, anyhow};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

use duofs::archive::{ArchiveEvents, CompressOptions, DecompressOptions, compress, decompress};
use duofs::config::{CONFIG_ENV, default_config_path, ensure_default_config_exists, load_config};
use duofs::output as out;
use duofs::transfer::folder::{FolderTransferOptions, transfer_folder};
use duofs::transfer::single::{FileTransferOptions, transfer_file};
use duofs::transfer::{FileTransferEvents, FolderTransferEvents, SpacePolicy, TransferMode};
use duofs::{
    CancelToken, ConflictAction, ConflictResolution, FileConflict, FolderConflictResolution,
    Progress, ResourceHandle, Storage, StorageLocation, TransferError, TransferReport,
};

use crate::cli::{Args, Command, OnConflict};
use crate::logging::init_tracing;

/// Shared observer for all CLI operations: answers conflicts from the
/// `--on-conflict` policy and prints progress lines.
struct CliEvents {
    interval: i64,
    policy: OnConflict,
}

impl CliEvents {
    fn print_progress(&self, p: Progress) {
        out::print_progress(p.percent, p.bytes_moved, p.write_speed);
    }
}

impl FileTransferEvents for CliEvents {
    fn report_interval_millis(&self, _size: u64) -> i64 {
        self.interval
    }

    fn on_conflict(&self, existing: &ResourceHandle, action: ConflictAction<ConflictResolution>) {
        out::print_warn(&format!(
            "'{}' already exists; resolving as {:?}",
            existing.location,
            self.policy.file_resolution()
        ));
        action.resolve(self.policy.file_resolution());
    }

    fn on_progress(&self, progress: Progress) {
        self.print_progress(progress);
    }
}

impl FolderTransferEvents for CliEvents {
    fn report_interval_millis(&self, _total_files: u32) -> i64 {
        self.interval
    }

    fn on_counting_files(&self) {
        out::print_info("Counting files...");
    }

    fn on_parent_conflict(
        &self,
        existing: &ResourceHandle,
        can_merge: bool,
        action: ConflictAction<FolderConflictResolution>,
    ) {
        let answer = self.policy.folder_resolution(can_merge);
        out::print_warn(&format!(
            "'{}' already exists; resolving as {answer:?}",
            existing.location
        ));
        action.resolve(answer);
    }

    fn on_content_conflict(
        &self,
        mut conflicts: Vec<FileConflict>,
        action: ConflictAction<Vec<FileConflict>>,
    ) {
        let resolution = self.policy.file_resolution();
        out::print_warn(&format!(
            "{} files already exist in the destination; resolving as {resolution:?}",
            conflicts.len()
        ));
        for conflict in &mut conflicts {
            conflict.resolution = resolution;
        }
        action.resolve(conflicts);
    }

    fn on_progress(&self, progress: Progress) {
        self.print_progress(progress);
    }
}

impl ArchiveEvents for CliEvents {
    fn report_interval_millis(&self, _total_bytes: u64) -> i64 {
        self.interval
    }

    fn on_counting_files(&self) {
        out::print_info("Counting files...");
    }

    fn on_progress(&self, progress: Progress) {
        self.print_progress(progress);
    }
}

/// Run the CLI application.
pub fn run(args: Args) -> Result<()> {
    // Handle --print-config before logging init
    if args.print_config {
        if let Ok(cfg_env) = std::env::var(CONFIG_ENV) {
            out::print_info(&format!("Using {CONFIG_ENV} (explicit):\n  {cfg_env}\n"));
            out::print_info(&format!(
                "To override, unset {CONFIG_ENV} or set it to another file."
            ));
            return Ok(());
        }
        match default_config_path() {
            Some(p) => {
                out::print_info(&format!("Default duofs config path:\n  {}\n", p.display()));
                if p.exists() {
                    out::print_info("A config file already exists at that location.");
                } else {
                    out::print_info(
                        "No config file exists there yet. Run without --print-config to create a template.",
                    );
                }
            }
            None => {
                out::print_error("Could not determine a default config path.");
            }
        }
        return Ok(());
    }

    // Create template config if none exists (before logging init)
    if let Some(path) = ensure_default_config_exists() {
        out::print_success(&format!(
            "A template duofs config was written to: {}",
            path.display()
        ));
        out::print_info(
            "Edit the file to point `primary_root`, `data_root` and any `volume`/`grant` entries at real directories, then re-run this command.",
        );
        return Ok(());
    }

    let mut cfg = load_config()?;
    if let Some(level) = args.effective_log_level() {
        cfg.log_level = level;
    }
    if let Some(path) = args.log_file.as_ref() {
        cfg.log_file = Some(path.clone());
    }

    // Initialize logging and capture the guard so we can drop it on signal
    let guard_opt: Option<tracing_appender::non_blocking::WorkerGuard> =
        init_tracing(&cfg.log_level, cfg.log_file.as_deref(), args.json).map_err(|e| {
            out::print_error(&format!("Failed to initialize logging: {}", e));
            e
        })?;

    let cancel = CancelToken::new();

    // Guard needs to be dropped on SIGINT to flush logs
    let guard_slot = Arc::new(Mutex::new(guard_opt));
    {
        let guard_slot = Arc::clone(&guard_slot);
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            cancel.cancel();
            out::print_warn("Received interrupt; finishing up...");
            if let Ok(mut g) = guard_slot.lock() {
                let _ = g.take(); // drop guard here to flush tracing_appender
            }
        })
        .expect("failed to install signal handler");
    }

    debug!("Starting duofs: {:?}", args);

    let Some(command) = args.command.clone() else {
        out::print_error("No command given. Try `duofs --help`.");
        return Err(anyhow!("no command given"));
    };

    let storage = cfg.storage();
    let events = Arc::new(CliEvents {
        interval: args.interval,
        policy: args.on_conflict,
    });
    let space = if args.skip_space_check {
        SpacePolicy::unchecked()
    } else {
        SpacePolicy::default()
    };

    let result = dispatch(&storage, command, events, space, &cancel);

    // Ensure logs are flushed before exit
    if let Ok(mut g) = guard_slot.lock() {
        let _ = g.take();
    }

    result
}

fn dispatch(
    storage: &Storage,
    command: Command,
    events: Arc<CliEvents>,
    space: SpacePolicy,
    cancel: &CancelToken,
) -> Result<()> {
    match command {
        Command::Copy {
            source,
            dest,
            new_name,
        } => run_transfer(storage, TransferMode::Copy, &source, &dest, new_name, events, space, cancel),
        Command::Move {
            source,
            dest,
            new_name,
        } => run_transfer(storage, TransferMode::Move, &source, &dest, new_name, events, space, cancel),
        Command::Zip {
            paths,
            delete_entries,
        } => {
            // Last path is the target archive, the rest are entries;
            // clap guarantees at least two.
            let (target, entries) = paths.split_last().expect("clap enforces arity");
            let target = parse_location(storage, target)?;
            let entries = entries
                .iter()
                .map(|e| parse_location(storage, e))
                .collect::<Result<Vec<_>>>()?;
            let options = CompressOptions {
                delete_entries_on_success: delete_entries,
                space,
            };
            let result = compress(storage, &entries, &target, &options, events, cancel)
                .map_err(report_failure)?;
            info!(zip = %result.zip, files = result.total_files, "Compression completed");
            out::print_success(&format!(
                "Compressed {} files into '{}' ({:.1}% smaller)",
                result.total_files, result.zip, result.size_reduction_percent
            ));
            Ok(())
        }
        Command::Unzip {
            zip,
            dest,
            delete_zip,
        } => {
            let zip = parse_location(storage, &zip)?;
            let dest = parse_location(storage, &dest)?;
            let options = DecompressOptions {
                delete_zip_on_success: delete_zip,
            };
            let result = decompress(storage, &zip, &dest, &options, events, cancel)
                .map_err(report_failure)?;
            info!(
                dest = %result.target_folder,
                files = result.total_files,
                skipped_bytes = result.skipped_decompressed_bytes,
                "Decompression completed"
            );
            out::print_success(&format!(
                "Extracted {} files into '{}'",
                result.total_files, result.target_folder
            ));
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_transfer(
    storage: &Storage,
    mode: TransferMode,
    source: &str,
    dest: &str,
    new_name: Option<String>,
    events: Arc<CliEvents>,
    space: SpacePolicy,
    cancel: &CancelToken,
) -> Result<()> {
    let source = parse_location(storage, source)?;
    let dest = parse_location(storage, dest)?;

    let src_handle = storage
        .resolve(&source, false)
        .ok_or_else(|| anyhow!("source not found or not reachable: {source}"))?;

    let report = if src_handle.is_file() {
        let mut options = FileTransferOptions::new(mode).with_space(space);
        options.new_name = new_name;
        transfer_file(storage, &source, &dest, &options, events, cancel)
    } else {
        let mut options = FolderTransferOptions::new(mode).with_space(space);
        options.new_folder_name = new_name;
        transfer_folder(storage, &source, &dest, &options, events, cancel)
    }
    .map_err(report_failure)?;

    print_report(mode, &source, &report);
    Ok(())
}

fn print_report(mode: TransferMode, source: &StorageLocation, report: &TransferReport) {
    let verb = match mode {
        TransferMode::Copy => "Copied",
        TransferMode::Move => "Moved",
    };
    info!(
        source = %source,
        dest = %report.destination,
        requested = report.files_requested,
        completed = report.files_completed,
        success = report.success,
        "Transfer completed"
    );
    if report.success {
        out::print_user(&format!("{verb} '{source}' -> '{}'", report.destination));
    } else {
        out::print_warn(&format!(
            "{verb} {} of {} files into '{}'; some items failed",
            report.files_completed, report.files_requested, report.destination
        ));
    }
}

fn parse_location(storage: &Storage, input: &str) -> Result<StorageLocation> {
    let loc = storage.registry().parse(input);
    if loc.is_resolvable() {
        Ok(loc)
    } else {
        Err(anyhow!(
            "unrecognized path '{input}': use an absolute path under a configured root or the storageId:path form"
        ))
    }
}

fn report_failure(e: TransferError) -> anyhow::Error {
    if let Some(partial) = e.partial {
        error!(
            code = e.code.as_str(),
            completed = partial.files_completed,
            requested = partial.files_requested,
            "Operation failed"
        );
    } else {
        error!(code = e.code.as_str(), "Operation failed");
    }
    out::print_error(&e.to_string());
    anyhow!(e)
}
