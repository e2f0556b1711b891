//! `assetpack` command-line tool.
//!
//! # Usage
//!
//! ```bash
//! assetpack pack ./build --asset-space H000001
//! assetpack merge 1718000000-abc --file-name game.zip --total-chunks 12 --uploads-dir ./uploads
//! assetpack ingest ./uploads/1718000000-abc-game.zip --asset-space H000001 --root ./Games --images-dir ./images
//! assetpack read ./Games/H000001 index.html --asset-space H000001 > index.html
//! assetpack reap --uploads-dir ./uploads
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use assetpack_common::{progress_fn, CancelToken, FnProgress};
use assetpack_packager::{AssetSpaceStore, PackOptions, PackOutput, PackProgress, Packager};
use assetpack_storage::{
    BlobSource, CacheOptions, FsBlobSource, MemoryRecordStore, RangeCache, RecordStore,
    ServedAsset, SqliteRecordStore,
};
use assetpack_storage_http::{HttpBlobSource, HttpSourceOptions};
use assetpack_upload::{
    ChunkReassembler, IngestPipeline, IngestReport, MergedUpload, ReapReport, ReassemblerOptions,
};

#[derive(Parser)]
#[command(name = "assetpack")]
#[command(version, about = "Pack, ingest and serve versioned asset spaces", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a directory into a manifest and blob written next to its files
    Pack {
        /// Directory to pack
        source: PathBuf,

        /// Asset space id recorded in the manifest [default: directory name]
        #[arg(long, env = "ASSETPACK_ASSET_SPACE")]
        asset_space: Option<String>,

        /// Additional file names to leave out
        #[arg(long = "exclude")]
        excludes: Vec<String>,
    },

    /// Unpack a merged archive, pack it and publish it under the root
    Ingest {
        /// Merged archive to ingest
        archive: PathBuf,

        /// Asset space id to publish as
        #[arg(long, env = "ASSETPACK_ASSET_SPACE")]
        asset_space: String,

        /// Directory holding published asset spaces
        #[arg(long, env = "ASSETPACK_ROOT")]
        root: PathBuf,

        /// Directory receiving cover images as `<asset-space>.<ext>`
        #[arg(long, env = "ASSETPACK_IMAGES_DIR")]
        images_dir: Option<PathBuf>,
    },

    /// Merge chunks of an upload already staged on disk
    Merge {
        /// Upload id
        upload_id: String,

        /// Original file name of the upload
        #[arg(long)]
        file_name: String,

        /// Number of chunks the client sent
        #[arg(long)]
        total_chunks: u32,

        /// Upload directory (chunks are staged under `<dir>/temp`)
        #[arg(long, env = "ASSETPACK_UPLOADS_DIR", default_value = "uploads")]
        uploads_dir: PathBuf,
    },

    /// Serve one file of an asset space through the range cache to stdout
    Read {
        /// Base location: a directory or an http(s) URL prefix
        base: String,

        /// Logical path inside the asset space
        path: String,

        /// Asset space id the manifest must declare
        #[arg(long, env = "ASSETPACK_ASSET_SPACE")]
        asset_space: String,

        /// Persistent record store [default: in memory]
        #[arg(long, env = "ASSETPACK_CACHE_DB")]
        cache_db: Option<PathBuf>,

        /// Range read timeout in seconds
        #[arg(long, default_value = "30")]
        timeout_secs: u64,
    },

    /// Remove staging directories of abandoned uploads
    Reap {
        /// Upload directory
        #[arg(long, env = "ASSETPACK_UPLOADS_DIR", default_value = "uploads")]
        uploads_dir: PathBuf,

        /// Age after which an untouched upload is abandoned, in seconds
        #[arg(long, env = "ASSETPACK_SESSION_TTL", default_value_t = assetpack_common::DEFAULT_SESSION_TTL_SECS)]
        ttl_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli: Cli = Cli::parse();
    match cli.command {
        Commands::Pack {
            source,
            asset_space,
            excludes,
        } => pack(source, asset_space, excludes).await,
        Commands::Ingest {
            archive,
            asset_space,
            root,
            images_dir,
        } => ingest(&archive, &asset_space, root, images_dir).await,
        Commands::Merge {
            upload_id,
            file_name,
            total_chunks,
            uploads_dir,
        } => merge(&upload_id, &file_name, total_chunks, uploads_dir).await,
        Commands::Read {
            base,
            path,
            asset_space,
            cache_db,
            timeout_secs,
        } => {
            let store: Arc<dyn RecordStore> = match cache_db {
                Some(db) => Arc::new(
                    SqliteRecordStore::open(&db)
                        .with_context(|| format!("opening cache db {}", db.display()))?,
                ),
                None => Arc::new(MemoryRecordStore::new()),
            };
            let options: CacheOptions =
                CacheOptions::new().with_range_timeout(Duration::from_secs(timeout_secs));

            if base.starts_with("http://") || base.starts_with("https://") {
                let source: HttpBlobSource = HttpBlobSource::new(HttpSourceOptions::default())?;
                read(RangeCache::new(source, store, options), &asset_space, &base, &path).await
            } else {
                let cache: RangeCache<FsBlobSource> =
                    RangeCache::new(FsBlobSource::new(), store, options);
                read(cache, &asset_space, &base, &path).await
            }
        }
        Commands::Reap {
            uploads_dir,
            ttl_secs,
        } => reap(uploads_dir, ttl_secs).await,
    }
}

async fn pack(source: PathBuf, asset_space: Option<String>, excludes: Vec<String>) -> Result<()> {
    let asset_space: String = match asset_space {
        Some(id) => id,
        None => match source.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => bail!("cannot derive an asset space id from {}", source.display()),
        },
    };

    let options: PackOptions = excludes
        .into_iter()
        .fold(PackOptions::new(&asset_space), |o, name| o.with_exclude(name));

    // Ctrl-C stops the pack at the next file; the staged temp files are dropped.
    let token: CancelToken = CancelToken::new();
    let interrupt: CancelToken = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling pack");
            interrupt.cancel();
        }
    });

    let output: PackOutput = tokio::task::spawn_blocking(move || {
        let progress: FnProgress<_, PackProgress> = progress_fn(move |p: &PackProgress| {
            if let Some(path) = &p.current_path {
                log::debug!("[{}/{}] {}", p.files_packed + 1, p.total_files, path);
            }
            !token.is_cancelled()
        });
        Packager::new(options).pack(&source, Some(&progress))
    })
    .await??;

    println!("{}", output.manifest_path.display());
    println!("{}", output.blob_path.display());
    Ok(())
}

async fn ingest(
    archive: &Path,
    asset_space: &str,
    root: PathBuf,
    images_dir: Option<PathBuf>,
) -> Result<()> {
    let mut pipeline: IngestPipeline = IngestPipeline::new(AssetSpaceStore::new(root));
    if let Some(dir) = images_dir {
        pipeline = pipeline.with_images_dir(dir);
    }
    let report: IngestReport = pipeline
        .ingest(archive, asset_space)
        .await
        .with_context(|| format!("ingesting {}", archive.display()))?;

    println!("{}", report.base_path);
    println!("{}", report.manifest.version);
    if let Some(title) = &report.title {
        log::info!("Title: {}", title);
    }
    if let Some(image) = &report.image {
        log::info!("Cover image: {}", image);
    }
    Ok(())
}

async fn merge(
    upload_id: &str,
    file_name: &str,
    total_chunks: u32,
    uploads_dir: PathBuf,
) -> Result<()> {
    let reassembler: ChunkReassembler = ChunkReassembler::new(ReassemblerOptions::new(uploads_dir));
    let merged: MergedUpload = reassembler.merge(upload_id, file_name, total_chunks).await?;

    log::info!("Merged {} ({} bytes)", merged.upload_id, merged.size);
    println!("{}", merged.path.display());
    Ok(())
}

async fn read<S: BlobSource + 'static>(
    cache: RangeCache<S>,
    asset_space: &str,
    base: &str,
    path: &str,
) -> Result<()> {
    cache
        .init(asset_space, base)
        .await
        .with_context(|| format!("initializing {} from {}", asset_space, base))?;

    let served: ServedAsset = cache.fetch(asset_space, path).await?;
    log::info!(
        "{} ({}, {} bytes, from {})",
        path,
        served.content_type,
        served.bytes.len(),
        served.source
    );

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&served.bytes)?;
    stdout.flush()?;
    Ok(())
}

async fn reap(uploads_dir: PathBuf, ttl_secs: u64) -> Result<()> {
    let options: ReassemblerOptions =
        ReassemblerOptions::new(uploads_dir).with_session_ttl(Duration::from_secs(ttl_secs));
    let report: ReapReport = ChunkReassembler::new(options).reap_abandoned().await?;

    println!(
        "reaped {} sessions, removed {} staging directories",
        report.sessions_reaped, report.orphan_dirs_removed
    );
    Ok(())
}
