//! rtlsdrlib-harvester - fetch and place prebuilt librtlsdr binaries.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rtlsdrlib::platform::os_arch_dirname;
use rtlsdrlib_harvester::github::{build_client, fetch_license};
use rtlsdrlib_harvester::package::{check_artifacts, package_project};
use rtlsdrlib_harvester::{
    BUILD_DEFAULT, REPO_NAME, build_from_source, copy_builds_to_project, extract_release,
};
use rtlsdrlib_schema::BuildType;

#[derive(Parser)]
#[command(name = "rtlsdrlib-harvester", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the latest upstream release and extract matching assets into
    /// the build tree.
    Extract {
        /// Upstream repository (owner/repo).
        #[arg(long, default_value = REPO_NAME)]
        repo: String,
        /// Build tree root.
        #[arg(long)]
        build_dir: Option<PathBuf>,
        /// Build type filter, pipe-delimited (e.g. "all_os|w64|static").
        #[arg(long, default_value = BUILD_DEFAULT)]
        types: String,
        /// Also download the upstream license into the build tree.
        #[arg(long)]
        license: bool,
    },
    /// Copy changed libraries from the build tree into the project tree.
    Copy {
        /// Build tree root.
        #[arg(long)]
        build_dir: Option<PathBuf>,
        /// Project library directory.
        #[arg(long)]
        project_dir: Option<PathBuf>,
    },
    /// Extract then copy in one pass, bundling the upstream license into
    /// the project tree.
    Run {
        #[arg(long, default_value = REPO_NAME)]
        repo: String,
        #[arg(long)]
        build_dir: Option<PathBuf>,
        #[arg(long)]
        project_dir: Option<PathBuf>,
        #[arg(long, default_value = BUILD_DEFAULT)]
        types: String,
    },
    /// Build librtlsdr from the latest source release into the custom tree.
    Build {
        #[arg(long, default_value = REPO_NAME)]
        repo: String,
        /// Custom-build tree root.
        #[arg(long)]
        custom_dir: Option<PathBuf>,
    },
    /// Bundle the project tree into a platform-tagged tar.gz.
    Package {
        /// Project library directory.
        #[arg(long)]
        project_dir: Option<PathBuf>,
        /// Where to write the archive.
        #[arg(long, default_value = "dist")]
        output_dir: PathBuf,
        /// Version embedded in the archive name.
        #[arg(long)]
        version: String,
        /// Platform to tag with; defaults to the local probe.
        #[arg(long)]
        platform: Option<String>,
    },
    /// Verify no platform-free artifacts exist in an output directory.
    Check {
        #[arg(long, default_value = "dist")]
        output_dir: PathBuf,
    },
}

fn build_dir_or_default(build_dir: Option<PathBuf>) -> PathBuf {
    build_dir.unwrap_or_else(rtlsdrlib::build_assets_dir)
}

fn project_dir_or_default(project_dir: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = project_dir {
        return Ok(dir);
    }
    let platform = rtlsdrlib::detect_current_platform()?;
    Ok(rtlsdrlib::lib_dir().join(os_arch_dirname(platform)?))
}

async fn extract(repo: &str, build_dir: PathBuf, types: &str, license: bool) -> Result<()> {
    let asset_types = BuildType::from_str(types)
        .with_context(|| format!("invalid build type filter {types:?}"))?;
    let client = build_client()?;
    let results = extract_release(&client, repo, &build_dir, asset_types).await?;
    println!("{} asset(s) tracked under {}", results.len(), build_dir.display());

    if license {
        let path = fetch_license(&client, repo, &build_dir).await?;
        println!("license written to {}", path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Extract {
            repo,
            build_dir,
            types,
            license,
        } => extract(&repo, build_dir_or_default(build_dir), &types, license).await,
        Commands::Copy {
            build_dir,
            project_dir,
        } => {
            let placed = copy_builds_to_project(
                &build_dir_or_default(build_dir),
                &project_dir_or_default(project_dir)?,
            )?;
            println!("{placed} file(s) placed");
            Ok(())
        }
        Commands::Run {
            repo,
            build_dir,
            project_dir,
            types,
        } => {
            let build_dir = build_dir_or_default(build_dir);
            let project_dir = project_dir_or_default(project_dir)?;
            extract(&repo, build_dir.clone(), &types, false).await?;
            let placed = copy_builds_to_project(&build_dir, &project_dir)?;
            let license = fetch_license(&build_client()?, &repo, &project_dir).await?;
            println!("{placed} file(s) placed, license at {}", license.display());
            Ok(())
        }
        Commands::Build { repo, custom_dir } => {
            let custom_dir = custom_dir.unwrap_or_else(rtlsdrlib::custom_build_dir);
            let client = build_client()?;
            let dest = build_from_source(&client, &repo, &custom_dir).await?;
            println!("built into {}", dest.display());
            Ok(())
        }
        Commands::Package {
            project_dir,
            output_dir,
            version,
            platform,
        } => {
            let build_type = match platform {
                Some(spec) => BuildType::from_str(&spec)
                    .with_context(|| format!("invalid platform {spec:?}"))?,
                None => rtlsdrlib::detect_current_platform()?,
            };
            let archive = package_project(
                &project_dir_or_default(project_dir)?,
                &output_dir,
                &version,
                build_type,
            )?;
            println!("wrote {}", archive.display());
            Ok(())
        }
        Commands::Check { output_dir } => {
            check_artifacts(&output_dir)?;
            println!("no platform-free artifacts in {}", output_dir.display());
            Ok(())
        }
    }
}
