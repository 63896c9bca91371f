//! The command-line front end, enabled by the `cli` feature.
//!
//! ```text
//! magick-cache create <repo-path>
//! magick-cache [--passkey <file>] [delete | expire | list] <repo-path> <iri>
//! magick-cache [--passkey <file>] [--extract <geometry>] get <repo-path> <iri> <file>
//! magick-cache [--passkey <file>] [--ttl <duration>] put <repo-path> <iri> <file>
//! ```
//!
//! The passkey and passphrase are read raw from files so they never appear
//! in the process arguments. Durations accept a decimal followed by an
//! optional unit word (`seconds`, `minutes`, `hours`, `days`, `weeks`,
//! `months`, `years`).

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use clap::{Parser, Subcommand};

use crate::{
    codec::{ImageCodec, MpcCodec},
    error::{CacheResult, FilesystemErrorKind, ResourceErrorKind},
    iri::ResourceKind,
    repository::Repository,
    resource::Resource,
};

/// The cache repository command line.
#[derive(Parser, Debug)]
#[command(name = "magick-cache", version, about)]
pub struct Cli {
    /// Read the repository passkey from this file
    #[arg(long, global = true, value_name = "FILE")]
    passkey: Option<PathBuf>,

    /// Read the per-image passphrase from this file; forwarded opaquely to
    /// the image codec
    #[arg(long, global = true, value_name = "FILE")]
    passphrase: Option<PathBuf>,

    /// Time to live, a decimal with an optional unit (e.g. `75`, `2 days`)
    #[arg(long, global = true, value_name = "DURATION", value_parser = parse_ttl)]
    ttl: Option<u64>,

    /// Extract geometry forwarded to the image codec on get
    #[arg(long, global = true, value_name = "GEOMETRY")]
    extract: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a cache repository
    Create {
        /// The repository path
        path: PathBuf,
    },
    /// Delete the resources under an IRI prefix
    Delete {
        /// The repository path
        path: PathBuf,
        /// The IRI prefix
        iri: String,
    },
    /// Delete the expired resources under an IRI prefix
    Expire {
        /// The repository path
        path: PathBuf,
        /// The IRI prefix
        iri: String,
    },
    /// Describe the resources under an IRI prefix, one line each
    #[command(alias = "identify")]
    List {
        /// The repository path
        path: PathBuf,
        /// The IRI prefix
        iri: String,
    },
    /// Get a resource and write its content to a local file
    Get {
        /// The repository path
        path: PathBuf,
        /// The resource IRI
        iri: String,
        /// The local file to write
        filename: PathBuf,
    },
    /// Put the content of a local file as a resource
    Put {
        /// The repository path
        path: PathBuf,
        /// The resource IRI
        iri: String,
        /// The local file to read
        filename: PathBuf,
    },
}

/// Parses a duration: a decimal followed by an optional unit word.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_ttl(duration: &str) -> Result<u64, String> {
    let duration = duration.trim();
    let split = duration
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(duration.len());
    let (value, unit) = duration.split_at(split);
    let value: f64 = value
        .parse()
        .map_err(|_| format!("invalid duration: `{duration}`"))?;
    let multiplier = match unit.trim() {
        "" => 1,
        unit if unit.starts_with("second") => 1,
        unit if unit.starts_with("minute") => 60,
        unit if unit.starts_with("hour") => 3_600,
        unit if unit.starts_with("day") => 86_400,
        unit if unit.starts_with("week") => 604_800,
        unit if unit.starts_with("month") => 2_628_000,
        unit if unit.starts_with("year") => 31_536_000,
        unit => return Err(format!("unrecognized duration unit: `{unit}`")),
    };
    Ok((value * f64::from(multiplier)) as u64)
}

fn read_secret(path: Option<&Path>) -> CacheResult<Vec<u8>> {
    match path {
        None => Ok(Vec::new()),
        Some(path) => fs::read(path)
            .map_err(|err| FilesystemErrorKind::ReadingContentsOfFileFailed(err).into()),
    }
}

fn open_repository(cli: &Cli, path: &Path) -> CacheResult<Repository> {
    let passkey = read_secret(cli.passkey.as_deref())?;
    let mut repository = Repository::open(path, passkey)?;
    if let Some(passphrase) = cli.passphrase.as_deref() {
        repository.set_passphrase(read_secret(Some(passphrase))?);
    }
    Ok(repository)
}

fn get_resource(
    cli: &Cli,
    repository: &Repository,
    resource: &mut Resource,
    filename: &Path,
) -> CacheResult<()> {
    match resource.kind() {
        ResourceKind::Blob => {
            let blob = repository.get_blob(resource)?;
            fs::write(filename, blob).map_err(FilesystemErrorKind::WritingBlobFailed)?;
        }
        ResourceKind::Meta => {
            let meta = repository.get_meta(resource)?;
            fs::write(filename, meta).map_err(FilesystemErrorKind::WritingBlobFailed)?;
        }
        ResourceKind::Image => {
            let image = repository.get_image(resource, cli.extract.as_deref())?;
            // local output is overwritten, matching blob and meta gets
            _ = fs::remove_file(filename);
            let mut sibling = filename.as_os_str().to_os_string();
            sibling.push(".cache");
            _ = fs::remove_file(Path::new(&sibling));
            let passphrase = read_secret(cli.passphrase.as_deref())?;
            MpcCodec.write_image(image, filename, Some(&passphrase))?;
        }
        ResourceKind::Wild => {
            return Err(ResourceErrorKind::WrongResourceKind {
                iri: resource.iri().to_string(),
            }
            .into())
        }
    }
    Ok(())
}

fn put_resource(
    cli: &Cli,
    repository: &Repository,
    resource: &mut Resource,
    filename: &Path,
) -> CacheResult<()> {
    match resource.kind() {
        ResourceKind::Blob => {
            let blob =
                fs::read(filename).map_err(FilesystemErrorKind::ReadingContentsOfFileFailed)?;
            repository.put_blob(resource, blob)?;
        }
        ResourceKind::Meta => {
            let meta = fs::read_to_string(filename)
                .map_err(FilesystemErrorKind::ReadingContentsOfFileFailed)?;
            repository.put_meta(resource, &meta)?;
        }
        ResourceKind::Image => {
            let passphrase = read_secret(cli.passphrase.as_deref())?;
            let image = MpcCodec.read_image(filename, None, Some(&passphrase))?;
            repository.put_image(resource, &image)?;
        }
        ResourceKind::Wild => {
            return Err(ResourceErrorKind::WrongResourceKind {
                iri: resource.iri().to_string(),
            }
            .into())
        }
    }
    Ok(())
}

/// Runs a parsed command line.
///
/// # Errors
///
/// Forwards every engine error; the binary prints them to stderr and exits
/// non-zero.
pub fn run(cli: &Cli) -> CacheResult<()> {
    match &cli.command {
        Command::Create { path } => {
            let passkey = read_secret(cli.passkey.as_deref())?;
            Repository::create(path, passkey)
        }
        Command::Delete { path, iri } => {
            let repository = open_repository(cli, path)?;
            let mut count = 0usize;
            repository.iterate_resources(iri, |repository, resource| {
                repository.delete_resource(resource)?;
                count += 1;
                Ok(true)
            })?;
            eprintln!("deleted {count} resources");
            Ok(())
        }
        Command::Expire { path, iri } => {
            let repository = open_repository(cli, path)?;
            let mut count = 0usize;
            repository.iterate_resources(iri, |repository, resource| {
                if repository.expire_resource(resource)? {
                    count += 1;
                }
                Ok(true)
            })?;
            eprintln!("expired {count} resources");
            Ok(())
        }
        Command::List { path, iri } => {
            let repository = open_repository(cli, path)?;
            let mut count = 0usize;
            let mut stdout = std::io::stdout().lock();
            repository.iterate_resources(iri, |repository, resource| {
                repository.identify_resource(resource, &mut stdout)?;
                count += 1;
                Ok(true)
            })?;
            stdout
                .flush()
                .map_err(FilesystemErrorKind::WritingSinkFailed)?;
            eprintln!("listed {count} resources");
            Ok(())
        }
        Command::Get {
            path,
            iri,
            filename,
        } => {
            let repository = open_repository(cli, path)?;
            let mut resource = repository.resource(iri)?;
            get_resource(cli, &repository, &mut resource, filename)
        }
        Command::Put {
            path,
            iri,
            filename,
        } => {
            let repository = open_repository(cli, path)?;
            let mut resource = repository.resource(iri)?;
            resource.set_ttl(cli.ttl.unwrap_or(0));
            put_resource(cli, &repository, &mut resource, filename)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("75", 75)]
    #[case("75 seconds", 75)]
    #[case("2 minutes", 120)]
    #[case("2minutes", 120)]
    #[case("1.5 hours", 5_400)]
    #[case("2 days", 172_800)]
    #[case("1 week", 604_800)]
    #[case("1 months", 2_628_000)]
    #[case("1 year", 31_536_000)]
    fn test_parse_ttl_passes(#[case] duration: &str, #[case] seconds: u64) {
        assert_eq!(parse_ttl(duration).unwrap(), seconds);
    }

    #[rstest]
    #[case("")]
    #[case("soon")]
    #[case("5 fortnights")]
    fn test_parse_ttl_fails(#[case] duration: &str) {
        assert!(parse_ttl(duration).is_err(), "{duration:?} parsed");
    }

    #[test]
    fn test_cli_parses_flags_before_command() {
        let cli = Cli::try_parse_from([
            "magick-cache",
            "--ttl",
            "2 days",
            "put",
            "./repo",
            "tests/blob/rose",
            "rose.bin",
        ])
        .unwrap();

        assert_eq!(cli.ttl, Some(172_800));
    }
}
