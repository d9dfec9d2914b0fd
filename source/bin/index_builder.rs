// PrivMail Construct Search Indexing (CSI): reconstructs mails from N
// share directories and writes out N secret-shared search index files.
// Mirrors `Receiver-Scripts/construct_search_index/construct_search_index.py`.

use anyhow::{bail, Context as _};
use clap::Parser as _;
use std::path::PathBuf;

#[derive(clap::Parser)]
#[command(about = "PrivMail Construct Search Indexing (CSI)")]
struct Arguments {
  #[arg(long = "paths", short = 'p', num_args = 1.., required = true, help = "Share directories to reconstruct mails from, one per recipient")]
  paths: Vec<PathBuf>,
  #[arg(long = "output", short = 'o', help = "Directory to write the index share files into", default_value = "index_shares/")]
  output: PathBuf,
  #[clap(flatten)]
  logging: privmail::LoggingArguments,
}

fn main() -> anyhow::Result<()> {
  let arguments = Arguments::parse();
  arguments.logging.init("privmail-index-builder")?;

  if arguments.paths.len() < 2 {
    bail!("expected at least two --paths, got {}", arguments.paths.len());
  }
  let n = arguments.paths.len();

  let mut records = Vec::new();
  for path in &arguments.paths {
    records.extend(privmail::record::load_all(path).with_context(|| format!("loading share records from {path:?}"))?);
  }
  log::info!("loaded {} share record(s) from {} path(s)", records.len(), n);

  let mails = privmail::share::recv::reconstruct_from_records(&records, n).context("reconstructing mails from shares")?;
  log::info!("reconstructed {} mail(s)", mails.len());

  let files = privmail::index::build_index(&mails, n).context("building search index")?;

  for (index, file) in files.iter().enumerate() {
    let directory = arguments.output.join(format!("secret_shared_index_share_{index}"));
    std::fs::create_dir_all(&directory)?;
    let path = privmail::record::unique_filename(&directory)?;
    let output = std::fs::File::create(&path)?;
    serde_yaml::to_writer(output, file)?;
    log::info!("wrote index share {} of {} to {path:?}", index + 1, files.len());
  }

  Ok(())
}
