// PrivMail Construct Search Query (CSQ): secret-shares a keyword search
// query across N query share files and prints the equivalent plaintext
// IMAPv4 SEARCH string. Mirrors
// `Receiver-Scripts/construct_search_query/construct_search_query.py`.

use anyhow::{bail, Context as _};
use clap::Parser as _;
use std::path::PathBuf;

#[derive(clap::Parser)]
#[command(about = "PrivMail Construct Search Query (CSQ)")]
struct Arguments {
  /// Four comma-separated clause lists: keywords, fields, NOT-modifiers,
  /// AND/OR sequence. Example: --keywords "Alice,Bob," "TO,FROM,ALL" ",NOT," "OR,AND"
  #[arg(long = "keywords", num_args = 4, required = true)]
  keywords: Vec<String>,
  #[arg(long = "share", short = 'n', help = "Number of shares to split the search query into")]
  share: usize,
  #[arg(long = "directory", short = 'd', help = "Directory to write the query share files into", default_value = "query_shares/")]
  directory: PathBuf,
  #[clap(flatten)]
  logging: privmail::LoggingArguments,
}

fn bad_arguments(lists: &[Vec<String>]) -> anyhow::Result<()> {
  if lists[0].len() != lists[1].len() || lists[0].len() != lists[2].len() {
    bail!(
      "different size argument lists ({}, {}, {})",
      lists[0].len(),
      lists[1].len(),
      lists[2].len()
    );
  }
  if lists[0].len() != 1 && lists[0].len() != lists[3].len() + 1 {
    bail!("sequence argument list has wrong size");
  }
  Ok(())
}

fn main() -> anyhow::Result<()> {
  let arguments = Arguments::parse();
  arguments.logging.init("privmail-query-builder")?;

  if arguments.share < 2 {
    bail!("expected --share to be >= 2, got {}", arguments.share);
  }

  let mut lists: Vec<Vec<String>> = arguments
    .keywords
    .iter()
    .map(|clause| clause.split(',').map(str::to_string).collect())
    .collect();
  bad_arguments(&lists)?;
  if lists[0].len() != 1 {
    lists[3].push(String::new());
  } else if lists[3].is_empty() {
    lists[3].push(String::new());
  }

  let keywords: Vec<&str> = lists[0].iter().map(String::as_str).collect();
  let fields: Vec<&str> = lists[1].iter().map(String::as_str).collect();
  let modifiers: Vec<&str> = lists[2].iter().map(String::as_str).collect();
  let sequence: Vec<&str> = lists[3].iter().map(String::as_str).collect();

  let files = privmail::query::build_query(&keywords, &fields, &modifiers, &sequence, arguments.share)
    .context("building secret-shared search query")?;

  for (index, file) in files.iter().enumerate() {
    let directory = arguments.directory.join(format!("secret_shared_query_share_{index}"));
    std::fs::create_dir_all(&directory)?;
    let path = privmail::record::unique_filename(&directory)?;
    let output = std::fs::File::create(&path)?;
    serde_yaml::to_writer(output, file)?;
    log::info!("wrote share {} of {} to {path:?}", index + 1, files.len());
  }

  // Construct the equivalent plaintext IMAPv4 SEARCH query, the same way
  // the operator could hand it directly to an IMAP server for comparison.
  let search_query = privmail::query::build_search_string(&keywords, &fields, &modifiers, &sequence);
  log::info!("parsed search query: {search_query}");

  Ok(())
}
