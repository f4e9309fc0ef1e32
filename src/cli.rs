use clap::ValueHint;
use std::path::PathBuf;

static LONG_ABT: &str = r#"
verify-links - resolves culture-collection catalogue numbers to verified BRC catalogue links

• Reads a CSV of (task_id, brc_id, ccno, extras, fallback_link) rows, decomposes each catalogue
  number against a BRC catalogue, crawls the candidate catalogue links politely (robots.txt,
  per-host cool-down, a persistent HTTP cache), and writes a verified/failed JSON pair.
• Built on tokio + reqwest, with an optional headless-browser fallback for JS-rendered catalogues.
"#;

#[derive(clap::Parser)]
#[command(
    author,
    version,
    about = "Resolves culture-collection catalogue numbers to verified BRC catalogue links",
    long_about = LONG_ABT
)]
pub struct Args {
    /// Number of concurrent verifier workers.
    #[arg(long, default_value_t = 1)]
    pub worker: usize,

    /// Per-cache-class on-disk size cap, in gigabytes, before eviction kicks in.
    #[arg(long = "db-size", default_value_t = 10)]
    pub db_size: u64,

    /// CSV input: task_id,brc_id,ccno,comma_list_of_extras,fallback_link (no header).
    #[arg(long, value_hint = ValueHint::FilePath, default_value = "./data/test_links.csv")]
    pub input: PathBuf,

    /// Directory to write `<input-stem>.res.json`/`.fail.json` into. Defaults next to the input.
    #[arg(short, long, value_hint = ValueHint::DirPath)]
    pub output: Option<PathBuf>,

    /// Directory the persistent HTTP cache (one SQLite file per cache class) is kept in.
    #[arg(long, value_hint = ValueHint::DirPath, default_value = ".")]
    pub work_dir: PathBuf,

    /// BRC catalogue metadata bundle (acronym list, regex schemas, link templates per BRC).
    #[arg(long, value_hint = ValueHint::FilePath, default_value = "./data/brc_catalogue.json")]
    pub brc_catalogue: PathBuf,

    /// Enable the headless-browser fallback adapter for JS-rendered catalogue pages, in place
    /// of the plain HTTP fetcher, for every catalogue-class request.
    #[arg(long)]
    pub cafi: bool,

    /// Contact string embedded in the `saim-bot` user-agent (e.g. an email or URL).
    #[arg(long, default_value = "")]
    pub contact: String,

    #[arg(short, long, value_hint = ValueHint::FilePath, global = true)]
    pub log_file: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}
