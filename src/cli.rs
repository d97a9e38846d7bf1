use clap::{Args, Parser, Subcommand};

pub const DEFAULT_LISTINGS_PATH: &str = "job_listings.json";
pub const DEFAULT_RESUME_PATH: &str = "my_cv.txt";
pub const DEFAULT_RECOMMENDATIONS_PATH: &str = "applications.json";

pub const DEFAULT_KEYWORDS: &[&str] = &[
    "Mechatronics Engineer",
    "Automation Engineer",
    "Embedded Software Engineer",
    "Control Systems",
    "Robotics Intern",
    "ADAS Testing",
    "Automotive Software",
    "Industrial Automation",
    "IoT Development",
    "Python Robotics",
    "automotive racing",
    "test engineer",
];

/// Loads `.env` from the working directory or a parent. Only a missing file is ignored.
pub fn load_dotenv() -> anyhow::Result<()> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(anyhow::Error::new(err).context("load .env")),
    }
}

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search job boards in a browser and write the listings file.
    Scrape(ScrapeArgs),
    /// Score listings against a résumé with an LLM and write recommendations.
    Score(ScoreArgs),
}

#[derive(Debug, Args)]
pub struct ScrapeArgs {
    /// Output file for scraped listings (overwritten).
    #[arg(long, default_value = DEFAULT_LISTINGS_PATH)]
    pub out: String,

    /// Search keyword (repeatable). Defaults to the built-in keyword list.
    #[arg(long = "keyword")]
    pub keywords: Vec<String>,

    /// Region passed as the `location` search parameter.
    #[arg(long, default_value = "United States")]
    pub location: String,

    /// Site-specific region identifier passed as `geoId`.
    #[arg(long, default_value = "103323778")]
    pub geo_id: String,

    /// Only show postings newer than this many seconds.
    #[arg(long, default_value_t = 86_400)]
    pub posted_within_secs: u64,

    /// Run Chrome without a window (manual login is impossible then).
    #[arg(long)]
    pub headless: bool,

    /// Directory for diagnostic screenshots.
    #[arg(long, default_value = ".")]
    pub screenshot_dir: String,
}

impl ScrapeArgs {
    pub fn keywords(&self) -> Vec<String> {
        if self.keywords.is_empty() {
            DEFAULT_KEYWORDS.iter().map(|k| (*k).to_owned()).collect()
        } else {
            self.keywords.clone()
        }
    }
}

#[derive(Debug, Args)]
pub struct ScoreArgs {
    /// Input listings file (created by `scrape`).
    #[arg(long, default_value = DEFAULT_LISTINGS_PATH)]
    pub listings: String,

    /// Plain-text résumé.
    #[arg(long, default_value = DEFAULT_RESUME_PATH)]
    pub resume: String,

    /// Output file for recommendations (overwritten).
    #[arg(long, default_value = DEFAULT_RECOMMENDATIONS_PATH)]
    pub out: String,

    /// Base URL of an OpenAI-compatible API.
    #[arg(long, default_value = "https://openrouter.ai/api/v1")]
    pub base_url: String,

    /// Model identifier sent with every request.
    #[arg(long, default_value = "google/gemini-2.0-pro-exp-02-05:free")]
    pub model: String,

    /// Environment variable holding the API key.
    #[arg(long, default_value = "OPENROUTER_API_KEY")]
    pub api_key_env: String,

    /// Jobs per LLM request.
    #[arg(long, default_value_t = 10)]
    pub batch_size: usize,

    /// Leading résumé characters embedded in each prompt.
    #[arg(long, default_value_t = 2000)]
    pub resume_chars: usize,

    /// HTTP timeout for each LLM request.
    #[arg(long, default_value_t = 300)]
    pub timeout_secs: u64,
}
