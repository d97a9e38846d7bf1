use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;

use crate::cli::ScrapeArgs;
use crate::formats::JobListing;
use crate::linkedin::{LinkedInBoard, LinkedInOptions};
use crate::store;

pub trait JobBoard {
    fn login(&mut self) -> anyhow::Result<()>;

    fn open_results(&mut self, keyword: &str) -> anyhow::Result<usize>;

    fn extract_card(&mut self, index: usize) -> Result<JobListing, CardError>;

    fn screenshot(&mut self, label: &str) -> Option<PathBuf>;
}

#[derive(Debug, thiserror::Error)]
pub enum CardError {
    #[error("stale element reference: {0:#}")]
    Stale(anyhow::Error),

    #[error("{0:#}")]
    Failed(anyhow::Error),

    #[error("element stayed stale after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

pub const CARD_EXTRACT_ATTEMPTS: u32 = 3;

pub fn retry_on_stale<T>(
    max_attempts: u32,
    delay: Duration,
    mut op: impl FnMut() -> Result<T, CardError>,
) -> Result<T, CardError> {
    let mut attempts = 0;
    while attempts < max_attempts {
        match op() {
            Ok(value) => return Ok(value),
            Err(CardError::Stale(err)) => {
                attempts += 1;
                tracing::debug!(
                    attempt = attempts,
                    max_attempts,
                    error = %format!("{err:#}"),
                    "stale element while extracting job details"
                );
                if attempts < max_attempts && !delay.is_zero() {
                    std::thread::sleep(delay);
                }
            }
            Err(err) => return Err(err),
        }
    }
    Err(CardError::Exhausted { attempts })
}

pub fn run(args: ScrapeArgs) -> anyhow::Result<()> {
    let options = LinkedInOptions {
        headless: args.headless,
        location: args.location.clone(),
        geo_id: args.geo_id.clone(),
        posted_within_secs: args.posted_within_secs,
        screenshot_dir: PathBuf::from(&args.screenshot_dir),
        credentials: crate::linkedin::Credentials::from_env(),
    };
    let board = LinkedInBoard::launch(options).context("launch browser")?;
    run_with(board, &args.keywords(), Path::new(&args.out))
}

pub fn run_with<B: JobBoard>(mut board: B, keywords: &[String], out: &Path) -> anyhow::Result<()> {
    if let Err(err) = board.login() {
        board.screenshot("login_failure");
        tracing::error!(error = %format!("{err:#}"), "login failed");
        return Err(err.context("login"));
    }

    let mut all_jobs = Vec::new();
    for keyword in keywords {
        tracing::info!(keyword = %keyword, "searching");
        match search(&mut board, keyword) {
            Ok(jobs) => {
                tracing::info!(keyword = %keyword, count = jobs.len(), "extracted job listings");
                all_jobs.extend(jobs);
            }
            Err(err) => {
                board.screenshot("application_failure");
                tracing::error!(keyword = %keyword, error = %format!("{err:#}"), "search failed");
                return Err(err.context(format!("search {keyword:?}")));
            }
        }
    }

    store::write_json_pretty(out, &all_jobs).context("write listings")?;
    tracing::info!(count = all_jobs.len(), path = %out.display(), "saved listings");

    tracing::debug!("closing browser");
    drop(board);
    Ok(())
}

// Card failures are logged and skipped; only a results-page failure is returned.
pub fn search<B: JobBoard>(board: &mut B, keyword: &str) -> anyhow::Result<Vec<JobListing>> {
    let total = board.open_results(keyword)?;
    tracing::debug!(keyword = %keyword, total, "found job cards");

    let mut jobs = Vec::with_capacity(total);
    for index in 0..total {
        match board.extract_card(index) {
            Ok(job) => {
                tracing::info!(
                    card = index + 1,
                    job_id = %job.job_id,
                    title = %job.title,
                    company = %job.company,
                    "extracted job details"
                );
                jobs.push(job);
            }
            Err(err) => {
                tracing::warn!(card = index + 1, error = %err, "failed to extract job details");
            }
        }
    }
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[derive(Default)]
    struct FakeBoard {
        fail_login: bool,
        results: HashMap<String, Vec<JobListing>>,
        fail_keyword: Option<String>,
        failing_cards: HashMap<usize, fn() -> CardError>,
        current: Vec<JobListing>,
        searched: Vec<String>,
        extracted: Vec<usize>,
        screenshots: Vec<String>,
    }

    impl JobBoard for &mut FakeBoard {
        fn login(&mut self) -> anyhow::Result<()> {
            if self.fail_login {
                anyhow::bail!("login timed out");
            }
            Ok(())
        }

        fn open_results(&mut self, keyword: &str) -> anyhow::Result<usize> {
            self.searched.push(keyword.to_owned());
            if self.fail_keyword.as_deref() == Some(keyword) {
                anyhow::bail!("no job cards rendered");
            }
            self.current = self.results.get(keyword).cloned().unwrap_or_default();
            Ok(self.current.len())
        }

        fn extract_card(&mut self, index: usize) -> Result<JobListing, CardError> {
            self.extracted.push(index);
            if let Some(make_err) = self.failing_cards.get(&index) {
                return Err(make_err());
            }
            self.current
                .get(index)
                .cloned()
                .ok_or_else(|| CardError::Failed(anyhow::anyhow!("card {index} disappeared")))
        }

        fn screenshot(&mut self, label: &str) -> Option<PathBuf> {
            self.screenshots.push(label.to_owned());
            None
        }
    }

    fn job(id: &str) -> JobListing {
        JobListing {
            job_id: id.to_owned(),
            title: format!("Job {id}"),
            ..JobListing::default()
        }
    }

    fn keywords(items: &[&str]) -> Vec<String> {
        items.iter().map(|k| (*k).to_owned()).collect()
    }

    #[test]
    fn writes_all_keywords_without_deduplicating() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let out = temp.path().join("job_listings.json");

        let mut board = FakeBoard::default();
        board
            .results
            .insert("rust".to_owned(), vec![job("1"), job("2")]);
        board.results.insert("go".to_owned(), vec![job("2"), job("3")]);

        run_with(&mut board, &keywords(&["rust", "go"]), &out)?;

        let written: Vec<JobListing> = store::read_json_array(&out)?;
        let ids = written.iter().map(|j| j.job_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["1", "2", "2", "3"]);
        assert!(board.screenshots.is_empty());
        Ok(())
    }

    #[test]
    fn keyword_failure_aborts_without_writing() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let out = temp.path().join("job_listings.json");

        let mut board = FakeBoard {
            fail_keyword: Some("go".to_owned()),
            ..FakeBoard::default()
        };
        board.results.insert("rust".to_owned(), vec![job("1")]);

        let err = run_with(&mut board, &keywords(&["rust", "go", "zig"]), &out).unwrap_err();
        assert!(format!("{err:#}").contains("no job cards rendered"));
        assert!(!out.exists());
        assert_eq!(board.screenshots, vec!["application_failure".to_owned()]);
        assert_eq!(board.searched, keywords(&["rust", "go"]));
        Ok(())
    }

    #[test]
    fn login_failure_captures_screenshot_and_skips_search() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let out = temp.path().join("job_listings.json");

        let mut board = FakeBoard {
            fail_login: true,
            ..FakeBoard::default()
        };
        assert!(run_with(&mut board, &keywords(&["rust"]), &out).is_err());
        assert!(board.searched.is_empty());
        assert_eq!(board.screenshots, vec!["login_failure".to_owned()]);
        assert!(!out.exists());
        Ok(())
    }

    #[test]
    fn failed_card_is_skipped_and_later_cards_still_extracted() -> anyhow::Result<()> {
        let mut board = FakeBoard::default();
        board
            .results
            .insert("rust".to_owned(), vec![job("1"), job("2"), job("3"), job("4")]);
        board
            .failing_cards
            .insert(1, || CardError::Failed(anyhow::anyhow!("title link missing")));
        board
            .failing_cards
            .insert(2, || CardError::Exhausted { attempts: CARD_EXTRACT_ATTEMPTS });

        let mut handle = &mut board;
        let jobs = search(&mut handle, "rust")?;

        let ids = jobs.iter().map(|j| j.job_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["1", "4"]);
        assert_eq!(board.extracted, vec![0, 1, 2, 3]);
        Ok(())
    }

    #[test]
    fn card_failures_do_not_abort_the_run() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let out = temp.path().join("job_listings.json");

        let mut board = FakeBoard::default();
        board
            .results
            .insert("rust".to_owned(), vec![job("1"), job("2"), job("3")]);
        board
            .failing_cards
            .insert(1, || CardError::Failed(anyhow::anyhow!("company missing")));

        run_with(&mut board, &keywords(&["rust"]), &out)?;

        let written: Vec<JobListing> = store::read_json_array(&out)?;
        let ids = written.iter().map(|j| j.job_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["1", "3"]);
        assert!(board.screenshots.is_empty());
        Ok(())
    }

    #[test]
    fn retry_recovers_from_stale_elements() {
        let mut calls = 0;
        let result = retry_on_stale(CARD_EXTRACT_ATTEMPTS, Duration::ZERO, || {
            calls += 1;
            if calls < 3 {
                Err(CardError::Stale(anyhow::anyhow!("node detached")))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn retry_gives_up_after_max_attempts() {
        let mut calls = 0;
        let result: Result<(), _> = retry_on_stale(CARD_EXTRACT_ATTEMPTS, Duration::ZERO, || {
            calls += 1;
            Err(CardError::Stale(anyhow::anyhow!("node detached")))
        });
        assert!(matches!(result, Err(CardError::Exhausted { attempts: 3 })));
        assert_eq!(calls, 3);
    }

    #[test]
    fn retry_does_not_repeat_other_failures() {
        let mut calls = 0;
        let result: Result<(), _> = retry_on_stale(CARD_EXTRACT_ATTEMPTS, Duration::ZERO, || {
            calls += 1;
            Err(CardError::Failed(anyhow::anyhow!("selector not found")))
        });
        assert!(matches!(result, Err(CardError::Failed(_))));
        assert_eq!(calls, 1);
    }
}
