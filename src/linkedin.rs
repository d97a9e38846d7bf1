use std::ffi::OsStr;
use std::io::BufRead as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, Element, LaunchOptionsBuilder, Tab};
use url::Url;

use crate::formats::JobListing;
use crate::scrape::{CARD_EXTRACT_ATTEMPTS, CardError, JobBoard, retry_on_stale};

const LOGIN_URL: &str = "https://www.linkedin.com/login";
const SEARCH_URL: &str = "https://www.linkedin.com/jobs/search/";
const FEED_URL_MARKER: &str = "linkedin.com/feed";

const USERNAME_INPUT: &str = "#username";
const PASSWORD_INPUT: &str = "#password";
const SUBMIT_BUTTON: &str = "button[type='submit']";
const GOOGLE_SIGN_IN_BUTTON: &str =
    "button[data-tracking-control-name='public_jobs_google-sign-in']";
const JOB_CARD: &str = "li[data-occludable-job-id]";
const JOB_ID_ATTR: &str = "data-occludable-job-id";
const TITLE_LINK: &str = "a.job-card-container__link";
const COMPANY: &str = ".artdeco-entity-lockup__subtitle";
const LOCATION: &str = "ul.job-card-container__metadata-wrapper li";
const DESCRIPTION: &str = "#job-details";

const LOGIN_FORM_TIMEOUT: Duration = Duration::from_secs(15);
const POPUP_TIMEOUT: Duration = Duration::from_secs(10);
const LOGIN_CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);
const RESULTS_TIMEOUT: Duration = Duration::from_secs(20);
const DESCRIPTION_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(250);

const SCROLL_SETTLE: Duration = Duration::from_millis(500);
const DETAILS_SETTLE: Duration = Duration::from_secs(1);
const STALE_RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn from_env() -> Option<Self> {
        let email = std::env::var("LINKEDIN_EMAIL").ok()?;
        let password = std::env::var("LINKEDIN_PASSWORD").ok()?;
        if email.trim().is_empty() || password.is_empty() {
            return None;
        }
        Some(Self { email, password })
    }
}

#[derive(Debug, Clone)]
pub struct LinkedInOptions {
    pub headless: bool,
    pub location: String,
    pub geo_id: String,
    pub posted_within_secs: u64,
    pub screenshot_dir: PathBuf,
    pub credentials: Option<Credentials>,
}

pub struct LinkedInBoard {
    // Dropping the browser closes Chrome.
    browser: Browser,
    tab: Arc<Tab>,
    options: LinkedInOptions,
}

impl LinkedInBoard {
    pub fn launch(options: LinkedInOptions) -> anyhow::Result<Self> {
        let launch_options = LaunchOptionsBuilder::default()
            .headless(options.headless)
            .sandbox(false)
            .window_size(Some((1400, 1000)))
            // Manual login can take a while; the default idle timeout would
            // kill the browser mid-login.
            .idle_browser_timeout(Duration::from_secs(600))
            .args(vec![
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-dev-shm-usage"),
            ])
            .build()
            .map_err(|err| anyhow::anyhow!("build chrome launch options: {err}"))?;

        tracing::info!(headless = options.headless, "launching chrome");
        let browser = Browser::new(launch_options).context("start chrome")?;
        let tab = browser.new_tab().context("open tab")?;

        Ok(Self {
            browser,
            tab,
            options,
        })
    }

    fn sign_in_with_credentials(&self, credentials: &Credentials) -> anyhow::Result<()> {
        tracing::info!("submitting stored credentials");
        self.tab
            .find_element(USERNAME_INPUT)
            .context("find username input")?
            .click()?
            .type_into(&credentials.email)
            .context("type username")?;
        self.tab
            .find_element(PASSWORD_INPUT)
            .context("find password input")?
            .click()?
            .type_into(&credentials.password)
            .context("type password")?;
        self.tab
            .find_element(SUBMIT_BUTTON)
            .context("find submit button")?
            .click()
            .context("submit login form")?;
        Ok(())
    }

    fn sign_in_with_google(&self) -> anyhow::Result<()> {
        tracing::info!("attempting Google login");
        let before = open_tab_count(&self.browser);

        self.tab
            .find_element(GOOGLE_SIGN_IN_BUTTON)
            .context("find Google sign-in button")?
            .click()
            .context("click Google sign-in button")?;

        poll_until(POPUP_TIMEOUT, || open_tab_count(&self.browser) > before)
            .context("wait for Google sign-in window")?;

        let popup = self
            .browser
            .get_tabs()
            .lock()
            .map_err(|_| anyhow::anyhow!("browser tab list is poisoned"))?
            .iter()
            .rev()
            .find(|tab| tab.get_target_id() != self.tab.get_target_id())
            .cloned();
        if let Some(popup) = popup {
            popup.activate().context("focus Google sign-in window")?;
        }

        tracing::info!("complete Google login in the popup window");
        wait_for_enter("Press Enter when Google login is complete...")?;

        self.tab.activate().context("focus original window")?;
        Ok(())
    }

    fn search_url(&self, keyword: &str) -> anyhow::Result<Url> {
        search_url(
            keyword,
            &self.options.location,
            &self.options.geo_id,
            self.options.posted_within_secs,
        )
    }

    fn card_at(&self, index: usize) -> Result<Element<'_>, CardError> {
        let mut cards = self
            .tab
            .find_elements(JOB_CARD)
            .map_err(CardError::from_driver)?;
        if index >= cards.len() {
            return Err(CardError::Failed(anyhow::anyhow!(
                "job card #{} disappeared ({} cards left)",
                index + 1,
                cards.len()
            )));
        }
        Ok(cards.swap_remove(index))
    }

    fn process_card(&self, index: usize) -> Result<JobListing, CardError> {
        let card = self.card_at(index)?;
        card.scroll_into_view().map_err(CardError::from_driver)?;
        std::thread::sleep(SCROLL_SETTLE);
        card.click().map_err(CardError::from_driver)?;
        tracing::debug!(card = index + 1, "clicked job card");
        std::thread::sleep(DETAILS_SETTLE);

        retry_on_stale(CARD_EXTRACT_ATTEMPTS, STALE_RETRY_DELAY, || {
            let card = self.card_at(index)?;
            self.extract_details(&card)
        })
    }

    fn extract_details(&self, card: &Element<'_>) -> Result<JobListing, CardError> {
        let job_id = card
            .get_attribute_value(JOB_ID_ATTR)
            .map_err(CardError::from_driver)?
            .unwrap_or_default();

        let title_link = card.find_element(TITLE_LINK).map_err(CardError::from_driver)?;
        let title = inner_text(&title_link)?;
        let job_url = title_link
            .get_attribute_value("href")
            .map_err(CardError::from_driver)?
            .unwrap_or_default();

        let company = inner_text(&card.find_element(COMPANY).map_err(CardError::from_driver)?)?;
        let location = inner_text(&card.find_element(LOCATION).map_err(CardError::from_driver)?)?;

        let description = match self
            .tab
            .wait_for_element_with_custom_timeout(DESCRIPTION, DESCRIPTION_TIMEOUT)
            .and_then(|element| element.get_inner_text())
        {
            Ok(text) => text.trim().to_owned(),
            Err(err) => {
                tracing::warn!(job_id = %job_id, error = %err, "job description not found");
                String::new()
            }
        };

        Ok(JobListing {
            job_id,
            title,
            company,
            location,
            job_url,
            description,
        })
    }
}

impl JobBoard for LinkedInBoard {
    fn login(&mut self) -> anyhow::Result<()> {
        self.tab
            .navigate_to(LOGIN_URL)
            .and_then(|tab| tab.wait_until_navigated())
            .context("open login page")?;

        poll_until(LOGIN_FORM_TIMEOUT, || {
            self.tab.find_element(USERNAME_INPUT).is_ok()
                || self.tab.find_element(GOOGLE_SIGN_IN_BUTTON).is_ok()
        })
        .context("wait for login form")?;

        if let Some(credentials) = self.options.credentials.clone() {
            self.sign_in_with_credentials(&credentials)?;
        } else if self.tab.find_element(GOOGLE_SIGN_IN_BUTTON).is_ok() {
            self.sign_in_with_google()?;
        } else {
            tracing::info!("please complete the LinkedIn login in the browser window");
            wait_for_enter("Press Enter when logged in...")?;
        }

        poll_until(LOGIN_CONFIRM_TIMEOUT, || {
            self.tab.get_url().contains(FEED_URL_MARKER)
        })
        .context("login process timed out")?;
        tracing::info!("login successful");
        Ok(())
    }

    fn open_results(&mut self, keyword: &str) -> anyhow::Result<usize> {
        let url = self.search_url(keyword)?;
        tracing::debug!(url = %url, "navigating to job search");
        self.tab
            .navigate_to(url.as_str())
            .with_context(|| format!("navigate to {url}"))?;
        self.tab
            .wait_for_element_with_custom_timeout(JOB_CARD, RESULTS_TIMEOUT)
            .context("wait for job cards")?;

        Ok(self.tab.find_elements(JOB_CARD).context("list job cards")?.len())
    }

    fn extract_card(&mut self, index: usize) -> Result<JobListing, CardError> {
        let result = self.process_card(index);
        std::thread::sleep(DETAILS_SETTLE);
        result
    }

    fn screenshot(&mut self, label: &str) -> Option<PathBuf> {
        let path = self
            .options
            .screenshot_dir
            .join(format!("{label}_{}.png", chrono::Utc::now().timestamp()));
        let result = self
            .tab
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
            .and_then(|png| {
                std::fs::write(&path, png)
                    .with_context(|| format!("write screenshot: {}", path.display()))
            });
        match result {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "screenshot saved");
                Some(path)
            }
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "failed to capture screenshot");
                None
            }
        }
    }
}

impl CardError {
    pub fn from_driver(err: anyhow::Error) -> Self {
        if is_stale_error(&err) {
            CardError::Stale(err)
        } else {
            CardError::Failed(err)
        }
    }
}

// DevTools messages for a node that left the DOM.
pub fn is_stale_error(err: &anyhow::Error) -> bool {
    let message = format!("{err:#}").to_ascii_lowercase();
    [
        "no node with given id",
        "could not find node with given id",
        "node with given id does not belong to the document",
        "node is detached from document",
        "cannot find context with specified id",
    ]
    .iter()
    .any(|needle| message.contains(needle))
}

pub fn search_url(
    keyword: &str,
    location: &str,
    geo_id: &str,
    posted_within_secs: u64,
) -> anyhow::Result<Url> {
    let recency = format!("r{posted_within_secs}");
    Url::parse_with_params(
        SEARCH_URL,
        &[
            ("keywords", keyword),
            ("location", location),
            ("geoId", geo_id),
            ("f_TPR", recency.as_str()),
        ],
    )
    .context("build search url")
}

fn open_tab_count(browser: &Browser) -> usize {
    browser.get_tabs().lock().map(|tabs| tabs.len()).unwrap_or(0)
}

fn inner_text(element: &Element<'_>) -> Result<String, CardError> {
    element
        .get_inner_text()
        .map(|text| text.trim().to_owned())
        .map_err(CardError::from_driver)
}

fn poll_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> anyhow::Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            anyhow::bail!("timed out after {}s", timeout.as_secs());
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn wait_for_enter(message: &str) -> anyhow::Result<()> {
    eprintln!("{message}");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("read confirmation from stdin")?;
    Ok(())
}
