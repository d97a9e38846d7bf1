use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;

use crate::cli::ScoreArgs;
use crate::formats::{AnalysisVerdict, JobListing, Recommendation};
use crate::openai::ChatClient;
use crate::store;

const VERDICTS_KEY: &str = "verdicts";

pub async fn run(args: ScoreArgs) -> anyhow::Result<()> {
    let resume_path = PathBuf::from(&args.resume);
    let listings_path = PathBuf::from(&args.listings);
    let out_path = PathBuf::from(&args.out);

    if args.batch_size == 0 {
        anyhow::bail!("--batch-size must be > 0");
    }

    let resume = store::read_text(&resume_path)
        .inspect_err(|err| tracing::error!(error = %format!("{err:#}"), "read resume"))
        .context("read resume")?;
    tracing::debug!(chars = resume.chars().count(), "loaded resume");

    let listings: Vec<JobListing> = store::read_json_array(&listings_path)
        .inspect_err(|err| tracing::error!(error = %format!("{err:#}"), "read listings"))
        .context("read listings")?;
    tracing::info!(count = listings.len(), path = %listings_path.display(), "loaded listings");
    tracing::info!(model = %args.model, base_url = %args.base_url, "scoring with model");

    let api_key = std::env::var(&args.api_key_env)
        .map_err(|_| anyhow::anyhow!("{} is not set", args.api_key_env))?;
    let client = ChatClient::new(
        &args.base_url,
        api_key,
        args.model.clone(),
        Duration::from_secs(args.timeout_secs),
    )?;

    let settings = ScoreSettings {
        batch_size: args.batch_size,
        resume_chars: args.resume_chars,
    };
    let recommendations = score_listings(&client, &resume, &listings, &settings)
        .await
        .inspect_err(|err| tracing::error!(error = %format!("{err:#}"), "scoring failed"))?;

    tracing::info!(count = recommendations.len(), "generated recommendations");
    store::write_json_pretty(&out_path, &recommendations).context("write recommendations")?;
    tracing::info!(path = %out_path.display(), "saved recommendations");
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct ScoreSettings {
    pub batch_size: usize,
    pub resume_chars: usize,
}

impl Default for ScoreSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            resume_chars: 2000,
        }
    }
}

pub async fn score_listings(
    client: &ChatClient,
    resume: &str,
    listings: &[JobListing],
    settings: &ScoreSettings,
) -> anyhow::Result<Vec<Recommendation>> {
    let unique = dedup_by_job_id(listings);
    tracing::info!(
        total = listings.len(),
        unique = unique.len(),
        "deduplicated listings"
    );

    let resume_excerpt = truncate_chars(resume, settings.resume_chars);
    let mut recommendations = Vec::new();

    for (batch_index, batch) in batches(&unique, settings.batch_size).into_iter().enumerate() {
        let first = batch_index * settings.batch_size + 1;
        tracing::info!(
            from = first,
            to = first + batch.len() - 1,
            total = unique.len(),
            "evaluating batch"
        );

        let prompt = build_prompt(resume_excerpt, batch)?;
        let content = client
            .complete_json(&prompt)
            .await
            .with_context(|| format!("score batch {}", batch_index + 1))?;
        let verdicts = parse_verdicts(&content)
            .with_context(|| format!("parse verdicts for batch {}", batch_index + 1))?;

        if verdicts.len() != batch.len() {
            tracing::warn!(
                jobs = batch.len(),
                verdicts = verdicts.len(),
                "verdict count does not match batch size; pairing by position"
            );
        }

        recommendations.extend(recommend(batch, verdicts));
    }

    Ok(recommendations)
}

// Listings without an id cannot be told apart and are dropped.
pub fn dedup_by_job_id(listings: &[JobListing]) -> Vec<JobListing> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for listing in listings {
        if listing.job_id.is_empty() {
            tracing::debug!(title = %listing.title, "dropping listing without job id");
            continue;
        }
        if seen.insert(listing.job_id.as_str()) {
            unique.push(listing.clone());
        }
    }
    unique
}

pub fn batches<T>(items: &[T], batch_size: usize) -> Vec<&[T]> {
    items.chunks(batch_size.max(1)).collect()
}

pub fn recommend(batch: &[JobListing], verdicts: Vec<AnalysisVerdict>) -> Vec<Recommendation> {
    let mut out = Vec::new();
    for (job, verdict) in batch.iter().zip(verdicts) {
        if !verdict.should_apply {
            tracing::info!(job_id = %job.job_id, title = %job.title, "skipping job (not recommended)");
            continue;
        }
        let Some(recommendation) = Recommendation::from_verdict(job, verdict) else {
            tracing::warn!(job_id = %job.job_id, title = %job.title, "skipping job (no match_score)");
            continue;
        };
        tracing::info!(
            job_id = %recommendation.job_id,
            title = %recommendation.title,
            company = %recommendation.company,
            match_score = %recommendation.match_score,
            "job recommendation"
        );
        out.push(recommendation);
    }
    out
}

pub fn parse_verdicts(content: &str) -> anyhow::Result<Vec<AnalysisVerdict>> {
    let value: serde_json::Value =
        serde_json::from_str(content.trim()).context("LLM response is not valid JSON")?;

    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut object) => {
            if let Some(serde_json::Value::Array(items)) = object.remove(VERDICTS_KEY) {
                items
            } else if object.contains_key("match_score") {
                vec![serde_json::Value::Object(object)]
            } else {
                let arrays = object
                    .values()
                    .filter(|v| v.is_array())
                    .cloned()
                    .collect::<Vec<_>>();
                match <[serde_json::Value; 1]>::try_from(arrays) {
                    Ok([serde_json::Value::Array(items)]) => items,
                    _ => vec![serde_json::Value::Object(object)],
                }
            }
        }
        other => anyhow::bail!("LLM response must be a JSON object or array, got: {other}"),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            serde_json::from_value::<AnalysisVerdict>(item)
                .with_context(|| format!("invalid verdict at index {idx}"))
        })
        .collect()
}

pub fn build_prompt(resume_excerpt: &str, batch: &[JobListing]) -> anyhow::Result<String> {
    let jobs_json = serde_json::to_string_pretty(batch).context("serialize batch")?;
    Ok(format!(
        "You are an expert recruiter and professional career coach with over 25 years of experience.\n\
Analyze how well each job fits the candidate.\n\
\n\
Ideal job: roles that grow the candidate's career towards software engineering in Formula 1 and motorsport in the near future.\n\
\n\
BEGIN_RESUME\n\
{resume_excerpt}\n\
END_RESUME\n\
\n\
For each job consider its title, company, location and description, and rate the compatibility \
with the resume and the ideal job on a scale from 0 to 10.\n\
\n\
Respond ONLY with a JSON object whose \"{VERDICTS_KEY}\" array holds exactly one entry per job, in the same order as the jobs below:\n\
{{\"{VERDICTS_KEY}\": [{{\"match_score\": \"number between 0 and 10\", \"should_apply\": \"bool\", \"explanation\": \"why this is a good or bad fit in at most 12 words\"}}]}}\n\
\n\
BEGIN_JOBS_JSON\n\
{jobs_json}\n\
END_JOBS_JSON\n"
    ))
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
