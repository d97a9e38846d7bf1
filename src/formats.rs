use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobListing {
    pub job_id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub job_url: String,
    pub description: String,
}

// Kept verbatim so the output file keeps the model's representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchScore {
    Number(serde_json::Number),
    Text(String),
}

impl MatchScore {
    pub fn value(&self) -> anyhow::Result<f64> {
        let value = match self {
            MatchScore::Number(number) => number
                .as_f64()
                .ok_or_else(|| anyhow::anyhow!("match_score is not representable as f64: {number}"))?,
            MatchScore::Text(text) => text
                .trim()
                .parse::<f64>()
                .map_err(|_| anyhow::anyhow!("match_score is not numeric: {text:?}"))?,
        };
        if value.is_nan() {
            anyhow::bail!("match_score is NaN");
        }
        Ok(value)
    }
}

impl fmt::Display for MatchScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchScore::Number(number) => write!(f, "{number}"),
            MatchScore::Text(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalysisVerdict {
    #[serde(default)]
    pub match_score: Option<MatchScore>,
    #[serde(default, deserialize_with = "bool_or_string")]
    pub should_apply: bool,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub job_id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub job_url: String,
    pub match_score: MatchScore,
    pub explanation: String,
}

impl Recommendation {
    pub fn from_verdict(job: &JobListing, verdict: AnalysisVerdict) -> Option<Self> {
        Some(Self {
            job_id: job.job_id.clone(),
            title: job.title.clone(),
            company: job.company.clone(),
            location: job.location.clone(),
            job_url: job.job_url.clone(),
            match_score: verdict.match_score?,
            explanation: verdict.explanation,
        })
    }
}

// Models asked for `"should_apply": "bool"` answer with either form.
fn bool_or_string<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Bool(value) => Ok(value),
        Raw::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Ok(true),
            "false" | "no" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "should_apply must be a boolean, got {other:?}"
            ))),
        },
    }
}
