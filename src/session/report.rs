//! Assessment report and its plain-text export.

use serde::{Deserialize, Serialize};

use crate::error::{CoachError, CoachResult};

const RANK_HEADER: &str = "RANK:";
const SUMMARY_HEADER: &str = "SUMMARY:";
const TRANSCRIPT_HEADER: &str = "FULL TRANSCRIPT:";
const DISCLAIMER_HEADER: &str = "DISCLAIMER:";

const DISCLAIMER: &str = "This assessment was generated automatically from a practice \
conversation. It is an informal estimate, not an official proficiency rating.";

/// Structured proficiency report produced once per assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentReport {
    /// Proficiency rank, e.g. "Intermediate Mid"
    pub score: String,
    pub functional_ability: String,
    pub precision_analysis: PrecisionAnalysis,
    pub content_depth: String,
    pub can_do_examples: Vec<CanDoExample>,
    pub growth_examples: Vec<GrowthExample>,
    /// One sentence
    pub summary: String,
    pub full_transcript: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecisionAnalysis {
    pub vocabulary: String,
    pub grammar: String,
    pub fluency: String,
}

/// Something the learner said well, with its translation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanDoExample {
    pub quote: String,
    pub translation: String,
}

/// Something the learner said that could be better, with a correction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthExample {
    pub quote: String,
    pub correction: String,
}

impl AssessmentReport {
    /// Parse a structured-output response; any mismatch is a hard failure
    pub fn from_json(raw: &str) -> CoachResult<Self> {
        let report: Self = serde_json::from_str(strip_code_fence(raw))
            .map_err(|e| CoachError::AssessmentSynthesis(format!("malformed report: {}", e)))?;

        if report.score.trim().is_empty() {
            return Err(CoachError::AssessmentSynthesis("report has no score".to_string()));
        }
        if report.summary.trim().is_empty() {
            return Err(CoachError::AssessmentSynthesis("report has no summary".to_string()));
        }
        Ok(report)
    }

    /// Short text read aloud once the report is ready
    pub fn readout(&self) -> String {
        format!("Your assessment is ready. Your rank is {}. {}", self.score, self.summary)
    }

    /// Flat document with fixed section headers
    pub fn export_text(&self, product_name: &str) -> String {
        format!(
            "{product} ASSESSMENT REPORT\n\n\
             {RANK_HEADER}\n{rank}\n\n\
             {SUMMARY_HEADER}\n{summary}\n\n\
             {TRANSCRIPT_HEADER}\n{transcript}\n\n\
             {DISCLAIMER_HEADER}\n{DISCLAIMER}\n",
            product = product_name.to_uppercase(),
            rank = self.score,
            summary = self.summary,
            transcript = self.full_transcript,
        )
    }
}

/// `"Lingo Coach"` -> `lingo-coach-assessment-report.txt`
pub fn export_file_name(product_name: &str) -> String {
    let slug = product_name
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-");

    if slug.is_empty() {
        "assessment-report.txt".to_string()
    } else {
        format!("{}-assessment-report.txt", slug)
    }
}

/// Sections read back from an exported document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedReport {
    pub rank: String,
    pub summary: String,
    pub transcript: String,
}

impl ExportedReport {
    pub fn parse(text: &str) -> CoachResult<Self> {
        let rank_body = section_after(text, RANK_HEADER)?;
        let (rank, rest) = split_section(rank_body, SUMMARY_HEADER)?;
        let (summary, rest) = split_section(rest, TRANSCRIPT_HEADER)?;

        // The transcript is free text, so the last disclaimer header ends it
        let marker = format!("\n\n{}\n", DISCLAIMER_HEADER);
        let end = rest
            .rfind(&marker)
            .ok_or_else(|| missing_section(DISCLAIMER_HEADER))?;

        Ok(Self {
            rank: rank.to_string(),
            summary: summary.to_string(),
            transcript: rest[..end].to_string(),
        })
    }
}

fn section_after<'a>(text: &'a str, header: &str) -> CoachResult<&'a str> {
    let marker = format!("{}\n", header);
    text.find(&marker)
        .map(|i| &text[i + marker.len()..])
        .ok_or_else(|| missing_section(header))
}

/// Body up to the next `\n\n<header>\n`, and the text after that header
fn split_section<'a>(text: &'a str, next_header: &str) -> CoachResult<(&'a str, &'a str)> {
    let marker = format!("\n\n{}\n", next_header);
    text.find(&marker)
        .map(|i| (&text[..i], &text[i + marker.len()..]))
        .ok_or_else(|| missing_section(next_header))
}

fn missing_section(header: &str) -> CoachError {
    CoachError::InvalidState(format!("export is missing the {} section", header))
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
