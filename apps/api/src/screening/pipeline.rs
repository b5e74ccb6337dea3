use serde_json::Value;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::llm_client::prompts::{truncate_chars, FAIRNESS_INSTRUCTION};
use crate::llm_client::LlmClient;
use crate::models::job::JobRow;
use crate::models::screening::ScreeningAssessmentRow;
use crate::screening::assessment::{normalize, ScreeningResult};
use crate::screening::prompts::{NO_JOB_CONTEXT, SCREENING_PROMPT, SCREENING_SYSTEM};

/// Upper bound on material sent to the model.
const MAX_MATERIAL_CHARS: usize = 24_000;
const MIN_MATERIAL_CHARS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    Transcript,
    Resume,
}

impl MaterialKind {
    fn label(&self) -> &'static str {
        match self {
            MaterialKind::Transcript => "interview transcript",
            MaterialKind::Resume => "resume",
        }
    }
}

/// What gets screened and against which job.
pub struct ScreeningInput<'a> {
    pub material: &'a str,
    pub kind: MaterialKind,
    pub job: Option<&'a JobRow>,
}

/// Rows a stored assessment is linked to.
#[derive(Debug, Clone, Default)]
pub struct AssessmentLinks {
    pub user_id: Uuid,
    pub job_id: Option<Uuid>,
    pub candidate_application_id: Option<Uuid>,
    pub interview_id: Option<Uuid>,
}

pub fn build_prompt(input: &ScreeningInput<'_>) -> Result<String, AppError> {
    let material = input.material.trim();
    if material.chars().count() < MIN_MATERIAL_CHARS {
        return Err(AppError::Validation(format!(
            "The {} is empty or too short to screen",
            input.kind.label()
        )));
    }

    let job_context = match input.job {
        Some(job) => {
            let mut ctx = format!("Title: {}\n\n{}", job.title, job.description);
            if !job.skills.is_empty() {
                ctx.push_str(&format!("\n\nKey skills: {}", job.skills.join(", ")));
            }
            ctx
        }
        None => NO_JOB_CONTEXT.to_string(),
    };

    Ok(SCREENING_PROMPT
        .replace("{material_kind}", input.kind.label())
        .replace("{job_context}", truncate_chars(&job_context, 6_000))
        .replace("{fairness}", FAIRNESS_INSTRUCTION.trim())
        .replace("{material}", truncate_chars(material, MAX_MATERIAL_CHARS)))
}

/// Sends the material to the LLM and returns the normalised result plus the raw JSON.
pub async fn screen(
    llm: &LlmClient,
    input: &ScreeningInput<'_>,
) -> Result<(ScreeningResult, Value), AppError> {
    let prompt = build_prompt(input)?;
    let raw: Value = llm
        .call_json(&prompt, SCREENING_SYSTEM)
        .await
        .map_err(|e| AppError::Llm(format!("Screening call failed: {e}")))?;
    let result = normalize(&raw).map_err(|e| AppError::Llm(format!("Screening output invalid: {e}")))?;
    Ok((result, raw))
}

pub async fn persist_assessment(
    pool: &PgPool,
    links: &AssessmentLinks,
    result: &ScreeningResult,
    raw: &Value,
    model: &str,
) -> Result<ScreeningAssessmentRow, AppError> {
    let row = sqlx::query_as::<_, ScreeningAssessmentRow>(
        r#"
        INSERT INTO screening_assessments
            (id, candidate_application_id, interview_id, user_id, job_id, score,
             summary, strengths, weaknesses, recommendation, raw, model)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(links.candidate_application_id)
    .bind(links.interview_id)
    .bind(links.user_id)
    .bind(links.job_id)
    .bind(i32::from(result.score))
    .bind(&result.summary)
    .bind(&result.strengths)
    .bind(&result.weaknesses)
    .bind(result.recommendation.as_str())
    .bind(raw)
    .bind(model)
    .fetch_one(pool)
    .await?;

    info!(
        assessment_id = %row.id,
        score = row.score,
        recommendation = %row.recommendation,
        "Stored screening assessment"
    );
    Ok(row)
}

/// Screens and stores in one step.
pub async fn screen_and_persist(
    pool: &PgPool,
    llm: &LlmClient,
    input: &ScreeningInput<'_>,
    links: &AssessmentLinks,
) -> Result<ScreeningAssessmentRow, AppError> {
    let (result, raw) = screen(llm, input).await?;
    persist_assessment(pool, links, &result, &raw, llm.model()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn job() -> JobRow {
        JobRow {
            id: Uuid::new_v4(),
            employer_id: Uuid::new_v4(),
            title: "Backend Engineer".into(),
            description: "Own our billing services.".into(),
            location: None,
            employment_type: None,
            salary_min: None,
            salary_max: None,
            skills: vec!["rust".into(), "postgres".into()],
            status: "open".into(),
            interview_config: json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_prompt_includes_job_and_material() {
        let job = job();
        let input = ScreeningInput {
            material: "Interviewer: Tell me about a hard bug.\nCandidate: A deadlock in our queue.",
            kind: MaterialKind::Transcript,
            job: Some(&job),
        };
        let prompt = build_prompt(&input).unwrap();
        assert!(prompt.contains("Backend Engineer"));
        assert!(prompt.contains("Key skills: rust, postgres"));
        assert!(prompt.contains("interview transcript"));
        assert!(prompt.contains("deadlock"));
        assert!(!prompt.contains("{material}"));
    }

    #[test]
    fn test_prompt_without_job_uses_generic_context() {
        let input = ScreeningInput {
            material: "Ten years building payment systems in Go and Rust.",
            kind: MaterialKind::Resume,
            job: None,
        };
        assert!(build_prompt(&input).unwrap().contains(NO_JOB_CONTEXT));
    }

    #[test]
    fn test_short_material_rejected() {
        let input = ScreeningInput {
            material: "   hi  ",
            kind: MaterialKind::Transcript,
            job: None,
        };
        assert!(matches!(build_prompt(&input), Err(AppError::Validation(_))));
    }
}
