// Screening LLM prompt templates.

pub const SCREENING_SYSTEM: &str = "\
You are an experienced technical recruiter producing a structured pre-interview \
screening assessment. You MUST respond with valid JSON only, with no markdown fences, \
no explanations. Be specific: cite concrete evidence from the material for every \
strength and weakness.";

pub const SCREENING_PROMPT: &str = r#"Assess the candidate material below.

MATERIAL TYPE: {material_kind}

JOB CONTEXT:
{job_context}

CANDIDATE MATERIAL:
{material}

OUTPUT SCHEMA (return exactly this structure):
{
  "score": number,            // 0-100 overall fit for the job context
  "summary": "string",        // 2-4 sentences
  "strengths": ["string"],    // 1-6 items, each grounded in the material
  "weaknesses": ["string"],   // 0-6 items, each grounded in the material
  "recommendation": "advance" | "consider" | "reject"
}

RULES:
1. {fairness}
2. If the material is too short to judge, score below 40 and say so in the summary.
3. Return ONLY the JSON object and nothing else, no code fences."#;

pub const NO_JOB_CONTEXT: &str = "No specific job was provided. Assess general professional strength.";
