//! Instruction text and the report schema sent to the model.

use serde_json::{json, Value};

use crate::session::CoachingProfile;

/// Persona rules for a text or voice coaching conversation
pub fn system_instruction(profile: &CoachingProfile) -> String {
    format!(
        "You are a friendly conversation partner helping a learner practise {language}.\n\
         Role-play this scenario: {scenario}.\n\
         Keep the conversation focused on: {topic}.\n\
         Rules:\n\
         - Always reply in {language}, using short, natural turns.\n\
         - Stay in character; never grade or correct the learner during the conversation.\n\
         - If the learner is stuck, rephrase more simply instead of switching language.\n\
         - Ask one open question per turn to keep the learner talking.",
        language = profile.language,
        scenario = profile.scenario,
        topic = profile.topic,
    )
}

/// Voice sessions additionally keep replies brief enough to speak
pub fn live_system_instruction(profile: &CoachingProfile) -> String {
    format!(
        "{}\n- You are speaking aloud: keep each reply to one or two sentences.",
        system_instruction(profile)
    )
}

pub fn assessment_prompt(transcript: &str) -> String {
    format!(
        "Assess the learner's speaking proficiency from the practice conversation below. \
         Only the lines spoken by \"User\" are the learner's. Rate functional ability, \
         precision (vocabulary, grammar, fluency) and content depth. Quote the learner \
         exactly in canDoExamples (with an English translation) and growthExamples (with \
         a corrected version). The summary must be a single sentence. Copy the transcript \
         verbatim into fullTranscript.\n\nTRANSCRIPT:\n{}",
        transcript
    )
}

/// JSON schema matching [`AssessmentReport`](crate::session::AssessmentReport)
pub fn report_schema() -> Value {
    let pair = |second: &str| {
        json!({
            "type": "ARRAY",
            "items": {
                "type": "OBJECT",
                "properties": {
                    "quote": { "type": "STRING" },
                    second: { "type": "STRING" }
                },
                "required": ["quote", second]
            }
        })
    };

    json!({
        "type": "OBJECT",
        "properties": {
            "score": {
                "type": "STRING",
                "enum": [
                    "Novice Low", "Novice Mid", "Novice High",
                    "Intermediate Low", "Intermediate Mid", "Intermediate High",
                    "Advanced Low", "Advanced Mid", "Advanced High", "Superior"
                ]
            },
            "functionalAbility": { "type": "STRING" },
            "precisionAnalysis": {
                "type": "OBJECT",
                "properties": {
                    "vocabulary": { "type": "STRING" },
                    "grammar": { "type": "STRING" },
                    "fluency": { "type": "STRING" }
                },
                "required": ["vocabulary", "grammar", "fluency"]
            },
            "contentDepth": { "type": "STRING" },
            "canDoExamples": pair("translation"),
            "growthExamples": pair("correction"),
            "summary": { "type": "STRING" },
            "fullTranscript": { "type": "STRING" }
        },
        "required": [
            "score", "functionalAbility", "precisionAnalysis", "contentDepth",
            "canDoExamples", "growthExamples", "summary", "fullTranscript"
        ]
    })
}
