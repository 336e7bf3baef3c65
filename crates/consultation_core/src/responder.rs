//! crates/consultation_core/src/responder.rs
//!
//! Automated reply generation for bot-assisted consultations. The rule-based
//! templates are the required behavior; an external generation backend, when
//! configured, replaces them but any failure there falls back to the
//! templates rather than surfacing an error to the farmer.

use std::sync::Arc;

use tracing::warn;

use crate::domain::Consultation;
use crate::ports::ReplyGeneration;

/// What a farmer's message is asking for. Classification order matters:
/// distress language wins over everything else, so "urgent, need treatment"
/// takes the urgent branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyIntent {
    Urgent,
    Treatment,
    Prevention,
    OrganicRemedy,
    General,
}

/// Classifies a message by keyword presence, urgent triggers first.
pub fn classify(text: &str) -> ReplyIntent {
    let msg = text.to_lowercase();

    if ["urgent", "severe", "dying"].iter().any(|k| msg.contains(k)) {
        return ReplyIntent::Urgent;
    }
    if ["treatment", "cure", "remedy"].iter().any(|k| msg.contains(k)) {
        return ReplyIntent::Treatment;
    }
    if ["prevent", "avoid"].iter().any(|k| msg.contains(k)) {
        return ReplyIntent::Prevention;
    }
    if ["organic", "natural"].iter().any(|k| msg.contains(k)) {
        return ReplyIntent::OrganicRemedy;
    }
    ReplyIntent::General
}

/// Generates reply text for the automated assistant.
#[derive(Clone, Default)]
pub struct Responder {
    backend: Option<Arc<dyn ReplyGeneration>>,
}

impl Responder {
    /// A responder that only uses the rule-based templates.
    pub fn rule_based() -> Self {
        Self { backend: None }
    }

    /// A responder that prefers `backend` and falls back to the templates.
    pub fn with_backend(backend: Arc<dyn ReplyGeneration>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Produces a reply to `incoming`. Never fails: a backend error is logged
    /// and the rule-based template is returned instead.
    pub async fn respond(&self, consultation: &Consultation, incoming: &str) -> String {
        if let Some(backend) = &self.backend {
            match backend.generate_reply(consultation, incoming).await {
                Ok(reply) => return reply,
                Err(e) => {
                    warn!(
                        consultation_id = %consultation.id,
                        "Reply backend failed, falling back to rule-based response: {e}"
                    );
                }
            }
        }
        rule_based_reply(consultation, incoming)
    }

    /// The one-time welcome message posted when the bot takes over a
    /// consultation nobody has accepted yet.
    pub fn welcome_message(consultation: &Consultation) -> String {
        format!(
            "Hello! I'm the AgriIQ assistant. I see you're having trouble with your \
             {plant} ({diagnosis}). While we connect you with an expert agronomist, \
             I can give immediate guidance drawn from disease detection, \
             community-verified solutions, and regional best practices. Ask me \
             anything about your plant's condition - an agronomist will join this \
             chat as soon as one becomes available.",
            plant = consultation.plant_name,
            diagnosis = consultation.diagnosis_label(),
        )
    }

    /// Chat notice posted when a human agronomist joins a bot-assisted
    /// consultation.
    pub fn handoff_notice(agronomist_name: &str) -> String {
        format!(
            "Good news! {agronomist_name}, one of our expert agronomists, has joined \
             the consultation and will take over from here. Feel free to ask them \
             anything."
        )
    }
}

/// Fills the template for the classified intent with the consultation's
/// diagnosis label, region, and season.
pub fn rule_based_reply(consultation: &Consultation, incoming: &str) -> String {
    let diagnosis = consultation.diagnosis_label();
    match classify(incoming) {
        ReplyIntent::Urgent => format!(
            "I understand this feels urgent. Right now: move the plant away from \
             healthy ones, remove heavily damaged parts, and hold off on watering. \
             Within 24 hours, apply a neem oil spray and check the roots for rot. \
             {diagnosis} is usually manageable with prompt care, and an expert \
             agronomist will join shortly for anything critical."
        ),
        ReplyIntent::Treatment => format!(
            "For {diagnosis}, start by isolating the affected plant and removing \
             badly damaged leaves. Apply neem oil spray (2 tbsp per litre of water) \
             every 3 days, use a copper-based fungicide for severe cases, and make \
             sure the soil drains well. In the {region} region during {season}, \
             adjust the watering schedule to the local climate.",
            region = consultation.region,
            season = consultation.season,
        ),
        ReplyIntent::Prevention => format!(
            "To keep {diagnosis} from coming back: keep plants spaced at least two \
             feet apart, water in the early morning rather than the evening, avoid \
             overhead watering, and clear fallen leaves regularly. Good drainage, \
             monthly compost, and a weekly leaf inspection catch most problems \
             before they spread."
        ),
        ReplyIntent::OrganicRemedy => format!(
            "Effective organic options for {diagnosis}: a neem oil solution \
             (2 tbsp neem oil plus a teaspoon of soap per litre, sprayed weekly in \
             the evening), a strained garlic-chili spray for insect pressure, or a \
             baking-soda mix (1 tbsp soda and 1 tbsp vegetable oil in 4 litres of \
             water) against fungal disease. All are safe and locally available."
        ),
        ReplyIntent::General => format!(
            "Your {plant} shows signs of {diagnosis}. This condition is common in \
             the {region} region during {season} and responds well to treatment. \
             Start with a neem oil spray and monitor the plant daily. I can go \
             deeper on treatment plans, organic remedies, or prevention - what \
             would you like to know more about?",
            plant = consultation.plant_name,
            region = consultation.region,
            season = consultation.season,
        ),
    }
}
