//! System directive assembly.
//!
//! The directive fixes the assistant to flood safety, tells it where the
//! user is (when known), and pins down the HTML output structure including
//! the trailing follow-up block that `parser` splits off.

use floodsafe_core::types::LocationContext;

use crate::parser::{FOLLOW_UP_CLOSE, FOLLOW_UP_OPEN};

const PERSONA: &str =
    "You are a helpful assistant specialized in flood safety and emergency response.";

const GUIDANCE: &str = "Provide clear, concise information about flood safety measures, \
emergency contacts, and immediate actions to take during floods. Focus on practical advice \
and official emergency contact numbers. Always include relevant emergency numbers when \
discussing emergency situations. If providing location-specific information, make sure to \
mention that the information is specific to the user's current location.";

const FORMATTING_RULES: &str = "Format your responses using HTML tags for better readability:
- Use <h3> for section headers
- Use <ul> and <li> for lists
- Use <strong> for important information
- Use <p> for paragraphs
- Use <div class=\"emergency-contact\"> for emergency numbers
- Use <div class=\"warning\"> for warnings
- Use <div class=\"tip\"> for tips
- Use <div class=\"location-specific\"> for location-specific information
- Use <a href=\"tel:number\"> for clickable phone numbers
- Use <br> for line breaks";

/// Sentence describing the user's location, or asking for general advice.
pub fn location_sentence(location: Option<&LocationContext>) -> String {
    match location {
        Some(ctx) => format!(
            "The user is located in {}. Please provide location-specific emergency contacts \
             and information for this area.",
            ctx.place()
        ),
        None => "The user's location is not available. Please provide general emergency \
                 information."
            .to_string(),
    }
}

fn follow_up_template() -> String {
    format!(
        "After your main response, provide 2-3 relevant follow-up questions that the user might \
         want to ask next. Format these questions in a special section exactly like this, and \
         include this section only once:
{open}
  <h4>You might also want to know:</h4>
  <ul class=\"follow-up-questions\">
    <li>First follow-up question</li>
    <li>Second follow-up question</li>
    <li>Third follow-up question</li>
  </ul>
{close}",
        open = FOLLOW_UP_OPEN,
        close = FOLLOW_UP_CLOSE,
    )
}

/// Build the full system directive for one request.
pub fn build_directive(location: Option<&LocationContext>) -> String {
    format!(
        "{} {} {}\n\n{}\n\n{}",
        PERSONA,
        location_sentence(location),
        GUIDANCE,
        FORMATTING_RULES,
        follow_up_template()
    )
}
