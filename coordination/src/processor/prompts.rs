//! Prompt templates for each processor operation
//!
//! Templates are fixed per operation; the only variable parts are operation
//! arguments and the optional cross-modal grounding block.

/// Describe an arbitrary image.
pub fn describe_image(grounding: &str) -> String {
    with_grounding(
        "Describe the contents of this image precisely and concisely. \
         If it shows a user interface, name the screen and its main controls.",
        grounding,
    )
}

/// Analyse an application screenshot into a JSON document.
pub fn analyze_screenshot(grounding: &str) -> String {
    with_grounding(
        r#"Analyze this application screenshot. Respond with JSON only:
{"summary": string, "application": string|null, "text_content": [string], "issues": [string]}
`issues` lists visible errors, warnings or layout problems."#,
        grounding,
    )
}

/// Enumerate UI elements as JSON.
pub fn recognize_ui_elements() -> String {
    r#"List every interactive or labelled UI element in this image. Respond with JSON only:
{"elements": [{"kind": string, "label": string|null, "bounds": {"x": number, "y": number, "width": number, "height": number}|null, "confidence": number|null}]}"#
        .to_string()
}

/// Turn a design mock-up into code.
pub fn design_to_code(framework: &str, instructions: Option<&str>) -> String {
    let mut prompt = format!(
        "Generate {} code that implements the design shown in this image. \
         Return only the code, without explanation.",
        framework
    );
    if let Some(extra) = instructions.filter(|s| !s.trim().is_empty()) {
        prompt.push_str("\n\nAdditional requirements:\n");
        prompt.push_str(extra);
    }
    prompt
}

/// Transcribe speech verbatim.
pub fn transcribe(grounding: &str) -> String {
    with_grounding(
        "Transcribe this audio verbatim. Return only the transcript.",
        grounding,
    )
}

/// Synthesize speech for a text.
pub fn synthesize(text: &str, voice: Option<&str>) -> String {
    format!(
        "Synthesize speech for the following text using the {} voice. \
         Respond with JSON only: {{\"audio\": base64 string, \"format\": string}}\n\nText:\n{}",
        voice.unwrap_or("default"),
        text
    )
}

/// Answer a spoken or typed question.
pub fn ask(question: &str, grounding: &str) -> String {
    with_grounding(
        &format!(
            "Answer the user's question. If audio is attached, it contains the spoken question \
             and takes precedence over the text.\n\nQuestion: {}",
            question
        ),
        grounding,
    )
}

/// Interpret a voice command as a structured intent.
pub fn interpret_command(command: &str, grounding: &str) -> String {
    with_grounding(
        &format!(
            r#"Interpret the following editor voice command. Respond with JSON only:
{{"intent": string, "target": string|null, "arguments": object, "confidence": number|null}}

Command: {}"#,
            command
        ),
        grounding,
    )
}

fn with_grounding(instruction: &str, grounding: &str) -> String {
    if grounding.is_empty() {
        instruction.to_string()
    } else {
        format!("{}\n\n{}", grounding, instruction)
    }
}
